use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CloudLaunchError>;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum CloudLaunchError {
    #[error("unsupported region: {region}. The available regions are: {}", .supported.join(", "))]
    UnsupportedRegion {
        region: String,
        supported: Vec<String>,
    },

    #[error("unable to find config {}", .path.display())]
    ConfigNotFound { path: PathBuf },

    #[error("no heap size known for instance type {instance_type}")]
    UnknownInstanceType { instance_type: String },

    #[error("malformed cluster descriptor {}: {reason}", .path.display())]
    MalformedDescriptor { path: PathBuf, reason: String },

    #[error("invalid template overrides in {}: {source}", .path.display())]
    InvalidOverrides {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("template override {key} is not supported: {reason}")]
    UnsupportedOverride {
        key: &'static str,
        reason: &'static str,
    },

    #[error("error waiting for running state: instance {instance_id} is in state {state}")]
    Provisioning { instance_id: String, state: String },

    #[error("no instances to {action}")]
    EmptyTargetSet { action: &'static str },

    #[error("provider call {operation} failed: {source}")]
    ProviderConnection {
        operation: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("unknown or disabled compute provider: {name}")]
    UnknownProvider { name: String },

    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CloudLaunchError {
    /// Wraps a failed provider call.
    pub fn provider(operation: &'static str, err: anyhow::Error) -> Self {
        CloudLaunchError::ProviderConnection {
            operation,
            source: err.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CloudLaunchError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_region_lists_all_regions() {
        let err = CloudLaunchError::UnsupportedRegion {
            region: "eu-west-9".into(),
            supported: vec!["us-east-1".into(), "us-west-1".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("eu-west-9"));
        assert!(msg.contains("us-east-1, us-west-1"));
    }

    #[test]
    fn provider_error_keeps_source() {
        let err = CloudLaunchError::provider("terminate_instances", anyhow::anyhow!("connection refused"));
        assert!(err.to_string().contains("connection refused"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
