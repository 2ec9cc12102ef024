use async_trait::async_trait;
use cloudlaunch_common::{CloudLaunchError, Result};
use cloudlaunch_providers::ComputeProvider;
use std::sync::Arc;

/// Hands out a provider bound to a region.
#[async_trait]
pub trait ProviderSource: Send + Sync {
    async fn connect(&self, region: &str) -> Result<Arc<dyn ComputeProvider>>;
}

pub struct ProviderManager {
    name: String,
}

impl ProviderManager {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().trim().to_lowercase(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names this build can connect to.
    pub fn available() -> Vec<&'static str> {
        let mut names = Vec::new();
        if cfg!(feature = "provider-mock") {
            names.push("mock");
        }
        if cfg!(feature = "provider-ec2") {
            names.push("ec2");
        }
        names
    }

    /// `ec2` when it is compiled in, otherwise the first available provider.
    pub fn default_name() -> &'static str {
        let available = Self::available();
        if available.contains(&"ec2") {
            return "ec2";
        }
        available.first().copied().unwrap_or("ec2")
    }
}

#[async_trait]
impl ProviderSource for ProviderManager {
    async fn connect(&self, region: &str) -> Result<Arc<dyn ComputeProvider>> {
        let provider: Arc<dyn ComputeProvider> = match self.name.as_str() {
            #[cfg(feature = "provider-mock")]
            "mock" => {
                tracing::warn!(region, "[provider] Using in-memory mock provider, no instances are created");
                Arc::new(cloudlaunch_providers::mock::MockProvider::new(region))
            }
            #[cfg(feature = "provider-ec2")]
            "ec2" => {
                tracing::info!(region, "[provider] Connecting to EC2");
                Arc::new(cloudlaunch_providers::ec2::Ec2Provider::connect(region).await)
            }
            other => {
                return Err(CloudLaunchError::UnknownProvider {
                    name: other.to_string(),
                })
            }
        };
        Ok(provider)
    }
}
