use serde::{Deserialize, Serialize};

pub mod error;

pub use error::{CloudLaunchError, Result};

// --- Enums ---

/// Lifecycle state of a compute instance, as reported by the provider.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceState {
    Pending,      // Requested, not booted yet
    Running,      // Booted, addresses assigned
    ShuttingDown, // On its way to terminated
    Terminated,   // Destroyed
    Stopping,
    Stopped,
    /// Any state the provider reports that we do not model.
    Other(String),
}

impl InstanceState {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => InstanceState::Pending,
            "running" => InstanceState::Running,
            "shutting-down" => InstanceState::ShuttingDown,
            "terminated" => InstanceState::Terminated,
            "stopping" => InstanceState::Stopping,
            "stopped" => InstanceState::Stopped,
            other => InstanceState::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            InstanceState::Pending => "pending",
            InstanceState::Running => "running",
            InstanceState::ShuttingDown => "shutting-down",
            InstanceState::Terminated => "terminated",
            InstanceState::Stopping => "stopping",
            InstanceState::Stopped => "stopped",
            InstanceState::Other(s) => s.as_str(),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, InstanceState::Pending)
    }
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Entities ---

/// One launched machine. Only refreshed from provider responses.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ProvisionedInstance {
    pub id: String,
    pub state: InstanceState,
    pub public_address: Option<String>,
    pub private_address: Option<String>,
    pub public_hostname: Option<String>,
}

impl ProvisionedInstance {
    pub fn pending(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: InstanceState::Pending,
            public_address: None,
            private_address: None,
            public_hostname: None,
        }
    }
}

/// The set of instances created by a single provisioning call.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub id: String,
    pub instances: Vec<ProvisionedInstance>,
}

impl Reservation {
    pub fn instance_ids(&self) -> Vec<String> {
        self.instances.iter().map(|i| i.id.clone()).collect()
    }
}
