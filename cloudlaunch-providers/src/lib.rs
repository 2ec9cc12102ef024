use anyhow::Result;
use async_trait::async_trait;
use cloudlaunch_common::{ProvisionedInstance, Reservation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Compute API surface the launcher needs. Implementations are bound to one
/// region when they are constructed.
#[async_trait]
pub trait ComputeProvider: Send + Sync {
    /// Region this provider talks to.
    fn region(&self) -> &str;

    /// Issues a single create call and returns the reservation with one handle
    /// per requested instance (usually still `pending`).
    async fn create_instances(&self, spec: &LaunchSpec) -> Result<Reservation>;

    /// Re-reads one instance: state and addresses.
    async fn describe_instance(&self, instance_id: &str) -> Result<ProvisionedInstance>;

    async fn terminate_instances(&self, instance_ids: &[String]) -> Result<()>;
    async fn stop_instances(&self, instance_ids: &[String]) -> Result<()>;
    async fn start_instances(&self, instance_ids: &[String]) -> Result<()>;
    async fn reboot_instances(&self, instance_ids: &[String]) -> Result<()>;
}

/// Parameters of one create call, already merged and defaulted by the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSpec {
    pub image_id: String,
    pub instance_type: String,
    pub key_name: String,
    pub security_groups: Vec<String>,
    pub min_count: u32,
    pub max_count: u32,
    pub placement: Option<String>,
    pub user_data: Option<String>,
    pub monitoring_enabled: bool,
    pub subnet_id: Option<String>,
    pub disable_api_termination: bool,
    pub instance_initiated_shutdown_behavior: Option<String>,
    /// Device name (e.g. `/dev/sdb`) -> volume to attach at launch.
    #[serde(default)]
    pub block_device_map: BTreeMap<String, BlockDevice>,
}

/// One entry of a launch-time block device mapping.
///
/// An entry with `ephemeral_name` maps an instance store volume; anything
/// else describes an EBS volume.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockDevice {
    pub ephemeral_name: Option<String>,
    pub snapshot_id: Option<String>,
    #[serde(alias = "size")]
    pub size_gb: Option<i32>,
    pub volume_type: Option<String>,
    pub iops: Option<i32>,
    pub delete_on_termination: Option<bool>,
}

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "ec2")]
pub mod ec2;
