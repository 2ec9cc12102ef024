use crate::paths::FileLocator;
use crate::regions::{RegionProfile, RegionRegistry};
use cloudlaunch_common::{CloudLaunchError, Result};
use cloudlaunch_providers::{BlockDevice, LaunchSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Caller-supplied settings. Every present key wins over the region default.
///
/// Read from the `--config` JSON file. `pem` and `aws_credentials` are
/// accepted as older spellings of `key_file` and `credentials_file`.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct TemplateOverrides {
    pub image_id: Option<String>,
    pub security_groups: Option<Vec<String>>,
    pub key_name: Option<String>,
    pub instance_type: Option<String>,
    #[serde(alias = "pem")]
    pub key_file: Option<String>,
    pub username: Option<String>,
    #[serde(alias = "aws_credentials")]
    pub credentials_file: Option<String>,
    pub region: Option<String>,

    pub min_count: Option<u32>,
    pub max_count: Option<u32>,
    pub placement: Option<String>,
    pub user_data: Option<String>,
    pub monitoring_enabled: Option<bool>,
    pub subnet_id: Option<String>,
    pub disable_api_termination: Option<bool>,
    pub instance_initiated_shutdown_behavior: Option<String>,
    pub block_device_map: Option<BTreeMap<String, BlockDevice>>,
    /// EC2-Classic addressing. Only accepted when absent or null.
    pub addressing_type: Option<String>,

    /// Keys the profile does not know about, passed through untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Concrete parameters for one create call.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ProvisioningTemplate {
    pub profile: RegionProfile,
    pub min_count: Option<u32>,
    pub max_count: Option<u32>,
    pub placement: Option<String>,
    pub user_data: Option<String>,
    pub monitoring_enabled: Option<bool>,
    pub subnet_id: Option<String>,
    pub disable_api_termination: Option<bool>,
    pub instance_initiated_shutdown_behavior: Option<String>,
    pub block_device_map: BTreeMap<String, BlockDevice>,
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ProvisioningTemplate {
    /// Launch request for `count` instances; unset count bounds become `count`.
    pub fn launch_spec(&self, count: u32) -> LaunchSpec {
        LaunchSpec {
            image_id: self.profile.image_id.clone(),
            instance_type: self.profile.instance_type.clone(),
            key_name: self.profile.key_name.clone(),
            security_groups: self.profile.security_groups.clone(),
            min_count: self.min_count.unwrap_or(count),
            max_count: self.max_count.unwrap_or(count),
            placement: self.placement.clone(),
            user_data: self.user_data.clone(),
            monitoring_enabled: self.monitoring_enabled.unwrap_or(false),
            subnet_id: self.subnet_id.clone(),
            disable_api_termination: self.disable_api_termination.unwrap_or(false),
            instance_initiated_shutdown_behavior: self.instance_initiated_shutdown_behavior.clone(),
            block_device_map: self.block_device_map.clone(),
        }
    }
}

/// Merges `overrides` over the default profile of `region`.
pub fn resolve(
    registry: &RegionRegistry,
    region: &str,
    overrides: &TemplateOverrides,
) -> Result<ProvisioningTemplate> {
    let defaults = registry.get(region)?;
    if overrides.addressing_type.is_some() {
        return Err(CloudLaunchError::UnsupportedOverride {
            key: "addressing_type",
            reason: "instances get their addresses from the subnet, use subnet_id",
        });
    }
    for key in overrides.extra.keys() {
        warn!(key = %key, "[template] Override {} is kept but not sent to the provider", key);
    }
    let pick = |o: &Option<String>, d: &String| o.clone().unwrap_or_else(|| d.clone());

    let profile = RegionProfile {
        image_id: pick(&overrides.image_id, &defaults.image_id),
        security_groups: overrides
            .security_groups
            .clone()
            .unwrap_or_else(|| defaults.security_groups.clone()),
        key_name: pick(&overrides.key_name, &defaults.key_name),
        instance_type: pick(&overrides.instance_type, &defaults.instance_type),
        key_file: pick(&overrides.key_file, &defaults.key_file),
        username: pick(&overrides.username, &defaults.username),
        credentials_file: pick(&overrides.credentials_file, &defaults.credentials_file),
        region: pick(&overrides.region, &defaults.region),
    };

    Ok(ProvisioningTemplate {
        profile,
        min_count: overrides.min_count,
        max_count: overrides.max_count,
        placement: overrides.placement.clone(),
        user_data: overrides.user_data.clone(),
        monitoring_enabled: overrides.monitoring_enabled,
        subnet_id: overrides.subnet_id.clone(),
        disable_api_termination: overrides.disable_api_termination,
        instance_initiated_shutdown_behavior: overrides.instance_initiated_shutdown_behavior.clone(),
        block_device_map: overrides.block_device_map.clone().unwrap_or_default(),
        extra: overrides.extra.clone(),
    })
}

/// Reads the overrides file, if one was given. No file means no overrides.
pub fn load_overrides(locator: &FileLocator, path: Option<&str>) -> Result<TemplateOverrides> {
    let Some(path) = path else {
        return Ok(TemplateOverrides::default());
    };
    let found = locator.locate(path)?;
    let raw = std::fs::read_to_string(&found).map_err(|e| CloudLaunchError::io(&found, e))?;
    serde_json::from_str(&raw).map_err(|source| CloudLaunchError::InvalidOverrides {
        path: found,
        source,
    })
}
