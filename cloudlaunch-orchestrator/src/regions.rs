use cloudlaunch_common::{CloudLaunchError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_INSTANCE_COUNT: u32 = 4;

/// Default provisioning settings for one region.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RegionProfile {
    pub image_id: String,
    pub security_groups: Vec<String>,
    pub key_name: String,
    pub instance_type: String,
    pub key_file: String,
    pub username: String,
    pub credentials_file: String,
    pub region: String,
}

/// Immutable region → profile table. Built once and passed by reference.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct RegionRegistry {
    profiles: BTreeMap<String, RegionProfile>,
}

impl RegionRegistry {
    pub fn new(profiles: impl IntoIterator<Item = RegionProfile>) -> Self {
        Self {
            profiles: profiles
                .into_iter()
                .map(|p| (p.region.clone(), p))
                .collect(),
        }
    }

    /// Profiles shipped with the launcher.
    pub fn builtin() -> Self {
        let profile = |region: &str, image_id: &str| RegionProfile {
            image_id: image_id.to_string(),
            security_groups: vec!["MrJenkinsTest".to_string()],
            key_name: "mrjenkins_test".to_string(),
            instance_type: "m1.xlarge".to_string(),
            key_file: "~/.ec2/keys/mrjenkins_test.pem".to_string(),
            username: "0xdiag".to_string(),
            credentials_file: "~/.ec2/AwsCredentials.properties".to_string(),
            region: region.to_string(),
        };
        Self::new([
            profile("us-east-1", "ami-b85cc4d1"),
            profile("us-west-1", "ami-a6cbe6e3"),
        ])
    }

    pub fn get(&self, region: &str) -> Result<&RegionProfile> {
        self.profiles
            .get(region)
            .ok_or_else(|| CloudLaunchError::UnsupportedRegion {
                region: region.to_string(),
                supported: self.regions(),
            })
    }

    /// Registered region names, sorted.
    pub fn regions(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }

    pub fn profiles(&self) -> impl Iterator<Item = &RegionProfile> {
        self.profiles.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_covers_default_region() {
        let registry = RegionRegistry::builtin();
        let profile = registry.get(DEFAULT_REGION).unwrap();
        assert_eq!(profile.region, DEFAULT_REGION);
        assert_eq!(profile.instance_type, "m1.xlarge");
        assert_eq!(registry.regions(), vec!["us-east-1", "us-west-1"]);
    }

    #[test]
    fn unknown_region_names_every_supported_region() {
        let registry = RegionRegistry::builtin();
        match registry.get("ap-south-1") {
            Err(CloudLaunchError::UnsupportedRegion { region, supported }) => {
                assert_eq!(region, "ap-south-1");
                assert_eq!(supported, registry.regions());
            }
            other => panic!("expected UnsupportedRegion, got {:?}", other),
        }
    }
}
