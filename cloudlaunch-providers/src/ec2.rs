use crate::{BlockDevice, ComputeProvider, LaunchSpec};
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_ec2::config::Region;
use aws_sdk_ec2::types::{
    BlockDeviceMapping, EbsBlockDevice, Instance, InstanceType, Placement,
    RunInstancesMonitoringEnabled, ShutdownBehavior, VolumeType,
};
use aws_sdk_ec2::Client;
use base64::Engine;
use cloudlaunch_common::{InstanceState, ProvisionedInstance, Reservation};

/// AWS EC2 compute API, bound to one region.
///
/// Credentials come from the standard AWS chain (environment, profile,
/// instance role). The credentials file recorded in the cluster descriptor is
/// only checked for existence by the launcher.
pub struct Ec2Provider {
    client: Client,
    region: String,
}

impl Ec2Provider {
    pub async fn connect(region: &str) -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        Self {
            client: Client::new(&config),
            region: region.to_string(),
        }
    }

    fn to_block_device_mapping(device_name: &str, device: &BlockDevice) -> BlockDeviceMapping {
        let mapping = BlockDeviceMapping::builder().device_name(device_name);
        if let Some(ephemeral) = device.ephemeral_name.as_deref() {
            return mapping.virtual_name(ephemeral).build();
        }
        mapping
            .ebs(
                EbsBlockDevice::builder()
                    .set_snapshot_id(device.snapshot_id.clone())
                    .set_volume_size(device.size_gb)
                    .set_volume_type(device.volume_type.as_deref().map(VolumeType::from))
                    .set_iops(device.iops)
                    .set_delete_on_termination(device.delete_on_termination)
                    .build(),
            )
            .build()
    }

    fn to_provisioned(instance: &Instance) -> ProvisionedInstance {
        let state = instance
            .state()
            .and_then(|s| s.name())
            .map(|n| InstanceState::parse(n.as_str()))
            .unwrap_or_else(|| InstanceState::Other("unknown".to_string()));
        ProvisionedInstance {
            id: instance.instance_id().unwrap_or_default().to_string(),
            state,
            public_address: instance.public_ip_address().map(str::to_string),
            private_address: instance.private_ip_address().map(str::to_string),
            public_hostname: instance
                .public_dns_name()
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        }
    }
}

#[async_trait]
impl ComputeProvider for Ec2Provider {
    fn region(&self) -> &str {
        &self.region
    }

    async fn create_instances(&self, spec: &LaunchSpec) -> Result<Reservation> {
        tracing::debug!(
            region = %self.region,
            image_id = %spec.image_id,
            instance_type = %spec.instance_type,
            count = spec.max_count,
            "[ec2] RunInstances"
        );

        let monitoring = RunInstancesMonitoringEnabled::builder()
            .enabled(spec.monitoring_enabled)
            .build()
            .context("building monitoring settings")?;

        let mut request = self
            .client
            .run_instances()
            .image_id(&spec.image_id)
            .instance_type(InstanceType::from(spec.instance_type.as_str()))
            .key_name(&spec.key_name)
            .set_security_groups(Some(spec.security_groups.clone()))
            .min_count(spec.min_count as i32)
            .max_count(spec.max_count as i32)
            .monitoring(monitoring)
            .disable_api_termination(spec.disable_api_termination);

        if let Some(zone) = spec.placement.as_deref() {
            request = request.placement(Placement::builder().availability_zone(zone).build());
        }
        if let Some(user_data) = spec.user_data.as_deref() {
            // EC2 expects base64-encoded user data.
            request = request
                .user_data(base64::engine::general_purpose::STANDARD.encode(user_data));
        }
        if let Some(subnet) = spec.subnet_id.as_deref() {
            request = request.subnet_id(subnet);
        }
        if let Some(behavior) = spec.instance_initiated_shutdown_behavior.as_deref() {
            request = request.instance_initiated_shutdown_behavior(ShutdownBehavior::from(behavior));
        }
        if !spec.block_device_map.is_empty() {
            request = request.set_block_device_mappings(Some(
                spec.block_device_map
                    .iter()
                    .map(|(name, device)| Self::to_block_device_mapping(name, device))
                    .collect(),
            ));
        }

        let out = request.send().await.context("RunInstances")?;
        let reservation_id = out
            .reservation_id()
            .ok_or_else(|| anyhow::anyhow!("RunInstances returned no reservation id"))?
            .to_string();
        let instances = out.instances().iter().map(Self::to_provisioned).collect();

        Ok(Reservation {
            id: reservation_id,
            instances,
        })
    }

    async fn describe_instance(&self, instance_id: &str) -> Result<ProvisionedInstance> {
        let out = self
            .client
            .describe_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .with_context(|| format!("DescribeInstances {}", instance_id))?;

        out.reservations()
            .iter()
            .flat_map(|r| r.instances())
            .find(|i| i.instance_id() == Some(instance_id))
            .map(Self::to_provisioned)
            .ok_or_else(|| anyhow::anyhow!("instance {} not found in {}", instance_id, self.region))
    }

    async fn terminate_instances(&self, instance_ids: &[String]) -> Result<()> {
        self.client
            .terminate_instances()
            .set_instance_ids(Some(instance_ids.to_vec()))
            .send()
            .await
            .context("TerminateInstances")?;
        Ok(())
    }

    async fn stop_instances(&self, instance_ids: &[String]) -> Result<()> {
        self.client
            .stop_instances()
            .set_instance_ids(Some(instance_ids.to_vec()))
            .send()
            .await
            .context("StopInstances")?;
        Ok(())
    }

    async fn start_instances(&self, instance_ids: &[String]) -> Result<()> {
        self.client
            .start_instances()
            .set_instance_ids(Some(instance_ids.to_vec()))
            .send()
            .await
            .context("StartInstances")?;
        Ok(())
    }

    async fn reboot_instances(&self, instance_ids: &[String]) -> Result<()> {
        self.client
            .reboot_instances()
            .set_instance_ids(Some(instance_ids.to_vec()))
            .send()
            .await
            .context("RebootInstances")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ebs_volume_mapping() {
        let device = BlockDevice {
            size_gb: Some(100),
            volume_type: Some("gp2".into()),
            delete_on_termination: Some(true),
            ..Default::default()
        };
        let mapping = Ec2Provider::to_block_device_mapping("/dev/sdb", &device);
        assert_eq!(mapping.device_name(), Some("/dev/sdb"));
        assert!(mapping.virtual_name().is_none());
        let ebs = mapping.ebs().unwrap();
        assert_eq!(ebs.volume_size(), Some(100));
        assert_eq!(ebs.volume_type(), Some(&VolumeType::Gp2));
        assert_eq!(ebs.delete_on_termination(), Some(true));
    }

    #[test]
    fn ephemeral_mapping_has_no_ebs() {
        let device = BlockDevice {
            ephemeral_name: Some("ephemeral0".into()),
            ..Default::default()
        };
        let mapping = Ec2Provider::to_block_device_mapping("/dev/sdc", &device);
        assert_eq!(mapping.virtual_name(), Some("ephemeral0"));
        assert!(mapping.ebs().is_none());
    }
}
