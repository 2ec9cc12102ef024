use crate::template::ProvisioningTemplate;
use cloudlaunch_common::{CloudLaunchError, InstanceState, ProvisionedInstance, Reservation, Result};
use cloudlaunch_providers::ComputeProvider;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

pub const STATE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A reservation whose instances all reached `running`.
#[derive(Debug, Clone)]
pub struct Provisioned {
    pub reservation: Reservation,
    /// Time from the create call returning to the last instance running.
    pub elapsed: Duration,
}

/// Requests instances and waits for them to run.
///
/// Polling has no upper bound: a provider that keeps reporting `pending`
/// blocks the caller until the process is killed.
pub struct ProvisioningEngine<'a> {
    provider: &'a dyn ComputeProvider,
    poll_interval: Duration,
}

impl<'a> ProvisioningEngine<'a> {
    pub fn new(provider: &'a dyn ComputeProvider) -> Self {
        Self {
            provider,
            poll_interval: STATE_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub async fn request_instances(
        &self,
        template: &ProvisioningTemplate,
        count: u32,
    ) -> Result<Provisioned> {
        let spec = template.launch_spec(count);
        let mut reservation = self
            .provider
            .create_instances(&spec)
            .await
            .map_err(|e| CloudLaunchError::provider("create_instances", e))?;

        info!(
            reservation_id = %reservation.id,
            instances = ?reservation.instance_ids(),
            "[provisioning] Waiting for {} instances to come up, this can take 1-2 minutes",
            reservation.instances.len()
        );

        let start = Instant::now();
        if let Err(err) = self.wait_until_running(&mut reservation).await {
            error!(reservation_id = %reservation.id, "[provisioning] {}", err);
            self.compensate(&reservation).await;
            return Err(err);
        }
        let elapsed = start.elapsed();

        info!(
            reservation_id = %reservation.id,
            "[provisioning] Instances started in {:.1} seconds",
            elapsed.as_secs_f64()
        );
        for instance in &reservation.instances {
            info!(
                "[provisioning]    {} ({}) : public ip: {}, private ip: {}",
                instance.public_hostname.as_deref().unwrap_or("-"),
                instance.id,
                instance.public_address.as_deref().unwrap_or("-"),
                instance.private_address.as_deref().unwrap_or("-"),
            );
        }

        Ok(Provisioned {
            reservation,
            elapsed,
        })
    }

    async fn wait_until_running(&self, reservation: &mut Reservation) -> Result<()> {
        if reservation.instances.is_empty() {
            return Err(CloudLaunchError::EmptyTargetSet { action: "provision" });
        }

        for instance in reservation.instances.iter_mut() {
            let mut current = self.describe(&instance.id).await?;
            while current.state.is_pending() {
                debug!(instance_id = %instance.id, "[provisioning] still pending");
                sleep(self.poll_interval).await;
                current = self.describe(&instance.id).await?;
            }
            *instance = current;

            if instance.state != InstanceState::Running {
                return Err(CloudLaunchError::Provisioning {
                    instance_id: instance.id.clone(),
                    state: instance.state.to_string(),
                });
            }
        }
        Ok(())
    }

    async fn describe(&self, instance_id: &str) -> Result<ProvisionedInstance> {
        self.provider
            .describe_instance(instance_id)
            .await
            .map_err(|e| CloudLaunchError::provider("describe_instance", e))
    }

    /// Best-effort terminate of the whole reservation. Failures are logged only.
    pub(crate) async fn compensate(&self, reservation: &Reservation) {
        let ids = reservation.instance_ids();
        if ids.is_empty() {
            return;
        }
        warn!(
            reservation_id = %reservation.id,
            instances = ?ids,
            "[provisioning] Terminating partial reservation"
        );
        if let Err(e) = self.provider.terminate_instances(&ids).await {
            error!(
                reservation_id = %reservation.id,
                instances = ?ids,
                "[provisioning] Compensating terminate failed, instances may still be running: {:#}",
                e
            );
        }
    }
}
