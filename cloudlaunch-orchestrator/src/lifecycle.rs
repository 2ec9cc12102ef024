use crate::descriptor::ClusterDescriptor;
use crate::readiness::{ProbePolicy, ReadinessProber};
use cloudlaunch_common::{CloudLaunchError, Result};
use cloudlaunch_providers::ComputeProvider;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleAction {
    Terminate,
    Stop,
    Start,
    Reboot,
}

impl LifecycleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleAction::Terminate => "terminate",
            LifecycleAction::Stop => "stop",
            LifecycleAction::Start => "start",
            LifecycleAction::Reboot => "reboot",
        }
    }
}

/// Runs lifecycle actions against the instances of a loaded descriptor.
///
/// Provider failures are returned as-is, nothing is retried. A descriptor
/// with no instances is rejected before the provider is called.
pub struct LifecycleController<'a> {
    provider: &'a dyn ComputeProvider,
    prober: &'a ReadinessProber,
}

impl<'a> LifecycleController<'a> {
    pub fn new(provider: &'a dyn ComputeProvider, prober: &'a ReadinessProber) -> Self {
        Self { provider, prober }
    }

    pub async fn apply(&self, action: LifecycleAction, descriptor: &ClusterDescriptor) -> Result<()> {
        match action {
            LifecycleAction::Terminate => self.terminate(descriptor).await,
            LifecycleAction::Stop => self.stop(descriptor).await,
            LifecycleAction::Start => self.start(descriptor).await,
            LifecycleAction::Reboot => self.reboot(descriptor).await,
        }
    }

    /// The caller deletes the descriptor file once this returns `Ok`.
    pub async fn terminate(&self, descriptor: &ClusterDescriptor) -> Result<()> {
        let ids = self.targets(LifecycleAction::Terminate, descriptor)?;
        info!(region = %descriptor.region, "[lifecycle] Terminating instances {:?}.", ids);
        self.provider
            .terminate_instances(&ids)
            .await
            .map_err(|e| CloudLaunchError::provider("terminate_instances", e))?;
        info!("[lifecycle] Done");
        Ok(())
    }

    /// No readiness probe: stopped hosts are not expected to answer.
    pub async fn stop(&self, descriptor: &ClusterDescriptor) -> Result<()> {
        let ids = self.targets(LifecycleAction::Stop, descriptor)?;
        info!(region = %descriptor.region, "[lifecycle] Stopping instances {:?}.", ids);
        self.provider
            .stop_instances(&ids)
            .await
            .map_err(|e| CloudLaunchError::provider("stop_instances", e))?;
        info!("[lifecycle] Done");
        Ok(())
    }

    /// The descriptor's addresses are left as they are.
    pub async fn start(&self, descriptor: &ClusterDescriptor) -> Result<()> {
        let ids = self.targets(LifecycleAction::Start, descriptor)?;
        info!(region = %descriptor.region, "[lifecycle] Starting instances {:?}.", ids);
        self.provider
            .start_instances(&ids)
            .await
            .map_err(|e| CloudLaunchError::provider("start_instances", e))?;
        warn!(
            reservation_id = %descriptor.reservation_id,
            "[lifecycle] Restarted instances may have new addresses; the host file is not updated"
        );
        info!("[lifecycle] Done");
        Ok(())
    }

    pub async fn reboot(&self, descriptor: &ClusterDescriptor) -> Result<()> {
        let ids = self.targets(LifecycleAction::Reboot, descriptor)?;
        info!(region = %descriptor.region, "[lifecycle] Rebooting instances {:?}.", ids);
        self.provider
            .reboot_instances(&ids)
            .await
            .map_err(|e| CloudLaunchError::provider("reboot_instances", e))?;
        info!("[lifecycle] Done");
        self.prober
            .await_reachable(&descriptor.private_addresses, &ProbePolicy::after_reboot())
            .await;
        Ok(())
    }

    fn targets(&self, action: LifecycleAction, descriptor: &ClusterDescriptor) -> Result<Vec<String>> {
        let ids = descriptor.instance_ids();
        if ids.is_empty() {
            return Err(CloudLaunchError::EmptyTargetSet {
                action: action.as_str(),
            });
        }
        if self.provider.region() != descriptor.region {
            warn!(
                provider_region = %self.provider.region(),
                descriptor_region = %descriptor.region,
                "[lifecycle] Provider region differs from the host file region"
            );
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::InstanceRecord;
    use crate::readiness::PortProbe;
    use async_trait::async_trait;
    use cloudlaunch_providers::mock::{MockCall, MockOperation, MockProvider};
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct CountingProbe {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl PortProbe for CountingProbe {
        async fn is_live(&self, _host: &str, _port: u16) -> bool {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    fn descriptor(ids: &[&str]) -> ClusterDescriptor {
        ClusterDescriptor {
            credentials_path: PathBuf::from("/creds"),
            username: "0xdiag".into(),
            key_file: PathBuf::from("/key.pem"),
            nodes_per_host: 1,
            heap_size_gb: 11,
            runtime_args: "-XX:MaxDirectMemorySize=1g".into(),
            base_port: 54321,
            private_addresses: ids.iter().map(|id| format!("10.1.{}", id)).collect(),
            instances: ids
                .iter()
                .map(|id| InstanceRecord {
                    id: id.to_string(),
                    private_address: Some(format!("10.1.{}", id)),
                    public_address: None,
                    public_hostname: None,
                })
                .collect(),
            reservation_id: "r-1".into(),
            region: "us-east-1".into(),
            redirect_imports_to_storage: true,
            annotations: BTreeMap::new(),
        }
    }

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn actions_call_the_matching_provider_operation() {
        let provider = MockProvider::new("us-east-1");
        let probe = Arc::new(CountingProbe::default());
        let prober = ReadinessProber::new(probe.clone());
        let controller = LifecycleController::new(&provider, &prober);
        let d = descriptor(&["i-1", "i-2"]);

        controller.apply(LifecycleAction::Stop, &d).await.unwrap();
        controller.apply(LifecycleAction::Start, &d).await.unwrap();
        controller.apply(LifecycleAction::Terminate, &d).await.unwrap();
        assert_eq!(
            provider.calls(),
            vec![
                MockCall::Stop(ids(&["i-1", "i-2"])),
                MockCall::Start(ids(&["i-1", "i-2"])),
                MockCall::Terminate(ids(&["i-1", "i-2"])),
            ]
        );
        // Only reboot probes.
        assert_eq!(probe.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reboot_reprobes_every_host_strictly() {
        let provider = MockProvider::new("us-east-1");
        let probe = Arc::new(CountingProbe::default());
        let prober = ReadinessProber::new(probe.clone());
        let controller = LifecycleController::new(&provider, &prober);

        controller.reboot(&descriptor(&["i-1", "i-2"])).await.unwrap();
        assert_eq!(provider.calls(), vec![MockCall::Reboot(ids(&["i-1", "i-2"]))]);
        // No skip check, ten successes per host.
        assert_eq!(probe.attempts.load(Ordering::SeqCst), 20);
    }

    #[tokio::test]
    async fn empty_descriptor_never_reaches_the_provider() {
        let provider = MockProvider::new("us-east-1");
        let prober = ReadinessProber::new(Arc::new(CountingProbe::default()));
        let controller = LifecycleController::new(&provider, &prober);
        let d = descriptor(&[]);

        for action in [
            LifecycleAction::Terminate,
            LifecycleAction::Stop,
            LifecycleAction::Start,
            LifecycleAction::Reboot,
        ] {
            let err = controller.apply(action, &d).await.unwrap_err();
            assert!(matches!(
                err,
                CloudLaunchError::EmptyTargetSet { action: a } if a == action.as_str()
            ));
        }
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn provider_failure_is_not_retried() {
        let provider = MockProvider::new("us-east-1");
        provider.fail(MockOperation::Terminate);
        let prober = ReadinessProber::new(Arc::new(CountingProbe::default()));
        let controller = LifecycleController::new(&provider, &prober);

        let err = controller.terminate(&descriptor(&["i-1"])).await.unwrap_err();
        assert!(matches!(
            err,
            CloudLaunchError::ProviderConnection { operation: "terminate_instances", .. }
        ));
        assert_eq!(provider.calls().len(), 1);
    }
}
