use crate::{ComputeProvider, LaunchSpec};
use anyhow::Result;
use async_trait::async_trait;
use cloudlaunch_common::{InstanceState, ProvisionedInstance, Reservation};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// Provider operations that can be made to fail on demand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MockOperation {
    Create,
    Describe,
    Terminate,
    Stop,
    Start,
    Reboot,
}

/// Every call the provider received, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MockCall {
    Create { count: u32 },
    Describe(String),
    Terminate(Vec<String>),
    Stop(Vec<String>),
    Start(Vec<String>),
    Reboot(Vec<String>),
}

struct MockInstance {
    record: ProvisionedInstance,
    // States handed out by successive describe calls; the last one sticks.
    script: VecDeque<InstanceState>,
}

#[derive(Default)]
struct MockState {
    reservations: u32,
    launched: u32,
    instances: BTreeMap<String, MockInstance>,
    scripts: BTreeMap<u32, Vec<InstanceState>>,
    failing: HashSet<MockOperation>,
    calls: Vec<MockCall>,
}

/// In-memory compute API.
///
/// Instances are numbered in launch order starting at 0. Unless a script is
/// registered with [`MockProvider::script_states`], an instance is `pending`
/// when created and `running` on the first describe. Lifecycle calls against
/// unknown ids are accepted and ignored, so a fresh process can still run
/// `terminate` against a descriptor written by an earlier one.
pub struct MockProvider {
    region: String,
    state: Mutex<MockState>,
}

impl MockProvider {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            state: Mutex::new(MockState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sets the states returned by successive describe calls for the
    /// `launch_index`-th instance ever created by this provider.
    pub fn script_states(&self, launch_index: u32, states: Vec<InstanceState>) {
        self.state().scripts.insert(launch_index, states);
    }

    /// Makes every following call of `op` fail like a dropped connection.
    pub fn fail(&self, op: MockOperation) {
        self.state().failing.insert(op);
    }

    pub fn recover(&self, op: MockOperation) {
        self.state().failing.remove(&op);
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    pub fn instance(&self, instance_id: &str) -> Option<ProvisionedInstance> {
        self.state()
            .instances
            .get(instance_id)
            .map(|i| i.record.clone())
    }

    fn check(state: &MockState, op: MockOperation) -> Result<()> {
        if state.failing.contains(&op) {
            anyhow::bail!("mock provider: connection refused during {:?}", op);
        }
        Ok(())
    }

    fn transition(
        &self,
        op: MockOperation,
        call: MockCall,
        instance_ids: &[String],
        target: InstanceState,
    ) -> Result<()> {
        let mut state = self.state();
        state.calls.push(call);
        Self::check(&state, op)?;
        for id in instance_ids {
            if let Some(instance) = state.instances.get_mut(id) {
                instance.record.state = target.clone();
                instance.script.clear();
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ComputeProvider for MockProvider {
    fn region(&self) -> &str {
        &self.region
    }

    async fn create_instances(&self, spec: &LaunchSpec) -> Result<Reservation> {
        let mut state = self.state();
        state.calls.push(MockCall::Create {
            count: spec.max_count,
        });
        Self::check(&state, MockOperation::Create)?;

        state.reservations += 1;
        let reservation_id = format!("r-mock{:04}", state.reservations);
        let mut instances = Vec::with_capacity(spec.max_count as usize);

        for _ in 0..spec.max_count {
            let index = state.launched;
            state.launched += 1;
            let n = state.launched;
            let script = state
                .scripts
                .get(&index)
                .cloned()
                .unwrap_or_else(|| vec![InstanceState::Running]);
            let record = ProvisionedInstance {
                id: format!("i-mock{:04}", n),
                state: InstanceState::Pending,
                public_address: Some(format!("198.51.100.{}", n % 254 + 1)),
                private_address: Some(format!("10.0.0.{}", n % 254 + 1)),
                public_hostname: Some(format!("mock-{}.{}.compute.internal", n, self.region)),
            };
            instances.push(record.clone());
            state.instances.insert(
                record.id.clone(),
                MockInstance {
                    record,
                    script: script.into(),
                },
            );
        }

        Ok(Reservation {
            id: reservation_id,
            instances,
        })
    }

    async fn describe_instance(&self, instance_id: &str) -> Result<ProvisionedInstance> {
        let mut state = self.state();
        state.calls.push(MockCall::Describe(instance_id.to_string()));
        Self::check(&state, MockOperation::Describe)?;

        let instance = state
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| anyhow::anyhow!("mock provider: unknown instance {}", instance_id))?;
        if let Some(next) = instance.script.pop_front() {
            instance.record.state = next;
        }
        Ok(instance.record.clone())
    }

    async fn terminate_instances(&self, instance_ids: &[String]) -> Result<()> {
        self.transition(
            MockOperation::Terminate,
            MockCall::Terminate(instance_ids.to_vec()),
            instance_ids,
            InstanceState::Terminated,
        )
    }

    async fn stop_instances(&self, instance_ids: &[String]) -> Result<()> {
        self.transition(
            MockOperation::Stop,
            MockCall::Stop(instance_ids.to_vec()),
            instance_ids,
            InstanceState::Stopped,
        )
    }

    async fn start_instances(&self, instance_ids: &[String]) -> Result<()> {
        self.transition(
            MockOperation::Start,
            MockCall::Start(instance_ids.to_vec()),
            instance_ids,
            InstanceState::Running,
        )
    }

    async fn reboot_instances(&self, instance_ids: &[String]) -> Result<()> {
        self.transition(
            MockOperation::Reboot,
            MockCall::Reboot(instance_ids.to_vec()),
            instance_ids,
            InstanceState::Running,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(count: u32) -> LaunchSpec {
        LaunchSpec {
            image_id: "ami-test".into(),
            instance_type: "m1.xlarge".into(),
            key_name: "key".into(),
            security_groups: vec!["sg".into()],
            min_count: count,
            max_count: count,
            placement: None,
            user_data: None,
            monitoring_enabled: false,
            subnet_id: None,
            disable_api_termination: false,
            block_device_map: Default::default(),
            instance_initiated_shutdown_behavior: None,
        }
    }

    #[tokio::test]
    async fn create_then_describe_follows_script() {
        let provider = MockProvider::new("us-east-1");
        provider.script_states(
            1,
            vec![InstanceState::Pending, InstanceState::Pending, InstanceState::Running],
        );
        let reservation = provider.create_instances(&spec(2)).await.unwrap();
        assert_eq!(reservation.instances.len(), 2);
        assert!(reservation.instances.iter().all(|i| i.state.is_pending()));

        let first = &reservation.instances[0].id;
        let second = &reservation.instances[1].id;
        assert_eq!(
            provider.describe_instance(first).await.unwrap().state,
            InstanceState::Running
        );
        assert_eq!(
            provider.describe_instance(second).await.unwrap().state,
            InstanceState::Pending
        );
        assert_eq!(
            provider.describe_instance(second).await.unwrap().state,
            InstanceState::Pending
        );
        assert_eq!(
            provider.describe_instance(second).await.unwrap().state,
            InstanceState::Running
        );
        // Script exhausted: last state sticks.
        assert_eq!(
            provider.describe_instance(second).await.unwrap().state,
            InstanceState::Running
        );
    }

    #[tokio::test]
    async fn lifecycle_calls_are_recorded_and_applied() {
        let provider = MockProvider::new("us-east-1");
        let reservation = provider.create_instances(&spec(1)).await.unwrap();
        let ids = reservation.instance_ids();

        provider.stop_instances(&ids).await.unwrap();
        assert_eq!(provider.instance(&ids[0]).unwrap().state, InstanceState::Stopped);
        provider.terminate_instances(&ids).await.unwrap();
        assert_eq!(
            provider.instance(&ids[0]).unwrap().state,
            InstanceState::Terminated
        );

        assert_eq!(
            provider.calls(),
            vec![
                MockCall::Create { count: 1 },
                MockCall::Stop(ids.clone()),
                MockCall::Terminate(ids),
            ]
        );
    }

    #[tokio::test]
    async fn failing_operation_errors_until_recovered() {
        let provider = MockProvider::new("us-east-1");
        provider.fail(MockOperation::Reboot);
        let ids = vec!["i-unknown".to_string()];
        assert!(provider.reboot_instances(&ids).await.is_err());
        provider.recover(MockOperation::Reboot);
        assert!(provider.reboot_instances(&ids).await.is_ok());
    }
}
