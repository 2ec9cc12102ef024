use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

pub const SSH_PORT: u16 = 22;
pub const PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// One reachability check: can we open a TCP connection to `host:port`?
#[async_trait]
pub trait PortProbe: Send + Sync {
    async fn is_live(&self, host: &str, port: u16) -> bool;
}

/// Plain TCP connect with a per-attempt timeout. Nothing is sent.
pub struct TcpPortProbe {
    connect_timeout: Duration,
}

impl Default for TcpPortProbe {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
        }
    }
}

#[async_trait]
impl PortProbe for TcpPortProbe {
    async fn is_live(&self, host: &str, port: u16) -> bool {
        // Strip CIDR suffix if present (e.g. "1.2.3.4/32" -> "1.2.3.4")
        let host = host.split('/').next().unwrap_or(host);
        matches!(
            timeout(self.connect_timeout, TcpStream::connect((host, port))).await,
            Ok(Ok(_))
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbePolicy {
    pub port: u16,
    /// A host that answers the very first attempt is accepted immediately.
    pub skip_if_already_up: bool,
    pub required_consecutive_successes: u32,
}

impl Default for ProbePolicy {
    fn default() -> Self {
        Self {
            port: SSH_PORT,
            skip_if_already_up: true,
            required_consecutive_successes: 3,
        }
    }
}

impl ProbePolicy {
    /// A rebooting host may still answer before it actually goes down, so
    /// nothing is skipped and the streak is longer.
    pub fn after_reboot() -> Self {
        Self {
            port: SSH_PORT,
            skip_if_already_up: false,
            required_consecutive_successes: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostReadiness {
    pub address: String,
    /// Connection attempts made before the host was accepted.
    pub attempts: u32,
}

/// Waits for a service port on each host, one host at a time, in order.
///
/// There is no timeout: a host that never reaches the required streak keeps
/// the caller waiting until the process is killed.
pub struct ReadinessProber {
    probe: Arc<dyn PortProbe>,
    interval: Duration,
}

impl ReadinessProber {
    pub fn new(probe: Arc<dyn PortProbe>) -> Self {
        Self {
            probe,
            interval: PROBE_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub async fn await_reachable(
        &self,
        addresses: &[String],
        policy: &ProbePolicy,
    ) -> Vec<HostReadiness> {
        info!(
            hosts = ?addresses,
            port = policy.port,
            "[readiness] Waiting for service on hosts"
        );
        let mut out = Vec::with_capacity(addresses.len());
        for address in addresses {
            let attempts = self.await_host(address, policy).await;
            out.push(HostReadiness {
                address: address.clone(),
                attempts,
            });
        }
        out
    }

    async fn await_host(&self, address: &str, policy: &ProbePolicy) -> u32 {
        let mut attempts = 0;
        if policy.skip_if_already_up {
            attempts += 1;
            if self.probe.is_live(address, policy.port).await {
                debug!(host = %address, "[readiness] already up");
                return attempts;
            }
        }

        info!(host = %address, "[readiness] Waiting for service on instance {}...", address);
        let mut streak = 0;
        while streak < policy.required_consecutive_successes {
            attempts += 1;
            if self.probe.is_live(address, policy.port).await {
                streak += 1;
            } else {
                streak = 0;
            }
            debug!(host = %address, attempts, streak, "[readiness] probe");
            sleep(self.interval).await;
        }
        attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// Replays per-host outcomes; an exhausted script answers `true`.
    #[derive(Default)]
    struct ScriptedProbe {
        outcomes: Mutex<HashMap<String, VecDeque<bool>>>,
        attempts: Mutex<Vec<String>>,
    }

    impl ScriptedProbe {
        fn with(host: &str, outcomes: &[bool]) -> Self {
            let probe = Self::default();
            probe.add(host, outcomes);
            probe
        }

        fn add(&self, host: &str, outcomes: &[bool]) {
            self.outcomes
                .lock()
                .unwrap()
                .insert(host.to_string(), outcomes.iter().copied().collect());
        }

        fn attempts(&self) -> Vec<String> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PortProbe for ScriptedProbe {
        async fn is_live(&self, host: &str, _port: u16) -> bool {
            self.attempts.lock().unwrap().push(host.to_string());
            self.outcomes
                .lock()
                .unwrap()
                .get_mut(host)
                .and_then(|q| q.pop_front())
                .unwrap_or(true)
        }
    }

    const F: bool = false;
    const T: bool = true;

    #[tokio::test(start_paused = true)]
    async fn failure_resets_the_streak() {
        let probe = Arc::new(ScriptedProbe::with("10.0.0.1", &[F, T, T, F, T, T, T]));
        let prober = ReadinessProber::new(probe.clone());
        let policy = ProbePolicy {
            skip_if_already_up: false,
            ..ProbePolicy::default()
        };

        let started = tokio::time::Instant::now();
        let result = prober
            .await_reachable(&["10.0.0.1".to_string()], &policy)
            .await;
        assert_eq!(result[0].attempts, 7);
        assert_eq!(probe.attempts().len(), 7);
        assert_eq!(started.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn skip_check_counts_as_first_attempt() {
        let probe = Arc::new(ScriptedProbe::with("h", &[F, T, T, F, T, T, T]));
        let prober = ReadinessProber::new(probe.clone());

        let result = prober
            .await_reachable(&["h".to_string()], &ProbePolicy::default())
            .await;
        assert_eq!(result[0].attempts, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn live_host_is_skipped_without_waiting() {
        let probe = Arc::new(ScriptedProbe::with("h", &[T]));
        let prober = ReadinessProber::new(probe.clone());

        let started = tokio::time::Instant::now();
        let result = prober
            .await_reachable(&["h".to_string()], &ProbePolicy::default())
            .await;
        assert_eq!(result[0].attempts, 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn reboot_policy_needs_ten_in_a_row() {
        let probe = Arc::new(ScriptedProbe::with("h", &[T, T, T, F]));
        let prober = ReadinessProber::new(probe.clone());

        let result = prober
            .await_reachable(&["h".to_string()], &ProbePolicy::after_reboot())
            .await;
        // 4 scripted attempts, then 10 successes from the exhausted script.
        assert_eq!(result[0].attempts, 14);
    }

    #[tokio::test(start_paused = true)]
    async fn hosts_are_probed_in_order_one_at_a_time() {
        let probe = Arc::new(ScriptedProbe::default());
        probe.add("a", &[F, T, T, T]);
        probe.add("b", &[T]);
        let prober = ReadinessProber::new(probe.clone());

        let hosts = vec!["a".to_string(), "b".to_string()];
        let result = prober.await_reachable(&hosts, &ProbePolicy::default()).await;
        assert_eq!(result.iter().map(|r| r.attempts).collect::<Vec<_>>(), vec![4, 1]);
        assert_eq!(probe.attempts(), vec!["a", "a", "a", "a", "b"]);
    }
}
