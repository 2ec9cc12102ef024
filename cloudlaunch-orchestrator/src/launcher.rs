//! Wires the create path and the manage path together.
//!
//! create: template -> preflight -> provision -> readiness -> descriptor
//! manage: descriptor -> lifecycle action -> (terminate) delete descriptor

use crate::descriptor::{ClusterDescriptor, DescriptorStore};
use crate::lifecycle::{LifecycleAction, LifecycleController};
use crate::provider_manager::ProviderSource;
use crate::provisioning::ProvisioningEngine;
use crate::readiness::{HostReadiness, ProbePolicy, ReadinessProber};
use crate::regions::{RegionRegistry, DEFAULT_INSTANCE_COUNT};
use crate::template::{self, ProvisioningTemplate};
use cloudlaunch_common::{CloudLaunchError, Reservation, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub region: String,
    /// Overrides file, resolved with the file-search rule.
    pub config: Option<String>,
    pub instance_count: u32,
    pub wait_for_ssh: bool,
}

#[derive(Debug, Clone)]
pub struct CreatedCluster {
    pub path: PathBuf,
    pub descriptor: ClusterDescriptor,
    pub readiness: Vec<HostReadiness>,
    pub startup: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManageOutcome {
    Applied,
    /// Terminate on a descriptor without instances. The file is kept.
    NothingToTerminate,
}

pub struct Launcher {
    registry: RegionRegistry,
    store: DescriptorStore,
    prober: ReadinessProber,
    providers: Arc<dyn ProviderSource>,
}

impl Launcher {
    pub fn new(
        registry: RegionRegistry,
        store: DescriptorStore,
        prober: ReadinessProber,
        providers: Arc<dyn ProviderSource>,
    ) -> Self {
        Self {
            registry,
            store,
            prober,
            providers,
        }
    }

    pub fn store(&self) -> &DescriptorStore {
        &self.store
    }

    pub fn resolve_template(&self, region: &str, config: Option<&str>) -> Result<ProvisioningTemplate> {
        let overrides = template::load_overrides(self.store.locator(), config)?;
        template::resolve(&self.registry, region, &overrides)
    }

    pub async fn create(&self, request: &CreateRequest) -> Result<CreatedCluster> {
        let template = self.resolve_template(&request.region, request.config.as_deref())?;
        let settings = self.store.preflight(&template)?;
        info!(
            region = %template.profile.region,
            instance_type = %template.profile.instance_type,
            heap_size_gb = settings.heap_size_gb,
            "[launcher] Using template {}",
            template.profile.image_id
        );

        let provider = self.providers.connect(&template.profile.region).await?;
        let engine = ProvisioningEngine::new(provider.as_ref());
        let provisioned = engine
            .request_instances(&template, request.instance_count)
            .await?;
        let reservation = provisioned.reservation;

        let readiness = if request.wait_for_ssh {
            self.prober
                .await_reachable(&login_addresses(&reservation), &ProbePolicy::default())
                .await
        } else {
            Vec::new()
        };

        let written = self
            .store
            .build(&template, &reservation)
            .and_then(|descriptor| Ok((self.store.write(&descriptor)?, descriptor)));
        let (path, descriptor) = match written {
            Ok(written) => written,
            Err(err) => {
                error!(
                    reservation_id = %reservation.id,
                    "[launcher] Could not record the cluster: {}",
                    err
                );
                engine.compensate(&reservation).await;
                return Err(err);
            }
        };

        Ok(CreatedCluster {
            path,
            descriptor,
            readiness,
            startup: provisioned.elapsed,
        })
    }

    pub async fn manage(&self, action: LifecycleAction, hosts: impl AsRef<Path>) -> Result<ManageOutcome> {
        let path = self.store.locate(hosts)?;
        let descriptor = self.store.load(&path)?;
        info!(
            path = %path.display(),
            reservation_id = %descriptor.reservation_id,
            "[launcher] {} cluster from host file",
            action.as_str()
        );

        let provider = self.providers.connect(&descriptor.region).await?;
        let controller = LifecycleController::new(provider.as_ref(), &self.prober);
        match controller.apply(action, &descriptor).await {
            Ok(()) => {}
            Err(CloudLaunchError::EmptyTargetSet { .. }) if action == LifecycleAction::Terminate => {
                warn!(path = %path.display(), "[launcher] No instances to terminate, keeping host file");
                return Ok(ManageOutcome::NothingToTerminate);
            }
            Err(err) => return Err(err),
        }

        if action == LifecycleAction::Terminate {
            self.store.delete(&path)?;
        }
        Ok(ManageOutcome::Applied)
    }

    /// Region table, default count and supported regions, formatted for stdout.
    pub fn show_defaults(&self) -> serde_json::Result<String> {
        Ok(format!(
            "Config: {}\nDefault number of instances: {}\nSupported regions: {}",
            serde_json::to_string_pretty(&self.registry)?,
            DEFAULT_INSTANCE_COUNT,
            self.registry.regions().join(", ")
        ))
    }

    pub fn merge_reservations(&self, reservations: &[String]) {
        info!(
            reservations = ?reservations,
            "[launcher] merge-reservations is accepted but does nothing"
        );
    }
}

/// Public addresses where every instance has one, private otherwise.
/// Instances with neither are logged and not probed.
fn login_addresses(reservation: &Reservation) -> Vec<String> {
    let public: Option<Vec<String>> = reservation
        .instances
        .iter()
        .map(|i| i.public_address.clone())
        .collect();
    if let Some(public) = public {
        return public;
    }
    reservation
        .instances
        .iter()
        .filter_map(|i| {
            if i.private_address.is_none() {
                warn!(
                    reservation_id = %reservation.id,
                    instance_id = %i.id,
                    "[launcher] Instance {} has no address, not waiting for it",
                    i.id
                );
            }
            i.private_address.clone()
        })
        .collect()
}
