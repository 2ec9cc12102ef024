//! Cluster descriptor: the JSON file handed to the workload harness and read
//! back by every later lifecycle action.

use crate::paths::FileLocator;
use crate::sizing::{self, AUX_RUNTIME_ARGS, BASE_PORT};
use crate::template::ProvisioningTemplate;
use cloudlaunch_common::{CloudLaunchError, ProvisionedInstance, Reservation, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// `{reservation_id}` is replaced by the reservation id. `{0}` is accepted too.
pub const DEFAULT_DESCRIPTOR_PATTERN: &str = "ec2-config-{reservation_id}.json";

const LOGIN_COMMAND_PREFIX: &str = "ec2_comment_ssh_";

/// Workload nodes started on each host by the harness.
pub const NODES_PER_HOST: u32 = 1;

fn default_nodes_per_host() -> u32 {
    NODES_PER_HOST
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct InstanceRecord {
    pub id: String,
    #[serde(rename = "private_ip_address")]
    pub private_address: Option<String>,
    #[serde(rename = "public_ip_address")]
    pub public_address: Option<String>,
    #[serde(rename = "public_dns_name")]
    pub public_hostname: Option<String>,
}

impl From<&ProvisionedInstance> for InstanceRecord {
    fn from(instance: &ProvisionedInstance) -> Self {
        Self {
            id: instance.id.clone(),
            private_address: instance.private_address.clone(),
            public_address: instance.public_address.clone(),
            public_hostname: instance.public_hostname.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ClusterDescriptor {
    #[serde(rename = "aws_credentials")]
    pub credentials_path: PathBuf,
    pub username: String,
    #[serde(rename = "key_filename")]
    pub key_file: PathBuf,
    #[serde(rename = "h2o_per_host", default = "default_nodes_per_host")]
    pub nodes_per_host: u32,
    #[serde(rename = "java_heap_GB")]
    pub heap_size_gb: u32,
    #[serde(rename = "java_extra_args")]
    pub runtime_args: String,
    pub base_port: u16,
    #[serde(rename = "ip")]
    pub private_addresses: Vec<String>,
    #[serde(rename = "ec2_instances")]
    pub instances: Vec<InstanceRecord>,
    #[serde(rename = "ec2_reservation_id")]
    pub reservation_id: String,
    #[serde(rename = "ec2_region")]
    pub region: String,
    #[serde(rename = "redirect_import_folder_to_s3_path")]
    pub redirect_imports_to_storage: bool,
    /// Login commands (`ec2_comment_ssh_<n>`) and any other keys we do not model.
    #[serde(flatten)]
    pub annotations: BTreeMap<String, serde_json::Value>,
}

impl ClusterDescriptor {
    pub fn instance_ids(&self) -> Vec<String> {
        self.instances.iter().map(|i| i.id.clone()).collect()
    }

    /// Informational login commands, in instance order.
    pub fn login_commands(&self) -> Vec<String> {
        let mut indexed: Vec<(usize, String)> = self
            .annotations
            .iter()
            .filter_map(|(k, v)| {
                let idx = k.strip_prefix(LOGIN_COMMAND_PREFIX)?.parse().ok()?;
                Some((idx, v.as_str()?.to_string()))
            })
            .collect();
        indexed.sort_by_key(|(idx, _)| *idx);
        indexed.into_iter().map(|(_, cmd)| cmd).collect()
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let mut seen = HashSet::new();
        for instance in &self.instances {
            if !seen.insert(instance.id.as_str()) {
                return Err(CloudLaunchError::MalformedDescriptor {
                    path: path.to_path_buf(),
                    reason: format!("duplicate instance id {}", instance.id),
                });
            }
        }
        Ok(())
    }
}

/// Values derived from the template alone. Computing them before any
/// instance exists lets a bad key path or instance type fail early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSettings {
    pub credentials_path: PathBuf,
    pub key_file: PathBuf,
    pub heap_size_gb: u32,
}

pub struct DescriptorStore {
    locator: FileLocator,
    pattern: String,
}

impl DescriptorStore {
    pub fn new(locator: FileLocator) -> Self {
        Self {
            locator,
            pattern: DEFAULT_DESCRIPTOR_PATTERN.to_string(),
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }

    pub fn locator(&self) -> &FileLocator {
        &self.locator
    }

    pub fn descriptor_path(&self, reservation_id: &str) -> PathBuf {
        PathBuf::from(
            self.pattern
                .replace("{reservation_id}", reservation_id)
                .replace("{0}", reservation_id),
        )
    }

    pub fn preflight(&self, template: &ProvisioningTemplate) -> Result<ClusterSettings> {
        Ok(ClusterSettings {
            credentials_path: self.locator.locate(&template.profile.credentials_file)?,
            key_file: self.locator.locate(&template.profile.key_file)?,
            heap_size_gb: sizing::heap_size_gb(&template.profile.instance_type)?,
        })
    }

    pub fn build(
        &self,
        template: &ProvisioningTemplate,
        reservation: &Reservation,
    ) -> Result<ClusterDescriptor> {
        let settings = self.preflight(template)?;
        let username = template.profile.username.clone();

        let mut annotations = BTreeMap::new();
        for (idx, instance) in reservation.instances.iter().enumerate() {
            let address = instance
                .public_address
                .as_deref()
                .or(instance.private_address.as_deref())
                .unwrap_or(&instance.id);
            annotations.insert(
                format!("{}{}", LOGIN_COMMAND_PREFIX, idx + 1),
                serde_json::Value::String(format!(
                    "ssh -i {} {}@{}",
                    settings.key_file.display(),
                    username,
                    address
                )),
            );
        }

        Ok(ClusterDescriptor {
            credentials_path: settings.credentials_path,
            username,
            key_file: settings.key_file,
            nodes_per_host: NODES_PER_HOST,
            heap_size_gb: settings.heap_size_gb,
            runtime_args: AUX_RUNTIME_ARGS.to_string(),
            base_port: BASE_PORT,
            private_addresses: private_addresses(reservation),
            instances: reservation.instances.iter().map(InstanceRecord::from).collect(),
            reservation_id: reservation.id.clone(),
            region: template.profile.region.clone(),
            redirect_imports_to_storage: true,
            annotations,
        })
    }

    /// Writes the descriptor for `reservation` and returns its path.
    pub fn save(
        &self,
        template: &ProvisioningTemplate,
        reservation: &Reservation,
    ) -> Result<PathBuf> {
        let descriptor = self.build(template, reservation)?;
        self.write(&descriptor)
    }

    pub fn write(&self, descriptor: &ClusterDescriptor) -> Result<PathBuf> {
        let path = self.descriptor_path(&descriptor.reservation_id);
        write_atomic(&path, descriptor)?;
        info!(path = %path.display(), "[descriptor] Host config dumped into {}", path.display());
        Ok(path)
    }

    /// Resolves `path` with the file-search rule.
    pub fn locate(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        self.locator.locate(path)
    }

    pub fn load(&self, path: impl AsRef<Path>) -> Result<ClusterDescriptor> {
        let found = self.locate(path)?;
        let raw = fs::read_to_string(&found).map_err(|e| CloudLaunchError::io(&found, e))?;
        let descriptor: ClusterDescriptor =
            serde_json::from_str(&raw).map_err(|e| CloudLaunchError::MalformedDescriptor {
                path: found.clone(),
                reason: e.to_string(),
            })?;
        descriptor.validate(&found)?;
        Ok(descriptor)
    }

    pub fn delete(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "[descriptor] Deleting {} host file.", path.display());
        fs::remove_file(path).map_err(|e| CloudLaunchError::io(path, e))
    }
}

// An instance without a private address cannot be addressed by the harness;
// it stays in `ec2_instances` but is left out of `ip`.
fn private_addresses(reservation: &Reservation) -> Vec<String> {
    reservation
        .instances
        .iter()
        .filter_map(|i| {
            if i.private_address.is_none() {
                warn!(
                    reservation_id = %reservation.id,
                    instance_id = %i.id,
                    "[descriptor] Instance {} has no private address, left out of the ip list",
                    i.id
                );
            }
            i.private_address.clone()
        })
        .collect()
}

// Readers never see a half-written file: write a sibling temp file, sync, rename.
fn write_atomic(path: &Path, descriptor: &ClusterDescriptor) -> Result<()> {
    let json = serde_json::to_string_pretty(descriptor).map_err(|e| {
        CloudLaunchError::MalformedDescriptor {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| CloudLaunchError::io(parent, e))?;
    }

    let temp_path = path.with_extension("tmp");
    let cleanup_and_err = |e: std::io::Error| {
        let _ = fs::remove_file(&temp_path);
        CloudLaunchError::io(path, e)
    };

    let mut file = fs::File::create(&temp_path).map_err(|e| CloudLaunchError::io(&temp_path, e))?;
    file.write_all(json.as_bytes()).map_err(cleanup_and_err)?;
    file.sync_all().map_err(cleanup_and_err)?;
    fs::rename(&temp_path, path).map_err(cleanup_and_err)?;
    Ok(())
}
