//! Command-line interface definitions.

use crate::lifecycle::LifecycleAction;
use crate::provider_manager::ProviderManager;
use crate::regions::{DEFAULT_INSTANCE_COUNT, DEFAULT_REGION};
use clap::{Parser, ValueEnum};

/// Launch and manage a transient EC2 cluster
#[derive(Parser, Debug)]
#[command(name = "cloudlaunch")]
#[command(version)]
pub struct Cli {
    /// Action to run
    #[arg(value_enum)]
    pub action: Action,

    /// JSON file with template overrides
    #[arg(short, long)]
    pub config: Option<String>,

    /// Number of instances to launch
    #[arg(short, long, default_value_t = DEFAULT_INSTANCE_COUNT)]
    pub instances: u32,

    /// Host file to act on (create: file name pattern, `{reservation_id}` is substituted)
    #[arg(short = 'H', long)]
    pub hosts: Option<String>,

    /// Region to launch in
    #[arg(short, long, default_value = DEFAULT_REGION)]
    pub region: String,

    /// Reservation ids for merge-reservations
    #[arg(long, value_delimiter = ',')]
    pub reservations: Vec<String>,

    /// Compute provider (defaults to ec2 when built with it)
    #[arg(long, env = "PROVIDER", default_value = ProviderManager::default_name())]
    pub provider: String,

    /// Do not wait for ssh on freshly created instances
    #[arg(long)]
    pub no_wait_ssh: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Launch instances and write the host file
    Create,
    /// Terminate instances and delete the host file
    Terminate,
    /// Stop instances
    Stop,
    /// Reboot instances and wait for ssh
    Reboot,
    /// Start stopped instances
    Start,
    /// Print region defaults
    #[value(alias = "show_defaults")]
    ShowDefaults,
    /// Accepted for compatibility, does nothing
    #[value(alias = "merge_reservations")]
    MergeReservations,
    /// Accepted for compatibility, does nothing
    #[value(name = "distribute-h2o", alias = "distribute_h2o")]
    DistributeH2o,
    /// Accepted for compatibility, does nothing
    #[value(name = "start-h2o", alias = "start_h2o")]
    StartH2o,
    /// Accepted for compatibility, does nothing
    #[value(name = "stop-h2o", alias = "stop_h2o")]
    StopH2o,
}

impl Action {
    pub fn lifecycle(&self) -> Option<LifecycleAction> {
        match self {
            Action::Terminate => Some(LifecycleAction::Terminate),
            Action::Stop => Some(LifecycleAction::Stop),
            Action::Reboot => Some(LifecycleAction::Reboot),
            Action::Start => Some(LifecycleAction::Start),
            Action::Create
            | Action::ShowDefaults
            | Action::MergeReservations
            | Action::DistributeH2o
            | Action::StartH2o
            | Action::StopH2o => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Terminate => "terminate",
            Action::Stop => "stop",
            Action::Reboot => "reboot",
            Action::Start => "start",
            Action::ShowDefaults => "show-defaults",
            Action::MergeReservations => "merge-reservations",
            Action::DistributeH2o => "distribute-h2o",
            Action::StartH2o => "start-h2o",
            Action::StopH2o => "stop-h2o",
        }
    }
}
