use anyhow::Context;
use clap::Parser;
use cloudlaunch_orchestrator::cli::{Action, Cli};
use cloudlaunch_orchestrator::descriptor::{DescriptorStore, DEFAULT_DESCRIPTOR_PATTERN};
use cloudlaunch_orchestrator::launcher::{CreateRequest, Launcher, ManageOutcome};
use cloudlaunch_orchestrator::paths::FileLocator;
use cloudlaunch_orchestrator::provider_manager::ProviderManager;
use cloudlaunch_orchestrator::readiness::{ReadinessProber, TcpPortProbe};
use cloudlaunch_orchestrator::regions::RegionRegistry;
use std::sync::Arc;
use tracing::info;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let mut store = DescriptorStore::new(FileLocator::from_env());
    if cli.action == Action::Create {
        if let Some(pattern) = &cli.hosts {
            store = store.with_pattern(pattern.clone());
        }
    }

    let providers = ProviderManager::new(&cli.provider);
    info!(
        provider = %providers.name(),
        available = ?ProviderManager::available(),
        "[main] Provider selected"
    );

    let launcher = Launcher::new(
        RegionRegistry::builtin(),
        store,
        ReadinessProber::new(Arc::new(TcpPortProbe::default())),
        Arc::new(providers),
    );

    match cli.action {
        Action::ShowDefaults => {
            println!(
                "{}",
                launcher.show_defaults().context("formatting defaults")?
            );
        }
        Action::MergeReservations => {
            launcher.merge_reservations(&cli.reservations);
        }
        Action::DistributeH2o | Action::StartH2o | Action::StopH2o => {
            info!(action = cli.action.as_str(), "[main] Action accepted, nothing to do");
        }
        Action::Create => {
            let created = launcher
                .create(&CreateRequest {
                    region: cli.region.clone(),
                    config: cli.config.clone(),
                    instance_count: cli.instances,
                    wait_for_ssh: !cli.no_wait_ssh,
                })
                .await
                .context("create failed")?;
            for command in created.descriptor.login_commands() {
                println!("{}", command);
            }
            println!("Host file: {}", created.path.display());
        }
        Action::Terminate | Action::Stop | Action::Reboot | Action::Start => {
            let action = cli
                .action
                .lifecycle()
                .context("action has no lifecycle counterpart")?;
            let hosts = cli.hosts.clone().with_context(|| {
                format!(
                    "{} needs a host file (-H), e.g. {}",
                    action.as_str(),
                    DEFAULT_DESCRIPTOR_PATTERN
                )
            })?;
            let outcome = launcher
                .manage(action, &hosts)
                .await
                .with_context(|| format!("{} failed for {}", action.as_str(), hosts))?;
            if outcome == ManageOutcome::NothingToTerminate {
                println!("No instances to terminate in {}", hosts);
            }
        }
    }

    Ok(())
}
