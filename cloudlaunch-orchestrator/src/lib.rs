pub mod cli;
pub mod descriptor;
pub mod launcher;
pub mod lifecycle;
pub mod paths;
pub mod provider_manager;
pub mod provisioning;
pub mod readiness;
pub mod regions;
pub mod sizing;
pub mod template;
