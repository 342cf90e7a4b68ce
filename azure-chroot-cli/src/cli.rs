//! CLI definition and argument parsing for azure-chroot-cli.

use anyhow::Context;
use azure_chroot::BuildConfig;
use clap::{Args, Parser, Subcommand};
use std::path::Path;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "azure-chroot", author, version, about = "Azure chroot image builder")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalFlags,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
#[non_exhaustive]
pub enum Commands {
    /// Check a build configuration and print its warnings
    Validate(crate::commands::validate::ValidateArgs),

    /// Show the steps a configuration would run
    Plan(crate::commands::plan::PlanArgs),

    /// Inspect LVM on an attached disk
    Lvm(crate::commands::lvm::LvmArgs),

    /// Print the identity of the VM this runs on
    Metadata(crate::commands::metadata::MetadataArgs),
}

// ============================================================================
// GLOBAL FLAGS
// ============================================================================

#[derive(Args, Debug, Clone)]
pub struct GlobalFlags {
    /// Enable debug output
    #[arg(long, global = true)]
    pub debug: bool,

    /// Command wrapper template for host commands, e.g. "sudo {{.Command}}"
    #[arg(long, global = true, env = "AZURE_CHROOT_COMMAND_WRAPPER")]
    pub command_wrapper: Option<String>,
}

impl GlobalFlags {
    /// Load a JSON or YAML build configuration.
    pub fn load_config(&self, path: &Path) -> anyhow::Result<BuildConfig> {
        let mut config = BuildConfig::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        if let Some(wrapper) = &self.command_wrapper {
            if config.command_wrapper.is_empty() {
                config.command_wrapper = wrapper.clone();
            }
        }
        Ok(config)
    }
}
