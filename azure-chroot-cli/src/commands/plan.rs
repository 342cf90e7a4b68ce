use anyhow::Result;
use azure_chroot::azure::InstanceMetadata;
use azure_chroot::Builder;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use crate::cli::GlobalFlags;
use crate::console::ConsoleUi;

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Build configuration (JSON or YAML)
    pub config: PathBuf,

    /// Subscription of the build VM
    #[arg(long, default_value = "00000000-0000-0000-0000-000000000000")]
    pub subscription: String,

    /// Resource group of the build VM
    #[arg(long, default_value = "packer")]
    pub resource_group: String,

    /// Name of the build VM
    #[arg(long, default_value = "buildvm")]
    pub vm_name: String,

    /// Location of the build VM
    #[arg(long, default_value = "westus")]
    pub location: String,

    /// Read the VM identity from the instance metadata service instead
    #[cfg(feature = "imds")]
    #[arg(long, conflicts_with_all = ["subscription", "resource_group", "vm_name", "location"])]
    pub imds: bool,

    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct Plan<'a> {
    vm: &'a InstanceMetadata,
    steps: Vec<&'static str>,
    warnings: Vec<String>,
}

impl PlanArgs {
    #[cfg(feature = "imds")]
    fn wants_imds(&self) -> bool {
        self.imds
    }

    #[cfg(not(feature = "imds"))]
    fn wants_imds(&self) -> bool {
        false
    }

    async fn vm(&self) -> Result<InstanceMetadata> {
        if self.wants_imds() {
            return super::metadata::fetch().await;
        }

        Ok(InstanceMetadata {
            subscription_id: self.subscription.clone(),
            resource_group: self.resource_group.clone(),
            name: self.vm_name.clone(),
            location: self.location.clone(),
            vm_scale_set: None,
        })
    }
}

pub async fn execute(args: PlanArgs, global: &GlobalFlags) -> Result<()> {
    let config = global.load_config(&args.config)?;
    let vm = args.vm().await?;

    let mut builder = Builder::new(config);
    let warnings = builder.prepare()?;

    if args.json {
        let steps = builder.steps(&vm, &azure_chroot::util::TracingUi)?;
        let plan = Plan {
            vm: &vm,
            steps: steps.iter().map(|s| s.name()).collect(),
            warnings,
        };
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    for warning in &warnings {
        eprintln!("Warning: {}", warning);
    }
    let steps = builder.steps(&vm, &ConsoleUi)?;
    println!("Steps on {} ({}):", vm.name, vm.location);
    for (i, step) in steps.iter().enumerate() {
        println!("  {:>2}. {}", i + 1, step.name());
    }
    Ok(())
}
