use anyhow::{Result, anyhow};
use azure_chroot::lvm::{LvmDiscovery, LvmTools, validate_root_device_override};
use azure_chroot::util::HostCommandRunner;
use clap::{Args, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::cli::GlobalFlags;
use crate::console::ConsoleUi;

#[derive(Args, Debug)]
pub struct LvmArgs {
    #[command(subcommand)]
    pub command: LvmCommand,
}

#[derive(Subcommand, Debug)]
pub enum LvmCommand {
    /// Detect LVM on a block device and report the root logical volume
    Detect {
        /// Block device of the attached disk, e.g. /dev/sdc
        device: String,

        /// Leave the volume groups active afterwards
        #[arg(long)]
        keep_active: bool,
    },

    /// Print the volume group and logical volume behind a device path
    Resolve {
        /// Device path, e.g. /dev/mapper/rootvg-rootlv
        path: String,
    },
}

pub async fn execute(args: LvmArgs, _global: &GlobalFlags) -> Result<()> {
    match args.command {
        LvmCommand::Detect {
            device,
            keep_active,
        } => detect(&device, keep_active).await,
        LvmCommand::Resolve { path } => resolve(&path).await,
    }
}

async fn detect(device: &str, keep_active: bool) -> Result<()> {
    let runner = HostCommandRunner;
    let ui = ConsoleUi;
    let cancel = CancellationToken::new();

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let tools = LvmTools::new(&runner);
    let discovery = LvmDiscovery::new(tools, &ui, &cancel);

    let groups = discovery.find_volume_groups(device).await?;
    if groups.is_empty() {
        println!("{}: no LVM volume groups found", device);
        return Ok(());
    }

    discovery.activate(&groups).await?;
    let selected = discovery.select_root(&groups).await;

    if !keep_active {
        if let Err(e) = tools.deactivate(&groups).await {
            tracing::warn!("Failed to deactivate {}: {}", groups.join(", "), e);
        }
    }

    let root = selected?;
    println!("volume groups: {}", groups.join(", "));
    println!("root device:   {}", root);
    Ok(())
}

async fn resolve(path: &str) -> Result<()> {
    validate_root_device_override(path).map_err(|e| anyhow!(e))?;

    let runner = HostCommandRunner;
    let (vg, lv) = LvmTools::new(&runner)
        .resolve_vg_lv(path)
        .await
        .ok_or_else(|| anyhow!("cannot determine the volume group of '{}'", path))?;
    println!("{}/{}", vg, lv);
    Ok(())
}
