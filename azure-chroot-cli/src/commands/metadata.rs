use anyhow::Result;
use azure_chroot::azure::InstanceMetadata;
use clap::Args;

use crate::cli::GlobalFlags;

#[derive(Args, Debug)]
pub struct MetadataArgs {
    /// Only print the resource id of the VM
    #[arg(short, long)]
    pub quiet: bool,
}

#[cfg(feature = "imds")]
pub async fn fetch() -> Result<InstanceMetadata> {
    use azure_chroot::azure::imds::ImdsClient;
    use azure_chroot::azure::MetadataSource;

    Ok(ImdsClient::new()?.instance().await?)
}

#[cfg(not(feature = "imds"))]
pub async fn fetch() -> Result<InstanceMetadata> {
    anyhow::bail!("azure-chroot was built without instance metadata support (feature \"imds\")")
}

pub async fn execute(args: MetadataArgs, _global: &GlobalFlags) -> Result<()> {
    let vm = fetch().await?;

    if args.quiet {
        match vm.vmss_vm_id() {
            Some(id) => println!("{}", id),
            None => println!("{}", vm.vm_id()),
        }
        return Ok(());
    }

    println!("{}", serde_json::to_string_pretty(&vm)?);
    Ok(())
}
