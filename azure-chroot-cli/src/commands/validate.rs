use anyhow::Result;
use azure_chroot::Builder;
use clap::Args;
use std::path::PathBuf;

use crate::cli::GlobalFlags;

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Build configuration (JSON or YAML)
    pub config: PathBuf,

    /// Print the configuration with defaults filled in
    #[arg(long)]
    pub show: bool,
}

pub async fn execute(args: ValidateArgs, global: &GlobalFlags) -> Result<()> {
    let config = global.load_config(&args.config)?;
    let mut builder = Builder::new(config);
    let warnings = builder.prepare()?;

    for warning in &warnings {
        eprintln!("Warning: {}", warning);
    }

    if args.show {
        println!("{}", serde_json::to_string_pretty(builder.config())?);
    } else {
        println!("{}: configuration is valid", args.config.display());
    }
    Ok(())
}
