use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use smc_client::ovf::{NodeConfig, OvfEnvironment};

#[derive(Args)]
pub struct BootstrapArgs {
    /// OVF environment file injected by the hypervisor
    #[arg(long, default_value = "/var/opt/ovf-env.xml")]
    ovf: PathBuf,

    /// Node configuration script to run
    #[arg(long, default_value = "/usr/lib/smc/configure-node")]
    script: PathBuf,

    /// Print the configuration command without running it
    #[arg(long)]
    dry_run: bool,
}

pub fn execute(args: &BootstrapArgs) -> Result<()> {
    let environment = OvfEnvironment::from_file(&args.ovf)?;
    let config = NodeConfig::from_environment(&environment)?;

    if args.dry_run {
        println!(
            "{} {}",
            args.script.display(),
            config.script_args().join(" ")
        );
        return Ok(());
    }

    config.apply(&args.script)
}
