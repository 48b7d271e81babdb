//! `virtfleet env` - VM environment setup/teardown against a cluster.
//!
//! Default flow: provision storage, wait for imports, create and start the
//! fleet, wait for readiness, dump the host map, block until Ctrl-C, then
//! tear everything down. The mode flags cut that flow short.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use tracing::info;

use virtfleet_cluster::client::CtlClient;
use virtfleet_cluster::lifecycle::{self, TeardownOpts};
use virtfleet_cluster::poll;
use virtfleet_cluster::provision::{provision, ImageSource};
use virtfleet_common::resources::VmDefinition;
use virtfleet_common::{hosts, yaml, Result};

/// Set up or tear down a fleet of VMs
#[derive(Args, Debug)]
pub struct EnvArgs {
    /// Number of VMs to run
    #[arg(short = 'N', long, default_value_t = 1)]
    pub instances: u32,

    /// Command used to control the cluster
    #[arg(short = 'c', long, default_value = "kubectl")]
    pub command: String,

    /// Stop after the setup step, leaving the fleet running
    #[arg(short = 'S', long, conflicts_with = "teardown_only")]
    pub setup_only: bool,

    /// Perform only the teardown step
    #[arg(short = 'T', long)]
    pub teardown_only: bool,

    /// Perform only the storage provisioning step
    #[arg(short = 'P', long, conflicts_with = "teardown_only")]
    pub provision_only: bool,

    /// Seconds to wait for imports and for the fleet to come up; 0 disables
    /// the waits
    #[arg(short = 't', long, default_value_t = 120)]
    pub timeout: u64,

    /// Disk image to import when provisioning claims
    #[arg(short = 'i', long, default_value = "disk.qcow2")]
    pub image: String,

    /// HTTP endpoint serving the disk image
    #[arg(short = 'e', long, default_value = "http://images.kube.lan")]
    pub endpoint: String,

    /// Where to save hosts information ('-' for stdout)
    #[arg(short = 'H', long, default_value = "hosts")]
    pub hosts_file: String,

    /// During teardown, delete definitions without stopping them first
    #[arg(long)]
    pub force_delete: bool,

    /// VM definition template
    pub template: PathBuf,
}

pub async fn run(args: EnvArgs) -> Result<()> {
    let client = CtlClient::new(args.command.as_str());

    let raw = tokio::fs::read_to_string(&args.template).await?;
    let master = VmDefinition::from_template(yaml::parse_yaml(&raw)?)?;
    let vm_defs = (0..args.instances)
        .map(|index| master.instantiate(index))
        .collect::<Result<Vec<_>>>()?;
    info!("{} VM definitions", vm_defs.len());

    let teardown_opts = TeardownOpts {
        force_delete: args.force_delete,
    };

    if args.teardown_only {
        lifecycle::teardown(&client, &vm_defs, &teardown_opts).await;
        return Ok(());
    }

    let timeout = Duration::from_secs(args.timeout);
    let source = ImageSource {
        endpoint: args.endpoint.clone(),
        image: args.image.clone(),
    };

    let created_claims = provision(&client, &vm_defs, &source).await?;
    if args.timeout > 0 && !created_claims.is_empty() {
        let claim_names: Vec<String> = created_claims
            .iter()
            .map(|claim| claim.name().to_string())
            .collect();
        poll::wait_imports_done(&client, &claim_names, timeout).await?;
    }
    if args.provision_only {
        return Ok(());
    }

    let created = lifecycle::create_all(&client, &vm_defs).await;
    lifecycle::start_all(&client, &created).await;

    if args.timeout > 0 {
        let vm_names: Vec<String> = created.iter().map(|vm| vm.name().to_string()).collect();
        poll::wait_vms_ready(&client, &vm_names, timeout).await?;
    }

    if args.setup_only {
        info!("environment set up, leaving the fleet running");
        return Ok(());
    }

    let host_map = lifecycle::host_map(&client, &created).await?;
    write_hosts(&args.hosts_file, &host_map)?;

    info!("environment ready - press CTRL-C to tear down");
    tokio::signal::ctrl_c().await?;
    info!("shutting down environment");

    lifecycle::teardown(&client, &created, &teardown_opts).await;
    Ok(())
}

fn write_hosts(dest: &str, host_map: &hosts::HostMap) -> Result<()> {
    if dest == "-" {
        hosts::dump_hosts(host_map, &mut std::io::stdout())
    } else {
        let mut file = std::fs::File::create(dest)?;
        hosts::dump_hosts(host_map, &mut file)
    }
}
