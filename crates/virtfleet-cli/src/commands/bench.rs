//! `virtfleet bench` - run a benchmark payload over a VM fleet.
//!
//! Consumes the host map produced by `virtfleet env`, validates the auth
//! descriptor, fans the step sequence out over every host and writes the
//! run's report artifact.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use tracing::{error, info};
use uuid::Uuid;

use virtfleet_bench::auth::AuthSpec;
use virtfleet_bench::exec::Executor;
use virtfleet_bench::report::{write_report, Report};
use virtfleet_bench::transport::SshTransport;
use virtfleet_common::{hosts, Error, Result};

/// Run a benchmark payload over a fleet
#[derive(Args, Debug)]
pub struct BenchArgs {
    /// Seconds allowed for each setup step; 0 disables the bound
    #[arg(short = 't', long, default_value_t = 120)]
    pub timeout: u64,

    /// Unique identifier for this run (generated when omitted)
    #[arg(short = 'U', long)]
    pub bench_id: Option<String>,

    /// Host map to run the benchmark on ('-' to read from stdin)
    #[arg(short = 'H', long, default_value = "hosts")]
    pub hosts: String,

    /// Authentication descriptor (JSON)
    #[arg(short = 'A', long, default_value = "auth.json")]
    pub auth_file: PathBuf,

    /// Payload root directory on the benchmarked VMs
    #[arg(short = 'r', long, default_value = "/tmp/benchkit")]
    pub root: String,

    /// Benchmark payload archive, unpacked to expose `payload.sh`
    pub payload: PathBuf,
}

pub async fn run(args: BenchArgs) -> Result<()> {
    let bench_id = args
        .bench_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    info!(run = %bench_id, "benchmark starting");

    // validation first: no connection is attempted on malformed input
    let auth_raw = tokio::fs::read_to_string(&args.auth_file).await?;
    let auth = AuthSpec::parse(&auth_raw)?;

    let host_map = read_hosts(&args.hosts).await?;
    info!(hosts = host_map.len(), "host map loaded");

    let step_timeout = (args.timeout > 0).then(|| Duration::from_secs(args.timeout));
    let executor = Executor::new(SshTransport::new(&auth), host_map, step_timeout);
    let outcome = executor.run(&args.payload, &args.root).await?;

    match write_report(Path::new(&bench_id), &outcome)? {
        Report::Errors(path) => {
            error!(report = %path.display(), "benchmark failed on part of the host set");
            Err(Error::HostsFailed {
                failed: outcome.errors.len(),
            })
        }
        Report::Result(path) => {
            info!(report = %path.display(), "benchmark complete");
            Ok(())
        }
    }
}

async fn read_hosts(source: &str) -> Result<hosts::HostMap> {
    let content = if source == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        tokio::fs::read_to_string(source).await?
    };
    Ok(hosts::parse_hosts(&content))
}
