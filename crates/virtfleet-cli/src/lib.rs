//! virtfleet CLI library
//!
//! `env` drives the fleet lifecycle against a cluster; `bench` runs a
//! payload over an already-provisioned host set.

pub mod commands;

pub use virtfleet_common::{Error, Result};

use clap::{Parser, Subcommand};

/// virtfleet - VM fleet setup/teardown and benchmarking
#[derive(Parser, Debug)]
#[command(name = "virtfleet")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Provision, boot and tear down a fleet of VMs on a cluster
    Env(commands::env::EnvArgs),
    /// Run a benchmark payload over a fleet and collect per-host results
    Bench(commands::bench::BenchArgs),
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Env(args) => commands::env::run(args).await,
            Commands::Bench(args) => commands::bench::run(args).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_defaults_match_the_documented_surface() {
        let cli = Cli::try_parse_from(["virtfleet", "env", "vm.yaml"]).expect("parse");
        let Commands::Env(args) = cli.command else {
            panic!("expected env subcommand");
        };
        assert_eq!(args.instances, 1);
        assert_eq!(args.command, "kubectl");
        assert_eq!(args.timeout, 120);
        assert_eq!(args.image, "disk.qcow2");
        assert_eq!(args.endpoint, "http://images.kube.lan");
        assert_eq!(args.hosts_file, "hosts");
        assert!(!args.setup_only && !args.teardown_only && !args.provision_only);
    }

    #[test]
    fn env_mode_flags_parse_short_forms() {
        let cli = Cli::try_parse_from(["virtfleet", "env", "-N", "3", "-T", "vm.yaml"])
            .expect("parse");
        let Commands::Env(args) = cli.command else {
            panic!("expected env subcommand");
        };
        assert_eq!(args.instances, 3);
        assert!(args.teardown_only);
    }

    #[test]
    fn setup_only_and_teardown_only_conflict() {
        assert!(Cli::try_parse_from(["virtfleet", "env", "-S", "-T", "vm.yaml"]).is_err());
    }

    #[test]
    fn bench_defaults_match_the_documented_surface() {
        let cli =
            Cli::try_parse_from(["virtfleet", "bench", "payload.tar.gz"]).expect("parse");
        let Commands::Bench(args) = cli.command else {
            panic!("expected bench subcommand");
        };
        assert_eq!(args.timeout, 120);
        assert_eq!(args.bench_id, None);
        assert_eq!(args.hosts, "hosts");
        assert_eq!(args.auth_file.to_str(), Some("auth.json"));
        assert_eq!(args.root, "/tmp/benchkit");
    }

    #[test]
    fn bench_accepts_an_explicit_run_id() {
        let cli = Cli::try_parse_from([
            "virtfleet",
            "bench",
            "-U",
            "run-42",
            "payload.tar.gz",
        ])
        .expect("parse");
        let Commands::Bench(args) = cli.command else {
            panic!("expected bench subcommand");
        };
        assert_eq!(args.bench_id.as_deref(), Some("run-42"));
    }
}
