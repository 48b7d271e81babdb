//! Fan-out execution of the benchmark step sequence across the host set.
//!
//! Setup steps (prepare, upload, unpack) are bounded and abort the run on
//! the first non-zero exit anywhere; the payload step is unbounded and its
//! outcome is aggregated per host instead.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use futures::future::join_all;
use tracing::info;

use virtfleet_common::hosts::HostMap;
use virtfleet_common::{Error, Result};

use crate::transport::{HostOutput, RemoteTransport};

/// Per-host output buckets of the payload step.
#[derive(Debug, Default)]
pub struct BenchOutcome {
    /// Captured stdout of hosts that exited zero
    pub results: BTreeMap<String, String>,
    /// Captured stderr of hosts that exited non-zero (or never answered)
    pub errors: BTreeMap<String, String>,
}

impl BenchOutcome {
    /// A run failed overall when any host landed in the error bucket.
    pub fn failed(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Drives the benchmark step sequence over a fixed host set through a
/// [`RemoteTransport`].
pub struct Executor<T> {
    transport: T,
    hosts: HostMap,
    step_timeout: Option<Duration>,
}

impl<T: RemoteTransport> Executor<T> {
    pub fn new(transport: T, hosts: HostMap, step_timeout: Option<Duration>) -> Executor<T> {
        Executor {
            transport,
            hosts,
            step_timeout,
        }
    }

    /// Run the full sequence: prepare the payload root, upload and unpack
    /// the archive, then execute it and collect per-host output.
    pub async fn run(&self, payload: &Path, root: &str) -> Result<BenchOutcome> {
        self.run_step("prepare root", &format!("/usr/bin/mkdir -p {}", root))
            .await?;
        let remote_payload = self.upload(payload, root).await?;
        self.run_step(
            "unpack payload",
            &format!("/usr/bin/tar xz -C {} -f {}", root, remote_payload),
        )
        .await?;
        Ok(self.run_payload(root).await)
    }

    /// Fan a command out to every host; the first non-zero exit fails the
    /// step and thereby the run.
    async fn run_step(&self, step: &str, command: &str) -> Result<()> {
        info!(step = step, hosts = self.hosts.len(), "running step");
        let outcomes = self
            .fan_out(true, |address| async move {
                self.transport.run(&address, command).await
            })
            .await;
        ensure_step(step, outcomes)?;
        info!(step = step, "step complete");
        Ok(())
    }

    /// Upload the payload archive to every host, returning the remote path.
    async fn upload(&self, payload: &Path, root: &str) -> Result<String> {
        let file_name = payload
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                Error::validation(format!(
                    "payload path has no file name: {}",
                    payload.display()
                ))
            })?;
        let remote = format!("{}/{}", root, file_name);
        info!("uploading {} -> {}", payload.display(), remote);

        let remote_path = remote.as_str();
        let outcomes = self
            .fan_out(true, |address| async move {
                self.transport.copy(&address, payload, remote_path).await
            })
            .await;
        ensure_step("upload payload", outcomes)?;
        Ok(remote)
    }

    /// Execute the payload everywhere, unbounded, and bucket the output
    /// per host. Transport failures land in the error bucket.
    async fn run_payload(&self, root: &str) -> BenchOutcome {
        let command = format!(
            "cd {root} && /usr/bin/env BENCH_ROOT={root} {root}/payload.sh",
            root = root
        );
        info!(hosts = self.hosts.len(), "running payload");

        let cmd = command.as_str();
        let outcomes = self
            .fan_out(false, |address| async move {
                self.transport.run(&address, cmd).await
            })
            .await;

        let mut outcome = BenchOutcome::default();
        for (host, result) in outcomes {
            match result {
                Ok(output) if output.success() => {
                    outcome.results.insert(host, output.stdout);
                }
                Ok(output) => {
                    outcome.errors.insert(host, output.stderr);
                }
                Err(e) => {
                    outcome.errors.insert(host, e.to_string());
                }
            }
        }
        outcome
    }

    /// Issue one operation per host concurrently and join all outcomes.
    /// `bounded` applies the per-step timeout around each host's future.
    async fn fan_out<F, Fut>(&self, bounded: bool, op: F) -> Vec<(String, Result<HostOutput>)>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<HostOutput>>,
    {
        let limit = if bounded { self.step_timeout } else { None };
        let tasks = self.hosts.iter().map(|(name, address)| {
            let fut = op(address.clone());
            async move {
                let outcome = match limit {
                    Some(limit) => match tokio::time::timeout(limit, fut).await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(Error::command_failed(format!(
                            "timed out after {}s",
                            limit.as_secs()
                        ))),
                    },
                    None => fut.await,
                };
                (name.clone(), outcome)
            }
        });
        join_all(tasks).await
    }
}

/// Classify a bounded step: every host must have answered with exit zero.
fn ensure_step(step: &str, outcomes: Vec<(String, Result<HostOutput>)>) -> Result<()> {
    for (host, outcome) in outcomes {
        match outcome {
            Ok(output) if output.success() => {}
            Ok(output) => {
                return Err(Error::step_failed(step, host, output.stderr.trim()));
            }
            Err(e) => return Err(Error::step_failed(step, host, e.to_string())),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::transport::MockRemoteTransport;

    fn hosts(pairs: &[(&str, &str)]) -> HostMap {
        pairs
            .iter()
            .map(|(name, address)| (name.to_string(), address.to_string()))
            .collect()
    }

    fn exit(code: i32, stdout: &str, stderr: &str) -> HostOutput {
        HostOutput {
            exit_code: code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    fn payload() -> std::path::PathBuf {
        std::path::PathBuf::from("/tmp/payload.tar.gz")
    }

    #[tokio::test]
    async fn full_run_buckets_payload_stdout_per_host() {
        let mut transport = MockRemoteTransport::new();
        transport
            .expect_run()
            .withf(|_, cmd| cmd.starts_with("/usr/bin/mkdir"))
            .returning(|_, _| Ok(exit(0, "", "")));
        transport.expect_copy().returning(|_, _, _| Ok(exit(0, "", "")));
        transport
            .expect_run()
            .withf(|_, cmd| cmd.starts_with("/usr/bin/tar"))
            .returning(|_, _| Ok(exit(0, "", "")));
        transport
            .expect_run()
            .withf(|_, cmd| cmd.contains("payload.sh"))
            .returning(|address, _| Ok(exit(0, &format!("ok from {}", address), "")));

        let executor = Executor::new(
            transport,
            hosts(&[("vm-0", "10.0.0.1"), ("vm-1", "10.0.0.2")]),
            None,
        );
        let outcome = executor.run(&payload(), "/tmp/benchkit").await.expect("run");

        assert!(!outcome.failed());
        assert_eq!(
            outcome.results.get("vm-0").map(String::as_str),
            Some("ok from 10.0.0.1")
        );
        assert_eq!(
            outcome.results.get("vm-1").map(String::as_str),
            Some("ok from 10.0.0.2")
        );
        assert!(outcome.errors.is_empty());
    }

    #[tokio::test]
    async fn setup_step_failure_aborts_before_the_upload() {
        let mut transport = MockRemoteTransport::new();
        transport
            .expect_run()
            .withf(|_, cmd| cmd.starts_with("/usr/bin/mkdir"))
            .returning(|address, _| {
                if address == "10.0.0.2" {
                    Ok(exit(1, "", "mkdir: permission denied"))
                } else {
                    Ok(exit(0, "", ""))
                }
            });
        transport.expect_copy().times(0);

        let executor = Executor::new(
            transport,
            hosts(&[("vm-0", "10.0.0.1"), ("vm-1", "10.0.0.2")]),
            None,
        );
        let err = executor
            .run(&payload(), "/tmp/benchkit")
            .await
            .expect_err("failed mkdir must abort the run");

        match err {
            Error::StepFailed { step, host, detail } => {
                assert_eq!(step, "prepare root");
                assert_eq!(host, "vm-1");
                assert!(detail.contains("permission denied"));
            }
            other => panic!("expected StepFailed, got: {}", other),
        }
    }

    #[tokio::test]
    async fn transport_errors_fail_setup_steps() {
        let mut transport = MockRemoteTransport::new();
        transport.expect_run().returning(|_, _| {
            Err(virtfleet_common::Error::command_failed(
                "connection refused",
            ))
        });
        transport.expect_copy().times(0);

        let executor = Executor::new(transport, hosts(&[("vm-0", "10.0.0.1")]), None);
        let err = executor
            .run(&payload(), "/tmp/benchkit")
            .await
            .expect_err("unreachable host must abort the run");
        assert!(matches!(err, Error::StepFailed { .. }));
    }

    #[tokio::test]
    async fn payload_failures_are_aggregated_not_fatal() {
        let mut transport = MockRemoteTransport::new();
        transport
            .expect_run()
            .withf(|_, cmd| !cmd.contains("payload.sh"))
            .returning(|_, _| Ok(exit(0, "", "")));
        transport.expect_copy().returning(|_, _, _| Ok(exit(0, "", "")));
        transport
            .expect_run()
            .withf(|_, cmd| cmd.contains("payload.sh"))
            .returning(|address, _| {
                if address == "10.0.0.2" {
                    Ok(exit(2, "partial", "bench crashed"))
                } else {
                    Ok(exit(0, "everything OK", ""))
                }
            });

        let executor = Executor::new(
            transport,
            hosts(&[("vm-0", "10.0.0.1"), ("vm-1", "10.0.0.2")]),
            None,
        );
        let outcome = executor.run(&payload(), "/tmp/benchkit").await.expect("run");

        assert!(outcome.failed());
        assert_eq!(
            outcome.results.get("vm-0").map(String::as_str),
            Some("everything OK")
        );
        // failing host contributes stderr, not stdout
        assert_eq!(
            outcome.errors.get("vm-1").map(String::as_str),
            Some("bench crashed")
        );
        assert!(outcome.results.get("vm-1").is_none());
    }

    #[tokio::test]
    async fn unreachable_host_lands_in_the_error_bucket_during_payload() {
        let mut transport = MockRemoteTransport::new();
        transport
            .expect_run()
            .withf(|_, cmd| !cmd.contains("payload.sh"))
            .returning(|_, _| Ok(exit(0, "", "")));
        transport.expect_copy().returning(|_, _, _| Ok(exit(0, "", "")));
        transport
            .expect_run()
            .withf(|_, cmd| cmd.contains("payload.sh"))
            .returning(|_, _| {
                Err(virtfleet_common::Error::command_failed(
                    "connection reset",
                ))
            });

        let executor = Executor::new(transport, hosts(&[("vm-0", "10.0.0.1")]), None);
        let outcome = executor.run(&payload(), "/tmp/benchkit").await.expect("run");

        assert!(outcome.failed());
        assert!(outcome
            .errors
            .get("vm-0")
            .is_some_and(|detail| detail.contains("connection reset")));
    }

    #[tokio::test]
    async fn empty_host_set_is_a_successful_noop() {
        let mut transport = MockRemoteTransport::new();
        transport.expect_run().times(0);
        transport.expect_copy().times(0);

        let executor = Executor::new(transport, HostMap::new(), None);
        let outcome = executor.run(&payload(), "/tmp/benchkit").await.expect("run");
        assert!(!outcome.failed());
        assert!(outcome.results.is_empty());
    }

    /// Transport whose every operation takes far longer than any test bound.
    struct SlowTransport;

    #[async_trait::async_trait]
    impl RemoteTransport for SlowTransport {
        async fn run(&self, _address: &str, _command: &str) -> virtfleet_common::Result<HostOutput> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(exit(0, "", ""))
        }

        async fn copy(
            &self,
            _address: &str,
            _local: &Path,
            _remote: &str,
        ) -> virtfleet_common::Result<HostOutput> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(exit(0, "", ""))
        }
    }

    #[tokio::test]
    async fn slow_hosts_trip_the_step_timeout() {
        let executor = Executor::new(
            SlowTransport,
            hosts(&[("vm-0", "10.0.0.1")]),
            Some(Duration::from_millis(20)),
        );
        let err = executor
            .run(&payload(), "/tmp/benchkit")
            .await
            .expect_err("slow host must trip the bound");

        match err {
            Error::StepFailed { detail, .. } => assert!(detail.contains("timed out")),
            other => panic!("expected StepFailed, got: {}", other),
        }
    }
}
