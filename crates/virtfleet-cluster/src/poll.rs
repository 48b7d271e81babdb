//! Bounded readiness polling over freshly fetched control-plane state.
//!
//! The generic loop re-fetches the full live collection every cycle and
//! partitions a fixed target set into ready/waiting; it never trusts a
//! stale snapshot. Items absent from the live collection count as waiting.

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use virtfleet_common::{Error, Result};

use crate::client::ResourceClient;

/// Poll interval while waiting for VM pods; pods settle quickly.
pub const POD_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Poll interval while waiting for storage imports; imports move slowly.
pub const IMPORT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Readiness snapshot of the live collection, keyed by correlated name.
pub type ReadySnapshot = HashMap<String, bool>;

/// Block until every target reports ready, re-fetching the collection each
/// cycle.
///
/// Succeeds as soon as no target is waiting - on the first cycle for an
/// empty target set - and fails with [`Error::WaitTimeout`] once the
/// configured bound elapses first. A fetch error is logged and treated as
/// an all-waiting cycle; the bound on total elapsed time still applies.
pub async fn wait_all<F, Fut>(
    what: &str,
    targets: &[String],
    interval: Duration,
    timeout: Duration,
    mut fetch: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<ReadySnapshot>>,
{
    let start = Instant::now();

    loop {
        let snapshot = match fetch().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "failed to fetch state for {}, still waiting", what);
                ReadySnapshot::new()
            }
        };

        let ready = targets
            .iter()
            .filter(|name| snapshot.get(name.as_str()).copied().unwrap_or(false))
            .count();

        if ready == targets.len() {
            info!("{}/{} {}", ready, targets.len(), what);
            return Ok(());
        }

        if start.elapsed() >= timeout {
            return Err(Error::wait_timeout(what, timeout));
        }

        info!("{}/{} {}, waiting...", ready, targets.len(), what);
        tokio::time::sleep(interval).await;
    }
}

/// Wait until every named VM has a ready launcher pod.
///
/// Correlation is an exact match on the pod's VM label; a pod that merely
/// contains the VM name in its own name does not count.
pub async fn wait_vms_ready(
    client: &dyn ResourceClient,
    vm_names: &[String],
    timeout: Duration,
) -> Result<()> {
    wait_all("VMs ready", vm_names, POD_POLL_INTERVAL, timeout, || {
        async move {
            let pods = client.pods().await?;
            let mut snapshot = ReadySnapshot::new();
            for pod in &pods {
                if let Some(vm) = pod.vm() {
                    snapshot.insert(vm.to_string(), pod.ready());
                }
            }
            Ok(snapshot)
        }
    })
    .await
}

/// Wait until every named storage claim reports a completed import.
pub async fn wait_imports_done(
    client: &dyn ResourceClient,
    claim_names: &[String],
    timeout: Duration,
) -> Result<()> {
    wait_all(
        "storage imports complete",
        claim_names,
        IMPORT_POLL_INTERVAL,
        timeout,
        || async move {
            let pvcs = client.pvcs().await?;
            Ok(pvcs
                .iter()
                .map(|pvc| (pvc.name().to_string(), pvc.import_succeeded()))
                .collect())
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use serde_json::json;

    use virtfleet_common::resources::{PodRecord, IMPORT_PHASE_ANNOTATION};
    use virtfleet_common::VM_LABEL;

    use crate::client::MockResourceClient;

    const TICK: Duration = Duration::from_millis(5);
    const BOUND: Duration = Duration::from_millis(40);

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn empty_target_set_succeeds_on_the_first_cycle() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_seen = calls.clone();

        wait_all("VMs ready", &[], TICK, BOUND, || {
            let calls = calls_seen.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(ReadySnapshot::new())
            }
        })
        .await
        .expect("empty set should succeed");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_once_every_target_is_ready() {
        let cycle = Arc::new(AtomicU32::new(0));
        let cycle_seen = cycle.clone();
        let targets = names(&["a", "b"]);

        wait_all("VMs ready", &targets, TICK, BOUND, || {
            let cycle = cycle_seen.clone();
            async move {
                let n = cycle.fetch_add(1, Ordering::SeqCst);
                let mut snapshot = ReadySnapshot::new();
                snapshot.insert("a".to_string(), true);
                // b only turns ready on the third cycle
                snapshot.insert("b".to_string(), n >= 2);
                Ok(snapshot)
            }
        })
        .await
        .expect("should succeed once b is ready");

        assert!(cycle.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn times_out_when_a_target_never_turns_ready() {
        let targets = names(&["a"]);
        let err = wait_all("VMs ready", &targets, TICK, BOUND, || async {
            let mut snapshot = ReadySnapshot::new();
            snapshot.insert("a".to_string(), false);
            Ok(snapshot)
        })
        .await
        .expect_err("should time out");

        assert!(matches!(err, Error::WaitTimeout { .. }));
    }

    #[tokio::test]
    async fn target_absent_from_the_collection_keeps_waiting() {
        let targets = names(&["missing"]);
        let err = wait_all("VMs ready", &targets, TICK, BOUND, || async {
            // live collection only knows about other items
            let mut snapshot = ReadySnapshot::new();
            snapshot.insert("other".to_string(), true);
            Ok(snapshot)
        })
        .await
        .expect_err("absent target should never match");

        assert!(matches!(err, Error::WaitTimeout { .. }));
    }

    #[tokio::test]
    async fn fetch_errors_count_as_waiting_cycles() {
        let cycle = Arc::new(AtomicU32::new(0));
        let cycle_seen = cycle.clone();
        let targets = names(&["a"]);

        wait_all("VMs ready", &targets, TICK, BOUND, || {
            let cycle = cycle_seen.clone();
            async move {
                if cycle.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(virtfleet_common::Error::command_failed("get pods failed"))
                } else {
                    let mut snapshot = ReadySnapshot::new();
                    snapshot.insert("a".to_string(), true);
                    Ok(snapshot)
                }
            }
        })
        .await
        .expect("should recover after the failed fetch");
    }

    fn pod(name: &str, vm_label: Option<&str>, ready: bool) -> PodRecord {
        let mut labels = serde_json::Map::new();
        if let Some(vm) = vm_label {
            labels.insert(VM_LABEL.to_string(), json!(vm));
        }
        PodRecord::from_value(json!({
            "metadata": {"name": name, "labels": labels},
            "status": {"containerStatuses": [{"ready": ready}]},
        }))
        .expect("pod record")
    }

    #[tokio::test]
    async fn vm_wait_matches_pods_by_label() {
        let mut client = MockResourceClient::new();
        client.expect_pods().returning(|| {
            Ok(vec![pod(
                "virt-launcher-testvm-0-abcde",
                Some("testvm-0"),
                true,
            )])
        });

        wait_vms_ready(&client, &names(&["testvm-0"]), BOUND)
            .await
            .expect("labelled ready pod should satisfy the wait");
    }

    #[tokio::test]
    async fn vm_wait_ignores_name_substring_matches() {
        let mut client = MockResourceClient::new();
        // pod name contains the VM name but carries no correlation label
        client
            .expect_pods()
            .returning(|| Ok(vec![pod("virt-launcher-testvm-0-abcde", None, true)]));

        let err = wait_vms_ready(&client, &names(&["testvm-0"]), BOUND)
            .await
            .expect_err("unlabelled pod must not satisfy the wait");
        assert!(matches!(err, Error::WaitTimeout { .. }));
    }

    #[tokio::test]
    async fn import_wait_matches_claims_by_exact_name() {
        let mut client = MockResourceClient::new();
        client.expect_pvcs().returning(|| {
            Ok(vec![virtfleet_common::resources::PvcRecord::from_value(
                json!({
                    "metadata": {
                        "name": "rootdisk-0",
                        "annotations": {IMPORT_PHASE_ANNOTATION: "Succeeded"},
                    },
                }),
            )
            .expect("claim record")])
        });

        wait_imports_done(&client, &names(&["rootdisk-0"]), BOUND)
            .await
            .expect("succeeded import should satisfy the wait");
    }
}
