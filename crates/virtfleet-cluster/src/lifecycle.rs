//! Fleet lifecycle phases: create, start, host-map output, teardown.
//!
//! Every phase continues past per-item failures; only the readiness wait
//! (delegated to [`crate::poll`]) is allowed to fail the whole run.

use std::time::Duration;

use tracing::{info, warn};

use virtfleet_common::hosts::HostMap;
use virtfleet_common::resources::VmDefinition;
use virtfleet_common::Result;

use crate::client::ResourceClient;
use crate::poll;

/// Bound on the post-teardown wait for launcher pods to disappear.
const GONE_TIMEOUT: Duration = Duration::from_secs(60);

/// Create every definition, returning the subset the control plane
/// accepted. Individual failures are logged and excluded; the batch
/// continues.
pub async fn create_all(
    client: &dyn ResourceClient,
    vm_defs: &[VmDefinition],
) -> Vec<VmDefinition> {
    let mut created = Vec::new();
    for vm_def in vm_defs {
        match client.create_vm(vm_def).await {
            Ok(()) => {
                info!(vm = vm_def.name(), "created");
                created.push(vm_def.clone());
            }
            Err(e) => warn!(vm = vm_def.name(), error = %e, "failed to create"),
        }
    }
    created
}

/// Toggle every created definition to running. A failed toggle is logged
/// and the definition stays in the created set; the readiness wait decides
/// its fate.
pub async fn start_all(client: &dyn ResourceClient, vm_defs: &[VmDefinition]) {
    for vm_def in vm_defs {
        match client.set_running(vm_def.name(), true).await {
            Ok(()) => info!(vm = vm_def.name(), "started"),
            Err(e) => warn!(vm = vm_def.name(), error = %e, "failed to start"),
        }
    }
}

/// Teardown behavior knobs.
#[derive(Debug, Clone, Default)]
pub struct TeardownOpts {
    /// Delete without toggling the definition off first.
    pub force_delete: bool,
}

/// Stop and delete every definition, tolerating per-item failures, then
/// wait (bounded, best effort) for the corresponding launcher pods to
/// disappear.
pub async fn teardown(
    client: &dyn ResourceClient,
    vm_defs: &[VmDefinition],
    opts: &TeardownOpts,
) {
    let mut deleted = Vec::new();
    for vm_def in vm_defs {
        if !opts.force_delete {
            if let Err(e) = client.set_running(vm_def.name(), false).await {
                warn!(vm = vm_def.name(), error = %e, "failed to stop");
            }
        }
        match client.delete_vm(vm_def.name()).await {
            Ok(()) => {
                info!(vm = vm_def.name(), "deleted");
                deleted.push(vm_def.name().to_string());
            }
            Err(e) => warn!(vm = vm_def.name(), error = %e, "cannot delete"),
        }
    }
    wait_gone(client, &deleted).await;
}

/// Best-effort verification that the pods of deleted definitions are gone.
/// Giving up logs a warning; it never fails the teardown.
async fn wait_gone(client: &dyn ResourceClient, names: &[String]) {
    if names.is_empty() {
        return;
    }
    let result = poll::wait_all(
        "deleted VM pods gone",
        names,
        poll::POD_POLL_INTERVAL,
        GONE_TIMEOUT,
        || async move {
            let pods = client.pods().await?;
            let mut snapshot: poll::ReadySnapshot =
                names.iter().map(|name| (name.clone(), true)).collect();
            for pod in &pods {
                if let Some(vm) = pod.vm() {
                    snapshot.insert(vm.to_string(), false);
                }
            }
            Ok(snapshot)
        },
    )
    .await;

    if let Err(e) = result {
        warn!(error = %e, "teardown verification gave up, proceeding");
    }
}

/// Address map of the created fleet, keyed by VM name via the correlation
/// label.
pub async fn host_map(
    client: &dyn ResourceClient,
    vm_defs: &[VmDefinition],
) -> Result<HostMap> {
    let pods = client.pods().await?;
    let mut hosts = HostMap::new();
    for vm_def in vm_defs {
        for pod in &pods {
            if pod.vm() != Some(vm_def.name()) {
                continue;
            }
            match pod.ip() {
                Some(ip) => {
                    hosts.insert(vm_def.name().to_string(), ip.to_string());
                }
                None => warn!(vm = vm_def.name(), "pod has no address yet"),
            }
        }
    }
    Ok(hosts)
}
