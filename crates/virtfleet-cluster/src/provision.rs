//! Storage claim derivation for a batch of VM definitions.
//!
//! Only the designated root volume of each definition is eligible; the
//! existing-claim snapshot is taken once for the whole batch (see DESIGN.md
//! for the race this deliberately preserves).

use std::collections::HashSet;

use tracing::{info, warn};

use virtfleet_common::resources::{PvcRecord, VmDefinition};
use virtfleet_common::Result;

use crate::client::ResourceClient;

/// Where provisioned claims import their disk image from.
#[derive(Debug, Clone)]
pub struct ImageSource {
    /// HTTP endpoint serving images
    pub endpoint: String,
    /// Image file name under the endpoint
    pub image: String,
}

/// Create the storage claims the definitions need that are not already
/// present.
///
/// Returns only the newly created claims - exactly the set the caller must
/// wait on before starting the fleet. Re-running with every claim already
/// present creates nothing and returns an empty set.
pub async fn provision(
    client: &dyn ResourceClient,
    vm_defs: &[VmDefinition],
    source: &ImageSource,
) -> Result<Vec<PvcRecord>> {
    let existing: HashSet<String> = client
        .pvcs()
        .await?
        .iter()
        .map(|pvc| pvc.name().to_string())
        .collect();
    info!(
        "provision: start ({} claims already present)",
        existing.len()
    );

    let mut created = Vec::new();
    for vm_def in vm_defs {
        for volume in vm_def.volumes() {
            if !volume.is_root() {
                warn!(
                    vm = vm_def.name(),
                    volume = %volume.name,
                    "provision: ignoring volume (not rootvolume)"
                );
                continue;
            }
            let Some(claim_name) = volume.claim_name.as_deref() else {
                warn!(
                    vm = vm_def.name(),
                    volume = %volume.name,
                    "provision: volume has no persistent volume claim"
                );
                continue;
            };
            if existing.contains(claim_name) {
                info!(
                    vm = vm_def.name(),
                    claim = claim_name,
                    "provision: claim already present, skipped"
                );
                continue;
            }

            info!(
                vm = vm_def.name(),
                claim = claim_name,
                "provision: creating claim"
            );
            let pvc = PvcRecord::new_import(claim_name, &source.endpoint, &source.image);
            client.create_pvc(&pvc).await?;
            created.push(pvc);
        }
    }

    info!("provision: done ({} claims created)", created.len());
    Ok(created)
}
