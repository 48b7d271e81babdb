//! Resource client: a thin wrapper over the cluster control-plane CLI.
//!
//! Four operations are needed: create, delete, patch (running toggle), and
//! list-as-JSON. Everything is funneled through the configured executable
//! (`kubectl` by default) so the tool works against any CLI with a
//! compatible surface.

use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use virtfleet_common::resources::{PodRecord, PvcRecord, Resource, VmDefinition};
use virtfleet_common::{Error, Result};

/// Control-plane operations the fleet needs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Submit a VM definition for creation.
    async fn create_vm(&self, vm: &VmDefinition) -> Result<()>;

    /// Submit a storage claim for creation.
    async fn create_pvc(&self, pvc: &PvcRecord) -> Result<()>;

    /// Delete a VM definition by name.
    async fn delete_vm(&self, name: &str) -> Result<()>;

    /// Toggle a VM definition's running state.
    async fn set_running(&self, name: &str, running: bool) -> Result<()>;

    /// Fetch the current pod collection.
    async fn pods(&self) -> Result<Vec<PodRecord>>;

    /// Fetch the current storage claim collection.
    async fn pvcs(&self) -> Result<Vec<PvcRecord>>;
}

/// Production client shelling out to the control-plane CLI.
pub struct CtlClient {
    exe: String,
}

impl CtlClient {
    pub fn new(exe: impl Into<String>) -> CtlClient {
        CtlClient { exe: exe.into() }
    }

    /// Pipe a resource body into `<exe> <action> -f -`.
    async fn submit(&self, action: &str, name: &str, body: &[u8]) -> Result<()> {
        let mut child = Command::new(&self.exe)
            .args([action, "-f", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(body).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(Error::command_failed(format!(
                "{} {} failed: {}",
                action,
                name,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        debug!(action = action, name = name, "control plane accepted");
        Ok(())
    }

    /// Run `<exe> <args..>` and require success.
    async fn run(&self, args: &[&str]) -> Result<()> {
        let output = Command::new(&self.exe).args(args).output().await?;
        if !output.status.success() {
            return Err(Error::command_failed(format!(
                "{} {} failed: {}",
                self.exe,
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    /// Fetch a resource collection as JSON.
    async fn get_list(&self, kind: &str) -> Result<Value> {
        let output = Command::new(&self.exe)
            .args(["get", kind, "-o", "json"])
            .output()
            .await?;
        if !output.status.success() {
            return Err(Error::command_failed(format!(
                "get {} failed: {}",
                kind,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

/// Pull the items of a list document, keeping only the expected kind.
fn list_items(mut doc: Value, expected_kind: &str) -> Vec<Value> {
    match doc.get_mut("items").map(Value::take) {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter(|item| item.get("kind").and_then(Value::as_str) == Some(expected_kind))
            .collect(),
        _ => Vec::new(),
    }
}

#[async_trait]
impl ResourceClient for CtlClient {
    async fn create_vm(&self, vm: &VmDefinition) -> Result<()> {
        self.submit("create", vm.name(), &vm.to_wire()?).await
    }

    async fn create_pvc(&self, pvc: &PvcRecord) -> Result<()> {
        self.submit("create", pvc.name(), &pvc.to_wire()?).await
    }

    async fn delete_vm(&self, name: &str) -> Result<()> {
        self.run(&["delete", VmDefinition::KIND, name]).await
    }

    async fn set_running(&self, name: &str, running: bool) -> Result<()> {
        let patch = format!("{{\"spec\":{{\"running\":{}}}}}", running);
        self.run(&[
            "patch",
            VmDefinition::KIND,
            name,
            "--type",
            "merge",
            "-p",
            patch.as_str(),
        ])
        .await
    }

    async fn pods(&self) -> Result<Vec<PodRecord>> {
        let doc = self.get_list("pods").await?;
        Ok(list_items(doc, "Pod")
            .into_iter()
            .filter_map(|item| match PodRecord::from_value(item) {
                Ok(pod) => Some(pod),
                Err(e) => {
                    debug!(error = %e, "skipping malformed pod record");
                    None
                }
            })
            .collect())
    }

    async fn pvcs(&self) -> Result<Vec<PvcRecord>> {
        let doc = self.get_list(PvcRecord::KIND).await?;
        Ok(list_items(doc, "PersistentVolumeClaim")
            .into_iter()
            .filter_map(|item| match PvcRecord::from_value(item) {
                Ok(pvc) => Some(pvc),
                Err(e) => {
                    debug!(error = %e, "skipping malformed claim record");
                    None
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_items_filters_foreign_kinds() {
        let doc = json!({
            "items": [
                {"kind": "Pod", "metadata": {"name": "a"}},
                {"kind": "Service", "metadata": {"name": "b"}},
                {"kind": "Pod", "metadata": {"name": "c"}},
            ],
        });
        let items = list_items(doc, "Pod");
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn list_items_tolerates_missing_items() {
        assert!(list_items(json!({}), "Pod").is_empty());
        assert!(list_items(json!({"items": null}), "Pod").is_empty());
    }
}
