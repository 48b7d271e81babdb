//! Typed records for the cluster resources the tools touch.
//!
//! Records wrap the `serde_json::Value` fetched from the control-plane CLI
//! (`get <kind> -o json`) or built from a user template. Each writable kind
//! implements [`Resource`]: a name for CLI arguments and a wire form for
//! `create -f -`.

use serde_json::{json, Map, Value};

use crate::{Error, Result, VM_LABEL};

/// Volume name designating the bootable root disk of a VM definition. Only
/// this volume is eligible for automatic storage provisioning.
pub const ROOT_VOLUME: &str = "rootvolume";

/// Annotation carrying the storage import source URL on a claim.
pub const IMPORT_ENDPOINT_ANNOTATION: &str = "cdi.kubevirt.io/storage.import.endpoint";
/// Annotation naming the secret for the import source; always left empty.
pub const IMPORT_SECRET_ANNOTATION: &str = "cdi.kubevirt.io/storage.import.secretName";
/// Annotation reporting the import pod phase on a claim.
pub const IMPORT_PHASE_ANNOTATION: &str = "cdi.kubevirt.io/storage.pod.phase";
/// Terminal phase value of a completed import.
pub const IMPORT_SUCCEEDED: &str = "Succeeded";

/// Minimal capability of resources submitted to the control plane.
pub trait Resource {
    /// Resource kind as passed to the control-plane CLI.
    const KIND: &'static str;

    /// Resource name (`metadata.name`).
    fn name(&self) -> &str;

    /// Wire form accepted by the control-plane CLI (`create -f -`).
    fn to_wire(&self) -> Result<Vec<u8>>;
}

fn name_of(def: &Value, what: &str) -> Result<String> {
    def.pointer("/metadata/name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::validation(format!("{} has no metadata.name", what)))
}

/// Get-or-insert an object-valued member, erroring when the parent is not
/// an object.
fn ensure_member<'a>(value: &'a mut Value, key: &str) -> Result<&'a mut Value> {
    let obj = value
        .as_object_mut()
        .ok_or_else(|| Error::validation(format!("expected a mapping around '{}'", key)))?;
    Ok(obj
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new())))
}

/// A named, templated VM workload descriptor.
#[derive(Debug, Clone)]
pub struct VmDefinition {
    name: String,
    def: Value,
}

impl VmDefinition {
    /// Wrap a parsed template, validating that it names itself.
    pub fn from_template(def: Value) -> Result<VmDefinition> {
        let name = name_of(&def, "VM template")?;
        Ok(VmDefinition { name, def })
    }

    /// Clone the master definition into the instance `<base>-<index>`.
    ///
    /// The root volume's claim name is rewritten with the same index so each
    /// instance provisions its own claim, and the correlation label is
    /// stamped into the pod template metadata so launcher pods can be
    /// matched back to this definition exactly.
    pub fn instantiate(&self, index: u32) -> Result<VmDefinition> {
        let mut def = self.def.clone();
        let name = format!("{}-{}", self.name, index);

        let metadata = ensure_member(&mut def, "metadata")?;
        metadata
            .as_object_mut()
            .ok_or_else(|| Error::validation("metadata is not a mapping"))?
            .insert("name".to_string(), Value::String(name.clone()));

        if let Some(volumes) = def
            .pointer_mut("/spec/template/spec/volumes")
            .and_then(Value::as_array_mut)
        {
            for volume in volumes {
                if volume.get("name").and_then(Value::as_str) != Some(ROOT_VOLUME) {
                    continue;
                }
                let Some(claim) = volume
                    .get_mut("persistentVolumeClaim")
                    .and_then(Value::as_object_mut)
                else {
                    continue;
                };
                let rewritten = claim
                    .get("claimName")
                    .and_then(Value::as_str)
                    .filter(|existing| !existing.is_empty())
                    .map(|existing| format!("{}-{}", existing, index));
                if let Some(rewritten) = rewritten {
                    claim.insert("claimName".to_string(), Value::String(rewritten));
                }
            }
        }

        let spec = ensure_member(&mut def, "spec")?;
        let template = ensure_member(spec, "template")?;
        let template_meta = ensure_member(template, "metadata")?;
        let labels = ensure_member(template_meta, "labels")?;
        labels
            .as_object_mut()
            .ok_or_else(|| Error::validation("spec.template.metadata.labels is not a mapping"))?
            .insert(VM_LABEL.to_string(), Value::String(name.clone()));

        Ok(VmDefinition { name, def })
    }

    /// Definition name (`metadata.name`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Volumes owned by this definition, in template order.
    pub fn volumes(&self) -> Vec<Volume> {
        self.def
            .pointer("/spec/template/spec/volumes")
            .and_then(Value::as_array)
            .map(|volumes| volumes.iter().filter_map(Volume::from_value).collect())
            .unwrap_or_default()
    }

    /// The designated root volume, when present.
    pub fn root_volume(&self) -> Option<Volume> {
        self.volumes().into_iter().find(|volume| volume.is_root())
    }
}

impl Resource for VmDefinition {
    const KIND: &'static str = "virtualmachine";

    fn name(&self) -> &str {
        &self.name
    }

    fn to_wire(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.def)?)
    }
}

/// Typed view over one entry of a definition's volume list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    /// Volume name within the definition
    pub name: String,
    /// Referenced storage claim, when the volume carries one
    pub claim_name: Option<String>,
}

impl Volume {
    fn from_value(value: &Value) -> Option<Volume> {
        let name = value.get("name")?.as_str()?.to_string();
        let claim_name = value
            .get("persistentVolumeClaim")
            .and_then(|claim| claim.get("claimName"))
            .and_then(Value::as_str)
            .filter(|claim| !claim.is_empty())
            .map(str::to_string);
        Some(Volume { name, claim_name })
    }

    /// Whether this is the designated root volume.
    pub fn is_root(&self) -> bool {
        self.name == ROOT_VOLUME
    }
}

/// A storage claim record, observed or about to be created.
#[derive(Debug, Clone)]
pub struct PvcRecord {
    name: String,
    def: Value,
}

impl PvcRecord {
    /// Wrap a record fetched from the control plane.
    pub fn from_value(def: Value) -> Result<PvcRecord> {
        let name = name_of(&def, "storage claim")?;
        Ok(PvcRecord { name, def })
    }

    /// Build a fresh claim that imports its content from
    /// `<endpoint>/<image>`.
    pub fn new_import(name: &str, endpoint: &str, image: &str) -> PvcRecord {
        let def = json!({
            "apiVersion": "v1",
            "kind": "PersistentVolumeClaim",
            "metadata": {
                "name": name,
                "labels": {
                    "app": "containerized-data-importer",
                },
                "annotations": {
                    IMPORT_ENDPOINT_ANNOTATION: format!("{}/{}", endpoint, image),
                    IMPORT_SECRET_ANNOTATION: "",
                },
            },
            "spec": {
                "accessModes": ["ReadWriteOnce"],
                "resources": {
                    "requests": {
                        "storage": "10Gi",
                    },
                },
            },
        });
        PvcRecord {
            name: name.to_string(),
            def,
        }
    }

    /// Claim name (`metadata.name`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a metadata annotation.
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.def
            .pointer("/metadata/annotations")
            .and_then(|annotations| annotations.get(key))
            .and_then(Value::as_str)
    }

    /// Current import phase, when reported.
    pub fn import_phase(&self) -> Option<&str> {
        self.annotation(IMPORT_PHASE_ANNOTATION)
    }

    /// Whether the out-of-band import reached its terminal success phase.
    pub fn import_succeeded(&self) -> bool {
        self.import_phase() == Some(IMPORT_SUCCEEDED)
    }
}

impl Resource for PvcRecord {
    const KIND: &'static str = "pvc";

    fn name(&self) -> &str {
        &self.name
    }

    fn to_wire(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.def)?)
    }
}

/// A pod record, read-only and refreshed on every poll cycle.
#[derive(Debug, Clone)]
pub struct PodRecord {
    name: String,
    def: Value,
}

impl PodRecord {
    /// Wrap a record fetched from the control plane.
    pub fn from_value(def: Value) -> Result<PodRecord> {
        let name = name_of(&def, "pod")?;
        Ok(PodRecord { name, def })
    }

    /// Pod name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Assigned pod address, once the pod has one.
    pub fn ip(&self) -> Option<&str> {
        self.def.pointer("/status/podIP").and_then(Value::as_str)
    }

    /// Lifecycle phase string.
    pub fn phase(&self) -> Option<&str> {
        self.def.pointer("/status/phase").and_then(Value::as_str)
    }

    /// All containers ready. A pod with no reported container statuses is
    /// not ready.
    pub fn ready(&self) -> bool {
        self.def
            .pointer("/status/containerStatuses")
            .and_then(Value::as_array)
            .map(|statuses| {
                !statuses.is_empty()
                    && statuses.iter().all(|status| {
                        status
                            .get("ready")
                            .and_then(Value::as_bool)
                            .unwrap_or(false)
                    })
            })
            .unwrap_or(false)
    }

    /// Look up a metadata label.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.def
            .pointer("/metadata/labels")
            .and_then(|labels| labels.get(key))
            .and_then(Value::as_str)
    }

    /// Name of the VM definition this pod belongs to, from the correlation
    /// label.
    pub fn vm(&self) -> Option<&str> {
        self.label(VM_LABEL)
    }
}
