//! Local state file (`.doform/state.json`)
//!
//! Maps `type.name` to the upstream handle and the last observed attributes.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use doform_core::codec::{json_to_value, value_to_json};
use doform_core::resource::{ResourceId, State};
use serde::{Deserialize, Serialize};

pub const DEFAULT_STATE_PATH: &str = ".doform/state.json";
const STATE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StoredResource {
    #[serde(rename = "type")]
    resource_type: String,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    identifier: Option<String>,
    #[serde(default)]
    attributes: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StateDocument {
    version: u32,
    #[serde(default)]
    resources: BTreeMap<String, StoredResource>,
}

/// States known to this working directory
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
    resources: BTreeMap<String, StoredResource>,
}

impl StateFile {
    /// Load the file at `path`; a missing file is an empty state
    pub fn load(path: &Path) -> Result<Self, String> {
        let resources = match fs::read_to_string(path) {
            Ok(content) => {
                let doc: StateDocument = serde_json::from_str(&content)
                    .map_err(|e| format!("Failed to parse state file {}: {}", path.display(), e))?;
                if doc.version != STATE_VERSION {
                    return Err(format!(
                        "State file {} has version {}; this build reads version {}",
                        path.display(),
                        doc.version,
                        STATE_VERSION
                    ));
                }
                doc.resources
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(format!("Failed to read {}: {}", path.display(), e)),
        };
        Ok(Self {
            path: path.to_path_buf(),
            resources,
        })
    }

    /// Write the file, replacing it atomically
    pub fn save(&self) -> Result<(), String> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
        }
        let doc = StateDocument {
            version: STATE_VERSION,
            resources: self.resources.clone(),
        };
        let content = serde_json::to_string_pretty(&doc).map_err(|e| e.to_string())?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(|e| format!("Failed to write {}: {}", tmp.display(), e))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| format!("Failed to write {}: {}", self.path.display(), e))
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn get(&self, id: &ResourceId) -> Option<State> {
        self.resources.get(&id.to_string()).map(to_state)
    }

    /// Every stored state, keyed by resource
    pub fn states(&self) -> HashMap<ResourceId, State> {
        self.resources
            .values()
            .map(|r| {
                let state = to_state(r);
                (state.id.clone(), state)
            })
            .collect()
    }

    /// Record `state`; a state that no longer exists is removed
    pub fn record(&mut self, state: &State) {
        if !state.exists {
            self.remove(&state.id);
            return;
        }
        self.resources.insert(
            state.id.to_string(),
            StoredResource {
                resource_type: state.id.resource_type.clone(),
                name: state.id.name.clone(),
                identifier: state.identifier.clone(),
                attributes: state
                    .attributes
                    .iter()
                    .map(|(k, v)| (k.clone(), value_to_json(v)))
                    .collect(),
            },
        );
    }

    pub fn remove(&mut self, id: &ResourceId) {
        self.resources.remove(&id.to_string());
    }
}

fn to_state(stored: &StoredResource) -> State {
    let id = ResourceId::new(&stored.resource_type, &stored.name);
    let attributes = stored
        .attributes
        .iter()
        .filter_map(|(k, v)| json_to_value(v).map(|v| (k.clone(), v)))
        .collect();
    let state = State::existing(id, attributes);
    match &stored.identifier {
        Some(identifier) => state.with_identifier(identifier),
        None => state,
    }
}
