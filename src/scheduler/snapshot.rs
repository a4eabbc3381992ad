//! JSON snapshot of the task store.

use crate::error::{Result, RushError};
use crate::task::Task;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    #[serde(default = "default_state_version")]
    version: u8,
    /// Creation order.
    #[serde(default)]
    tasks: Vec<Task>,
}

fn default_state_version() -> u8 {
    1
}

/// Read a snapshot. A missing file is an empty store.
pub fn load_snapshot_from_path(path: &Path) -> Result<Vec<Task>> {
    let bytes = match std::fs::read(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(RushError::Persistence(format!(
                "cannot read {}: {e}",
                path.display()
            )));
        }
    };

    let state: StoreState = serde_json::from_slice(&bytes)
        .map_err(|e| RushError::Persistence(format!("cannot parse {}: {e}", path.display())))?;
    Ok(state.tasks)
}

/// Write a snapshot, replacing any previous file in one rename.
pub fn save_snapshot_to_path(path: &Path, tasks: &[Task]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| RushError::Persistence(format!("cannot create state dir: {e}")))?;
    }

    let state = StoreState {
        version: default_state_version(),
        tasks: tasks.to_vec(),
    };
    let json = serde_json::to_string_pretty(&state)
        .map_err(|e| RushError::Persistence(format!("cannot serialize state: {e}")))?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)
        .map_err(|e| RushError::Persistence(format!("cannot write {}: {e}", tmp.display())))?;
    std::fs::rename(&tmp, path)
        .map_err(|e| RushError::Persistence(format!("cannot replace {}: {e}", path.display())))?;
    Ok(())
}
