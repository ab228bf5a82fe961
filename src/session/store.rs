use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::{SessionState, CURRENT_VERSION};

fn state_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("splitpane")
}

pub fn state_file_path() -> PathBuf {
    state_dir().join("session.json")
}

pub fn save(state: &SessionState) -> Result<()> {
    save_to(state, &state_file_path())
}

pub fn load() -> Option<SessionState> {
    load_from(&state_file_path())
}

// Path-parameterized variants for testability

pub fn save_to(state: &SessionState, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(state).context("failed to serialize session")?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    tracing::debug!("saved {} tabs to {}", state.tabs.len(), path.display());
    Ok(())
}

pub fn load_from(path: &Path) -> Option<SessionState> {
    let json = fs::read_to_string(path).ok()?;
    let value: Value = match serde_json::from_str(&json) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("ignoring unreadable session file {}: {}", path.display(), e);
            return None;
        }
    };
    let mut state = SessionState::from_value(&value)?;
    migrate(&mut state);
    Some(state)
}

/// Bring a loaded session up to the current version.
fn migrate(state: &mut SessionState) {
    if state.version < CURRENT_VERSION {
        tracing::info!(
            "migrating session from version {} to {}",
            state.version,
            CURRENT_VERSION
        );
        state.version = CURRENT_VERSION;
    }
    if state.active_tab >= state.tabs.len() {
        state.active_tab = state.tabs.len().saturating_sub(1);
    }
}
