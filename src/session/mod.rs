pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::NodeRecord;

pub const CURRENT_VERSION: u32 = 2;

/// Everything persisted between runs: the ordered tabs and which one was
/// showing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub active_tab: usize,
    pub tabs: Vec<TabState>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TabState {
    /// Only present when the user renamed the tab.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub content: NodeRecord,
}

impl SessionState {
    pub fn new(tabs: Vec<TabState>, active_tab: usize) -> Self {
        Self {
            version: CURRENT_VERSION,
            saved_at: Utc::now(),
            active_tab,
            tabs,
        }
    }

    pub fn terminal_count(&self) -> usize {
        self.tabs.iter().map(|t| t.content.terminal_count()).sum()
    }

    /// Read any layout this program has ever written:
    ///
    /// - the current `{version, saved_at, active_tab, tabs}` document
    /// - version 1 tab lists, whose entries are bare node records
    /// - a single node record at the root (one tab)
    /// - `{notebook1, notebook2}` from the dual-notebook window, flattened
    ///   with the second notebook's tabs after the first's
    ///
    /// Tabs that cannot be read are skipped. The version is left as found.
    pub fn from_value(value: &Value) -> Option<SessionState> {
        let map = value.as_object()?;

        if let Some(tabs) = map.get("tabs").and_then(Value::as_array) {
            let version = map
                .get("version")
                .and_then(Value::as_u64)
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(1);
            let saved_at = map
                .get("saved_at")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_else(Utc::now);
            let active_tab = map
                .get("active_tab")
                .and_then(Value::as_u64)
                .map_or(0, |v| v as usize);
            return Some(SessionState {
                version,
                saved_at,
                active_tab,
                tabs: tabs_from_list(tabs),
            });
        }

        if map.contains_key("notebook1") || map.contains_key("notebook2") {
            let mut tabs = Vec::new();
            for key in ["notebook1", "notebook2"] {
                let list = match map.get(key) {
                    Some(Value::Array(list)) => list.as_slice(),
                    Some(Value::Object(nested)) => nested
                        .get("tabs")
                        .and_then(Value::as_array)
                        .map_or(&[][..], Vec::as_slice),
                    _ => &[],
                };
                tabs.extend(tabs_from_list(list));
            }
            tracing::info!("flattened dual-notebook layout into {} tabs", tabs.len());
            return Some(SessionState {
                version: 1,
                saved_at: Utc::now(),
                active_tab: 0,
                tabs,
            });
        }

        let content = NodeRecord::from_value_lenient(value)?;
        Some(SessionState {
            version: 1,
            saved_at: Utc::now(),
            active_tab: 0,
            tabs: vec![TabState {
                label: None,
                content,
            }],
        })
    }
}

fn tabs_from_list(list: &[Value]) -> Vec<TabState> {
    list.iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let tab = tab_from_value(entry);
            if tab.is_none() {
                tracing::warn!("skipping unreadable tab {} in saved session", index);
            }
            tab
        })
        .collect()
}

fn tab_from_value(value: &Value) -> Option<TabState> {
    let map = value.as_object()?;
    match map.get("content") {
        Some(content) => Some(TabState {
            label: map.get("label").and_then(Value::as_str).map(str::to_string),
            content: NodeRecord::from_value_lenient(content)?,
        }),
        None => Some(TabState {
            label: None,
            content: NodeRecord::from_value_lenient(value)?,
        }),
    }
}
