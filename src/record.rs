//! Persisted node records.
//!
//! ```json
//! {"type": "split", "orientation": 0, "split-position": 0.5,
//!  "first": {"type": "terminal", ...}, "second": {...}}
//! ```
//!
//! Reading is lenient: an unknown node type or a malformed split becomes
//! "nothing" so one broken branch does not sink the rest of the tree.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::Error;
use crate::layout::Orientation;
use crate::terminal::TerminalRecord;

const TYPE_KEY: &str = "type";
const TERMINAL_TYPE: &str = "terminal";
const SPLIT_TYPE: &str = "split";

#[derive(Clone, Debug, PartialEq)]
pub enum NodeRecord {
    Terminal(TerminalRecord),
    Split(SplitRecord),
}

#[derive(Clone, Debug, PartialEq)]
pub struct SplitRecord {
    pub orientation: Orientation,
    pub position: f64,
    pub first: Option<Box<NodeRecord>>,
    pub second: Option<Box<NodeRecord>>,
}

#[derive(Serialize, Deserialize)]
struct SplitWire {
    #[serde(default, deserialize_with = "orientation_or_default")]
    orientation: Orientation,
    #[serde(
        rename = "split-position",
        default = "default_position",
        deserialize_with = "position_or_default"
    )]
    position: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    first: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    second: Option<Value>,
}

fn default_position() -> f64 {
    0.5
}

// A bad scalar costs the split its orientation or divider, never its children.
fn orientation_or_default<'de, D>(deserializer: D) -> Result<Orientation, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(Orientation::deserialize(&value).unwrap_or_else(|e| {
        tracing::warn!("split orientation {} unreadable ({}); using default", value, e);
        Orientation::default()
    }))
}

fn position_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_f64().unwrap_or_else(|| {
        tracing::warn!("split position {} unreadable; using default", value);
        default_position()
    }))
}

impl NodeRecord {
    pub fn terminal(fields: TerminalRecord) -> Self {
        NodeRecord::Terminal(fields)
    }

    pub fn is_split(&self) -> bool {
        matches!(self, NodeRecord::Split(_))
    }

    pub fn to_value(&self) -> Value {
        match self {
            NodeRecord::Terminal(fields) => {
                let mut map = Map::with_capacity(fields.len() + 1);
                map.insert(TYPE_KEY.to_string(), Value::from(TERMINAL_TYPE));
                for (key, value) in fields {
                    if key != TYPE_KEY {
                        map.insert(key.clone(), value.clone());
                    }
                }
                Value::Object(map)
            }
            NodeRecord::Split(split) => {
                let wire = SplitWire {
                    orientation: split.orientation,
                    position: split.position,
                    first: split.first.as_ref().map(|n| n.to_value()),
                    second: split.second.as_ref().map(|n| n.to_value()),
                };
                let mut value = serde_json::to_value(wire).unwrap_or(Value::Null);
                if let Value::Object(map) = &mut value {
                    map.insert(TYPE_KEY.to_string(), Value::from(SPLIT_TYPE));
                }
                value
            }
        }
    }

    /// Strict on the type tag: only `terminal` and `split` nodes are accepted.
    pub fn from_value(value: &Value) -> Option<NodeRecord> {
        let map = value.as_object()?;
        match map.get(TYPE_KEY).and_then(Value::as_str) {
            Some(TERMINAL_TYPE) => Some(NodeRecord::Terminal(strip_type(map))),
            Some(SPLIT_TYPE) => Self::split_from_value(value),
            other => {
                tracing::warn!("dropping node record with unknown type {:?}", other);
                None
            }
        }
    }

    /// Root-level reading: anything that is not a split is taken as a single
    /// terminal, which is how tabs holding one terminal were stored before
    /// node records carried a type tag.
    pub fn from_value_lenient(value: &Value) -> Option<NodeRecord> {
        let map = value.as_object()?;
        match map.get(TYPE_KEY).and_then(Value::as_str) {
            Some(SPLIT_TYPE) => Self::split_from_value(value),
            _ => Some(NodeRecord::Terminal(strip_type(map))),
        }
    }

    fn split_from_value(value: &Value) -> Option<NodeRecord> {
        let wire: SplitWire = match serde_json::from_value(value.clone()) {
            Ok(wire) => wire,
            Err(e) => {
                tracing::warn!("dropping malformed split record: {}", e);
                return None;
            }
        };
        let child = |v: Option<Value>| v.as_ref().and_then(Self::from_value).map(Box::new);
        Some(NodeRecord::Split(SplitRecord {
            orientation: wire.orientation,
            position: if wire.position.is_finite() {
                wire.position.clamp(0.0, 1.0)
            } else {
                default_position()
            },
            first: child(wire.first),
            second: child(wire.second),
        }))
    }

    pub fn terminal_count(&self) -> usize {
        match self {
            NodeRecord::Terminal(_) => 1,
            NodeRecord::Split(split) => {
                split.first.as_ref().map_or(0, |n| n.terminal_count())
                    + split.second.as_ref().map_or(0, |n| n.terminal_count())
            }
        }
    }
}

fn strip_type(map: &Map<String, Value>) -> TerminalRecord {
    let mut fields = map.clone();
    fields.remove(TYPE_KEY);
    fields
}

impl Serialize for NodeRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for NodeRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        NodeRecord::from_value_lenient(&value)
            .ok_or_else(|| {
                serde::de::Error::custom(Error::InvalidRecord(
                    "node record must be an object".to_string(),
                ))
            })
    }
}
