//! Offline terminals and tree rendering for the command-line tools.
//!
//! A [`RecordedTerminal`] is a terminal with no process behind it: it keeps
//! the record it was restored from and hands it back unchanged, which lets a
//! saved session go through the engine without starting any shells.

use std::fmt::Write as _;
use std::path::PathBuf;

use serde_json::Value;

use crate::error::Result;
use crate::layout::{LayoutNode, Orientation, Side};
use crate::tab::TabContent;
use crate::terminal::{Spawn, Terminal, TerminalEvents, TerminalFactory, TerminalId, TerminalRecord};

pub struct RecordedTerminal {
    id: TerminalId,
    record: TerminalRecord,
}

impl RecordedTerminal {
    pub fn new(record: TerminalRecord) -> Self {
        Self {
            id: TerminalId::new_v4(),
            record,
        }
    }
}

impl Terminal for RecordedTerminal {
    fn id(&self) -> TerminalId {
        self.id
    }

    fn title(&self) -> String {
        self.record
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("terminal")
            .to_string()
    }

    fn cwd(&self) -> Option<PathBuf> {
        self.record.get("cwd").and_then(Value::as_str).map(PathBuf::from)
    }

    fn serialize_state(&self) -> TerminalRecord {
        self.record.clone()
    }

    fn close(&mut self) {}

    fn attach(&mut self, _events: TerminalEvents) {}
}

#[derive(Default)]
pub struct RecordedFactory;

impl TerminalFactory for RecordedFactory {
    fn create(&mut self, spawn: Spawn<'_>) -> Result<Box<dyn Terminal>> {
        let record = match spawn {
            Spawn::Restore(fields) => fields.clone(),
            Spawn::Fresh { cwd } => {
                let mut fields = TerminalRecord::new();
                if let Some(cwd) = cwd {
                    fields.insert("cwd".to_string(), Value::from(cwd.display().to_string()));
                }
                fields
            }
        };
        Ok(Box::new(RecordedTerminal::new(record)))
    }
}

/// Draw a tab's tree, marking the active terminal with `*`.
pub fn render_tab(tab: &TabContent) -> String {
    let Some(root) = tab.content() else {
        return "(empty)\n".to_string();
    };
    let mut out = String::new();
    render_node(root, tab.active_terminal(), "", "", &mut out);
    out
}

fn render_node(
    node: &LayoutNode,
    active: Option<TerminalId>,
    lead: &str,
    indent: &str,
    out: &mut String,
) {
    match node {
        LayoutNode::Leaf(terminal) => {
            let marker = if Some(terminal.id()) == active { " *" } else { "" };
            let _ = writeln!(out, "{}{:?}{}", lead, terminal.title(), marker);
        }
        LayoutNode::Split(split) => {
            let axis = match split.orientation() {
                Orientation::Horizontal => "horizontal",
                Orientation::Vertical => "vertical",
            };
            let _ = writeln!(out, "{}split {} {:.0}%", lead, axis, split.position() * 100.0);
            for side in Side::BOTH {
                let last = side == Side::Second;
                let branch = if last { "└─ " } else { "├─ " };
                let next_indent = if last { "   " } else { "│  " };
                match split.child(side) {
                    Some(child) => render_node(
                        child,
                        active,
                        &format!("{}{}", indent, branch),
                        &format!("{}{}", indent, next_indent),
                        out,
                    ),
                    None => {
                        let _ = writeln!(out, "{}{}(missing)", indent, branch);
                    }
                }
            }
        }
    }
}
