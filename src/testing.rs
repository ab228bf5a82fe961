//! Terminal doubles shared by the unit tests.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::tab::TabId;
use crate::terminal::{
    Spawn, Terminal, TerminalEvents, TerminalFactory, TerminalId, TerminalRecord,
};

/// What the fake terminals saw happen to them.
#[derive(Default)]
pub struct Probe {
    pub closed: Vec<TerminalId>,
    pub is_split: HashMap<TerminalId, bool>,
    pub focus_grabs: Vec<TerminalId>,
    pub attached: Vec<(TabId, TerminalId)>,
    pub events: HashMap<TerminalId, TerminalEvents>,
    pub titles: HashMap<TerminalId, String>,
}

pub type SharedProbe = Rc<RefCell<Probe>>;

impl Probe {
    pub fn shared() -> SharedProbe {
        Rc::new(RefCell::new(Probe::default()))
    }

    pub fn terminal(probe: &SharedProbe, title: &str) -> Box<dyn Terminal> {
        Box::new(FakeTerminal::new(probe, TerminalId::new_v4(), title, None))
    }

    pub fn terminal_in(probe: &SharedProbe, title: &str, cwd: &Path) -> Box<dyn Terminal> {
        Box::new(FakeTerminal::new(
            probe,
            TerminalId::new_v4(),
            title,
            Some(cwd.to_path_buf()),
        ))
    }

    /// Rebuild a fake from its own serialized fields, keeping its id.
    pub fn restore(probe: &SharedProbe, fields: &TerminalRecord) -> Box<dyn Terminal> {
        let id = fields
            .get("id")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(TerminalId::new_v4);
        let title = fields.get("title").and_then(Value::as_str).unwrap_or("restored");
        let cwd = fields.get("cwd").and_then(Value::as_str).map(PathBuf::from);
        Box::new(FakeTerminal::new(probe, id, title, cwd))
    }

    pub fn was_closed(&self, id: TerminalId) -> bool {
        self.closed.contains(&id)
    }

    /// Change a fake's title as its program would.
    pub fn retitle(&mut self, id: TerminalId, title: &str) {
        self.titles.insert(id, title.to_string());
    }
}

pub struct FakeTerminal {
    id: TerminalId,
    cwd: Option<PathBuf>,
    probe: SharedProbe,
}

impl FakeTerminal {
    fn new(probe: &SharedProbe, id: TerminalId, title: &str, cwd: Option<PathBuf>) -> Self {
        probe.borrow_mut().titles.insert(id, title.to_string());
        Self {
            id,
            cwd,
            probe: probe.clone(),
        }
    }
}

impl Terminal for FakeTerminal {
    fn id(&self) -> TerminalId {
        self.id
    }

    fn title(&self) -> String {
        self.probe
            .borrow()
            .titles
            .get(&self.id)
            .cloned()
            .unwrap_or_default()
    }

    fn cwd(&self) -> Option<PathBuf> {
        self.cwd.clone()
    }

    fn serialize_state(&self) -> TerminalRecord {
        let mut fields = TerminalRecord::new();
        fields.insert("id".to_string(), Value::from(self.id.to_string()));
        fields.insert("title".to_string(), Value::from(self.title()));
        if let Some(cwd) = &self.cwd {
            fields.insert("cwd".to_string(), Value::from(cwd.display().to_string()));
        }
        fields
    }

    fn close(&mut self) {
        self.probe.borrow_mut().closed.push(self.id);
    }

    fn attach(&mut self, events: TerminalEvents) {
        let mut probe = self.probe.borrow_mut();
        probe.attached.push((events.tab(), events.terminal()));
        probe.events.insert(self.id, events);
    }

    fn set_is_split(&mut self, is_split: bool) {
        self.probe.borrow_mut().is_split.insert(self.id, is_split);
    }

    fn grab_focus(&mut self) {
        self.probe.borrow_mut().focus_grabs.push(self.id);
    }
}

/// Hands out fakes. Fresh terminals are titled `term1`, `term2`, ...;
/// records carrying `"fail": true` refuse to restore.
pub struct FakeFactory {
    pub probe: SharedProbe,
    pub created: usize,
    pub fail_fresh: bool,
    pub fresh_cwds: Vec<Option<PathBuf>>,
}

impl FakeFactory {
    pub fn new(probe: &SharedProbe) -> Self {
        Self {
            probe: probe.clone(),
            created: 0,
            fail_fresh: false,
            fresh_cwds: Vec::new(),
        }
    }
}

impl TerminalFactory for FakeFactory {
    fn create(&mut self, spawn: Spawn<'_>) -> Result<Box<dyn Terminal>> {
        match spawn {
            Spawn::Fresh { cwd } => {
                if self.fail_fresh {
                    return Err(Error::Spawn("no pty available".to_string()));
                }
                self.created += 1;
                self.fresh_cwds.push(cwd.map(Path::to_path_buf));
                let title = format!("term{}", self.created);
                Ok(Box::new(FakeTerminal::new(
                    &self.probe,
                    TerminalId::new_v4(),
                    &title,
                    cwd.map(Path::to_path_buf),
                )))
            }
            Spawn::Restore(fields) => {
                if fields.get("fail").and_then(Value::as_bool) == Some(true) {
                    return Err(Error::InvalidRecord("restore refused".to_string()));
                }
                self.created += 1;
                Ok(Probe::restore(&self.probe, fields))
            }
        }
    }
}
