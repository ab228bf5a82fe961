//! The terminal collaborator as seen by the layout engine.
//!
//! The engine never spawns processes or tracks working directories itself; it
//! only asks a [`TerminalFactory`] for new terminals, reads a terminal's title
//! and cwd, asks it to serialize or close itself, and reacts to the
//! [`TerminalEvent`]s it raises through its [`TerminalEvents`] handle.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::Result;
use crate::event::{AppEvent, LoopHandle};
use crate::layout::Orientation;
use crate::tab::TabId;

pub type TerminalId = uuid::Uuid;

/// Terminal-defined fields of a persisted terminal node. Opaque to the engine.
pub type TerminalRecord = Map<String, Value>;

pub trait Terminal {
    fn id(&self) -> TerminalId;

    fn title(&self) -> String;

    fn cwd(&self) -> Option<PathBuf>;

    /// Fields to persist for this terminal, without the `type` tag.
    fn serialize_state(&self) -> TerminalRecord;

    /// Ask the terminal to shut down. It may still raise `Destroyed` later.
    fn close(&mut self);

    /// Wire the terminal to the container that now owns it.
    fn attach(&mut self, events: TerminalEvents);

    /// Whether the terminal currently shares its tab with other terminals.
    fn set_is_split(&mut self, _is_split: bool) {}

    fn grab_focus(&mut self) {}
}

/// How a new terminal should be brought up.
#[derive(Clone, Copy, Debug)]
pub enum Spawn<'a> {
    Fresh { cwd: Option<&'a Path> },
    Restore(&'a TerminalRecord),
}

pub trait TerminalFactory {
    fn create(&mut self, spawn: Spawn<'_>) -> Result<Box<dyn Terminal>>;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TerminalEvent {
    SplitRequested(Orientation),
    UnsplitRequested,
    ClosePaneRequested,
    MoveToOtherPane,
    FocusIn,
    TitleChanged,
    /// Something inside the terminal that should be persisted changed.
    SessionChanged,
    /// The terminal went away without being closed through its tab.
    Destroyed,
}

/// Handle a terminal uses to raise events toward its tab.
#[derive(Clone, Debug)]
pub struct TerminalEvents {
    tab: TabId,
    terminal: TerminalId,
    handle: LoopHandle,
}

impl TerminalEvents {
    pub(crate) fn new(tab: TabId, terminal: TerminalId, handle: LoopHandle) -> Self {
        Self {
            tab,
            terminal,
            handle,
        }
    }

    pub fn tab(&self) -> TabId {
        self.tab
    }

    pub fn terminal(&self) -> TerminalId {
        self.terminal
    }

    pub fn emit(&self, event: TerminalEvent) -> bool {
        self.handle.send(AppEvent::Terminal {
            tab: self.tab,
            terminal: self.terminal,
            event,
        })
    }
}
