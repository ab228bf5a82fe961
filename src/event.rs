use tokio::sync::mpsc;

use crate::tab::TabId;
use crate::terminal::{TerminalEvent, TerminalId};

#[derive(Debug)]
pub enum AppEvent {
    /// A terminal raised something toward the tab that owns it.
    Terminal {
        tab: TabId,
        terminal: TerminalId,
        event: TerminalEvent,
    },
    /// The owning tab was explicitly closed from the outside (tab bar, menu).
    CloseTab(TabId),
}

/// Identifies one scheduled idle task of a container. A container only runs
/// a task whose token matches the one it currently has pending.
pub type IdleToken = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdleKind {
    /// Collapse splits left with fewer than two live children.
    CollapseSplits,
    /// Apply restored divider fractions once real sizes are known.
    ApplyPositions,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdleTask {
    pub tab: TabId,
    pub token: IdleToken,
    pub kind: IdleKind,
}

/// Sending half of the loop, shared by every container and terminal.
#[derive(Clone, Debug)]
pub struct LoopHandle {
    events: mpsc::UnboundedSender<AppEvent>,
    idle: mpsc::UnboundedSender<IdleTask>,
}

pub struct LoopReceivers {
    pub events: mpsc::UnboundedReceiver<AppEvent>,
    pub idle: mpsc::UnboundedReceiver<IdleTask>,
}

pub fn channel() -> (LoopHandle, LoopReceivers) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (idle_tx, idle_rx) = mpsc::unbounded_channel();
    (
        LoopHandle {
            events: events_tx,
            idle: idle_tx,
        },
        LoopReceivers {
            events: events_rx,
            idle: idle_rx,
        },
    )
}

impl LoopHandle {
    /// Returns false once the loop has gone away.
    pub fn send(&self, event: AppEvent) -> bool {
        self.events.send(event).is_ok()
    }

    pub fn schedule_idle(&self, task: IdleTask) -> bool {
        self.idle.send(task).is_ok()
    }
}
