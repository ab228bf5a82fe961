//! One tab's pane container.
//!
//! A [`TabContent`] owns the root of its layout tree (nothing, a lone
//! terminal, or a split), keeps the active terminal in step with focus and
//! restructuring, and announces changes through [`TabSignals`].
//!
//! Operations whose preconditions do not hold (not split, terminal not in
//! this tab, tab already destroyed) do nothing; the UI is expected to have
//! disabled the control that triggered them anyway.

use std::collections::HashSet;

use ratatui::layout::Rect;
use tracing::{debug, info, warn};

use crate::config::Behavior;
use crate::event::{IdleKind, IdleTask, IdleToken, LoopHandle};
use crate::layout::{LayoutNode, NodeId, Orientation, Side, Split, SplitId};
use crate::record::NodeRecord;
use crate::signal::Signal;
use crate::terminal::{
    Spawn, Terminal, TerminalEvent, TerminalEvents, TerminalFactory, TerminalId, TerminalRecord,
};

pub type TabId = uuid::Uuid;

#[derive(Default)]
pub struct TabSignals {
    /// Something that should be persisted changed.
    pub session_update: Signal<()>,
    /// Title of the active terminal, sent whenever it may have changed.
    pub title: Signal<String>,
    pub is_split: Signal<bool>,
}

pub struct TabContent {
    id: TabId,
    content: Option<LayoutNode>,
    active: Option<TerminalId>,
    announced_split: bool,
    destroyed: bool,
    /// Terminals this tab closed itself, so their exit notifications are not
    /// unexpected deaths. Cleared on every idle turn: by then a late exit
    /// names a terminal that is no longer in the tree and is ignored anyway.
    expected_exits: HashSet<TerminalId>,
    next_token: IdleToken,
    pending_collapse: Option<IdleToken>,
    pending_positions: Option<IdleToken>,
    handle: LoopHandle,
    preserve_cwd: bool,
    signals: TabSignals,
}

impl TabContent {
    pub fn new(handle: LoopHandle, behavior: &Behavior) -> Self {
        Self {
            id: TabId::new_v4(),
            content: None,
            active: None,
            announced_split: false,
            destroyed: false,
            expected_exits: HashSet::new(),
            next_token: 0,
            pending_collapse: None,
            pending_positions: None,
            handle,
            preserve_cwd: behavior.preserve_cwd,
            signals: TabSignals::default(),
        }
    }

    pub fn id(&self) -> TabId {
        self.id
    }

    pub fn signals(&self) -> &TabSignals {
        &self.signals
    }

    pub fn content(&self) -> Option<&LayoutNode> {
        self.content.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_none()
    }

    pub fn is_split(&self) -> bool {
        self.content.as_ref().is_some_and(LayoutNode::is_split)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn active_terminal(&self) -> Option<TerminalId> {
        self.active
    }

    pub fn all_terminals(&self) -> Vec<TerminalId> {
        self.content
            .as_ref()
            .map(LayoutNode::all_terminals)
            .unwrap_or_default()
    }

    pub fn terminal(&self, id: TerminalId) -> Option<&dyn Terminal> {
        self.content.as_ref()?.terminal(id)
    }

    /// Title of the active terminal.
    pub fn title(&self) -> Option<String> {
        let active = self.active?;
        self.terminal(active).map(|t| t.title())
    }

    pub fn has_pending_collapse(&self) -> bool {
        self.pending_collapse.is_some()
    }

    fn adopt(&self, terminal: &mut dyn Terminal) {
        let id = terminal.id();
        terminal.attach(TerminalEvents::new(self.id, id, self.handle.clone()));
    }

    /// Make `terminal` the whole content of this tab.
    pub fn set_terminal(&mut self, mut terminal: Box<dyn Terminal>) {
        if self.destroyed {
            warn!("tab {} is destroyed; dropping terminal {}", self.id, terminal.id());
            terminal.close();
            return;
        }
        self.adopt(&mut *terminal);
        if let Some(previous) = self.content.replace(LayoutNode::leaf(terminal)) {
            self.close_all(previous);
        }
        self.restructured();
    }

    /// Split `target` in two, putting a new terminal beside it. The new
    /// terminal becomes active and its id is returned.
    pub fn split(
        &mut self,
        target: TerminalId,
        orientation: Orientation,
        factory: &mut dyn TerminalFactory,
    ) -> Option<TerminalId> {
        if self.destroyed {
            return None;
        }
        let root = self.content.as_ref()?;
        let Some(path) = root.path_to(target) else {
            debug!("split declined: terminal {} is not in tab {}", target, self.id);
            return None;
        };
        let cwd = if self.preserve_cwd {
            root.terminal(target).and_then(|t| t.cwd())
        } else {
            None
        };

        let mut terminal = match factory.create(Spawn::Fresh { cwd: cwd.as_deref() }) {
            Ok(terminal) => terminal,
            Err(e) => {
                warn!("split declined: {}", e);
                return None;
            }
        };
        let new_id = terminal.id();
        self.adopt(&mut *terminal);

        let grafted = self.graft_split(&path, target, orientation, LayoutNode::leaf(terminal));

        if let Err(orphan) = grafted {
            // Path was just computed from this tree, so there is always a parent.
            warn!("split declined: no parent split found for terminal {}", target);
            if let Some(mut terminal) = orphan.into_terminal() {
                self.expected_exits.insert(terminal.id());
                terminal.close();
            }
            return None;
        }

        if let Some(root) = self.content.as_mut() {
            root.mark_focused(new_id);
        }
        info!(
            "tab {}: split {} {:?}, new terminal {}",
            self.id, target, orientation, new_id
        );
        self.restructured();
        Some(new_id)
    }

    fn graft_split(
        &mut self,
        path: &[Side],
        target: TerminalId,
        orientation: Orientation,
        new_leaf: LayoutNode,
    ) -> Result<(), LayoutNode> {
        let Some((side, parent_path)) = path.split_last() else {
            // The target is the whole content.
            let Some(old) = self.content.take() else {
                return Err(new_leaf);
            };
            self.content = Some(LayoutNode::Split(Split::new(orientation, old, new_leaf)));
            return Ok(());
        };

        let Some(parent) = self
            .content
            .as_mut()
            .and_then(|root| root.node_at_mut(parent_path))
            .and_then(LayoutNode::as_split_mut)
        else {
            return Err(new_leaf);
        };
        if parent.child(*side).map(LayoutNode::id) != Some(NodeId::Terminal(target)) {
            return Err(new_leaf);
        }
        parent.replace_child_with(NodeId::Terminal(target), move |old| {
            LayoutNode::Split(Split::new(orientation, old, new_leaf))
        });
        Ok(())
    }

    /// Remove `target` from the tree, promoting its sibling into the place of
    /// their parent split. The caller owns the returned terminal.
    pub fn collapse_terminal(&mut self, target: TerminalId) -> Option<Box<dyn Terminal>> {
        if self.destroyed || !self.is_split() {
            return None;
        }
        let removed = self.collapse_around(target);
        if removed.is_some() {
            debug!("tab {}: collapsed around {}", self.id, target);
            self.restructured();
        }
        removed
    }

    fn collapse_around(&mut self, target: TerminalId) -> Option<Box<dyn Terminal>> {
        let root = self.content.as_mut()?;
        let (parent_path, side) = root.parent_of(target)?;
        root.node_at_mut(&parent_path)?
            .collapse_child(side)?
            .into_terminal()
    }

    /// Close the active terminal. The tree is collapsed first so the sibling
    /// is promoted while everything is still intact.
    pub fn close_active_terminal(&mut self) {
        if self.destroyed {
            return;
        }
        let Some(active) = self.active else {
            return;
        };
        let closing = if self.is_split() {
            self.collapse_around(active)
                .or_else(|| self.detach_from_incomplete(active))
        } else {
            self.content.take().and_then(LayoutNode::into_terminal)
        };
        if let Some(mut terminal) = closing {
            self.expected_exits.insert(terminal.id());
            terminal.close();
        }

        if self.content.is_none() {
            self.destroy();
        } else {
            self.restructured();
        }
    }

    /// Take `target` out of a tree that still has an empty slot waiting for
    /// its idle collapse, then close the tree up around the gap right away.
    fn detach_from_incomplete(&mut self, target: TerminalId) -> Option<Box<dyn Terminal>> {
        let terminal = self
            .content
            .as_mut()
            .and_then(LayoutNode::as_split_mut)?
            .detach_terminal(target)?;
        let mut changed = false;
        self.content = self
            .content
            .take()
            .and_then(|root| root.collapse_empty(&mut changed));
        Some(terminal)
    }

    /// A terminal went away on its own (its program exited).
    ///
    /// A lone terminal takes the tab with it. Inside a split the slot is
    /// emptied right away but the tree is only collapsed on the next idle
    /// turn, outside the notification that reported the death.
    pub fn terminal_destroyed(&mut self, id: TerminalId) {
        if self.destroyed {
            return;
        }
        if self.expected_exits.remove(&id) {
            debug!("terminal {} exited after being closed by tab {}", id, self.id);
            return;
        }

        let lone = matches!(&self.content, Some(LayoutNode::Leaf(t)) if t.id() == id);
        if lone {
            info!("last terminal of tab {} exited", self.id);
            self.content = None;
            self.destroy();
            return;
        }

        let Some(LayoutNode::Split(split)) = self.content.as_mut() else {
            return;
        };
        if split.detach_terminal(id).is_none() {
            return;
        }
        debug!("terminal {} exited inside tab {}; collapsing on idle", id, self.id);
        self.refresh_active();
        self.schedule(IdleKind::CollapseSplits);
    }

    fn schedule(&mut self, kind: IdleKind) {
        let pending = match kind {
            IdleKind::CollapseSplits => &mut self.pending_collapse,
            IdleKind::ApplyPositions => &mut self.pending_positions,
        };
        if pending.is_some() {
            return;
        }
        let token = self.next_token;
        self.next_token += 1;
        let task = IdleTask {
            tab: self.id,
            token,
            kind,
        };
        if self.handle.schedule_idle(task) {
            *pending = Some(token);
        } else {
            warn!("event loop is gone; {:?} for tab {} not scheduled", kind, self.id);
        }
    }

    /// Run a deferred task. Tasks for another tab, stale tokens and anything
    /// arriving after destruction are ignored.
    pub fn run_idle(&mut self, task: IdleTask) {
        if self.destroyed || task.tab != self.id {
            return;
        }
        self.expected_exits.clear();
        match task.kind {
            IdleKind::CollapseSplits => {
                if self.pending_collapse != Some(task.token) {
                    return;
                }
                self.pending_collapse = None;
                self.collapse_empty_splits();
            }
            IdleKind::ApplyPositions => {
                if self.pending_positions != Some(task.token) {
                    return;
                }
                self.pending_positions = None;
                self.apply_pending_positions();
            }
        }
    }

    /// Collapse every split left with fewer than two children. A fully
    /// populated tree is left exactly as it is.
    pub fn collapse_empty_splits(&mut self) {
        if self.destroyed {
            return;
        }
        let Some(root) = self.content.take() else {
            return;
        };
        let before = root.id();
        let mut changed = false;
        match root.collapse_empty(&mut changed) {
            None => {
                info!("tab {} has no terminals left", self.id);
                self.destroy();
            }
            Some(root) => {
                if root.id() != before {
                    debug!("tab {}: re-attaching new root {:?}", self.id, root.id());
                }
                self.content = Some(root);
                if changed {
                    self.restructured();
                }
            }
        }
    }

    /// Keep only the active terminal; every other terminal is closed.
    pub fn unsplit(&mut self) {
        if self.destroyed || !self.is_split() {
            return;
        }
        let Some(active) = self.active else {
            return;
        };
        let Some(root) = self.content.take() else {
            return;
        };
        let mut kept = None;
        for mut terminal in root.into_terminals() {
            if kept.is_none() && terminal.id() == active {
                kept = Some(terminal);
            } else {
                self.expected_exits.insert(terminal.id());
                terminal.close();
            }
        }
        self.content = kept.map(LayoutNode::leaf);
        info!("tab {}: unsplit around {}", self.id, active);

        if self.content.is_none() {
            self.destroy();
        } else {
            self.restructured();
        }
    }

    /// UI focus moved to `id`.
    pub fn focus_terminal(&mut self, id: TerminalId) -> bool {
        if self.destroyed {
            return false;
        }
        let Some(root) = self.content.as_mut() else {
            return false;
        };
        if !root.mark_focused(id) {
            return false;
        }
        self.refresh_active();
        true
    }

    /// Move focus `direction` steps through the traversal order, wrapping.
    pub fn focus_adjacent_terminal(&mut self, direction: i32) -> Option<TerminalId> {
        if self.destroyed {
            return None;
        }
        let terminals = self.all_terminals();
        if terminals.len() < 2 {
            return None;
        }
        let current = self
            .active
            .and_then(|active| terminals.iter().position(|t| *t == active))
            .unwrap_or(0);
        let len = terminals.len() as i64;
        let next = terminals[(current as i64 + i64::from(direction)).rem_euclid(len) as usize];

        if let Some(terminal) = self.content.as_mut().and_then(|r| r.terminal_mut(next)) {
            terminal.grab_focus();
        }
        self.focus_terminal(next);
        Some(next)
    }

    /// "Other pane" is approximated as the next terminal in traversal order.
    pub fn handle_move_to_other_pane(&mut self) -> Option<TerminalId> {
        self.focus_adjacent_terminal(1)
    }

    /// Nudge the divider of the split directly holding the active terminal.
    pub fn adjust_split_position(&mut self, delta: f64) -> bool {
        if self.destroyed {
            return false;
        }
        let Some(active) = self.active else {
            return false;
        };
        let Some(root) = self.content.as_mut() else {
            return false;
        };
        let split_path = root.parent_of(active).map(|(path, _)| path).unwrap_or_default();
        let Some(split) = root.node_at_mut(&split_path).and_then(LayoutNode::as_split_mut) else {
            return false;
        };
        let before = split.position();
        split.set_position(before + delta);
        if (split.position() - before).abs() < f64::EPSILON {
            return false;
        }
        self.signals.session_update.emit(&());
        true
    }

    /// The user dragged the divider of `split` to `pixel`.
    pub fn drag_divider(&mut self, split: SplitId, pixel: u16) -> bool {
        if self.destroyed {
            return false;
        }
        let Some(split) = self.content.as_mut().and_then(|r| r.find_split_mut(split)) else {
            return false;
        };
        if !split.divider_mut().drag_to(pixel) {
            return false;
        }
        self.signals.session_update.emit(&());
        true
    }

    /// Lay the tab out over `area`. Restored divider fractions are applied on
    /// the idle turn after the first layout.
    pub fn allocate(&mut self, area: Rect) -> Vec<(TerminalId, Rect)> {
        if self.destroyed {
            return Vec::new();
        }
        let Some(root) = self.content.as_mut() else {
            return Vec::new();
        };
        let rects = root.allocate(area);
        let mut pending = false;
        root.for_each_split_mut(&mut |split| pending |= split.divider().has_pending());
        if pending {
            self.schedule(IdleKind::ApplyPositions);
        }
        rects
    }

    fn apply_pending_positions(&mut self) {
        let Some(root) = self.content.as_mut() else {
            return;
        };
        let mut applied = 0;
        root.for_each_split_mut(&mut |split| {
            if split.divider_mut().apply_pending() {
                applied += 1;
            }
        });
        debug!("tab {}: applied {} restored divider positions", self.id, applied);
    }

    pub fn serialize(&self) -> Option<NodeRecord> {
        if self.destroyed {
            return None;
        }
        self.content.as_ref().map(LayoutNode::serialize)
    }

    /// Rebuild the tab from a persisted record. Terminals that fail to come
    /// back are left out and the tree closes up around them. Returns false
    /// when nothing could be restored.
    pub fn deserialize(&mut self, record: &NodeRecord, factory: &mut dyn TerminalFactory) -> bool {
        if self.destroyed {
            return false;
        }
        let tab = self.id;
        let handle = self.handle.clone();
        let mut restore = |fields: &TerminalRecord| -> Option<Box<dyn Terminal>> {
            match factory.create(Spawn::Restore(fields)) {
                Ok(mut terminal) => {
                    let id = terminal.id();
                    terminal.attach(TerminalEvents::new(tab, id, handle.clone()));
                    Some(terminal)
                }
                Err(e) => {
                    warn!("tab {}: could not restore terminal: {}", tab, e);
                    None
                }
            }
        };

        let mut changed = false;
        let restored = LayoutNode::deserialize(record, &mut restore)
            .and_then(|node| node.collapse_empty(&mut changed));
        if changed {
            warn!("tab {} restored with missing branches", self.id);
        }
        let Some(root) = restored else {
            warn!("tab {}: nothing could be restored", self.id);
            return false;
        };

        if let Some(previous) = self.content.replace(root) {
            self.close_all(previous);
        }
        self.restructured();
        true
    }

    pub fn handle_terminal_event(
        &mut self,
        terminal: TerminalId,
        event: TerminalEvent,
        factory: &mut dyn TerminalFactory,
    ) {
        if self.destroyed {
            return;
        }
        match event {
            TerminalEvent::SplitRequested(orientation) => {
                self.split(terminal, orientation, factory);
            }
            TerminalEvent::UnsplitRequested => self.unsplit(),
            TerminalEvent::ClosePaneRequested => {
                if self.focus_terminal(terminal) {
                    self.close_active_terminal();
                }
            }
            TerminalEvent::MoveToOtherPane => {
                self.handle_move_to_other_pane();
            }
            TerminalEvent::FocusIn => {
                self.focus_terminal(terminal);
            }
            TerminalEvent::TitleChanged => {
                if self.active == Some(terminal) {
                    self.emit_title();
                }
            }
            TerminalEvent::SessionChanged => self.signals.session_update.emit(&()),
            TerminalEvent::Destroyed => self.terminal_destroyed(terminal),
        }
    }

    /// Close the whole tab with everything in it.
    pub fn close(&mut self) {
        self.destroy();
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        if let Some(root) = self.content.take() {
            self.close_all(root);
        }
        self.destroyed = true;
        self.active = None;
        self.pending_collapse = None;
        self.pending_positions = None;
        info!("tab {} destroyed", self.id);
    }

    fn close_all(&mut self, node: LayoutNode) {
        for mut terminal in node.into_terminals() {
            self.expected_exits.insert(terminal.id());
            terminal.close();
        }
    }

    /// Bookkeeping after any change to the shape of the tree.
    fn restructured(&mut self) {
        self.refresh_active();
        let is_split = self.is_split();
        if let Some(root) = self.content.as_mut() {
            root.for_each_terminal_mut(&mut |terminal| terminal.set_is_split(is_split));
        }
        if is_split != self.announced_split {
            self.announced_split = is_split;
            self.signals.is_split.emit(&is_split);
        }
        self.signals.session_update.emit(&());
    }

    fn refresh_active(&mut self) {
        let active = self.content.as_ref().and_then(LayoutNode::active_terminal);
        if active == self.active {
            return;
        }
        self.active = active;
        self.emit_title();
    }

    fn emit_title(&self) {
        if let Some(title) = self.title() {
            self.signals.title.emit(&title);
        }
    }

    /// Structural problems with the current tree, empty when all is well.
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut problems = Vec::new();
        match (&self.content, self.active) {
            (None, Some(active)) => {
                problems.push(format!("active terminal {} in an empty tab", active));
            }
            (Some(_), None) => problems.push("tab has content but no active terminal".to_string()),
            (Some(root), Some(active)) => {
                if !root.contains(active) {
                    problems.push(format!("active terminal {} is not in the tree", active));
                }
                if !root.is_complete() {
                    problems.push("a split is missing a child".to_string());
                }
            }
            (None, None) => {}
        }
        problems
    }
}
