//! The ordered set of tabs in a window and the loop that drives them.

use std::cell::{Cell, RefCell};
use std::path::Path;
use std::rc::Rc;

use tracing::{debug, info, warn};

use crate::config::{Behavior, Config};
use crate::event::{AppEvent, IdleTask, LoopHandle, LoopReceivers};
use crate::session::{store, SessionState, TabState};
use crate::signal::Subscription;
use crate::tab::{TabContent, TabId};
use crate::terminal::{Spawn, TerminalFactory};

pub struct NotebookTab {
    content: TabContent,
    /// Follows the active terminal's title.
    label: Rc<RefCell<String>>,
    custom_label: Option<String>,
    _subscriptions: Vec<Subscription>,
}

impl NotebookTab {
    pub fn content(&self) -> &TabContent {
        &self.content
    }

    pub fn content_mut(&mut self) -> &mut TabContent {
        &mut self.content
    }

    pub fn label(&self) -> String {
        match &self.custom_label {
            Some(label) => label.clone(),
            None => self.label.borrow().clone(),
        }
    }

    pub fn custom_label(&self) -> Option<&str> {
        self.custom_label.as_deref()
    }
}

pub struct Notebook {
    tabs: Vec<NotebookTab>,
    active_tab: usize,
    handle: LoopHandle,
    behavior: Behavior,
    factory: Box<dyn TerminalFactory>,
    dirty: Rc<Cell<bool>>,
}

impl Notebook {
    pub fn new(handle: LoopHandle, behavior: Behavior, factory: Box<dyn TerminalFactory>) -> Self {
        Self {
            tabs: Vec::new(),
            active_tab: 0,
            handle,
            behavior,
            factory,
            dirty: Rc::new(Cell::new(false)),
        }
    }

    /// The window at startup: the saved session when restoring is enabled
    /// and something comes back, otherwise one fresh tab.
    pub fn open(handle: LoopHandle, config: &Config, factory: Box<dyn TerminalFactory>) -> Self {
        let mut notebook = Self::new(handle, config.behavior.clone(), factory);
        if config.session.restore {
            if let Some(state) = store::load_from(&config.session.file_path()) {
                notebook.restore(&state);
            }
        }
        if notebook.is_empty() {
            notebook.new_tab(None);
        }
        notebook.take_dirty();
        notebook
    }

    pub fn tabs(&self) -> &[NotebookTab] {
        &self.tabs
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn active_tab(&self) -> usize {
        self.active_tab
    }

    pub fn set_active_tab(&mut self, index: usize) {
        if index < self.tabs.len() && index != self.active_tab {
            self.active_tab = index;
            self.dirty.set(true);
        }
    }

    pub fn tab(&self, id: TabId) -> Option<&NotebookTab> {
        self.tabs.iter().find(|t| t.content.id() == id)
    }

    pub fn tab_mut(&mut self, id: TabId) -> Option<&mut NotebookTab> {
        self.tabs.iter_mut().find(|t| t.content.id() == id)
    }

    /// Rename a tab; `None` goes back to following the terminal title.
    pub fn set_custom_label(&mut self, id: TabId, label: Option<String>) {
        if let Some(tab) = self.tab_mut(id) {
            tab.custom_label = label;
            self.dirty.set(true);
        }
    }

    fn wire(&self, content: TabContent, custom_label: Option<String>) -> NotebookTab {
        let label = Rc::new(RefCell::new(content.title().unwrap_or_default()));
        let follow = label.clone();
        let dirty = self.dirty.clone();
        let subscriptions = vec![
            content
                .signals()
                .title
                .connect(move |title| *follow.borrow_mut() = title.clone()),
            content
                .signals()
                .session_update
                .connect(move |_| dirty.set(true)),
        ];
        NotebookTab {
            content,
            label,
            custom_label,
            _subscriptions: subscriptions,
        }
    }

    /// Open a tab holding one fresh terminal and make it the active tab.
    pub fn new_tab(&mut self, cwd: Option<&Path>) -> Option<TabId> {
        let terminal = match self.factory.create(Spawn::Fresh { cwd }) {
            Ok(terminal) => terminal,
            Err(e) => {
                warn!("could not open a new tab: {}", e);
                return None;
            }
        };
        let mut tab = self.wire(TabContent::new(self.handle.clone(), &self.behavior), None);
        tab.content.set_terminal(terminal);
        let id = tab.content.id();
        self.tabs.push(tab);
        self.active_tab = self.tabs.len() - 1;
        info!("opened tab {}", id);
        Some(id)
    }

    /// Move the active tab's divider by `steps` configured increments.
    pub fn nudge_divider(&mut self, steps: f64) -> bool {
        let delta = steps * self.behavior.split_step;
        match self.tabs.get_mut(self.active_tab) {
            Some(tab) => tab.content.adjust_split_position(delta),
            None => false,
        }
    }

    pub fn close_tab(&mut self, id: TabId) {
        if let Some(tab) = self.tab_mut(id) {
            tab.content.close();
        }
        self.remove_destroyed();
    }

    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Terminal {
                tab,
                terminal,
                event,
            } => {
                let factory = self.factory.as_mut();
                match self.tabs.iter_mut().find(|t| t.content.id() == tab) {
                    Some(target) => {
                        target
                            .content
                            .handle_terminal_event(terminal, event, factory)
                    }
                    None => debug!("dropping {:?} for unknown tab {}", event, tab),
                }
            }
            AppEvent::CloseTab(id) => self.close_tab(id),
        }
        self.remove_destroyed();
    }

    pub fn run_idle(&mut self, task: IdleTask) {
        if let Some(tab) = self.tab_mut(task.tab) {
            tab.content.run_idle(task);
        }
        self.remove_destroyed();
    }

    fn remove_destroyed(&mut self) {
        let before = self.tabs.len();
        let active = self.tabs.get(self.active_tab).map(|t| t.content.id());
        self.tabs.retain(|t| !t.content.is_destroyed());
        if self.tabs.len() == before {
            return;
        }
        debug!("removed {} destroyed tabs", before - self.tabs.len());
        self.active_tab = active
            .and_then(|id| self.tabs.iter().position(|t| t.content.id() == id))
            .unwrap_or_else(|| self.active_tab.min(self.tabs.len().saturating_sub(1)));
        self.dirty.set(true);
    }

    /// Whether anything worth saving changed since the last call.
    pub fn take_dirty(&self) -> bool {
        self.dirty.replace(false)
    }

    pub fn snapshot(&self) -> SessionState {
        let mut tabs = Vec::with_capacity(self.tabs.len());
        let mut active_tab = 0;
        for (index, tab) in self.tabs.iter().enumerate() {
            let Some(content) = tab.content.serialize() else {
                continue;
            };
            if index == self.active_tab {
                active_tab = tabs.len();
            }
            tabs.push(TabState {
                label: tab.custom_label.clone(),
                content,
            });
        }
        SessionState::new(tabs, active_tab)
    }

    /// Append the tabs of a saved session. Returns how many came back.
    pub fn restore(&mut self, state: &SessionState) -> usize {
        let first_new = self.tabs.len();
        let mut active = None;
        for (index, saved) in state.tabs.iter().enumerate() {
            let mut tab = self.wire(
                TabContent::new(self.handle.clone(), &self.behavior),
                saved.label.clone(),
            );
            if !tab.content.deserialize(&saved.content, self.factory.as_mut()) {
                warn!("could not restore tab {} of saved session", index);
                continue;
            }
            if index == state.active_tab {
                active = Some(self.tabs.len());
            }
            self.tabs.push(tab);
        }
        let restored = self.tabs.len() - first_new;
        if restored > 0 {
            self.active_tab = active.unwrap_or(first_new);
        }
        info!("restored {} of {} saved tabs", restored, state.tabs.len());
        restored
    }

    /// Drive the notebook until its last tab is gone. Pending events are
    /// always handled before idle tasks. With a `save_path`, the session is
    /// written out after every turn that changed something.
    pub async fn run(&mut self, receivers: &mut LoopReceivers, save_path: Option<&Path>) {
        while !self.is_empty() {
            tokio::select! {
                biased;
                event = receivers.events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                task = receivers.idle.recv() => match task {
                    Some(task) => self.run_idle(task),
                    None => break,
                },
            }

            if self.is_empty() {
                break;
            }
            if !self.take_dirty() {
                continue;
            }
            if let Some(path) = save_path {
                if let Err(e) = store::save_to(&self.snapshot(), path) {
                    warn!("failed to save session: {:#}", e);
                }
            }
        }
        info!("last tab closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event;
    use crate::layout::{LayoutNode, Orientation, Split};
    use crate::terminal::{TerminalEvent, TerminalEvents, TerminalId};
    use crate::testing::{FakeFactory, Probe, SharedProbe};

    fn notebook() -> (Notebook, LoopReceivers, SharedProbe) {
        let (handle, rx) = event::channel();
        let probe = Probe::shared();
        let factory = FakeFactory::new(&probe);
        (
            Notebook::new(handle, Behavior::default(), Box::new(factory)),
            rx,
            probe,
        )
    }

    fn events_of(probe: &SharedProbe, id: TerminalId) -> TerminalEvents {
        probe.borrow().events.get(&id).cloned().unwrap()
    }

    fn pump(notebook: &mut Notebook, rx: &mut LoopReceivers) {
        loop {
            if let Ok(event) = rx.events.try_recv() {
                notebook.handle_event(event);
            } else if let Ok(task) = rx.idle.try_recv() {
                notebook.run_idle(task);
            } else {
                break;
            }
        }
    }

    #[test]
    fn test_new_tab_becomes_active() {
        let (mut nb, _rx, _probe) = notebook();
        let first = nb.new_tab(None).unwrap();
        let second = nb.new_tab(None).unwrap();
        assert_ne!(first, second);
        assert_eq!(nb.tabs().len(), 2);
        assert_eq!(nb.active_tab(), 1);
        assert_eq!(nb.tabs()[0].label(), "term1");
    }

    #[test]
    fn test_label_follows_active_terminal() {
        let (mut nb, mut rx, probe) = notebook();
        let id = nb.new_tab(None).unwrap();
        let t1 = nb.tab(id).unwrap().content().active_terminal().unwrap();

        events_of(&probe, t1).emit(TerminalEvent::SplitRequested(Orientation::Horizontal));
        pump(&mut nb, &mut rx);
        assert_eq!(nb.tab(id).unwrap().label(), "term2");

        events_of(&probe, t1).emit(TerminalEvent::FocusIn);
        pump(&mut nb, &mut rx);
        assert_eq!(nb.tab(id).unwrap().label(), "term1");
    }

    #[test]
    fn test_custom_label_overrides_title() {
        let (mut nb, _rx, _probe) = notebook();
        let id = nb.new_tab(None).unwrap();
        nb.take_dirty();
        nb.set_custom_label(id, Some("server".to_string()));
        assert!(nb.take_dirty());
        assert_eq!(nb.tab(id).unwrap().label(), "server");
        assert_eq!(nb.snapshot().tabs[0].label.as_deref(), Some("server"));

        nb.set_custom_label(id, None);
        assert_eq!(nb.tab(id).unwrap().label(), "term1");
        assert_eq!(nb.snapshot().tabs[0].label, None);
    }

    #[test]
    fn test_tab_is_removed_when_its_last_terminal_exits() {
        let (mut nb, mut rx, probe) = notebook();
        let first = nb.new_tab(None).unwrap();
        nb.new_tab(None).unwrap();
        nb.set_active_tab(0);
        let t1 = nb.tab(first).unwrap().content().active_terminal().unwrap();

        events_of(&probe, t1).emit(TerminalEvent::Destroyed);
        pump(&mut nb, &mut rx);
        assert_eq!(nb.tabs().len(), 1);
        assert!(nb.tab(first).is_none());
        assert_eq!(nb.active_tab(), 0);
    }

    #[test]
    fn test_nudge_divider_uses_configured_step() {
        let (handle, mut rx) = event::channel();
        let probe = Probe::shared();
        let behavior = Behavior {
            split_step: 0.1,
            ..Behavior::default()
        };
        let mut nb = Notebook::new(handle, behavior, Box::new(FakeFactory::new(&probe)));
        let id = nb.new_tab(None).unwrap();
        assert!(!nb.nudge_divider(1.0));

        let t1 = nb.tab(id).unwrap().content().active_terminal().unwrap();
        events_of(&probe, t1).emit(TerminalEvent::SplitRequested(Orientation::Horizontal));
        pump(&mut nb, &mut rx);
        assert!(nb.nudge_divider(-2.0));
        let position = nb
            .tab(id)
            .and_then(|tab| tab.content().content())
            .and_then(LayoutNode::as_split)
            .map(Split::position)
            .unwrap();
        assert!((position - 0.3).abs() < 1e-9);
    }

    fn config_at(path: &Path, restore: bool) -> Config {
        let mut config = Config::default();
        config.session.path = Some(path.to_path_buf());
        config.session.restore = restore;
        config
    }

    #[test]
    fn test_open_restores_saved_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let saved = SessionState::from_value(&serde_json::json!({
            "tabs": [{"type": "terminal", "title": "a"}, {"type": "terminal", "title": "b"}],
            "active_tab": 1
        }))
        .unwrap();
        store::save_to(&saved, &path).unwrap();

        let (handle, _rx) = event::channel();
        let probe = Probe::shared();
        let nb = Notebook::open(handle, &config_at(&path, true), Box::new(FakeFactory::new(&probe)));
        assert_eq!(nb.tabs().len(), 2);
        assert_eq!(nb.active_tab(), 1);
        assert!(!nb.take_dirty());
    }

    #[test]
    fn test_open_without_restore_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let saved = SessionState::from_value(&serde_json::json!({"title": "old"})).unwrap();
        store::save_to(&saved, &path).unwrap();

        let (handle, _rx) = event::channel();
        let probe = Probe::shared();
        let nb = Notebook::open(handle, &config_at(&path, false), Box::new(FakeFactory::new(&probe)));
        assert_eq!(nb.tabs().len(), 1);
        assert_eq!(nb.tabs()[0].label(), "term1");
    }

    #[test]
    fn test_close_tab_closes_its_terminals() {
        let (mut nb, _rx, probe) = notebook();
        let id = nb.new_tab(None).unwrap();
        let t1 = nb.tab(id).unwrap().content().active_terminal().unwrap();
        nb.handle_event(AppEvent::CloseTab(id));
        assert!(nb.is_empty());
        assert!(probe.borrow().was_closed(t1));
    }

    #[test]
    fn test_events_for_unknown_tab_are_dropped() {
        let (mut nb, _rx, _probe) = notebook();
        nb.new_tab(None).unwrap();
        nb.handle_event(AppEvent::Terminal {
            tab: TabId::new_v4(),
            terminal: TerminalId::new_v4(),
            event: TerminalEvent::UnsplitRequested,
        });
        assert_eq!(nb.tabs().len(), 1);
    }

    #[test]
    fn test_snapshot_and_restore() {
        let (mut nb, mut rx, probe) = notebook();
        let id = nb.new_tab(None).unwrap();
        let t1 = nb.tab(id).unwrap().content().active_terminal().unwrap();
        events_of(&probe, t1).emit(TerminalEvent::SplitRequested(Orientation::Vertical));
        pump(&mut nb, &mut rx);
        nb.new_tab(None).unwrap();
        nb.set_active_tab(0);

        let state = nb.snapshot();
        assert_eq!(state.tabs.len(), 2);
        assert_eq!(state.active_tab, 0);
        assert_eq!(state.terminal_count(), 3);

        let (mut other, _rx2, _probe2) = notebook();
        assert_eq!(other.restore(&state), 2);
        assert_eq!(other.active_tab(), 0);
        assert!(other.tabs()[0].content().is_split());
        assert_eq!(other.snapshot().tabs, state.tabs);
    }

    #[test]
    fn test_restore_skips_tabs_that_cannot_come_back() {
        let value = serde_json::json!({
            "version": 2,
            "active_tab": 1,
            "tabs": [
                {"content": {"type": "terminal", "fail": true}},
                {"content": {"type": "terminal", "title": "kept"}}
            ]
        });
        let state = SessionState::from_value(&value).unwrap();
        let (mut nb, _rx, _probe) = notebook();
        assert_eq!(nb.restore(&state), 1);
        assert_eq!(nb.active_tab(), 0);
        assert_eq!(nb.tabs()[0].label(), "kept");
    }

    #[tokio::test]
    async fn test_run_saves_after_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let (mut nb, mut rx, probe) = notebook();
        let id = nb.new_tab(None).unwrap();
        let t1 = nb.tab(id).unwrap().content().active_terminal().unwrap();
        let events = events_of(&probe, t1);

        events.emit(TerminalEvent::SplitRequested(Orientation::Horizontal));
        nb.handle.send(AppEvent::CloseTab(id));
        nb.run(&mut rx, Some(&path)).await;

        assert!(nb.is_empty());
        let saved = store::load_from(&path).unwrap();
        assert_eq!(saved.tabs.len(), 1);
        assert_eq!(saved.terminal_count(), 2);
    }

    #[tokio::test]
    async fn test_run_handles_idle_after_events() {
        let (mut nb, mut rx, probe) = notebook();
        let id = nb.new_tab(None).unwrap();
        let t1 = nb.tab(id).unwrap().content().active_terminal().unwrap();
        events_of(&probe, t1).emit(TerminalEvent::SplitRequested(Orientation::Vertical));
        pump(&mut nb, &mut rx);
        let t2 = nb.tab(id).unwrap().content().active_terminal().unwrap();

        // Both exits arrive before the deferred collapse gets to run
        events_of(&probe, t2).emit(TerminalEvent::Destroyed);
        events_of(&probe, t1).emit(TerminalEvent::Destroyed);
        nb.run(&mut rx, None).await;

        assert!(nb.is_empty());
        assert!(rx.idle.try_recv().is_err());
    }
}
