use std::fmt;

use ratatui::layout::{Constraint, Layout, Rect};
use serde::{Deserialize, Serialize};

use crate::divider::Divider;
use crate::record::{NodeRecord, SplitRecord};
use crate::terminal::{Terminal, TerminalId, TerminalRecord};

pub type SplitId = uuid::Uuid;

/// Persisted as an integer: 0 horizontal, 1 vertical.
///
/// Horizontal places the children side by side, vertical stacks them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Orientation {
    #[default]
    Horizontal,
    Vertical,
}

impl From<Orientation> for u8 {
    fn from(orientation: Orientation) -> Self {
        match orientation {
            Orientation::Horizontal => 0,
            Orientation::Vertical => 1,
        }
    }
}

impl TryFrom<u8> for Orientation {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Orientation::Horizontal),
            1 => Ok(Orientation::Vertical),
            other => Err(format!("unknown orientation {}", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    First,
    Second,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::First, Side::Second];

    pub fn other(self) -> Side {
        match self {
            Side::First => Side::Second,
            Side::Second => Side::First,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeId {
    Terminal(TerminalId),
    Split(SplitId),
}

/// Route from a root to one of its descendants.
pub type NodePath = Vec<Side>;

/// Builds a terminal for a persisted terminal record, or declines.
pub type RestoreTerminal<'a> = dyn FnMut(&TerminalRecord) -> Option<Box<dyn Terminal>> + 'a;

pub enum LayoutNode {
    Leaf(Box<dyn Terminal>),
    Split(Split),
}

/// One division of space between two children.
///
/// Children only point down; "parent of X" is answered by searching from the
/// root, so restructuring never has back-references to fix up. A split with
/// a missing child only exists between a terminal disappearing and the next
/// collapse pass.
pub struct Split {
    id: SplitId,
    orientation: Orientation,
    divider: Divider,
    child1: Option<Box<LayoutNode>>,
    child2: Option<Box<LayoutNode>>,
    last_focused: Option<Side>,
}

impl Split {
    pub fn new(orientation: Orientation, first: LayoutNode, second: LayoutNode) -> Self {
        Self {
            id: SplitId::new_v4(),
            orientation,
            divider: Divider::default(),
            child1: Some(Box::new(first)),
            child2: Some(Box::new(second)),
            last_focused: None,
        }
    }

    pub fn id(&self) -> SplitId {
        self.id
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn position(&self) -> f64 {
        self.divider.fraction()
    }

    pub fn set_position(&mut self, fraction: f64) {
        self.divider.set_fraction(fraction);
    }

    pub fn divider(&self) -> &Divider {
        &self.divider
    }

    pub fn divider_mut(&mut self) -> &mut Divider {
        &mut self.divider
    }

    pub fn last_focused(&self) -> Option<Side> {
        self.last_focused
    }

    fn slot(&self, side: Side) -> &Option<Box<LayoutNode>> {
        match side {
            Side::First => &self.child1,
            Side::Second => &self.child2,
        }
    }

    fn slot_mut(&mut self, side: Side) -> &mut Option<Box<LayoutNode>> {
        match side {
            Side::First => &mut self.child1,
            Side::Second => &mut self.child2,
        }
    }

    pub fn child(&self, side: Side) -> Option<&LayoutNode> {
        self.slot(side).as_deref()
    }

    pub fn child_mut(&mut self, side: Side) -> Option<&mut LayoutNode> {
        self.slot_mut(side).as_deref_mut()
    }

    pub fn take_child(&mut self, side: Side) -> Option<LayoutNode> {
        self.slot_mut(side).take().map(|node| *node)
    }

    /// Put `node` into `side`, returning whatever was there.
    pub fn set_child(&mut self, side: Side, node: LayoutNode) -> Option<LayoutNode> {
        self.slot_mut(side).replace(Box::new(node)).map(|old| *old)
    }

    pub fn is_complete(&self) -> bool {
        self.child1.is_some() && self.child2.is_some()
    }

    /// Every terminal below this split, first child before second.
    pub fn all_terminals(&self) -> Vec<TerminalId> {
        let mut ids = Vec::new();
        self.collect_terminals(&mut ids);
        ids
    }

    fn collect_terminals(&self, ids: &mut Vec<TerminalId>) {
        for side in Side::BOTH {
            if let Some(child) = self.child(side) {
                child.collect_terminals(ids);
            }
        }
    }

    pub fn contains(&self, target: TerminalId) -> bool {
        self.find_direct_child_containing(target).is_some()
    }

    /// Which immediate child subtree holds `target`.
    pub fn find_direct_child_containing(&self, target: TerminalId) -> Option<Side> {
        Side::BOTH
            .into_iter()
            .find(|side| self.child(*side).is_some_and(|child| child.contains(target)))
    }

    fn side_of(&self, child: NodeId) -> Option<Side> {
        Side::BOTH
            .into_iter()
            .find(|side| self.child(*side).is_some_and(|node| node.id() == child))
    }

    /// Swap the immediate child `old` for `new`. On success the old child is
    /// handed back; if `old` is not an immediate child, `new` is.
    pub fn replace_child(&mut self, old: NodeId, new: LayoutNode) -> Result<LayoutNode, LayoutNode> {
        match self.side_of(old) {
            Some(side) => match self.set_child(side, new) {
                Some(previous) => Ok(previous),
                None => unreachable!("side_of only reports occupied slots"),
            },
            None => Err(new),
        }
    }

    /// Like [`Split::replace_child`], but the replacement is built from the
    /// old child, which is moved out and back in one step.
    pub fn replace_child_with(
        &mut self,
        old: NodeId,
        build: impl FnOnce(LayoutNode) -> LayoutNode,
    ) -> bool {
        let Some(side) = self.side_of(old) else {
            return false;
        };
        let slot = self.slot_mut(side);
        if let Some(node) = slot.take() {
            *slot = Some(Box::new(build(*node)));
        }
        true
    }

    /// The focused terminal: through the last focused child when one is
    /// known, otherwise the first terminal in traversal order.
    pub fn active_terminal(&self) -> Option<TerminalId> {
        let focused = self
            .last_focused
            .and_then(|side| self.child(side))
            .and_then(LayoutNode::active_terminal);
        focused.or_else(|| self.all_terminals().into_iter().next())
    }

    pub fn serialize(&self) -> SplitRecord {
        SplitRecord {
            orientation: self.orientation,
            position: self.position(),
            first: self.child1.as_ref().map(|node| Box::new(node.serialize())),
            second: self.child2.as_ref().map(|node| Box::new(node.serialize())),
        }
    }

    /// Rebuild a split from its record. The divider fraction is held back
    /// until a layout pass has produced a real size. Children that fail to
    /// come back are left empty for the caller to collapse.
    pub fn deserialize(record: &SplitRecord, restore: &mut RestoreTerminal<'_>) -> Split {
        let first = record
            .first
            .as_deref()
            .and_then(|r| LayoutNode::deserialize(r, restore));
        let second = record
            .second
            .as_deref()
            .and_then(|r| LayoutNode::deserialize(r, restore));
        Split {
            id: SplitId::new_v4(),
            orientation: record.orientation,
            divider: Divider::restored(record.position),
            child1: first.map(Box::new),
            child2: second.map(Box::new),
            last_focused: None,
        }
    }

    /// Take a terminal out of the tree, leaving its slot empty.
    pub fn detach_terminal(&mut self, target: TerminalId) -> Option<Box<dyn Terminal>> {
        let side = self.find_direct_child_containing(target)?;
        if matches!(self.child(side), Some(LayoutNode::Leaf(_))) {
            return self.take_child(side).and_then(LayoutNode::into_terminal);
        }
        self.child_mut(side)?.as_split_mut()?.detach_terminal(target)
    }
}

impl LayoutNode {
    pub fn leaf(terminal: Box<dyn Terminal>) -> Self {
        LayoutNode::Leaf(terminal)
    }

    pub fn id(&self) -> NodeId {
        match self {
            LayoutNode::Leaf(terminal) => NodeId::Terminal(terminal.id()),
            LayoutNode::Split(split) => NodeId::Split(split.id),
        }
    }

    pub fn is_split(&self) -> bool {
        matches!(self, LayoutNode::Split(_))
    }

    pub fn as_split(&self) -> Option<&Split> {
        match self {
            LayoutNode::Split(split) => Some(split),
            LayoutNode::Leaf(_) => None,
        }
    }

    pub fn as_split_mut(&mut self) -> Option<&mut Split> {
        match self {
            LayoutNode::Split(split) => Some(split),
            LayoutNode::Leaf(_) => None,
        }
    }

    pub fn into_terminal(self) -> Option<Box<dyn Terminal>> {
        match self {
            LayoutNode::Leaf(terminal) => Some(terminal),
            LayoutNode::Split(_) => None,
        }
    }

    /// Depth-first, first child before second. Recomputed on every call.
    pub fn all_terminals(&self) -> Vec<TerminalId> {
        let mut ids = Vec::new();
        self.collect_terminals(&mut ids);
        ids
    }

    fn collect_terminals(&self, ids: &mut Vec<TerminalId>) {
        match self {
            LayoutNode::Leaf(terminal) => ids.push(terminal.id()),
            LayoutNode::Split(split) => split.collect_terminals(ids),
        }
    }

    pub fn terminal_count(&self) -> usize {
        match self {
            LayoutNode::Leaf(_) => 1,
            LayoutNode::Split(split) => Side::BOTH
                .into_iter()
                .filter_map(|side| split.child(side))
                .map(LayoutNode::terminal_count)
                .sum(),
        }
    }

    pub fn contains(&self, target: TerminalId) -> bool {
        match self {
            LayoutNode::Leaf(terminal) => terminal.id() == target,
            LayoutNode::Split(split) => split.contains(target),
        }
    }

    pub fn terminal(&self, target: TerminalId) -> Option<&dyn Terminal> {
        let path = self.path_to(target)?;
        match self.node_at(&path)? {
            LayoutNode::Leaf(terminal) => Some(&**terminal),
            LayoutNode::Split(_) => None,
        }
    }

    pub fn terminal_mut(&mut self, target: TerminalId) -> Option<&mut (dyn Terminal + 'static)> {
        let path = self.path_to(target)?;
        match self.node_at_mut(&path)? {
            LayoutNode::Leaf(terminal) => Some(&mut **terminal),
            LayoutNode::Split(_) => None,
        }
    }

    pub fn for_each_terminal_mut(&mut self, f: &mut dyn FnMut(&mut (dyn Terminal + 'static))) {
        match self {
            LayoutNode::Leaf(terminal) => f(&mut **terminal),
            LayoutNode::Split(split) => {
                for side in Side::BOTH {
                    if let Some(child) = split.child_mut(side) {
                        child.for_each_terminal_mut(f);
                    }
                }
            }
        }
    }

    pub fn path_to(&self, target: TerminalId) -> Option<NodePath> {
        self.path_to_node(NodeId::Terminal(target))
    }

    pub fn path_to_node(&self, target: NodeId) -> Option<NodePath> {
        let mut path = Vec::new();
        self.find_path(target, &mut path).then_some(path)
    }

    fn find_path(&self, target: NodeId, path: &mut NodePath) -> bool {
        if self.id() == target {
            return true;
        }
        let LayoutNode::Split(split) = self else {
            return false;
        };
        for side in Side::BOTH {
            if let Some(child) = split.child(side) {
                path.push(side);
                if child.find_path(target, path) {
                    return true;
                }
                path.pop();
            }
        }
        false
    }

    pub fn node_at(&self, path: &[Side]) -> Option<&LayoutNode> {
        let mut node = self;
        for side in path {
            node = node.as_split()?.child(*side)?;
        }
        Some(node)
    }

    pub fn node_at_mut(&mut self, path: &[Side]) -> Option<&mut LayoutNode> {
        let mut node = self;
        for side in path {
            node = node.as_split_mut()?.child_mut(*side)?;
        }
        Some(node)
    }

    /// Path of the split directly holding `target`, plus the side it sits on.
    pub fn parent_of(&self, target: TerminalId) -> Option<(NodePath, Side)> {
        let mut path = self.path_to(target)?;
        let side = path.pop()?;
        Some((path, side))
    }

    pub fn find_split_mut(&mut self, id: SplitId) -> Option<&mut Split> {
        let path = self.path_to_node(NodeId::Split(id))?;
        self.node_at_mut(&path)?.as_split_mut()
    }

    pub fn active_terminal(&self) -> Option<TerminalId> {
        match self {
            LayoutNode::Leaf(terminal) => Some(terminal.id()),
            LayoutNode::Split(split) => split.active_terminal(),
        }
    }

    /// Record focus on every split between here and `target`.
    pub fn mark_focused(&mut self, target: TerminalId) -> bool {
        match self {
            LayoutNode::Leaf(terminal) => terminal.id() == target,
            LayoutNode::Split(split) => {
                for side in Side::BOTH {
                    if let Some(child) = split.child_mut(side) {
                        if child.mark_focused(target) {
                            split.last_focused = Some(side);
                            return true;
                        }
                    }
                }
                false
            }
        }
    }

    /// Remove the `side` child of this split and put the sibling in the
    /// split's place. Declines when there is no sibling to promote.
    pub fn collapse_child(&mut self, side: Side) -> Option<LayoutNode> {
        let LayoutNode::Split(split) = self else {
            return None;
        };
        if split.child(side).is_none() || split.child(side.other()).is_none() {
            return None;
        }
        let removed = split.take_child(side)?;
        let sibling = split.take_child(side.other())?;
        *self = sibling;
        Some(removed)
    }

    /// Bottom-up pass replacing every split that has lost children: one
    /// survivor takes the split's place, none makes the split disappear.
    /// Complete splits come back untouched. Sets `changed` if anything moved.
    pub fn collapse_empty(self, changed: &mut bool) -> Option<LayoutNode> {
        match self {
            leaf @ LayoutNode::Leaf(_) => Some(leaf),
            LayoutNode::Split(mut split) => {
                let first = split
                    .take_child(Side::First)
                    .and_then(|node| node.collapse_empty(changed));
                let second = split
                    .take_child(Side::Second)
                    .and_then(|node| node.collapse_empty(changed));
                match (first, second) {
                    (Some(first), Some(second)) => {
                        split.set_child(Side::First, first);
                        split.set_child(Side::Second, second);
                        Some(LayoutNode::Split(split))
                    }
                    (Some(only), None) | (None, Some(only)) => {
                        *changed = true;
                        Some(only)
                    }
                    (None, None) => {
                        *changed = true;
                        None
                    }
                }
            }
        }
    }

    /// True when no split below here is missing a child.
    pub fn is_complete(&self) -> bool {
        match self {
            LayoutNode::Leaf(_) => true,
            LayoutNode::Split(split) => {
                split.is_complete()
                    && Side::BOTH
                        .into_iter()
                        .filter_map(|side| split.child(side))
                        .all(LayoutNode::is_complete)
            }
        }
    }

    /// Consume the tree, yielding its terminals in traversal order.
    pub fn into_terminals(self) -> Vec<Box<dyn Terminal>> {
        let mut out = Vec::new();
        self.drain_terminals(&mut out);
        out
    }

    fn drain_terminals(self, out: &mut Vec<Box<dyn Terminal>>) {
        match self {
            LayoutNode::Leaf(terminal) => out.push(terminal),
            LayoutNode::Split(mut split) => {
                for side in Side::BOTH {
                    if let Some(child) = split.take_child(side) {
                        child.drain_terminals(out);
                    }
                }
            }
        }
    }

    pub fn serialize(&self) -> NodeRecord {
        match self {
            LayoutNode::Leaf(terminal) => NodeRecord::Terminal(terminal.serialize_state()),
            LayoutNode::Split(split) => NodeRecord::Split(split.serialize()),
        }
    }

    pub fn deserialize(record: &NodeRecord, restore: &mut RestoreTerminal<'_>) -> Option<LayoutNode> {
        match record {
            NodeRecord::Terminal(fields) => restore(fields).map(LayoutNode::Leaf),
            NodeRecord::Split(split) => Some(LayoutNode::Split(Split::deserialize(split, restore))),
        }
    }

    /// Visit every split, parents before children.
    pub fn for_each_split_mut(&mut self, f: &mut dyn FnMut(&mut Split)) {
        if let LayoutNode::Split(split) = self {
            f(split);
            for side in Side::BOTH {
                if let Some(child) = split.child_mut(side) {
                    child.for_each_split_mut(f);
                }
            }
        }
    }

    /// Lay the tree out over `area`. Each split is told its available range
    /// along its axis, which drives its divider, and the children get the
    /// space on either side of the divider.
    pub fn allocate(&mut self, area: Rect) -> Vec<(TerminalId, Rect)> {
        let mut result = Vec::new();
        self.allocate_inner(area, &mut result);
        result
    }

    fn allocate_inner(&mut self, area: Rect, result: &mut Vec<(TerminalId, Rect)>) {
        match self {
            LayoutNode::Leaf(terminal) => result.push((terminal.id(), area)),
            LayoutNode::Split(split) => {
                let range = match split.orientation {
                    Orientation::Horizontal => area.width,
                    Orientation::Vertical => area.height,
                };
                split.divider.on_size_allocate(range);
                let first_len = split.divider.pixel().min(range);
                let constraints = [Constraint::Length(first_len), Constraint::Fill(1)];
                let chunks = match split.orientation {
                    Orientation::Horizontal => Layout::horizontal(constraints).split(area),
                    Orientation::Vertical => Layout::vertical(constraints).split(area),
                };
                if let Some(child) = split.child_mut(Side::First) {
                    child.allocate_inner(chunks[0], result);
                }
                if let Some(child) = split.child_mut(Side::Second) {
                    child.allocate_inner(chunks[1], result);
                }
            }
        }
    }
}

impl fmt::Debug for LayoutNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutNode::Leaf(terminal) => write!(f, "Leaf({})", terminal.id()),
            LayoutNode::Split(split) => split.fmt(f),
        }
    }
}

impl fmt::Debug for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Split")
            .field("id", &self.id)
            .field("orientation", &self.orientation)
            .field("position", &self.position())
            .field("first", &self.child1)
            .field("second", &self.child2)
            .finish()
    }
}
