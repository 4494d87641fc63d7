//! The instruction arena of one function body.
//!
//! [`ILFunction`] owns every instruction node and every variable of a body. Nodes are
//! addressed by [`InstrId`] and linked into a tree through index fields (parent, first
//! and last child, previous and next sibling) instead of references, so detaching,
//! re-attaching and replacing subtrees only rewrites a handful of indices.
//!
//! # Connectedness
//!
//! A node is *connected* when its root is the function body. Connecting and
//! disconnecting subtrees maintains two derived relations:
//!
//! - the use lists of [`crate::il::ILVariable`] (loads, stores, address-of),
//! - the `incoming_edge_count` of every block targeted by a connected branch.
//!
//! Detached subtrees are inert: they reference variables and blocks but are not counted.
//!
//! # Mutation discipline
//!
//! All structural edits go through [`ILFunction::add_child`], [`ILFunction::insert_child`],
//! [`ILFunction::replace_with`] and [`ILFunction::detach`]. A node must be detached (or
//! cloned) before it is attached somewhere else; attaching a node that still has a parent
//! returns [`crate::Error::NodeAttached`]. Parent/sibling consistency is checked with
//! debug assertions after every edit and can be verified explicitly with
//! [`ILFunction::validate`].
//!
//! # Flags
//!
//! [`ILFunction::flags`] computes [`InstructionFlags`] bottom-up and caches them per node.
//! Any edit clears the cache of the edited node and all of its ancestors.

use std::{cell::Cell, fmt};

use rustc_hash::FxHashMap;

use crate::{
    il::{
        flags::InstructionFlags,
        opcode::{BinaryNumericOperator, InstructionKind, OpCode},
        types::{IlType, StackType},
        variable::{ILVariable, VarId, VariableUse},
        ContainerKind,
    },
    Error, Result,
};

/// Identifier of an instruction node inside one [`ILFunction`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrId(usize);

impl InstrId {
    /// Creates a new instruction identifier.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the underlying index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for InstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "I{}", self.0)
    }
}

impl fmt::Display for InstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "I{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct Node {
    kind: InstructionKind,
    parent: Option<InstrId>,
    first_child: Option<InstrId>,
    last_child: Option<InstrId>,
    prev_sibling: Option<InstrId>,
    next_sibling: Option<InstrId>,
    child_count: usize,
    connected: bool,
    /// Position in the referenced variable's use list while connected
    use_index: usize,
    flags: Cell<Option<InstructionFlags>>,
}

impl Node {
    fn new(kind: InstructionKind) -> Self {
        Self {
            kind,
            parent: None,
            first_child: None,
            last_child: None,
            prev_sibling: None,
            next_sibling: None,
            child_count: 0,
            connected: false,
            use_index: 0,
            flags: Cell::new(None),
        }
    }
}

/// Iterator over the children of a node, in slot order.
pub struct Children<'a> {
    func: &'a ILFunction,
    next: Option<InstrId>,
}

impl Iterator for Children<'_> {
    type Item = InstrId;

    fn next(&mut self) -> Option<InstrId> {
        let current = self.next?;
        self.next = self.func.nodes[current.0].next_sibling;
        Some(current)
    }
}

/// A function body: instruction arena, variables and the root container.
#[derive(Debug, Clone)]
pub struct ILFunction {
    name: String,
    return_type: IlType,
    nodes: Vec<Node>,
    variables: Vec<ILVariable>,
    body: InstrId,
}

impl ILFunction {
    /// Creates an empty function whose body is an empty, connected block container.
    ///
    /// # Arguments
    ///
    /// * `name` - Method name, used in logging and in the generated declaration
    #[must_use]
    pub fn new(name: &str) -> Self {
        let mut root = Node::new(InstructionKind::BlockContainer {
            kind: ContainerKind::Normal,
            expected_result_type: StackType::Void,
        });
        root.connected = true;
        Self {
            name: name.to_string(),
            return_type: IlType::Void,
            nodes: vec![root],
            variables: Vec::new(),
            body: InstrId(0),
        }
    }

    /// Method name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared return type, `void` unless set.
    #[must_use]
    pub fn return_type(&self) -> &IlType {
        &self.return_type
    }

    /// Sets the declared return type.
    pub fn set_return_type(&mut self, ty: IlType) {
        self.return_type = ty;
    }

    /// The root block container.
    #[must_use]
    pub fn body(&self) -> InstrId {
        self.body
    }

    /// Number of nodes ever allocated, including detached ones.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // ============================================================================================
    // Variables
    // ============================================================================================

    /// Registers a variable and returns its identifier.
    pub fn add_variable(&mut self, variable: ILVariable) -> VarId {
        self.variables.push(variable);
        VarId::new(self.variables.len() - 1)
    }

    /// Returns a variable by identifier.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not created by this function.
    #[must_use]
    pub fn variable(&self, id: VarId) -> &ILVariable {
        &self.variables[id.index()]
    }

    /// Mutable access to a variable's name and type.
    ///
    /// Use lists stay owned by the arena and cannot be edited through this reference.
    pub fn variable_mut(&mut self, id: VarId) -> &mut ILVariable {
        &mut self.variables[id.index()]
    }

    /// Iterates over all variables with their identifiers.
    pub fn variables(&self) -> impl Iterator<Item = (VarId, &ILVariable)> {
        self.variables
            .iter()
            .enumerate()
            .map(|(idx, var)| (VarId::new(idx), var))
    }

    // ============================================================================================
    // Node access
    // ============================================================================================

    fn check_id(&self, id: InstrId) -> Result<()> {
        if id.0 < self.nodes.len() {
            Ok(())
        } else {
            Err(Error::ForeignNode)
        }
    }

    /// Allocates a detached node.
    pub fn create(&mut self, kind: InstructionKind) -> InstrId {
        self.nodes.push(Node::new(kind));
        InstrId(self.nodes.len() - 1)
    }

    /// Payload of a node.
    #[must_use]
    pub fn kind(&self, id: InstrId) -> &InstructionKind {
        &self.nodes[id.0].kind
    }

    /// Tag of a node.
    #[must_use]
    pub fn opcode(&self, id: InstrId) -> OpCode {
        self.nodes[id.0].kind.opcode()
    }

    /// Parent of a node, `None` for the body and for detached roots.
    #[must_use]
    pub fn parent(&self, id: InstrId) -> Option<InstrId> {
        self.nodes[id.0].parent
    }

    /// Children in slot order.
    #[must_use]
    pub fn children(&self, id: InstrId) -> Children<'_> {
        Children {
            func: self,
            next: self.nodes[id.0].first_child,
        }
    }

    /// Children collected into a vector, for callers that edit while iterating.
    #[must_use]
    pub fn child_list(&self, id: InstrId) -> Vec<InstrId> {
        self.children(id).collect()
    }

    /// The child at `index`.
    #[must_use]
    pub fn child(&self, id: InstrId, index: usize) -> Option<InstrId> {
        self.children(id).nth(index)
    }

    /// Number of children.
    #[must_use]
    pub fn child_count(&self, id: InstrId) -> usize {
        self.nodes[id.0].child_count
    }

    /// First child.
    #[must_use]
    pub fn first_child(&self, id: InstrId) -> Option<InstrId> {
        self.nodes[id.0].first_child
    }

    /// Last child.
    #[must_use]
    pub fn last_child(&self, id: InstrId) -> Option<InstrId> {
        self.nodes[id.0].last_child
    }

    /// Next sibling.
    #[must_use]
    pub fn next_sibling(&self, id: InstrId) -> Option<InstrId> {
        self.nodes[id.0].next_sibling
    }

    /// Previous sibling.
    #[must_use]
    pub fn prev_sibling(&self, id: InstrId) -> Option<InstrId> {
        self.nodes[id.0].prev_sibling
    }

    /// Position of a node among its siblings.
    #[must_use]
    pub fn child_index(&self, id: InstrId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).position(|child| child == id)
    }

    /// Name of the slot a node occupies in its parent.
    #[must_use]
    pub fn slot_name(&self, id: InstrId) -> Option<&'static str> {
        let parent = self.parent(id)?;
        let index = self.child_index(id)?;
        self.kind(parent).slot_layout().slot_name(index)
    }

    /// Returns true if the node hangs below the function body.
    #[must_use]
    pub fn is_connected(&self, id: InstrId) -> bool {
        self.nodes[id.0].connected
    }

    /// Ancestors from the parent up to the root.
    #[must_use]
    pub fn ancestors(&self, id: InstrId) -> Vec<InstrId> {
        let mut result = Vec::new();
        let mut current = self.parent(id);
        while let Some(node) = current {
            result.push(node);
            current = self.parent(node);
        }
        result
    }

    /// Returns true if `ancestor` is `id` or one of its ancestors.
    #[must_use]
    pub fn is_descendant_of(&self, id: InstrId, ancestor: InstrId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    /// The node and all of its descendants in pre-order.
    #[must_use]
    pub fn descendants(&self, id: InstrId) -> Vec<InstrId> {
        let mut result = Vec::new();
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            result.push(node);
            let mut child = self.nodes[node.0].last_child;
            while let Some(c) = child {
                stack.push(c);
                child = self.nodes[c.0].prev_sibling;
            }
        }
        result
    }

    /// Closest block container enclosing `id` (not `id` itself).
    #[must_use]
    pub fn find_closest_container(&self, id: InstrId) -> Option<InstrId> {
        self.ancestors(id)
            .into_iter()
            .find(|&node| self.opcode(node) == OpCode::BlockContainer)
    }

    /// Incoming branch count of a block (0 for non-blocks).
    #[must_use]
    pub fn incoming_edge_count(&self, block: InstrId) -> u32 {
        match self.kind(block) {
            InstructionKind::Block {
                incoming_edge_count,
            } => *incoming_edge_count,
            _ => 0,
        }
    }

    /// Entry block of a container.
    #[must_use]
    pub fn entry_block(&self, container: InstrId) -> Option<InstrId> {
        self.first_child(container)
    }

    // ============================================================================================
    // Structural edits
    // ============================================================================================

    fn check_attachable(&self, parent: InstrId, child: InstrId) -> Result<()> {
        self.check_id(parent)?;
        self.check_id(child)?;
        if child == self.body || self.nodes[child.0].parent.is_some() {
            return Err(Error::NodeAttached(child.to_string()));
        }
        if self.is_descendant_of(parent, child) {
            return Err(invariant_error!(
                "attaching {} below {} would create a cycle",
                child,
                parent
            ));
        }
        Ok(())
    }

    /// Appends a detached node as the last child of `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NodeAttached`] if `child` still has a parent, or
    /// [`Error::InvariantViolation`] if the edit would create a cycle.
    pub fn add_child(&mut self, parent: InstrId, child: InstrId) -> Result<()> {
        self.check_attachable(parent, child)?;
        self.link(parent, child, None);
        self.after_attach(parent, child);
        Ok(())
    }

    /// Inserts a detached node so that it becomes child number `index` of `parent`.
    ///
    /// # Errors
    ///
    /// Same as [`ILFunction::add_child`], plus [`Error::InvalidSlot`] for an index past
    /// the end.
    pub fn insert_child(&mut self, parent: InstrId, index: usize, child: InstrId) -> Result<()> {
        self.check_attachable(parent, child)?;
        let count = self.child_count(parent);
        if index > count {
            return Err(Error::InvalidSlot {
                opcode: self.opcode(parent).into(),
                index,
            });
        }
        let before = self.child(parent, index);
        self.link(parent, child, before);
        self.after_attach(parent, child);
        Ok(())
    }

    /// Inserts a detached node directly before `anchor`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`] if `anchor` has no parent.
    pub fn insert_before(&mut self, anchor: InstrId, child: InstrId) -> Result<()> {
        let parent = self
            .parent(anchor)
            .ok_or_else(|| invariant_error!("{} has no parent", anchor))?;
        self.check_attachable(parent, child)?;
        self.link(parent, child, Some(anchor));
        self.after_attach(parent, child);
        Ok(())
    }

    /// Inserts a detached node directly after `anchor`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`] if `anchor` has no parent.
    pub fn insert_after(&mut self, anchor: InstrId, child: InstrId) -> Result<()> {
        let parent = self
            .parent(anchor)
            .ok_or_else(|| invariant_error!("{} has no parent", anchor))?;
        self.check_attachable(parent, child)?;
        let before = self.next_sibling(anchor);
        self.link(parent, child, before);
        self.after_attach(parent, child);
        Ok(())
    }

    /// Detaches a node from its parent. Detaching an already detached node is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`] when asked to detach the function body.
    pub fn detach(&mut self, id: InstrId) -> Result<()> {
        self.check_id(id)?;
        if id == self.body {
            return Err(invariant_error!("the function body cannot be detached"));
        }
        let Some(parent) = self.parent(id) else {
            return Ok(());
        };
        let was_connected = self.nodes[id.0].connected;
        self.unlink(parent, id);
        self.invalidate_flags(parent);
        if was_connected {
            self.disconnect_subtree(id)?;
        }
        #[cfg(debug_assertions)]
        self.debug_check_links(parent);
        Ok(())
    }

    /// Puts the detached node `new` into the position of `old`, detaching `old`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NodeAttached`] if `new` has a parent and
    /// [`Error::InvariantViolation`] if `old` has none.
    pub fn replace_with(&mut self, old: InstrId, new: InstrId) -> Result<()> {
        if old == new {
            return Ok(());
        }
        let parent = self
            .parent(old)
            .ok_or_else(|| invariant_error!("{} has no parent to be replaced in", old))?;
        self.check_attachable(parent, new)?;
        if self.is_descendant_of(new, old) {
            return Err(invariant_error!("{} is a descendant of {}", new, old));
        }
        self.link(parent, new, Some(old));
        self.after_attach(parent, new);
        self.detach(old)
    }

    /// Replaces the payload of a node, keeping its children.
    ///
    /// Variable uses and branch edges of the node itself are re-registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the node's previous registrations are inconsistent.
    pub fn set_kind(&mut self, id: InstrId, kind: InstructionKind) -> Result<()> {
        self.check_id(id)?;
        let connected = self.nodes[id.0].connected;
        if connected {
            self.disconnect_node(id)?;
        }
        let keep_count = match &self.nodes[id.0].kind {
            InstructionKind::Block {
                incoming_edge_count,
            } => Some(*incoming_edge_count),
            _ => None,
        };
        self.nodes[id.0].kind = match (kind, keep_count) {
            (InstructionKind::Block { .. }, Some(count)) => InstructionKind::Block {
                incoming_edge_count: count,
            },
            (kind, _) => kind,
        };
        if connected {
            self.connect_node(id);
        }
        self.invalidate_flags(id);
        Ok(())
    }

    /// Retargets a branch instruction, keeping edge counts consistent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`] if `branch` is not a branch or `target`
    /// is not a block.
    pub fn set_branch_target(&mut self, branch: InstrId, target: InstrId) -> Result<()> {
        if self.opcode(branch) != OpCode::Branch || self.opcode(target) != OpCode::Block {
            return Err(invariant_error!(
                "cannot retarget {} ({}) to {} ({})",
                branch,
                self.opcode(branch),
                target,
                self.opcode(target)
            ));
        }
        self.set_kind(branch, InstructionKind::Branch { target })
    }

    fn link(&mut self, parent: InstrId, child: InstrId, before: Option<InstrId>) {
        let prev = match before {
            Some(b) => self.nodes[b.0].prev_sibling,
            None => self.nodes[parent.0].last_child,
        };
        {
            let node = &mut self.nodes[child.0];
            node.parent = Some(parent);
            node.prev_sibling = prev;
            node.next_sibling = before;
        }
        match prev {
            Some(p) => self.nodes[p.0].next_sibling = Some(child),
            None => self.nodes[parent.0].first_child = Some(child),
        }
        match before {
            Some(b) => self.nodes[b.0].prev_sibling = Some(child),
            None => self.nodes[parent.0].last_child = Some(child),
        }
        self.nodes[parent.0].child_count += 1;
    }

    fn unlink(&mut self, parent: InstrId, child: InstrId) {
        let (prev, next) = {
            let node = &self.nodes[child.0];
            (node.prev_sibling, node.next_sibling)
        };
        match prev {
            Some(p) => self.nodes[p.0].next_sibling = next,
            None => self.nodes[parent.0].first_child = next,
        }
        match next {
            Some(n) => self.nodes[n.0].prev_sibling = prev,
            None => self.nodes[parent.0].last_child = prev,
        }
        self.nodes[parent.0].child_count -= 1;
        let node = &mut self.nodes[child.0];
        node.parent = None;
        node.prev_sibling = None;
        node.next_sibling = None;
    }

    fn after_attach(&mut self, parent: InstrId, child: InstrId) {
        self.invalidate_flags(parent);
        if self.nodes[parent.0].connected {
            self.connect_subtree(child);
        }
        #[cfg(debug_assertions)]
        self.debug_check_links(parent);
    }

    fn connect_subtree(&mut self, root: InstrId) {
        for id in self.descendants(root) {
            self.connect_node(id);
        }
    }

    fn disconnect_subtree(&mut self, root: InstrId) -> Result<()> {
        for id in self.descendants(root) {
            self.disconnect_node(id)?;
        }
        Ok(())
    }

    fn connect_node(&mut self, id: InstrId) {
        self.nodes[id.0].connected = true;
        if let Some((var, usage)) = self.nodes[id.0].kind.variable_use() {
            let list = self.variables[var.index()].uses_mut(usage);
            self.nodes[id.0].use_index = list.len();
            list.push(id);
        }
        if let InstructionKind::Branch { target } = self.nodes[id.0].kind {
            if let InstructionKind::Block {
                incoming_edge_count,
            } = &mut self.nodes[target.0].kind
            {
                *incoming_edge_count += 1;
            }
        }
    }

    fn disconnect_node(&mut self, id: InstrId) -> Result<()> {
        self.nodes[id.0].connected = false;
        if let Some((var, usage)) = self.nodes[id.0].kind.variable_use() {
            let index = self.nodes[id.0].use_index;
            let list = self.variables[var.index()].uses_mut(usage);
            check_invariant!(
                list.get(index) == Some(&id),
                "use list of {} out of sync at {}",
                var,
                id
            );
            list.swap_remove(index);
            if let Some(&moved) = list.get(index) {
                self.nodes[moved.0].use_index = index;
            }
        }
        if let InstructionKind::Branch { target } = self.nodes[id.0].kind {
            if let InstructionKind::Block {
                incoming_edge_count,
            } = &mut self.nodes[target.0].kind
            {
                check_invariant!(
                    *incoming_edge_count > 0,
                    "edge count of {} underflows",
                    target
                );
                *incoming_edge_count -= 1;
            }
        }
        Ok(())
    }

    #[cfg(debug_assertions)]
    fn debug_check_links(&self, parent: InstrId) {
        let mut prev = None;
        let mut count = 0;
        let mut current = self.nodes[parent.0].first_child;
        while let Some(child) = current {
            let node = &self.nodes[child.0];
            debug_assert_eq!(node.parent, Some(parent), "{child} has a stale parent");
            debug_assert_eq!(node.prev_sibling, prev, "{child} has a stale prev link");
            prev = Some(child);
            count += 1;
            current = node.next_sibling;
        }
        debug_assert_eq!(self.nodes[parent.0].last_child, prev);
        debug_assert_eq!(self.nodes[parent.0].child_count, count);
    }

    // ============================================================================================
    // Cloning
    // ============================================================================================

    /// Deep-copies a subtree into a new detached subtree.
    ///
    /// Branches and leaves that point into the copied subtree are redirected to the
    /// copies; references to blocks outside it are kept. Edge counts of copied blocks start
    /// at zero and grow once the copy is connected.
    pub fn clone_subtree(&mut self, id: InstrId) -> InstrId {
        let mut mapping: FxHashMap<InstrId, InstrId> = FxHashMap::default();
        let root = self.clone_node(id, &mut mapping);
        for &copy in mapping.values() {
            let retarget = match &self.nodes[copy.0].kind {
                InstructionKind::Branch { target } => mapping
                    .get(target)
                    .map(|&t| InstructionKind::Branch { target: t }),
                InstructionKind::Leave { target_container } => mapping
                    .get(target_container)
                    .map(|&t| InstructionKind::Leave {
                        target_container: t,
                    }),
                _ => None,
            };
            if let Some(kind) = retarget {
                self.nodes[copy.0].kind = kind;
            }
        }
        root
    }

    fn clone_node(&mut self, id: InstrId, mapping: &mut FxHashMap<InstrId, InstrId>) -> InstrId {
        let kind = match &self.nodes[id.0].kind {
            InstructionKind::Block { .. } => InstructionKind::Block {
                incoming_edge_count: 0,
            },
            other => other.clone(),
        };
        let copy = self.create(kind);
        mapping.insert(id, copy);
        for child in self.child_list(id) {
            let child_copy = self.clone_node(child, mapping);
            self.link(copy, child_copy, None);
        }
        copy
    }

    // ============================================================================================
    // Derived properties
    // ============================================================================================

    fn invalidate_flags(&self, id: InstrId) {
        let mut current = Some(id);
        while let Some(node) = current {
            self.nodes[node.0].flags.set(None);
            current = self.nodes[node.0].parent;
        }
    }

    /// Effects of evaluating the node, including its children.
    #[must_use]
    pub fn flags(&self, id: InstrId) -> InstructionFlags {
        if let Some(cached) = self.nodes[id.0].flags.get() {
            return cached;
        }
        let flags = self.compute_flags(id);
        self.nodes[id.0].flags.set(Some(flags));
        flags
    }

    fn children_union(&self, id: InstrId) -> InstructionFlags {
        self.children(id)
            .fold(InstructionFlags::empty(), |acc, child| acc | self.flags(child))
    }

    fn compute_flags(&self, id: InstrId) -> InstructionFlags {
        let direct = self.direct_flags(id);
        let children: Vec<InstrId> = self.child_list(id);
        match self.kind(id) {
            InstructionKind::IfInstruction => {
                let [condition, true_inst, false_inst] = children[..] else {
                    return direct | self.children_union(id);
                };
                direct
                    | self.flags(condition)
                    | InstructionFlags::combine_branches(
                        self.flags(true_inst),
                        self.flags(false_inst),
                    )
            }
            InstructionKind::Switch { .. } => {
                let Some((&value, sections)) = children.split_first() else {
                    return direct;
                };
                let combined = sections
                    .iter()
                    .map(|&section| self.flags(section))
                    .reduce(InstructionFlags::combine_branches)
                    .unwrap_or_default();
                direct | self.flags(value) | combined
            }
            InstructionKind::TryCatch => {
                let combined = children
                    .iter()
                    .map(|&child| self.flags(child))
                    .reduce(InstructionFlags::combine_branches)
                    .unwrap_or_default();
                direct | combined
            }
            InstructionKind::NullCoalescing
            | InstructionKind::ThreeValuedBoolAnd
            | InstructionKind::ThreeValuedBoolOr => {
                // The right operand is evaluated conditionally
                let [left, right] = children[..] else {
                    return direct | self.children_union(id);
                };
                direct
                    | self.flags(left)
                    | InstructionFlags::combine_branches(
                        self.flags(right),
                        InstructionFlags::empty(),
                    )
            }
            InstructionKind::BlockContainer { .. } => {
                let mut flags = (self.children_union(id)
                    & !InstructionFlags::END_POINT_UNREACHABLE)
                    | direct;
                if !self.has_leave_targeting(id) && id != self.body {
                    flags |= InstructionFlags::END_POINT_UNREACHABLE;
                }
                flags
            }
            _ => direct | self.children_union(id),
        }
    }

    fn has_leave_targeting(&self, container: InstrId) -> bool {
        self.descendants(container).into_iter().any(|node| {
            matches!(self.kind(node), InstructionKind::Leave { target_container } if *target_container == container)
        })
    }

    fn direct_flags(&self, id: InstrId) -> InstructionFlags {
        use InstructionFlags as F;
        match self.kind(id) {
            InstructionKind::Branch { .. }
            | InstructionKind::Leave { .. }
            | InstructionKind::Return
            | InstructionKind::InvalidBranch { .. } => F::MAY_BRANCH | F::END_POINT_UNREACHABLE,
            InstructionKind::Throw | InstructionKind::Rethrow => {
                F::MAY_THROW | F::END_POINT_UNREACHABLE
            }
            InstructionKind::IfInstruction
            | InstructionKind::Switch { .. }
            | InstructionKind::BlockContainer { .. }
            | InstructionKind::TryCatch
            | InstructionKind::TryFinally
            | InstructionKind::TryFault => F::CONTROL_FLOW,
            InstructionKind::TryCatchHandler { .. } => F::CONTROL_FLOW | F::MAY_WRITE_LOCALS,
            InstructionKind::Lock => F::CONTROL_FLOW | F::SIDE_EFFECT,
            InstructionKind::Using { .. } => {
                F::CONTROL_FLOW | F::SIDE_EFFECT | F::MAY_WRITE_LOCALS
            }
            InstructionKind::LdLoc { .. } => F::MAY_READ_LOCALS,
            InstructionKind::StLoc { .. } => F::MAY_WRITE_LOCALS,
            InstructionKind::LdObj { .. }
            | InstructionKind::LdFlda { .. }
            | InstructionKind::LdElema { .. }
            | InstructionKind::LdLen
            | InstructionKind::CastClass { .. }
            | InstructionKind::UnboxAny { .. } => F::MAY_THROW,
            InstructionKind::StObj { .. }
            | InstructionKind::Call { .. }
            | InstructionKind::CallVirt { .. }
            | InstructionKind::NewObj { .. }
            | InstructionKind::NewArr { .. }
            | InstructionKind::DynamicGetMember { .. }
            | InstructionKind::DynamicSetMember { .. }
            | InstructionKind::DebugBreak => F::MAY_THROW | F::SIDE_EFFECT,
            InstructionKind::Box { .. } => F::SIDE_EFFECT,
            InstructionKind::BinaryNumeric {
                operator,
                check_for_overflow,
                ..
            } => {
                if *check_for_overflow
                    || matches!(
                        operator,
                        BinaryNumericOperator::Div | BinaryNumericOperator::Rem
                    )
                {
                    F::MAY_THROW
                } else {
                    F::empty()
                }
            }
            InstructionKind::Conv {
                check_for_overflow, ..
            } => {
                if *check_for_overflow {
                    F::MAY_THROW
                } else {
                    F::empty()
                }
            }
            InstructionKind::NumericCompoundAssign {
                check_for_overflow,
                operator,
                ..
            } => {
                let mut flags = F::SIDE_EFFECT | F::MAY_THROW;
                if !*check_for_overflow && !operator.is_sign_sensitive() {
                    flags = F::SIDE_EFFECT;
                }
                if let Some(target) = self.first_child(id) {
                    if self.opcode(target) == OpCode::LdLoca {
                        flags |= F::MAY_WRITE_LOCALS;
                    }
                }
                flags
            }
            InstructionKind::NullableUnwrap { .. } => F::MAY_UNWRAP_NULL,
            _ => F::empty(),
        }
    }

    /// Evaluation-stack category of the node's result.
    #[must_use]
    pub fn stack_type(&self, id: InstrId) -> StackType {
        match self.kind(id) {
            InstructionKind::BlockContainer {
                expected_result_type,
                ..
            } => *expected_result_type,
            InstructionKind::IfInstruction => {
                let true_type = self.child(id, 1).map(|c| self.stack_type(c));
                let false_type = self.child(id, 2).map(|c| self.stack_type(c));
                match (true_type, false_type) {
                    (Some(t), Some(f)) if t == f => t,
                    _ => StackType::Void,
                }
            }
            InstructionKind::LdLoc { variable } | InstructionKind::StLoc { variable } => {
                self.variable(*variable).stack_type()
            }
            InstructionKind::LdLoca { .. }
            | InstructionKind::LdFlda { .. }
            | InstructionKind::LdsFlda { .. }
            | InstructionKind::LdElema { .. } => StackType::Ref,
            InstructionKind::LdcI4 { .. }
            | InstructionKind::SizeOf { .. }
            | InstructionKind::Comp { .. }
            | InstructionKind::LogicNot => StackType::I4,
            InstructionKind::LdcI8 { .. } => StackType::I8,
            InstructionKind::LdcF4 { .. } => StackType::F4,
            InstructionKind::LdcF8 { .. } => StackType::F8,
            InstructionKind::LdLen => StackType::I,
            InstructionKind::DefaultValue { ty }
            | InstructionKind::LdObj { ty }
            | InstructionKind::StObj { ty }
            | InstructionKind::UnboxAny { ty }
            | InstructionKind::NullableUnwrap { ty }
            | InstructionKind::NumericCompoundAssign { ty, .. } => ty.stack_type(),
            InstructionKind::BinaryNumeric {
                operator,
                left_input_type,
                right_input_type,
                is_lifted,
                ..
            } => {
                if *is_lifted {
                    StackType::O
                } else {
                    binary_result_type(*operator, *left_input_type, *right_input_type)
                }
            }
            InstructionKind::BitNot => self
                .first_child(id)
                .map_or(StackType::Unknown, |c| self.stack_type(c)),
            InstructionKind::Conv { target_type, .. } => target_type.stack_type(),
            InstructionKind::NullCoalescing => self
                .child(id, 1)
                .map_or(StackType::Unknown, |c| self.stack_type(c)),
            InstructionKind::Call { method } | InstructionKind::CallVirt { method } => {
                method.return_type.stack_type()
            }
            InstructionKind::LdNull
            | InstructionKind::LdStr { .. }
            | InstructionKind::NewObj { .. }
            | InstructionKind::NewArr { .. }
            | InstructionKind::CastClass { .. }
            | InstructionKind::IsInst { .. }
            | InstructionKind::Box { .. }
            | InstructionKind::NullableRewrap
            | InstructionKind::ThreeValuedBoolAnd
            | InstructionKind::ThreeValuedBoolOr
            | InstructionKind::DynamicGetMember { .. }
            | InstructionKind::DynamicSetMember { .. } => StackType::O,
            InstructionKind::InvalidExpression { .. } => StackType::Unknown,
            _ => StackType::Void,
        }
    }

    // ============================================================================================
    // Validation
    // ============================================================================================

    /// Verifies every invariant of the connected tree.
    ///
    /// Checks parent/sibling links, slot arity, slot kinds, connectedness, variable use
    /// lists and block edge counts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`] describing the first broken invariant.
    pub fn validate(&self) -> Result<()> {
        let reachable = self.descendants(self.body);
        let mut expected_edges: FxHashMap<InstrId, u32> = FxHashMap::default();
        let mut use_counts: FxHashMap<(VarId, VariableUse), usize> = FxHashMap::default();

        for &id in &reachable {
            let node = &self.nodes[id.0];
            if !node.connected {
                return Err(invariant_error!("{} is reachable but not connected", id));
            }
            let layout = node.kind.slot_layout();
            if !layout.accepts_count(node.child_count) {
                return Err(invariant_error!(
                    "{} ({}) has {} children",
                    id,
                    node.kind.opcode(),
                    node.child_count
                ));
            }
            let mut prev = None;
            let mut count = 0;
            for (index, child) in self.children(id).enumerate() {
                let child_node = &self.nodes[child.0];
                if child_node.parent != Some(id) || child_node.prev_sibling != prev {
                    return Err(invariant_error!("{} has inconsistent links below {}", child, id));
                }
                if index >= layout.fixed.len() {
                    if let Some(required) = node.kind.required_rest_opcode() {
                        if child_node.kind.opcode() != required {
                            return Err(invariant_error!(
                                "{} expects {} in slot {}, found {}",
                                id,
                                required,
                                index,
                                child_node.kind.opcode()
                            ));
                        }
                    }
                }
                prev = Some(child);
                count += 1;
            }
            if count != node.child_count || node.last_child != prev {
                return Err(invariant_error!("{} has a stale child count", id));
            }
            if let InstructionKind::Branch { target } = node.kind {
                if self.opcode(target) != OpCode::Block {
                    return Err(invariant_error!("{} branches to non-block {}", id, target));
                }
                *expected_edges.entry(target).or_default() += 1;
            }
            if let Some((var, usage)) = node.kind.variable_use() {
                let list = self.variable(var).uses(usage);
                if list.get(node.use_index) != Some(&id) {
                    return Err(invariant_error!("{} is missing from the uses of {}", id, var));
                }
                *use_counts.entry((var, usage)).or_default() += 1;
            }
        }

        for &id in &reachable {
            if let InstructionKind::Block {
                incoming_edge_count,
            } = self.nodes[id.0].kind
            {
                let expected = expected_edges.get(&id).copied().unwrap_or(0);
                if incoming_edge_count != expected {
                    return Err(invariant_error!(
                        "{} counts {} incoming edges, found {}",
                        id,
                        incoming_edge_count,
                        expected
                    ));
                }
            }
        }

        for (var_id, var) in self.variables() {
            for usage in [VariableUse::Load, VariableUse::Store, VariableUse::Address] {
                let expected = use_counts.get(&(var_id, usage)).copied().unwrap_or(0);
                if var.uses(usage).len() != expected {
                    return Err(invariant_error!(
                        "{} lists {} {:?} uses, found {}",
                        var_id,
                        var.uses(usage).len(),
                        usage,
                        expected
                    ));
                }
            }
        }
        Ok(())
    }
}

fn binary_result_type(operator: BinaryNumericOperator, left: StackType, right: StackType) -> StackType {
    if operator.is_shift() {
        return left;
    }
    match (left, right) {
        (l, r) if l == r && l != StackType::Ref => l,
        (StackType::Ref, StackType::Ref) if operator == BinaryNumericOperator::Sub => StackType::I,
        (StackType::I4, StackType::I) | (StackType::I, StackType::I4) => StackType::I,
        (StackType::Ref, StackType::I4 | StackType::I)
        | (StackType::I4 | StackType::I, StackType::Ref) => StackType::Ref,
        _ => StackType::Unknown,
    }
}
