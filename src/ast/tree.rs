//! The syntax tree arena and its mutable/frozen typestate.

use std::{
    fmt,
    marker::PhantomData,
    sync::atomic::{AtomicU32, Ordering},
};

use crate::{
    ast::node::{AstKind, Role},
    pattern::PatternTree,
    Error, Result,
};

static NEXT_TREE_ID: AtomicU32 = AtomicU32::new(1);

/// Typestate of a tree that can still be edited.
#[derive(Debug, Clone, Copy)]
pub struct Mutable;

/// Typestate of a finalized tree; it exposes reads only.
#[derive(Debug, Clone, Copy)]
pub struct Frozen;

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Mutable {}
    impl Sealed for super::Frozen {}
}

/// Marker trait for [`Mutable`] and [`Frozen`].
pub trait TreeState: sealed::Sealed {}
impl TreeState for Mutable {}
impl TreeState for Frozen {}

/// Handle of a node, tagged with the identity of its tree.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AstId {
    tree: u32,
    index: u32,
}

impl AstId {
    /// Position of the node in its arena.
    #[must_use]
    pub fn index(self) -> usize {
        self.index as usize
    }
}

impl fmt::Debug for AstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N{}", self.index)
    }
}

impl fmt::Display for AstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N{}", self.index)
    }
}

#[derive(Debug, Clone)]
struct AstNode {
    kind: AstKind,
    role: Role,
    parent: Option<AstId>,
    children: Vec<AstId>,
}

/// An arena of syntax nodes.
///
/// `SyntaxTree<Mutable>` carries the editing API. [`SyntaxTree::freeze`] consumes it into a
/// `SyntaxTree<Frozen>` that only offers reads, so editing finalized output is a type error:
///
/// ```rust,compile_fail
/// use cildecomp::ast::{AstKind, SyntaxTree};
///
/// let frozen = SyntaxTree::new().freeze();
/// frozen.create(AstKind::Break);
/// ```
///
/// Node handles remember which tree created them. Passing a handle to another tree's
/// editing methods fails with [`Error::ForeignNode`].
#[derive(Debug, Clone)]
pub struct SyntaxTree<S: TreeState = Mutable> {
    id: u32,
    nodes: Vec<AstNode>,
    root: Option<AstId>,
    state: PhantomData<S>,
}

impl<S: TreeState> SyntaxTree<S> {
    /// The root node, once one was set.
    #[must_use]
    pub fn root(&self) -> Option<AstId> {
        self.root
    }

    /// Number of nodes ever allocated, including detached ones.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if `id` was created by this tree.
    #[must_use]
    pub fn owns(&self, id: AstId) -> bool {
        id.tree == self.id && id.index() < self.nodes.len()
    }

    /// Fails with [`Error::ForeignNode`] unless `id` was created by this tree.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ForeignNode`] for handles of other trees.
    pub fn check(&self, id: AstId) -> Result<()> {
        if self.owns(id) {
            Ok(())
        } else {
            Err(Error::ForeignNode)
        }
    }

    fn node(&self, id: AstId) -> &AstNode {
        debug_assert!(self.owns(id), "{id} used with a foreign tree");
        &self.nodes[id.index()]
    }

    /// Payload of a node.
    #[must_use]
    pub fn kind(&self, id: AstId) -> &AstKind {
        &self.node(id).kind
    }

    /// Role the node occupies in its parent; `Root` for detached nodes.
    #[must_use]
    pub fn role(&self, id: AstId) -> Role {
        self.node(id).role
    }

    /// Parent of a node.
    #[must_use]
    pub fn parent(&self, id: AstId) -> Option<AstId> {
        self.node(id).parent
    }

    /// Children of a node in order.
    #[must_use]
    pub fn children(&self, id: AstId) -> &[AstId] {
        &self.node(id).children
    }

    /// First child under `role`.
    #[must_use]
    pub fn child(&self, id: AstId, role: Role) -> Option<AstId> {
        self.children(id).iter().copied().find(|&c| self.role(c) == role)
    }

    /// All children under `role`, in order.
    #[must_use]
    pub fn children_with_role(&self, id: AstId, role: Role) -> Vec<AstId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|&c| self.role(c) == role)
            .collect()
    }

    /// The next sibling of a node.
    #[must_use]
    pub fn next_sibling(&self, id: AstId) -> Option<AstId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let position = siblings.iter().position(|&c| c == id)?;
        siblings.get(position + 1).copied()
    }

    /// The node and all nodes below it, in pre-order.
    #[must_use]
    pub fn descendants(&self, id: AstId) -> Vec<AstId> {
        let mut result = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            result.push(current);
            stack.extend(self.children(current).iter().rev());
        }
        result
    }
}

impl SyntaxTree<Mutable> {
    /// Creates an empty tree with a fresh identity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_TREE_ID.fetch_add(1, Ordering::Relaxed),
            nodes: Vec::new(),
            root: None,
            state: PhantomData,
        }
    }

    /// Allocates a detached node.
    pub fn create(&mut self, kind: AstKind) -> AstId {
        let id = AstId {
            tree: self.id,
            index: u32::try_from(self.nodes.len()).unwrap_or(u32::MAX),
        };
        self.nodes.push(AstNode {
            kind,
            role: Role::Root,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Makes `id` the root of the tree.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ForeignNode`] or [`Error::NodeAttached`] if the node belongs to
    /// another tree or has a parent.
    pub fn set_root(&mut self, id: AstId) -> Result<()> {
        self.check(id)?;
        if self.parent(id).is_some() {
            return Err(Error::NodeAttached(id.to_string()));
        }
        self.root = Some(id);
        Ok(())
    }

    fn check_attachable(&self, parent: AstId, role: Role, child: AstId) -> Result<()> {
        self.check(parent)?;
        self.check(child)?;
        if self.parent(child).is_some() || self.root == Some(child) {
            return Err(Error::NodeAttached(child.to_string()));
        }
        let kind = self.kind(child);
        if !role.is_valid(kind) {
            return Err(Error::InvalidRole {
                role: role.name(),
                kind: kind.name(),
            });
        }
        Ok(())
    }

    /// Appends `child` to `parent` under `role`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ForeignNode`], [`Error::NodeAttached`] or [`Error::InvalidRole`]
    /// if either handle is foreign, the child has a parent, or the role rejects its kind.
    pub fn add_child(&mut self, parent: AstId, role: Role, child: AstId) -> Result<()> {
        let index = self.children(parent).len();
        self.insert_child(parent, index, role, child)
    }

    /// Inserts `child` into `parent` at `index` under `role`.
    ///
    /// # Errors
    ///
    /// See [`SyntaxTree::add_child`]; an out-of-range index is an invariant violation.
    pub fn insert_child(&mut self, parent: AstId, index: usize, role: Role, child: AstId) -> Result<()> {
        self.check_attachable(parent, role, child)?;
        if index > self.children(parent).len() {
            return Err(invariant_error!("{} has no child position {}", parent, index));
        }
        self.nodes[parent.index()].children.insert(index, child);
        let node = &mut self.nodes[child.index()];
        node.parent = Some(parent);
        node.role = role;
        Ok(())
    }

    /// Appends `child` under `role` if it is `Some`.
    ///
    /// # Errors
    ///
    /// See [`SyntaxTree::add_child`].
    pub fn add_optional(&mut self, parent: AstId, role: Role, child: Option<AstId>) -> Result<()> {
        match child {
            Some(child) => self.add_child(parent, role, child),
            None => Ok(()),
        }
    }

    /// Removes a node from its parent. The subtree stays intact and can be re-attached.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ForeignNode`] for handles of other trees.
    pub fn detach(&mut self, id: AstId) -> Result<()> {
        self.check(id)?;
        if self.root == Some(id) {
            self.root = None;
        }
        let Some(parent) = self.parent(id) else {
            return Ok(());
        };
        let siblings = &mut self.nodes[parent.index()].children;
        let position = siblings
            .iter()
            .position(|&c| c == id)
            .ok_or_else(|| invariant_error!("{} is not a child of its parent {}", id, parent))?;
        siblings.remove(position);
        let node = &mut self.nodes[id.index()];
        node.parent = None;
        node.role = Role::Root;
        Ok(())
    }

    /// Puts detached `new` where `old` is, in the same role, and detaches `old`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NodeAttached`] if `new` has a parent and [`Error::InvalidRole`] if
    /// the role of `old` rejects the kind of `new`.
    pub fn replace_with(&mut self, old: AstId, new: AstId) -> Result<()> {
        self.check(old)?;
        let Some(parent) = self.parent(old) else {
            if self.root == Some(old) {
                self.root = None;
                return self.set_root(new);
            }
            return Err(invariant_error!("{} has no parent to be replaced in", old));
        };
        let role = self.role(old);
        self.check_attachable(parent, role, new)?;
        let position = self
            .children(parent)
            .iter()
            .position(|&c| c == old)
            .ok_or_else(|| invariant_error!("{} is not a child of its parent {}", old, parent))?;
        self.detach(old)?;
        self.insert_child(parent, position, role, new)
    }

    /// Wraps an expression in a parenthesized node, which takes its place.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`SyntaxTree::replace_with`].
    pub fn wrap_in_parentheses(&mut self, expr: AstId) -> Result<AstId> {
        let wrapper = self.create(AstKind::Parenthesized);
        self.replace_with(expr, wrapper)?;
        self.add_child(wrapper, Role::Expression, expr)?;
        Ok(wrapper)
    }

    /// Finalizes the tree.
    #[must_use]
    pub fn freeze(self) -> SyntaxTree<Frozen> {
        SyntaxTree {
            id: self.id,
            nodes: self.nodes,
            root: self.root,
            state: PhantomData,
        }
    }
}

impl Default for SyntaxTree<Mutable> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: TreeState> PatternTree for SyntaxTree<S> {
    type Node = AstId;

    fn pattern_children(&self, node: AstId) -> Vec<AstId> {
        self.children(node).to_vec()
    }

    fn payload_equal(&self, a: AstId, b: AstId) -> bool {
        self.kind(a) == self.kind(b)
    }

    fn identifier(&self, node: AstId) -> Option<String> {
        match self.kind(node) {
            AstKind::Identifier { name }
            | AstKind::MemberReference { name }
            | AstKind::SimpleType { name }
            | AstKind::VariableDeclaration { name }
            | AstKind::Parameter { name } => Some(name.clone()),
            _ => None,
        }
    }
}
