//! Declarative, backtracking pattern matching over trees.
//!
//! Transforms describe idioms as [`Pattern`] templates instead of hand-written walks.
//! The engine is generic over [`PatternTree`], implemented by the instruction arena
//! ([`crate::il::ILFunction`]) and the syntax tree ([`crate::ast::SyntaxTree`]), so both
//! sides of the pipeline share one matcher.
//!
//! # Bindings and backtracking
//!
//! A successful match records named captures in a [`Match`]. Captures live in a
//! persistent map (`imbl`), so taking a snapshot before trying an alternative is O(1)
//! and a failed alternative is undone by restoring the snapshot. Nothing a failed
//! alternative bound is visible afterwards, including bindings made deep inside nested
//! choices, optional children or repetitions.
//!
//! # Pattern kinds
//!
//! - [`Pattern::Any`] - Matches any single node
//! - [`Pattern::Exact`] - Matches a node structurally equal to a template node
//! - [`Pattern::Node`] - Matches a node satisfying a predicate, optionally with a child
//!   sequence pattern
//! - [`Pattern::Group`] - Captures whatever the inner pattern matched under a name
//! - [`Pattern::Backreference`] - Matches a node structurally equal to an earlier capture
//! - [`Pattern::IdentifierBackreference`] - Matches a node whose identifier equals the
//!   identifier of an earlier capture
//! - [`Pattern::Choice`] - Ordered alternatives
//! - [`Pattern::Optional`] / [`Pattern::Repeat`] - Only meaningful inside child sequences
//!
//! # Usage
//!
//! ```rust,ignore
//! // stloc v(binary.add(ldloc v, <any>))
//! let pattern = Pattern::node(
//!     |f: &ILFunction, n| f.opcode(n) == OpCode::StLoc,
//!     vec![Pattern::node(
//!         |f: &ILFunction, n| f.opcode(n) == OpCode::BinaryNumeric,
//!         vec![Pattern::group("load", Pattern::Any), Pattern::group("rhs", Pattern::Any)],
//!     )],
//! );
//! if let Some(m) = pattern.matches(&func, store) {
//!     let rhs = m.first("rhs");
//! }
//! ```

use std::{fmt, hash::Hash};

use imbl::{HashMap as ImHashMap, Vector};

/// A tree the pattern engine can walk.
pub trait PatternTree {
    /// Node handle type.
    type Node: Copy + Eq + Hash + fmt::Debug;

    /// Children of a node in order.
    fn pattern_children(&self, node: Self::Node) -> Vec<Self::Node>;

    /// Compares the payloads of two nodes, ignoring their children.
    fn payload_equal(&self, a: Self::Node, b: Self::Node) -> bool;

    /// Identifier carried by a node (variable or member name), if any.
    fn identifier(&self, node: Self::Node) -> Option<String>;

    /// Deep structural equality of two subtrees.
    fn structurally_equal(&self, a: Self::Node, b: Self::Node) -> bool {
        if !self.payload_equal(a, b) {
            return false;
        }
        let left = self.pattern_children(a);
        let right = self.pattern_children(b);
        left.len() == right.len()
            && left
                .iter()
                .zip(right.iter())
                .all(|(&l, &r)| self.structurally_equal(l, r))
    }
}

/// Named captures of a successful match.
#[derive(Debug, Clone)]
pub struct Match<N: Clone + Hash + Eq> {
    groups: ImHashMap<&'static str, Vector<N>>,
}

impl<N: Clone + Hash + Eq> Default for Match<N> {
    fn default() -> Self {
        Self {
            groups: ImHashMap::new(),
        }
    }
}

impl<N: Clone + Hash + Eq> Match<N> {
    /// Creates an empty match.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `node` under `name`.
    pub fn add(&mut self, name: &'static str, node: N) {
        self.groups.entry(name).or_default().push_back(node);
    }

    /// All nodes captured under `name`, in capture order.
    #[must_use]
    pub fn get(&self, name: &str) -> Vec<N> {
        self.groups
            .get(name)
            .map(|nodes| nodes.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// First node captured under `name`.
    #[must_use]
    pub fn first(&self, name: &str) -> Option<N> {
        self.groups.get(name).and_then(|nodes| nodes.front().cloned())
    }

    /// Most recent node captured under `name`.
    #[must_use]
    pub fn last(&self, name: &str) -> Option<N> {
        self.groups.get(name).and_then(|nodes| nodes.back().cloned())
    }

    /// Returns true if anything was captured under `name`.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }

    /// Returns true if nothing was captured at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

type Predicate<T> = Box<dyn Fn(&T, <T as PatternTree>::Node) -> bool>;

/// A tree template.
pub enum Pattern<T: PatternTree> {
    /// Any single node
    Any,
    /// A node structurally equal to the given template node
    Exact(T::Node),
    /// A node satisfying the predicate; `children` constrains the child sequence
    Node {
        /// Test applied to the node itself
        predicate: Predicate<T>,
        /// Child sequence pattern, `None` to ignore children
        children: Option<Vec<Pattern<T>>>,
    },
    /// Capture the node matched by the inner pattern
    Group(&'static str, Box<Pattern<T>>),
    /// A node structurally equal to the last capture of the group
    Backreference(&'static str),
    /// A node whose identifier equals that of the last capture of the group
    IdentifierBackreference(&'static str),
    /// The first alternative that matches
    Choice(Vec<Pattern<T>>),
    /// Zero or one occurrence (child sequences only)
    Optional(Box<Pattern<T>>),
    /// Between `min` and `max` occurrences (child sequences only)
    Repeat {
        /// Repeated pattern
        pattern: Box<Pattern<T>>,
        /// Minimum count
        min: usize,
        /// Maximum count
        max: usize,
    },
}

impl<T: PatternTree> fmt::Debug for Pattern<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Any => write!(f, "Any"),
            Pattern::Exact(node) => write!(f, "Exact({node:?})"),
            Pattern::Node { children, .. } => match children {
                Some(children) => write!(f, "Node{children:?}"),
                None => write!(f, "Node(..)"),
            },
            Pattern::Group(name, inner) => write!(f, "Group({name}, {inner:?})"),
            Pattern::Backreference(name) => write!(f, "Backreference({name})"),
            Pattern::IdentifierBackreference(name) => write!(f, "IdentifierBackreference({name})"),
            Pattern::Choice(alternatives) => write!(f, "Choice{alternatives:?}"),
            Pattern::Optional(inner) => write!(f, "Optional({inner:?})"),
            Pattern::Repeat { pattern, min, max } => write!(f, "Repeat({pattern:?}, {min}..={max})"),
        }
    }
}

impl<T: PatternTree> Pattern<T> {
    /// A predicate node with a child sequence pattern.
    pub fn node<F>(predicate: F, children: Vec<Pattern<T>>) -> Self
    where
        F: Fn(&T, T::Node) -> bool + 'static,
    {
        Pattern::Node {
            predicate: Box::new(predicate),
            children: Some(children),
        }
    }

    /// A predicate node whose children are not inspected.
    pub fn leaf<F>(predicate: F) -> Self
    where
        F: Fn(&T, T::Node) -> bool + 'static,
    {
        Pattern::Node {
            predicate: Box::new(predicate),
            children: None,
        }
    }

    /// Captures `inner` under `name`.
    #[must_use]
    pub fn group(name: &'static str, inner: Pattern<T>) -> Self {
        Pattern::Group(name, Box::new(inner))
    }

    /// Zero or one occurrence.
    #[must_use]
    pub fn optional(inner: Pattern<T>) -> Self {
        Pattern::Optional(Box::new(inner))
    }

    /// Zero or more occurrences.
    #[must_use]
    pub fn any_number_of(inner: Pattern<T>) -> Self {
        Pattern::Repeat {
            pattern: Box::new(inner),
            min: 0,
            max: usize::MAX,
        }
    }

    /// Matches `node` against the pattern with a fresh [`Match`].
    pub fn matches(&self, tree: &T, node: T::Node) -> Option<Match<T::Node>> {
        let mut m = Match::new();
        self.do_match(tree, node, &mut m).then_some(m)
    }

    /// Matches `node`, adding captures to `m`.
    ///
    /// On failure `m` is left exactly as it was on entry.
    pub fn do_match(&self, tree: &T, node: T::Node, m: &mut Match<T::Node>) -> bool {
        let snapshot = m.clone();
        if self.match_node(tree, node, m) {
            true
        } else {
            *m = snapshot;
            false
        }
    }

    fn match_node(&self, tree: &T, node: T::Node, m: &mut Match<T::Node>) -> bool {
        match self {
            Pattern::Any => true,
            Pattern::Exact(template) => tree.structurally_equal(*template, node),
            Pattern::Node {
                predicate,
                children,
            } => {
                if !predicate(tree, node) {
                    return false;
                }
                match children {
                    Some(patterns) => {
                        let nodes = tree.pattern_children(node);
                        match_sequence(patterns, &nodes, tree, m)
                    }
                    None => true,
                }
            }
            Pattern::Group(name, inner) => {
                if inner.match_node(tree, node, m) {
                    m.add(name, node);
                    true
                } else {
                    false
                }
            }
            Pattern::Backreference(name) => m
                .last(name)
                .is_some_and(|bound| tree.structurally_equal(bound, node)),
            Pattern::IdentifierBackreference(name) => m.last(name).is_some_and(|bound| {
                matches!((tree.identifier(bound), tree.identifier(node)), (Some(a), Some(b)) if a == b)
            }),
            Pattern::Choice(alternatives) => alternatives
                .iter()
                .any(|alternative| alternative.do_match(tree, node, m)),
            Pattern::Optional(inner) | Pattern::Repeat { pattern: inner, .. } => {
                // Outside a child sequence these behave like the inner pattern
                inner.match_node(tree, node, m)
            }
        }
    }
}

/// Matches a child sequence, backtracking over optional and repeated elements.
fn match_sequence<T: PatternTree>(
    patterns: &[Pattern<T>],
    nodes: &[T::Node],
    tree: &T,
    m: &mut Match<T::Node>,
) -> bool {
    let Some((first, rest)) = patterns.split_first() else {
        return nodes.is_empty();
    };
    match first {
        Pattern::Optional(inner) => {
            let snapshot = m.clone();
            if let Some((&node, remaining)) = nodes.split_first() {
                if inner.match_node(tree, node, m) && match_sequence(rest, remaining, tree, m) {
                    return true;
                }
                *m = snapshot.clone();
            }
            if match_sequence(rest, nodes, tree, m) {
                return true;
            }
            *m = snapshot;
            false
        }
        Pattern::Repeat { pattern, min, max } => {
            let snapshot = m.clone();
            // Greedy: find the longest prefix the element pattern accepts, then back off
            let mut taken = 0;
            while taken < nodes.len() && taken < *max && pattern.match_node(tree, nodes[taken], m) {
                taken += 1;
            }
            let longest = taken;
            *m = snapshot.clone();
            for count in (*min..=longest).rev() {
                let mut ok = true;
                for &node in &nodes[..count] {
                    if !pattern.match_node(tree, node, m) {
                        ok = false;
                        break;
                    }
                }
                if ok && match_sequence(rest, &nodes[count..], tree, m) {
                    return true;
                }
                *m = snapshot.clone();
            }
            false
        }
        single => {
            let Some((&node, remaining)) = nodes.split_first() else {
                return false;
            };
            let snapshot = m.clone();
            if single.match_node(tree, node, m) && match_sequence(rest, remaining, tree, m) {
                return true;
            }
            *m = snapshot;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        il::{BinaryNumericOperator, ILFunction, ILVariable, IlType, InstrId, OpCode, PrimitiveType, VariableKind},
        Result,
    };

    fn opcode_is(op: OpCode) -> impl Fn(&ILFunction, InstrId) -> bool {
        move |f, n| f.opcode(n) == op
    }

    fn setup() -> Result<(ILFunction, InstrId)> {
        let mut func = ILFunction::new("M");
        let x = func.add_variable(ILVariable::new(
            VariableKind::Local,
            IlType::primitive(PrimitiveType::I4),
            "x",
        ));
        let load = func.ld_loc(x);
        let two = func.ldc_i4(2);
        let add = func.binary(BinaryNumericOperator::Add, load, two)?;
        let store = func.st_loc(x, add)?;
        Ok((func, store))
    }

    #[test]
    fn test_group_and_backreference() -> Result<()> {
        let (mut func, store) = setup()?;
        let pattern = Pattern::node(
            opcode_is(OpCode::StLoc),
            vec![Pattern::node(
                opcode_is(OpCode::BinaryNumeric),
                vec![
                    Pattern::group("load", Pattern::leaf(opcode_is(OpCode::LdLoc))),
                    Pattern::group("rhs", Pattern::Any),
                ],
            )],
        );
        let m = pattern.matches(&func, store).ok_or(crate::Error::ForeignNode)?;
        assert_eq!(m.get("load").len(), 1);
        assert!(m.has("rhs"));

        // The bound load is structurally equal to a fresh load of the same variable
        let x = func.match_ld_loc(m.first("load").ok_or(crate::Error::ForeignNode)?);
        let fresh = func.ld_loc(x.ok_or(crate::Error::ForeignNode)?);
        let mut m2 = m.clone();
        assert!(Pattern::Backreference("load").do_match(&func, fresh, &mut m2));
        let other = func.ldc_i4(2);
        assert!(!Pattern::Backreference("load").do_match(&func, other, &mut m2));
        Ok(())
    }

    #[test]
    fn test_failed_alternative_leaks_no_bindings() -> Result<()> {
        let (func, store) = setup()?;
        let add = func.first_child(store).ok_or(crate::Error::ForeignNode)?;

        // First alternative binds "left" and then fails on the right operand
        let pattern: Pattern<ILFunction> = Pattern::Choice(vec![
            Pattern::node(
                opcode_is(OpCode::BinaryNumeric),
                vec![
                    Pattern::group("left", Pattern::Any),
                    Pattern::leaf(opcode_is(OpCode::LdNull)),
                ],
            ),
            Pattern::node(
                opcode_is(OpCode::BinaryNumeric),
                vec![Pattern::Any, Pattern::group("right", Pattern::Any)],
            ),
        ]);
        let m = pattern.matches(&func, add).ok_or(crate::Error::ForeignNode)?;
        assert!(!m.has("left"));
        assert!(m.has("right"));

        let failing: Pattern<ILFunction> = Pattern::node(
            opcode_is(OpCode::BinaryNumeric),
            vec![
                Pattern::group("left", Pattern::Any),
                Pattern::leaf(opcode_is(OpCode::LdNull)),
            ],
        );
        let mut existing = Match::new();
        existing.add("keep", add);
        assert!(!failing.do_match(&func, add, &mut existing));
        assert!(existing.has("keep"));
        assert!(!existing.has("left"));
        Ok(())
    }

    #[test]
    fn test_repeat_backtracks() -> Result<()> {
        let mut func = ILFunction::new("M");
        let nops: Vec<InstrId> = (0..3).map(|_| func.nop()).collect();
        let tail = func.ldc_i4(1);
        let mut children = nops.clone();
        children.push(tail);
        let block = func.block(&children)?;

        // nop* followed by a group that must be the last nop and then the constant
        let pattern: Pattern<ILFunction> = Pattern::node(
            opcode_is(OpCode::Block),
            vec![
                Pattern::any_number_of(Pattern::group("prefix", Pattern::leaf(opcode_is(OpCode::Nop)))),
                Pattern::group("last_nop", Pattern::leaf(opcode_is(OpCode::Nop))),
                Pattern::leaf(opcode_is(OpCode::LdcI4)),
            ],
        );
        let m = pattern.matches(&func, block).ok_or(crate::Error::ForeignNode)?;
        assert_eq!(m.get("prefix").len(), 2);
        assert_eq!(m.first("last_nop"), Some(nops[2]));

        let optional: Pattern<ILFunction> = Pattern::node(
            opcode_is(OpCode::Block),
            vec![
                Pattern::optional(Pattern::leaf(opcode_is(OpCode::LdNull))),
                Pattern::any_number_of(Pattern::Any),
            ],
        );
        assert!(optional.matches(&func, block).is_some());
        Ok(())
    }
}
