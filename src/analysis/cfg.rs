//! Block-level control flow graph of one container.
//!
//! [`BlockGraph`] views the blocks of a single [`BlockContainer`] as graph nodes indexed
//! by their position in the container (the entry block is node 0). An edge `a -> b`
//! exists when block `a` contains, at any depth, a `br` targeting block `b` of the same
//! container. Branches to blocks of other containers and `leave` instructions are exits
//! and produce no edge.
//!
//! # Dominators
//!
//! [`BlockGraph::dominators`] computes the dominator tree with the Lengauer-Tarjan
//! algorithm (path compression, simple linking). Blocks unreachable from the entry have
//! no immediate dominator and are dominated by nothing but themselves.
//!
//! # Loops
//!
//! [`detect_loops`] finds natural loops: for every back edge `n -> h` where `h`
//! dominates `n`, the loop body is `h` plus every block that reaches `n` without passing
//! through `h`. Back edges sharing a header are merged into one loop.
//!
//! [`BlockContainer`]: crate::il::InstructionKind::BlockContainer

use rustc_hash::{FxHashMap, FxHashSet};

use crate::il::{ILFunction, InstrId, InstructionKind, OpCode};

const UNDEFINED: usize = usize::MAX;

/// Successor/predecessor graph over the blocks of one container.
#[derive(Debug, Clone)]
pub struct BlockGraph {
    container: InstrId,
    blocks: Vec<InstrId>,
    index: FxHashMap<InstrId, usize>,
    successors: Vec<Vec<usize>>,
    predecessors: Vec<Vec<usize>>,
}

impl BlockGraph {
    /// Builds the graph of `container`.
    #[must_use]
    pub fn new(func: &ILFunction, container: InstrId) -> Self {
        let blocks: Vec<InstrId> = func
            .children(container)
            .filter(|&child| func.opcode(child) == OpCode::Block)
            .collect();
        let index: FxHashMap<InstrId, usize> =
            blocks.iter().enumerate().map(|(i, &block)| (block, i)).collect();

        let mut successors = vec![Vec::new(); blocks.len()];
        let mut predecessors = vec![Vec::new(); blocks.len()];
        for (from, &block) in blocks.iter().enumerate() {
            for node in func.descendants(block) {
                let InstructionKind::Branch { target } = func.kind(node) else {
                    continue;
                };
                let Some(&to) = index.get(target) else {
                    continue;
                };
                if !successors[from].contains(&to) {
                    successors[from].push(to);
                    predecessors[to].push(from);
                }
            }
        }

        BlockGraph {
            container,
            blocks,
            index,
            successors,
            predecessors,
        }
    }

    /// The container this graph describes.
    #[must_use]
    pub fn container(&self) -> InstrId {
        self.container
    }

    /// Number of blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns true for a container without blocks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Block at node index `node`.
    #[must_use]
    pub fn block(&self, node: usize) -> InstrId {
        self.blocks[node]
    }

    /// Node index of `block`, if it belongs to this container.
    #[must_use]
    pub fn index_of(&self, block: InstrId) -> Option<usize> {
        self.index.get(&block).copied()
    }

    /// Successors of `node` in first-branch order.
    #[must_use]
    pub fn successors(&self, node: usize) -> &[usize] {
        &self.successors[node]
    }

    /// Predecessors of `node`.
    #[must_use]
    pub fn predecessors(&self, node: usize) -> &[usize] {
        &self.predecessors[node]
    }

    /// Nodes reachable from the entry in reverse post-order.
    #[must_use]
    pub fn reverse_post_order(&self) -> Vec<usize> {
        if self.blocks.is_empty() {
            return Vec::new();
        }
        let mut visited = vec![false; self.blocks.len()];
        let mut post_order = Vec::with_capacity(self.blocks.len());
        let mut stack = vec![(0usize, 0usize)];
        visited[0] = true;
        while let Some(&(node, next)) = stack.last() {
            if let Some(&succ) = self.successors[node].get(next) {
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
                if !visited[succ] {
                    visited[succ] = true;
                    stack.push((succ, 0));
                }
            } else {
                post_order.push(node);
                stack.pop();
            }
        }
        post_order.reverse();
        post_order
    }

    /// Computes the dominator tree rooted at the entry block.
    #[must_use]
    pub fn dominators(&self) -> DominatorTree {
        if self.blocks.is_empty() {
            return DominatorTree {
                idom: Vec::new(),
                reachable: Vec::new(),
            };
        }
        let mut lt = LengauerTarjan::new(self.blocks.len());
        lt.compute(self);
        let reachable: Vec<bool> = lt.dfnum.iter().map(|&n| n != 0).collect();
        let idom = (0..self.blocks.len())
            .map(|node| {
                if node == 0 || !reachable[node] {
                    None
                } else {
                    Some(lt.idom[node])
                }
            })
            .collect();
        DominatorTree { idom, reachable }
    }
}

/// Immediate dominators of the blocks of a [`BlockGraph`].
#[derive(Debug, Clone)]
pub struct DominatorTree {
    idom: Vec<Option<usize>>,
    reachable: Vec<bool>,
}

impl DominatorTree {
    /// Immediate dominator of `node`; `None` for the entry and unreachable blocks.
    #[must_use]
    pub fn immediate_dominator(&self, node: usize) -> Option<usize> {
        self.idom.get(node).copied().flatten()
    }

    /// Returns true if `node` is reachable from the entry.
    #[must_use]
    pub fn is_reachable(&self, node: usize) -> bool {
        self.reachable.get(node).copied().unwrap_or(false)
    }

    /// Checks if `a` dominates `b`. Every node dominates itself.
    #[must_use]
    pub fn dominates(&self, a: usize, b: usize) -> bool {
        if a == b {
            return true;
        }
        let mut current = b;
        while let Some(idom) = self.immediate_dominator(current) {
            if idom == a {
                return true;
            }
            current = idom;
        }
        false
    }
}

struct LengauerTarjan {
    dfnum: Vec<usize>,
    vertex: Vec<usize>,
    parent: Vec<usize>,
    semi: Vec<usize>,
    idom: Vec<usize>,
    ancestor: Vec<usize>,
    best: Vec<usize>,
    bucket: Vec<Vec<usize>>,
    counter: usize,
}

impl LengauerTarjan {
    fn new(n: usize) -> Self {
        LengauerTarjan {
            dfnum: vec![0; n],
            vertex: vec![UNDEFINED; n],
            parent: vec![UNDEFINED; n],
            semi: (0..n).collect(),
            idom: vec![UNDEFINED; n],
            ancestor: vec![UNDEFINED; n],
            best: (0..n).collect(),
            bucket: vec![Vec::new(); n],
            counter: 0,
        }
    }

    fn compute(&mut self, graph: &BlockGraph) {
        self.dfs(graph);

        for i in (1..self.counter).rev() {
            let w = self.vertex[i];
            let parent_w = self.parent[w];

            for &v in graph.predecessors(w) {
                if self.dfnum[v] == 0 {
                    continue;
                }
                let u = self.eval(v);
                if self.dfnum[self.semi[u]] < self.dfnum[self.semi[w]] {
                    self.semi[w] = self.semi[u];
                }
            }

            let semi_w = self.semi[w];
            self.bucket[semi_w].push(w);
            self.ancestor[w] = parent_w;

            for v in std::mem::take(&mut self.bucket[parent_w]) {
                let u = self.eval(v);
                self.idom[v] = if self.semi[u] == self.semi[v] {
                    parent_w
                } else {
                    u
                };
            }
        }

        for i in 1..self.counter {
            let w = self.vertex[i];
            if self.idom[w] != self.semi[w] {
                self.idom[w] = self.idom[self.idom[w]];
            }
        }
        self.idom[0] = 0;
    }

    fn dfs(&mut self, graph: &BlockGraph) {
        let mut stack = vec![0usize];
        while let Some(node) = stack.pop() {
            if self.dfnum[node] != 0 {
                continue;
            }
            self.counter += 1;
            self.dfnum[node] = self.counter;
            self.vertex[self.counter - 1] = node;
            // Reverse so that the first successor is visited first
            for &succ in graph.successors(node).iter().rev() {
                if self.dfnum[succ] == 0 {
                    self.parent[succ] = node;
                    stack.push(succ);
                }
            }
        }
    }

    fn eval(&mut self, v: usize) -> usize {
        if self.ancestor[v] == UNDEFINED {
            return v;
        }
        self.compress(v);
        self.best[v]
    }

    fn compress(&mut self, v: usize) {
        let ancestor_v = self.ancestor[v];
        if self.ancestor[ancestor_v] == UNDEFINED {
            return;
        }
        self.compress(ancestor_v);
        let best_ancestor = self.best[ancestor_v];
        if self.dfnum[self.semi[best_ancestor]] < self.dfnum[self.semi[self.best[v]]] {
            self.best[v] = best_ancestor;
        }
        self.ancestor[v] = self.ancestor[ancestor_v];
    }
}

/// A natural loop of a [`BlockGraph`].
#[derive(Debug, Clone)]
pub struct NaturalLoop {
    /// Loop header, the single entry of the loop
    pub header: usize,
    /// Every node of the loop, header included
    pub body: FxHashSet<usize>,
    /// Sources of the back edges
    pub latches: Vec<usize>,
}

impl NaturalLoop {
    /// Returns true if `node` belongs to the loop.
    #[must_use]
    pub fn contains(&self, node: usize) -> bool {
        self.body.contains(&node)
    }

    /// Loop nodes in container order.
    #[must_use]
    pub fn sorted_body(&self) -> Vec<usize> {
        let mut nodes: Vec<usize> = self.body.iter().copied().collect();
        nodes.sort_unstable();
        nodes
    }

    /// Nodes outside the loop that a loop node branches to, in container order.
    #[must_use]
    pub fn exit_targets(&self, graph: &BlockGraph) -> Vec<usize> {
        let mut exits: Vec<usize> = self
            .body
            .iter()
            .flat_map(|&node| graph.successors(node).iter().copied())
            .filter(|succ| !self.body.contains(succ))
            .collect();
        exits.sort_unstable();
        exits.dedup();
        exits
    }
}

/// Finds all natural loops, ordered by header position.
#[must_use]
pub fn detect_loops(graph: &BlockGraph, dominators: &DominatorTree) -> Vec<NaturalLoop> {
    let mut by_header: FxHashMap<usize, NaturalLoop> = FxHashMap::default();
    for node in 0..graph.len() {
        if !dominators.is_reachable(node) {
            continue;
        }
        for &succ in graph.successors(node) {
            if !dominators.dominates(succ, node) {
                continue;
            }
            let info = by_header.entry(succ).or_insert_with(|| NaturalLoop {
                header: succ,
                body: std::iter::once(succ).collect(),
                latches: Vec::new(),
            });
            info.latches.push(node);
            let mut worklist = vec![node];
            while let Some(current) = worklist.pop() {
                if info.body.insert(current) {
                    worklist.extend(
                        graph
                            .predecessors(current)
                            .iter()
                            .copied()
                            .filter(|&pred| dominators.is_reachable(pred)),
                    );
                }
            }
        }
    }
    let mut loops: Vec<NaturalLoop> = by_header.into_values().collect();
    loops.sort_by_key(|l| l.header);
    loops
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{il::ContainerKind, Result};

    /// Builds a container whose block `i` branches to every block in `edges[i]`.
    fn build(edges: &[&[usize]]) -> Result<(ILFunction, InstrId, Vec<InstrId>)> {
        let mut func = ILFunction::new("M");
        let container = func.container(ContainerKind::Normal);
        let body = func.body();
        let entry = func.block(&[])?;
        func.add_child(body, entry)?;
        let blocks: Vec<InstrId> = (0..edges.len())
            .map(|_| func.block(&[]))
            .collect::<Result<_>>()?;
        for &block in &blocks {
            func.add_child(container, block)?;
        }
        func.add_child(entry, container)?;
        for (from, targets) in edges.iter().enumerate() {
            let last = targets.len().saturating_sub(1);
            for (i, &to) in targets.iter().enumerate() {
                let br = func.branch(blocks[to]);
                let inst = if i < last {
                    let cond = func.ldc_i4(1);
                    func.if_then(cond, br)?
                } else {
                    br
                };
                func.add_child(blocks[from], inst)?;
            }
            if targets.is_empty() {
                let ret = func.ret(None)?;
                func.add_child(blocks[from], ret)?;
            }
        }
        Ok((func, container, blocks))
    }

    #[test]
    fn test_diamond_dominators() -> Result<()> {
        let (func, container, _) = build(&[&[1, 2], &[3], &[3], &[]])?;
        let graph = BlockGraph::new(&func, container);
        assert_eq!(graph.successors(0), &[1, 2]);
        assert_eq!(graph.predecessors(3), &[1, 2]);

        let dom = graph.dominators();
        assert_eq!(dom.immediate_dominator(0), None);
        assert_eq!(dom.immediate_dominator(1), Some(0));
        assert_eq!(dom.immediate_dominator(3), Some(0));
        assert!(dom.dominates(0, 3));
        assert!(!dom.dominates(1, 3));
        assert_eq!(graph.reverse_post_order().first(), Some(&0));
        Ok(())
    }

    #[test]
    fn test_unreachable_block() -> Result<()> {
        let (func, container, _) = build(&[&[1], &[], &[1]])?;
        let graph = BlockGraph::new(&func, container);
        let dom = graph.dominators();
        assert!(!dom.is_reachable(2));
        assert_eq!(dom.immediate_dominator(2), None);
        assert!(!dom.dominates(0, 2));
        assert!(dom.dominates(0, 1));
        Ok(())
    }

    #[test]
    fn test_detect_while_loop() -> Result<()> {
        // 0 -> 1 (head) -> {2 (body), 3 (exit)}; 2 -> 1
        let (func, container, _) = build(&[&[1], &[2, 3], &[1], &[]])?;
        let graph = BlockGraph::new(&func, container);
        let dom = graph.dominators();
        let loops = detect_loops(&graph, &dom);
        assert_eq!(loops.len(), 1);
        assert_eq!(loops[0].header, 1);
        assert_eq!(loops[0].sorted_body(), vec![1, 2]);
        assert_eq!(loops[0].latches, vec![2]);
        assert_eq!(loops[0].exit_targets(&graph), vec![3]);
        Ok(())
    }
}
