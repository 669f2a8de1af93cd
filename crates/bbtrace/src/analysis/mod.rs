//! Control-flow analyses the trace pass depends on.
//!
//! Everything here is deterministic: traversals follow block layout order and
//! successor order, never hash-map iteration order.

pub mod loops;

use crate::ir::utils::terminator_successors;
use crate::ir::{Block, BlockId, Function};
use std::collections::{HashMap, HashSet};

/// Index blocks by ID for O(1) lookup during traversals.
pub fn block_map(func: &Function) -> HashMap<BlockId, &Block> {
    func.blocks.iter().map(|b| (b.id, b)).collect()
}

/// Build a map from each block ID to the set of *distinct* predecessor block
/// IDs. Every block gets an entry, even with no predecessors.
pub fn build_predecessors(func: &Function) -> HashMap<BlockId, HashSet<BlockId>> {
    let mut preds: HashMap<BlockId, HashSet<BlockId>> = HashMap::new();
    for block in &func.blocks {
        preds.entry(block.id).or_default();
    }
    for block in &func.blocks {
        for succ in terminator_successors(&block.terminator) {
            preds.entry(succ).or_default().insert(block.id);
        }
    }
    preds
}

/// Reverse postorder over the blocks reachable from the entry block.
///
/// The DFS visits successors in terminator order, so the result is fully
/// determined by the function's structure.
pub fn reverse_postorder(func: &Function) -> Vec<BlockId> {
    let Some(entry) = func.entry() else {
        return vec![];
    };
    let blocks = block_map(func);

    // Iterative DFS; the second stack element tracks whether the node's
    // successors have been pushed yet.
    let mut postorder = Vec::with_capacity(func.blocks.len());
    let mut visited = HashSet::new();
    let mut stack = vec![(entry.id, false)];
    while let Some((id, expanded)) = stack.pop() {
        if expanded {
            postorder.push(id);
            continue;
        }
        if !visited.insert(id) {
            continue;
        }
        stack.push((id, true));
        if let Some(block) = blocks.get(&id) {
            // Push in reverse so the first successor is visited first.
            for succ in terminator_successors(&block.terminator).into_iter().rev() {
                if !visited.contains(&succ) {
                    stack.push((succ, false));
                }
            }
        }
    }
    postorder.reverse();
    postorder
}

/// Immediate-dominator tree over the reachable blocks of a function.
#[derive(Debug)]
pub struct Dominators {
    /// Immediate dominator per reachable block; the entry maps to itself.
    idom: HashMap<BlockId, BlockId>,
}

impl Dominators {
    /// True if `a` dominates `b`. Reflexive. False whenever `b` is not
    /// reachable from the entry block.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let mut cur = b;
        loop {
            if cur == a {
                return true;
            }
            match self.idom.get(&cur) {
                Some(parent) if *parent != cur => cur = *parent,
                _ => return false,
            }
        }
    }

    /// True if the block is reachable from the entry block.
    pub fn is_reachable(&self, b: BlockId) -> bool {
        self.idom.contains_key(&b)
    }
}

/// Compute immediate dominators with the iterative Cooper-Harvey-Kennedy
/// scheme over reverse postorder.
pub fn compute_dominators(func: &Function) -> Dominators {
    let rpo = reverse_postorder(func);
    let rpo_index: HashMap<BlockId, usize> = rpo.iter().enumerate().map(|(i, b)| (*b, i)).collect();
    let preds = build_predecessors(func);

    let mut idom: HashMap<BlockId, BlockId> = HashMap::new();
    let Some(entry) = rpo.first().copied() else {
        return Dominators { idom };
    };
    idom.insert(entry, entry);

    let intersect = |idom: &HashMap<BlockId, BlockId>, mut a: BlockId, mut b: BlockId| {
        while a != b {
            while rpo_index[&a] > rpo_index[&b] {
                a = idom[&a];
            }
            while rpo_index[&b] > rpo_index[&a] {
                b = idom[&b];
            }
        }
        a
    };

    let mut changed = true;
    while changed {
        changed = false;
        for &b in rpo.iter().skip(1) {
            // Fold over the predecessors that already have a dominator,
            // taking them in RPO order so the fold is deterministic.
            let mut processed: Vec<BlockId> = preds[&b]
                .iter()
                .copied()
                .filter(|p| idom.contains_key(p))
                .collect();
            processed.sort_by_key(|p| rpo_index[p]);
            let Some(mut new_idom) = processed.first().copied() else {
                continue;
            };
            for &p in processed.iter().skip(1) {
                new_idom = intersect(&idom, p, new_idom);
            }
            if idom.get(&b) != Some(&new_idom) {
                idom.insert(b, new_idom);
                changed = true;
            }
        }
    }
    Dominators { idom }
}
