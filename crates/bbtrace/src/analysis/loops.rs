//! Natural-loop discovery and dense loop numbering.
//!
//! A natural loop is identified by a back edge `latch → header` where the
//! header dominates the latch. Loops are stored in an arena keyed by their
//! dense `loop_id`; blocks map to their innermost loop. No parent/child
//! owning links: nesting is a plain parent index.
//!
//! Numbering is an explicit LIFO walk of the loop forest, seeded with the
//! outermost loops in header layout order: pop a loop, give it the next id,
//! push its children in header layout order. Consumers depend on this exact
//! order being reproducible run to run.

use super::{build_predecessors, compute_dominators};
use crate::ir::{BlockId, Function};
use std::collections::{HashMap, HashSet};

/// One natural loop in the forest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loop {
    pub header: BlockId,
    /// Dense id of the immediately enclosing loop, if any.
    pub parent: Option<u32>,
}

/// The loop forest of one function.
#[derive(Debug, Default)]
pub struct LoopForest {
    /// Loops indexed by dense `loop_id`.
    loops: Vec<Loop>,
    /// Innermost loop per block. Blocks outside every loop are absent.
    innermost: HashMap<BlockId, u32>,
    /// Header block → the loop it heads.
    headers: HashMap<BlockId, u32>,
}

impl LoopForest {
    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// The loop with the given dense id.
    pub fn get(&self, loop_id: u32) -> Option<&Loop> {
        self.loops.get(loop_id as usize)
    }

    /// Dense id of the innermost loop containing `block`, if any.
    pub fn innermost(&self, block: BlockId) -> Option<u32> {
        self.innermost.get(&block).copied()
    }

    /// Dense id of the loop `block` is the header of, if any.
    pub fn header_of(&self, block: BlockId) -> Option<u32> {
        self.headers.get(&block).copied()
    }
}

/// Raw loop prior to dense numbering, in header layout order.
struct RawLoop {
    header: BlockId,
    body: HashSet<BlockId>,
    parent: Option<usize>,
}

/// Discover the natural loops of a function and number them.
///
/// Only blocks reachable from the entry participate; unreachable blocks are
/// outside every loop.
pub fn find_loops(func: &Function) -> LoopForest {
    let dom = compute_dominators(func);
    let preds = build_predecessors(func);

    // Headers in layout order. Multiple back edges to one header form a
    // single loop with several latches.
    let mut raw: Vec<RawLoop> = Vec::new();
    for block in &func.blocks {
        let header = block.id;
        if !dom.is_reachable(header) {
            continue;
        }
        let mut latches: Vec<BlockId> = preds[&header]
            .iter()
            .copied()
            .filter(|latch| dom.dominates(header, *latch))
            .collect();
        if latches.is_empty() {
            continue;
        }
        latches.sort();

        // Body: header plus everything that reaches a latch without passing
        // through the header, walking predecessor edges backward.
        let mut body: HashSet<BlockId> = HashSet::new();
        body.insert(header);
        let mut worklist = latches;
        while let Some(b) = worklist.pop() {
            if !dom.is_reachable(b) || !body.insert(b) {
                continue;
            }
            worklist.extend(preds[&b].iter().copied());
        }
        raw.push(RawLoop {
            header,
            body,
            parent: None,
        });
    }

    // Nesting: the parent is the smallest other body containing our header.
    for i in 0..raw.len() {
        let mut parent: Option<usize> = None;
        for (j, candidate) in raw.iter().enumerate() {
            if i == j || !candidate.body.contains(&raw[i].header) {
                continue;
            }
            if parent.is_none_or(|p| candidate.body.len() < raw[p].body.len()) {
                parent = Some(j);
            }
        }
        raw[i].parent = parent;
    }

    // Dense numbering: LIFO over the forest, roots seeded in layout order,
    // children pushed in layout order.
    let mut dense_of_raw: HashMap<usize, u32> = HashMap::new();
    let mut order: Vec<usize> = Vec::with_capacity(raw.len());
    let mut stack: Vec<usize> = (0..raw.len()).filter(|i| raw[*i].parent.is_none()).collect();
    while let Some(i) = stack.pop() {
        dense_of_raw.insert(i, order.len() as u32);
        order.push(i);
        stack.extend((0..raw.len()).filter(|c| raw[*c].parent == Some(i)));
    }

    let loops: Vec<Loop> = order
        .iter()
        .map(|&i| Loop {
            header: raw[i].header,
            parent: raw[i].parent.map(|p| dense_of_raw[&p]),
        })
        .collect();
    let headers: HashMap<BlockId, u32> = order
        .iter()
        .enumerate()
        .map(|(id, &i)| (raw[i].header, id as u32))
        .collect();

    // Innermost loop per block: the smallest body containing it.
    let mut innermost: HashMap<BlockId, u32> = HashMap::new();
    for block in &func.blocks {
        let mut best: Option<usize> = None;
        for (i, l) in raw.iter().enumerate() {
            if l.body.contains(&block.id) && best.is_none_or(|b| l.body.len() < raw[b].body.len()) {
                best = Some(i);
            }
        }
        if let Some(i) = best {
            innermost.insert(block.id, dense_of_raw[&i]);
        }
    }

    LoopForest {
        loops,
        innermost,
        headers,
    }
}
