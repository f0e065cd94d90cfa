//! A dominator tree represented as mappings of blocks to their immediate
//! dominator, with pre/post-order numbering for constant-time dominance
//! queries.
//!
//! Dominance is computed over the machine-level CFG when physical successor
//! links are present, because passes that run close to the hardware (the
//! scheduler, CSE across reconvergence points) must not assume a value is
//! available on per-thread paths the wave does not execute. Shaders that
//! never set up physical links fall back to the per-thread CFG.

use crate::ir::{Block, Shader};
use crate::timing;
use basalt_entity::{PackedOption, SecondaryMap};

/// Dominator tree node. We keep one of these per block.
#[derive(Clone, Default)]
struct DomNode {
    /// Number of this node in a reverse post-order traversal of the CFG,
    /// starting from 1. Unreachable blocks get number 0.
    rpo_number: u32,
    /// The immediate dominator, or `None` for the entry and unreachable
    /// blocks.
    idom: PackedOption<Block>,
    /// Preorder visit number of the dominator-tree DFS.
    pre: u32,
    /// Postorder visit number of the dominator-tree DFS.
    post: u32,
}

/// The dominator tree for a single shader.
pub struct DominatorTree {
    nodes: SecondaryMap<Block, DomNode>,

    /// CFG post-order of all reachable blocks.
    postorder: Vec<Block>,

    valid: bool,
}

impl DominatorTree {
    /// Allocate a new blank dominator tree. Use [`compute`](Self::compute)
    /// to compute the dominator tree.
    pub fn new() -> Self {
        Self {
            nodes: SecondaryMap::new(),
            postorder: Vec::new(),
            valid: false,
        }
    }

    /// Allocate and compute a dominator tree for `sh`.
    pub fn with_shader(sh: &mut Shader) -> Self {
        let mut d = Self::new();
        d.compute(sh);
        d
    }

    /// Is `block` reachable from the entry block?
    pub fn is_reachable(&self, block: Block) -> bool {
        self.nodes[block].rpo_number != 0
    }

    /// Get the CFG post-order of blocks used to compute the dominator tree.
    pub fn cfg_postorder(&self) -> &[Block] {
        debug_assert!(self.is_valid());
        &self.postorder
    }

    /// Returns the immediate dominator of `block`, or `None` for the entry
    /// block and unreachable blocks.
    pub fn idom(&self, block: Block) -> Option<Block> {
        self.nodes[block].idom.expand()
    }

    /// Returns `true` if `a` dominates `b`: every path from the entry to
    /// `b` goes through `a`. A block dominates itself.
    ///
    /// Returns `false` if either block is unreachable.
    pub fn dominates(&self, a: Block, b: Block) -> bool {
        debug_assert!(self.is_valid());
        if !self.is_reachable(a) || !self.is_reachable(b) {
            return false;
        }
        self.nodes[a].pre <= self.nodes[b].pre && self.nodes[b].post <= self.nodes[a].post
    }

    /// Check if the dominator tree has been computed since the last clear.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Reset the tree to the invalid state.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.postorder.clear();
        self.valid = false;
    }

    /// Compute the dominator tree of `sh` and record each block's
    /// immediate dominator in its `BlockData`.
    pub fn compute(&mut self, sh: &mut Shader) {
        let _tt = timing::domtree();
        self.clear();
        let Some(entry) = sh.layout.entry_block() else {
            self.valid = true;
            return;
        };
        let physical = sh
            .blocks
            .values()
            .any(|b| b.physical_succs[0].is_some() || b.physical_succs[1].is_some());

        self.compute_postorder(sh, entry, physical);
        self.compute_idoms(sh, entry, physical);
        self.number_tree(sh, entry);

        for block in sh.blocks.keys().collect::<Vec<_>>() {
            sh.blocks[block].imm_dom = self.nodes[block].idom;
        }
        self.valid = true;
    }

    fn succs(sh: &Shader, block: Block, physical: bool) -> [Option<Block>; 2] {
        let data = &sh.blocks[block];
        let links = if physical {
            &data.physical_succs
        } else {
            &data.succs
        };
        [links[0].expand(), links[1].expand()]
    }

    fn preds<'a>(sh: &'a Shader, block: Block, physical: bool) -> &'a [Block] {
        let data = &sh.blocks[block];
        if physical {
            &data.physical_preds
        } else {
            &data.preds
        }
    }

    /// Iterative depth-first postorder starting from the entry block.
    fn compute_postorder(&mut self, sh: &Shader, entry: Block, physical: bool) {
        const SEEN: u32 = 1;
        const DONE: u32 = 2;
        let mut state: SecondaryMap<Block, u32> = SecondaryMap::new();
        let mut stack = vec![entry];
        while let Some(&block) = stack.last() {
            if state[block] == 0 {
                state[block] = SEEN;
                for succ in Self::succs(sh, block, physical).into_iter().flatten() {
                    if state[succ] == 0 {
                        stack.push(succ);
                    }
                }
            } else {
                stack.pop();
                if state[block] != DONE {
                    state[block] = DONE;
                    self.postorder.push(block);
                }
            }
        }
        // Assign RPO numbers, 1-based so 0 means unreachable.
        for (i, &block) in self.postorder.iter().rev().enumerate() {
            self.nodes[block].rpo_number = (i + 1) as u32;
        }
    }

    /// The classic iterate-to-fixpoint immediate dominator computation over
    /// the reverse post-order.
    fn compute_idoms(&mut self, sh: &Shader, entry: Block, physical: bool) {
        let rpo: Vec<Block> = self.postorder.iter().rev().copied().collect();
        let mut changed = true;
        while changed {
            changed = false;
            for &block in &rpo {
                if block == entry {
                    continue;
                }
                let mut new_idom: Option<Block> = None;
                for &pred in Self::preds(sh, block, physical) {
                    if !self.is_reachable(pred) {
                        continue;
                    }
                    // Only consider predecessors that already have an idom
                    // (the entry counts as processed).
                    if pred != entry && self.nodes[pred].idom.is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(cur) => self.intersect(pred, cur),
                    });
                }
                if let Some(idom) = new_idom {
                    if self.nodes[block].idom.expand() != Some(idom) {
                        self.nodes[block].idom = idom.into();
                        changed = true;
                    }
                }
            }
        }
    }

    /// Common dominator of two reachable blocks.
    fn intersect(&self, mut a: Block, mut b: Block) -> Block {
        while a != b {
            while self.nodes[a].rpo_number > self.nodes[b].rpo_number {
                a = self.nodes[a].idom.expect("finger passed the entry block");
            }
            while self.nodes[b].rpo_number > self.nodes[a].rpo_number {
                b = self.nodes[b].idom.expect("finger passed the entry block");
            }
        }
        a
    }

    /// DFS over the dominator tree assigning pre/post numbers for O(1)
    /// dominance checks.
    fn number_tree(&mut self, sh: &Shader, entry: Block) {
        let mut children: SecondaryMap<Block, Vec<Block>> = SecondaryMap::new();
        for block in sh.blocks.keys() {
            if let Some(idom) = self.nodes[block].idom.expand() {
                children[idom].push(block);
            }
        }
        let mut counter = 1u32;
        // (block, child cursor) DFS stack.
        let mut stack: Vec<(Block, usize)> = vec![(entry, 0)];
        self.nodes[entry].pre = counter;
        while let Some(top) = stack.len().checked_sub(1) {
            let (block, cursor) = stack[top];
            if cursor < children[block].len() {
                stack[top].1 += 1;
                let child = children[block][cursor];
                counter += 1;
                self.nodes[child].pre = counter;
                stack.push((child, 0));
            } else {
                counter += 1;
                self.nodes[block].post = counter;
                stack.pop();
            }
        }
    }

    /// Iterate reachable blocks in dominator-tree preorder.
    pub fn preorder(&self) -> Vec<Block> {
        debug_assert!(self.is_valid());
        let mut blocks: Vec<Block> = self.postorder.clone();
        blocks.sort_by_key(|&b| self.nodes[b].pre);
        blocks
    }
}

impl Default for DominatorTree {
    fn default() -> Self {
        Self::new()
    }
}
