//! Shader layout.
//!
//! The order of basic blocks in a shader and the order of instructions in a
//! block is determined by the `Layout` data structure defined in this
//! module.

use crate::ir::entities::{Block, Inst};
use basalt_entity::{PackedOption, SecondaryMap};

/// The `Layout` struct determines the layout of blocks and instructions in
/// a shader. It does not contain definitions of instructions or blocks, but
/// depends on `Inst` and `Block` entity references being defined elsewhere.
///
/// This data structure determines:
///
/// - The order of blocks in the shader.
/// - Which block contains a given instruction.
/// - The order of instructions within a block.
///
/// Whole-program ordering comparisons use the creation serial numbers
/// stored on the instructions themselves; the layout only maintains the
/// doubly linked lists.
#[derive(Clone, Default)]
pub struct Layout {
    /// Linked list nodes for the layout order of blocks. Forms a doubly
    /// linked list, terminated in both ends by `None`.
    blocks: SecondaryMap<Block, BlockNode>,

    /// Linked list nodes for the layout order of instructions. Forms a
    /// doubly linked list per block, terminated in both ends by `None`.
    insts: SecondaryMap<Inst, InstNode>,

    /// First block in the layout order, or `None` when no blocks have been
    /// laid out.
    first_block: Option<Block>,

    /// Last block in the layout order.
    last_block: Option<Block>,
}

#[derive(Clone, Debug, Default)]
struct BlockNode {
    prev: PackedOption<Block>,
    next: PackedOption<Block>,
    first_inst: PackedOption<Inst>,
    last_inst: PackedOption<Inst>,
}

#[derive(Clone, Debug, Default)]
struct InstNode {
    /// The block containing this instruction, or `None` if the instruction
    /// is not inserted in the layout.
    block: PackedOption<Block>,
    prev: PackedOption<Inst>,
    next: PackedOption<Inst>,
}

/// Methods for laying out blocks.
///
/// A block starts out as *not inserted*. Once inserted, instructions can be
/// added. A block can only be removed from the layout when it is empty.
impl Layout {
    /// Create a new empty `Layout`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Is `block` currently part of the layout?
    pub fn is_block_inserted(&self, block: Block) -> bool {
        Some(block) == self.first_block || self.blocks[block].prev.is_some()
    }

    /// Insert `block` as the last block in the layout.
    pub fn append_block(&mut self, block: Block) {
        debug_assert!(
            !self.is_block_inserted(block),
            "cannot append block that is already in the layout"
        );
        {
            let node = &mut self.blocks[block];
            debug_assert!(node.first_inst.is_none() && node.last_inst.is_none());
            node.prev = self.last_block.into();
            node.next = None.into();
        }
        if let Some(last) = self.last_block {
            self.blocks[last].next = block.into();
        } else {
            self.first_block = Some(block);
        }
        self.last_block = Some(block);
    }

    /// Insert `block` in the layout before the existing block `before`.
    pub fn insert_block(&mut self, block: Block, before: Block) {
        debug_assert!(
            !self.is_block_inserted(block),
            "cannot insert block that is already in the layout"
        );
        debug_assert!(
            self.is_block_inserted(before),
            "block insertion point not in the layout"
        );
        let after = self.blocks[before].prev;
        {
            let node = &mut self.blocks[block];
            node.next = before.into();
            node.prev = after;
        }
        self.blocks[before].prev = block.into();
        match after.expand() {
            None => self.first_block = Some(block),
            Some(a) => self.blocks[a].next = block.into(),
        }
    }

    /// Insert `block` in the layout *after* the existing block `after`.
    pub fn insert_block_after(&mut self, block: Block, after: Block) {
        debug_assert!(
            !self.is_block_inserted(block),
            "cannot insert block that is already in the layout"
        );
        debug_assert!(
            self.is_block_inserted(after),
            "block insertion point not in the layout"
        );
        let before = self.blocks[after].next;
        {
            let node = &mut self.blocks[block];
            node.next = before;
            node.prev = after.into();
        }
        self.blocks[after].next = block.into();
        match before.expand() {
            None => self.last_block = Some(block),
            Some(b) => self.blocks[b].prev = block.into(),
        }
    }

    /// Remove `block` from the layout. The block must be empty.
    pub fn remove_block(&mut self, block: Block) {
        debug_assert!(self.is_block_inserted(block), "block not in the layout");
        debug_assert!(
            self.first_inst(block).is_none(),
            "cannot remove block with instructions"
        );
        let prev = self.blocks[block].prev;
        let next = self.blocks[block].next;
        match prev.expand() {
            None => self.first_block = next.expand(),
            Some(p) => self.blocks[p].next = next,
        }
        match next.expand() {
            None => self.last_block = prev.expand(),
            Some(n) => self.blocks[n].prev = prev,
        }
        self.blocks[block] = BlockNode::default();
    }

    /// The first block in layout order, i.e. the entry block.
    pub fn entry_block(&self) -> Option<Block> {
        self.first_block
    }

    /// The last block in layout order.
    pub fn last_block(&self) -> Option<Block> {
        self.last_block
    }

    /// The block following `block` in layout order.
    pub fn next_block(&self, block: Block) -> Option<Block> {
        self.blocks[block].next.expand()
    }

    /// The block preceding `block` in layout order.
    pub fn prev_block(&self, block: Block) -> Option<Block> {
        self.blocks[block].prev.expand()
    }

    /// Iterate over the blocks in layout order.
    pub fn blocks(&self) -> Blocks {
        Blocks {
            layout: self,
            next: self.first_block,
        }
    }
}

/// Methods for laying out instructions.
impl Layout {
    /// The block containing `inst`, or `None` if it is not inserted.
    pub fn inst_block(&self, inst: Inst) -> Option<Block> {
        self.insts[inst].block.expand()
    }

    /// The first instruction of `block`.
    pub fn first_inst(&self, block: Block) -> Option<Inst> {
        self.blocks[block].first_inst.expand()
    }

    /// The last instruction of `block`.
    pub fn last_inst(&self, block: Block) -> Option<Inst> {
        self.blocks[block].last_inst.expand()
    }

    /// The instruction following `inst` in its block.
    pub fn next_inst(&self, inst: Inst) -> Option<Inst> {
        self.insts[inst].next.expand()
    }

    /// The instruction preceding `inst` in its block.
    pub fn prev_inst(&self, inst: Inst) -> Option<Inst> {
        self.insts[inst].prev.expand()
    }

    /// Append `inst` to the end of `block`.
    pub fn append_inst(&mut self, inst: Inst, block: Block) {
        debug_assert!(self.inst_block(inst).is_none(), "instruction already inserted");
        debug_assert!(self.is_block_inserted(block), "block not in the layout");
        let last = self.blocks[block].last_inst;
        {
            let node = &mut self.insts[inst];
            node.block = block.into();
            node.prev = last;
            node.next = None.into();
        }
        match last.expand() {
            None => self.blocks[block].first_inst = inst.into(),
            Some(l) => self.insts[l].next = inst.into(),
        }
        self.blocks[block].last_inst = inst.into();
    }

    /// Insert `inst` before the existing instruction `before`.
    pub fn insert_inst(&mut self, inst: Inst, before: Inst) {
        debug_assert!(self.inst_block(inst).is_none(), "instruction already inserted");
        let block = self
            .inst_block(before)
            .expect("insertion point not in the layout");
        let prev = self.insts[before].prev;
        {
            let node = &mut self.insts[inst];
            node.block = block.into();
            node.prev = prev;
            node.next = before.into();
        }
        self.insts[before].prev = inst.into();
        match prev.expand() {
            None => self.blocks[block].first_inst = inst.into(),
            Some(p) => self.insts[p].next = inst.into(),
        }
    }

    /// Remove `inst` from the layout. The instruction data itself stays in
    /// the shader arena.
    pub fn remove_inst(&mut self, inst: Inst) {
        let block = self.inst_block(inst).expect("instruction not inserted");
        let prev = self.insts[inst].prev;
        let next = self.insts[inst].next;
        match prev.expand() {
            None => self.blocks[block].first_inst = next,
            Some(p) => self.insts[p].next = next,
        }
        match next.expand() {
            None => self.blocks[block].last_inst = prev,
            Some(n) => self.insts[n].prev = prev,
        }
        self.insts[inst] = InstNode::default();
    }

    /// Iterate over the instructions of `block` in layout order.
    pub fn block_insts(&self, block: Block) -> Insts {
        Insts {
            layout: self,
            next: self.blocks[block].first_inst.expand(),
            next_back: self.blocks[block].last_inst.expand(),
            done: false,
        }
    }
}

/// Iterator over blocks in layout order. See [`Layout::blocks`].
pub struct Blocks<'a> {
    layout: &'a Layout,
    next: Option<Block>,
}

impl<'a> Iterator for Blocks<'a> {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        let cur = self.next?;
        self.next = self.layout.next_block(cur);
        Some(cur)
    }
}

/// Iterator over the instructions of one block. See [`Layout::block_insts`].
pub struct Insts<'a> {
    layout: &'a Layout,
    next: Option<Inst>,
    next_back: Option<Inst>,
    done: bool,
}

impl<'a> Iterator for Insts<'a> {
    type Item = Inst;

    fn next(&mut self) -> Option<Inst> {
        if self.done {
            return None;
        }
        let cur = self.next?;
        if Some(cur) == self.next_back {
            self.done = true;
        } else {
            self.next = self.layout.next_inst(cur);
        }
        Some(cur)
    }
}

impl<'a> DoubleEndedIterator for Insts<'a> {
    fn next_back(&mut self) -> Option<Inst> {
        if self.done {
            return None;
        }
        let cur = self.next_back?;
        if Some(cur) == self.next {
            self.done = true;
        } else {
            self.next_back = self.layout.prev_inst(cur);
        }
        Some(cur)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_entity::EntityRef;

    fn b(n: usize) -> Block {
        Block::new(n)
    }

    fn i(n: usize) -> Inst {
        Inst::new(n)
    }

    #[test]
    fn append_blocks_and_insts() {
        let mut l = Layout::new();
        l.append_block(b(0));
        l.append_block(b(1));
        assert_eq!(l.entry_block(), Some(b(0)));
        assert_eq!(l.last_block(), Some(b(1)));
        assert_eq!(l.blocks().collect::<Vec<_>>(), [b(0), b(1)]);

        l.append_inst(i(0), b(0));
        l.append_inst(i(1), b(0));
        l.append_inst(i(2), b(1));
        assert_eq!(l.inst_block(i(0)), Some(b(0)));
        assert_eq!(l.inst_block(i(2)), Some(b(1)));
        assert_eq!(l.block_insts(b(0)).collect::<Vec<_>>(), [i(0), i(1)]);
        assert_eq!(
            l.block_insts(b(0)).rev().collect::<Vec<_>>(),
            [i(1), i(0)]
        );
    }

    #[test]
    fn insert_before_and_remove() {
        let mut l = Layout::new();
        l.append_block(b(0));
        l.append_inst(i(0), b(0));
        l.append_inst(i(2), b(0));
        l.insert_inst(i(1), i(2));
        assert_eq!(l.block_insts(b(0)).collect::<Vec<_>>(), [i(0), i(1), i(2)]);

        l.remove_inst(i(1));
        assert_eq!(l.block_insts(b(0)).collect::<Vec<_>>(), [i(0), i(2)]);
        assert_eq!(l.inst_block(i(1)), None);

        // Removed instructions can be re-inserted elsewhere.
        l.append_inst(i(1), b(0));
        assert_eq!(l.block_insts(b(0)).collect::<Vec<_>>(), [i(0), i(2), i(1)]);
    }

    #[test]
    fn insert_blocks_between() {
        let mut l = Layout::new();
        l.append_block(b(0));
        l.append_block(b(2));
        l.insert_block(b(1), b(2));
        assert_eq!(l.blocks().collect::<Vec<_>>(), [b(0), b(1), b(2)]);
        l.insert_block_after(b(3), b(2));
        assert_eq!(l.blocks().collect::<Vec<_>>(), [b(0), b(1), b(2), b(3)]);
        l.remove_block(b(1));
        assert_eq!(l.blocks().collect::<Vec<_>>(), [b(0), b(2), b(3)]);
    }
}
