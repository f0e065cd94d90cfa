//! Cursor library.
//!
//! This module defines cursor data types that can be used for inserting
//! instructions into a shader.

use crate::ir;
use crate::ir::builder::InsertBuilder;

/// The possible positions of a cursor.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CursorPosition {
    /// Cursor is not pointing anywhere. No instructions can be inserted.
    Nowhere,
    /// Cursor is pointing at an existing instruction.
    /// New instructions will be inserted *before* the current instruction.
    At(ir::Inst),
    /// Cursor is before the beginning of a block. No instructions can be
    /// inserted. Calling `next_inst()` will move to the first instruction.
    Before(ir::Block),
    /// Cursor is pointing after the end of a block.
    /// New instructions will be appended to the block.
    After(ir::Block),
}

/// All cursor types implement the `Cursor` trait, which provides common
/// navigation operations.
pub trait Cursor {
    /// Get the current cursor position.
    fn position(&self) -> CursorPosition;

    /// Set the current position.
    fn set_position(&mut self, pos: CursorPosition);

    /// Borrow a reference to the shader layout this cursor is navigating.
    fn layout(&self) -> &ir::Layout;

    /// Borrow a mutable reference to the shader layout.
    fn layout_mut(&mut self) -> &mut ir::Layout;

    /// Rebuild this cursor positioned at `pos`.
    fn at_position(mut self, pos: CursorPosition) -> Self
    where
        Self: Sized,
    {
        self.set_position(pos);
        self
    }

    /// Rebuild this cursor positioned at `inst`.
    fn at_inst(mut self, inst: ir::Inst) -> Self
    where
        Self: Sized,
    {
        self.goto_inst(inst);
        self
    }

    /// Rebuild this cursor positioned after `inst`.
    fn after_inst(mut self, inst: ir::Inst) -> Self
    where
        Self: Sized,
    {
        self.goto_after_inst(inst);
        self
    }

    /// Rebuild this cursor positioned at the top of `block`.
    fn at_top(mut self, block: ir::Block) -> Self
    where
        Self: Sized,
    {
        self.goto_top(block);
        self
    }

    /// Rebuild this cursor positioned at the bottom of `block`.
    fn at_bottom(mut self, block: ir::Block) -> Self
    where
        Self: Sized,
    {
        self.goto_bottom(block);
        self
    }

    /// Get the block corresponding to the current position.
    fn current_block(&self) -> Option<ir::Block> {
        use self::CursorPosition::*;
        match self.position() {
            Nowhere => None,
            At(inst) => self.layout().inst_block(inst),
            Before(block) | After(block) => Some(block),
        }
    }

    /// Get the instruction corresponding to the current position, if any.
    fn current_inst(&self) -> Option<ir::Inst> {
        match self.position() {
            CursorPosition::At(inst) => Some(inst),
            _ => None,
        }
    }

    /// Go to a specific instruction which must be inserted in the layout.
    /// New instructions will be inserted before `inst`.
    fn goto_inst(&mut self, inst: ir::Inst) {
        debug_assert!(self.layout().inst_block(inst).is_some());
        self.set_position(CursorPosition::At(inst));
    }

    /// Go to the position after `inst`, which must be inserted in the
    /// layout.
    fn goto_after_inst(&mut self, inst: ir::Inst) {
        debug_assert!(self.layout().inst_block(inst).is_some());
        let new_pos = if let Some(next) = self.layout().next_inst(inst) {
            CursorPosition::At(next)
        } else {
            CursorPosition::After(
                self.layout()
                    .inst_block(inst)
                    .expect("current instruction removed?"),
            )
        };
        self.set_position(new_pos);
    }

    /// Go to the top of `block`. At this position, instructions cannot be
    /// inserted, but `next_inst()` will move to the first instruction.
    fn goto_top(&mut self, block: ir::Block) {
        debug_assert!(self.layout().is_block_inserted(block));
        self.set_position(CursorPosition::Before(block));
    }

    /// Go to the bottom of `block`. At this position, inserted instructions
    /// will be appended to `block`.
    fn goto_bottom(&mut self, block: ir::Block) {
        debug_assert!(self.layout().is_block_inserted(block));
        self.set_position(CursorPosition::After(block));
    }

    /// Go to the top of the next block in layout order and return it.
    ///
    /// - If the cursor wasn't pointing at anything, go to the top of the
    ///   first block in the shader.
    /// - If there are no more blocks, leave the cursor pointing at nothing
    ///   and return `None`.
    fn next_block(&mut self) -> Option<ir::Block> {
        let next = if let Some(block) = self.current_block() {
            self.layout().next_block(block)
        } else {
            self.layout().entry_block()
        };
        self.set_position(match next {
            Some(block) => CursorPosition::Before(block),
            None => CursorPosition::Nowhere,
        });
        next
    }

    /// Move to the next instruction in the same block and return it.
    ///
    /// This method will never move the cursor to a different block.
    fn next_inst(&mut self) -> Option<ir::Inst> {
        use self::CursorPosition::*;
        match self.position() {
            Nowhere | After(..) => None,
            At(inst) => {
                if let Some(next) = self.layout().next_inst(inst) {
                    self.set_position(At(next));
                    Some(next)
                } else {
                    let pos = After(
                        self.layout()
                            .inst_block(inst)
                            .expect("current instruction removed?"),
                    );
                    self.set_position(pos);
                    None
                }
            }
            Before(block) => {
                if let Some(next) = self.layout().first_inst(block) {
                    self.set_position(At(next));
                    Some(next)
                } else {
                    self.set_position(After(block));
                    None
                }
            }
        }
    }

    /// Move to the previous instruction in the same block and return it.
    fn prev_inst(&mut self) -> Option<ir::Inst> {
        use self::CursorPosition::*;
        match self.position() {
            Nowhere | Before(..) => None,
            At(inst) => {
                if let Some(prev) = self.layout().prev_inst(inst) {
                    self.set_position(At(prev));
                    Some(prev)
                } else {
                    let pos = Before(
                        self.layout()
                            .inst_block(inst)
                            .expect("current instruction removed?"),
                    );
                    self.set_position(pos);
                    None
                }
            }
            After(block) => {
                if let Some(prev) = self.layout().last_inst(block) {
                    self.set_position(At(prev));
                    Some(prev)
                } else {
                    self.set_position(Before(block));
                    None
                }
            }
        }
    }

    /// Insert an instruction at the current position.
    ///
    /// - If pointing at an instruction, the new instruction is inserted
    ///   before it.
    /// - If pointing at the bottom of a block, the new instruction is
    ///   appended to the block.
    /// - Otherwise panic.
    ///
    /// The cursor is not moved, so repeated calls insert in program order.
    fn insert_inst(&mut self, inst: ir::Inst) {
        use self::CursorPosition::*;
        match self.position() {
            Nowhere | Before(..) => panic!("invalid insert_inst position"),
            At(cur) => self.layout_mut().insert_inst(inst, cur),
            After(block) => self.layout_mut().append_inst(inst, block),
        }
    }
}

/// Shader cursor.
///
/// A `ShaderCursor` holds a mutable reference to a whole `ir::Shader` while
/// keeping a position too. The shader can be re-borrowed by accessing the
/// public `cur.shader` member.
pub struct ShaderCursor<'s> {
    pos: CursorPosition,

    /// The referenced shader.
    pub shader: &'s mut ir::Shader,
}

impl<'s> ShaderCursor<'s> {
    /// Create a new `ShaderCursor` pointing nowhere.
    pub fn new(shader: &'s mut ir::Shader) -> Self {
        Self {
            pos: CursorPosition::Nowhere,
            shader,
        }
    }

    /// Create an instruction builder that inserts at the current position.
    pub fn ins(&mut self) -> InsertBuilder<'_, 's> {
        InsertBuilder::new(self)
    }
}

impl<'s> Cursor for ShaderCursor<'s> {
    fn position(&self) -> CursorPosition {
        self.pos
    }

    fn set_position(&mut self, pos: CursorPosition) {
        self.pos = pos;
    }

    fn layout(&self) -> &ir::Layout {
        &self.shader.layout
    }

    fn layout_mut(&mut self) -> &mut ir::Layout {
        &mut self.shader.layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::GpuInfo;
    use crate::ir::{Opcode, Shader, ShaderStage};

    #[test]
    fn cursor_walks_blocks_and_insts() {
        let mut sh = Shader::new(GpuInfo::default(), ShaderStage::Compute);
        let b0 = sh.create_block();
        let b1 = sh.create_block();
        let i0 = sh.create_instr(Opcode::Nop, 0, 0);
        let i1 = sh.create_instr(Opcode::Nop, 0, 0);
        sh.layout.append_inst(i0, b0);
        sh.layout.append_inst(i1, b1);

        let mut cur = ShaderCursor::new(&mut sh);
        let mut seen = Vec::new();
        while let Some(_block) = cur.next_block() {
            while let Some(inst) = cur.next_inst() {
                seen.push(inst);
            }
        }
        assert_eq!(seen, [i0, i1]);
        assert_eq!(cur.position(), CursorPosition::Nowhere);

        cur.goto_bottom(b0);
        assert_eq!(cur.current_block(), Some(b0));
        assert_eq!(cur.prev_inst(), Some(i0));
    }

    #[test]
    fn insert_before_current() {
        let mut sh = Shader::new(GpuInfo::default(), ShaderStage::Compute);
        let b0 = sh.create_block();
        let end = sh.create_instr(Opcode::End, 0, 0);
        sh.layout.append_inst(end, b0);

        let mut cur = ShaderCursor::new(&mut sh).at_inst(end);
        let a = cur.shader.create_instr(Opcode::Nop, 0, 0);
        cur.insert_inst(a);
        let b = cur.shader.create_instr(Opcode::Nop, 0, 0);
        cur.insert_inst(b);
        let order: Vec<_> = cur.shader.layout.block_insts(b0).collect();
        assert_eq!(order, [a, b, end]);
    }
}
