//! Control-flow graph maintenance.
//!
//! Successor links live on the blocks themselves (a block has at most two:
//! the second is used when the terminator is a conditional branch). This
//! module recomputes the derived predecessor arrays, for both the
//! per-thread CFG and the machine-level ("physical") CFG, which differ
//! around if/else reconvergence.

use crate::ir::{Block, Shader};
use crate::timing;

/// Recompute `preds` and `physical_preds` for every block from the
/// successor links.
///
/// This must be called after the translator builds the block graph and
/// after any pass that edits successor links.
pub fn compute(sh: &mut Shader) {
    let _tt = timing::flowgraph();
    let blocks: Vec<Block> = sh.blocks.keys().collect();
    for &block in &blocks {
        sh.blocks[block].preds.clear();
        sh.blocks[block].physical_preds.clear();
    }
    for &block in &blocks {
        for i in 0..2 {
            if let Some(succ) = sh.blocks[block].succs[i].expand() {
                sh.blocks[succ].preds.push(block);
            }
            if let Some(succ) = sh.blocks[block].physical_succs[i].expand() {
                sh.blocks[succ].physical_preds.push(block);
            }
        }
    }
}
