//! Compilation context and pipeline driver.
//!
//! There is no ambient state anywhere in this crate: everything a pass
//! needs to know about the target GPU or the requested options travels in
//! an explicit [`Compiler`] handed to the entry points. A [`Context`] holds
//! one shader plus the analyses that can be reused between passes.

use crate::dominator_tree::DominatorTree;
use crate::ir::Shader;
use crate::postsched::SchedStats;
use crate::{cp, cse, dce, flowgraph, postsched, verify};

/// Static description of the target GPU.
#[derive(Clone, Copy, Debug)]
pub struct GpuInfo {
    /// Hardware generation.
    pub gen: u8,
    /// Half and full registers share the same register RAM.
    pub merged_regs: bool,
    /// The target supports doubled wave size for fragment/compute work.
    pub double_wave: bool,
    /// Relative constant offset 0 in the last cat3 slot is miscompiled by
    /// the instruction decoder.
    pub cat3_rel_offset_0_quirk: bool,
    /// Movs widening a half shared register must be kept as real
    /// instructions.
    pub mov_half_shared_quirk: bool,
    /// Size of the constant file, in vec4 units.
    pub max_const: u16,
}

impl GpuInfo {
    /// Description of a given hardware generation.
    pub fn for_gen(gen: u8) -> Self {
        Self {
            gen,
            merged_regs: gen >= 6,
            double_wave: gen >= 6,
            cat3_rel_offset_0_quirk: gen < 6,
            mov_half_shared_quirk: gen >= 7,
            max_const: 256,
        }
    }
}

impl Default for GpuInfo {
    fn default() -> Self {
        Self::for_gen(6)
    }
}

/// Per-compilation options.
#[derive(Clone, Copy, Debug)]
pub struct Options {
    /// Demote immediates that cannot be encoded inline to constant-file
    /// slots.
    pub lower_imm_to_const: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            lower_imm_to_const: true,
        }
    }
}

/// The compiler: target description plus options. Shared by every shader
/// compiled against the same device; immutable during compilation.
#[derive(Clone, Copy, Debug, Default)]
pub struct Compiler {
    /// Target GPU.
    pub gpu: GpuInfo,
    /// Options.
    pub options: Options,
}

impl Compiler {
    /// Create a compiler for `gpu` with `options`.
    pub fn new(gpu: GpuInfo, options: Options) -> Self {
        Self { gpu, options }
    }
}

/// Persistent data structures for compiling one shader.
///
/// The context owns the shader and the analyses, and drives the pass
/// pipeline. In debug builds the verifier runs after every pass.
pub struct Context {
    /// The shader being compiled.
    pub shader: Shader,
    /// Dominator tree, recomputed when control flow changes.
    pub domtree: DominatorTree,
    /// Scheduling results of the last post-RA run.
    pub sched_stats: SchedStats,
}

impl Context {
    /// Create a context around a translated shader.
    pub fn new(shader: Shader) -> Self {
        Self {
            shader,
            domtree: DominatorTree::new(),
            sched_stats: SchedStats::default(),
        }
    }

    /// Recompute the flow graph and dominator tree.
    pub fn compute_cfg(&mut self) {
        flowgraph::compute(&mut self.shader);
        self.domtree.compute(&mut self.shader);
    }

    /// Run the verifier in debug builds.
    pub fn verify_if(&self) {
        if cfg!(debug_assertions) {
            verify::verify_shader(&self.shader);
        }
    }

    /// The algebraic-optimization driver loop: copy propagation, CSE and
    /// DCE re-run until none of them makes progress.
    pub fn optimize(&mut self, compiler: &Compiler) {
        self.compute_cfg();
        self.verify_if();
        loop {
            let mut progress = false;
            progress |= cp::copy_propagate(&mut self.shader, compiler);
            self.verify_if();
            progress |= cse::do_cse(&mut self.shader, &self.domtree);
            self.verify_if();
            progress |= dce::do_dce(&mut self.shader);
            self.verify_if();
            if !progress {
                break;
            }
        }
        self.shader.find_ssa_uses(false);
    }

    /// Post-RA scheduling: reorder within blocks, insert sync bits, then
    /// number the instructions for encoding.
    pub fn schedule_postra(&mut self) {
        self.sched_stats = postsched::run(&mut self.shader);
        self.shader.number_instructions();
        self.verify_if();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::{Cursor, ShaderCursor};
    use crate::ir::{NumType, Opcode, RegFlags, ShaderStage};

    #[test]
    fn gpu_generations() {
        let g5 = GpuInfo::for_gen(5);
        assert!(!g5.merged_regs);
        assert!(g5.cat3_rel_offset_0_quirk);
        let g6 = GpuInfo::default();
        assert!(g6.merged_regs);
        assert!(!g6.cat3_rel_offset_0_quirk);
        assert!(GpuInfo::for_gen(7).mov_half_shared_quirk);
    }

    /// Property 5: after the driver loop, no eligible mov whose removal is
    /// semantics-preserving remains.
    #[test]
    fn optimize_reaches_mov_free_fixpoint() {
        let mut sh = Shader::new(GpuInfo::default(), ShaderStage::Fragment);
        let block = sh.create_block();
        let mut cur = ShaderCursor::new(&mut sh).at_bottom(block);
        let x = cur.ins().input(0, false);
        let xd = cur.shader.insts[x].dst();
        let m1 = cur.ins().mov(NumType::F32, xd);
        let m1d = cur.shader.insts[m1].dst();
        let m2 = cur.ins().mov(NumType::F32, m1d);
        let m2d = cur.shader.insts[m2].dst();
        let add = cur.ins().binary(Opcode::AddF, m2d, xd);
        let ad = cur.shader.insts[add].dst();
        let out = cur.ins().mov(NumType::F32, ad);
        cur.ins().end();
        sh.pin_keep(block, out);

        let compiler = Compiler::default();
        let mut ctx = Context::new(sh);
        ctx.optimize(&compiler);

        let sh = &ctx.shader;
        for block in sh.layout.blocks() {
            for inst in sh.layout.block_insts(block) {
                if crate::cp::is_eligible_mov(sh, inst, true) {
                    // Any surviving eligible mov must still have consumers
                    // that refused the fold; a bare copy may not remain.
                    let src = sh.insts[inst].srcs[0];
                    assert!(
                        sh.regs[src].flags.intersects(RegFlags::MODS),
                        "plain mov {inst} survived the driver loop"
                    );
                }
            }
        }
        assert!(sh.layout.inst_block(add).is_some());
        assert!(sh.layout.inst_block(m1).is_none());
        assert!(sh.layout.inst_block(m2).is_none());
    }

    #[test]
    fn optimize_then_schedule_smoke() {
        let mut sh = Shader::new(GpuInfo::default(), ShaderStage::Fragment);
        let block = sh.create_block();
        let mut cur = ShaderCursor::new(&mut sh).at_bottom(block);
        let x = cur.ins().input(0, false);
        let xd = cur.shader.insts[x].dst();
        let add = cur.ins().binary(Opcode::AddF, xd, xd);
        let ad = cur.shader.insts[add].dst();
        let out = cur.ins().mov(NumType::F32, ad);
        cur.ins().end();
        sh.pin_keep(block, out);

        let compiler = Compiler::default();
        let mut ctx = Context::new(sh);
        ctx.optimize(&compiler);

        // Pretend-RA: assign physical numbers so scheduling has slots.
        let regs: Vec<crate::ir::Reg> = ctx.shader.regs.keys().collect();
        let mut next = 0u16;
        for r in regs {
            if ctx.shader.regs[r].flags.contains(RegFlags::SSA)
                && ctx.shader.regs[r].instr.is_some()
                && ctx.shader.regs[r].def.is_none()
            {
                ctx.shader.regs[r].num = next;
                next += 4;
            }
        }
        let srcs: Vec<crate::ir::Reg> = ctx.shader.regs.keys().collect();
        for r in srcs {
            if let Some(def) = ctx.shader.regs[r].def.expand() {
                ctx.shader.regs[r].num = ctx.shader.regs[def].num;
            }
        }

        ctx.schedule_postra();
        assert!(ctx.shader.number_instructions() > 0);
    }
}
