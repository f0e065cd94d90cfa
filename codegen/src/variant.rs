//! The shader variant descriptor.
//!
//! The record the driver keys its pipeline state on: where inputs and
//! outputs ended up after register allocation, resource counts, sizes, and
//! the statistics the scheduler produced. Populated at finalization and
//! immutable afterwards.

use crate::context::Context;
use crate::ir::{OpPayload, Opcode, RegFlags, Shader, ShaderStage, INVALID_REG};

/// Geometry-stage workgroup info word: the fiber count of a geometry
/// workgroup lives in bits 22..30. Downstream consumers decide "large
/// workgroup" handling from this field, so the encoding is fixed.
pub const GS_TG_INFO_FIBERS_SHIFT: u32 = 22;
/// Mask of the fiber-count field within `gs_tg_info`.
pub const GS_TG_INFO_FIBERS_MASK: u32 = 0xff << GS_TG_INFO_FIBERS_SHIFT;

/// One shader input as seen by the driver.
#[derive(Clone, Copy, Debug, Default)]
pub struct VariantInput {
    /// Input slot (attribute or varying index).
    pub slot: u16,
    /// Mask of components actually read.
    pub compmask: u8,
    /// Interpolation mode index.
    pub interpolate: u8,
    /// Fetched with barycentric interpolation.
    pub bary: bool,
    /// Register the input lands in after RA.
    pub regid: u16,
    /// Input lives in a half register.
    pub half: bool,
}

/// One shader output.
#[derive(Clone, Copy, Debug, Default)]
pub struct VariantOutput {
    /// Output slot.
    pub slot: u16,
    /// Register the output is read from.
    pub regid: u16,
    /// Output lives in a half register.
    pub half: bool,
}

/// One pre-dispatched texture fetch.
#[derive(Clone, Copy, Debug, Default)]
pub struct SamplerPrefetch {
    /// Texture index.
    pub tex_id: u16,
    /// Sampler index.
    pub samp_id: u16,
    /// Bindless texture descriptor, when `bindless`.
    pub tex_bindless_id: u16,
    /// Bindless sampler descriptor, when `bindless`.
    pub samp_bindless_id: u16,
    /// Source register holding the coordinates.
    pub src: u16,
    /// Destination register.
    pub dst: u16,
    /// Component write mask.
    pub wrmask: u16,
    /// Prefetch command.
    pub cmd: u8,
    /// Result is written to half registers.
    pub half: bool,
    /// Descriptors are bindless.
    pub bindless: bool,
}

/// Key fields used to select this variant.
#[derive(Clone, Copy, Debug, Default)]
pub struct VariantKey {
    /// Flat-shade all color varyings.
    pub rasterflat: bool,
    /// Multisample rasterization.
    pub msaa: bool,
    /// Tessellation primitive mode, 0 when unused.
    pub tessellation: u8,
}

/// Everything the driver needs to know about one compiled shader variant.
#[derive(Clone, Debug, Default)]
pub struct ShaderVariant {
    /// Inputs, in slot order.
    pub inputs: Vec<VariantInput>,
    /// Outputs, in slot order.
    pub outputs: Vec<VariantOutput>,
    /// Texture fetches started before the shader body runs.
    pub sampler_prefetches: Vec<SamplerPrefetch>,
    /// Compute local size.
    pub local_size: [u16; 3],
    /// Local size is provided at dispatch time.
    pub local_size_variable: bool,
    /// Enabled clip planes.
    pub clip_mask: u8,
    /// Enabled cull planes.
    pub cull_mask: u8,
    /// Private (per-fiber spill) memory size in bytes.
    pub pvtmem_size: u32,
    /// Shared memory size in bytes.
    pub shared_size: u32,
    /// Key used to select this variant.
    pub key: VariantKey,
    /// Number of samplers referenced.
    pub samp_count: u8,
    /// Number of textures referenced.
    pub tex_count: u8,
    /// Instructions in the final layout.
    pub instr_count: u32,
    /// Constant file use in vec4 units.
    pub constlen: u16,
    /// Upper bound on resident waves given register use.
    pub max_waves: u8,
    /// `ss` bits in the final program.
    pub ss_count: u32,
    /// `sy` bits in the final program.
    pub sy_count: u32,
    /// Scheduler cycle estimate.
    pub estimated_cycles: u32,
}

impl ShaderVariant {
    /// Collect the descriptor from a finished compilation.
    pub fn collect(ctx: &mut Context) -> Self {
        let instr_count = ctx.shader.number_instructions();
        let sh = &ctx.shader;
        let mut v = ShaderVariant {
            instr_count,
            constlen: sh.consts.size_vec4(),
            ss_count: ctx.sched_stats.ss_count,
            sy_count: ctx.sched_stats.sy_count,
            estimated_cycles: ctx.sched_stats.cycles,
            max_waves: 16,
            ..Default::default()
        };
        for &inst in &sh.inputs {
            if sh.layout.inst_block(inst).is_none() {
                continue;
            }
            v.inputs.push(input_record(sh, inst));
        }
        for inst in sh.insts.keys() {
            if sh.layout.inst_block(inst).is_none() {
                continue;
            }
            let data = &sh.insts[inst];
            if let OpPayload::Tex(info) = data.payload {
                v.tex_count = v.tex_count.max(info.tex as u8 + 1);
                v.samp_count = v.samp_count.max(info.samp as u8 + 1);
            }
            if data.opcode == Opcode::MetaTexPrefetch {
                if let OpPayload::TexPrefetch { tex, samp } = data.payload {
                    let dst = data.dsts.first().copied();
                    v.sampler_prefetches.push(SamplerPrefetch {
                        tex_id: tex,
                        samp_id: samp,
                        dst: dst.map(|d| sh.regs[d].num).unwrap_or(INVALID_REG),
                        wrmask: dst.map(|d| sh.regs[d].wrmask).unwrap_or(1),
                        half: dst
                            .map(|d| sh.regs[d].flags.contains(RegFlags::HALF))
                            .unwrap_or(false),
                        ..Default::default()
                    });
                }
            }
        }
        if sh.stage == ShaderStage::Compute {
            v.local_size = [64, 1, 1];
        }
        v
    }
}

fn input_record(sh: &Shader, inst: crate::ir::Inst) -> VariantInput {
    let data = &sh.insts[inst];
    let (slot, bary) = match data.payload {
        OpPayload::Input { sysval } => (sysval, false),
        _ => {
            // bary.f/flat.b: the fetch offset is the first source.
            let off = data
                .srcs
                .first()
                .map(|&s| sh.regs[s].imm as u16)
                .unwrap_or(0);
            (off, data.opcode == Opcode::BaryF)
        }
    };
    let dst = data.dsts.first();
    VariantInput {
        slot,
        compmask: dst.map(|&d| sh.regs[d].wrmask as u8).unwrap_or(1),
        interpolate: 0,
        bary,
        regid: dst.map(|&d| sh.regs[d].num).unwrap_or(INVALID_REG),
        half: dst
            .map(|&d| sh.regs[d].flags.contains(RegFlags::HALF))
            .unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Compiler, Context, GpuInfo};
    use crate::cursor::{Cursor, ShaderCursor};
    use crate::ir::{NumType, Opcode, TexInfo};

    #[test]
    fn gs_tg_info_field_encoding() {
        let info = 200u32 << GS_TG_INFO_FIBERS_SHIFT;
        assert_eq!((info & GS_TG_INFO_FIBERS_MASK) >> GS_TG_INFO_FIBERS_SHIFT, 200);
        assert_eq!(GS_TG_INFO_FIBERS_MASK, 0x3fc0_0000);
    }

    #[test]
    fn collects_inputs_and_counts() {
        let mut sh = Shader::new(GpuInfo::default(), crate::ir::ShaderStage::Fragment);
        let block = sh.create_block();
        let mut cur = ShaderCursor::new(&mut sh).at_bottom(block);
        let x = cur.ins().input(3, false);
        let xd = cur.shader.insts[x].dst();
        let tex = cur.ins().tex(
            Opcode::Sam,
            TexInfo {
                tex: 2,
                samp: 1,
                typ: Some(NumType::F32),
            },
            0xf,
            false,
            &[xd],
        );
        let td = cur.shader.insts[tex].dst();
        let out = cur.ins().mov(NumType::F32, td);
        cur.ins().end();
        sh.pin_keep(block, out);

        let compiler = Compiler::default();
        let mut ctx = Context::new(sh);
        ctx.optimize(&compiler);
        let v = ShaderVariant::collect(&mut ctx);
        assert_eq!(v.inputs.len(), 1);
        assert_eq!(v.inputs[0].slot, 3);
        assert_eq!(v.tex_count, 3);
        assert_eq!(v.samp_count, 2);
        assert!(v.instr_count >= 3);
    }
}
