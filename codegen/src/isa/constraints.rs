//! Operand-encoding constraints.
//!
//! `valid_flags` answers whether an instruction can encode a source operand
//! carrying the given flag set at the given position. Copy propagation uses
//! it to decide which folds are expressible; it never applies a fold the
//! encoder could not emit.

use crate::ir::{Category, Inst, Opcode, RegFlags, Shader};

/// Algebraic modifiers `opcode` accepts on its sources.
fn allowed_mods(opcode: Opcode) -> RegFlags {
    match opcode.category() {
        Category::Cat2 => {
            if opcode.is_cat2_float() {
                RegFlags::FABS | RegFlags::FNEG
            } else if opcode == Opcode::AbsnegS {
                RegFlags::SABS | RegFlags::SNEG
            } else if matches!(
                opcode,
                Opcode::AndB | Opcode::OrB | Opcode::XorB | Opcode::NotB
            ) {
                RegFlags::BNOT
            } else {
                RegFlags::new()
            }
        }
        // Cat3 encodes negate bits but no absolute value.
        Category::Cat3 => {
            if opcode.is_float() {
                RegFlags::FNEG
            } else if matches!(
                opcode,
                Opcode::MadU16
                    | Opcode::MadU24
                    | Opcode::MadS16
                    | Opcode::MadS24
                    | Opcode::MadshM16
                    | Opcode::SadS16
                    | Opcode::SadS32
                    | Opcode::SelS16
                    | Opcode::SelS32
            ) {
                RegFlags::SNEG
            } else {
                RegFlags::new()
            }
        }
        Category::Cat4 => RegFlags::FABS | RegFlags::FNEG,
        _ => RegFlags::new(),
    }
}

/// Cat3 opcodes whose last source field encodes a small immediate instead
/// of a constant.
fn cat3_imm_group(opcode: Opcode) -> bool {
    matches!(
        opcode,
        Opcode::ShrmB | Opcode::ShlmB | Opcode::ShrgB | Opcode::ShlgB | Opcode::AndgB
    )
}

/// How many sources other than `src_n` already read the constant file or an
/// address-relative location. The hardware fetches at most one such operand
/// per instruction.
fn other_const_srcs(sh: &Shader, inst: Inst, src_n: usize) -> usize {
    sh.insts[inst]
        .srcs
        .iter()
        .enumerate()
        .filter(|&(i, &s)| {
            i != src_n
                && sh.regs[s]
                    .flags
                    .intersects(RegFlags::CONST | RegFlags::RELATIV)
        })
        .count()
}

/// Can `inst` encode a source with flag set `flags` at position `src_n`?
pub fn valid_flags(sh: &Shader, inst: Inst, src_n: usize, flags: RegFlags) -> bool {
    let opcode = sh.insts[inst].opcode;
    let mods = flags.intersection(RegFlags::MODS);
    if !allowed_mods(opcode).contains(mods) {
        return false;
    }

    let is_const = flags.intersects(RegFlags::CONST | RegFlags::RELATIV);
    if is_const && other_const_srcs(sh, inst, src_n) > 0 {
        return false;
    }
    // Relative constants and relative GPRs both go through an address
    // register; a constant operand cannot be both inline and relative to
    // the array machinery.
    if flags.contains(RegFlags::CONST) && flags.contains(RegFlags::ARRAY) {
        return false;
    }

    match opcode.category() {
        Category::Cat0 => !flags.intersects(RegFlags::MODS | RegFlags::ROLE),
        Category::Cat1 => !flags.intersects(RegFlags::MODS),
        Category::Cat2 => {
            if opcode.is_input() {
                // bary.f/flat.b address the varying store; the fetch offset
                // immediate is the only non-register operand allowed.
                return !flags
                    .intersects(RegFlags::MODS | RegFlags::CONST | RegFlags::RELATIV | RegFlags::SHARED);
            }
            if flags.contains(RegFlags::IMMED) && !opcode.is_cat2_int() {
                // Float immediates don't survive the 16-bit encoding.
                return false;
            }
            true
        }
        Category::Cat3 => {
            if flags.contains(RegFlags::IMMED) && !cat3_imm_group(opcode) {
                return false;
            }
            // The second source field has no constant, shared or relative
            // encoding.
            if src_n == 1
                && flags.intersects(RegFlags::CONST | RegFlags::RELATIV | RegFlags::SHARED)
            {
                return false;
            }
            true
        }
        Category::Cat4 => !flags.contains(RegFlags::IMMED),
        Category::Cat5 => !flags.intersects(RegFlags::MODS | RegFlags::ROLE | RegFlags::SHARED),
        Category::Cat6 => {
            !flags.intersects(RegFlags::MODS | RegFlags::CONST | RegFlags::RELATIV | RegFlags::SHARED)
        }
        Category::Cat7 => false,
        Category::Meta => !flags.intersects(RegFlags::MODS | RegFlags::ROLE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::GpuInfo;
    use crate::cursor::{Cursor, ShaderCursor};
    use crate::ir::{NumType, Shader, ShaderStage};

    fn with_ops() -> (Shader, Inst, Inst, Inst) {
        let mut sh = Shader::new(GpuInfo::default(), ShaderStage::Fragment);
        let block = sh.create_block();
        let mut cur = ShaderCursor::new(&mut sh).at_bottom(block);
        let a = cur.ins().mov_imm(NumType::F32, 0);
        let ad = cur.shader.insts[a].dst();
        let addf = cur.ins().binary(Opcode::AddF, ad, ad);
        let addu = cur.ins().binary(Opcode::AddU, ad, ad);
        let mad = cur.ins().ternary(Opcode::MadF32, ad, ad, ad);
        (sh, addf, addu, mad)
    }

    #[test]
    fn float_mods_only_on_float_ops() {
        let (sh, addf, addu, _) = with_ops();
        assert!(valid_flags(&sh, addf, 0, RegFlags::FNEG));
        assert!(valid_flags(&sh, addf, 0, RegFlags::FABS | RegFlags::FNEG));
        assert!(!valid_flags(&sh, addu, 0, RegFlags::FNEG));
        assert!(!valid_flags(&sh, addu, 0, RegFlags::SNEG));
        assert!(!valid_flags(&sh, addf, 0, RegFlags::BNOT));
    }

    #[test]
    fn bnot_on_bitwise_ops() {
        let mut sh = Shader::new(GpuInfo::default(), ShaderStage::Fragment);
        let block = sh.create_block();
        let mut cur = ShaderCursor::new(&mut sh).at_bottom(block);
        let a = cur.ins().mov_imm(NumType::U32, 0);
        let ad = cur.shader.insts[a].dst();
        let and = cur.ins().binary(Opcode::AndB, ad, ad);
        let shl = cur.ins().binary(Opcode::ShlB, ad, ad);
        assert!(valid_flags(&sh, and, 1, RegFlags::BNOT));
        assert!(!valid_flags(&sh, shl, 1, RegFlags::BNOT));
    }

    #[test]
    fn cat2_immediates_are_integer_only() {
        let (sh, addf, addu, _) = with_ops();
        assert!(valid_flags(&sh, addu, 0, RegFlags::IMMED));
        assert!(!valid_flags(&sh, addf, 0, RegFlags::IMMED));
        assert!(valid_flags(&sh, addf, 0, RegFlags::CONST));
    }

    #[test]
    fn cat3_second_source_refuses_const() {
        let (sh, _, _, mad) = with_ops();
        assert!(valid_flags(&sh, mad, 0, RegFlags::CONST));
        assert!(!valid_flags(&sh, mad, 1, RegFlags::CONST));
        assert!(valid_flags(&sh, mad, 2, RegFlags::CONST));
        assert!(!valid_flags(&sh, mad, 1, RegFlags::SHARED));
        // Cat3 has no immediate encoding outside the shift group.
        assert!(!valid_flags(&sh, mad, 0, RegFlags::IMMED));
        // Negate encodes, absolute value does not.
        assert!(valid_flags(&sh, mad, 0, RegFlags::FNEG));
        assert!(!valid_flags(&sh, mad, 0, RegFlags::FABS));
    }

    #[test]
    fn one_const_source_per_instruction() {
        let (mut sh, addf, _, _) = with_ops();
        // Turn src1 into a const, then src0 can no longer become one.
        let s1 = sh.insts[addf].srcs[1];
        sh.regs[s1].flags = RegFlags::CONST;
        assert!(!valid_flags(&sh, addf, 0, RegFlags::CONST));
        assert!(valid_flags(&sh, addf, 1, RegFlags::CONST));
    }

    #[test]
    fn tex_and_mem_stay_plain() {
        let mut sh = Shader::new(GpuInfo::default(), ShaderStage::Fragment);
        let block = sh.create_block();
        let mut cur = ShaderCursor::new(&mut sh).at_bottom(block);
        let a = cur.ins().mov_imm(NumType::F32, 0);
        let ad = cur.shader.insts[a].dst();
        let sam = cur
            .ins()
            .tex(Opcode::Sam, Default::default(), 0xf, false, &[ad]);
        assert!(!valid_flags(&sh, sam, 0, RegFlags::CONST));
        assert!(!valid_flags(&sh, sam, 0, RegFlags::IMMED));
        assert!(valid_flags(&sh, sam, 0, RegFlags::new()));
    }
}
