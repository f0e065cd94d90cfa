//! Converting the IR to text.
//!
//! The textual form is for logging, verifier dumps and tests; it is not
//! parsed back. Pre-RA operands print as `%n` SSA ids; post-RA operands
//! print as `r<reg>.<comp>` / `hr...` the way the disassembler writes them.

use crate::ir::{Inst, InstrFlags, OpPayload, Reg, RegFlags, Shader, INVALID_REG};
use core::fmt::{self, Display, Formatter};

/// A wrapper that displays one instruction with its operands.
pub struct DisplayInst<'a> {
    sh: &'a Shader,
    inst: Inst,
}

impl Shader {
    /// Display `inst` including operands and flags.
    pub fn display_inst(&self, inst: Inst) -> DisplayInst<'_> {
        DisplayInst { sh: self, inst }
    }

    /// Write the whole shader as text.
    pub fn display(&self) -> DisplayShader<'_> {
        DisplayShader { sh: self }
    }
}

fn write_reg(f: &mut Formatter, sh: &Shader, reg: Reg) -> fmt::Result {
    let rd = &sh.regs[reg];
    let flags = rd.flags;
    if flags.contains(RegFlags::FNEG) || flags.contains(RegFlags::SNEG) {
        f.write_str("(neg)")?;
    }
    if flags.contains(RegFlags::FABS) || flags.contains(RegFlags::SABS) {
        f.write_str("(abs)")?;
    }
    if flags.contains(RegFlags::BNOT) {
        f.write_str("(not)")?;
    }
    if flags.contains(RegFlags::IMMED) {
        return write!(f, "{:#x}", rd.imm);
    }
    if flags.contains(RegFlags::CONST) {
        let half = if flags.contains(RegFlags::HALF) { "h" } else { "" };
        return write!(f, "{}c{}.{}", half, rd.num >> 2, comp_name(rd.num & 3));
    }
    if flags.contains(RegFlags::ARRAY) {
        if let Some(arr) = rd.array.expand() {
            return write!(f, "{}[{}]", arr, rd.array_offset);
        }
    }
    if rd.num != INVALID_REG {
        if flags.contains(RegFlags::PREDICATE) {
            return write!(f, "p0.{}", comp_name(rd.num & 3));
        }
        if flags.contains(RegFlags::ADDR) {
            return write!(f, "a{}.x", rd.num & 1);
        }
        let prefix = if flags.contains(RegFlags::SHARED) {
            "sr"
        } else if flags.contains(RegFlags::HALF) {
            "hr"
        } else {
            "r"
        };
        return write!(f, "{}{}.{}", prefix, rd.num >> 2, comp_name(rd.num & 3));
    }
    if flags.contains(RegFlags::SSA) {
        if let Some(def) = rd.def.expand() {
            return write!(f, "{def}");
        }
        return write!(f, "{reg}");
    }
    f.write_str("(undef)")
}

fn comp_name(c: u16) -> char {
    match c & 3 {
        0 => 'x',
        1 => 'y',
        2 => 'z',
        _ => 'w',
    }
}

impl Display for DisplayInst<'_> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let data = &self.sh.insts[self.inst];
        if data.flags.contains(InstrFlags::SY) {
            f.write_str("(sy)")?;
        }
        if data.flags.contains(InstrFlags::SS) {
            f.write_str("(ss)")?;
        }
        if data.flags.contains(InstrFlags::JP) {
            f.write_str("(jp)")?;
        }
        if data.nop > 0 {
            write!(f, "(nop{})", data.nop)?;
        }
        if data.repeat > 0 {
            write!(f, "(rpt{})", data.repeat)?;
        }
        if data.flags.contains(InstrFlags::SAT) {
            f.write_str("(sat)")?;
        }
        f.write_str(data.opcode.name())?;
        if let OpPayload::Mov {
            src_type, dst_type, ..
        } = data.payload
        {
            write!(f, ".{}{}", dst_type, src_type)?;
        }
        if let OpPayload::Cmp { cond } = data.payload {
            write!(f, ".{cond}")?;
        }
        let mut first = true;
        for &dst in &data.dsts {
            f.write_str(if first { " " } else { ", " })?;
            first = false;
            // Destinations carry an SSA id pre-RA.
            if self.sh.regs[dst].num == INVALID_REG {
                write!(f, "{dst}")?;
            } else {
                write_reg(f, self.sh, dst)?;
            }
        }
        for &src in &data.srcs {
            f.write_str(if first { " " } else { ", " })?;
            first = false;
            write_reg(f, self.sh, src)?;
        }
        if let OpPayload::Branch { target } = data.payload {
            if let Some(t) = target.expand() {
                write!(f, " -> {t}")?;
            }
        }
        Ok(())
    }
}

/// A wrapper that displays a whole shader.
pub struct DisplayShader<'a> {
    sh: &'a Shader,
}

impl Display for DisplayShader<'_> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        for block in self.sh.layout.blocks() {
            write!(f, "{block}:")?;
            let data = &self.sh.blocks[block];
            if let Some(s0) = data.succs[0].expand() {
                write!(f, " -> {s0}")?;
                if let Some(s1) = data.succs[1].expand() {
                    write!(f, ", {s1}")?;
                }
            }
            writeln!(f)?;
            for inst in self.sh.layout.block_insts(block) {
                writeln!(f, "  {}", self.sh.display_inst(inst))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::GpuInfo;
    use crate::cursor::{Cursor, ShaderCursor};
    use crate::ir::{NumType, Opcode, ShaderStage};

    #[test]
    fn prints_mov_and_modifiers() {
        let mut sh = Shader::new(GpuInfo::default(), ShaderStage::Fragment);
        let block = sh.create_block();
        let mut cur = ShaderCursor::new(&mut sh).at_bottom(block);
        let x = cur.ins().input(0, false);
        let xd = cur.shader.insts[x].dst();
        let add = cur.ins().binary(Opcode::AddF, xd, xd);
        let s0 = cur.shader.insts[add].srcs[0];
        cur.shader.regs[s0].flags.insert(RegFlags::FNEG);

        let text = sh.display_inst(add).to_string();
        assert!(text.starts_with("add.f"), "got {text}");
        assert!(text.contains("(neg)"), "got {text}");

        let mut cur = ShaderCursor::new(&mut sh).at_bottom(block);
        let m = cur.ins().mov_imm(NumType::F32, 0x3f80_0000);
        let text = sh.display_inst(m).to_string();
        assert!(text.contains("mov.f32f32"), "got {text}");
    }

    #[test]
    fn prints_physical_regs_and_flags() {
        let mut sh = Shader::new(GpuInfo::default(), ShaderStage::Fragment);
        let block = sh.create_block();
        let inst = sh.create_instr(Opcode::AddF, 1, 2);
        let d = sh.make_dst(inst, RegFlags::new());
        sh.regs[d].num = 6; // r1.z
        sh.make_src_num(inst, 0, RegFlags::new());
        sh.make_src_const(inst, 5, RegFlags::new());
        sh.insts[inst].flags.insert(InstrFlags::SY);
        sh.layout.append_inst(inst, block);

        let text = sh.display_inst(inst).to_string();
        assert!(text.starts_with("(sy)add.f"), "got {text}");
        assert!(text.contains("r1.z"), "got {text}");
        assert!(text.contains("c1.y"), "got {text}");
    }

    #[test]
    fn whole_shader_lists_blocks() {
        let mut sh = Shader::new(GpuInfo::default(), ShaderStage::Fragment);
        let b0 = sh.create_block();
        let b1 = sh.create_block();
        sh.set_succs(b0, [Some(b1), None]);
        let mut cur = ShaderCursor::new(&mut sh).at_bottom(b0);
        cur.ins().end();
        let text = sh.display().to_string();
        assert!(text.contains("block0: -> block1"), "got {text}");
        assert!(text.contains("  end"), "got {text}");
    }
}
