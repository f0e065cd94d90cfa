//! Instruction opcodes and categories.
//!
//! The target ISA groups instructions into eight hardware categories plus a
//! software-only "meta" category for compile-time constructs that never
//! reach the encoder:
//!
//! - cat0: flow control (branches, jumps, kills, shader end)
//! - cat1: moves and conversions
//! - cat2: two-source ALU
//! - cat3: three-source ALU
//! - cat4: special function unit (transcendentals)
//! - cat5: texture
//! - cat6: memory
//! - cat7: barriers and cache control
//!
//! The real code generator derives opcode tables from a machine
//! description; here the `opcodes!` macro is the single source of truth for
//! the enumeration, the category map, and the assembly names.

use core::fmt::{self, Display, Formatter};

/// Hardware instruction category.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum Category {
    /// Flow control.
    Cat0,
    /// Moves and conversions.
    Cat1,
    /// Two-source ALU.
    Cat2,
    /// Three-source ALU.
    Cat3,
    /// Special function unit.
    Cat4,
    /// Texture.
    Cat5,
    /// Memory.
    Cat6,
    /// Barrier.
    Cat7,
    /// Compile-time-only constructs.
    Meta,
}

macro_rules! opcodes {
    ($( $cat:ident => { $( $name:ident = $text:literal, )+ } )+) => {
        /// An instruction opcode.
        ///
        /// All opcodes used in this IR. The enumeration is closed; passes
        /// match exhaustively on it and on [`Category`].
        #[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
        pub enum Opcode {
            $( $( #[doc = concat!("`", $text, "`")] $name, )+ )+
        }

        impl Opcode {
            /// The hardware category this opcode belongs to.
            pub fn category(self) -> Category {
                match self {
                    $( $( Opcode::$name )|+ => Category::$cat, )+
                }
            }

            /// The assembly mnemonic.
            pub fn name(self) -> &'static str {
                match self {
                    $( $( Opcode::$name => $text, )+ )+
                }
            }
        }
    };
}

opcodes! {
    Cat0 => {
        Nop = "nop",
        Br = "br",
        Jump = "jump",
        End = "end",
        Ret = "ret",
        Kill = "kill",
        Demote = "demote",
        CondEnd = "cond_end",
        Emit = "emit",
        Cut = "cut",
        Chmask = "chmask",
        Chsh = "chsh",
        Flow = "flow",
        Predt = "predt",
        Predf = "predf",
        Prede = "prede",
        Getone = "getone",
        Shps = "shps",
        Shpe = "shpe",
    }
    Cat1 => {
        Mov = "mov",
        Movmsk = "movmsk",
        Movs = "movs",
        Sct = "sct",
        Swz = "swz",
        Gat = "gat",
    }
    Cat2 => {
        AddF = "add.f",
        MinF = "min.f",
        MaxF = "max.f",
        MulF = "mul.f",
        Sign = "sign.f",
        CmpsF = "cmps.f",
        AbsnegF = "absneg.f",
        CmpvF = "cmpv.f",
        FloorF = "floor.f",
        CeilF = "ceil.f",
        RndneF = "rndne.f",
        RndazF = "rndaz.f",
        TruncF = "trunc.f",
        AddU = "add.u",
        AddS = "add.s",
        SubU = "sub.u",
        SubS = "sub.s",
        CmpsU = "cmps.u",
        CmpsS = "cmps.s",
        MinU = "min.u",
        MinS = "min.s",
        MaxU = "max.u",
        MaxS = "max.s",
        AbsnegS = "absneg.s",
        AndB = "and.b",
        OrB = "or.b",
        NotB = "not.b",
        XorB = "xor.b",
        CmpvU = "cmpv.u",
        CmpvS = "cmpv.s",
        MulU24 = "mul.u24",
        MulS24 = "mul.s24",
        MullU = "mull.u",
        BfrevB = "bfrev.b",
        ClzB = "clz.b",
        ShlB = "shl.b",
        ShrB = "shr.b",
        AshrB = "ashr.b",
        BaryF = "bary.f",
        FlatB = "flat.b",
        MgenB = "mgen.b",
        GetbitB = "getbit.b",
        GetbyteB = "getbyte.b",
        ShbB = "shb.b",
        MsadB = "msad.b",
        Setrm = "setrm",
        CbitsB = "cbits.b",
    }
    Cat3 => {
        MadU16 = "mad.u16",
        MadU24 = "mad.u24",
        MadS16 = "mad.s16",
        MadS24 = "mad.s24",
        MadF16 = "mad.f16",
        MadF32 = "mad.f32",
        SadS16 = "sad.s16",
        SadS32 = "sad.s32",
        SelB16 = "sel.b16",
        SelB32 = "sel.b32",
        SelS16 = "sel.s16",
        SelS32 = "sel.s32",
        SelF16 = "sel.f16",
        SelF32 = "sel.f32",
        MadmV = "madm.v",
        MadshM16 = "madsh.m16",
        ShrmB = "shrm.b",
        ShlmB = "shlm.b",
        ShrgB = "shrg.b",
        ShlgB = "shlg.b",
        AndgB = "andg.b",
        Dp2acc = "dp2acc",
        Dp4acc = "dp4acc",
        WmmAccu = "wmm.accu",
    }
    Cat4 => {
        Rcp = "rcp",
        Rsq = "rsq",
        Log2 = "log2",
        Exp2 = "exp2",
        Sin = "sin",
        Cos = "cos",
        Sqrt = "sqrt",
        Hrsq = "hrsq",
        Hlog2 = "hlog2",
        Hexp2 = "hexp2",
    }
    Cat5 => {
        Isam = "isam",
        Isaml = "isaml",
        Isamm = "isamm",
        Sam = "sam",
        Samb = "samb",
        Saml = "saml",
        Samgq = "samgq",
        Getlod = "getlod",
        Conv = "conv",
        ConvM = "convm",
        Getsize = "getsize",
        Getbuf = "getbuf",
        Getpos = "getpos",
        Getinfo = "getinfo",
        Dsx = "dsx",
        Dsy = "dsy",
        Gather4r = "gather4r",
        Gather4g = "gather4g",
        Gather4b = "gather4b",
        Gather4a = "gather4a",
        Samgp0 = "samgp0",
        Samgp1 = "samgp1",
        Samgp2 = "samgp2",
        Samgp3 = "samgp3",
        Dsxpp = "dsxpp.1",
        Dsypp = "dsypp.1",
        Rgetpos = "rgetpos",
        Rgetinfo = "rgetinfo",
        Brcst = "brcst.active",
        QuadShuffle = "quad_shuffle",
    }
    Cat6 => {
        Ldg = "ldg",
        Ldl = "ldl",
        Ldp = "ldp",
        Stg = "stg",
        Stl = "stl",
        Stp = "stp",
        Ldib = "ldib",
        Stib = "stib",
        G2l = "g2l",
        L2g = "l2g",
        Prefetch = "prefetch",
        Ldlw = "ldlw",
        Stlw = "stlw",
        Resfmt = "resfmt",
        Resinfo = "resinfo",
        Ldgb = "ldgb",
        Stgb = "stgb",
        Ldc = "ldc",
        Ldlv = "ldlv",
        AtomicAdd = "atomic.add",
        AtomicSub = "atomic.sub",
        AtomicXchg = "atomic.xchg",
        AtomicInc = "atomic.inc",
        AtomicDec = "atomic.dec",
        AtomicCmpxchg = "atomic.cmpxchg",
        AtomicMin = "atomic.min",
        AtomicMax = "atomic.max",
        AtomicAnd = "atomic.and",
        AtomicOr = "atomic.or",
        AtomicXor = "atomic.xor",
        Getspid = "getspid",
        Getwid = "getwid",
        Getfiberid = "getfiberid",
        StcPush = "stc",
    }
    Cat7 => {
        Bar = "bar",
        Fence = "fence",
        Sleep = "sleep",
        Icinv = "icinv",
        Dccln = "dccln",
        Dcinv = "dcinv",
        Dcflu = "dcflu",
        Ccinv = "ccinv",
        Lock = "lock",
        Unlock = "unlock",
    }
    Meta => {
        MetaInput = "_input",
        MetaSplit = "_split",
        MetaCollect = "_collect",
        MetaPhi = "_phi",
        MetaParallelCopy = "_pcopy",
        MetaTexPrefetch = "_tex_prefetch",
        MetaBlockEnd = "_end",
    }
}

impl Opcode {
    /// Does this opcode execute on one of the ALU pipes (cat1-cat4)?
    pub fn is_alu(self) -> bool {
        matches!(
            self.category(),
            Category::Cat1 | Category::Cat2 | Category::Cat3 | Category::Cat4
        )
    }

    /// Flow-control opcode (cat0)?
    pub fn is_flow(self) -> bool {
        self.category() == Category::Cat0
    }

    /// Special-function-unit opcode (cat4)?
    pub fn is_sfu(self) -> bool {
        self.category() == Category::Cat4
    }

    /// Texture opcode (cat5)?
    pub fn is_tex(self) -> bool {
        self.category() == Category::Cat5
    }

    /// Memory opcode (cat6)?
    pub fn is_mem(self) -> bool {
        self.category() == Category::Cat6
    }

    /// Barrier opcode (cat7)?
    pub fn is_barrier(self) -> bool {
        self.category() == Category::Cat7
    }

    /// Compile-time-only opcode?
    pub fn is_meta(self) -> bool {
        self.category() == Category::Meta
    }

    /// Does this opcode end a block?
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            Opcode::Br
                | Opcode::Jump
                | Opcode::End
                | Opcode::Ret
                | Opcode::Chmask
                | Opcode::Chsh
                | Opcode::Getone
        )
    }

    /// Does this opcode branch, i.e. can its block have two successors?
    pub fn is_branch(self) -> bool {
        matches!(self, Opcode::Br | Opcode::Getone)
    }

    /// Kill or demote: stops (or suspends) fragment processing.
    pub fn is_kill(self) -> bool {
        matches!(self, Opcode::Kill | Opcode::Demote)
    }

    /// Varying-fetch or input-marker opcode. The last input fetch must stay
    /// ahead of any kill so the varying storage can be released.
    pub fn is_input(self) -> bool {
        matches!(self, Opcode::BaryF | Opcode::FlatB | Opcode::MetaInput)
    }

    /// Same-cycle meta marker scheduled at the block head.
    pub fn is_head_meta(self) -> bool {
        matches!(
            self,
            Opcode::MetaInput | Opcode::MetaTexPrefetch | Opcode::StcPush
        )
    }

    /// Ternary multiply-add family (cat3 `mad.*`/`madsh.*`).
    pub fn is_mad(self) -> bool {
        matches!(
            self,
            Opcode::MadU16
                | Opcode::MadU24
                | Opcode::MadS16
                | Opcode::MadS24
                | Opcode::MadF16
                | Opcode::MadF32
                | Opcode::MadshM16
        )
    }

    /// Sum-of-absolute-differences family (cat3 `sad.*`).
    pub fn is_sad(self) -> bool {
        matches!(self, Opcode::SadS16 | Opcode::SadS32)
    }

    /// Memory opcode operating on fiber-local storage.
    pub fn is_local_mem(self) -> bool {
        matches!(
            self,
            Opcode::Ldl
                | Opcode::Stl
                | Opcode::Ldp
                | Opcode::Stp
                | Opcode::Ldlw
                | Opcode::Stlw
                | Opcode::Ldlv
        )
    }

    /// Memory opcode whose result returns through the long-latency path and
    /// must be awaited with the `sy` sync bit.
    pub fn is_global_mem_load(self) -> bool {
        matches!(
            self,
            Opcode::Ldg
                | Opcode::Ldgb
                | Opcode::Ldib
                | Opcode::Ldc
                | Opcode::G2l
                | Opcode::Resinfo
                | Opcode::AtomicAdd
                | Opcode::AtomicSub
                | Opcode::AtomicXchg
                | Opcode::AtomicInc
                | Opcode::AtomicDec
                | Opcode::AtomicCmpxchg
                | Opcode::AtomicMin
                | Opcode::AtomicMax
                | Opcode::AtomicAnd
                | Opcode::AtomicOr
                | Opcode::AtomicXor
        )
    }

    /// Does this opcode produce its result through the `ss` path (SFU and
    /// fiber-local memory)?
    pub fn is_ss_producer(self) -> bool {
        self.is_sfu() || self.is_local_mem() || matches!(self, Opcode::Movmsk | Opcode::Getfiberid)
    }

    /// Does this opcode produce its result through the `sy` path (texture
    /// and global memory)?
    pub fn is_sy_producer(self) -> bool {
        self.is_tex() || self.is_global_mem_load()
    }

    /// Producers that read their sources some cycles after issue, so a
    /// subsequent overwrite of a source register needs an `ss` wait.
    pub fn is_war_hazard_producer(self) -> bool {
        self.is_ss_producer() || self.is_sy_producer()
    }

    /// Does this opcode write memory (or otherwise have an effect that must
    /// not be dead-code eliminated)?
    pub fn has_side_effects(self) -> bool {
        if self.is_flow() || self.is_barrier() {
            return true;
        }
        matches!(
            self,
            Opcode::Stg
                | Opcode::Stl
                | Opcode::Stp
                | Opcode::Stib
                | Opcode::Stlw
                | Opcode::Stgb
                | Opcode::L2g
                | Opcode::G2l
                | Opcode::AtomicAdd
                | Opcode::AtomicSub
                | Opcode::AtomicXchg
                | Opcode::AtomicInc
                | Opcode::AtomicDec
                | Opcode::AtomicCmpxchg
                | Opcode::AtomicMin
                | Opcode::AtomicMax
                | Opcode::AtomicAnd
                | Opcode::AtomicOr
                | Opcode::AtomicXor
                | Opcode::StcPush
        )
    }

    /// Is the result of this opcode known to be a canonical boolean
    /// (the compare family writes 0 or 1)?
    pub fn produces_bool(self) -> bool {
        matches!(
            self,
            Opcode::CmpsF
                | Opcode::CmpsU
                | Opcode::CmpsS
                | Opcode::CmpvF
                | Opcode::CmpvU
                | Opcode::CmpvS
        )
    }

    /// Cat2 opcodes that interpret their sources as floats.
    pub fn is_cat2_float(self) -> bool {
        matches!(
            self,
            Opcode::AddF
                | Opcode::MinF
                | Opcode::MaxF
                | Opcode::MulF
                | Opcode::Sign
                | Opcode::CmpsF
                | Opcode::AbsnegF
                | Opcode::CmpvF
                | Opcode::FloorF
                | Opcode::CeilF
                | Opcode::RndneF
                | Opcode::RndazF
                | Opcode::TruncF
        )
    }

    /// Cat2 opcodes that interpret their sources as integers.
    pub fn is_cat2_int(self) -> bool {
        self.category() == Category::Cat2 && !self.is_cat2_float() && !self.is_input()
    }

    /// Float-flavored consumer: float modifiers apply, and 16-bit constant
    /// narrowing is representable.
    pub fn is_float(self) -> bool {
        self.is_cat2_float()
            || self.is_sfu()
            || matches!(
                self,
                Opcode::MadF16 | Opcode::MadF32 | Opcode::SelF16 | Opcode::SelF32
            )
    }
}

impl Display for Opcode {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories() {
        assert_eq!(Opcode::Kill.category(), Category::Cat0);
        assert_eq!(Opcode::Mov.category(), Category::Cat1);
        assert_eq!(Opcode::BaryF.category(), Category::Cat2);
        assert_eq!(Opcode::MadF32.category(), Category::Cat3);
        assert_eq!(Opcode::Rsq.category(), Category::Cat4);
        assert_eq!(Opcode::Sam.category(), Category::Cat5);
        assert_eq!(Opcode::Ldg.category(), Category::Cat6);
        assert_eq!(Opcode::Fence.category(), Category::Cat7);
        assert_eq!(Opcode::MetaPhi.category(), Category::Meta);
    }

    #[test]
    fn unit_queries() {
        assert!(Opcode::Rsq.is_alu());
        assert!(Opcode::Rsq.is_sfu());
        assert!(Opcode::Mov.is_alu());
        assert!(!Opcode::Sam.is_alu());
        assert!(Opcode::Sam.is_tex());
        assert!(Opcode::Stg.is_mem());
        assert!(Opcode::Br.is_terminator());
        assert!(Opcode::Br.is_branch());
        assert!(!Opcode::Jump.is_branch());
        assert!(Opcode::MetaCollect.is_meta());
    }

    #[test]
    fn sync_producers() {
        assert!(Opcode::Rcp.is_ss_producer());
        assert!(Opcode::Ldl.is_ss_producer());
        assert!(!Opcode::AddF.is_ss_producer());
        assert!(Opcode::Sam.is_sy_producer());
        assert!(Opcode::Ldg.is_sy_producer());
        assert!(!Opcode::Stl.is_sy_producer());
    }

    #[test]
    fn side_effects() {
        assert!(Opcode::Stg.has_side_effects());
        assert!(Opcode::Kill.has_side_effects());
        assert!(Opcode::Bar.has_side_effects());
        assert!(!Opcode::AddF.has_side_effects());
        assert!(!Opcode::Sam.has_side_effects());
    }

    #[test]
    fn names() {
        assert_eq!(Opcode::MadF32.name(), "mad.f32");
        assert_eq!(Opcode::BaryF.to_string(), "bary.f");
    }
}
