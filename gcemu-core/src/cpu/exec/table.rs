//! Opcode dispatch table.
//!
//! A two-level table: the primary opcode selects a group, the extended
//! opcode (0 for D/I/B-form groups) selects the entry inside it. Each entry
//! carries the handler together with the mnemonic and operand layout, so the
//! disassembler and the engine agree on what is defined.
//!
//! The table is built once, on first use, and shared for the life of the
//! process.

use std::sync::OnceLock;

use super::{branch, float, integer, load_store, paired, system, Handler};
use crate::cpu::decoder::Instruction;

/// Operand layout of an instruction, used for disassembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Form {
    /// No operands (`sync`, `isync`, `rfi`, `sc`, ...).
    None,
    /// `rD, rA, SIMM`
    DArith,
    /// `rA, rS, UIMM`
    DLogical,
    /// `crfD, rA, SIMM`
    DCompare,
    /// `crfD, rA, UIMM`
    DCompareLogical,
    /// `TO, rA, SIMM`
    DTrap,
    /// `rD, d(rA)`
    DLoadStore,
    /// `frD, d(rA)`
    DFloatLoadStore,
    /// `frD, d(rA), W, I`
    PsqLoadStore,
    /// `frD, rA, rB, W, I`
    PsqIndexed,
    /// `target`
    BranchI,
    /// `BO, BI, target`
    BranchB,
    /// `BO, BI`
    BranchReg,
    /// `crbD, crbA, crbB`
    CrLogical,
    /// `crfD, crfS`
    CrMove,
    /// `rD, rA, rB`
    XArith,
    /// `rD, rA`
    XUnary,
    /// `rA, rS, rB`
    XLogical,
    /// `rA, rS`
    XLogicalUnary,
    /// `rA, rS, SH`
    XShiftImm,
    /// `crfD, rA, rB`
    XCompare,
    /// `TO, rA, rB`
    XTrap,
    /// `rD, rA, rB`
    XLoadStore,
    /// `frD, rA, rB`
    XFloatLoadStore,
    /// `rA, rB`
    XCache,
    /// `rD, rA, NB`
    XStringImm,
    /// `rA, rS, SH, MB, ME`
    Rotate,
    /// `rA, rS, rB, MB, ME`
    RotateReg,
    /// `rD, SPR`
    MoveFromSpr,
    /// `SPR, rS`
    MoveToSpr,
    /// `rD`
    MoveFromReg,
    /// `rS`
    MoveToReg,
    /// `CRM, rS`
    MoveToCrf,
    /// `crfD`
    CrField,
    /// `rD, SR`
    MoveFromSr,
    /// `SR, rS`
    MoveToSr,
    /// `rD, rB`
    MoveFromSrIndirect,
    /// `rS, rB`
    MoveToSrIndirect,
    /// `rD, TBR`
    MoveFromTb,
    /// `rB`
    TlbInvalidate,
    /// `frD, frA, frB`
    FloatA,
    /// `frD, frA, frC`
    FloatMul,
    /// `frD, frA, frC, frB`
    FloatFused,
    /// `frD, frB`
    FloatUnary,
    /// `crfD, frA, frB`
    FloatCompare,
    /// `frD`
    FloatMoveFromFpscr,
    /// `FM, frB`
    FloatMoveToFpscr,
    /// `crfD, IMM`
    FloatFpscrImm,
    /// `crbD`
    FloatFpscrBit,
}

/// One defined instruction.
#[derive(Clone, Copy)]
pub struct OpcodeEntry {
    pub mnemonic: &'static str,
    pub form: Form,
    /// The Rc bit is honoured (a `.` variant exists).
    pub record: bool,
    /// The OE bit is honoured (an `o` variant exists).
    pub overflow: bool,
    pub(crate) handler: Handler,
}

impl std::fmt::Debug for OpcodeEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpcodeEntry")
            .field("mnemonic", &self.mnemonic)
            .field("form", &self.form)
            .field("record", &self.record)
            .field("overflow", &self.overflow)
            .finish()
    }
}

/// Dispatch table keyed by `(opcode, extended)`.
pub struct OpcodeTable {
    groups: Vec<Vec<Option<OpcodeEntry>>>,
}

static TABLE: OnceLock<OpcodeTable> = OnceLock::new();

impl OpcodeTable {
    /// The process-wide table, built on first call.
    pub fn get() -> &'static OpcodeTable {
        TABLE.get_or_init(OpcodeTable::build)
    }

    /// Entry for a decoded instruction, or `None` if the pair is undefined.
    #[inline]
    pub fn lookup(&self, instr: &Instruction) -> Option<&OpcodeEntry> {
        self.groups
            .get(usize::from(instr.opcode))?
            .get(usize::from(instr.extended))?
            .as_ref()
    }

    /// Number of defined `(opcode, extended)` pairs.
    pub fn len(&self) -> usize {
        self.groups
            .iter()
            .map(|group| group.iter().filter(|e| e.is_some()).count())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every defined pair with its entry, in opcode order.
    pub fn entries(&self) -> impl Iterator<Item = ((u8, u16), &OpcodeEntry)> {
        self.groups.iter().enumerate().flat_map(|(op, group)| {
            group.iter().enumerate().filter_map(move |(ext, entry)| {
                entry.as_ref().map(|entry| ((op as u8, ext as u16), entry))
            })
        })
    }

    fn insert(&mut self, opcode: u8, extended: u16, entry: OpcodeEntry) {
        let group = &mut self.groups[usize::from(opcode)];
        let index = usize::from(extended);
        if group.len() <= index {
            group.resize(index + 1, None);
        }
        debug_assert!(group[index].is_none(), "duplicate entry {opcode}/{extended}");
        group[index] = Some(entry);
    }

    /// Plain entry without Rc/OE variants.
    fn op(&mut self, opcode: u8, extended: u16, mnemonic: &'static str, form: Form, handler: Handler) {
        self.insert(
            opcode,
            extended,
            OpcodeEntry {
                mnemonic,
                form,
                record: false,
                overflow: false,
                handler,
            },
        );
    }

    /// Entry whose Rc bit selects a record variant.
    fn rc(&mut self, opcode: u8, extended: u16, mnemonic: &'static str, form: Form, handler: Handler) {
        self.insert(
            opcode,
            extended,
            OpcodeEntry {
                mnemonic,
                form,
                record: true,
                overflow: false,
                handler,
            },
        );
    }

    /// XO-form entry: registered with OE clear and set.
    fn xo(&mut self, extended: u16, mnemonic: &'static str, form: Form, handler: Handler) {
        let entry = OpcodeEntry {
            mnemonic,
            form,
            record: true,
            overflow: true,
            handler,
        };
        self.insert(31, extended, entry);
        self.insert(31, extended | 0x200, entry);
    }

    fn build() -> Self {
        let mut t = Self {
            groups: vec![Vec::new(); 64],
        };

        t.integer_ops();
        t.branch_ops();
        t.load_store_ops();
        t.system_ops();
        t.float_ops();
        t.paired_ops();

        t
    }

    fn integer_ops(&mut self) {
        use integer::*;
        use Form::*;

        self.op(3, 0, "twi", DTrap, twi);
        self.op(7, 0, "mulli", DArith, mulli);
        self.op(8, 0, "subfic", DArith, subfic);
        self.op(10, 0, "cmpli", DCompareLogical, cmpli);
        self.op(11, 0, "cmpi", DCompare, cmpi);
        self.op(12, 0, "addic", DArith, addic);
        self.op(13, 0, "addic.", DArith, addic_record);
        self.op(14, 0, "addi", DArith, addi);
        self.op(15, 0, "addis", DArith, addis);
        self.rc(20, 0, "rlwimi", Rotate, rlwimi);
        self.rc(21, 0, "rlwinm", Rotate, rlwinm);
        self.rc(23, 0, "rlwnm", RotateReg, rlwnm);
        self.op(24, 0, "ori", DLogical, ori);
        self.op(25, 0, "oris", DLogical, oris);
        self.op(26, 0, "xori", DLogical, xori);
        self.op(27, 0, "xoris", DLogical, xoris);
        self.op(28, 0, "andi.", DLogical, andi_record);
        self.op(29, 0, "andis.", DLogical, andis_record);

        self.op(31, 0, "cmp", XCompare, cmp);
        self.op(31, 4, "tw", XTrap, tw);
        self.op(31, 32, "cmpl", XCompare, cmpl);

        self.xo(8, "subfc", XArith, subfc);
        self.xo(10, "addc", XArith, addc);
        self.rc(31, 11, "mulhwu", XArith, mulhwu);
        self.xo(40, "subf", XArith, subf);
        self.rc(31, 75, "mulhw", XArith, mulhw);
        self.xo(104, "neg", XUnary, neg);
        self.xo(136, "subfe", XArith, subfe);
        self.xo(138, "adde", XArith, adde);
        self.xo(200, "subfze", XUnary, subfze);
        self.xo(202, "addze", XUnary, addze);
        self.xo(232, "subfme", XUnary, subfme);
        self.xo(234, "addme", XUnary, addme);
        self.xo(235, "mullw", XArith, mullw);
        self.xo(266, "add", XArith, add);
        self.xo(459, "divwu", XArith, divwu);
        self.xo(491, "divw", XArith, divw);

        self.rc(31, 24, "slw", XLogical, slw);
        self.rc(31, 26, "cntlzw", XLogicalUnary, cntlzw);
        self.rc(31, 28, "and", XLogical, and);
        self.rc(31, 60, "andc", XLogical, andc);
        self.rc(31, 124, "nor", XLogical, nor);
        self.rc(31, 284, "eqv", XLogical, eqv);
        self.rc(31, 316, "xor", XLogical, xor);
        self.rc(31, 412, "orc", XLogical, orc);
        self.rc(31, 444, "or", XLogical, or);
        self.rc(31, 476, "nand", XLogical, nand);
        self.rc(31, 536, "srw", XLogical, srw);
        self.rc(31, 792, "sraw", XLogical, sraw);
        self.rc(31, 824, "srawi", XShiftImm, srawi);
        self.rc(31, 922, "extsh", XLogicalUnary, extsh);
        self.rc(31, 954, "extsb", XLogicalUnary, extsb);
    }

    fn branch_ops(&mut self) {
        use branch::*;
        use Form::*;

        self.op(16, 0, "bc", BranchB, bc);
        self.op(17, 0, "sc", None, sc);
        self.op(18, 0, "b", BranchI, b);

        self.op(19, 0, "mcrf", CrMove, mcrf);
        self.op(19, 16, "bclr", BranchReg, bclr);
        self.op(19, 33, "crnor", CrLogical, crnor);
        self.op(19, 50, "rfi", None, rfi);
        self.op(19, 129, "crandc", CrLogical, crandc);
        self.op(19, 150, "isync", None, system::no_op);
        self.op(19, 193, "crxor", CrLogical, crxor);
        self.op(19, 225, "crnand", CrLogical, crnand);
        self.op(19, 257, "crand", CrLogical, crand);
        self.op(19, 289, "creqv", CrLogical, creqv);
        self.op(19, 417, "crorc", CrLogical, crorc);
        self.op(19, 449, "cror", CrLogical, cror);
        self.op(19, 528, "bcctr", BranchReg, bcctr);
    }

    fn load_store_ops(&mut self) {
        use load_store::*;
        use Form::*;

        // D-form: WIDTH, ALGEBRAIC, INDEXED, UPDATE
        self.op(32, 0, "lwz", DLoadStore, load_int::<4, false, false, false>);
        self.op(33, 0, "lwzu", DLoadStore, load_int::<4, false, false, true>);
        self.op(34, 0, "lbz", DLoadStore, load_int::<1, false, false, false>);
        self.op(35, 0, "lbzu", DLoadStore, load_int::<1, false, false, true>);
        self.op(40, 0, "lhz", DLoadStore, load_int::<2, false, false, false>);
        self.op(41, 0, "lhzu", DLoadStore, load_int::<2, false, false, true>);
        self.op(42, 0, "lha", DLoadStore, load_int::<2, true, false, false>);
        self.op(43, 0, "lhau", DLoadStore, load_int::<2, true, false, true>);
        self.op(36, 0, "stw", DLoadStore, store_int::<4, false, false>);
        self.op(37, 0, "stwu", DLoadStore, store_int::<4, false, true>);
        self.op(38, 0, "stb", DLoadStore, store_int::<1, false, false>);
        self.op(39, 0, "stbu", DLoadStore, store_int::<1, false, true>);
        self.op(44, 0, "sth", DLoadStore, store_int::<2, false, false>);
        self.op(45, 0, "sthu", DLoadStore, store_int::<2, false, true>);
        self.op(46, 0, "lmw", DLoadStore, lmw);
        self.op(47, 0, "stmw", DLoadStore, stmw);

        self.op(48, 0, "lfs", DFloatLoadStore, load_float::<4, false, false>);
        self.op(49, 0, "lfsu", DFloatLoadStore, load_float::<4, false, true>);
        self.op(50, 0, "lfd", DFloatLoadStore, load_float::<8, false, false>);
        self.op(51, 0, "lfdu", DFloatLoadStore, load_float::<8, false, true>);
        self.op(52, 0, "stfs", DFloatLoadStore, store_float::<4, false, false>);
        self.op(53, 0, "stfsu", DFloatLoadStore, store_float::<4, false, true>);
        self.op(54, 0, "stfd", DFloatLoadStore, store_float::<8, false, false>);
        self.op(55, 0, "stfdu", DFloatLoadStore, store_float::<8, false, true>);

        // X-form
        self.op(31, 20, "lwarx", XLoadStore, lwarx);
        self.op(31, 23, "lwzx", XLoadStore, load_int::<4, false, true, false>);
        self.op(31, 55, "lwzux", XLoadStore, load_int::<4, false, true, true>);
        self.op(31, 87, "lbzx", XLoadStore, load_int::<1, false, true, false>);
        self.op(31, 119, "lbzux", XLoadStore, load_int::<1, false, true, true>);
        self.op(31, 279, "lhzx", XLoadStore, load_int::<2, false, true, false>);
        self.op(31, 311, "lhzux", XLoadStore, load_int::<2, false, true, true>);
        self.op(31, 343, "lhax", XLoadStore, load_int::<2, true, true, false>);
        self.op(31, 375, "lhaux", XLoadStore, load_int::<2, true, true, true>);
        self.op(31, 150, "stwcx.", XLoadStore, stwcx_record);
        self.op(31, 151, "stwx", XLoadStore, store_int::<4, true, false>);
        self.op(31, 183, "stwux", XLoadStore, store_int::<4, true, true>);
        self.op(31, 215, "stbx", XLoadStore, store_int::<1, true, false>);
        self.op(31, 247, "stbux", XLoadStore, store_int::<1, true, true>);
        self.op(31, 407, "sthx", XLoadStore, store_int::<2, true, false>);
        self.op(31, 439, "sthux", XLoadStore, store_int::<2, true, true>);
        self.op(31, 533, "lswx", XLoadStore, lswx);
        self.op(31, 534, "lwbrx", XLoadStore, lwbrx);
        self.op(31, 597, "lswi", XStringImm, lswi);
        self.op(31, 661, "stswx", XLoadStore, stswx);
        self.op(31, 662, "stwbrx", XLoadStore, stwbrx);
        self.op(31, 725, "stswi", XStringImm, stswi);
        self.op(31, 790, "lhbrx", XLoadStore, lhbrx);
        self.op(31, 918, "sthbrx", XLoadStore, sthbrx);

        self.op(31, 535, "lfsx", XFloatLoadStore, load_float::<4, true, false>);
        self.op(31, 567, "lfsux", XFloatLoadStore, load_float::<4, true, true>);
        self.op(31, 599, "lfdx", XFloatLoadStore, load_float::<8, true, false>);
        self.op(31, 631, "lfdux", XFloatLoadStore, load_float::<8, true, true>);
        self.op(31, 663, "stfsx", XFloatLoadStore, store_float::<4, true, false>);
        self.op(31, 695, "stfsux", XFloatLoadStore, store_float::<4, true, true>);
        self.op(31, 727, "stfdx", XFloatLoadStore, store_float::<8, true, false>);
        self.op(31, 759, "stfdux", XFloatLoadStore, store_float::<8, true, true>);
        self.op(31, 983, "stfiwx", XFloatLoadStore, stfiwx);
    }

    fn system_ops(&mut self) {
        use system::*;
        use Form::*;

        self.op(31, 19, "mfcr", MoveFromReg, mfcr);
        self.op(31, 83, "mfmsr", MoveFromReg, mfmsr);
        self.op(31, 144, "mtcrf", MoveToCrf, mtcrf);
        self.op(31, 146, "mtmsr", MoveToReg, mtmsr);
        self.op(31, 210, "mtsr", MoveToSr, mtsr);
        self.op(31, 242, "mtsrin", MoveToSrIndirect, mtsrin);
        self.op(31, 339, "mfspr", MoveFromSpr, mfspr);
        self.op(31, 371, "mftb", MoveFromTb, mftb);
        self.op(31, 467, "mtspr", MoveToSpr, mtspr);
        self.op(31, 512, "mcrxr", CrField, mcrxr);
        self.op(31, 595, "mfsr", MoveFromSr, mfsr);
        self.op(31, 659, "mfsrin", MoveFromSrIndirect, mfsrin);

        self.op(31, 54, "dcbst", XCache, no_op);
        self.op(31, 86, "dcbf", XCache, no_op);
        self.op(31, 246, "dcbtst", XCache, no_op);
        self.op(31, 278, "dcbt", XCache, no_op);
        self.op(31, 306, "tlbie", TlbInvalidate, no_op);
        self.op(31, 470, "dcbi", XCache, no_op);
        self.op(31, 566, "tlbsync", None, no_op);
        self.op(31, 598, "sync", None, no_op);
        self.op(31, 854, "eieio", None, no_op);
        self.op(31, 982, "icbi", XCache, no_op);
        self.op(31, 1014, "dcbz", XCache, dcbz);
    }

    fn float_ops(&mut self) {
        use float::*;
        use Form::*;

        // Single precision, A-form
        self.rc(59, 18, "fdivs", FloatA, fdiv::<true>);
        self.rc(59, 20, "fsubs", FloatA, fsub::<true>);
        self.rc(59, 21, "fadds", FloatA, fadd::<true>);
        self.rc(59, 22, "fsqrts", FloatUnary, fsqrt::<true>);
        self.rc(59, 24, "fres", FloatUnary, fres);
        self.rc(59, 25, "fmuls", FloatMul, fmul::<true>);
        self.rc(59, 28, "fmsubs", FloatFused, fmsub::<true>);
        self.rc(59, 29, "fmadds", FloatFused, fmadd::<true>);
        self.rc(59, 30, "fnmsubs", FloatFused, fnmsub::<true>);
        self.rc(59, 31, "fnmadds", FloatFused, fnmadd::<true>);

        // Double precision, A-form
        self.rc(63, 18, "fdiv", FloatA, fdiv::<false>);
        self.rc(63, 20, "fsub", FloatA, fsub::<false>);
        self.rc(63, 21, "fadd", FloatA, fadd::<false>);
        self.rc(63, 22, "fsqrt", FloatUnary, fsqrt::<false>);
        self.rc(63, 23, "fsel", FloatFused, fsel);
        self.rc(63, 25, "fmul", FloatMul, fmul::<false>);
        self.rc(63, 26, "frsqrte", FloatUnary, frsqrte);
        self.rc(63, 28, "fmsub", FloatFused, fmsub::<false>);
        self.rc(63, 29, "fmadd", FloatFused, fmadd::<false>);
        self.rc(63, 30, "fnmsub", FloatFused, fnmsub::<false>);
        self.rc(63, 31, "fnmadd", FloatFused, fnmadd::<false>);

        // X-form
        self.op(63, 0, "fcmpu", FloatCompare, fcmpu);
        self.rc(63, 12, "frsp", FloatUnary, frsp);
        self.rc(63, 14, "fctiw", FloatUnary, fctiw);
        self.rc(63, 15, "fctiwz", FloatUnary, fctiwz);
        self.op(63, 32, "fcmpo", FloatCompare, fcmpo);
        self.rc(63, 38, "mtfsb1", FloatFpscrBit, mtfsb1);
        self.rc(63, 40, "fneg", FloatUnary, fneg);
        self.op(63, 64, "mcrfs", CrMove, mcrfs);
        self.rc(63, 70, "mtfsb0", FloatFpscrBit, mtfsb0);
        self.rc(63, 72, "fmr", FloatUnary, fmr);
        self.rc(63, 134, "mtfsfi", FloatFpscrImm, mtfsfi);
        self.rc(63, 136, "fnabs", FloatUnary, fnabs);
        self.rc(63, 264, "fabs", FloatUnary, fabs);
        self.rc(63, 583, "mffs", FloatMoveFromFpscr, mffs);
        self.rc(63, 711, "mtfsf", FloatMoveToFpscr, mtfsf);
    }

    fn paired_ops(&mut self) {
        use paired::*;
        use Form::*;

        // Quantized loads and stores: INDEXED, UPDATE
        self.op(56, 0, "psq_l", PsqLoadStore, psq_load::<false, false>);
        self.op(57, 0, "psq_lu", PsqLoadStore, psq_load::<false, true>);
        self.op(60, 0, "psq_st", PsqLoadStore, psq_store::<false, false>);
        self.op(61, 0, "psq_stu", PsqLoadStore, psq_store::<false, true>);
        self.op(4, 6, "psq_lx", PsqIndexed, psq_load::<true, false>);
        self.op(4, 7, "psq_stx", PsqIndexed, psq_store::<true, false>);
        self.op(4, 38, "psq_lux", PsqIndexed, psq_load::<true, true>);
        self.op(4, 39, "psq_stux", PsqIndexed, psq_store::<true, true>);

        // A-form arithmetic
        self.rc(4, 10, "ps_sum0", FloatFused, ps_sum0);
        self.rc(4, 11, "ps_sum1", FloatFused, ps_sum1);
        self.rc(4, 12, "ps_muls0", FloatMul, ps_muls0);
        self.rc(4, 13, "ps_muls1", FloatMul, ps_muls1);
        self.rc(4, 14, "ps_madds0", FloatFused, ps_madds0);
        self.rc(4, 15, "ps_madds1", FloatFused, ps_madds1);
        self.rc(4, 18, "ps_div", FloatA, ps_div);
        self.rc(4, 20, "ps_sub", FloatA, ps_sub);
        self.rc(4, 21, "ps_add", FloatA, ps_add);
        self.rc(4, 23, "ps_sel", FloatFused, ps_sel);
        self.rc(4, 24, "ps_res", FloatUnary, ps_res);
        self.rc(4, 25, "ps_mul", FloatMul, ps_mul);
        self.rc(4, 26, "ps_rsqrte", FloatUnary, ps_rsqrte);
        self.rc(4, 28, "ps_msub", FloatFused, ps_msub);
        self.rc(4, 29, "ps_madd", FloatFused, ps_madd);
        self.rc(4, 30, "ps_nmsub", FloatFused, ps_nmsub);
        self.rc(4, 31, "ps_nmadd", FloatFused, ps_nmadd);

        // X-form
        self.op(4, 0, "ps_cmpu0", FloatCompare, ps_cmpu0);
        self.op(4, 32, "ps_cmpo0", FloatCompare, ps_cmpo0);
        self.rc(4, 40, "ps_neg", FloatUnary, ps_neg);
        self.op(4, 64, "ps_cmpu1", FloatCompare, ps_cmpu1);
        self.rc(4, 72, "ps_mr", FloatUnary, ps_mr);
        self.op(4, 96, "ps_cmpo1", FloatCompare, ps_cmpo1);
        self.rc(4, 136, "ps_nabs", FloatUnary, ps_nabs);
        self.rc(4, 264, "ps_abs", FloatUnary, ps_abs);
        self.rc(4, 528, "ps_merge00", FloatA, ps_merge00);
        self.rc(4, 560, "ps_merge01", FloatA, ps_merge01);
        self.rc(4, 592, "ps_merge10", FloatA, ps_merge10);
        self.rc(4, 624, "ps_merge11", FloatA, ps_merge11);
    }
}
