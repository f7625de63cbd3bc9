//! PowerPC Disassembler
//!
//! Renders a decoded [`Instruction`] as assembler text. Mnemonics and operand
//! layouts come from the execution engine's [`OpcodeTable`], so an encoding
//! disassembles exactly when the interpreter can execute it; anything else
//! prints as a `.word` directive.
//!
//! # Memory Optimization
//! Operands are collected in a `SmallVec<[Operand; 4]>`: only the rotate
//! forms carry five operands and spill to the heap.

use std::fmt;

use smallvec::{smallvec, SmallVec};

use crate::cpu::decoder::Instruction;
use crate::cpu::exec::{Form, OpcodeTable};

/// One rendered operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// General-purpose register (r0-r31)
    Register(u8),
    /// Floating-point register (f0-f31)
    FpRegister(u8),
    /// Signed immediate
    Immediate(i32),
    /// Unsigned immediate, printed in hex
    UnsignedImmediate(u32),
    /// Absolute branch target
    Address(u32),
    /// Condition register field (cr0-cr7)
    Condition(u8),
    /// Special-purpose register number
    SpecialRegister(u16),
    /// Segment register number
    SegmentRegister(u8),
    /// `d(rA)` memory operand
    Displacement(i32, u8),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Operand::Register(r) => write!(f, "r{r}"),
            Operand::FpRegister(r) => write!(f, "f{r}"),
            Operand::Immediate(value) => write!(f, "{value}"),
            Operand::UnsignedImmediate(value) => write!(f, "0x{value:X}"),
            Operand::Address(address) => write!(f, "0x{address:08X}"),
            Operand::Condition(field) => write!(f, "cr{field}"),
            Operand::SpecialRegister(spr) => write!(f, "{spr}"),
            Operand::SegmentRegister(sr) => write!(f, "{sr}"),
            Operand::Displacement(offset, base) => write!(f, "{offset}(r{base})"),
        }
    }
}

/// A disassembled instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disassembly {
    pub address: u32,
    pub raw: u32,
    /// Full mnemonic including `o`, `.`, `l` and `a` suffixes; `None` when
    /// the encoding is undefined.
    pub mnemonic: Option<String>,
    pub operands: SmallVec<[Operand; 4]>,
}

impl Disassembly {
    pub fn is_defined(&self) -> bool {
        self.mnemonic.is_some()
    }
}

impl fmt::Display for Disassembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mnemonic = match &self.mnemonic {
            Some(mnemonic) => mnemonic,
            None => return write!(f, ".word 0x{:08X}", self.raw),
        };
        if self.operands.is_empty() {
            return f.write_str(mnemonic);
        }
        write!(f, "{mnemonic:<10}")?;
        for (i, operand) in self.operands.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{operand}")?;
        }
        Ok(())
    }
}

/// Disassemble `instr`, located at `address` (used for relative branches).
pub fn disassemble(instr: &Instruction, address: u32) -> Disassembly {
    let entry = match OpcodeTable::get().lookup(instr) {
        Some(entry) => entry,
        None => {
            return Disassembly {
                address,
                raw: instr.raw,
                mnemonic: None,
                operands: SmallVec::new(),
            }
        }
    };

    let mut mnemonic = String::from(entry.mnemonic);
    match entry.form {
        Form::BranchI | Form::BranchB => {
            if instr.lk() {
                mnemonic.push('l');
            }
            if instr.aa() {
                mnemonic.push('a');
            }
        }
        Form::BranchReg => {
            if instr.lk() {
                mnemonic.push('l');
            }
        }
        _ => {
            if entry.overflow && instr.oe() {
                mnemonic.push('o');
            }
            if entry.record && instr.rc() {
                mnemonic.push('.');
            }
        }
    }

    Disassembly {
        address,
        raw: instr.raw,
        mnemonic: Some(mnemonic),
        operands: operands(entry.form, instr, address),
    }
}

/// Disassemble a raw word.
#[inline]
pub fn disassemble_word(raw: u32, address: u32) -> Disassembly {
    disassemble(&Instruction::decode(raw), address)
}

fn operands(form: Form, instr: &Instruction, address: u32) -> SmallVec<[Operand; 4]> {
    use Operand::*;

    let r = |n: u8| Register(n);
    let fp = |n: u8| FpRegister(n);
    let simm = Immediate(i32::from(instr.simm));
    let uimm = UnsignedImmediate(u32::from(instr.uimm));
    let target = |displacement: i32| {
        if instr.aa() {
            Address(displacement as u32)
        } else {
            Address(address.wrapping_add(displacement as u32))
        }
    };

    match form {
        Form::None => SmallVec::new(),
        Form::DArith => smallvec![r(instr.rd), r(instr.ra), simm],
        Form::DLogical => smallvec![r(instr.ra), r(instr.rd), uimm],
        Form::DCompare => smallvec![Condition(instr.crf_d()), r(instr.ra), simm],
        Form::DCompareLogical => smallvec![Condition(instr.crf_d()), r(instr.ra), uimm],
        Form::DTrap => smallvec![Immediate(i32::from(instr.to())), r(instr.ra), simm],
        Form::DLoadStore => smallvec![r(instr.rd), Displacement(i32::from(instr.simm), instr.ra)],
        Form::DFloatLoadStore => smallvec![fp(instr.rd), Displacement(i32::from(instr.simm), instr.ra)],
        Form::PsqLoadStore => smallvec![
            fp(instr.rd),
            Displacement(instr.ps_offset(), instr.ra),
            Immediate(i32::from(instr.ps_w())),
            Immediate(i32::from(instr.ps_i())),
        ],
        Form::PsqIndexed => smallvec![
            fp(instr.rd),
            r(instr.ra),
            r(instr.rb),
            Immediate(i32::from(instr.ps_wx())),
            Immediate(i32::from(instr.ps_ix())),
        ],
        Form::BranchI => smallvec![target(instr.li())],
        Form::BranchB => smallvec![
            Immediate(i32::from(instr.bo())),
            Immediate(i32::from(instr.bi())),
            target(instr.bd()),
        ],
        Form::BranchReg => smallvec![Immediate(i32::from(instr.bo())), Immediate(i32::from(instr.bi()))],
        Form::CrLogical => smallvec![
            Immediate(i32::from(instr.rd)),
            Immediate(i32::from(instr.ra)),
            Immediate(i32::from(instr.rb)),
        ],
        Form::CrMove => smallvec![Condition(instr.crf_d()), Condition(instr.crf_s())],
        Form::XArith => smallvec![r(instr.rd), r(instr.ra), r(instr.rb)],
        Form::XUnary => smallvec![r(instr.rd), r(instr.ra)],
        Form::XLogical => smallvec![r(instr.ra), r(instr.rd), r(instr.rb)],
        Form::XLogicalUnary => smallvec![r(instr.ra), r(instr.rd)],
        Form::XShiftImm => smallvec![r(instr.ra), r(instr.rd), Immediate(i32::from(instr.sh()))],
        Form::XCompare => smallvec![Condition(instr.crf_d()), r(instr.ra), r(instr.rb)],
        Form::XTrap => smallvec![Immediate(i32::from(instr.to())), r(instr.ra), r(instr.rb)],
        Form::XLoadStore => smallvec![r(instr.rd), r(instr.ra), r(instr.rb)],
        Form::XFloatLoadStore => smallvec![fp(instr.rd), r(instr.ra), r(instr.rb)],
        Form::XCache => smallvec![r(instr.ra), r(instr.rb)],
        Form::XStringImm => smallvec![r(instr.rd), r(instr.ra), Immediate(i32::from(instr.nb()))],
        Form::Rotate | Form::RotateReg => {
            let shift = if form == Form::Rotate {
                Immediate(i32::from(instr.sh()))
            } else {
                r(instr.rb)
            };
            smallvec![
                r(instr.ra),
                r(instr.rd),
                shift,
                Immediate(i32::from(instr.mb())),
                Immediate(i32::from(instr.me())),
            ]
        }
        Form::MoveFromSpr => smallvec![r(instr.rd), SpecialRegister(instr.spr())],
        Form::MoveToSpr => smallvec![SpecialRegister(instr.spr()), r(instr.rd)],
        Form::MoveFromReg => smallvec![r(instr.rd)],
        Form::MoveToReg => smallvec![r(instr.rd)],
        Form::MoveToCrf => smallvec![UnsignedImmediate(u32::from(instr.crm())), r(instr.rd)],
        Form::CrField => smallvec![Condition(instr.crf_d())],
        Form::MoveFromSr => smallvec![r(instr.rd), SegmentRegister(instr.sr())],
        Form::MoveToSr => smallvec![SegmentRegister(instr.sr()), r(instr.rd)],
        Form::MoveFromSrIndirect => smallvec![r(instr.rd), r(instr.rb)],
        Form::MoveToSrIndirect => smallvec![r(instr.rd), r(instr.rb)],
        Form::MoveFromTb => smallvec![r(instr.rd), SpecialRegister(instr.spr())],
        Form::TlbInvalidate => smallvec![r(instr.rb)],
        Form::FloatA => smallvec![fp(instr.rd), fp(instr.ra), fp(instr.rb)],
        Form::FloatMul => smallvec![fp(instr.rd), fp(instr.ra), fp(instr.rc_field())],
        Form::FloatFused => smallvec![fp(instr.rd), fp(instr.ra), fp(instr.rc_field()), fp(instr.rb)],
        Form::FloatUnary => smallvec![fp(instr.rd), fp(instr.rb)],
        Form::FloatCompare => smallvec![Condition(instr.crf_d()), fp(instr.ra), fp(instr.rb)],
        Form::FloatMoveFromFpscr => smallvec![fp(instr.rd)],
        Form::FloatMoveToFpscr => smallvec![UnsignedImmediate(u32::from(instr.fm())), fp(instr.rb)],
        Form::FloatFpscrImm => smallvec![Condition(instr.crf_d()), Immediate(i32::from(instr.fpscr_imm()))],
        Form::FloatFpscrBit => smallvec![Immediate(i32::from(instr.rd))],
    }
}
