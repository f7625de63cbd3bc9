//! Gekko paired-single extension.
//!
//! Each FPR holds two single-precision slots (`ps0` in `fpr`, `ps1` in
//! `ps1`). Arithmetic runs the shared floating-point pipeline once per slot
//! with single-precision rounding; FPRF reflects the ps0 result.
//!
//! # Quantized loads and stores
//! `psq_l*`/`psq_st*` convert between memory and the two slots under the
//! control of a graphics quantization register (GQR0-7, selected by the I
//! field):
//!
//! | bits  | field |
//! |-------|-------|
//! | 0-2   | store type |
//! | 8-13  | store scale (6-bit signed) |
//! | 16-18 | load type |
//! | 24-29 | load scale (6-bit signed) |
//!
//! Types: 0 float, 4 u8, 5 u16, 6 s8, 7 s16. The reserved types 1-3 behave as
//! float. Loads multiply integers by `2^-scale`; stores multiply by `2^scale`
//! then clamp and truncate. With W set only ps0 is transferred and a load
//! sets ps1 to 1.0.

use super::float::{compare_into, convert_to_double, convert_to_single, Arith, FpContext};
use super::{Exception, Flow, Outcome};
use crate::cpu::bus::{BusExt, MemoryBus};
use crate::cpu::decoder::Instruction;
use crate::cpu::registers::RegisterFile;

/// Memory representation selected by a GQR type field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantizeType {
    Float,
    U8,
    U16,
    S8,
    S16,
}

impl QuantizeType {
    pub fn from_bits(bits: u32) -> Self {
        match bits & 7 {
            4 => QuantizeType::U8,
            5 => QuantizeType::U16,
            6 => QuantizeType::S8,
            7 => QuantizeType::S16,
            _ => QuantizeType::Float,
        }
    }

    /// Bytes per element in memory.
    pub fn size(self) -> u32 {
        match self {
            QuantizeType::Float => 4,
            QuantizeType::U16 | QuantizeType::S16 => 2,
            QuantizeType::U8 | QuantizeType::S8 => 1,
        }
    }

    fn range(self) -> (f64, f64) {
        match self {
            QuantizeType::Float => (f64::NEG_INFINITY, f64::INFINITY),
            QuantizeType::U8 => (0.0, 255.0),
            QuantizeType::U16 => (0.0, 65535.0),
            QuantizeType::S8 => (-128.0, 127.0),
            QuantizeType::S16 => (-32768.0, 32767.0),
        }
    }
}

/// Sign-extend a 6-bit GQR scale field.
#[inline]
fn scale(bits: u32) -> i32 {
    i32::from(((bits & 0x3F) << 2) as u8 as i8 >> 2)
}

/// Load-side type and scale of a GQR value.
#[inline]
pub fn load_format(gqr: u32) -> (QuantizeType, i32) {
    (QuantizeType::from_bits(gqr >> 16), scale(gqr >> 24))
}

/// Store-side type and scale of a GQR value.
#[inline]
pub fn store_format(gqr: u32) -> (QuantizeType, i32) {
    (QuantizeType::from_bits(gqr), scale(gqr >> 8))
}

/// Read one element and convert it to a slot value.
fn dequantize(bus: &mut dyn MemoryBus, address: u32, kind: QuantizeType, scale: i32) -> Result<f64, Exception> {
    let raw = match kind {
        QuantizeType::Float => return Ok(f64::from_bits(convert_to_double(bus.read_u32(address)?))),
        QuantizeType::U8 => f64::from(bus.read_u8(address)?),
        QuantizeType::U16 => f64::from(bus.read_u16(address)?),
        QuantizeType::S8 => f64::from(bus.read_u8(address)? as i8),
        QuantizeType::S16 => f64::from(bus.read_u16(address)? as i16),
    };
    Ok(raw * 2f64.powi(-scale))
}

/// Convert a slot value to its memory form.
pub fn quantize(value: f64, kind: QuantizeType, scale: i32) -> u32 {
    if kind == QuantizeType::Float {
        return convert_to_single(value.to_bits());
    }
    let (min, max) = kind.range();
    let scaled = (value * 2f64.powi(scale)).clamp(min, max);
    // `as` truncates toward zero and maps NaN to zero
    let integer = scaled as i32;
    match kind {
        QuantizeType::U8 | QuantizeType::S8 => integer as u32 & 0xFF,
        _ => integer as u32 & 0xFFFF,
    }
}

fn write_element(bus: &mut dyn MemoryBus, address: u32, kind: QuantizeType, bits: u32) -> Result<(), Exception> {
    match kind.size() {
        4 => bus.write_u32(address, bits)?,
        2 => bus.write_u16(address, bits as u16)?,
        _ => bus.write_u8(address, bits as u8)?,
    }
    Ok(())
}

/// Effective address, W and I of a quantized access.
#[inline]
fn quantized_operands<const INDEXED: bool>(regs: &RegisterFile, instr: &Instruction) -> (u32, bool, u8) {
    let base = regs.gpr_or_zero(instr.ra);
    if INDEXED {
        (base.wrapping_add(regs.gpr(instr.rb)), instr.ps_wx(), instr.ps_ix())
    } else {
        (base.wrapping_add(instr.ps_offset() as u32), instr.ps_w(), instr.ps_i())
    }
}

/// `psq_l`, `psq_lu`, `psq_lx`, `psq_lux`.
pub(crate) fn psq_load<const INDEXED: bool, const UPDATE: bool>(
    regs: &mut RegisterFile,
    instr: &Instruction,
    bus: &mut dyn MemoryBus,
) -> Outcome {
    if UPDATE && instr.ra == 0 {
        return Err(Exception::Illegal);
    }
    let (ea, single, gqr) = quantized_operands::<INDEXED>(regs, instr);
    let (kind, scale) = load_format(regs.gqr(gqr));

    let ps0 = dequantize(bus, ea, kind, scale)?;
    let ps1 = if single {
        1.0
    } else {
        dequantize(bus, ea.wrapping_add(kind.size()), kind, scale)?
    };

    regs.set_ps(instr.rd, ps0, ps1);
    if UPDATE {
        regs.set_gpr(instr.ra, ea);
    }
    Ok(Flow::Continue)
}

/// `psq_st`, `psq_stu`, `psq_stx`, `psq_stux`.
pub(crate) fn psq_store<const INDEXED: bool, const UPDATE: bool>(
    regs: &mut RegisterFile,
    instr: &Instruction,
    bus: &mut dyn MemoryBus,
) -> Outcome {
    if UPDATE && instr.ra == 0 {
        return Err(Exception::Illegal);
    }
    let (ea, single, gqr) = quantized_operands::<INDEXED>(regs, instr);
    let (kind, scale) = store_format(regs.gqr(gqr));
    let (ps0, ps1) = regs.ps(instr.rd);

    write_element(bus, ea, kind, quantize(ps0, kind, scale))?;
    if !single {
        write_element(bus, ea.wrapping_add(kind.size()), kind, quantize(ps1, kind, scale))?;
    }

    if UPDATE {
        regs.set_gpr(instr.ra, ea);
    }
    Ok(Flow::Continue)
}

// ---------------------------------------------------------------------------
// Arithmetic
// ---------------------------------------------------------------------------

/// `(frA, frB, frC)` for one slot.
type Slot = (f64, f64, f64);

/// Both slots of frA, frB and frC.
#[inline]
fn operands(regs: &RegisterFile, instr: &Instruction) -> ((f64, f64), (f64, f64), (f64, f64)) {
    (regs.ps(instr.ra), regs.ps(instr.rb), regs.ps(instr.rc_field()))
}

/// Run `op` on each slot and commit the pair.
fn both_slots(regs: &mut RegisterFile, instr: &Instruction, op: Arith, slot0: Slot, slot1: Slot) -> Outcome {
    let mut ctx = FpContext::new(regs.fpscr);
    let ps0 = ctx.compute(op, slot0.0, slot0.1, slot0.2, true);
    let ps1 = ctx.compute(op, slot1.0, slot1.1, slot1.2, true);
    ctx.check_trap(regs.msr)?;

    if !ctx.suppressed() {
        ctx.set_fprf(ps0, true);
        regs.set_ps(instr.rd, ps0, ps1);
    }
    ctx.commit(regs, instr.rc());
    Ok(Flow::Continue)
}

/// Slot-wise operation: slot n uses slot n of every operand.
fn element_wise(regs: &mut RegisterFile, instr: &Instruction, op: Arith) -> Outcome {
    let (a, b, c) = operands(regs, instr);
    both_slots(regs, instr, op, (a.0, b.0, c.0), (a.1, b.1, c.1))
}

pub(crate) fn ps_add(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    element_wise(regs, instr, Arith::Add)
}

pub(crate) fn ps_sub(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    element_wise(regs, instr, Arith::Sub)
}

pub(crate) fn ps_mul(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    element_wise(regs, instr, Arith::Mul)
}

pub(crate) fn ps_div(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    element_wise(regs, instr, Arith::Div)
}

pub(crate) fn ps_madd(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    element_wise(regs, instr, Arith::MulAdd)
}

pub(crate) fn ps_msub(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    element_wise(regs, instr, Arith::MulSub)
}

pub(crate) fn ps_nmadd(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    element_wise(regs, instr, Arith::NegMulAdd)
}

pub(crate) fn ps_nmsub(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    element_wise(regs, instr, Arith::NegMulSub)
}

pub(crate) fn ps_res(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    element_wise(regs, instr, Arith::Reciprocal)
}

pub(crate) fn ps_rsqrte(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    element_wise(regs, instr, Arith::ReciprocalSqrt)
}

pub(crate) fn ps_muls0(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let (a, b, c) = operands(regs, instr);
    both_slots(regs, instr, Arith::Mul, (a.0, b.0, c.0), (a.1, b.1, c.0))
}

pub(crate) fn ps_muls1(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let (a, b, c) = operands(regs, instr);
    both_slots(regs, instr, Arith::Mul, (a.0, b.0, c.1), (a.1, b.1, c.1))
}

pub(crate) fn ps_madds0(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let (a, b, c) = operands(regs, instr);
    both_slots(regs, instr, Arith::MulAdd, (a.0, b.0, c.0), (a.1, b.1, c.0))
}

pub(crate) fn ps_madds1(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let (a, b, c) = operands(regs, instr);
    both_slots(regs, instr, Arith::MulAdd, (a.0, b.0, c.1), (a.1, b.1, c.1))
}

/// `ps_sum0`/`ps_sum1`: one slot receives `a0 + b1`, the other copies frC.
fn sum_halves(regs: &mut RegisterFile, instr: &Instruction, into_ps0: bool) -> Outcome {
    let (a, b, c) = operands(regs, instr);
    let mut ctx = FpContext::new(regs.fpscr);
    let sum = ctx.compute(Arith::Add, a.0, b.1, 0.0, true);
    ctx.check_trap(regs.msr)?;

    if !ctx.suppressed() {
        ctx.set_fprf(sum, true);
        if into_ps0 {
            regs.set_ps(instr.rd, sum, c.1);
        } else {
            regs.set_ps(instr.rd, c.0, sum);
        }
    }
    ctx.commit(regs, instr.rc());
    Ok(Flow::Continue)
}

pub(crate) fn ps_sum0(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    sum_halves(regs, instr, true)
}

pub(crate) fn ps_sum1(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    sum_halves(regs, instr, false)
}

pub(crate) fn ps_sel(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let (a, b, c) = operands(regs, instr);
    let pick = |a: f64, b: f64, c: f64| if a >= 0.0 { c } else { b };
    regs.set_ps(instr.rd, pick(a.0, b.0, c.0), pick(a.1, b.1, c.1));
    record_cr1(regs, instr);
    Ok(Flow::Continue)
}

// ---------------------------------------------------------------------------
// Moves and merges
// ---------------------------------------------------------------------------

#[inline]
fn record_cr1(regs: &mut RegisterFile, instr: &Instruction) {
    if instr.rc() {
        regs.set_cr_field(1, (regs.fpscr >> 28) as u8);
    }
}

const SIGN: u64 = 0x8000_0000_0000_0000;

fn move_slots(regs: &mut RegisterFile, instr: &Instruction, op: impl Fn(u64) -> u64) -> Outcome {
    let (b0, b1) = regs.ps(instr.rb);
    let apply = |value: f64| f64::from_bits(op(value.to_bits()));
    regs.set_ps(instr.rd, apply(b0), apply(b1));
    record_cr1(regs, instr);
    Ok(Flow::Continue)
}

pub(crate) fn ps_mr(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    move_slots(regs, instr, |bits| bits)
}

pub(crate) fn ps_neg(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    move_slots(regs, instr, |bits| bits ^ SIGN)
}

pub(crate) fn ps_abs(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    move_slots(regs, instr, |bits| bits & !SIGN)
}

pub(crate) fn ps_nabs(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    move_slots(regs, instr, |bits| bits | SIGN)
}

/// frD = (frA slot `from_a`, frB slot `from_b`).
fn merge(regs: &mut RegisterFile, instr: &Instruction, from_a: usize, from_b: usize) -> Outcome {
    let (a0, a1) = regs.ps(instr.ra);
    let (b0, b1) = regs.ps(instr.rb);
    let ps0 = [a0, a1][from_a];
    let ps1 = [b0, b1][from_b];
    regs.set_ps(instr.rd, ps0, ps1);
    record_cr1(regs, instr);
    Ok(Flow::Continue)
}

pub(crate) fn ps_merge00(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    merge(regs, instr, 0, 0)
}

pub(crate) fn ps_merge01(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    merge(regs, instr, 0, 1)
}

pub(crate) fn ps_merge10(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    merge(regs, instr, 1, 0)
}

pub(crate) fn ps_merge11(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    merge(regs, instr, 1, 1)
}

// ---------------------------------------------------------------------------
// Compares
// ---------------------------------------------------------------------------

pub(crate) fn ps_cmpu0(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let (a, b) = (regs.ps(instr.ra).0, regs.ps(instr.rb).0);
    compare_into(regs, instr.crf_d(), a, b, false)
}

pub(crate) fn ps_cmpo0(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let (a, b) = (regs.ps(instr.ra).0, regs.ps(instr.rb).0);
    compare_into(regs, instr.crf_d(), a, b, true)
}

pub(crate) fn ps_cmpu1(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let (a, b) = (regs.ps(instr.ra).1, regs.ps(instr.rb).1);
    compare_into(regs, instr.crf_d(), a, b, false)
}

pub(crate) fn ps_cmpo1(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let (a, b) = (regs.ps(instr.ra).1, regs.ps(instr.rb).1);
    compare_into(regs, instr.crf_d(), a, b, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gqr_fields() {
        // load: s16, scale -8; store: u8, scale 3
        let gqr = (0x38 << 24) | (7 << 16) | (3 << 8) | 4;
        assert_eq!(load_format(gqr), (QuantizeType::S16, -8));
        assert_eq!(store_format(gqr), (QuantizeType::U8, 3));
        // reserved types behave as float
        assert_eq!(QuantizeType::from_bits(2), QuantizeType::Float);
    }

    #[test]
    fn test_quantize_clamps_and_truncates() {
        assert_eq!(quantize(300.0, QuantizeType::U8, 0), 255);
        assert_eq!(quantize(-5.0, QuantizeType::U8, 0), 0);
        assert_eq!(quantize(-1.75, QuantizeType::S8, 0), 0xFF);
        assert_eq!(quantize(1.5, QuantizeType::S16, 4), 24);
        assert_eq!(quantize(-40000.0, QuantizeType::S16, 0), 0x8000);
        assert_eq!(quantize(1.0, QuantizeType::Float, 0), 0x3F80_0000);
        assert_eq!(quantize(f64::NAN, QuantizeType::U16, 0), 0);
    }
}
