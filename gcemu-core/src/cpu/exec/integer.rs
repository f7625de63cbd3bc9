//! Fixed-point arithmetic, logical, shift, rotate, compare and trap
//! instructions.
//!
//! # Carry and overflow
//! Every add/subtract variant is expressed as `a + b + carry_in` over 32 bits
//! (subtraction as `!rA + rB + 1`), so a single helper produces the result,
//! the carry out of bit 0 and the signed-overflow predicate
//! `((a ^ r) & (b ^ r)) >> 31`.
//!
//! # Record forms
//! CR0 is derived from the signed 32-bit result plus XER[SO] *after* any
//! OE update, so an overflowing `addo.` reports SO in CR0.

use super::{Exception, Flow, Outcome, TrapReason};
use crate::cpu::bus::MemoryBus;
use crate::cpu::decoder::{rotate_mask, Instruction};
use crate::cpu::registers::{RegisterFile, CR_EQ, CR_GT, CR_LT, CR_SO};

/// `a + b + carry_in`: result, carry out and signed overflow.
#[inline]
pub(crate) fn add_with_carry(a: u32, b: u32, carry_in: bool) -> (u32, bool, bool) {
    let wide = u64::from(a) + u64::from(b) + u64::from(carry_in);
    let result = wide as u32;
    let carry = wide > u64::from(u32::MAX);
    let overflow = ((a ^ result) & (b ^ result)) >> 31 != 0;
    (result, carry, overflow)
}

/// Set CR0 from a fixed-point result.
#[inline]
pub(crate) fn record_cr0(regs: &mut RegisterFile, value: u32) {
    let field = compare_field(value as i32, 0, regs.xer_so());
    regs.set_cr_field(0, field);
}

/// Commit an XO-form result: rD, then OV/SO if OE, then CR0 if Rc.
#[inline]
fn commit_xo(regs: &mut RegisterFile, instr: &Instruction, result: u32, overflow: bool) -> Outcome {
    regs.set_gpr(instr.rd, result);
    if instr.oe() {
        regs.set_xer_ov(overflow);
    }
    if instr.rc() {
        record_cr0(regs, result);
    }
    Ok(Flow::Continue)
}

/// Commit a carrying XO-form result.
#[inline]
fn commit_carrying(
    regs: &mut RegisterFile,
    instr: &Instruction,
    (result, carry, overflow): (u32, bool, bool),
) -> Outcome {
    regs.set_xer_ca(carry);
    commit_xo(regs, instr, result, overflow)
}

/// Commit a logical/shift result to rA, recording CR0 if Rc.
#[inline]
fn commit_logical(regs: &mut RegisterFile, instr: &Instruction, result: u32) -> Outcome {
    regs.set_gpr(instr.ra, result);
    if instr.rc() {
        record_cr0(regs, result);
    }
    Ok(Flow::Continue)
}

// ---------------------------------------------------------------------------
// D-form arithmetic
// ---------------------------------------------------------------------------

pub(crate) fn addi(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let value = regs.gpr_or_zero(instr.ra).wrapping_add(instr.simm as i32 as u32);
    regs.set_gpr(instr.rd, value);
    Ok(Flow::Continue)
}

pub(crate) fn addis(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let value = regs.gpr_or_zero(instr.ra).wrapping_add(u32::from(instr.uimm) << 16);
    regs.set_gpr(instr.rd, value);
    Ok(Flow::Continue)
}

pub(crate) fn addic(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let (result, carry, _) = add_with_carry(regs.gpr(instr.ra), instr.simm as i32 as u32, false);
    regs.set_gpr(instr.rd, result);
    regs.set_xer_ca(carry);
    Ok(Flow::Continue)
}

pub(crate) fn addic_record(regs: &mut RegisterFile, instr: &Instruction, bus: &mut dyn MemoryBus) -> Outcome {
    addic(regs, instr, bus)?;
    let result = regs.gpr(instr.rd);
    record_cr0(regs, result);
    Ok(Flow::Continue)
}

pub(crate) fn subfic(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let (result, carry, _) = add_with_carry(!regs.gpr(instr.ra), instr.simm as i32 as u32, true);
    regs.set_gpr(instr.rd, result);
    regs.set_xer_ca(carry);
    Ok(Flow::Continue)
}

pub(crate) fn mulli(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let value = (regs.gpr(instr.ra) as i32).wrapping_mul(i32::from(instr.simm));
    regs.set_gpr(instr.rd, value as u32);
    Ok(Flow::Continue)
}

// ---------------------------------------------------------------------------
// XO-form arithmetic
// ---------------------------------------------------------------------------

pub(crate) fn add(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let (result, _, overflow) = add_with_carry(regs.gpr(instr.ra), regs.gpr(instr.rb), false);
    commit_xo(regs, instr, result, overflow)
}

pub(crate) fn addc(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let sum = add_with_carry(regs.gpr(instr.ra), regs.gpr(instr.rb), false);
    commit_carrying(regs, instr, sum)
}

pub(crate) fn adde(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let sum = add_with_carry(regs.gpr(instr.ra), regs.gpr(instr.rb), regs.xer_ca());
    commit_carrying(regs, instr, sum)
}

pub(crate) fn addme(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let sum = add_with_carry(regs.gpr(instr.ra), u32::MAX, regs.xer_ca());
    commit_carrying(regs, instr, sum)
}

pub(crate) fn addze(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let sum = add_with_carry(regs.gpr(instr.ra), 0, regs.xer_ca());
    commit_carrying(regs, instr, sum)
}

pub(crate) fn subf(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let (result, _, overflow) = add_with_carry(!regs.gpr(instr.ra), regs.gpr(instr.rb), true);
    commit_xo(regs, instr, result, overflow)
}

pub(crate) fn subfc(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let diff = add_with_carry(!regs.gpr(instr.ra), regs.gpr(instr.rb), true);
    commit_carrying(regs, instr, diff)
}

pub(crate) fn subfe(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let diff = add_with_carry(!regs.gpr(instr.ra), regs.gpr(instr.rb), regs.xer_ca());
    commit_carrying(regs, instr, diff)
}

pub(crate) fn subfme(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let diff = add_with_carry(!regs.gpr(instr.ra), u32::MAX, regs.xer_ca());
    commit_carrying(regs, instr, diff)
}

pub(crate) fn subfze(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let diff = add_with_carry(!regs.gpr(instr.ra), 0, regs.xer_ca());
    commit_carrying(regs, instr, diff)
}

pub(crate) fn neg(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let (result, _, overflow) = add_with_carry(!regs.gpr(instr.ra), 0, true);
    commit_xo(regs, instr, result, overflow)
}

pub(crate) fn mullw(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let product = i64::from(regs.gpr(instr.ra) as i32) * i64::from(regs.gpr(instr.rb) as i32);
    let overflow = product != i64::from(product as i32);
    commit_xo(regs, instr, product as u32, overflow)
}

pub(crate) fn mulhw(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let product = i64::from(regs.gpr(instr.ra) as i32) * i64::from(regs.gpr(instr.rb) as i32);
    let result = (product >> 32) as u32;
    regs.set_gpr(instr.rd, result);
    if instr.rc() {
        record_cr0(regs, result);
    }
    Ok(Flow::Continue)
}

pub(crate) fn mulhwu(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let product = u64::from(regs.gpr(instr.ra)) * u64::from(regs.gpr(instr.rb));
    let result = (product >> 32) as u32;
    regs.set_gpr(instr.rd, result);
    if instr.rc() {
        record_cr0(regs, result);
    }
    Ok(Flow::Continue)
}

pub(crate) fn divw(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let dividend = regs.gpr(instr.ra) as i32;
    let divisor = regs.gpr(instr.rb) as i32;
    let (result, overflow) = match dividend.checked_div(divisor) {
        Some(quotient) => (quotient as u32, false),
        // Divide by zero or i32::MIN / -1: the 750CL leaves all ones for a
        // negative dividend and zero otherwise.
        None if dividend < 0 => (u32::MAX, true),
        None => (0, true),
    };
    commit_xo(regs, instr, result, overflow)
}

pub(crate) fn divwu(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let dividend = regs.gpr(instr.ra);
    let divisor = regs.gpr(instr.rb);
    let (result, overflow) = match dividend.checked_div(divisor) {
        Some(quotient) => (quotient, false),
        None => (0, true),
    };
    commit_xo(regs, instr, result, overflow)
}

// ---------------------------------------------------------------------------
// Logical
// ---------------------------------------------------------------------------

pub(crate) fn andi_record(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let result = regs.gpr(instr.rd) & u32::from(instr.uimm);
    regs.set_gpr(instr.ra, result);
    record_cr0(regs, result);
    Ok(Flow::Continue)
}

pub(crate) fn andis_record(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let result = regs.gpr(instr.rd) & (u32::from(instr.uimm) << 16);
    regs.set_gpr(instr.ra, result);
    record_cr0(regs, result);
    Ok(Flow::Continue)
}

pub(crate) fn ori(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let result = regs.gpr(instr.rd) | u32::from(instr.uimm);
    regs.set_gpr(instr.ra, result);
    Ok(Flow::Continue)
}

pub(crate) fn oris(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let result = regs.gpr(instr.rd) | (u32::from(instr.uimm) << 16);
    regs.set_gpr(instr.ra, result);
    Ok(Flow::Continue)
}

pub(crate) fn xori(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let result = regs.gpr(instr.rd) ^ u32::from(instr.uimm);
    regs.set_gpr(instr.ra, result);
    Ok(Flow::Continue)
}

pub(crate) fn xoris(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let result = regs.gpr(instr.rd) ^ (u32::from(instr.uimm) << 16);
    regs.set_gpr(instr.ra, result);
    Ok(Flow::Continue)
}

pub(crate) fn and(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let result = regs.gpr(instr.rd) & regs.gpr(instr.rb);
    commit_logical(regs, instr, result)
}

pub(crate) fn andc(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let result = regs.gpr(instr.rd) & !regs.gpr(instr.rb);
    commit_logical(regs, instr, result)
}

pub(crate) fn or(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let result = regs.gpr(instr.rd) | regs.gpr(instr.rb);
    commit_logical(regs, instr, result)
}

pub(crate) fn orc(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let result = regs.gpr(instr.rd) | !regs.gpr(instr.rb);
    commit_logical(regs, instr, result)
}

pub(crate) fn xor(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let result = regs.gpr(instr.rd) ^ regs.gpr(instr.rb);
    commit_logical(regs, instr, result)
}

pub(crate) fn nor(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let result = !(regs.gpr(instr.rd) | regs.gpr(instr.rb));
    commit_logical(regs, instr, result)
}

pub(crate) fn nand(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let result = !(regs.gpr(instr.rd) & regs.gpr(instr.rb));
    commit_logical(regs, instr, result)
}

pub(crate) fn eqv(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let result = !(regs.gpr(instr.rd) ^ regs.gpr(instr.rb));
    commit_logical(regs, instr, result)
}

pub(crate) fn extsb(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let result = regs.gpr(instr.rd) as u8 as i8 as i32 as u32;
    commit_logical(regs, instr, result)
}

pub(crate) fn extsh(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let result = regs.gpr(instr.rd) as u16 as i16 as i32 as u32;
    commit_logical(regs, instr, result)
}

pub(crate) fn cntlzw(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let result = regs.gpr(instr.rd).leading_zeros();
    commit_logical(regs, instr, result)
}

// ---------------------------------------------------------------------------
// Shifts and rotates
// ---------------------------------------------------------------------------

pub(crate) fn slw(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let amount = regs.gpr(instr.rb) & 0x3F;
    let result = if amount >= 32 { 0 } else { regs.gpr(instr.rd) << amount };
    commit_logical(regs, instr, result)
}

pub(crate) fn srw(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let amount = regs.gpr(instr.rb) & 0x3F;
    let result = if amount >= 32 { 0 } else { regs.gpr(instr.rd) >> amount };
    commit_logical(regs, instr, result)
}

/// Arithmetic right shift; CA is set when a negative value lost one bits.
#[inline]
fn shift_right_algebraic(value: u32, amount: u32) -> (u32, bool) {
    let negative = (value as i32) < 0;
    if amount >= 32 {
        return (if negative { u32::MAX } else { 0 }, negative);
    }
    let result = ((value as i32) >> amount) as u32;
    let lost = amount != 0 && value & ((1u32 << amount) - 1) != 0;
    (result, negative && lost)
}

pub(crate) fn sraw(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let (result, carry) = shift_right_algebraic(regs.gpr(instr.rd), regs.gpr(instr.rb) & 0x3F);
    regs.set_xer_ca(carry);
    commit_logical(regs, instr, result)
}

pub(crate) fn srawi(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let (result, carry) = shift_right_algebraic(regs.gpr(instr.rd), u32::from(instr.sh()));
    regs.set_xer_ca(carry);
    commit_logical(regs, instr, result)
}

pub(crate) fn rlwinm(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let rotated = regs.gpr(instr.rd).rotate_left(u32::from(instr.sh()));
    let result = rotated & rotate_mask(instr.mb(), instr.me());
    commit_logical(regs, instr, result)
}

pub(crate) fn rlwimi(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let rotated = regs.gpr(instr.rd).rotate_left(u32::from(instr.sh()));
    let mask = rotate_mask(instr.mb(), instr.me());
    let result = (rotated & mask) | (regs.gpr(instr.ra) & !mask);
    commit_logical(regs, instr, result)
}

pub(crate) fn rlwnm(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let rotated = regs.gpr(instr.rd).rotate_left(regs.gpr(instr.rb) & 31);
    let result = rotated & rotate_mask(instr.mb(), instr.me());
    commit_logical(regs, instr, result)
}

// ---------------------------------------------------------------------------
// Compares
// ---------------------------------------------------------------------------

#[inline]
fn compare_field<T: Ord>(a: T, b: T, so: bool) -> u8 {
    let ordering = match a.cmp(&b) {
        std::cmp::Ordering::Less => CR_LT,
        std::cmp::Ordering::Greater => CR_GT,
        std::cmp::Ordering::Equal => CR_EQ,
    };
    if so {
        ordering | CR_SO
    } else {
        ordering
    }
}

pub(crate) fn cmp(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let field = compare_field(regs.gpr(instr.ra) as i32, regs.gpr(instr.rb) as i32, regs.xer_so());
    regs.set_cr_field(instr.crf_d(), field);
    Ok(Flow::Continue)
}

pub(crate) fn cmpl(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let field = compare_field(regs.gpr(instr.ra), regs.gpr(instr.rb), regs.xer_so());
    regs.set_cr_field(instr.crf_d(), field);
    Ok(Flow::Continue)
}

pub(crate) fn cmpi(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let field = compare_field(regs.gpr(instr.ra) as i32, i32::from(instr.simm), regs.xer_so());
    regs.set_cr_field(instr.crf_d(), field);
    Ok(Flow::Continue)
}

pub(crate) fn cmpli(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let field = compare_field(regs.gpr(instr.ra), u32::from(instr.uimm), regs.xer_so());
    regs.set_cr_field(instr.crf_d(), field);
    Ok(Flow::Continue)
}

// ---------------------------------------------------------------------------
// Traps
// ---------------------------------------------------------------------------

/// TO bits, from most to least significant: <, >, =, <u, >u.
#[inline]
fn trap_condition(to: u8, a: u32, b: u32) -> bool {
    let (sa, sb) = (a as i32, b as i32);
    (to & 0x10 != 0 && sa < sb)
        || (to & 0x08 != 0 && sa > sb)
        || (to & 0x04 != 0 && a == b)
        || (to & 0x02 != 0 && a < b)
        || (to & 0x01 != 0 && a > b)
}

pub(crate) fn tw(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    if trap_condition(instr.to(), regs.gpr(instr.ra), regs.gpr(instr.rb)) {
        return Err(Exception::Trap(TrapReason::TrapInstruction));
    }
    Ok(Flow::Continue)
}

pub(crate) fn twi(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    if trap_condition(instr.to(), regs.gpr(instr.ra), instr.simm as i32 as u32) {
        return Err(Exception::Trap(TrapReason::TrapInstruction));
    }
    Ok(Flow::Continue)
}
