//! Branches, condition-register logic and the system-linkage instructions.
//!
//! # BO field
//! | bit (mask) | meaning |
//! |------------|---------|
//! | 0x10 | ignore the CR condition |
//! | 0x08 | condition value to branch on |
//! | 0x04 | do not decrement CTR |
//! | 0x02 | branch when the decremented CTR is zero (otherwise non-zero) |
//! | 0x01 | static prediction hint, ignored |
//!
//! Link forms write `LR = PC + 4` whether or not the branch is taken.

use super::{Exception, Flow, Outcome, TrapReason};
use crate::cpu::bus::MemoryBus;
use crate::cpu::decoder::Instruction;
use crate::cpu::registers::{spr, RegisterFile};

/// MSR bits restored from SRR1 by `rfi`.
const RFI_MSR_MASK: u32 = 0x87C0_FFFF;
/// MSR[POW] is always cleared on return.
const MSR_POW: u32 = 0x0004_0000;

/// Evaluate BO/BI against the current state.
///
/// Returns whether the branch is taken and the CTR value to commit.
#[inline]
fn evaluate(regs: &RegisterFile, bo: u8, bi: u8) -> (bool, u32) {
    let ctr = if bo & 0x04 == 0 {
        regs.ctr.wrapping_sub(1)
    } else {
        regs.ctr
    };
    let ctr_ok = bo & 0x04 != 0 || ((ctr != 0) ^ (bo & 0x02 != 0));
    let cond_ok = bo & 0x10 != 0 || regs.cr_bit(bi) == (bo & 0x08 != 0);
    (ctr_ok && cond_ok, ctr)
}

#[inline]
fn link(regs: &mut RegisterFile, instr: &Instruction) {
    if instr.lk() {
        regs.lr = regs.pc.wrapping_add(4);
    }
}

pub(crate) fn b(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let displacement = instr.li() as u32;
    let target = if instr.aa() {
        displacement
    } else {
        regs.pc.wrapping_add(displacement)
    };
    link(regs, instr);
    Ok(Flow::Branch(target))
}

pub(crate) fn bc(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let (taken, ctr) = evaluate(regs, instr.bo(), instr.bi());
    let displacement = instr.bd() as u32;
    let target = if instr.aa() {
        displacement
    } else {
        regs.pc.wrapping_add(displacement)
    };

    regs.ctr = ctr;
    link(regs, instr);
    Ok(if taken { Flow::Branch(target) } else { Flow::Continue })
}

pub(crate) fn bclr(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let (taken, ctr) = evaluate(regs, instr.bo(), instr.bi());
    // Target is the LR value before any link update.
    let target = regs.lr & !3;

    regs.ctr = ctr;
    link(regs, instr);
    Ok(if taken { Flow::Branch(target) } else { Flow::Continue })
}

pub(crate) fn bcctr(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    // Decrementing the register that supplies the target is an invalid form.
    if instr.bo() & 0x04 == 0 {
        return Err(Exception::Illegal);
    }
    let (taken, _) = evaluate(regs, instr.bo(), instr.bi());
    let target = regs.ctr & !3;

    link(regs, instr);
    Ok(if taken { Flow::Branch(target) } else { Flow::Continue })
}

// ---------------------------------------------------------------------------
// Condition register logic
// ---------------------------------------------------------------------------

/// crbD = op(crbA, crbB)
#[inline]
fn cr_logical(regs: &mut RegisterFile, instr: &Instruction, op: impl Fn(bool, bool) -> bool) -> Outcome {
    let value = op(regs.cr_bit(instr.ra), regs.cr_bit(instr.rb));
    regs.set_cr_bit(instr.rd, value);
    Ok(Flow::Continue)
}

pub(crate) fn crand(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    cr_logical(regs, instr, |a, b| a & b)
}

pub(crate) fn crandc(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    cr_logical(regs, instr, |a, b| a & !b)
}

pub(crate) fn creqv(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    cr_logical(regs, instr, |a, b| a == b)
}

pub(crate) fn crnand(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    cr_logical(regs, instr, |a, b| !(a & b))
}

pub(crate) fn crnor(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    cr_logical(regs, instr, |a, b| !(a | b))
}

pub(crate) fn cror(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    cr_logical(regs, instr, |a, b| a | b)
}

pub(crate) fn crorc(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    cr_logical(regs, instr, |a, b| a | !b)
}

pub(crate) fn crxor(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    cr_logical(regs, instr, |a, b| a ^ b)
}

pub(crate) fn mcrf(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let field = regs.cr_field(instr.crf_s());
    regs.set_cr_field(instr.crf_d(), field);
    Ok(Flow::Continue)
}

// ---------------------------------------------------------------------------
// System linkage
// ---------------------------------------------------------------------------

pub(crate) fn sc(_regs: &mut RegisterFile, _instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    Err(Exception::Trap(TrapReason::SystemCall))
}

pub(crate) fn rfi(regs: &mut RegisterFile, _instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let srr0 = regs.spr(spr::SRR0);
    let srr1 = regs.spr(spr::SRR1);
    regs.msr = ((regs.msr & !RFI_MSR_MASK) | (srr1 & RFI_MSR_MASK)) & !MSR_POW;
    Ok(Flow::Branch(srr0 & !3))
}
