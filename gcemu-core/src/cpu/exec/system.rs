//! Register moves (CR, XER, MSR, SPR, SR, time base) and the cache, TLB and
//! synchronisation instructions.
//!
//! The interpreter has no caches, TLB or pipeline, so everything in the
//! second group completes as a no-op except `dcbz`, which is architecturally
//! visible as a 32-byte store of zeros.

use super::{Exception, Flow, Outcome};
use crate::cpu::bus::MemoryBus;
use crate::cpu::decoder::Instruction;
use crate::cpu::registers::{spr, RegisterFile};

/// Data cache block size.
const CACHE_LINE: u32 = 32;

pub(crate) fn mfcr(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let cr = regs.cr;
    regs.set_gpr(instr.rd, cr);
    Ok(Flow::Continue)
}

pub(crate) fn mtcrf(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let crm = instr.crm();
    let mask = (0..8u32)
        .filter(|field| crm & (0x80 >> field) != 0)
        .fold(0u32, |mask, field| mask | (0xF000_0000 >> (4 * field)));
    regs.cr = (regs.cr & !mask) | (regs.gpr(instr.rd) & mask);
    Ok(Flow::Continue)
}

pub(crate) fn mcrxr(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let field = (regs.xer >> 28) as u8;
    regs.set_cr_field(instr.crf_d(), field);
    regs.xer &= 0x0FFF_FFFF;
    Ok(Flow::Continue)
}

pub(crate) fn mfmsr(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let msr = regs.msr;
    regs.set_gpr(instr.rd, msr);
    Ok(Flow::Continue)
}

pub(crate) fn mtmsr(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    regs.msr = regs.gpr(instr.rd);
    Ok(Flow::Continue)
}

pub(crate) fn mfspr(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let value = regs.spr(instr.spr());
    regs.set_gpr(instr.rd, value);
    Ok(Flow::Continue)
}

pub(crate) fn mtspr(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let index = instr.spr();
    // The read-only time base and processor version numbers ignore writes.
    if matches!(index, spr::TBL_READ | spr::TBU_READ | spr::PVR) {
        return Ok(Flow::Continue);
    }
    let value = regs.gpr(instr.rd);
    regs.set_spr(index, value);
    Ok(Flow::Continue)
}

pub(crate) fn mftb(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let value = match instr.spr() {
        spr::TBL_READ => regs.tb as u32,
        spr::TBU_READ => (regs.tb >> 32) as u32,
        _ => return Err(Exception::Illegal),
    };
    regs.set_gpr(instr.rd, value);
    Ok(Flow::Continue)
}

pub(crate) fn mfsr(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let value = regs.sr[usize::from(instr.sr())];
    regs.set_gpr(instr.rd, value);
    Ok(Flow::Continue)
}

pub(crate) fn mtsr(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    regs.sr[usize::from(instr.sr())] = regs.gpr(instr.rd);
    Ok(Flow::Continue)
}

pub(crate) fn mfsrin(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let index = (regs.gpr(instr.rb) >> 28) as usize;
    let value = regs.sr[index];
    regs.set_gpr(instr.rd, value);
    Ok(Flow::Continue)
}

pub(crate) fn mtsrin(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let index = (regs.gpr(instr.rb) >> 28) as usize;
    regs.sr[index] = regs.gpr(instr.rd);
    Ok(Flow::Continue)
}

/// Cache hints, TLB maintenance and barriers.
pub(crate) fn no_op(_regs: &mut RegisterFile, _instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    Ok(Flow::Continue)
}

pub(crate) fn dcbz(regs: &mut RegisterFile, instr: &Instruction, bus: &mut dyn MemoryBus) -> Outcome {
    let ea = regs.gpr_or_zero(instr.ra).wrapping_add(regs.gpr(instr.rb)) & !(CACHE_LINE - 1);
    bus.write(ea, &[0u8; CACHE_LINE as usize])?;
    Ok(Flow::Continue)
}
