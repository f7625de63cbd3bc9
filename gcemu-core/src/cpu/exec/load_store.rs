//! Integer and floating-point loads and stores.
//!
//! The D-form and X-form variants of each width share one generic handler:
//! `INDEXED` selects `(rA|0) + rB` over `(rA|0) + d`, `UPDATE` writes the
//! effective address back to rA. Every multi-element access buffers what it
//! reads into locals and commits registers only after the last bus access.

use smallvec::SmallVec;

use super::float::{convert_to_double, convert_to_single};
use super::{Exception, Flow, Outcome};
use crate::cpu::bus::{AccessKind, BusExt, BusFault, MemoryBus};
use crate::cpu::decoder::Instruction;
use crate::cpu::registers::{RegisterFile, CR_EQ, CR_SO, XER_BYTE_COUNT};

#[inline]
fn effective_address<const INDEXED: bool>(regs: &RegisterFile, instr: &Instruction) -> u32 {
    let offset = if INDEXED {
        regs.gpr(instr.rb)
    } else {
        instr.simm as i32 as u32
    };
    regs.gpr_or_zero(instr.ra).wrapping_add(offset)
}

/// Word alignment check for the instructions that require it.
#[inline]
fn require_word_aligned(ea: u32, kind: AccessKind) -> Result<(), BusFault> {
    if ea & 3 != 0 {
        return Err(BusFault::misaligned(ea, kind));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Integer loads and stores
// ---------------------------------------------------------------------------

/// `lbz`, `lhz`, `lha`, `lwz` and their update/indexed forms.
pub(crate) fn load_int<const WIDTH: usize, const ALGEBRAIC: bool, const INDEXED: bool, const UPDATE: bool>(
    regs: &mut RegisterFile,
    instr: &Instruction,
    bus: &mut dyn MemoryBus,
) -> Outcome {
    if UPDATE && (instr.ra == 0 || instr.ra == instr.rd) {
        return Err(Exception::Illegal);
    }
    let ea = effective_address::<INDEXED>(regs, instr);
    let value = match WIDTH {
        1 => u32::from(bus.read_u8(ea)?),
        2 if ALGEBRAIC => bus.read_u16(ea)? as i16 as i32 as u32,
        2 => u32::from(bus.read_u16(ea)?),
        _ => bus.read_u32(ea)?,
    };

    regs.set_gpr(instr.rd, value);
    if UPDATE {
        regs.set_gpr(instr.ra, ea);
    }
    Ok(Flow::Continue)
}

/// `stb`, `sth`, `stw` and their update/indexed forms.
pub(crate) fn store_int<const WIDTH: usize, const INDEXED: bool, const UPDATE: bool>(
    regs: &mut RegisterFile,
    instr: &Instruction,
    bus: &mut dyn MemoryBus,
) -> Outcome {
    if UPDATE && instr.ra == 0 {
        return Err(Exception::Illegal);
    }
    let ea = effective_address::<INDEXED>(regs, instr);
    let value = regs.gpr(instr.rd);
    match WIDTH {
        1 => bus.write_u8(ea, value as u8)?,
        2 => bus.write_u16(ea, value as u16)?,
        _ => bus.write_u32(ea, value)?,
    }

    if UPDATE {
        regs.set_gpr(instr.ra, ea);
    }
    Ok(Flow::Continue)
}

pub(crate) fn lhbrx(regs: &mut RegisterFile, instr: &Instruction, bus: &mut dyn MemoryBus) -> Outcome {
    let ea = effective_address::<true>(regs, instr);
    let value = bus.read_u16(ea)?.swap_bytes();
    regs.set_gpr(instr.rd, u32::from(value));
    Ok(Flow::Continue)
}

pub(crate) fn lwbrx(regs: &mut RegisterFile, instr: &Instruction, bus: &mut dyn MemoryBus) -> Outcome {
    let ea = effective_address::<true>(regs, instr);
    let value = bus.read_u32(ea)?.swap_bytes();
    regs.set_gpr(instr.rd, value);
    Ok(Flow::Continue)
}

pub(crate) fn sthbrx(regs: &mut RegisterFile, instr: &Instruction, bus: &mut dyn MemoryBus) -> Outcome {
    let ea = effective_address::<true>(regs, instr);
    bus.write_u16(ea, (regs.gpr(instr.rd) as u16).swap_bytes())?;
    Ok(Flow::Continue)
}

pub(crate) fn stwbrx(regs: &mut RegisterFile, instr: &Instruction, bus: &mut dyn MemoryBus) -> Outcome {
    let ea = effective_address::<true>(regs, instr);
    bus.write_u32(ea, regs.gpr(instr.rd).swap_bytes())?;
    Ok(Flow::Continue)
}

// ---------------------------------------------------------------------------
// Multiple and string
// ---------------------------------------------------------------------------

pub(crate) fn lmw(regs: &mut RegisterFile, instr: &Instruction, bus: &mut dyn MemoryBus) -> Outcome {
    // rA inside the loaded range rD..=r31 is an invalid form, r0 included.
    if instr.ra >= instr.rd {
        return Err(Exception::Illegal);
    }
    let ea = effective_address::<false>(regs, instr);
    require_word_aligned(ea, AccessKind::Load)?;

    let mut words: SmallVec<[u32; 32]> = SmallVec::new();
    let mut address = ea;
    for _ in instr.rd..32 {
        words.push(bus.read_u32(address)?);
        address = address.wrapping_add(4);
    }

    for (reg, word) in (instr.rd..32).zip(words) {
        regs.set_gpr(reg, word);
    }
    Ok(Flow::Continue)
}

pub(crate) fn stmw(regs: &mut RegisterFile, instr: &Instruction, bus: &mut dyn MemoryBus) -> Outcome {
    let ea = effective_address::<false>(regs, instr);
    require_word_aligned(ea, AccessKind::Store)?;

    let mut address = ea;
    for reg in instr.rd..32 {
        bus.write_u32(address, regs.gpr(reg))?;
        address = address.wrapping_add(4);
    }
    Ok(Flow::Continue)
}

/// Registers touched by a string access of `count` bytes starting at `first`.
#[inline]
fn string_registers(first: u8, count: u32) -> impl Iterator<Item = u8> {
    let registers = count.div_ceil(4);
    (0..registers).map(move |i| ((u32::from(first) + i) % 32) as u8)
}

/// Read `count` bytes and pack them into consecutive registers from `first`,
/// wrapping from r31 to r0. The final register is zero-padded.
fn load_string(
    regs: &mut RegisterFile,
    bus: &mut dyn MemoryBus,
    first: u8,
    ea: u32,
    count: u32,
) -> Outcome {
    let mut words: SmallVec<[u32; 32]> = SmallVec::new();
    for i in 0..count {
        let byte = bus.read_u8(ea.wrapping_add(i))?;
        if i % 4 == 0 {
            words.push(0);
        }
        if let Some(word) = words.last_mut() {
            *word |= u32::from(byte) << (24 - 8 * (i % 4));
        }
    }

    for (reg, word) in string_registers(first, count).zip(words) {
        regs.set_gpr(reg, word);
    }
    Ok(Flow::Continue)
}

fn store_string(regs: &RegisterFile, bus: &mut dyn MemoryBus, first: u8, ea: u32, count: u32) -> Outcome {
    for i in 0..count {
        let reg = ((u32::from(first) + i / 4) % 32) as u8;
        let byte = (regs.gpr(reg) >> (24 - 8 * (i % 4))) as u8;
        bus.write_u8(ea.wrapping_add(i), byte)?;
    }
    Ok(Flow::Continue)
}

/// NB field, where 0 encodes 32.
#[inline]
fn immediate_count(instr: &Instruction) -> u32 {
    match instr.nb() {
        0 => 32,
        nb => u32::from(nb),
    }
}

pub(crate) fn lswi(regs: &mut RegisterFile, instr: &Instruction, bus: &mut dyn MemoryBus) -> Outcome {
    let count = immediate_count(instr);
    if string_registers(instr.rd, count).any(|reg| reg == instr.ra) {
        return Err(Exception::Illegal);
    }
    let ea = regs.gpr_or_zero(instr.ra);
    load_string(regs, bus, instr.rd, ea, count)
}

pub(crate) fn lswx(regs: &mut RegisterFile, instr: &Instruction, bus: &mut dyn MemoryBus) -> Outcome {
    let count = regs.xer & XER_BYTE_COUNT;
    if string_registers(instr.rd, count).any(|reg| reg == instr.ra || reg == instr.rb) {
        return Err(Exception::Illegal);
    }
    let ea = effective_address::<true>(regs, instr);
    load_string(regs, bus, instr.rd, ea, count)
}

pub(crate) fn stswi(regs: &mut RegisterFile, instr: &Instruction, bus: &mut dyn MemoryBus) -> Outcome {
    let ea = regs.gpr_or_zero(instr.ra);
    store_string(regs, bus, instr.rd, ea, immediate_count(instr))
}

pub(crate) fn stswx(regs: &mut RegisterFile, instr: &Instruction, bus: &mut dyn MemoryBus) -> Outcome {
    let ea = effective_address::<true>(regs, instr);
    store_string(regs, bus, instr.rd, ea, regs.xer & XER_BYTE_COUNT)
}

// ---------------------------------------------------------------------------
// Reservation
// ---------------------------------------------------------------------------

pub(crate) fn lwarx(regs: &mut RegisterFile, instr: &Instruction, bus: &mut dyn MemoryBus) -> Outcome {
    let ea = effective_address::<true>(regs, instr);
    require_word_aligned(ea, AccessKind::Load)?;
    let value = bus.read_u32(ea)?;

    regs.set_gpr(instr.rd, value);
    regs.reservation = Some(ea);
    Ok(Flow::Continue)
}

pub(crate) fn stwcx_record(regs: &mut RegisterFile, instr: &Instruction, bus: &mut dyn MemoryBus) -> Outcome {
    let ea = effective_address::<true>(regs, instr);
    require_word_aligned(ea, AccessKind::Store)?;

    let stored = regs.reservation == Some(ea);
    if stored {
        bus.write_u32(ea, regs.gpr(instr.rd))?;
    }

    regs.reservation = None;
    let mut field = if stored { CR_EQ } else { 0 };
    if regs.xer_so() {
        field |= CR_SO;
    }
    regs.set_cr_field(0, field);
    Ok(Flow::Continue)
}

// ---------------------------------------------------------------------------
// Floating-point loads and stores
// ---------------------------------------------------------------------------

/// `lfs`/`lfd` and their update/indexed forms. Single loads fill both
/// paired-single slots; double loads write ps0 only.
pub(crate) fn load_float<const WIDTH: usize, const INDEXED: bool, const UPDATE: bool>(
    regs: &mut RegisterFile,
    instr: &Instruction,
    bus: &mut dyn MemoryBus,
) -> Outcome {
    if UPDATE && instr.ra == 0 {
        return Err(Exception::Illegal);
    }
    let ea = effective_address::<INDEXED>(regs, instr);
    if WIDTH == 4 {
        let value = f64::from_bits(convert_to_double(bus.read_u32(ea)?));
        regs.set_ps(instr.rd, value, value);
    } else {
        let value = f64::from_bits(bus.read_u64(ea)?);
        regs.set_fpr(instr.rd, value);
    }

    if UPDATE {
        regs.set_gpr(instr.ra, ea);
    }
    Ok(Flow::Continue)
}

/// `stfs`/`stfd` and their update/indexed forms.
pub(crate) fn store_float<const WIDTH: usize, const INDEXED: bool, const UPDATE: bool>(
    regs: &mut RegisterFile,
    instr: &Instruction,
    bus: &mut dyn MemoryBus,
) -> Outcome {
    if UPDATE && instr.ra == 0 {
        return Err(Exception::Illegal);
    }
    let ea = effective_address::<INDEXED>(regs, instr);
    let bits = regs.fpr(instr.rd).to_bits();
    if WIDTH == 4 {
        bus.write_u32(ea, convert_to_single(bits))?;
    } else {
        bus.write_u64(ea, bits)?;
    }

    if UPDATE {
        regs.set_gpr(instr.ra, ea);
    }
    Ok(Flow::Continue)
}

/// Store the low word of an FPR unconverted.
pub(crate) fn stfiwx(regs: &mut RegisterFile, instr: &Instruction, bus: &mut dyn MemoryBus) -> Outcome {
    let ea = effective_address::<true>(regs, instr);
    bus.write_u32(ea, regs.fpr(instr.rd).to_bits() as u32)?;
    Ok(Flow::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_registers_wrap() {
        let regs: Vec<u8> = string_registers(30, 9).collect();
        assert_eq!(regs, vec![30, 31, 0]);
        assert_eq!(string_registers(5, 0).count(), 0);
        assert_eq!(string_registers(0, 32).count(), 8);
    }
}
