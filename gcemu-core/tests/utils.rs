//! Test Utilities
//!
//! Mock memory, register seeding, instruction encoders and assertion
//! helpers shared by the integration tests.
#![allow(dead_code)]

use gcemu_core::cpu::decoder::Instruction;
use gcemu_core::cpu::{execute, ExecutionResult, Interpreter, MemoryBus, RegisterFile};
use gcemu_core::runtime::Ram;

/// Base of the mock RAM window.
pub const BASE: u32 = 0x8000_0000;
/// Mock RAM size (64 KiB).
pub const RAM_SIZE: usize = 0x1_0000;
/// Scratch data area inside the mock RAM.
pub const DATA: u32 = BASE + 0x8000;

/// Small RAM at [`BASE`] without the uncached mirror.
pub fn mock_ram() -> Ram {
    Ram::with_layout(BASE, RAM_SIZE, false)
}

/// Register file with `pc = BASE` and the given GPRs.
pub fn mock_registers(gprs: &[(u8, u32)]) -> RegisterFile {
    let mut regs = RegisterFile::new();
    regs.pc = BASE;
    for &(reg, value) in gprs {
        regs.set_gpr(reg, value);
    }
    regs
}

/// Execute a single word against `regs` and `bus`.
pub fn exec(regs: &mut RegisterFile, bus: &mut dyn MemoryBus, word: u32) -> ExecutionResult {
    execute(regs, &Instruction::decode(word), bus)
}

/// Execute a single word on a fresh RAM.
pub fn exec_fresh(regs: &mut RegisterFile, word: u32) -> ExecutionResult {
    let mut ram = mock_ram();
    exec(regs, &mut ram, word)
}

/// Interpreter with `program` loaded at [`BASE`] and `pc = BASE`.
pub fn machine(program: &[u32]) -> Interpreter<Ram> {
    let mut ram = mock_ram();
    let bytes: Vec<u8> = program.iter().flat_map(|w| w.to_be_bytes()).collect();
    ram.load(BASE, &bytes).unwrap();
    Interpreter::new(ram, BASE)
}

/// Assert full register-file equality with a readable diff for the GPRs.
pub fn assert_registers_equal(expected: &RegisterFile, actual: &RegisterFile, message: &str) {
    for i in 0..32u8 {
        assert_eq!(
            expected.gpr(i),
            actual.gpr(i),
            "{}: Register r{} differs: expected 0x{:08X}, got 0x{:08X}",
            message,
            i,
            expected.gpr(i),
            actual.gpr(i)
        );
    }
    assert_eq!(expected, actual, "{message}: register file differs");
}

/// Deterministic xorshift64* generator for sweeps.
pub struct XorShift(u64);

impl XorShift {
    pub fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    pub fn next_u32(&mut self) -> u32 {
        self.0 ^= self.0 >> 12;
        self.0 ^= self.0 << 25;
        self.0 ^= self.0 >> 27;
        (self.0.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 32) as u32
    }
}

/// Operands around the signed and unsigned 32-bit boundaries.
pub const BOUNDARY: [u32; 10] = [
    0,
    1,
    2,
    0x7FFF_FFFE,
    0x7FFF_FFFF,
    0x8000_0000,
    0x8000_0001,
    0xFFFF_FFFE,
    0xFFFF_FFFF,
    0x1234_5678,
];

// ---------------------------------------------------------------------------
// Encoders
// ---------------------------------------------------------------------------

pub fn d_form(op: u32, rd: u8, ra: u8, imm: i16) -> u32 {
    (op << 26) | (u32::from(rd) << 21) | (u32::from(ra) << 16) | u32::from(imm as u16)
}

pub fn x_form(op: u32, rd: u8, ra: u8, rb: u8, ext: u32, rc: bool) -> u32 {
    (op << 26)
        | (u32::from(rd) << 21)
        | (u32::from(ra) << 16)
        | (u32::from(rb) << 11)
        | (ext << 1)
        | u32::from(rc)
}

/// Opcode 31 XO-form with OE and Rc.
pub fn xo_form(rd: u8, ra: u8, rb: u8, ext: u32, oe: bool, rc: bool) -> u32 {
    x_form(31, rd, ra, rb, ext | (u32::from(oe) << 9), rc)
}

/// A-form: frD, frA, frB, frC with a 5-bit secondary opcode.
pub fn a_form(op: u32, frd: u8, fra: u8, frb: u8, frc: u8, ext: u32, rc: bool) -> u32 {
    (op << 26)
        | (u32::from(frd) << 21)
        | (u32::from(fra) << 16)
        | (u32::from(frb) << 11)
        | (u32::from(frc) << 6)
        | (ext << 1)
        | u32::from(rc)
}

pub fn addi(rd: u8, ra: u8, imm: i16) -> u32 {
    d_form(14, rd, ra, imm)
}

pub fn addis(rd: u8, ra: u8, imm: i16) -> u32 {
    d_form(15, rd, ra, imm)
}

pub fn ori(ra: u8, rs: u8, imm: u16) -> u32 {
    d_form(24, rs, ra, imm as i16)
}

pub fn cmpwi(crf: u8, ra: u8, imm: i16) -> u32 {
    d_form(11, crf << 2, ra, imm)
}

pub fn lwz(rd: u8, ra: u8, d: i16) -> u32 {
    d_form(32, rd, ra, d)
}

pub fn stw(rs: u8, ra: u8, d: i16) -> u32 {
    d_form(36, rs, ra, d)
}

pub fn add(rd: u8, ra: u8, rb: u8) -> u32 {
    xo_form(rd, ra, rb, 266, false, false)
}

/// `b target` with a byte displacement.
pub fn branch(displacement: i32, aa: bool, lk: bool) -> u32 {
    (18 << 26) | ((displacement as u32) & 0x03FF_FFFC) | (u32::from(aa) << 1) | u32::from(lk)
}

pub fn bc(bo: u8, bi: u8, displacement: i16, aa: bool, lk: bool) -> u32 {
    (16 << 26)
        | (u32::from(bo) << 21)
        | (u32::from(bi) << 16)
        | (u32::from(displacement as u16) & 0xFFFC)
        | (u32::from(aa) << 1)
        | u32::from(lk)
}

pub fn bclr(bo: u8, bi: u8, lk: bool) -> u32 {
    x_form(19, bo, bi, 0, 16, lk)
}

pub fn bcctr(bo: u8, bi: u8, lk: bool) -> u32 {
    x_form(19, bo, bi, 0, 528, lk)
}

pub fn mtspr(spr: u16, rs: u8) -> u32 {
    let field = u32::from(spr & 0x1F) << 5 | u32::from(spr >> 5);
    (31 << 26) | (u32::from(rs) << 21) | (field << 11) | (467 << 1)
}

pub fn mfspr(rd: u8, spr: u16) -> u32 {
    let field = u32::from(spr & 0x1F) << 5 | u32::from(spr >> 5);
    (31 << 26) | (u32::from(rd) << 21) | (field << 11) | (339 << 1)
}

pub const BO_ALWAYS: u8 = 0b10100;
pub const BO_TRUE: u8 = 0b01100;
pub const BO_FALSE: u8 = 0b00100;
pub const BO_DNZ: u8 = 0b10000;
pub const BO_DZ: u8 = 0b10010;

/// CR bit numbers within field 0.
pub const LT: u8 = 0;
pub const GT: u8 = 1;
pub const EQ: u8 = 2;
pub const SO: u8 = 3;
