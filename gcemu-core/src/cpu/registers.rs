//! Architectural register file of the Gekko (PowerPC 750CL) CPU.
//!
//! The register file is plain state: it knows how to reset itself and how to
//! read and write the sub-fields of the packed status registers, but it never
//! decides what an instruction does with them.
//!
//! # Bit numbering
//! PowerPC documentation numbers bits from the most-significant end (bit 0 is
//! `0x8000_0000`). The helpers here take architectural bit and field numbers
//! and translate them, so callers can follow the manuals directly.

use std::collections::{BTreeSet, HashMap};

/// XER summary overflow.
pub const XER_SO: u32 = 0x8000_0000;
/// XER overflow.
pub const XER_OV: u32 = 0x4000_0000;
/// XER carry.
pub const XER_CA: u32 = 0x2000_0000;
/// XER string byte count (`lswx`/`stswx`).
pub const XER_BYTE_COUNT: u32 = 0x0000_007F;

/// CR field bits, as laid out inside a 4-bit field.
pub const CR_LT: u8 = 0b1000;
pub const CR_GT: u8 = 0b0100;
pub const CR_EQ: u8 = 0b0010;
pub const CR_SO: u8 = 0b0001;

/// MSR floating-point exception mode bits.
pub const MSR_FE0: u32 = 0x0000_0800;
pub const MSR_FE1: u32 = 0x0000_0100;

/// Special-purpose register numbers the engine gives meaning to.
pub mod spr {
    pub const XER: u16 = 1;
    pub const LR: u16 = 8;
    pub const CTR: u16 = 9;
    pub const DEC: u16 = 22;
    pub const SRR0: u16 = 26;
    pub const SRR1: u16 = 27;
    pub const TBL_READ: u16 = 268;
    pub const TBU_READ: u16 = 269;
    pub const TBL_WRITE: u16 = 284;
    pub const TBU_WRITE: u16 = 285;
    pub const PVR: u16 = 287;
    /// First of the eight graphics quantization registers (GQR0-GQR7).
    pub const GQR0: u16 = 912;
    pub const HID2: u16 = 920;
}

/// Complete architectural state of one emulated CPU.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterFile {
    pub gpr: [u32; 32], // General Purpose Registers (r0-r31)
    pub pc: u32,        // Program Counter
    pub lr: u32,        // Link Register
    pub ctr: u32,       // Count Register
    pub xer: u32,       // Fixed-Point Exception Register
    pub cr: u32,        // Condition Register (8 x 4-bit fields)
    pub fpr: [f64; 32], // Floating-Point Registers (paired-single slot 0)
    pub ps1: [f64; 32], // Paired-single slot 1
    pub fpscr: u32,     // Floating-Point Status and Control Register
    pub msr: u32,       // Machine State Register
    pub sr: [u32; 16],  // Segment Registers
    /// 64-bit time base, exposed as TBL/TBU.
    pub tb: u64,
    /// Address reserved by the last `lwarx`, cleared by `stwcx.`.
    pub reservation: Option<u32>,
    spr: HashMap<u16, u32>,
}

impl RegisterFile {
    /// Power-on state: every register zero, no SPR touched.
    pub fn new() -> Self {
        Self {
            gpr: [0; 32],
            pc: 0,
            lr: 0,
            ctr: 0,
            xer: 0,
            cr: 0,
            fpr: [0.0; 32],
            ps1: [0.0; 32],
            fpscr: 0,
            msr: 0,
            sr: [0; 16],
            tb: 0,
            reservation: None,
            spr: HashMap::new(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    #[inline]
    pub fn gpr(&self, reg: u8) -> u32 {
        self.gpr[(reg & 0x1F) as usize]
    }

    #[inline]
    pub fn set_gpr(&mut self, reg: u8, value: u32) {
        self.gpr[(reg & 0x1F) as usize] = value;
    }

    /// `(rA|0)`: the base-register convention of D-form and X-form
    /// effective addresses, where r0 as a base reads as zero.
    #[inline]
    pub fn gpr_or_zero(&self, reg: u8) -> u32 {
        if reg == 0 {
            0
        } else {
            self.gpr(reg)
        }
    }

    #[inline]
    pub fn fpr(&self, reg: u8) -> f64 {
        self.fpr[(reg & 0x1F) as usize]
    }

    #[inline]
    pub fn set_fpr(&mut self, reg: u8, value: f64) {
        self.fpr[(reg & 0x1F) as usize] = value;
    }

    /// Both paired-single slots of an FPR.
    #[inline]
    pub fn ps(&self, reg: u8) -> (f64, f64) {
        let i = (reg & 0x1F) as usize;
        (self.fpr[i], self.ps1[i])
    }

    #[inline]
    pub fn set_ps(&mut self, reg: u8, ps0: f64, ps1: f64) {
        let i = (reg & 0x1F) as usize;
        self.fpr[i] = ps0;
        self.ps1[i] = ps1;
    }

    /// Read CR field `field` (0 = most significant nibble).
    #[inline]
    pub fn cr_field(&self, field: u8) -> u8 {
        ((self.cr >> (28 - 4 * u32::from(field & 7))) & 0xF) as u8
    }

    /// Replace CR field `field`, leaving the other seven untouched.
    #[inline]
    pub fn set_cr_field(&mut self, field: u8, value: u8) {
        let shift = 28 - 4 * u32::from(field & 7);
        self.cr = (self.cr & !(0xF << shift)) | (u32::from(value & 0xF) << shift);
    }

    /// Read CR bit `bit` (0 = LT of field 0).
    #[inline]
    pub fn cr_bit(&self, bit: u8) -> bool {
        (self.cr >> (31 - u32::from(bit & 31))) & 1 != 0
    }

    #[inline]
    pub fn set_cr_bit(&mut self, bit: u8, value: bool) {
        let mask = 1u32 << (31 - u32::from(bit & 31));
        if value {
            self.cr |= mask;
        } else {
            self.cr &= !mask;
        }
    }

    #[inline]
    pub fn xer_so(&self) -> bool {
        self.xer & XER_SO != 0
    }

    #[inline]
    pub fn xer_ca(&self) -> bool {
        self.xer & XER_CA != 0
    }

    #[inline]
    pub fn set_xer_ca(&mut self, carry: bool) {
        if carry {
            self.xer |= XER_CA;
        } else {
            self.xer &= !XER_CA;
        }
    }

    /// Record an overflow outcome: OV mirrors the last result, SO is sticky.
    #[inline]
    pub fn set_xer_ov(&mut self, overflow: bool) {
        if overflow {
            self.xer |= XER_OV | XER_SO;
        } else {
            self.xer &= !XER_OV;
        }
    }

    /// Read a special-purpose register by its 10-bit number.
    ///
    /// XER, LR, CTR and the time base live in dedicated fields and are
    /// redirected here; everything else comes from the sparse map and reads
    /// zero until written.
    pub fn spr(&self, index: u16) -> u32 {
        match index {
            spr::XER => self.xer,
            spr::LR => self.lr,
            spr::CTR => self.ctr,
            spr::TBL_READ | spr::TBL_WRITE => self.tb as u32,
            spr::TBU_READ | spr::TBU_WRITE => (self.tb >> 32) as u32,
            _ => self.spr.get(&(index & 0x3FF)).copied().unwrap_or(0),
        }
    }

    pub fn set_spr(&mut self, index: u16, value: u32) {
        match index {
            spr::XER => self.xer = value,
            spr::LR => self.lr = value,
            spr::CTR => self.ctr = value,
            spr::TBL_WRITE => self.tb = (self.tb & 0xFFFF_FFFF_0000_0000) | u64::from(value),
            spr::TBU_WRITE => self.tb = (self.tb & 0xFFFF_FFFF) | (u64::from(value) << 32),
            _ => {
                self.spr.insert(index & 0x3FF, value);
            }
        }
    }

    /// SPR numbers held in the sparse map, in ascending order.
    pub fn touched_sprs(&self) -> BTreeSet<u16> {
        self.spr.keys().copied().collect()
    }

    /// Graphics quantization register `n` (0-7).
    #[inline]
    pub fn gqr(&self, n: u8) -> u32 {
        self.spr(spr::GQR0 + u16::from(n & 7))
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}
