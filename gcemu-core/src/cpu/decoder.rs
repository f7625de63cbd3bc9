//! PowerPC Instruction Decoder
//!
//! Turns a 32-bit instruction word into an [`Instruction`]: the primary
//! opcode, the three register fields, both readings of the 16-bit immediate
//! and the secondary opcode of the word's format family.
//!
//! Decoding is a stateless bit-field projection. It never fails: whether the
//! `(opcode, extended)` pair means anything is decided by the execution table,
//! so the same decoder serves disassembly of arbitrary data.
//!
//! # Bit numbering
//! PowerPC manuals number bits 0 (MSB) to 31 (LSB). The shifts below use the
//! conventional LSB-0 positions, e.g. the primary opcode is `word >> 26`.
//!
//! # Extended opcode field
//! | primary | format | `extended` |
//! |---------|--------|------------|
//! | 19, 31  | XL / X / XO | bits 1-10 (XO-form keeps OE as the field's top bit) |
//! | 59      | A      | bits 1-5 |
//! | 63      | A if bits 1-5 >= 16, else X | bits 1-5 or bits 1-10 |
//! | 4       | paired singles | bits 1-5 (A), bits 1-6 (indexed quantized), else bits 1-10 |
//! | others  | D / I / B | 0 |

/// A decoded PowerPC instruction.
///
/// `rd`, `ra` and `rb` are the raw 5-bit fields at their fixed positions; what
/// they name (GPR, FPR, BO/BI, crbD, ...) depends on the opcode. Fields the
/// structured form does not carry are read from `raw` through the accessor
/// methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction {
    /// Original instruction word.
    pub raw: u32,
    /// Primary opcode (bits 0-5).
    pub opcode: u8,
    /// Destination / source-store field (bits 6-10).
    pub rd: u8,
    /// Source A field (bits 11-15).
    pub ra: u8,
    /// Source B field (bits 16-20).
    pub rb: u8,
    /// Low 16 bits, sign-extended.
    pub simm: i16,
    /// Low 16 bits, zero-extended.
    pub uimm: u16,
    /// Secondary opcode for the format family, 0 when absent.
    pub extended: u16,
}

/// Primary opcodes whose secondary opcode lives in bits 1-10.
pub const OP_CR_BRANCH: u8 = 19;
pub const OP_INTEGER_X: u8 = 31;
/// Primary opcode of single-precision A-form arithmetic.
pub const OP_FLOAT_SINGLE: u8 = 59;
/// Primary opcode of double-precision arithmetic and FPSCR control.
pub const OP_FLOAT_DOUBLE: u8 = 63;
/// Primary opcode of the Gekko paired-single group.
pub const OP_PAIRED: u8 = 4;

/// Paired-single A-form secondary opcodes (bits 1-5).
const PAIRED_A_FORM: u32 = (1 << 10)
    | (1 << 11)
    | (1 << 12)
    | (1 << 13)
    | (1 << 14)
    | (1 << 15)
    | (1 << 18)
    | (1 << 20)
    | (1 << 21)
    | (1 << 23)
    | (1 << 24)
    | (1 << 25)
    | (1 << 26)
    | (1 << 28)
    | (1 << 29)
    | (1 << 30)
    | (1 << 31);

/// Indexed quantized load/store secondary opcodes (bits 1-6).
const PAIRED_INDEXED: [u16; 4] = [6, 7, 38, 39];

impl Instruction {
    /// Decode a 32-bit PowerPC instruction word.
    ///
    /// # Examples
    /// ```rust
    /// use gcemu_core::cpu::decoder::Instruction;
    ///
    /// // addi r3, r4, 42
    /// let decoded = Instruction::decode(0x3864_002A);
    /// assert_eq!(decoded.opcode, 14);
    /// assert_eq!((decoded.rd, decoded.ra, decoded.simm), (3, 4, 42));
    /// ```
    #[inline]
    pub fn decode(word: u32) -> Self {
        let opcode = ((word >> 26) & 0x3F) as u8;

        let (rd, ra, rb) = match opcode {
            // I-form: the whole payload is the branch displacement
            18 => (0, 0, 0),
            // B-form: BO and BI sit in the rD/rA positions, BD covers rB
            16 => (field(word, 21), field(word, 16), 0),
            _ => (field(word, 21), field(word, 16), field(word, 11)),
        };

        Self {
            raw: word,
            opcode,
            rd,
            ra,
            rb,
            simm: (word & 0xFFFF) as u16 as i16,
            uimm: (word & 0xFFFF) as u16,
            extended: extended_opcode(opcode, word),
        }
    }

    /// frC / MB: bits 21-25 of the word (LSB-0 bits 6-10).
    #[inline]
    pub fn rc_field(&self) -> u8 {
        field(self.raw, 6)
    }

    /// Record bit (Rc): update a CR field with the result.
    #[inline]
    pub fn rc(&self) -> bool {
        self.raw & 1 != 0
    }

    /// Overflow-enable bit (OE) of XO-form arithmetic.
    #[inline]
    pub fn oe(&self) -> bool {
        self.raw & 0x400 != 0
    }

    /// Link bit (LK) of branches.
    #[inline]
    pub fn lk(&self) -> bool {
        self.raw & 1 != 0
    }

    /// Absolute-address bit (AA) of branches.
    #[inline]
    pub fn aa(&self) -> bool {
        self.raw & 2 != 0
    }

    /// Target CR field of compares and `mcrf` (crfD, bits 6-8).
    #[inline]
    pub fn crf_d(&self) -> u8 {
        ((self.raw >> 23) & 7) as u8
    }

    /// Source CR field of `mcrf` / `mcrfs` (crfS, bits 11-13).
    #[inline]
    pub fn crf_s(&self) -> u8 {
        ((self.raw >> 18) & 7) as u8
    }

    /// L bit of compares (64-bit compare, reserved on 32-bit parts).
    #[inline]
    pub fn cmp_l(&self) -> bool {
        self.raw & 0x0020_0000 != 0
    }

    /// Branch options.
    #[inline]
    pub fn bo(&self) -> u8 {
        self.rd
    }

    /// Condition bit tested by conditional branches.
    #[inline]
    pub fn bi(&self) -> u8 {
        self.ra
    }

    /// I-form displacement (LI || 0b00), sign-extended.
    #[inline]
    pub fn li(&self) -> i32 {
        ((self.raw & 0x03FF_FFFC) << 6) as i32 >> 6
    }

    /// B-form displacement (BD || 0b00), sign-extended.
    #[inline]
    pub fn bd(&self) -> i32 {
        i32::from((self.raw & 0xFFFC) as u16 as i16)
    }

    /// Shift amount (SH) of `srawi` / rotates.
    #[inline]
    pub fn sh(&self) -> u8 {
        self.rb
    }

    /// Mask begin of M-form rotates.
    #[inline]
    pub fn mb(&self) -> u8 {
        field(self.raw, 6)
    }

    /// Mask end of M-form rotates.
    #[inline]
    pub fn me(&self) -> u8 {
        field(self.raw, 1)
    }

    /// SPR number with its two 5-bit halves swapped back into order.
    #[inline]
    pub fn spr(&self) -> u16 {
        (u16::from(self.rb) << 5) | u16::from(self.ra)
    }

    /// Segment register number of `mfsr` / `mtsr`.
    #[inline]
    pub fn sr(&self) -> u8 {
        self.ra & 0xF
    }

    /// CR field mask of `mtcrf`.
    #[inline]
    pub fn crm(&self) -> u8 {
        ((self.raw >> 12) & 0xFF) as u8
    }

    /// FPSCR field mask of `mtfsf`.
    #[inline]
    pub fn fm(&self) -> u8 {
        ((self.raw >> 17) & 0xFF) as u8
    }

    /// 4-bit immediate of `mtfsfi`.
    #[inline]
    pub fn fpscr_imm(&self) -> u8 {
        ((self.raw >> 12) & 0xF) as u8
    }

    /// Trap condition (TO).
    #[inline]
    pub fn to(&self) -> u8 {
        self.rd
    }

    /// Byte count of `lswi` / `stswi` (0 encodes 32).
    #[inline]
    pub fn nb(&self) -> u8 {
        self.rb
    }

    /// Quantized load/store displacement (12-bit, sign-extended).
    #[inline]
    pub fn ps_offset(&self) -> i32 {
        ((self.raw & 0xFFF) << 20) as i32 >> 20
    }

    /// Quantized load/store W bit (D-form), load a single value.
    #[inline]
    pub fn ps_w(&self) -> bool {
        self.raw & 0x8000 != 0
    }

    /// Quantized load/store GQR index (D-form).
    #[inline]
    pub fn ps_i(&self) -> u8 {
        ((self.raw >> 12) & 7) as u8
    }

    /// Quantized load/store W bit (indexed form).
    #[inline]
    pub fn ps_wx(&self) -> bool {
        self.raw & 0x400 != 0
    }

    /// Quantized load/store GQR index (indexed form).
    #[inline]
    pub fn ps_ix(&self) -> u8 {
        ((self.raw >> 7) & 7) as u8
    }
}

/// Extract a 5-bit field whose least significant bit sits at `shift`.
#[inline(always)]
fn field(word: u32, shift: u32) -> u8 {
    ((word >> shift) & 0x1F) as u8
}

/// Secondary opcode for the format family implied by `opcode`.
#[inline]
fn extended_opcode(opcode: u8, word: u32) -> u16 {
    let xo10 = ((word >> 1) & 0x3FF) as u16;
    let xo5 = ((word >> 1) & 0x1F) as u16;

    match opcode {
        OP_CR_BRANCH | OP_INTEGER_X => xo10,
        OP_FLOAT_SINGLE => xo5,
        OP_FLOAT_DOUBLE => {
            if xo5 >= 16 {
                xo5
            } else {
                xo10
            }
        }
        OP_PAIRED => {
            let xo6 = ((word >> 1) & 0x3F) as u16;
            if PAIRED_A_FORM & (1 << xo5) != 0 {
                xo5
            } else if PAIRED_INDEXED.contains(&xo6) {
                xo6
            } else {
                xo10
            }
        }
        _ => 0,
    }
}

/// Compute the rotate mask for MB..ME (inclusive, wrapping when MB > ME).
#[inline]
pub fn rotate_mask(mb: u8, me: u8) -> u32 {
    let begin = u32::MAX >> (mb & 31);
    let end = u32::MAX << (31 - (me & 31));
    if mb <= me {
        begin & end
    } else {
        begin | end
    }
}
