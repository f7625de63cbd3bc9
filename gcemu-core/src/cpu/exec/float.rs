//! Floating-point arithmetic, conversion, compare and FPSCR instructions.
//!
//! # Rounding
//! The host computes every operation in round-to-nearest-even. For the other
//! FPSCR[RN] modes the engine recovers the sign of the rounding error with an
//! error-free transform (two-sum for add/subtract, a fused residual for
//! multiply, divide and square root) and steps the result by one unit in the
//! last place when the mode requires it. Single-precision results are then
//! rounded a second time to `f32` under the same mode.
//!
//! # Exceptions
//! Every handler works on a private copy of FPSCR inside an [`FpContext`].
//! Sticky bits, FR/FI and FPRF are accumulated there and written back only
//! after the enabled-exception check, so a trapping instruction leaves both
//! the target register and FPSCR untouched. An invalid operation with VE set,
//! or a zero divide with ZE set, suppresses the target and FPRF update.

use std::cmp::Ordering;

use super::{Exception, Flow, Outcome, TrapReason};
use crate::cpu::bus::MemoryBus;
use crate::cpu::decoder::Instruction;
use crate::cpu::registers::{RegisterFile, MSR_FE0, MSR_FE1};

pub const FPSCR_FX: u32 = 0x8000_0000;
pub const FPSCR_FEX: u32 = 0x4000_0000;
pub const FPSCR_VX: u32 = 0x2000_0000;
pub const FPSCR_OX: u32 = 0x1000_0000;
pub const FPSCR_UX: u32 = 0x0800_0000;
pub const FPSCR_ZX: u32 = 0x0400_0000;
pub const FPSCR_XX: u32 = 0x0200_0000;
pub const FPSCR_VXSNAN: u32 = 0x0100_0000;
pub const FPSCR_VXISI: u32 = 0x0080_0000;
pub const FPSCR_VXIDI: u32 = 0x0040_0000;
pub const FPSCR_VXZDZ: u32 = 0x0020_0000;
pub const FPSCR_VXIMZ: u32 = 0x0010_0000;
pub const FPSCR_VXVC: u32 = 0x0008_0000;
pub const FPSCR_FR: u32 = 0x0004_0000;
pub const FPSCR_FI: u32 = 0x0002_0000;
pub const FPSCR_FPRF: u32 = 0x0001_F000;
pub const FPSCR_FPCC: u32 = 0x0000_F000;
pub const FPSCR_VXSOFT: u32 = 0x0000_0400;
pub const FPSCR_VXSQRT: u32 = 0x0000_0200;
pub const FPSCR_VXCVI: u32 = 0x0000_0100;
pub const FPSCR_VE: u32 = 0x0000_0080;
pub const FPSCR_OE: u32 = 0x0000_0040;
pub const FPSCR_UE: u32 = 0x0000_0020;
pub const FPSCR_ZE: u32 = 0x0000_0010;
pub const FPSCR_XE: u32 = 0x0000_0008;
pub const FPSCR_NI: u32 = 0x0000_0004;
pub const FPSCR_RN: u32 = 0x0000_0003;

/// Every invalid-operation cause.
pub const FPSCR_VX_ALL: u32 = FPSCR_VXSNAN
    | FPSCR_VXISI
    | FPSCR_VXIDI
    | FPSCR_VXZDZ
    | FPSCR_VXIMZ
    | FPSCR_VXVC
    | FPSCR_VXSOFT
    | FPSCR_VXSQRT
    | FPSCR_VXCVI;

/// Bits whose 0 -> 1 transition sets FX.
const EXCEPTION_BITS: u32 = FPSCR_OX | FPSCR_UX | FPSCR_ZX | FPSCR_XX | FPSCR_VX_ALL;

/// Bits `mcrfs` clears after copying a field.
const MCRFS_CLEARABLE: u32 = FPSCR_FX | EXCEPTION_BITS;

/// Default quiet NaN produced by invalid operations.
pub const DEFAULT_NAN: u64 = 0x7FF8_0000_0000_0000;

const QUIET_BIT: u64 = 0x0008_0000_0000_0000;
const DOUBLE_SIGN: u64 = 0x8000_0000_0000_0000;
const DOUBLE_FRAC: u64 = 0x000F_FFFF_FFFF_FFFF;

/// High word written alongside integer results (`fctiw`, `mffs`).
const INTEGER_RESULT_HIGH: u64 = 0xFFF8_0000_0000_0000;

/// FPRF class codes (C || FPCC).
mod class {
    pub const QNAN: u32 = 0x11;
    pub const NEG_INF: u32 = 0x09;
    pub const NEG_NORMAL: u32 = 0x08;
    pub const NEG_DENORMAL: u32 = 0x18;
    pub const NEG_ZERO: u32 = 0x12;
    pub const POS_ZERO: u32 = 0x02;
    pub const POS_DENORMAL: u32 = 0x14;
    pub const POS_NORMAL: u32 = 0x04;
    pub const POS_INF: u32 = 0x05;
}

// ---------------------------------------------------------------------------
// Bit-level helpers
// ---------------------------------------------------------------------------

#[inline]
pub(crate) fn is_snan(value: f64) -> bool {
    value.is_nan() && value.to_bits() & QUIET_BIT == 0
}

#[inline]
fn quiet(value: f64) -> f64 {
    f64::from_bits(value.to_bits() | QUIET_BIT)
}

#[inline]
fn default_nan() -> f64 {
    f64::from_bits(DEFAULT_NAN)
}

/// Expand single-precision bits to double-precision bits exactly, the way
/// `lfs` does (denormals are normalised, NaN payloads are kept).
pub fn convert_to_double(value: u32) -> u64 {
    let x = u64::from(value);
    let exp = (value >> 23) & 0xFF;
    let frac = value & 0x007F_FFFF;

    if exp > 0 && exp < 255 {
        let y = u64::from(exp >> 7 == 0);
        let z = (y << 61) | (y << 60) | (y << 59);
        ((x & 0xC000_0000) << 32) | z | ((x & 0x3FFF_FFFF) << 29)
    } else if exp == 0 && frac != 0 {
        let mut exp: u64 = 1023 - 126;
        let mut frac = u64::from(frac);
        loop {
            frac <<= 1;
            exp -= 1;
            if frac & 0x0080_0000 != 0 {
                break;
            }
        }
        ((x & 0x8000_0000) << 32) | (exp << 52) | ((frac & 0x007F_FFFF) << 29)
    } else {
        // zero, infinity, NaN
        let y = u64::from(exp >> 7);
        let z = (y << 61) | (y << 60) | (y << 59);
        ((x & 0xC000_0000) << 32) | z | ((x & 0x3FFF_FFFF) << 29)
    }
}

/// Narrow double-precision bits to single-precision bits the way `stfs`
/// does: truncating, with denormalisation for the single denormal range.
pub fn convert_to_single(x: u64) -> u32 {
    let exp = ((x >> 52) & 0x7FF) as u32;
    if exp > 896 || x & !DOUBLE_SIGN == 0 {
        (((x >> 32) & 0xC000_0000) | ((x >> 29) & 0x3FFF_FFFF)) as u32
    } else if exp >= 874 {
        let t = (0x8000_0000u32 | ((x & DOUBLE_FRAC) >> 21) as u32) >> (905 - exp);
        t | ((x >> 32) & 0x8000_0000) as u32
    } else {
        // Too small for a single denormal: the result keeps only sign and
        // the low exponent bits, as the hardware does.
        (((x >> 32) & 0xC000_0000) | ((x >> 29) & 0x3FFF_FFFF)) as u32
    }
}

/// A NaN narrowed to single precision and widened back.
#[inline]
fn single_nan(value: f64) -> f64 {
    f64::from_bits(convert_to_double(convert_to_single(value.to_bits())))
}

/// Next representable double towards +infinity.
fn step_up(value: f64) -> f64 {
    if value.is_nan() || value == f64::INFINITY {
        return value;
    }
    if value == 0.0 {
        return f64::from_bits(1);
    }
    let bits = value.to_bits();
    if value > 0.0 {
        f64::from_bits(bits + 1)
    } else {
        f64::from_bits(bits - 1)
    }
}

fn step_down(value: f64) -> f64 {
    -step_up(-value)
}

/// Next representable single towards +infinity, widened.
fn step_up_single(value: f64) -> f64 {
    let value = value as f32;
    if value.is_nan() || value == f32::INFINITY {
        return f64::from(value);
    }
    if value == 0.0 {
        return f64::from(f32::from_bits(1));
    }
    let bits = value.to_bits();
    f64::from(if value > 0.0 {
        f32::from_bits(bits + 1)
    } else {
        f32::from_bits(bits - 1)
    })
}

fn step_down_single(value: f64) -> f64 {
    -step_up_single(-value)
}

/// FPRF class of a result; `single` classifies denormals against the single
/// precision range.
pub(crate) fn fprf_class(value: f64, single: bool) -> u32 {
    let min_normal = if single {
        f64::from(f32::MIN_POSITIVE)
    } else {
        f64::MIN_POSITIVE
    };
    let negative = value.is_sign_negative();

    if value.is_nan() {
        class::QNAN
    } else if value.is_infinite() {
        if negative {
            class::NEG_INF
        } else {
            class::POS_INF
        }
    } else if value == 0.0 {
        if negative {
            class::NEG_ZERO
        } else {
            class::POS_ZERO
        }
    } else if value.abs() < min_normal {
        if negative {
            class::NEG_DENORMAL
        } else {
            class::POS_DENORMAL
        }
    } else if negative {
        class::NEG_NORMAL
    } else {
        class::POS_NORMAL
    }
}

/// Recompute the VX and FEX summary bits.
#[inline]
pub(crate) fn update_summaries(fpscr: u32) -> u32 {
    let mut fpscr = fpscr & !(FPSCR_VX | FPSCR_FEX);
    if fpscr & FPSCR_VX_ALL != 0 {
        fpscr |= FPSCR_VX;
    }
    if (fpscr >> 22) & fpscr & 0xF8 != 0 {
        fpscr |= FPSCR_FEX;
    }
    fpscr
}

// ---------------------------------------------------------------------------
// Rounding
// ---------------------------------------------------------------------------

/// FPSCR[RN].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundingMode {
    Nearest,
    TowardZero,
    Up,
    Down,
}

impl RoundingMode {
    pub fn from_fpscr(fpscr: u32) -> Self {
        match fpscr & FPSCR_RN {
            0 => RoundingMode::Nearest,
            1 => RoundingMode::TowardZero,
            2 => RoundingMode::Up,
            _ => RoundingMode::Down,
        }
    }

    /// Mode that yields `-round(x)` when applied to `-x`.
    fn mirrored(self) -> Self {
        match self {
            RoundingMode::Up => RoundingMode::Down,
            RoundingMode::Down => RoundingMode::Up,
            other => other,
        }
    }
}

/// Result of a rounding step.
#[derive(Debug, Clone, Copy)]
struct Rounded {
    value: f64,
    inexact: bool,
    /// The delivered value is greater than the exact value.
    above: bool,
    overflow: bool,
}

/// Move a nearest-even result to the neighbour the mode selects.
///
/// `exact` orders the exact value relative to `rounded`.
fn direct(
    rounded: f64,
    exact: Ordering,
    mode: RoundingMode,
    up: fn(f64) -> f64,
    down: fn(f64) -> f64,
) -> Rounded {
    if exact == Ordering::Equal {
        return Rounded {
            value: rounded,
            inexact: false,
            above: false,
            overflow: false,
        };
    }
    let value = match (mode, exact) {
        (RoundingMode::Up, Ordering::Greater) => up(rounded),
        (RoundingMode::Down, Ordering::Less) => down(rounded),
        (RoundingMode::TowardZero, Ordering::Greater) if rounded < 0.0 => up(rounded),
        (RoundingMode::TowardZero, Ordering::Less) if rounded > 0.0 => down(rounded),
        _ => rounded,
    };
    let above = if value == rounded {
        exact == Ordering::Less
    } else {
        value > rounded
    };
    Rounded {
        value,
        inexact: true,
        above,
        overflow: value.is_infinite(),
    }
}

/// Result delivered for an exact value beyond `max` in magnitude.
fn overflow(positive: bool, mode: RoundingMode, max: f64) -> Rounded {
    let to_infinity = match mode {
        RoundingMode::Nearest => true,
        RoundingMode::TowardZero => false,
        RoundingMode::Up => positive,
        RoundingMode::Down => !positive,
    };
    let magnitude = if to_infinity { f64::INFINITY } else { max };
    let value = if positive { magnitude } else { -magnitude };
    Rounded {
        value,
        inexact: true,
        above: positive == to_infinity,
        overflow: true,
    }
}

/// Round a finite double to single precision under `mode`.
fn round_single(value: f64, mode: RoundingMode) -> Rounded {
    let narrowed = value as f32;
    if narrowed.is_infinite() {
        return overflow(value > 0.0, mode, f64::from(f32::MAX));
    }
    let widened = f64::from(narrowed);
    let exact = value.partial_cmp(&widened).unwrap_or(Ordering::Equal);
    direct(widened, exact, mode, step_up_single, step_down_single)
}

#[inline]
fn sign_of(residual: f64) -> Ordering {
    residual.partial_cmp(&0.0).unwrap_or(Ordering::Equal)
}

/// Error of `s = a + b` (Knuth two-sum).
#[inline]
fn two_sum(a: f64, b: f64, s: f64) -> f64 {
    let bb = s - a;
    (a - (s - bb)) + (b - bb)
}

fn sum(a: f64, b: f64) -> (f64, Ordering) {
    let s = a + b;
    if !s.is_finite() {
        return (s, Ordering::Equal);
    }
    (s, sign_of(two_sum(a, b, s)))
}

fn product(a: f64, b: f64) -> (f64, Ordering) {
    let p = a * b;
    if !p.is_finite() {
        return (p, Ordering::Equal);
    }
    (p, sign_of(a.mul_add(b, -p)))
}

fn quotient(a: f64, b: f64) -> (f64, Ordering) {
    let q = a / b;
    if !q.is_finite() || !b.is_finite() || a == 0.0 {
        return (q, Ordering::Equal);
    }
    let remainder = (-q).mul_add(b, a);
    let exact = if remainder == 0.0 {
        Ordering::Equal
    } else if (remainder > 0.0) == (b > 0.0) {
        Ordering::Greater
    } else {
        Ordering::Less
    };
    (q, exact)
}

fn root(a: f64) -> (f64, Ordering) {
    let s = a.sqrt();
    if !s.is_finite() || a == 0.0 {
        return (s, Ordering::Equal);
    }
    (s, sign_of((-s).mul_add(s, a)))
}

/// `a * c + b` with a single rounding. The residual sign is approximated
/// from the product and sum errors.
fn fused(a: f64, c: f64, b: f64) -> (f64, Ordering) {
    let r = a.mul_add(c, b);
    if !r.is_finite() || !a.is_finite() || !b.is_finite() || !c.is_finite() {
        return (r, Ordering::Equal);
    }
    let p = a * c;
    let product_error = a.mul_add(c, -p);
    let s = p + b;
    let sum_error = two_sum(p, b, s);
    (r, sign_of((s - r) + sum_error + product_error))
}

// ---------------------------------------------------------------------------
// Execution context
// ---------------------------------------------------------------------------

/// Arithmetic operations sharing the exception and rounding pipeline.
///
/// Operand roles follow the A-form: `a` is frA, `b` frB, `c` frC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Arith {
    Add,
    Sub,
    Mul,
    Div,
    Sqrt,
    MulAdd,
    MulSub,
    NegMulAdd,
    NegMulSub,
    Reciprocal,
    ReciprocalSqrt,
    RoundSingle,
}

/// Working copy of FPSCR for one instruction.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FpContext {
    fpscr: u32,
    raised: u32,
    mode: RoundingMode,
}

impl FpContext {
    pub(crate) fn new(fpscr: u32) -> Self {
        Self {
            fpscr,
            raised: 0,
            mode: RoundingMode::from_fpscr(fpscr),
        }
    }

    pub(crate) fn mode(&self) -> RoundingMode {
        self.mode
    }

    pub(crate) fn fpscr(&self) -> u32 {
        self.fpscr
    }

    /// Set sticky exception bits, raising FX on any new one.
    pub(crate) fn raise(&mut self, bits: u32) {
        if bits & !self.fpscr & EXCEPTION_BITS != 0 {
            self.fpscr |= FPSCR_FX;
        }
        self.fpscr |= bits;
        self.raised |= bits;
    }

    fn set_rounding(&mut self, fraction_rounded: bool, inexact: bool) {
        self.fpscr &= !(FPSCR_FR | FPSCR_FI);
        if fraction_rounded {
            self.fpscr |= FPSCR_FR;
        }
        if inexact {
            self.fpscr |= FPSCR_FI;
            self.raise(FPSCR_XX);
        }
    }

    fn clear_rounding(&mut self) {
        self.set_rounding(false, false);
    }

    pub(crate) fn set_fprf(&mut self, value: f64, single: bool) {
        self.fpscr = (self.fpscr & !FPSCR_FPRF) | (fprf_class(value, single) << 12);
    }

    pub(crate) fn set_fpcc(&mut self, field: u8) {
        self.fpscr = (self.fpscr & !FPSCR_FPCC) | (u32::from(field & 0xF) << 12);
    }

    /// The instruction raised an exception whose enable bit suppresses the
    /// target update.
    pub(crate) fn suppressed(&self) -> bool {
        (self.raised & FPSCR_VX_ALL != 0 && self.fpscr & FPSCR_VE != 0)
            || (self.raised & FPSCR_ZX != 0 && self.fpscr & FPSCR_ZE != 0)
    }

    /// Fail with a floating-point enabled trap when this instruction raised
    /// an enabled exception and MSR selects an exception mode.
    pub(crate) fn check_trap(&self, msr: u32) -> Result<(), Exception> {
        if msr & (MSR_FE0 | MSR_FE1) == 0 {
            return Ok(());
        }
        let mut summary = self.raised & (FPSCR_OX | FPSCR_UX | FPSCR_ZX | FPSCR_XX);
        if self.raised & FPSCR_VX_ALL != 0 {
            summary |= FPSCR_VX;
        }
        if (summary >> 22) & self.fpscr & 0xF8 != 0 {
            return Err(Exception::Trap(TrapReason::FloatingPointEnabled));
        }
        Ok(())
    }

    /// Write FPSCR back and, for record forms, copy FX/FEX/VX/OX to CR1.
    pub(crate) fn commit(self, regs: &mut RegisterFile, record: bool) {
        regs.fpscr = update_summaries(self.fpscr);
        if record {
            regs.set_cr_field(1, (regs.fpscr >> 28) as u8);
        }
    }

    /// Evaluate `op`, recording exceptions, FR and FI.
    pub(crate) fn compute(&mut self, op: Arith, a: f64, b: f64, c: f64, single: bool) -> f64 {
        let (operands, count) = match op {
            Arith::Add | Arith::Sub | Arith::Div => ([a, b, 0.0], 2),
            Arith::Mul => ([a, c, 0.0], 2),
            Arith::Sqrt | Arith::Reciprocal | Arith::ReciprocalSqrt | Arith::RoundSingle => {
                ([b, 0.0, 0.0], 1)
            }
            Arith::MulAdd | Arith::MulSub | Arith::NegMulAdd | Arith::NegMulSub => ([a, b, c], 3),
        };
        let operands = &operands[..count];

        if operands.iter().any(|&x| is_snan(x)) {
            self.raise(FPSCR_VXSNAN);
        }
        if let Some(&nan) = operands.iter().find(|x| x.is_nan()) {
            self.clear_rounding();
            let nan = quiet(nan);
            return if single { single_nan(nan) } else { nan };
        }
        if let Some(cause) = invalid_operation(op, a, b, c) {
            self.raise(cause);
            self.clear_rounding();
            return default_nan();
        }
        if let Some(infinity) = zero_divide(op, a, b) {
            self.raise(FPSCR_ZX);
            self.clear_rounding();
            return infinity;
        }

        if op == Arith::ReciprocalSqrt {
            // Estimate: no rounding state is reported.
            let estimate = 1.0 / b.sqrt();
            self.clear_rounding();
            return if single {
                f64::from(estimate as f32)
            } else {
                estimate
            };
        }

        let negate = matches!(op, Arith::NegMulAdd | Arith::NegMulSub);
        let mode = if negate {
            self.mode.mirrored()
        } else {
            self.mode
        };

        let (host, exact) = match op {
            Arith::Add => sum(a, b),
            Arith::Sub => sum(a, -b),
            Arith::Mul => product(a, c),
            Arith::Div => quotient(a, b),
            Arith::Reciprocal => quotient(1.0, b),
            Arith::Sqrt => root(b),
            Arith::MulAdd | Arith::NegMulAdd => fused(a, c, b),
            Arith::MulSub | Arith::NegMulSub => fused(a, c, -b),
            Arith::RoundSingle | Arith::ReciprocalSqrt => (b, Ordering::Equal),
        };

        let finite_inputs = operands.iter().all(|x| x.is_finite());
        let mut result = if host.is_infinite() && finite_inputs {
            overflow(host > 0.0, mode, f64::MAX)
        } else {
            let mut r = direct(host, exact, mode, step_up, step_down);
            r.overflow &= finite_inputs;
            r
        };

        if single && result.value.is_finite() {
            let narrowed = round_single(result.value, mode);
            if narrowed.inexact {
                result.value = narrowed.value;
                result.inexact = true;
                result.above = narrowed.above;
            }
            result.overflow |= narrowed.overflow;
        }

        if negate {
            result.value = -result.value;
            result.above = !result.above;
        }

        let value = result.value;
        let fraction_rounded = result.inexact
            && if value > 0.0 {
                result.above
            } else if value < 0.0 {
                !result.above
            } else {
                false
            };
        self.set_rounding(fraction_rounded, result.inexact);
        if result.overflow {
            self.raise(FPSCR_OX);
        }
        let min_normal = if single {
            f64::from(f32::MIN_POSITIVE)
        } else {
            f64::MIN_POSITIVE
        };
        if result.inexact && value.abs() < min_normal {
            self.raise(FPSCR_UX);
        }
        value
    }
}

/// Invalid-operation cause for non-NaN operands, if any.
fn invalid_operation(op: Arith, a: f64, b: f64, c: f64) -> Option<u32> {
    let both_infinite = |x: f64, y: f64| x.is_infinite() && y.is_infinite();
    let zero_times_infinity = |x: f64, y: f64| (x == 0.0 && y.is_infinite()) || (x.is_infinite() && y == 0.0);

    match op {
        Arith::Add if both_infinite(a, b) && a.is_sign_negative() != b.is_sign_negative() => {
            Some(FPSCR_VXISI)
        }
        Arith::Sub if both_infinite(a, b) && a.is_sign_negative() == b.is_sign_negative() => {
            Some(FPSCR_VXISI)
        }
        Arith::Mul if zero_times_infinity(a, c) => Some(FPSCR_VXIMZ),
        Arith::Div if a == 0.0 && b == 0.0 => Some(FPSCR_VXZDZ),
        Arith::Div if both_infinite(a, b) => Some(FPSCR_VXIDI),
        Arith::Sqrt | Arith::ReciprocalSqrt if b < 0.0 => Some(FPSCR_VXSQRT),
        Arith::MulAdd | Arith::MulSub | Arith::NegMulAdd | Arith::NegMulSub => {
            if zero_times_infinity(a, c) {
                return Some(FPSCR_VXIMZ);
            }
            let product_infinite = a.is_infinite() || c.is_infinite();
            if product_infinite && b.is_infinite() {
                let product_negative = a.is_sign_negative() != c.is_sign_negative();
                let subtract = matches!(op, Arith::MulSub | Arith::NegMulSub);
                let addend_negative = b.is_sign_negative() != subtract;
                if product_negative != addend_negative {
                    return Some(FPSCR_VXISI);
                }
            }
            None
        }
        _ => None,
    }
}

/// Signed infinity for a division of a finite value by zero.
fn zero_divide(op: Arith, a: f64, b: f64) -> Option<f64> {
    if b != 0.0 {
        return None;
    }
    let negative = match op {
        Arith::Div if a.is_finite() => a.is_sign_negative() != b.is_sign_negative(),
        Arith::Reciprocal | Arith::ReciprocalSqrt => b.is_sign_negative(),
        _ => return None,
    };
    Some(if negative {
        f64::NEG_INFINITY
    } else {
        f64::INFINITY
    })
}

/// Four-bit compare result: FL, FG, FE, FU.
pub(crate) fn compare_field(a: f64, b: f64) -> u8 {
    match a.partial_cmp(&b) {
        Some(Ordering::Less) => 0b1000,
        Some(Ordering::Greater) => 0b0100,
        Some(Ordering::Equal) => 0b0010,
        None => 0b0001,
    }
}

/// Shared body of `fcmpu`/`fcmpo` and the paired-single compares.
pub(crate) fn compare_into(regs: &mut RegisterFile, crf: u8, a: f64, b: f64, ordered: bool) -> Outcome {
    let mut ctx = FpContext::new(regs.fpscr);
    let field = compare_field(a, b);

    if is_snan(a) || is_snan(b) {
        ctx.raise(FPSCR_VXSNAN);
        if ordered && ctx.fpscr() & FPSCR_VE == 0 {
            ctx.raise(FPSCR_VXVC);
        }
    } else if ordered && (a.is_nan() || b.is_nan()) {
        ctx.raise(FPSCR_VXVC);
    }

    ctx.check_trap(regs.msr)?;
    ctx.set_fpcc(field);
    regs.set_cr_field(crf, field);
    ctx.commit(regs, false);
    Ok(Flow::Continue)
}

// ---------------------------------------------------------------------------
// Arithmetic handlers
// ---------------------------------------------------------------------------

fn arith<const SINGLE: bool>(regs: &mut RegisterFile, instr: &Instruction, op: Arith) -> Outcome {
    let a = regs.fpr(instr.ra);
    let b = regs.fpr(instr.rb);
    let c = regs.fpr(instr.rc_field());

    let mut ctx = FpContext::new(regs.fpscr);
    let value = ctx.compute(op, a, b, c, SINGLE);
    ctx.check_trap(regs.msr)?;

    if !ctx.suppressed() {
        ctx.set_fprf(value, SINGLE);
        if SINGLE {
            regs.set_ps(instr.rd, value, value);
        } else {
            regs.set_fpr(instr.rd, value);
        }
    }
    ctx.commit(regs, instr.rc());
    Ok(Flow::Continue)
}

pub(crate) fn fadd<const SINGLE: bool>(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    arith::<SINGLE>(regs, instr, Arith::Add)
}

pub(crate) fn fsub<const SINGLE: bool>(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    arith::<SINGLE>(regs, instr, Arith::Sub)
}

pub(crate) fn fmul<const SINGLE: bool>(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    arith::<SINGLE>(regs, instr, Arith::Mul)
}

pub(crate) fn fdiv<const SINGLE: bool>(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    arith::<SINGLE>(regs, instr, Arith::Div)
}

pub(crate) fn fsqrt<const SINGLE: bool>(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    arith::<SINGLE>(regs, instr, Arith::Sqrt)
}

pub(crate) fn fmadd<const SINGLE: bool>(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    arith::<SINGLE>(regs, instr, Arith::MulAdd)
}

pub(crate) fn fmsub<const SINGLE: bool>(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    arith::<SINGLE>(regs, instr, Arith::MulSub)
}

pub(crate) fn fnmadd<const SINGLE: bool>(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    arith::<SINGLE>(regs, instr, Arith::NegMulAdd)
}

pub(crate) fn fnmsub<const SINGLE: bool>(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    arith::<SINGLE>(regs, instr, Arith::NegMulSub)
}

pub(crate) fn fres(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    arith::<true>(regs, instr, Arith::Reciprocal)
}

pub(crate) fn frsqrte(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    arith::<false>(regs, instr, Arith::ReciprocalSqrt)
}

/// Round to single precision. Like the single-precision arithmetic, the
/// rounded value fills both paired-single slots.
pub(crate) fn frsp(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let b = regs.fpr(instr.rb);
    let mut ctx = FpContext::new(regs.fpscr);
    let value = ctx.compute(Arith::RoundSingle, 0.0, b, 0.0, true);
    ctx.check_trap(regs.msr)?;

    if !ctx.suppressed() {
        ctx.set_fprf(value, true);
        regs.set_ps(instr.rd, value, value);
    }
    ctx.commit(regs, instr.rc());
    Ok(Flow::Continue)
}

pub(crate) fn fsel(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let a = regs.fpr(instr.ra);
    let value = if a >= 0.0 {
        regs.fpr(instr.rc_field())
    } else {
        regs.fpr(instr.rb)
    };
    regs.set_fpr(instr.rd, value);
    if instr.rc() {
        regs.set_cr_field(1, (regs.fpscr >> 28) as u8);
    }
    Ok(Flow::Continue)
}

// ---------------------------------------------------------------------------
// Conversion to integer
// ---------------------------------------------------------------------------

fn round_to_integer(value: f64, mode: RoundingMode) -> f64 {
    match mode {
        RoundingMode::Nearest => value.round_ties_even(),
        RoundingMode::TowardZero => value.trunc(),
        RoundingMode::Up => value.ceil(),
        RoundingMode::Down => value.floor(),
    }
}

fn convert_to_integer(regs: &mut RegisterFile, instr: &Instruction, truncate: bool) -> Outcome {
    let b = regs.fpr(instr.rb);
    let mut ctx = FpContext::new(regs.fpscr);
    let mode = if truncate {
        RoundingMode::TowardZero
    } else {
        ctx.mode()
    };

    let result = if b.is_nan() {
        if is_snan(b) {
            ctx.raise(FPSCR_VXSNAN);
        }
        ctx.raise(FPSCR_VXCVI);
        ctx.clear_rounding();
        0x8000_0000
    } else {
        let rounded = round_to_integer(b, mode);
        if rounded > f64::from(i32::MAX) {
            ctx.raise(FPSCR_VXCVI);
            ctx.clear_rounding();
            0x7FFF_FFFF
        } else if rounded < f64::from(i32::MIN) {
            ctx.raise(FPSCR_VXCVI);
            ctx.clear_rounding();
            0x8000_0000
        } else {
            ctx.set_rounding(rounded.abs() > b.abs(), rounded != b);
            rounded as i32 as u32
        }
    };

    ctx.check_trap(regs.msr)?;
    if !ctx.suppressed() {
        regs.set_fpr(instr.rd, f64::from_bits(INTEGER_RESULT_HIGH | u64::from(result)));
    }
    ctx.commit(regs, instr.rc());
    Ok(Flow::Continue)
}

pub(crate) fn fctiw(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    convert_to_integer(regs, instr, false)
}

pub(crate) fn fctiwz(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    convert_to_integer(regs, instr, true)
}

// ---------------------------------------------------------------------------
// Moves
// ---------------------------------------------------------------------------

fn move_bits(regs: &mut RegisterFile, instr: &Instruction, op: impl Fn(u64) -> u64) -> Outcome {
    let bits = op(regs.fpr(instr.rb).to_bits());
    regs.set_fpr(instr.rd, f64::from_bits(bits));
    if instr.rc() {
        regs.set_cr_field(1, (regs.fpscr >> 28) as u8);
    }
    Ok(Flow::Continue)
}

pub(crate) fn fmr(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    move_bits(regs, instr, |bits| bits)
}

pub(crate) fn fneg(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    move_bits(regs, instr, |bits| bits ^ DOUBLE_SIGN)
}

pub(crate) fn fabs(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    move_bits(regs, instr, |bits| bits & !DOUBLE_SIGN)
}

pub(crate) fn fnabs(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    move_bits(regs, instr, |bits| bits | DOUBLE_SIGN)
}

// ---------------------------------------------------------------------------
// Compares
// ---------------------------------------------------------------------------

pub(crate) fn fcmpu(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let (a, b) = (regs.fpr(instr.ra), regs.fpr(instr.rb));
    compare_into(regs, instr.crf_d(), a, b, false)
}

pub(crate) fn fcmpo(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let (a, b) = (regs.fpr(instr.ra), regs.fpr(instr.rb));
    compare_into(regs, instr.crf_d(), a, b, true)
}

// ---------------------------------------------------------------------------
// FPSCR access
// ---------------------------------------------------------------------------

fn commit_fpscr(regs: &mut RegisterFile, instr: &Instruction, fpscr: u32) -> Outcome {
    regs.fpscr = update_summaries(fpscr);
    if instr.rc() {
        regs.set_cr_field(1, (regs.fpscr >> 28) as u8);
    }
    Ok(Flow::Continue)
}

pub(crate) fn mffs(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let bits = INTEGER_RESULT_HIGH | u64::from(regs.fpscr);
    regs.set_fpr(instr.rd, f64::from_bits(bits));
    if instr.rc() {
        regs.set_cr_field(1, (regs.fpscr >> 28) as u8);
    }
    Ok(Flow::Continue)
}

pub(crate) fn mtfsf(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let fm = instr.fm();
    let mask = (0..8u32)
        .filter(|field| fm & (0x80 >> field) != 0)
        .fold(0u32, |mask, field| mask | (0xF000_0000 >> (4 * field)));
    let source = regs.fpr(instr.rb).to_bits() as u32;
    let fpscr = (regs.fpscr & !mask) | (source & mask);
    commit_fpscr(regs, instr, fpscr)
}

pub(crate) fn mtfsfi(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let shift = 28 - 4 * u32::from(instr.crf_d());
    let fpscr = (regs.fpscr & !(0xF << shift)) | (u32::from(instr.fpscr_imm()) << shift);
    commit_fpscr(regs, instr, fpscr)
}

pub(crate) fn mtfsb0(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let bit = 0x8000_0000u32 >> instr.rd;
    commit_fpscr(regs, instr, regs.fpscr & !bit)
}

pub(crate) fn mtfsb1(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let bit = 0x8000_0000u32 >> instr.rd;
    let mut ctx = FpContext::new(regs.fpscr);
    if bit & EXCEPTION_BITS != 0 {
        ctx.raise(bit);
    } else {
        ctx.fpscr |= bit;
    }
    commit_fpscr(regs, instr, ctx.fpscr())
}

pub(crate) fn mcrfs(regs: &mut RegisterFile, instr: &Instruction, _bus: &mut dyn MemoryBus) -> Outcome {
    let shift = 28 - 4 * u32::from(instr.crf_s());
    let field = ((regs.fpscr >> shift) & 0xF) as u8;
    regs.set_cr_field(instr.crf_d(), field);
    let cleared = regs.fpscr & !((0xF << shift) & MCRFS_CLEARABLE);
    regs.fpscr = update_summaries(cleared);
    Ok(Flow::Continue)
}
