// Tests for single-instruction execution
mod utils;

use gcemu_core::cpu::exec::float::{FPSCR_VXCVI, FPSCR_ZX};
use gcemu_core::cpu::registers::{spr, XER_CA, XER_OV, XER_SO};
use gcemu_core::cpu::{AccessKind, BusExt, ExecutionResult, FaultCause, TrapReason};
use utils::*;

fn expected_field(a: i64, b: i64, so: bool) -> u8 {
    let field = match a.cmp(&b) {
        std::cmp::Ordering::Less => 0b1000,
        std::cmp::Ordering::Greater => 0b0100,
        std::cmp::Ordering::Equal => 0b0010,
    };
    field | u8::from(so)
}

fn psq(op: u32, frd: u8, ra: u8, w: bool, i: u8, offset: i16) -> u32 {
    (op << 26)
        | (u32::from(frd) << 21)
        | (u32::from(ra) << 16)
        | (u32::from(w) << 15)
        | (u32::from(i) << 12)
        | (offset as u32 & 0xFFF)
}

fn mftb(rd: u8, tbr: u16) -> u32 {
    mfspr(rd, tbr) & !(0x3FF << 1) | (371 << 1)
}

// ---------------------------------------------------------------------------
// Integer arithmetic
// ---------------------------------------------------------------------------

#[test]
fn test_add_plain_leaves_xer_alone() {
    let mut regs = mock_registers(&[(3, 0x7FFF_FFFF), (4, 1)]);
    assert_eq!(exec_fresh(&mut regs, add(5, 3, 4)), ExecutionResult::Continue);
    assert_eq!(regs.gpr(5), 0x8000_0000);
    assert_eq!(regs.xer, 0);
    assert_eq!(regs.cr, 0);
}

#[test]
fn test_overflow_boundaries() {
    // (ext, rA, rB, expected result)
    let cases: &[(u32, u32, u32, u32)] = &[
        (266, 0x7FFF_FFFF, 1, 0x8000_0000),      // addo
        (40, 1, 0x8000_0000, 0x7FFF_FFFF),       // subfo: rB - rA
        (40, 0x8000_0000, 0, 0x8000_0000),       // subfo: 0 - MIN
        (104, 0x8000_0000, 0, 0x8000_0000),      // nego
        (235, 0x0001_0000, 0x0001_0000, 0),      // mullwo
        (491, 0x8000_0000, 0xFFFF_FFFF, u32::MAX), // divwo MIN / -1
        (491, 5, 0, 0),                          // divwo by zero
        (459, 5, 0, 0),                          // divwuo by zero
    ];
    for &(ext, a, b, expected) in cases {
        let mut regs = mock_registers(&[(3, a), (4, b)]);
        exec_fresh(&mut regs, xo_form(5, 3, 4, ext, true, false));
        assert_eq!(regs.gpr(5), expected, "ext {ext}: 0x{a:08X}, 0x{b:08X}");
        assert_eq!(regs.xer & (XER_OV | XER_SO), XER_OV | XER_SO, "ext {ext}: OV and SO");
    }
}

/// Expected result, carry out and overflow of an XO-form operation, computed
/// in 64 bits. The result is `None` where the hardware leaves it undefined and
/// the carry is `None` where CA is left alone.
fn wide_reference(ext: u32, a: u32, b: u32, ca: bool) -> (Option<u32>, Option<bool>, bool) {
    let (sa, sb) = (i64::from(a as i32), i64::from(b as i32));
    let (ua, ub) = (u64::from(a), u64::from(b));
    let (c, cu) = (i64::from(ca), u64::from(ca));
    let max = u64::from(u32::MAX);
    let signed = |value: i64, carry: Option<bool>| {
        (Some(value as u32), carry, i32::try_from(value).is_err())
    };
    match ext {
        266 => signed(sa + sb, None),
        10 => signed(sa + sb, Some(ua + ub > max)),
        138 => signed(sa + sb + c, Some(ua + ub + cu > max)),
        234 => signed(sa - 1 + c, Some(ua + max + cu > max)),
        202 => signed(sa + c, Some(ua + cu > max)),
        40 => signed(sb - sa, None),
        8 => signed(sb - sa, Some(ub >= ua)),
        136 => signed(sb - sa - 1 + c, Some(ub + cu > ua)),
        232 => signed(-sa - 2 + c, Some(!(a == u32::MAX && !ca))),
        200 => signed(-sa - 1 + c, Some(a == 0 && ca)),
        104 => signed(-sa, None),
        235 => signed(sa * sb, None),
        491 if sb == 0 || (sa == i64::from(i32::MIN) && sb == -1) => (None, None, true),
        491 => signed(sa / sb, None),
        459 if ub == 0 => (None, None, true),
        459 => (Some((ua / ub) as u32), None, false),
        _ => unreachable!("ext {ext}"),
    }
}

#[test]
fn test_overflow_and_carry_match_wide_reference() {
    const EXTS: [u32; 14] = [266, 10, 138, 234, 202, 40, 8, 136, 232, 200, 104, 235, 491, 459];

    let mut rng = XorShift::new(0x5EED_CA55);
    let mut operands: Vec<(u32, u32)> = BOUNDARY
        .iter()
        .flat_map(|&a| BOUNDARY.iter().map(move |&b| (a, b)))
        .collect();
    operands.extend((0..200).map(|_| (rng.next_u32(), rng.next_u32())));

    let mut ram = mock_ram();
    for ext in EXTS {
        for &(a, b) in &operands {
            for ca in [false, true] {
                let (result, carry, overflow) = wide_reference(ext, a, b, ca);
                let context = format!("ext {ext}: 0x{a:08X}, 0x{b:08X}, CA {ca}");

                for oe in [false, true] {
                    let mut regs = mock_registers(&[(3, a), (4, b)]);
                    regs.xer = if ca { XER_CA } else { 0 };
                    exec(&mut regs, &mut ram, xo_form(5, 3, 4, ext, oe, false));

                    if let Some(result) = result {
                        assert_eq!(regs.gpr(5), result, "{context}: result");
                    }
                    let expected_ov = oe && overflow;
                    assert_eq!(regs.xer & XER_OV != 0, expected_ov, "{context}, OE {oe}: OV");
                    assert_eq!(regs.xer & XER_SO != 0, expected_ov, "{context}, OE {oe}: SO");
                    assert_eq!(regs.xer_ca(), carry.unwrap_or(ca), "{context}, OE {oe}: CA");
                }
            }
        }
    }
}

#[test]
fn test_summary_overflow_is_sticky() {
    let mut regs = mock_registers(&[(3, 0x7FFF_FFFF), (4, 1)]);
    let mut ram = mock_ram();
    exec(&mut regs, &mut ram, xo_form(5, 3, 4, 266, true, false));
    assert_eq!(regs.xer & XER_OV, XER_OV);

    regs.set_gpr(3, 1);
    exec(&mut regs, &mut ram, xo_form(5, 3, 4, 266, true, true));
    assert_eq!(regs.gpr(5), 2);
    assert_eq!(regs.xer & XER_OV, 0, "OV reflects the last result");
    assert_eq!(regs.xer & XER_SO, XER_SO, "SO stays set");
    // CR0: positive result with SO copied in
    assert_eq!(regs.cr_field(0), 0b0101);
}

#[test]
fn test_record_form_sets_cr0() {
    const CR_BEFORE: u32 = 0x0123_4567;
    let rlwinm: u32 = (21 << 26) | (3 << 21) | (5 << 16) | (8 << 11) | (16 << 6) | (31 << 1) | 1;
    // Each form writes r5 from r3 and r4
    let forms: [(&str, u32, fn(u32, u32) -> u32); 14] = [
        ("add.", xo_form(5, 3, 4, 266, false, true), |a, b| a.wrapping_add(b)),
        ("subf.", xo_form(5, 3, 4, 40, false, true), |a, b| b.wrapping_sub(a)),
        ("neg.", xo_form(5, 3, 0, 104, false, true), |a, _| a.wrapping_neg()),
        ("mullw.", xo_form(5, 3, 4, 235, false, true), |a, b| a.wrapping_mul(b)),
        ("addic.", d_form(13, 5, 3, -1), |a, _| a.wrapping_sub(1)),
        ("and.", x_form(31, 3, 5, 4, 28, true), |a, b| a & b),
        ("or.", x_form(31, 3, 5, 4, 444, true), |a, b| a | b),
        ("xor.", x_form(31, 3, 5, 4, 316, true), |a, b| a ^ b),
        ("slw.", x_form(31, 3, 5, 4, 24, true), |a, b| a.checked_shl(b & 0x3F).unwrap_or(0)),
        ("extsh.", x_form(31, 3, 5, 0, 922, true), |a, _| a as u16 as i16 as i32 as u32),
        ("cntlzw.", x_form(31, 3, 5, 0, 26, true), |a, _| a.leading_zeros()),
        ("srawi.", x_form(31, 3, 5, 4, 824, true), |a, _| ((a as i32) >> 4) as u32),
        ("rlwinm.", rlwinm, |a, _| a.rotate_left(8) & 0xFFFF),
        ("andi.", d_form(28, 3, 5, 0x0F0F), |a, _| a & 0x0F0F),
    ];

    let mut ram = mock_ram();
    for (name, word, op) in forms {
        for so in [false, true] {
            for &a in &BOUNDARY {
                for &b in &BOUNDARY {
                    let mut regs = mock_registers(&[(3, a), (4, b)]);
                    regs.xer = if so { XER_SO } else { 0 };
                    regs.cr = CR_BEFORE;
                    exec(&mut regs, &mut ram, word);

                    let result = op(a, b);
                    let context = format!("{name} 0x{a:08X}, 0x{b:08X}, SO {so}");
                    assert_eq!(regs.gpr(5), result, "{context}");
                    assert_eq!(
                        regs.cr_field(0),
                        expected_field(i64::from(result as i32), 0, so),
                        "{context}: CR0"
                    );
                    assert_eq!(regs.cr & 0x0FFF_FFFF, CR_BEFORE & 0x0FFF_FFFF, "{context}: CR1-7");
                }
            }
        }
    }
}

#[test]
fn test_carrying_add() {
    let mut regs = mock_registers(&[(3, 0xFFFF_FFFF), (4, 1)]);
    let mut ram = mock_ram();
    // addc r5, r3, r4
    exec(&mut regs, &mut ram, xo_form(5, 3, 4, 10, false, false));
    assert_eq!(regs.gpr(5), 0);
    assert!(regs.xer_ca());
    // adde r6, r0, r0 picks the carry up
    exec(&mut regs, &mut ram, xo_form(6, 0, 0, 138, false, false));
    assert_eq!(regs.gpr(6), 1);
    assert!(!regs.xer_ca());
}

#[test]
fn test_signed_and_unsigned_compares() {
    for &a in &BOUNDARY {
        for &b in &BOUNDARY {
            let mut regs = mock_registers(&[(3, a), (4, b)]);
            let mut ram = mock_ram();
            // cmp cr2, r3, r4
            exec(&mut regs, &mut ram, x_form(31, 2 << 2, 3, 4, 0, false));
            // cmpl cr7, r3, r4
            exec(&mut regs, &mut ram, x_form(31, 7 << 2, 3, 4, 32, false));
            assert_eq!(
                regs.cr_field(2),
                expected_field(i64::from(a as i32), i64::from(b as i32), false),
                "cmp 0x{a:08X}, 0x{b:08X}"
            );
            assert_eq!(
                regs.cr_field(7),
                expected_field(i64::from(a), i64::from(b), false),
                "cmpl 0x{a:08X}, 0x{b:08X}"
            );
        }
    }
}

#[test]
fn test_compare_copies_summary_overflow() {
    let mut regs = mock_registers(&[(3, 5)]);
    regs.xer = XER_SO;
    exec_fresh(&mut regs, cmpwi(0, 3, 5));
    assert_eq!(regs.cr_field(0), 0b0011);
}

#[test]
fn test_rotate_and_mask() {
    // rlwinm r4, r3, 8, 24, 31: extract the top byte
    let word = (21 << 26) | (3 << 21) | (4 << 16) | (8 << 11) | (24 << 6) | (31 << 1);
    let mut regs = mock_registers(&[(3, 0xAB12_3456)]);
    exec_fresh(&mut regs, word);
    assert_eq!(regs.gpr(4), 0xAB);
}

#[test]
fn test_shift_right_algebraic_immediate() {
    // srawi r4, r3, 4
    let mut regs = mock_registers(&[(3, 0xFFFF_FF01)]);
    exec_fresh(&mut regs, x_form(31, 3, 4, 4, 824, false));
    assert_eq!(regs.gpr(4), 0xFFFF_FFF0);
    assert!(regs.xer_ca(), "ones shifted out of a negative value set CA");
}

#[test]
fn test_trap_instructions() {
    // tw 31, r0, r0 always traps
    let mut regs = mock_registers(&[]);
    assert_eq!(
        exec_fresh(&mut regs, x_form(31, 31, 0, 0, 4, false)),
        ExecutionResult::Trap(TrapReason::TrapInstruction)
    );
    // twi eq, r3, 1 with r3 = 2 does not
    let mut regs = mock_registers(&[(3, 2)]);
    assert_eq!(exec_fresh(&mut regs, d_form(3, 4, 3, 1)), ExecutionResult::Continue);
}

// ---------------------------------------------------------------------------
// Loads and stores
// ---------------------------------------------------------------------------

#[test]
fn test_store_then_load_round_trip() {
    let mut ram = mock_ram();
    let mut regs = mock_registers(&[(3, 0xDEAD_BEEF), (4, DATA)]);
    exec(&mut regs, &mut ram, stw(3, 4, 8));
    assert_eq!(ram.read_u32(DATA + 8).unwrap(), 0xDEAD_BEEF);

    exec(&mut regs, &mut ram, lwz(5, 4, 8));
    assert_eq!(regs.gpr(5), 0xDEAD_BEEF);

    // Loading then storing a value leaves memory unchanged
    let before = ram.slice(DATA, 16).unwrap().to_vec();
    exec(&mut regs, &mut ram, lwz(6, 4, 4));
    exec(&mut regs, &mut ram, stw(6, 4, 4));
    assert_eq!(ram.slice(DATA, 16).unwrap(), &before[..]);
}

#[test]
fn test_halfword_and_byte_loads() {
    let mut ram = mock_ram();
    ram.load(DATA, &[0x80, 0x01, 0xFF]).unwrap();
    let mut regs = mock_registers(&[(4, DATA)]);

    exec(&mut regs, &mut ram, d_form(40, 5, 4, 0)); // lhz
    exec(&mut regs, &mut ram, d_form(42, 6, 4, 0)); // lha
    exec(&mut regs, &mut ram, d_form(34, 7, 4, 2)); // lbz
    assert_eq!(regs.gpr(5), 0x8001);
    assert_eq!(regs.gpr(6), 0xFFFF_8001);
    assert_eq!(regs.gpr(7), 0xFF);
}

#[test]
fn test_ra_zero_means_literal_zero() {
    let mut ram = mock_ram();
    let mut regs = mock_registers(&[(0, 0x1234)]);
    // addi r3, 0, 5 ignores r0
    exec(&mut regs, &mut ram, addi(3, 0, 5));
    assert_eq!(regs.gpr(3), 5);
}

#[test]
fn test_update_form_writes_back_address() {
    let mut ram = mock_ram();
    ram.write_u32(DATA + 4, 77).unwrap();
    let mut regs = mock_registers(&[(4, DATA)]);
    // lwzu r3, 4(r4)
    assert_eq!(exec(&mut regs, &mut ram, d_form(33, 3, 4, 4)), ExecutionResult::Continue);
    assert_eq!(regs.gpr(3), 77);
    assert_eq!(regs.gpr(4), DATA + 4);
}

#[test]
fn test_invalid_update_forms() {
    let mut ram = mock_ram();
    let regs = mock_registers(&[(3, DATA), (4, DATA)]);
    // lwzu r3, 0(r0), lwzu r3, 0(r3), stwu r3, 0(r0)
    for word in [d_form(33, 3, 0, 0), d_form(33, 3, 3, 0), d_form(37, 3, 0, 0)] {
        let mut after = regs.clone();
        assert_eq!(
            exec(&mut after, &mut ram, word),
            ExecutionResult::IllegalInstruction,
            "0x{word:08X}"
        );
        assert_registers_equal(&regs, &after, "invalid form must not commit");
    }
}

#[test]
fn test_fault_leaves_registers_unchanged() {
    let mut ram = mock_ram();
    let regs = mock_registers(&[(4, 0x1000)]);
    let mut after = regs.clone();
    // lwzu r3, 0(r4) with r4 unmapped
    match exec(&mut after, &mut ram, d_form(33, 3, 4, 0)) {
        ExecutionResult::MemoryFault(fault) => {
            assert_eq!(fault.address, 0x1000);
            assert_eq!(fault.kind, AccessKind::Load);
            assert_eq!(fault.cause, FaultCause::Unmapped);
        }
        other => panic!("expected a memory fault, got {other:?}"),
    }
    assert_registers_equal(&regs, &after, "faulting load");
}

#[test]
fn test_load_multiple_is_atomic_on_fault() {
    let mut ram = mock_ram();
    // Four words starting two words before the end of RAM
    let end = BASE + RAM_SIZE as u32;
    let regs = mock_registers(&[(3, end - 8), (28, 1), (29, 2), (30, 3), (31, 4)]);
    let mut after = regs.clone();
    let result = exec(&mut after, &mut ram, d_form(46, 28, 3, 0));
    assert!(matches!(result, ExecutionResult::MemoryFault(_)), "{result:?}");
    assert_registers_equal(&regs, &after, "partial lmw");
}

#[test]
fn test_load_and_store_multiple() {
    let mut ram = mock_ram();
    for (i, value) in [0x11u32, 0x22, 0x33].iter().enumerate() {
        ram.write_u32(DATA + 4 * i as u32, *value).unwrap();
    }
    let mut regs = mock_registers(&[(3, DATA)]);
    // lmw r29, 0(r3)
    exec(&mut regs, &mut ram, d_form(46, 29, 3, 0));
    assert_eq!((regs.gpr(29), regs.gpr(30), regs.gpr(31)), (0x11, 0x22, 0x33));

    // stmw r30, 0x20(r3)
    exec(&mut regs, &mut ram, d_form(47, 30, 3, 0x20));
    assert_eq!(ram.read_u32(DATA + 0x20).unwrap(), 0x22);
    assert_eq!(ram.read_u32(DATA + 0x24).unwrap(), 0x33);
    assert_eq!(ram.read_u32(DATA + 0x28).unwrap(), 0);

    // rA inside the loaded range
    let mut regs = mock_registers(&[(30, DATA)]);
    assert_eq!(exec(&mut regs, &mut ram, d_form(46, 29, 30, 0)), ExecutionResult::IllegalInstruction);
}

#[test]
fn test_load_multiple_with_r0_base() {
    let mut ram = mock_ram();
    // lmw r0, 0(r0): r0 is both base and the first destination
    let regs = mock_registers(&[(0, 0x1234), (31, 0x5678)]);
    let mut after = regs.clone();
    assert_eq!(exec(&mut after, &mut ram, d_form(46, 0, 0, 0)), ExecutionResult::IllegalInstruction);
    assert_registers_equal(&regs, &after, "lmw r0, 0(r0)");

    // lmw r1, 0x100(r0) reads the literal address, which is unmapped here
    let mut regs = mock_registers(&[]);
    let result = exec(&mut regs, &mut ram, d_form(46, 1, 0, 0x100));
    assert!(matches!(result, ExecutionResult::MemoryFault(_)), "{result:?}");
}

#[test]
fn test_load_string_immediate() {
    let mut ram = mock_ram();
    ram.load(DATA, b"abcdef").unwrap();
    let mut regs = mock_registers(&[(3, DATA), (6, 0xFFFF_FFFF)]);
    // lswi r5, r3, 6
    exec(&mut regs, &mut ram, x_form(31, 5, 3, 6, 597, false));
    assert_eq!(regs.gpr(5), u32::from_be_bytes(*b"abcd"));
    assert_eq!(regs.gpr(6), 0x6566_0000, "last register is zero-padded");

    // stswi r5, r3, 5 at a fresh address
    regs.set_gpr(3, DATA + 0x40);
    exec(&mut regs, &mut ram, x_form(31, 5, 3, 5, 725, false));
    assert_eq!(ram.slice(DATA + 0x40, 6).unwrap(), b"abcde\0");
}

#[test]
fn test_byte_reversed_load() {
    let mut ram = mock_ram();
    ram.write_u32(DATA, 0x1122_3344).unwrap();
    let mut regs = mock_registers(&[(4, DATA)]);
    // lwbrx r3, 0, r4
    exec(&mut regs, &mut ram, x_form(31, 3, 0, 4, 534, false));
    assert_eq!(regs.gpr(3), 0x4433_2211);
}

#[test]
fn test_reservation_pair() {
    let mut ram = mock_ram();
    ram.write_u32(DATA, 10).unwrap();
    let mut regs = mock_registers(&[(4, DATA), (5, 11)]);

    // lwarx r3, 0, r4
    exec(&mut regs, &mut ram, x_form(31, 3, 0, 4, 20, false));
    assert_eq!(regs.gpr(3), 10);
    assert_eq!(regs.reservation, Some(DATA));

    // stwcx. r5, 0, r4 succeeds once
    exec(&mut regs, &mut ram, x_form(31, 5, 0, 4, 150, true));
    assert_eq!(ram.read_u32(DATA).unwrap(), 11);
    assert_eq!(regs.cr_field(0), 0b0010);
    assert_eq!(regs.reservation, None);

    // and fails without a new reservation
    regs.set_gpr(5, 12);
    exec(&mut regs, &mut ram, x_form(31, 5, 0, 4, 150, true));
    assert_eq!(ram.read_u32(DATA).unwrap(), 11);
    assert_eq!(regs.cr_field(0), 0);
}

#[test]
fn test_misaligned_reservation_faults() {
    let mut regs = mock_registers(&[(4, DATA + 2)]);
    match exec_fresh(&mut regs, x_form(31, 3, 0, 4, 20, false)) {
        ExecutionResult::MemoryFault(fault) => assert_eq!(fault.cause, FaultCause::Misaligned),
        other => panic!("expected a misaligned fault, got {other:?}"),
    }
}

#[test]
fn test_dcbz_clears_cache_line() {
    let mut ram = mock_ram();
    ram.load(DATA, &[0xFF; 64]).unwrap();
    let mut regs = mock_registers(&[(3, DATA + 0x13)]);
    // dcbz 0, r3
    exec(&mut regs, &mut ram, x_form(31, 0, 0, 3, 1014, false));
    assert!(ram.slice(DATA, 32).unwrap().iter().all(|&b| b == 0));
    assert!(ram.slice(DATA + 32, 32).unwrap().iter().all(|&b| b == 0xFF));
}

// ---------------------------------------------------------------------------
// Branches
// ---------------------------------------------------------------------------

#[test]
fn test_branch_and_link() {
    let mut regs = mock_registers(&[]);
    assert_eq!(
        exec_fresh(&mut regs, branch(0x100, false, true)),
        ExecutionResult::Branch(BASE + 0x100)
    );
    assert_eq!(regs.lr, BASE + 4);
    assert_eq!(regs.pc, BASE, "execute never moves the PC");

    // Absolute, backwards
    let mut regs = mock_registers(&[]);
    assert_eq!(exec_fresh(&mut regs, branch(-4, true, false)), ExecutionResult::Branch(0xFFFF_FFFC));
}

#[test]
fn test_link_written_when_not_taken() {
    let mut regs = mock_registers(&[]);
    // bcl if EQ, with EQ clear
    assert_eq!(
        exec_fresh(&mut regs, bc(BO_TRUE, EQ, 0x40, false, true)),
        ExecutionResult::Continue
    );
    assert_eq!(regs.lr, BASE + 4);

    regs.set_cr_bit(EQ, true);
    assert_eq!(
        exec_fresh(&mut regs, bc(BO_TRUE, EQ, 0x40, false, false)),
        ExecutionResult::Branch(BASE + 0x40)
    );
    assert_eq!(
        exec_fresh(&mut regs, bc(BO_FALSE, EQ, 0x40, false, false)),
        ExecutionResult::Continue
    );
}

#[test]
fn test_decrement_and_branch() {
    let mut regs = mock_registers(&[]);
    regs.ctr = 2;
    assert_eq!(exec_fresh(&mut regs, bc(BO_DNZ, 0, -8, false, false)), ExecutionResult::Branch(BASE - 8));
    assert_eq!(regs.ctr, 1);
    assert_eq!(exec_fresh(&mut regs, bc(BO_DNZ, 0, -8, false, false)), ExecutionResult::Continue);
    assert_eq!(regs.ctr, 0);

    regs.ctr = 1;
    assert_eq!(exec_fresh(&mut regs, bc(BO_DZ, 0, 8, false, false)), ExecutionResult::Branch(BASE + 8));
}

#[test]
fn test_branch_to_link_register() {
    let mut regs = mock_registers(&[]);
    regs.lr = 0x8000_1003;
    // blrl: target is the old LR with the low bits cleared
    assert_eq!(exec_fresh(&mut regs, bclr(BO_ALWAYS, 0, true)), ExecutionResult::Branch(0x8000_1000));
    assert_eq!(regs.lr, BASE + 4);
}

#[test]
fn test_branch_to_count_register() {
    let mut regs = mock_registers(&[]);
    regs.ctr = 0x8000_2000;
    assert_eq!(exec_fresh(&mut regs, bcctr(BO_ALWAYS, 0, false)), ExecutionResult::Branch(0x8000_2000));
    // Decrementing CTR while branching to it is invalid
    let before = regs.clone();
    assert_eq!(exec_fresh(&mut regs, bcctr(BO_DNZ, 0, false)), ExecutionResult::IllegalInstruction);
    assert_registers_equal(&before, &regs, "invalid bcctr");
}

#[test]
fn test_system_call_traps() {
    let mut regs = mock_registers(&[]);
    assert_eq!(exec_fresh(&mut regs, 0x4400_0002), ExecutionResult::Trap(TrapReason::SystemCall));
}

#[test]
fn test_condition_register_logic() {
    let mut regs = mock_registers(&[]);
    regs.set_cr_bit(LT, true);
    // crxor 6, 0, 2 (gt of cr1 = lt xor eq)
    exec_fresh(&mut regs, x_form(19, 6, 0, EQ, 193, false));
    assert!(regs.cr_bit(6));
    // mcrf cr3, cr0
    exec_fresh(&mut regs, x_form(19, 3 << 2, 0, 0, 0, false));
    assert_eq!(regs.cr_field(3), 0b1000);
}

// ---------------------------------------------------------------------------
// System registers
// ---------------------------------------------------------------------------

#[test]
fn test_move_to_and_from_spr() {
    let mut ram = mock_ram();
    let mut regs = mock_registers(&[(5, 0x0004_0004), (6, 0x8000_4000)]);

    exec(&mut regs, &mut ram, mtspr(spr::GQR0 + 2, 5));
    assert_eq!(regs.gqr(2), 0x0004_0004);
    exec(&mut regs, &mut ram, mfspr(7, spr::GQR0 + 2));
    assert_eq!(regs.gpr(7), 0x0004_0004);

    exec(&mut regs, &mut ram, mtspr(spr::LR, 6));
    assert_eq!(regs.lr, 0x8000_4000);

    regs.set_spr(spr::PVR, 0x0008_3214);
    exec(&mut regs, &mut ram, mtspr(spr::PVR, 5));
    assert_eq!(regs.spr(spr::PVR), 0x0008_3214, "PVR is read-only");
}

#[test]
fn test_move_from_time_base() {
    let mut regs = mock_registers(&[]);
    regs.tb = 0x0000_0001_0000_0005;
    let mut ram = mock_ram();
    exec(&mut regs, &mut ram, mftb(3, spr::TBL_READ));
    exec(&mut regs, &mut ram, mftb(4, spr::TBU_READ));
    assert_eq!((regs.gpr(3), regs.gpr(4)), (5, 1));
    assert_eq!(exec(&mut regs, &mut ram, mftb(5, spr::LR)), ExecutionResult::IllegalInstruction);
}

#[test]
fn test_condition_register_moves() {
    let mut regs = mock_registers(&[(3, 0x1234_5678)]);
    let mut ram = mock_ram();
    // mtcrf 0xFF, r3
    exec(&mut regs, &mut ram, (31 << 26) | (3 << 21) | (0xFF << 12) | (144 << 1));
    assert_eq!(regs.cr, 0x1234_5678);
    // mfcr r4
    exec(&mut regs, &mut ram, x_form(31, 4, 0, 0, 19, false));
    assert_eq!(regs.gpr(4), 0x1234_5678);
}

// ---------------------------------------------------------------------------
// Floating point
// ---------------------------------------------------------------------------

#[test]
fn test_double_add_writes_ps0_only() {
    let mut regs = mock_registers(&[]);
    regs.set_fpr(2, 1.5);
    regs.set_fpr(3, 2.25);
    regs.set_ps(1, 0.0, 9.0);
    // fadd f1, f2, f3
    exec_fresh(&mut regs, a_form(63, 1, 2, 3, 0, 21, false));
    assert_eq!(regs.ps(1), (3.75, 9.0));
}

#[test]
fn test_single_add_rounds_and_fills_both_slots() {
    let mut regs = mock_registers(&[]);
    regs.set_fpr(2, 1.0);
    regs.set_fpr(3, 2f64.powi(-30));
    // fadds f1, f2, f3
    exec_fresh(&mut regs, a_form(59, 1, 2, 3, 0, 21, false));
    assert_eq!(regs.ps(1), (1.0, 1.0));
}

#[test]
fn test_round_to_single_fills_both_slots() {
    let mut regs = mock_registers(&[]);
    regs.set_ps(1, 9.0, 9.0);
    regs.set_fpr(2, 1.0 + 2f64.powi(-30));
    // frsp f1, f2
    assert_eq!(exec_fresh(&mut regs, x_form(63, 1, 0, 2, 12, false)), ExecutionResult::Continue);
    assert_eq!(regs.ps(1), (1.0, 1.0));
}

#[test]
fn test_divide_by_zero_sets_zx() {
    let mut regs = mock_registers(&[]);
    regs.set_fpr(2, 1.0);
    regs.set_fpr(3, 0.0);
    // fdiv f1, f2, f3
    assert_eq!(exec_fresh(&mut regs, a_form(63, 1, 2, 3, 0, 18, false)), ExecutionResult::Continue);
    assert_eq!(regs.fpr(1), f64::INFINITY);
    assert_ne!(regs.fpscr & FPSCR_ZX, 0);
}

#[test]
fn test_convert_to_integer_word() {
    let cases: &[(u32, f64, u32)] = &[
        (14, 2.5, 2),             // fctiw, round to nearest even
        (14, 3.5, 4),
        (15, 2.7, 2),             // fctiwz
        (15, -2.7, 0xFFFF_FFFE),
        (14, 3.0e9, 0x7FFF_FFFF), // saturates
        (14, -3.0e9, 0x8000_0000),
    ];
    for &(ext, input, expected) in cases {
        let mut regs = mock_registers(&[]);
        regs.set_fpr(2, input);
        exec_fresh(&mut regs, x_form(63, 1, 0, 2, ext, false));
        let bits = regs.fpr(1).to_bits();
        assert_eq!(bits as u32, expected, "ext {ext} of {input}");
        assert_eq!(bits >> 32, 0xFFF8_0000);
    }

    let mut regs = mock_registers(&[]);
    regs.set_fpr(2, 3.0e9);
    exec_fresh(&mut regs, x_form(63, 1, 0, 2, 14, false));
    assert_ne!(regs.fpscr & FPSCR_VXCVI, 0);
}

#[test]
fn test_float_compare() {
    let mut regs = mock_registers(&[]);
    regs.set_fpr(1, 1.0);
    regs.set_fpr(2, 2.0);
    // fcmpu cr1, f1, f2
    exec_fresh(&mut regs, x_form(63, 1 << 2, 1, 2, 0, false));
    assert_eq!(regs.cr_field(1), 0b1000);
    assert_eq!((regs.fpscr >> 12) & 0xF, 0b1000, "FPCC mirrors the result");

    regs.set_fpr(2, f64::NAN);
    exec_fresh(&mut regs, x_form(63, 1 << 2, 1, 2, 0, false));
    assert_eq!(regs.cr_field(1), 0b0001);
}

#[test]
fn test_single_load_fills_both_slots() {
    let mut ram = mock_ram();
    ram.write_u32(DATA, 1.5f32.to_bits()).unwrap();
    let mut regs = mock_registers(&[(3, DATA)]);
    // lfs f1, 0(r3)
    exec(&mut regs, &mut ram, d_form(48, 1, 3, 0));
    assert_eq!(regs.ps(1), (1.5, 1.5));

    // stfd f1, 8(r3)
    exec(&mut regs, &mut ram, d_form(54, 1, 3, 8));
    assert_eq!(ram.read_u64(DATA + 8).unwrap(), 1.5f64.to_bits());
}

// ---------------------------------------------------------------------------
// Paired singles
// ---------------------------------------------------------------------------

#[test]
fn test_quantized_load() {
    let mut ram = mock_ram();
    ram.load(DATA, &[10, 20]).unwrap();
    let mut regs = mock_registers(&[(3, DATA)]);
    // GQR2: load u8, scale 1
    regs.set_spr(spr::GQR0 + 2, (1 << 24) | (4 << 16));

    exec(&mut regs, &mut ram, psq(56, 1, 3, false, 2, 0));
    assert_eq!(regs.ps(1), (5.0, 10.0));

    // W=1 loads ps0 and sets ps1 to one
    exec(&mut regs, &mut ram, psq(56, 2, 3, true, 2, 1));
    assert_eq!(regs.ps(2), (10.0, 1.0));
}

#[test]
fn test_quantized_float_load() {
    let mut ram = mock_ram();
    ram.write_u32(DATA, 0.25f32.to_bits()).unwrap();
    ram.write_u32(DATA + 4, (-8.0f32).to_bits()).unwrap();
    let mut regs = mock_registers(&[(3, DATA)]);
    exec(&mut regs, &mut ram, psq(56, 1, 3, false, 0, 0));
    assert_eq!(regs.ps(1), (0.25, -8.0));
}

#[test]
fn test_quantized_store_clamps_and_truncates() {
    let mut ram = mock_ram();
    let mut regs = mock_registers(&[(3, DATA)]);
    // GQR3: store s16, scale 0
    regs.set_spr(spr::GQR0 + 3, 7);
    regs.set_ps(1, 300.7, -40000.0);

    exec(&mut regs, &mut ram, psq(60, 1, 3, false, 3, 0));
    assert_eq!(ram.read_u16(DATA).unwrap(), 300);
    assert_eq!(ram.read_u16(DATA + 2).unwrap(), 0x8000);

    // W=1 stores ps0 only
    exec(&mut regs, &mut ram, psq(60, 1, 3, true, 3, 8));
    assert_eq!(ram.read_u16(DATA + 8).unwrap(), 300);
    assert_eq!(ram.read_u16(DATA + 10).unwrap(), 0);
}

#[test]
fn test_paired_merge_and_add() {
    let mut regs = mock_registers(&[]);
    regs.set_ps(2, 1.0, 2.0);
    regs.set_ps(3, 3.0, 4.0);
    // ps_merge10 f1, f2, f3
    exec_fresh(&mut regs, x_form(4, 1, 2, 3, 592, false));
    assert_eq!(regs.ps(1), (2.0, 3.0));
    // ps_add f4, f2, f3
    exec_fresh(&mut regs, a_form(4, 4, 2, 3, 0, 21, false));
    assert_eq!(regs.ps(4), (4.0, 6.0));
}

#[test]
fn test_undefined_instruction() {
    let mut regs = mock_registers(&[]);
    let before = regs.clone();
    assert_eq!(exec_fresh(&mut regs, 0), ExecutionResult::IllegalInstruction);
    assert_registers_equal(&before, &regs, "undefined word");
}
