//! Pure numeric helpers for the execution engine.
//!
//! This module holds:
//! - [`Flags`]: the NZCV condition flags and the rules that derive them
//! - the shift operations ([`lsl`], [`lsr`], [`asr`], [`ror`])
//! - [`mov_encodable`]: the MOVZ/MOVN legality predicate for `mov` immediates
//! - [`cond_holds`]: the branch-condition predicates over the flags
//!
//! Everything here operates on 64-bit values masked down to the
//! instruction's access width; callers mask and sign-extend results
//! as their destination register requires.

use crate::ast::{Cond, Width};

/// The NZCV condition flags.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct Flags {
    /// Negative: the result's sign bit (at the access width) was set.
    pub n: bool,
    /// Zero: the result was zero.
    pub z: bool,
    /// Carry: unsigned overflow (addition) or no borrow (subtraction).
    pub c: bool,
    /// Overflow: signed overflow.
    pub v: bool,
}
impl std::fmt::Display for Flags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (set, ch) in [(self.n, 'N'), (self.z, 'Z'), (self.c, 'C'), (self.v, 'V')] {
            write!(f, "{}", if set { ch } else { '-' })?;
        }
        Ok(())
    }
}

fn sign_bit(val: u64, width: Width) -> bool {
    (val >> (width.bits() - 1)) & 1 != 0
}

/// Computes `a + b` at the given width, with the flags the addition produces.
///
/// The result is masked to the width; the caller widens it for its destination.
pub fn add_flags(a: u64, b: u64, width: Width) -> (u64, Flags) {
    let mask = width.mask();
    let (a, b) = (a & mask, b & mask);
    let result = a.wrapping_add(b) & mask;

    let (sa, sb, sr) = (sign_bit(a, width), sign_bit(b, width), sign_bit(result, width));
    let flags = Flags {
        n: sr,
        z: result == 0,
        // unsigned wraparound occurred iff the masked sum is less than an operand
        c: result < a,
        // signed overflow iff both operands share a sign the result does not
        v: sa == sb && sr != sa,
    };
    (result, flags)
}

/// Computes `a - b` at the given width, with the flags the subtraction produces.
pub fn sub_flags(a: u64, b: u64, width: Width) -> (u64, Flags) {
    let mask = width.mask();
    let (a, b) = (a & mask, b & mask);
    let result = a.wrapping_sub(b) & mask;

    let (sa, sb, sr) = (sign_bit(a, width), sign_bit(b, width), sign_bit(result, width));
    let flags = Flags {
        n: sr,
        z: result == 0,
        // carry means no borrow
        c: a >= b,
        // signed overflow iff the operands' signs differ and the result's sign
        // does not match the minuend's
        v: sa != sb && sr != sa,
    };
    (result, flags)
}

/// Masks a register-sourced shift amount to the width's shift range
/// (6 bits for `x`, 5 bits for `w`).
pub fn mask_shift_amount(amt: u64, width: Width) -> u32 {
    (amt as u32) & (width.bits() - 1)
}

/// Logical shift left at the given width.
pub fn lsl(val: u64, amt: u32, width: Width) -> u64 {
    let val = val & width.mask();
    match amt < width.bits() {
        true => (val << amt) & width.mask(),
        false => 0,
    }
}

/// Logical shift right at the given width.
pub fn lsr(val: u64, amt: u32, width: Width) -> u64 {
    let val = val & width.mask();
    match amt < width.bits() {
        true => val >> amt,
        false => 0,
    }
}

/// Arithmetic shift right at the given width.
///
/// The width's sign bit is replicated into the vacated positions.
pub fn asr(val: u64, amt: u32, width: Width) -> u64 {
    let val = val & width.mask();
    let amt = amt.min(width.bits() - 1);
    match width {
        Width::W => ((val as u32 as i32) >> amt) as u32 as u64,
        Width::X => ((val as i64) >> amt) as u64,
    }
}

/// Rotate right at the given width.
pub fn ror(val: u64, amt: u32, width: Width) -> u64 {
    let val = val & width.mask();
    match width {
        Width::W => (val as u32).rotate_right(amt) as u64,
        Width::X => val.rotate_right(amt & 63),
    }
}

/// Whether `imm` is legal for `mov` at the given width.
///
/// A `mov` immediate must be producible by a single MOVZ or MOVN:
/// the value (or its width-masked complement) must occupy exactly one
/// 16-bit chunk at a shift of 0, 16, 32, or 48 (0 or 16 for `w`).
/// Zero is always encodable (MOVZ of a zero chunk).
pub fn mov_encodable(imm: i64, width: Width) -> bool {
    let val = (imm as u64) & width.mask();
    single_chunk(val, width) || single_chunk(!val & width.mask(), width)
}

fn single_chunk(val: u64, width: Width) -> bool {
    if val == 0 {
        return true;
    }
    (0..width.bits()).step_by(16)
        .any(|shift| val & !(0xFFFF << shift) == 0)
}

/// Whether the given branch condition holds under the given flags.
pub fn cond_holds(cond: Cond, flags: Flags) -> bool {
    let Flags { n, z, c, v } = flags;
    match cond {
        Cond::Eq => z,
        Cond::Ne => !z,
        Cond::Lt => n != v,
        Cond::Le => z || n != v,
        Cond::Gt => !z && n == v,
        Cond::Ge => n == v,
        Cond::Lo => !c,
        Cond::Ls => !c || z,
        Cond::Hi => c && !z,
        Cond::Hs => c,
        Cond::Mi => n,
        Cond::Pl => !n,
    }
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;

    #[test]
    fn test_add_flags_basic() {
        let (r, f) = add_flags(2, 3, Width::X);
        assert_eq!(r, 5);
        assert_eq!(f, Flags { n: false, z: false, c: false, v: false });

        let (r, f) = add_flags(0, 0, Width::X);
        assert_eq!(r, 0);
        assert!(f.z);
        assert!(!f.n);
    }

    #[test]
    fn test_add_carry_wraparound() {
        // u64::MAX + 1 wraps
        let (r, f) = add_flags(u64::MAX, 1, Width::X);
        assert_eq!(r, 0);
        assert!(f.c);
        assert!(f.z);
        assert!(!f.v);

        // same wrap at 32 bits
        let (r, f) = add_flags(u64::from(u32::MAX), 1, Width::W);
        assert_eq!(r, 0);
        assert!(f.c);
        assert!(f.z);
    }

    #[test]
    fn test_add_signed_overflow() {
        // i64::MAX + 1 overflows into the sign
        let (r, f) = add_flags(i64::MAX as u64, 1, Width::X);
        assert_eq!(r, 1 << 63);
        assert!(f.v);
        assert!(f.n);
        assert!(!f.c);

        // i64::MIN + i64::MIN overflows the other way
        let (_, f) = add_flags(i64::MIN as u64, i64::MIN as u64, Width::X);
        assert!(f.v);
        assert!(!f.n);
        assert!(f.c);
    }

    #[test]
    fn test_sub_flags_basic() {
        // 5 - 7: negative, borrow
        let (r, f) = sub_flags(5, 7, Width::X);
        assert_eq!(r, (-2i64) as u64);
        assert!(f.n);
        assert!(!f.z);
        assert!(!f.c);
        assert!(!f.v);

        // 7 - 5: positive, no borrow
        let (_, f) = sub_flags(7, 5, Width::X);
        assert!(!f.n);
        assert!(f.c);

        // equal operands
        let (_, f) = sub_flags(9, 9, Width::X);
        assert!(f.z);
        assert!(f.c);
    }

    #[test]
    fn test_sub_signed_overflow() {
        // i64::MIN - 1 overflows
        let (_, f) = sub_flags(i64::MIN as u64, 1, Width::X);
        assert!(f.v);
        assert!(!f.n);

        // i64::MAX - (-1) overflows
        let (_, f) = sub_flags(i64::MAX as u64, (-1i64) as u64, Width::X);
        assert!(f.v);
        assert!(f.n);
    }

    #[test]
    fn test_flag_rules_match_wide_arithmetic() {
        // Randomized check of C and V against 128-bit reference arithmetic.
        let mut rng = rand::thread_rng();
        for _ in 0..10_000 {
            let a: u64 = rng.gen();
            let b: u64 = rng.gen();

            let (r, f) = add_flags(a, b, Width::X);
            assert_eq!(r, a.wrapping_add(b));
            assert_eq!(f.c, (a as u128) + (b as u128) > u64::MAX as u128, "C of {a} + {b}");
            let wide = (a as i64 as i128) + (b as i64 as i128);
            assert_eq!(f.v, i64::try_from(wide).is_err(), "V of {a} + {b}");

            let (r, f) = sub_flags(a, b, Width::X);
            assert_eq!(r, a.wrapping_sub(b));
            assert_eq!(f.c, a >= b, "C of {a} - {b}");
            let wide = (a as i64 as i128) - (b as i64 as i128);
            assert_eq!(f.v, i64::try_from(wide).is_err(), "V of {a} - {b}");
        }
    }

    #[test]
    fn test_shifts() {
        assert_eq!(lsl(1, 3, Width::X), 8);
        assert_eq!(lsl(1, 63, Width::X), 1 << 63);
        assert_eq!(lsl(0xFFFF_FFFF, 4, Width::W), 0xFFFF_FFF0);

        assert_eq!(lsr(16, 3, Width::X), 2);
        assert_eq!(lsr((-1i64) as u64, 60, Width::X), 0xF);
        assert_eq!(lsr((-1i64) as u64, 28, Width::W), 0xF);

        // asr replicates the width's sign bit
        assert_eq!(asr((-8i64) as u64, 1, Width::X), (-4i64) as u64);
        assert_eq!(asr(0x8000_0000, 4, Width::W), 0xF800_0000);
        assert_eq!(asr(8, 2, Width::X), 2);

        assert_eq!(ror(0b1011, 2, Width::X), (0b11 << 62) | 0b10);
        assert_eq!(ror(0x0000_00FF, 8, Width::W), 0xFF00_0000);
    }

    #[test]
    fn test_shift_amount_masking() {
        assert_eq!(mask_shift_amount(64, Width::X), 0);
        assert_eq!(mask_shift_amount(65, Width::X), 1);
        assert_eq!(mask_shift_amount(32, Width::W), 0);
        assert_eq!(mask_shift_amount(33, Width::W), 1);
    }

    #[test]
    fn test_mov_encodable() {
        // single chunks at each shift position
        assert!(mov_encodable(0, Width::X));
        assert!(mov_encodable(0xFFFF, Width::X));
        assert!(mov_encodable(0xABCD << 16, Width::X));
        assert!(mov_encodable(0xABCD << 32, Width::X));
        assert!(mov_encodable(0x7BCD << 48, Width::X));

        // complements (MOVN)
        assert!(mov_encodable(-1, Width::X));
        assert!(mov_encodable(-2, Width::X));
        assert!(mov_encodable(!(0xABCD << 16), Width::X));
        // !0xF_FFFF_FFFF_FFFF is 0xFFF0 << 48, a single movn chunk
        assert!(mov_encodable(0xF_FFFF_FFFF_FFFF, Width::X));

        // two chunks set
        assert!(!mov_encodable(0x1_0001, Width::X));
        assert!(!mov_encodable(0x1234_5678, Width::X));

        // w only has shifts 0 and 16
        assert!(mov_encodable(0xFFFF, Width::W));
        assert!(mov_encodable(0x7FFF_0000, Width::W));
        assert!(!mov_encodable(0x0001_0001, Width::W));
        // -1 at w width is 0xFFFF_FFFF, the complement of 0
        assert!(mov_encodable(-1, Width::W));
    }

    #[test]
    fn test_cond_holds() {
        // after cmp 5, 7 (signed less)
        let (_, f) = sub_flags(5, 7, Width::X);
        assert!(cond_holds(Cond::Ne, f));
        assert!(cond_holds(Cond::Lt, f));
        assert!(cond_holds(Cond::Le, f));
        assert!(!cond_holds(Cond::Eq, f));
        assert!(!cond_holds(Cond::Gt, f));
        assert!(!cond_holds(Cond::Ge, f));
        // 5 < 7 unsigned too
        assert!(cond_holds(Cond::Lo, f));
        assert!(!cond_holds(Cond::Hs, f));

        // after cmp -1, 1: signed less, unsigned greater
        let (_, f) = sub_flags((-1i64) as u64, 1, Width::X);
        assert!(cond_holds(Cond::Lt, f));
        assert!(cond_holds(Cond::Hi, f));
        assert!(!cond_holds(Cond::Lo, f));

        // after cmp 4, 4
        let (_, f) = sub_flags(4, 4, Width::X);
        assert!(cond_holds(Cond::Eq, f));
        assert!(cond_holds(Cond::Le, f));
        assert!(cond_holds(Cond::Ge, f));
        assert!(cond_holds(Cond::Ls, f));
        assert!(cond_holds(Cond::Hs, f));
        assert!(cond_holds(Cond::Pl, f));
        assert!(!cond_holds(Cond::Mi, f));
    }
}
