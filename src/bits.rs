//! Word-level bit primitives used by the fusion node.
//!
//! Both primitives pick a hardware path on x86_64 and fall back to portable
//! code elsewhere. Results are identical on every path.

#[cfg(target_arch = "x86_64")]
use std::sync::OnceLock;

// =============================================================================
// Parallel bit extract
// =============================================================================

#[inline]
fn pext_u64_fallback(value: u64, mut mask: u64) -> u64 {
    let mut out = 0u64;
    let mut out_bit = 1u64;
    while mask != 0 {
        let lsb = mask & mask.wrapping_neg();
        if (value & lsb) != 0 {
            out |= out_bit;
        }
        mask ^= lsb;
        out_bit <<= 1;
    }
    out
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "bmi2")]
unsafe fn pext_u64_bmi2(value: u64, mask: u64) -> u64 {
    // SAFETY: Caller guarantees BMI2.
    unsafe { core::arch::x86_64::_pext_u64(value, mask) }
}

#[cfg(target_arch = "x86_64")]
fn has_bmi2() -> bool {
    static BMI2: OnceLock<bool> = OnceLock::new();
    *BMI2.get_or_init(|| {
        let detected = std::is_x86_feature_detected!("bmi2");
        log::debug!("pext backend: {}", if detected { "bmi2" } else { "portable" });
        detected
    })
}

/// Parallel bit extract: gathers the bits of `value` selected by `mask` and
/// packs them into the low bits of the result, keeping their order.
#[inline]
pub fn pext(value: u64, mask: u64) -> u64 {
    #[cfg(target_arch = "x86_64")]
    {
        if has_bmi2() {
            // SAFETY: feature detected at runtime.
            return unsafe { pext_u64_bmi2(value, mask) };
        }
    }
    pext_u64_fallback(value, mask)
}

// =============================================================================
// Unsigned byte-wise compare
// =============================================================================

const HIGH_BITS: u64 = 0x8080_8080_8080_8080;

#[cfg_attr(target_arch = "x86_64", allow(dead_code))]
#[inline]
fn pcmpgtub_swar(a: u64, b: u64) -> u64 {
    // Per byte, the high bit is set iff the low 7 bits of `b` are >= those of `a`.
    // The minuend byte is at least 0x80 and the subtrahend at most 0x7F, so no
    // borrow crosses a byte boundary.
    let low_ge = ((b | HIGH_BITS) - (a & !HIGH_BITS)) & HIGH_BITS;
    let high_diff = (a ^ b) & HIGH_BITS;
    let b_ge_a = (high_diff & b) | (!high_diff & low_ge);
    let a_gt_b = !b_ge_a & HIGH_BITS;
    (a_gt_b >> 7) * 0xFF
}

#[cfg(target_arch = "x86_64")]
#[allow(unused_unsafe)]
#[inline]
fn pcmpgtub_sse2(a: u64, b: u64) -> u64 {
    use core::arch::x86_64::*;
    // SSE2 only has a signed byte compare; flipping the sign bit of both
    // operands turns it into an unsigned one.
    // SAFETY: SSE2 is part of the x86_64 baseline.
    unsafe {
        let bias = _mm_set1_epi8(i8::MIN);
        let va = _mm_xor_si128(_mm_cvtsi64_si128(a as i64), bias);
        let vb = _mm_xor_si128(_mm_cvtsi64_si128(b as i64), bias);
        _mm_cvtsi128_si64(_mm_cmpgt_epi8(va, vb)) as u64
    }
}

/// Unsigned byte-wise greater-than over the 8 bytes of a word.
///
/// Byte `i` of the result is `0xFF` if byte `i` of `a` is greater than byte `i`
/// of `b`, and `0x00` otherwise.
#[inline]
pub fn pcmpgtub(a: u64, b: u64) -> u64 {
    #[cfg(target_arch = "x86_64")]
    {
        pcmpgtub_sse2(a, b)
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        pcmpgtub_swar(a, b)
    }
}

// =============================================================================
// Misc
// =============================================================================

/// Index of the most significant set bit. `x` must be non-zero.
#[inline]
pub fn msb(x: u64) -> u32 {
    debug_assert_ne!(x, 0);
    63 - x.leading_zeros()
}

/// The lowest `bits` bits set.
#[inline]
pub const fn low_mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}
