//! Fixed-point codec.
//!
//! A real `v` is represented at bit width `b` by the integer mantissa
//! `round(v · 2^b)`, i.e. the value `mantissa / 2^b`. Rounding is
//! **half-to-even**, the same rule `numpy.round` applies, so a threshold of
//! `0.5` at 0 bits becomes `0` and `1.5` becomes `2`.
//!
//! Quantization is lossy by nature. What holds is stability: requantizing a
//! dequantized value at the same width returns the identical mantissa, as long
//! as the mantissa is exactly representable as an `f64` (|m| ≤ 2^53).

use std::cmp::Ordering;
use std::fmt;

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Largest supported bit width.
pub const MAX_BITS: u32 = 32;

/// Bound on |scaled value| for an `i64` mantissa (2^63).
const MANTISSA_LIMIT: f64 = 9_223_372_036_854_775_808.0;

/// A quantized real: signed mantissa at a fixed bit width.
///
/// Values of different widths are never ordered implicitly; use
/// [`FixedPoint::try_cmp`] or bring both to a common width with
/// [`FixedPoint::rescale`] first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FixedPoint {
    mantissa: i64,
    bits: u32,
}

impl FixedPoint {
    /// Build from a raw mantissa.
    pub fn from_mantissa(mantissa: i64, bits: u32) -> Result<Self> {
        check_bits(bits)?;
        Ok(Self { mantissa, bits })
    }

    #[inline]
    pub fn mantissa(&self) -> i64 {
        self.mantissa
    }

    #[inline]
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Real value represented by this fixed-point number.
    #[inline]
    pub fn to_f64(&self) -> f64 {
        self.mantissa as f64 / scale(self.bits)
    }

    /// Convert to another bit width.
    ///
    /// Widening shifts the mantissa left and is exact. Narrowing drops the low
    /// bits with the same half-to-even rule used by [`quantize`].
    pub fn rescale(&self, bits: u32) -> Result<Self> {
        check_bits(bits)?;
        let mantissa = match bits.cmp(&self.bits) {
            Ordering::Equal => self.mantissa,
            Ordering::Greater => {
                let shift = bits - self.bits;
                self.mantissa
                    .checked_mul(1i64 << shift)
                    .ok_or_else(|| {
                        Error::InvalidArgument(format!(
                            "mantissa {} overflows when widened from {} to {} bits",
                            self.mantissa, self.bits, bits
                        ))
                    })?
            }
            Ordering::Less => shift_right_ties_even(self.mantissa, self.bits - bits),
        };
        Ok(Self { mantissa, bits })
    }

    /// Order two values that share a bit width.
    pub fn try_cmp(&self, other: &FixedPoint) -> Result<Ordering> {
        if self.bits != other.bits {
            return Err(Error::InvalidArgument(format!(
                "cannot compare fixed-point values of {} and {} bits",
                self.bits, other.bits
            )));
        }
        Ok(self.mantissa.cmp(&other.mantissa))
    }
}

impl fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/2^{}", self.mantissa, self.bits)
    }
}

/// Quantize `value` at `bits` fractional bits.
///
/// # Errors
///
/// [`Error::InvalidArgument`] if `bits > MAX_BITS`, if `value` is not finite,
/// or if the scaled value does not fit an `i64` mantissa.
pub fn quantize(value: f64, bits: u32) -> Result<FixedPoint> {
    Ok(FixedPoint {
        mantissa: quantize_mantissa(value, bits)?,
        bits,
    })
}

/// Real value of a fixed-point number.
#[inline]
pub fn dequantize(fp: FixedPoint) -> f64 {
    fp.to_f64()
}

/// Nearest real representable at `bits` (the classic `convert_to_fixed_point`).
pub fn snap(value: f64, bits: u32) -> Result<f64> {
    quantize(value, bits).map(dequantize)
}

/// Quantize every feature of a sample, returning raw mantissas.
pub fn quantize_row(values: &[f64], bits: u32) -> Result<Vec<i64>> {
    values.iter().map(|&v| quantize_mantissa(v, bits)).collect()
}

/// Snap a whole dataset to the grid of `bits`, element-wise.
///
/// Used to hand quantized training data back to the external toolkit so the
/// learned thresholds already sit on representable values.
pub fn snap_array(data: ArrayView2<'_, f64>, bits: u32) -> Result<Array2<f64>> {
    let values = data
        .iter()
        .map(|&v| snap(v, bits))
        .collect::<Result<Vec<_>>>()?;
    Array2::from_shape_vec(data.dim(), values).map_err(|e| Error::InvalidArgument(e.to_string()))
}

#[inline]
pub(crate) fn quantize_mantissa(value: f64, bits: u32) -> Result<i64> {
    check_bits(bits)?;
    if !value.is_finite() {
        return Err(Error::InvalidArgument(format!(
            "cannot quantize non-finite value {value}"
        )));
    }
    // Multiplying by a power of two is exact, so the only rounding is ours.
    let scaled = (value * scale(bits)).round_ties_even();
    if !(-MANTISSA_LIMIT..MANTISSA_LIMIT).contains(&scaled) {
        return Err(Error::InvalidArgument(format!(
            "value {value} does not fit a 64-bit mantissa at {bits} bits"
        )));
    }
    Ok(scaled as i64)
}

#[inline]
fn check_bits(bits: u32) -> Result<()> {
    if bits > MAX_BITS {
        return Err(Error::InvalidArgument(format!(
            "bit width {bits} exceeds the maximum of {MAX_BITS}"
        )));
    }
    Ok(())
}

#[inline]
fn scale(bits: u32) -> f64 {
    // bits <= MAX_BITS, so the power is exact.
    (1u64 << bits) as f64
}

fn shift_right_ties_even(mantissa: i64, shift: u32) -> i64 {
    let divisor = 1i64 << shift;
    let half = divisor / 2;
    let q = mantissa.div_euclid(divisor);
    let r = mantissa.rem_euclid(divisor);
    if r > half || (r == half && q.rem_euclid(2) == 1) {
        q + 1
    } else {
        q
    }
}
