//! Linearly interpolated percentiles over sorted integer samples.
//!
//! The rank of percentile `p` over `N` samples is `p*N - 1`. Integral ranks
//! select a sample directly; fractional ranks interpolate between the two
//! neighbouring samples and round the offset half away from zero.

/// Integer sample types accepted by the percentile functions.
pub trait Integer: Copy + Ord + Default {
    /// Lossy conversion used for interpolation arithmetic.
    fn to_f64(self) -> f64;

    /// Widening conversion used by [`legacy_percentile`].
    fn to_i64(self) -> i64;

    /// Add a non-negative, already rounded offset. Saturates at `Self::MAX`.
    fn offset(self, steps: f64) -> Self;
}

macro_rules! impl_integer {
    ($($t:ty),*) => {
        $(
            impl Integer for $t {
                #[inline]
                fn to_f64(self) -> f64 {
                    self as f64
                }

                #[inline]
                fn to_i64(self) -> i64 {
                    i64::try_from(self).unwrap_or(i64::MAX)
                }

                #[inline]
                fn offset(self, steps: f64) -> Self {
                    // Float-to-int `as` casts saturate and map NaN to 0.
                    self.saturating_add(steps as $t)
                }
            }
        )*
    };
}

impl_integer!(u8, u16, u32, u64, usize);

/// Interpolated percentile for `p` in `[0.0, 1.0]` over an ascending slice.
///
/// Returns `0` for an empty slice and the single element for a one-element
/// slice. `p` outside `[0, 1]` (or NaN) is clamped, and ranks below the first
/// sample resolve to the first sample, so the result always lies between
/// `sorted[0]` and `sorted[N-1]`.
pub fn percentile<T: Integer>(sorted: &[T], p: f64) -> T {
    match sorted.len() {
        0 => return T::default(),
        1 => return sorted[0],
        _ => {}
    }

    let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) };
    let rank = p * sorted.len() as f64 - 1.0;
    if rank <= 0.0 {
        return sorted[0];
    }

    let i = rank.floor() as usize;
    if rank == i as f64 {
        return sorted[i];
    }

    let lower = sorted[i];
    let upper = match sorted.get(i + 1) {
        Some(upper) => *upper,
        None => return lower,
    };
    let delta = upper.to_f64() - lower.to_f64();
    lower.offset((delta * (rank - i as f64)).round())
}

/// Percentile computed with the unguarded rank arithmetic.
///
/// The rank is truncated toward zero instead of floored, so small `p` on
/// small samples extrapolates below the first element: `p = 0.01` over
/// `0..10` yields `-1`. The one rank that would index before the slice
/// (`p*N - 1 == -1`) and ranks past the end resolve to the nearest sample.
pub fn legacy_percentile<T: Integer>(sorted: &[T], p: f64) -> i64 {
    match sorted.len() {
        0 => return 0,
        1 => return sorted[0].to_i64(),
        _ => {}
    }

    let last = sorted.len() - 1;
    let rank = p * sorted.len() as f64 - 1.0;
    let truncated = rank.trunc();
    let i = if truncated < 0.0 {
        0
    } else {
        (truncated as usize).min(last)
    };

    if rank == truncated {
        return sorted[i].to_i64();
    }

    let lower = sorted[i];
    let upper = sorted[(i + 1).min(last)];
    let delta = upper.to_f64() - lower.to_f64();
    lower.to_i64() + (delta * (rank - truncated)).round() as i64
}
