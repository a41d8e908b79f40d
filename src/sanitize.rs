//! NaN/Inf substitution and clamping.
//!
//! Every evolved array passes through here once per step. With
//! [`NanPolicy::Clamp`] bad entries are replaced and counted; with
//! [`NanPolicy::Reject`] the first bad entry turns into an error.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{FabricError, FabricResult};

/// magnitude that infinities are clamped to
pub const DEFAULT_BOUND: f64 = 1e12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NanPolicy {
    /// replace NaN with a fallback and Inf with the signed bound
    #[default]
    Clamp,
    /// fail the step
    Reject,
}

/// clamp a value, mapping NaN to `fallback` and ±Inf to ±`bound`
#[inline]
pub fn clamp_finite(value: f64, fallback: f64, bound: f64) -> f64 {
    if value.is_nan() {
        return fallback;
    }
    if value.is_infinite() {
        return if value > 0.0 { bound } else { -bound };
    }
    value.clamp(-bound, bound)
}

/// sanitize a real slice in place, returning how many entries were replaced
pub fn sanitize_slice(values: &mut [f64], policy: NanPolicy, context: &str) -> FabricResult<usize> {
    let count = values.iter().filter(|v| !v.is_finite()).count();
    if count == 0 {
        return Ok(0);
    }
    match policy {
        NanPolicy::Reject => Err(FabricError::NonFinite {
            context: context.to_string(),
            count,
        }),
        NanPolicy::Clamp => {
            for v in values.iter_mut() {
                *v = clamp_finite(*v, 0.0, DEFAULT_BOUND);
            }
            log::warn!("{context}: replaced {count} non-finite values");
            Ok(count)
        }
    }
}

/// sanitize complex spinor components in place
pub fn sanitize_complex(values: &mut [[Complex64; 4]], policy: NanPolicy, context: &str) -> FabricResult<usize> {
    let count = values
        .iter()
        .flat_map(|s| s.iter())
        .filter(|z| !z.re.is_finite() || !z.im.is_finite())
        .count();
    if count == 0 {
        return Ok(0);
    }
    match policy {
        NanPolicy::Reject => Err(FabricError::NonFinite {
            context: context.to_string(),
            count,
        }),
        NanPolicy::Clamp => {
            for spinor in values.iter_mut() {
                for z in spinor.iter_mut() {
                    z.re = clamp_finite(z.re, 0.0, DEFAULT_BOUND);
                    z.im = clamp_finite(z.im, 0.0, DEFAULT_BOUND);
                }
            }
            log::warn!("{context}: replaced {count} non-finite spinor components");
            Ok(count)
        }
    }
}

/// summary of a field: max |v|, mean |v| and number of non-finite entries
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct FieldStats {
    pub max: f64,
    pub mean: f64,
    pub nan_count: usize,
}

impl FieldStats {
    pub fn of<I: IntoIterator<Item = f64>>(values: I) -> Self {
        let mut max: f64 = 0.0;
        let mut sum = 0.0;
        let mut count = 0usize;
        let mut nan_count = 0usize;
        for v in values {
            if !v.is_finite() {
                nan_count += 1;
                continue;
            }
            let a = v.abs();
            max = max.max(a);
            sum += a;
            count += 1;
        }
        FieldStats {
            max,
            mean: sum / (count.max(1) as f64),
            nan_count,
        }
    }
}
