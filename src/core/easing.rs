//! Easing Functions
//!
//! Pure functions mapping normalized time `t` in `[0, 1]` to eased
//! progress. Node falls and gem swaps are both driven through these,
//! so their breakpoints define the motion timings of the whole grid.

use std::f32::consts::FRAC_PI_2;
use serde::{Serialize, Deserialize};

/// Overshoot constant for `BackOut`.
const BACK_C1: f32 = 1.70158;
/// `BACK_C1 + 1`
const BACK_C3: f32 = BACK_C1 + 1.0;

/// Parabola scale for `BounceOut`.
const BOUNCE_N1: f32 = 7.5625;
/// Segment divisor for `BounceOut`.
const BOUNCE_D1: f32 = 2.75;

/// Movement easing selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Easing {
    /// Identity
    #[default]
    Linear = 0,
    /// Exponential ease-out
    ExpoOut = 1,
    /// Sine ease-out
    SineOut = 2,
    /// Cubic overshoot ease-out
    BackOut = 3,
    /// Four-segment bounce ease-out
    BounceOut = 4,
}

impl Easing {
    /// Every variant, in discriminant order.
    pub const ALL: [Easing; 5] = [
        Easing::Linear,
        Easing::ExpoOut,
        Easing::SineOut,
        Easing::BackOut,
        Easing::BounceOut,
    ];

    /// Evaluate this easing at `t`.
    #[inline]
    pub fn apply(self, t: f32) -> f32 {
        EASING_LUT[self as usize](t)
    }
}

/// Lookup table indexed by `Easing` discriminant.
static EASING_LUT: [fn(f32) -> f32; 5] = [linear, expo_out, sine_out, back_out, bounce_out];

/// Evaluate `easing` at `t`.
#[inline]
pub fn ease(easing: Easing, t: f32) -> f32 {
    easing.apply(t)
}

/// Identity.
#[inline]
pub fn linear(t: f32) -> f32 {
    t
}

/// `1 - 2^(-10t)`, exactly 1 at `t == 1`.
#[inline]
pub fn expo_out(t: f32) -> f32 {
    if t == 1.0 {
        1.0
    } else {
        1.0 - 2f32.powf(-10.0 * t)
    }
}

/// `sin(t * pi / 2)`.
#[inline]
pub fn sine_out(t: f32) -> f32 {
    (t * FRAC_PI_2).sin()
}

/// `1 + c3 (t-1)^3 + c1 (t-1)^2`. Overshoots past 1 before settling.
#[inline]
pub fn back_out(t: f32) -> f32 {
    let x = t - 1.0;
    1.0 + BACK_C3 * x * x * x + BACK_C1 * x * x
}

/// Standard bounce: four parabola segments split at 1/d1, 2/d1, 2.5/d1.
pub fn bounce_out(t: f32) -> f32 {
    if t < 1.0 / BOUNCE_D1 {
        BOUNCE_N1 * t * t
    } else if t < 2.0 / BOUNCE_D1 {
        let x = t - 1.5 / BOUNCE_D1;
        BOUNCE_N1 * x * x + 0.75
    } else if t < 2.5 / BOUNCE_D1 {
        let x = t - 2.25 / BOUNCE_D1;
        BOUNCE_N1 * x * x + 0.9375
    } else {
        let x = t - 2.625 / BOUNCE_D1;
        BOUNCE_N1 * x * x + 0.984375
    }
}

// =============================================================================
// TESTS
// =============================================================================
