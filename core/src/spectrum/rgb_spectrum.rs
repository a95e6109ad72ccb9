//! RGB Spectrum

use crate::pbrt::*;
use std::fmt;
use std::ops::{Add, AddAssign, Div, DivAssign, Index, IndexMut, Mul, MulAssign, Neg, Sub, SubAssign};

/// Number of RGB samples.
pub const RGB_SAMPLES: usize = 3;

/// Rec. 709 luminance weights.
const Y_WEIGHT: [Float; 3] = [0.212671, 0.715160, 0.072169];

/// Spectral power distribution represented by red, green and blue components.
#[derive(Copy, Clone, Default, Debug, PartialEq)]
pub struct RGBSpectrum {
    /// The RGB components.
    c: [Float; RGB_SAMPLES],
}

impl RGBSpectrum {
    /// All channels zero.
    pub const ZERO: Self = Self { c: [0.0; RGB_SAMPLES] };

    /// All channels one.
    pub const ONE: Self = Self { c: [1.0; RGB_SAMPLES] };

    /// Create a new spectrum from RGB components.
    ///
    /// * `r` - Red.
    /// * `g` - Green.
    /// * `b` - Blue.
    pub const fn new(r: Float, g: Float, b: Float) -> Self {
        Self { c: [r, g, b] }
    }

    /// Create a new spectrum with all channels set to the same value.
    ///
    /// * `v` - The value.
    pub const fn splat(v: Float) -> Self {
        Self { c: [v; RGB_SAMPLES] }
    }

    /// Returns the red component.
    pub fn r(&self) -> Float {
        self.c[0]
    }

    /// Returns the green component.
    pub fn g(&self) -> Float {
        self.c[1]
    }

    /// Returns the blue component.
    pub fn b(&self) -> Float {
        self.c[2]
    }

    /// Returns the components as an array.
    pub fn to_rgb(&self) -> [Float; 3] {
        self.c
    }

    /// Returns true if any channel is NaN.
    pub fn has_nans(&self) -> bool {
        self.c.iter().any(|v| v.is_nan())
    }

    /// Returns true if every channel is finite.
    pub fn is_finite(&self) -> bool {
        self.c.iter().all(|v| v.is_finite())
    }

    /// Returns true if the values are zero everywhere.
    pub fn is_black(&self) -> bool {
        self.c.iter().all(|v| *v == 0.0)
    }

    /// Returns the luminance.
    pub fn y(&self) -> Float {
        Y_WEIGHT[0] * self.c[0] + Y_WEIGHT[1] * self.c[1] + Y_WEIGHT[2] * self.c[2]
    }

    /// Returns the average of the channels.
    pub fn average(&self) -> Float {
        (self.c[0] + self.c[1] + self.c[2]) / RGB_SAMPLES as Float
    }

    /// Returns the largest channel value.
    pub fn max_component_value(&self) -> Float {
        max(self.c[0], max(self.c[1], self.c[2]))
    }

    /// Returns the smallest channel value.
    pub fn min_component_value(&self) -> Float {
        min(self.c[0], min(self.c[1], self.c[2]))
    }

    /// Apply `f` to each channel.
    ///
    /// * `f` - The function.
    pub fn map<F: Fn(Float) -> Float>(&self, f: F) -> Self {
        Self::new(f(self.c[0]), f(self.c[1]), f(self.c[2]))
    }

    /// Returns `e^c` for each channel.
    pub fn exp(&self) -> Self {
        self.map(Float::exp)
    }

    /// Clamps channels to [low, high].
    ///
    /// * `low`  - Lower bound.
    /// * `high` - Upper bound.
    pub fn clamp(&self, low: Float, high: Float) -> Self {
        self.map(|v| clamp(v, low, high))
    }

    /// Divides channel-wise; channels with a zero divisor become zero.
    ///
    /// * `other` - The divisor.
    pub fn safe_divide(&self, other: &Self) -> Self {
        Self::new(
            safe_divide(self.c[0], other.c[0]),
            safe_divide(self.c[1], other.c[1]),
            safe_divide(self.c[2], other.c[2]),
        )
    }
}

impl Add for RGBSpectrum {
    type Output = Self;

    fn add(self, other: Self) -> Self::Output {
        Self::new(self.c[0] + other.c[0], self.c[1] + other.c[1], self.c[2] + other.c[2])
    }
}

impl AddAssign for RGBSpectrum {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl Sub for RGBSpectrum {
    type Output = Self;

    fn sub(self, other: Self) -> Self::Output {
        Self::new(self.c[0] - other.c[0], self.c[1] - other.c[1], self.c[2] - other.c[2])
    }
}

impl SubAssign for RGBSpectrum {
    fn sub_assign(&mut self, other: Self) {
        *self = *self - other;
    }
}

impl Mul for RGBSpectrum {
    type Output = Self;

    fn mul(self, other: Self) -> Self::Output {
        Self::new(self.c[0] * other.c[0], self.c[1] * other.c[1], self.c[2] * other.c[2])
    }
}

impl MulAssign for RGBSpectrum {
    fn mul_assign(&mut self, other: Self) {
        *self = *self * other;
    }
}

impl Mul<Float> for RGBSpectrum {
    type Output = Self;

    fn mul(self, f: Float) -> Self::Output {
        self.map(|v| v * f)
    }
}

impl Mul<RGBSpectrum> for Float {
    type Output = RGBSpectrum;

    fn mul(self, s: RGBSpectrum) -> Self::Output {
        s * self
    }
}

impl MulAssign<Float> for RGBSpectrum {
    fn mul_assign(&mut self, f: Float) {
        *self = *self * f;
    }
}

impl Div<Float> for RGBSpectrum {
    type Output = Self;

    fn div(self, f: Float) -> Self::Output {
        debug_assert!(f != 0.0);
        let inv = 1.0 / f;
        self * inv
    }
}

impl DivAssign<Float> for RGBSpectrum {
    fn div_assign(&mut self, f: Float) {
        *self = *self / f;
    }
}

impl Neg for RGBSpectrum {
    type Output = Self;

    fn neg(self) -> Self::Output {
        self.map(|v| -v)
    }
}

impl Index<usize> for RGBSpectrum {
    type Output = Float;

    fn index(&self, i: usize) -> &Self::Output {
        &self.c[i]
    }
}

impl IndexMut<usize> for RGBSpectrum {
    fn index_mut(&mut self, i: usize) -> &mut Self::Output {
        &mut self.c[i]
    }
}

impl fmt::Display for RGBSpectrum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}]", self.c[0], self.c[1], self.c[2])
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
