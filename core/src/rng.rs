//! Random Number Generators.

use crate::pbrt::*;

/// 32-bit precision value for 1 - epsilon.
pub const FLOAT_ONE_MINUS_EPSILON: f32 = hexf32!("0x1.fffffep-1"); // 0.99999994

/// 1 - epsilon in the precision we've selected for `Float`.
pub const ONE_MINUS_EPSILON: Float = FLOAT_ONE_MINUS_EPSILON;

const PCG32_DEFAULT_STATE: u64 = 0x853c49e6748fea9b;
const PCG32_DEFAULT_STREAM: u64 = 0xda3e39cb94b95bdb;
const PCG32_MULT: u64 = 0x5851f42d4c957f2d;

/// PCG32 pseudo-random number generator. Used by hosts and tests to drive
/// the sample stream.
#[derive(Copy, Clone, Debug)]
pub struct RNG {
    state: u64,
    inc: u64,
}

impl Default for RNG {
    /// Return a new instance of `RNG` with default state and stream.
    fn default() -> Self {
        Self {
            state: PCG32_DEFAULT_STATE,
            inc: PCG32_DEFAULT_STREAM,
        }
    }
}

impl RNG {
    /// Create a new `RNG` by seeding it with the given starting sequence.
    ///
    /// * `sequence_index` - The starting sequence to seed with.
    pub fn new(sequence_index: u64) -> Self {
        let mut ret = Self { state: 0, inc: 0 };
        ret.set_sequence(sequence_index);
        ret
    }

    /// Initialize the random number generator sequence.
    ///
    /// * `init_seq` - The starting sequence to seed with.
    pub fn set_sequence(&mut self, init_seq: u64) {
        self.state = 0;
        self.inc = init_seq.wrapping_shl(1) | 1;
        let _ = self.uniform_u32();
        self.state = self.state.wrapping_add(PCG32_DEFAULT_STATE);
        let _ = self.uniform_u32();
    }

    /// Returns a uniformly distributed u32 value.
    #[inline(always)]
    pub fn uniform_u32(&mut self) -> u32 {
        let old_state = self.state;
        self.state = old_state.wrapping_mul(PCG32_MULT).wrapping_add(self.inc);

        let xor_shifted = (((old_state >> 18) ^ old_state) >> 27) as u32;
        let rot = (old_state >> 59) as u32;
        xor_shifted.rotate_right(rot)
    }

    /// Returns a uniformly distributed value over the half-open interval
    /// [lower_bound, upper_bound).
    ///
    /// * `lower_bound` - The lower bound.
    /// * `upper_bound` - The upper bound.
    pub fn bounded_uniform_u32(&mut self, lower_bound: u32, upper_bound: u32) -> u32 {
        let b = upper_bound - lower_bound;
        if b == 0 {
            return lower_bound;
        }
        let threshold = b.wrapping_neg() % b;
        loop {
            let r = self.uniform_u32();
            if r >= threshold {
                return lower_bound + r % b;
            }
        }
    }

    /// Returns a uniformly distributed value over the half open interval [0.0, 1.0).
    pub fn uniform_float(&mut self) -> Float {
        min(
            self.uniform_u32() as Float * hexf32!("0x1.0p-32") as Float,
            ONE_MINUS_EPSILON,
        )
    }
}

/// Linear congruential generator state. Cheap enough to seed per event
/// (volume step jitter, subsurface probing) from the path's sample indices.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LCG(u32);

impl LCG {
    /// Seed a generator directly.
    ///
    /// * `seed` - The seed.
    pub fn new(seed: u32) -> Self {
        let mut rng = Self(seed);
        let _ = rng.next_u32();
        rng
    }

    /// Seed a generator from the path's sampling coordinates.
    ///
    /// * `rng_hash`   - Per-pixel hash.
    /// * `rng_offset` - Current dimension offset of the path.
    /// * `sample`     - Sample index.
    /// * `scramble`   - Scramble constant distinguishing the consumer.
    pub fn from_state(rng_hash: u32, rng_offset: u32, sample: u32, scramble: u32) -> Self {
        Self::new(
            rng_hash
                .wrapping_add(rng_offset)
                .wrapping_add(sample.wrapping_mul(scramble)),
        )
    }

    /// Advance and return the next 32-bit value.
    #[inline(always)]
    pub fn next_u32(&mut self) -> u32 {
        self.0 = self.0.wrapping_mul(1103515245).wrapping_add(12345);
        self.0
    }

    /// Advance and return a value in [0, 1).
    #[inline(always)]
    pub fn next_float(&mut self) -> Float {
        min(
            self.next_u32() as Float * (1.0 / u32::MAX as Float),
            ONE_MINUS_EPSILON,
        )
    }
}

/// Integer hash used to decorrelate pixels.
///
/// * `k` - Value to hash.
#[inline]
pub fn hash_u32(mut k: u32) -> u32 {
    k ^= k >> 16;
    k = k.wrapping_mul(0x7feb352d);
    k ^= k >> 15;
    k = k.wrapping_mul(0x846ca68b);
    k ^= k >> 16;
    k
}

/// Hash two integers together.
///
/// * `a` - First value.
/// * `b` - Second value.
#[inline]
pub fn hash_u32_2(a: u32, b: u32) -> u32 {
    hash_u32(a ^ hash_u32(b).wrapping_add(0x9e3779b9))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
