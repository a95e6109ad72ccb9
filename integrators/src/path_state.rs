//! Path State

use crate::config::*;
use crate::sampler::PathSampler;
use crate::scene::ShadingContext;
use crate::shader::LabelFlags;
use crate::volume::{VolumeStack, VolumeStackEntry};
use bitflags::bitflags;
use pbrt_core::pbrt::*;
use pbrt_core::rng::LCG;
use pbrt_core::spectrum::*;

bitflags! {
    /// Ray type and history of a path.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct PathRayFlag: u32 {
        const CAMERA = 1 << 0;
        const REFLECT = 1 << 1;
        const TRANSMIT = 1 << 2;
        const DIFFUSE = 1 << 3;
        const GLOSSY = 1 << 4;
        const SINGULAR = 1 << 5;
        const TRANSPARENT = 1 << 6;
        const SHADOW_OPAQUE = 1 << 7;
        const SHADOW_TRANSPARENT = 1 << 8;
        const VOLUME_SCATTER = 1 << 9;
        const AO = 1 << 10;
        const MIS_SKIP = 1 << 11;
        const DIFFUSE_ANCESTOR = 1 << 12;
        const SINGLE_PASS_DONE = 1 << 13;
        const SHADOW_CATCHER = 1 << 14;
        const SHADOW_CATCHER_ONLY = 1 << 15;

        const SHADOW = Self::SHADOW_OPAQUE.bits() | Self::SHADOW_TRANSPARENT.bits();

        /// Flags that take part in object visibility tests.
        const ALL_VISIBILITY = Self::CAMERA.bits()
            | Self::REFLECT.bits()
            | Self::TRANSMIT.bits()
            | Self::DIFFUSE.bits()
            | Self::GLOSSY.bits()
            | Self::SINGULAR.bits()
            | Self::TRANSPARENT.bits()
            | Self::SHADOW_OPAQUE.bits()
            | Self::SHADOW_TRANSPARENT.bits()
            | Self::VOLUME_SCATTER.bits();
    }
}

/// Sampling dimensions of the camera.
pub const PRNG_FILTER_U: u32 = 0;
pub const PRNG_FILTER_V: u32 = 1;
pub const PRNG_LENS_U: u32 = 2;
pub const PRNG_LENS_V: u32 = 3;
pub const PRNG_TIME: u32 = 4;
pub const PRNG_BASE_NUM: u32 = 8;

/// Sampling dimensions used per bounce, relative to `PathState::rng_offset`.
pub const PRNG_BSDF_U: u32 = 0;
pub const PRNG_BSDF_V: u32 = 1;
pub const PRNG_BSDF: u32 = 2;
pub const PRNG_LIGHT: u32 = 3;
pub const PRNG_LIGHT_U: u32 = 4;
pub const PRNG_LIGHT_V: u32 = 5;
pub const PRNG_LIGHT_TERMINATE: u32 = 6;
pub const PRNG_TERMINATE: u32 = 7;
pub const PRNG_PHASE_U: u32 = 8;
pub const PRNG_PHASE_V: u32 = 9;
pub const PRNG_PHASE: u32 = 10;
pub const PRNG_SCATTER_DISTANCE: u32 = 11;
pub const PRNG_BOUNCE_NUM: u32 = 12;

/// Scramble for the per-path congruential stream.
const CONGRUENTIAL_SCRAMBLE: u32 = 0x51633e2d;

/// Mutable state of one path.
#[derive(Clone, Debug)]
pub struct PathState {
    /// Ray type and history.
    pub flag: PathRayFlag,

    /// Bounce counters.
    pub bounce: u32,
    pub diffuse_bounce: u32,
    pub glossy_bounce: u32,
    pub transmission_bounce: u32,
    pub volume_bounce: u32,
    pub volume_bounds_bounce: u32,
    pub transparent_bounce: u32,

    /// Smallest BSDF PDF along the path, used for glossy blur.
    pub min_ray_pdf: Float,

    /// PDF of the last non-transparent bounce.
    pub ray_pdf: Float,

    /// Distance travelled since the last non-transparent bounce.
    pub ray_t: Float,

    /// Per-pixel hash.
    pub rng_hash: u32,

    /// First sampling dimension of the current bounce.
    pub rng_offset: u32,

    /// Sample index.
    pub sample: u32,

    /// Number of samples per pixel.
    pub num_samples: u32,

    /// Shadow catcher object seen by the camera ray.
    pub catcher_object: Option<u32>,

    /// Media the path is inside of.
    pub volume_stack: VolumeStack,

    /// Congruential stream for decisions that do not consume dimensions.
    pub rng_congruential: LCG,
}

impl PathState {
    /// Initialize the state of a camera path.
    ///
    /// * `config`   - Kernel configuration.
    /// * `rng_hash` - Per-pixel hash.
    /// * `sample`   - Sample index.
    pub fn new(config: &KernelConfig, rng_hash: u32, sample: u32) -> Self {
        let integrator = &config.integrator;
        let mut volume_stack = VolumeStack::new(integrator.volume_stack_size);
        if integrator.use_volumes {
            if let Some(shader) = config.background.volume_shader {
                let _ = volume_stack.push(VolumeStackEntry::world(shader));
            }
        }

        Self {
            flag: PathRayFlag::CAMERA | PathRayFlag::MIS_SKIP,
            bounce: 0,
            diffuse_bounce: 0,
            glossy_bounce: 0,
            transmission_bounce: 0,
            volume_bounce: 0,
            volume_bounds_bounce: 0,
            transparent_bounce: 0,
            min_ray_pdf: FLOAT_MAX,
            ray_pdf: 0.0,
            ray_t: 0.0,
            rng_hash,
            rng_offset: PRNG_BASE_NUM,
            sample,
            num_samples: integrator.aa_samples,
            catcher_object: None,
            volume_stack,
            rng_congruential: LCG::new(rng_hash.wrapping_add(sample.wrapping_mul(CONGRUENTIAL_SCRAMBLE))),
        }
    }

    /// Advance the state past a scattering event with the given labels.
    /// Transparent events keep the ray type and only count toward the
    /// transparent limit; they do not advance the sampling dimensions.
    ///
    /// * `label` - Labels of the sampled event.
    pub fn next(&mut self, label: LabelFlags) {
        if label.contains(LabelFlags::TRANSPARENT) {
            self.flag |= PathRayFlag::TRANSPARENT;
            self.transparent_bounce += 1;
            return;
        }

        self.bounce += 1;

        if label.contains(LabelFlags::VOLUME_SCATTER) {
            self.flag |= PathRayFlag::VOLUME_SCATTER;
            self.flag &= !(PathRayFlag::REFLECT
                | PathRayFlag::TRANSMIT
                | PathRayFlag::CAMERA
                | PathRayFlag::TRANSPARENT
                | PathRayFlag::DIFFUSE
                | PathRayFlag::GLOSSY
                | PathRayFlag::SINGULAR
                | PathRayFlag::MIS_SKIP);
            self.volume_bounce += 1;
        } else {
            if label.contains(LabelFlags::REFLECT) {
                self.flag |= PathRayFlag::REFLECT;
                self.flag &= !(PathRayFlag::TRANSMIT
                    | PathRayFlag::VOLUME_SCATTER
                    | PathRayFlag::CAMERA
                    | PathRayFlag::TRANSPARENT);
                if label.contains(LabelFlags::DIFFUSE) {
                    self.diffuse_bounce += 1;
                } else {
                    self.glossy_bounce += 1;
                }
            } else {
                debug_assert!(label.contains(LabelFlags::TRANSMIT));
                self.flag |= PathRayFlag::TRANSMIT;
                self.flag &= !(PathRayFlag::REFLECT
                    | PathRayFlag::VOLUME_SCATTER
                    | PathRayFlag::CAMERA
                    | PathRayFlag::TRANSPARENT);
                self.transmission_bounce += 1;
            }

            if label.contains(LabelFlags::DIFFUSE) {
                self.flag |= PathRayFlag::DIFFUSE | PathRayFlag::DIFFUSE_ANCESTOR;
                self.flag &= !(PathRayFlag::GLOSSY | PathRayFlag::SINGULAR | PathRayFlag::MIS_SKIP);
            } else if label.contains(LabelFlags::GLOSSY) {
                self.flag |= PathRayFlag::GLOSSY;
                self.flag &= !(PathRayFlag::DIFFUSE | PathRayFlag::SINGULAR | PathRayFlag::MIS_SKIP);
            } else {
                self.flag |= PathRayFlag::GLOSSY | PathRayFlag::SINGULAR | PathRayFlag::MIS_SKIP;
                self.flag &= !PathRayFlag::DIFFUSE;
            }
        }

        self.rng_offset += PRNG_BOUNCE_NUM;
    }

    /// Returns the object visibility mask for the next ray. Transmitted rays
    /// do not count as diffuse or glossy and volume scattered rays count as
    /// diffuse.
    pub fn ray_visibility(&self) -> PathRayFlag {
        let mut flag = self.flag & PathRayFlag::ALL_VISIBILITY;
        if flag.contains(PathRayFlag::TRANSMIT) {
            flag &= !(PathRayFlag::DIFFUSE | PathRayFlag::GLOSSY);
        }
        if self.flag.contains(PathRayFlag::VOLUME_SCATTER) {
            flag |= PathRayFlag::DIFFUSE;
        }
        flag
    }

    /// Returns the shading context for the current bounce.
    ///
    /// * `randb` - Random number for picking closures.
    pub fn shading_context(&self, randb: Float) -> ShadingContext {
        ShadingContext {
            path_flag: self.flag,
            bounce: self.bounce,
            randb,
        }
    }

    /// Returns a sample for a bounce dimension.
    ///
    /// * `sampler`   - Sample source.
    /// * `dimension` - Dimension relative to the bounce.
    pub fn rng_1d(&self, sampler: &mut dyn PathSampler, dimension: u32) -> Float {
        sampler.sample_1d(self.sample, self.rng_offset + dimension)
    }

    /// Returns a pair of samples for two consecutive bounce dimensions.
    ///
    /// * `sampler`   - Sample source.
    /// * `dimension` - First dimension relative to the bounce.
    pub fn rng_2d(&self, sampler: &mut dyn PathSampler, dimension: u32) -> (Float, Float) {
        sampler.sample_2d(self.sample, self.rng_offset + dimension)
    }

    /// Returns a sample for a decision that may repeat across transparent
    /// bounces. The transparent bounce count shifts the dimension so the same
    /// decision is not made every time.
    ///
    /// * `sampler`   - Sample source.
    /// * `dimension` - Dimension relative to the bounce.
    pub fn rng_1d_for_decision(&self, sampler: &mut dyn PathSampler, dimension: u32) -> Float {
        let offset = self.rng_offset + self.transparent_bounce * PRNG_BOUNCE_NUM;
        sampler.sample_1d(self.sample, offset + dimension)
    }

    /// Returns the random number for light termination, or zero when light
    /// termination is disabled.
    ///
    /// * `sampler`   - Sample source.
    /// * `threshold` - Light sampling threshold.
    pub fn rng_light_termination(&self, sampler: &mut dyn PathSampler, threshold: Float) -> Float {
        if threshold > 0.0 {
            self.rng_1d_for_decision(sampler, PRNG_LIGHT_TERMINATE)
        } else {
            0.0
        }
    }
}

/// Decides the survival probability of a path at each bounce.
pub trait TerminationPolicy: Send + Sync {
    /// Returns the continuation probability in [0, 1].
    ///
    /// * `state`      - The path state.
    /// * `throughput` - Current path throughput.
    fn continuation_probability(&self, state: &PathState, throughput: &Spectrum) -> Float;
}

/// Bounce limits per category followed by throughput-based Russian roulette.
#[derive(Clone, Debug, PartialEq)]
pub struct BounceLimitPolicy {
    max_bounce: u32,
    min_bounce: u32,
    max_diffuse_bounce: u32,
    max_glossy_bounce: u32,
    max_transmission_bounce: u32,
    max_volume_bounce: u32,
    transparent_min_bounce: u32,
    transparent_max_bounce: u32,
}

impl BounceLimitPolicy {
    /// Create the policy from the integrator settings.
    ///
    /// * `settings` - Integrator settings.
    pub fn new(settings: &IntegratorSettings) -> Self {
        Self {
            max_bounce: settings.max_bounce,
            min_bounce: settings.min_bounce,
            max_diffuse_bounce: settings.max_diffuse_bounce,
            max_glossy_bounce: settings.max_glossy_bounce,
            max_transmission_bounce: settings.max_transmission_bounce,
            max_volume_bounce: settings.max_volume_bounce,
            transparent_min_bounce: settings.transparent_min_bounce,
            transparent_max_bounce: settings.transparent_max_bounce,
        }
    }
}

impl TerminationPolicy for BounceLimitPolicy {
    fn continuation_probability(&self, state: &PathState, throughput: &Spectrum) -> Float {
        if state.flag.contains(PathRayFlag::TRANSPARENT) {
            if state.transparent_bounce > self.transparent_max_bounce {
                return 0.0;
            } else if state.transparent_bounce <= self.transparent_min_bounce {
                return 1.0;
            }
        } else if state.bounce > self.max_bounce
            || state.diffuse_bounce > self.max_diffuse_bounce
            || state.glossy_bounce > self.max_glossy_bounce
            || state.volume_bounce > self.max_volume_bounce
            || state.transmission_bounce > self.max_transmission_bounce
        {
            return 0.0;
        } else if state.bounce <= self.min_bounce {
            return 1.0;
        }

        clamp(throughput.average(), 0.0, 1.0)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
