//! Kernel Configuration

use pbrt_core::film::PassFlags;
use pbrt_core::pbrt::*;

/// Inline capacity of the per-path volume stack.
pub const VOLUME_STACK_SIZE: usize = 32;

/// Maximum number of re-entry points a single subsurface event can produce.
pub const BSSRDF_MAX_HITS: usize = 4;

/// Maximum number of volume-only surfaces a path may pass through.
pub const VOLUME_BOUNDS_MAX: u32 = 1024;

/// Bounce limits, sampling and capability switches of the integrator.
#[derive(Clone, Debug, PartialEq)]
pub struct IntegratorSettings {
    /// Maximum total bounces.
    pub max_bounce: u32,

    /// Bounces that are never terminated by Russian roulette.
    pub min_bounce: u32,

    /// Maximum diffuse reflection bounces.
    pub max_diffuse_bounce: u32,

    /// Maximum glossy reflection bounces.
    pub max_glossy_bounce: u32,

    /// Maximum transmission bounces.
    pub max_transmission_bounce: u32,

    /// Maximum volume scattering bounces.
    pub max_volume_bounce: u32,

    /// Transparent bounces that are never terminated by Russian roulette.
    pub transparent_min_bounce: u32,

    /// Maximum transparent bounces.
    pub transparent_max_bounce: u32,

    /// Let shadow rays pass through transparent surfaces.
    pub transparent_shadows: bool,

    /// Bounce after which only ambient occlusion is traced. `None` disables
    /// the approximation.
    pub ao_bounces: Option<u32>,

    /// Compute ambient occlusion at every surface hit.
    pub use_ambient_occlusion: bool,

    /// Sample lights at every surface and volume vertex.
    pub use_direct_light: bool,

    /// Weight lamps hit by indirect rays with multiple importance sampling.
    pub use_lamp_mis: bool,

    /// Enable subsurface scattering.
    pub use_subsurface: bool,

    /// Enable participating media.
    pub use_volumes: bool,

    /// Roughness blur for caustics. `None` disables blurring.
    pub filter_glossy: Option<Float>,

    /// Luminance clamp for directly visible contributions.
    pub sample_clamp_direct: Option<Float>,

    /// Luminance clamp for indirect contributions.
    pub sample_clamp_indirect: Option<Float>,

    /// Light contributions below this value are stochastically dropped.
    /// Zero disables light termination.
    pub light_sampling_threshold: Float,

    /// Allow the record-then-sample volume strategy.
    pub volume_decoupled: bool,

    /// Sample every light at direct vertices.
    pub sample_all_lights_direct: bool,

    /// Ray marching step size for heterogeneous media.
    pub volume_step_size: Float,

    /// Maximum ray marching steps per segment.
    pub volume_max_steps: u32,

    /// Runtime limit of the volume stack, at most `VOLUME_STACK_SIZE`.
    pub volume_stack_size: usize,

    /// Runtime limit of re-entry points per subsurface event, at most
    /// `BSSRDF_MAX_HITS`.
    pub subsurface_max_hits: usize,

    /// Number of samples per pixel.
    pub aa_samples: u32,
}

impl Default for IntegratorSettings {
    fn default() -> Self {
        Self {
            max_bounce: 12,
            min_bounce: 3,
            max_diffuse_bounce: 4,
            max_glossy_bounce: 4,
            max_transmission_bounce: 12,
            max_volume_bounce: 0,
            transparent_min_bounce: 8,
            transparent_max_bounce: 8,
            transparent_shadows: true,
            ao_bounces: None,
            use_ambient_occlusion: false,
            use_direct_light: true,
            use_lamp_mis: true,
            use_subsurface: true,
            use_volumes: true,
            filter_glossy: None,
            sample_clamp_direct: None,
            sample_clamp_indirect: None,
            light_sampling_threshold: 0.01,
            volume_decoupled: true,
            sample_all_lights_direct: false,
            volume_step_size: 0.1,
            volume_max_steps: 1024,
            volume_stack_size: VOLUME_STACK_SIZE,
            subsurface_max_hits: BSSRDF_MAX_HITS,
            aa_samples: 16,
        }
    }
}

/// World and background settings.
#[derive(Clone, Debug, PartialEq)]
pub struct BackgroundSettings {
    /// Camera rays that miss produce alpha instead of background radiance.
    pub transparent: bool,

    /// Length of ambient occlusion rays.
    pub ao_distance: Float,

    /// Strength of ambient occlusion.
    pub ao_factor: Float,

    /// Volume shader filling the world, if any.
    pub volume_shader: Option<u32>,
}

impl Default for BackgroundSettings {
    fn default() -> Self {
        Self {
            transparent: false,
            ao_distance: FLOAT_MAX,
            ao_factor: 1.0,
            volume_shader: None,
        }
    }
}

/// Output pass settings.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilmSettings {
    /// Enabled auxiliary passes.
    pub passes: PassFlags,

    /// Surfaces more transparent than this do not write data passes.
    pub pass_alpha_threshold: Float,
}

impl FilmSettings {
    /// Returns true if radiance has to be tracked per light pass.
    pub fn use_light_pass(&self) -> bool {
        self.passes.has_light_passes()
    }
}

/// Immutable configuration snapshot shared by every path.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct KernelConfig {
    /// Integrator settings.
    pub integrator: IntegratorSettings,

    /// Background settings.
    pub background: BackgroundSettings,

    /// Film settings.
    pub film: FilmSettings,
}

impl KernelConfig {
    /// Lower the minimum bounce counts that exceed their maximums.
    pub fn clamp_bounce_limits(&mut self) {
        let i = &mut self.integrator;
        if i.min_bounce > i.max_bounce {
            warn!(
                "min_bounce {} exceeds max_bounce {}, using {}",
                i.min_bounce, i.max_bounce, i.max_bounce
            );
            i.min_bounce = i.max_bounce;
        }
        if i.transparent_min_bounce > i.transparent_max_bounce {
            warn!(
                "transparent_min_bounce {} exceeds transparent_max_bounce {}, using {}",
                i.transparent_min_bounce, i.transparent_max_bounce, i.transparent_max_bounce
            );
            i.transparent_min_bounce = i.transparent_max_bounce;
        }
    }

    /// Validate the configuration. Returns a description of the first
    /// invalid setting. Bounce ranges are not checked; see
    /// `clamp_bounce_limits()`.
    pub fn validate(&self) -> Result<(), String> {
        let i = &self.integrator;
        let b = &self.background;

        if i.volume_stack_size == 0 || i.volume_stack_size > VOLUME_STACK_SIZE {
            return Err(format!(
                "volume_stack_size must be in 1..={VOLUME_STACK_SIZE}, got {}",
                i.volume_stack_size
            ));
        }
        if i.subsurface_max_hits == 0 || i.subsurface_max_hits > BSSRDF_MAX_HITS {
            return Err(format!(
                "subsurface_max_hits must be in 1..={BSSRDF_MAX_HITS}, got {}",
                i.subsurface_max_hits
            ));
        }
        if !(i.volume_step_size > 0.0) || !i.volume_step_size.is_finite() {
            return Err(format!("invalid volume_step_size {}", i.volume_step_size));
        }
        if i.volume_max_steps == 0 {
            return Err(String::from("volume_max_steps must be positive"));
        }
        if i.aa_samples == 0 {
            return Err(String::from("aa_samples must be positive"));
        }
        if !(i.light_sampling_threshold >= 0.0) {
            return Err(format!(
                "invalid light_sampling_threshold {}",
                i.light_sampling_threshold
            ));
        }
        check_optional("filter_glossy", i.filter_glossy)?;
        check_optional("sample_clamp_direct", i.sample_clamp_direct)?;
        check_optional("sample_clamp_indirect", i.sample_clamp_indirect)?;

        if !(b.ao_distance >= 0.0) {
            return Err(format!("invalid ao_distance {}", b.ao_distance));
        }
        if !(b.ao_factor >= 0.0) || !b.ao_factor.is_finite() {
            return Err(format!("invalid ao_factor {}", b.ao_factor));
        }
        if !(self.film.pass_alpha_threshold >= 0.0) {
            return Err(format!(
                "invalid pass_alpha_threshold {}",
                self.film.pass_alpha_threshold
            ));
        }
        Ok(())
    }
}

/// Optional settings must be non-negative and not NaN when present.
fn check_optional(name: &str, value: Option<Float>) -> Result<(), String> {
    match value {
        Some(v) if !(v >= 0.0) => Err(format!("invalid {name} {v}")),
        _ => Ok(()),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(KernelConfig::default().validate(), Ok(()));
    }

    #[test]
    fn clamps_min_above_max() {
        let mut config = KernelConfig::default();
        config.integrator.max_bounce = 0;
        config.integrator.transparent_max_bounce = 2;
        config.clamp_bounce_limits();
        assert_eq!(config.integrator.min_bounce, 0);
        assert_eq!(config.integrator.transparent_min_bounce, 2);
        assert_eq!(config.validate(), Ok(()));

        let mut config = KernelConfig::default();
        config.clamp_bounce_limits();
        assert_eq!(config.integrator.min_bounce, 3);
        assert_eq!(config.integrator.transparent_min_bounce, 8);
    }

    #[test]
    fn rejects_nan_clamp() {
        let mut config = KernelConfig::default();
        config.integrator.sample_clamp_direct = Some(Float::NAN);
        assert!(config.validate().is_err());

        config.integrator.sample_clamp_direct = Some(-1.0);
        assert!(config.validate().is_err());

        config.integrator.sample_clamp_direct = Some(10.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_bad_capacities() {
        let mut config = KernelConfig::default();
        config.integrator.volume_stack_size = VOLUME_STACK_SIZE + 1;
        assert!(config.validate().is_err());

        let mut config = KernelConfig::default();
        config.integrator.subsurface_max_hits = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_step_size() {
        let mut config = KernelConfig::default();
        config.integrator.volume_step_size = 0.0;
        assert!(config.validate().is_err());
        config.integrator.volume_step_size = Float::INFINITY;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_negative_ao_distance() {
        let mut config = KernelConfig::default();
        config.background.ao_distance = -1.0;
        assert!(config.validate().is_err());
    }
}
