//! Volume Integration

mod segment;
mod stack;

// Re-export.
pub use segment::*;
pub use stack::*;

use crate::config::KernelConfig;
use crate::emission::connect_light;
use crate::path_state::*;
use crate::radiance::PathRadiance;
use crate::sampler::PathSampler;
use crate::scene::*;
use crate::shader::*;
use pbrt_core::geometry::*;
use pbrt_core::pbrt::*;
use pbrt_core::rng::LCG;
use pbrt_core::spectrum::*;
use pbrt_core::{stat_counter, stat_inc, stat_register_fns};

stat_counter!(
    "Volume/Scatter events",
    VOLUME_SCATTERS,
    volume_stats_scatters,
);

stat_register_fns!(volume_stats_scatters);

/// Register the statistics of volume integration and of the volume stack.
pub(crate) fn register_volume_stats() {
    register_stats();
    stack::register_stats();
}

/// Shadow rays stop marching once every channel is attenuated below this.
const VOLUME_THROUGHPUT_EPSILON: Float = 1e-6;

/// Outcome of integrating a ray segment through the current media.
#[derive(Clone, Debug)]
pub enum VolumeIntegrateResult {
    /// The path passed the segment; throughput holds the attenuation.
    Attenuated,

    /// The path scatters at the returned volume point.
    Scattered(Box<ShaderData>),
}

/// How a segment is integrated.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VolumeStrategy {
    /// Walk the steps once and decide scattering inline.
    Direct,

    /// Record the steps first and sample positions from the record.
    Decoupled,
}

/// Integrates emission, attenuation and scattering along ray segments inside
/// the media of a path's volume stack.
pub struct VolumeIntegrator<'a> {
    /// The scene.
    scene: &'a Scene,

    /// Kernel configuration.
    config: &'a KernelConfig,
}

impl<'a> VolumeIntegrator<'a> {
    /// Create a new `VolumeIntegrator`.
    ///
    /// * `scene`  - The scene.
    /// * `config` - Kernel configuration.
    pub fn new(scene: &'a Scene, config: &'a KernelConfig) -> Self {
        Self { scene, config }
    }

    /// Returns the strategy for the media in `stack`. Equiangular and multiple
    /// importance sampling require recorded segments.
    ///
    /// * `stack` - Volume stack.
    pub fn strategy(&self, stack: &VolumeStack) -> VolumeStrategy {
        let settings = &self.config.integrator;
        if !settings.volume_decoupled {
            VolumeStrategy::Direct
        } else if stack.sampling_method(&*self.scene.volumes) != VolumeSampling::Distance
            || settings.sample_all_lights_direct
        {
            VolumeStrategy::Decoupled
        } else {
            VolumeStrategy::Direct
        }
    }

    /// Integrate a camera or indirect ray segment with the configured
    /// strategy. A scattering path has its direct light connected at the
    /// returned point; the caller continues it with `bounce()`.
    ///
    /// * `sampler`    - Sample source.
    /// * `state`      - Path state.
    /// * `ray`        - Segment ray, `t_max` is the segment length.
    /// * `throughput` - Path throughput.
    /// * `radiance`   - Path radiance.
    pub fn integrate(
        &self,
        sampler: &mut dyn PathSampler,
        state: &mut PathState,
        ray: &Ray,
        throughput: &mut Spectrum,
        radiance: &mut PathRadiance,
    ) -> VolumeIntegrateResult {
        match self.strategy(&state.volume_stack) {
            VolumeStrategy::Direct => {
                let result = self.integrate_direct(sampler, state, ray, throughput, radiance);
                if let VolumeIntegrateResult::Scattered(sd) = &result {
                    connect_light(self.scene, self.config, sampler, sd, state, throughput, radiance);
                }
                result
            }
            VolumeStrategy::Decoupled => self.integrate_decoupled(sampler, state, ray, throughput, radiance),
        }
    }

    /// Evaluate the coefficients of the stack at distance `t` along `ray`.
    fn coefficients(&self, stack: &VolumeStack, ray: &Ray, t: Float) -> VolumeCoefficients {
        stack.eval(&*self.scene.volumes, &ray.at(t), ray.time)
    }

    /// Walk the segment once, accumulating emission and deciding scattering
    /// as the optical depth of a randomly chosen channel crosses a sampled
    /// target.
    ///
    /// * `sampler`    - Sample source.
    /// * `state`      - Path state.
    /// * `ray`        - Segment ray.
    /// * `throughput` - Path throughput.
    /// * `radiance`   - Path radiance.
    pub fn integrate_direct(
        &self,
        sampler: &mut dyn PathSampler,
        state: &mut PathState,
        ray: &Ray,
        throughput: &mut Spectrum,
        radiance: &mut PathRadiance,
    ) -> VolumeIntegrateResult {
        let heterogeneous = state.volume_stack.is_heterogeneous(&*self.scene.volumes);
        let layout = StepLayout::new(
            ray.t_max,
            heterogeneous,
            &self.config.integrator,
            &mut state.rng_congruential,
        );

        let (channel, xi) = pick_channel(state.rng_1d_for_decision(sampler, PRNG_SCATTER_DISTANCE));
        let target = tau_target(xi);

        let mut tau = Spectrum::ZERO;
        let mut emission = Spectrum::ZERO;
        let mut flags = ShaderFlags::empty();
        let mut scatter: Option<(Float, Spectrum, Float)> = None;

        for (t0, t1, shade) in layout.steps() {
            let coeff = self.coefficients(&state.volume_stack, ray, shade);
            let step = VolumeStep::new(&coeff, t0, t1, shade, &tau);
            flags |= coeff.closure_flag();
            emission += step.emission;

            if scatter.is_none() && step.tau[channel] > target && step.sigma_t[channel] > 0.0 {
                let t = clamp(t0 + (target - tau[channel]) / step.sigma_t[channel], t0, t1);
                if t < ray.t_max {
                    let transmittance = (-step.tau_at(&tau, t)).exp();
                    let pdf = (step.sigma_t * transmittance).average();
                    if pdf > 0.0 {
                        scatter = Some((t, transmittance * step.sigma_s / pdf, step.anisotropy));
                    }
                }
            }

            tau = step.tau;
        }

        if flags.contains(ShaderFlags::EMISSION) {
            radiance.accum_emission(throughput, &emission, state.bounce);
        }

        let transmittance = (-tau).exp();
        if !flags.contains(ShaderFlags::SCATTER) {
            *throughput *= transmittance;
            return VolumeIntegrateResult::Attenuated;
        }

        match scatter {
            Some((t, weight, anisotropy)) => {
                stat_inc!(VOLUME_SCATTERS, 1);
                *throughput *= weight;
                VolumeIntegrateResult::Scattered(Box::new(scatter_point(ray, t, anisotropy)))
            }
            None => {
                let pass = transmittance.average();
                if pass > 0.0 {
                    *throughput *= transmittance / pass;
                } else {
                    *throughput = Spectrum::ZERO;
                }
                VolumeIntegrateResult::Attenuated
            }
        }
    }

    /// Record the steps of a segment.
    ///
    /// * `state` - Path state.
    /// * `ray`   - Segment ray.
    pub fn record(&self, state: &mut PathState, ray: &Ray) -> VolumeSegment {
        let volumes = &*self.scene.volumes;
        let heterogeneous = state.volume_stack.is_heterogeneous(volumes);
        let mut segment = VolumeSegment::new(ray.t_max, state.volume_stack.sampling_method(volumes));
        let layout = StepLayout::new(
            ray.t_max,
            heterogeneous,
            &self.config.integrator,
            &mut state.rng_congruential,
        );

        let mut tau = Spectrum::ZERO;
        for (t0, t1, shade) in layout.steps() {
            let coeff = self.coefficients(&state.volume_stack, ray, shade);
            let step = VolumeStep::new(&coeff, t0, t1, shade, &tau);
            tau = step.tau;
            segment.push(step, coeff.closure_flag());
        }
        segment
    }

    /// Integrate a segment from its recorded steps. Direct light is connected
    /// at a position chosen independently of the indirect scatter decision.
    ///
    /// * `sampler`    - Sample source.
    /// * `state`      - Path state.
    /// * `ray`        - Segment ray.
    /// * `throughput` - Path throughput.
    /// * `radiance`   - Path radiance.
    pub fn integrate_decoupled(
        &self,
        sampler: &mut dyn PathSampler,
        state: &mut PathState,
        ray: &Ray,
        throughput: &mut Spectrum,
        radiance: &mut PathRadiance,
    ) -> VolumeIntegrateResult {
        let segment = self.record(state, ray);

        if segment.closure_flag.contains(ShaderFlags::EMISSION) {
            radiance.accum_emission(throughput, &segment.accum_emission, state.bounce);
        }

        let mut result = VolumeIntegrateResult::Attenuated;
        if segment.closure_flag.contains(ShaderFlags::SCATTER) {
            self.connect_light_decoupled(sampler, state, ray, &segment, throughput, radiance);

            let xi = state.rng_1d_for_decision(sampler, PRNG_SCATTER_DISTANCE);
            if let Some((t, anisotropy)) = segment.decoupled_scatter(ray, throughput, xi, true, None) {
                stat_inc!(VOLUME_SCATTERS, 1);
                result = VolumeIntegrateResult::Scattered(Box::new(scatter_point(ray, t, anisotropy)));
            }
        }

        if matches!(result, VolumeIntegrateResult::Attenuated) {
            *throughput *= segment.accum_transmittance;
        }
        segment.release();
        result
    }

    /// Connect direct light at a position inside a recorded segment, chosen
    /// with the segment's sampling method toward a sampled light position.
    fn connect_light_decoupled(
        &self,
        sampler: &mut dyn PathSampler,
        state: &PathState,
        ray: &Ray,
        segment: &VolumeSegment,
        throughput: &Spectrum,
        radiance: &mut PathRadiance,
    ) {
        if !self.config.integrator.use_direct_light {
            return;
        }

        let (light_u, light_v) = state.rng_2d(sampler, PRNG_LIGHT_U);
        let anchor = self.scene.lights.sample_position(light_u, light_v, ray.time);
        let xi = state.rng_1d_for_decision(sampler, PRNG_PHASE);

        let mut tp = *throughput;
        if let Some((t, anisotropy)) = segment.decoupled_scatter(ray, &mut tp, xi, false, anchor.as_ref()) {
            let sd = scatter_point(ray, t, anisotropy);
            connect_light(self.scene, self.config, sampler, &sd, state, &tp, radiance);
        }
    }

    /// Continue a path from a volume scatter point by sampling the phase
    /// function, followed by Russian roulette. Returns false when the path
    /// ends.
    ///
    /// * `sampler`    - Sample source.
    /// * `sd`         - The scatter point.
    /// * `state`      - Path state.
    /// * `throughput` - Path throughput.
    /// * `radiance`   - Path radiance.
    /// * `ray`        - Receives the continuation ray.
    /// * `policy`     - Termination policy.
    #[allow(clippy::too_many_arguments)]
    pub fn bounce(
        &self,
        sampler: &mut dyn PathSampler,
        sd: &ShaderData,
        state: &mut PathState,
        throughput: &mut Spectrum,
        radiance: &mut PathRadiance,
        ray: &mut Ray,
        policy: &dyn TerminationPolicy,
    ) -> bool {
        let (phase_u, phase_v) = state.rng_2d(sampler, PRNG_PHASE_U);
        let sample = match self.scene.bounce.sample_phase(sd, phase_u, phase_v) {
            Some(s) if s.pdf > 0.0 && !s.eval.is_zero() => s,
            _ => return false,
        };

        radiance.bsdf_bounce(throughput, &sample.eval, sample.pdf, state.bounce, sample.label);

        state.ray_pdf = sample.pdf;
        state.ray_t = 0.0;
        state.min_ray_pdf = min(sample.pdf, state.min_ray_pdf);
        state.next(sample.label);

        let probability = policy.continuation_probability(state, throughput);
        if probability == 0.0 {
            return false;
        } else if probability != 1.0 {
            // The previous bounce's termination dimension is still unused.
            let dimension = state.rng_offset + PRNG_TERMINATE - PRNG_BOUNCE_NUM;
            let terminate = sampler.sample_1d(state.sample, dimension);
            if terminate >= probability {
                return false;
            }
            *throughput /= probability;
        }

        *ray = Ray::new(sd.p, sample.omega_in, FLOAT_MAX, sd.time);
        true
    }

    /// Returns the transmittance of the media in `stack` along a shadow ray.
    ///
    /// * `stack` - Volume stack of the shadow ray.
    /// * `ray`   - The shadow ray.
    /// * `rng`   - Congruential stream for step jitter.
    pub fn shadow_transmittance(&self, stack: &VolumeStack, ray: &Ray, rng: &mut LCG) -> Spectrum {
        if stack.is_empty() || ray.t_max <= 0.0 {
            return Spectrum::ONE;
        }

        let heterogeneous = stack.is_heterogeneous(&*self.scene.volumes);
        let layout = StepLayout::new(ray.t_max, heterogeneous, &self.config.integrator, rng);

        let mut tau = Spectrum::ZERO;
        for (t0, t1, shade) in layout.steps() {
            let coeff = self.coefficients(stack, ray, shade);
            tau += coeff.sigma_t() * (t1 - t0);
            if (-tau).exp().max_component_value() < VOLUME_THROUGHPUT_EPSILON {
                return Spectrum::ZERO;
            }
        }
        (-tau).exp()
    }
}

/// Build the shading point of a volume scattering event.
///
/// * `ray`        - The segment ray.
/// * `t`          - Distance of the event.
/// * `anisotropy` - Phase anisotropy at the event.
pub fn scatter_point(ray: &Ray, t: Float, anisotropy: Float) -> ShaderData {
    let mut sd = ShaderData::volume(ray, t);
    sd.push_closure(ShaderClosure::new(ClosureType::VolumeScatter, Spectrum::ONE, -ray.d).with_anisotropy(anisotropy));
    sd
}
