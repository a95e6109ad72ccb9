//! Surface Bounce

use crate::config::{KernelConfig, VOLUME_BOUNDS_MAX};
use crate::emission;
use crate::path_state::*;
use crate::radiance::PathRadiance;
use crate::sampler::PathSampler;
use crate::scene::*;
use crate::shader::*;
use crate::shadow::shadow_blocked;
use pbrt_core::geometry::*;
use pbrt_core::pbrt::*;
use pbrt_core::sampling::sample_cos_hemisphere;
use pbrt_core::spectrum::*;

/// Continues paths from surface hits and gathers what can be computed at the
/// hit itself: direct light and ambient occlusion.
pub struct SurfaceBounceEngine<'a> {
    /// The scene.
    scene: &'a Scene,

    /// Kernel configuration.
    config: &'a KernelConfig,
}

impl<'a> SurfaceBounceEngine<'a> {
    /// Create a new `SurfaceBounceEngine`.
    ///
    /// * `scene`  - The scene.
    /// * `config` - Kernel configuration.
    pub fn new(scene: &'a Scene, config: &'a KernelConfig) -> Self {
        Self { scene, config }
    }

    /// Sample one light from the surface point and add its contribution.
    ///
    /// * `sampler`    - Sample source.
    /// * `sd`         - The shading point.
    /// * `state`      - Path state.
    /// * `throughput` - Path throughput.
    /// * `radiance`   - Path radiance.
    pub fn connect_light(
        &self,
        sampler: &mut dyn PathSampler,
        sd: &ShaderData,
        state: &PathState,
        throughput: &Spectrum,
        radiance: &mut PathRadiance,
    ) {
        emission::connect_light(self.scene, self.config, sampler, sd, state, throughput, radiance);
    }

    /// Sample the closures at `sd` and set up the continuation ray. Returns
    /// false if the path has nowhere to go.
    ///
    /// Volume-only surfaces are stepped through without scattering; they do
    /// not count as transparent bounces but are bounded on their own.
    ///
    /// * `sampler`    - Sample source.
    /// * `sd`         - The shading point.
    /// * `state`      - Path state.
    /// * `throughput` - Path throughput.
    /// * `radiance`   - Path radiance.
    /// * `ray`        - The incoming ray; receives the continuation.
    pub fn bounce(
        &self,
        sampler: &mut dyn PathSampler,
        sd: &ShaderData,
        state: &mut PathState,
        throughput: &mut Spectrum,
        radiance: &mut PathRadiance,
        ray: &mut Ray,
    ) -> bool {
        if sd.flag.contains(ShaderFlags::BSDF) {
            let (bsdf_u, bsdf_v) = state.rng_2d(sampler, PRNG_BSDF_U);
            let sample = match self.scene.bounce.sample_bsdf(sd, bsdf_u, bsdf_v) {
                Some(s) if s.pdf > 0.0 && !s.eval.is_zero() => s,
                _ => return false,
            };

            radiance.bsdf_bounce(throughput, &sample.eval, sample.pdf, state.bounce, sample.label);

            let transparent = sample.label.contains(LabelFlags::TRANSPARENT);
            if !transparent {
                state.ray_pdf = sample.pdf;
                state.ray_t = 0.0;
                state.min_ray_pdf = min(sample.pdf, state.min_ray_pdf);
            }

            state.next(sample.label);
            if transparent && !self.config.integrator.transparent_shadows {
                state.flag |= PathRayFlag::MIS_SKIP;
            }

            let transmit = sample.label.contains(LabelFlags::TRANSMIT);
            let ng = if transmit { -sd.ng } else { sd.ng };
            let o = offset_ray_origin(&sd.p, &ng);
            *ray = Ray::new(o, sample.omega_in.normalize(), self.continuation_extent(sd, state, ray), sd.time);

            if transmit && self.config.integrator.use_volumes {
                state.volume_stack.enter_exit_surface(sd);
            }
            true
        } else if sd.flag.contains(ShaderFlags::HAS_ONLY_VOLUME) {
            state.volume_bounds_bounce += 1;
            if state.volume_bounds_bounce > VOLUME_BOUNDS_MAX {
                warn!("Path crossed {} volume bounds, terminating", state.volume_bounds_bounce);
                return false;
            }

            let o = offset_ray_origin(&sd.p, &(-sd.ng));
            *ray = Ray::new(o, ray.d, self.continuation_extent(sd, state, ray), sd.time);

            if self.config.integrator.use_volumes {
                state.volume_stack.enter_exit_surface(sd);
            }
            true
        } else {
            false
        }
    }

    /// Camera rays keep their clipping distance, measured from the camera.
    fn continuation_extent(&self, sd: &ShaderData, state: &PathState, ray: &Ray) -> Float {
        if state.bounce == 0 && ray.t_max != FLOAT_MAX {
            ray.t_max - sd.ray_length
        } else {
            FLOAT_MAX
        }
    }

    /// Trace one ambient occlusion ray from the surface point.
    ///
    /// * `sampler`    - Sample source.
    /// * `sd`         - The shading point.
    /// * `state`      - Path state; the AO flag is set while tracing.
    /// * `throughput` - Path throughput.
    /// * `radiance`   - Path radiance.
    /// * `alpha`      - Surface opacity.
    pub fn ambient_occlusion(
        &self,
        sampler: &mut dyn PathSampler,
        sd: &ShaderData,
        state: &mut PathState,
        throughput: &Spectrum,
        radiance: &mut PathRadiance,
        alpha: &Spectrum,
    ) {
        let (u, v) = state.rng_2d(sampler, PRNG_BSDF_U);
        let (ao_bsdf, ao_n) = sd.ao(self.config.background.ao_factor);
        let (ao_d, ao_pdf) = sample_cos_hemisphere(&ao_n, u, v);

        if sd.ng.dot(&ao_d) <= 0.0 || ao_pdf == 0.0 {
            return;
        }

        let ray = Ray::new(
            offset_ray_origin(&sd.p, &sd.ng),
            ao_d,
            self.config.background.ao_distance,
            sd.time,
        );

        state.flag |= PathRayFlag::AO;
        let shadow_linking = self.scene.lights.shadow_linking(sd.object);
        if let Some(shadow) = shadow_blocked(self.scene, self.config, state, &ray, shadow_linking) {
            radiance.accum_ao(state, throughput, alpha, &ao_bsdf, &shadow);
        }
        state.flag &= !PathRayFlag::AO;
    }

    /// Blur glossy closures in proportion to how diffuse the path already
    /// is, reducing caustic noise.
    ///
    /// * `state` - Path state.
    /// * `sd`    - The shading point.
    pub fn blur_glossy(&self, state: &PathState, sd: &mut ShaderData) {
        if let Some(filter_glossy) = self.config.integrator.filter_glossy {
            let blur_pdf = filter_glossy * state.min_ray_pdf;
            if blur_pdf < 1.0 {
                sd.blur((1.0 - blur_pdf).sqrt() * 0.5);
            }
        }
    }
}
