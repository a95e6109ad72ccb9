//! Emission

use crate::config::KernelConfig;
use crate::path_state::*;
use crate::radiance::PathRadiance;
use crate::sampler::PathSampler;
use crate::scene::*;
use crate::shader::*;
use crate::shadow::shadow_blocked;
use crate::volume::VolumeIntegrator;
use pbrt_core::geometry::*;
use pbrt_core::pbrt::*;
use pbrt_core::sampling::power_heuristic;
use pbrt_core::spectrum::*;

/// A light sample evaluated through the closures of a shading point.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LightConnection {
    /// Light contribution split per pass category.
    pub eval: BsdfEval,

    /// Shadow ray toward the light; `t_max == 0` when no shadow is cast.
    pub ray: Ray,

    /// The light is a lamp.
    pub is_lamp: bool,
}

/// Evaluate a sampled light through the closures at `sd` and build the
/// shadow ray. Returns `None` when the sample contributes nothing or is
/// terminated by the light sampling threshold.
///
/// * `scene`     - The scene.
/// * `config`    - Kernel configuration.
/// * `sd`        - The shading point.
/// * `ls`        - The light sample.
/// * `terminate` - Random number for light termination.
pub fn direct_emission(
    scene: &Scene,
    config: &KernelConfig,
    sd: &ShaderData,
    ls: &DirectLight,
    terminate: Float,
) -> Option<LightConnection> {
    if !(ls.pdf > 0.0) || ls.eval.is_black() {
        return None;
    }
    let light_eval = ls.eval / ls.pdf;

    let (mut eval, bsdf_pdf) = if sd.is_surface() {
        scene.bounce.eval_bsdf(sd, &ls.d)
    } else {
        scene.bounce.eval_phase(sd, &ls.d)
    };

    if ls.use_mis {
        eval.mis(power_heuristic(ls.pdf, bsdf_pdf));
    }

    eval.mul(light_eval);
    if eval.is_zero() {
        return None;
    }

    let threshold = config.integrator.light_sampling_threshold;
    if threshold > 0.0 {
        let probability = eval.sum().map(Float::abs).max_component_value() / threshold;
        if probability < 1.0 {
            if terminate >= probability {
                return None;
            }
            eval.mul(Spectrum::splat(1.0 / probability));
        }
    }

    let ray = if ls.cast_shadow {
        let origin = if sd.is_surface() {
            let ng = if ls.d.dot(&sd.ng) < 0.0 { -sd.ng } else { sd.ng };
            offset_ray_origin(&sd.p, &ng)
        } else {
            sd.p
        };

        if ls.t == FLOAT_MAX {
            Ray::new(origin, ls.d, FLOAT_MAX, sd.time)
        } else {
            let to_light = offset_ray_origin(&ls.p, &ls.ng) - origin;
            let distance = to_light.length();
            if distance <= 0.0 {
                return None;
            }
            Ray::new(origin, to_light / distance, distance, sd.time)
        }
    } else {
        Ray::new(sd.p, ls.d, 0.0, sd.time)
    };

    Some(LightConnection {
        eval,
        ray,
        is_lamp: ls.is_lamp,
    })
}

/// Sample one light from `sd` and add its unoccluded contribution. Blocked
/// samples still feed the shadow catcher totals.
///
/// * `scene`      - The scene.
/// * `config`     - Kernel configuration.
/// * `sampler`    - Sample source.
/// * `sd`         - The shading point.
/// * `state`      - Path state providing the sampling dimensions.
/// * `throughput` - Path throughput.
/// * `radiance`   - Receives the contribution.
pub fn connect_light(
    scene: &Scene,
    config: &KernelConfig,
    sampler: &mut dyn PathSampler,
    sd: &ShaderData,
    state: &PathState,
    throughput: &Spectrum,
    radiance: &mut PathRadiance,
) {
    if !config.integrator.use_direct_light {
        return;
    }
    if sd.is_surface() && !sd.flag.contains(ShaderFlags::BSDF_HAS_EVAL) {
        return;
    }

    let light_t = state.rng_1d(sampler, PRNG_LIGHT);
    let (light_u, light_v) = state.rng_2d(sampler, PRNG_LIGHT_U);
    let ctx = state.shading_context(sd.randb_closure);
    let ls = match scene.lights.sample_direct(sd, &ctx, [light_t, light_u, light_v]) {
        Some(ls) => ls,
        None => return,
    };

    let terminate = state.rng_light_termination(sampler, config.integrator.light_sampling_threshold);
    if let Some(connection) = direct_emission(scene, config, sd, &ls, terminate) {
        let shadow_linking = scene.lights.shadow_linking(sd.object);
        match shadow_blocked(scene, config, state, &connection.ray, shadow_linking) {
            Some(shadow) => radiance.accum_light(
                state,
                throughput,
                &connection.eval,
                &shadow,
                1.0,
                connection.is_lamp,
            ),
            None => radiance.accum_total_light(state, throughput, &connection.eval),
        }
    }
}

/// Returns the emission of a surface hit by an indirect ray, weighted
/// against light sampling unless the previous bounce skipped it.
///
/// * `scene` - The scene.
/// * `sd`    - The emissive shading point.
/// * `t`     - Hit distance.
/// * `state` - Path state.
pub fn indirect_primitive_emission(scene: &Scene, sd: &ShaderData, t: Float, state: &PathState) -> Spectrum {
    let emission = sd.emission();
    if !state.flag.contains(PathRayFlag::MIS_SKIP) && sd.flag.contains(ShaderFlags::USE_MIS) {
        let light_pdf = scene.lights.primitive_emission_pdf(sd, t);
        emission * power_heuristic(state.ray_pdf, light_pdf)
    } else {
        emission
    }
}

/// Returns the emission of lamps along `ray`, weighted against light
/// sampling and attenuated by the media the path is inside of.
///
/// * `scene`  - The scene.
/// * `config` - Kernel configuration.
/// * `state`  - Path state.
/// * `ray`    - Ray from the previous non-transparent vertex.
pub fn indirect_lamp_emission(scene: &Scene, config: &KernelConfig, state: &PathState, ray: &Ray) -> Spectrum {
    let ctx = state.shading_context(0.0);
    let mut total = Spectrum::ZERO;
    for lamp in scene.lights.lamp_emission(ray, &ctx) {
        let mut emission = lamp.eval;
        if !state.flag.contains(PathRayFlag::MIS_SKIP) {
            emission *= power_heuristic(state.ray_pdf, lamp.pdf);
        }

        if !state.volume_stack.is_empty() {
            let volume_ray = Ray::new(ray.o, ray.d, lamp.t, ray.time);
            let mut rng = state.rng_congruential;
            emission *= VolumeIntegrator::new(scene, config).shadow_transmittance(
                &state.volume_stack,
                &volume_ray,
                &mut rng,
            );
        }

        total += emission;
    }
    total
}

/// Returns the background radiance along `ray`, weighted against light
/// sampling when the background is importance sampled.
///
/// * `scene` - The scene.
/// * `state` - Path state.
/// * `ray`   - The escaping ray.
pub fn indirect_background(scene: &Scene, state: &PathState, ray: &Ray) -> Spectrum {
    let background = scene.lights.background(ray);
    if state.flag.contains(PathRayFlag::MIS_SKIP) {
        return background;
    }
    match scene.lights.background_pdf(ray) {
        Some(pdf) => background * power_heuristic(state.ray_pdf, pdf),
        None => background,
    }
}
