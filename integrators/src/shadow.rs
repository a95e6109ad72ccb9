//! Shadow Rays

use crate::config::KernelConfig;
use crate::path_state::*;
use crate::scene::*;
use crate::volume::VolumeIntegrator;
use pbrt_core::geometry::*;
use pbrt_core::pbrt::*;
use pbrt_core::spectrum::*;

/// Trace a shadow ray. Returns `None` if the light is blocked, otherwise the
/// transmittance through transparent surfaces and media.
///
/// Without transparent shadows any hit blocks. With them, hits are stepped
/// through up to the transparent bounce limit, attenuating by surface
/// transparency and by the media between hits, updating a private copy of
/// the volume stack at every boundary.
///
/// * `scene`          - The scene.
/// * `config`         - Kernel configuration.
/// * `state`          - Path state of the shading point.
/// * `ray`            - The shadow ray.
/// * `shadow_linking` - Opaque shadow linking mask.
pub fn shadow_blocked(
    scene: &Scene,
    config: &KernelConfig,
    state: &PathState,
    ray: &Ray,
    shadow_linking: u32,
) -> Option<Spectrum> {
    if ray.t_max == 0.0 {
        return Some(Spectrum::ONE);
    }

    let mut visibility = PathRayFlag::SHADOW;
    if state.flag.contains(PathRayFlag::AO) {
        visibility |= PathRayFlag::AO;
    }

    let settings = &config.integrator;
    let volumes = VolumeIntegrator::new(scene, config);
    let mut rng = state.rng_congruential;

    if !settings.transparent_shadows {
        if scene.intersector.intersect_shadow(ray, visibility, shadow_linking).is_some() {
            return None;
        }
        return Some(volumes.shadow_transmittance(&state.volume_stack, ray, &mut rng));
    }

    let mut stack = state.volume_stack.clone();
    let mut bounce = state.transparent_bounce;
    let mut throughput = Spectrum::ONE;
    let mut segment = *ray;

    loop {
        let isect = match scene.intersector.intersect_shadow(&segment, visibility, shadow_linking) {
            Some(isect) => isect,
            None => {
                throughput *= volumes.shadow_transmittance(&stack, &segment, &mut rng);
                break;
            }
        };

        if bounce >= settings.transparent_max_bounce {
            return None;
        }
        let transparency = scene.shading.shadow_transparency(&isect, &segment)?;

        let to_hit = Ray::new(segment.o, segment.d, isect.t, segment.time);
        throughput *= volumes.shadow_transmittance(&stack, &to_hit, &mut rng);
        throughput *= transparency;
        if throughput.is_black() {
            return None;
        }

        if settings.use_volumes {
            if let Some(boundary) = scene.shading.volume_boundary(&isect, &segment) {
                stack.enter_exit(&boundary);
            }
        }

        let p = offset_ray_origin(&segment.at(isect.t), &segment.d);
        let t_max = if segment.t_max == FLOAT_MAX {
            FLOAT_MAX
        } else {
            segment.t_max - (p - segment.o).length()
        };
        if t_max <= 0.0 {
            break;
        }
        segment = Ray::new(p, segment.d, t_max, segment.time);
        bounce += 1;
    }

    if throughput.is_black() {
        None
    } else {
        Some(throughput)
    }
}
