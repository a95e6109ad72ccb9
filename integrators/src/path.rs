//! Path Integrator

use crate::config::KernelConfig;
use crate::emission::*;
use crate::path_state::*;
use crate::radiance::PathRadiance;
use crate::sampler::PathSampler;
use crate::scene::*;
use crate::shader::*;
use crate::subsurface::*;
use crate::surface::SurfaceBounceEngine;
use crate::volume::*;
use pbrt_core::film::{OutputBuffer, PassFlags, PassType};
use pbrt_core::geometry::*;
use pbrt_core::pbrt::*;
use pbrt_core::spectrum::*;
use pbrt_core::{stat_counter, stat_dist, stat_inc, stat_int_distribution, stat_percent, stat_register_fns};
use std::sync::Arc;

stat_counter!("Integrator/Camera paths", CAMERA_PATHS, path_stats_camera_paths);
stat_int_distribution!("Integrator/Path length", PATH_LENGTH, path_stats_path_length);
stat_percent!(
    "Integrator/Russian roulette terminations",
    RR_TERMINATED,
    RR_TESTED,
    path_stats_russian_roulette,
);

stat_register_fns!(
    path_stats_camera_paths,
    path_stats_path_length,
    path_stats_russian_roulette,
);

/// Why a path stopped bouncing.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PathTermination {
    /// The ray left the scene.
    BackgroundMiss,

    /// A camera ray left the scene through a transparent background.
    TransparentBackground,

    /// The ambient occlusion ray hit something.
    AoBounceBudget,

    /// A bounce limit was reached.
    ZeroProbability,

    /// Russian roulette ended the path.
    RussianRoulette,

    /// The surface could not be continued.
    NoContinuation,

    /// The path continues from subsurface re-entry points.
    SubsurfaceRedirect,

    /// A holdout mask object was hit by a camera ray.
    Holdout,

    /// The phase bounce after a volume scattering event failed.
    VolumeAbsorbed,
}

/// The result of one camera sample.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PathSample {
    /// Radiance and alpha.
    pub rgba: [Float; 4],

    /// How the camera path ended.
    pub termination: PathTermination,

    /// Bounces of the last traced path.
    pub bounces: u32,
}

/// Working values of one lane: the path being traced and the subsurface
/// continuations waiting behind it.
struct PathLane {
    state: PathState,
    ray: Ray,
    throughput: Spectrum,
    radiance: PathRadiance,
    l_transparent: Float,
    queue: SubsurfaceIndirectRays,
    camera_origin: Point3f,
}

/// Traces camera paths through a scene made of collaborator traits.
pub struct PathIntegrator {
    /// Configuration snapshot.
    config: KernelConfig,

    /// Decides path survival at every bounce.
    termination: Arc<dyn TerminationPolicy>,
}

impl PathIntegrator {
    /// Create a new `PathIntegrator` with bounce limit termination.
    /// Minimum bounce counts above their maximums are clamped.
    ///
    /// * `config` - Kernel configuration.
    pub fn new(mut config: KernelConfig) -> Result<Self, String> {
        config.clamp_bounce_limits();
        config.validate()?;

        crate::path::register_stats();
        crate::subsurface::register_stats();
        crate::volume::register_volume_stats();

        let termination = Arc::new(BounceLimitPolicy::new(&config.integrator));
        Ok(Self { config, termination })
    }

    /// Replace the termination policy.
    ///
    /// * `termination` - The policy.
    pub fn with_termination(mut self, termination: Arc<dyn TerminationPolicy>) -> Self {
        self.termination = termination;
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Trace one camera sample. Returns radiance and alpha; light and data
    /// passes are written to `buffer` at `index`.
    ///
    /// * `scene`   - The scene.
    /// * `sampler` - Sample source of the pixel.
    /// * `sample`  - Sample index.
    /// * `ray`     - Camera ray.
    /// * `buffer`  - Output buffer.
    /// * `index`   - Flattened pixel index.
    pub fn integrate(
        &self,
        scene: &Scene,
        sampler: &mut dyn PathSampler,
        sample: u32,
        ray: Ray,
        buffer: &mut dyn OutputBuffer,
        index: usize,
    ) -> [Float; 4] {
        self.integrate_traced(scene, sampler, sample, ray, buffer, index).rgba
    }

    /// Same as `integrate()` but also reports how the camera path ended.
    ///
    /// * `scene`   - The scene.
    /// * `sampler` - Sample source of the pixel.
    /// * `sample`  - Sample index.
    /// * `ray`     - Camera ray.
    /// * `buffer`  - Output buffer.
    /// * `index`   - Flattened pixel index.
    pub fn integrate_traced(
        &self,
        scene: &Scene,
        sampler: &mut dyn PathSampler,
        sample: u32,
        ray: Ray,
        buffer: &mut dyn OutputBuffer,
        index: usize,
    ) -> PathSample {
        stat_inc!(CAMERA_PATHS, 1);

        let mut lane = PathLane {
            state: PathState::new(&self.config, sampler.hash(), sample),
            ray,
            throughput: Spectrum::ONE,
            radiance: PathRadiance::new(self.config.film.use_light_pass()),
            l_transparent: 0.0,
            queue: SubsurfaceIndirectRays::new(self.config.integrator.subsurface_max_hits),
            camera_origin: ray.o,
        };

        let mut termination = None;
        loop {
            let ended = self.trace(scene, sampler, &mut lane, buffer, index);
            trace!("Path ended with {ended:?} after {} bounces", lane.state.bounce);
            termination.get_or_insert(ended);

            lane.queue.accum_indirect(&mut lane.radiance);
            if !lane.queue.setup_next(
                &mut lane.state,
                &mut lane.ray,
                &mut lane.radiance,
                &mut lane.throughput,
            ) {
                break;
            }
        }
        stat_dist!(PATH_LENGTH, lane.state.bounce as i64);

        let l_sum = if lane.state.flag.contains(PathRayFlag::SHADOW_CATCHER) {
            lane.radiance
                .sum_shadowcatcher(&self.config, &mut lane.l_transparent)
        } else {
            lane.radiance.clamp_and_sum(&self.config)
        };
        lane.radiance.write_light_passes(buffer, index);

        let [r, g, b] = l_sum.to_rgb();
        PathSample {
            rgba: [r, g, b, 1.0 - lane.l_transparent],
            termination: termination.unwrap_or(PathTermination::NoContinuation),
            bounces: lane.state.bounce,
        }
    }

    /// Trace the sample of pixel `(x, y)` and accumulate it in `buffer`.
    /// Rejected camera rays contribute nothing but still count as a sample.
    ///
    /// * `scene`   - The scene.
    /// * `sampler` - Sample source of the pixel.
    /// * `sample`  - Sample index.
    /// * `x`       - Pixel column.
    /// * `y`       - Pixel row.
    /// * `offset`  - Buffer offset.
    /// * `stride`  - Buffer row stride.
    /// * `ray`     - Camera ray.
    /// * `buffer`  - Output buffer.
    #[allow(clippy::too_many_arguments)]
    pub fn trace_pixel(
        &self,
        scene: &Scene,
        sampler: &mut dyn PathSampler,
        sample: u32,
        x: usize,
        y: usize,
        offset: isize,
        stride: usize,
        ray: &Ray,
        buffer: &mut dyn OutputBuffer,
    ) {
        let index = offset + (x + y * stride) as isize;
        if index < 0 {
            warn!("Pixel ({x}, {y}) lies before the buffer, skipping");
            return;
        }
        let index = index as usize;

        let rgba = if ray.is_rejected() {
            [0.0; 4]
        } else {
            self.integrate(scene, sampler, sample, *ray, buffer, index)
        };
        buffer.write_combined(index, sample, rgba);
    }

    /// Trace the lane's current path until it terminates.
    fn trace(
        &self,
        scene: &Scene,
        sampler: &mut dyn PathSampler,
        lane: &mut PathLane,
        buffer: &mut dyn OutputBuffer,
        index: usize,
    ) -> PathTermination {
        let settings = &self.config.integrator;
        let volumes = VolumeIntegrator::new(scene, &self.config);
        let surface = SurfaceBounceEngine::new(scene, &self.config);
        let subsurface = SubsurfaceReentryEngine::new(scene, &self.config);
        let policy = &*self.termination;

        let PathLane {
            state,
            ray,
            throughput,
            radiance,
            l_transparent,
            queue,
            camera_origin,
        } = lane;

        loop {
            debug!("Path bounce {}, throughput = {throughput}", state.bounce);

            let mut visibility = state.ray_visibility();
            let beyond_ao_budget = settings.ao_bounces.map_or(false, |n| state.bounce > n);
            if beyond_ao_budget {
                visibility = PathRayFlag::SHADOW;
                ray.t_max = self.config.background.ao_distance;
            }

            let hit = scene.intersector.intersect(ray, visibility);

            if settings.use_lamp_mis && !state.flag.contains(PathRayFlag::CAMERA) {
                let t = hit.map_or(ray.t_max, |isect| isect.t);
                let light_ray = Ray::new(ray.o - ray.d * state.ray_t, ray.d, state.ray_t + t, ray.time);
                state.ray_t += t;

                let emission = indirect_lamp_emission(scene, &self.config, state, &light_ray);
                if !emission.is_black() {
                    radiance.accum_emission(throughput, &emission, state.bounce);
                }
            }

            if settings.use_volumes {
                if hit.is_none() {
                    state.volume_stack.clean(self.config.background.volume_shader);
                }

                if !state.volume_stack.is_empty() {
                    let t_max = hit.map_or(FLOAT_MAX, |isect| isect.t);
                    let segment = Ray::new(ray.o, ray.d, t_max, ray.time);
                    if let VolumeIntegrateResult::Scattered(sd) =
                        volumes.integrate(sampler, state, &segment, throughput, radiance)
                    {
                        if volumes.bounce(sampler, &sd, state, throughput, radiance, ray, policy) {
                            continue;
                        }
                        return PathTermination::VolumeAbsorbed;
                    }
                }
            }

            let isect = match hit {
                Some(isect) => isect,
                None => {
                    if self.config.background.transparent && state.flag.contains(PathRayFlag::CAMERA) {
                        *l_transparent += throughput.average();
                        if !self.config.film.passes.contains(PassFlags::BACKGROUND) {
                            return PathTermination::TransparentBackground;
                        }
                    }

                    let background = indirect_background(scene, state, ray);
                    radiance.accum_background(state, throughput, &background);
                    return PathTermination::BackgroundMiss;
                }
            };

            if beyond_ao_budget {
                return PathTermination::AoBounceBudget;
            }

            let randb = state.rng_1d_for_decision(sampler, PRNG_BSDF);
            let mut sd = scene.shading.evaluate(&isect, ray, &state.shading_context(randb));
            sd.randb_closure = randb;

            if sd.object_flag.contains(ObjectFlags::SHADOW_CATCHER) {
                if state.flag.contains(PathRayFlag::CAMERA) {
                    state.flag |= PathRayFlag::SHADOW_CATCHER | PathRayFlag::SHADOW_CATCHER_ONLY;
                    state.catcher_object = Some(sd.object);
                    if !self.config.background.transparent {
                        radiance.shadow_color = indirect_background(scene, state, ray);
                    }
                }
            } else {
                state.flag &= !PathRayFlag::SHADOW_CATCHER_ONLY;
            }

            let holdout_mask = sd.object_flag.contains(ObjectFlags::HOLDOUT_MASK);
            if (holdout_mask || sd.flag.contains(ShaderFlags::HOLDOUT)) && state.flag.contains(PathRayFlag::CAMERA) {
                if self.config.background.transparent {
                    let weight = if holdout_mask { Spectrum::ONE } else { sd.holdout() };
                    *l_transparent += (weight * *throughput).average();
                }
                if holdout_mask {
                    return PathTermination::Holdout;
                }
            }

            self.write_data_passes(buffer, index, &sd, state, throughput, radiance, camera_origin);

            surface.blur_glossy(state, &mut sd);

            if sd.flag.contains(ShaderFlags::EMISSION) {
                let emission = indirect_primitive_emission(scene, &sd, isect.t, state);
                radiance.accum_emission(throughput, &emission, state.bounce);
            }

            let probability = policy.continuation_probability(state, throughput);
            if probability == 0.0 {
                return PathTermination::ZeroProbability;
            } else if probability != 1.0 {
                stat_inc!(RR_TESTED, 1);
                let terminate = state.rng_1d_for_decision(sampler, PRNG_TERMINATE);
                if terminate >= probability {
                    stat_inc!(RR_TERMINATED, 1);
                    return PathTermination::RussianRoulette;
                }
                *throughput /= probability;
            }

            if settings.use_ambient_occlusion || sd.flag.contains(ShaderFlags::AO) {
                let alpha = sd.alpha();
                surface.ambient_occlusion(sampler, &sd, state, throughput, radiance, &alpha);
            }

            if settings.use_subsurface && sd.flag.contains(ShaderFlags::BSSRDF) {
                if subsurface.scatter(sampler, &mut sd, state, throughput, ray, radiance, queue) {
                    return PathTermination::SubsurfaceRedirect;
                }
            }

            surface.connect_light(sampler, &sd, state, throughput, radiance);

            if !surface.bounce(sampler, &sd, state, throughput, radiance, ray) {
                return PathTermination::NoContinuation;
            }
        }
    }

    /// Write depth, normal and object id at the first camera hit opaque
    /// enough to count, and gather albedo for the color passes.
    #[allow(clippy::too_many_arguments)]
    fn write_data_passes(
        &self,
        buffer: &mut dyn OutputBuffer,
        index: usize,
        sd: &ShaderData,
        state: &mut PathState,
        throughput: &Spectrum,
        radiance: &mut PathRadiance,
        camera_origin: &Point3f,
    ) {
        if !state.flag.contains(PathRayFlag::CAMERA) {
            return;
        }

        let passes = buffer.passes();
        if !state.flag.contains(PathRayFlag::SINGLE_PASS_DONE) {
            let threshold = self.config.film.pass_alpha_threshold;
            if !sd.flag.contains(ShaderFlags::TRANSPARENT)
                || threshold == 0.0
                || sd.alpha().average() >= threshold
            {
                if passes.contains(PassFlags::DEPTH) {
                    let depth = (sd.p - *camera_origin).length();
                    buffer.write_pass(index, PassType::Depth, [depth, 0.0, 0.0, 0.0]);
                }
                if passes.contains(PassFlags::NORMAL) {
                    buffer.write_pass(index, PassType::Normal, [sd.n.x, sd.n.y, sd.n.z, 0.0]);
                }
                if passes.contains(PassFlags::OBJECT_ID) {
                    buffer.write_pass(index, PassType::ObjectId, [sd.object as Float, 0.0, 0.0, 0.0]);
                }
                state.flag |= PathRayFlag::SINGLE_PASS_DONE;
            }
        }

        if passes.intersects(PassFlags::DIFFUSE_COLOR) {
            radiance.color_diffuse += sd.diffuse_color() * *throughput;
        }
        if passes.intersects(PassFlags::GLOSSY_COLOR) {
            radiance.color_glossy += sd.glossy_color() * *throughput;
        }
        if passes.intersects(PassFlags::TRANSMISSION_COLOR) {
            radiance.color_transmission += sd.transmission_color() * *throughput;
        }
        if passes.intersects(PassFlags::SUBSURFACE_COLOR) {
            radiance.color_subsurface += sd.subsurface_color() * *throughput;
        }
    }
}
