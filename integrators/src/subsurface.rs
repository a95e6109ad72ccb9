//! Subsurface Scattering

use crate::config::{KernelConfig, BSSRDF_MAX_HITS};
use crate::path_state::*;
use crate::radiance::PathRadiance;
use crate::sampler::PathSampler;
use crate::scene::*;
use crate::shader::*;
use crate::surface::SurfaceBounceEngine;
use pbrt_core::geometry::*;
use pbrt_core::memory::BoundedStack;
use pbrt_core::pbrt::*;
use pbrt_core::rng::LCG;
use pbrt_core::spectrum::*;
use pbrt_core::{stat_counter, stat_inc, stat_register_fns};

stat_counter!(
    "Integrator/Subsurface continuations",
    SUBSURFACE_CONTINUATIONS,
    subsurface_stats_continuations,
);
stat_counter!(
    "Integrator/Subsurface continuations dropped",
    SUBSURFACE_DROPPED,
    subsurface_stats_dropped,
);

stat_register_fns!(subsurface_stats_continuations, subsurface_stats_dropped);

/// Scrambles the congruential stream used for probing re-entry points.
const SUBSURFACE_SCRAMBLE: u32 = 0x68bc21eb;

/// A path waiting to be continued from a subsurface re-entry point.
#[derive(Clone, Debug)]
pub struct PathContinuation {
    /// Path state after the bounce at the re-entry point.
    pub state: PathState,

    /// Continuation ray.
    pub ray: Ray,

    /// Path throughput.
    pub throughput: Spectrum,

    /// Radiance gathered at the re-entry point.
    pub radiance: PathRadiance,
}

/// Pending continuations of one subsurface event, traced one at a time after
/// the path that produced them ends.
#[derive(Clone, Debug)]
pub struct SubsurfaceIndirectRays {
    /// Continuations not yet traced.
    rays: BoundedStack<PathContinuation, BSSRDF_MAX_HITS>,

    /// A continuation is being traced.
    tracing: bool,

    /// Radiance of the path that entered the surface, accumulating every
    /// finished continuation.
    direct: Option<PathRadiance>,
}

impl SubsurfaceIndirectRays {
    /// Create an empty queue.
    ///
    /// * `limit` - Maximum number of pending continuations.
    pub fn new(limit: usize) -> Self {
        Self {
            rays: BoundedStack::new(limit),
            tracing: false,
            direct: None,
        }
    }

    /// Returns the number of pending continuations.
    pub fn len(&self) -> usize {
        self.rays.len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.rays.is_empty()
    }

    /// Returns true while continuations are being traced.
    pub fn is_tracing(&self) -> bool {
        self.tracing
    }

    /// Queue a continuation. A full queue returns it.
    ///
    /// * `continuation` - The continuation.
    pub fn push(&mut self, continuation: PathContinuation) -> Result<(), PathContinuation> {
        self.rays.push(continuation)
    }

    /// Fold the radiance of a finished continuation into the radiance of the
    /// entering path. Once the last one is done `radiance` holds the total.
    ///
    /// * `radiance` - Radiance of the path that just finished.
    pub fn accum_indirect(&mut self, radiance: &mut PathRadiance) {
        if !self.tracing {
            return;
        }

        radiance.sum_indirect();
        if let Some(direct) = self.direct.as_mut() {
            direct.accum_sample(radiance);
            if self.rays.is_empty() {
                *radiance = direct.clone();
            }
        }
    }

    /// Pop the next continuation into the working path. Returns false when
    /// the queue is empty.
    ///
    /// * `state`      - Receives the path state.
    /// * `ray`        - Receives the continuation ray.
    /// * `radiance`   - Receives the continuation radiance.
    /// * `throughput` - Receives the path throughput.
    pub fn setup_next(
        &mut self,
        state: &mut PathState,
        ray: &mut Ray,
        radiance: &mut PathRadiance,
        throughput: &mut Spectrum,
    ) -> bool {
        let next = match self.rays.pop() {
            Some(next) => next,
            None => return false,
        };

        if !self.tracing {
            self.direct = Some(radiance.clone());
            self.tracing = true;
        }

        *state = next.state;
        *ray = next.ray;
        *radiance = next.radiance;
        *throughput = next.throughput;

        // Decorrelate continuations sharing a bounce.
        state.rng_offset += self.rays.len() as u32 * PRNG_BOUNCE_NUM;
        true
    }
}

/// Choose between the surface and subsurface closures at `sd` with
/// `randb_closure`. Returns the picked subsurface closure, if any, and the
/// inverse probability of the choice. `randb_closure` is rescaled so it can
/// pick again within the chosen group.
///
/// * `sd` - The shading point.
pub fn pick_closure(sd: &mut ShaderData) -> (Option<ShaderClosure>, Float) {
    let mut bsdf_sum = 0.0;
    let mut bssrdf_sum = 0.0;
    for c in sd.closures.iter() {
        if c.kind.is_bsdf() {
            bsdf_sum += c.sample_weight;
        } else if c.kind.is_bssrdf() {
            bssrdf_sum += c.sample_weight;
        }
    }

    let total = bsdf_sum + bssrdf_sum;
    let mut r = sd.randb_closure * total;
    if r < bsdf_sum {
        sd.randb_closure = r / bsdf_sum;
        let probability = if bsdf_sum > 0.0 { total / bsdf_sum } else { 1.0 };
        return (None, probability);
    }

    r -= bsdf_sum;
    let mut sum = 0.0;
    for c in sd.closures.iter() {
        if !c.kind.is_bssrdf() {
            continue;
        }
        sum += c.sample_weight;
        if r <= sum {
            sd.randb_closure = (r - (sum - c.sample_weight)) / c.sample_weight;
            let probability = if bssrdf_sum > 0.0 { total / bssrdf_sum } else { 1.0 };
            return (Some(*c), probability);
        }
    }

    sd.randb_closure = 0.0;
    (None, 1.0)
}

/// Redirects paths entering subsurface closures to their re-entry points.
pub struct SubsurfaceReentryEngine<'a> {
    /// The scene.
    scene: &'a Scene,

    /// Kernel configuration.
    config: &'a KernelConfig,

    /// Continues the path at each re-entry point.
    surface: SurfaceBounceEngine<'a>,
}

impl<'a> SubsurfaceReentryEngine<'a> {
    /// Create a new `SubsurfaceReentryEngine`.
    ///
    /// * `scene`  - The scene.
    /// * `config` - Kernel configuration.
    pub fn new(scene: &'a Scene, config: &'a KernelConfig) -> Self {
        Self {
            scene,
            config,
            surface: SurfaceBounceEngine::new(scene, config),
        }
    }

    /// Pick a closure at `sd`; if a subsurface closure wins, find its
    /// re-entry points, connect light at each and queue a continuation for
    /// every one that bounces. Returns true if the path was redirected and
    /// must end here. Continuations never scatter below a surface again, so
    /// nothing happens while `queue` is tracing.
    ///
    /// * `sampler`    - Sample source.
    /// * `sd`         - The shading point.
    /// * `state`      - Path state.
    /// * `throughput` - Path throughput, scaled by the closure choice.
    /// * `ray`        - The incoming ray.
    /// * `radiance`   - Path radiance.
    /// * `queue`      - Receives the continuations.
    #[allow(clippy::too_many_arguments)]
    pub fn scatter(
        &self,
        sampler: &mut dyn PathSampler,
        sd: &mut ShaderData,
        state: &PathState,
        throughput: &mut Spectrum,
        ray: &Ray,
        radiance: &mut PathRadiance,
        queue: &mut SubsurfaceIndirectRays,
    ) -> bool {
        if queue.is_tracing() {
            return false;
        }

        let (closure, probability) = pick_closure(sd);
        *throughput *= probability;

        let closure = match closure {
            Some(closure) => closure,
            None => return false,
        };

        let mut rng = LCG::from_state(state.rng_hash, state.rng_offset, state.sample, SUBSURFACE_SCRAMBLE);
        let (bssrdf_u, bssrdf_v) = state.rng_2d(sampler, PRNG_BSDF_U);
        let mut hits = self.scene.shading.subsurface_hits(sd, &closure, &mut rng, bssrdf_u, bssrdf_v);
        hits.truncate(self.config.integrator.subsurface_max_hits);

        let update_volume_stack =
            self.config.integrator.use_volumes && sd.object_flag.contains(ObjectFlags::INTERSECTS_VOLUME);

        for hit in hits.iter() {
            let hit_sd = self.scene.shading.subsurface_setup(sd, &closure, hit);

            let mut hit_state = state.clone();
            hit_state.rng_offset += PRNG_BOUNCE_NUM;
            let mut hit_ray = *ray;
            let mut hit_throughput = *throughput;
            let mut hit_radiance = PathRadiance::new(self.config.film.use_light_pass());
            hit_radiance.direct_throughput = radiance.direct_throughput;
            hit_radiance.copy_indirect(radiance);

            // Light is connected with the entering path's dimensions.
            self.surface
                .connect_light(sampler, &hit_sd, state, &hit_throughput, &mut hit_radiance);

            if self.surface.bounce(
                sampler,
                &hit_sd,
                &mut hit_state,
                &mut hit_throughput,
                &mut hit_radiance,
                &mut hit_ray,
            ) {
                hit_state.ray_t = 0.0;
                if update_volume_stack {
                    hit_state
                        .volume_stack
                        .update_for_subsurface(self.scene, &sd.p, &hit_ray.o, ray.time);
                }

                radiance.reset_indirect();
                let continuation = PathContinuation {
                    state: hit_state,
                    ray: hit_ray,
                    throughput: hit_throughput,
                    radiance: hit_radiance,
                };
                match queue.push(continuation) {
                    Ok(()) => stat_inc!(SUBSURFACE_CONTINUATIONS, 1),
                    Err(dropped) => {
                        stat_inc!(SUBSURFACE_DROPPED, 1);
                        debug!("Subsurface queue full, keeping only direct light of a re-entry point");
                        radiance.accum_sample(&dropped.radiance);
                    }
                }
            } else {
                radiance.accum_sample(&hit_radiance);
            }
        }

        true
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
