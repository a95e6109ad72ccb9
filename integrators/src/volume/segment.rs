//! Volume Segments

use crate::config::IntegratorSettings;
use crate::scene::*;
use crate::shader::ShaderFlags;
use pbrt_core::geometry::*;
use pbrt_core::pbrt::*;
use pbrt_core::rng::*;
use pbrt_core::sampling::*;
use pbrt_core::spectrum::*;
use smallvec::SmallVec;

/// Step placement along a ray segment. Homogeneous media use a single step
/// shaded at the segment start; heterogeneous media are marched with a
/// jittered shading position inside every step.
#[derive(Copy, Clone, Debug, PartialEq)]
pub(crate) struct StepLayout {
    length: Float,
    step_size: Float,
    max_steps: u32,
    jitter: Float,
}

impl StepLayout {
    /// Choose the step placement for a segment.
    ///
    /// * `length`        - Segment length.
    /// * `heterogeneous` - The media vary in space.
    /// * `settings`      - Integrator settings.
    /// * `rng`           - Congruential stream for the jitter.
    pub(crate) fn new(length: Float, heterogeneous: bool, settings: &IntegratorSettings, rng: &mut LCG) -> Self {
        if heterogeneous {
            let max_steps = settings.volume_max_steps;
            let mut step_size = min(settings.volume_step_size, length);
            if length > max_steps as Float * step_size {
                step_size = length / max_steps as Float;
            }
            Self {
                length,
                step_size,
                max_steps,
                jitter: rng.next_float(),
            }
        } else {
            Self {
                length,
                step_size: length,
                max_steps: 1,
                jitter: 0.0,
            }
        }
    }

    /// Iterate `(start, end, shade)` distances of every step.
    pub(crate) fn steps(&self) -> StepIter {
        StepIter {
            layout: *self,
            index: 0,
            t0: 0.0,
            done: false,
        }
    }
}

/// Iterator over the steps of a `StepLayout`.
pub(crate) struct StepIter {
    layout: StepLayout,
    index: u32,
    t0: Float,
    done: bool,
}

impl Iterator for StepIter {
    type Item = (Float, Float, Float);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let layout = &self.layout;
        let last = self.index + 1 >= layout.max_steps;
        let mut t1 = min(layout.length, (self.index + 1) as Float * layout.step_size);
        if last || t1 >= layout.length {
            t1 = layout.length;
            self.done = true;
        }

        let t0 = self.t0;
        let shade = t0 + layout.jitter * (t1 - t0);
        self.t0 = t1;
        self.index += 1;
        Some((t0, t1, shade))
    }
}

/// One step of a recorded segment with coefficients treated as constant.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct VolumeStep {
    /// Start distance.
    pub t0: Float,

    /// End distance.
    pub t: Float,

    /// Distance the coefficients were evaluated at.
    pub shade_t: Float,

    /// Extinction.
    pub sigma_t: Spectrum,

    /// Scattering.
    pub sigma_s: Spectrum,

    /// Phase anisotropy.
    pub anisotropy: Float,

    /// Optical depth from the segment start to the step end.
    pub tau: Spectrum,

    /// Transmittance from the segment start to the step end.
    pub transmittance: Spectrum,

    /// Emission integrated over the step, attenuated from the segment start.
    pub emission: Spectrum,
}

impl VolumeStep {
    /// Integrate constant coefficients over `[t0, t1]`.
    ///
    /// * `coeff` - Coefficients.
    /// * `t0`    - Start distance.
    /// * `t1`    - End distance.
    /// * `shade` - Distance the coefficients were evaluated at.
    /// * `tau0`  - Optical depth at `t0`.
    pub(crate) fn new(coeff: &VolumeCoefficients, t0: Float, t1: Float, shade: Float, tau0: &Spectrum) -> Self {
        let dt = t1 - t0;
        let sigma_t = coeff.sigma_t();
        let step_tau = sigma_t * dt;
        let tau = *tau0 + step_tau;
        let t_start = (-*tau0).exp();

        let emission = Spectrum::new(
            step_emission(coeff.emission[0], sigma_t[0], step_tau[0], dt),
            step_emission(coeff.emission[1], sigma_t[1], step_tau[1], dt),
            step_emission(coeff.emission[2], sigma_t[2], step_tau[2], dt),
        ) * t_start;

        Self {
            t0,
            t: t1,
            shade_t: shade,
            sigma_t,
            sigma_s: coeff.sigma_s,
            anisotropy: coeff.anisotropy,
            tau,
            transmittance: (-tau).exp(),
            emission,
        }
    }

    /// Optical depth from the segment start to distance `t` inside the step.
    ///
    /// * `tau0` - Optical depth at the step start.
    /// * `t`    - Distance.
    pub(crate) fn tau_at(&self, tau0: &Spectrum, t: Float) -> Spectrum {
        *tau0 + self.sigma_t * (t - self.t0)
    }
}

/// Emission of one channel integrated over a step of constant extinction.
fn step_emission(e: Float, sigma_t: Float, step_tau: Float, dt: Float) -> Float {
    if e == 0.0 {
        0.0
    } else if sigma_t > 0.0 {
        e * (1.0 - (-step_tau).exp()) / sigma_t
    } else {
        e * dt
    }
}

/// Pick a color channel uniformly and rescale `xi` to a fresh variate.
///
/// * `xi` - Uniform sample.
pub(crate) fn pick_channel(xi: Float) -> (usize, Float) {
    let scaled = xi * RGB_SAMPLES as Float;
    let channel = min(scaled as usize, RGB_SAMPLES - 1);
    (channel, clamp(scaled - channel as Float, 0.0, ONE_MINUS_EPSILON))
}

/// Optical depth target for untruncated distance sampling.
///
/// * `xi` - Uniform sample.
pub(crate) fn tau_target(xi: Float) -> Float {
    -(1.0 - xi).ln()
}

/// A ray segment recorded through the current media.
#[derive(Clone, Debug, PartialEq)]
pub struct VolumeSegment {
    /// Steps in order.
    pub steps: SmallVec<[VolumeStep; 8]>,

    /// Union of the closure flags of every step.
    pub closure_flag: ShaderFlags,

    /// Emission integrated over the whole segment.
    pub accum_emission: Spectrum,

    /// Transmittance over the whole segment.
    pub accum_transmittance: Spectrum,

    /// Distance sampling method for light connections.
    pub sampling_method: VolumeSampling,

    /// Segment length.
    pub length: Float,
}

impl VolumeSegment {
    /// Create an empty segment.
    ///
    /// * `length`          - Segment length.
    /// * `sampling_method` - Distance sampling method.
    pub(crate) fn new(length: Float, sampling_method: VolumeSampling) -> Self {
        Self {
            steps: SmallVec::new(),
            closure_flag: ShaderFlags::empty(),
            accum_emission: Spectrum::ZERO,
            accum_transmittance: Spectrum::ONE,
            sampling_method,
            length,
        }
    }

    /// Append a step.
    ///
    /// * `step`  - The step.
    /// * `flags` - Closure flags of the step's coefficients.
    pub(crate) fn push(&mut self, step: VolumeStep, flags: ShaderFlags) {
        self.closure_flag |= flags;
        self.accum_emission += step.emission;
        self.accum_transmittance = step.transmittance;
        self.steps.push(step);
    }

    /// Release the recorded steps.
    pub fn release(self) {}

    /// Returns the step containing `t` and the optical depth at its start.
    fn step_at(&self, t: Float) -> Option<(&VolumeStep, Spectrum)> {
        let mut tau0 = Spectrum::ZERO;
        for step in self.steps.iter() {
            if t <= step.t {
                return Some((step, tau0));
            }
            tau0 = step.tau;
        }
        self.steps.last().map(|s| (s, tau0))
    }

    /// Returns `(T(t) * sigma_s(t), T(t) * sigma_t(t), T(t), anisotropy)`.
    fn eval_at(&self, t: Float) -> Option<(Spectrum, Spectrum, Float)> {
        let (step, tau0) = self.step_at(t)?;
        let transmittance = (-step.tau_at(&tau0, t)).exp();
        Some((transmittance * step.sigma_s, transmittance * step.sigma_t, step.anisotropy))
    }

    /// Find the distance where the optical depth of `channel` reaches
    /// `target`.
    fn invert_tau(&self, channel: usize, target: Float) -> Option<Float> {
        let mut tau0 = Spectrum::ZERO;
        for step in self.steps.iter() {
            if step.tau[channel] > target && step.sigma_t[channel] > 0.0 {
                let t = step.t0 + (target - tau0[channel]) / step.sigma_t[channel];
                return Some(clamp(t, step.t0, step.t));
            }
            tau0 = step.tau;
        }
        None
    }

    /// Untruncated distance PDF, an equal mixture over channels.
    fn distance_pdf(&self, t: Float) -> Float {
        self.eval_at(t).map_or(0.0, |(_, density, _)| density.average())
    }

    /// Distance PDF truncated to the segment.
    fn distance_pdf_truncated(&self, t: Float) -> Float {
        let (_, density, _) = match self.eval_at(t) {
            Some(v) => v,
            None => return 0.0,
        };
        let mut pdf = 0.0;
        for c in 0..RGB_SAMPLES {
            let norm = 1.0 - self.accum_transmittance[c];
            if norm > 0.0 {
                pdf += density[c] / norm;
            } else if self.length < FLOAT_MAX && self.length > 0.0 {
                pdf += 1.0 / self.length;
            }
        }
        pdf / RGB_SAMPLES as Float
    }

    /// Sample a distance inside the segment.
    fn sample_distance_truncated(&self, xi: Float) -> Option<Float> {
        let (channel, xi) = pick_channel(xi);
        let norm = 1.0 - self.accum_transmittance[channel];
        if norm > 0.0 {
            let target = -(1.0 - xi * norm).ln();
            self.invert_tau(channel, target).or(Some(self.length))
        } else if self.length < FLOAT_MAX {
            Some(xi * self.length)
        } else {
            None
        }
    }

    /// Decide the scatter position against the recorded steps and update the
    /// throughput. Returns the scatter distance, or `None` if the path
    /// passes; a passing path still has to be multiplied by
    /// `accum_transmittance`.
    ///
    /// Probabilistic decisions sample a distance proportional to extinction
    /// times transmittance and may pass the segment end. Otherwise a position
    /// inside the segment is always chosen, using the segment's sampling
    /// method toward `light_p` when given.
    ///
    /// * `ray`           - The segment ray.
    /// * `throughput`    - Path throughput.
    /// * `xi`            - Uniform sample.
    /// * `probabilistic` - Allow passing the segment.
    /// * `light_p`       - Equiangular anchor.
    pub fn decoupled_scatter(
        &self,
        ray: &Ray,
        throughput: &mut Spectrum,
        xi: Float,
        probabilistic: bool,
        light_p: Option<&Point3f>,
    ) -> Option<(Float, Float)> {
        if probabilistic {
            let (channel, xi) = pick_channel(xi);
            let scatter = self
                .invert_tau(channel, tau_target(xi))
                .filter(|t| *t < self.length)
                .and_then(|t| {
                    let (weight, _, anisotropy) = self.eval_at(t)?;
                    let pdf = self.distance_pdf(t);
                    (pdf > 0.0).then(|| (t, weight / pdf, anisotropy))
                });
            return match scatter {
                Some((t, weight, anisotropy)) => {
                    *throughput *= weight;
                    Some((t, anisotropy))
                }
                None => {
                    let pass = self.accum_transmittance.average();
                    if pass > 0.0 {
                        *throughput /= pass;
                    }
                    None
                }
            };
        }

        let method = if light_p.is_some() {
            self.sampling_method
        } else {
            VolumeSampling::Distance
        };

        let (t, pdf) = match (method, light_p) {
            (VolumeSampling::Equiangular, Some(lp)) => {
                equiangular_sample(&ray.o, &ray.d, self.length, lp, xi)?
            }
            (VolumeSampling::MultipleImportance, Some(lp)) => {
                let t = if xi < 0.5 {
                    self.sample_distance_truncated(xi * 2.0)?
                } else {
                    equiangular_sample(&ray.o, &ray.d, self.length, lp, (xi - 0.5) * 2.0)?.0
                };
                let pdf = 0.5
                    * (self.distance_pdf_truncated(t) + equiangular_pdf(&ray.o, &ray.d, self.length, lp, t));
                (t, pdf)
            }
            _ => {
                let t = self.sample_distance_truncated(xi)?;
                (t, self.distance_pdf_truncated(t))
            }
        };

        if !(pdf > 0.0) {
            return None;
        }
        let (weight, _, anisotropy) = self.eval_at(t)?;
        *throughput *= weight / pdf;
        Some((t, anisotropy))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
