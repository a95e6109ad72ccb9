//! Path Radiance

use crate::config::*;
use crate::path_state::*;
use crate::shader::*;
use pbrt_core::film::*;
use pbrt_core::pbrt::*;
use pbrt_core::spectrum::*;

/// Radiance gathered along one path, optionally split per light pass.
#[derive(Clone, Debug, PartialEq)]
pub struct PathRadiance {
    /// Track the per-category split.
    pub use_light_pass: bool,

    /// Totals used when light passes are disabled.
    pub total_direct: Spectrum,
    pub total_indirect: Spectrum,

    /// Directly visible emission and background.
    pub emission: Spectrum,
    pub background: Spectrum,

    /// Ambient occlusion pass.
    pub ao: Spectrum,

    /// Working values for the indirect split.
    pub indirect: Spectrum,
    pub direct_throughput: Spectrum,
    pub direct_emission: Spectrum,

    /// Albedo passes.
    pub color_diffuse: Spectrum,
    pub color_glossy: Spectrum,
    pub color_transmission: Spectrum,
    pub color_subsurface: Spectrum,

    /// Direct lighting passes.
    pub direct_diffuse: Spectrum,
    pub direct_glossy: Spectrum,
    pub direct_transmission: Spectrum,
    pub direct_subsurface: Spectrum,
    pub direct_scatter: Spectrum,

    /// Indirect lighting passes.
    pub indirect_diffuse: Spectrum,
    pub indirect_glossy: Spectrum,
    pub indirect_transmission: Spectrum,
    pub indirect_subsurface: Spectrum,
    pub indirect_scatter: Spectrum,

    /// Throughput split recorded at the first bounce.
    pub path_diffuse: Spectrum,
    pub path_glossy: Spectrum,
    pub path_transmission: Spectrum,
    pub path_subsurface: Spectrum,
    pub path_scatter: Spectrum,

    /// Shadow pass and the number of lamp samples it averages.
    pub shadow: Spectrum,
    pub shadow_samples: Float,

    /// Light seen by shadow catcher paths, unoccluded and occluded.
    pub path_total: Spectrum,
    pub path_total_shaded: Spectrum,

    /// Background seen behind the shadow catcher.
    pub shadow_color: Spectrum,

    /// Shadow factor used when no light reached the catcher.
    pub shadow_transparency: Float,
}

impl PathRadiance {
    /// Create an empty accumulator.
    ///
    /// * `use_light_pass` - Track the per-category split.
    pub fn new(use_light_pass: bool) -> Self {
        Self {
            use_light_pass,
            total_direct: Spectrum::ZERO,
            total_indirect: Spectrum::ZERO,
            emission: Spectrum::ZERO,
            background: Spectrum::ZERO,
            ao: Spectrum::ZERO,
            indirect: Spectrum::ZERO,
            direct_throughput: Spectrum::ZERO,
            direct_emission: Spectrum::ZERO,
            color_diffuse: Spectrum::ZERO,
            color_glossy: Spectrum::ZERO,
            color_transmission: Spectrum::ZERO,
            color_subsurface: Spectrum::ZERO,
            direct_diffuse: Spectrum::ZERO,
            direct_glossy: Spectrum::ZERO,
            direct_transmission: Spectrum::ZERO,
            direct_subsurface: Spectrum::ZERO,
            direct_scatter: Spectrum::ZERO,
            indirect_diffuse: Spectrum::ZERO,
            indirect_glossy: Spectrum::ZERO,
            indirect_transmission: Spectrum::ZERO,
            indirect_subsurface: Spectrum::ZERO,
            indirect_scatter: Spectrum::ZERO,
            path_diffuse: Spectrum::ZERO,
            path_glossy: Spectrum::ZERO,
            path_transmission: Spectrum::ZERO,
            path_subsurface: Spectrum::ZERO,
            path_scatter: Spectrum::ZERO,
            shadow: Spectrum::ZERO,
            shadow_samples: 0.0,
            path_total: Spectrum::ZERO,
            path_total_shaded: Spectrum::ZERO,
            shadow_color: Spectrum::ZERO,
            shadow_transparency: 1.0,
        }
    }

    /// Add the non-pass total for a contribution that is direct when
    /// `direct` is set.
    fn accum_total(&mut self, direct: bool, value: Spectrum) {
        if direct {
            self.total_direct += value;
        } else {
            self.total_indirect += value;
        }
    }

    /// Update the throughput after a BSDF or phase bounce. The first
    /// non-transparent bounce records the per-category split.
    ///
    /// * `throughput` - Path throughput.
    /// * `eval`       - Evaluation of the sampled direction.
    /// * `pdf`        - PDF of the sampled direction.
    /// * `bounce`     - Bounce before the event.
    /// * `label`      - Labels of the event.
    pub fn bsdf_bounce(
        &mut self,
        throughput: &mut Spectrum,
        eval: &BsdfEval,
        pdf: Float,
        bounce: u32,
        label: LabelFlags,
    ) {
        let inverse_pdf = 1.0 / pdf;

        if self.use_light_pass && bounce == 0 && !label.contains(LabelFlags::TRANSPARENT) {
            let value = *throughput * inverse_pdf;
            self.path_diffuse = eval.diffuse * value;
            self.path_glossy = eval.glossy * value;
            self.path_transmission = eval.transmission * value;
            self.path_subsurface = eval.subsurface * value;
            self.path_scatter = eval.scatter * value;

            *throughput = self.path_diffuse
                + self.path_glossy
                + self.path_transmission
                + self.path_subsurface
                + self.path_scatter;
            self.direct_throughput = *throughput;
        } else {
            *throughput *= eval.total() * inverse_pdf;
        }
    }

    /// Add emission seen along the path.
    ///
    /// * `throughput` - Path throughput.
    /// * `value`      - Emitted radiance.
    /// * `bounce`     - Current bounce.
    pub fn accum_emission(&mut self, throughput: &Spectrum, value: &Spectrum, bounce: u32) {
        let contribution = *throughput * *value;
        if self.use_light_pass {
            match bounce {
                0 => self.emission += contribution,
                1 => self.direct_emission += contribution,
                _ => self.indirect += contribution,
            }
        } else {
            self.accum_total(bounce <= 1, contribution);
        }
    }

    /// Add ambient occlusion.
    ///
    /// * `state`      - Path state.
    /// * `throughput` - Path throughput.
    /// * `alpha`      - Surface opacity for the AO pass.
    /// * `bsdf`       - AO weight of the closures.
    /// * `ao`         - Unoccluded fraction.
    pub fn accum_ao(
        &mut self,
        state: &PathState,
        throughput: &Spectrum,
        alpha: &Spectrum,
        bsdf: &Spectrum,
        ao: &Spectrum,
    ) {
        if state.flag.contains(PathRayFlag::SHADOW_CATCHER) {
            let light = *throughput * *bsdf;
            self.path_total += light;
            self.path_total_shaded += *ao * light;
            if state.flag.contains(PathRayFlag::SHADOW_CATCHER_ONLY) {
                return;
            }
        }

        let contribution = *throughput * *bsdf * *ao;
        if self.use_light_pass {
            if state.bounce == 0 {
                self.direct_diffuse += contribution;
                self.ao += *alpha * *throughput * *ao;
            } else {
                self.indirect += contribution;
            }
        } else {
            self.accum_total(state.bounce == 0, contribution);
        }
    }

    /// Add directly sampled light that reached the vertex.
    ///
    /// * `state`      - Path state.
    /// * `throughput` - Path throughput.
    /// * `eval`       - Light evaluation through the closures.
    /// * `shadow`     - Shadow ray transmittance.
    /// * `shadow_fac` - Weight for the shadow pass.
    /// * `is_lamp`    - The light is a lamp.
    pub fn accum_light(
        &mut self,
        state: &PathState,
        throughput: &Spectrum,
        eval: &BsdfEval,
        shadow: &Spectrum,
        shadow_fac: Float,
        is_lamp: bool,
    ) {
        if state.flag.contains(PathRayFlag::SHADOW_CATCHER) {
            let light = *throughput * eval.sum_no_mis;
            self.path_total += light;
            self.path_total_shaded += *shadow * light;
            if state.flag.contains(PathRayFlag::SHADOW_CATCHER_ONLY) {
                return;
            }
        }

        if self.use_light_pass {
            if state.bounce == 0 {
                let t = *throughput * *shadow;
                self.direct_diffuse += eval.diffuse * t;
                self.direct_glossy += eval.glossy * t;
                self.direct_transmission += eval.transmission * t;
                self.direct_subsurface += eval.subsurface * t;
                self.direct_scatter += eval.scatter * t;

                if is_lamp {
                    self.shadow += *shadow * shadow_fac;
                    self.shadow_samples += shadow_fac;
                }
            } else {
                self.indirect += *throughput * eval.sum() * *shadow;
            }
        } else {
            self.accum_total(state.bounce == 0, *throughput * eval.total() * *shadow);
        }
    }

    /// Record sampled light that was blocked, for shadow catchers.
    ///
    /// * `state`      - Path state.
    /// * `throughput` - Path throughput.
    /// * `eval`       - Light evaluation through the closures.
    pub fn accum_total_light(&mut self, state: &PathState, throughput: &Spectrum, eval: &BsdfEval) {
        if state.flag.contains(PathRayFlag::SHADOW_CATCHER) {
            self.path_total += *throughput * eval.sum_no_mis;
        }
    }

    /// Add background radiance.
    ///
    /// * `state`      - Path state.
    /// * `throughput` - Path throughput.
    /// * `value`      - Background radiance.
    pub fn accum_background(&mut self, state: &PathState, throughput: &Spectrum, value: &Spectrum) {
        if state.flag.contains(PathRayFlag::SHADOW_CATCHER) {
            let light = *throughput * *value;
            self.path_total += light;
            self.path_total_shaded += light * self.shadow_transparency;
            if state.flag.contains(PathRayFlag::SHADOW_CATCHER_ONLY) {
                return;
            }
        }

        let contribution = *throughput * *value;
        if self.use_light_pass {
            match state.bounce {
                0 => self.background += contribution,
                1 => self.direct_emission += contribution,
                _ => self.indirect += contribution,
            }
        } else {
            self.accum_total(state.bounce <= 1, contribution);
        }
    }

    /// Distribute indirect light gathered after the first bounce over the
    /// categories recorded by `bsdf_bounce`.
    pub fn sum_indirect(&mut self) {
        if !self.use_light_pass {
            return;
        }

        self.direct_emission = self.direct_emission.safe_divide(&self.direct_throughput);
        self.direct_diffuse += self.path_diffuse * self.direct_emission;
        self.direct_glossy += self.path_glossy * self.direct_emission;
        self.direct_transmission += self.path_transmission * self.direct_emission;
        self.direct_subsurface += self.path_subsurface * self.direct_emission;
        self.direct_scatter += self.path_scatter * self.direct_emission;

        self.indirect = self.indirect.safe_divide(&self.direct_throughput);
        self.indirect_diffuse += self.path_diffuse * self.indirect;
        self.indirect_glossy += self.path_glossy * self.indirect;
        self.indirect_transmission += self.path_transmission * self.indirect;
        self.indirect_subsurface += self.path_subsurface * self.indirect;
        self.indirect_scatter += self.path_scatter * self.indirect;

        self.direct_emission = Spectrum::ZERO;
        self.indirect = Spectrum::ZERO;
    }

    /// Clear the working values of the indirect split.
    pub fn reset_indirect(&mut self) {
        if self.use_light_pass {
            self.path_diffuse = Spectrum::ZERO;
            self.path_glossy = Spectrum::ZERO;
            self.path_transmission = Spectrum::ZERO;
            self.path_subsurface = Spectrum::ZERO;
            self.path_scatter = Spectrum::ZERO;
            self.direct_emission = Spectrum::ZERO;
            self.indirect = Spectrum::ZERO;
        }
    }

    /// Copy the working values of the indirect split from another path.
    ///
    /// * `src` - Source radiance.
    pub fn copy_indirect(&mut self, src: &PathRadiance) {
        if self.use_light_pass {
            self.path_diffuse = src.path_diffuse;
            self.path_glossy = src.path_glossy;
            self.path_transmission = src.path_transmission;
            self.path_subsurface = src.path_subsurface;
            self.path_scatter = src.path_scatter;
            self.direct_emission = src.direct_emission;
            self.indirect = src.indirect;
        }
    }

    /// Add the finished radiance of another path.
    ///
    /// * `sample` - Radiance of the other path.
    pub fn accum_sample(&mut self, sample: &PathRadiance) {
        self.total_direct += sample.total_direct;
        self.total_indirect += sample.total_indirect;

        self.direct_diffuse += sample.direct_diffuse;
        self.direct_glossy += sample.direct_glossy;
        self.direct_transmission += sample.direct_transmission;
        self.direct_subsurface += sample.direct_subsurface;
        self.direct_scatter += sample.direct_scatter;

        self.indirect_diffuse += sample.indirect_diffuse;
        self.indirect_glossy += sample.indirect_glossy;
        self.indirect_transmission += sample.indirect_transmission;
        self.indirect_subsurface += sample.indirect_subsurface;
        self.indirect_scatter += sample.indirect_scatter;

        self.emission += sample.emission;
        self.background += sample.background;
        self.ao += sample.ao;
        self.shadow += sample.shadow;
        self.shadow_samples += sample.shadow_samples;

        self.path_total += sample.path_total;
        self.path_total_shaded += sample.path_total_shaded;
    }

    /// Returns the final radiance. Non-finite results are rejected to black;
    /// direct and indirect light are clamped separately by luminance.
    ///
    /// * `config` - Kernel configuration.
    pub fn clamp_and_sum(&mut self, config: &KernelConfig) -> Spectrum {
        let clamp_direct = config.integrator.sample_clamp_direct;
        let clamp_indirect = config.integrator.sample_clamp_indirect;

        if !self.use_light_pass {
            let sum = self.total_direct + self.total_indirect;
            if !sum.is_finite() {
                self.total_direct = Spectrum::ZERO;
                self.total_indirect = Spectrum::ZERO;
                return Spectrum::ZERO;
            }
            self.total_direct *= clamp_scale(&self.total_direct, clamp_direct);
            self.total_indirect *= clamp_scale(&self.total_indirect, clamp_indirect);
            return self.total_direct + self.total_indirect;
        }

        self.sum_indirect();

        let mut direct = self.direct_diffuse
            + self.direct_glossy
            + self.direct_transmission
            + self.direct_subsurface
            + self.direct_scatter
            + self.emission;
        if !config.background.transparent {
            direct += self.background;
        }
        let indirect = self.indirect_diffuse
            + self.indirect_glossy
            + self.indirect_transmission
            + self.indirect_subsurface
            + self.indirect_scatter;

        let sum = direct + indirect;
        if !sum.is_finite() {
            self.reject();
            return Spectrum::ZERO;
        }

        let scale = clamp_scale(&direct, clamp_direct);
        if scale != 1.0 {
            self.direct_diffuse *= scale;
            self.direct_glossy *= scale;
            self.direct_transmission *= scale;
            self.direct_subsurface *= scale;
            self.direct_scatter *= scale;
            self.emission *= scale;
            self.background *= scale;
        }
        let scale = clamp_scale(&indirect, clamp_indirect);
        if scale != 1.0 {
            self.indirect_diffuse *= scale;
            self.indirect_glossy *= scale;
            self.indirect_transmission *= scale;
            self.indirect_subsurface *= scale;
            self.indirect_scatter *= scale;
        }

        let mut direct = self.direct_diffuse
            + self.direct_glossy
            + self.direct_transmission
            + self.direct_subsurface
            + self.direct_scatter
            + self.emission;
        if !config.background.transparent {
            direct += self.background;
        }
        direct
            + self.indirect_diffuse
            + self.indirect_glossy
            + self.indirect_transmission
            + self.indirect_subsurface
            + self.indirect_scatter
    }

    /// Zero every light pass after an invalid sample.
    fn reject(&mut self) {
        let use_light_pass = self.use_light_pass;
        let colors = (
            self.color_diffuse,
            self.color_glossy,
            self.color_transmission,
            self.color_subsurface,
        );
        *self = Self::new(use_light_pass);
        self.color_diffuse = colors.0;
        self.color_glossy = colors.1;
        self.color_transmission = colors.2;
        self.color_subsurface = colors.3;
    }

    /// Returns the final radiance of a path that hit a shadow catcher and
    /// updates the transparency. The catcher only contributes the fraction
    /// of light it receives unoccluded.
    ///
    /// * `config`        - Kernel configuration.
    /// * `l_transparent` - Accumulated transparency.
    pub fn sum_shadowcatcher(&mut self, config: &KernelConfig, l_transparent: &mut Float) -> Spectrum {
        let path_total = self.path_total.average();
        let shadow = if !path_total.is_finite() {
            0.0
        } else if path_total == 0.0 {
            self.shadow_transparency
        } else {
            self.path_total_shaded.average() / path_total
        };

        let l_sum = self.clamp_and_sum(config);
        if config.background.transparent {
            *l_transparent = shadow;
            l_sum
        } else {
            l_sum + self.shadow_color * shadow
        }
    }

    /// Write the light passes of one sample.
    ///
    /// * `buffer` - Output buffer.
    /// * `index`  - Flattened pixel index.
    pub fn write_light_passes(&self, buffer: &mut dyn OutputBuffer, index: usize) {
        if !self.use_light_pass {
            return;
        }

        let passes = buffer.passes();
        for pass in passes.passes() {
            let value = match pass {
                PassType::Emission => self.emission,
                PassType::Background => self.background,
                PassType::AO => self.ao,
                PassType::Shadow => {
                    let [r, g, b] = self.shadow.to_rgb();
                    buffer.write_pass(index, pass, [r, g, b, self.shadow_samples]);
                    continue;
                }
                PassType::DiffuseDirect => self.direct_diffuse,
                PassType::DiffuseIndirect => self.indirect_diffuse,
                PassType::DiffuseColor => self.color_diffuse,
                PassType::GlossyDirect => self.direct_glossy,
                PassType::GlossyIndirect => self.indirect_glossy,
                PassType::GlossyColor => self.color_glossy,
                PassType::TransmissionDirect => self.direct_transmission,
                PassType::TransmissionIndirect => self.indirect_transmission,
                PassType::TransmissionColor => self.color_transmission,
                PassType::SubsurfaceDirect => self.direct_subsurface,
                PassType::SubsurfaceIndirect => self.indirect_subsurface,
                PassType::SubsurfaceColor => self.color_subsurface,
                PassType::VolumeDirect => self.direct_scatter,
                PassType::VolumeIndirect => self.indirect_scatter,
                PassType::Depth | PassType::Normal | PassType::ObjectId => continue,
            };
            let [r, g, b] = value.to_rgb();
            buffer.write_pass(index, pass, [r, g, b, 0.0]);
        }
    }
}

/// Returns the factor bringing the luminance of `l` down to `limit`.
fn clamp_scale(l: &Spectrum, limit: Option<Float>) -> Float {
    match limit {
        Some(limit) => {
            let y = l.y();
            if y > limit {
                limit / y
            } else {
                1.0
            }
        }
        None => 1.0,
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
