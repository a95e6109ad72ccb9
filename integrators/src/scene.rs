//! Scene Collaborators

use crate::path_state::PathRayFlag;
use crate::shader::*;
use pbrt_core::geometry::*;
use pbrt_core::pbrt::*;
use pbrt_core::rng::LCG;
use pbrt_core::spectrum::*;
use smallvec::SmallVec;
use std::sync::Arc;

/// Result of a ray query against the scene.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Intersection {
    /// Distance along the ray.
    pub t: Float,

    /// Barycentric coordinates.
    pub u: Float,
    pub v: Float,

    /// Primitive index.
    pub prim: u32,

    /// Object index.
    pub object: u32,

    /// Traversal statistics.
    pub num_traversed_nodes: u32,
    pub num_traversed_instances: u32,
    pub num_intersections: u32,
}

impl Intersection {
    /// Create an intersection at distance `t` on `object`.
    ///
    /// * `t`      - Distance along the ray.
    /// * `object` - Object index.
    /// * `prim`   - Primitive index.
    pub fn new(t: Float, object: u32, prim: u32) -> Self {
        Self {
            t,
            object,
            prim,
            ..Default::default()
        }
    }
}

/// Path information handed to the shading system.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ShadingContext {
    /// Current path flags.
    pub path_flag: PathRayFlag,

    /// Current bounce.
    pub bounce: u32,

    /// Random number for picking closures.
    pub randb: Float,
}

/// Surface or medium entered or left at an intersection.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VolumeBoundary {
    /// Object owning the volume.
    pub object: u32,

    /// Volume shader.
    pub shader: u32,

    /// The ray is leaving the object.
    pub backfacing: bool,
}

/// A re-entry point found by probing around a subsurface scattering event.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SubsurfaceHit {
    /// Position.
    pub p: Point3f,

    /// Outward geometric normal.
    pub ng: Normal3f,

    /// Outward shading normal.
    pub n: Normal3f,

    /// Probe distance.
    pub t: Float,

    /// Object index.
    pub object: u32,

    /// Primitive index.
    pub prim: u32,
}

/// Re-entry points of one subsurface event.
pub type SubsurfaceHits = SmallVec<[SubsurfaceHit; crate::config::BSSRDF_MAX_HITS]>;

/// A sampled light for next event estimation.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DirectLight {
    /// Position on the light. Unused for distant lights.
    pub p: Point3f,

    /// Light normal at `p`.
    pub ng: Normal3f,

    /// Unit direction from the shading point toward the light.
    pub d: Vector3f,

    /// Distance to the light, `FLOAT_MAX` for distant lights.
    pub t: Float,

    /// Emitted radiance toward the shading point.
    pub eval: Spectrum,

    /// Solid angle PDF of the sample.
    pub pdf: Float,

    /// Weight the sample with multiple importance sampling.
    pub use_mis: bool,

    /// Trace a shadow ray.
    pub cast_shadow: bool,

    /// The sample is on a lamp rather than emissive geometry or background.
    pub is_lamp: bool,
}

/// Lamp emission picked up along an indirect ray.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LampEmission {
    /// Emitted radiance.
    pub eval: Spectrum,

    /// PDF the light sampler would have produced this direction with.
    pub pdf: Float,

    /// Distance to the lamp along the ray.
    pub t: Float,
}

/// Lamps hit along one ray.
pub type LampEmissions = SmallVec<[LampEmission; 4]>;

/// A sampled continuation direction.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BounceSample {
    /// Unit incoming direction.
    pub omega_in: Vector3f,

    /// Evaluation split per pass category.
    pub eval: BsdfEval,

    /// Solid angle PDF.
    pub pdf: Float,

    /// Labels of the sampled event.
    pub label: LabelFlags,
}

/// Volume coefficients at a point.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct VolumeCoefficients {
    /// Absorption.
    pub sigma_a: Spectrum,

    /// Scattering.
    pub sigma_s: Spectrum,

    /// Emission.
    pub emission: Spectrum,

    /// Phase function anisotropy.
    pub anisotropy: Float,
}

impl VolumeCoefficients {
    /// Extinction.
    pub fn sigma_t(&self) -> Spectrum {
        self.sigma_a + self.sigma_s
    }

    /// Closure flags implied by the coefficients.
    pub fn closure_flag(&self) -> ShaderFlags {
        let mut flag = ShaderFlags::empty();
        if !self.sigma_a.is_black() {
            flag |= ShaderFlags::ABSORPTION;
        }
        if !self.sigma_s.is_black() {
            flag |= ShaderFlags::SCATTER;
        }
        if !self.emission.is_black() {
            flag |= ShaderFlags::EMISSION;
        }
        flag
    }
}

impl std::ops::AddAssign for VolumeCoefficients {
    fn add_assign(&mut self, other: Self) {
        let w = self.sigma_s.average();
        let w_other = other.sigma_s.average();
        if w + w_other > 0.0 {
            self.anisotropy = (self.anisotropy * w + other.anisotropy * w_other) / (w + w_other);
        }
        self.sigma_a += other.sigma_a;
        self.sigma_s += other.sigma_s;
        self.emission += other.emission;
    }
}

/// How distances are sampled inside a medium.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VolumeSampling {
    /// Proportional to transmittance.
    Distance,

    /// Proportional to the inverse squared distance to a light.
    Equiangular,

    /// Both, combined with multiple importance sampling.
    MultipleImportance,
}

/// Ray queries against the scene geometry.
pub trait Intersector: Send + Sync {
    /// Returns the closest intersection along `ray` with an object visible to
    /// `visibility`.
    ///
    /// * `ray`        - The ray.
    /// * `visibility` - Ray visibility mask.
    fn intersect(&self, ray: &Ray, visibility: PathRayFlag) -> Option<Intersection>;

    /// Returns the closest intersection along a shadow ray, skipping objects
    /// excluded by `shadow_linking`.
    ///
    /// * `ray`            - The shadow ray.
    /// * `visibility`     - Ray visibility mask.
    /// * `shadow_linking` - Opaque shadow linking mask.
    fn intersect_shadow(
        &self,
        ray: &Ray,
        visibility: PathRayFlag,
        shadow_linking: u32,
    ) -> Option<Intersection>;
}

/// Shader evaluation.
pub trait ShadingSystem: Send + Sync {
    /// Evaluate the surface shader at an intersection.
    ///
    /// * `isect` - The intersection.
    /// * `ray`   - The ray that produced it.
    /// * `ctx`   - Path information.
    fn evaluate(&self, isect: &Intersection, ray: &Ray, ctx: &ShadingContext) -> ShaderData;

    /// Returns the transparency of a surface blocking a shadow ray, or `None`
    /// if it is opaque.
    ///
    /// * `isect` - The intersection.
    /// * `ray`   - The shadow ray.
    fn shadow_transparency(&self, isect: &Intersection, ray: &Ray) -> Option<Spectrum>;

    /// Returns the volume entered or left at an intersection, if any.
    ///
    /// * `isect` - The intersection.
    /// * `ray`   - The ray.
    fn volume_boundary(&self, isect: &Intersection, ray: &Ray) -> Option<VolumeBoundary>;

    /// Probe for subsurface re-entry points around `sd`.
    ///
    /// * `sd`      - The shading point where light enters.
    /// * `closure` - The subsurface closure.
    /// * `rng`     - Congruential stream for re-entry decisions.
    /// * `u`       - First uniform sample.
    /// * `v`       - Second uniform sample.
    fn subsurface_hits(
        &self,
        sd: &ShaderData,
        closure: &ShaderClosure,
        rng: &mut LCG,
        u: Float,
        v: Float,
    ) -> SubsurfaceHits;

    /// Build the shading point at a subsurface re-entry point.
    ///
    /// * `sd`      - The shading point where light entered.
    /// * `closure` - The subsurface closure.
    /// * `hit`     - The re-entry point.
    fn subsurface_setup(&self, sd: &ShaderData, closure: &ShaderClosure, hit: &SubsurfaceHit) -> ShaderData;
}

/// Light selection and evaluation.
pub trait LightSampler: Send + Sync {
    /// Sample a light as seen from `sd`.
    ///
    /// * `sd`      - The shading point.
    /// * `ctx`     - Path information.
    /// * `rand`    - Light selection and two position samples.
    fn sample_direct(&self, sd: &ShaderData, ctx: &ShadingContext, rand: [Float; 3]) -> Option<DirectLight>;

    /// Returns the light sampling PDF of the emissive primitive at `sd` seen
    /// from distance `t`.
    ///
    /// * `sd` - The emissive shading point.
    /// * `t`  - Distance from the previous vertex.
    fn primitive_emission_pdf(&self, sd: &ShaderData, t: Float) -> Float;

    /// Returns lamps hit along `ray` within its extent.
    ///
    /// * `ray` - The ray from the previous non-transparent vertex.
    /// * `ctx` - Path information.
    fn lamp_emission(&self, ray: &Ray, ctx: &ShadingContext) -> LampEmissions;

    /// Returns the background radiance along `ray`.
    ///
    /// * `ray` - The ray.
    fn background(&self, ray: &Ray) -> Spectrum;

    /// Returns the background light sampling PDF for `ray`, or `None` when
    /// the background is not importance sampled.
    ///
    /// * `ray` - The ray.
    fn background_pdf(&self, ray: &Ray) -> Option<Float>;

    /// Sample a position on a light, used as the anchor for equiangular
    /// sampling in media.
    ///
    /// * `u`    - First uniform sample.
    /// * `v`    - Second uniform sample.
    /// * `time` - Time value.
    fn sample_position(&self, u: Float, v: Float, time: Float) -> Option<Point3f>;

    /// Opaque light linking mask of an object.
    fn light_linking(&self, _object: u32) -> u32 {
        0
    }

    /// Opaque shadow linking mask of an object.
    fn shadow_linking(&self, _object: u32) -> u32 {
        0
    }
}

/// Closure sampling and evaluation.
pub trait BounceSampler: Send + Sync {
    /// Sample the surface closures of `sd`.
    ///
    /// * `sd` - The shading point.
    /// * `u`  - First uniform sample.
    /// * `v`  - Second uniform sample.
    fn sample_bsdf(&self, sd: &ShaderData, u: Float, v: Float) -> Option<BounceSample>;

    /// Evaluate the surface closures of `sd` for a light direction. Returns
    /// the evaluation and its PDF.
    ///
    /// * `sd`       - The shading point.
    /// * `omega_in` - Unit direction toward the light.
    fn eval_bsdf(&self, sd: &ShaderData, omega_in: &Vector3f) -> (BsdfEval, Float);

    /// Sample the phase function of the volume point `sd`.
    ///
    /// * `sd` - The shading point.
    /// * `u`  - First uniform sample.
    /// * `v`  - Second uniform sample.
    fn sample_phase(&self, sd: &ShaderData, u: Float, v: Float) -> Option<BounceSample>;

    /// Evaluate the phase function of the volume point `sd`.
    ///
    /// * `sd`       - The shading point.
    /// * `omega_in` - Unit direction toward the light.
    fn eval_phase(&self, sd: &ShaderData, omega_in: &Vector3f) -> (BsdfEval, Float);
}

/// Participating media.
pub trait VolumeShader: Send + Sync {
    /// Evaluate a volume shader.
    ///
    /// * `shader` - Volume shader.
    /// * `p`      - Position.
    /// * `time`   - Time value.
    fn eval(&self, shader: u32, p: &Point3f, time: Float) -> VolumeCoefficients;

    /// Returns true if the coefficients vary in space.
    fn is_heterogeneous(&self, shader: u32) -> bool;

    /// Returns how distances are sampled inside the medium.
    fn sampling_method(&self, _shader: u32) -> VolumeSampling {
        VolumeSampling::Distance
    }
}

/// The collaborators the kernel traces against.
#[derive(Clone)]
pub struct Scene {
    /// Geometry queries.
    pub intersector: Arc<dyn Intersector>,

    /// Shader evaluation.
    pub shading: Arc<dyn ShadingSystem>,

    /// Light sampling.
    pub lights: Arc<dyn LightSampler>,

    /// Closure sampling.
    pub bounce: Arc<dyn BounceSampler>,

    /// Participating media.
    pub volumes: Arc<dyn VolumeShader>,
}
