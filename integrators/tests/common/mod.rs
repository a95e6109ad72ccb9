//! Analytic sphere scenes for integration tests.

#![allow(dead_code)]

use pbrt_core::film::*;
use pbrt_core::geometry::*;
use pbrt_core::pbrt::*;
use pbrt_core::rng::LCG;
use pbrt_core::sampling::*;
use pbrt_core::spectrum::*;
use integrators::*;
use smallvec::SmallVec;
use std::sync::Arc;

/// Closest hit distance accepted by the mock intersector.
const T_MIN: Float = 1e-4;

/// Surface description of a sphere.
#[derive(Copy, Clone, Debug)]
pub enum Material {
    /// Emits the given radiance and does not scatter.
    Emitter(Spectrum),

    /// Lambertian reflector.
    Diffuse(Spectrum),

    /// Passes light straight through, scaled.
    Transparent(Spectrum),

    /// Boundary of a medium, invisible otherwise.
    VolumeBound(u32),

    /// Medium entered through the front face; the back face is a plain
    /// transparent surface, so the medium is never exited.
    OneWayVolumeBound(u32),

    /// Subsurface scatterer re-emerging at the entry point as a Lambertian.
    Subsurface(Spectrum),

    /// Lambertian shadow catcher.
    ShadowCatcher(Spectrum),

    /// Cuts a hole into the image.
    HoldoutMask,
}

/// A sphere.
#[derive(Copy, Clone, Debug)]
pub struct Sphere {
    pub center: Point3f,
    pub radius: Float,
    pub material: Material,
}

impl Sphere {
    pub fn new(center: Point3f, radius: Float, material: Material) -> Self {
        Self {
            center,
            radius,
            material,
        }
    }

    fn hit(&self, ray: &Ray) -> Option<Float> {
        let oc = ray.o - self.center;
        let b = oc.dot(&ray.d);
        let c = oc.dot(&oc) - self.radius * self.radius;
        let disc = b * b - c;
        if disc < 0.0 {
            return None;
        }
        let s = disc.sqrt();
        [-b - s, -b + s].into_iter().find(|&t| t > T_MIN && t < ray.t_max)
    }
}

/// A point lamp.
#[derive(Copy, Clone, Debug)]
pub struct PointLamp {
    pub p: Point3f,
    pub intensity: Spectrum,
}

/// Spheres, at most one point lamp, a constant background and homogeneous
/// media, implementing every collaborator trait.
#[derive(Clone, Debug, Default)]
pub struct MockWorld {
    pub spheres: Vec<Sphere>,
    pub lamp: Option<PointLamp>,
    pub background: Spectrum,
    pub media: Vec<VolumeCoefficients>,
}

impl MockWorld {
    pub fn new(background: Spectrum) -> Self {
        Self {
            background,
            ..Default::default()
        }
    }

    pub fn with_sphere(mut self, sphere: Sphere) -> Self {
        self.spheres.push(sphere);
        self
    }

    pub fn with_lamp(mut self, p: Point3f, intensity: Spectrum) -> Self {
        self.lamp = Some(PointLamp { p, intensity });
        self
    }

    pub fn with_medium(mut self, coeff: VolumeCoefficients) -> Self {
        self.media.push(coeff);
        self
    }

    pub fn into_scene(self) -> Scene {
        let world = Arc::new(self);
        Scene {
            intersector: world.clone(),
            shading: world.clone(),
            lights: world.clone(),
            bounce: world.clone(),
            volumes: world,
        }
    }

    fn closest(&self, ray: &Ray) -> Option<Intersection> {
        let mut closest: Option<Intersection> = None;
        for (i, s) in self.spheres.iter().enumerate() {
            if let Some(t) = s.hit(ray) {
                if closest.map_or(true, |c| t < c.t) {
                    closest = Some(Intersection::new(t, i as u32, i as u32));
                }
            }
        }
        closest
    }
}

impl Intersector for MockWorld {
    fn intersect(&self, ray: &Ray, _visibility: PathRayFlag) -> Option<Intersection> {
        self.closest(ray)
    }

    fn intersect_shadow(&self, ray: &Ray, _visibility: PathRayFlag, _shadow_linking: u32) -> Option<Intersection> {
        self.closest(ray)
    }
}

impl ShadingSystem for MockWorld {
    fn evaluate(&self, isect: &Intersection, ray: &Ray, _ctx: &ShadingContext) -> ShaderData {
        let sphere = &self.spheres[isect.object as usize];
        let n = (ray.at(isect.t) - sphere.center).normalize();
        let mut sd = ShaderData::surface(ray, isect.t, n, n);
        sd.object = isect.object;
        sd.prim = isect.prim;
        sd.shader = isect.object;

        let shading_n = sd.n;
        match sphere.material {
            Material::Emitter(e) => sd.push_closure(ShaderClosure::new(ClosureType::Emission, e, shading_n)),
            Material::Diffuse(a) => sd.push_closure(ShaderClosure::new(ClosureType::Diffuse, a, shading_n)),
            Material::Transparent(t) => {
                sd.push_closure(ShaderClosure::new(ClosureType::Transparent, t, shading_n))
            }
            Material::VolumeBound(shader) => {
                sd.shader = shader;
                sd.flag |= ShaderFlags::HAS_VOLUME | ShaderFlags::HAS_ONLY_VOLUME;
            }
            Material::OneWayVolumeBound(shader) => {
                if sd.is_backfacing() {
                    sd.push_closure(ShaderClosure::new(ClosureType::Transparent, Spectrum::ONE, shading_n));
                } else {
                    sd.shader = shader;
                    sd.flag |= ShaderFlags::HAS_VOLUME | ShaderFlags::HAS_ONLY_VOLUME;
                }
            }
            Material::Subsurface(a) => sd.push_closure(
                ShaderClosure::new(ClosureType::Bssrdf, a, shading_n).with_radius(Spectrum::ONE),
            ),
            Material::ShadowCatcher(a) => {
                sd.push_closure(ShaderClosure::new(ClosureType::Diffuse, a, shading_n));
                sd.object_flag |= ObjectFlags::SHADOW_CATCHER;
            }
            Material::HoldoutMask => sd.object_flag |= ObjectFlags::HOLDOUT_MASK,
        }
        sd
    }

    fn shadow_transparency(&self, isect: &Intersection, _ray: &Ray) -> Option<Spectrum> {
        match self.spheres[isect.object as usize].material {
            Material::Transparent(t) => Some(t),
            Material::VolumeBound(_) | Material::OneWayVolumeBound(_) => Some(Spectrum::ONE),
            _ => None,
        }
    }

    fn volume_boundary(&self, isect: &Intersection, ray: &Ray) -> Option<VolumeBoundary> {
        let sphere = &self.spheres[isect.object as usize];
        match sphere.material {
            Material::VolumeBound(shader) => {
                let n = ray.at(isect.t) - sphere.center;
                Some(VolumeBoundary {
                    object: isect.object,
                    shader,
                    backfacing: n.dot(&ray.d) > 0.0,
                })
            }
            Material::OneWayVolumeBound(shader) => Some(VolumeBoundary {
                object: isect.object,
                shader,
                backfacing: false,
            }),
            _ => None,
        }
    }

    fn subsurface_hits(
        &self,
        sd: &ShaderData,
        _closure: &ShaderClosure,
        _rng: &mut LCG,
        _u: Float,
        _v: Float,
    ) -> SubsurfaceHits {
        let mut hits = SmallVec::new();
        hits.push(SubsurfaceHit {
            p: sd.p,
            ng: sd.ng,
            n: sd.n,
            t: 0.0,
            object: sd.object,
            prim: sd.prim,
        });
        hits
    }

    fn subsurface_setup(&self, sd: &ShaderData, closure: &ShaderClosure, hit: &SubsurfaceHit) -> ShaderData {
        let mut hit_sd = sd.clone();
        hit_sd.p = hit.p;
        hit_sd.closures.clear();
        hit_sd.flag.remove(ShaderFlags::BSSRDF);
        hit_sd.push_closure(ShaderClosure::new(ClosureType::Diffuse, closure.weight, hit.n));
        hit_sd
    }
}

impl LightSampler for MockWorld {
    fn sample_direct(&self, sd: &ShaderData, _ctx: &ShadingContext, _rand: [Float; 3]) -> Option<DirectLight> {
        let lamp = self.lamp?;
        let to_lamp = lamp.p - sd.p;
        let t = to_lamp.length();
        let d = to_lamp / t;
        Some(DirectLight {
            p: lamp.p,
            ng: -d,
            d,
            t,
            eval: lamp.intensity / (t * t),
            pdf: 1.0,
            use_mis: false,
            cast_shadow: true,
            is_lamp: true,
        })
    }

    fn primitive_emission_pdf(&self, _sd: &ShaderData, _t: Float) -> Float {
        0.0
    }

    fn lamp_emission(&self, _ray: &Ray, _ctx: &ShadingContext) -> LampEmissions {
        LampEmissions::new()
    }

    fn background(&self, _ray: &Ray) -> Spectrum {
        self.background
    }

    fn background_pdf(&self, _ray: &Ray) -> Option<Float> {
        None
    }

    fn sample_position(&self, _u: Float, _v: Float, _time: Float) -> Option<Point3f> {
        self.lamp.map(|l| l.p)
    }
}

impl BounceSampler for MockWorld {
    fn sample_bsdf(&self, sd: &ShaderData, u: Float, v: Float) -> Option<BounceSample> {
        let c = sd.closures.iter().find(|c| c.kind.is_bsdf())?;
        match c.kind {
            ClosureType::Diffuse => {
                let (omega_in, pdf) = sample_cos_hemisphere(&c.n, u, v);
                let cos_theta = max(0.0, omega_in.dot(&c.n));
                Some(BounceSample {
                    omega_in,
                    eval: BsdfEval::new(ClosureType::Diffuse, c.weight * (cos_theta * INV_PI)),
                    pdf,
                    label: LabelFlags::REFLECT | LabelFlags::DIFFUSE,
                })
            }
            ClosureType::Transparent => Some(BounceSample {
                omega_in: -sd.i,
                eval: BsdfEval::new(ClosureType::Transparent, c.weight),
                pdf: 1.0,
                label: LabelFlags::TRANSMIT | LabelFlags::TRANSPARENT,
            }),
            _ => None,
        }
    }

    fn eval_bsdf(&self, sd: &ShaderData, omega_in: &Vector3f) -> (BsdfEval, Float) {
        let mut eval = BsdfEval::default();
        let mut pdf = 0.0;
        for c in sd.closures.iter().filter(|c| c.kind == ClosureType::Diffuse) {
            let cos_theta = max(0.0, omega_in.dot(&c.n));
            eval.accum(ClosureType::Diffuse, c.weight * (cos_theta * INV_PI));
            pdf = cos_theta * INV_PI;
        }
        (eval, pdf)
    }

    fn sample_phase(&self, sd: &ShaderData, u: Float, v: Float) -> Option<BounceSample> {
        let c = sd.closures.iter().find(|c| c.kind == ClosureType::VolumeScatter)?;
        Some(BounceSample {
            omega_in: uniform_sample_sphere(u, v),
            eval: BsdfEval::new(ClosureType::VolumeScatter, c.weight * INV_FOUR_PI),
            pdf: INV_FOUR_PI,
            label: LabelFlags::VOLUME_SCATTER,
        })
    }

    fn eval_phase(&self, sd: &ShaderData, _omega_in: &Vector3f) -> (BsdfEval, Float) {
        let mut eval = BsdfEval::default();
        for c in sd.closures.iter().filter(|c| c.kind == ClosureType::VolumeScatter) {
            eval.accum(ClosureType::VolumeScatter, c.weight * INV_FOUR_PI);
        }
        (eval, INV_FOUR_PI)
    }
}

impl VolumeShader for MockWorld {
    fn eval(&self, shader: u32, _p: &Point3f, _time: Float) -> VolumeCoefficients {
        self.media.get(shader as usize).copied().unwrap_or_default()
    }

    fn is_heterogeneous(&self, _shader: u32) -> bool {
        false
    }
}

/// Grey spectrum.
pub fn grey(v: Float) -> Spectrum {
    Spectrum::splat(v)
}

/// Camera ray from `o` toward `target`.
pub fn camera_ray(o: Point3f, target: Point3f) -> Ray {
    Ray::new(o, (target - o).normalize(), FLOAT_MAX, 0.0)
}

/// Camera ray looking down -z at the origin from `z = 5`.
pub fn front_ray() -> Ray {
    camera_ray(Point3f::new(0.0, 0.0, 5.0), Point3f::ZERO)
}

/// Trace `samples` samples of one pixel into a single-pixel tile.
pub fn render(
    integrator: &PathIntegrator,
    scene: &Scene,
    ray: Ray,
    samples: u32,
    passes: PassFlags,
) -> (Vec<PathSample>, RenderTile) {
    let mut tile = RenderTile::new(0, 0, 1, 1, passes);
    let mut sampler = HashSampler::new(3, 7, 0x5eed);
    let results = (0..samples)
        .map(|sample| {
            let result = integrator.integrate_traced(scene, &mut sampler, sample, ray, &mut tile, 0);
            tile.write_combined(0, sample, result.rgba);
            result
        })
        .collect();
    (results, tile)
}

/// Mean RGBA over the samples.
pub fn mean(results: &[PathSample]) -> [Float; 4] {
    let mut sum = [0.0; 4];
    for r in results {
        for (s, v) in sum.iter_mut().zip(r.rgba) {
            *s += v;
        }
    }
    sum.map(|s| s / results.len() as Float)
}

/// Configuration with every optional feature at its default.
pub fn config() -> KernelConfig {
    KernelConfig::default()
}
