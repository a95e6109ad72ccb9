//! Demo Scene

use pbrt_core::geometry::*;
use pbrt_core::pbrt::*;
use pbrt_core::rng::LCG;
use pbrt_core::sampling::*;
use pbrt_core::spectrum::*;
use integrators::*;
use smallvec::SmallVec;
use std::sync::Arc;

/// Nearest accepted hit distance.
const HIT_EPSILON: Float = 1e-4;

/// Surface response of a ball.
#[derive(Copy, Clone, Debug)]
pub enum Surface {
    /// Lambertian reflector.
    Matte(Spectrum),

    /// Emitter with a dim diffuse base.
    Glow(Spectrum),

    /// Tinted pass-through surface.
    Clear(Spectrum),

    /// Subsurface scatterer with a mean free path.
    Skin { albedo: Spectrum, radius: Float },

    /// Invisible boundary of a medium.
    Fog(u32),

    /// Matte surface that only records shadows.
    Catcher,
}

/// A sphere in the demo scene.
#[derive(Copy, Clone, Debug)]
pub struct Ball {
    /// Center.
    pub center: Point3f,

    /// Radius.
    pub radius: Float,

    /// Surface.
    pub surface: Surface,
}

impl Ball {
    /// Returns the first hit distance in `(HIT_EPSILON, t_max)`.
    ///
    /// * `ray` - The ray.
    fn intersect(&self, ray: &Ray) -> Option<Float> {
        let oc = ray.o - self.center;
        let b = oc.dot(&ray.d);
        let c = oc.dot(&oc) - self.radius * self.radius;
        let disc = b * b - c;
        if disc < 0.0 {
            return None;
        }
        let root = disc.sqrt();
        [-b - root, -b + root]
            .into_iter()
            .find(|&t| t > HIT_EPSILON && t < ray.t_max)
    }

    /// Returns the outward normal at a point on the surface.
    fn normal(&self, p: &Point3f) -> Normal3f {
        (*p - self.center).normalize()
    }
}

/// A point lamp.
#[derive(Copy, Clone, Debug)]
pub struct Lamp {
    pub p: Point3f,
    pub intensity: Spectrum,
}

/// Balls, a point lamp, a sky colour and homogeneous media.
#[derive(Clone, Debug)]
pub struct DemoScene {
    balls: Vec<Ball>,
    lamp: Lamp,
    sky: Spectrum,
    media: Vec<VolumeCoefficients>,
}

impl DemoScene {
    /// Create the default demo scene: a floor, a matte, a clear and a
    /// subsurface ball, a fog ball, a glowing ball and a shadow catcher.
    pub fn new() -> Self {
        let ball = |x: Float, y: Float, z: Float, radius: Float, surface: Surface| Ball {
            center: Point3f::new(x, y, z),
            radius,
            surface,
        };
        Self {
            balls: vec![
                ball(0.0, -1000.0, 0.0, 1000.0, Surface::Matte(Spectrum::splat(0.6))),
                ball(-1.2, 0.5, 0.0, 0.5, Surface::Matte(Spectrum::new(0.7, 0.2, 0.2))),
                ball(
                    0.0,
                    0.5,
                    0.0,
                    0.5,
                    Surface::Skin {
                        albedo: Spectrum::new(0.9, 0.6, 0.5),
                        radius: 0.1,
                    },
                ),
                ball(1.2, 0.5, 0.0, 0.5, Surface::Clear(Spectrum::new(0.6, 0.8, 0.9))),
                ball(0.0, 0.4, 1.3, 0.4, Surface::Fog(0)),
                ball(-0.8, 2.2, -1.0, 0.25, Surface::Glow(Spectrum::splat(8.0))),
                ball(1.6, 0.25, 1.4, 0.25, Surface::Catcher),
            ],
            lamp: Lamp {
                p: Point3f::new(2.0, 4.0, 3.0),
                intensity: Spectrum::splat(60.0),
            },
            sky: Spectrum::new(0.2, 0.3, 0.5),
            media: vec![VolumeCoefficients {
                sigma_a: Spectrum::splat(0.3),
                sigma_s: Spectrum::splat(1.5),
                emission: Spectrum::ZERO,
                anisotropy: 0.0,
            }],
        }
    }

    /// Returns the collaborator bundle borrowing this scene.
    pub fn into_scene(self) -> Scene {
        let scene = Arc::new(self);
        Scene {
            intersector: scene.clone(),
            shading: scene.clone(),
            lights: scene.clone(),
            bounce: scene.clone(),
            volumes: scene,
        }
    }

    fn nearest(&self, ray: &Ray) -> Option<Intersection> {
        self.balls
            .iter()
            .enumerate()
            .filter_map(|(i, b)| b.intersect(ray).map(|t| (i, t)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, t)| Intersection::new(t, i as u32, 0))
    }
}

impl Default for DemoScene {
    fn default() -> Self {
        Self::new()
    }
}

impl Intersector for DemoScene {
    fn intersect(&self, ray: &Ray, _visibility: PathRayFlag) -> Option<Intersection> {
        self.nearest(ray)
    }

    fn intersect_shadow(&self, ray: &Ray, _visibility: PathRayFlag, _shadow_linking: u32) -> Option<Intersection> {
        self.nearest(ray)
    }
}

impl ShadingSystem for DemoScene {
    fn evaluate(&self, isect: &Intersection, ray: &Ray, _ctx: &ShadingContext) -> ShaderData {
        let ball = &self.balls[isect.object as usize];
        let n = ball.normal(&ray.at(isect.t));
        let mut sd = ShaderData::surface(ray, isect.t, n, n);
        sd.object = isect.object;
        sd.prim = isect.prim;
        sd.shader = isect.object;

        let n = sd.n;
        match ball.surface {
            Surface::Matte(albedo) => sd.push_closure(ShaderClosure::new(ClosureType::Diffuse, albedo, n)),
            Surface::Glow(emission) => {
                sd.push_closure(ShaderClosure::new(ClosureType::Emission, emission, n));
                sd.push_closure(ShaderClosure::new(ClosureType::Diffuse, Spectrum::splat(0.1), n));
            }
            Surface::Clear(tint) => sd.push_closure(ShaderClosure::new(ClosureType::Transparent, tint, n)),
            Surface::Skin { albedo, radius } => {
                sd.push_closure(ShaderClosure::new(ClosureType::Diffuse, albedo * 0.2, n));
                sd.push_closure(
                    ShaderClosure::new(ClosureType::Bssrdf, albedo * 0.8, n).with_radius(Spectrum::splat(radius)),
                );
            }
            Surface::Fog(shader) => {
                sd.shader = shader;
                sd.flag |= ShaderFlags::HAS_VOLUME | ShaderFlags::HAS_ONLY_VOLUME;
            }
            Surface::Catcher => {
                sd.push_closure(ShaderClosure::new(ClosureType::Diffuse, Spectrum::splat(0.8), n));
                sd.object_flag |= ObjectFlags::SHADOW_CATCHER;
            }
        }
        sd
    }

    fn shadow_transparency(&self, isect: &Intersection, _ray: &Ray) -> Option<Spectrum> {
        match self.balls[isect.object as usize].surface {
            Surface::Clear(tint) => Some(tint),
            Surface::Fog(_) => Some(Spectrum::ONE),
            _ => None,
        }
    }

    fn volume_boundary(&self, isect: &Intersection, ray: &Ray) -> Option<VolumeBoundary> {
        let ball = &self.balls[isect.object as usize];
        if let Surface::Fog(shader) = ball.surface {
            let n = ball.normal(&ray.at(isect.t));
            Some(VolumeBoundary {
                object: isect.object,
                shader,
                backfacing: n.dot(&ray.d) > 0.0,
            })
        } else {
            None
        }
    }

    fn subsurface_hits(
        &self,
        sd: &ShaderData,
        closure: &ShaderClosure,
        _rng: &mut LCG,
        u: Float,
        v: Float,
    ) -> SubsurfaceHits {
        // Project a disk sample around the entry point back onto the ball.
        let ball = &self.balls[sd.object as usize];
        let (dx, dy) = concentric_sample_disk(u, v);
        let (s, t) = coordinate_system(&sd.ng);
        let r = closure.radius.average();
        let offset = s * (dx * r) + t * (dy * r);
        let p = ball.center + ball.normal(&(sd.p + offset)) * ball.radius;
        let n = ball.normal(&p);

        let mut hits = SmallVec::new();
        hits.push(SubsurfaceHit {
            p,
            ng: n,
            n,
            t: (p - sd.p).length(),
            object: sd.object,
            prim: sd.prim,
        });
        hits
    }

    fn subsurface_setup(&self, sd: &ShaderData, closure: &ShaderClosure, hit: &SubsurfaceHit) -> ShaderData {
        let mut hit_sd = sd.clone();
        hit_sd.p = hit.p;
        hit_sd.ng = hit.ng;
        hit_sd.n = hit.n;
        hit_sd.closures.clear();
        hit_sd.flag.remove(ShaderFlags::BSSRDF | ShaderFlags::BSDF | ShaderFlags::BSDF_HAS_EVAL);
        hit_sd.push_closure(ShaderClosure::new(ClosureType::Diffuse, closure.weight, hit.n));
        hit_sd
    }
}

impl LightSampler for DemoScene {
    fn sample_direct(&self, sd: &ShaderData, _ctx: &ShadingContext, _rand: [Float; 3]) -> Option<DirectLight> {
        let to_lamp = self.lamp.p - sd.p;
        let t = to_lamp.length();
        if t == 0.0 {
            return None;
        }
        let d = to_lamp / t;
        Some(DirectLight {
            p: self.lamp.p,
            ng: -d,
            d,
            t,
            eval: self.lamp.intensity / (t * t),
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

    fn background(&self, ray: &Ray) -> Spectrum {
        // Fade to white at the horizon.
        let up = max(0.0, ray.d.y);
        self.sky * up + Spectrum::ONE * (1.0 - up)
    }

    fn background_pdf(&self, _ray: &Ray) -> Option<Float> {
        None
    }

    fn sample_position(&self, _u: Float, _v: Float, _time: Float) -> Option<Point3f> {
        Some(self.lamp.p)
    }
}

impl BounceSampler for DemoScene {
    fn sample_bsdf(&self, sd: &ShaderData, u: Float, v: Float) -> Option<BounceSample> {
        let closure = sd.closures.iter().find(|c| c.kind.is_bsdf())?;
        match closure.kind {
            ClosureType::Diffuse => {
                let (omega_in, pdf) = sample_cos_hemisphere(&closure.n, u, v);
                let cos_theta = max(0.0, omega_in.dot(&closure.n));
                Some(BounceSample {
                    omega_in,
                    eval: BsdfEval::new(ClosureType::Diffuse, closure.weight * (cos_theta * INV_PI)),
                    pdf,
                    label: LabelFlags::REFLECT | LabelFlags::DIFFUSE,
                })
            }
            ClosureType::Transparent => Some(BounceSample {
                omega_in: -sd.i,
                eval: BsdfEval::new(ClosureType::Transparent, closure.weight),
                pdf: 1.0,
                label: LabelFlags::TRANSMIT | LabelFlags::TRANSPARENT,
            }),
            _ => None,
        }
    }

    fn eval_bsdf(&self, sd: &ShaderData, omega_in: &Vector3f) -> (BsdfEval, Float) {
        let mut eval = BsdfEval::default();
        let mut pdf = 0.0;
        for closure in sd.closures.iter().filter(|c| c.kind == ClosureType::Diffuse) {
            let cos_theta = max(0.0, omega_in.dot(&closure.n));
            eval.accum(ClosureType::Diffuse, closure.weight * (cos_theta * INV_PI));
            pdf = cos_theta * INV_PI;
        }
        (eval, pdf)
    }

    fn sample_phase(&self, sd: &ShaderData, u: Float, v: Float) -> Option<BounceSample> {
        let closure = sd.closures.iter().find(|c| c.kind == ClosureType::VolumeScatter)?;
        Some(BounceSample {
            omega_in: uniform_sample_sphere(u, v),
            eval: BsdfEval::new(ClosureType::VolumeScatter, closure.weight * INV_FOUR_PI),
            pdf: INV_FOUR_PI,
            label: LabelFlags::VOLUME_SCATTER,
        })
    }

    fn eval_phase(&self, sd: &ShaderData, _omega_in: &Vector3f) -> (BsdfEval, Float) {
        let mut eval = BsdfEval::default();
        for closure in sd.closures.iter().filter(|c| c.kind == ClosureType::VolumeScatter) {
            eval.accum(ClosureType::VolumeScatter, closure.weight * INV_FOUR_PI);
        }
        (eval, INV_FOUR_PI)
    }
}

impl VolumeShader for DemoScene {
    fn eval(&self, shader: u32, _p: &Point3f, _time: Float) -> VolumeCoefficients {
        self.media.get(shader as usize).copied().unwrap_or_default()
    }

    fn is_heterogeneous(&self, _shader: u32) -> bool {
        false
    }
}

/// Pinhole camera.
#[derive(Copy, Clone, Debug)]
pub struct Camera {
    origin: Point3f,
    forward: Vector3f,
    right: Vector3f,
    up: Vector3f,
    tan_half_fov: Float,
    aspect: Float,
    width: usize,
    height: usize,
}

impl Camera {
    /// Create a camera looking from `origin` at `target`.
    ///
    /// * `origin` - Eye position.
    /// * `target` - Point at the image center.
    /// * `fov`    - Vertical field of view in degrees.
    /// * `width`  - Image width.
    /// * `height` - Image height.
    pub fn look_at(origin: Point3f, target: Point3f, fov: Float, width: usize, height: usize) -> Self {
        let forward = (target - origin).normalize();
        let right = forward.cross(&Vector3f::new(0.0, 1.0, 0.0)).normalize();
        let up = right.cross(&forward);
        Self {
            origin,
            forward,
            right,
            up,
            tan_half_fov: (fov.to_radians() * 0.5).tan(),
            aspect: width as Float / height as Float,
            width,
            height,
        }
    }

    /// Returns the camera ray through a film position.
    ///
    /// * `x`  - Pixel column.
    /// * `y`  - Pixel row.
    /// * `du` - Horizontal offset inside the pixel.
    /// * `dv` - Vertical offset inside the pixel.
    pub fn generate_ray(&self, x: usize, y: usize, du: Float, dv: Float) -> Ray {
        let sx = (2.0 * (x as Float + du) / self.width as Float - 1.0) * self.tan_half_fov * self.aspect;
        let sy = (1.0 - 2.0 * (y as Float + dv) / self.height as Float) * self.tan_half_fov;
        let d = (self.forward + self.right * sx + self.up * sy).normalize();
        Ray::new(self.origin, d, FLOAT_MAX, 0.0)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
