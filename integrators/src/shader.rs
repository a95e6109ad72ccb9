//! Shader Data

use bitflags::bitflags;
use pbrt_core::geometry::*;
use pbrt_core::pbrt::*;
use pbrt_core::spectrum::*;
use smallvec::SmallVec;

/// Maximum closures kept inline per shading point.
pub const MAX_CLOSURE: usize = 8;

/// Primitive index of shading points that are not on a surface.
pub const PRIM_NONE: u32 = u32::MAX;

/// Object index of shading points that are not on an object.
pub const OBJECT_NONE: u32 = u32::MAX;

bitflags! {
    /// Runtime properties of an evaluated shader.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ShaderFlags: u32 {
        const BACKFACING = 1 << 0;
        const EMISSION = 1 << 1;
        const BSDF = 1 << 2;
        const BSDF_HAS_EVAL = 1 << 3;
        const BSSRDF = 1 << 4;
        const HOLDOUT = 1 << 5;
        const AO = 1 << 6;
        const TRANSPARENT = 1 << 7;
        const USE_MIS = 1 << 8;
        const HAS_VOLUME = 1 << 9;
        const HAS_ONLY_VOLUME = 1 << 10;
        const HETEROGENEOUS_VOLUME = 1 << 11;
        const SCATTER = 1 << 12;
        const ABSORPTION = 1 << 13;

        /// Flags describing volume closures.
        const VOLUME_CLOSURES = Self::EMISSION.bits()
            | Self::SCATTER.bits()
            | Self::ABSORPTION.bits();
    }
}

bitflags! {
    /// Per-object properties.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ObjectFlags: u32 {
        const SHADOW_CATCHER = 1 << 0;
        const HOLDOUT_MASK = 1 << 1;
        const INTERSECTS_VOLUME = 1 << 2;
    }
}

bitflags! {
    /// Labels describing a sampled scattering event.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct LabelFlags: u32 {
        const TRANSMIT = 1 << 0;
        const REFLECT = 1 << 1;
        const TRANSPARENT = 1 << 2;
        const DIFFUSE = 1 << 3;
        const GLOSSY = 1 << 4;
        const SINGULAR = 1 << 5;
        const VOLUME_SCATTER = 1 << 6;
    }
}

/// Closure kinds produced by the shading system.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ClosureType {
    Diffuse,
    Glossy,
    Transmission,
    Transparent,
    Bssrdf,
    Emission,
    Holdout,
    AmbientOcclusion,
    VolumeScatter,
}

impl ClosureType {
    /// Returns true for surface scattering closures.
    pub fn is_bsdf(&self) -> bool {
        matches!(
            self,
            ClosureType::Diffuse
                | ClosureType::Glossy
                | ClosureType::Transmission
                | ClosureType::Transparent
        )
    }

    /// Returns true for subsurface closures.
    pub fn is_bssrdf(&self) -> bool {
        matches!(self, ClosureType::Bssrdf)
    }
}

/// A weighted closure at a shading point.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ShaderClosure {
    /// Kind of closure.
    pub kind: ClosureType,

    /// Closure weight.
    pub weight: Spectrum,

    /// Weight used to pick this closure among others.
    pub sample_weight: Float,

    /// Shading normal.
    pub n: Normal3f,

    /// Microfacet roughness for glossy and transmission closures.
    pub roughness: Float,

    /// Mean free path for subsurface closures.
    pub radius: Spectrum,

    /// Phase function anisotropy for volume closures.
    pub anisotropy: Float,
}

impl ShaderClosure {
    /// Create a closure with the sample weight derived from `weight`.
    ///
    /// * `kind`   - Kind of closure.
    /// * `weight` - Closure weight.
    /// * `n`      - Shading normal.
    pub fn new(kind: ClosureType, weight: Spectrum, n: Normal3f) -> Self {
        Self {
            kind,
            weight,
            sample_weight: abs(weight.average()),
            n,
            roughness: 0.0,
            radius: Spectrum::ZERO,
            anisotropy: 0.0,
        }
    }

    /// Set roughness.
    ///
    /// * `roughness` - Roughness.
    pub fn with_roughness(mut self, roughness: Float) -> Self {
        self.roughness = roughness;
        self
    }

    /// Set subsurface radius.
    ///
    /// * `radius` - Mean free path.
    pub fn with_radius(mut self, radius: Spectrum) -> Self {
        self.radius = radius;
        self
    }

    /// Set phase anisotropy.
    ///
    /// * `g` - Anisotropy in (-1, 1).
    pub fn with_anisotropy(mut self, g: Float) -> Self {
        self.anisotropy = g;
        self
    }
}

/// Closure list of a shading point.
pub type Closures = SmallVec<[ShaderClosure; MAX_CLOSURE]>;

/// An evaluated shading point on a surface or inside a volume.
#[derive(Clone, Debug, PartialEq)]
pub struct ShaderData {
    /// Position.
    pub p: Point3f,

    /// Geometric normal, facing the incoming ray.
    pub ng: Normal3f,

    /// Shading normal.
    pub n: Normal3f,

    /// Direction toward the ray origin.
    pub i: Vector3f,

    /// Distance from the ray origin.
    pub ray_length: Float,

    /// Surface parameterization.
    pub u: Float,
    pub v: Float,

    /// Time value.
    pub time: Float,

    /// Object index or `OBJECT_NONE`.
    pub object: u32,

    /// Primitive index or `PRIM_NONE`.
    pub prim: u32,

    /// Shader index.
    pub shader: u32,

    /// Runtime shader flags.
    pub flag: ShaderFlags,

    /// Object flags.
    pub object_flag: ObjectFlags,

    /// Closures.
    pub closures: Closures,

    /// Random number used to pick a closure.
    pub randb_closure: Float,
}

impl ShaderData {
    /// Create a surface shading point for a ray hit at distance `t`. The
    /// geometric and shading normals are flipped to face the ray and the
    /// BACKFACING flag is set when that was necessary.
    ///
    /// * `ray` - The ray.
    /// * `t`   - Hit distance.
    /// * `ng`  - Outward geometric normal.
    /// * `n`   - Outward shading normal.
    pub fn surface(ray: &Ray, t: Float, ng: Normal3f, n: Normal3f) -> Self {
        let mut flag = ShaderFlags::empty();
        let (ng, n) = if ng.dot(&ray.d) > 0.0 {
            flag |= ShaderFlags::BACKFACING;
            (-ng, -n)
        } else {
            (ng, n)
        };
        Self {
            p: ray.at(t),
            ng,
            n,
            i: -ray.d,
            ray_length: t,
            u: 0.0,
            v: 0.0,
            time: ray.time,
            object: OBJECT_NONE,
            prim: 0,
            shader: 0,
            flag,
            object_flag: ObjectFlags::empty(),
            closures: Closures::new(),
            randb_closure: 0.0,
        }
    }

    /// Create a shading point inside a volume at distance `t` along `ray`.
    ///
    /// * `ray` - The ray.
    /// * `t`   - Distance along the ray.
    pub fn volume(ray: &Ray, t: Float) -> Self {
        Self {
            p: ray.at(t),
            ng: -ray.d,
            n: -ray.d,
            i: -ray.d,
            ray_length: t,
            u: 0.0,
            v: 0.0,
            time: ray.time,
            object: OBJECT_NONE,
            prim: PRIM_NONE,
            shader: 0,
            flag: ShaderFlags::empty(),
            object_flag: ObjectFlags::empty(),
            closures: Closures::new(),
            randb_closure: 0.0,
        }
    }

    /// Add a closure and update the derived shader flags.
    ///
    /// * `closure` - The closure.
    pub fn push_closure(&mut self, closure: ShaderClosure) {
        if self.closures.len() >= MAX_CLOSURE {
            debug!("Closure limit reached, dropping {:?}", closure.kind);
            return;
        }

        match closure.kind {
            ClosureType::Diffuse | ClosureType::Glossy | ClosureType::Transmission => {
                self.flag |= ShaderFlags::BSDF | ShaderFlags::BSDF_HAS_EVAL;
            }
            ClosureType::Transparent => {
                self.flag |= ShaderFlags::BSDF | ShaderFlags::TRANSPARENT;
            }
            ClosureType::Bssrdf => self.flag |= ShaderFlags::BSSRDF,
            ClosureType::Emission => self.flag |= ShaderFlags::EMISSION,
            ClosureType::Holdout => self.flag |= ShaderFlags::HOLDOUT,
            ClosureType::AmbientOcclusion => self.flag |= ShaderFlags::AO,
            ClosureType::VolumeScatter => self.flag |= ShaderFlags::SCATTER,
        }
        self.closures.push(closure);
    }

    /// Returns true if the point lies on a surface.
    pub fn is_surface(&self) -> bool {
        self.prim != PRIM_NONE
    }

    /// Returns true if the surface was hit from behind.
    pub fn is_backfacing(&self) -> bool {
        self.flag.contains(ShaderFlags::BACKFACING)
    }

    /// Sum of closure weights of the given kind.
    fn sum_weights(&self, kind: ClosureType) -> Spectrum {
        self.closures
            .iter()
            .filter(|c| c.kind == kind)
            .fold(Spectrum::ZERO, |acc, c| acc + c.weight)
    }

    /// Returns the emitted radiance.
    pub fn emission(&self) -> Spectrum {
        if self.flag.contains(ShaderFlags::EMISSION) {
            self.sum_weights(ClosureType::Emission)
        } else {
            Spectrum::ZERO
        }
    }

    /// Returns the holdout weight.
    pub fn holdout(&self) -> Spectrum {
        self.sum_weights(ClosureType::Holdout)
    }

    /// Returns the transparency of the surface.
    pub fn transparency(&self) -> Spectrum {
        self.sum_weights(ClosureType::Transparent)
    }

    /// Returns the surface opacity.
    pub fn alpha(&self) -> Spectrum {
        (Spectrum::ONE - self.transparency()).clamp(0.0, 1.0)
    }

    /// Diffuse albedo.
    pub fn diffuse_color(&self) -> Spectrum {
        self.sum_weights(ClosureType::Diffuse)
    }

    /// Glossy albedo.
    pub fn glossy_color(&self) -> Spectrum {
        self.sum_weights(ClosureType::Glossy)
    }

    /// Transmission albedo.
    pub fn transmission_color(&self) -> Spectrum {
        self.sum_weights(ClosureType::Transmission)
    }

    /// Subsurface albedo.
    pub fn subsurface_color(&self) -> Spectrum {
        self.sum_weights(ClosureType::Bssrdf)
    }

    /// Returns the ambient occlusion weight and the normal to sample around.
    /// Diffuse closures contribute their weight scaled by `ao_factor` and
    /// their normals; explicit AO closures contribute their weight.
    ///
    /// * `ao_factor` - Strength of the diffuse contribution.
    pub fn ao(&self, ao_factor: Float) -> (Spectrum, Normal3f) {
        let mut eval = Spectrum::ZERO;
        let mut n = Normal3f::ZERO;
        for c in self.closures.iter() {
            match c.kind {
                ClosureType::Diffuse => {
                    eval += c.weight * ao_factor;
                    n += c.n * c.weight.average();
                }
                ClosureType::AmbientOcclusion => {
                    eval += c.weight;
                    n += c.n * c.weight.average();
                }
                _ => {}
            }
        }
        let n = if n.is_zero() { self.n } else { n.normalize() };
        (eval, n)
    }

    /// Raise the roughness of glossy closures to at least `roughness`.
    ///
    /// * `roughness` - Minimum roughness.
    pub fn blur(&mut self, roughness: Float) {
        for c in self.closures.iter_mut() {
            if matches!(c.kind, ClosureType::Glossy | ClosureType::Transmission) {
                c.roughness = max(c.roughness, roughness);
            }
        }
    }
}

/// BSDF or phase function evaluation split per light pass category.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct BsdfEval {
    pub diffuse: Spectrum,
    pub glossy: Spectrum,
    pub transmission: Spectrum,
    pub transparent: Spectrum,
    pub subsurface: Spectrum,
    pub scatter: Spectrum,

    /// Sum before multiple importance weighting, used for shadow catchers.
    pub sum_no_mis: Spectrum,
}

impl BsdfEval {
    /// Create an evaluation with a single category.
    ///
    /// * `kind`  - Closure kind selecting the category.
    /// * `value` - Value.
    pub fn new(kind: ClosureType, value: Spectrum) -> Self {
        let mut eval = Self::default();
        eval.accum(kind, value);
        eval
    }

    /// Add a value to the category of `kind`.
    ///
    /// * `kind`  - Closure kind selecting the category.
    /// * `value` - Value.
    pub fn accum(&mut self, kind: ClosureType, value: Spectrum) {
        match kind {
            ClosureType::Diffuse | ClosureType::AmbientOcclusion => self.diffuse += value,
            ClosureType::Glossy => self.glossy += value,
            ClosureType::Transmission => self.transmission += value,
            ClosureType::Transparent => self.transparent += value,
            ClosureType::Bssrdf => self.subsurface += value,
            ClosureType::VolumeScatter => self.scatter += value,
            ClosureType::Emission | ClosureType::Holdout => {}
        }
        if kind != ClosureType::Transparent {
            self.sum_no_mis += value;
        }
    }

    /// Sum over the non-transparent categories.
    pub fn sum(&self) -> Spectrum {
        self.diffuse + self.glossy + self.transmission + self.subsurface + self.scatter
    }

    /// Sum over every category.
    pub fn total(&self) -> Spectrum {
        self.sum() + self.transparent
    }

    /// Returns true if every category is black.
    pub fn is_zero(&self) -> bool {
        self.sum().is_black() && self.transparent.is_black()
    }

    /// Scale every category and the unweighted sum.
    ///
    /// * `s` - Scale.
    pub fn mul(&mut self, s: Spectrum) {
        self.diffuse *= s;
        self.glossy *= s;
        self.transmission *= s;
        self.transparent *= s;
        self.subsurface *= s;
        self.scatter *= s;
        self.sum_no_mis *= s;
    }

    /// Apply a multiple importance weight, leaving the unweighted sum alone.
    ///
    /// * `w` - MIS weight.
    pub fn mis(&mut self, w: Float) {
        self.diffuse *= w;
        self.glossy *= w;
        self.transmission *= w;
        self.transparent *= w;
        self.subsurface *= w;
        self.scatter *= w;
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::approx_eq;

    fn hit() -> ShaderData {
        let ray = Ray::new(
            Point3f::new(0.0, 0.0, -1.0),
            Vector3f::new(0.0, 0.0, 1.0),
            FLOAT_MAX,
            0.0,
        );
        ShaderData::surface(&ray, 1.0, Normal3f::new(0.0, 0.0, 1.0), Normal3f::new(0.0, 0.0, 1.0))
    }

    #[test]
    fn backfacing_flips_normals() {
        let sd = hit();
        assert!(sd.is_backfacing());
        assert_eq!(sd.ng, Normal3f::new(0.0, 0.0, -1.0));
        assert!(sd.is_surface());
    }

    #[test]
    fn closures_set_flags() {
        let mut sd = hit();
        sd.push_closure(ShaderClosure::new(ClosureType::Diffuse, Spectrum::splat(0.5), sd.n));
        sd.push_closure(ShaderClosure::new(ClosureType::Transparent, Spectrum::splat(0.25), sd.n));
        assert!(sd.flag.contains(ShaderFlags::BSDF | ShaderFlags::BSDF_HAS_EVAL));
        assert!(sd.flag.contains(ShaderFlags::TRANSPARENT));
        assert!(approx_eq!(f32, sd.alpha().average(), 0.75, epsilon = 0.0001));
    }

    #[test]
    fn closure_limit_is_respected() {
        let mut sd = hit();
        for _ in 0..MAX_CLOSURE + 3 {
            sd.push_closure(ShaderClosure::new(ClosureType::Diffuse, Spectrum::ONE, sd.n));
        }
        assert_eq!(sd.closures.len(), MAX_CLOSURE);

        // Dropped closures leave no trace in the flags.
        sd.push_closure(ShaderClosure::new(ClosureType::Emission, Spectrum::ONE, sd.n));
        sd.push_closure(ShaderClosure::new(ClosureType::Bssrdf, Spectrum::ONE, sd.n));
        assert!(!sd.flag.intersects(ShaderFlags::EMISSION | ShaderFlags::BSSRDF));
        assert!(sd.emission().is_black());
    }

    #[test]
    fn blur_raises_glossy_roughness() {
        let mut sd = hit();
        sd.push_closure(ShaderClosure::new(ClosureType::Glossy, Spectrum::ONE, sd.n).with_roughness(0.1));
        sd.push_closure(ShaderClosure::new(ClosureType::Diffuse, Spectrum::ONE, sd.n));
        sd.blur(0.3);
        assert_eq!(sd.closures[0].roughness, 0.3);
        assert_eq!(sd.closures[1].roughness, 0.0);
    }

    #[test]
    fn bsdf_eval_mis_keeps_unweighted_sum() {
        let mut eval = BsdfEval::new(ClosureType::Glossy, Spectrum::ONE);
        eval.mis(0.5);
        assert!(approx_eq!(f32, eval.sum().average(), 0.5, epsilon = 0.0001));
        assert!(approx_eq!(f32, eval.sum_no_mis.average(), 1.0, epsilon = 0.0001));
    }
}
