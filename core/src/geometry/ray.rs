//! Rays

use super::*;
use crate::pbrt::*;

/// Ray differentials. Origin and direction derivatives with respect to the
/// image plane, carried through the integrator untouched.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct RayDifferential {
    /// Origin derivative along x.
    pub dp_dx: Vector3f,

    /// Origin derivative along y.
    pub dp_dy: Vector3f,

    /// Direction derivative along x.
    pub dd_dx: Vector3f,

    /// Direction derivative along y.
    pub dd_dy: Vector3f,
}

/// A semi-infinite line.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Ray {
    /// Origin.
    pub o: Point3f,

    /// Direction.
    pub d: Vector3f,

    /// Maximum extent of the ray. Zero marks a rejected camera sample.
    pub t_max: Float,

    /// Time value.
    pub time: Float,

    /// Optional differentials.
    pub differentials: Option<RayDifferential>,
}

impl Ray {
    /// Create a new ray.
    ///
    /// * `o`     - Origin.
    /// * `d`     - Direction.
    /// * `t_max` - Maximum extent of the ray.
    /// * `time`  - Time value.
    pub fn new(o: Point3f, d: Vector3f, t_max: Float, time: Float) -> Self {
        Self {
            o,
            d,
            t_max,
            time,
            differentials: None,
        }
    }

    /// Returns the position along the ray at given parameter `t`.
    ///
    /// * `t` - Parameter.
    #[inline(always)]
    pub fn at(&self, t: Float) -> Point3f {
        self.o + self.d * t
    }

    /// Returns true if the ray is a rejected camera sample.
    pub fn is_rejected(&self) -> bool {
        self.t_max == 0.0
    }

    /// Returns true if any component is NaN.
    pub fn has_nans(&self) -> bool {
        self.o.has_nans() || self.d.has_nans() || self.t_max.is_nan()
    }
}

/// Offset a surface point along the geometric normal so a ray leaving it does
/// not re-intersect the surface. Small coordinates get a fixed offset; large
/// ones are nudged by a fixed number of ulps away from the surface.
///
/// * `p`  - The surface point.
/// * `ng` - The geometric normal pointing to the side the ray leaves from.
pub fn offset_ray_origin(p: &Point3f, ng: &Normal3f) -> Point3f {
    const EPSILON_F: Float = 1e-5;
    const EPSILON_TEST: Float = 1.0;
    const EPSILON_ULPS: u32 = 32;

    let offset = |p: Float, n: Float| -> Float {
        if abs(p) < EPSILON_TEST {
            p + n * EPSILON_F
        } else {
            let ip = float_to_bits(p);
            // Moving away from zero when p and n share the sign.
            if (ip ^ float_to_bits(n)) >> 31 != 0 {
                bits_to_float(ip - EPSILON_ULPS)
            } else {
                bits_to_float(ip + EPSILON_ULPS)
            }
        }
    };

    Point3f::new(offset(p.x, ng.x), offset(p.y, ng.y), offset(p.z, ng.z))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::strategies::*;
    use proptest::prelude::*;

    #[test]
    fn rejected_camera_ray() {
        let ray = Ray::new(Point3f::ZERO, Vector3f::new(0.0, 0.0, 1.0), 0.0, 0.0);
        assert!(ray.is_rejected());
    }

    proptest! {
        #[test]
        fn offset_moves_to_normal_side(p in vector3f(-1000.0..1000.0), n in unit_vector3f()) {
            let o = offset_ray_origin(&p, &n);
            prop_assert!((o - p).dot(&n) > 0.0);
        }
    }
}
