//! Sampling

use crate::geometry::*;
use crate::pbrt::*;

/// Uniformly sample a point on the unit disk by mapping concentric squares
/// to concentric circles. Returns (x, y).
///
/// * `u` - First uniform sample.
/// * `v` - Second uniform sample.
pub fn concentric_sample_disk(u: Float, v: Float) -> (Float, Float) {
    // Map uniform random numbers to [-1, 1]^2.
    let ox = 2.0 * u - 1.0;
    let oy = 2.0 * v - 1.0;

    // Handle degeneracy at the origin.
    if ox == 0.0 && oy == 0.0 {
        return (0.0, 0.0);
    }

    let (r, theta) = if abs(ox) > abs(oy) {
        (ox, PI_OVER_FOUR * (oy / ox))
    } else {
        (oy, PI_OVER_TWO - PI_OVER_FOUR * (ox / oy))
    };
    (r * theta.cos(), r * theta.sin())
}

/// Cosine-weighted hemisphere sample about +z (Malley's method).
///
/// * `u` - First uniform sample.
/// * `v` - Second uniform sample.
pub fn cosine_sample_hemisphere(u: Float, v: Float) -> Vector3f {
    let (x, y) = concentric_sample_disk(u, v);
    let z = max(0.0, 1.0 - x * x - y * y).sqrt();
    Vector3f::new(x, y, z)
}

/// Returns the PDF for cosine-weighted hemisphere sampling.
///
/// * `cos_theta` - Cosine of angle to the pole.
#[inline]
pub fn cosine_hemisphere_pdf(cos_theta: Float) -> Float {
    cos_theta * INV_PI
}

/// Cosine-weighted sample of the hemisphere around `n`. Returns the
/// direction and its PDF.
///
/// * `n` - Unit normal defining the hemisphere.
/// * `u` - First uniform sample.
/// * `v` - Second uniform sample.
pub fn sample_cos_hemisphere(n: &Normal3f, u: Float, v: Float) -> (Vector3f, Float) {
    let local = cosine_sample_hemisphere(u, v);
    let (s, t) = coordinate_system(n);
    let d = s * local.x + t * local.y + *n * local.z;
    (d, cosine_hemisphere_pdf(local.z))
}

/// Uniformly sample a direction on the unit sphere.
///
/// * `u` - First uniform sample.
/// * `v` - Second uniform sample.
pub fn uniform_sample_sphere(u: Float, v: Float) -> Vector3f {
    let z = 1.0 - 2.0 * u;
    let r = max(0.0, 1.0 - z * z).sqrt();
    let phi = TWO_PI * v;
    Vector3f::new(r * phi.cos(), r * phi.sin(), z)
}

/// Power heuristic for multiple importance sampling with one sample taken
/// from each strategy.
///
/// * `a` - PDF of the strategy that generated the sample.
/// * `b` - PDF of the other strategy.
#[inline]
pub fn power_heuristic(a: Float, b: Float) -> Float {
    let denom = a * a + b * b;
    if denom > 0.0 {
        (a * a) / denom
    } else {
        0.0
    }
}

/// Equiangular distance sampling along a ray segment toward a point light
/// position. Returns the distance and its PDF, or `None` when the light lies
/// on the ray's line.
///
/// * `ray_o`   - Segment origin.
/// * `ray_d`   - Segment unit direction.
/// * `t_max`   - Segment length.
/// * `light_p` - Light anchor position.
/// * `xi`      - Uniform sample.
pub fn equiangular_sample(
    ray_o: &Point3f,
    ray_d: &Vector3f,
    t_max: Float,
    light_p: &Point3f,
    xi: Float,
) -> Option<(Float, Float)> {
    let to_light = *light_p - *ray_o;
    let delta = to_light.dot(ray_d);
    let d = max(0.0, to_light.length_squared() - delta * delta).sqrt();
    if d <= 0.0 {
        return None;
    }

    let theta_a = -delta.atan2(d);
    let theta_b = (t_max - delta).atan2(d);
    let span = theta_b - theta_a;
    if span <= 0.0 {
        return None;
    }
    let t_local = d * (xi * span + theta_a).tan();
    let pdf = d / (span * (d * d + t_local * t_local));
    Some((clamp(delta + t_local, 0.0, t_max), pdf))
}

/// Returns the PDF of `equiangular_sample` producing distance `t`.
///
/// * `ray_o`   - Segment origin.
/// * `ray_d`   - Segment unit direction.
/// * `t_max`   - Segment length.
/// * `light_p` - Light anchor position.
/// * `t`       - Sampled distance.
pub fn equiangular_pdf(ray_o: &Point3f, ray_d: &Vector3f, t_max: Float, light_p: &Point3f, t: Float) -> Float {
    let to_light = *light_p - *ray_o;
    let delta = to_light.dot(ray_d);
    let d = max(0.0, to_light.length_squared() - delta * delta).sqrt();
    if d <= 0.0 {
        return 0.0;
    }

    let theta_a = -delta.atan2(d);
    let theta_b = (t_max - delta).atan2(d);
    let t_local = t - delta;
    let span = theta_b - theta_a;
    if span <= 0.0 {
        0.0
    } else {
        d / (span * (d * d + t_local * t_local))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::approx_eq;
    use proptest::prelude::*;

    #[test]
    fn power_heuristic_degenerate() {
        assert_eq!(power_heuristic(0.0, 0.0), 0.0);
        assert_eq!(power_heuristic(1.0, 0.0), 1.0);
        assert!(approx_eq!(f32, power_heuristic(1.0, 1.0), 0.5, epsilon = 0.0001));
    }

    proptest! {
        #[test]
        fn power_heuristic_weights_sum_to_one(a in 0.01f32..100.0, b in 0.01f32..100.0) {
            let s = power_heuristic(a, b) + power_heuristic(b, a);
            prop_assert!(approx_eq!(f32, s, 1.0, epsilon = 0.0001));
        }

        #[test]
        fn cosine_hemisphere_is_upper(u in 0.0f32..1.0, v in 0.0f32..1.0) {
            let d = cosine_sample_hemisphere(u, v);
            prop_assert!(d.z >= 0.0);
            prop_assert!(approx_eq!(f32, d.length(), 1.0, epsilon = 0.001));
        }

        #[test]
        fn sample_cos_hemisphere_about_normal(u in 0.0f32..1.0, v in 0.0f32..1.0) {
            let n = Vector3f::new(1.0, 2.0, -0.5).normalize();
            let (d, pdf) = sample_cos_hemisphere(&n, u, v);
            prop_assert!(d.dot(&n) >= -0.0001);
            prop_assert!(pdf >= 0.0);
        }

        #[test]
        fn uniform_sphere_is_unit(u in 0.0f32..1.0, v in 0.0f32..1.0) {
            prop_assert!(approx_eq!(f32, uniform_sample_sphere(u, v).length(), 1.0, epsilon = 0.001));
        }

        #[test]
        fn equiangular_pdf_matches_sample(xi in 0.01f32..0.99) {
            let o = Point3f::ZERO;
            let d = Vector3f::new(0.0, 0.0, 1.0);
            let light = Point3f::new(1.0, 0.0, 2.0);
            if let Some((t, pdf)) = equiangular_sample(&o, &d, 5.0, &light, xi) {
                prop_assert!((0.0..=5.0).contains(&t));
                let p = equiangular_pdf(&o, &d, 5.0, &light, t);
                prop_assert!(approx_eq!(f32, p, pdf, epsilon = 0.001));
            }
        }
    }
}
