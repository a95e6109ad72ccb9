//! Geometry

mod ray;
mod vector3;

// Re-export
pub use ray::*;
pub use vector3::*;

#[cfg(test)]
pub(crate) mod strategies {
    use super::*;
    use proptest::prelude::*;
    use std::ops::Range;

    prop_compose! {
        pub fn vector3f(r: Range<f32>)(x in r.clone(), y in r.clone(), z in r) -> Vector3f {
            Vector3f::new(x, y, z)
        }
    }

    prop_compose! {
        pub fn unit_vector3f()(v in vector3f(-1.0..1.0).prop_filter("non-zero", |v| v.length() > 1e-2)) -> Vector3f {
            v.normalize()
        }
    }
}
