//! Volume Stack

use crate::config::VOLUME_STACK_SIZE;
use crate::path_state::PathRayFlag;
use crate::scene::*;
use crate::shader::*;
use pbrt_core::geometry::*;
use pbrt_core::memory::BoundedStack;
use pbrt_core::pbrt::*;
use pbrt_core::{stat_counter, stat_inc, stat_register_fns};

stat_counter!(
    "Volume/Stack overflows",
    VOLUME_STACK_OVERFLOWS,
    volume_stats_stack_overflows,
);

stat_register_fns!(volume_stats_stack_overflows);

/// A medium the path is inside of.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VolumeStackEntry {
    /// Object owning the medium, `OBJECT_NONE` for the world.
    pub object: u32,

    /// Volume shader.
    pub shader: u32,
}

impl VolumeStackEntry {
    /// Returns the entry for the world volume.
    ///
    /// * `shader` - World volume shader.
    pub fn world(shader: u32) -> Self {
        Self {
            object: OBJECT_NONE,
            shader,
        }
    }
}

/// Media the path is currently inside of, innermost last.
#[derive(Clone, Debug, Default)]
pub struct VolumeStack {
    entries: BoundedStack<VolumeStackEntry, VOLUME_STACK_SIZE>,
}

impl VolumeStack {
    /// Create an empty stack.
    ///
    /// * `limit` - Maximum number of entries.
    pub fn new(limit: usize) -> Self {
        Self {
            entries: BoundedStack::new(limit),
        }
    }

    /// Returns true if the path is not inside any medium.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterate the entries, outermost first.
    pub fn iter(&self) -> impl Iterator<Item = &VolumeStackEntry> {
        self.entries.iter()
    }

    /// Add an entry. A full stack drops it and returns false.
    ///
    /// * `entry` - The entry.
    pub fn push(&mut self, entry: VolumeStackEntry) -> bool {
        match self.entries.push(entry) {
            Ok(()) => true,
            Err(dropped) => {
                stat_inc!(VOLUME_STACK_OVERFLOWS, 1);
                debug!(
                    "Volume stack full, ignoring object {} shader {}",
                    dropped.object, dropped.shader
                );
                false
            }
        }
    }

    /// Update the stack for a ray crossing a volume boundary. Leaving removes
    /// the object's entry; entering adds it unless it is already present.
    ///
    /// * `boundary` - The crossed boundary.
    pub fn enter_exit(&mut self, boundary: &VolumeBoundary) {
        let position = self.entries.iter().position(|e| e.object == boundary.object);
        if boundary.backfacing {
            if let Some(i) = position {
                let _ = self.entries.remove(i);
            }
        } else if position.is_none() {
            let _ = self.push(VolumeStackEntry {
                object: boundary.object,
                shader: boundary.shader,
            });
        }
    }

    /// Update the stack for a ray transmitted through the surface `sd`.
    ///
    /// * `sd` - The surface.
    pub fn enter_exit_surface(&mut self, sd: &ShaderData) {
        if sd.flag.contains(ShaderFlags::HAS_VOLUME) {
            self.enter_exit(&VolumeBoundary {
                object: sd.object,
                shader: sd.shader,
                backfacing: sd.is_backfacing(),
            });
        }
    }

    /// Reset the stack after a ray left the scene. Only the world volume, if
    /// any, remains.
    ///
    /// * `world` - World volume shader.
    pub fn clean(&mut self, world: Option<u32>) {
        self.entries.clear();
        if let Some(shader) = world {
            let _ = self.push(VolumeStackEntry::world(shader));
        }
    }

    /// Returns true if any medium varies in space.
    ///
    /// * `volumes` - Volume shaders.
    pub fn is_heterogeneous(&self, volumes: &dyn VolumeShader) -> bool {
        self.entries.iter().any(|e| volumes.is_heterogeneous(e.shader))
    }

    /// Returns the sampling method of the stack. Mixed methods fall back to
    /// multiple importance sampling.
    ///
    /// * `volumes` - Volume shaders.
    pub fn sampling_method(&self, volumes: &dyn VolumeShader) -> VolumeSampling {
        let mut method: Option<VolumeSampling> = None;
        for e in self.entries.iter() {
            let m = volumes.sampling_method(e.shader);
            method = match method {
                None => Some(m),
                Some(prev) if prev == m => Some(prev),
                Some(_) => return VolumeSampling::MultipleImportance,
            };
        }
        method.unwrap_or(VolumeSampling::Distance)
    }

    /// Returns the summed coefficients of every medium at a point.
    ///
    /// * `volumes` - Volume shaders.
    /// * `p`       - Position.
    /// * `time`    - Time value.
    pub fn eval(&self, volumes: &dyn VolumeShader, p: &Point3f, time: Float) -> VolumeCoefficients {
        let mut coeff = VolumeCoefficients::default();
        for e in self.entries.iter() {
            coeff += volumes.eval(e.shader, p, time);
        }
        coeff
    }

    /// Update the stack for a subsurface jump from `from` to `to` by
    /// walking every volume boundary between them.
    ///
    /// * `scene` - The scene.
    /// * `from`  - Entry point.
    /// * `to`    - Exit point.
    /// * `time`  - Time value.
    pub fn update_for_subsurface(&mut self, scene: &Scene, from: &Point3f, to: &Point3f, time: Float) {
        let mut dir = *to - *from;
        let mut length = dir.length();
        if length == 0.0 {
            return;
        }
        dir /= length;

        let mut ray = Ray::new(*from, dir, length, time);
        for _ in 0..2 * VOLUME_STACK_SIZE {
            let isect = match scene.intersector.intersect(&ray, PathRayFlag::ALL_VISIBILITY) {
                Some(isect) => isect,
                None => break,
            };
            if let Some(boundary) = scene.shading.volume_boundary(&isect, &ray) {
                self.enter_exit(&boundary);
            }

            let p = offset_ray_origin(&ray.at(isect.t), &dir);
            length -= (p - ray.o).length();
            if length <= 0.0 {
                break;
            }
            ray = Ray::new(p, dir, length, time);
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn boundary(object: u32, backfacing: bool) -> VolumeBoundary {
        VolumeBoundary {
            object,
            shader: object + 10,
            backfacing,
        }
    }

    #[test]
    fn enter_and_exit() {
        let mut stack = VolumeStack::new(4);
        stack.enter_exit(&boundary(1, false));
        stack.enter_exit(&boundary(2, false));
        stack.enter_exit(&boundary(1, false));
        assert_eq!(stack.len(), 2);

        stack.enter_exit(&boundary(1, true));
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.iter().next().map(|e| e.object), Some(2));

        stack.enter_exit(&boundary(5, true));
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn overflow_is_dropped() {
        let mut stack = VolumeStack::new(2);
        for object in 0..5 {
            stack.enter_exit(&boundary(object, false));
        }
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn clean_keeps_world() {
        let mut stack = VolumeStack::new(4);
        stack.enter_exit(&boundary(1, false));
        stack.clean(Some(7));
        let entries: Vec<_> = stack.iter().copied().collect();
        assert_eq!(entries, vec![VolumeStackEntry::world(7)]);

        stack.clean(None);
        assert!(stack.is_empty());
    }
}
