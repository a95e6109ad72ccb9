//! Integrators

#[macro_use]
extern crate log;

mod config;
mod emission;
mod path;
mod path_state;
mod radiance;
mod sampler;
mod scene;
mod shader;
mod shadow;
mod subsurface;
mod surface;
mod volume;

// Re-export.
pub use config::*;
pub use emission::*;
pub use path::*;
pub use path_state::*;
pub use radiance::*;
pub use sampler::*;
pub use scene::*;
pub use shader::*;
pub use shadow::*;
pub use subsurface::*;
pub use surface::*;
pub use volume::*;
