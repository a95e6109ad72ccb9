//! Spectrum

mod rgb_spectrum;

// Re-export
pub use rgb_spectrum::*;

/// The integrator carries RGB throughput and radiance.
pub type Spectrum = RGBSpectrum;
