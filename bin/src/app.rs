//! Application related stuff

use clap::Parser;
use pbrt_core::film::PassFlags;
use integrators::KernelConfig;

/// Command line options.
#[derive(Parser, Clone, Debug)]
#[clap(author, version, about = "Renders an analytic demo scene with the path kernel.", long_about = None)]
pub struct Options {
    /// Samples per pixel.
    #[clap(
        long = "spp",
        short = 's',
        value_name = "NUM",
        default_value_t = 16,
        help = "Number of samples per pixel."
    )]
    pub spp: u32,

    /// Maximum path depth.
    #[clap(
        long = "max-bounce",
        value_name = "NUM",
        default_value_t = 12,
        help = "Maximum number of bounces of a path."
    )]
    pub max_bounce: u32,

    /// Bounces after which rays are traced as ambient occlusion.
    #[clap(
        long = "ao-bounces",
        value_name = "NUM",
        help = "Replace indirect light by ambient occlusion after this many bounces."
    )]
    pub ao_bounces: Option<u32>,

    /// Transparent film.
    #[clap(long, help = "Render the background as transparent alpha.")]
    pub transparent: bool,

    /// Separate light passes.
    #[clap(long = "light-passes", help = "Write per-component light passes.")]
    pub light_passes: bool,

    /// Decoupled volume sampling.
    #[clap(long, help = "Record volume segments and sample direct light independently.")]
    pub decoupled: bool,

    /// Number of threads to use for rendering.
    #[clap(
        long = "nthreads",
        short = 't',
        value_name = "NUM",
        default_value_t = 1,
        help = "Use specified number of threads for rendering."
    )]
    n_threads: usize,

    /// Tile size.
    #[clap(
        long = "tilesize",
        short = 'p',
        value_name = "NUM",
        default_value_t = 16,
        help = "Size in pixels of square tiles rendered per thread."
    )]
    pub tile_size: usize,

    /// Image width.
    #[clap(long, value_name = "NUM", default_value_t = 320, help = "Image width in pixels.")]
    pub width: usize,

    /// Image height.
    #[clap(long, value_name = "NUM", default_value_t = 240, help = "Image height in pixels.")]
    pub height: usize,

    /// Path to the image file.
    #[clap(
        long = "outfile",
        short = 'o',
        value_name = "FILE",
        default_value = "render.png",
        help = "Write the final image to the given filename."
    )]
    pub image_file: String,

    /// Suppress all text output other than error messages.
    #[clap(long, help = "Suppress all text output other than error messages.")]
    pub quiet: bool,
}

impl Options {
    /// Returns the number of threads to use.
    pub fn threads(&self) -> usize {
        let max_threads = num_cpus::get();
        match self.n_threads {
            0 => {
                warn!("Invalid nthreads");
                1
            }
            n if n > max_threads => {
                warn!("Num threads > max logical CPUs {}", max_threads);
                max_threads
            }
            n => n,
        }
    }

    /// Returns the kernel configuration selected by the options.
    pub fn kernel_config(&self) -> Result<KernelConfig, String> {
        let mut config = KernelConfig::default();

        config.integrator.max_bounce = self.max_bounce;
        config.integrator.max_volume_bounce = self.max_bounce;
        config.integrator.ao_bounces = self.ao_bounces;
        config.integrator.volume_decoupled = self.decoupled;
        config.integrator.sample_all_lights_direct = self.decoupled;
        config.integrator.aa_samples = self.spp;

        config.background.transparent = self.transparent;

        if self.light_passes {
            config.film.passes |= PassFlags::LIGHT;
        }

        if self.tile_size == 0 {
            return Err(String::from("tilesize must be positive"));
        }
        if self.width == 0 || self.height == 0 {
            return Err(format!("invalid resolution {}x{}", self.width, self.height));
        }

        config.clamp_bounce_limits();
        config.validate()?;
        Ok(config)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
