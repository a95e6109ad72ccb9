//! Tile Renderer

use crate::app::Options;
use crate::scene::Camera;
use pbrt_core::film::*;
use pbrt_core::pbrt::*;
use pbrt_core::{print_stats, report_stats};
use image::{ImageBuffer, ImageFormat, Rgba};
use indicatif::{ProgressBar, ProgressStyle};
use integrators::*;
use std::thread;

/// Render seed mixed into every pixel hash.
const RENDER_SEED: u32 = 0x2f0d_a5c1;

/// Renders tiles of an image on worker threads.
pub struct Renderer<'a> {
    /// The integrator.
    integrator: &'a PathIntegrator,

    /// The scene.
    scene: &'a Scene,

    /// The camera.
    camera: Camera,

    /// Options.
    options: &'a Options,
}

impl<'a> Renderer<'a> {
    /// Create a new `Renderer`.
    ///
    /// * `integrator` - The integrator.
    /// * `scene`      - The scene.
    /// * `camera`     - The camera.
    /// * `options`    - Options.
    pub fn new(integrator: &'a PathIntegrator, scene: &'a Scene, camera: Camera, options: &'a Options) -> Self {
        Self {
            integrator,
            scene,
            camera,
            options,
        }
    }

    /// Render the image.
    pub fn render(&self) -> RenderBuffer {
        let (width, height) = (self.options.width, self.options.height);
        let tile_size = self.options.tile_size;
        let n_tiles_x = (width + tile_size - 1) / tile_size;
        let n_tiles_y = (height + tile_size - 1) / tile_size;
        let tile_count = n_tiles_x * n_tiles_y;
        let threads = self.options.threads();

        let passes = self.integrator.config().film.passes;
        let mut buffer = RenderBuffer::new(width, height, passes);

        info!("Rendering {n_tiles_x}x{n_tiles_y} tiles on {threads} threads");
        let progress = create_progress_reporter(tile_count as u64, self.options.quiet);
        progress.set_message("Rendering scene");

        thread::scope(|scope| {
            let (tx, rx) = crossbeam_channel::bounded::<(usize, usize)>(threads);
            let (done_tx, done_rx) = crossbeam_channel::unbounded::<RenderTile>();

            // Spawn worker threads.
            for _ in 0..threads {
                let rx = rx.clone();
                let done_tx = done_tx.clone();
                scope.spawn(move || {
                    for (x0, y0) in rx.iter() {
                        let w = tile_size.min(width - x0);
                        let h = tile_size.min(height - y0);
                        let mut tile = RenderTile::new(x0, y0, w, h, passes);
                        self.render_tile(&mut tile);
                        if done_tx.send(tile).is_err() {
                            break;
                        }
                    }
                    report_stats!();
                });
            }
            drop(rx); // Drop extra rx since we've cloned one for each worker.
            drop(done_tx);

            // Send work.
            'tiles: for ty in 0..n_tiles_y {
                for tx_idx in 0..n_tiles_x {
                    if tx.send((tx_idx * tile_size, ty * tile_size)).is_err() {
                        error!("Render workers exited early");
                        break 'tiles;
                    }
                }
            }
            drop(tx);

            // Merge tiles as they complete.
            for tile in done_rx.iter() {
                buffer.merge_tile(&tile);
                progress.inc(1);
            }
        });

        progress.finish_with_message("Render complete");
        buffer
    }

    /// Render every sample of every pixel in a tile.
    ///
    /// * `tile` - The tile.
    fn render_tile(&self, tile: &mut RenderTile) {
        let (offset, stride) = tile.offset_and_stride();
        let spp = self.integrator.config().integrator.aa_samples;
        info!(
            "Starting image tile ({}, {}) {}x{}",
            tile.x0, tile.y0, tile.width, tile.height
        );

        for y in tile.y0..tile.y0 + tile.height {
            for x in tile.x0..tile.x0 + tile.width {
                let mut sampler = HashSampler::new(x as u32, y as u32, RENDER_SEED);
                for sample in 0..spp {
                    let (du, dv) = sampler.sample_2d(sample, PRNG_FILTER_U);
                    let ray = self.camera.generate_ray(x, y, du, dv);
                    self.integrator
                        .trace_pixel(self.scene, &mut sampler, sample, x, y, offset, stride, &ray, tile);
                }

                let index = (x - tile.x0) + (y - tile.y0) * tile.width;
                let l = tile.combined(index);
                if l.iter().any(|v| v.is_nan()) {
                    error!("Not-a-number radiance value returned for pixel ({x}, {y})");
                } else if l.iter().any(|v| v.is_infinite()) {
                    error!("Infinite radiance value returned for pixel ({x}, {y})");
                } else if l[..3].iter().any(|&v| v < -1e-5) {
                    error!("Negative radiance value {l:?} returned for pixel ({x}, {y})");
                }
            }
        }
    }
}

/// Returns a progress bar, hidden when `quiet` is set.
///
/// * `count` - Number of work items.
/// * `quiet` - Suppress output.
fn create_progress_reporter(count: u64, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let progress = ProgressBar::new(count);
    let template = "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}";
    match ProgressStyle::with_template(template) {
        Ok(style) => progress.set_style(style.progress_chars("#>-")),
        Err(e) => warn!("Invalid progress template: {e}"),
    }
    progress
}

/// Print the statistics gathered by the workers.
pub fn print_render_stats() {
    print_stats!();
}

/// Writes the image in an 8-bit format chosen by the file extension.
///
/// * `path`   - Output file path.
/// * `buffer` - The rendered image.
pub fn write_image(path: &str, buffer: &RenderBuffer) -> Result<(), String> {
    let format = ImageFormat::from_path(path).map_err(|e| format!("Can't determine file type of {path}: {e}"))?;
    let (res_x, res_y) = (buffer.width as u32, buffer.height as u32);
    info!("Writing image {path} with resolution {res_x}x{res_y}");

    let mut imgbuf: ImageBuffer<Rgba<u8>, Vec<u8>> = ImageBuffer::new(res_x, res_y);
    for (x, y, pixel) in imgbuf.enumerate_pixels_mut() {
        let rgba = buffer.pixel(x as usize, y as usize);
        let [r, g, b] = [rgba[0], rgba[1], rgba[2]].map(gamma_correct_8bit);
        *pixel = Rgba([r, g, b, (clamp(rgba[3], 0.0, 1.0) * 255.0).round() as u8]);
    }

    imgbuf
        .save_with_format(path, format)
        .map_err(|e| format!("Error saving output image {path}: {e}."))
}

/// Apply sRGB gamma and quantize.
fn gamma_correct_8bit(v: Float) -> u8 {
    let v = clamp(v, 0.0, 1.0);
    let v = if v <= 0.0031308 {
        12.92 * v
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    };
    clamp(255.0 * v + 0.5, 0.0, 255.0) as u8
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
