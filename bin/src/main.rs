#[macro_use]
extern crate log;

mod app;
mod render;
mod scene;

use app::Options;
use clap::Parser;
use pbrt_core::geometry::*;
use integrators::PathIntegrator;
use render::*;
use scene::*;

fn main() {
    // Initialize `env_logger`.
    env_logger::init();

    let options = Options::parse();
    if let Err(e) = run(&options) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn run(options: &Options) -> Result<(), String> {
    let config = options.kernel_config()?;
    let integrator = PathIntegrator::new(config)?;

    let scene = DemoScene::new().into_scene();
    let camera = Camera::look_at(
        Point3f::new(0.0, 1.2, 5.5),
        Point3f::new(0.0, 0.5, 0.0),
        40.0,
        options.width,
        options.height,
    );

    let buffer = Renderer::new(&integrator, &scene, camera, options).render();
    write_image(&options.image_file, &buffer)?;

    if !options.quiet {
        print_render_stats();
    }
    Ok(())
}
