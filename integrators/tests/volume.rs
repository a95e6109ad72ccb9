mod common;

use common::*;
use pbrt_core::film::*;
use pbrt_core::geometry::*;
use pbrt_core::pbrt::*;
use pbrt_core::spectrum::*;
use float_cmp::approx_eq;
use integrators::*;
use std::sync::Arc;

/// Unit sphere bounding medium 0 under a constant background.
fn medium_scene(medium: VolumeCoefficients, background: Spectrum) -> Scene {
    MockWorld::new(background)
        .with_sphere(Sphere::new(Point3f::ZERO, 1.0, Material::VolumeBound(0)))
        .with_medium(medium)
        .into_scene()
}

fn direct_config() -> KernelConfig {
    let mut config = config();
    config.integrator.max_bounce = 64;
    config.integrator.max_volume_bounce = 64;
    config.integrator.volume_decoupled = false;
    config
}

fn decoupled_config() -> KernelConfig {
    let mut config = direct_config();
    config.integrator.volume_decoupled = true;
    config.integrator.sample_all_lights_direct = true;
    config
}

/// Media of a `MockWorld` sampled with a fixed distance sampling method.
struct SampledMedia {
    world: MockWorld,
    method: VolumeSampling,
}

impl VolumeShader for SampledMedia {
    fn eval(&self, shader: u32, p: &Point3f, time: Float) -> VolumeCoefficients {
        self.world.eval(shader, p, time)
    }

    fn is_heterogeneous(&self, shader: u32) -> bool {
        self.world.is_heterogeneous(shader)
    }

    fn sampling_method(&self, _shader: u32) -> VolumeSampling {
        self.method
    }
}

#[test]
fn absorbing_medium_attenuates() {
    let scene = medium_scene(
        VolumeCoefficients {
            sigma_a: Spectrum::ONE,
            ..Default::default()
        },
        Spectrum::ONE,
    );
    let expected = (-2.0 as Float).exp();

    for config in [direct_config(), decoupled_config()] {
        let integrator = PathIntegrator::new(config).unwrap();
        let (results, _) = render(&integrator, &scene, front_ray(), 8, PassFlags::empty());
        for r in results {
            assert!(approx_eq!(Float, r.rgba[0], expected, epsilon = 1e-3), "{:?}", r.rgba);
            assert_eq!(r.rgba[3], 1.0);
            assert_eq!(r.bounces, 0);
        }
    }
}

#[test]
fn emissive_medium_glows() {
    let scene = medium_scene(
        VolumeCoefficients {
            sigma_a: Spectrum::ONE,
            emission: Spectrum::ONE,
            ..Default::default()
        },
        Spectrum::ZERO,
    );
    let expected = 1.0 - (-2.0 as Float).exp();

    for config in [direct_config(), decoupled_config()] {
        let integrator = PathIntegrator::new(config).unwrap();
        let (results, _) = render(&integrator, &scene, front_ray(), 8, PassFlags::empty());
        for r in results {
            assert!(approx_eq!(Float, r.rgba[1], expected, epsilon = 1e-3), "{:?}", r.rgba);
        }
    }
}

#[test]
fn scattering_furnace_conserves_energy() {
    let scene = medium_scene(
        VolumeCoefficients {
            sigma_s: Spectrum::ONE,
            ..Default::default()
        },
        Spectrum::ONE,
    );

    for config in [direct_config(), decoupled_config()] {
        let integrator = PathIntegrator::new(config).unwrap();
        let (results, _) = render(&integrator, &scene, front_ray(), 256, PassFlags::empty());
        let m = mean(&results);
        assert!(m[0] >= 0.98 && m[0] <= 1.02, "mean {m:?}");
        assert!(results.iter().any(|r| r.bounces > 0));
    }
}

#[test]
fn medium_shadows_lamp() {
    let scene = MockWorld::new(Spectrum::ZERO)
        .with_sphere(Sphere::new(Point3f::ZERO, 1.0, Material::Diffuse(grey(0.5))))
        .with_sphere(Sphere::new(Point3f::new(0.0, 0.0, 2.0), 0.5, Material::VolumeBound(0)))
        .with_medium(VolumeCoefficients {
            sigma_a: Spectrum::ONE,
            ..Default::default()
        })
        .with_lamp(Point3f::new(0.0, 0.0, 3.0), grey(4.0 * PI))
        .into_scene();

    // Hit the top of the diffuse sphere from the side, missing the medium.
    let o = Point3f::new(0.0, 0.0, 1.0) + Vector3f::new(1.0, 0.0, 1.0).normalize() * 4.0;
    let ray = camera_ray(o, Point3f::new(0.0, 0.0, 1.0));

    let integrator = PathIntegrator::new(direct_config()).unwrap();
    let (results, _) = render(&integrator, &scene, ray, 8, PassFlags::empty());
    let expected = 0.5 * (-1.0 as Float).exp();
    for r in results {
        assert!(approx_eq!(Float, r.rgba[2], expected, epsilon = 1e-3), "{:?}", r.rgba);
    }
}

#[test]
fn camera_starts_inside_world_volume() {
    let scene = MockWorld::new(Spectrum::ONE)
        .with_sphere(Sphere::new(Point3f::ZERO, 10.0, Material::Diffuse(Spectrum::ZERO)))
        .with_medium(VolumeCoefficients {
            sigma_a: grey(0.1),
            ..Default::default()
        })
        .into_scene();
    let mut config = direct_config();
    config.background.volume_shader = Some(0);

    let integrator = PathIntegrator::new(config).unwrap();
    let ray = camera_ray(Point3f::ZERO, Point3f::new(0.0, 1.0, 0.0));
    let (results, _) = render(&integrator, &scene, ray, 4, PassFlags::empty());
    for r in results {
        // The black enclosure ends every path.
        assert_eq!(r.rgba, [0.0, 0.0, 0.0, 1.0]);
    }

    let scene = MockWorld::new(Spectrum::ONE)
        .with_medium(VolumeCoefficients {
            sigma_a: grey(0.1),
            ..Default::default()
        })
        .into_scene();
    let (results, _) = render(&integrator, &scene, ray, 4, PassFlags::empty());
    for r in results {
        // The world medium extends to infinity and swallows the background.
        assert_eq!(r.rgba, [0.0, 0.0, 0.0, 1.0]);
    }
}

#[test]
fn lit_medium_agrees_across_sampling_methods() {
    let world = MockWorld::new(Spectrum::ZERO)
        .with_sphere(Sphere::new(Point3f::ZERO, 1.0, Material::VolumeBound(0)))
        .with_medium(VolumeCoefficients {
            sigma_a: grey(0.2),
            sigma_s: grey(0.5),
            ..Default::default()
        })
        .with_lamp(Point3f::new(0.0, 0.5, 0.0), grey(1.0));
    let samples = 16384;

    let integrator = PathIntegrator::new(direct_config()).unwrap();
    let (results, _) = render(&integrator, &world.clone().into_scene(), front_ray(), samples, PassFlags::empty());
    let reference = mean(&results)[0];
    assert!(reference > 0.0);

    // Equiangular and multiple importance sampling switch to decoupled
    // integration on their own.
    let mut by_method = direct_config();
    by_method.integrator.volume_decoupled = true;

    let cases = [
        (VolumeSampling::Distance, decoupled_config()),
        (VolumeSampling::Equiangular, by_method.clone()),
        (VolumeSampling::MultipleImportance, by_method),
    ];
    for (method, config) in cases {
        let mut scene = world.clone().into_scene();
        scene.volumes = Arc::new(SampledMedia {
            world: world.clone(),
            method,
        });

        let mut stack = VolumeStack::new(config.integrator.volume_stack_size);
        assert!(stack.push(VolumeStackEntry::world(0)));
        let strategy = VolumeIntegrator::new(&scene, &config).strategy(&stack);
        assert_eq!(strategy, VolumeStrategy::Decoupled, "{method:?}");

        let integrator = PathIntegrator::new(config).unwrap();
        let (results, _) = render(&integrator, &scene, front_ray(), samples, PassFlags::empty());
        let m = mean(&results)[0];
        assert!(
            (m - reference).abs() < 0.1 * reference,
            "{method:?}: {m} against {reference}"
        );
    }
}

#[test]
fn scatter_events_are_reported() {
    let scene = medium_scene(
        VolumeCoefficients {
            sigma_s: Spectrum::ONE,
            ..Default::default()
        },
        Spectrum::ONE,
    );
    let integrator = PathIntegrator::new(direct_config()).unwrap();
    let (results, _) = render(&integrator, &scene, front_ray(), 32, PassFlags::empty());
    assert!(results.iter().any(|r| r.bounces > 0));

    pbrt_core::report_stats!();
    let accum = pbrt_core::stats::lock_stats(pbrt_core::stats::stats_accumulator());
    assert!(accum.counter("Volume/Scatter events").unwrap_or(0) > 0);
    assert!(accum.counter("Integrator/Camera paths").unwrap_or(0) >= 32);
}
