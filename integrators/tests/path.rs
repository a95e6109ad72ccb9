mod common;

use common::*;
use pbrt_core::film::*;
use pbrt_core::geometry::*;
use pbrt_core::pbrt::*;
use pbrt_core::spectrum::*;
use float_cmp::approx_eq;
use integrators::*;
use proptest::prelude::*;
use std::sync::Arc;

fn assert_rgba(rgba: [Float; 4], expected: [Float; 4], epsilon: Float) {
    for (a, b) in rgba.iter().zip(expected) {
        assert!(approx_eq!(Float, *a, b, epsilon = epsilon), "{rgba:?} != {expected:?}");
    }
}

/// Ray hitting the top of the unit sphere at 45 degrees.
fn oblique_ray() -> Ray {
    let o = Point3f::new(0.0, 0.0, 1.0) + Vector3f::new(1.0, 0.0, 1.0).normalize() * 4.0;
    camera_ray(o, Point3f::new(0.0, 0.0, 1.0))
}

/// Lambertian unit sphere lit from above by a lamp delivering unit
/// irradiance at its top, with an optional occluder in between.
fn lamp_scene(albedo: Float, occluder: Option<Material>) -> Scene {
    let mut world = MockWorld::new(Spectrum::ZERO)
        .with_sphere(Sphere::new(Point3f::ZERO, 1.0, Material::Diffuse(grey(albedo))))
        .with_lamp(Point3f::new(0.0, 0.0, 3.0), grey(4.0 * PI));
    if let Some(material) = occluder {
        world = world.with_sphere(Sphere::new(Point3f::new(0.0, 0.0, 2.0), 0.25, material));
    }
    world.into_scene()
}

struct CoinFlip;

impl TerminationPolicy for CoinFlip {
    fn continuation_probability(&self, _state: &PathState, _throughput: &Spectrum) -> Float {
        0.5
    }
}

#[test]
fn black_scene_is_opaque_black() {
    let scene = MockWorld::new(Spectrum::ZERO).into_scene();
    let integrator = PathIntegrator::new(config()).unwrap();
    let (results, _) = render(&integrator, &scene, front_ray(), 16, PassFlags::empty());
    for r in results {
        assert_eq!(r.rgba, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(r.termination, PathTermination::BackgroundMiss);
    }
}

#[test]
fn directly_visible_emitter() {
    let scene = MockWorld::new(Spectrum::ZERO)
        .with_sphere(Sphere::new(Point3f::ZERO, 1.0, Material::Emitter(Spectrum::ONE)))
        .into_scene();
    let integrator = PathIntegrator::new(config()).unwrap();
    let (results, _) = render(&integrator, &scene, front_ray(), 8, PassFlags::empty());
    for r in results {
        assert_rgba(r.rgba, [1.0, 1.0, 1.0, 1.0], 1e-6);
        assert_eq!(r.termination, PathTermination::NoContinuation);
    }
}

#[test]
fn emitter_without_bounces() {
    let scene = MockWorld::new(Spectrum::ZERO)
        .with_sphere(Sphere::new(Point3f::ZERO, 1.0, Material::Emitter(Spectrum::ONE)))
        .into_scene();
    let mut config = config();
    config.integrator.max_bounce = 0;
    let integrator = PathIntegrator::new(config).unwrap();
    assert_eq!(integrator.config().integrator.min_bounce, 0);

    let (results, _) = render(&integrator, &scene, front_ray(), 8, PassFlags::empty());
    for r in results {
        assert_rgba(r.rgba, [1.0, 1.0, 1.0, 1.0], 1e-6);
        assert_eq!(r.bounces, 0);
    }
}

#[test]
fn transparent_background_miss() {
    let scene = MockWorld::new(Spectrum::ONE).into_scene();
    let mut config = config();
    config.background.transparent = true;
    let integrator = PathIntegrator::new(config).unwrap();
    let (results, _) = render(&integrator, &scene, front_ray(), 8, PassFlags::empty());
    for r in results {
        assert_rgba(r.rgba, [0.0, 0.0, 0.0, 0.0], 1e-6);
        assert_eq!(r.termination, PathTermination::TransparentBackground);
    }
}

#[test]
fn background_pass_behind_transparent_film() {
    let scene = MockWorld::new(grey(0.5)).into_scene();
    let mut config = config();
    config.background.transparent = true;
    config.film.passes = PassFlags::BACKGROUND;
    let integrator = PathIntegrator::new(config).unwrap();
    let (results, tile) = render(&integrator, &scene, front_ray(), 1, PassFlags::BACKGROUND);

    assert_rgba(results[0].rgba, [0.0, 0.0, 0.0, 0.0], 1e-6);
    assert_eq!(results[0].termination, PathTermination::BackgroundMiss);
    assert_eq!(tile.pass(PassType::Background, 0), Some([0.5, 0.5, 0.5, 0.0]));
}

#[test]
fn direct_light_from_point_lamp() {
    let scene = lamp_scene(0.5, None);
    let integrator = PathIntegrator::new(config()).unwrap();
    let (results, _) = render(&integrator, &scene, oblique_ray(), 16, PassFlags::empty());
    for r in results {
        assert_rgba(r.rgba, [0.5, 0.5, 0.5, 1.0], 1e-3);
    }
}

#[test]
fn transparent_shadows_attenuate() {
    let scene = lamp_scene(0.5, Some(Material::Transparent(grey(0.5))));
    let integrator = PathIntegrator::new(config()).unwrap();
    let (results, _) = render(&integrator, &scene, oblique_ray(), 16, PassFlags::empty());
    for r in results {
        // Both walls of the occluder halve the light.
        assert_rgba(r.rgba, [0.125, 0.125, 0.125, 1.0], 1e-3);
    }

    let mut config = config();
    config.integrator.transparent_shadows = false;
    let integrator = PathIntegrator::new(config).unwrap();
    let (results, _) = render(&integrator, &scene, oblique_ray(), 16, PassFlags::empty());
    for r in results {
        assert_rgba(r.rgba, [0.0, 0.0, 0.0, 1.0], 1e-6);
    }
}

#[test]
fn russian_roulette_is_unbiased() {
    let scene = MockWorld::new(Spectrum::ONE)
        .with_sphere(Sphere::new(Point3f::ZERO, 1.0, Material::Diffuse(grey(0.5))))
        .into_scene();

    let integrator = PathIntegrator::new(config()).unwrap();
    let (reference, _) = render(&integrator, &scene, front_ray(), 64, PassFlags::empty());
    for r in reference.iter() {
        assert_rgba(r.rgba, [0.5, 0.5, 0.5, 1.0], 1e-4);
    }

    let integrator = PathIntegrator::new(config()).unwrap().with_termination(Arc::new(CoinFlip));
    let (results, _) = render(&integrator, &scene, front_ray(), 4096, PassFlags::empty());
    let terminated = results
        .iter()
        .filter(|r| r.termination == PathTermination::RussianRoulette)
        .count();
    assert!(terminated > 0 && terminated < results.len());

    let m = mean(&results);
    assert!((m[0] - 0.5).abs() < 0.05, "mean {m:?}");
    for r in results.iter().filter(|r| r.termination != PathTermination::RussianRoulette) {
        assert_rgba(r.rgba, [1.0, 1.0, 1.0, 1.0], 1e-3);
    }
}

#[test]
fn ambient_occlusion_bounce_budget() {
    // Inside a closed diffuse room every bounce hits a wall again.
    let scene = MockWorld::new(Spectrum::ONE)
        .with_sphere(Sphere::new(Point3f::ZERO, 10.0, Material::Diffuse(grey(0.5))))
        .into_scene();
    let ray = camera_ray(Point3f::ZERO, Point3f::new(1.0, 0.0, 0.0));

    let mut config = config();
    config.integrator.ao_bounces = Some(0);
    let integrator = PathIntegrator::new(config.clone()).unwrap();
    let (results, _) = render(&integrator, &scene, ray, 32, PassFlags::empty());
    for r in results {
        assert_eq!(r.termination, PathTermination::AoBounceBudget);
        assert_rgba(r.rgba, [0.0, 0.0, 0.0, 1.0], 1e-6);
    }

    // Short AO rays escape and see the background instead.
    config.background.ao_distance = 1e-3;
    let integrator = PathIntegrator::new(config).unwrap();
    let (results, _) = render(&integrator, &scene, ray, 32, PassFlags::empty());
    for r in results {
        assert_eq!(r.termination, PathTermination::BackgroundMiss);
        assert_rgba(r.rgba, [0.5, 0.5, 0.5, 1.0], 1e-4);
    }
}

#[test]
fn no_shading_beyond_ao_bounces() {
    let scene = MockWorld::new(Spectrum::ONE)
        .with_sphere(Sphere::new(Point3f::ZERO, 10.0, Material::Diffuse(grey(0.5))))
        .into_scene();
    let ray = camera_ray(Point3f::ZERO, Point3f::new(0.0, 1.0, 0.0));

    for n in 0..4 {
        let mut config = config();
        config.integrator.ao_bounces = Some(n);
        let integrator = PathIntegrator::new(config).unwrap();
        let (results, _) = render(&integrator, &scene, ray, 64, PassFlags::empty());
        for r in results.iter() {
            assert!(r.bounces <= n + 1, "ao_bounces {n}: {} bounces", r.bounces);
            if r.termination == PathTermination::AoBounceBudget {
                assert_eq!(r.bounces, n + 1);
            }
        }
        assert!(results.iter().any(|r| r.termination == PathTermination::AoBounceBudget));
    }
}

#[test]
fn holdout_mask_cuts_alpha() {
    let scene = MockWorld::new(Spectrum::ONE)
        .with_sphere(Sphere::new(Point3f::ZERO, 1.0, Material::HoldoutMask))
        .into_scene();

    let mut config = config();
    config.background.transparent = true;
    let integrator = PathIntegrator::new(config.clone()).unwrap();
    let (results, _) = render(&integrator, &scene, front_ray(), 4, PassFlags::empty());
    for r in results {
        assert_eq!(r.termination, PathTermination::Holdout);
        assert_rgba(r.rgba, [0.0, 0.0, 0.0, 0.0], 1e-6);
    }

    config.background.transparent = false;
    let integrator = PathIntegrator::new(config).unwrap();
    let (results, _) = render(&integrator, &scene, front_ray(), 4, PassFlags::empty());
    for r in results {
        assert_rgba(r.rgba, [0.0, 0.0, 0.0, 1.0], 1e-6);
    }
}

#[test]
fn unshadowed_catcher_shows_background() {
    let scene = MockWorld::new(Spectrum::ONE)
        .with_sphere(Sphere::new(Point3f::ZERO, 1.0, Material::ShadowCatcher(grey(0.5))))
        .into_scene();

    let integrator = PathIntegrator::new(config()).unwrap();
    let (results, _) = render(&integrator, &scene, front_ray(), 16, PassFlags::empty());
    for r in results {
        assert_rgba(r.rgba, [1.0, 1.0, 1.0, 1.0], 1e-4);
    }

    let mut config = config();
    config.background.transparent = true;
    let integrator = PathIntegrator::new(config).unwrap();
    let (results, _) = render(&integrator, &scene, front_ray(), 16, PassFlags::empty());
    for r in results {
        assert_rgba(r.rgba, [0.0, 0.0, 0.0, 0.0], 1e-4);
    }
}

#[test]
fn shadowed_catcher_darkens() {
    let scene = MockWorld::new(Spectrum::ONE)
        .with_sphere(Sphere::new(Point3f::ZERO, 1.0, Material::ShadowCatcher(grey(0.5))))
        .with_sphere(Sphere::new(Point3f::new(0.0, 0.0, 2.0), 0.25, Material::Diffuse(grey(0.5))))
        .with_lamp(Point3f::new(0.0, 0.0, 3.0), grey(4.0 * PI))
        .into_scene();
    let integrator = PathIntegrator::new(config()).unwrap();
    let (results, _) = render(&integrator, &scene, oblique_ray(), 256, PassFlags::empty());
    let m = mean(&results);
    assert!(m[0] > 0.35 && m[0] < 0.65, "mean {m:?}");
}

#[test]
fn direct_clamp_limits_luminance() {
    let scene = MockWorld::new(Spectrum::ZERO)
        .with_sphere(Sphere::new(Point3f::ZERO, 1.0, Material::Emitter(grey(10.0))))
        .into_scene();
    let mut config = config();
    config.integrator.sample_clamp_direct = Some(1.0);
    let integrator = PathIntegrator::new(config).unwrap();
    let (results, _) = render(&integrator, &scene, front_ray(), 4, PassFlags::empty());
    for r in results {
        assert_rgba(r.rgba, [1.0, 1.0, 1.0, 1.0], 1e-4);
    }
}

#[test]
fn light_passes_sum_to_combined() {
    let scene = MockWorld::new(grey(0.25))
        .with_sphere(Sphere::new(Point3f::ZERO, 1.0, Material::Diffuse(grey(0.5))))
        .with_lamp(Point3f::new(0.0, 0.0, 3.0), grey(4.0 * PI))
        .into_scene();

    let integrator = PathIntegrator::new(config()).unwrap();
    let (plain, _) = render(&integrator, &scene, oblique_ray(), 32, PassFlags::empty());

    let mut config = config();
    config.film.passes = PassFlags::LIGHT;
    let integrator = PathIntegrator::new(config).unwrap();
    let (split, tile) = render(&integrator, &scene, oblique_ray(), 32, PassFlags::LIGHT);

    for (a, b) in plain.iter().zip(split.iter()) {
        assert_rgba(b.rgba, a.rgba, 1e-4);
    }
    let direct = tile.pass(PassType::DiffuseDirect, 0).unwrap_or_default();
    assert!(direct[0] > 0.0);
}

#[test]
fn subsurface_continues_from_reentry_point() {
    let scene = MockWorld::new(Spectrum::ONE)
        .with_sphere(Sphere::new(Point3f::ZERO, 1.0, Material::Subsurface(grey(0.5))))
        .into_scene();
    let integrator = PathIntegrator::new(config()).unwrap();
    let (results, _) = render(&integrator, &scene, front_ray(), 16, PassFlags::empty());
    for r in results {
        assert_eq!(r.termination, PathTermination::SubsurfaceRedirect);
        assert_rgba(r.rgba, [0.5, 0.5, 0.5, 1.0], 1e-4);
    }

    let mut config = config();
    config.integrator.use_subsurface = false;
    let integrator = PathIntegrator::new(config).unwrap();
    let (results, _) = render(&integrator, &scene, front_ray(), 4, PassFlags::empty());
    for r in results {
        assert_eq!(r.termination, PathTermination::NoContinuation);
    }
}

#[test]
fn continuations_do_not_scatter_below_surfaces_again() {
    // Every continuation leaving the inner wall hits subsurface material again.
    let scene = MockWorld::new(Spectrum::ONE)
        .with_sphere(Sphere::new(Point3f::ZERO, 10.0, Material::Subsurface(grey(0.5))))
        .into_scene();
    let config = config();
    let integrator = PathIntegrator::new(config.clone()).unwrap();
    let ray = camera_ray(Point3f::ZERO, Point3f::new(1.0, 0.0, 0.0));
    let (results, _) = render(&integrator, &scene, ray, 16, PassFlags::empty());
    for r in results {
        assert_eq!(r.termination, PathTermination::SubsurfaceRedirect);
        assert_rgba(r.rgba, [0.0, 0.0, 0.0, 1.0], 1e-6);
    }

    let engine = SubsurfaceReentryEngine::new(&scene, &config);
    let state = PathState::new(&config, 0, 0);
    let isect = scene.intersector.intersect(&ray, PathRayFlag::CAMERA).unwrap();
    let shade = |randb| {
        let mut sd = scene.shading.evaluate(&isect, &ray, &state.shading_context(randb));
        sd.randb_closure = randb;
        sd
    };
    let mut sampler = HashSampler::new(0, 0, 0);
    let mut radiance = PathRadiance::new(false);

    let mut queue = SubsurfaceIndirectRays::new(BSSRDF_MAX_HITS);
    let mut throughput = Spectrum::ONE;
    assert!(engine.scatter(&mut sampler, &mut shade(0.5), &state, &mut throughput, &ray, &mut radiance, &mut queue));
    assert_eq!(queue.len(), 1);

    // Start tracing the queued continuation; a second event is declined.
    let mut next_state = state.clone();
    let mut next_ray = ray;
    assert!(queue.setup_next(&mut next_state, &mut next_ray, &mut radiance, &mut throughput));
    let mut throughput = Spectrum::ONE;
    assert!(!engine.scatter(&mut sampler, &mut shade(0.5), &state, &mut throughput, &ray, &mut radiance, &mut queue));
    assert_eq!(throughput, Spectrum::ONE);
    assert!(queue.is_empty());
}

#[test]
fn data_passes_written_once_at_first_hit() {
    let scene = MockWorld::new(Spectrum::ZERO)
        .with_sphere(Sphere::new(Point3f::ZERO, 1.0, Material::Diffuse(grey(0.5))))
        .into_scene();
    let mut config = config();
    config.film.passes = PassFlags::DATA;
    let integrator = PathIntegrator::new(config).unwrap();
    let (_, tile) = render(&integrator, &scene, front_ray(), 1, PassFlags::DATA);

    let depth = tile.pass(PassType::Depth, 0).unwrap_or_default();
    assert!(approx_eq!(Float, depth[0], 4.0, epsilon = 1e-3));
    let normal = tile.pass(PassType::Normal, 0).unwrap_or_default();
    assert_rgba(normal, [0.0, 0.0, 1.0, 0.0], 1e-4);
    assert_eq!(tile.pass(PassType::ObjectId, 0), Some([0.0; 4]));
}

#[test]
fn trace_pixel_addresses_tile() {
    let scene = MockWorld::new(Spectrum::ONE).into_scene();
    let integrator = PathIntegrator::new(config()).unwrap();
    let mut tile = RenderTile::new(2, 2, 2, 2, PassFlags::empty());
    let (offset, stride) = tile.offset_and_stride();
    let mut sampler = HashSampler::new(3, 3, 0);

    integrator.trace_pixel(&scene, &mut sampler, 0, 3, 3, offset, stride, &front_ray(), &mut tile);
    assert_eq!(tile.combined(3), [1.0, 1.0, 1.0, 1.0]);
    assert_eq!(tile.sample_count(3), 1);

    let rejected = Ray::new(Point3f::ZERO, Vector3f::new(0.0, 0.0, 1.0), 0.0, 0.0);
    integrator.trace_pixel(&scene, &mut sampler, 0, 2, 2, offset, stride, &rejected, &mut tile);
    assert_eq!(tile.combined(0), [0.0; 4]);
    assert_eq!(tile.sample_count(0), 1);
}

#[test]
fn invalid_config_is_rejected() {
    let mut config = config();
    config.integrator.volume_step_size = 0.0;
    assert!(PathIntegrator::new(config).is_err());

    let mut nan_clamp = common::config();
    nan_clamp.integrator.sample_clamp_indirect = Some(Float::NAN);
    assert!(PathIntegrator::new(nan_clamp).is_err());
}

#[test]
fn miss_leaves_only_world_volume() {
    // The boundary never reports an exit, so the path still carries the
    // object medium when it leaves the scene.
    let world = VolumeCoefficients {
        sigma_a: grey(0.01),
        emission: grey(0.01),
        ..Default::default()
    };
    let object = VolumeCoefficients {
        sigma_a: Spectrum::ONE,
        ..Default::default()
    };
    let scene = MockWorld::new(Spectrum::ZERO)
        .with_sphere(Sphere::new(Point3f::ZERO, 1.0, Material::OneWayVolumeBound(1)))
        .with_medium(world)
        .with_medium(object)
        .into_scene();
    let mut config = config();
    config.background.volume_shader = Some(0);
    config.integrator.volume_decoupled = false;

    // Emission of the world medium seen through 4 units of world, 2 units of
    // world plus object, then the unbounded world after the miss.
    let outside = (-0.04 as Float).exp();
    let inside = (-2.02 as Float).exp();
    let expected = (1.0 - outside) + outside * (0.01 / 1.01) * (1.0 - inside) + outside * inside;

    let integrator = PathIntegrator::new(config).unwrap();
    let (results, _) = render(&integrator, &scene, front_ray(), 4, PassFlags::empty());
    for r in results {
        assert_eq!(r.termination, PathTermination::BackgroundMiss);
        assert!(approx_eq!(Float, r.rgba[0], expected, epsilon = 1e-3), "{:?} != {expected}", r.rgba);
    }
}

#[test]
fn world_volume_survives_stack_cleaning() {
    let mut config = config();
    config.background.volume_shader = Some(3);
    let mut state = PathState::new(&config, 0, 0);
    state.volume_stack.enter_exit(&VolumeBoundary {
        object: 1,
        shader: 4,
        backfacing: false,
    });
    assert_eq!(state.volume_stack.len(), 2);

    state.volume_stack.clean(config.background.volume_shader);
    let entries: Vec<_> = state.volume_stack.iter().copied().collect();
    assert_eq!(entries, vec![VolumeStackEntry::world(3)]);

    config.integrator.use_volumes = false;
    assert!(PathState::new(&config, 0, 0).volume_stack.is_empty());
}

proptest! {
    #[test]
    fn subsurface_queue_is_bounded(limit in 1..=BSSRDF_MAX_HITS, pushes in 0usize..10) {
        let config = config();
        let mut queue = SubsurfaceIndirectRays::new(limit);
        for sample in 0..pushes {
            let _ = queue.push(PathContinuation {
                state: PathState::new(&config, 0, sample as u32),
                ray: Ray::default(),
                throughput: Spectrum::ONE,
                radiance: PathRadiance::new(false),
            });
            prop_assert!(queue.len() <= limit);
        }
        prop_assert_eq!(queue.len(), pushes.min(limit));

        let mut state = PathState::new(&config, 0, 0);
        let mut ray = Ray::default();
        let mut radiance = PathRadiance::new(false);
        let mut throughput = Spectrum::ONE;
        let mut popped = 0;
        while queue.setup_next(&mut state, &mut ray, &mut radiance, &mut throughput) {
            popped += 1;
        }
        prop_assert_eq!(popped, pushes.min(limit));
        prop_assert!(queue.is_empty());
        prop_assert!(!queue.setup_next(&mut state, &mut ray, &mut radiance, &mut throughput));
    }

    #[test]
    fn subsurface_queue_interleaves_push_and_pop(ops in prop::collection::vec(any::<bool>(), 0..32)) {
        let config = config();
        let mut queue = SubsurfaceIndirectRays::new(BSSRDF_MAX_HITS);
        let mut state = PathState::new(&config, 0, 0);
        let mut ray = Ray::default();
        let mut radiance = PathRadiance::new(false);
        let mut throughput = Spectrum::ONE;

        for (i, enqueue) in ops.into_iter().enumerate() {
            if enqueue {
                let mut continuation = PathState::new(&config, 0, i as u32 + 1);
                continuation.rng_offset += PRNG_BOUNCE_NUM;
                let _ = queue.push(PathContinuation {
                    state: continuation,
                    ray: Ray::default(),
                    throughput: grey(0.5),
                    radiance: PathRadiance::new(false),
                });
            } else if queue.is_empty() {
                let before = (format!("{state:?}"), radiance.clone(), throughput);
                prop_assert!(!queue.setup_next(&mut state, &mut ray, &mut radiance, &mut throughput));
                prop_assert_eq!(format!("{state:?}"), before.0);
                prop_assert_eq!(&radiance, &before.1);
                prop_assert_eq!(throughput, before.2);
            } else {
                let remaining = queue.len() as u32 - 1;
                prop_assert!(queue.setup_next(&mut state, &mut ray, &mut radiance, &mut throughput));
                prop_assert_eq!(state.rng_offset, PRNG_BASE_NUM + (1 + remaining) * PRNG_BOUNCE_NUM);
                prop_assert_eq!(throughput, grey(0.5));
                prop_assert!(queue.is_tracing());
            }
            prop_assert!(queue.len() <= BSSRDF_MAX_HITS);
        }
    }
}
