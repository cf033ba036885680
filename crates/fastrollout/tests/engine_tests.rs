//! End-to-end engine tests against the headless backend and the
//! ground-plane pathfinder.

mod common;

use common::{EpisodeSpec, Fixture, IDENTITY};
use fastrollout::config::RolloutConfig;
use fastrollout::engine::RolloutGenerator;
use fastrollout::nav::PlanePathFinder;
use fastrollout::render::HeadlessBackend;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

type Engine = RolloutGenerator<HeadlessBackend, PlanePathFinder>;

const UNIT_GOAL: EpisodeSpec = ([0.0, 0.0, 0.0], IDENTITY, [1.0, 0.0, 0.0]);

#[test]
fn test_stop_far_from_goal() {
    let fixture = Fixture::new(&[("flat", &[UNIT_GOAL])]);
    let config = RolloutConfig::new(fixture.path(), fixture.path())
        .with_envs(1)
        .with_active_scenes(1)
        .with_workers(1)
        .with_seed(0);
    let mut engine = Engine::new(config).unwrap();

    engine.reset(0);
    engine.step(0, &[0]);

    assert_eq!(engine.masks(0), &[0]);
    assert!((engine.rewards(0)[0] - (-0.01)).abs() < 1e-6);
    let info = engine.infos(0)[0];
    assert_eq!(info.success, 0.0);
    assert_eq!(info.spl, 0.0);
    assert!((info.distance_to_goal - 1.0).abs() < 1e-5);
}

#[test]
fn test_forward_after_auto_reset_matches_fresh_episode() {
    let fixture = Fixture::new(&[("flat", &[UNIT_GOAL])]);
    let config = RolloutConfig::new(fixture.path(), fixture.path())
        .with_envs(1)
        .with_active_scenes(1)
        .with_workers(1)
        .with_seed(0);
    let mut engine = Engine::new(config).unwrap();

    engine.reset(0);
    // Wander, terminate, then confirm the next step starts from the
    // episode's start pose again.
    engine.step(0, &[1]);
    engine.step(0, &[2]);
    engine.step(0, &[0]);
    assert_eq!(engine.masks(0), &[0]);

    engine.step(0, &[1]);
    let expected_distance = (1.0f32 + 0.25 * 0.25).sqrt();
    let info = engine.infos(0)[0];
    assert_eq!(engine.masks(0), &[1]);
    assert!((info.distance_to_goal - expected_distance).abs() < 1e-5);
    assert!((engine.rewards(0)[0] - (-0.01 + (1.0 - expected_distance))).abs() < 1e-5);
}

#[test]
fn test_result_invariants_over_random_actions() {
    let episodes: Vec<EpisodeSpec> = (0..3)
        .map(|i| {
            (
                [i as f32, 0.0, 0.0],
                IDENTITY,
                [i as f32 + 2.0, 0.0, 1.0],
            )
        })
        .collect();
    let fixture = Fixture::new(&[("flat", &episodes)]);
    let config = RolloutConfig::new(fixture.path(), fixture.path())
        .with_envs(4)
        .with_active_scenes(1)
        .with_workers(2)
        .with_seed(11);
    let mut engine = Engine::new(config).unwrap();

    engine.reset(0);
    let mut rng = StdRng::seed_from_u64(5);
    for _ in 0..600 {
        let actions: Vec<i64> = (0..4).map(|_| rng.gen_range(0..4)).collect();
        engine.step(0, &actions);

        for env in 0..4 {
            let reward = engine.rewards(0)[env];
            let mask = engine.masks(0)[env];
            let info = engine.infos(0)[env];
            assert!(reward.is_finite());
            assert!(mask == 0 || mask == 1);
            assert!(info.success == 0.0 || info.success == 1.0);
            assert!((0.0..=1.0).contains(&info.spl));
            assert!(info.distance_to_goal >= 0.0);
        }
        let polars = engine.polars(0);
        assert_eq!(polars.shape(), &[4, 2]);
        assert!(polars.iter().all(|v| v.is_finite()));
    }
}

#[test]
fn test_reward_streams_are_seed_deterministic() {
    let episodes: Vec<EpisodeSpec> = (0..5)
        .map(|i| ([0.0, 0.0, i as f32], IDENTITY, [3.0, 0.0, i as f32]))
        .collect();
    let fixture = Fixture::new(&[("flat", &episodes)]);

    let run = || {
        let config = RolloutConfig::new(fixture.path(), fixture.path())
            .with_envs(4)
            .with_active_scenes(1)
            .with_workers(3)
            .with_seed(21);
        let mut engine = Engine::new(config).unwrap();
        engine.reset(0);

        let mut rng = StdRng::seed_from_u64(2);
        let mut trace = Vec::new();
        for _ in 0..200 {
            let actions: Vec<i64> = (0..4).map(|_| rng.gen_range(0..4)).collect();
            engine.step(0, &actions);
            trace.extend_from_slice(engine.rewards(0));
            trace.extend(engine.infos(0).iter().map(|i| i.distance_to_goal));
        }
        trace
    };

    assert_eq!(run(), run());
}

#[test]
fn test_scene_swap_migrates_every_env() {
    let near: &[EpisodeSpec] = &[UNIT_GOAL];
    let fixture = Fixture::new(&[("scene_a", near), ("scene_b", near)]);
    let config = RolloutConfig::new(fixture.path(), fixture.path())
        .with_envs(4)
        .with_active_scenes(1)
        .with_workers(2)
        .with_seed(3);
    let mut engine = Engine::new(config).unwrap();

    // The first prefetch is issued at construction, so the envs are
    // bound to the scene now sitting in the inactive pool and the
    // active slot already names the replacement.
    let bound = engine.group(0).env_scenes()[0];
    let target = engine.active_scenes()[0];
    assert_ne!(bound, target);
    assert_eq!(engine.inactive_scenes(), &[bound]);

    engine.reset(0);
    let mut migrated = false;
    for _ in 0..600 {
        // Stop everywhere so every episode terminates and can rebind.
        engine.step(0, &[0, 0, 0, 0]);

        // The partition stays a disjoint cover of the scene set.
        assert_eq!(engine.active_scenes().len(), 1);
        assert_eq!(engine.inactive_scenes().len(), 1);
        let mut all: Vec<u32> = engine
            .active_scenes()
            .iter()
            .chain(engine.inactive_scenes())
            .copied()
            .collect();
        all.sort();
        assert_eq!(all, vec![bound.min(target), bound.max(target)]);

        let scenes = engine.group(0).env_scenes();
        let on_target = scenes.iter().filter(|&&s| s == target).count();
        if on_target == 4 {
            migrated = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(migrated, "no full scene migration within the step budget");
}

#[test]
fn test_double_buffered_groups_step_independently() {
    let episodes: Vec<EpisodeSpec> = vec![UNIT_GOAL; 2];
    let fixture = Fixture::new(&[("scene_a", &episodes), ("scene_b", &episodes)]);
    let config = RolloutConfig::new(fixture.path(), fixture.path())
        .with_envs(4)
        .with_active_scenes(2)
        .with_workers(2)
        .with_double_buffered(true)
        .with_seed(1);
    let mut engine = Engine::new(config).unwrap();

    assert_eq!(engine.num_groups(), 2);
    assert_eq!(engine.envs_per_group(), 2);

    engine.reset(0);
    engine.reset(1);

    for _ in 0..5 {
        engine.step_start(0, &[1, 1]);
        engine.step_end(0);
        engine.render(0);

        engine.step_start(1, &[2, 2]);
        engine.step_end(1);
        engine.render(1);
    }

    assert_eq!(engine.rewards(0).len(), 2);
    assert_eq!(engine.rewards(1).len(), 2);
    // One frame per reset plus one per step, per group.
    assert_eq!(engine.backend().frames_submitted(0), 6);
    assert_eq!(engine.backend().frames_submitted(1), 6);
    engine.wait_for_frame(0);
    engine.wait_for_frame(1);
}

#[test]
#[should_panic(expected = "action vector length")]
fn test_action_length_mismatch_is_fatal() {
    let fixture = Fixture::new(&[("flat", &[UNIT_GOAL])]);
    let config = RolloutConfig::new(fixture.path(), fixture.path())
        .with_envs(2)
        .with_active_scenes(1)
        .with_workers(1);
    let mut engine = Engine::new(config).unwrap();
    engine.reset(0);
    engine.step_start(0, &[0]);
}

#[test]
fn test_too_few_scenes_is_fatal() {
    let fixture = Fixture::new(&[("flat", &[UNIT_GOAL])]);
    let config = RolloutConfig::new(fixture.path(), fixture.path())
        .with_envs(4)
        .with_active_scenes(2)
        .with_workers(1);
    assert!(Engine::new(config).is_err());
}
