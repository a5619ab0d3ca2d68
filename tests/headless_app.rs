//! Headless tests for [`MindPlugin`].
//!
//! These run with [`MinimalPlugins`] and a fixed simulation step, so no
//! window is created and the outcome doesn't depend on frame timing.

use deps::*;

use bevy::{ecs::event::Events, prelude::*};

use galacron::{
    config::GameConfig,
    events::SimEvent,
    mind::{
        actor::{
            fire::{FireProfiles, FireSettings},
            state::StateTag,
            ActorMind, EnemyConfig, EnemyKinds,
        },
        formation::{
            dive::{DiveTiming, DivingStrategy},
            slots::SlotLayout,
            Formation, FormationConfig,
        },
        MindPlugin, SimClock, SimulationSettings,
    },
    path::{PathPoint, PathTemplate, Paths, PrewarmedPathPool},
    sim,
};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn app(dt: f32) -> App {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins)
        .add_plugin(MindPlugin)
        .insert_resource(SimulationSettings { fixed_dt: Some(dt) });
    app
}

fn app_with_demo(seed: u64) -> App {
    let config =
        GameConfig::from_ron_str(include_str!("../assets/config/galacron.ron")).unwrap();
    let mut app = app(0.05);
    let formation = sim::install(&mut app.world, &config, seed).unwrap();
    sim::start_formation(&mut app.world, formation).unwrap();
    app
}

/// Steps the app, collecting every event it sent.
fn step(app: &mut App, frames: usize) -> Vec<Vec<SimEvent>> {
    let mut reader = app.world.resource::<Events<SimEvent>>().get_reader();
    let mut out = Vec::new();
    for _ in 0..frames {
        app.update();
        let events = app.world.resource::<Events<SimEvent>>();
        out.push(reader.iter(events).cloned().collect());
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────

/// The plugin runs the spawner and sends what happened as bevy events.
#[test]
fn plugin_sends_spawns() {
    let mut app = app_with_demo(1);
    let events: Vec<SimEvent> = step(&mut app, 200).into_iter().flatten().collect();
    let spawned = events
        .iter()
        .filter(|e| matches!(e, SimEvent::Spawned { .. }))
        .count();
    assert_eq!(spawned, 10);
    assert!(events.contains(&SimEvent::SpawnComplete));
    assert!(app.world.resource::<SimClock>().elapsed > 9.9);

    let mut minds = app.world.query::<&ActorMind>();
    assert_eq!(minds.iter(&app.world).count(), 10);
}

/// Without a formation the systems idle instead of panicking.
#[test]
fn plugin_without_formation_is_inert() {
    let mut app = app(0.05);
    let events: Vec<SimEvent> = step(&mut app, 2).into_iter().flatten().collect();
    assert!(events.is_empty());
    assert!((app.world.resource::<SimClock>().elapsed - 0.1).abs() < 1e-6);
}

/// An actor that settles into its slot during the actor update is already a
/// dive candidate in the same frame.
#[test]
fn dive_pass_sees_members_settled_this_frame() {
    let mut app = app(0.01);
    let formation = Formation::new(&FormationConfig {
        layout: SlotLayout::Offsets(vec![(0., 0.)]),
        anchor: (0., 0.),
        diving: DivingStrategy::TimeBased(DiveTiming {
            min_time_after_spawn: 0.,
            min_time_between_dives: 10.,
            max_time_between_dives: 10.,
        }),
        dive_paths: vec!["swoop".into()],
        ..Default::default()
    })
    .unwrap();
    let pool = PrewarmedPathPool::new(
        &[
            PathTemplate::linear("hold", vec![PathPoint::new(0., 0.)]),
            PathTemplate::linear("swoop", vec![PathPoint::new(0., 0.), PathPoint::new(0., -1.)]),
        ],
        2,
    )
    .unwrap();
    let enemies = EnemyKinds::new([EnemyConfig {
        name: "bee".into(),
        fly_in_speed: 1000.,
        fire: FireProfiles {
            on_path: FireSettings::silent(),
            fly_in: FireSettings::silent(),
            idle: FireSettings::silent(),
            dive: FireSettings::silent(),
        },
        ..Default::default()
    }])
    .unwrap();
    let formation = sim::install_parts(&mut app.world, formation, Box::new(pool), enemies, None)
        .unwrap();
    app.world
        .get_mut::<Formation>(formation)
        .unwrap()
        .set_total_members(1);
    let entry = app
        .world
        .resource_mut::<Paths>()
        .into_inner()
        .pool_mut()
        .acquire("hold", Vec2::new(0., 0.), 0.)
        .unwrap();
    let id = sim::spawn_actor(&mut app.world, formation, "bee", entry, 0).unwrap();
    sim::enable_diving(&mut app.world, formation);

    let frames = step(&mut app, 20);
    let settled = frames
        .iter()
        .position(|events| events.contains(&SimEvent::ReachedFormation { actor: id, slot: 0 }))
        .unwrap();
    assert!(frames[settled].contains(&SimEvent::DiveStarted { actor: id }));
    assert!(frames[..settled]
        .iter()
        .flatten()
        .all(|e| !matches!(e, SimEvent::DiveStarted { .. })));

    let mut minds = app.world.query::<&ActorMind>();
    let mind = minds.iter(&app.world).next().unwrap();
    assert_ne!(mind.state(), Some(StateTag::Idle));
}
