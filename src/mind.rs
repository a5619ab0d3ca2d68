use deps::*;

use bevy::{ecs as bevy_ecs, prelude::*};
use rand::{rngs::StdRng, SeedableRng};

use crate::{events::SimEvent, math::*, path::pool::Paths, sensors};

pub mod actor;
pub mod formation;
pub mod spawner;

pub struct MindPlugin;

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, SystemLabel)]
pub enum FormationSystems {
    Clock,
    TargetSync,
    Spawn,
    Drift,
    DivePass,
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, SystemLabel)]
pub enum ActorSystems {
    Update,
    Route,
}

impl Plugin for MindPlugin {
    fn build(&self, app: &mut App) {
        use FormationSystems::*;
        app.add_event::<SimEvent>()
            .add_event::<actor::ActorSignalled>()
            .init_resource::<SimulationSettings>()
            .init_resource::<SimClock>()
            .init_resource::<SimRng>()
            .init_resource::<Paths>()
            .init_resource::<sensors::SharedTargets>()
            .init_resource::<actor::EnemyKinds>()
            .init_resource::<actor::ActorIndex>()
            .add_system_to_stage(CoreStage::PreUpdate, advance_clock.label(Clock))
            .add_system_to_stage(
                CoreStage::PreUpdate,
                sensors::target_event_butler.label(TargetSync).after(Clock),
            )
            // spawned actors are flushed before the update stage sees them
            .add_system_to_stage(
                CoreStage::PreUpdate,
                spawner::spawn_waves.label(Spawn).after(TargetSync),
            )
            .add_system(formation::drift.label(Drift))
            .add_system(actor::update.label(ActorSystems::Update).after(Drift))
            .add_system(
                actor::route_signals
                    .label(ActorSystems::Route)
                    .after(ActorSystems::Update),
            )
            .add_system(
                formation::dive_pass
                    .label(DivePass)
                    .after(ActorSystems::Route),
            );
    }
}

/// Overrides frame time with a fixed step when set.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulationSettings {
    pub fixed_dt: Option<TReal>,
}

/// Simulated time, advanced once per frame before anything else runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimClock {
    pub elapsed: f64,
    /// Step of the current frame.
    pub dt: TReal,
}

/// The one RNG every random decision draws from.
pub struct SimRng(pub StdRng);

impl SimRng {
    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl Default for SimRng {
    fn default() -> Self {
        Self::seeded(0)
    }
}

pub fn advance_clock(
    time: Option<Res<Time>>,
    settings: Res<SimulationSettings>,
    mut clock: ResMut<SimClock>,
) {
    let dt = settings
        .fixed_dt
        .or_else(|| time.map(|time| time.delta_seconds()))
        .unwrap_or(0.);
    clock.dt = dt;
    clock.elapsed += dt as f64;
}
