//! Per-actor behaviour: a small state machine plus fire control.

use deps::*;

use std::collections::BTreeMap;

use bevy::{ecs as bevy_ecs, prelude::*};
use rand::RngCore;

use crate::{
    error::{FormationError, FormationResult},
    events::SimEvent,
    math::*,
    mind::{
        formation::{CurrentFormation, Formation},
        SimClock, SimRng,
    },
    path::{PathFollower, PathHandle, PathPool, Paths},
    sensors::{SharedTargets, TargetEvent, TargetId, TargetRegistry},
    SmartString,
};

pub mod fire;
pub mod state;

use fire::*;
use state::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(pub u32);

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Static description of an enemy kind.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(crate = "serde")]
#[serde(default)]
pub struct EnemyConfig {
    pub name: SmartString,
    pub point_value: u32,
    /// Awarded instead of `point_value` when killed mid-dive.
    pub dive_point_value: u32,
    pub path_speed: TReal,
    pub fly_in_speed: TReal,
    pub arrival_epsilon: TReal,
    pub fire: FireProfiles,
}

impl Default for EnemyConfig {
    fn default() -> Self {
        Self {
            name: "grunt".into(),
            point_value: 50,
            dive_point_value: 100,
            path_speed: 2.,
            fly_in_speed: 2.,
            arrival_epsilon: 0.001,
            fire: Default::default(),
        }
    }
}

impl EnemyConfig {
    pub fn validate(&self) -> FormationResult<()> {
        for (name, value) in [
            ("path_speed", self.path_speed),
            ("fly_in_speed", self.fly_in_speed),
        ] {
            if !(value.is_finite() && value > 0.) {
                return Err(FormationError::InvalidValue {
                    name,
                    value,
                    expected: "(0, inf)",
                });
            }
        }
        if !(self.arrival_epsilon.is_finite() && self.arrival_epsilon >= 0.) {
            return Err(FormationError::InvalidValue {
                name: "arrival_epsilon",
                value: self.arrival_epsilon,
                expected: "[0, inf)",
            });
        }
        self.fire.validate()
    }
}

/// Enemy kinds by name.
#[derive(Debug, Clone, Default)]
pub struct EnemyKinds(BTreeMap<SmartString, EnemyConfig>);

impl EnemyKinds {
    /// Every kind is validated before it's accepted.
    pub fn new(enemies: impl IntoIterator<Item = EnemyConfig>) -> FormationResult<Self> {
        let mut out = BTreeMap::new();
        for enemy in enemies {
            enemy.validate()?;
            out.insert(enemy.name.clone(), enemy);
        }
        Ok(Self(out))
    }

    pub fn get(&self, name: &str) -> Option<&EnemyConfig> {
        self.0.get(name)
    }
}

/// Cross reference from actor ids to their entities.
#[derive(Debug, Default)]
pub struct ActorIndex {
    entities: BTreeMap<ActorId, Entity>,
    next: u32,
}

impl ActorIndex {
    /// Id the next spawned actor will get.
    #[inline]
    pub fn next_id(&self) -> ActorId {
        ActorId(self.next)
    }

    pub fn insert(&mut self, id: ActorId, entt: Entity) {
        self.entities.insert(id, entt);
        self.next = self.next.max(id.0 + 1);
    }

    pub fn remove(&mut self, id: ActorId) -> Option<Entity> {
        self.entities.remove(&id)
    }

    #[inline]
    pub fn get(&self, id: ActorId) -> Option<Entity> {
        self.entities.get(&id).copied()
    }

    /// In id order.
    pub fn iter(&self) -> impl Iterator<Item = (ActorId, Entity)> + '_ {
        self.entities.iter().map(|(id, entt)| (*id, *entt))
    }

    pub fn ids(&self) -> Vec<ActorId> {
        self.entities.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Mutable per-actor data the states operate on.
#[derive(Debug, Clone)]
pub struct ActorBody {
    pub id: ActorId,
    pub position: TVec2,
    pub slot: usize,
    pub entry_path: Option<PathHandle>,
    pub dive_path: Option<PathHandle>,
    pub follower: PathFollower,
    pub target: Option<TargetId>,
    pub fire: FireControl,
}

/// What an actor gets to see during its update.
pub struct ActorCtx<'a> {
    pub dt: TReal,
    /// World position of the actor's slot this tick.
    pub slot_position: TVec2,
    pub paths: &'a dyn PathPool,
    pub targets: &'a TargetRegistry,
    pub rng: &'a mut dyn RngCore,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActorSignal {
    PathEnded { was_diving: bool },
    ReachedFormation { slot: usize },
    Fired(Shot),
    TrailsChanged(bool),
}

pub type ActorSignals = SVec<[ActorSignal; 4]>;

/// An actor signal on its way to the actor's formation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActorSignalled {
    pub actor: ActorId,
    pub formation: Entity,
    pub signal: ActorSignal,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeathReport {
    pub id: ActorId,
    pub position: TVec2,
    pub slot: usize,
    pub was_diving: bool,
    /// Dive path still held by the actor; must be released before the death
    /// is reported to the formation.
    pub dive_path: Option<PathHandle>,
}

#[derive(Debug, Component)]
pub struct ActorMind {
    body: ActorBody,
    enemy: SmartString,
    path_speed: TReal,
    states: StateTable,
    current: Option<StateTag>,
}

impl ActorMind {
    pub fn new(id: ActorId, config: &EnemyConfig, position: TVec2) -> Self {
        Self {
            body: ActorBody {
                id,
                position,
                slot: 0,
                entry_path: None,
                dive_path: None,
                follower: PathFollower::new(config.path_speed),
                target: None,
                fire: FireControl::default(),
            },
            enemy: config.name.clone(),
            path_speed: config.path_speed,
            states: StateTable::new(config),
            current: None,
        }
    }

    #[inline]
    pub fn id(&self) -> ActorId {
        self.body.id
    }

    #[inline]
    pub fn enemy(&self) -> &str {
        &self.enemy
    }

    #[inline]
    pub fn position(&self) -> TVec2 {
        self.body.position
    }

    #[inline]
    pub fn slot(&self) -> usize {
        self.body.slot
    }

    /// `None` until spawned and again once dead.
    #[inline]
    pub fn state(&self) -> Option<StateTag> {
        self.current
    }

    pub fn body(&self) -> &ActorBody {
        &self.body
    }

    pub fn target(&self) -> Option<TargetId> {
        self.body.target
    }

    pub fn set_target(&mut self, target: Option<TargetId>) {
        self.body.target = target;
    }

    pub fn change_state(&mut self, next: StateTag) -> ActorSignals {
        let mut out = ActorSignals::new();
        self.transition(next, &mut out);
        out
    }

    fn transition(&mut self, next: StateTag, out: &mut ActorSignals) {
        if let Some(prev) = self.current {
            self.states.get_mut(prev).exit(&mut self.body, out);
        }
        tracing::trace!(
            actor = %self.body.id,
            from = ?self.current,
            to = ?next,
            "state change"
        );
        self.current = Some(next);
        self.states.get_mut(next).enter(&mut self.body, out);
    }

    /// Starts the actor on its entry path, headed for `slot` afterwards.
    pub fn spawn_setup(&mut self, entry_path: PathHandle, slot: usize) -> ActorSignals {
        self.body.slot = slot;
        self.body.entry_path = Some(entry_path);
        self.body.follower = PathFollower::new(self.path_speed);
        self.change_state(StateTag::OnPath)
    }

    pub fn dive_setup(&mut self, dive_path: PathHandle) -> ActorSignals {
        self.body.dive_path = Some(dive_path);
        self.body.follower = PathFollower::new(self.path_speed);
        self.change_state(StateTag::Dive)
    }

    pub fn on_target_event(&mut self, event: TargetEvent) {
        match event {
            TargetEvent::Registered(id) => self.body.target = Some(id),
            TargetEvent::Deregistered(id) => {
                if self.body.target == Some(id) {
                    self.body.target = None;
                }
            }
        }
    }

    /// Stops the machine. Later updates are no-ops.
    pub fn on_death(&mut self) -> DeathReport {
        let report = DeathReport {
            id: self.body.id,
            position: self.body.position,
            slot: self.body.slot,
            was_diving: self.current == Some(StateTag::Dive),
            dive_path: self.body.dive_path.take(),
        };
        self.current = None;
        self.body.entry_path = None;
        report
    }

    pub fn update(&mut self, ctx: &mut ActorCtx<'_>) -> ActorSignals {
        let mut out = ActorSignals::new();
        let tag = match self.current {
            Some(tag) => tag,
            None => return out,
        };
        let state = self.states.get_mut(tag);
        let next = state.update(&mut self.body, ctx, &mut out);

        let target = self
            .body
            .target
            .and_then(|target| ctx.targets.position_of(target));
        if let Some(shot) = self.body.fire.update(
            state.fire_settings(),
            self.body.id,
            self.body.position,
            target,
            ctx.dt,
            ctx.rng,
        ) {
            out.push(ActorSignal::Fired(shot));
        }

        if let Some(next) = next {
            self.transition(next, &mut out);
        }
        out
    }
}

#[derive(Bundle)]
pub struct ActorBundle {
    pub mind: ActorMind,
    pub formation: CurrentFormation,
}

impl ActorBundle {
    pub fn new(mind: ActorMind, formation_entt: Entity) -> Self {
        Self {
            mind,
            formation: CurrentFormation {
                formation: formation_entt,
            },
        }
    }
}

/// Builds an actor for `slot`: claims the slot, subscribes it to target
/// news and starts it down `entry_path`.
pub fn prepare_actor(
    id: ActorId,
    config: &EnemyConfig,
    entry_path: PathHandle,
    slot: usize,
    formation: &mut Formation,
    paths: &dyn PathPool,
    targets: &SharedTargets,
) -> FormationResult<(ActorMind, ActorSignals)> {
    formation.register_member(id, slot)?;
    let start = paths
        .get(entry_path)
        .map(|path| path.point_at_distance(0.))
        .unwrap_or(formation.placement().translation);
    let mut actor = ActorMind::new(id, config, start);
    actor.set_target(targets.write().subscribe(id));
    let signals = actor.spawn_setup(entry_path, slot);
    Ok((actor, signals))
}

pub fn update(
    clock: Res<SimClock>,
    paths: Res<Paths>,
    targets: Res<SharedTargets>,
    mut rng: ResMut<SimRng>,
    formations: Query<&Formation>,
    mut actors: Query<(&mut ActorMind, &CurrentFormation)>,
    mut signals: EventWriter<ActorSignalled>,
) {
    let targets = targets.read();
    for (mut actor, current) in actors.iter_mut() {
        let formation = match formations.get(current.formation) {
            Ok(formation) => formation,
            Err(_) => continue,
        };
        let slot_position = match formation.position(actor.slot()) {
            Ok(pos) => pos,
            Err(err) => {
                tracing::error!(%err, actor = %actor.id(), "actor holds a bad slot");
                actor.position()
            }
        };
        let out = actor.update(&mut ActorCtx {
            dt: clock.dt,
            slot_position,
            paths: paths.pool(),
            targets: &targets,
            rng: &mut rng.0,
        });
        let id = actor.id();
        for signal in out {
            signals.send(ActorSignalled {
                actor: id,
                formation: current.formation,
                signal,
            });
        }
    }
}

pub fn route_signals(
    mut signals: EventReader<ActorSignalled>,
    mut formations: Query<&mut Formation>,
    mut paths: ResMut<Paths>,
    mut events: EventWriter<SimEvent>,
) {
    for &ActorSignalled {
        actor,
        formation,
        signal,
    } in signals.iter()
    {
        match formations.get_mut(formation) {
            Ok(mut formation) => {
                if let Some(event) = formation.on_actor_signal(actor, signal, paths.pool_mut()) {
                    events.send(event);
                }
            }
            Err(_) => tracing::error!(%actor, ?signal, "signal for a missing formation"),
        }
    }
}
