//! World level formation operations plus a headless harness around them.
//!
//! The systems in [`crate::mind`] do the per frame work. What's left here are
//! the things a host does between frames: installing a formation, spawning
//! and killing actors, tearing a formation down or restarting it for the next
//! level. [`Simulation`] wraps an [`App`] with nothing but the plugin in it
//! and steps it with a fixed dt.

use deps::*;

use bevy::{
    ecs::event::{Events, ManualEventReader},
    prelude::*,
};
use rand::rngs::StdRng;

use crate::{
    config::GameConfig,
    error::{FormationError, FormationResult},
    events::{EnemyKilled, SimEvent},
    math::*,
    mind::{
        actor::{prepare_actor, ActorBundle, ActorId, ActorIndex, ActorMind, ActorSignals, EnemyConfig, EnemyKinds},
        formation::{ActiveFormation, CurrentFormation, Formation},
        spawner::WaveSpawner,
        MindPlugin, SimClock, SimRng, SimulationSettings,
    },
    path::{pool::release_quietly, PathHandle, PathPool, Paths, PrewarmedPathPool},
    sensors::SharedTargets,
};

/// Builds everything `config` describes into `world` and returns the
/// formation entity. Nothing spawns until [`start_formation`].
pub fn install(world: &mut World, config: &GameConfig, seed: u64) -> FormationResult<Entity> {
    config.validate()?;
    let pool = PrewarmedPathPool::new(&config.paths, config.pool.capacity_per_template)?;
    let formation = Formation::new(&config.formation)?;
    let spawner = WaveSpawner::new(config.spawner.clone())?;
    let enemies = EnemyKinds::new(config.enemies.iter().cloned())?;
    world.insert_resource(SimRng::seeded(seed));
    install_parts(world, formation, Box::new(pool), enemies, Some(spawner))
}

/// Wires already built collaborators into `world`.
pub fn install_parts(
    world: &mut World,
    formation: Formation,
    pool: Box<dyn PathPool>,
    enemies: EnemyKinds,
    spawner: Option<WaveSpawner>,
) -> FormationResult<Entity> {
    formation.check_paths(pool.as_ref())?;
    world.insert_resource(Paths::new(pool));
    world.insert_resource(enemies);
    let mut entity = world.spawn();
    entity.insert(formation).insert(ActiveFormation);
    if let Some(spawner) = spawner {
        entity.insert(spawner);
    }
    let entt = entity.id();
    tracing::debug!(?entt, "formation installed");
    Ok(entt)
}

/// Prepares the spawner, tells the formation how many to expect and sets the
/// formation running.
pub fn start_formation(world: &mut World, formation_entt: Entity) -> FormationResult<()> {
    let total = world.resource_scope(|world, mut paths: Mut<Paths>| {
        match world.get_mut::<WaveSpawner>(formation_entt) {
            Some(mut spawner) => {
                spawner.prepare(paths.pool_mut())?;
                spawner.start();
                Ok(Some(spawner.total_members()))
            }
            None => Ok::<_, FormationError>(None),
        }
    })?;
    let mut entity = world
        .get_entity_mut(formation_entt)
        .ok_or(FormationError::MissingFormation(formation_entt))?;
    let mut formation = entity
        .get_mut::<Formation>()
        .ok_or(FormationError::MissingFormation(formation_entt))?;
    if let Some(total) = total {
        formation.set_total_members(total);
    }
    entity.insert(ActiveFormation);
    Ok(())
}

fn send(world: &mut World, event: SimEvent) {
    world.resource_mut::<Events<SimEvent>>().send(event);
}

fn route(world: &mut World, formation_entt: Entity, id: ActorId, signals: ActorSignals) {
    let events: Vec<SimEvent> = world.resource_scope(|world, mut paths: Mut<Paths>| {
        match world.get_mut::<Formation>(formation_entt) {
            Some(mut formation) => signals
                .into_iter()
                .filter_map(|signal| formation.on_actor_signal(id, signal, paths.pool_mut()))
                .collect(),
            None => Vec::new(),
        }
    });
    for event in events {
        send(world, event);
    }
}

pub fn spawn_actor(
    world: &mut World,
    formation_entt: Entity,
    enemy: &str,
    entry_path: PathHandle,
    slot: usize,
) -> FormationResult<ActorId> {
    let config = world
        .resource::<EnemyKinds>()
        .get(enemy)
        .cloned()
        .ok_or_else(|| FormationError::UnknownEnemyKind(enemy.into()))?;
    let id = world.resource::<ActorIndex>().next_id();
    let targets = world.resource::<SharedTargets>().clone();
    let (mind, signals) = world.resource_scope(|world, paths: Mut<Paths>| {
        let mut formation = world
            .get_mut::<Formation>(formation_entt)
            .ok_or(FormationError::MissingFormation(formation_entt))?;
        prepare_actor(id, &config, entry_path, slot, &mut formation, paths.pool(), &targets)
    })?;
    let entt = world
        .spawn()
        .insert_bundle(ActorBundle::new(mind, formation_entt))
        .id();
    world.resource_mut::<ActorIndex>().insert(id, entt);
    send(
        world,
        SimEvent::Spawned {
            actor: id,
            enemy: config.name.clone(),
        },
    );
    route(world, formation_entt, id, signals);
    tracing::debug!(actor = %id, enemy, slot, "actor spawned");
    Ok(id)
}

/// Pulls an actor out of the world, returning its mind and formation.
fn take_actor(world: &mut World, id: ActorId) -> FormationResult<(ActorMind, Entity)> {
    let entt = world
        .resource_mut::<ActorIndex>()
        .remove(id)
        .ok_or(FormationError::UnknownActor(id))?;
    world.resource::<SharedTargets>().write().unsubscribe(id);
    let mut entity = world
        .get_entity_mut(entt)
        .ok_or(FormationError::UnknownActor(id))?;
    let formation_entt = entity.get::<CurrentFormation>().map(|cur| cur.formation);
    let mind = entity.remove::<ActorMind>();
    entity.despawn();
    match (mind, formation_entt) {
        (Some(mind), Some(formation_entt)) => Ok((mind, formation_entt)),
        _ => Err(FormationError::UnknownActor(id)),
    }
}

fn release_dive_path(
    world: &mut World,
    formation_entt: Entity,
    id: ActorId,
    held: Option<PathHandle>,
) {
    world.resource_scope(|world, mut paths: Mut<Paths>| {
        let tracked = match world.get_mut::<Formation>(formation_entt) {
            Some(mut formation) => formation.on_dive_complete(id, paths.pool_mut()),
            None => false,
        };
        if let (false, Some(handle)) = (tracked, held) {
            tracing::error!(actor = %id, ?handle, "untracked dive path");
            release_quietly(paths.pool_mut(), handle);
        }
    });
}

/// Kills an actor. Any dive path it held goes back to the pool before the
/// formation hears about the death.
pub fn kill_actor(world: &mut World, id: ActorId) -> FormationResult<EnemyKilled> {
    let (mut actor, formation_entt) = take_actor(world, id)?;
    let report = actor.on_death();
    release_dive_path(world, formation_entt, id, report.dive_path);

    let point_value = match world.resource::<EnemyKinds>().get(actor.enemy()) {
        Some(enemy) if report.was_diving => enemy.dive_point_value,
        Some(enemy) => enemy.point_value,
        None => 0,
    };
    let kill = EnemyKilled {
        actor: id,
        point_value,
        position: report.position,
        while_diving: report.was_diving,
    };
    send(world, SimEvent::EnemyKilled(kill.clone()));
    tracing::debug!(actor = %id, point_value, "enemy killed");

    let defeated = world
        .get_mut::<Formation>(formation_entt)
        .map(|mut formation| formation.on_member_destroyed(id))
        .unwrap_or(false);
    if defeated {
        send(world, SimEvent::FormationDefeated);
        deactivate_formation(world, formation_entt);
    }
    Ok(kill)
}

/// Removes an actor that left without dying. No score, no defeat check.
pub fn despawn_actor(world: &mut World, id: ActorId) -> FormationResult<()> {
    let (mut actor, formation_entt) = take_actor(world, id)?;
    let report = actor.on_death();
    release_dive_path(world, formation_entt, id, report.dive_path);
    if let Some(mut formation) = world.get_mut::<Formation>(formation_entt) {
        formation.forget_member(id);
    }
    Ok(())
}

/// Turns diving on without waiting for a spawner.
pub fn enable_diving(world: &mut World, formation_entt: Entity) {
    let now = world.resource::<SimClock>().elapsed;
    world.resource_scope(|world, mut rng: Mut<SimRng>| {
        if let Some(mut formation) = world.get_mut::<Formation>(formation_entt) {
            formation.on_spawn_complete(now, &mut rng.0);
        }
    });
}

/// Tears the formation down, releasing every pooled path synchronously and
/// despawning whatever members are left.
pub fn deactivate_formation(world: &mut World, formation_entt: Entity) {
    world.resource_scope(|world, mut paths: Mut<Paths>| {
        if let Some(mut formation) = world.get_mut::<Formation>(formation_entt) {
            formation.deactivate(paths.pool_mut());
        }
        if let Some(mut spawner) = world.get_mut::<WaveSpawner>(formation_entt) {
            spawner.release_entry_paths(paths.pool_mut());
        }
    });
    let members: Vec<(ActorId, Entity)> = {
        let index = world.resource::<ActorIndex>();
        index
            .iter()
            .filter(|(_, entt)| {
                world
                    .get::<CurrentFormation>(*entt)
                    .map_or(false, |cur| cur.formation == formation_entt)
            })
            .collect()
    };
    for (id, entt) in members {
        world.resource_mut::<ActorIndex>().remove(id);
        world.resource::<SharedTargets>().write().unsubscribe(id);
        world.despawn(entt);
    }
    if let Some(mut entity) = world.get_entity_mut(formation_entt) {
        entity.remove::<ActiveFormation>();
    }
    tracing::info!(?formation_entt, "formation deactivated");
}

/// Clears the formation out and runs its spawn schedule again.
pub fn restart_formation(world: &mut World, formation_entt: Entity) -> FormationResult<()> {
    deactivate_formation(world, formation_entt);
    world.resource_scope(|world, mut paths: Mut<Paths>| {
        let mut formation = world
            .get_mut::<Formation>(formation_entt)
            .ok_or(FormationError::MissingFormation(formation_entt))?;
        formation.reset(paths.pool_mut());
        Ok::<_, FormationError>(())
    })?;
    start_formation(world, formation_entt)?;
    tracing::info!(?formation_entt, "formation restarted");
    Ok(())
}

/// A plugin-only app stepped with a fixed dt, plus the event log it
/// produced. Events are collected after every step and every world op so
/// none expire unread.
pub struct Simulation {
    app: App,
    formation: Entity,
    reader: ManualEventReader<SimEvent>,
    pending: Vec<SimEvent>,
}

impl Simulation {
    pub fn new(config: &GameConfig, seed: u64) -> FormationResult<Self> {
        let mut app = Self::app();
        let formation = install(&mut app.world, config, seed)?;
        Ok(Self::wrap(app, formation))
    }

    /// Wires already built collaborators together. Every enemy kind and the
    /// formation's dive templates are checked first.
    pub fn from_parts(
        formation: Formation,
        pool: Box<dyn PathPool>,
        enemies: impl IntoIterator<Item = EnemyConfig>,
        spawner: Option<WaveSpawner>,
        targets: SharedTargets,
        rng: StdRng,
    ) -> FormationResult<Self> {
        let enemies = EnemyKinds::new(enemies)?;
        let mut app = Self::app();
        app.insert_resource(targets).insert_resource(SimRng(rng));
        let formation = install_parts(&mut app.world, formation, pool, enemies, spawner)?;
        Ok(Self::wrap(app, formation))
    }

    fn app() -> App {
        let mut app = App::new();
        app.add_plugin(MindPlugin);
        app
    }

    fn wrap(app: App, formation: Entity) -> Self {
        let reader = app.world.resource::<Events<SimEvent>>().get_reader();
        Self {
            app,
            formation,
            reader,
            pending: Vec::new(),
        }
    }

    fn collect(&mut self) {
        let events = self.app.world.resource::<Events<SimEvent>>();
        self.pending.extend(self.reader.iter(events).cloned());
    }

    pub fn start(&mut self) -> FormationResult<()> {
        start_formation(&mut self.app.world, self.formation)
    }

    pub fn tick(&mut self, dt: TReal) {
        self.app.insert_resource(SimulationSettings { fixed_dt: Some(dt) });
        self.app.update();
        self.collect();
    }

    pub fn spawn_actor(
        &mut self,
        enemy: &str,
        entry_path: PathHandle,
        slot: usize,
    ) -> FormationResult<ActorId> {
        let out = spawn_actor(&mut self.app.world, self.formation, enemy, entry_path, slot);
        self.collect();
        out
    }

    pub fn kill(&mut self, id: ActorId) -> FormationResult<EnemyKilled> {
        let out = kill_actor(&mut self.app.world, id);
        self.collect();
        out
    }

    pub fn despawn(&mut self, id: ActorId) -> FormationResult<()> {
        despawn_actor(&mut self.app.world, id)
    }

    pub fn enable_diving(&mut self) {
        enable_diving(&mut self.app.world, self.formation);
    }

    pub fn deactivate(&mut self) {
        deactivate_formation(&mut self.app.world, self.formation);
    }

    pub fn restart(&mut self) -> FormationResult<()> {
        restart_formation(&mut self.app.world, self.formation)
    }

    pub fn drain_events(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.pending)
    }

    #[inline]
    pub fn clock(&self) -> f64 {
        self.app.world.resource::<SimClock>().elapsed
    }

    /// Whether the systems still drive the formation.
    pub fn is_active(&self) -> bool {
        self.app.world.get::<ActiveFormation>(self.formation).is_some()
    }

    pub fn targets(&self) -> SharedTargets {
        self.app.world.resource::<SharedTargets>().clone()
    }

    pub fn formation_entity(&self) -> Entity {
        self.formation
    }

    pub fn formation(&self) -> Option<&Formation> {
        self.app.world.get::<Formation>(self.formation)
    }

    pub fn formation_mut(&mut self) -> Option<Mut<'_, Formation>> {
        self.app.world.get_mut::<Formation>(self.formation)
    }

    pub fn pool(&self) -> &dyn PathPool {
        self.app.world.resource::<Paths>().pool()
    }

    pub fn pool_mut(&mut self) -> &mut dyn PathPool {
        self.app.world.resource_mut::<Paths>().into_inner().pool_mut()
    }

    pub fn spawner(&self) -> Option<&WaveSpawner> {
        self.app.world.get::<WaveSpawner>(self.formation)
    }

    pub fn actor(&self, id: ActorId) -> Option<&ActorMind> {
        let entt = self.app.world.resource::<ActorIndex>().get(id)?;
        self.app.world.get::<ActorMind>(entt)
    }

    /// In id order.
    pub fn actors(&self) -> impl Iterator<Item = &ActorMind> + '_ {
        let world = &self.app.world;
        world
            .resource::<ActorIndex>()
            .iter()
            .filter_map(move |(_, entt)| world.get::<ActorMind>(entt))
    }

    pub fn actor_ids(&self) -> Vec<ActorId> {
        self.app.world.resource::<ActorIndex>().ids()
    }

    pub fn actor_count(&self) -> usize {
        self.app.world.resource::<ActorIndex>().len()
    }

    pub fn world(&self) -> &World {
        &self.app.world
    }
}
