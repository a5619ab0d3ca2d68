//! Wave spawning.
//!
//! Each wave sends `amount` enemies one after another down its entry paths.
//! Entry paths are shared by every actor that uses them, so the spawner
//! acquires one instance per template up front and keeps it until the
//! formation is done with.

use deps::*;

use std::collections::BTreeMap;

use bevy::{ecs as bevy_ecs, prelude::*};
use educe::Educe;

use crate::{
    error::{FormationError, FormationResult},
    events::SimEvent,
    math::*,
    mind::{
        actor::{prepare_actor, ActorBundle, ActorIndex, EnemyKinds},
        formation::{ActiveFormation, Formation},
        SimClock, SimRng,
    },
    path::{pool::release_quietly, PathHandle, PathPool, Paths},
    sensors::SharedTargets,
    SmartString,
};

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(crate = "serde")]
#[serde(default)]
pub struct WaveConfig {
    /// Enemy kinds, sent round-robin.
    pub enemies: Vec<SmartString>,
    pub spawn_interval: TReal,
    /// Entry path templates, used round-robin.
    pub entry_paths: Vec<SmartString>,
    pub amount: u32,
}

impl Default for WaveConfig {
    fn default() -> Self {
        Self {
            enemies: Vec::new(),
            spawn_interval: 0.2,
            entry_paths: Vec::new(),
            amount: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(crate = "serde")]
#[serde(default)]
pub struct SpawnerConfig {
    pub position: (TReal, TReal),
    pub rotation: TReal,
    pub start_delay: TReal,
    pub wave_interval: TReal,
    pub waves: Vec<WaveConfig>,
}

impl Default for SpawnerConfig {
    fn default() -> Self {
        Self {
            position: (0., 8.),
            rotation: 0.,
            start_delay: 1.,
            wave_interval: 1.,
            waves: Vec::new(),
        }
    }
}

impl SpawnerConfig {
    pub fn total_members(&self) -> usize {
        self.waves.iter().map(|wave| wave.amount as usize).sum()
    }

    pub fn validate(&self) -> FormationResult<()> {
        for (name, value) in [
            ("start_delay", self.start_delay),
            ("wave_interval", self.wave_interval),
        ] {
            if !(value.is_finite() && value >= 0.) {
                return Err(FormationError::InvalidValue {
                    name,
                    value,
                    expected: "[0, inf)",
                });
            }
        }
        for (ii, wave) in self.waves.iter().enumerate() {
            if !(wave.spawn_interval.is_finite() && wave.spawn_interval >= 0.) {
                return Err(FormationError::InvalidValue {
                    name: "spawn_interval",
                    value: wave.spawn_interval,
                    expected: "[0, inf)",
                });
            }
            if wave.amount == 0 {
                continue;
            }
            let missing = if wave.enemies.is_empty() {
                "enemies"
            } else if wave.entry_paths.is_empty() {
                "entry_paths"
            } else {
                continue;
            };
            return Err(FormationError::IncompleteWave {
                wave: ii,
                amount: wave.amount,
                missing,
            });
        }
        Ok(())
    }

    pub fn entry_path_names(&self) -> impl Iterator<Item = &SmartString> + '_ {
        self.waves.iter().flat_map(|wave| wave.entry_paths.iter())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpawnRequest {
    pub enemy: SmartString,
    pub entry_path: PathHandle,
    pub slot: usize,
}

#[derive(Debug, Default)]
pub struct SpawnTick {
    pub requests: SVec<[SpawnRequest; 4]>,
    /// Set on the tick the last wave's interval runs out.
    pub completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Educe)]
#[educe(Default)]
enum SpawnPhase {
    #[educe(Default)]
    Idle,
    Delay,
    Wave {
        wave: usize,
        spawned: u32,
    },
    Finishing,
    Done,
}

/// Lives on the formation entity it fills.
#[derive(Debug, Component)]
pub struct WaveSpawner {
    config: SpawnerConfig,
    entry_paths: BTreeMap<SmartString, PathHandle>,
    phase: SpawnPhase,
    timer: TReal,
    spawned: usize,
}

impl WaveSpawner {
    pub fn new(config: SpawnerConfig) -> FormationResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            entry_paths: BTreeMap::new(),
            phase: SpawnPhase::Idle,
            timer: 0.,
            spawned: 0,
        })
    }

    pub fn config(&self) -> &SpawnerConfig {
        &self.config
    }

    pub fn total_members(&self) -> usize {
        self.config.total_members()
    }

    /// Places one shared instance of every entry path at the spawner.
    pub fn prepare(&mut self, pool: &mut dyn PathPool) -> FormationResult<()> {
        let position = TVec2::from(self.config.position);
        let names: Vec<SmartString> = self.config.entry_path_names().cloned().collect();
        for name in names {
            if self.entry_paths.contains_key(&name) {
                continue;
            }
            if pool.is_looped(&name) == Some(true) {
                return Err(FormationError::LoopedPath {
                    name,
                    role: "entry",
                });
            }
            let handle = pool
                .acquire(&name, position, self.config.rotation)
                .ok_or_else(|| FormationError::EntryPathUnavailable(name.clone()))?;
            self.entry_paths.insert(name, handle);
        }
        Ok(())
    }

    pub fn start(&mut self) {
        self.phase = SpawnPhase::Delay;
        self.timer = self.config.start_delay;
        self.spawned = 0;
        tracing::debug!(total = self.total_members(), "spawner started");
    }

    pub fn is_complete(&self) -> bool {
        self.phase == SpawnPhase::Done
    }

    pub fn spawned(&self) -> usize {
        self.spawned
    }

    fn wave_from(&self, wave: usize) -> SpawnPhase {
        self.config
            .waves
            .iter()
            .enumerate()
            .skip(wave)
            .find(|(_, cfg)| cfg.amount > 0)
            .map(|(wave, _)| SpawnPhase::Wave { wave, spawned: 0 })
            .unwrap_or(SpawnPhase::Finishing)
    }

    fn request(&self, wave: usize, spawned: u32) -> Option<SpawnRequest> {
        let cfg = &self.config.waves[wave];
        let ii = spawned as usize;
        let enemy = cfg.enemies.get(ii % cfg.enemies.len().max(1))?.clone();
        let path_name = cfg.entry_paths.get(ii % cfg.entry_paths.len().max(1))?;
        let entry_path = match self.entry_paths.get(path_name) {
            Some(handle) => *handle,
            None => {
                tracing::error!(%path_name, "entry path was never prepared");
                return None;
            }
        };
        Some(SpawnRequest {
            enemy,
            entry_path,
            slot: self.spawned,
        })
    }

    pub fn tick(&mut self, dt: TReal) -> SpawnTick {
        let mut out = SpawnTick::default();
        if matches!(self.phase, SpawnPhase::Idle | SpawnPhase::Done) {
            return out;
        }
        self.timer -= dt;
        while self.timer <= 0. {
            match self.phase {
                SpawnPhase::Delay => {
                    self.phase = self.wave_from(0);
                }
                SpawnPhase::Wave { wave, spawned } => {
                    if let Some(request) = self.request(wave, spawned) {
                        out.requests.push(request);
                    }
                    self.spawned += 1;
                    let spawned = spawned + 1;
                    if spawned >= self.config.waves[wave].amount {
                        tracing::debug!(wave, "wave sent");
                        self.timer += self.config.wave_interval;
                        self.phase = self.wave_from(wave + 1);
                    } else {
                        self.timer += self.config.waves[wave].spawn_interval;
                        self.phase = SpawnPhase::Wave { wave, spawned };
                    }
                }
                SpawnPhase::Finishing => {
                    self.phase = SpawnPhase::Done;
                    out.completed = true;
                    break;
                }
                SpawnPhase::Idle | SpawnPhase::Done => break,
            }
        }
        out
    }

    pub fn release_entry_paths(&mut self, pool: &mut dyn PathPool) {
        for (_, handle) in std::mem::take(&mut self.entry_paths) {
            release_quietly(pool, handle);
        }
    }
}

pub fn spawn_waves(
    mut commands: Commands,
    clock: Res<SimClock>,
    mut rng: ResMut<SimRng>,
    mut paths: ResMut<Paths>,
    targets: Res<SharedTargets>,
    enemies: Res<EnemyKinds>,
    mut index: ResMut<ActorIndex>,
    mut formations: Query<(Entity, &mut Formation, &mut WaveSpawner), With<ActiveFormation>>,
    mut events: EventWriter<SimEvent>,
) {
    for (formation_entt, mut formation, mut spawner) in formations.iter_mut() {
        let tick = spawner.tick(clock.dt);
        for request in tick.requests {
            let config = match enemies.get(&request.enemy) {
                Some(config) => config,
                None => {
                    tracing::error!(enemy = %request.enemy, "spawn request for an unknown kind");
                    continue;
                }
            };
            let id = index.next_id();
            let (mind, signals) = match prepare_actor(
                id,
                config,
                request.entry_path,
                request.slot,
                &mut formation,
                paths.pool(),
                &targets,
            ) {
                Ok(out) => out,
                Err(err) => {
                    tracing::error!(%err, "spawn request refused");
                    continue;
                }
            };
            let entt = commands
                .spawn()
                .insert_bundle(ActorBundle::new(mind, formation_entt))
                .id();
            index.insert(id, entt);
            events.send(SimEvent::Spawned {
                actor: id,
                enemy: config.name.clone(),
            });
            for signal in signals {
                if let Some(event) = formation.on_actor_signal(id, signal, paths.pool_mut()) {
                    events.send(event);
                }
            }
            tracing::debug!(actor = %id, enemy = %config.name, slot = request.slot, "actor spawned");
        }
        if tick.completed {
            events.send(SimEvent::SpawnComplete);
            formation.on_spawn_complete(clock.elapsed, &mut rng.0);
        }
    }
}
