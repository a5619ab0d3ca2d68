//! The formation lifecycle: slot table plus diving controller, and the
//! surface a spawner and a wave sequencer talk to.

use deps::*;

use bevy::{ecs as bevy_ecs, prelude::*, utils::default};
use rand::RngCore;

use crate::{
    error::{FormationError, FormationResult},
    events::SimEvent,
    math::*,
    mind::{
        actor::{state::StateTag, ActorId, ActorIndex, ActorMind, ActorSignal, ActorSignalled},
        SimClock, SimRng,
    },
    path::{PathPool, Paths},
    SmartString,
};

pub mod dive;
pub mod slots;

use dive::*;
use slots::*;

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(crate = "serde")]
#[serde(default)]
pub struct FormationDrift {
    pub amplitude: TReal,
    /// Radians per second.
    pub frequency: TReal,
}

impl Default for FormationDrift {
    fn default() -> Self {
        Self {
            amplitude: 0.1,
            frequency: 1.,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(crate = "serde")]
#[serde(default)]
pub struct FormationConfig {
    pub layout: SlotLayout,
    pub spacing: TReal,
    pub arrival_delay_between_members: TReal,
    pub anchor: (TReal, TReal),
    pub rotation: TReal,
    pub drift: Option<FormationDrift>,
    pub diving: DivingStrategy,
    /// Path template names a diver may be sent along.
    pub dive_paths: Vec<SmartString>,
}

impl Default for FormationConfig {
    fn default() -> Self {
        Self {
            layout: SlotLayout::Grid {
                columns: 5,
                rows: 2,
                spacing: 1.,
            },
            spacing: 1.,
            arrival_delay_between_members: 0.2,
            anchor: (0., 4.),
            rotation: 0.,
            drift: None,
            diving: default(),
            dive_paths: Vec::new(),
        }
    }
}

impl FormationConfig {
    pub fn validate(&self) -> FormationResult<()> {
        if self.layout.offsets().is_empty() {
            return Err(FormationError::EmptySlotList);
        }
        if self.dive_paths.is_empty() {
            return Err(FormationError::NoDivePathTemplates);
        }
        if !(self.spacing.is_finite() && self.spacing > 0.) {
            return Err(FormationError::InvalidValue {
                name: "spacing",
                value: self.spacing,
                expected: "(0, inf)",
            });
        }
        if !(self.arrival_delay_between_members.is_finite()
            && self.arrival_delay_between_members >= 0.)
        {
            return Err(FormationError::InvalidValue {
                name: "arrival_delay_between_members",
                value: self.arrival_delay_between_members,
                expected: "[0, inf)",
            });
        }
        self.diving.validate()
    }
}

/// Marks formations the systems drive. Removed on defeat or teardown.
#[derive(Debug, Clone, Copy, Component)]
#[component(storage = "SparseSet")]
pub struct ActiveFormation;

/// Which formation an actor belongs to.
#[derive(Debug, Clone, Copy, Component)]
pub struct CurrentFormation {
    pub formation: Entity,
}

#[derive(Debug, Component)]
pub struct Formation {
    slots: FormationSlotTable,
    base: Placement,
    placement: Placement,
    drift: Option<FormationDrift>,
    elapsed: f64,
    diving: Box<dyn DivingController>,
}

impl Formation {
    pub fn new(config: &FormationConfig) -> FormationResult<Self> {
        config.validate()?;
        let slots = FormationSlotTable::new(
            config.layout.offsets(),
            config.spacing,
            config.arrival_delay_between_members,
        )?;
        let diving = config.diving.build_controller(config.dive_paths.clone())?;
        let base = Placement::new(TVec2::from(config.anchor), config.rotation);
        tracing::debug!(slots = slots.len(), "formation initialised");
        Ok(Self {
            slots,
            base,
            placement: base,
            drift: config.drift,
            elapsed: 0.,
            diving,
        })
    }

    /// Every dive template must exist in `pool` and end somewhere.
    pub fn check_paths(&self, pool: &dyn PathPool) -> FormationResult<()> {
        for name in self.diving.tracker().templates() {
            match pool.is_looped(name) {
                None => return Err(FormationError::UnknownPathTemplate(name.clone())),
                Some(true) => {
                    return Err(FormationError::LoopedPath {
                        name: name.clone(),
                        role: "dive",
                    })
                }
                Some(false) => {}
            }
        }
        Ok(())
    }

    /// World position of slot `index` at the formation's current placement.
    pub fn position(&self, index: usize) -> FormationResult<TVec2> {
        Ok(self
            .placement
            .transform_point(self.slots.local_position(index)?))
    }

    #[inline]
    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    #[inline]
    pub fn total_members(&self) -> usize {
        self.slots.expected_members()
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &FormationSlotTable {
        &self.slots
    }

    pub fn register_member(&mut self, actor: ActorId, index: usize) -> FormationResult<bool> {
        self.slots.register_member(actor, index)
    }

    /// Returns true when this death wiped the formation out.
    pub fn on_member_destroyed(&mut self, actor: ActorId) -> bool {
        let defeated = self.slots.unregister_member(actor, true);
        if defeated {
            tracing::info!("formation defeated");
        }
        defeated
    }

    pub fn forget_member(&mut self, actor: ActorId) -> bool {
        self.slots.forget_member(actor)
    }

    pub fn set_total_members(&mut self, count: usize) {
        self.slots.set_expected_members(count);
    }

    pub fn on_spawn_complete(&mut self, now: f64, rng: &mut dyn RngCore) {
        tracing::info!(members = self.slots.member_count(), "spawning complete");
        self.diving.enable_diving(now, rng);
    }

    pub fn on_dive_complete(&mut self, actor: ActorId, pool: &mut dyn PathPool) -> bool {
        self.diving.on_dive_complete(actor, pool)
    }

    /// Animates the anchor; stationed members follow their slots.
    pub fn tick(&mut self, dt: TReal) {
        self.elapsed += dt as f64;
        if let Some(drift) = &self.drift {
            let offset = (self.elapsed as TReal * drift.frequency).sin() * drift.amplitude;
            self.placement.translation = self.base.translation + TVec2::new(0., offset);
        }
    }

    /// Lets the controller pick divers among `candidates`. Chosen divers are
    /// unregistered from their slots without a defeat check.
    pub fn run_dive_pass(
        &mut self,
        now: f64,
        candidates: &[ActorId],
        pool: &mut dyn PathPool,
        rng: &mut dyn RngCore,
    ) -> DiveOrders {
        let orders = self.diving.on_tick(&mut DiveContext {
            now,
            origin: self.placement,
            candidates,
            pool,
            rng,
        });
        for order in &orders {
            self.slots.unregister_member(order.actor, false);
            tracing::debug!(actor = %order.actor, "dive started");
        }
        orders
    }

    /// Synchronously hands every outstanding dive path back.
    pub fn deactivate(&mut self, pool: &mut dyn PathPool) {
        self.diving.disable_diving(pool);
    }

    /// Back to a fresh, empty formation ready for another level. Outstanding
    /// dive paths go back to `pool`.
    pub fn reset(&mut self, pool: &mut dyn PathPool) {
        self.diving.disable_diving(pool);
        self.slots.clear();
        self.placement = self.base;
        self.elapsed = 0.;
        tracing::debug!("formation reset");
    }

    /// Applies what an actor reported to the formation.
    pub fn on_actor_signal(
        &mut self,
        actor: ActorId,
        signal: ActorSignal,
        pool: &mut dyn PathPool,
    ) -> Option<SimEvent> {
        match signal {
            ActorSignal::PathEnded { was_diving: true } => {
                self.on_dive_complete(actor, pool);
                Some(SimEvent::DiveCompleted { actor })
            }
            ActorSignal::PathEnded { was_diving: false } => {
                tracing::trace!(%actor, "entry path done");
                None
            }
            ActorSignal::ReachedFormation { slot } => {
                if let Err(err) = self.register_member(actor, slot) {
                    tracing::error!(%err, "slot collision");
                    debug_assert!(false, "{err}");
                }
                Some(SimEvent::ReachedFormation { actor, slot })
            }
            ActorSignal::Fired(shot) => Some(SimEvent::Shot(shot)),
            ActorSignal::TrailsChanged(on) => Some(SimEvent::TrailsChanged { actor, on }),
        }
    }

    #[inline]
    pub fn is_defeated(&self) -> bool {
        self.slots.is_defeated()
    }

    pub fn diving(&self) -> &dyn DivingController {
        self.diving.as_ref()
    }

    pub fn diving_mut(&mut self) -> &mut dyn DivingController {
        self.diving.as_mut()
    }
}

pub fn drift(clock: Res<SimClock>, mut formations: Query<&mut Formation, With<ActiveFormation>>) {
    for mut formation in formations.iter_mut() {
        formation.tick(clock.dt);
    }
}

/// Picks divers among the members stationed after this frame's actor
/// updates.
pub fn dive_pass(
    clock: Res<SimClock>,
    mut rng: ResMut<SimRng>,
    mut paths: ResMut<Paths>,
    index: Res<ActorIndex>,
    mut formations: Query<(Entity, &mut Formation), With<ActiveFormation>>,
    mut actors: Query<(&mut ActorMind, &CurrentFormation)>,
    mut events: EventWriter<SimEvent>,
) {
    for (formation_entt, mut formation) in formations.iter_mut() {
        if !formation.diving().is_enabled() {
            continue;
        }
        let mut candidates: Vec<ActorId> = actors
            .iter()
            .filter(|(actor, current)| {
                current.formation == formation_entt
                    && actor.state() == Some(StateTag::Idle)
                    && formation.slots().slot_of(actor.id()).is_some()
            })
            .map(|(actor, _)| actor.id())
            .collect();
        // query order isn't stable, the rng draws must be
        candidates.sort_unstable();
        let orders =
            formation.run_dive_pass(clock.elapsed, &candidates, paths.pool_mut(), &mut rng.0);
        for order in orders {
            let mind = index
                .get(order.actor)
                .and_then(|entt| actors.get_mut(entt).ok());
            match mind {
                Some((mut actor, _)) => {
                    let out = actor.dive_setup(order.path);
                    events.send(SimEvent::DiveStarted { actor: order.actor });
                    for signal in out {
                        if let Some(event) =
                            formation.on_actor_signal(order.actor, signal, paths.pool_mut())
                        {
                            events.send(event);
                        }
                    }
                }
                None => {
                    tracing::error!(actor = %order.actor, "dive ordered for a missing actor");
                    formation.on_dive_complete(order.actor, paths.pool_mut());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> FormationConfig {
        FormationConfig {
            layout: SlotLayout::Offsets(vec![(-1., 0.), (0., 0.), (1., 0.)]),
            anchor: (0., 5.),
            dive_paths: vec!["swoop".into()],
            ..Default::default()
        }
    }

    #[test]
    fn refuses_to_build_without_dive_paths() {
        let config = FormationConfig {
            dive_paths: vec![],
            ..config()
        };
        assert_eq!(
            Formation::new(&config).unwrap_err(),
            FormationError::NoDivePathTemplates
        );
    }

    #[test]
    fn positions_follow_the_anchor() {
        let formation = Formation::new(&FormationConfig {
            spacing: 2.,
            ..config()
        })
        .unwrap();
        assert_eq!(formation.position(0).unwrap(), TVec2::new(-2., 5.));
        assert!(formation.position(3).is_err());
    }

    #[test]
    fn drift_moves_the_slots() {
        let mut formation = Formation::new(&FormationConfig {
            drift: Some(FormationDrift {
                amplitude: 0.5,
                frequency: 1.,
            }),
            ..config()
        })
        .unwrap();
        let before = formation.position(1).unwrap();
        formation.tick(std::f32::consts::FRAC_PI_2);
        let after = formation.position(1).unwrap();
        assert!((after.y - before.y - 0.5).abs() < 1e-4);
        assert_eq!(after.x, before.x);
    }

    #[test]
    fn reset_empties_the_formation_and_hands_paths_back() {
        use crate::path::{PathPoint, PathTemplate, PrewarmedPathPool};
        use rand::{rngs::StdRng, SeedableRng};

        let mut pool = PrewarmedPathPool::new(
            &[PathTemplate::linear(
                "swoop",
                vec![PathPoint::new(0., 0.), PathPoint::new(0., -1.)],
            )],
            2,
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let mut formation = Formation::new(&FormationConfig {
            drift: Some(FormationDrift {
                amplitude: 0.5,
                frequency: 1.,
            }),
            ..config()
        })
        .unwrap();
        let home = formation.position(1).unwrap();
        for ii in 0..3 {
            formation.register_member(ActorId(ii), ii as usize).unwrap();
        }
        formation.set_total_members(3);
        formation.on_spawn_complete(0., &mut rng);
        let candidates = [ActorId(0), ActorId(1), ActorId(2)];
        let orders = formation.run_dive_pass(1_000., &candidates, &mut pool, &mut rng);
        assert_eq!(orders.len(), 1);
        assert_eq!(pool.in_use(), 1);
        formation.tick(1.);
        assert_ne!(formation.position(1).unwrap(), home);

        formation.reset(&mut pool);
        assert_eq!(pool.in_use(), 0);
        assert!(!formation.diving().is_enabled());
        assert_eq!(formation.slots().member_count(), 0);
        assert_eq!(formation.total_members(), 0);
        assert_eq!(formation.position(1).unwrap(), home);
        // the slot the diver left and the ones still held are all free again
        for ii in 0..3 {
            formation.register_member(ActorId(10 + ii), ii as usize).unwrap();
        }
    }

    #[test]
    fn dive_templates_must_be_known_and_finite() {
        use crate::path::{PathPoint, PathTemplate, PrewarmedPathPool};

        let formation = Formation::new(&config()).unwrap();
        let points = vec![PathPoint::new(0., 0.), PathPoint::new(0., -1.)];
        let finite =
            PrewarmedPathPool::new(&[PathTemplate::linear("swoop", points.clone())], 1).unwrap();
        assert_eq!(formation.check_paths(&finite), Ok(()));
        let looping =
            PrewarmedPathPool::new(&[PathTemplate::linear("swoop", points.clone()).looped(true)], 1)
                .unwrap();
        assert_eq!(
            formation.check_paths(&looping),
            Err(FormationError::LoopedPath {
                name: "swoop".into(),
                role: "dive"
            })
        );
        let other = PrewarmedPathPool::new(&[PathTemplate::linear("dash", points)], 1).unwrap();
        assert_eq!(
            formation.check_paths(&other),
            Err(FormationError::UnknownPathTemplate("swoop".into()))
        );
    }
}
