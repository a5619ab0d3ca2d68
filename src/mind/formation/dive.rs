//! Dive scheduling.
//!
//! A [`DivingController`] decides when an idle member peels off and which
//! one. The formation owns exactly one, boxed, built from a
//! [`DivingStrategy`] record.

use deps::*;

use std::collections::BTreeMap;

use bevy::utils::default;
use downcast_rs::DowncastSync;
use educe::Educe;
use rand::{Rng, RngCore};

use crate::{
    error::{FormationError, FormationResult},
    math::*,
    mind::actor::ActorId,
    path::{pool::release_quietly, PathHandle, PathPool},
    SmartString,
};

pub mod capped;
pub mod time_based;

pub use capped::{AttackCycle, AttackCycleDiving};
pub use time_based::{DiveTiming, TimeBasedDiving};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiveOrder {
    pub actor: ActorId,
    pub path: PathHandle,
}

pub type DiveOrders = SVec<[DiveOrder; 2]>;

pub struct DiveContext<'a> {
    /// Simulation clock, seconds.
    pub now: f64,
    /// Where dive paths get instantiated.
    pub origin: Placement,
    /// Members eligible to dive this tick.
    pub candidates: &'a [ActorId],
    pub pool: &'a mut dyn PathPool,
    pub rng: &'a mut dyn RngCore,
}

pub trait DivingController: DowncastSync + std::fmt::Debug {
    fn enable_diving(&mut self, now: f64, rng: &mut dyn RngCore);
    fn is_enabled(&self) -> bool;
    fn on_tick(&mut self, ctx: &mut DiveContext<'_>) -> DiveOrders;
    fn tracker(&self) -> &DivePathTracker;
    fn tracker_mut(&mut self) -> &mut DivePathTracker;

    /// Releases the actor's dive path. Safe to call more than once.
    fn on_dive_complete(&mut self, actor: ActorId, pool: &mut dyn PathPool) -> bool {
        self.tracker_mut().complete(actor, pool)
    }

    fn disable_diving(&mut self, pool: &mut dyn PathPool);
}
downcast_rs::impl_downcast!(sync DivingController);

/// Actor to dive path bookkeeping shared by every strategy.
#[derive(Debug, Clone)]
pub struct DivePathTracker {
    templates: Vec<SmartString>,
    active: BTreeMap<ActorId, PathHandle>,
}

impl DivePathTracker {
    pub fn new(templates: Vec<SmartString>) -> FormationResult<Self> {
        if templates.is_empty() {
            return Err(FormationError::NoDivePathTemplates);
        }
        Ok(Self {
            templates,
            active: default(),
        })
    }

    pub fn templates(&self) -> &[SmartString] {
        &self.templates
    }

    /// Instantiates a uniformly chosen dive template at `origin`.
    pub fn acquire_path(
        &self,
        origin: &Placement,
        pool: &mut dyn PathPool,
        rng: &mut dyn RngCore,
    ) -> Option<PathHandle> {
        let template = &self.templates[rng.gen_range(0..self.templates.len())];
        let handle = pool.acquire(template, origin.translation, origin.rotation);
        if handle.is_none() {
            tracing::warn!(%template, "dive path pool exhausted");
        }
        handle
    }

    pub fn track(&mut self, actor: ActorId, handle: PathHandle, pool: &mut dyn PathPool) {
        if let Some(prev) = self.active.insert(actor, handle) {
            tracing::error!(%actor, ?prev, "actor already held a dive path");
            debug_assert!(false, "actor {actor} already held a dive path");
            release_quietly(pool, prev);
        }
        tracing::debug!(%actor, ?handle, "dive tracked");
    }

    pub fn complete(&mut self, actor: ActorId, pool: &mut dyn PathPool) -> bool {
        match self.active.remove(&actor) {
            Some(handle) => {
                release_quietly(pool, handle);
                tracing::debug!(%actor, "dive complete");
                true
            }
            None => false,
        }
    }

    pub fn release_all(&mut self, pool: &mut dyn PathPool) {
        let count = self.active.len();
        for (_, handle) in std::mem::take(&mut self.active) {
            release_quietly(pool, handle);
        }
        if count > 0 {
            tracing::debug!(count, "released outstanding dive paths");
        }
    }

    pub fn handle_of(&self, actor: ActorId) -> Option<PathHandle> {
        self.active.get(&actor).copied()
    }

    pub fn is_diving(&self, actor: ActorId) -> bool {
        self.active.contains_key(&actor)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, Educe)]
#[serde(crate = "serde")]
#[educe(Default)]
pub enum DivingStrategy {
    #[educe(Default)]
    TimeBased(DiveTiming),
    AttackCycle(AttackCycle),
}

impl DivingStrategy {
    pub fn validate(&self) -> FormationResult<()> {
        match self {
            DivingStrategy::TimeBased(timing) => timing.validate(),
            DivingStrategy::AttackCycle(cycle) => cycle.validate(),
        }
    }

    pub fn build_controller(
        &self,
        dive_paths: Vec<SmartString>,
    ) -> FormationResult<Box<dyn DivingController>> {
        self.validate()?;
        let tracker = DivePathTracker::new(dive_paths)?;
        Ok(match self {
            DivingStrategy::TimeBased(timing) => Box::new(TimeBasedDiving::new(*timing, tracker)),
            DivingStrategy::AttackCycle(cycle) => {
                Box::new(AttackCycleDiving::new(*cycle, tracker))
            }
        })
    }
}

/// Uniform draw over `[min, max]` seconds.
#[inline]
pub(crate) fn sample_secs(rng: &mut dyn RngCore, min: TReal, max: TReal) -> f64 {
    rng.gen_range(min..=max) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::{PathPoint, PathTemplate, PrewarmedPathPool};
    use rand::{rngs::StdRng, SeedableRng};

    pub(super) fn pool(capacity: usize) -> PrewarmedPathPool {
        PrewarmedPathPool::new(
            &[
                PathTemplate::linear("swoop", vec![PathPoint::new(0., 0.), PathPoint::new(0., -5.)]),
                PathTemplate::linear("hook", vec![PathPoint::new(0., 0.), PathPoint::new(3., -5.)]),
            ],
            capacity,
        )
        .unwrap()
    }

    pub(super) fn names() -> Vec<SmartString> {
        vec!["swoop".into(), "hook".into()]
    }

    #[test]
    fn tracker_needs_templates() {
        assert_eq!(
            DivePathTracker::new(vec![]).unwrap_err(),
            FormationError::NoDivePathTemplates
        );
    }

    #[test]
    fn completion_is_idempotent() {
        let mut pool = pool(2);
        let mut rng = StdRng::seed_from_u64(3);
        let mut tracker = DivePathTracker::new(names()).unwrap();
        let handle = tracker
            .acquire_path(&Placement::default(), &mut pool, &mut rng)
            .unwrap();
        tracker.track(ActorId(1), handle, &mut pool);
        assert_eq!(pool.in_use(), 1);
        assert!(tracker.complete(ActorId(1), &mut pool));
        assert!(!tracker.complete(ActorId(1), &mut pool));
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn bulk_release_tolerates_stale_handles() {
        let mut pool = pool(2);
        let mut rng = StdRng::seed_from_u64(3);
        let mut tracker = DivePathTracker::new(names()).unwrap();
        let a = tracker
            .acquire_path(&Placement::default(), &mut pool, &mut rng)
            .unwrap();
        let b = tracker
            .acquire_path(&Placement::default(), &mut pool, &mut rng)
            .unwrap();
        tracker.track(ActorId(1), a, &mut pool);
        tracker.track(ActorId(2), b, &mut pool);
        // someone else got to it first
        pool.release(a).unwrap();
        tracker.release_all(&mut pool);
        assert_eq!(tracker.active_count(), 0);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn strategies_downcast_to_their_concrete_type() {
        let controller = DivingStrategy::default().build_controller(names()).unwrap();
        assert!(controller.downcast_ref::<TimeBasedDiving>().is_some());
        let controller = DivingStrategy::AttackCycle(default())
            .build_controller(names())
            .unwrap();
        assert!(controller.downcast_ref::<AttackCycleDiving>().is_some());
        assert!(DivingStrategy::default().build_controller(vec![]).is_err());
    }
}
