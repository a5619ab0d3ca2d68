use deps::*;

use rand::{Rng, RngCore};

use crate::{
    error::{check_range, FormationResult},
    math::*,
    path::PathPool,
};

use super::{sample_secs, DiveContext, DiveOrder, DiveOrders, DivePathTracker, DivingController};

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(crate = "serde")]
#[serde(default)]
pub struct DiveTiming {
    pub min_time_after_spawn: TReal,
    pub min_time_between_dives: TReal,
    pub max_time_between_dives: TReal,
}

impl Default for DiveTiming {
    fn default() -> Self {
        Self {
            min_time_after_spawn: 6.,
            min_time_between_dives: 3.,
            max_time_between_dives: 10.,
        }
    }
}

impl DiveTiming {
    pub fn validate(&self) -> FormationResult<()> {
        check_range(
            "min_time_after_spawn",
            self.min_time_after_spawn,
            self.min_time_after_spawn,
        )?;
        check_range(
            "time_between_dives",
            self.min_time_between_dives,
            self.max_time_between_dives,
        )
    }
}

/// One random idle member dives every few seconds.
#[derive(Debug)]
pub struct TimeBasedDiving {
    timing: DiveTiming,
    tracker: DivePathTracker,
    enabled: bool,
    next_dive: f64,
}

impl TimeBasedDiving {
    pub fn new(timing: DiveTiming, tracker: DivePathTracker) -> Self {
        Self {
            timing,
            tracker,
            enabled: false,
            next_dive: f64::INFINITY,
        }
    }

    pub fn timing(&self) -> &DiveTiming {
        &self.timing
    }

    pub fn next_dive(&self) -> f64 {
        self.next_dive
    }
}

impl DivingController for TimeBasedDiving {
    fn enable_diving(&mut self, now: f64, _rng: &mut dyn RngCore) {
        self.enabled = true;
        self.next_dive = now + self.timing.min_time_after_spawn as f64;
        tracing::debug!(next_dive = self.next_dive, "time based diving enabled");
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn on_tick(&mut self, ctx: &mut DiveContext<'_>) -> DiveOrders {
        let mut orders = DiveOrders::new();
        if !self.enabled || ctx.now < self.next_dive || ctx.candidates.is_empty() {
            return orders;
        }
        let actor = ctx.candidates[ctx.rng.gen_range(0..ctx.candidates.len())];
        // a failed acquisition still uses up this slot in the schedule
        if let Some(path) = self.tracker.acquire_path(&ctx.origin, ctx.pool, ctx.rng) {
            self.tracker.track(actor, path, ctx.pool);
            orders.push(DiveOrder { actor, path });
        }
        self.next_dive = ctx.now
            + sample_secs(
                ctx.rng,
                self.timing.min_time_between_dives,
                self.timing.max_time_between_dives,
            );
        orders
    }

    fn tracker(&self) -> &DivePathTracker {
        &self.tracker
    }

    fn tracker_mut(&mut self) -> &mut DivePathTracker {
        &mut self.tracker
    }

    fn disable_diving(&mut self, pool: &mut dyn PathPool) {
        self.enabled = false;
        self.next_dive = f64::INFINITY;
        self.tracker.release_all(pool);
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{names, pool};
    use super::*;
    use crate::mind::actor::ActorId;
    use rand::{rngs::StdRng, SeedableRng};

    fn controller(timing: DiveTiming) -> TimeBasedDiving {
        TimeBasedDiving::new(timing, DivePathTracker::new(names()).unwrap())
    }

    #[test]
    fn waits_for_the_post_spawn_delay() {
        let mut pool = pool(4);
        let mut rng = StdRng::seed_from_u64(11);
        let mut diving = controller(DiveTiming {
            min_time_after_spawn: 1.,
            min_time_between_dives: 2.,
            max_time_between_dives: 3.,
        });
        let candidates = [ActorId(0), ActorId(1)];
        diving.enable_diving(10., &mut rng);
        let mut tick = |now: f64, diving: &mut TimeBasedDiving| {
            diving.on_tick(&mut DiveContext {
                now,
                origin: Placement::default(),
                candidates: &candidates,
                pool: &mut pool,
                rng: &mut rng,
            })
        };
        assert!(tick(10.5, &mut diving).is_empty());
        let orders = tick(11., &mut diving);
        assert_eq!(orders.len(), 1);
        assert!(candidates.contains(&orders[0].actor));
        assert!((13.0..=14.0).contains(&diving.next_dive()));
        assert!(tick(12.9, &mut diving).is_empty());
    }

    #[test]
    fn no_candidates_keeps_the_schedule() {
        let mut pool = pool(4);
        let mut rng = StdRng::seed_from_u64(11);
        let mut diving = controller(DiveTiming {
            min_time_after_spawn: 0.,
            ..Default::default()
        });
        diving.enable_diving(0., &mut rng);
        let orders = diving.on_tick(&mut DiveContext {
            now: 5.,
            origin: Placement::default(),
            candidates: &[],
            pool: &mut pool,
            rng: &mut rng,
        });
        assert!(orders.is_empty());
        assert_eq!(diving.next_dive(), 0.);
    }

    #[test]
    fn exhausted_pool_still_reschedules() {
        let mut pool = pool(0);
        let mut rng = StdRng::seed_from_u64(5);
        let mut diving = controller(DiveTiming {
            min_time_after_spawn: 0.,
            min_time_between_dives: 1.,
            max_time_between_dives: 1.,
        });
        diving.enable_diving(0., &mut rng);
        let orders = diving.on_tick(&mut DiveContext {
            now: 0.,
            origin: Placement::default(),
            candidates: &[ActorId(3)],
            pool: &mut pool,
            rng: &mut rng,
        });
        assert!(orders.is_empty());
        assert_eq!(diving.next_dive(), 1.);
        assert_eq!(diving.tracker().active_count(), 0);
    }

    #[test]
    fn disabling_releases_everything() {
        let mut pool = pool(4);
        let mut rng = StdRng::seed_from_u64(5);
        let mut diving = controller(DiveTiming {
            min_time_after_spawn: 0.,
            min_time_between_dives: 0.,
            max_time_between_dives: 0.,
        });
        diving.enable_diving(0., &mut rng);
        for ii in 0..3 {
            diving.on_tick(&mut DiveContext {
                now: ii as f64,
                origin: Placement::default(),
                candidates: &[ActorId(ii)],
                pool: &mut pool,
                rng: &mut rng,
            });
        }
        assert_eq!(pool.in_use(), 3);
        diving.disable_diving(&mut pool);
        assert_eq!(pool.in_use(), 0);
        assert!(!diving.is_enabled());
    }
}
