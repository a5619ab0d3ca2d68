use deps::*;

use rand::{seq::SliceRandom, Rng, RngCore};

use crate::{
    error::{FormationError, FormationResult},
    math::*,
    mind::actor::ActorId,
    path::PathPool,
};

use super::{DiveContext, DiveOrder, DiveOrders, DivePathTracker, DivingController};

/// Periodic attack rounds with a cap on concurrent divers.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(crate = "serde")]
#[serde(default)]
pub struct AttackCycle {
    /// Seconds between rounds.
    pub cooldown: TReal,
    pub max_simultaneous: u32,
    /// Chance each candidate is sent in a round.
    pub probability: TReal,
}

impl Default for AttackCycle {
    fn default() -> Self {
        Self {
            cooldown: 2.,
            max_simultaneous: 2,
            probability: 0.3,
        }
    }
}

impl AttackCycle {
    pub fn validate(&self) -> FormationResult<()> {
        if !(self.cooldown.is_finite() && self.cooldown > 0.) {
            return Err(FormationError::InvalidValue {
                name: "cooldown",
                value: self.cooldown,
                expected: "(0, inf)",
            });
        }
        if !(0. ..=1.).contains(&self.probability) {
            return Err(FormationError::InvalidValue {
                name: "probability",
                value: self.probability,
                expected: "[0, 1]",
            });
        }
        if self.max_simultaneous == 0 {
            return Err(FormationError::InvalidValue {
                name: "max_simultaneous",
                value: 0.,
                expected: "[1, inf)",
            });
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct AttackCycleDiving {
    cycle: AttackCycle,
    tracker: DivePathTracker,
    enabled: bool,
    next_round: f64,
}

impl AttackCycleDiving {
    pub fn new(cycle: AttackCycle, tracker: DivePathTracker) -> Self {
        Self {
            cycle,
            tracker,
            enabled: false,
            next_round: f64::INFINITY,
        }
    }

    pub fn next_round(&self) -> f64 {
        self.next_round
    }
}

impl DivingController for AttackCycleDiving {
    fn enable_diving(&mut self, now: f64, _rng: &mut dyn RngCore) {
        self.enabled = true;
        self.next_round = now + self.cycle.cooldown as f64;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn on_tick(&mut self, ctx: &mut DiveContext<'_>) -> DiveOrders {
        let mut orders = DiveOrders::new();
        if !self.enabled || ctx.now < self.next_round {
            return orders;
        }
        self.next_round = ctx.now + self.cycle.cooldown as f64;

        let mut candidates: SVec<[ActorId; 16]> = ctx.candidates.iter().copied().collect();
        candidates.shuffle(&mut *ctx.rng);
        let cap = self.cycle.max_simultaneous as usize;
        for actor in candidates {
            if self.tracker.active_count() >= cap {
                break;
            }
            if !ctx.rng.gen_bool(self.cycle.probability as f64) {
                continue;
            }
            match self.tracker.acquire_path(&ctx.origin, ctx.pool, ctx.rng) {
                Some(path) => {
                    self.tracker.track(actor, path, ctx.pool);
                    orders.push(DiveOrder { actor, path });
                }
                // pool's dry, try again next round
                None => break,
            }
        }
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
        self.next_round = f64::INFINITY;
        self.tracker.release_all(pool);
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{names, pool};
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn never_exceeds_the_cap() {
        let mut pool = pool(8);
        let mut rng = StdRng::seed_from_u64(21);
        let mut diving = AttackCycleDiving::new(
            AttackCycle {
                cooldown: 1.,
                max_simultaneous: 2,
                probability: 1.,
            },
            DivePathTracker::new(names()).unwrap(),
        );
        let candidates: Vec<ActorId> = (0..6).map(ActorId).collect();
        diving.enable_diving(0., &mut rng);
        for round in 0..5 {
            diving.on_tick(&mut DiveContext {
                now: round as f64,
                origin: Placement::default(),
                candidates: &candidates,
                pool: &mut pool,
                rng: &mut rng,
            });
            assert!(diving.tracker().active_count() <= 2);
        }
        assert_eq!(diving.tracker().active_count(), 2);
        assert_eq!(pool.in_use(), 2);
    }

    #[test]
    fn zero_probability_never_dives() {
        let mut pool = pool(8);
        let mut rng = StdRng::seed_from_u64(21);
        let mut diving = AttackCycleDiving::new(
            AttackCycle {
                probability: 0.,
                ..Default::default()
            },
            DivePathTracker::new(names()).unwrap(),
        );
        diving.enable_diving(0., &mut rng);
        let orders = diving.on_tick(&mut DiveContext {
            now: 100.,
            origin: Placement::default(),
            candidates: &[ActorId(0), ActorId(1)],
            pool: &mut pool,
            rng: &mut rng,
        });
        assert!(orders.is_empty());
        assert_eq!(diving.next_round(), 102.);
    }

    #[test]
    fn probability_outside_unit_range_is_rejected() {
        let cycle = AttackCycle {
            probability: 1.5,
            ..Default::default()
        };
        assert!(cycle.validate().is_err());
    }
}
