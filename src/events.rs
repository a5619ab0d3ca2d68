//! Domain events the simulation hands to whoever owns it.

use deps::*;

use crate::{
    math::*,
    mind::actor::{fire::Shot, ActorId},
    SmartString,
};

#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    Spawned { actor: ActorId, enemy: SmartString },
    /// The last wave went out; diving is enabled from here on.
    SpawnComplete,
    Shot(Shot),
    TrailsChanged { actor: ActorId, on: bool },
    ReachedFormation { actor: ActorId, slot: usize },
    DiveStarted { actor: ActorId },
    DiveCompleted { actor: ActorId },
    EnemyKilled(EnemyKilled),
    FormationDefeated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnemyKilled {
    pub actor: ActorId,
    pub point_value: u32,
    pub position: TVec2,
    pub while_diving: bool,
}

/// Running score fed from [`EnemyKilled`] events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreTally {
    pub score: u64,
    pub high_score: u64,
}

impl ScoreTally {
    pub fn with_high_score(high_score: u64) -> Self {
        Self {
            score: 0,
            high_score,
        }
    }

    pub fn record(&mut self, kill: &EnemyKilled) {
        self.score += kill.point_value as u64;
        self.high_score = self.high_score.max(self.score);
    }

    pub fn reset(&mut self) {
        self.score = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kill(points: u32) -> EnemyKilled {
        EnemyKilled {
            actor: ActorId(0),
            point_value: points,
            position: TVec2::ZERO,
            while_diving: false,
        }
    }

    #[test]
    fn high_score_tracks_best_run() {
        let mut tally = ScoreTally::with_high_score(120);
        tally.record(&kill(50));
        tally.record(&kill(50));
        assert_eq!(tally, ScoreTally { score: 100, high_score: 120 });
        tally.record(&kill(100));
        assert_eq!(tally.high_score, 200);
        tally.reset();
        assert_eq!(tally.score, 0);
        assert_eq!(tally.high_score, 200);
    }
}
