//! Engine error types.
//!
//! Configuration problems are fatal at initialisation: the formation refuses
//! to build rather than running as a formation of zero. Pool handle misuse is
//! reported through [`PoolError`] and swallowed at the release boundary.

use deps::bevy::prelude::Entity;

use crate::{mind::actor::ActorId, path::pool::PathHandle, SmartString};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FormationError {
    #[error("formation has no slots configured")]
    EmptySlotList,

    #[error("formation has no dive path templates configured")]
    NoDivePathTemplates,

    #[error("slot index {index} out of range for a formation of {len} slots")]
    SlotOutOfRange { index: usize, len: usize },

    #[error("slot {index} is held by actor {occupant}, refused for actor {claimant}")]
    SlotOccupied {
        index: usize,
        occupant: ActorId,
        claimant: ActorId,
    },

    #[error("{name}: min {min} exceeds max {max}")]
    InvertedRange {
        name: &'static str,
        min: f32,
        max: f32,
    },

    #[error("{name} = {value} is outside {expected}")]
    InvalidValue {
        name: &'static str,
        value: f32,
        expected: &'static str,
    },

    #[error("unknown path template '{0}'")]
    UnknownPathTemplate(SmartString),

    #[error("path template '{0}' has no points")]
    EmptyPath(SmartString),

    #[error("path template '{0}' is declared more than once")]
    DuplicatePathTemplate(SmartString),

    #[error("path template '{name}' loops and can't serve as a {role} path")]
    LoopedPath {
        name: SmartString,
        role: &'static str,
    },

    #[error("unknown enemy kind '{0}'")]
    UnknownEnemyKind(SmartString),

    #[error("wave {wave} spawns {amount} enemies but lists no {missing}")]
    IncompleteWave {
        wave: usize,
        amount: u32,
        missing: &'static str,
    },

    #[error("{members} enemies are scheduled but the formation only has {slots} slots")]
    TooManyMembers { members: usize, slots: usize },

    #[error("no pooled instance of entry path '{0}' is available")]
    EntryPathUnavailable(SmartString),

    #[error("actor {0} is not part of the simulation")]
    UnknownActor(ActorId),

    #[error("entity {0:?} carries no formation")]
    MissingFormation(Entity),
}

pub type FormationResult<T> = Result<T, FormationError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("{0:?} was already returned to the pool")]
    StaleHandle(PathHandle),

    #[error("{0:?} does not belong to this pool")]
    ForeignHandle(PathHandle),
}

/// Checks a `[min, max]` pair used for uniform sampling.
pub fn check_range(name: &'static str, min: f32, max: f32) -> FormationResult<()> {
    if !min.is_finite() || min < 0. {
        return Err(FormationError::InvalidValue {
            name,
            value: min,
            expected: "[0, inf)",
        });
    }
    if !max.is_finite() || min > max {
        return Err(FormationError::InvertedRange { name, min, max });
    }
    Ok(())
}
