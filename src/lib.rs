//! Formation coordination engine for a Galaga-style arcade shooter.
//!
//! Enemy actors fly an entry path, home into a formation slot, idle there and
//! are periodically peeled off to dive along an attack path before returning.
//! [`mind::MindPlugin`] runs the per frame work as bevy systems and
//! [`sim`] holds the world level operations a host calls between frames.

use deps::*;

pub mod config;
pub mod error;
pub mod events;
pub mod math;
pub mod mind;
pub mod path;
pub mod sensors;
pub mod sim;

pub type SmartString = smartstring::alias::String;

pub use error::{FormationError, FormationResult, PoolError};
