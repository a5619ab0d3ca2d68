//! The four behaviour states every actor carries.

use deps::*;

use educe::Educe;

use crate::{math::*, path::PathHandle};

use super::{fire::*, ActorBody, ActorCtx, ActorSignal, ActorSignals, EnemyConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Educe)]
#[educe(Default)]
pub enum StateTag {
    /// Following the entry path.
    #[educe(Default)]
    OnPath,
    /// Homing straight at the assigned slot.
    FlyIn,
    /// Stationed in the formation.
    Idle,
    Dive,
}

impl StateTag {
    pub fn name(&self) -> &'static str {
        match self {
            StateTag::OnPath => "on_path",
            StateTag::FlyIn => "fly_in",
            StateTag::Idle => "idle",
            StateTag::Dive => "dive",
        }
    }
}

pub trait ActorState: Send + Sync + std::fmt::Debug {
    fn tag(&self) -> StateTag;
    fn fire_settings(&self) -> &FireSettings;

    fn enter(&mut self, _body: &mut ActorBody, _out: &mut ActorSignals) {}

    /// Returns the state to switch to, if any.
    fn update(
        &mut self,
        body: &mut ActorBody,
        ctx: &mut ActorCtx<'_>,
        out: &mut ActorSignals,
    ) -> Option<StateTag>;

    fn exit(&mut self, _body: &mut ActorBody, _out: &mut ActorSignals) {}
}

/// Moves the body along a pooled path, true once the path is done.
fn follow(body: &mut ActorBody, handle: Option<PathHandle>, ctx: &ActorCtx<'_>) -> bool {
    let path = match handle.and_then(|handle| ctx.paths.get(handle)) {
        Some(path) => path,
        None => {
            // the pool reclaimed it under us; treat as finished
            tracing::warn!(actor = %body.id, "following a path that's no longer live");
            return true;
        }
    };
    let step = body.follower.advance(path, ctx.dt);
    body.position = step.position;
    step.completed
}

#[derive(Debug)]
pub struct OnPath {
    fire: FireSettings,
}

impl ActorState for OnPath {
    fn tag(&self) -> StateTag {
        StateTag::OnPath
    }

    fn fire_settings(&self) -> &FireSettings {
        &self.fire
    }

    fn enter(&mut self, _body: &mut ActorBody, out: &mut ActorSignals) {
        out.push(ActorSignal::TrailsChanged(true));
    }

    fn update(
        &mut self,
        body: &mut ActorBody,
        ctx: &mut ActorCtx<'_>,
        out: &mut ActorSignals,
    ) -> Option<StateTag> {
        let handle = body.entry_path;
        if follow(body, handle, ctx) {
            out.push(ActorSignal::PathEnded { was_diving: false });
            return Some(StateTag::FlyIn);
        }
        None
    }

    fn exit(&mut self, body: &mut ActorBody, _out: &mut ActorSignals) {
        // entry paths are shared and owned by the spawner
        body.entry_path = None;
    }
}

#[derive(Debug)]
pub struct FlyIn {
    fire: FireSettings,
    speed: TReal,
    epsilon: TReal,
}

impl ActorState for FlyIn {
    fn tag(&self) -> StateTag {
        StateTag::FlyIn
    }

    fn fire_settings(&self) -> &FireSettings {
        &self.fire
    }

    fn update(
        &mut self,
        body: &mut ActorBody,
        ctx: &mut ActorCtx<'_>,
        out: &mut ActorSignals,
    ) -> Option<StateTag> {
        body.position = move_towards(body.position, ctx.slot_position, self.speed * ctx.dt);
        if body.position.distance(ctx.slot_position) <= self.epsilon {
            // anchor onto the slot, the formation carries it from here
            body.position = ctx.slot_position;
            out.push(ActorSignal::ReachedFormation { slot: body.slot });
            return Some(StateTag::Idle);
        }
        None
    }
}

#[derive(Debug)]
pub struct Idle {
    fire: FireSettings,
}

impl ActorState for Idle {
    fn tag(&self) -> StateTag {
        StateTag::Idle
    }

    fn fire_settings(&self) -> &FireSettings {
        &self.fire
    }

    fn enter(&mut self, _body: &mut ActorBody, out: &mut ActorSignals) {
        out.push(ActorSignal::TrailsChanged(false));
    }

    fn update(
        &mut self,
        body: &mut ActorBody,
        ctx: &mut ActorCtx<'_>,
        _out: &mut ActorSignals,
    ) -> Option<StateTag> {
        body.position = ctx.slot_position;
        None
    }
}

#[derive(Debug)]
pub struct Dive {
    fire: FireSettings,
}

impl ActorState for Dive {
    fn tag(&self) -> StateTag {
        StateTag::Dive
    }

    fn fire_settings(&self) -> &FireSettings {
        &self.fire
    }

    fn enter(&mut self, _body: &mut ActorBody, out: &mut ActorSignals) {
        out.push(ActorSignal::TrailsChanged(true));
    }

    fn update(
        &mut self,
        body: &mut ActorBody,
        ctx: &mut ActorCtx<'_>,
        out: &mut ActorSignals,
    ) -> Option<StateTag> {
        let handle = body.dive_path;
        if follow(body, handle, ctx) {
            out.push(ActorSignal::PathEnded { was_diving: true });
            return Some(StateTag::FlyIn);
        }
        None
    }

    fn exit(&mut self, body: &mut ActorBody, _out: &mut ActorSignals) {
        // the formation releases the handle itself
        body.dive_path = None;
    }
}

/// Every state pre-built, so switching can never miss.
#[derive(Debug)]
pub struct StateTable {
    on_path: OnPath,
    fly_in: FlyIn,
    idle: Idle,
    dive: Dive,
}

impl StateTable {
    pub fn new(config: &EnemyConfig) -> Self {
        Self {
            on_path: OnPath {
                fire: config.fire.on_path,
            },
            fly_in: FlyIn {
                fire: config.fire.fly_in,
                speed: config.fly_in_speed,
                epsilon: config.arrival_epsilon,
            },
            idle: Idle {
                fire: config.fire.idle,
            },
            dive: Dive {
                fire: config.fire.dive,
            },
        }
    }

    pub fn get_mut(&mut self, tag: StateTag) -> &mut dyn ActorState {
        match tag {
            StateTag::OnPath => &mut self.on_path,
            StateTag::FlyIn => &mut self.fly_in,
            StateTag::Idle => &mut self.idle,
            StateTag::Dive => &mut self.dive,
        }
    }
}
