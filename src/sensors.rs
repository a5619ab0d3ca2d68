//! Player target tracking.
//!
//! Attackers don't poll for the player: they subscribe once and are told
//! when a target registers or deregisters.

use deps::*;

use std::{collections::BTreeSet, sync::Arc};

use bevy::prelude::*;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{
    math::*,
    mind::actor::{ActorId, ActorIndex, ActorMind},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetEvent {
    Registered(TargetId),
    Deregistered(TargetId),
}

#[derive(Debug, Default)]
pub struct TargetRegistry {
    current: Option<(TargetId, TVec2)>,
    subscribers: BTreeSet<ActorId>,
    pending: Vec<TargetEvent>,
}

impl TargetRegistry {
    /// Replaces any previously registered target.
    pub fn register(&mut self, id: TargetId, position: TVec2) {
        if let Some((old, _)) = self.current.take() {
            if old != id {
                self.pending.push(TargetEvent::Deregistered(old));
            }
        }
        self.current = Some((id, position));
        self.pending.push(TargetEvent::Registered(id));
        tracing::debug!(?id, "target registered");
    }

    pub fn deregister(&mut self, id: TargetId) -> bool {
        match self.current {
            Some((current, _)) if current == id => {
                self.current = None;
                self.pending.push(TargetEvent::Deregistered(id));
                tracing::debug!(?id, "target deregistered");
                true
            }
            _ => false,
        }
    }

    pub fn set_position(&mut self, id: TargetId, position: TVec2) {
        if let Some((current, pos)) = &mut self.current {
            if *current == id {
                *pos = position;
            }
        }
    }

    #[inline]
    pub fn current(&self) -> Option<TargetId> {
        self.current.map(|(id, _)| id)
    }

    /// Position of `id` if it's still the registered target.
    pub fn position_of(&self, id: TargetId) -> Option<TVec2> {
        self.current
            .filter(|(current, _)| *current == id)
            .map(|(_, pos)| pos)
    }

    /// Returns the target the subscriber should start tracking.
    pub fn subscribe(&mut self, actor: ActorId) -> Option<TargetId> {
        self.subscribers.insert(actor);
        self.current()
    }

    pub fn unsubscribe(&mut self, actor: ActorId) {
        self.subscribers.remove(&actor);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Fans queued events out to every current subscriber.
    pub fn drain_notifications(&mut self) -> Vec<(ActorId, TargetEvent)> {
        let mut out = Vec::with_capacity(self.pending.len() * self.subscribers.len());
        for event in self.pending.drain(..) {
            out.extend(self.subscribers.iter().map(|actor| (*actor, event)));
        }
        out
    }
}

/// Handle shared between the simulation and whatever moves the player.
#[derive(Debug, Clone, Default)]
pub struct SharedTargets(Arc<RwLock<TargetRegistry>>);

impl SharedTargets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, TargetRegistry> {
        self.0.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, TargetRegistry> {
        self.0.write()
    }
}

/// Hands queued target notifications to the actors that subscribed.
pub fn target_event_butler(
    targets: Res<SharedTargets>,
    index: Res<ActorIndex>,
    mut actors: Query<&mut ActorMind>,
) {
    let notifications = targets.write().drain_notifications();
    for (id, event) in notifications {
        match index.get(id).map(|entt| actors.get_mut(entt)) {
            Some(Ok(mut actor)) => actor.on_target_event(event),
            _ => tracing::debug!(actor = %id, ?event, "notification for a gone actor"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifications_reach_only_current_subscribers() {
        let mut reg = TargetRegistry::default();
        assert_eq!(reg.subscribe(ActorId(1)), None);
        reg.subscribe(ActorId(2));
        reg.register(TargetId(7), TVec2::new(0., -4.));
        reg.unsubscribe(ActorId(2));
        assert_eq!(
            reg.drain_notifications(),
            vec![(ActorId(1), TargetEvent::Registered(TargetId(7)))]
        );
        assert!(reg.drain_notifications().is_empty());
        assert_eq!(reg.subscribe(ActorId(3)), Some(TargetId(7)));
    }

    #[test]
    fn stale_target_has_no_position() {
        let mut reg = TargetRegistry::default();
        reg.register(TargetId(1), TVec2::new(1., 1.));
        reg.set_position(TargetId(1), TVec2::new(2., 1.));
        assert_eq!(reg.position_of(TargetId(1)), Some(TVec2::new(2., 1.)));
        assert!(!reg.deregister(TargetId(9)));
        assert!(reg.deregister(TargetId(1)));
        assert_eq!(reg.position_of(TargetId(1)), None);
        assert_eq!(reg.current(), None);
    }

    #[test]
    fn shared_handle_sees_writes() {
        let shared = SharedTargets::new();
        let other = shared.clone();
        other.write().register(TargetId(3), TVec2::ZERO);
        assert_eq!(shared.read().current(), Some(TargetId(3)));
    }
}
