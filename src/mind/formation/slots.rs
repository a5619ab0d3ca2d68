//! Slot occupancy and the formation's member bookkeeping.

use deps::*;

use std::collections::{BTreeMap, BTreeSet};

use bevy::utils::default;

use educe::Educe;

use crate::{
    error::{FormationError, FormationResult},
    math::*,
    mind::actor::ActorId,
};

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, Educe)]
#[serde(crate = "serde")]
#[educe(Default)]
pub enum SlotLayout {
    #[educe(Default)]
    Offsets(Vec<(TReal, TReal)>),
    /// Centred horizontally on the anchor, rows stacked downward.
    Grid {
        columns: u32,
        rows: u32,
        spacing: TReal,
    },
}

impl SlotLayout {
    pub fn offsets(&self) -> Vec<TVec2> {
        match self {
            SlotLayout::Offsets(list) => list.iter().map(|p| TVec2::from(*p)).collect(),
            SlotLayout::Grid {
                columns,
                rows,
                spacing,
            } => {
                let half_width = (columns.saturating_sub(1)) as TReal * 0.5;
                let mut out = Vec::with_capacity((columns * rows) as usize);
                for row in 0..*rows {
                    for col in 0..*columns {
                        out.push(TVec2::new(
                            (col as TReal - half_width) * spacing,
                            -(row as TReal) * spacing,
                        ));
                    }
                }
                out
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormationSlot {
    pub index: usize,
    pub local_offset: TVec2,
    pub occupant: Option<ActorId>,
    /// Seconds a spawner may wait before sending this slot's member.
    pub arrival_delay: TReal,
}

impl FormationSlot {
    #[inline]
    pub fn is_occupied(&self) -> bool {
        self.occupant.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct FormationSlotTable {
    slots: Vec<FormationSlot>,
    spacing: TReal,
    /// Registered members and the slot each holds.
    members: BTreeMap<ActorId, usize>,
    /// Alive but out of their slot, i.e. diving.
    detached: BTreeSet<ActorId>,
    joined: BTreeSet<ActorId>,
    expected: usize,
    defeated: bool,
}

impl FormationSlotTable {
    pub fn new(
        offsets: Vec<TVec2>,
        spacing: TReal,
        arrival_delay_between_members: TReal,
    ) -> FormationResult<Self> {
        if offsets.is_empty() {
            return Err(FormationError::EmptySlotList);
        }
        let slots = offsets
            .into_iter()
            .enumerate()
            .map(|(index, local_offset)| FormationSlot {
                index,
                local_offset,
                occupant: None,
                arrival_delay: index as TReal * arrival_delay_between_members,
            })
            .collect();
        Ok(Self {
            slots,
            spacing,
            members: default(),
            detached: default(),
            joined: default(),
            expected: 0,
            defeated: false,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[FormationSlot] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> FormationResult<&FormationSlot> {
        self.slots.get(index).ok_or(FormationError::SlotOutOfRange {
            index,
            len: self.slots.len(),
        })
    }

    /// Slot offset from the anchor, spacing applied.
    pub fn local_position(&self, index: usize) -> FormationResult<TVec2> {
        Ok(self.slot(index)?.local_offset * self.spacing)
    }

    /// Returns whether the member was newly registered.
    pub fn register_member(&mut self, id: ActorId, index: usize) -> FormationResult<bool> {
        if self.members.contains_key(&id) {
            return Ok(false);
        }
        let len = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(FormationError::SlotOutOfRange { index, len })?;
        if let Some(occupant) = slot.occupant {
            return Err(FormationError::SlotOccupied {
                index,
                occupant,
                claimant: id,
            });
        }
        slot.occupant = Some(id);
        self.members.insert(id, index);
        self.detached.remove(&id);
        self.joined.insert(id);
        tracing::debug!(actor = %id, slot = index, "member registered");
        Ok(true)
    }

    /// Frees the member's slot. Without `report_defeat` the member is kept as
    /// alive but detached. Returns true the one time this leaves the
    /// formation wiped out.
    pub fn unregister_member(&mut self, id: ActorId, report_defeat: bool) -> bool {
        let mut known = self.detached.contains(&id);
        if let Some(index) = self.members.remove(&id) {
            known = true;
            self.slots[index].occupant = None;
        }
        if !known {
            return false;
        }
        if !report_defeat {
            self.detached.insert(id);
            tracing::debug!(actor = %id, "member detached");
            return false;
        }
        self.detached.remove(&id);
        tracing::debug!(actor = %id, remaining = self.member_count(), "member lost");
        if !self.defeated
            && self.members.is_empty()
            && self.detached.is_empty()
            && self.expected > 0
            && self.joined.len() >= self.expected
        {
            self.defeated = true;
            return true;
        }
        false
    }

    /// Drops a member that left without dying.
    pub fn forget_member(&mut self, id: ActorId) -> bool {
        let detached = self.detached.remove(&id);
        match self.members.remove(&id) {
            Some(index) => {
                self.slots[index].occupant = None;
                true
            }
            None => detached,
        }
    }

    pub fn set_expected_members(&mut self, count: usize) {
        self.expected = count;
    }

    #[inline]
    pub fn expected_members(&self) -> usize {
        self.expected
    }

    /// Registered plus detached members.
    #[inline]
    pub fn member_count(&self) -> usize {
        self.members.len() + self.detached.len()
    }

    pub fn occupied_count(&self) -> usize {
        self.members.len()
    }

    pub fn slot_of(&self, id: ActorId) -> Option<usize> {
        self.members.get(&id).copied()
    }

    pub fn is_detached(&self, id: ActorId) -> bool {
        self.detached.contains(&id)
    }

    pub fn registered(&self) -> impl Iterator<Item = (ActorId, usize)> + '_ {
        self.members.iter().map(|(id, index)| (*id, *index))
    }

    #[inline]
    pub fn is_defeated(&self) -> bool {
        self.defeated
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.occupant = None;
        }
        self.members.clear();
        self.detached.clear();
        self.joined.clear();
        self.expected = 0;
        self.defeated = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(n: usize) -> FormationSlotTable {
        let offsets = (0..n).map(|ii| TVec2::new(ii as TReal, 0.)).collect();
        FormationSlotTable::new(offsets, 2., 0.25).unwrap()
    }

    #[test]
    fn empty_layout_is_refused() {
        assert_eq!(
            FormationSlotTable::new(vec![], 1., 0.).unwrap_err(),
            FormationError::EmptySlotList
        );
    }

    #[test]
    fn positions_and_delays() {
        let table = table(3);
        assert_eq!(table.local_position(2).unwrap(), TVec2::new(4., 0.));
        assert_eq!(table.slot(2).unwrap().arrival_delay, 0.5);
        assert_eq!(
            table.local_position(3),
            Err(FormationError::SlotOutOfRange { index: 3, len: 3 })
        );
    }

    #[test]
    fn registration_is_idempotent_and_exclusive() {
        let mut table = table(2);
        assert_eq!(table.register_member(ActorId(1), 0), Ok(true));
        assert_eq!(table.register_member(ActorId(1), 0), Ok(false));
        assert_eq!(
            table.register_member(ActorId(2), 0),
            Err(FormationError::SlotOccupied {
                index: 0,
                occupant: ActorId(1),
                claimant: ActorId(2)
            })
        );
        assert_eq!(table.occupied_count(), 1);
    }

    #[test]
    fn defeat_fires_once_on_last_death() {
        let mut table = table(5);
        table.set_expected_members(5);
        for ii in 0..5 {
            table.register_member(ActorId(ii), ii as usize).unwrap();
        }
        let fired: Vec<bool> = (0..5)
            .map(|ii| table.unregister_member(ActorId(ii), true))
            .collect();
        assert_eq!(fired, vec![false, false, false, false, true]);
        assert!(!table.unregister_member(ActorId(4), true));
        assert!(table.is_defeated());
    }

    #[test]
    fn no_defeat_before_everyone_has_joined() {
        let mut table = table(5);
        table.set_expected_members(5);
        for ii in 0..3 {
            table.register_member(ActorId(ii), ii as usize).unwrap();
        }
        for ii in 0..3 {
            assert!(!table.unregister_member(ActorId(ii), true));
        }
        assert!(!table.is_defeated());
    }

    #[test]
    fn detached_divers_keep_the_formation_alive() {
        let mut table = table(2);
        table.set_expected_members(2);
        table.register_member(ActorId(0), 0).unwrap();
        table.register_member(ActorId(1), 1).unwrap();
        assert!(!table.unregister_member(ActorId(0), false));
        assert!(table.is_detached(ActorId(0)));
        assert!(!table.slot(0).unwrap().is_occupied());
        assert!(!table.unregister_member(ActorId(1), true));
        assert_eq!(table.member_count(), 1);
        // diver dies mid-dive
        assert!(table.unregister_member(ActorId(0), true));
    }

    #[test]
    fn grid_layout_is_centred() {
        let offsets = SlotLayout::Grid {
            columns: 3,
            rows: 2,
            spacing: 1.5,
        }
        .offsets();
        assert_eq!(offsets.len(), 6);
        assert_eq!(offsets[0], TVec2::new(-1.5, 0.));
        assert_eq!(offsets[1], TVec2::new(0., 0.));
        assert_eq!(offsets[5], TVec2::new(1.5, -1.5));
    }
}
