use serde::Serialize;
use ulid::Ulid;

use crate::model::*;

use super::availability::slot_violations;
use super::conflict::checked_span;
use super::{Engine, EngineError};

/// A broken at-rest invariant, as reported by [`Engine::audit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub resource_id: Ulid,
    pub entity_id: Ulid,
    pub reason: &'static str,
}

fn sort_rooms(rooms: &mut [RoomInfo]) {
    rooms.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
}

impl Engine {
    /// Rooms with no booking overlapping `[start, end)`.
    pub async fn candidate_rooms(&self, start: Ms, end: Ms) -> Result<Vec<RoomInfo>, EngineError> {
        let span = checked_span(start, end)?;
        let mut free = Vec::new();
        for id in self.store.room_ids() {
            let Some(room) = self.store.get_room(&id) else { continue };
            let guard = room.read().await;
            if guard.is_free(&span) {
                free.push(RoomInfo {
                    id,
                    name: guard.name.clone(),
                    capacity: guard.capacity,
                });
            }
        }
        sort_rooms(&mut free);
        Ok(free)
    }

    pub async fn list_trainers(&self) -> Vec<TrainerInfo> {
        let mut out = Vec::new();
        for id in self.store.trainer_ids() {
            if let Some(t) = self.store.get_trainer(&id) {
                out.push(TrainerInfo { id, name: t.read().await.name.clone() });
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        out
    }

    pub async fn list_rooms(&self) -> Vec<RoomInfo> {
        let mut out = Vec::new();
        for id in self.store.room_ids() {
            if let Some(r) = self.store.get_room(&id) {
                let guard = r.read().await;
                out.push(RoomInfo { id, name: guard.name.clone(), capacity: guard.capacity });
            }
        }
        sort_rooms(&mut out);
        out
    }

    /// A trainer's free slots in start order.
    pub async fn trainer_availability(&self, trainer_id: Ulid) -> Result<Vec<SlotInfo>, EngineError> {
        let trainer = self.trainer(&trainer_id)?;
        let guard = trainer.read().await;
        Ok(guard
            .slots
            .iter()
            .map(|s| SlotInfo {
                id: s.id,
                trainer_id,
                start: s.span.start,
                end: s.span.end,
            })
            .collect())
    }

    pub async fn room_bookings(&self, room_id: Ulid) -> Result<Vec<BookingInfo>, EngineError> {
        let room = self.room(&room_id)?;
        let guard = room.read().await;
        Ok(guard
            .bookings
            .iter()
            .map(|b| BookingInfo {
                id: b.id,
                room_id,
                start: b.span.start,
                end: b.span.end,
                purpose: b.purpose,
            })
            .collect())
    }

    /// Room owning a booking, whether booked directly or through a class.
    pub fn room_for_booking(&self, booking_id: Ulid) -> Option<Ulid> {
        self.store.room_for_booking(&booking_id)
    }

    pub async fn get_class(&self, class_id: Ulid) -> Result<ClassInfo, EngineError> {
        let class = self.class(&class_id)?;
        let c = class.read().await.clone();
        let trainer_name = match self.store.get_trainer(&c.trainer_id) {
            Some(t) => t.read().await.name.clone(),
            None => None,
        };
        let (room_name, capacity) = match self.store.get_room(&c.room_id) {
            Some(r) => {
                let guard = r.read().await;
                (guard.name.clone(), guard.capacity)
            }
            None => (None, 0),
        };
        Ok(ClassInfo {
            id: c.id,
            booking_id: c.booking_id,
            trainer_id: c.trainer_id,
            trainer_name,
            room_id: c.room_id,
            room_name,
            purpose: c.purpose,
            start: c.span.start,
            end: c.span.end,
            attendance: c.attendance,
            capacity,
        })
    }

    /// Every class ordered by start time, joined with trainer and room.
    pub async fn available_classes(&self) -> Vec<ClassInfo> {
        let mut out = Vec::new();
        for id in self.store.class_ids() {
            if let Ok(info) = self.get_class(id).await {
                out.push(info);
            }
        }
        out.sort_by(|a, b| a.start.cmp(&b.start).then(a.id.cmp(&b.id)));
        out
    }

    pub async fn class_members(&self, class_id: Ulid) -> Result<Vec<Ulid>, EngineError> {
        let class = self.class(&class_id)?;
        let mut members: Vec<Ulid> = class.read().await.members.iter().copied().collect();
        members.sort();
        Ok(members)
    }

    /// Check every at-rest invariant. An empty result means the calendars,
    /// bookings and attendance counters are all consistent.
    pub async fn audit(&self) -> Vec<Violation> {
        let mut out = Vec::new();

        for id in self.store.trainer_ids() {
            let Some(t) = self.store.get_trainer(&id) else { continue };
            let guard = t.read().await;
            for (entity_id, reason) in slot_violations(&guard) {
                out.push(Violation { resource_id: id, entity_id, reason });
            }
        }

        for id in self.store.room_ids() {
            let Some(r) = self.store.get_room(&id) else { continue };
            let guard = r.read().await;
            let mut furthest: Option<&Booking> = None;
            for b in guard.bookings.iter() {
                if let Some(prev) = furthest
                    && prev.span.overlaps(&b.span)
                {
                    out.push(Violation {
                        resource_id: id,
                        entity_id: b.id,
                        reason: "booking overlaps another booking",
                    });
                }
                if furthest.is_none_or(|p| b.span.end > p.span.end) {
                    furthest = Some(b);
                }
            }
        }

        for id in self.store.class_ids() {
            let Some(c) = self.store.get_class(&id) else { continue };
            let guard = c.read().await;
            if guard.attendance as usize != guard.members.len() {
                out.push(Violation {
                    resource_id: id,
                    entity_id: id,
                    reason: "attendance out of sync with registrations",
                });
            }
            match self.store.get_room(&guard.room_id) {
                Some(r) => {
                    let room = r.read().await;
                    if guard.attendance > room.capacity {
                        out.push(Violation {
                            resource_id: guard.room_id,
                            entity_id: id,
                            reason: "attendance exceeds room capacity",
                        });
                    }
                    if room.bookings.get(guard.booking_id).is_none() {
                        out.push(Violation {
                            resource_id: guard.room_id,
                            entity_id: id,
                            reason: "class booking missing from room",
                        });
                    }
                }
                None => out.push(Violation {
                    resource_id: guard.room_id,
                    entity_id: id,
                    reason: "class refers to unknown room",
                }),
            }
        }

        out
    }
}
