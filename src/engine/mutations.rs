use std::sync::Arc;

use tokio::sync::{oneshot, RwLock};
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::timed;
use crate::session::Session;

use super::availability::plan_reservation;
use super::conflict::{
    check_name, check_room_free, check_slot_free, checked_span, now_ms, validate_new_slot,
};
use super::{Engine, EngineError, WalCommand};

impl Engine {
    pub async fn create_trainer(
        &self,
        session: &Session,
        name: Option<String>,
    ) -> Result<Ulid, EngineError> {
        timed("create_trainer", async {
            session.require_admin()?;
            check_name(&name)?;
            if self.store.trainer_count() >= MAX_TRAINERS {
                return Err(EngineError::LimitExceeded("too many trainers"));
            }
            let _gate = self.commit_gate.read().await;

            let id = Ulid::new();
            let event = Event::TrainerCreated { id, name: name.clone() };
            self.wal_append(&event).await?;
            let ts = TrainerState::new(id, name);
            self.store.insert_trainer(id, Arc::new(RwLock::new(ts)));
            self.notify.send(id, &event);
            info!("trainer {id} created");
            Ok(id)
        })
        .await
    }

    pub async fn create_room(
        &self,
        session: &Session,
        name: Option<String>,
        capacity: u32,
    ) -> Result<Ulid, EngineError> {
        timed("create_room", async {
            session.require_admin()?;
            check_name(&name)?;
            if capacity == 0 || capacity > MAX_ROOM_CAPACITY {
                return Err(EngineError::LimitExceeded("room capacity out of range"));
            }
            if self.store.room_count() >= MAX_ROOMS {
                return Err(EngineError::LimitExceeded("too many rooms"));
            }
            let _gate = self.commit_gate.read().await;

            let id = Ulid::new();
            let event = Event::RoomCreated { id, name: name.clone(), capacity };
            self.wal_append(&event).await?;
            let rs = RoomState::new(id, name, capacity);
            self.store.insert_room(id, Arc::new(RwLock::new(rs)));
            self.notify.send(id, &event);
            info!("room {id} created with capacity {capacity}");
            Ok(id)
        })
        .await
    }

    /// Open a new free-time slot on a trainer's calendar.
    pub async fn add_availability(
        &self,
        session: &Session,
        trainer_id: Ulid,
        start: Ms,
        end: Ms,
    ) -> Result<Ulid, EngineError> {
        timed("add_availability", async {
            session.require_trainer_access(trainer_id)?;
            let span = checked_span(start, end)?;
            validate_new_slot(&self.hours, &span, now_ms())?;

            let trainer = self.trainer(&trainer_id)?;
            let _gate = self.commit_gate.read().await;
            let mut guard = trainer.write().await;
            if guard.slots.len() >= MAX_SLOTS_PER_TRAINER {
                return Err(EngineError::LimitExceeded("too many availability slots"));
            }
            check_slot_free(&guard, &span)?;

            let id = Ulid::new();
            let event = Event::AvailabilityAdded { id, trainer_id, span };
            self.wal_append(&event).await?;
            guard.slots.insert(Slot { id, span });
            self.notify.send(trainer_id, &event);
            info!("trainer {trainer_id}: availability {span} added as {id}");
            Ok(id)
        })
        .await
    }

    /// Carve `[start, end)` out of the one slot that fully contains it,
    /// keeping remainders of at least an hour.
    pub async fn reserve_sub_interval(
        &self,
        session: &Session,
        trainer_id: Ulid,
        start: Ms,
        end: Ms,
    ) -> Result<Reservation, EngineError> {
        timed("reserve_sub_interval", async {
            session.require_trainer_access(trainer_id)?;
            let span = checked_span(start, end)?;

            let trainer = self.trainer(&trainer_id)?;
            let _gate = self.commit_gate.read().await;
            let mut guard = trainer.write().await;
            let reservation = plan_reservation(&guard, span, Ulid::new())?;

            let event = Event::AvailabilityReserved { reservation: reservation.clone() };
            self.wal_append(&event).await?;
            guard.apply_reservation(&reservation);
            self.notify.send(trainer_id, &event);
            info!("trainer {trainer_id}: reserved {span} from slot {}", reservation.slot_id);
            Ok(reservation)
        })
        .await
    }

    /// Conflict-checked room booking.
    pub async fn book_room(
        &self,
        session: &Session,
        room_id: Ulid,
        start: Ms,
        end: Ms,
        purpose: Purpose,
    ) -> Result<Ulid, EngineError> {
        timed("book_room", async {
            session.require_admin()?;
            let span = checked_span(start, end)?;

            let room = self.room(&room_id)?;
            let _gate = self.commit_gate.read().await;
            let mut guard = room.write().await;
            if guard.bookings.len() >= MAX_BOOKINGS_PER_ROOM {
                return Err(EngineError::LimitExceeded("too many bookings on room"));
            }
            check_room_free(&guard, &span)?;

            let id = Ulid::new();
            let event = Event::RoomBooked { id, room_id, span, purpose };
            self.wal_append(&event).await?;
            guard.bookings.insert(Booking { id, span, purpose });
            self.store.map_booking(id, room_id);
            self.notify.send(room_id, &event);
            info!("room {room_id}: booked {span} ({purpose}) as {id}");
            Ok(id)
        })
        .await
    }

    /// Schedule a class: reserve the trainer's time, let `select` pick one of
    /// the free rooms by index, book it and create the class.
    ///
    /// The reservation, the booking and the class are one journal record, and
    /// nothing is applied in memory before that record is durable. Any
    /// failure along the way leaves every calendar exactly as it was.
    ///
    /// `select` runs synchronously while the trainer's write lock and the
    /// commit gate are held. It must return promptly: no blocking I/O and no
    /// waiting on user input. Interactive callers should pick a room from
    /// `candidate_rooms` beforehand and pass a selector that finds it by id.
    pub async fn schedule_class<F>(
        &self,
        session: &Session,
        trainer_id: Ulid,
        start: Ms,
        end: Ms,
        purpose: Purpose,
        select: F,
    ) -> Result<Ulid, EngineError>
    where
        F: FnOnce(&[RoomInfo]) -> Option<usize>,
    {
        timed("schedule_class", async {
            session.require_admin()?;
            let span = checked_span(start, end)?;
            if self.store.class_count() >= MAX_CLASSES {
                return Err(EngineError::LimitExceeded("too many classes"));
            }

            let trainer = self.trainer(&trainer_id)?;
            let _gate = self.commit_gate.read().await;
            let mut trainer_guard = trainer.write().await;
            let reservation = plan_reservation(&trainer_guard, span, Ulid::new())?;

            let candidates = self.candidate_rooms(start, end).await?;
            if candidates.is_empty() {
                return Err(EngineError::NoRoomsAvailable(span));
            }
            let index = select(&candidates).ok_or(EngineError::SelectionCancelled)?;
            let room_id = candidates
                .get(index)
                .ok_or(EngineError::InvalidSelection(index))?
                .id;

            let room = self.room(&room_id)?;
            let mut room_guard = room.write().await;
            if room_guard.bookings.len() >= MAX_BOOKINGS_PER_ROOM {
                return Err(EngineError::LimitExceeded("too many bookings on room"));
            }
            // Candidates were read without the room lock; re-check under it.
            check_room_free(&room_guard, &span)?;

            let id = Ulid::new();
            let booking_id = Ulid::new();
            let event = Event::ClassScheduled {
                id,
                booking_id,
                room_id,
                reservation: reservation.clone(),
                purpose,
            };
            self.wal_append(&event).await?;

            trainer_guard.apply_reservation(&reservation);
            room_guard.bookings.insert(Booking { id: booking_id, span, purpose });
            self.store.map_booking(booking_id, room_id);
            let cs = ClassState::new(id, booking_id, room_id, trainer_id, span, purpose);
            self.store.insert_class(id, Arc::new(RwLock::new(cs)));

            self.notify.send(trainer_id, &event);
            self.notify.send(room_id, &event);
            info!("class {id} scheduled: trainer {trainer_id}, room {room_id}, {span} ({purpose})");
            Ok(id)
        })
        .await
    }

    /// Register the session's member for a class. Returns the new attendance.
    pub async fn register(&self, session: &Session, class_id: Ulid) -> Result<u32, EngineError> {
        timed("register", async {
            let member_id = session.require_member()?;
            let class = self.class(&class_id)?;
            let _gate = self.commit_gate.read().await;
            let mut guard = class.write().await;

            if guard.members.contains(&member_id) {
                return Err(EngineError::AlreadyRegistered { class_id, member_id });
            }
            let capacity = self.room(&guard.room_id)?.read().await.capacity;
            if guard.attendance >= capacity {
                return Err(EngineError::CapacityExceeded(capacity));
            }

            let event = Event::MemberRegistered { class_id, member_id };
            self.wal_append(&event).await?;
            guard.add_member(member_id);
            self.notify.send(class_id, &event);
            info!("member {member_id} registered for class {class_id} ({}/{capacity})", guard.attendance);
            Ok(guard.attendance)
        })
        .await
    }

    /// Rewrite the journal with only the records needed to recreate the
    /// current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        timed("compact_wal", async {
            let _gate = self.commit_gate.write().await;
            let mut events = Vec::new();

            for id in self.store.trainer_ids() {
                let Some(t) = self.store.get_trainer(&id) else { continue };
                let guard = t.read().await;
                events.push(Event::TrainerCreated { id, name: guard.name.clone() });
                for slot in guard.slots.iter() {
                    events.push(Event::AvailabilityAdded {
                        id: slot.id,
                        trainer_id: id,
                        span: slot.span,
                    });
                }
            }
            for id in self.store.room_ids() {
                let Some(r) = self.store.get_room(&id) else { continue };
                let guard = r.read().await;
                events.push(Event::RoomCreated {
                    id,
                    name: guard.name.clone(),
                    capacity: guard.capacity,
                });
                for b in guard.bookings.iter() {
                    events.push(Event::RoomBooked {
                        id: b.id,
                        room_id: id,
                        span: b.span,
                        purpose: b.purpose,
                    });
                }
            }
            for id in self.store.class_ids() {
                let Some(c) = self.store.get_class(&id) else { continue };
                let guard = c.read().await;
                events.push(Event::ClassRestored {
                    id,
                    booking_id: guard.booking_id,
                    room_id: guard.room_id,
                    trainer_id: guard.trainer_id,
                    span: guard.span,
                    purpose: guard.purpose,
                });
                for member_id in &guard.members {
                    events.push(Event::MemberRegistered { class_id: id, member_id: *member_id });
                }
            }

            let count = events.len();
            let (tx, rx) = oneshot::channel();
            self.wal_tx
                .send(WalCommand::Compact { events, response: tx })
                .await
                .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
            let result = rx
                .await
                .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
                .map_err(|e| EngineError::WalError(e.to_string()));
            let status = if result.is_ok() { "ok" } else { "error" };
            metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL, "status" => status)
                .increment(1);
            result?;
            info!("journal compacted to {count} records");
            Ok(())
        })
        .await
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
