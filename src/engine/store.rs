use dashmap::DashMap;
use ulid::Ulid;

use super::{SharedClass, SharedRoom, SharedTrainer};

/// Every trainer, room and class behind its own lock, plus the reverse
/// indexes the engine needs to route ids.
pub struct InMemoryStore {
    trainers: DashMap<Ulid, SharedTrainer>,
    rooms: DashMap<Ulid, SharedRoom>,
    classes: DashMap<Ulid, SharedClass>,
    /// booking id → room id, for direct and class bookings alike.
    booking_to_room: DashMap<Ulid, Ulid>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            trainers: DashMap::new(),
            rooms: DashMap::new(),
            classes: DashMap::new(),
            booking_to_room: DashMap::new(),
        }
    }

    // ── Trainers ─────────────────────────────────────────────

    pub fn trainer_count(&self) -> usize {
        self.trainers.len()
    }

    pub fn get_trainer(&self, id: &Ulid) -> Option<SharedTrainer> {
        self.trainers.get(id).map(|e| e.value().clone())
    }

    pub fn insert_trainer(&self, id: Ulid, state: SharedTrainer) {
        self.trainers.insert(id, state);
    }

    pub fn trainer_ids(&self) -> Vec<Ulid> {
        self.trainers.iter().map(|e| *e.key()).collect()
    }

    // ── Rooms ────────────────────────────────────────────────

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn get_room(&self, id: &Ulid) -> Option<SharedRoom> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub fn insert_room(&self, id: Ulid, state: SharedRoom) {
        self.rooms.insert(id, state);
    }

    pub fn room_ids(&self) -> Vec<Ulid> {
        self.rooms.iter().map(|e| *e.key()).collect()
    }

    pub fn map_booking(&self, booking_id: Ulid, room_id: Ulid) {
        self.booking_to_room.insert(booking_id, room_id);
    }

    pub fn room_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_room.get(booking_id).map(|e| *e.value())
    }

    // ── Classes ──────────────────────────────────────────────

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn get_class(&self, id: &Ulid) -> Option<SharedClass> {
        self.classes.get(id).map(|e| e.value().clone())
    }

    pub fn insert_class(&self, id: Ulid, state: SharedClass) {
        self.classes.insert(id, state);
    }

    pub fn class_ids(&self) -> Vec<Ulid> {
        self.classes.iter().map(|e| *e.key()).collect()
    }
}
