use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, the only time type.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// The one overlap predicate. Spans that only touch (`a.end == b.start`)
    /// do not overlap, so back-to-back bookings are legal.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// What a room booking is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    Private,
    Group,
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Purpose::Private => f.write_str("private"),
            Purpose::Group => f.write_str("group"),
        }
    }
}

impl FromStr for Purpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "private" => Ok(Purpose::Private),
            "group" => Ok(Purpose::Group),
            other => Err(format!("unknown purpose: {other}")),
        }
    }
}

// ── Timelines ────────────────────────────────────────────────────

/// Anything that sits on a timeline under a stable id.
pub trait Spanned {
    fn id(&self) -> Ulid;
    fn span(&self) -> Span;
}

/// A trainer's free-time block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: Ulid,
    pub span: Span,
}

impl Spanned for Slot {
    fn id(&self) -> Ulid {
        self.id
    }
    fn span(&self) -> Span {
        self.span
    }
}

/// A committed room reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub span: Span,
    pub purpose: Purpose,
}

impl Spanned for Booking {
    fn id(&self) -> Ulid {
        self.id
    }
    fn span(&self) -> Span {
        self.span
    }
}

/// Entries sorted by `span.start`.
#[derive(Debug, Clone)]
pub struct Timeline<T> {
    entries: Vec<T>,
}

impl<T> Default for Timeline<T> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<T: Spanned> Timeline<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn get(&self, id: Ulid) -> Option<&T> {
        self.entries.iter().find(|e| e.id() == id)
    }

    /// Insert maintaining sort order by span.start.
    pub fn insert(&mut self, entry: T) {
        let start = entry.span().start;
        let pos = self.entries.partition_point(|e| e.span().start <= start);
        self.entries.insert(pos, entry);
    }

    pub fn remove(&mut self, id: Ulid) -> Option<T> {
        let pos = self.entries.iter().position(|e| e.id() == id)?;
        Some(self.entries.remove(pos))
    }

    /// Entries overlapping the query window.
    /// Binary search skips everything starting at or after `query.end`.
    pub fn overlapping<'a>(&'a self, query: &'a Span) -> impl Iterator<Item = &'a T> {
        let right_bound = self
            .entries
            .partition_point(|e| e.span().start < query.end);
        self.entries[..right_bound]
            .iter()
            .filter(move |e| e.span().overlaps(query))
    }
}

// ── Resource state ───────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TrainerState {
    pub id: Ulid,
    pub name: Option<String>,
    pub slots: Timeline<Slot>,
}

impl TrainerState {
    pub fn new(id: Ulid, name: Option<String>) -> Self {
        Self { id, name, slots: Timeline::new() }
    }

    /// Apply a planned reservation. The plan was computed against this state
    /// under the same write lock (or is being replayed in journal order).
    pub fn apply_reservation(&mut self, r: &Reservation) {
        self.slots.remove(r.slot_id);
        if let Some(left) = r.left {
            self.slots.insert(Slot { id: r.slot_id, span: left });
        }
        if let Some(right) = r.right {
            self.slots.insert(right);
        }
        for id in &r.pruned {
            self.slots.remove(*id);
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoomState {
    pub id: Ulid,
    pub name: Option<String>,
    pub capacity: u32,
    pub bookings: Timeline<Booking>,
}

impl RoomState {
    pub fn new(id: Ulid, name: Option<String>, capacity: u32) -> Self {
        Self { id, name, capacity, bookings: Timeline::new() }
    }

    pub fn is_free(&self, span: &Span) -> bool {
        self.bookings.overlapping(span).next().is_none()
    }
}

#[derive(Debug, Clone)]
pub struct ClassState {
    pub id: Ulid,
    pub booking_id: Ulid,
    pub room_id: Ulid,
    pub trainer_id: Ulid,
    pub span: Span,
    pub purpose: Purpose,
    pub attendance: u32,
    pub members: HashSet<Ulid>,
}

impl ClassState {
    pub fn new(
        id: Ulid,
        booking_id: Ulid,
        room_id: Ulid,
        trainer_id: Ulid,
        span: Span,
        purpose: Purpose,
    ) -> Self {
        Self {
            id,
            booking_id,
            room_id,
            trainer_id,
            span,
            purpose,
            attendance: 0,
            members: HashSet::new(),
        }
    }

    pub fn add_member(&mut self, member_id: Ulid) {
        if self.members.insert(member_id) {
            self.attendance += 1;
        }
    }
}

/// Outcome of carving `reserved` out of one trainer slot.
///
/// `slot_id` keeps the left remainder `[s, reserved.start)` when it survives
/// pruning; the right remainder `[reserved.end, e)` gets a fresh id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub trainer_id: Ulid,
    pub slot_id: Ulid,
    pub original: Span,
    pub reserved: Span,
    pub left: Option<Span>,
    pub right: Option<Slot>,
    /// Other slots of the trainer that fell below the minimum duration.
    pub pruned: Vec<Ulid>,
}

/// The journal record format. One event per committed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    TrainerCreated {
        id: Ulid,
        name: Option<String>,
    },
    RoomCreated {
        id: Ulid,
        name: Option<String>,
        capacity: u32,
    },
    AvailabilityAdded {
        id: Ulid,
        trainer_id: Ulid,
        span: Span,
    },
    AvailabilityReserved {
        reservation: Reservation,
    },
    RoomBooked {
        id: Ulid,
        room_id: Ulid,
        span: Span,
        purpose: Purpose,
    },
    /// Trainer reservation, room booking and class creation as one unit.
    ClassScheduled {
        id: Ulid,
        booking_id: Ulid,
        room_id: Ulid,
        reservation: Reservation,
        purpose: Purpose,
    },
    /// Class row without its reservation. Only written by compaction, after
    /// the matching `RoomBooked`.
    ClassRestored {
        id: Ulid,
        booking_id: Ulid,
        room_id: Ulid,
        trainer_id: Ulid,
        span: Span,
        purpose: Purpose,
    },
    MemberRegistered {
        class_id: Ulid,
        member_id: Ulid,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrainerInfo {
    pub id: Ulid,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomInfo {
    pub id: Ulid,
    pub name: Option<String>,
    pub capacity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotInfo {
    pub id: Ulid,
    pub trainer_id: Ulid,
    pub start: Ms,
    pub end: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingInfo {
    pub id: Ulid,
    pub room_id: Ulid,
    pub start: Ms,
    pub end: Ms,
    pub purpose: Purpose,
}

/// Joined class row: what a member sees when picking a class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassInfo {
    pub id: Ulid,
    pub booking_id: Ulid,
    pub trainer_id: Ulid,
    pub trainer_name: Option<String>,
    pub room_id: Ulid,
    pub room_name: Option<String>,
    pub purpose: Purpose,
    pub start: Ms,
    pub end: Ms,
    pub attendance: u32,
    pub capacity: u32,
}
