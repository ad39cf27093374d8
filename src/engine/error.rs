use ulid::Ulid;

use crate::model::Span;

#[derive(Debug)]
pub enum EngineError {
    /// `end <= start`, or shorter than the minimum slot duration.
    InvalidRange(&'static str),
    OutOfBusinessHours(Span),
    InThePast(Span),
    /// Room booking overlaps an existing booking.
    Conflict { booking_id: Ulid, span: Span },
    /// Availability overlaps one of the trainer's existing slots.
    Overlap { slot_id: Ulid, span: Span },
    /// No single slot of the trainer fully contains the requested window.
    NotAvailable { trainer_id: Ulid, span: Span },
    NoRoomsAvailable(Span),
    AlreadyRegistered { class_id: Ulid, member_id: Ulid },
    CapacityExceeded(u32),
    NotFound(Ulid),
    Unauthorized(&'static str),
    SelectionCancelled,
    InvalidSelection(usize),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidRange(msg) => write!(f, "invalid range: {msg}"),
            EngineError::OutOfBusinessHours(span) => {
                write!(f, "{span} is outside business hours")
            }
            EngineError::InThePast(span) => write!(f, "{span} starts before today"),
            EngineError::Conflict { booking_id, span } => {
                write!(f, "conflict with booking {booking_id} {span}")
            }
            EngineError::Overlap { slot_id, span } => {
                write!(f, "overlaps availability slot {slot_id} {span}")
            }
            EngineError::NotAvailable { trainer_id, span } => {
                write!(f, "trainer {trainer_id} is not available for {span}")
            }
            EngineError::NoRoomsAvailable(span) => write!(f, "no rooms available for {span}"),
            EngineError::AlreadyRegistered { class_id, member_id } => {
                write!(f, "member {member_id} already registered for class {class_id}")
            }
            EngineError::CapacityExceeded(cap) => {
                write!(f, "capacity {cap} exceeded: class is full")
            }
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            EngineError::SelectionCancelled => write!(f, "room selection cancelled"),
            EngineError::InvalidSelection(idx) => write!(f, "no candidate room at index {idx}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
