use crate::config::ClubHours;
use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

/// Build a span from caller input, rejecting empty/inverted and absurd ranges.
pub(crate) fn checked_span(start: Ms, end: Ms) -> Result<Span, EngineError> {
    if end <= start {
        return Err(EngineError::InvalidRange("end must be after start"));
    }
    if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    let span = Span::new(start, end);
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("span too wide"));
    }
    Ok(span)
}

/// Calendar rules for a new availability slot: not before today, inside
/// opening hours on a single day, at least the minimum slot length.
pub(crate) fn validate_new_slot(hours: &ClubHours, span: &Span, now: Ms) -> Result<(), EngineError> {
    let (Some(start), Some(end), Some(today)) =
        (hours.local(span.start), hours.local(span.end), hours.today(now))
    else {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    };

    if start.date_naive() < today {
        return Err(EngineError::InThePast(*span));
    }

    let (start_t, end_t) = (start.time(), end.time());
    let within = start.date_naive() == end.date_naive()
        && hours.open <= start_t
        && start_t < hours.close
        && hours.open <= end_t
        && end_t <= hours.close;
    if !within {
        return Err(EngineError::OutOfBusinessHours(*span));
    }

    if span.duration_ms() < MIN_SLOT_DURATION_MS {
        return Err(EngineError::InvalidRange("availability must last at least one hour"));
    }
    Ok(())
}

pub(crate) fn check_slot_free(trainer: &TrainerState, span: &Span) -> Result<(), EngineError> {
    match trainer.slots.overlapping(span).next() {
        Some(slot) => Err(EngineError::Overlap { slot_id: slot.id, span: slot.span }),
        None => Ok(()),
    }
}

pub(crate) fn check_room_free(room: &RoomState, span: &Span) -> Result<(), EngineError> {
    match room.bookings.overlapping(span).next() {
        Some(b) => Err(EngineError::Conflict { booking_id: b.id, span: b.span }),
        None => Ok(()),
    }
}

pub(crate) fn check_name(name: &Option<String>) -> Result<(), EngineError> {
    match name {
        Some(n) if n.len() > MAX_NAME_LEN => Err(EngineError::LimitExceeded("name too long")),
        _ => Ok(()),
    }
}
