use crate::model::Ms;

pub const HOUR_MS: Ms = 3_600_000;

/// Shortest slot a trainer may hold at rest; shorter remainders are pruned.
pub const MIN_SLOT_DURATION_MS: Ms = HOUR_MS;

pub const MAX_TRAINERS: usize = 10_000;
pub const MAX_ROOMS: usize = 10_000;
pub const MAX_CLASSES: usize = 1_000_000;
pub const MAX_SLOTS_PER_TRAINER: usize = 10_000;
pub const MAX_BOOKINGS_PER_ROOM: usize = 100_000;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_ROOM_CAPACITY: u32 = 10_000;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2100-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;
/// A single span may not exceed one day; business hours never need more.
pub const MAX_SPAN_DURATION_MS: Ms = 24 * HOUR_MS;
