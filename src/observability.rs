use std::time::Instant;

use crate::engine::EngineError;

/// Counter: engine operations. Labels: op, status.
pub const OPERATIONS_TOTAL: &str = "clubsched_operations_total";

/// Histogram: operation latency in seconds, lock wait included. Labels: op.
pub const OPERATION_DURATION_SECONDS: &str = "clubsched_operation_duration_seconds";

/// Histogram: journal group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "clubsched_wal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (records per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "clubsched_wal_flush_batch_size";

/// Counter: journal compactions. Labels: status.
pub const WAL_COMPACTIONS_TOTAL: &str = "clubsched_wal_compactions_total";

/// Short status label for an operation result.
pub fn status_label<T>(result: &Result<T, EngineError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(EngineError::InvalidRange(_)) => "invalid_range",
        Err(EngineError::OutOfBusinessHours(_)) => "out_of_business_hours",
        Err(EngineError::InThePast(_)) => "in_the_past",
        Err(EngineError::Conflict { .. }) => "conflict",
        Err(EngineError::Overlap { .. }) => "overlap",
        Err(EngineError::NotAvailable { .. }) => "not_available",
        Err(EngineError::NoRoomsAvailable(_)) => "no_rooms_available",
        Err(EngineError::AlreadyRegistered { .. }) => "already_registered",
        Err(EngineError::CapacityExceeded(_)) => "capacity_exceeded",
        Err(EngineError::NotFound(_)) => "not_found",
        Err(EngineError::Unauthorized(_)) => "unauthorized",
        Err(EngineError::SelectionCancelled) => "cancelled",
        Err(EngineError::InvalidSelection(_)) => "invalid_selection",
        Err(EngineError::LimitExceeded(_)) => "limit_exceeded",
        Err(EngineError::WalError(_)) => "wal_error",
    }
}

/// Record the RED metrics for one finished operation.
pub fn record<T>(op: &'static str, started: Instant, result: &Result<T, EngineError>) {
    metrics::counter!(OPERATIONS_TOTAL, "op" => op, "status" => status_label(result))
        .increment(1);
    metrics::histogram!(OPERATION_DURATION_SECONDS, "op" => op)
        .record(started.elapsed().as_secs_f64());
}

/// Run one engine operation, recording its metrics and logging rejections.
pub async fn timed<T>(
    op: &'static str,
    fut: impl Future<Output = Result<T, EngineError>>,
) -> Result<T, EngineError> {
    let started = Instant::now();
    let result = fut.await;
    if let Err(e) = &result {
        tracing::warn!(op, "rejected: {e}");
    }
    record(op, started, &result);
    result
}
