mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod store;

pub use availability::{plan_reservation, slot_violations};
pub use error::EngineError;
pub use queries::Violation;
pub use store::InMemoryStore;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{error, info, warn};
use ulid::Ulid;

use crate::config::{ClubHours, Config};
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedTrainer = Arc<RwLock<TrainerState>>;
pub type SharedRoom = Arc<RwLock<RoomState>>;
pub type SharedClass = Arc<RwLock<ClassState>>;

// ── Group-commit journal channel ─────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the journal and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders with the batch result.
async fn wal_writer_loop(mut wal: Wal<Event>, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { event, response } = cmd else {
            handle_non_append(&mut wal, cmd);
            continue;
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                // Flush what we have before compaction or stats see the file.
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        for (_, tx) in batch {
            let r = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = tx.send(r);
        }

        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn flush_batch(wal: &mut Wal<Event>, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event))
        .and_then(|()| wal.flush_sync());
    if let Err(e) = &result
        && !wal.is_poisoned()
    {
        // Every caller in the batch is told it failed, so none of it may
        // survive in the file.
        match wal.rollback() {
            Ok(()) => warn!("journal batch of {} rolled back: {e}", batch.len()),
            Err(rb) => error!("journal rollback failed, refusing further appends: {rb}"),
        }
    }
    result
}

fn handle_non_append(wal: &mut Wal<Event>, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// The scheduler: trainer calendars, room bookings, classes and
/// registrations, persisted through the journal.
pub struct Engine {
    pub store: InMemoryStore,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Mutations hold it shared from first check to apply; compaction holds
    /// it exclusively so no commit can slip between snapshot and file swap.
    pub(super) commit_gate: RwLock<()>,
    pub notify: Arc<NotifyHub>,
    pub hours: ClubHours,
}

impl Engine {
    /// Replay the journal at `wal_path` and start its writer task.
    /// Must run inside a tokio runtime.
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>, hours: ClubHours) -> io::Result<Self> {
        let replay = Wal::<Event>::replay(&wal_path)?;
        if replay.discarded_bytes > 0 {
            warn!(
                "journal {}: discarding {} bytes of torn tail",
                wal_path.display(),
                replay.discarded_bytes
            );
        }
        let wal = Wal::open(&wal_path, replay.valid_len)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            store: InMemoryStore::new(),
            wal_tx,
            commit_gate: RwLock::new(()),
            notify,
            hours,
        };
        for event in &replay.records {
            engine.replay_event(event);
        }
        info!(
            trainers = engine.store.trainer_count(),
            rooms = engine.store.room_count(),
            classes = engine.store.class_count(),
            "replayed {} journal records",
            replay.records.len()
        );
        Ok(engine)
    }

    /// Open the journal under `config.data_dir`, creating the directory.
    pub fn open(config: &Config) -> io::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        Self::new(config.wal_path(), Arc::new(NotifyHub::new()), config.hours)
    }

    /// Apply one journal record during startup. We are the sole owner of
    /// every lock here, so `try_write` always succeeds; never block, since
    /// this runs inside an async context.
    fn replay_event(&self, event: &Event) {
        match event {
            Event::TrainerCreated { id, name } => {
                let ts = TrainerState::new(*id, name.clone());
                self.store.insert_trainer(*id, Arc::new(RwLock::new(ts)));
            }
            Event::RoomCreated { id, name, capacity } => {
                let rs = RoomState::new(*id, name.clone(), *capacity);
                self.store.insert_room(*id, Arc::new(RwLock::new(rs)));
            }
            Event::AvailabilityAdded { id, trainer_id, span } => {
                if let Some(t) = self.store.get_trainer(trainer_id)
                    && let Ok(mut guard) = t.try_write()
                {
                    guard.slots.insert(Slot { id: *id, span: *span });
                }
            }
            Event::AvailabilityReserved { reservation } => {
                self.replay_reservation(reservation);
            }
            Event::RoomBooked { id, room_id, span, purpose } => {
                self.replay_booking(*id, *room_id, *span, *purpose);
            }
            Event::ClassScheduled { id, booking_id, room_id, reservation, purpose } => {
                self.replay_reservation(reservation);
                self.replay_booking(*booking_id, *room_id, reservation.reserved, *purpose);
                let cs = ClassState::new(
                    *id,
                    *booking_id,
                    *room_id,
                    reservation.trainer_id,
                    reservation.reserved,
                    *purpose,
                );
                self.store.insert_class(*id, Arc::new(RwLock::new(cs)));
            }
            Event::ClassRestored { id, booking_id, room_id, trainer_id, span, purpose } => {
                let cs = ClassState::new(*id, *booking_id, *room_id, *trainer_id, *span, *purpose);
                self.store.insert_class(*id, Arc::new(RwLock::new(cs)));
            }
            Event::MemberRegistered { class_id, member_id } => {
                if let Some(c) = self.store.get_class(class_id)
                    && let Ok(mut guard) = c.try_write()
                {
                    guard.add_member(*member_id);
                }
            }
        }
    }

    fn replay_reservation(&self, reservation: &Reservation) {
        if let Some(t) = self.store.get_trainer(&reservation.trainer_id)
            && let Ok(mut guard) = t.try_write()
        {
            guard.apply_reservation(reservation);
        }
    }

    fn replay_booking(&self, id: Ulid, room_id: Ulid, span: Span, purpose: Purpose) {
        if let Some(r) = self.store.get_room(&room_id)
            && let Ok(mut guard) = r.try_write()
        {
            guard.bookings.insert(Booking { id, span, purpose });
            self.store.map_booking(id, room_id);
        }
    }

    /// Write event to the journal via the background group-commit writer.
    /// Returns once the record is durable; this is the commit point of
    /// every mutation.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub(super) fn trainer(&self, id: &Ulid) -> Result<SharedTrainer, EngineError> {
        self.store.get_trainer(id).ok_or(EngineError::NotFound(*id))
    }

    pub(super) fn room(&self, id: &Ulid) -> Result<SharedRoom, EngineError> {
        self.store.get_room(id).ok_or(EngineError::NotFound(*id))
    }

    pub(super) fn class(&self, id: &Ulid) -> Result<SharedClass, EngineError> {
        self.store.get_class(id).ok_or(EngineError::NotFound(*id))
    }
}
