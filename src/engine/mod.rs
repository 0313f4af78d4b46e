mod booking;
mod error;
mod generation;
mod pricing;
mod queries;
mod shift;

pub use error::{EngineError, ErrorKind};
pub use generation::{effective_hours, generate_day_slots, within_horizon};
pub use pricing::calculate_price;

use std::collections::BTreeMap;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, OwnedRwLockWriteGuard, RwLock};
use tracing::{info, warn};
use ulid::Ulid;

use crate::clock::{Clock, SystemClock};
use crate::limits::*;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedDayState = Arc<RwLock<DayState>>;
pub type DayGuard = OwnedRwLockWriteGuard<DayState>;

// ── Group-commit WAL channel ─────────────────────────────

struct WalAppend {
    event: Event,
    response: oneshot::Sender<io::Result<()>>,
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first append arrives.
/// 2. Drain every append already queued (the batch window).
/// 3. One fsync for the whole batch, then answer every sender.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalAppend>) {
    while let Some(first) = rx.recv().await {
        let mut batch = vec![first];
        while let Ok(next) = rx.try_recv() {
            batch.push(next);
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());

        for append in batch {
            let r = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = append.response.send(r);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[WalAppend]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for append in batch {
        if let Err(e) = wal.append_buffered(&append.event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so half-buffered bytes don't leak
    // into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

// ── Event application ────────────────────────────────────

/// Id lookups kept beside the day map. Slots and bookings never change date.
#[derive(Default)]
pub(super) struct Indexes {
    pub(super) slots: DashMap<Ulid, NaiveDate>,
    pub(super) bookings: DashMap<Ulid, NaiveDate>,
}

/// Apply an event to one day (no locking, the caller holds the day).
/// Multi-day events only touch the parts that belong to `day.date`.
fn apply_to_day(day: &mut DayState, event: &Event, idx: &Indexes) {
    match event {
        Event::OverrideSet {
            schedule_override,
            purge_slots,
            log,
        } => {
            day.schedule_override = Some(schedule_override.clone());
            if *purge_slots {
                for slot in day.slots.drain(..) {
                    idx.slots.remove(&slot.id);
                }
            }
            day.actions.push(log.clone());
        }
        Event::SlotsGenerated { slots, .. } => {
            for slot in slots {
                idx.slots.insert(slot.id, slot.date);
            }
            day.slots.extend(slots.iter().cloned());
            day.sort_slots();
        }
        Event::SlotBlockChanged {
            slot_id,
            blocked,
            reason,
            log,
            ..
        } => {
            if let Some(slot) = day.slot_mut(*slot_id) {
                slot.is_blocked = *blocked;
                slot.blocked_reason = if *blocked { reason.clone() } else { None };
                slot.refresh_status();
            }
            day.actions.push(log.clone());
        }
        Event::BookingCreated { booking, log } => {
            if let Some(slot) = day.slot_mut(booking.slot_id) {
                slot.booked_participants += booking.participant_count;
                slot.refresh_status();
            }
            idx.bookings.insert(booking.id, booking.date);
            day.bookings.push(booking.clone());
            day.actions.push(log.clone());
        }
        Event::BookingUpdated {
            booking_id,
            status,
            edits,
            log,
            ..
        } => {
            let mut released: Option<(Ulid, u32)> = None;
            if let Some(booking) = day.booking_mut(*booking_id) {
                apply_edits(booking, edits);
                if let Some(change) = status {
                    booking.status = change.to;
                    match change.to {
                        BookingStatus::Confirmed => booking.confirmed_at = Some(change.at),
                        BookingStatus::Cancelled => {
                            booking.cancelled_at = Some(change.at);
                            booking.cancel_reason = change.reason.clone();
                            released = Some((booking.slot_id, booking.participant_count));
                        }
                        _ => {}
                    }
                }
            }
            if let Some((slot_id, count)) = released
                && let Some(slot) = day.slot_mut(slot_id)
            {
                slot.booked_participants = slot.booked_participants.saturating_sub(count);
                slot.refresh_status();
            }
            day.actions.push(log.clone());
        }
        Event::ReminderSent { booking_id, .. } => {
            if let Some(booking) = day.booking_mut(*booking_id) {
                booking.reminder_sent = true;
            }
        }
        Event::ReminderAcknowledged { booking_id, .. } => {
            if let Some(booking) = day.booking_mut(*booking_id) {
                booking.reminder_confirmed = true;
            }
        }
        Event::SlotsShifted { shift, moves, logs } => {
            let date = day.date;
            for mv in moves.iter().filter(|m| m.date == date) {
                if let Some(slot) = day.slot_mut(mv.slot_id) {
                    slot.original_start_time.get_or_insert(mv.old_start);
                    slot.start_time = mv.new_start;
                    slot.end_time = mv.new_end;
                    slot.shift_minutes_total += shift.shift_minutes;
                    slot.shift_reason = Some(shift.reason.clone());
                }
                for booking in day
                    .bookings
                    .iter_mut()
                    .filter(|b| b.slot_id == mv.slot_id && b.status.is_active())
                {
                    booking.start_time = mv.new_start;
                }
            }
            day.sort_slots();
            for log in logs {
                if log.booking_id.is_some_and(|id| day.booking(id).is_some()) {
                    day.actions.push(log.clone());
                }
            }
            day.shifts.push(ShiftLogEntry { date, ..shift.clone() });
        }
        Event::DayRestored { day: snapshot } => {
            *day = snapshot.clone();
            for slot in &day.slots {
                idx.slots.insert(slot.id, day.date);
            }
            for booking in &day.bookings {
                idx.bookings.insert(booking.id, day.date);
            }
        }
        // Engine-wide records never reach a day.
        Event::ConfigUpdated { .. } | Event::EngineRestored { .. } => {}
    }
}

fn apply_edits(booking: &mut Booking, edits: &BookingEdits) {
    if let Some(name) = &edits.contact_name {
        booking.contact.name = name.clone();
    }
    if let Some(phone) = &edits.contact_phone {
        booking.contact.phone = phone.clone();
    }
    if let Some(email) = &edits.contact_email {
        booking.contact.email = Some(email.clone());
    }
    if let Some(notes) = &edits.notes {
        booking.notes = Some(notes.clone());
    }
    if let Some(admin_notes) = &edits.admin_notes {
        booking.admin_notes = Some(admin_notes.clone());
    }
}

// ── Engine ───────────────────────────────────────────────

pub struct EngineOptions {
    /// Configuration used until the WAL carries one.
    pub seed: BookingConfig,
    /// Rewrite the WAL as a snapshot at open when replay sees more records than this. 0 disables.
    pub compact_threshold: u64,
    pub clock: Arc<dyn Clock>,
    /// How long a mutation waits for a day lock before the attempt is retried.
    pub lock_wait: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            seed: BookingConfig::default(),
            compact_threshold: 1000,
            clock: Arc::new(SystemClock),
            lock_wait: LOCK_WAIT,
        }
    }
}

pub struct Engine {
    pub(super) days: DashMap<NaiveDate, SharedDayState>,
    pub(super) indexes: Indexes,
    config: std::sync::RwLock<Arc<BookingConfig>>,
    /// Engine-wide audit entries. Also serializes config updates.
    pub(super) admin_actions: Mutex<Vec<ActionLogEntry>>,
    wal_tx: mpsc::Sender<WalAppend>,
    pub notify: Arc<NotifyHub>,
    pub(super) clock: Arc<dyn Clock>,
    lock_wait: Duration,
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        Self::with_options(wal_path, notify, EngineOptions::default())
    }

    /// Replay the WAL, compact it if it grew past the threshold, and start the writer task.
    /// Must be called from inside a tokio runtime.
    pub fn with_options(wal_path: PathBuf, notify: Arc<NotifyHub>, options: EngineOptions) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let replayed = events.len();

        // Replay into plain maps; we are the only owner until the engine is built.
        let indexes = Indexes::default();
        let mut config = options.seed;
        let mut admin_actions = Vec::new();
        let mut days: BTreeMap<NaiveDate, DayState> = BTreeMap::new();
        for event in &events {
            match event {
                Event::ConfigUpdated { config: next, log } => {
                    config = next.clone();
                    admin_actions.extend(log.iter().cloned());
                }
                Event::EngineRestored {
                    config: next,
                    admin_actions: actions,
                } => {
                    config = next.clone();
                    admin_actions = actions.clone();
                }
                other => {
                    for date in other.dates() {
                        let day = days.entry(date).or_insert_with(|| DayState::new(date));
                        apply_to_day(day, other, &indexes);
                    }
                }
            }
        }
        days.retain(|_, day| !day.is_empty());

        let mut wal = Wal::open(&wal_path)?;
        if options.compact_threshold > 0 && replayed as u64 > options.compact_threshold {
            let mut snapshot = Vec::with_capacity(days.len() + 1);
            snapshot.push(Event::EngineRestored {
                config: config.clone(),
                admin_actions: admin_actions.clone(),
            });
            snapshot.extend(days.values().map(|day| Event::DayRestored { day: day.clone() }));
            wal.compact(&snapshot)?;
            info!(replayed, compacted = snapshot.len(), "compacted WAL at open");
        }

        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            days: days
                .into_iter()
                .map(|(date, day)| (date, Arc::new(RwLock::new(day))))
                .collect(),
            indexes,
            config: std::sync::RwLock::new(Arc::new(config)),
            admin_actions: Mutex::new(admin_actions),
            wal_tx,
            notify,
            clock: options.clock,
            lock_wait: options.lock_wait,
        };
        info!(events = replayed, days = engine.days.len(), "engine ready");
        Ok(engine)
    }

    /// Current configuration. Operations load it once and work from that snapshot.
    pub fn config(&self) -> Arc<BookingConfig> {
        self.config.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(super) fn replace_config(&self, next: BookingConfig) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalAppend {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// WAL-append + apply. Nothing is applied if the append fails.
    pub(super) async fn persist_and_apply(&self, day: &mut DayState, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_day(day, event, &self.indexes);
        Ok(())
    }

    /// Same as [`persist_and_apply`](Self::persist_and_apply) for an event spanning several locked days.
    pub(super) async fn persist_and_apply_all(&self, days: &mut [DayGuard], event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        for day in days.iter_mut() {
            apply_to_day(day, event, &self.indexes);
        }
        Ok(())
    }

    pub(super) fn day_handle(&self, date: NaiveDate) -> SharedDayState {
        self.days
            .entry(date)
            .or_insert_with(|| Arc::new(RwLock::new(DayState::new(date))))
            .clone()
    }

    pub(super) fn existing_day(&self, date: NaiveDate) -> Option<SharedDayState> {
        self.days.get(&date).map(|e| e.value().clone())
    }

    /// Exclusive access to one day. Waiting longer than the configured lock wait is a contended attempt.
    pub(super) async fn lock_day(&self, date: NaiveDate) -> Result<DayGuard, EngineError> {
        let handle = self.day_handle(date);
        tokio::time::timeout(self.lock_wait, handle.write_owned())
            .await
            .map_err(|_| EngineError::Contended("day lock wait timed out"))
    }

    /// Lookup slot → date, lock that day, and confirm the slot is still there.
    pub(super) async fn lock_slot_day(&self, slot_id: Ulid) -> Result<DayGuard, EngineError> {
        let date = self.slot_date(slot_id).ok_or(EngineError::SlotNotFound(slot_id))?;
        let guard = self.lock_day(date).await?;
        if guard.slot(slot_id).is_none() {
            return Err(EngineError::SlotNotFound(slot_id));
        }
        Ok(guard)
    }

    pub(super) async fn lock_booking_day(&self, booking_id: Ulid) -> Result<DayGuard, EngineError> {
        let date = self
            .booking_date(booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        self.lock_day(date).await
    }

    pub(super) fn slot_date(&self, slot_id: Ulid) -> Option<NaiveDate> {
        self.indexes.slots.get(&slot_id).map(|e| *e.value())
    }

    pub(super) fn booking_date(&self, booking_id: Ulid) -> Option<NaiveDate> {
        self.indexes.bookings.get(&booking_id).map(|e| *e.value())
    }

    /// Run `attempt` until it stops reporting contention, at most `MAX_TX_RETRIES` extra times.
    pub(super) async fn transact<T, F, Fut>(&self, op: &'static str, mut attempt: F) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let mut retries = 0u32;
        loop {
            match attempt().await {
                Err(EngineError::Contended(what)) if retries < MAX_TX_RETRIES => {
                    retries += 1;
                    metrics::counter!(crate::observability::TX_RETRIES_TOTAL, "op" => op).increment(1);
                    warn!(op, retries, "{what}, retrying");
                    tokio::time::sleep(RETRY_BACKOFF * retries).await;
                }
                Err(e) => {
                    metrics::counter!(crate::observability::OPERATIONS_REJECTED_TOTAL, "op" => op, "reason" => e.reason_label())
                        .increment(1);
                    return Err(e);
                }
                ok => return ok,
            }
        }
    }
}
