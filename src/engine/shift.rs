use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use serde_json::json;
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::notify::BookingNotice;

use super::{DayGuard, Engine, EngineError};

fn validate_shift(minutes: Minutes, reason: &str) -> Result<(), EngineError> {
    if minutes == 0 {
        return Err(EngineError::Validation("shift offset must be non-zero".into()));
    }
    if minutes.abs() > MAX_SHIFT_MINUTES {
        return Err(EngineError::LimitExceeded("shift offset too large"));
    }
    if reason.trim().is_empty() {
        return Err(EngineError::Validation("shift reason is required".into()));
    }
    if reason.len() > MAX_REASON_LEN {
        return Err(EngineError::LimitExceeded("shift reason too long"));
    }
    Ok(())
}

/// Where `slot` lands after moving by `minutes`, duration preserved.
fn plan_move(slot: &Slot, minutes: Minutes) -> Result<SlotMove, EngineError> {
    let out_of_day = || {
        EngineError::Validation(format!(
            "shifting slot {} at {} by {minutes} minutes leaves the day",
            slot.id, slot.start_time
        ))
    };
    let new_start = slot.start_time.checked_add(minutes).ok_or_else(out_of_day)?;
    let new_end = new_start.checked_add(slot.duration()).ok_or_else(out_of_day)?;
    Ok(SlotMove {
        slot_id: slot.id,
        date: slot.date,
        old_start: slot.start_time,
        new_start,
        new_end,
    })
}

/// The trigger plus, when cascading, every same-date slot starting at or after it.
fn cascade_targets(day: &DayState, trigger: &Slot, cascade: bool) -> Vec<Slot> {
    if !cascade {
        return vec![trigger.clone()];
    }
    // day.slots is kept sorted by start time
    day.slots
        .iter()
        .filter(|s| s.start_time >= trigger.start_time)
        .cloned()
        .collect()
}

fn confirmed_count(day: &DayState, slot_id: Ulid) -> u32 {
    day.bookings_for_slot(slot_id)
        .filter(|b| b.status == BookingStatus::Confirmed)
        .count() as u32
}

/// Per-booking `shifted` audit entries for every active booking on a moved slot.
fn booking_logs(
    day: &DayState,
    mv: &SlotMove,
    minutes: Minutes,
    reason: &str,
    admin_id: Option<&str>,
    at: chrono::NaiveDateTime,
) -> Vec<ActionLogEntry> {
    day.bookings_for_slot(mv.slot_id)
        .filter(|b| b.status.is_active())
        .map(|b| {
            ActionLogEntry::new(
                Some(b.id),
                ActionKind::Shifted,
                admin_id.map(str::to_string),
                json!({
                    "slot_id": mv.slot_id.to_string(),
                    "old_start_time": mv.old_start,
                    "new_start_time": mv.new_start,
                    "shift_minutes": minutes,
                    "reason": reason,
                }),
                at,
            )
        })
        .collect()
}

impl Engine {
    /// What `shift_slot` would do, computed under a shared lock. Advisory:
    /// the day may change before the real shift runs.
    pub async fn preview_shift(&self, slot_id: Ulid, minutes: Minutes, cascade: bool) -> Result<ShiftPreview, EngineError> {
        if minutes.abs() > MAX_SHIFT_MINUTES {
            return Err(EngineError::LimitExceeded("shift offset too large"));
        }
        let date = self.slot_date(slot_id).ok_or(EngineError::SlotNotFound(slot_id))?;
        let handle = self.existing_day(date).ok_or(EngineError::SlotNotFound(slot_id))?;
        let day = handle.read().await;
        let trigger = day.slot(slot_id).ok_or(EngineError::SlotNotFound(slot_id))?;

        let preview_of = |slot: &Slot| -> Result<PreviewSlot, EngineError> {
            let mv = plan_move(slot, minutes)?;
            Ok(PreviewSlot {
                slot_id: slot.id,
                start_time: slot.start_time,
                new_start_time: mv.new_start,
                booking_count: confirmed_count(&day, slot.id),
            })
        };

        let trigger_slot = preview_of(trigger)?;
        let affected_slots = cascade_targets(&day, trigger, cascade)
            .iter()
            .filter(|s| s.id != slot_id)
            .map(preview_of)
            .collect::<Result<Vec<_>, _>>()?;
        let bookings_affected =
            trigger_slot.booking_count + affected_slots.iter().map(|s| s.booking_count).sum::<u32>();

        Ok(ShiftPreview {
            total_affected: affected_slots.len() as u32 + 1,
            bookings_affected,
            trigger_slot,
            affected_slots,
        })
    }

    /// Move a slot (and with `cascade`, every later slot that day) by `minutes`,
    /// carrying active bookings along. All or nothing.
    pub async fn shift_slot(
        &self,
        slot_id: Ulid,
        minutes: Minutes,
        reason: &str,
        cascade: bool,
        admin_id: Option<&str>,
    ) -> Result<ShiftResult, EngineError> {
        validate_shift(minutes, reason)?;
        let result = self
            .transact("shift_slot", move || {
                self.shift_locked(slot_id, minutes, reason, cascade, admin_id)
            })
            .await?;
        self.after_shift(&result, minutes, reason);
        Ok(result)
    }

    async fn shift_locked(
        &self,
        slot_id: Ulid,
        minutes: Minutes,
        reason: &str,
        cascade: bool,
        admin_id: Option<&str>,
    ) -> Result<ShiftResult, EngineError> {
        let mut day = self.lock_slot_day(slot_id).await?;
        let trigger = day.slot(slot_id).ok_or(EngineError::SlotNotFound(slot_id))?;
        let moves = cascade_targets(&day, trigger, cascade)
            .iter()
            .map(|s| plan_move(s, minutes))
            .collect::<Result<Vec<_>, _>>()?;

        let now = self.clock.now();
        let logs: Vec<ActionLogEntry> = moves
            .iter()
            .flat_map(|mv| booking_logs(&day, mv, minutes, reason, admin_id, now))
            .collect();
        let shift = ShiftLogEntry {
            id: Ulid::new(),
            date: day.date,
            trigger_slot_id: slot_id,
            shift_minutes: minutes,
            reason: reason.to_string(),
            cascade,
            affected_slot_count: moves.len() as u32,
            admin_id: admin_id.map(str::to_string),
            at: now,
        };
        let event = Event::SlotsShifted { shift, moves, logs };
        self.persist_and_apply(&mut day, &event).await?;
        Ok(shift_result(std::slice::from_ref(&day), &event))
    }

    /// Shift an explicit set of slots, possibly across dates, in one atomic unit.
    /// Duplicate ids count once; an unknown id fails the whole call.
    pub async fn bulk_shift_slots(
        &self,
        slot_ids: &[Ulid],
        minutes: Minutes,
        reason: &str,
        admin_id: Option<&str>,
    ) -> Result<ShiftResult, EngineError> {
        validate_shift(minutes, reason)?;
        if slot_ids.is_empty() {
            return Err(EngineError::Validation("no slots specified".into()));
        }
        if slot_ids.len() > MAX_BULK_SHIFT_SLOTS {
            return Err(EngineError::LimitExceeded("too many slots in bulk shift"));
        }
        let mut seen = HashSet::new();
        let ids: Vec<Ulid> = slot_ids.iter().copied().filter(|id| seen.insert(*id)).collect();
        let ids = &ids[..];

        let result = self
            .transact("bulk_shift_slots", move || self.bulk_shift_locked(ids, minutes, reason, admin_id))
            .await?;
        self.after_shift(&result, minutes, reason);
        Ok(result)
    }

    async fn bulk_shift_locked(
        &self,
        ids: &[Ulid],
        minutes: Minutes,
        reason: &str,
        admin_id: Option<&str>,
    ) -> Result<ShiftResult, EngineError> {
        let mut by_date: BTreeMap<NaiveDate, Vec<Ulid>> = BTreeMap::new();
        for id in ids {
            let date = self.slot_date(*id).ok_or(EngineError::SlotNotFound(*id))?;
            by_date.entry(date).or_default().push(*id);
        }

        // Acquire day locks in date order to prevent deadlocks.
        let mut guards: Vec<DayGuard> = Vec::with_capacity(by_date.len());
        for date in by_date.keys() {
            guards.push(self.lock_day(*date).await?);
        }

        let now = self.clock.now();
        let mut moves = Vec::with_capacity(ids.len());
        let mut logs = Vec::new();
        for (day, day_ids) in guards.iter().zip(by_date.values()) {
            let mut day_moves = day_ids
                .iter()
                .map(|id| {
                    let slot = day.slot(*id).ok_or(EngineError::SlotNotFound(*id))?;
                    plan_move(slot, minutes)
                })
                .collect::<Result<Vec<_>, _>>()?;
            day_moves.sort_by_key(|mv| mv.old_start);
            for mv in &day_moves {
                logs.extend(booking_logs(day, mv, minutes, reason, admin_id, now));
            }
            moves.extend(day_moves);
        }

        let trigger_slot_id = ids[0];
        let shift = ShiftLogEntry {
            id: Ulid::new(),
            date: self.slot_date(trigger_slot_id).ok_or(EngineError::SlotNotFound(trigger_slot_id))?,
            trigger_slot_id,
            shift_minutes: minutes,
            reason: reason.to_string(),
            cascade: false,
            affected_slot_count: moves.len() as u32,
            admin_id: admin_id.map(str::to_string),
            at: now,
        };
        let event = Event::SlotsShifted { shift, moves, logs };
        self.persist_and_apply_all(&mut guards, &event).await?;
        Ok(shift_result(&guards, &event))
    }

    fn after_shift(&self, result: &ShiftResult, minutes: Minutes, reason: &str) {
        metrics::counter!(crate::observability::SLOTS_SHIFTED_TOTAL).increment(result.affected_slots_count as u64);
        info!(
            shift = %result.shift_log_id,
            slots = result.affected_slots_count,
            bookings = result.affected_bookings.len(),
            minutes,
            "slots shifted"
        );
        let old_starts: HashMap<Ulid, TimeOfDay> = result
            .shifted_slots
            .iter()
            .map(|s| (s.slot_id, s.old_start))
            .collect();
        for booking in &result.affected_bookings {
            let Some(old_start) = old_starts.get(&booking.slot_id) else {
                continue;
            };
            self.notify.send(BookingNotice::Shifted {
                booking: booking.clone(),
                old_start: *old_start,
                minutes,
                reason: reason.to_string(),
            });
        }
    }

    /// Shift log entries touching `date`, oldest first.
    pub async fn get_shift_history(&self, date: NaiveDate) -> Vec<ShiftLogEntry> {
        match self.existing_day(date) {
            Some(handle) => handle.read().await.shifts.clone(),
            None => Vec::new(),
        }
    }
}

/// Summarize an applied `SlotsShifted` event from the (already updated) days.
fn shift_result<D: std::ops::Deref<Target = DayState>>(days: &[D], event: &Event) -> ShiftResult {
    let Event::SlotsShifted { shift, moves, logs } = event else {
        return ShiftResult {
            shift_log_id: Ulid::nil(),
            affected_slots_count: 0,
            shifted_slots: Vec::new(),
            affected_bookings: Vec::new(),
        };
    };
    let booking_ids: HashSet<Ulid> = logs.iter().filter_map(|l| l.booking_id).collect();
    let affected_bookings = days
        .iter()
        .flat_map(|day| day.bookings.iter())
        .filter(|b| booking_ids.contains(&b.id))
        .cloned()
        .collect();
    ShiftResult {
        shift_log_id: shift.id,
        affected_slots_count: moves.len() as u32,
        shifted_slots: moves
            .iter()
            .map(|mv| ShiftedSlot {
                slot_id: mv.slot_id,
                old_start: mv.old_start,
                new_start: mv.new_start,
            })
            .collect(),
        affected_bookings,
    }
}
