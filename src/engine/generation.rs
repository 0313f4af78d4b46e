use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};
use serde_json::json;
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError};

/// Whether `date` lies in `[today, today + horizon]`.
pub fn within_horizon(config: &BookingConfig, today: NaiveDate, date: NaiveDate) -> bool {
    date >= today && date <= today + Duration::days(config.booking_horizon_days as i64)
}

/// Opening hours in force on `date`, or `None` when the venue is closed.
///
/// A weekday without configured hours stays closed whatever the override
/// says, and a closed override wins. Custom hours replace the weekday's
/// bound they name and inherit the other one.
pub fn effective_hours(
    config: &BookingConfig,
    date: NaiveDate,
    schedule_override: Option<&ScheduleOverride>,
) -> Option<WorkingHours> {
    let weekday = config.hours_for_weekday(date.weekday().num_days_from_sunday() as u8)?;
    let hours = match schedule_override {
        Some(o) if o.is_closed => return None,
        Some(o) => WorkingHours {
            open: o.custom_open.unwrap_or(weekday.open),
            close: o.custom_close.unwrap_or(weekday.close),
        },
        None => weekday,
    };
    (hours.open < hours.close).then_some(hours)
}

/// Lay out full-length slots from opening time at the configured cadence.
/// A slot that would run past closing ends the walk; nothing is truncated.
pub fn generate_day_slots(config: &BookingConfig, date: NaiveDate, hours: WorkingHours) -> Vec<Slot> {
    let interval = config.slot_interval_minutes as Minutes;
    let duration = config.default_duration as Minutes;
    let close = hours.close.minutes();
    let mut slots = Vec::new();
    if interval <= 0 || duration <= 0 {
        return slots;
    }

    let mut start = hours.open.minutes();
    while start + duration <= close {
        let (Some(start_time), Some(end_time)) =
            (TimeOfDay::from_minutes(start), TimeOfDay::from_minutes(start + duration))
        else {
            break;
        };
        let mut slot = Slot {
            id: Ulid::new(),
            date,
            start_time,
            end_time,
            participant_class: ParticipantClass::Adult,
            max_participants: config.max_participants,
            booked_participants: 0,
            status: SlotStatus::Available,
            is_blocked: false,
            blocked_reason: None,
            original_start_time: None,
            shift_minutes_total: 0,
            shift_reason: None,
        };
        slot.refresh_status();
        slots.push(slot);
        start += interval;
    }
    slots
}

impl Engine {
    /// Slots for `date`, generated on first request and reused afterwards.
    /// Outside the booking horizon, on closed days and on unoperated weekdays
    /// the list is empty, and callers read empty as closed.
    pub async fn get_slots_for_date(&self, date: NaiveDate) -> Result<Vec<Slot>, EngineError> {
        let config = self.config();
        if !within_horizon(&config, self.clock.today(), date) {
            return Ok(Vec::new());
        }

        if let Some(handle) = self.existing_day(date) {
            let day = handle.read().await;
            if !day.slots.is_empty() {
                return Ok(day.slots.clone());
            }
        }

        let config: &BookingConfig = &config;
        self.transact("generate_slots", move || self.generate_locked(date, config))
            .await
    }

    async fn generate_locked(&self, date: NaiveDate, config: &BookingConfig) -> Result<Vec<Slot>, EngineError> {
        let mut day = self.lock_day(date).await?;
        // Another request may have generated while we waited.
        if !day.slots.is_empty() {
            return Ok(day.slots.clone());
        }
        let Some(hours) = effective_hours(config, date, day.schedule_override.as_ref()) else {
            return Ok(Vec::new());
        };
        let slots = generate_day_slots(config, date, hours);
        if slots.is_empty() {
            return Ok(Vec::new());
        }
        if slots.len() > MAX_SLOTS_PER_DAY {
            return Err(EngineError::LimitExceeded("too many slots for one day"));
        }

        let count = slots.len();
        let event = Event::SlotsGenerated { date, slots };
        self.persist_and_apply(&mut day, &event).await?;
        metrics::counter!(crate::observability::SLOTS_GENERATED_TOTAL).increment(count as u64);
        info!(%date, count, "generated slots");
        Ok(day.slots.clone())
    }

    /// Per-date occupancy summary over `[from, to]`. Dates outside the
    /// horizon are left out; closed or empty dates report `closed`.
    pub async fn get_schedule_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, DaySummary>, EngineError> {
        if from > to {
            return Err(EngineError::Validation(format!("range start {from} is after end {to}")));
        }
        if (to - from).num_days() >= MAX_SCHEDULE_RANGE_DAYS {
            return Err(EngineError::LimitExceeded("schedule range too long"));
        }

        let config = self.config();
        let today = self.clock.today();
        let mut result = BTreeMap::new();
        for date in from.iter_days().take_while(|d| *d <= to) {
            if !within_horizon(&config, today, date) {
                continue;
            }
            let closed_by_override = match self.existing_day(date) {
                Some(handle) => handle
                    .read()
                    .await
                    .schedule_override
                    .as_ref()
                    .is_some_and(|o| o.is_closed),
                None => false,
            };
            let slots = if closed_by_override {
                Vec::new()
            } else {
                self.get_slots_for_date(date).await?
            };
            result.insert(date, summarize_day(&slots));
        }
        Ok(result)
    }

    /// Create or replace the override for a date. Closing a date removes its
    /// slots only when none of its bookings is still live.
    pub async fn set_schedule_override(
        &self,
        request: &OverrideRequest,
        admin_id: Option<&str>,
    ) -> Result<ScheduleOverride, EngineError> {
        if let Some(reason) = &request.reason
            && reason.len() > MAX_REASON_LEN
        {
            return Err(EngineError::LimitExceeded("override reason too long"));
        }
        if let (Some(open), Some(close)) = (request.custom_open, request.custom_close)
            && open >= close
        {
            return Err(EngineError::Validation(format!(
                "custom open {open} is not before custom close {close}"
            )));
        }

        self.transact("set_schedule_override", move || self.override_locked(request, admin_id))
            .await
    }

    async fn override_locked(
        &self,
        request: &OverrideRequest,
        admin_id: Option<&str>,
    ) -> Result<ScheduleOverride, EngineError> {
        let date = request.date;
        let mut day = self.lock_day(date).await?;
        let now = self.clock.now();
        let live_bookings = day
            .bookings
            .iter()
            .filter(|b| b.status != BookingStatus::Cancelled)
            .count();
        let purge_slots = request.is_closed && live_bookings == 0 && !day.slots.is_empty();

        let schedule_override = ScheduleOverride {
            date,
            is_closed: request.is_closed,
            custom_open: request.custom_open,
            custom_close: request.custom_close,
            reason: request.reason.clone(),
            admin_id: admin_id.map(str::to_string),
            updated_at: now,
        };
        let log = ActionLogEntry::new(
            None,
            ActionKind::Edited,
            admin_id.map(str::to_string),
            json!({
                "type": "schedule_override",
                "date": date,
                "is_closed": request.is_closed,
                "custom_open": request.custom_open,
                "custom_close": request.custom_close,
                "reason": request.reason,
                "slots_removed": if purge_slots { day.slots.len() } else { 0 },
            }),
            now,
        );
        let event = Event::OverrideSet {
            schedule_override: schedule_override.clone(),
            purge_slots,
            log,
        };
        self.persist_and_apply(&mut day, &event).await?;
        info!(%date, closed = request.is_closed, purge_slots, "schedule override set");
        Ok(schedule_override)
    }

    pub async fn get_schedule_override(&self, date: NaiveDate) -> Result<ScheduleOverride, EngineError> {
        let handle = self.existing_day(date).ok_or(EngineError::OverrideNotFound(date))?;
        let day = handle.read().await;
        day.schedule_override
            .clone()
            .ok_or(EngineError::OverrideNotFound(date))
    }

    /// Overrides dated within `[from, to]`, by date.
    pub async fn list_schedule_overrides(&self, from: NaiveDate, to: NaiveDate) -> Vec<ScheduleOverride> {
        let mut handles: Vec<_> = self
            .days
            .iter()
            .filter(|e| *e.key() >= from && *e.key() <= to)
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        handles.sort_by_key(|(date, _)| *date);

        let mut overrides = Vec::new();
        for (_, handle) in handles {
            if let Some(o) = &handle.read().await.schedule_override {
                overrides.push(o.clone());
            }
        }
        overrides
    }
}

fn summarize_day(slots: &[Slot]) -> DaySummary {
    if slots.is_empty() {
        return DaySummary {
            status: DayStatus::Closed,
            total_spots: 0,
            booked_spots: 0,
        };
    }
    let total: u64 = slots.iter().map(|s| u64::from(s.max_participants)).sum();
    let booked: u64 = slots.iter().map(|s| u64::from(s.booked_participants)).sum();
    let total_spots = u32::try_from(total).unwrap_or(u32::MAX);
    let booked_spots = u32::try_from(booked).unwrap_or(u32::MAX);
    let status = if booked >= total {
        DayStatus::Booked
    } else if (total - booked) * 100 <= total * 50 {
        DayStatus::Limited
    } else {
        DayStatus::Available
    };
    DaySummary {
        status,
        total_spots,
        booked_spots,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    fn config() -> BookingConfig {
        BookingConfig {
            working_hours: [1u8, 2, 3, 4, 5]
                .into_iter()
                .map(|d| (d, WorkingHours { open: t("09:00"), close: t("18:00") }))
                .collect(),
            slot_interval_minutes: 30,
            default_duration: 60,
            allowed_durations: [60, 90].into_iter().collect(),
            max_participants: 4,
            ..BookingConfig::default()
        }
    }

    fn date(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    #[test]
    fn generates_full_length_slots_only() {
        let cfg = config();
        let d = date("2025-06-10");
        let hours = effective_hours(&cfg, d, None).unwrap();
        let slots = generate_day_slots(&cfg, d, hours);
        let starts: Vec<String> = slots.iter().map(|s| s.start_time.to_string()).collect();
        assert_eq!(starts.first().map(String::as_str), Some("09:00"));
        assert_eq!(starts.last().map(String::as_str), Some("17:00"));
        assert_eq!(slots.len(), 17);
        assert!(!starts.contains(&"17:30".to_string()));
        for slot in &slots {
            assert_eq!(slot.duration(), 60);
            assert_eq!(slot.max_participants, 4);
            assert_eq!(slot.status, SlotStatus::Available);
            assert_eq!(slot.participant_class, ParticipantClass::Adult);
        }
    }

    #[test]
    fn walk_stops_when_interval_overshoots_close() {
        let cfg = BookingConfig {
            slot_interval_minutes: 45,
            default_duration: 90,
            allowed_durations: [90].into_iter().collect(),
            ..config()
        };
        let d = date("2025-06-10");
        let hours = WorkingHours { open: t("10:00"), close: t("13:00") };
        let slots = generate_day_slots(&cfg, d, hours);
        let starts: Vec<String> = slots.iter().map(|s| s.start_time.to_string()).collect();
        // 10:00, 10:45, 11:30 (ends 13:00); 12:15 would end 13:45
        assert_eq!(starts, ["10:00", "10:45", "11:30"]);
    }

    #[test]
    fn unconfigured_weekday_is_closed() {
        // 2025-06-08 is a Sunday
        assert_eq!(effective_hours(&config(), date("2025-06-08"), None), None);
    }

    #[test]
    fn override_hours_and_closure() {
        let cfg = config();
        let d = date("2025-06-10");
        let mut o = ScheduleOverride {
            date: d,
            is_closed: false,
            custom_open: Some(t("12:00")),
            custom_close: None,
            reason: None,
            admin_id: None,
            updated_at: d.and_hms_opt(0, 0, 0).unwrap(),
        };
        assert_eq!(
            effective_hours(&cfg, d, Some(&o)),
            Some(WorkingHours { open: t("12:00"), close: t("18:00") })
        );
        o.is_closed = true;
        assert_eq!(effective_hours(&cfg, d, Some(&o)), None);

        // custom hours never open an unoperated weekday
        let sunday = date("2025-06-08");
        let o = ScheduleOverride {
            date: sunday,
            is_closed: false,
            custom_open: Some(t("10:00")),
            custom_close: Some(t("12:00")),
            ..o
        };
        assert_eq!(effective_hours(&cfg, sunday, Some(&o)), None);
        let o = ScheduleOverride { custom_close: None, ..o };
        assert_eq!(effective_hours(&cfg, sunday, Some(&o)), None);
    }

    #[test]
    fn horizon_is_inclusive() {
        let cfg = BookingConfig { booking_horizon_days: 3, ..config() };
        let today = date("2025-06-09");
        assert!(within_horizon(&cfg, today, today));
        assert!(within_horizon(&cfg, today, date("2025-06-12")));
        assert!(!within_horizon(&cfg, today, date("2025-06-13")));
        assert!(!within_horizon(&cfg, today, date("2025-06-08")));
    }

    #[test]
    fn day_summary_uses_half_capacity_rule() {
        let cfg = config();
        let d = date("2025-06-10");
        let hours = WorkingHours { open: t("09:00"), close: t("11:00") };
        let mut slots = generate_day_slots(&cfg, d, hours);
        assert_eq!(slots.len(), 3);
        assert_eq!(summarize_day(&slots).status, DayStatus::Available);

        slots[0].booked_participants = 4;
        slots[1].booked_participants = 2;
        let summary = summarize_day(&slots);
        assert_eq!((summary.total_spots, summary.booked_spots), (12, 6));
        assert_eq!(summary.status, DayStatus::Limited);

        slots[2].booked_participants = 4;
        slots[1].booked_participants = 4;
        assert_eq!(summarize_day(&slots).status, DayStatus::Booked);
        assert_eq!(summarize_day(&[]).status, DayStatus::Closed);
    }

    #[test]
    fn day_summary_survives_huge_capacity() {
        let cfg = BookingConfig { max_participants: 3_000_000_000, ..config() };
        let hours = WorkingHours { open: t("09:00"), close: t("11:00") };
        let slots = generate_day_slots(&cfg, date("2025-06-10"), hours);
        let summary = summarize_day(&slots);
        assert_eq!(summary.status, DayStatus::Available);
        assert_eq!(summary.total_spots, u32::MAX);
    }
}
