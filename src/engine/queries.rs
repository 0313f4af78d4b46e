use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use ulid::Ulid;

use crate::limits::{DEFAULT_ACTION_PAGE_SIZE, MAX_ACTION_PAGE_SIZE};
use crate::model::*;

use super::pricing::calculate_price;
use super::{Engine, EngineError, SharedDayState};

/// Minutes past the booked end before a confirmed session counts as done.
pub const COMPLETION_GRACE_MINUTES: Minutes = 30;

/// A confirmed, not yet reminded booking dated today or tomorrow that starts
/// within `(now, now + hours_before]`.
pub fn reminder_due(booking: &Booking, now: NaiveDateTime, hours_before: u32) -> bool {
    if booking.status != BookingStatus::Confirmed || booking.reminder_sent {
        return false;
    }
    let today = now.date();
    if booking.date != today && booking.date != today + Duration::days(1) {
        return false;
    }
    let starts_at = booking.starts_at();
    now < starts_at && starts_at <= now + Duration::hours(hours_before as i64)
}

/// A confirmed booking dated today whose end plus the grace period is behind `now`.
pub fn completion_due(booking: &Booking, now: NaiveDateTime) -> bool {
    if booking.status != BookingStatus::Confirmed || booking.date != now.date() {
        return false;
    }
    let now_minutes = (now.hour() * 60 + now.minute()) as Minutes;
    booking.end_minutes() + COMPLETION_GRACE_MINUTES < now_minutes
}

impl Engine {
    pub fn get_config(&self) -> Arc<BookingConfig> {
        self.config()
    }

    pub fn calculate_price(&self, class: ParticipantClass, duration: u32, count: u32) -> Result<PriceQuote, EngineError> {
        calculate_price(&self.config(), class, duration, count)
    }

    pub async fn get_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        let date = self.booking_date(id).ok_or(EngineError::BookingNotFound(id))?;
        let handle = self.existing_day(date).ok_or(EngineError::BookingNotFound(id))?;
        let day = handle.read().await;
        day.booking(id).cloned().ok_or(EngineError::BookingNotFound(id))
    }

    pub async fn get_slot(&self, id: Ulid) -> Result<Slot, EngineError> {
        let date = self.slot_date(id).ok_or(EngineError::SlotNotFound(id))?;
        let handle = self.existing_day(date).ok_or(EngineError::SlotNotFound(id))?;
        let day = handle.read().await;
        day.slot(id).cloned().ok_or(EngineError::SlotNotFound(id))
    }

    /// Day handles in date order, optionally restricted to one date.
    fn day_handles(&self, date: Option<NaiveDate>) -> Vec<SharedDayState> {
        if let Some(date) = date {
            return self.existing_day(date).into_iter().collect();
        }
        let mut handles: Vec<(NaiveDate, SharedDayState)> =
            self.days.iter().map(|e| (*e.key(), e.value().clone())).collect();
        handles.sort_by_key(|(date, _)| *date);
        handles.into_iter().map(|(_, h)| h).collect()
    }

    /// Bookings matching `filter`, by date then start time.
    pub async fn list_bookings(&self, filter: &BookingFilter) -> Vec<Booking> {
        let mut out = Vec::new();
        for handle in self.day_handles(filter.date) {
            let day = handle.read().await;
            out.extend(
                day.bookings
                    .iter()
                    .filter(|b| filter.status.is_none_or(|s| b.status == s))
                    .filter(|b| filter.user_id.as_deref().is_none_or(|u| b.user_id.as_deref() == Some(u)))
                    .cloned(),
            );
        }
        out.sort_by_key(|b| (b.date, b.start_time, b.created_at));
        out
    }

    /// Audit trail of one booking, oldest first.
    pub async fn get_action_log(&self, booking_id: Ulid) -> Result<Vec<ActionLogEntry>, EngineError> {
        let date = self
            .booking_date(booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        let Some(handle) = self.existing_day(date) else {
            return Ok(Vec::new());
        };
        let day = handle.read().await;
        Ok(day
            .actions
            .iter()
            .filter(|a| a.booking_id == Some(booking_id))
            .cloned()
            .collect())
    }

    /// Slot-level entries (overrides, blocks) for one date.
    pub async fn get_day_actions(&self, date: NaiveDate) -> Vec<ActionLogEntry> {
        match self.existing_day(date) {
            Some(handle) => handle
                .read()
                .await
                .actions
                .iter()
                .filter(|a| a.booking_id.is_none())
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Audit entries across every day plus the engine-wide list, newest first.
    /// `page` counts from 1; `limit` 0 means the default page size and is capped.
    pub async fn list_actions(&self, filter: &ActionFilter, page: u32, limit: u32) -> ActionPage {
        let page = page.max(1);
        let limit = match limit {
            0 => DEFAULT_ACTION_PAGE_SIZE,
            n => n.min(MAX_ACTION_PAGE_SIZE),
        };
        let wanted = |a: &ActionLogEntry| filter.action.is_none_or(|kind| a.action == kind);

        let mut all = Vec::new();
        for handle in self.day_handles(filter.date) {
            let day = handle.read().await;
            all.extend(day.actions.iter().filter(|a| wanted(*a)).cloned());
        }
        if filter.date.is_none() {
            all.extend(self.admin_actions.lock().await.iter().filter(|a| wanted(*a)).cloned());
        }
        all.sort_by(|a, b| b.at.cmp(&a.at).then_with(|| b.id.cmp(&a.id)));

        let total = all.len();
        let offset = (page as usize - 1).saturating_mul(limit as usize);
        let entries = all.into_iter().skip(offset).take(limit as usize).collect();
        ActionPage {
            entries,
            total,
            page,
            limit,
        }
    }

    /// Engine-wide entries such as configuration changes.
    pub async fn get_admin_actions(&self) -> Vec<ActionLogEntry> {
        self.admin_actions.lock().await.clone()
    }

    /// Dashboard view of one date from what is stored. Never generates slots.
    pub async fn get_day_overview(&self, date: NaiveDate) -> DayOverview {
        let mut overview = DayOverview {
            date,
            total_bookings: 0,
            total_participants: 0,
            total_revenue: 0,
            occupancy_percent: 0,
            slots: Vec::new(),
        };
        let Some(handle) = self.existing_day(date) else {
            return overview;
        };
        let day = handle.read().await;

        for booking in day.bookings.iter().filter(|b| b.status != BookingStatus::Cancelled) {
            overview.total_bookings += 1;
            overview.total_participants += booking.participant_count;
            overview.total_revenue += booking.total_price;
        }
        let capacity: u64 = day.slots.iter().map(|s| u64::from(s.max_participants)).sum();
        let booked: u64 = day.slots.iter().map(|s| u64::from(s.booked_participants)).sum();
        if capacity > 0 {
            overview.occupancy_percent = u32::try_from(booked * 100 / capacity).unwrap_or(u32::MAX);
        }
        overview.slots = day
            .slots
            .iter()
            .map(|slot| SlotWithBookings {
                slot: slot.clone(),
                bookings: day
                    .bookings_for_slot(slot.id)
                    .filter(|b| b.status != BookingStatus::Cancelled)
                    .cloned()
                    .collect(),
            })
            .collect();
        overview
    }

    /// Bookings the reminder pass should act on at `now`.
    pub async fn reminder_candidates(&self, now: NaiveDateTime) -> Vec<Booking> {
        let hours_before = self.config().reminder_hours_before;
        let today = now.date();
        let mut out = Vec::new();
        for date in [today, today + Duration::days(1)] {
            let Some(handle) = self.existing_day(date) else {
                continue;
            };
            let day = handle.read().await;
            out.extend(
                day.bookings
                    .iter()
                    .filter(|b| reminder_due(b, now, hours_before))
                    .cloned(),
            );
        }
        out
    }

    /// Bookings the auto-completion pass should close at `now`.
    pub async fn completion_candidates(&self, now: NaiveDateTime) -> Vec<Booking> {
        let Some(handle) = self.existing_day(now.date()) else {
            return Vec::new();
        };
        let day = handle.read().await;
        day.bookings
            .iter()
            .filter(|b| completion_due(b, now))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking_at(date: &str, start: &str, duration: u32) -> Booking {
        let date = parse_date(date).unwrap();
        Booking {
            id: Ulid::new(),
            slot_id: Ulid::new(),
            date,
            start_time: start.parse().unwrap(),
            duration,
            participant_class: ParticipantClass::Adult,
            participant_count: 1,
            contact: Contact {
                name: "Ann".into(),
                phone: "+100".into(),
                email: None,
            },
            notes: None,
            admin_notes: None,
            user_id: None,
            source: Source::Widget,
            created_by_admin: None,
            status: BookingStatus::Confirmed,
            total_price: 1000,
            currency: "RUB".into(),
            reminder_sent: false,
            reminder_confirmed: false,
            created_at: date.and_hms_opt(0, 0, 0).unwrap(),
            confirmed_at: None,
            cancelled_at: None,
            cancel_reason: None,
        }
    }

    fn at(date: &str, h: u32, m: u32) -> NaiveDateTime {
        parse_date(date).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn reminder_window_is_half_open() {
        let b = booking_at("2025-06-10", "12:00", 60);
        assert!(!reminder_due(&b, at("2025-06-10", 9, 59), 2));
        assert!(reminder_due(&b, at("2025-06-10", 10, 0), 2));
        assert!(reminder_due(&b, at("2025-06-10", 11, 59), 2));
        assert!(!reminder_due(&b, at("2025-06-10", 12, 0), 2));
    }

    #[test]
    fn reminder_reaches_past_midnight() {
        let b = booking_at("2025-06-11", "00:30", 60);
        assert!(reminder_due(&b, at("2025-06-10", 23, 0), 2));
        let later = booking_at("2025-06-12", "00:30", 60);
        assert!(!reminder_due(&later, at("2025-06-10", 23, 0), 48));
    }

    #[test]
    fn reminder_skips_sent_and_unconfirmed() {
        let mut b = booking_at("2025-06-10", "12:00", 60);
        b.reminder_sent = true;
        assert!(!reminder_due(&b, at("2025-06-10", 11, 0), 2));
        b.reminder_sent = false;
        b.status = BookingStatus::Pending;
        assert!(!reminder_due(&b, at("2025-06-10", 11, 0), 2));
    }

    #[test]
    fn completion_needs_grace_period() {
        // ends 11:00, due strictly after 11:30
        let b = booking_at("2025-06-10", "10:00", 60);
        assert!(!completion_due(&b, at("2025-06-10", 11, 30)));
        assert!(completion_due(&b, at("2025-06-10", 11, 31)));
        assert!(!completion_due(&b, at("2025-06-11", 11, 31)));
        let mut cancelled = b.clone();
        cancelled.status = BookingStatus::Cancelled;
        assert!(!completion_due(&cancelled, at("2025-06-10", 23, 0)));
    }
}
