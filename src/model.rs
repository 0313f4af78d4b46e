use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

/// Signed minute count. Offsets, durations and clock arithmetic all use it.
pub type Minutes = i32;

pub const MINUTES_PER_DAY: Minutes = 24 * 60;

/// Amount in minor currency units. Money never touches floating point.
pub type Amount = u64;

// ── Calendar primitives ──────────────────────────────────────────

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid time of day {0:?}, expected HH:MM")]
pub struct ParseTimeError(pub String);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid date {0:?}, expected YYYY-MM-DD")]
pub struct ParseDateError(pub String);

/// Naive wall-clock time with minute resolution, `00:00..=24:00`.
/// `24:00` only appears as a closing time or a slot end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub const MIDNIGHT: TimeOfDay = TimeOfDay(0);
    pub const END_OF_DAY: TimeOfDay = TimeOfDay(MINUTES_PER_DAY as u16);

    pub fn from_minutes(minutes: Minutes) -> Option<Self> {
        (0..=MINUTES_PER_DAY)
            .contains(&minutes)
            .then_some(Self(minutes as u16))
    }

    pub fn hm(hours: u8, minutes: u8) -> Option<Self> {
        if minutes >= 60 {
            return None;
        }
        Self::from_minutes(hours as Minutes * 60 + minutes as Minutes)
    }

    pub fn minutes(self) -> Minutes {
        self.0 as Minutes
    }

    /// `None` when the result leaves `00:00..=24:00`.
    pub fn checked_add(self, offset: Minutes) -> Option<Self> {
        Self::from_minutes(self.minutes().checked_add(offset)?)
    }

    /// The instant this time falls on for `date` (`24:00` rolls to the next midnight).
    pub fn on(self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(NaiveTime::MIN) + Duration::minutes(self.minutes() as i64)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

impl FromStr for TimeOfDay {
    type Err = ParseTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseTimeError(s.to_string());
        let (h, m) = s.split_once(':').ok_or_else(err)?;
        if h.len() != 2 || m.len() != 2 {
            return Err(err());
        }
        let h: u8 = h.parse().map_err(|_| err())?;
        let m: u8 = m.parse().map_err(|_| err())?;
        if h == 24 && m != 0 {
            return Err(err());
        }
        Self::hm(h, m).ok_or_else(err)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = ParseTimeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(t: TimeOfDay) -> Self {
        t.to_string()
    }
}

/// Parse a strict `YYYY-MM-DD` calendar date.
pub fn parse_date(s: &str) -> Result<NaiveDate, ParseDateError> {
    if s.len() != 10 {
        return Err(ParseDateError(s.to_string()));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| ParseDateError(s.to_string()))
}

// ── Configuration ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantClass {
    Adult,
    Child,
}

impl fmt::Display for ParticipantClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParticipantClass::Adult => f.write_str("adult"),
            ParticipantClass::Child => f.write_str("child"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHours {
    pub open: TimeOfDay,
    pub close: TimeOfDay,
}

/// The venue-wide booking configuration. A single instance exists per engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingConfig {
    /// Keyed by weekday, `0` = Sunday. A missing day is not operated.
    pub working_hours: BTreeMap<u8, WorkingHours>,
    pub slot_interval_minutes: u32,
    pub default_duration: u32,
    pub allowed_durations: BTreeSet<u32>,
    pub max_participants: u32,
    /// `pricing[class][duration] = unit price`.
    pub pricing: BTreeMap<ParticipantClass, BTreeMap<u32, Amount>>,
    pub currency: String,
    pub group_discount_min_size: u32,
    pub group_discount_percent: u32,
    pub booking_horizon_days: u32,
    pub auto_confirm: bool,
    pub reminder_enabled: bool,
    pub reminder_hours_before: u32,
}

impl Default for BookingConfig {
    fn default() -> Self {
        let hours = WorkingHours {
            open: TimeOfDay(10 * 60),
            close: TimeOfDay(22 * 60),
        };
        Self {
            working_hours: (0..7).map(|d| (d, hours)).collect(),
            slot_interval_minutes: 30,
            default_duration: 60,
            allowed_durations: [30, 60, 90].into_iter().collect(),
            max_participants: 8,
            pricing: BTreeMap::from([
                (
                    ParticipantClass::Adult,
                    BTreeMap::from([(30, 150_000), (60, 250_000), (90, 350_000)]),
                ),
                (
                    ParticipantClass::Child,
                    BTreeMap::from([(30, 100_000), (60, 180_000), (90, 250_000)]),
                ),
            ]),
            currency: "RUB".into(),
            group_discount_min_size: 5,
            group_discount_percent: 10,
            booking_horizon_days: 30,
            auto_confirm: true,
            reminder_enabled: true,
            reminder_hours_before: 2,
        }
    }
}

impl BookingConfig {
    /// Shape checks run once on write so reads can trust the config.
    pub fn validate(&self) -> Result<(), String> {
        for (weekday, hours) in &self.working_hours {
            if *weekday > 6 {
                return Err(format!("weekday key {weekday} outside 0..=6"));
            }
            if hours.open >= hours.close {
                return Err(format!("weekday {weekday}: open {} is not before close {}", hours.open, hours.close));
            }
        }
        if self.slot_interval_minutes == 0 {
            return Err("slot interval must be positive".into());
        }
        if self.allowed_durations.is_empty() || self.allowed_durations.contains(&0) {
            return Err("allowed durations must be non-empty and positive".into());
        }
        if !self.allowed_durations.contains(&self.default_duration) {
            return Err(format!("default duration {} is not an allowed duration", self.default_duration));
        }
        if self.default_duration as Minutes > MINUTES_PER_DAY {
            return Err("default duration longer than a day".into());
        }
        if self.unit_price(ParticipantClass::Adult, self.default_duration).is_none() {
            return Err(format!("no adult price for default duration {}", self.default_duration));
        }
        if self.max_participants == 0 {
            return Err("max participants must be positive".into());
        }
        if self.max_participants > crate::limits::MAX_SLOT_CAPACITY {
            return Err(format!(
                "max participants {} above {}",
                self.max_participants,
                crate::limits::MAX_SLOT_CAPACITY
            ));
        }
        if self.group_discount_percent > 100 {
            return Err("group discount percent above 100".into());
        }
        if self.currency.trim().is_empty() {
            return Err("currency must be set".into());
        }
        Ok(())
    }

    pub fn unit_price(&self, class: ParticipantClass, duration: u32) -> Option<Amount> {
        self.pricing.get(&class)?.get(&duration).copied()
    }

    pub fn hours_for_weekday(&self, weekday: u8) -> Option<WorkingHours> {
        self.working_hours.get(&weekday).copied()
    }
}

/// Administrative exception to the weekly schedule for one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleOverride {
    pub date: NaiveDate,
    pub is_closed: bool,
    pub custom_open: Option<TimeOfDay>,
    pub custom_close: Option<TimeOfDay>,
    pub reason: Option<String>,
    pub admin_id: Option<String>,
    pub updated_at: NaiveDateTime,
}

// ── Slots ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Available,
    Limited,
    Booked,
    Blocked,
}

impl SlotStatus {
    /// Occupancy-derived status. `blocked` only surfaces while more than
    /// half the capacity is still free; otherwise occupancy wins.
    pub fn derive(booked: u32, max: u32, is_blocked: bool) -> SlotStatus {
        if booked >= max {
            return SlotStatus::Booked;
        }
        // (max - booked) / max * 100 <= 50, kept in integers.
        if u64::from(max - booked) * 100 <= u64::from(max) * 50 {
            return SlotStatus::Limited;
        }
        if is_blocked {
            SlotStatus::Blocked
        } else {
            SlotStatus::Available
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: Ulid,
    pub date: NaiveDate,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    pub participant_class: ParticipantClass,
    /// Copied from config at generation time; later config edits don't resize it.
    pub max_participants: u32,
    pub booked_participants: u32,
    pub status: SlotStatus,
    pub is_blocked: bool,
    pub blocked_reason: Option<String>,
    /// Start time before the first shift. Set once.
    pub original_start_time: Option<TimeOfDay>,
    pub shift_minutes_total: Minutes,
    pub shift_reason: Option<String>,
}

impl Slot {
    pub fn duration(&self) -> Minutes {
        self.end_time.minutes() - self.start_time.minutes()
    }

    pub fn available_spots(&self) -> u32 {
        self.max_participants.saturating_sub(self.booked_participants)
    }

    pub fn refresh_status(&mut self) {
        self.status = SlotStatus::derive(self.booked_participants, self.max_participants, self.is_blocked);
    }
}

// ── Bookings ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
    NoShow,
}

impl BookingStatus {
    pub fn allowed_transitions(self) -> &'static [BookingStatus] {
        use BookingStatus::*;
        match self {
            Pending => &[Confirmed, Cancelled],
            Confirmed => &[Cancelled, Completed, NoShow],
            Cancelled | Completed | NoShow => &[],
        }
    }

    pub fn can_transition_to(self, to: BookingStatus) -> bool {
        self.allowed_transitions().contains(&to)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Holds capacity on its slot and follows shifts.
    pub fn is_active(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
            BookingStatus::NoShow => "no_show",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    App,
    Widget,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub slot_id: Ulid,
    /// Copied from the slot; shifts keep `start_time` in sync.
    pub date: NaiveDate,
    pub start_time: TimeOfDay,
    pub duration: u32,
    pub participant_class: ParticipantClass,
    pub participant_count: u32,
    pub contact: Contact,
    pub notes: Option<String>,
    pub admin_notes: Option<String>,
    /// External messaging identity of the owner, if any.
    pub user_id: Option<String>,
    pub source: Source,
    pub created_by_admin: Option<String>,
    pub status: BookingStatus,
    pub total_price: Amount,
    pub currency: String,
    pub reminder_sent: bool,
    pub reminder_confirmed: bool,
    pub created_at: NaiveDateTime,
    pub confirmed_at: Option<NaiveDateTime>,
    pub cancelled_at: Option<NaiveDateTime>,
    pub cancel_reason: Option<String>,
}

impl Booking {
    pub fn starts_at(&self) -> NaiveDateTime {
        self.start_time.on(self.date)
    }

    pub fn end_minutes(&self) -> Minutes {
        self.start_time.minutes() + self.duration as Minutes
    }
}

// ── Audit trail ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Created,
    Confirmed,
    Cancelled,
    Shifted,
    Edited,
}

/// Append-only audit record. `details` holds a JSON document as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionLogEntry {
    pub id: Ulid,
    pub booking_id: Option<Ulid>,
    pub action: ActionKind,
    pub admin_id: Option<String>,
    pub details: String,
    pub at: NaiveDateTime,
}

impl ActionLogEntry {
    pub fn new(
        booking_id: Option<Ulid>,
        action: ActionKind,
        admin_id: Option<String>,
        details: serde_json::Value,
        at: NaiveDateTime,
    ) -> Self {
        Self {
            id: Ulid::new(),
            booking_id,
            action,
            admin_id,
            details: details.to_string(),
            at,
        }
    }

    pub fn details_json(&self) -> serde_json::Value {
        serde_json::from_str(&self.details).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftLogEntry {
    pub id: Ulid,
    pub date: NaiveDate,
    pub trigger_slot_id: Ulid,
    pub shift_minutes: Minutes,
    pub reason: String,
    pub cascade: bool,
    pub affected_slot_count: u32,
    pub admin_id: Option<String>,
    pub at: NaiveDateTime,
}

// ── Day partition ────────────────────────────────────────────────

/// Everything the engine knows about one calendar date. The unit of locking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayState {
    pub date: NaiveDate,
    pub schedule_override: Option<ScheduleOverride>,
    /// Sorted by `(start_time, id)`.
    pub slots: Vec<Slot>,
    pub bookings: Vec<Booking>,
    pub actions: Vec<ActionLogEntry>,
    pub shifts: Vec<ShiftLogEntry>,
}

impl DayState {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            schedule_override: None,
            slots: Vec::new(),
            bookings: Vec::new(),
            actions: Vec::new(),
            shifts: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.schedule_override.is_none()
            && self.slots.is_empty()
            && self.bookings.is_empty()
            && self.actions.is_empty()
            && self.shifts.is_empty()
    }

    pub fn slot(&self, id: Ulid) -> Option<&Slot> {
        self.slots.iter().find(|s| s.id == id)
    }

    pub fn slot_mut(&mut self, id: Ulid) -> Option<&mut Slot> {
        self.slots.iter_mut().find(|s| s.id == id)
    }

    pub fn booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    pub fn bookings_for_slot(&self, slot_id: Ulid) -> impl Iterator<Item = &Booking> {
        self.bookings.iter().filter(move |b| b.slot_id == slot_id)
    }

    pub fn sort_slots(&mut self) {
        self.slots.sort_by_key(|s| (s.start_time, s.id));
    }
}

// ── WAL records ──────────────────────────────────────────────────

/// Status transition carried by a booking update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: BookingStatus,
    pub to: BookingStatus,
    pub at: NaiveDateTime,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingEdits {
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
    pub notes: Option<String>,
    pub admin_notes: Option<String>,
}

impl BookingEdits {
    pub fn is_empty(&self) -> bool {
        *self == BookingEdits::default()
    }
}

/// One slot's move within a shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotMove {
    pub slot_id: Ulid,
    pub date: NaiveDate,
    pub old_start: TimeOfDay,
    pub new_start: TimeOfDay,
    pub new_end: TimeOfDay,
}

/// One record per committed operation. Applying a record is infallible and
/// deterministic, so replay rebuilds exactly the committed state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ConfigUpdated {
        config: BookingConfig,
        log: Option<ActionLogEntry>,
    },
    OverrideSet {
        schedule_override: ScheduleOverride,
        purge_slots: bool,
        log: ActionLogEntry,
    },
    SlotsGenerated {
        date: NaiveDate,
        slots: Vec<Slot>,
    },
    SlotBlockChanged {
        slot_id: Ulid,
        date: NaiveDate,
        blocked: bool,
        reason: Option<String>,
        log: ActionLogEntry,
    },
    BookingCreated {
        booking: Booking,
        log: ActionLogEntry,
    },
    BookingUpdated {
        booking_id: Ulid,
        date: NaiveDate,
        status: Option<StatusChange>,
        edits: BookingEdits,
        log: ActionLogEntry,
    },
    ReminderSent {
        booking_id: Ulid,
        date: NaiveDate,
    },
    ReminderAcknowledged {
        booking_id: Ulid,
        date: NaiveDate,
    },
    SlotsShifted {
        shift: ShiftLogEntry,
        moves: Vec<SlotMove>,
        logs: Vec<ActionLogEntry>,
    },
    /// Compaction snapshot of the engine-wide state.
    EngineRestored {
        config: BookingConfig,
        admin_actions: Vec<ActionLogEntry>,
    },
    /// Compaction snapshot of one day.
    DayRestored {
        day: DayState,
    },
}

impl Event {
    /// Dates whose day state this record touches. Empty for engine-wide records.
    pub fn dates(&self) -> Vec<NaiveDate> {
        match self {
            Event::ConfigUpdated { .. } | Event::EngineRestored { .. } => Vec::new(),
            Event::OverrideSet { schedule_override, .. } => vec![schedule_override.date],
            Event::SlotsGenerated { date, .. }
            | Event::SlotBlockChanged { date, .. }
            | Event::BookingUpdated { date, .. }
            | Event::ReminderSent { date, .. }
            | Event::ReminderAcknowledged { date, .. } => vec![*date],
            Event::BookingCreated { booking, .. } => vec![booking.date],
            Event::SlotsShifted { moves, .. } => {
                let mut dates: Vec<NaiveDate> = moves.iter().map(|m| m.date).collect();
                dates.sort();
                dates.dedup();
                dates
            }
            Event::DayRestored { day } => vec![day.date],
        }
    }
}

// ── Requests ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBooking {
    pub slot_id: Ulid,
    pub duration: u32,
    pub participant_count: u32,
    pub contact: Contact,
    pub notes: Option<String>,
    pub user_id: Option<String>,
    pub source: Source,
    pub created_by_admin: Option<String>,
}

/// Admin edit of a booking. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingUpdate {
    pub status: Option<BookingStatus>,
    pub cancel_reason: Option<String>,
    pub edits: BookingEdits,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideRequest {
    pub date: NaiveDate,
    pub is_closed: bool,
    pub custom_open: Option<TimeOfDay>,
    pub custom_close: Option<TimeOfDay>,
    pub reason: Option<String>,
}

/// Admin audit listing filter. A date restricts the listing to that day's
/// entries, so engine-wide entries only show up without one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionFilter {
    pub action: Option<ActionKind>,
    pub date: Option<NaiveDate>,
}

/// One page of audit entries, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionPage {
    pub entries: Vec<ActionLogEntry>,
    /// Matching entries across all pages.
    pub total: usize,
    pub page: u32,
    pub limit: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingFilter {
    pub date: Option<NaiveDate>,
    pub status: Option<BookingStatus>,
    pub user_id: Option<String>,
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub unit_price: Amount,
    pub subtotal: Amount,
    pub group_discount_applied: bool,
    pub discount_percent: u32,
    pub discount_amount: Amount,
    pub total: Amount,
    pub currency: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayStatus {
    Closed,
    Available,
    Limited,
    Booked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySummary {
    pub status: DayStatus,
    pub total_spots: u32,
    pub booked_spots: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotWithBookings {
    pub slot: Slot,
    pub bookings: Vec<Booking>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayOverview {
    pub date: NaiveDate,
    pub total_bookings: u32,
    pub total_participants: u32,
    pub total_revenue: Amount,
    pub occupancy_percent: u32,
    pub slots: Vec<SlotWithBookings>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewSlot {
    pub slot_id: Ulid,
    pub start_time: TimeOfDay,
    pub new_start_time: TimeOfDay,
    pub booking_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftPreview {
    pub trigger_slot: PreviewSlot,
    /// Cascaded slots, trigger excluded, by start time.
    pub affected_slots: Vec<PreviewSlot>,
    pub total_affected: u32,
    pub bookings_affected: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftedSlot {
    pub slot_id: Ulid,
    pub old_start: TimeOfDay,
    pub new_start: TimeOfDay,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftResult {
    pub shift_log_id: Ulid,
    pub affected_slots_count: u32,
    pub shifted_slots: Vec<ShiftedSlot>,
    /// Bookings moved by this shift, as they look after it.
    pub affected_bookings: Vec<Booking>,
}
