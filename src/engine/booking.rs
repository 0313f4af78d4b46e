use std::sync::Arc;

use chrono::NaiveDateTime;
use serde_json::json;
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::notify::BookingNotice;

use super::pricing::calculate_price;
use super::{Engine, EngineError};

fn check_len(value: Option<&str>, max: usize, what: &'static str) -> Result<(), EngineError> {
    match value {
        Some(v) if v.len() > max => Err(EngineError::LimitExceeded(what)),
        _ => Ok(()),
    }
}

fn validate_new_booking(config: &BookingConfig, req: &NewBooking) -> Result<(), EngineError> {
    if req.participant_count == 0 {
        return Err(EngineError::Validation("participant count must be positive".into()));
    }
    if req.participant_count > MAX_PARTICIPANTS_PER_BOOKING {
        return Err(EngineError::LimitExceeded("too many participants"));
    }
    if !config.allowed_durations.contains(&req.duration) {
        return Err(EngineError::Validation(format!(
            "duration {} is not one of {:?}",
            req.duration, config.allowed_durations
        )));
    }
    if req.contact.name.trim().is_empty() {
        return Err(EngineError::Validation("contact name is required".into()));
    }
    if req.contact.phone.trim().is_empty() {
        return Err(EngineError::Validation("contact phone is required".into()));
    }
    check_len(Some(&req.contact.name), MAX_CONTACT_LEN, "contact name too long")?;
    check_len(Some(&req.contact.phone), MAX_CONTACT_LEN, "contact phone too long")?;
    check_len(req.contact.email.as_deref(), MAX_CONTACT_LEN, "contact email too long")?;
    check_len(req.notes.as_deref(), MAX_NOTES_LEN, "notes too long")?;
    Ok(())
}

fn validate_edits(edits: &BookingEdits) -> Result<(), EngineError> {
    if edits.contact_name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(EngineError::Validation("contact name cannot be blank".into()));
    }
    if edits.contact_phone.as_deref().is_some_and(|p| p.trim().is_empty()) {
        return Err(EngineError::Validation("contact phone cannot be blank".into()));
    }
    check_len(edits.contact_name.as_deref(), MAX_CONTACT_LEN, "contact name too long")?;
    check_len(edits.contact_phone.as_deref(), MAX_CONTACT_LEN, "contact phone too long")?;
    check_len(edits.contact_email.as_deref(), MAX_CONTACT_LEN, "contact email too long")?;
    check_len(edits.notes.as_deref(), MAX_NOTES_LEN, "notes too long")?;
    check_len(edits.admin_notes.as_deref(), MAX_NOTES_LEN, "admin notes too long")?;
    Ok(())
}

/// Who asked for a status change.
#[derive(Clone, Copy)]
enum Actor<'a> {
    Admin(Option<&'a str>),
    /// The external user who owns the booking.
    Owner(&'a str),
    Sweep,
}

impl Actor<'_> {
    fn admin_id(self) -> Option<String> {
        match self {
            Actor::Admin(id) => id.map(str::to_string),
            Actor::Owner(_) | Actor::Sweep => None,
        }
    }
}

fn status_error(booking: &Booking, to: BookingStatus) -> EngineError {
    match (booking.status, to) {
        (BookingStatus::Cancelled, BookingStatus::Cancelled) => EngineError::AlreadyCancelled(booking.id),
        (BookingStatus::Completed, BookingStatus::Cancelled) => EngineError::AlreadyCompleted(booking.id),
        (from, to) => EngineError::InvalidTransition { from, to },
    }
}

fn action_for(to: Option<BookingStatus>) -> ActionKind {
    match to {
        Some(BookingStatus::Confirmed) => ActionKind::Confirmed,
        Some(BookingStatus::Cancelled) => ActionKind::Cancelled,
        _ => ActionKind::Edited,
    }
}

impl Engine {
    // ── Booking lifecycle ────────────────────────────────

    /// Reserve spots on a slot. Capacity is checked and taken under the day
    /// lock, so concurrent requests can never overbook.
    pub async fn create_booking(&self, req: &NewBooking) -> Result<Booking, EngineError> {
        let config = self.config();
        validate_new_booking(&config, req)?;
        let config: &BookingConfig = &config;

        let booking = self
            .transact("create_booking", move || self.create_locked(config, req))
            .await?;
        metrics::counter!(crate::observability::BOOKINGS_CREATED_TOTAL).increment(1);
        info!(booking = %booking.id, slot = %booking.slot_id, count = booking.participant_count, "booking created");
        self.notify.send(BookingNotice::Created(booking.clone()));
        Ok(booking)
    }

    async fn create_locked(&self, config: &BookingConfig, req: &NewBooking) -> Result<Booking, EngineError> {
        let mut day = self.lock_slot_day(req.slot_id).await?;
        let slot = day.slot(req.slot_id).ok_or(EngineError::SlotNotFound(req.slot_id))?;
        if slot.is_blocked {
            return Err(EngineError::SlotBlocked(slot.id));
        }
        let available = slot.available_spots();
        if available < req.participant_count {
            return Err(EngineError::InsufficientCapacity {
                available,
                requested: req.participant_count,
            });
        }
        let quote = calculate_price(config, slot.participant_class, req.duration, req.participant_count)?;

        let now = self.clock.now();
        let status = if config.auto_confirm {
            BookingStatus::Confirmed
        } else {
            BookingStatus::Pending
        };
        let booking = Booking {
            id: Ulid::new(),
            slot_id: slot.id,
            date: slot.date,
            start_time: slot.start_time,
            duration: req.duration,
            participant_class: slot.participant_class,
            participant_count: req.participant_count,
            contact: req.contact.clone(),
            notes: req.notes.clone(),
            admin_notes: None,
            user_id: req.user_id.clone(),
            source: req.source,
            created_by_admin: req.created_by_admin.clone(),
            status,
            total_price: quote.total,
            currency: quote.currency.clone(),
            reminder_sent: false,
            reminder_confirmed: false,
            created_at: now,
            confirmed_at: (status == BookingStatus::Confirmed).then_some(now),
            cancelled_at: None,
            cancel_reason: None,
        };
        let log = ActionLogEntry::new(
            Some(booking.id),
            ActionKind::Created,
            req.created_by_admin.clone(),
            json!({
                "slot_id": booking.slot_id.to_string(),
                "participant_count": booking.participant_count,
                "duration": booking.duration,
                "total_price": booking.total_price,
                "source": booking.source,
                "status": booking.status,
            }),
            now,
        );
        let event = Event::BookingCreated {
            booking: booking.clone(),
            log,
        };
        self.persist_and_apply(&mut day, &event).await?;
        Ok(booking)
    }

    /// Cancel and give the spots back to the slot.
    pub async fn cancel_booking(&self, id: Ulid, reason: Option<&str>) -> Result<Booking, EngineError> {
        self.set_status(id, BookingStatus::Cancelled, reason, Actor::Admin(None)).await
    }

    /// Cancellation requested by the booking's owner through a messaging button.
    pub async fn cancel_booking_by_owner(
        &self,
        id: Ulid,
        user_id: &str,
        reason: Option<&str>,
    ) -> Result<Booking, EngineError> {
        self.set_status(id, BookingStatus::Cancelled, reason, Actor::Owner(user_id))
            .await
    }

    pub async fn confirm_booking(&self, id: Ulid, admin_id: Option<&str>) -> Result<Booking, EngineError> {
        self.set_status(id, BookingStatus::Confirmed, None, Actor::Admin(admin_id))
            .await
    }

    /// Admin edit: an optional status move along the lifecycle plus contact and note edits,
    /// committed together.
    pub async fn update_booking(
        &self,
        id: Ulid,
        update: &BookingUpdate,
        admin_id: Option<&str>,
    ) -> Result<Booking, EngineError> {
        validate_edits(&update.edits)?;
        check_len(update.cancel_reason.as_deref(), MAX_REASON_LEN, "cancel reason too long")?;
        if update.status.is_none() && update.edits.is_empty() {
            return Err(EngineError::Validation("nothing to update".into()));
        }

        let booking = self
            .transact("update_booking", move || {
                self.update_locked(id, update.status, update.cancel_reason.as_deref(), &update.edits, Actor::Admin(admin_id))
            })
            .await?;
        self.publish_status(&booking, update.status);
        Ok(booking)
    }

    async fn set_status(
        &self,
        id: Ulid,
        to: BookingStatus,
        reason: Option<&str>,
        actor: Actor<'_>,
    ) -> Result<Booking, EngineError> {
        check_len(reason, MAX_REASON_LEN, "reason too long")?;
        let no_edits = BookingEdits::default();
        let no_edits = &no_edits;
        let booking = self
            .transact("set_booking_status", move || {
                self.update_locked(id, Some(to), reason, no_edits, actor)
            })
            .await?;
        self.publish_status(&booking, Some(to));
        Ok(booking)
    }

    fn publish_status(&self, booking: &Booking, to: Option<BookingStatus>) {
        match to {
            Some(BookingStatus::Cancelled) => {
                metrics::counter!(crate::observability::BOOKINGS_CANCELLED_TOTAL).increment(1);
                info!(booking = %booking.id, "booking cancelled");
                self.notify.send(BookingNotice::Cancelled(booking.clone()));
            }
            Some(BookingStatus::Confirmed) => {
                info!(booking = %booking.id, "booking confirmed");
                self.notify.send(BookingNotice::Confirmed(booking.clone()));
            }
            Some(status) => info!(booking = %booking.id, %status, "booking status changed"),
            None => info!(booking = %booking.id, "booking edited"),
        }
    }

    async fn update_locked(
        &self,
        id: Ulid,
        to: Option<BookingStatus>,
        reason: Option<&str>,
        edits: &BookingEdits,
        actor: Actor<'_>,
    ) -> Result<Booking, EngineError> {
        let mut day = self.lock_booking_day(id).await?;
        let booking = day.booking(id).ok_or(EngineError::BookingNotFound(id))?;
        if let Actor::Owner(user_id) = actor
            && booking.user_id.as_deref() != Some(user_id)
        {
            return Err(EngineError::NotOwner(id));
        }
        if let Some(to) = to
            && !booking.status.can_transition_to(to)
        {
            return Err(status_error(booking, to));
        }

        let now = self.clock.now();
        let status = to.map(|to| StatusChange {
            from: booking.status,
            to,
            at: now,
            reason: (to == BookingStatus::Cancelled).then(|| reason.map(str::to_string)).flatten(),
        });
        let log = ActionLogEntry::new(
            Some(id),
            action_for(to),
            actor.admin_id(),
            json!({
                "previous_status": booking.status,
                "status": to.unwrap_or(booking.status),
                "reason": reason,
                "edits": edits,
                "by_owner": matches!(actor, Actor::Owner(_)),
            }),
            now,
        );
        let event = Event::BookingUpdated {
            booking_id: id,
            date: day.date,
            status,
            edits: edits.clone(),
            log,
        };
        self.persist_and_apply(&mut day, &event).await?;
        day.booking(id).cloned().ok_or(EngineError::BookingNotFound(id))
    }

    /// The owner's "will attend" answer to a reminder.
    pub async fn acknowledge_reminder(&self, id: Ulid, user_id: &str) -> Result<Booking, EngineError> {
        self.transact("acknowledge_reminder", move || self.acknowledge_locked(id, user_id))
            .await
    }

    async fn acknowledge_locked(&self, id: Ulid, user_id: &str) -> Result<Booking, EngineError> {
        let mut day = self.lock_booking_day(id).await?;
        let booking = day.booking(id).ok_or(EngineError::BookingNotFound(id))?;
        if booking.user_id.as_deref() != Some(user_id) {
            return Err(EngineError::NotOwner(id));
        }
        match booking.status {
            BookingStatus::Cancelled => return Err(EngineError::AlreadyCancelled(id)),
            BookingStatus::Completed => return Err(EngineError::AlreadyCompleted(id)),
            BookingStatus::NoShow => {
                return Err(EngineError::InvalidTransition {
                    from: BookingStatus::NoShow,
                    to: BookingStatus::Confirmed,
                });
            }
            BookingStatus::Pending | BookingStatus::Confirmed => {}
        }
        if booking.reminder_confirmed {
            return Ok(booking.clone());
        }
        let event = Event::ReminderAcknowledged {
            booking_id: id,
            date: day.date,
        };
        self.persist_and_apply(&mut day, &event).await?;
        day.booking(id).cloned().ok_or(EngineError::BookingNotFound(id))
    }

    // ── Sweep support ────────────────────────────────────

    /// Flag a reminder as delivered. Returns `false` if the booking stopped
    /// qualifying (cancelled, already reminded) since it was picked.
    pub async fn mark_reminder_sent(&self, id: Ulid) -> Result<bool, EngineError> {
        self.transact("mark_reminder_sent", move || self.mark_reminder_locked(id))
            .await
    }

    async fn mark_reminder_locked(&self, id: Ulid) -> Result<bool, EngineError> {
        let mut day = self.lock_booking_day(id).await?;
        let booking = day.booking(id).ok_or(EngineError::BookingNotFound(id))?;
        if booking.status != BookingStatus::Confirmed || booking.reminder_sent {
            return Ok(false);
        }
        let event = Event::ReminderSent {
            booking_id: id,
            date: day.date,
        };
        self.persist_and_apply(&mut day, &event).await?;
        metrics::counter!(crate::observability::REMINDERS_SENT_TOTAL).increment(1);
        Ok(true)
    }

    /// Move a confirmed booking whose session ended more than the grace
    /// period before `now` to `completed`. `None` if it no longer qualifies.
    pub async fn complete_if_due(&self, id: Ulid, now: NaiveDateTime) -> Result<Option<Booking>, EngineError> {
        self.transact("complete_booking", move || self.complete_locked(id, now))
            .await
    }

    async fn complete_locked(&self, id: Ulid, now: NaiveDateTime) -> Result<Option<Booking>, EngineError> {
        let mut day = self.lock_booking_day(id).await?;
        let booking = day.booking(id).ok_or(EngineError::BookingNotFound(id))?;
        if !super::queries::completion_due(booking, now) {
            return Ok(None);
        }
        let log = ActionLogEntry::new(
            Some(id),
            ActionKind::Edited,
            None,
            json!({
                "previous_status": booking.status,
                "status": BookingStatus::Completed,
                "auto_completed": true,
            }),
            now,
        );
        let event = Event::BookingUpdated {
            booking_id: id,
            date: day.date,
            status: Some(StatusChange {
                from: booking.status,
                to: BookingStatus::Completed,
                at: now,
                reason: None,
            }),
            edits: BookingEdits::default(),
            log,
        };
        self.persist_and_apply(&mut day, &event).await?;
        metrics::counter!(crate::observability::BOOKINGS_COMPLETED_TOTAL).increment(1);
        Ok(day.booking(id).cloned())
    }

    // ── Slot blocking ────────────────────────────────────

    pub async fn block_slot(
        &self,
        slot_id: Ulid,
        reason: Option<&str>,
        admin_id: Option<&str>,
    ) -> Result<Slot, EngineError> {
        check_len(reason, MAX_REASON_LEN, "block reason too long")?;
        self.transact("block_slot", move || self.set_blocked_locked(slot_id, true, reason, admin_id))
            .await
    }

    /// Lift a block. Status falls back to whatever occupancy dictates.
    pub async fn unblock_slot(&self, slot_id: Ulid, admin_id: Option<&str>) -> Result<Slot, EngineError> {
        self.transact("unblock_slot", move || self.set_blocked_locked(slot_id, false, None, admin_id))
            .await
    }

    async fn set_blocked_locked(
        &self,
        slot_id: Ulid,
        blocked: bool,
        reason: Option<&str>,
        admin_id: Option<&str>,
    ) -> Result<Slot, EngineError> {
        let mut day = self.lock_slot_day(slot_id).await?;
        let slot = day.slot(slot_id).ok_or(EngineError::SlotNotFound(slot_id))?;
        match (slot.is_blocked, blocked) {
            (true, true) => return Err(EngineError::SlotAlreadyBlocked(slot_id)),
            (false, false) => return Err(EngineError::SlotNotBlocked(slot_id)),
            _ => {}
        }
        let now = self.clock.now();
        let log = ActionLogEntry::new(
            None,
            ActionKind::Edited,
            admin_id.map(str::to_string),
            json!({
                "type": if blocked { "slot_blocked" } else { "slot_unblocked" },
                "slot_id": slot_id.to_string(),
                "reason": reason,
            }),
            now,
        );
        let event = Event::SlotBlockChanged {
            slot_id,
            date: day.date,
            blocked,
            reason: reason.map(str::to_string),
            log,
        };
        self.persist_and_apply(&mut day, &event).await?;
        info!(slot = %slot_id, blocked, "slot block changed");
        day.slot(slot_id).cloned().ok_or(EngineError::SlotNotFound(slot_id))
    }

    // ── Configuration ────────────────────────────────────

    /// Replace the configuration. Existing slots keep the capacity they were generated with.
    pub async fn update_config(
        &self,
        config: BookingConfig,
        admin_id: Option<&str>,
    ) -> Result<Arc<BookingConfig>, EngineError> {
        config.validate().map_err(EngineError::Validation)?;

        let mut actions = self.admin_actions.lock().await;
        let log = ActionLogEntry::new(
            None,
            ActionKind::Edited,
            admin_id.map(str::to_string),
            json!({ "type": "config_update" }),
            self.clock.now(),
        );
        let event = Event::ConfigUpdated {
            config: config.clone(),
            log: Some(log.clone()),
        };
        self.wal_append(&event).await?;
        self.replace_config(config);
        actions.push(log);
        info!("booking config updated");
        Ok(self.config())
    }
}
