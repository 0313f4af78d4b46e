use serde::Serialize;

use crate::model::{Amount, Booking, Minutes, TimeOfDay};
use crate::notify::BookingNotice;

/// Inline action attached to a message. `callback_data` round-trips back to
/// whoever handles the button press.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Button {
    pub text: String,
    pub callback_data: String,
}

impl Button {
    fn new(text: &str, callback_data: String) -> Self {
        Self {
            text: text.to_string(),
            callback_data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Metric label: created, confirmed, cancelled, reminder or shifted.
    pub intent: &'static str,
    pub text: String,
    pub buttons: Vec<Button>,
}

pub fn cancel_callback(booking: &Booking) -> String {
    format!("booking_cancel:{}", booking.id)
}

pub fn reminder_callback(booking: &Booking) -> String {
    format!("booking_confirm_reminder:{}", booking.id)
}

pub fn shift_ack_callback(booking: &Booking) -> String {
    format!("booking_shift_ok:{}", booking.id)
}

fn format_price(amount: Amount, currency: &str) -> String {
    format!("{}.{:02} {currency}", amount / 100, amount % 100)
}

fn session_lines(booking: &Booking) -> String {
    format!(
        "Date: {}\nTime: {}\nDuration: {} min",
        booking.date.format("%d %B %Y"),
        booking.start_time,
        booking.duration
    )
}

pub fn created(booking: &Booking) -> Message {
    let status = if booking.status == crate::model::BookingStatus::Pending {
        "\n\nWe will confirm your booking shortly."
    } else {
        ""
    };
    Message {
        intent: "created",
        text: format!(
            "Booking received\n\n{}\nParticipants: {}\nTotal: {}{status}",
            session_lines(booking),
            booking.participant_count,
            format_price(booking.total_price, &booking.currency),
        ),
        buttons: vec![Button::new("Cancel", cancel_callback(booking))],
    }
}

pub fn confirmed(booking: &Booking) -> Message {
    Message {
        intent: "confirmed",
        text: format!("Booking confirmed\n\n{}\nParticipants: {}", session_lines(booking), booking.participant_count),
        buttons: vec![Button::new("Cancel", cancel_callback(booking))],
    }
}

pub fn cancelled(booking: &Booking) -> Message {
    let reason = booking
        .cancel_reason
        .as_deref()
        .map(|r| format!("\nReason: {r}"))
        .unwrap_or_default();
    Message {
        intent: "cancelled",
        text: format!("Booking cancelled\n\n{}{reason}", session_lines(booking)),
        buttons: Vec::new(),
    }
}

pub fn reminder(booking: &Booking, hours_before: u32) -> Message {
    let hours = if hours_before == 1 {
        "1 hour".to_string()
    } else {
        format!("{hours_before} hours")
    };
    Message {
        intent: "reminder",
        text: format!(
            "Reminder: your session starts within {hours}\n\n{}\nParticipants: {}\n\nSee you soon!",
            session_lines(booking),
            booking.participant_count
        ),
        buttons: vec![
            Button::new("I will attend", reminder_callback(booking)),
            Button::new("Cancel", cancel_callback(booking)),
        ],
    }
}

pub fn shifted(booking: &Booking, old_start: TimeOfDay, minutes: Minutes, reason: &str) -> Message {
    let direction = if minutes > 0 { "later" } else { "earlier" };
    Message {
        intent: "shifted",
        text: format!(
            "Your session time has changed\n\nDate: {}\nWas: {old_start}\nNow: {}\nShift: {} min {direction}\nReason: {reason}\n\nEverything else stays the same.",
            booking.date.format("%d %B %Y"),
            booking.start_time,
            minutes.abs(),
        ),
        buttons: vec![
            Button::new("OK", shift_ack_callback(booking)),
            Button::new("Cancel", cancel_callback(booking)),
        ],
    }
}

/// Message for a notice published by the engine.
pub fn for_notice(notice: &BookingNotice) -> Message {
    match notice {
        BookingNotice::Created(b) => created(b),
        BookingNotice::Confirmed(b) => confirmed(b),
        BookingNotice::Cancelled(b) => cancelled(b),
        BookingNotice::Shifted {
            booking,
            old_start,
            minutes,
            reason,
        } => shifted(booking, *old_start, *minutes, reason),
    }
}
