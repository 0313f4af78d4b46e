use tokio::sync::broadcast;

use crate::model::{Booking, Minutes, TimeOfDay};

const CHANNEL_CAPACITY: usize = 1024;

/// Customer-visible outcome of a committed mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum BookingNotice {
    Created(Booking),
    Confirmed(Booking),
    Cancelled(Booking),
    /// `booking` already carries the new start time.
    Shifted {
        booking: Booking,
        old_start: TimeOfDay,
        minutes: Minutes,
        reason: String,
    },
}

impl BookingNotice {
    pub fn booking(&self) -> &Booking {
        match self {
            BookingNotice::Created(b) | BookingNotice::Confirmed(b) | BookingNotice::Cancelled(b) => b,
            BookingNotice::Shifted { booking, .. } => booking,
        }
    }

    pub fn intent(&self) -> &'static str {
        match self {
            BookingNotice::Created(_) => "created",
            BookingNotice::Confirmed(_) => "confirmed",
            BookingNotice::Cancelled(_) => "cancelled",
            BookingNotice::Shifted { .. } => "shifted",
        }
    }
}

/// Broadcast hub the engine publishes to after every commit.
pub struct NotifyHub {
    tx: broadcast::Sender<BookingNotice>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            tx: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BookingNotice> {
        self.tx.subscribe()
    }

    /// Send a notice. No-op if nobody is listening.
    pub fn send(&self, notice: BookingNotice) {
        let _ = self.tx.send(notice);
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use ulid::Ulid;

    use super::*;
    use crate::model::*;

    fn booking() -> Booking {
        let date = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        Booking {
            id: Ulid::new(),
            slot_id: Ulid::new(),
            date,
            start_time: "10:00".parse().unwrap(),
            duration: 60,
            participant_class: ParticipantClass::Adult,
            participant_count: 2,
            contact: Contact {
                name: "Ann".into(),
                phone: "+100".into(),
                email: None,
            },
            notes: None,
            admin_notes: None,
            user_id: Some("42".into()),
            source: Source::App,
            created_by_admin: None,
            status: BookingStatus::Confirmed,
            total_price: 2000,
            currency: "RUB".into(),
            reminder_sent: false,
            reminder_confirmed: false,
            created_at: date.and_hms_opt(8, 0, 0).unwrap(),
            confirmed_at: None,
            cancelled_at: None,
            cancel_reason: None,
        }
    }

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let mut rx = hub.subscribe();
        let notice = BookingNotice::Created(booking());
        hub.send(notice.clone());

        let received = rx.recv().await.unwrap();
        assert_eq!(received, notice);
        assert_eq!(received.intent(), "created");
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        assert_eq!(hub.receiver_count(), 0);
        hub.send(BookingNotice::Cancelled(booking()));
    }
}
