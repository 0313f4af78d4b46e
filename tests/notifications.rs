use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use ulid::Ulid;

use slotline::clock::ManualClock;
use slotline::dispatch;
use slotline::engine::{Engine, EngineOptions};
use slotline::messages::Button;
use slotline::model::*;
use slotline::notify::NotifyHub;
use slotline::sink::{NotificationSink, NotifyError};
use slotline::sweep::{self, SweepOptions};

// ── Test infrastructure ──────────────────────────────────────

#[derive(Debug, Clone)]
struct Sent {
    user_id: String,
    text: String,
    callbacks: Vec<String>,
}

/// Records every delivery. Optionally fails or stalls to exercise isolation.
#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<Sent>>,
    fail: bool,
    stall: Option<Duration>,
}

impl RecordingSink {
    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, user_id: &str, text: &str, buttons: &[Button]) -> Result<(), NotifyError> {
        if let Some(stall) = self.stall {
            tokio::time::sleep(stall).await;
        }
        if self.fail {
            return Err(NotifyError::Delivery("503 from bot".into()));
        }
        self.sent.lock().unwrap().push(Sent {
            user_id: user_id.to_string(),
            text: text.to_string(),
            callbacks: buttons.iter().map(|b| b.callback_data.clone()).collect(),
        });
        Ok(())
    }
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 10).unwrap()
}

fn at(h: u32, m: u32) -> NaiveDateTime {
    date().and_hms_opt(h, m, 0).unwrap()
}

fn config() -> BookingConfig {
    let hours = WorkingHours {
        open: "09:00".parse().unwrap(),
        close: "18:00".parse().unwrap(),
    };
    BookingConfig {
        working_hours: (0..7).map(|d| (d, hours)).collect(),
        slot_interval_minutes: 30,
        default_duration: 60,
        allowed_durations: BTreeSet::from([60]),
        max_participants: 4,
        pricing: BTreeMap::from([(ParticipantClass::Adult, BTreeMap::from([(60, 1000)]))]),
        ..BookingConfig::default()
    }
}

fn start_engine(clock: &Arc<ManualClock>) -> Arc<Engine> {
    let dir = std::env::temp_dir().join(format!("slotline_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let options = EngineOptions {
        seed: config(),
        compact_threshold: 0,
        clock: clock.clone(),
        ..EngineOptions::default()
    };
    Arc::new(Engine::with_options(dir.join("slotline.wal"), Arc::new(NotifyHub::new()), options).unwrap())
}

fn spawn_dispatcher(engine: &Engine, sink: Arc<RecordingSink>) {
    tokio::spawn(dispatch::run_dispatcher(engine.notify.subscribe(), sink, Duration::from_millis(200)));
}

async fn create(engine: &Engine, start: &str, user_id: Option<&str>) -> Booking {
    let start: TimeOfDay = start.parse().unwrap();
    let slot = engine
        .get_slots_for_date(date())
        .await
        .unwrap()
        .into_iter()
        .find(|s| s.start_time == start)
        .unwrap();
    engine
        .create_booking(&NewBooking {
            slot_id: slot.id,
            duration: 60,
            participant_count: 2,
            contact: Contact {
                name: "Ann".into(),
                phone: "+100".into(),
                email: Some("ann@example.com".into()),
            },
            notes: None,
            user_id: user_id.map(str::to_string),
            source: Source::App,
            created_by_admin: None,
        })
        .await
        .unwrap()
}

/// Poll until the sink has seen `n` messages or give up after a second.
async fn wait_for(sink: &RecordingSink, n: usize) -> Vec<Sent> {
    for _ in 0..100 {
        let sent = sink.sent();
        if sent.len() >= n {
            return sent;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    sink.sent()
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn booking_lifecycle_reaches_owner() {
    let clock = Arc::new(ManualClock::new(at(8, 0)));
    let engine = start_engine(&clock);
    let sink = Arc::new(RecordingSink::default());
    spawn_dispatcher(&engine, sink.clone());

    let booking = create(&engine, "10:00", Some("42")).await;
    engine
        .shift_slot(booking.slot_id, 30, "equipment check", false, Some("admin"))
        .await
        .unwrap();
    engine.cancel_booking_by_owner(booking.id, "42", None).await.unwrap();

    let sent = wait_for(&sink, 3).await;
    assert_eq!(sent.len(), 3);
    assert!(sent.iter().all(|s| s.user_id == "42"));

    assert!(sent[0].text.contains("Booking received"));
    assert_eq!(sent[0].callbacks, [format!("booking_cancel:{}", booking.id)]);

    assert!(sent[1].text.contains("Was: 10:00"));
    assert!(sent[1].text.contains("Now: 10:30"));
    assert!(sent[1].text.contains("equipment check"));
    assert_eq!(
        sent[1].callbacks,
        [format!("booking_shift_ok:{}", booking.id), format!("booking_cancel:{}", booking.id)]
    );

    assert!(sent[2].text.contains("Booking cancelled"));
}

#[tokio::test]
async fn anonymous_bookings_send_nothing() {
    let clock = Arc::new(ManualClock::new(at(8, 0)));
    let engine = start_engine(&clock);
    let sink = Arc::new(RecordingSink::default());
    spawn_dispatcher(&engine, sink.clone());

    create(&engine, "10:00", None).await;
    let owned = create(&engine, "11:00", Some("7")).await;

    let sent = wait_for(&sink, 1).await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].user_id, "7");
    assert!(sent[0].callbacks[0].ends_with(&owned.id.to_string()));
}

#[tokio::test]
async fn failing_sink_never_blocks_commits() {
    let clock = Arc::new(ManualClock::new(at(8, 0)));
    let engine = start_engine(&clock);
    let failing = Arc::new(RecordingSink {
        fail: true,
        stall: Some(Duration::from_secs(5)),
        ..RecordingSink::default()
    });
    spawn_dispatcher(&engine, failing);

    let started = std::time::Instant::now();
    let booking = create(&engine, "10:00", Some("42")).await;
    engine.cancel_booking(booking.id, Some("test")).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));

    let stored = engine.get_booking(booking.id).await.unwrap();
    assert_eq!(stored.status, BookingStatus::Cancelled);
    let slot = engine.get_slot(booking.slot_id).await.unwrap();
    assert_eq!(slot.booked_participants, 0);
}

#[tokio::test]
async fn sweep_reminds_then_completes() {
    let clock = Arc::new(ManualClock::new(at(8, 0)));
    let engine = start_engine(&clock);
    let sink = RecordingSink::default();
    let booking = create(&engine, "11:00", Some("42")).await;
    let opts = SweepOptions::default();

    clock.set(at(8, 30));
    let report = sweep::sweep_once(&engine, &sink, &opts).await;
    assert_eq!(report.reminders_sent, 0);

    clock.set(at(9, 15));
    let report = sweep::sweep_once(&engine, &sink, &opts).await;
    assert_eq!(report.reminders_sent, 1);
    let sent = sink.sent();
    assert!(sent[0].text.contains("Reminder"));
    assert_eq!(
        sent[0].callbacks,
        [
            format!("booking_confirm_reminder:{}", booking.id),
            format!("booking_cancel:{}", booking.id)
        ]
    );

    // the owner answers the reminder button
    let acked = engine.acknowledge_reminder(booking.id, "42").await.unwrap();
    assert!(acked.reminder_confirmed);

    clock.set(at(12, 31));
    let report = sweep::sweep_once(&engine, &sink, &opts).await;
    assert_eq!(report.reminders_sent, 0);
    assert_eq!(report.bookings_completed, 1);
    assert_eq!(engine.get_booking(booking.id).await.unwrap().status, BookingStatus::Completed);
    assert_eq!(sink.sent().len(), 1);
}
