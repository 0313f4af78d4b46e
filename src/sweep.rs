use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::messages;
use crate::sink::{self, NotificationSink, NotifyError};

#[derive(Debug, Clone, Copy)]
pub struct SweepOptions {
    pub interval: Duration,
    /// Compute and log what would change, but neither deliver nor write.
    pub dry_run: bool,
    pub notify_timeout: Duration,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15 * 60),
            dry_run: false,
            notify_timeout: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub reminders_sent: u32,
    pub bookings_completed: u32,
    pub errors: Vec<String>,
}

/// One reminder pass followed by one auto-completion pass at the engine's `now`.
pub async fn sweep_once(engine: &Engine, sink: &dyn NotificationSink, opts: &SweepOptions) -> SweepReport {
    let started = Instant::now();
    let mut report = SweepReport::default();
    let now = engine.clock().now();
    let config = engine.config();

    if config.reminder_enabled {
        for booking in engine.reminder_candidates(now).await {
            if opts.dry_run {
                info!(booking = %booking.id, "dry run: would send reminder");
                report.reminders_sent += 1;
                continue;
            }
            let message = messages::reminder(&booking, config.reminder_hours_before);
            let delivered =
                sink::deliver(sink, booking.user_id.as_deref(), &message, opts.notify_timeout).await;
            match delivered {
                Ok(()) => match engine.mark_reminder_sent(booking.id).await {
                    Ok(true) => report.reminders_sent += 1,
                    Ok(false) => debug!(booking = %booking.id, "reminder no longer due"),
                    Err(e) => report.errors.push(format!("booking {}: {e}", booking.id)),
                },
                Err(NotifyError::NoChannel) => {
                    // Nobody to remind; mark it so the next pass doesn't retry forever.
                    if let Err(e) = engine.mark_reminder_sent(booking.id).await {
                        report.errors.push(format!("booking {}: {e}", booking.id));
                    }
                    report.errors.push(format!("booking {}: {}", booking.id, NotifyError::NoChannel));
                }
                Err(e) => {
                    sink::log_failure(message.intent, booking.id, &e);
                    report.errors.push(format!("booking {}: {e}", booking.id));
                }
            }
        }
    }

    for booking in engine.completion_candidates(now).await {
        if opts.dry_run {
            info!(booking = %booking.id, "dry run: would complete booking");
            report.bookings_completed += 1;
            continue;
        }
        match engine.complete_if_due(booking.id, now).await {
            Ok(Some(_)) => report.bookings_completed += 1,
            Ok(None) => debug!(booking = %booking.id, "booking no longer due for completion"),
            Err(e) => report.errors.push(format!("booking {}: {e}", booking.id)),
        }
    }

    metrics::histogram!(crate::observability::SWEEP_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
    report
}

/// Background task that sweeps on a fixed interval.
pub async fn run_scheduler(engine: Arc<Engine>, sink: Arc<dyn NotificationSink>, opts: SweepOptions) {
    let mut interval = tokio::time::interval(opts.interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let report = sweep_once(&engine, sink.as_ref(), &opts).await;
        if report.reminders_sent > 0 || report.bookings_completed > 0 {
            info!(
                reminders = report.reminders_sent,
                completed = report.bookings_completed,
                dry_run = opts.dry_run,
                "sweep finished"
            );
        }
        for err in &report.errors {
            warn!("sweep: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};
    use std::path::PathBuf;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveDateTime};

    use super::*;
    use crate::clock::ManualClock;
    use crate::engine::EngineOptions;
    use crate::messages::Button;
    use crate::model::*;
    use crate::notify::NotifyHub;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("slotline_test_sweep");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 9).unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        date().and_hms_opt(h, m, 0).unwrap()
    }

    fn config() -> BookingConfig {
        let hours = WorkingHours {
            open: TimeOfDay::hm(9, 0).unwrap(),
            close: TimeOfDay::hm(18, 0).unwrap(),
        };
        BookingConfig {
            working_hours: (0..7).map(|d| (d, hours)).collect(),
            slot_interval_minutes: 60,
            default_duration: 60,
            allowed_durations: BTreeSet::from([60]),
            max_participants: 4,
            pricing: BTreeMap::from([(ParticipantClass::Adult, BTreeMap::from([(60, 1000)]))]),
            reminder_hours_before: 2,
            ..BookingConfig::default()
        }
    }

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl NotificationSink for Recording {
        async fn notify(&self, user_id: &str, text: &str, _: &[Button]) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError::Delivery("bot down".into()));
            }
            self.sent.lock().unwrap().push(format!("{user_id}: {text}"));
            Ok(())
        }
    }

    async fn engine(name: &str) -> (Arc<Engine>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(at(8, 0)));
        let options = EngineOptions {
            seed: config(),
            clock: clock.clone(),
            ..EngineOptions::default()
        };
        let engine = Engine::with_options(test_wal_path(name), Arc::new(NotifyHub::new()), options).unwrap();
        (Arc::new(engine), clock)
    }

    async fn book(engine: &Engine, start: &str, user_id: Option<&str>) -> Booking {
        let slots = engine.get_slots_for_date(date()).await.unwrap();
        let start: TimeOfDay = start.parse().unwrap();
        let slot = slots.iter().find(|s| s.start_time == start).unwrap();
        engine
            .create_booking(&NewBooking {
                slot_id: slot.id,
                duration: 60,
                participant_count: 1,
                contact: Contact {
                    name: "Ann".into(),
                    phone: "+100".into(),
                    email: None,
                },
                notes: None,
                user_id: user_id.map(str::to_string),
                source: Source::App,
                created_by_admin: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn reminders_are_sent_once() {
        let (engine, clock) = engine("reminders_once.wal").await;
        let soon = book(&engine, "11:00", Some("42")).await;
        let later = book(&engine, "15:00", Some("43")).await;
        clock.set(at(9, 30));

        let sink = Recording::default();
        let report = sweep_once(&engine, &sink, &SweepOptions::default()).await;
        assert_eq!(report.reminders_sent, 1);
        assert!(report.errors.is_empty());
        assert_eq!(sink.sent.lock().unwrap().len(), 1);
        assert!(engine.get_booking(soon.id).await.unwrap().reminder_sent);
        assert!(!engine.get_booking(later.id).await.unwrap().reminder_sent);

        let again = sweep_once(&engine, &sink, &SweepOptions::default()).await;
        assert_eq!(again.reminders_sent, 0);
        assert_eq!(sink.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unreachable_owner_is_marked_but_failures_retry() {
        let (engine, clock) = engine("reminders_unreachable.wal").await;
        let anonymous = book(&engine, "11:00", None).await;
        let owned = book(&engine, "11:00", Some("42")).await;
        clock.set(at(10, 0));

        let failing = Recording {
            fail: true,
            ..Recording::default()
        };
        let report = sweep_once(&engine, &failing, &SweepOptions::default()).await;
        assert_eq!(report.reminders_sent, 0);
        assert_eq!(report.errors.len(), 2);
        assert!(engine.get_booking(anonymous.id).await.unwrap().reminder_sent);
        assert!(!engine.get_booking(owned.id).await.unwrap().reminder_sent);

        let report = sweep_once(&engine, &Recording::default(), &SweepOptions::default()).await;
        assert_eq!(report.reminders_sent, 1);
        assert!(engine.get_booking(owned.id).await.unwrap().reminder_sent);
    }

    #[tokio::test]
    async fn completes_finished_sessions() {
        let (engine, clock) = engine("complete.wal").await;
        let done = book(&engine, "09:00", Some("42")).await;
        let running = book(&engine, "10:00", Some("42")).await;
        clock.set(at(10, 31));

        let report = sweep_once(&engine, &Recording::default(), &SweepOptions::default()).await;
        assert_eq!(report.bookings_completed, 1);
        assert_eq!(engine.get_booking(done.id).await.unwrap().status, BookingStatus::Completed);
        assert_eq!(engine.get_booking(running.id).await.unwrap().status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn dry_run_counts_without_writing() {
        let (engine, clock) = engine("dry_run.wal").await;
        let done = book(&engine, "09:00", Some("42")).await;
        let soon = book(&engine, "11:00", Some("42")).await;
        clock.set(at(10, 31));

        let sink = Recording::default();
        let opts = SweepOptions {
            dry_run: true,
            ..SweepOptions::default()
        };
        let report = sweep_once(&engine, &sink, &opts).await;
        assert_eq!(report.reminders_sent, 1);
        assert_eq!(report.bookings_completed, 1);
        assert!(sink.sent.lock().unwrap().is_empty());
        assert_eq!(engine.get_booking(done.id).await.unwrap().status, BookingStatus::Confirmed);
        assert!(!engine.get_booking(soon.id).await.unwrap().reminder_sent);
    }

    #[tokio::test]
    async fn reminders_disabled_skips_pass() {
        let (engine, clock) = engine("reminders_disabled.wal").await;
        let soon = book(&engine, "11:00", Some("42")).await;
        let mut cfg = config();
        cfg.reminder_enabled = false;
        engine.update_config(cfg, None).await.unwrap();
        clock.set(at(10, 0));

        let report = sweep_once(&engine, &Recording::default(), &SweepOptions::default()).await;
        assert_eq!(report, SweepReport::default());
        assert!(!engine.get_booking(soon.id).await.unwrap().reminder_sent);
    }
}
