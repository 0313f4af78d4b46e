use std::time::Duration;

use crate::model::Minutes;

/// Default for how long a mutation waits for a day lock before the attempt counts as contended.
pub const LOCK_WAIT: Duration = Duration::from_secs(2);

/// Contended attempts are retried this many times before surfacing.
pub const MAX_TX_RETRIES: u32 = 5;

/// Backoff step between retries; the n-th retry sleeps `n * RETRY_BACKOFF`.
pub const RETRY_BACKOFF: Duration = Duration::from_millis(10);

pub const MAX_SHIFT_MINUTES: Minutes = 12 * 60;
pub const MAX_BULK_SHIFT_SLOTS: usize = 200;
pub const MAX_SCHEDULE_RANGE_DAYS: i64 = 93;
pub const MAX_REASON_LEN: usize = 500;
pub const MAX_CONTACT_LEN: usize = 200;
pub const MAX_NOTES_LEN: usize = 2000;
pub const MAX_PARTICIPANTS_PER_BOOKING: u32 = 100;
pub const MAX_SLOT_CAPACITY: u32 = 10_000;
pub const MAX_SLOTS_PER_DAY: usize = 1440;
pub const DEFAULT_ACTION_PAGE_SIZE: u32 = 50;
pub const MAX_ACTION_PAGE_SIZE: u32 = 100;
