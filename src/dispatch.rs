use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::messages;
use crate::notify::BookingNotice;
use crate::sink::{self, NotificationSink, NotifyError};

/// Turn committed booking notices into sink deliveries until the hub closes.
/// Delivery runs off the commit path; a slow or failing sink only costs
/// its own notices.
pub async fn run_dispatcher(
    mut rx: broadcast::Receiver<BookingNotice>,
    sink: Arc<dyn NotificationSink>,
    timeout: Duration,
) {
    loop {
        let notice = match rx.recv().await {
            Ok(notice) => notice,
            Err(RecvError::Lagged(missed)) => {
                warn!(missed, "notification dispatcher lagged, notices dropped");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        dispatch_one(sink.as_ref(), &notice, timeout).await;
    }
    debug!("notification dispatcher stopped");
}

pub async fn dispatch_one(sink: &dyn NotificationSink, notice: &BookingNotice, timeout: Duration) {
    let booking = notice.booking();
    let message = messages::for_notice(notice);
    match sink::deliver(sink, booking.user_id.as_deref(), &message, timeout).await {
        Ok(()) => debug!(intent = message.intent, booking = %booking.id, "notification sent"),
        Err(NotifyError::NoChannel) => {
            debug!(intent = message.intent, booking = %booking.id, "no channel for booking owner")
        }
        Err(e) => sink::log_failure(message.intent, booking.id, &e),
    }
}
