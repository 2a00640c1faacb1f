//! Session keepalive task.
//!
//! Pings every `interval` with an ack-only `keepalive` request. A ping that
//! is not acknowledged within one interval counts as a failure; after
//! `max_failures` consecutive failures the session times out.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Weak;
use std::time::Duration;

use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{trace, warn};

use crate::protocol::{Request, RequestOptions};

use super::{Session, SessionInner};

// ============================================================================
// Task
// ============================================================================

/// Spawns the keepalive loop for a session.
///
/// The task holds only a weak reference and stops on its own once the
/// session is gone or no longer alive.
pub(super) fn spawn(weak: Weak<SessionInner>, interval: Duration, max_failures: u32) -> AbortHandle {
    let task = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failures = 0u32;

        loop {
            ticker.tick().await;

            let Some(inner) = weak.upgrade() else {
                break;
            };
            let session = Session::from_inner(inner);
            if !session.is_alive() {
                break;
            }

            let outcome = session
                .request(
                    Request::keepalive(),
                    RequestOptions::ack_only().with_timeout(interval),
                )
                .await
                .map(|_| ());
            session.keep_alive_result(&outcome);

            match &outcome {
                Ok(()) => {
                    trace!(session_id = %session.id(), "Keepalive acknowledged");
                    failures = 0;
                }
                Err(e) => {
                    failures += 1;
                    warn!(
                        session_id = %session.id(),
                        failures,
                        max_failures,
                        error = %e,
                        "Keepalive failed"
                    );
                    if failures >= max_failures {
                        session.timeout();
                        break;
                    }
                }
            }
        }
    });

    task.abort_handle()
}
