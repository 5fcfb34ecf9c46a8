//! Tokio glue for reader sessions.
//!
//! A [`ReaderSession`] runs on a logical clock and never sleeps. The functions
//! here connect it to real time:
//!
//! - [`run_for`] paces the logical clock against `tokio::time`
//! - [`pump`] applies events a transport sends over an mpsc channel
//! - [`drive`] does both at once
//!
//! All of them hold the session mutably, so events are applied one at a time.
//!
//! # Examples
//!
//! ```no_run
//! use cardlink_hardware::driver::run_for;
//! use cardlink_hardware::mock::{MockConfig, SessionConfig};
//! use cardlink_hardware::ReaderSession;
//! # use cardlink_hardware::traits::CardReaderHandler;
//! use std::time::Duration;
//!
//! # async fn connect<H: CardReaderHandler>(handler: H) -> cardlink_hardware::Result<()> {
//! let mut session = ReaderSession::new(handler, SessionConfig::default());
//! session.initialize(MockConfig::default())?;
//! run_for(&mut session, Duration::from_millis(250)).await;
//! assert!(session.is_ready());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, trace};

use crate::event::ReaderEvent;
use crate::session::ReaderSession;
use crate::traits::CardReaderHandler;

/// Run the session's timeline for `duration` of real time.
///
/// Sleeps until each pending event is due and applies it. Returns the number
/// of events applied.
pub async fn run_for<H: CardReaderHandler>(
    session: &mut ReaderSession<H>,
    duration: Duration,
) -> usize {
    let end = session.now() + duration;
    let mut applied = 0;
    loop {
        let target = next_target(session, end);
        let step = target.saturating_sub(session.now());
        if !step.is_zero() {
            sleep(step).await;
        }
        applied += session.advance(step);
        if target >= end {
            break;
        }
    }
    trace!("Ran session for {:?}, {} event(s) applied", duration, applied);
    applied
}

/// Apply every event received on `events` until the channel closes.
///
/// The logical clock does not move. Returns the number of events applied.
pub async fn pump<H: CardReaderHandler>(
    session: &mut ReaderSession<H>,
    mut events: mpsc::Receiver<ReaderEvent>,
) -> usize {
    let mut applied = 0;
    while let Some(event) = events.recv().await {
        session.deliver(event);
        applied += 1;
    }
    debug!("Event channel closed after {} event(s)", applied);
    applied
}

/// Run the timeline for `duration` while applying events from `events`.
///
/// Before a received event is applied, the logical clock catches up with the
/// real time elapsed so far. A closed channel is not an error; the timeline
/// keeps running until `duration` is over. Returns the number of events
/// applied.
pub async fn drive<H: CardReaderHandler>(
    session: &mut ReaderSession<H>,
    events: &mut mpsc::Receiver<ReaderEvent>,
    duration: Duration,
) -> usize {
    let started = Instant::now();
    let base = session.now();
    let end = base + duration;
    let mut applied = 0;
    let mut open = true;

    while session.now() < end {
        let target = next_target(session, end);
        let wake = started + target.saturating_sub(base);

        tokio::select! {
            received = events.recv(), if open => {
                let elapsed = (base + started.elapsed()).min(end);
                applied += session.advance(elapsed.saturating_sub(session.now()));
                match received {
                    Some(event) => {
                        session.deliver(event);
                        applied += 1;
                    }
                    None => {
                        debug!("Event channel closed");
                        open = false;
                    }
                }
            }
            _ = sleep_until(wake) => {
                applied += session.advance(target.saturating_sub(session.now()));
            }
        }
    }
    applied
}

// Earliest of the next pending event and `end`.
fn next_target<H: CardReaderHandler>(session: &ReaderSession<H>, end: Duration) -> Duration {
    session
        .next_deadline()
        .filter(|deadline| *deadline <= end)
        .unwrap_or(end)
}
