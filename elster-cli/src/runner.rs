//! Drives an [Engine] over an async CAN interface
use std::{future::Future, time::Duration};

use elster_common::traits::{AsyncCanReceiver, AsyncCanSender};
use elster_node::Engine;
use log::{debug, warn};
use tokio::time::{Instant, MissedTickBehavior};

/// Number of consecutive receiver failures after which [run] gives up
pub const MAX_RECEIVE_ERRORS: u32 = 10;

/// Run the engine until `shutdown` completes
///
/// Received messages are handed to the engine as they arrive, and the engine is processed after
/// each message and at least once per `tick`. Errors which only report events on the bus, such as
/// error frames, are logged and skipped. Other receive errors are logged and ignored, unless
/// [MAX_RECEIVE_ERRORS] occur in a row, in which case the last one is returned.
pub async fn run<S, R>(
    engine: &mut Engine,
    sender: &mut S,
    receiver: &mut R,
    tick: Duration,
    shutdown: impl Future<Output = ()>,
) -> Result<(), R::Error>
where
    S: AsyncCanSender,
    R: AsyncCanReceiver,
{
    let epoch = Instant::now();
    let mut ticker = tokio::time::interval(tick.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut errors = 0;

    tokio::pin!(shutdown);
    loop {
        let received = tokio::select! {
            _ = &mut shutdown => return Ok(()),
            result = receiver.recv() => Some(result),
            _ = ticker.tick() => None,
        };
        match received {
            Some(Ok(msg)) => {
                errors = 0;
                engine.handle_message(msg);
            }
            Some(Err(e)) if receiver.is_bus_event(&e) => debug!("Skipping bus event: {e}"),
            Some(Err(e)) => {
                errors += 1;
                if errors >= MAX_RECEIVE_ERRORS {
                    return Err(e);
                }
                warn!("Receive error: {e}");
            }
            None => {}
        }
        engine
            .process_async(epoch.elapsed().as_micros() as u64, sender)
            .await;
    }
}
