//! Continuous screenshot capture feeding the client's live view.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::browser::{AutomationEngine, ImageFormat};
use crate::config::FrameSettings;
use crate::protocol::ServerEvent;

/// Handle to one running capture loop. Stopping consumes the handle, so a
/// loop cannot be stopped twice and a session carries at most one.
pub struct FrameLoopHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl FrameLoopHandle {
    /// Cancel the loop and wait for its task to wind down.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(error) = self.task.await
            && error.is_panic()
        {
            debug!(%error, "frame loop task panicked");
        }
    }
}

pub(super) fn spawn(
    engine: Arc<dyn AutomationEngine>,
    events: mpsc::Sender<ServerEvent>,
    settings: FrameSettings,
) -> FrameLoopHandle {
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run(engine, events, settings, cancel.clone()));
    FrameLoopHandle { cancel, task }
}

/// Tick, capture, encode, send, repeat until cancelled.
///
/// Captures run one at a time on this task; when one overruns the interval,
/// `Skip` drops the missed ticks instead of queueing a catch-up burst, so a
/// slow page costs frame rate rather than growing a backlog. Capture errors
/// only cost the current frame.
async fn run(
    engine: Arc<dyn AutomationEngine>,
    events: mpsc::Sender<ServerEvent>,
    settings: FrameSettings,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(Duration::from_millis(settings.interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if !engine.is_launched().await {
            continue;
        }

        match engine
            .screenshot(ImageFormat::Jpeg, settings.jpeg_quality)
            .await
        {
            Ok(bytes) => {
                let frame = ServerEvent::frame(BASE64.encode(bytes));
                // Frames are disposable; never block action traffic on a
                // slow client.
                if events.try_send(frame).is_err() {
                    debug!("frame dropped, client channel full or closed");
                }
            }
            Err(error) => debug!(%error, "frame capture failed"),
        }
    }

    debug!("frame loop stopped");
}
