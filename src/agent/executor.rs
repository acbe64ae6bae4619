//! Maps one parsed action onto the session's engine and renders the
//! outcome as a single line the model reads back next step.

use std::time::Duration;

use tracing::{info, warn};

use super::ParsedAction;
use crate::session::Session;

/// Bounded wait after a click. A click that kicks off navigation needs a
/// moment before the next snapshot means anything.
const CLICK_SETTLE: Duration = Duration::from_secs(3);

/// Pixels moved per scroll action.
const SCROLL_AMOUNT: i64 = 600;

/// Execute one action and describe what happened.
///
/// Never fails: automation errors come back as `"... failed: ..."` lines
/// that flow into the agent transcript like any other result, leaving the
/// loop free to try something else.
pub async fn execute_action(session: &mut Session, action: &ParsedAction) -> String {
    let seq = session.next_action_seq();

    match action {
        ParsedAction::Click { selector } => {
            info!(seq, %selector, "click");
            match session.engine().click(selector).await {
                Ok(()) => {
                    session.engine().wait_for_settle(CLICK_SETTLE).await;
                    format!("Clicked {selector}")
                }
                Err(error) => format!("Click failed: {error}"),
            }
        }
        ParsedAction::Type { selector, text } => {
            info!(seq, %selector, chars = text.len(), "type");
            match session.engine().fill(selector, text).await {
                Ok(()) => format!("Typed \"{text}\" into {selector}"),
                Err(error) => format!("Type failed: {error}"),
            }
        }
        ParsedAction::Scroll { direction } => {
            // Only the literal "up" scrolls upward; every other word the
            // model picks means down.
            let delta = if direction == "up" {
                -SCROLL_AMOUNT
            } else {
                SCROLL_AMOUNT
            };
            info!(seq, %direction, delta, "scroll");
            match session.engine().scroll(delta).await {
                Ok(()) => format!(
                    "Scrolled {}",
                    if delta < 0 { "up" } else { "down" }
                ),
                Err(error) => format!("Scroll failed: {error}"),
            }
        }
        ParsedAction::Navigate { url } => {
            info!(seq, %url, "navigate");
            match session.engine().navigate(url).await {
                Ok(page) => {
                    session.set_current_url(page.url.clone());
                    if page.title.is_empty() {
                        format!("Navigated to {}", page.url)
                    } else {
                        format!("Navigated to {} ({})", page.url, page.title)
                    }
                }
                Err(error) => format!("Navigate failed: {error}"),
            }
        }
        ParsedAction::Done { .. } | ParsedAction::Unrecognized { .. } => {
            // The loop consumes these before execution; landing here is a
            // wiring bug worth seeing in the transcript.
            warn!(seq, "non-executable action reached the executor");
            "Nothing to execute".to_string()
        }
    }
}
