//! Instruction handling: routing, action parsing, execution, and the
//! perceive/decide/act control loop.

mod control_loop;
mod executor;
mod parser;
mod router;

pub use control_loop::{ControlLoop, LoopOutcome};
pub use executor::execute_action;
pub use parser::parse_action;
pub use router::{RouteDecision, Router};

use thiserror::Error;

use crate::browser::BrowserError;
use crate::llm::LlmError;

/// One browser action decoded from a single line of model output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedAction {
    /// Click the element matching a CSS selector.
    Click { selector: String },
    /// Replace the value of an input field, then leave focus there.
    Type { selector: String, text: String },
    /// Scroll the page; only the literal direction "up" scrolls upward.
    Scroll { direction: String },
    /// Load a full URL in the session page.
    Navigate { url: String },
    /// Terminal: the model considers the task finished.
    Done { summary: String },
    /// Anything that failed to match an action keyword, kept verbatim.
    Unrecognized { raw: String },
}

/// Errors that abort an agent invocation.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("model call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("browser call failed: {0}")]
    Browser(#[from] BrowserError),
}

pub type AgentResult<T> = Result<T, AgentError>;
