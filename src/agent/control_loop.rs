//! Perceive, decide, act: the stepwise loop that drives the browser
//! toward one instruction.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use super::{executor, parser, AgentResult, ParsedAction};
use crate::config::AgentSettings;
use crate::llm::{ChatMessage, CompletionClient};
use crate::protocol::{AgentStatus, ServerEvent};
use crate::session::Session;

const SYSTEM_PROMPT: &str = "You control a web browser one action at a time. \
Each turn you receive the current page outline and must reply with exactly \
one action on a single line, nothing else:\n\
click <css-selector>\n\
type <css-selector> <text>\n\
scroll <up|down>\n\
navigate <full-url>\n\
done <short summary of what you found or accomplished>\n\
Rules: the keyword is lowercase and comes first. One action per reply. No \
explanations, no code fences. Selectors must come from the page outline. \
navigate needs a full URL including the scheme. When the task is finished, \
reply with done and a summary the user can read.";

const CORRECTIVE_PROMPT: &str = "That was not a valid action. Reply with \
exactly one action line: click <selector>, type <selector> <text>, scroll \
<direction>, navigate <url>, or done <summary>.";

const BLANK_PAGE_VIEW: &str =
    "The browser is idle on a blank page. No site has been loaded yet.";

const BUDGET_EXHAUSTED_SUMMARY: &str =
    "Step limit reached before the task finished. The result may be incomplete.";

/// Where a finished loop ended up. Model and transport failures are not
/// outcomes; they surface as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopOutcome {
    /// The model declared the task finished.
    Done { summary: String },
    /// The step budget ran out first.
    BudgetExhausted,
}

impl LoopOutcome {
    /// User-facing wrap-up line, matching the final result event.
    pub fn summary(&self) -> &str {
        match self {
            LoopOutcome::Done { summary } => summary,
            LoopOutcome::BudgetExhausted => BUDGET_EXHAUSTED_SUMMARY,
        }
    }
}

enum LoopState {
    Reading,
    Deciding,
    Executing(ParsedAction),
    Finished(LoopOutcome),
}

/// One control loop per instruction. The transcript it accumulates is
/// private to the invocation and dropped with it.
pub struct ControlLoop {
    llm: Arc<dyn CompletionClient>,
    events: mpsc::Sender<ServerEvent>,
    settings: AgentSettings,
}

impl ControlLoop {
    pub fn new(
        llm: Arc<dyn CompletionClient>,
        events: mpsc::Sender<ServerEvent>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            llm,
            events,
            settings,
        }
    }

    /// Drive one instruction to a terminal state.
    ///
    /// Automation failures are folded into the transcript by the executor
    /// and keep the loop alive; a model failure aborts the invocation and
    /// propagates to the caller.
    pub async fn run(&self, session: &mut Session, instruction: &str) -> AgentResult<LoopOutcome> {
        let mut transcript = vec![ChatMessage::system(SYSTEM_PROMPT)];
        let mut steps = 0usize;
        let mut last_result: Option<String> = None;
        let mut state = LoopState::Reading;

        let outcome = loop {
            state = match state {
                LoopState::Reading => {
                    if steps >= self.settings.max_steps {
                        LoopState::Finished(LoopOutcome::BudgetExhausted)
                    } else {
                        let observation = self
                            .observe(session, instruction, last_result.as_deref())
                            .await;
                        transcript.push(ChatMessage::user(observation));
                        LoopState::Deciding
                    }
                }
                LoopState::Deciding => {
                    steps += 1;
                    let reply = self.llm.complete(&transcript).await?;
                    debug!(step = steps, reply = %reply, "model decided");
                    transcript.push(ChatMessage::assistant(reply.clone()));

                    match parser::parse_action(&reply) {
                        ParsedAction::Done { summary } => {
                            LoopState::Finished(LoopOutcome::Done { summary })
                        }
                        ParsedAction::Unrecognized { raw } => {
                            debug!(step = steps, raw = %raw, "unrecognized action, reprompting");
                            transcript.push(ChatMessage::user(CORRECTIVE_PROMPT));
                            LoopState::Reading
                        }
                        action => LoopState::Executing(action),
                    }
                }
                LoopState::Executing(action) => {
                    let result = executor::execute_action(session, &action).await;
                    info!(step = steps, result = %result, "action executed");
                    self.send(ServerEvent::status(result.clone(), AgentStatus::Scraping))
                        .await;
                    transcript.push(ChatMessage::user(result.clone()));
                    last_result = Some(result);

                    tokio::time::sleep(Duration::from_millis(self.settings.settle_delay_ms)).await;
                    LoopState::Reading
                }
                LoopState::Finished(outcome) => break outcome,
            };
        };

        match &outcome {
            LoopOutcome::Done { summary } => {
                info!(steps, "agent finished");
                self.send(ServerEvent::result(summary.clone(), AgentStatus::Done))
                    .await;
            }
            LoopOutcome::BudgetExhausted => {
                info!(steps, "agent hit the step budget");
                self.send(ServerEvent::result(
                    BUDGET_EXHAUSTED_SUMMARY,
                    AgentStatus::Done,
                ))
                .await;
            }
        }

        Ok(outcome)
    }

    /// Compose the user-role message opening a step: what the page looks
    /// like, plus the task on the first step or the previous result after.
    async fn observe(
        &self,
        session: &Session,
        instruction: &str,
        last_result: Option<&str>,
    ) -> String {
        let page_view = if session.current_url().is_empty() {
            BLANK_PAGE_VIEW.to_string()
        } else {
            match session.engine().snapshot(true).await {
                Ok(outline) => outline,
                // A broken snapshot is information too; let the model
                // decide whether to navigate elsewhere.
                Err(error) => format!("Page outline unavailable: {error}"),
            }
        };

        let context = match last_result {
            Some(result) => format!("Previous action result: {result}"),
            None => format!("Task: {instruction}"),
        };

        format!("{page_view}\n\n{context}\n\nReply with exactly one action line.")
    }

    async fn send(&self, event: ServerEvent) {
        // A gone client only costs delivery; the loop still finishes its
        // current instruction.
        let _ = self.events.send(event).await;
    }
}
