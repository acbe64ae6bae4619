//! Turns a raw model reply into exactly one [`ParsedAction`].

use super::ParsedAction;

/// Summary used when the model says `done` with nothing after it.
pub const DEFAULT_DONE_SUMMARY: &str = "Task completed.";

/// Parse the model's reply into a single action.
///
/// The grammar is deliberately strict: lowercase keyword first, one
/// action per line. Anything else comes back as `Unrecognized` so the
/// loop can reprompt instead of guessing.
pub fn parse_action(reply: &str) -> ParsedAction {
    let line = first_action_line(reply);

    if let Some(rest) = line.strip_prefix("click ") {
        return ParsedAction::Click {
            selector: rest.trim().to_string(),
        };
    }

    if let Some(rest) = line.strip_prefix("type ") {
        let rest = rest.trim_start();
        return match rest.split_once(char::is_whitespace) {
            Some((selector, text)) => ParsedAction::Type {
                selector: selector.to_string(),
                text: text.to_string(),
            },
            // Selector only; typing an empty string is still meaningful
            // for clearing a field.
            None => ParsedAction::Type {
                selector: rest.to_string(),
                text: String::new(),
            },
        };
    }

    if let Some(rest) = line.strip_prefix("scroll ") {
        return ParsedAction::Scroll {
            direction: rest.trim().to_string(),
        };
    }

    if let Some(rest) = line.strip_prefix("navigate ") {
        return ParsedAction::Navigate {
            url: rest.trim().to_string(),
        };
    }

    if line == "done" {
        return ParsedAction::Done {
            summary: DEFAULT_DONE_SUMMARY.to_string(),
        };
    }
    if let Some(rest) = line.strip_prefix("done ") {
        let summary = rest.trim();
        return ParsedAction::Done {
            summary: if summary.is_empty() {
                DEFAULT_DONE_SUMMARY.to_string()
            } else {
                summary.to_string()
            },
        };
    }

    ParsedAction::Unrecognized {
        raw: line.to_string(),
    }
}

/// First non-empty line of the reply, with code fences peeled off.
///
/// Models occasionally wrap the action in a fenced block or inline
/// backticks despite being told not to; fence marker lines are skipped
/// and stray backticks trimmed before matching.
fn first_action_line(reply: &str) -> &str {
    reply
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with("```"))
        .map(|line| line.trim_matches('`').trim())
        .find(|line| !line.is_empty())
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_click() {
        assert_eq!(
            parse_action("click #submit-button"),
            ParsedAction::Click {
                selector: "#submit-button".to_string()
            }
        );
    }

    #[test]
    fn keywords_are_case_sensitive() {
        assert_eq!(
            parse_action("Click #x"),
            ParsedAction::Unrecognized {
                raw: "Click #x".to_string()
            }
        );
    }

    #[test]
    fn parses_type_with_text() {
        assert_eq!(
            parse_action("type #search hello world"),
            ParsedAction::Type {
                selector: "#search".to_string(),
                text: "hello world".to_string()
            }
        );
    }

    #[test]
    fn parses_type_without_text() {
        assert_eq!(
            parse_action("type #search"),
            ParsedAction::Type {
                selector: "#search".to_string(),
                text: String::new()
            }
        );
    }

    #[test]
    fn parses_scroll_with_free_form_direction() {
        assert_eq!(
            parse_action("scroll sideways"),
            ParsedAction::Scroll {
                direction: "sideways".to_string()
            }
        );
    }

    #[test]
    fn parses_navigate() {
        assert_eq!(
            parse_action("navigate https://example.com"),
            ParsedAction::Navigate {
                url: "https://example.com".to_string()
            }
        );
    }

    #[test]
    fn bare_done_gets_default_summary() {
        assert_eq!(
            parse_action("done"),
            ParsedAction::Done {
                summary: DEFAULT_DONE_SUMMARY.to_string()
            }
        );
    }

    #[test]
    fn done_with_summary_keeps_it() {
        assert_eq!(
            parse_action("done found the pricing page"),
            ParsedAction::Done {
                summary: "found the pricing page".to_string()
            }
        );
    }

    #[test]
    fn done_with_blank_summary_gets_default() {
        assert_eq!(
            parse_action("done   "),
            ParsedAction::Done {
                summary: DEFAULT_DONE_SUMMARY.to_string()
            }
        );
    }

    #[test]
    fn done_fused_with_other_text_is_unrecognized() {
        assert_eq!(
            parse_action("donework"),
            ParsedAction::Unrecognized {
                raw: "donework".to_string()
            }
        );
    }

    #[test]
    fn first_non_empty_line_wins() {
        assert_eq!(
            parse_action("\n\nclick #a\nclick #b"),
            ParsedAction::Click {
                selector: "#a".to_string()
            }
        );
    }

    #[test]
    fn fenced_reply_is_unwrapped() {
        assert_eq!(
            parse_action("```\nnavigate https://example.com\n```"),
            ParsedAction::Navigate {
                url: "https://example.com".to_string()
            }
        );
    }

    #[test]
    fn fence_language_tag_is_skipped() {
        assert_eq!(
            parse_action("```text\nscroll down\n```"),
            ParsedAction::Scroll {
                direction: "down".to_string()
            }
        );
    }

    #[test]
    fn inline_backticks_are_trimmed() {
        assert_eq!(
            parse_action("`click #next`"),
            ParsedAction::Click {
                selector: "#next".to_string()
            }
        );
    }

    #[test]
    fn empty_reply_is_unrecognized() {
        assert_eq!(
            parse_action("   \n  "),
            ParsedAction::Unrecognized {
                raw: String::new()
            }
        );
    }

    #[test]
    fn prose_is_unrecognized_verbatim() {
        assert_eq!(
            parse_action("I think we should click the login button"),
            ParsedAction::Unrecognized {
                raw: "I think we should click the login button".to_string()
            }
        );
    }
}
