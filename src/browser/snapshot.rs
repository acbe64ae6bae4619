//! Structured textual outline of the current page, used as model input.
//!
//! The outline lists the page identity, a bounded visible-text excerpt, and
//! the interactive elements that expose a selector the model can actually
//! target. Enumeration failures degrade to explanatory lines instead of
//! errors: a partially rendered page is still worth describing.

use chromiumoxide::Page;
use tracing::debug;

const TEXT_EXCERPT_CHARS: usize = 1200;
const MAX_INTERACTIVE_ELEMENTS: usize = 20;
const INTERACTIVE_SELECTOR: &str = "a, button, input, select, textarea, [role='button']";

/// Build the outline for `page`. Never fails: unavailable parts are
/// reported in prose so the model knows what it cannot see.
pub(super) async fn build_outline(page: &Page, interactive: bool) -> String {
    let title = page.get_title().await.ok().flatten().unwrap_or_default();
    let url = page.url().await.ok().flatten().unwrap_or_default();

    let mut outline = String::new();
    if title.is_empty() {
        outline.push_str("Page: (untitled)\n");
    } else {
        outline.push_str(&format!("Page: {title}\n"));
    }
    outline.push_str(&format!("URL: {url}\n"));

    let text = visible_text(page).await;
    if !text.is_empty() {
        outline.push_str("\nContent:\n");
        outline.push_str(&text);
        outline.push('\n');
    }

    if interactive {
        outline.push_str("\nInteractive elements:\n");
        outline.push_str(&interactive_elements(page).await);
        outline.push('\n');
    }

    outline
}

/// Visible page text, bounded to an excerpt.
///
/// `document.body.innerText` covers server-rendered pages and most SPAs;
/// when it comes back empty the rendered HTML is converted instead.
async fn visible_text(page: &Page) -> String {
    let direct: Option<String> = match page.evaluate("document.body.innerText").await {
        Ok(value) => value.into_value().ok(),
        Err(e) => {
            debug!("innerText evaluation failed: {e}");
            None
        }
    };

    let raw = match direct {
        Some(text) if !text.trim().is_empty() => text,
        _ => match page.content().await {
            Ok(html) => html2md::parse_html(&html),
            Err(e) => {
                debug!("page content fetch failed: {e}");
                String::new()
            }
        },
    };

    let tidy = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    truncate_chars(&tidy, TEXT_EXCERPT_CHARS)
}

/// One line per targetable element, numbered, with selector hints the
/// model can feed back into click/type actions.
async fn interactive_elements(page: &Page) -> String {
    let found = match page.find_elements(INTERACTIVE_SELECTOR).await {
        Ok(elements) => elements,
        Err(e) => {
            debug!("interactive element query failed: {e}");
            return "Interactive elements could not be enumerated.".to_string();
        }
    };

    if found.is_empty() {
        return "No interactive elements found on page.".to_string();
    }

    let mut lines = Vec::new();
    for (i, el) in found.iter().take(MAX_INTERACTIVE_ELEMENTS).enumerate() {
        let id = el.attribute("id").await.ok().flatten();
        let name = el.attribute("name").await.ok().flatten();
        let href = el.attribute("href").await.ok().flatten();
        let placeholder = el.attribute("placeholder").await.ok().flatten();
        let text = el.inner_text().await.ok().flatten();
        // Tag name comes via JS since chromiumoxide's Element doesn't expose it
        let tag: Option<String> = el
            .call_js_fn("function() { return this.tagName; }", false)
            .await
            .ok()
            .and_then(|v| v.result.value)
            .and_then(|val| val.as_str().map(|s| s.to_lowercase()));

        let mut selector_hints = Vec::new();
        if let Some(id) = &id
            && !id.is_empty()
        {
            selector_hints.push(format!("#{id}"));
        }
        if let Some(name) = &name
            && !name.is_empty()
        {
            selector_hints.push(format!("[name='{name}']"));
        }
        if selector_hints.is_empty() {
            // Nothing the model could target reliably
            continue;
        }

        let tag_str = tag.unwrap_or_else(|| "element".to_string());
        let label = text
            .map(|t| {
                let trimmed = t.trim().to_string();
                if trimmed.is_empty() {
                    String::new()
                } else {
                    format!(" \"{}\"", truncate_chars(&trimmed, 40))
                }
            })
            .unwrap_or_default();
        let placeholder_part = placeholder
            .filter(|p| !p.is_empty())
            .map(|p| format!(" placeholder=\"{}\"", truncate_chars(&p, 30)))
            .unwrap_or_default();
        let href_part = href
            .filter(|h| !h.is_empty())
            .map(|h| format!(" href=\"{}\"", truncate_chars(&h, 40)))
            .unwrap_or_default();

        lines.push(format!(
            "  {}. <{}{}{}{}> → {}",
            i + 1,
            tag_str,
            label,
            placeholder_part,
            href_part,
            selector_hints.join(" or ")
        ));
    }

    if lines.is_empty() {
        return "Interactive elements found but none expose usable selectors (missing id/name attributes)."
            .to_string();
    }

    lines.join("\n")
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(limit).collect();
        cut.push_str("...");
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_text_untouched() {
        assert_eq!(truncate_chars("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_long_text() {
        assert_eq!(truncate_chars("abcdefgh", 5), "abcde...");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "héllö wörld";
        let cut = truncate_chars(text, 4);
        assert_eq!(cut, "héll...");
    }
}
