use scraper::{ElementRef as Node, Selector};

use super::PageContext;
use crate::events::CrawlEvent;

/// Normalize a selector coming from the oracle.
///
/// Runs of `+` collapse to one (the oracle sometimes doubles the sibling
/// combinator) and surrounding whitespace is trimmed. This is not a CSS
/// validator: whatever else is wrong with the selector is left to the parser.
pub fn sanitize(selector: Option<&str>) -> String {
    let Some(selector) = selector else {
        return String::new();
    };

    let mut out = String::with_capacity(selector.len());
    for ch in selector.chars() {
        if ch == '+' && out.ends_with('+') {
            continue;
        }
        out.push(ch);
    }

    out.trim().to_string()
}

/// Parse `selector`, reporting a rejection instead of returning it.
pub(crate) fn compile(selector: &str, ctx: PageContext<'_>) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            ctx.emit(CrawlEvent::SelectorRejected {
                page: ctx.page,
                selector: selector.to_string(),
                error: format!("{e:?}"),
            });
            None
        }
    }
}

/// Trimmed text content of `node`, text nodes joined in document order.
pub(crate) fn text_of(node: Node<'_>) -> String {
    node.text().collect::<String>().trim().to_string()
}

/// Text of the first element under `root` matching `selector`.
///
/// Blank selectors, selectors the parser rejects and selectors matching
/// nothing all give `None`; rejections are reported to the observer.
pub fn extract_field(root: Node<'_>, selector: &str, ctx: PageContext<'_>) -> Option<String> {
    if selector.trim().is_empty() {
        return None;
    }

    let selector = compile(selector, ctx)?;
    root.select(&selector).next().map(text_of)
}
