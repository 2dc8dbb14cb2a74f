//! Picking the "next page" control out of ambiguous pagination markup

use scraper::{Html, Selector};
use url::Url;

use super::PageContext;
use super::selector::{compile, text_of};
use crate::models::ElementRef;

/// The element that moves forward through the review listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextControl {
    pub element: ElementRef,
    pub text: String,
    /// Trimmed, non-empty `href` of the element
    pub href: Option<String>,
    /// `<base href>` declared by the document
    pub base_href: Option<String>,
}

impl NextControl {
    /// Absolute URL to load for the next page.
    ///
    /// `None` means the control has nothing to follow (no href, a fragment or
    /// a `javascript:` link) and has to be activated in place.
    pub fn target(&self, page_url: &str) -> Option<Url> {
        let href = self.href.as_deref()?;
        if href.starts_with('#') || href.to_ascii_lowercase().starts_with("javascript:") {
            return None;
        }

        let page = Url::parse(page_url).ok()?;
        let base = self
            .base_href
            .as_deref()
            .and_then(|base| page.join(base).ok())
            .unwrap_or(page);

        base.join(href).ok()
    }
}

/// Result of looking for the next control on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextLookup {
    Found(NextControl),
    /// Nothing matched, or every match reads as "previous"
    Exhausted,
    /// The selector does not parse
    Rejected,
}

/// Find the forward pagination control among the matches of `next_selector`.
///
/// Sites often style "previous" and "next" with the same class, so the first
/// match whose text does not mention "prev" wins.
pub fn resolve_next(markup: &str, next_selector: &str, ctx: PageContext<'_>) -> NextLookup {
    let Some(selector) = compile(next_selector, ctx) else {
        return NextLookup::Rejected;
    };
    let document = Html::parse_document(markup);

    let Some((index, node)) = document
        .select(&selector)
        .enumerate()
        .find(|(_, node)| !text_of(*node).to_lowercase().contains("prev"))
    else {
        return NextLookup::Exhausted;
    };

    let base_href = Selector::parse("base[href]")
        .ok()
        .and_then(|base| document.select(&base).next())
        .and_then(|base| base.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .map(str::to_string);

    NextLookup::Found(NextControl {
        element: ElementRef::root(next_selector, index),
        text: text_of(node),
        href: node
            .value()
            .attr("href")
            .map(str::trim)
            .filter(|href| !href.is_empty())
            .map(str::to_string),
        base_href,
    })
}
