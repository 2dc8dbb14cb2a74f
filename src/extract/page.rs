//! Review extraction for one rendered page

use scraper::{ElementRef as Node, Html, Selector};
use tokio::time::sleep;

use super::PageContext;
use super::selector::{compile, extract_field, sanitize};
use crate::crawler::CrawlSettings;
use crate::events::CrawlEvent;
use crate::models::{ElementRef, Field, MissingField, PageResult, ReviewRecord, SelectorMap};
use crate::traits::NavigableSession;

/// Attributes that identify a review container across a re-render, in order of preference.
const SCOPE_ATTRIBUTES: [&str; 4] = ["id", "data-review-id", "data-hook-id", "data-id"];

/// How a container is found again after the page was re-read.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ScopeKey {
    /// Unique value of an identifying attribute
    Attr { name: &'static str, value: String },
    /// Position among all matched containers. Breaks if a reveal inserts or
    /// removes containers before this one.
    Position,
}

/// Sanitized selectors for one page.
struct PageSelectors {
    container: String,
    title: String,
    body: String,
    rating: String,
    reviewer: String,
    read_more: String,
}

impl PageSelectors {
    fn new(map: &SelectorMap) -> Self {
        Self {
            container: sanitize(map.review_container.as_deref()),
            title: sanitize(map.title.as_deref()),
            body: sanitize(map.body.as_deref()),
            rating: sanitize(map.rating.as_deref()),
            reviewer: sanitize(map.reviewer_name.as_deref()),
            read_more: sanitize(map.read_more_button.as_deref()),
        }
    }

    fn field(&self, field: Field) -> &str {
        match field {
            Field::Title => &self.title,
            Field::Body => &self.body,
            Field::Rating => &self.rating,
            Field::ReviewerName => &self.reviewer,
        }
    }

    fn container_selector(&self, ctx: PageContext<'_>) -> Option<Selector> {
        let reason = if self.container.is_empty() {
            "empty review_container selector".to_string()
        } else {
            match Selector::parse(&self.container) {
                Ok(selector) => return Some(selector),
                Err(e) => format!("invalid review_container selector: {e:?}"),
            }
        };

        ctx.emit(CrawlEvent::UnparseablePage {
            page: ctx.page,
            selector: self.container.clone(),
            reason,
        });
        None
    }

    fn extract(
        &self,
        scope: Node<'_>,
        index: usize,
        ctx: PageContext<'_>,
    ) -> (ReviewRecord, Vec<MissingField>) {
        let mut missing = Vec::new();
        let mut read = |field: Field| {
            let selector = self.field(field);
            let value = extract_field(scope, selector, ctx);
            if value.is_none() {
                ctx.emit(CrawlEvent::FieldMissing {
                    page: ctx.page,
                    index,
                    field,
                    selector: selector.to_string(),
                });
                missing.push(MissingField { index, field });
            }
            value
        };

        let record = ReviewRecord {
            title: read(Field::Title),
            body: read(Field::Body),
            rating: read(Field::Rating),
            reviewer: read(Field::ReviewerName),
        };

        (record, missing)
    }

    /// Identify every container so it can be found again after a reveal.
    fn scope_keys(&self, markup: &str, ctx: PageContext<'_>) -> Option<Vec<ScopeKey>> {
        let container = self.container_selector(ctx)?;
        let document = Html::parse_document(markup);
        let nodes: Vec<Node<'_>> = document.select(&container).collect();

        let keys = nodes
            .iter()
            .map(|node| {
                SCOPE_ATTRIBUTES
                    .iter()
                    .find_map(|&name| {
                        let value = node.value().attr(name)?.trim();
                        let unique = !value.is_empty()
                            && nodes
                                .iter()
                                .filter(|other| other.value().attr(name).map(str::trim) == Some(value))
                                .count()
                                == 1;
                        unique.then(|| ScopeKey::Attr {
                            name,
                            value: value.to_string(),
                        })
                    })
                    .unwrap_or(ScopeKey::Position)
            })
            .collect();

        Some(keys)
    }

    /// Address of the read-more control inside the container, if it has one.
    fn read_more_control(&self, markup: &str, key: &ScopeKey, index: usize) -> Option<ElementRef> {
        let container = Selector::parse(&self.container).ok()?;
        let read_more = Selector::parse(&self.read_more).ok()?;
        let document = Html::parse_document(markup);

        let (position, scope) = locate(&document, &container, key, index, None)?;
        scope.select(&read_more).next()?;

        Some(ElementRef::root(&self.container, position).child(&self.read_more, 0))
    }

    fn extract_at(
        &self,
        markup: &str,
        key: &ScopeKey,
        index: usize,
        ctx: PageContext<'_>,
    ) -> Option<(ReviewRecord, Vec<MissingField>)> {
        let container = Selector::parse(&self.container).ok()?;
        let document = Html::parse_document(markup);

        let (_, scope) = locate(&document, &container, key, index, Some(ctx))?;
        Some(self.extract(scope, index, ctx))
    }
}

/// Find a container again, by attribute when possible, else by position.
fn locate<'d>(
    document: &'d Html,
    container: &Selector,
    key: &ScopeKey,
    index: usize,
    report: Option<PageContext<'_>>,
) -> Option<(usize, Node<'d>)> {
    if let ScopeKey::Attr { name, value } = key {
        let found = document
            .select(container)
            .enumerate()
            .find(|(_, node)| node.value().attr(name).map(str::trim) == Some(value.as_str()));
        if found.is_some() {
            return found;
        }

        if let Some(ctx) = report {
            ctx.emit(CrawlEvent::ScopeFallback {
                page: ctx.page,
                index,
                attribute: format!("{name}={value}"),
            });
        }
    }

    document.select(container).enumerate().nth(index)
}

impl PageResult {
    fn absorb(&mut self, record: ReviewRecord, missing: Vec<MissingField>) {
        self.missing.extend(missing);
        if record.is_empty() {
            self.dropped += 1;
        } else {
            self.reviews.push(record);
        }
    }
}

/// Extract the reviews visible in `markup`.
///
/// Containers whose fields all come back empty are dropped: they are usually
/// ad slots or widgets that happen to match the container selector.
pub fn parse_page(markup: &str, map: &SelectorMap, ctx: PageContext<'_>) -> PageResult {
    let selectors = PageSelectors::new(map);
    let mut result = PageResult::default();

    let Some(container) = selectors.container_selector(ctx) else {
        return result;
    };

    let document = Html::parse_document(markup);
    for (index, scope) in document.select(&container).enumerate() {
        let (record, missing) = selectors.extract(scope, index, ctx);
        result.absorb(record, missing);
    }

    result
}

/// Like [`parse_page`], but first expands truncated reviews through their
/// read-more control in the live session.
///
/// A failed expansion is reported and the container is read as it was.
pub async fn parse_page_interactive(
    session: &mut dyn NavigableSession,
    markup: &str,
    map: &SelectorMap,
    ctx: PageContext<'_>,
    settings: &CrawlSettings,
) -> PageResult {
    let selectors = PageSelectors::new(map);
    if selectors.read_more.is_empty() || compile(&selectors.read_more, ctx).is_none() {
        return parse_page(markup, map, ctx);
    }

    let Some(keys) = selectors.scope_keys(markup, ctx) else {
        return PageResult::default();
    };

    let mut current = markup.to_string();
    let mut result = PageResult::default();

    for (index, key) in keys.iter().enumerate() {
        let revealed = match selectors.read_more_control(&current, key, index) {
            Some(control) => match reveal(session, &control, settings).await {
                Ok(refreshed) => Some(refreshed),
                Err(e) => {
                    ctx.emit(CrawlEvent::ReadMoreFailed {
                        page: ctx.page,
                        index,
                        error: format!("{e:#}"),
                    });
                    None
                }
            },
            None => None,
        };

        let extracted = match revealed {
            Some(refreshed) => {
                let before = std::mem::replace(&mut current, refreshed);
                selectors.extract_at(&current, key, index, ctx).or_else(|| {
                    ctx.emit(CrawlEvent::ReadMoreFailed {
                        page: ctx.page,
                        index,
                        error: "review container missing after expansion".to_string(),
                    });
                    selectors.extract_at(&before, key, index, ctx)
                })
            }
            None => selectors.extract_at(&current, key, index, ctx),
        };

        if let Some((record, missing)) = extracted {
            result.absorb(record, missing);
        }
    }

    result
}

async fn reveal(
    session: &mut dyn NavigableSession,
    control: &ElementRef,
    settings: &CrawlSettings,
) -> anyhow::Result<String> {
    session.scroll_into_view(control).await?;
    sleep(settings.read_more_debounce).await;
    session.activate(control).await?;
    sleep(settings.read_more_settle).await;
    session.current_markup().await
}
