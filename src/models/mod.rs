//! Data models for selector maps, review records and crawl results

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// CSS selectors declared for one rendered page.
///
/// Produced once per page by the selector oracle and never mutated while that
/// page is processed. Every field may be absent; a page without a
/// `review_container` yields no reviews.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorMap {
    pub review_container: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub rating: Option<String>,
    pub reviewer_name: Option<String>,
    pub next_button: Option<String>,
    pub read_more_button: Option<String>,
}

impl SelectorMap {
    /// Coerce a loosely-typed JSON payload into a selector map.
    ///
    /// Unknown keys are ignored, and non-string or blank values become `None`.
    /// Returns `None` when the payload is not an object or carries no usable
    /// selector at all.
    pub fn from_json(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let field = |key: &str| {
            object
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let map = Self {
            review_container: field("review_container"),
            title: field("title"),
            body: field("body"),
            rating: field("rating"),
            reviewer_name: field("reviewer_name"),
            next_button: field("next_button"),
            read_more_button: field("read_more_button"),
        };

        (!map.is_empty()).then_some(map)
    }

    pub fn is_empty(&self) -> bool {
        [
            &self.review_container,
            &self.title,
            &self.body,
            &self.rating,
            &self.reviewer_name,
            &self.next_button,
            &self.read_more_button,
        ]
        .iter()
        .all(|field| field.is_none())
    }
}

/// One review as extracted from a page.
///
/// Rating and reviewer stay raw text: sites render them as stars,
/// "4.5 out of 5" or localized strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub title: Option<String>,
    pub body: Option<String>,
    pub rating: Option<String>,
    pub reviewer: Option<String>,
}

impl ReviewRecord {
    /// True when no field carries any text.
    pub fn is_empty(&self) -> bool {
        [&self.title, &self.body, &self.rating, &self.reviewer]
            .iter()
            .all(|field| field.as_deref().is_none_or(str::is_empty))
    }
}

/// The review fields extracted from every container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Title,
    Body,
    Rating,
    ReviewerName,
}

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Body => "body",
            Field::Rating => "rating",
            Field::ReviewerName => "reviewer_name",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A field that matched nothing inside the container at `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingField {
    pub index: usize,
    pub field: Field,
}

/// Reviews found on one rendered page, in document order of their containers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageResult {
    pub reviews: Vec<ReviewRecord>,
    /// Fields that matched nothing, including those of dropped candidates
    pub missing: Vec<MissingField>,
    /// Containers dropped because none of their fields carried text
    pub dropped: usize,
}

/// Aggregated outcome of a crawl.
///
/// `reviews_count` always equals `reviews.len()`. `error` is only set when the
/// crawl ended abnormally; the reviews gathered up to that point are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlResult<R = ReviewRecord> {
    pub reviews: Vec<R>,
    pub reviews_count: usize,
    pub error: Option<String>,
}

impl<R> CrawlResult<R> {
    pub fn completed(reviews: Vec<R>) -> Self {
        Self {
            reviews_count: reviews.len(),
            reviews,
            error: None,
        }
    }

    pub fn failed(reviews: Vec<R>, error: impl Into<String>) -> Self {
        Self {
            reviews_count: reviews.len(),
            reviews,
            error: Some(error.into()),
        }
    }
}

/// One step of an [`ElementRef`]: the `index`-th match of `selector`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementStep {
    pub selector: String,
    pub index: usize,
}

/// Address of an element in the live page.
///
/// Each step is resolved inside the element found by the previous one, the
/// first step inside the whole document. Static markup and the live session
/// resolve the same path to the same element as long as the DOM is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementRef {
    pub steps: Vec<ElementStep>,
}

impl ElementRef {
    pub fn root(selector: impl Into<String>, index: usize) -> Self {
        Self {
            steps: vec![ElementStep {
                selector: selector.into(),
                index,
            }],
        }
    }

    pub fn child(mut self, selector: impl Into<String>, index: usize) -> Self {
        self.steps.push(ElementStep {
            selector: selector.into(),
            index,
        });
        self
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str(" >> ")?;
            }
            write!(f, "{}[{}]", step.selector, step.index)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn selector_map_coerces_loose_payload() {
        let payload = json!({
            "review_container": " div.review ",
            "title": null,
            "body": 42,
            "rating": "",
            "reviewer_name": "span.author",
            "next_button": ["a.next"],
            "unexpected": "ignored"
        });

        let map = SelectorMap::from_json(&payload).unwrap();
        assert_eq!(map.review_container.as_deref(), Some("div.review"));
        assert_eq!(map.title, None);
        assert_eq!(map.body, None);
        assert_eq!(map.rating, None);
        assert_eq!(map.reviewer_name.as_deref(), Some("span.author"));
        assert_eq!(map.next_button, None);
        assert_eq!(map.read_more_button, None);
    }

    #[test]
    fn selector_map_without_any_selector_is_unusable() {
        assert_eq!(SelectorMap::from_json(&json!({"title": null})), None);
        assert_eq!(SelectorMap::from_json(&json!("div.review")), None);
    }

    #[test]
    fn record_with_only_blank_text_is_empty() {
        let record = ReviewRecord {
            title: Some(String::new()),
            ..ReviewRecord::default()
        };
        assert!(record.is_empty());

        let record = ReviewRecord {
            rating: Some("5".into()),
            ..ReviewRecord::default()
        };
        assert!(!record.is_empty());
    }

    #[test]
    fn crawl_result_serializes_null_error() {
        let result = CrawlResult::completed(vec![ReviewRecord {
            title: Some("Great".into()),
            ..ReviewRecord::default()
        }]);

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["reviews_count"], 1);
        assert_eq!(value["error"], Value::Null);
        assert_eq!(value["reviews"][0]["title"], "Great");
        assert_eq!(value["reviews"][0]["reviewer"], Value::Null);
    }

    #[test]
    fn element_ref_displays_its_path() {
        let element = ElementRef::root("div.review", 2).child("a.more", 0);
        assert_eq!(element.to_string(), "div.review[2] >> a.more[0]");
    }
}
