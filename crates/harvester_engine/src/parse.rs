use std::collections::BTreeMap;

use harvester_core::{Locator, ResolvedRecord};
use scraper::{Html, Selector};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid json: {0}")]
    Json(String),
    #[error("expected a json object, found {0}")]
    NotAnObject(&'static str),
    #[error("invalid selector {selector:?}")]
    Selector { selector: String },
}

/// Turns a decoded detail document into a record.
///
/// The label is left to the pipeline, which normalizes it against the work item.
pub trait RecordParser: Send + Sync {
    fn parse(&self, locator: &Locator, body: &str) -> Result<ResolvedRecord, ParseError>;
}

/// Takes the fields of a top-level JSON object verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRecordParser;

impl RecordParser for JsonRecordParser {
    fn parse(&self, locator: &Locator, body: &str) -> Result<ResolvedRecord, ParseError> {
        let value: Value =
            serde_json::from_str(body).map_err(|err| ParseError::Json(err.to_string()))?;
        let Value::Object(map) = value else {
            return Err(ParseError::NotAnObject(json_kind(&value)));
        };
        let mut record = ResolvedRecord::new(Some(locator.to_string()));
        record.fields = map.into_iter().collect::<BTreeMap<_, _>>();
        Ok(record)
    }
}

/// Collects `<title>`, the first `<h1>` and every named `<meta>` tag.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlMetaParser;

impl RecordParser for HtmlMetaParser {
    fn parse(&self, locator: &Locator, body: &str) -> Result<ResolvedRecord, ParseError> {
        let document = Html::parse_document(body);
        let mut record = ResolvedRecord::new(Some(locator.to_string()));

        if let Some(title) = first_text(&document, "title")? {
            record = record.with_field("title", Value::String(title));
        }
        if let Some(heading) = first_text(&document, "h1")? {
            record = record.with_field("heading", Value::String(heading));
        }

        let meta = selector("meta[name][content]")?;
        for element in document.select(&meta) {
            let value = element.value();
            if let (Some(name), Some(content)) = (value.attr("name"), value.attr("content")) {
                let name = name.trim().to_ascii_lowercase();
                if !name.is_empty() {
                    record = record.with_field(name, Value::String(content.trim().to_string()));
                }
            }
        }
        Ok(record)
    }
}

fn selector(css: &str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|_| ParseError::Selector {
        selector: css.to_string(),
    })
}

fn first_text(document: &Html, css: &str) -> Result<Option<String>, ParseError> {
    let selector = selector(css)?;
    Ok(document
        .select(&selector)
        .next()
        .map(|element| normalize_whitespace(&element.text().collect::<String>()))
        .filter(|text| !text.is_empty()))
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
