//! Parse-or-reject boundary for model output.
//!
//! The accepted shape is one JSON document, optionally wrapped in a single markdown
//! code fence. Anything else, including prose around the JSON, is rejected.

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::scans::model::{MenuItem, RawNutritionFacts};

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("empty response")]
    Empty,
    #[error("response is not a JSON {0}")]
    NotJson(&'static str),
    #[error("malformed JSON {0}: {1}")]
    Shape(&'static str, String),
    #[error("invalid value: {0}")]
    Invalid(String),
}

/// Strips one surrounding ```` ``` ```` / ```` ```json ```` fence, if present.
pub fn unfence(text: &str) -> &str {
    let t = text.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    let Some((_lang, body)) = rest.split_once('\n') else {
        return t;
    };
    match body.trim_end().strip_suffix("```") {
        Some(inner) => inner.trim(),
        None => t,
    }
}

fn parse_exact<T: DeserializeOwned>(
    text: &str,
    opener: char,
    what: &'static str,
) -> Result<T, ParseError> {
    let body = unfence(text);
    if body.is_empty() {
        return Err(ParseError::Empty);
    }
    if !body.starts_with(opener) {
        return Err(ParseError::NotJson(what));
    }
    serde_json::from_str(body).map_err(|e| ParseError::Shape(what, e.to_string()))
}

/// Detection output: a non-empty array of menu items.
pub fn parse_menu_items(text: &str) -> Result<Vec<MenuItem>, ParseError> {
    let items: Vec<MenuItem> = parse_exact(text, '[', "array")?;
    if items.is_empty() {
        return Err(ParseError::Invalid("no food items detected".into()));
    }
    for item in &items {
        if item.name.trim().is_empty() {
            return Err(ParseError::Invalid("menu item without a name".into()));
        }
        item.validate().map_err(ParseError::Invalid)?;
    }
    Ok(items)
}

/// Nutrition output: one object with `nutrition_summary` and `items`.
pub fn parse_nutrition(text: &str) -> Result<RawNutritionFacts, ParseError> {
    let raw: RawNutritionFacts = parse_exact(text, '{', "object")?;
    for item in &raw.items {
        item.validate().map_err(ParseError::Invalid)?;
    }
    Ok(raw)
}
