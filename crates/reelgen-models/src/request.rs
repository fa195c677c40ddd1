//! The generate request accepted by the API.

use serde::{Deserialize, Deserializer};
use thiserror::Error;
use validator::Validate;

use crate::job::NewJob;

/// Maximum accepted script length in characters.
pub const MAX_SCRIPT_LENGTH: u64 = 5000;

/// Body of `POST /api/videos/generate`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    /// Footage categories; the legacy `category` field (string or array) is accepted too
    #[serde(default, alias = "category", deserialize_with = "one_or_many")]
    #[validate(length(min = 1, message = "At least one category is required"))]
    pub categories: Vec<String>,

    #[validate(length(
        min = 1,
        max = 5000,
        message = "Script must be between 1 and 5000 characters"
    ))]
    pub script: String,

    #[serde(default)]
    pub use_hook: bool,

    #[serde(deserialize_with = "number_or_string")]
    #[validate(range(exclusive_min = 0.0, message = "totalLength must be positive"))]
    pub total_length: f64,

    #[serde(deserialize_with = "number_or_string")]
    #[validate(range(exclusive_min = 0.0, message = "clipDuration must be positive"))]
    pub clip_duration: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("At least one category is required")]
    MissingCategory,

    #[error("Script must not be blank")]
    BlankScript,

    #[error("totalLength must exceed the {hook_duration}s hook when useHook is set")]
    TooShortForHook { hook_duration: f64 },
}

impl GenerateRequest {
    /// Validate and normalize into the fields persisted on a new job.
    ///
    /// Categories are trimmed and deduplicated preserving their order.
    pub fn into_new_job(self, hook_duration: f64) -> Result<NewJob, RequestError> {
        self.validate()
            .map_err(|e| RequestError::Invalid(e.to_string()))?;

        if !self.total_length.is_finite() || !self.clip_duration.is_finite() {
            return Err(RequestError::Invalid(
                "durations must be finite numbers".to_string(),
            ));
        }

        let mut categories: Vec<String> = Vec::with_capacity(self.categories.len());
        for category in self.categories {
            let category = category.trim();
            if !category.is_empty() && !categories.iter().any(|c| c == category) {
                categories.push(category.to_string());
            }
        }
        if categories.is_empty() {
            return Err(RequestError::MissingCategory);
        }

        let script = self.script.trim();
        if script.is_empty() {
            return Err(RequestError::BlankScript);
        }

        if self.use_hook && self.total_length <= hook_duration {
            return Err(RequestError::TooShortForHook { hook_duration });
        }

        Ok(NewJob {
            categories,
            script: script.to_string(),
            use_hook: self.use_hook,
            total_length: self.total_length,
            clip_duration: self.clip_duration,
        })
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

/// Form clients post numbers as strings.
fn number_or_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        Text(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("expected a number, got {s:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> GenerateRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_accepts_category_list() {
        let req = parse(json!({
            "categories": ["gym", "motivation", "gym"],
            "script": "  Keep going.  ",
            "useHook": true,
            "totalLength": 65,
            "clipDuration": 5
        }));
        let job = req.into_new_job(4.0).unwrap();
        assert_eq!(job.categories, vec!["gym", "motivation"]);
        assert_eq!(job.script, "Keep going.");
        assert!(job.use_hook);
        assert_eq!(job.total_length, 65.0);
    }

    #[test]
    fn test_accepts_legacy_category_string_and_numeric_strings() {
        let req = parse(json!({
            "category": "gym",
            "script": "Hello",
            "totalLength": "30",
            "clipDuration": "2.5"
        }));
        let job = req.into_new_job(4.0).unwrap();
        assert_eq!(job.categories, vec!["gym"]);
        assert!(!job.use_hook);
        assert_eq!(job.clip_duration, 2.5);
    }

    #[test]
    fn test_rejects_non_positive_durations() {
        let req = parse(json!({
            "categories": ["gym"],
            "script": "Hello",
            "totalLength": 30,
            "clipDuration": 0
        }));
        assert!(matches!(req.into_new_job(4.0), Err(RequestError::Invalid(_))));
    }

    #[test]
    fn test_rejects_missing_categories() {
        let req = parse(json!({
            "script": "Hello",
            "totalLength": 30,
            "clipDuration": 5
        }));
        assert!(matches!(req.into_new_job(4.0), Err(RequestError::Invalid(_))));

        let req = parse(json!({
            "categories": ["  "],
            "script": "Hello",
            "totalLength": 30,
            "clipDuration": 5
        }));
        assert_eq!(req.into_new_job(4.0), Err(RequestError::MissingCategory));
    }

    #[test]
    fn test_rejects_blank_script() {
        let req = parse(json!({
            "categories": ["gym"],
            "script": "   ",
            "totalLength": 30,
            "clipDuration": 5
        }));
        assert_eq!(req.into_new_job(4.0), Err(RequestError::BlankScript));
    }

    #[test]
    fn test_hook_needs_room() {
        let req = parse(json!({
            "categories": ["gym"],
            "script": "Hi",
            "useHook": true,
            "totalLength": 4,
            "clipDuration": 2
        }));
        assert_eq!(
            req.into_new_job(4.0),
            Err(RequestError::TooShortForHook { hook_duration: 4.0 })
        );
    }

    #[test]
    fn test_rejects_garbage_numbers() {
        let result: Result<GenerateRequest, _> = serde_json::from_value(json!({
            "categories": ["gym"],
            "script": "Hi",
            "totalLength": "long",
            "clipDuration": 2
        }));
        assert!(result.is_err());
    }
}
