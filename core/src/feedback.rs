//! Structured feedback and the validator that turns raw analysis output into it.
//!
//! The validator is strict on structure (keys, types, score bounds) and lenient on
//! enrichment: reported keywords outside the scenario's required set are dropped
//! and logged rather than failing the request.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Number, Value};
use utoipa::ToSchema;

use crate::scenario::Scenario;

pub const SCORE_MIN: i64 = 1;
pub const SCORE_MAX: i64 = 10;

pub const KEY_GOAL_ACHIEVED: &str = "goalAchieved";
pub const KEY_KEYWORDS_USED: &str = "keywordsUsed";
pub const KEY_SCORES: &str = "scores";
pub const KEY_ASSESSMENT: &str = "assessment";

/// The exact key set the analysis prompt asks for, with the type each key must have.
/// Shared by the prompt synthesizer and the validator.
pub const FEEDBACK_KEYS: [(&str, &str); 4] = [
    (KEY_GOAL_ACHIEVED, "boolean"),
    (KEY_KEYWORDS_USED, "array of strings"),
    (KEY_SCORES, "object mapping scale name to integer 1-10"),
    (KEY_ASSESSMENT, "string"),
];

/// Scoring result of one analysis request.
///
/// Only [`validate`] constructs a `Feedback`; once built it cannot be changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    goal_achieved: bool,
    /// Subset of the scenario's required keywords, in scenario spelling
    keywords_used: Vec<String>,
    /// Named scales, each within 1..=10
    scores: BTreeMap<String, i64>,
    assessment: String,
}

impl Feedback {
    pub fn goal_achieved(&self) -> bool {
        self.goal_achieved
    }

    pub fn keywords_used(&self) -> &[String] {
        &self.keywords_used
    }

    pub fn scores(&self) -> &BTreeMap<String, i64> {
        &self.scores
    }

    pub fn assessment(&self) -> &str {
        &self.assessment
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedbackError {
    #[error("analysis output is not a JSON object: {0}")]
    Unparseable(String),

    #[error("missing key '{0}'")]
    MissingKey(&'static str),

    #[error("key '{key}' must be {expected}")]
    WrongType { key: String, expected: &'static str },

    #[error("score '{scale}' is {value}, outside {min}..={max}")]
    ScoreOutOfRange {
        scale: String,
        value: Number,
        min: i64,
        max: i64,
    },
}

impl FeedbackError {
    /// The offending key, when there is one.
    pub fn key(&self) -> Option<String> {
        match self {
            FeedbackError::Unparseable(_) => None,
            FeedbackError::MissingKey(key) => Some((*key).to_string()),
            FeedbackError::WrongType { key, .. } => Some(key.clone()),
            FeedbackError::ScoreOutOfRange { scale, .. } => Some(format!("{KEY_SCORES}.{scale}")),
        }
    }
}

/// Validate raw analysis output against the feedback schema and the scenario.
pub fn validate(raw: &str, scenario: &Scenario) -> Result<Feedback, FeedbackError> {
    let value: Value = serde_json::from_str(strip_code_fence(raw))
        .map_err(|e| FeedbackError::Unparseable(e.to_string()))?;
    let object = match value {
        Value::Object(object) => object,
        other => {
            return Err(FeedbackError::Unparseable(format!(
                "expected an object, got {}",
                json_type_name(&other)
            )));
        }
    };

    let goal_achieved = required(&object, KEY_GOAL_ACHIEVED)?
        .as_bool()
        .ok_or_else(|| wrong_type(KEY_GOAL_ACHIEVED))?;

    let reported_keywords = required(&object, KEY_KEYWORDS_USED)?
        .as_array()
        .ok_or_else(|| wrong_type(KEY_KEYWORDS_USED))?
        .iter()
        .map(|item| item.as_str().ok_or_else(|| wrong_type(KEY_KEYWORDS_USED)))
        .collect::<Result<Vec<&str>, _>>()?;

    let raw_scores = required(&object, KEY_SCORES)?
        .as_object()
        .ok_or_else(|| wrong_type(KEY_SCORES))?;

    let assessment = required(&object, KEY_ASSESSMENT)?
        .as_str()
        .ok_or_else(|| wrong_type(KEY_ASSESSMENT))?
        .to_string();

    for key in object.keys() {
        if !FEEDBACK_KEYS.iter().any(|(known, _)| known == key) {
            tracing::debug!(key = %key, "ignoring unexpected key in analysis output");
        }
    }

    let mut typed_scores = Vec::with_capacity(raw_scores.len());
    for (scale, value) in raw_scores {
        let number = integer_score(value).ok_or_else(|| FeedbackError::WrongType {
            key: format!("{KEY_SCORES}.{scale}"),
            expected: "integer",
        })?;
        typed_scores.push((scale, number));
    }

    let mut scores = BTreeMap::new();
    for (scale, number) in typed_scores {
        match number
            .as_i64()
            .filter(|value| (SCORE_MIN..=SCORE_MAX).contains(value))
        {
            Some(value) => {
                scores.insert(scale.clone(), value);
            }
            None => {
                return Err(FeedbackError::ScoreOutOfRange {
                    scale: scale.clone(),
                    value: number.clone(),
                    min: SCORE_MIN,
                    max: SCORE_MAX,
                });
            }
        }
    }

    let keywords_used = filter_keywords(&reported_keywords, scenario);

    Ok(Feedback {
        goal_achieved,
        keywords_used,
        scores,
        assessment,
    })
}

/// Keep only keywords from the scenario's required set, in scenario spelling.
fn filter_keywords(reported: &[&str], scenario: &Scenario) -> Vec<String> {
    let mut kept: Vec<String> = Vec::new();
    let mut dropped: Vec<&str> = Vec::new();

    for keyword in reported.iter().copied() {
        let needle = keyword.trim();
        match scenario
            .required_keywords
            .iter()
            .find(|required| required.trim().eq_ignore_ascii_case(needle))
        {
            Some(required) => {
                if !kept.contains(required) {
                    kept.push(required.clone());
                }
            }
            None => dropped.push(keyword),
        }
    }

    if !dropped.is_empty() {
        tracing::warn!(
            scenario_id = scenario.id,
            dropped = ?dropped,
            "dropping reported keywords outside the scenario's required set"
        );
    }

    kept
}

fn required<'a>(
    object: &'a Map<String, Value>,
    key: &'static str,
) -> Result<&'a Value, FeedbackError> {
    object.get(key).ok_or(FeedbackError::MissingKey(key))
}

/// Any JSON integer, including ones too large for `i64`.
fn integer_score(value: &Value) -> Option<&Number> {
    let Value::Number(number) = value else {
        return None;
    };
    if number.is_i64() || number.is_u64() {
        return Some(number);
    }
    // Integer literals beyond u64 parse as floats.
    number
        .as_f64()
        .filter(|float| float.fract() == 0.0 && float.abs() >= i64::MAX as f64)
        .map(|_| number)
}

fn wrong_type(key: &'static str) -> FeedbackError {
    let expected = FEEDBACK_KEYS
        .iter()
        .find(|(known, _)| *known == key)
        .map(|(_, expected)| *expected)
        .unwrap_or("a valid value");
    FeedbackError::WrongType {
        key: key.to_string(),
        expected,
    }
}

/// Models sometimes wrap JSON in a Markdown fence even when asked not to.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
    else {
        return trimmed;
    };
    let inner = inner.trim();
    // Language tag, with or without a newline after it.
    let body_start = inner
        .find(|c: char| c == '{' || c == '[' || c.is_whitespace())
        .unwrap_or(inner.len());
    inner[body_start..].trim()
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario() -> Scenario {
        Scenario {
            id: 1,
            title: "Demo".to_string(),
            goal: "Book a demo".to_string(),
            customer_persona: "A busy CFO".to_string(),
            required_keywords: vec!["roi".to_string(), "value".to_string()],
        }
    }

    #[test]
    fn out_of_range_score_is_rejected_before_keyword_filtering() {
        let raw = r#"{"goalAchieved": true, "keywordsUsed": ["roi","bogus"], "scores": {"clarity": 11}, "assessment": "ok"}"#;
        let err = validate(raw, &scenario()).unwrap_err();
        assert_eq!(
            err,
            FeedbackError::ScoreOutOfRange {
                scale: "clarity".to_string(),
                value: Number::from(11),
                min: 1,
                max: 10,
            }
        );
        assert_eq!(err.key().as_deref(), Some("scores.clarity"));
    }

    #[test]
    fn unknown_keywords_are_dropped() {
        let raw = r#"{"goalAchieved": true, "keywordsUsed": ["roi","bogus"], "scores": {"clarity": 7}, "assessment": "ok"}"#;
        let feedback = validate(raw, &scenario()).unwrap();
        assert_eq!(feedback.keywords_used(), ["roi".to_string()]);
        assert!(feedback.goal_achieved());
        assert_eq!(feedback.scores().get("clarity"), Some(&7));
        assert_eq!(feedback.assessment(), "ok");
    }

    #[test]
    fn keywords_match_case_insensitively_and_dedupe() {
        let raw = r#"{"goalAchieved": false, "keywordsUsed": ["VALUE"," roi","value"], "scores": {}, "assessment": ""}"#;
        let feedback = validate(raw, &scenario()).unwrap();
        assert_eq!(
            feedback.keywords_used(),
            ["value".to_string(), "roi".to_string()]
        );
    }

    #[test]
    fn validation_is_idempotent() {
        let raw = r#"{"goalAchieved": true, "keywordsUsed": ["Roi","bogus"], "scores": {"clarity": 7, "rapport": 3}, "assessment": "Solid opener."}"#;
        let first = validate(raw, &scenario()).unwrap();
        let reserialized = serde_json::to_string(&first).unwrap();
        let second = validate(&reserialized, &scenario()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn serializes_to_exact_key_set() {
        let raw = r#"{"goalAchieved": true, "keywordsUsed": [], "scores": {"clarity": 5}, "assessment": "ok", "extra": 1}"#;
        let feedback = validate(raw, &scenario()).unwrap();
        let value = serde_json::to_value(&feedback).unwrap();
        let mut keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["assessment", "goalAchieved", "keywordsUsed", "scores"]);
    }

    #[test]
    fn missing_key_is_named() {
        let raw = r#"{"goalAchieved": true, "keywordsUsed": [], "assessment": "ok"}"#;
        assert_eq!(
            validate(raw, &scenario()).unwrap_err(),
            FeedbackError::MissingKey("scores")
        );
    }

    #[test]
    fn mistyped_key_is_named() {
        let raw = r#"{"goalAchieved": "yes", "keywordsUsed": [], "scores": {}, "assessment": "ok"}"#;
        let err = validate(raw, &scenario()).unwrap_err();
        assert_eq!(err.key().as_deref(), Some("goalAchieved"));
    }

    #[test]
    fn fractional_score_is_a_type_error() {
        let raw = r#"{"goalAchieved": true, "keywordsUsed": [], "scores": {"clarity": 7.5}, "assessment": "ok"}"#;
        let err = validate(raw, &scenario()).unwrap_err();
        assert_eq!(err.key().as_deref(), Some("scores.clarity"));
    }

    #[test]
    fn non_string_keyword_is_a_type_error() {
        let raw = r#"{"goalAchieved": true, "keywordsUsed": ["roi", 3], "scores": {}, "assessment": "ok"}"#;
        let err = validate(raw, &scenario()).unwrap_err();
        assert_eq!(err.key().as_deref(), Some("keywordsUsed"));
    }

    #[test]
    fn non_json_output_is_unparseable() {
        let err = validate("Great job overall!", &scenario()).unwrap_err();
        assert!(matches!(err, FeedbackError::Unparseable(_)));

        let err = validate("[1, 2]", &scenario()).unwrap_err();
        assert!(matches!(err, FeedbackError::Unparseable(_)));
    }

    #[test]
    fn fenced_json_is_accepted() {
        let raw = "```json\n{\"goalAchieved\": false, \"keywordsUsed\": [], \"scores\": {}, \"assessment\": \"No attempt made.\"}\n```";
        let feedback = validate(raw, &scenario()).unwrap();
        assert!(!feedback.goal_achieved());
        assert_eq!(feedback.assessment(), "No attempt made.");
    }

    #[test]
    fn every_score_is_type_checked_before_bounds() {
        let raw = r#"{"goalAchieved": true, "keywordsUsed": [], "scores": {"a": 11, "b": "high"}, "assessment": "ok"}"#;
        let err = validate(raw, &scenario()).unwrap_err();
        assert_eq!(
            err,
            FeedbackError::WrongType {
                key: "scores.b".to_string(),
                expected: "integer",
            }
        );
    }

    #[test]
    fn oversized_integer_score_is_out_of_range() {
        for literal in [
            "18446744073709551615",
            "100000000000000000000",
            "-100000000000000000000",
        ] {
            let raw = format!(
                r#"{{"goalAchieved": true, "keywordsUsed": [], "scores": {{"clarity": {literal}}}, "assessment": "ok"}}"#
            );
            let err = validate(&raw, &scenario()).unwrap_err();
            assert!(
                matches!(
                    err,
                    FeedbackError::ScoreOutOfRange { ref scale, .. } if scale == "clarity"
                ),
                "{literal}: {err:?}"
            );
        }
    }

    #[test]
    fn single_line_fence_with_language_tag_is_accepted() {
        let raw = "```json{\"goalAchieved\": true, \"keywordsUsed\": [\"roi\"], \"scores\": {\"clarity\": 6}, \"assessment\": \"ok\"}```";
        let feedback = validate(raw, &scenario()).unwrap();
        assert_eq!(feedback.keywords_used(), ["roi".to_string()]);
        assert_eq!(feedback.scores().get("clarity"), Some(&6));
    }
}
