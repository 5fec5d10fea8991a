//! Result and range models exchanged between toolkit components.

use crate::consts::{FAIL_MESSAGE, PASS_MESSAGE};
use crate::error::CoreError;
use crate::types::NonEmptyStr;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A closed UTC datetime interval where `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateTimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl DateTimeRange {
    /// # Errors
    /// Returns [`CoreError::Validation`] when `start` is later than `end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, CoreError> {
        if start > end {
            return Err(CoreError::validation(format!(
                "Value of end '{end}' should be greater than or equal to start '{start}'"
            )));
        }
        Ok(Self { start, end })
    }

    #[must_use]
    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    #[must_use]
    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }

    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

impl<'de> Deserialize<'de> for DateTimeRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        }

        let raw = Raw::deserialize(deserializer)?;
        Self::new(raw.start, raw.end).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Success {
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u64>,
}

impl Success {
    pub fn new(data: impl Into<Value>) -> Self {
        Self { data: data.into(), code: None }
    }

    #[must_use]
    pub const fn with_code(mut self, code: u64) -> Self {
        self.code = Some(code);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub error: NonEmptyStr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Map<String, Value>>,
}

impl Failure {
    pub const fn new(error: NonEmptyStr) -> Self {
        Self { error, extra: None }
    }

    /// Builds a failure from any displayable error.
    pub fn from_error(err: &impl std::fmt::Display) -> Self {
        Self { error: NonEmptyStr::or_default(err.to_string(), FAIL_MESSAGE), extra: None }
    }
}

/// Either a [`Success`] or a [`Failure`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outcome {
    Success(Success),
    Failure(Failure),
}

impl Outcome {
    /// Classifies a JSON object: a `data` key means success, an `error` key means failure.
    ///
    /// # Errors
    /// Returns [`CoreError::Validation`] for any other shape.
    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        let keys = value.as_object().map(|m| (m.contains_key("data"), m.contains_key("error")));
        match keys {
            Some((true, _)) => Ok(Self::Success(serde_json::from_value(value)?)),
            Some((false, true)) => Ok(Self::Failure(serde_json::from_value(value)?)),
            _ => Err(CoreError::validation("Value is neither a success nor a failure")),
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl<'de> Deserialize<'de> for Outcome {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Self::from_value(Value::deserialize(deserializer)?).map_err(serde::de::Error::custom)
    }
}

/// Aggregated results of a batch operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiResult {
    #[serde(default)]
    pub passed: Vec<Value>,
    #[serde(default)]
    pub failed: Vec<Failure>,
    #[serde(default)]
    pub summary: Option<String>,
}

impl MultiResult {
    pub fn push(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Success(s) => self.passed.push(s.data),
            Outcome::Failure(f) => self.failed.push(f),
        }
    }

    /// Sets `summary` to `success` or `failure` depending on collected failures.
    pub fn summarize(&mut self) {
        let verdict = if self.failed.is_empty() { PASS_MESSAGE } else { FAIL_MESSAGE };
        self.summary = Some(format!(
            "{verdict}: {} passed, {} failed",
            self.passed.len(),
            self.failed.len()
        ));
    }
}
