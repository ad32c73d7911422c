use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted record of one processing task, keyed by the caller's key.
///
/// Timestamps are plain fields: whoever mutates the job stamps it, the store
/// only persists what it is given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub key: String,
    pub input_text: String,
    pub output_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// A fresh job with no output yet.
    pub fn new(key: impl Into<String>, input_text: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            input_text: input_text.into(),
            output_text: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the input if it differs. Returns whether anything changed.
    pub fn update_input(&mut self, input_text: &str, now: DateTime<Utc>) -> bool {
        if self.input_text == input_text {
            return false;
        }
        self.input_text = input_text.to_string();
        self.touch(now);
        true
    }

    pub fn set_output(&mut self, output_text: impl Into<String>, now: DateTime<Utc>) {
        self.output_text = Some(output_text.into());
        self.touch(now);
    }

    // updated_at never moves backwards, even if the clock does
    fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.updated_at {
            self.updated_at = now;
        }
    }
}
