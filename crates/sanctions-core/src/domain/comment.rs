//! The text written into the claim marker when an item is processed.
//!
//! Format: `"{message} - {YYYY-MM-DD HH:MM} - {operator}"`. History views parse
//! it back when no local ledger row exists for a record.

use chrono::{DateTime, TimeZone};

use super::ids::OperatorId;

const SEPARATOR: &str = " - ";
const STAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedComment {
    pub message: String,
    pub stamp: String,
    pub operator: String,
}

impl ProcessedComment {
    pub fn new<Tz: TimeZone>(message: &str, at: &DateTime<Tz>, operator: &OperatorId) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        Self {
            message: message.to_string(),
            stamp: at.format(STAMP_FORMAT).to_string(),
            operator: operator.as_str().to_string(),
        }
    }

    pub fn render(&self) -> String {
        format!(
            "{}{SEPARATOR}{}{SEPARATOR}{}",
            self.message, self.stamp, self.operator
        )
    }

    /// Recover the parts of an existing comment.
    ///
    /// Needs at least three parts; the operator is the last one and the stamp
    /// the second to last, whatever the message contains.
    pub fn parse(comment: &str) -> Option<Self> {
        let parts: Vec<&str> = comment.split(SEPARATOR).collect();
        if parts.len() < 3 {
            return None;
        }
        let operator = parts[parts.len() - 1];
        let stamp = parts[parts.len() - 2];
        let message = parts[..parts.len() - 2].join(SEPARATOR);
        Some(Self {
            message,
            stamp: stamp.to_string(),
            operator: operator.to_string(),
        })
    }
}
