//! Recurring rule model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{new_record_id, Syncable};
use crate::util::unix_timestamp_millis;

/// How often a recurring rule generates a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "yearly" => Ok(Self::Yearly),
            other => Err(format!("unknown frequency: {other}")),
        }
    }
}

/// A declarative repeat rule that materializes transactions when due.
///
/// `next_generation_at` is the schedule pointer: the next timestamp at which
/// the rule owes a transaction. `last_generated_at` is observability only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringRule {
    /// Unique identifier
    pub id: String,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last mutation timestamp (Unix ms)
    pub updated_at: i64,
    /// Tombstone timestamp; `None` for live records
    pub deleted_at: Option<i64>,
    /// Amount in integer minor units
    pub amount: i64,
    /// Generated transactions are income
    pub is_income: bool,
    /// Route generated transactions to the annual collection
    pub is_annual: bool,
    /// Optional category reference copied onto generated transactions
    pub category_id: Option<String>,
    /// Description copied onto generated transactions
    pub description: String,
    /// Repeat frequency
    pub frequency: Frequency,
    /// Weekday anchor (0 = Monday), informational for weekly rules
    pub day_of_week: Option<u32>,
    /// Day-of-month anchor (1-31), clamped to shorter months
    pub day_of_month: Option<u32>,
    /// Month-of-year anchor (1-12) for yearly rules
    pub month_of_year: Option<u32>,
    /// Schedule pointer: next due timestamp (Unix ms)
    pub next_generation_at: i64,
    /// When the rule last generated a transaction (Unix ms)
    pub last_generated_at: Option<i64>,
    /// Inactive rules are never due
    pub is_active: bool,
}

impl RecurringRule {
    /// Create a new active rule first due at `next_generation_at`.
    #[must_use]
    pub fn new(
        amount: i64,
        is_income: bool,
        is_annual: bool,
        category_id: Option<String>,
        description: impl Into<String>,
        frequency: Frequency,
        next_generation_at: i64,
    ) -> Self {
        let now = unix_timestamp_millis();
        Self {
            id: new_record_id(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
            amount,
            is_income,
            is_annual,
            category_id,
            description: description.into(),
            frequency,
            day_of_week: None,
            day_of_month: None,
            month_of_year: None,
            next_generation_at,
            last_generated_at: None,
            is_active: true,
        }
    }
}

impl Syncable for RecurringRule {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn deleted_at(&self) -> Option<i64> {
        self.deleted_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequency_round_trips_through_str() {
        for frequency in [
            Frequency::Daily,
            Frequency::Weekly,
            Frequency::Monthly,
            Frequency::Yearly,
        ] {
            let parsed: Frequency = frequency.as_str().parse().unwrap();
            assert_eq!(parsed, frequency);
        }
        assert!("hourly".parse::<Frequency>().is_err());
    }

    #[test]
    fn frequency_serializes_lowercase() {
        let json = serde_json::to_string(&Frequency::Monthly).unwrap();
        assert_eq!(json, "\"monthly\"");
    }

    #[test]
    fn new_rule_is_active_without_anchors() {
        let rule = RecurringRule::new(1200, false, false, None, "Rent", Frequency::Monthly, 0);
        assert!(rule.is_active);
        assert!(rule.day_of_month.is_none());
        assert!(rule.last_generated_at.is_none());
    }

    #[test]
    fn wire_format_uses_camel_case_pointer_fields() {
        let rule = RecurringRule::new(1200, false, false, None, "Rent", Frequency::Monthly, 0);
        let json = serde_json::to_string(&rule).unwrap();
        assert!(json.contains("\"nextGenerationAt\""));
        assert!(json.contains("\"lastGeneratedAt\""));
        assert!(json.contains("\"isAnnual\""));
    }
}
