use std::{fmt::Display, sync::Arc};

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Identifies the user whose records are being read or written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerId(pub Arc<str>);

impl Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

/// Natural key of a persisted set within a day: (exercise, group, set number).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SetKey {
    pub exercise_id: u32,
    pub group_id: Arc<str>,
    pub set_number: u32,
}

/// The persisted shape of a logged set. Process-local identifiers never reach the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetRecord {
    pub exercise_id: u32,
    pub exercise_name: Arc<str>,
    pub group_id: Arc<str>,
    pub set_number: u32,
    pub weight: Option<f64>,
    pub reps: Option<u32>,
}

impl SetRecord {
    pub fn key(&self) -> SetKey {
        SetKey {
            exercise_id: self.exercise_id,
            group_id: self.group_id.clone(),
            set_number: self.set_number,
        }
    }
}

/// Identifier the store assigned to a persisted set row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordId(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TemplateId(pub u32);

impl Display for TemplateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A tracked daily activity the user wants to complete every day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityTemplate {
    pub id: TemplateId,
    pub name: Arc<str>,
    pub description: Arc<str>,
    pub icon: Arc<str>,
}

/// User editable fields of an [ActivityTemplate].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateDraft {
    pub name: Arc<str>,
    pub description: Arc<str>,
    pub icon: Arc<str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub template_id: TemplateId,
    pub completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlanId(pub u32);

impl Display for PlanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An exercise the owner trains for a muscle group. An exercise appears at most once per group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub id: PlanId,
    pub exercise_id: u32,
    pub exercise_name: Arc<str>,
    pub group_id: Arc<str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanDraft {
    pub exercise_id: u32,
    pub exercise_name: Arc<str>,
    pub group_id: Arc<str>,
}

/// Inclusive range of calendar days in the reference timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// `days` calendar days ending at `last`, inclusive.
    pub fn ending_at(last: NaiveDate, days: u32) -> Self {
        let span = i64::from(days.max(1)) - 1;
        Self {
            start: last - Duration::days(span),
            end: last,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Days of the range in ascending order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |day| *day <= end)
    }
}

/// Kinds of dated events the dashboard counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// One logged set.
    Workout,
    /// One activity marked completed.
    CompletedActivity,
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::DateRange;

    #[test]
    fn range_ending_at_spans_inclusive_days() {
        let last = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        let range = DateRange::ending_at(last, 7);
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2024, 2, 25).unwrap());
        assert_eq!(range.days().count(), 7);
        assert!(range.contains(last));
        assert!(!range.contains(NaiveDate::from_ymd_opt(2024, 2, 24).unwrap()));
    }
}
