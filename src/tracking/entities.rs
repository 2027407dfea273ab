use std::{fmt::Display, sync::Arc};

use chrono::NaiveDate;
use uuid::Uuid;

use crate::gateway::entities::{SetKey, SetRecord};

use super::SessionError;

/// Process-local identifier of a set, stable for as long as the session lives. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SetId(Uuid);

impl SetId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for SetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An exercise picked by the user, the thing new sets are created for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedExercise {
    pub exercise_id: u32,
    pub name: Arc<str>,
    pub group_id: Arc<str>,
}

/// One exercise set of the session.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedSet {
    pub id: SetId,
    pub exercise_id: u32,
    pub exercise_name: Arc<str>,
    pub group_id: Arc<str>,
    pub set_number: u32,
    pub weight: Option<f64>,
    pub reps: Option<u32>,
}

impl LoggedSet {
    pub fn from_record(record: SetRecord) -> Self {
        Self {
            id: SetId::generate(),
            exercise_id: record.exercise_id,
            exercise_name: record.exercise_name,
            group_id: record.group_id,
            set_number: record.set_number,
            weight: record.weight,
            reps: record.reps,
        }
    }

    pub fn to_record(&self) -> SetRecord {
        SetRecord {
            exercise_id: self.exercise_id,
            exercise_name: self.exercise_name.clone(),
            group_id: self.group_id.clone(),
            set_number: self.set_number,
            weight: self.weight,
            reps: self.reps,
        }
    }

    pub fn key(&self) -> SetKey {
        SetKey {
            exercise_id: self.exercise_id,
            group_id: self.group_id.clone(),
            set_number: self.set_number,
        }
    }

    pub fn belongs_to(&self, exercise: &SelectedExercise) -> bool {
        self.exercise_id == exercise.exercise_id && self.group_id == exercise.group_id
    }

    /// Whether the user editable fields are equal.
    pub fn same_values(&self, other: &LoggedSet) -> bool {
        self.weight == other.weight && self.reps == other.reps
    }
}

/// Partial update of a [LoggedSet]. The outer `Option` tells whether a field is touched, the
/// inner one whether it is cleared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetPatch {
    pub weight: Option<Option<f64>>,
    pub reps: Option<Option<u32>>,
}

impl SetPatch {
    pub fn weight(weight: Option<f64>) -> Self {
        Self {
            weight: Some(weight),
            reps: None,
        }
    }

    pub fn reps(reps: Option<u32>) -> Self {
        Self {
            weight: None,
            reps: Some(reps),
        }
    }

    pub fn with_reps(self, reps: Option<u32>) -> Self {
        Self {
            reps: Some(reps),
            ..self
        }
    }

    pub fn is_empty(&self) -> bool {
        self.weight.is_none() && self.reps.is_none()
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        match self.weight {
            Some(Some(weight)) if !weight.is_finite() || weight < 0. => Err(
                SessionError::InvalidValue(format!("weight {weight} must be a non-negative number")),
            ),
            _ => Ok(()),
        }
    }

    pub fn apply(&self, set: &mut LoggedSet) {
        if let Some(weight) = self.weight {
            set.weight = weight;
        }
        if let Some(reps) = self.reps {
            set.reps = reps;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Nothing was logged today yet, the user has to start a workout explicitly.
    NotStarted,
    Active,
}

/// The single live workout of a day.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: Uuid,
    pub date: NaiveDate,
    pub sets: Vec<LoggedSet>,
}

impl Session {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            date,
            sets: vec![],
        }
    }

    pub fn sets_for<'a>(&'a self, exercise: &'a SelectedExercise) -> impl Iterator<Item = &'a LoggedSet> {
        self.sets.iter().filter(move |v| v.belongs_to(exercise))
    }
}

#[cfg(test)]
mod tests {
    use super::{LoggedSet, SetId, SetPatch};

    fn blank() -> LoggedSet {
        LoggedSet {
            id: SetId::generate(),
            exercise_id: 1,
            exercise_name: "Bench press".into(),
            group_id: "Chest".into(),
            set_number: 1,
            weight: Some(50.),
            reps: None,
        }
    }

    #[test]
    fn patch_touches_only_given_fields() {
        let mut set = blank();
        SetPatch::reps(Some(10)).apply(&mut set);
        assert_eq!(set.weight, Some(50.));
        assert_eq!(set.reps, Some(10));

        SetPatch::weight(None).apply(&mut set);
        assert_eq!(set.weight, None);
        assert_eq!(set.reps, Some(10));
    }

    #[test]
    fn patch_rejects_negative_weight() {
        assert!(SetPatch::weight(Some(-2.5)).validate().is_err());
        assert!(SetPatch::weight(Some(f64::INFINITY)).validate().is_err());
        assert!(SetPatch::weight(Some(0.)).with_reps(Some(0)).validate().is_ok());
    }
}
