use std::sync::Arc;

use crate::gateway::{
    entities::{OwnerId, PlanEntry},
    PersistenceGateway,
};

use super::{
    entities::{LoggedSet, SelectedExercise, Session},
    SessionError,
};

/// What the user is currently looking at: one exercise group and, within it, maybe an exercise.
/// Exercises are picked from the owner's exercise plan.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    plan: Vec<PlanEntry>,
    groups: Vec<Arc<str>>,
    exercise: Option<SelectedExercise>,
}

impl Selection {
    pub fn new(plan: Vec<PlanEntry>) -> Self {
        Self {
            plan,
            ..Default::default()
        }
    }

    pub async fn load(
        gateway: &dyn PersistenceGateway,
        owner: &OwnerId,
    ) -> Result<Self, SessionError> {
        Ok(Self::new(gateway.fetch_exercise_plan(owner).await?))
    }

    /// Groups that have at least one planned exercise, in plan order.
    pub fn groups(&self) -> Vec<Arc<str>> {
        let mut groups: Vec<Arc<str>> = vec![];
        for entry in &self.plan {
            if !groups.contains(&entry.group_id) {
                groups.push(entry.group_id.clone());
            }
        }
        groups
    }

    /// Planned exercises of the selected groups.
    pub fn exercises(&self) -> impl Iterator<Item = &PlanEntry> {
        let groups = &self.groups;
        self.plan
            .iter()
            .filter(move |entry| groups.contains(&entry.group_id))
    }

    /// Selects `group` alone. Switching to another group drops the selected exercise, picking
    /// the group that is already selected changes nothing. Returns whether anything changed.
    pub fn select_group(&mut self, group: &str) -> bool {
        if self.groups.iter().any(|v| &**v == group) {
            return false;
        }
        self.groups = vec![group.into()];
        self.exercise = None;
        true
    }

    /// Selects a planned exercise of the selected group.
    pub fn select_exercise(&mut self, exercise_id: u32) -> Result<&SelectedExercise, SessionError> {
        let entry = self
            .exercises()
            .find(|v| v.exercise_id == exercise_id)
            .ok_or(SessionError::UnknownExercise(exercise_id))?;
        let exercise = SelectedExercise {
            exercise_id,
            name: entry.exercise_name.clone(),
            group_id: entry.group_id.clone(),
        };
        Ok(self.exercise.insert(exercise))
    }

    pub fn selected_groups(&self) -> &[Arc<str>] {
        &self.groups
    }

    pub fn selected_exercise(&self) -> Option<&SelectedExercise> {
        self.exercise.as_ref()
    }

    /// Sets of the session logged for the selected exercise, or for the selected groups while
    /// no exercise is picked.
    pub fn filtered_sets(&self, session: &Session) -> Vec<LoggedSet> {
        match &self.exercise {
            Some(exercise) => session.sets_for(exercise).cloned().collect(),
            None => session
                .sets
                .iter()
                .filter(|set| self.groups.contains(&set.group_id))
                .cloned()
                .collect(),
        }
    }
}
