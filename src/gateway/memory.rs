//! In-memory gateway for tests. Every mutating call can be scripted with a latency and an
//! optional failure, which is how out-of-order completions are reproduced.

use std::{
    collections::{BTreeMap, VecDeque},
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use chrono::NaiveDate;

use super::{
    entities::{
        ActivityTemplate, Completion, DateRange, EventKind, OwnerId, PlanDraft, PlanEntry, PlanId,
        RecordId, SetKey, SetRecord, TemplateDraft, TemplateId,
    },
    GatewayError, GatewayResult, PersistenceGateway,
};

/// Behaviour of a single scripted call.
#[derive(Debug, Clone, Default)]
pub struct Scripted {
    pub delay: Duration,
    pub error: Option<GatewayError>,
}

impl Scripted {
    pub fn ok_after(delay: Duration) -> Self {
        Self { delay, error: None }
    }

    pub fn fail_after(delay: Duration, error: GatewayError) -> Self {
        Self {
            delay,
            error: Some(error),
        }
    }
}

#[derive(Default)]
struct MemoryState {
    sets: BTreeMap<(NaiveDate, SetKey), SetRecord>,
    completions: BTreeMap<(NaiveDate, TemplateId), bool>,
    templates: Vec<ActivityTemplate>,
    next_template: u32,
    plan: Vec<PlanEntry>,
    next_plan: u32,
    save_script: VecDeque<Scripted>,
    delete_script: VecDeque<Scripted>,
    completion_script: VecDeque<Scripted>,
    template_script: VecDeque<Scripted>,
    save_calls: Vec<SetRecord>,
    delete_calls: Vec<SetKey>,
    completion_calls: Vec<(TemplateId, bool)>,
}

#[derive(Default)]
pub struct MemoryGateway {
    state: Mutex<MemoryState>,
}

impl MemoryGateway {
    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn script_saves(&self, script: impl IntoIterator<Item = Scripted>) {
        self.lock().save_script.extend(script);
    }

    pub fn script_deletes(&self, script: impl IntoIterator<Item = Scripted>) {
        self.lock().delete_script.extend(script);
    }

    pub fn script_completions(&self, script: impl IntoIterator<Item = Scripted>) {
        self.lock().completion_script.extend(script);
    }

    pub fn script_templates(&self, script: impl IntoIterator<Item = Scripted>) {
        self.lock().template_script.extend(script);
    }

    pub fn save_calls(&self) -> Vec<SetRecord> {
        self.lock().save_calls.clone()
    }

    pub fn delete_calls(&self) -> Vec<SetKey> {
        self.lock().delete_calls.clone()
    }

    pub fn completion_calls(&self) -> Vec<(TemplateId, bool)> {
        self.lock().completion_calls.clone()
    }

    pub fn stored_sets(&self, date: NaiveDate) -> Vec<SetRecord> {
        self.lock()
            .sets
            .iter()
            .filter(|((day, _), _)| *day == date)
            .map(|(_, v)| v.clone())
            .collect()
    }

    pub fn stored_completion(&self, date: NaiveDate, template_id: TemplateId) -> Option<bool> {
        self.lock().completions.get(&(date, template_id)).copied()
    }

    pub fn insert_set(&self, date: NaiveDate, record: SetRecord) {
        self.lock().sets.insert((date, record.key()), record);
    }

    pub fn insert_completion(&self, date: NaiveDate, template_id: TemplateId, completed: bool) {
        self.lock().completions.insert((date, template_id), completed);
    }

    pub fn insert_template(&self, name: &str) -> ActivityTemplate {
        let mut state = self.lock();
        state.next_template += 1;
        let template = ActivityTemplate {
            id: TemplateId(state.next_template),
            name: name.into(),
            description: "".into(),
            icon: "".into(),
        };
        state.templates.push(template.clone());
        template
    }

    pub fn templates(&self) -> Vec<ActivityTemplate> {
        self.lock().templates.clone()
    }

    pub fn insert_plan(&self, exercise_id: u32, exercise_name: &str, group_id: &str) -> PlanEntry {
        let mut state = self.lock();
        state.next_plan += 1;
        let entry = PlanEntry {
            id: PlanId(state.next_plan),
            exercise_id,
            exercise_name: exercise_name.into(),
            group_id: group_id.into(),
        };
        state.plan.push(entry.clone());
        entry
    }

    async fn play(next: Option<Scripted>) -> GatewayResult<()> {
        let Scripted { delay, error } = next.unwrap_or_default();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn day_counts(&self, range: DateRange, kind: EventKind) -> BTreeMap<NaiveDate, u64> {
        let state = self.lock();
        let mut counts = BTreeMap::new();
        match kind {
            EventKind::Workout => {
                for (day, _) in state.sets.keys() {
                    if range.contains(*day) {
                        *counts.entry(*day).or_default() += 1;
                    }
                }
            }
            EventKind::CompletedActivity => {
                for ((day, _), completed) in state.completions.iter() {
                    if *completed && range.contains(*day) {
                        *counts.entry(*day).or_default() += 1;
                    }
                }
            }
        }
        counts
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn fetch_logged_sets_for_date(
        &self,
        _owner: &OwnerId,
        date: NaiveDate,
    ) -> GatewayResult<Vec<SetRecord>> {
        Ok(self.stored_sets(date))
    }

    async fn save_logged_set(
        &self,
        _owner: &OwnerId,
        date: NaiveDate,
        record: &SetRecord,
    ) -> GatewayResult<RecordId> {
        let next = {
            let mut state = self.lock();
            state.save_calls.push(record.clone());
            state.save_script.pop_front()
        };
        Self::play(next).await?;
        self.insert_set(date, record.clone());
        Ok(RecordId(format!("{date}/{}", record.set_number)))
    }

    async fn delete_logged_set(
        &self,
        _owner: &OwnerId,
        date: NaiveDate,
        key: &SetKey,
    ) -> GatewayResult<()> {
        let next = {
            let mut state = self.lock();
            state.delete_calls.push(key.clone());
            state.delete_script.pop_front()
        };
        Self::play(next).await?;
        match self.lock().sets.remove(&(date, key.clone())) {
            Some(_) => Ok(()),
            None => Err(GatewayError::constraint("Workout set not found")),
        }
    }

    async fn fetch_activity_completions(
        &self,
        _owner: &OwnerId,
        date: NaiveDate,
    ) -> GatewayResult<Vec<Completion>> {
        Ok(self
            .lock()
            .completions
            .iter()
            .filter(|((day, _), _)| *day == date)
            .map(|((_, template_id), completed)| Completion {
                template_id: *template_id,
                completed: *completed,
            })
            .collect())
    }

    async fn set_activity_completion(
        &self,
        _owner: &OwnerId,
        template_id: TemplateId,
        date: NaiveDate,
        completed: bool,
    ) -> GatewayResult<()> {
        let next = {
            let mut state = self.lock();
            state.completion_calls.push((template_id, completed));
            state.completion_script.pop_front()
        };
        Self::play(next).await?;
        self.insert_completion(date, template_id, completed);
        Ok(())
    }

    async fn fetch_activity_templates(
        &self,
        _owner: &OwnerId,
    ) -> GatewayResult<Vec<ActivityTemplate>> {
        Ok(self.templates())
    }

    async fn create_activity_template(
        &self,
        _owner: &OwnerId,
        draft: &TemplateDraft,
    ) -> GatewayResult<ActivityTemplate> {
        let next = self.lock().template_script.pop_front();
        Self::play(next).await?;
        let template = self.insert_template(&draft.name);
        let template = ActivityTemplate {
            description: draft.description.clone(),
            icon: draft.icon.clone(),
            ..template
        };
        let mut state = self.lock();
        if let Some(stored) = state.templates.iter_mut().find(|v| v.id == template.id) {
            *stored = template.clone();
        }
        Ok(template)
    }

    async fn update_activity_template(
        &self,
        _owner: &OwnerId,
        template: &ActivityTemplate,
    ) -> GatewayResult<()> {
        let next = self.lock().template_script.pop_front();
        Self::play(next).await?;
        let mut state = self.lock();
        let stored = state
            .templates
            .iter_mut()
            .find(|v| v.id == template.id)
            .ok_or_else(|| GatewayError::constraint("Activity template not found"))?;
        *stored = template.clone();
        Ok(())
    }

    async fn delete_activity_template(
        &self,
        _owner: &OwnerId,
        template_id: TemplateId,
    ) -> GatewayResult<()> {
        let next = self.lock().template_script.pop_front();
        Self::play(next).await?;
        let mut state = self.lock();
        state.templates.retain(|v| v.id != template_id);
        state.completions.retain(|(_, id), _| *id != template_id);
        Ok(())
    }

    async fn fetch_exercise_plan(&self, _owner: &OwnerId) -> GatewayResult<Vec<PlanEntry>> {
        let mut entries = self.lock().plan.clone();
        entries.sort_by(|a, b| {
            (&a.group_id, &a.exercise_name, a.id).cmp(&(&b.group_id, &b.exercise_name, b.id))
        });
        Ok(entries)
    }

    async fn add_exercise_to_plan(
        &self,
        _owner: &OwnerId,
        draft: &PlanDraft,
    ) -> GatewayResult<PlanEntry> {
        let planned = self
            .lock()
            .plan
            .iter()
            .any(|v| v.exercise_id == draft.exercise_id && v.group_id == draft.group_id);
        if planned {
            return Err(GatewayError::constraint(
                "This exercise is already in your plan for this muscle group",
            ));
        }
        Ok(self.insert_plan(draft.exercise_id, &draft.exercise_name, &draft.group_id))
    }

    async fn delete_exercise_from_plan(
        &self,
        _owner: &OwnerId,
        plan_id: PlanId,
    ) -> GatewayResult<()> {
        let mut state = self.lock();
        let before = state.plan.len();
        state.plan.retain(|v| v.id != plan_id);
        if state.plan.len() == before {
            Err(GatewayError::constraint("Exercise plan not found"))
        } else {
            Ok(())
        }
    }

    async fn count_active_templates(&self, _owner: &OwnerId) -> GatewayResult<u32> {
        Ok(self.lock().templates.len() as u32)
    }

    async fn count_workout_events(&self, _owner: &OwnerId, range: DateRange) -> GatewayResult<u64> {
        Ok(self.day_counts(range, EventKind::Workout).values().sum())
    }

    async fn count_completed_activities(
        &self,
        _owner: &OwnerId,
        range: DateRange,
    ) -> GatewayResult<u64> {
        Ok(self
            .day_counts(range, EventKind::CompletedActivity)
            .values()
            .sum())
    }

    async fn group_event_counts_by_day(
        &self,
        _owner: &OwnerId,
        range: DateRange,
        kind: EventKind,
    ) -> GatewayResult<BTreeMap<NaiveDate, u64>> {
        Ok(self.day_counts(range, kind))
    }
}
