use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{FixedOffset, NaiveDate};
use tracing::{debug, info, instrument, warn};

use crate::{
    config::SyncSettings,
    dashboard::aggregation::{goal_percentage, DailyGoal},
    gateway::{
        entities::{ActivityTemplate, Completion, OwnerId, TemplateDraft, TemplateId},
        GatewayError, PersistenceGateway,
    },
    utils::{clock::Clock, percentage::Percentage},
};

use super::{
    coordinator::{Revision, SaveCoordinator, SaveOutcome, SaveTarget},
    lock,
    notice::{Notice, Notifier},
    SessionError,
};

#[derive(Debug, Clone, Copy)]
struct PendingCompletion {
    date: NaiveDate,
    completed: bool,
}

/// Completion the gateway is known to hold. `None` when no row exists yet.
#[derive(Debug, Clone, Copy)]
struct CompletionBaseline {
    revision: Revision,
    completed: Option<bool>,
    rolled_back: bool,
}

struct ActivityState {
    date: NaiveDate,
    templates: Vec<ActivityTemplate>,
    completions: BTreeMap<TemplateId, bool>,
    baselines: HashMap<TemplateId, CompletionBaseline>,
}

impl ActivityState {
    fn restore(&mut self, template_id: TemplateId, completed: Option<bool>) {
        match completed {
            Some(completed) => {
                self.completions.insert(template_id, completed);
            }
            None => {
                self.completions.remove(&template_id);
            }
        }
    }
}

struct CompletionSaveTarget {
    owner: OwnerId,
    gateway: Arc<dyn PersistenceGateway>,
    state: Arc<Mutex<ActivityState>>,
    notifier: Notifier,
}

#[async_trait]
impl SaveTarget<TemplateId, PendingCompletion> for CompletionSaveTarget {
    async fn persist(
        &self,
        template_id: &TemplateId,
        pending: &PendingCompletion,
    ) -> Result<(), GatewayError> {
        self.gateway
            .set_activity_completion(&self.owner, *template_id, pending.date, pending.completed)
            .await
    }

    fn settled(
        &self,
        template_id: &TemplateId,
        revision: Revision,
        pending: PendingCompletion,
        outcome: SaveOutcome,
    ) {
        let error = {
            let mut state = lock(&self.state);
            if state.date != pending.date {
                return;
            }
            match outcome {
                SaveOutcome::Saved => {
                    let Some(baseline) = state.baselines.get_mut(template_id) else {
                        return;
                    };
                    if revision < baseline.revision {
                        return;
                    }
                    let reapply = baseline.rolled_back;
                    *baseline = CompletionBaseline {
                        revision,
                        completed: Some(pending.completed),
                        rolled_back: false,
                    };
                    if reapply {
                        debug!("Reapplying confirmed completion of activity {template_id}");
                        state.completions.insert(*template_id, pending.completed);
                    }
                    return;
                }
                SaveOutcome::Superseded(error) => {
                    debug!("Dropping stale failure of activity {template_id}: {error}");
                    return;
                }
                SaveOutcome::Failed(error) => {
                    let completed = match state.baselines.get_mut(template_id) {
                        Some(baseline) => {
                            baseline.rolled_back = true;
                            baseline.completed
                        }
                        None => None,
                    };
                    state.restore(*template_id, completed);
                    error
                }
            }
        };

        self.notifier.report(Notice::CompletionSaveFailed {
            template_id: *template_id,
            error,
        });
    }
}

/// Today's activity completions and the templates they belong to.
pub struct ActivityTracker {
    owner: OwnerId,
    gateway: Arc<dyn PersistenceGateway>,
    clock: Arc<dyn Clock>,
    reference: FixedOffset,
    state: Arc<Mutex<ActivityState>>,
    saves: SaveCoordinator<TemplateId, PendingCompletion>,
}

impl ActivityTracker {
    pub fn new(
        owner: OwnerId,
        gateway: Arc<dyn PersistenceGateway>,
        clock: Arc<dyn Clock>,
        settings: &SyncSettings,
        notifier: Notifier,
    ) -> Self {
        let state = Arc::new(Mutex::new(ActivityState {
            date: clock.today(&settings.reference),
            templates: vec![],
            completions: BTreeMap::new(),
            baselines: HashMap::new(),
        }));
        let target = Arc::new(CompletionSaveTarget {
            owner: owner.clone(),
            gateway: gateway.clone(),
            state: state.clone(),
            notifier,
        });
        Self {
            owner,
            gateway,
            saves: SaveCoordinator::new(target, clock.clone(), settings.debounce_window),
            clock,
            reference: settings.reference,
            state,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today(&self.reference)
    }

    #[instrument(skip(self), fields(owner = %self.owner))]
    pub async fn load(&self) -> Result<(), SessionError> {
        let date = self.today();
        let (templates, completions) = tokio::try_join!(
            self.gateway.fetch_activity_templates(&self.owner),
            self.gateway.fetch_activity_completions(&self.owner, date),
        )?;
        self.hydrate(date, templates, completions);
        Ok(())
    }

    /// Replaces templates and completions. Pending toggles of the previous state are dropped.
    pub fn hydrate(
        &self,
        date: NaiveDate,
        templates: Vec<ActivityTemplate>,
        completions: Vec<Completion>,
    ) {
        self.saves.close();
        let baselines = completions
            .iter()
            .map(|v| {
                (
                    v.template_id,
                    CompletionBaseline {
                        revision: Revision::default(),
                        completed: Some(v.completed),
                        rolled_back: false,
                    },
                )
            })
            .collect();
        info!(
            "Loaded {} activity templates, {} completions for {date}",
            templates.len(),
            completions.len()
        );
        *lock(&self.state) = ActivityState {
            date,
            templates,
            completions: completions
                .into_iter()
                .map(|v| (v.template_id, v.completed))
                .collect(),
            baselines,
        };
    }

    /// Flips the completion of `template_id` for today and schedules it to be saved. Returns the
    /// new value.
    pub fn toggle(&self, template_id: TemplateId) -> Result<bool, SessionError> {
        let (date, completed) = {
            let mut guard = lock(&self.state);
            let state = &mut *guard;
            if !state.templates.iter().any(|v| v.id == template_id) {
                return Err(SessionError::UnknownTemplate(template_id));
            }
            let completed = !state.completions.get(&template_id).copied().unwrap_or(false);
            state.completions.insert(template_id, completed);
            state
                .baselines
                .entry(template_id)
                .or_insert(CompletionBaseline {
                    revision: Revision::default(),
                    completed: None,
                    rolled_back: false,
                })
                .rolled_back = false;
            (state.date, completed)
        };

        self.saves
            .schedule(template_id, PendingCompletion { date, completed });
        Ok(completed)
    }

    pub fn is_completed(&self, template_id: TemplateId) -> bool {
        lock(&self.state)
            .completions
            .get(&template_id)
            .copied()
            .unwrap_or(false)
    }

    pub fn templates(&self) -> Vec<ActivityTemplate> {
        lock(&self.state).templates.clone()
    }

    /// Completed activities among the current templates.
    pub fn completed_count(&self) -> u64 {
        let state = lock(&self.state);
        state
            .templates
            .iter()
            .filter(|v| state.completions.get(&v.id).copied().unwrap_or(false))
            .count() as u64
    }

    pub fn daily_goal(&self) -> DailyGoal {
        DailyGoal::from_active_templates(lock(&self.state).templates.len() as u32)
    }

    pub fn progress(&self) -> Percentage {
        goal_percentage(self.completed_count(), self.daily_goal())
    }

    pub fn saving_ids(&self) -> HashSet<TemplateId> {
        self.saves.saving_ids()
    }

    #[instrument(skip(self), fields(owner = %self.owner))]
    pub async fn add_template(&self, draft: TemplateDraft) -> Result<ActivityTemplate, SessionError> {
        if draft.name.trim().is_empty() {
            return Err(SessionError::InvalidValue("Activity name is required".into()));
        }
        let template = self
            .gateway
            .create_activity_template(&self.owner, &draft)
            .await?;
        lock(&self.state).templates.push(template.clone());
        Ok(template)
    }

    /// Replaces the template locally right away, the previous version comes back if the gateway
    /// refuses the change.
    #[instrument(skip(self), fields(owner = %self.owner))]
    pub async fn update_template(&self, template: ActivityTemplate) -> Result<(), SessionError> {
        if template.name.trim().is_empty() {
            return Err(SessionError::InvalidValue("Activity name is required".into()));
        }
        let previous = {
            let mut state = lock(&self.state);
            let stored = state
                .templates
                .iter_mut()
                .find(|v| v.id == template.id)
                .ok_or(SessionError::UnknownTemplate(template.id))?;
            std::mem::replace(stored, template.clone())
        };

        let result = self
            .gateway
            .update_activity_template(&self.owner, &template)
            .await;
        if let Err(e) = &result {
            warn!("Failed to update activity template {}: {e}", template.id);
            let mut state = lock(&self.state);
            if let Some(stored) = state.templates.iter_mut().find(|v| v.id == template.id) {
                *stored = previous;
            }
        }
        result.map_err(SessionError::from)
    }

    /// Removes the template together with today's completion. Everything is put back in place
    /// if the gateway fails.
    #[instrument(skip(self), fields(owner = %self.owner))]
    pub async fn delete_template(&self, template_id: TemplateId) -> Result<(), SessionError> {
        let (index, template, completed, baseline) = {
            let mut guard = lock(&self.state);
            let state = &mut *guard;
            let index = state
                .templates
                .iter()
                .position(|v| v.id == template_id)
                .ok_or(SessionError::UnknownTemplate(template_id))?;
            (
                index,
                state.templates.remove(index),
                state.completions.remove(&template_id),
                state.baselines.remove(&template_id),
            )
        };

        self.saves.cancel(&template_id);
        self.saves.wait_settled(&template_id).await;

        let result = self
            .gateway
            .delete_activity_template(&self.owner, template_id)
            .await;
        let reschedule = match &result {
            Ok(()) => None,
            Err(e) => {
                warn!("Failed to delete activity template {template_id}: {e}");
                let mut guard = lock(&self.state);
                let state = &mut *guard;
                let index = index.min(state.templates.len());
                state.templates.insert(index, template);
                state.restore(template_id, completed);
                if let Some(baseline) = baseline {
                    state.baselines.insert(template_id, baseline);
                }
                let confirmed = baseline.and_then(|v| v.completed);
                completed
                    .filter(|v| confirmed != Some(*v))
                    .map(|completed| PendingCompletion {
                        date: state.date,
                        completed,
                    })
            }
        };

        // The cancelled toggle never reached the gateway.
        if let Some(pending) = reschedule {
            self.saves.schedule(template_id, pending);
        }
        result.map_err(SessionError::from)
    }

    pub async fn flush(&self) {
        self.saves.flush().await;
    }

    pub fn close(&self) {
        self.saves.close();
    }
}
