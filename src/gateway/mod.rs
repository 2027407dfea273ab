//! The narrow interface between the tracking layer and a remote store.
//!
//! [PersistenceGateway] is everything the tracking layer knows about storage. It has no
//! transactions, may be slow and may fail. [file_gateway::FileGateway] is the implementation
//! shipped with the binary.

pub mod entities;
pub mod file_gateway;
#[cfg(test)]
pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use entities::{
    ActivityTemplate, Completion, DateRange, EventKind, OwnerId, PlanDraft, PlanEntry, PlanId,
    RecordId, SetKey, SetRecord, TemplateDraft, TemplateId,
};

/// Failures a gateway call can report. Retrying is the gateway implementation's business, the
/// tracking layer reports every failure once and rolls back.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Not authenticated")]
    NotAuthenticated,
    #[error("Owner '{0}' not found")]
    OwnerNotFound(OwnerId),
    #[error("{0}")]
    ConstraintViolation(String),
    #[error("Storage unavailable: {0}")]
    TransientIo(String),
}

impl GatewayError {
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::ConstraintViolation(message.into())
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(value: std::io::Error) -> Self {
        Self::TransientIo(value.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(value: serde_json::Error) -> Self {
        Self::TransientIo(format!("corrupted record: {value}"))
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PersistenceGateway: Send + Sync + 'static {
    async fn fetch_logged_sets_for_date(
        &self,
        owner: &OwnerId,
        date: NaiveDate,
    ) -> GatewayResult<Vec<SetRecord>>;

    /// Upsert: creates the row for the record's key if absent, otherwise replaces weight/reps.
    async fn save_logged_set(
        &self,
        owner: &OwnerId,
        date: NaiveDate,
        record: &SetRecord,
    ) -> GatewayResult<RecordId>;

    async fn delete_logged_set(
        &self,
        owner: &OwnerId,
        date: NaiveDate,
        key: &SetKey,
    ) -> GatewayResult<()>;

    async fn fetch_activity_completions(
        &self,
        owner: &OwnerId,
        date: NaiveDate,
    ) -> GatewayResult<Vec<Completion>>;

    async fn set_activity_completion(
        &self,
        owner: &OwnerId,
        template_id: TemplateId,
        date: NaiveDate,
        completed: bool,
    ) -> GatewayResult<()>;

    /// Active templates in creation order.
    async fn fetch_activity_templates(&self, owner: &OwnerId)
        -> GatewayResult<Vec<ActivityTemplate>>;

    async fn create_activity_template(
        &self,
        owner: &OwnerId,
        draft: &TemplateDraft,
    ) -> GatewayResult<ActivityTemplate>;

    async fn update_activity_template(
        &self,
        owner: &OwnerId,
        template: &ActivityTemplate,
    ) -> GatewayResult<()>;

    /// Removes the template together with all of its completions.
    async fn delete_activity_template(
        &self,
        owner: &OwnerId,
        template_id: TemplateId,
    ) -> GatewayResult<()>;

    /// The owner's exercise plan ordered by group, then exercise name.
    async fn fetch_exercise_plan(&self, owner: &OwnerId) -> GatewayResult<Vec<PlanEntry>>;

    /// Fails with a constraint violation when the exercise is already planned for the group.
    async fn add_exercise_to_plan(
        &self,
        owner: &OwnerId,
        draft: &PlanDraft,
    ) -> GatewayResult<PlanEntry>;

    async fn delete_exercise_from_plan(&self, owner: &OwnerId, plan_id: PlanId)
        -> GatewayResult<()>;

    async fn count_active_templates(&self, owner: &OwnerId) -> GatewayResult<u32>;

    async fn count_workout_events(&self, owner: &OwnerId, range: DateRange) -> GatewayResult<u64>;

    async fn count_completed_activities(
        &self,
        owner: &OwnerId,
        range: DateRange,
    ) -> GatewayResult<u64>;

    /// Event counts grouped by calendar day. Days without events may be missing from the map.
    async fn group_event_counts_by_day(
        &self,
        owner: &OwnerId,
        range: DateRange,
        kind: EventKind,
    ) -> GatewayResult<BTreeMap<NaiveDate, u64>>;
}
