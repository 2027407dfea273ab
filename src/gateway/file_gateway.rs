use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::NaiveDate;
use fs4::tokio::AsyncFileExt;
use futures::{stream, StreamExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};
use tracing::{debug, instrument, warn};

use crate::utils::time::{date_to_record_name, record_name_to_date};

use super::{
    entities::{
        ActivityTemplate, Completion, DateRange, EventKind, OwnerId, PlanDraft, PlanEntry, PlanId,
        RecordId, SetKey, SetRecord, TemplateDraft, TemplateId,
    },
    GatewayError, GatewayResult, PersistenceGateway,
};

const DAYS_DIR: &str = "days";
const TEMPLATES_FILE: &str = "templates.json";
const PLAN_FILE: &str = "plan.json";

/// Everything recorded for an owner on one calendar day.
#[derive(Debug, Default, Serialize, Deserialize)]
struct DayRecordEntity {
    #[serde(default)]
    next_row: u32,
    #[serde(default)]
    sets: Vec<SetRowEntity>,
    #[serde(default)]
    activities: Vec<Completion>,
}

impl DayRecordEntity {
    fn count(&self, kind: EventKind) -> u64 {
        match kind {
            EventKind::Workout => self.sets.len() as u64,
            EventKind::CompletedActivity => {
                self.activities.iter().filter(|v| v.completed).count() as u64
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SetRowEntity {
    row: u32,
    #[serde(flatten)]
    record: SetRecord,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TemplatesEntity {
    #[serde(default)]
    next_id: u32,
    #[serde(default)]
    templates: Vec<ActivityTemplate>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PlanEntity {
    #[serde(default)]
    next_id: u32,
    #[serde(default)]
    entries: Vec<PlanEntry>,
}

/// Gateway keeping every owner in its own directory:
///  - `days/YYYY-MM-DD.json` holds the sets and completions of one day.
///  - `templates.json` holds activity templates in creation order.
///  - `plan.json` holds the exercise plan.
///
/// Every write is a read-modify-write of a single document under an exclusive file lock.
pub struct FileGateway {
    root: PathBuf,
}

impl FileGateway {
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;

        Ok(Self { root })
    }

    /// Registers an owner. Calling it for an existing owner is a no-op.
    pub async fn create_owner(&self, owner: &OwnerId) -> GatewayResult<()> {
        let dir = self.owner_path(owner)?;
        tokio::fs::create_dir_all(dir.join(DAYS_DIR)).await?;
        Ok(())
    }

    fn owner_path(&self, owner: &OwnerId) -> GatewayResult<PathBuf> {
        let name: &str = &owner.0;
        if name.is_empty() || name.starts_with('.') || name.contains(&['/', '\\'][..]) {
            return Err(GatewayError::OwnerNotFound(owner.clone()));
        }
        Ok(self.root.join(name))
    }

    async fn owner_dir(&self, owner: &OwnerId) -> GatewayResult<PathBuf> {
        let dir = self.owner_path(owner)?;
        if tokio::fs::try_exists(&dir).await? {
            Ok(dir)
        } else {
            Err(GatewayError::OwnerNotFound(owner.clone()))
        }
    }

    fn day_path(dir: &Path, date: NaiveDate) -> PathBuf {
        dir.join(DAYS_DIR)
            .join(format!("{}.json", date_to_record_name(date)))
    }

    async fn template_ids(dir: &Path) -> GatewayResult<Vec<TemplateId>> {
        let templates: TemplatesEntity = read_document(&dir.join(TEMPLATES_FILE)).await?;
        Ok(templates.templates.iter().map(|v| v.id).collect())
    }

    /// Reads each day of the range once and counts events of one kind.
    async fn day_counts(
        &self,
        owner: &OwnerId,
        range: DateRange,
        kind: EventKind,
    ) -> GatewayResult<BTreeMap<NaiveDate, u64>> {
        let dir = self.owner_dir(owner).await?;
        let dir = &dir;

        let documents = stream::iter(range.days())
            .map(move |day| {
                let path = Self::day_path(dir, day);
                async move { (day, read_document::<DayRecordEntity>(&path).await) }
            })
            .buffered(4);
        let mut documents = std::pin::pin!(documents);

        let mut counts = BTreeMap::new();
        while let Some((day, document)) = documents.next().await {
            let count = document?.count(kind);
            if count > 0 {
                counts.insert(day, count);
            }
        }
        Ok(counts)
    }
}

fn validate_record(record: &SetRecord) -> GatewayResult<()> {
    if record.group_id.trim().is_empty() || record.set_number == 0 {
        return Err(GatewayError::constraint("Invalid exercise or muscle group"));
    }
    match record.weight {
        Some(weight) if !weight.is_finite() || weight < 0. => {
            Err(GatewayError::constraint("Weight must be a non-negative number"))
        }
        _ => Ok(()),
    }
}

#[async_trait]
impl PersistenceGateway for FileGateway {
    #[instrument(skip(self))]
    async fn fetch_logged_sets_for_date(
        &self,
        owner: &OwnerId,
        date: NaiveDate,
    ) -> GatewayResult<Vec<SetRecord>> {
        let dir = self.owner_dir(owner).await?;
        let day: DayRecordEntity = read_document(&Self::day_path(&dir, date)).await?;
        let mut records = day.sets.into_iter().map(|v| v.record).collect::<Vec<_>>();
        records.sort_by(|a, b| {
            (&a.group_id, a.exercise_id, a.set_number).cmp(&(&b.group_id, b.exercise_id, b.set_number))
        });
        Ok(records)
    }

    #[instrument(skip(self))]
    async fn save_logged_set(
        &self,
        owner: &OwnerId,
        date: NaiveDate,
        record: &SetRecord,
    ) -> GatewayResult<RecordId> {
        validate_record(record)?;
        let dir = self.owner_dir(owner).await?;
        let key = record.key();
        let row = update_document(&Self::day_path(&dir, date), |day: &mut DayRecordEntity| {
            if let Some(existing) = day.sets.iter_mut().find(|v| v.record.key() == key) {
                existing.record.weight = record.weight;
                existing.record.reps = record.reps;
                existing.record.exercise_name = record.exercise_name.clone();
                return Ok(existing.row);
            }
            day.next_row += 1;
            day.sets.push(SetRowEntity {
                row: day.next_row,
                record: record.clone(),
            });
            Ok(day.next_row)
        })
        .await?;
        debug!("Saved set row {row}");
        Ok(RecordId(format!("{}/{row}", date_to_record_name(date))))
    }

    #[instrument(skip(self))]
    async fn delete_logged_set(
        &self,
        owner: &OwnerId,
        date: NaiveDate,
        key: &SetKey,
    ) -> GatewayResult<()> {
        let dir = self.owner_dir(owner).await?;
        update_document(&Self::day_path(&dir, date), |day: &mut DayRecordEntity| {
            let before = day.sets.len();
            day.sets.retain(|v| v.record.key() != *key);
            if day.sets.len() == before {
                Err(GatewayError::constraint("Workout set not found"))
            } else {
                Ok(())
            }
        })
        .await
    }

    #[instrument(skip(self))]
    async fn fetch_activity_completions(
        &self,
        owner: &OwnerId,
        date: NaiveDate,
    ) -> GatewayResult<Vec<Completion>> {
        let dir = self.owner_dir(owner).await?;
        let day: DayRecordEntity = read_document(&Self::day_path(&dir, date)).await?;
        Ok(day.activities)
    }

    #[instrument(skip(self))]
    async fn set_activity_completion(
        &self,
        owner: &OwnerId,
        template_id: TemplateId,
        date: NaiveDate,
        completed: bool,
    ) -> GatewayResult<()> {
        let dir = self.owner_dir(owner).await?;
        if !Self::template_ids(&dir).await?.contains(&template_id) {
            return Err(GatewayError::constraint("Invalid activity template"));
        }
        update_document(&Self::day_path(&dir, date), |day: &mut DayRecordEntity| {
            match day.activities.iter_mut().find(|v| v.template_id == template_id) {
                Some(existing) => existing.completed = completed,
                None => day.activities.push(Completion {
                    template_id,
                    completed,
                }),
            }
            Ok(())
        })
        .await
    }

    async fn fetch_activity_templates(
        &self,
        owner: &OwnerId,
    ) -> GatewayResult<Vec<ActivityTemplate>> {
        let dir = self.owner_dir(owner).await?;
        let templates: TemplatesEntity = read_document(&dir.join(TEMPLATES_FILE)).await?;
        Ok(templates.templates)
    }

    #[instrument(skip(self))]
    async fn create_activity_template(
        &self,
        owner: &OwnerId,
        draft: &TemplateDraft,
    ) -> GatewayResult<ActivityTemplate> {
        if draft.name.trim().is_empty() {
            return Err(GatewayError::constraint("Activity name is required"));
        }
        let dir = self.owner_dir(owner).await?;
        update_document(&dir.join(TEMPLATES_FILE), |templates: &mut TemplatesEntity| {
            templates.next_id += 1;
            let template = ActivityTemplate {
                id: TemplateId(templates.next_id),
                name: draft.name.clone(),
                description: draft.description.clone(),
                icon: draft.icon.clone(),
            };
            templates.templates.push(template.clone());
            Ok(template)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn update_activity_template(
        &self,
        owner: &OwnerId,
        template: &ActivityTemplate,
    ) -> GatewayResult<()> {
        let dir = self.owner_dir(owner).await?;
        update_document(&dir.join(TEMPLATES_FILE), |templates: &mut TemplatesEntity| {
            let existing = templates
                .templates
                .iter_mut()
                .find(|v| v.id == template.id)
                .ok_or_else(|| GatewayError::constraint("Activity template not found"))?;
            *existing = template.clone();
            Ok(())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn delete_activity_template(
        &self,
        owner: &OwnerId,
        template_id: TemplateId,
    ) -> GatewayResult<()> {
        let dir = self.owner_dir(owner).await?;
        update_document(&dir.join(TEMPLATES_FILE), |templates: &mut TemplatesEntity| {
            let before = templates.templates.len();
            templates.templates.retain(|v| v.id != template_id);
            if templates.templates.len() == before {
                Err(GatewayError::constraint("Activity template not found"))
            } else {
                Ok(())
            }
        })
        .await?;

        // Cascade into every day that mentions the template.
        let mut entries = tokio::fs::read_dir(dir.join(DAYS_DIR)).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_day = path
                .file_stem()
                .and_then(|v| v.to_str())
                .and_then(record_name_to_date)
                .is_some();
            if !is_day {
                continue;
            }
            update_document(&path, |day: &mut DayRecordEntity| {
                day.activities.retain(|v| v.template_id != template_id);
                Ok(())
            })
            .await?;
        }
        Ok(())
    }

    async fn fetch_exercise_plan(&self, owner: &OwnerId) -> GatewayResult<Vec<PlanEntry>> {
        let dir = self.owner_dir(owner).await?;
        let plan: PlanEntity = read_document(&dir.join(PLAN_FILE)).await?;
        let mut entries = plan.entries;
        entries.sort_by(|a, b| {
            (&a.group_id, &a.exercise_name, a.id).cmp(&(&b.group_id, &b.exercise_name, b.id))
        });
        Ok(entries)
    }

    #[instrument(skip(self))]
    async fn add_exercise_to_plan(
        &self,
        owner: &OwnerId,
        draft: &PlanDraft,
    ) -> GatewayResult<PlanEntry> {
        if draft.group_id.trim().is_empty() {
            return Err(GatewayError::constraint("Muscle group not found"));
        }
        if draft.exercise_name.trim().is_empty() {
            return Err(GatewayError::constraint("Exercise not found"));
        }
        let dir = self.owner_dir(owner).await?;
        update_document(&dir.join(PLAN_FILE), |plan: &mut PlanEntity| {
            let planned = plan
                .entries
                .iter()
                .any(|v| v.exercise_id == draft.exercise_id && v.group_id == draft.group_id);
            if planned {
                return Err(GatewayError::constraint(
                    "This exercise is already in your plan for this muscle group",
                ));
            }
            plan.next_id += 1;
            let entry = PlanEntry {
                id: PlanId(plan.next_id),
                exercise_id: draft.exercise_id,
                exercise_name: draft.exercise_name.clone(),
                group_id: draft.group_id.clone(),
            };
            plan.entries.push(entry.clone());
            Ok(entry)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn delete_exercise_from_plan(
        &self,
        owner: &OwnerId,
        plan_id: PlanId,
    ) -> GatewayResult<()> {
        let dir = self.owner_dir(owner).await?;
        let removed = update_document(&dir.join(PLAN_FILE), |plan: &mut PlanEntity| {
            let index = plan
                .entries
                .iter()
                .position(|v| v.id == plan_id)
                .ok_or_else(|| GatewayError::constraint("Exercise plan not found"))?;
            Ok(plan.entries.remove(index))
        })
        .await?;
        debug!("Removed {} from {}", removed.exercise_name, removed.group_id);
        Ok(())
    }

    async fn count_active_templates(&self, owner: &OwnerId) -> GatewayResult<u32> {
        let dir = self.owner_dir(owner).await?;
        Ok(Self::template_ids(&dir).await?.len() as u32)
    }

    async fn count_workout_events(&self, owner: &OwnerId, range: DateRange) -> GatewayResult<u64> {
        let counts = self.day_counts(owner, range, EventKind::Workout).await?;
        Ok(counts.values().sum())
    }

    async fn count_completed_activities(
        &self,
        owner: &OwnerId,
        range: DateRange,
    ) -> GatewayResult<u64> {
        let counts = self
            .day_counts(owner, range, EventKind::CompletedActivity)
            .await?;
        Ok(counts.values().sum())
    }

    async fn group_event_counts_by_day(
        &self,
        owner: &OwnerId,
        range: DateRange,
        kind: EventKind,
    ) -> GatewayResult<BTreeMap<NaiveDate, u64>> {
        self.day_counts(owner, range, kind).await
    }
}

/// Reads a whole document under a shared lock. A missing or empty file is the default document.
async fn read_document<T: DeserializeOwned + Default>(path: &Path) -> GatewayResult<T> {
    async fn extract(path: &Path) -> Result<String, std::io::Error> {
        debug!("Extracting {path:?}");
        let mut file = File::open(path).await?;
        file.lock_shared()?;
        let mut content = String::new();
        let result = file.read_to_string(&mut content).await;
        file.unlock_async().await?;
        result.map(|_| content)
    }

    match extract(path).await {
        Ok(content) if content.trim().is_empty() => Ok(T::default()),
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

/// Applies `apply` to the document at `path` and writes it back. Nothing is written when `apply`
/// fails.
async fn update_document<T, R>(
    path: &Path,
    apply: impl FnOnce(&mut T) -> GatewayResult<R>,
) -> GatewayResult<R>
where
    T: DeserializeOwned + Serialize + Default,
{
    let mut file = File::options()
        .write(true)
        .create(true)
        .read(true)
        .truncate(false)
        .open(path)
        .await?;

    // Semi-safe acquire-release for a file
    file.lock_exclusive()?;
    let result = update_locked(&mut file, apply).await;
    file.unlock_async().await?;
    result
}

async fn update_locked<T, R>(
    file: &mut File,
    apply: impl FnOnce(&mut T) -> GatewayResult<R>,
) -> GatewayResult<R>
where
    T: DeserializeOwned + Serialize + Default,
{
    let mut content = String::new();
    file.read_to_string(&mut content).await?;

    let mut document = if content.trim().is_empty() {
        T::default()
    } else {
        serde_json::from_str(&content).inspect_err(|e| warn!("Document was corrupted {e}"))?
    };

    let result = apply(&mut document)?;

    let buffer = serde_json::to_vec(&document)?;
    file.rewind().await?;
    file.set_len(0).await?;
    file.write_all(&buffer).await?;
    file.flush().await?;
    Ok(result)
}
