use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{FixedOffset, NaiveDate};
use tracing::{debug, info, instrument, warn};

use crate::{
    config::SyncSettings,
    gateway::{
        entities::{OwnerId, SetRecord},
        GatewayError, PersistenceGateway,
    },
    utils::clock::Clock,
};

use super::{
    coordinator::{Revision, SaveCoordinator, SaveOutcome, SaveTarget},
    entities::{LoggedSet, SelectedExercise, Session, SessionStatus, SetId, SetPatch},
    lock,
    notice::{Notice, Notifier},
    SessionError,
};

/// Snapshot of a set handed to the coordinator.
#[derive(Debug, Clone)]
struct PendingSet {
    date: NaiveDate,
    set: LoggedSet,
}

/// Last state of a set the gateway is known to hold.
struct SetBaseline {
    revision: Revision,
    set: LoggedSet,
    persisted: bool,
    /// The local set was rolled back to this baseline and not edited since.
    rolled_back: bool,
}

struct SessionState {
    status: SessionStatus,
    session: Session,
    baselines: HashMap<SetId, SetBaseline>,
    /// Sets taken out of the session whose delete hasn't finished yet.
    removing: HashMap<SetId, LoggedSet>,
}

struct SetSaveTarget {
    owner: OwnerId,
    gateway: Arc<dyn PersistenceGateway>,
    state: Arc<Mutex<SessionState>>,
    notifier: Notifier,
}

#[async_trait]
impl SaveTarget<SetId, PendingSet> for SetSaveTarget {
    async fn persist(&self, _id: &SetId, pending: &PendingSet) -> Result<(), GatewayError> {
        self.gateway
            .save_logged_set(&self.owner, pending.date, &pending.set.to_record())
            .await
            .map(|_| ())
    }

    fn settled(&self, id: &SetId, revision: Revision, pending: PendingSet, outcome: SaveOutcome) {
        let (error, restored) = {
            let mut guard = lock(&self.state);
            let state = &mut *guard;
            if state.session.date != pending.date {
                debug!("Ignoring save of {id} for {}", pending.date);
                return;
            }

            let error = match outcome {
                SaveOutcome::Saved => {
                    let Some(baseline) = state.baselines.get_mut(id) else {
                        return;
                    };
                    if revision < baseline.revision {
                        return;
                    }
                    // An older call landed after a newer one failed, the gateway now holds
                    // this snapshot.
                    if baseline.rolled_back {
                        if let Some(set) = state.session.sets.iter_mut().find(|v| v.id == *id) {
                            debug!("Reapplying confirmed snapshot of {id} at {revision:?}");
                            set.weight = pending.set.weight;
                            set.reps = pending.set.reps;
                        }
                    }
                    *baseline = SetBaseline {
                        revision,
                        set: pending.set,
                        persisted: true,
                        rolled_back: false,
                    };
                    return;
                }
                SaveOutcome::Superseded(error) => {
                    debug!("Dropping stale failure of {id} at {revision:?}: {error}");
                    return;
                }
                SaveOutcome::Failed(error) => error,
            };

            let set = state.session.sets.iter_mut().find(|v| v.id == *id);
            let restored = match (state.baselines.get_mut(id), set) {
                (Some(baseline), Some(set)) => {
                    set.weight = baseline.set.weight;
                    set.reps = baseline.set.reps;
                    baseline.rolled_back = true;
                    set.clone()
                }
                _ => pending.set,
            };
            (error, restored)
        };

        self.notifier.report(Notice::SetSaveFailed {
            set: *id,
            exercise_name: restored.exercise_name,
            set_number: restored.set_number,
            error,
        });
    }
}

/// The workout of a single day. Sets are edited locally and persisted in the background.
pub struct WorkoutSession {
    owner: OwnerId,
    gateway: Arc<dyn PersistenceGateway>,
    clock: Arc<dyn Clock>,
    reference: FixedOffset,
    state: Arc<Mutex<SessionState>>,
    saves: SaveCoordinator<SetId, PendingSet>,
}

impl WorkoutSession {
    pub fn new(
        owner: OwnerId,
        gateway: Arc<dyn PersistenceGateway>,
        clock: Arc<dyn Clock>,
        settings: &SyncSettings,
        notifier: Notifier,
    ) -> Self {
        let state = Arc::new(Mutex::new(SessionState {
            status: SessionStatus::NotStarted,
            session: Session::empty(clock.today(&settings.reference)),
            baselines: HashMap::new(),
            removing: HashMap::new(),
        }));
        let target = Arc::new(SetSaveTarget {
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

    /// Hydrates the session from whatever was already logged today.
    #[instrument(skip(self), fields(owner = %self.owner))]
    pub async fn load(&self) -> Result<SessionStatus, SessionError> {
        let date = self.today();
        let records = self
            .gateway
            .fetch_logged_sets_for_date(&self.owner, date)
            .await?;
        Ok(self.hydrate(date, records))
    }

    /// Replaces the whole session with `records`. Pending saves of the previous session are
    /// dropped. The session only becomes active when something was logged.
    pub fn hydrate(&self, date: NaiveDate, records: Vec<SetRecord>) -> SessionStatus {
        self.saves.close();

        let mut sets = records
            .into_iter()
            .map(LoggedSet::from_record)
            .collect::<Vec<_>>();
        sets.sort_by_key(|v| v.set_number);
        let baselines = sets
            .iter()
            .map(|set| {
                (
                    set.id,
                    SetBaseline {
                        revision: Revision::default(),
                        set: set.clone(),
                        persisted: true,
                        rolled_back: false,
                    },
                )
            })
            .collect();
        let status = if sets.is_empty() {
            SessionStatus::NotStarted
        } else {
            SessionStatus::Active
        };

        info!("Hydrated {} sets for {date}", sets.len());
        *lock(&self.state) = SessionState {
            status,
            session: Session {
                id: uuid::Uuid::new_v4(),
                date,
                sets,
            },
            baselines,
            removing: HashMap::new(),
        };
        status
    }

    /// Starts an empty workout for today. Does nothing if one is already running.
    pub fn start(&self) -> Session {
        let mut state = lock(&self.state);
        if state.status == SessionStatus::NotStarted {
            state.status = SessionStatus::Active;
            state.session = Session::empty(self.today());
            state.baselines.clear();
            state.removing.clear();
            info!("Started workout for {}", state.session.date);
        }
        state.session.clone()
    }

    pub fn status(&self) -> SessionStatus {
        lock(&self.state).status
    }

    pub fn snapshot(&self) -> Session {
        lock(&self.state).session.clone()
    }

    pub fn sets_for(&self, exercise: &SelectedExercise) -> Vec<LoggedSet> {
        lock(&self.state)
            .session
            .sets_for(exercise)
            .cloned()
            .collect()
    }

    pub fn saving_ids(&self) -> HashSet<SetId> {
        self.saves.saving_ids()
    }

    pub fn is_saving(&self, id: &SetId) -> bool {
        self.saves.is_saving(id)
    }

    /// Appends an empty set for `exercise`. Nothing is persisted until a value is entered.
    pub fn add_set(&self, exercise: &SelectedExercise) -> Result<LoggedSet, SessionError> {
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        if state.status == SessionStatus::NotStarted {
            return Err(SessionError::NotStarted);
        }

        let last = state
            .session
            .sets
            .iter()
            .chain(state.removing.values())
            .filter(|v| v.belongs_to(exercise))
            .map(|v| v.set_number)
            .max()
            .unwrap_or(0);
        let set = LoggedSet {
            id: SetId::generate(),
            exercise_id: exercise.exercise_id,
            exercise_name: exercise.name.clone(),
            group_id: exercise.group_id.clone(),
            set_number: last + 1,
            weight: None,
            reps: None,
        };

        state.baselines.insert(
            set.id,
            SetBaseline {
                revision: Revision::default(),
                set: set.clone(),
                persisted: false,
                rolled_back: false,
            },
        );
        state.session.sets.push(set.clone());
        debug!("Added set {} of {}", set.set_number, set.exercise_name);
        Ok(set)
    }

    /// Merges `patch` into the set and schedules it to be saved.
    pub fn update_set(&self, id: SetId, patch: &SetPatch) -> Result<LoggedSet, SessionError> {
        patch.validate()?;
        let (date, set) = {
            let mut state = lock(&self.state);
            let date = state.session.date;
            let set = state
                .session
                .sets
                .iter_mut()
                .find(|v| v.id == id)
                .ok_or(SessionError::UnknownSet(id))?;
            patch.apply(set);
            let set = set.clone();
            if let Some(baseline) = state.baselines.get_mut(&id) {
                baseline.rolled_back = false;
            }
            (date, set)
        };

        if !patch.is_empty() {
            self.saves.schedule(
                id,
                PendingSet {
                    date,
                    set: set.clone(),
                },
            );
        }
        Ok(set)
    }

    /// Removes the set right away and deletes it from the gateway. A save already running for
    /// it is awaited first. On failure the set is put back.
    #[instrument(skip(self), fields(owner = %self.owner))]
    pub async fn remove_set(&self, id: SetId) -> Result<(), SessionError> {
        let (date, set) = {
            let mut guard = lock(&self.state);
            let state = &mut *guard;
            let index = state
                .session
                .sets
                .iter()
                .position(|v| v.id == id)
                .ok_or(SessionError::UnknownSet(id))?;
            let set = state.session.sets.remove(index);
            state.removing.insert(id, set.clone());
            (state.session.date, set)
        };

        self.saves.cancel(&id);
        self.saves.wait_settled(&id).await;

        let persisted = lock(&self.state)
            .baselines
            .get(&id)
            .is_some_and(|v| v.persisted);
        let result = if persisted {
            self.gateway
                .delete_logged_set(&self.owner, date, &set.key())
                .await
        } else {
            debug!("Set {id} was never saved, removing locally");
            Ok(())
        };

        let reschedule = {
            let mut guard = lock(&self.state);
            let state = &mut *guard;
            state.removing.remove(&id);
            match &result {
                Ok(()) => {
                    state.baselines.remove(&id);
                    false
                }
                Err(_) if state.session.date != date => false,
                Err(e) => {
                    warn!("Failed to delete set {id}: {e}");
                    state.session.sets.push(set.clone());
                    state.session.sets.sort_by_key(|v| v.set_number);
                    state
                        .baselines
                        .get(&id)
                        .is_some_and(|baseline| !baseline.set.same_values(&set))
                }
            }
        };

        // The cancelled edit hasn't reached the gateway yet.
        if reschedule {
            self.saves.schedule(id, PendingSet { date, set });
        }
        result.map_err(SessionError::from)
    }

    /// Persists every pending edit right away.
    pub async fn flush(&self) {
        self.saves.flush().await;
    }

    pub fn close(&self) {
        self.saves.close();
    }
}
