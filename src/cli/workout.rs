use anyhow::{anyhow, Result};
use clap::Subcommand;

use crate::{
    gateway::{
        entities::{PlanDraft, PlanEntry, PlanId},
        PersistenceGateway,
    },
    tracking::{
        entities::{LoggedSet, SessionStatus, SetPatch},
        notice::Notifier,
        selection::Selection,
        session::WorkoutSession,
    },
};

use super::{print_notices, Context};

#[derive(Debug, Clone, clap::Args)]
pub struct ExerciseArgs {
    #[arg(long = "exercise-id", help = "Id of the exercise")]
    exercise_id: u32,
    #[arg(long, short, help = "Muscle group of the exercise, for example \"Legs\"")]
    group: String,
}

#[derive(Subcommand, Debug)]
pub enum PlanCommand {
    #[command(about = "Show the exercise plan")]
    Plan {
        #[arg(long, short)]
        group: Option<String>,
    },
    #[command(about = "Add an exercise to the plan of a muscle group")]
    PlanAdd {
        #[command(flatten)]
        exercise: ExerciseArgs,
        #[arg(long, short, help = "Name of the exercise")]
        name: String,
    },
    #[command(about = "Remove an exercise from the plan")]
    PlanRm {
        #[arg(long, help = "Id of the plan entry, see `plan`")]
        id: u32,
    },
}

#[derive(Subcommand, Debug)]
pub enum WorkoutCommand {
    #[command(about = "Show sets logged today")]
    Sets {
        #[arg(long = "exercise-id", requires = "group", help = "Only show sets of this exercise")]
        exercise_id: Option<u32>,
        #[arg(long, short)]
        group: Option<String>,
    },
    #[command(about = "Add a set for a planned exercise. Starts today's workout if needed")]
    Log {
        #[command(flatten)]
        exercise: ExerciseArgs,
        #[arg(long, short)]
        weight: Option<f64>,
        #[arg(long, short)]
        reps: Option<u32>,
    },
    #[command(about = "Change weight or reps of a set logged today")]
    Edit {
        #[command(flatten)]
        exercise: ExerciseArgs,
        #[arg(long, short)]
        set: u32,
        #[arg(long, short, conflicts_with = "clear_weight")]
        weight: Option<f64>,
        #[arg(long, short, conflicts_with = "clear_reps")]
        reps: Option<u32>,
        #[arg(long = "clear-weight")]
        clear_weight: bool,
        #[arg(long = "clear-reps")]
        clear_reps: bool,
    },
    #[command(about = "Remove a set logged today")]
    Remove {
        #[command(flatten)]
        exercise: ExerciseArgs,
        #[arg(long, short)]
        set: u32,
    },
}

pub async fn process_plan_command(context: &Context, command: PlanCommand) -> Result<()> {
    let gateway = context.gateway.as_ref();
    match command {
        PlanCommand::Plan { group } => {
            let plan = gateway.fetch_exercise_plan(&context.owner).await?;
            let plan = plan
                .into_iter()
                .filter(|v| group.as_deref().map_or(true, |group| &*v.group_id == group))
                .collect::<Vec<_>>();
            print_plan(&plan);
            Ok(())
        }
        PlanCommand::PlanAdd { exercise, name } => {
            let draft = PlanDraft {
                exercise_id: exercise.exercise_id,
                exercise_name: name.into(),
                group_id: exercise.group.into(),
            };
            let entry = gateway.add_exercise_to_plan(&context.owner, &draft).await?;
            print_plan(&[entry]);
            Ok(())
        }
        PlanCommand::PlanRm { id } => {
            gateway
                .delete_exercise_from_plan(&context.owner, PlanId(id))
                .await?;
            println!("Removed plan entry {id}");
            Ok(())
        }
    }
}

pub async fn process_workout_command(context: &Context, command: WorkoutCommand) -> Result<()> {
    let (notifier, mut notices) = Notifier::channel();
    let session = WorkoutSession::new(
        context.owner.clone(),
        context.gateway.clone(),
        context.clock.clone(),
        &context.settings,
        notifier,
    );
    let status = session.load().await?;

    match command {
        WorkoutCommand::Sets { exercise_id, group } => {
            if status == SessionStatus::NotStarted {
                println!("No workout logged on {}", session.today());
                return Ok(());
            }
            let sets = match group {
                Some(group) => {
                    let mut selection = Selection::default();
                    selection.select_group(&group);
                    let mut sets = selection.filtered_sets(&session.snapshot());
                    if let Some(exercise_id) = exercise_id {
                        sets.retain(|v| v.exercise_id == exercise_id);
                    }
                    sets
                }
                None => session.snapshot().sets,
            };
            print_sets(&sets);
        }
        WorkoutCommand::Log {
            exercise,
            weight,
            reps,
        } => {
            let mut selection = Selection::load(context.gateway.as_ref(), &context.owner).await?;
            selection.select_group(&exercise.group);
            let selected = selection.select_exercise(exercise.exercise_id)?;

            session.start();
            let mut set = session.add_set(selected)?;
            let patch = SetPatch {
                weight: weight.map(Some),
                reps: reps.map(Some),
            };
            if !patch.is_empty() {
                set = session.update_set(set.id, &patch)?;
            }
            session.flush().await;
            if print_notices(&mut notices) == 0 {
                print_sets(&[set]);
            }
        }
        WorkoutCommand::Edit {
            exercise,
            set,
            weight,
            reps,
            clear_weight,
            clear_reps,
        } => {
            let target = find_set(&session, &exercise, set)?;
            let patch = SetPatch {
                weight: if clear_weight { Some(None) } else { weight.map(Some) },
                reps: if clear_reps { Some(None) } else { reps.map(Some) },
            };
            let updated = session.update_set(target.id, &patch)?;
            session.flush().await;
            if print_notices(&mut notices) == 0 {
                print_sets(&[updated]);
            }
        }
        WorkoutCommand::Remove { exercise, set } => {
            let target = find_set(&session, &exercise, set)?;
            session.remove_set(target.id).await?;
            println!("Removed set {} of {}", target.set_number, target.exercise_name);
        }
    }

    session.flush().await;
    print_notices(&mut notices);
    Ok(())
}

fn find_set(session: &WorkoutSession, exercise: &ExerciseArgs, set_number: u32) -> Result<LoggedSet> {
    session
        .snapshot()
        .sets
        .into_iter()
        .find(|v| {
            v.exercise_id == exercise.exercise_id
                && &*v.group_id == exercise.group.as_str()
                && v.set_number == set_number
        })
        .ok_or_else(|| {
            anyhow!(
                "No set {set_number} of exercise {} in {} today",
                exercise.exercise_id,
                exercise.group
            )
        })
}

fn print_sets(sets: &[LoggedSet]) {
    for set in sets {
        let weight = set
            .weight
            .map(|v| format!("{v}kg"))
            .unwrap_or_else(|| "-".into());
        let reps = set
            .reps
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "{}\t{}\t#{}\t{weight}\tx{reps}",
            set.group_id, set.exercise_name, set.set_number
        );
    }
}

fn print_plan(plan: &[PlanEntry]) {
    if plan.is_empty() {
        println!("No exercises planned");
    }
    for entry in plan {
        println!(
            "{}\t{}\t{}\t(exercise {})",
            entry.id, entry.group_id, entry.exercise_name, entry.exercise_id
        );
    }
}
