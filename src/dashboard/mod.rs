//! Rolling statistics over everything that was logged. [aggregation] is pure, [collect_stats]
//! fetches the counts it needs from the gateway in one round.

pub mod aggregation;

use chrono::{DateTime, FixedOffset, Utc};
use tracing::instrument;

use crate::{
    gateway::{
        entities::{EventKind, OwnerId},
        GatewayResult, PersistenceGateway,
    },
    utils::time::calendar_day,
};

use aggregation::{
    month_ranges, week_range, weekly_stats, DailyGoal, DashboardStats, MonthChanges, Totals,
};

/// Builds [DashboardStats] as of `now`. Each metric is fetched once for its whole window, days
/// are bucketed in memory.
#[instrument(skip(gateway))]
pub async fn collect_stats(
    gateway: &dyn PersistenceGateway,
    owner: &OwnerId,
    now: DateTime<Utc>,
    reference: FixedOffset,
) -> GatewayResult<DashboardStats> {
    let months = month_ranges(now, &reference);
    let today = calendar_day(now, &reference);
    let week = week_range(today);

    let (
        current_workouts,
        previous_workouts,
        current_activities,
        previous_activities,
        templates,
        weekly_workouts,
        weekly_activities,
    ) = tokio::try_join!(
        gateway.count_workout_events(owner, months.current),
        gateway.count_workout_events(owner, months.previous),
        gateway.count_completed_activities(owner, months.current),
        gateway.count_completed_activities(owner, months.previous),
        gateway.count_active_templates(owner),
        gateway.group_event_counts_by_day(owner, week, EventKind::Workout),
        gateway.group_event_counts_by_day(owner, week, EventKind::CompletedActivity),
    )?;

    let current_month = Totals {
        workouts: current_workouts,
        activities: current_activities,
    };
    let previous_month = Totals {
        workouts: previous_workouts,
        activities: previous_activities,
    };
    let daily_goal = DailyGoal::from_active_templates(templates);

    Ok(DashboardStats {
        current_month,
        previous_month,
        changes: MonthChanges::between(current_month, previous_month),
        weekly: weekly_stats(today, &weekly_workouts, &weekly_activities, daily_goal),
        daily_goal,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, NaiveDate, TimeZone, Utc};

    use crate::{
        dashboard::aggregation::Trend,
        gateway::{
            entities::{OwnerId, SetRecord},
            memory::MemoryGateway,
        },
        utils::logging::TEST_LOGGING,
    };

    use super::collect_stats;

    fn set(exercise_id: u32, set_number: u32) -> SetRecord {
        SetRecord {
            exercise_id,
            exercise_name: "Deadlift".into(),
            group_id: "Back".into(),
            set_number,
            weight: Some(100.),
            reps: Some(5),
        }
    }

    #[tokio::test]
    async fn stats_cover_both_months_and_week() {
        *TEST_LOGGING;
        let gateway = MemoryGateway::default();
        let day = |m: u32, d: u32| NaiveDate::from_ymd_opt(2024, m, d).unwrap();

        for number in 1..=3 {
            gateway.insert_set(day(5, 14), set(1, number));
        }
        gateway.insert_set(day(5, 2), set(2, 1));
        gateway.insert_set(day(4, 30), set(1, 1));

        let stretch = gateway.insert_template("Stretch");
        let read = gateway.insert_template("Read");
        gateway.insert_completion(day(5, 14), stretch.id, true);
        gateway.insert_completion(day(5, 13), stretch.id, true);
        gateway.insert_completion(day(5, 13), read.id, true);
        gateway.insert_completion(day(5, 12), read.id, false);

        let now = Utc.with_ymd_and_hms(2024, 5, 14, 18, 0, 0).unwrap();
        let stats = collect_stats(
            &gateway,
            &OwnerId::from("ann"),
            now,
            FixedOffset::east_opt(0).unwrap(),
        )
        .await
        .unwrap();

        assert_eq!(stats.current_month.workouts, 4);
        assert_eq!(stats.previous_month.workouts, 1);
        assert_eq!(stats.changes.workouts.delta, 3);
        assert_eq!(stats.changes.activities.trend, Trend::Increase);
        assert_eq!(stats.daily_goal.get(), 2);

        assert_eq!(stats.weekly.days.len(), 7);
        assert_eq!(stats.weekly.days[0].workouts, 3);
        assert_eq!(stats.weekly.days[0].goal_percentage.rounded(), 50);
        assert_eq!(stats.weekly.days[1].goal_percentage.rounded(), 100);
        assert_eq!(stats.weekly.summary.activities, 3);
        // (50 + 100) / 7
        assert_eq!(stats.weekly.progress, 21);
    }
}
