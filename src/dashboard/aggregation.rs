use std::collections::BTreeMap;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};

use crate::{
    gateway::entities::DateRange,
    utils::{
        percentage::{ratio_percentage, Percentage},
        time::{month_bounds, previous_month},
    },
};

/// Length of the rolling breakdown, today included.
pub const ROLLING_DAYS: u32 = 7;

/// How many activities make a full day. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyGoal(u32);

impl DailyGoal {
    pub fn from_active_templates(count: u32) -> Self {
        Self(count.max(1))
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthRanges {
    pub current: DateRange,
    pub previous: DateRange,
}

/// The month containing `now` and the one before it, both in the reference timezone.
pub fn month_ranges(now: DateTime<Utc>, reference: &FixedOffset) -> MonthRanges {
    let (start, end) = month_bounds(now, reference);
    let (previous_start, previous_end) = month_bounds(previous_month(now, reference), reference);
    MonthRanges {
        current: DateRange::new(start, end),
        previous: DateRange::new(previous_start, previous_end),
    }
}

/// `today` and the 6 days before it.
pub fn week_range(today: NaiveDate) -> DateRange {
    DateRange::ending_at(today, ROLLING_DAYS)
}

pub fn goal_percentage(activities: u64, goal: DailyGoal) -> Percentage {
    ratio_percentage(activities, u64::from(goal.0))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Increase,
    Decrease,
    Neutral,
}

impl Trend {
    pub fn classify(delta: i64) -> Self {
        match delta {
            0 => Trend::Neutral,
            v if v > 0 => Trend::Increase,
            _ => Trend::Decrease,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Change {
    pub delta: i64,
    pub trend: Trend,
}

impl Change {
    pub fn between(current: u64, previous: u64) -> Self {
        let delta = current as i64 - previous as i64;
        Self {
            delta,
            trend: Trend::classify(delta),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Totals {
    pub workouts: u64,
    pub activities: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthChanges {
    pub workouts: Change,
    pub activities: Change,
}

impl MonthChanges {
    pub fn between(current: Totals, previous: Totals) -> Self {
        Self {
            workouts: Change::between(current.workouts, previous.workouts),
            activities: Change::between(current.activities, previous.activities),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayBreakdown {
    pub date: NaiveDate,
    pub workouts: u64,
    pub activities: u64,
    pub goal_percentage: Percentage,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeeklyStats {
    pub summary: Totals,
    /// Today first.
    pub days: Vec<DayBreakdown>,
    /// Mean of the daily percentages, rounded.
    pub progress: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardStats {
    pub current_month: Totals,
    pub previous_month: Totals,
    pub changes: MonthChanges,
    pub weekly: WeeklyStats,
    pub daily_goal: DailyGoal,
}

/// Buckets per-day counts into the rolling window ending at `today`. Days without events are
/// still present.
pub fn rolling_breakdown(
    today: NaiveDate,
    workouts: &BTreeMap<NaiveDate, u64>,
    activities: &BTreeMap<NaiveDate, u64>,
    goal: DailyGoal,
) -> Vec<DayBreakdown> {
    (0..i64::from(ROLLING_DAYS))
        .map(|offset| {
            let date = today - Duration::days(offset);
            let activities = activities.get(&date).copied().unwrap_or(0);
            DayBreakdown {
                date,
                workouts: workouts.get(&date).copied().unwrap_or(0),
                activities,
                goal_percentage: goal_percentage(activities, goal),
            }
        })
        .collect()
}

pub fn week_progress(days: &[DayBreakdown]) -> u32 {
    if days.is_empty() {
        return 0;
    }
    let sum = days.iter().map(|v| *v.goal_percentage).sum::<f64>();
    (sum / days.len() as f64).round() as u32
}

pub fn weekly_stats(
    today: NaiveDate,
    workouts: &BTreeMap<NaiveDate, u64>,
    activities: &BTreeMap<NaiveDate, u64>,
    goal: DailyGoal,
) -> WeeklyStats {
    let days = rolling_breakdown(today, workouts, activities, goal);
    let summary = days.iter().fold(Totals::default(), |acc, day| Totals {
        workouts: acc.workouts + day.workouts,
        activities: acc.activities + day.activities,
    });
    WeeklyStats {
        progress: week_progress(&days),
        summary,
        days,
    }
}

/// Short encouragement matching the weekly progress.
pub fn progress_message(progress: u32) -> &'static str {
    match progress {
        100.. => "Excellent work! You've reached your weekly goal!",
        75..=99 => "You're on track! Keep up the great work.",
        50..=74 => "Good progress! Keep going.",
        25..=49 => "Nice start! Keep building momentum.",
        _ => "Let's get started! Every step counts.",
    }
}
