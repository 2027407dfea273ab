use std::fmt::Display;

use ansi_term::Colour;
use anyhow::Result;
use chrono::{DateTime, Utc};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, ValueEnum};

use crate::dashboard::{
    aggregation::{progress_message, Change, DashboardStats, Trend},
    collect_stats,
};

use super::{Args, Context};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, Parser)]
pub struct StatsCommand {
    #[arg(
        long,
        help = "Moment the statistics are computed for. Examples are \"yesterday\", \"2 weeks ago\", \"15/03/2025\""
    )]
    at: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
}

pub async fn process_stats_command(
    context: &Context,
    StatsCommand { at, date_style }: StatsCommand,
) -> Result<()> {
    let now = context.clock.time();
    let at = match at {
        Some(at) => parse_moment(&at, now, date_style)?,
        None => now,
    };

    let stats = collect_stats(
        context.gateway.as_ref(),
        &context.owner,
        at,
        context.settings.reference,
    )
    .await?;
    print_stats(&stats);
    Ok(())
}

fn parse_moment(value: &str, now: DateTime<Utc>, style: DateStyle) -> Result<DateTime<Utc>> {
    parse_date_string(value, now, style.into()).map_err(|e| {
        Args::command()
            .error(
                clap::error::ErrorKind::ValueValidation,
                format!("Failed to validate date {e}"),
            )
            .into()
    })
}

fn print_stats(stats: &DashboardStats) {
    println!("This month");
    println!(
        "  Workouts\t{}\t{}",
        stats.current_month.workouts,
        format_change(stats.changes.workouts)
    );
    println!(
        "  Activities\t{}\t{}",
        stats.current_month.activities,
        format_change(stats.changes.activities)
    );
    println!();

    println!(
        "Today + last 6 days (goal {} per day)",
        stats.daily_goal.get()
    );
    for day in &stats.weekly.days {
        println!(
            "  {}\t{} workouts\t{} activities\t{}",
            day.date.format("%a %b %d"),
            day.workouts,
            day.activities,
            day.goal_percentage
        );
    }
    println!(
        "  Total\t\t{} workouts\t{} activities",
        stats.weekly.summary.workouts, stats.weekly.summary.activities
    );
    println!();
    println!(
        "Weekly progress {}%. {}",
        stats.weekly.progress,
        progress_message(stats.weekly.progress)
    );
}

fn format_change(change: Change) -> String {
    let text = format!("{:+} from last month", change.delta);
    match change.trend {
        Trend::Increase => Colour::Green.paint(text).to_string(),
        Trend::Decrease => Colour::Red.paint(text).to_string(),
        Trend::Neutral => Colour::White.dimmed().paint(text).to_string(),
    }
}
