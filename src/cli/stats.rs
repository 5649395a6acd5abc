use std::{fmt::Display, path::PathBuf, sync::Arc};

use anyhow::Result;
use chrono::{Local, NaiveDate};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, ValueEnum};
use futures::StreamExt;

use crate::{
    storage::{entities::DailyStats, file_store::JsonFileStore, KeyValueStore},
    utils::{percentage::Percentage, time::week_ending},
};

use super::{
    application_dir,
    output::{
        analysis::{analyze_domains, format_duration},
        extract_days, ReportRange,
    },
    Args,
};

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
        short,
        help = "Day to report. Examples are \"today\", \"yesterday\", \"15/03/2025\", \"last friday\""
    )]
    date: Option<String>,
    #[arg(long, short, help = "Report the seven days ending at --date", conflicts_with = "all")]
    week: bool,
    #[arg(long, short, help = "Report every recorded day", conflicts_with = "date")]
    all: bool,
    #[arg(long, short, default_value_t = DEFAULT_TOP, help = "Number of domains to show")]
    top: usize,
    #[arg(short = 'p', long = "percentage", help = "Filter domains to have at least specified percentage")]
    min_percentage: Option<Percentage>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[arg(
        long,
        help = "Application directory. By default reads from $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
}

const DEFAULT_TOP: usize = 10;

/// Command to process `stats` command. Prints the domains that took the most time in the
/// requested range.
pub async fn process_stats_command(command: StatsCommand) -> Result<()> {
    let (range, title) = parse_range(&command)?;
    let store = Arc::new(JsonFileStore::open_in(&application_dir(command.dir)?).await?);
    let lines = report(store, range, &title, command.top, command.min_percentage).await;
    for line in lines {
        println!("{line}");
    }
    Ok(())
}

fn parse_range(command: &StatsCommand) -> Result<(ReportRange, String)> {
    if command.all {
        return Ok((ReportRange::AllTime, "All time".into()));
    }
    let date = match &command.date {
        Some(value) => parse_day(value, command.date_style)?,
        None => Local::now().date_naive(),
    };
    if command.week {
        let days = week_ending(date);
        let title = match days.last() {
            Some(first) => format!("{first} - {date}"),
            None => date.to_string(),
        };
        Ok((ReportRange::Days(days), title))
    } else {
        Ok((ReportRange::Days(vec![date]), date.to_string()))
    }
}

fn parse_day(value: &str, style: DateStyle) -> Result<NaiveDate> {
    match parse_date_string(value, Local::now(), style.into()) {
        Ok(date) => Ok(date.date_naive()),
        Err(e) => Err(Args::command()
            .error(
                clap::error::ErrorKind::ValueValidation,
                format!("Failed to validate date {e}"),
            )
            .into()),
    }
}

async fn report(
    store: Arc<dyn KeyValueStore>,
    range: ReportRange,
    title: &str,
    top: usize,
    min_percentage: Option<Percentage>,
) -> Vec<String> {
    let days: Vec<DailyStats> = extract_days(store, range)
        .map(|(_, stats)| stats)
        .collect()
        .await;
    let (mut usages, total) = analyze_domains(&days, top);
    if let Some(min) = min_percentage {
        usages.retain(|usage| usage.percentage >= min);
    }

    let mut lines = vec![format!("{title}\t{}", format_duration(total))];
    if usages.is_empty() {
        lines.push("No tracked time".into());
    }
    for usage in usages {
        lines.push(format!(
            "{}%\t{}\t{}",
            *usage.percentage as i32,
            format_duration(usage.seconds),
            usage.domain
        ));
    }
    lines
}
