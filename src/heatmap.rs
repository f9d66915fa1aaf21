//! Calendar heatmap model
//!
//! Lays a year out as Sunday-first week columns, the way the habits page
//! draws it, and grades each day. Per-habit maps mark a day done or missed;
//! the rollup map counts how many habits were done that day.

use crate::document::HabitDocument;
use chrono::{Datelike, Duration, NaiveDate};
use colored::Colorize;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// One column of the grid, Sunday first. `None` pads days outside the year.
pub type Week = [Option<NaiveDate>; 7];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Level {
    Future,
    #[serde(rename = "level-0")]
    Level0,
    #[serde(rename = "level-1")]
    Level1,
    #[serde(rename = "level-2")]
    Level2,
    #[serde(rename = "level-3")]
    Level3,
    #[serde(rename = "level-4")]
    Level4,
}

impl Level {
    /// Rollup shade for a number of habits done on one day
    pub fn for_count(count: usize) -> Self {
        match count {
            0 => Level::Level0,
            1 => Level::Level1,
            2 => Level::Level2,
            3 | 4 => Level::Level3,
            _ => Level::Level4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cell {
    pub date: String,
    pub level: Level,
    pub count: usize,
    pub today: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthLabel {
    pub month: &'static str,
    /// Index of the first week column containing the month
    pub week: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Heatmap {
    pub year: i32,
    pub title: String,
    pub months: Vec<MonthLabel>,
    pub weeks: Vec<[Option<Cell>; 7]>,
    /// Completions up to and including today
    pub total: usize,
}

/// Every map for one year: the rollup first, then each active habit
#[derive(Debug, Clone, Serialize)]
pub struct YearView {
    pub year: i32,
    pub rollup: Heatmap,
    pub habits: Vec<Heatmap>,
}

/// Week columns covering Jan 1 through Dec 31 of `year`
pub fn year_weeks(year: i32) -> Vec<Week> {
    let (Some(first), Some(last)) = (
        NaiveDate::from_ymd_opt(year, 1, 1),
        NaiveDate::from_ymd_opt(year, 12, 31),
    ) else {
        return Vec::new();
    };

    let lead = i64::from(first.weekday().num_days_from_sunday());
    let mut day = first - Duration::days(lead);
    let mut weeks = Vec::new();

    while day <= last {
        let mut week: Week = [None; 7];
        for slot in week.iter_mut() {
            if day.year() == year {
                *slot = Some(day);
            }
            day += Duration::days(1);
        }
        weeks.push(week);
    }
    weeks
}

fn month_labels(weeks: &[Week]) -> Vec<MonthLabel> {
    let mut labels: Vec<MonthLabel> = Vec::new();
    for (index, week) in weeks.iter().enumerate() {
        for day in week.iter().flatten() {
            let month = MONTHS[day.month0() as usize];
            if labels.last().map(|l| l.month) != Some(month) {
                labels.push(MonthLabel { month, week: index });
            }
        }
    }
    labels
}

fn build<F>(year: i32, title: String, today: NaiveDate, count_on: F) -> Heatmap
where
    F: Fn(NaiveDate) -> (usize, Level),
{
    let weeks = year_weeks(year);
    let months = month_labels(&weeks);
    let mut total = 0;

    let cells = weeks
        .iter()
        .map(|week| {
            (*week).map(|slot| {
                slot.map(|date| {
                    let (count, level) = if date > today {
                        (0, Level::Future)
                    } else {
                        count_on(date)
                    };
                    total += count;
                    Cell {
                        date: date.format("%Y-%m-%d").to_string(),
                        level,
                        count,
                        today: date == today,
                    }
                })
            })
        })
        .collect();

    Heatmap {
        year,
        title,
        months,
        weeks: cells,
        total,
    }
}

/// Done/missed map for one habit
pub fn habit_heatmap(year: i32, habit: &str, dates: &BTreeSet<NaiveDate>, today: NaiveDate) -> Heatmap {
    build(year, habit.to_string(), today, |date| {
        if dates.contains(&date) {
            (1, Level::Level2)
        } else {
            (0, Level::Level0)
        }
    })
}

/// Habits completed per day across every habit in the document, hidden ones
/// included since their history still counts
pub fn rollup_heatmap(year: i32, doc: &HabitDocument, today: NaiveDate) -> Heatmap {
    let mut counts: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for dates in doc.habits.values() {
        for date in dates {
            *counts.entry(*date).or_default() += 1;
        }
    }
    build(year, "All habits".to_string(), today, |date| {
        let count = counts.get(&date).copied().unwrap_or(0);
        (count, Level::for_count(count))
    })
}

pub fn year_view(year: i32, doc: &HabitDocument, today: NaiveDate) -> YearView {
    YearView {
        year,
        rollup: rollup_heatmap(year, doc, today),
        habits: doc
            .active_habits()
            .into_iter()
            .map(|habit| habit_heatmap(year, habit, &doc.habits[habit], today))
            .collect(),
    }
}

// =============================================================================
// Terminal rendering
// =============================================================================

const DAY_LABELS: [&str; 7] = ["  ", "M ", "  ", "W ", "  ", "F ", "  "];

fn paint(cell: &Option<Cell>) -> String {
    let Some(cell) = cell else {
        return "  ".to_string();
    };
    let block = match cell.level {
        Level::Future => " ".normal(),
        Level::Level0 => "■".truecolor(60, 64, 70),
        Level::Level1 => "■".truecolor(155, 233, 168),
        Level::Level2 => "■".truecolor(64, 196, 99),
        Level::Level3 => "■".truecolor(48, 161, 78),
        Level::Level4 => "■".truecolor(33, 110, 57),
    };
    let block = if cell.today { block.underline() } else { block };
    format!("{} ", block)
}

/// Draw a heatmap for a terminal: a month header, then one row per weekday
pub fn render_terminal(map: &Heatmap) -> String {
    let mut out = format!("{} {}  ({} done)\n", map.title.as_str().bold(), map.year, map.total);

    let mut header = String::from("  ");
    for label in &map.months {
        let column = 2 + label.week * 2;
        if header.chars().count() < column {
            let pad = column - header.chars().count();
            header.push_str(&" ".repeat(pad));
        }
        if header.chars().count() == column {
            header.push_str(label.month);
        }
    }
    out.push_str(header.trim_end());
    out.push('\n');

    for (row, label) in DAY_LABELS.iter().enumerate() {
        let line: String = map.weeks.iter().map(|week| paint(&week[row])).collect();
        out.push_str(label);
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}
