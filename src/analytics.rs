use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::Serialize;

use crate::models::{Event, EventCategory};

const TRENDING_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryStat {
    pub category: EventCategory,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketCount {
    pub label: &'static str,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthStat {
    /// `YYYY-MM`
    pub month: String,
    pub count: usize,
    pub average_attendance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventAnalytics {
    pub categories: Vec<CategoryStat>,
    pub upcoming_count: usize,
    pub average_price: f64,
    pub total_attendees: u64,
    pub trending: Vec<Event>,
    pub price_ranges: Vec<BucketCount>,
    pub time_slots: Vec<BucketCount>,
    pub monthly_trend: Vec<MonthStat>,
}

impl EventAnalytics {
    pub fn compute(events: &[Event], now: DateTime<Utc>) -> Self {
        Self {
            categories: category_breakdown(events),
            upcoming_count: events.iter().filter(|event| event.start_date > now).count(),
            average_price: average_paid_price(events),
            total_attendees: events.iter().map(|event| u64::from(event.attendees)).sum(),
            trending: trending(events),
            price_ranges: price_ranges(events),
            time_slots: time_slots(events),
            monthly_trend: monthly_trend(events),
        }
    }
}

fn category_breakdown(events: &[Event]) -> Vec<CategoryStat> {
    let mut counts: HashMap<EventCategory, usize> = HashMap::new();
    for category in events.iter().flat_map(|event| event.categories.iter()) {
        *counts.entry(*category).or_default() += 1;
    }
    let total: usize = counts.values().sum();

    let mut stats: Vec<CategoryStat> = counts
        .into_iter()
        .map(|(category, count)| CategoryStat {
            category,
            count,
            percentage: count as f64 / total as f64 * 100.0,
        })
        .collect();
    // Ties fall back to catalogue order so output is deterministic.
    stats.sort_by(|a, b| b.count.cmp(&a.count).then(a.category.cmp(&b.category)));
    stats
}

fn average_paid_price(events: &[Event]) -> f64 {
    let paid: Vec<f64> = events
        .iter()
        .map(Event::price_amount)
        .filter(|amount| *amount > 0.0)
        .collect();
    if paid.is_empty() {
        return 0.0;
    }
    paid.iter().sum::<f64>() / paid.len() as f64
}

fn trending(events: &[Event]) -> Vec<Event> {
    let mut sorted = events.to_vec();
    sorted.sort_by(|a, b| b.attendees.cmp(&a.attendees));
    sorted.truncate(TRENDING_LIMIT);
    sorted
}

fn price_range_for(amount: f64) -> &'static str {
    match amount {
        a if a <= 0.0 => "Free",
        a if a <= 50.0 => "$1-50",
        a if a <= 100.0 => "$51-100",
        a if a <= 200.0 => "$101-200",
        _ => "$200+",
    }
}

const PRICE_RANGES: [&str; 5] = ["Free", "$1-50", "$51-100", "$101-200", "$200+"];

fn price_ranges(events: &[Event]) -> Vec<BucketCount> {
    count_into(&PRICE_RANGES, events, |event| price_range_for(event.price_amount()))
}

fn time_slot_for(hour: u32) -> &'static str {
    match hour {
        h if h < 12 => "Morning",
        h if h < 17 => "Afternoon",
        h if h < 21 => "Evening",
        _ => "Night",
    }
}

const TIME_SLOTS: [&str; 4] = ["Morning", "Afternoon", "Evening", "Night"];

fn time_slots(events: &[Event]) -> Vec<BucketCount> {
    count_into(&TIME_SLOTS, events, |event| time_slot_for(event.start_date.hour()))
}

fn count_into<F>(labels: &[&'static str], events: &[Event], bucket: F) -> Vec<BucketCount>
where
    F: Fn(&Event) -> &'static str,
{
    let mut counts: HashMap<&'static str, usize> = HashMap::new();
    for event in events {
        *counts.entry(bucket(event)).or_default() += 1;
    }
    labels
        .iter()
        .map(|&label| BucketCount {
            label,
            count: counts.get(label).copied().unwrap_or(0),
        })
        .collect()
}

fn monthly_trend(events: &[Event]) -> Vec<MonthStat> {
    // (year, month) keys sort chronologically.
    let mut months: BTreeMap<(i32, u32), (usize, u64)> = BTreeMap::new();
    for event in events {
        let key = (event.start_date.year(), event.start_date.month());
        let entry = months.entry(key).or_default();
        entry.0 += 1;
        entry.1 += u64::from(event.attendees);
    }
    months
        .into_iter()
        .map(|((year, month), (count, attendees))| MonthStat {
            month: format!("{year:04}-{month:02}"),
            count,
            average_attendance: attendees as f64 / count as f64,
        })
        .collect()
}
