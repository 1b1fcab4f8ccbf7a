use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::models::{Event, EventCategory, SortBy};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub categories: BTreeSet<EventCategory>,
    pub search_query: String,
    pub sort_by: SortBy,
}

/// Search and category filter, then a stable sort by `filter.sort_by`.
pub fn filter_events(events: &[Event], filter: &Filter) -> Vec<Event> {
    let needle = filter.search_query.trim().to_lowercase();
    let mut out: Vec<Event> = events
        .iter()
        .filter(|event| event.matches_query(&needle) && event.in_any_category(&filter.categories))
        .cloned()
        .collect();
    sort_events(&mut out, filter.sort_by);
    out
}

pub fn sort_events(events: &mut [Event], sort_by: SortBy) {
    match sort_by {
        SortBy::Date => events.sort_by_key(|event| event.start_date),
        SortBy::Popularity => events.sort_by(|a, b| b.attendees.cmp(&a.attendees)),
        SortBy::Price => events.sort_by(|a, b| a.price_amount().total_cmp(&b.price_amount())),
    }
}

pub fn events_in(events: &[Event], ids: &BTreeSet<String>) -> Vec<Event> {
    events
        .iter()
        .filter(|event| ids.contains(&event.id))
        .cloned()
        .collect()
}

pub fn upcoming_events(
    events: &[Event],
    registered: &BTreeSet<String>,
    now: DateTime<Utc>,
) -> Vec<Event> {
    let mut out: Vec<Event> = events_in(events, registered)
        .into_iter()
        .filter(|event| event.start_date > now)
        .collect();
    out.sort_by_key(|event| event.start_date);
    out
}

pub fn past_events(
    events: &[Event],
    registered: &BTreeSet<String>,
    now: DateTime<Utc>,
) -> Vec<Event> {
    let mut out: Vec<Event> = events_in(events, registered)
        .into_iter()
        .filter(|event| event.start_date <= now)
        .collect();
    out.sort_by(|a, b| b.start_date.cmp(&a.start_date));
    out
}

pub fn split_featured(events: Vec<Event>) -> (Vec<Event>, Vec<Event>) {
    events.into_iter().partition(|event| event.is_featured)
}
