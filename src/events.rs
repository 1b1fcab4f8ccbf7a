use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::ConfigStore;
use crate::models::{Event, EventCategory, EventPatch, EventView, SortBy};
use crate::persistence::{Persister, EVENTS_KEY, SELECTION_KEY};
use crate::profile::ProfileService;
use crate::query::{self, Filter};
use crate::selection::Selection;
use crate::validation::{check_event, EventDraft, ValidationError};

#[derive(Debug, Error)]
pub enum EventError {
    #[error("an event with id {0} already exists")]
    DuplicateId(String),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationOutcome {
    Registered,
    AlreadyRegistered,
    EventFull,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnregistrationOutcome {
    Unregistered,
    NotRegistered,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceQuote {
    pub original: f64,
    pub discount: f64,
    pub total: f64,
    pub currency: String,
}

const DEFAULT_CURRENCY: &str = "USD";

struct EventState {
    events: Vec<Event>,
    selection: Selection,
}

impl EventState {
    fn find(&self, id: &str) -> Option<&Event> {
        self.events.iter().find(|event| event.id == id)
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut Event> {
        self.events.iter_mut().find(|event| event.id == id)
    }

    fn view(&self, event: &Event) -> EventView {
        EventView {
            event: event.clone(),
            is_registered: self.selection.is_registered(&event.id),
            is_saved: self.selection.is_saved(&event.id),
        }
    }
}

pub struct EventService {
    state: Mutex<EventState>,
    persister: Arc<Persister>,
    clock: Arc<dyn Clock>,
    config: Arc<ConfigStore>,
}

impl EventService {
    pub fn new(
        events: Vec<Event>,
        selection: Selection,
        persister: Arc<Persister>,
        clock: Arc<dyn Clock>,
        config: Arc<ConfigStore>,
    ) -> Self {
        Self {
            state: Mutex::new(EventState { events, selection }),
            persister,
            clock,
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, EventState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist_events(&self, state: &EventState) {
        self.persister.write(EVENTS_KEY, &state.events);
    }

    fn persist_selection(&self, state: &EventState) {
        self.persister.write(SELECTION_KEY, &state.selection.snapshot());
    }

    pub fn reset(&self, events: Vec<Event>, selection: Selection) {
        let mut state = self.lock();
        *state = EventState { events, selection };
        self.persist_events(&state);
        self.persist_selection(&state);
    }

    // ---- repository ----

    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    /// Prepends `event`. Ids must be unique.
    pub fn add_event(&self, event: Event) -> Result<(), EventError> {
        check_event(&event)?;
        let mut state = self.lock();
        if state.find(&event.id).is_some() {
            tracing::warn!(id = %event.id, "rejected duplicate event id");
            return Err(EventError::DuplicateId(event.id));
        }
        tracing::info!(id = %event.id, title = %event.title, "event added");
        state.events.insert(0, event);
        self.persist_events(&state);
        Ok(())
    }

    pub fn create_event(&self, draft: EventDraft) -> Result<String, EventError> {
        let draft = draft.validate(self.config.read().max_event_categories)?;
        let id = format!("event-{}", Uuid::new_v4());
        self.add_event(draft.into_event(id.clone()))?;
        Ok(id)
    }

    /// Merges `patch` into the event. `Ok(false)` when the id is unknown.
    /// The record is left untouched if the merged result is invalid.
    pub fn update_event(&self, id: &str, patch: EventPatch) -> Result<bool, EventError> {
        let mut state = self.lock();
        let Some(event) = state.find_mut(id) else {
            tracing::debug!(id, "update ignored, no such event");
            return Ok(false);
        };
        let mut updated = event.clone();
        patch.apply_to(&mut updated);
        check_event(&updated)?;
        *event = updated;
        tracing::info!(id, "event updated");
        self.persist_events(&state);
        Ok(true)
    }

    /// Removes the event and every saved/registered reference to it.
    pub fn delete_event(&self, id: &str) -> bool {
        let mut state = self.lock();
        let before = state.events.len();
        state.events.retain(|event| event.id != id);
        state.selection.forget(id);
        let removed = state.events.len() != before;
        if removed {
            tracing::info!(id, "event deleted");
            self.persist_events(&state);
        }
        self.persist_selection(&state);
        removed
    }

    pub fn get_event_by_id(&self, id: &str) -> Option<EventView> {
        let state = self.lock();
        state.find(id).map(|event| state.view(event))
    }

    // ---- saved set ----

    pub fn is_saved(&self, id: &str) -> bool {
        self.lock().selection.is_saved(id)
    }

    /// Returns false, saving nothing, when no event has this id.
    pub fn save_event(&self, id: &str) -> bool {
        let mut state = self.lock();
        if state.find(id).is_none() {
            tracing::debug!(id, "save ignored, no such event");
            return false;
        }
        if state.selection.saved.insert(id.to_string()) {
            tracing::debug!(id, "event saved");
            self.persist_selection(&state);
        }
        true
    }

    pub fn unsave_event(&self, id: &str) {
        let mut state = self.lock();
        if state.selection.saved.remove(id) {
            tracing::debug!(id, "event unsaved");
            self.persist_selection(&state);
        }
    }

    /// Returns the saved state after toggling.
    pub fn toggle_save_event(&self, id: &str) -> bool {
        if self.is_saved(id) {
            self.unsave_event(id);
            false
        } else {
            self.save_event(id)
        }
    }

    // ---- registration ----

    pub fn is_registered(&self, id: &str) -> bool {
        self.lock().selection.is_registered(id)
    }

    /// Registers the user, saving the event and counting them as an attendee.
    pub fn register_for_event(&self, id: &str) -> RegistrationOutcome {
        let mut state = self.lock();
        if state.selection.is_registered(id) {
            return RegistrationOutcome::AlreadyRegistered;
        }
        let Some(event) = state.find_mut(id) else {
            tracing::debug!(id, "registration ignored, no such event");
            return RegistrationOutcome::NotFound;
        };
        if event.is_full() {
            tracing::info!(id, "registration refused, event full");
            return RegistrationOutcome::EventFull;
        }
        event.attendees = event.attendees.saturating_add(1);
        let attendees = event.attendees;

        state.selection.registered.insert(id.to_string());
        state.selection.saved.insert(id.to_string());
        tracing::info!(id, attendees, "registered for event");
        self.persist_events(&state);
        self.persist_selection(&state);
        RegistrationOutcome::Registered
    }

    /// Cancels a registration. The event stays saved.
    pub fn unregister_from_event(&self, id: &str) -> UnregistrationOutcome {
        let mut state = self.lock();
        if !state.selection.registered.remove(id) {
            return UnregistrationOutcome::NotRegistered;
        }
        if let Some(event) = state.find_mut(id) {
            event.attendees = event.attendees.saturating_sub(1);
        }
        tracing::info!(id, "unregistered from event");
        self.persist_events(&state);
        self.persist_selection(&state);
        UnregistrationOutcome::Unregistered
    }

    // ---- filters ----

    pub fn selection(&self) -> Selection {
        self.lock().selection.clone()
    }

    pub fn set_selected_categories(&self, categories: impl IntoIterator<Item = EventCategory>) {
        let mut state = self.lock();
        state.selection.categories = categories.into_iter().collect();
        self.persist_selection(&state);
    }

    pub fn toggle_category(&self, category: EventCategory) -> bool {
        let mut state = self.lock();
        let selected = state.selection.toggle_category(category);
        self.persist_selection(&state);
        selected
    }

    pub fn set_search_query(&self, query: impl Into<String>) {
        self.lock().selection.search_query = query.into();
    }

    pub fn set_sort_by(&self, sort_by: SortBy) {
        self.lock().selection.sort_by = sort_by;
    }

    /// Clears search text and categories; the sort mode is kept.
    pub fn clear_filters(&self) {
        let mut state = self.lock();
        state.selection.search_query.clear();
        state.selection.categories = BTreeSet::new();
        self.persist_selection(&state);
    }

    // ---- derived views ----

    pub fn get_filtered_events(&self) -> Vec<Event> {
        let state = self.lock();
        query::filter_events(&state.events, &state.selection.filter())
    }

    pub fn query(&self, filter: &Filter) -> Vec<Event> {
        query::filter_events(&self.lock().events, filter)
    }

    pub fn get_saved_events(&self) -> Vec<Event> {
        let state = self.lock();
        query::events_in(&state.events, &state.selection.saved)
    }

    pub fn get_registered_events(&self) -> Vec<Event> {
        let state = self.lock();
        query::events_in(&state.events, &state.selection.registered)
    }

    pub fn get_upcoming_events(&self) -> Vec<Event> {
        let now = self.clock.now();
        let state = self.lock();
        query::upcoming_events(&state.events, &state.selection.registered, now)
    }

    pub fn get_past_events(&self) -> Vec<Event> {
        let now = self.clock.now();
        let state = self.lock();
        query::past_events(&state.events, &state.selection.registered, now)
    }

    /// The filtered feed split into (featured, regular).
    pub fn get_feed(&self) -> (Vec<Event>, Vec<Event>) {
        query::split_featured(self.get_filtered_events())
    }

    pub fn price_quote(&self, id: &str, profile: &ProfileService) -> Option<PriceQuote> {
        let (original, currency) = {
            let state = self.lock();
            let event = state.find(id)?;
            let currency = event
                .price
                .as_ref()
                .map_or(DEFAULT_CURRENCY, |price| price.currency.as_str())
                .to_string();
            (event.price_amount(), currency)
        };
        let discount = profile.get_event_discount(original);
        Some(PriceQuote {
            original,
            discount,
            total: original - discount,
            currency,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::config::AppConfig;
    use crate::db::KvStore;
    use crate::models::{EventLocation, Organizer, Price, UserProfile};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()
    }

    fn event(id: &str, start: DateTime<Utc>, attendees: u32) -> Event {
        Event {
            id: id.to_string(),
            title: format!("Event {id}"),
            description: "description".into(),
            start_date: start,
            end_date: start + Duration::hours(2),
            location: EventLocation::Online {
                link: "https://meet".into(),
            },
            image_url: None,
            organizer: Organizer {
                id: "org".into(),
                name: "Org".into(),
                avatar: String::new(),
            },
            categories: vec![EventCategory::Dev],
            attendees,
            max_attendees: None,
            price: None,
            is_featured: false,
            speakers: Vec::new(),
        }
    }

    fn config() -> Arc<ConfigStore> {
        let path = std::env::temp_dir()
            .join(format!("crio-events-{}", uuid::Uuid::new_v4()))
            .join("config.json");
        Arc::new(ConfigStore::with_config(path, AppConfig::default()))
    }

    fn persister() -> Arc<Persister> {
        Arc::new(Persister::spawn(KvStore::open_in_memory().unwrap()).unwrap())
    }

    fn service(events: Vec<Event>) -> EventService {
        EventService::new(
            events,
            Selection::default(),
            persister(),
            Arc::new(FixedClock::new(now())),
            config(),
        )
    }

    fn two_events() -> EventService {
        service(vec![
            event("a", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(), 5),
            event("b", Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(), 50),
        ])
    }

    #[test]
    fn register_saves_and_counts() {
        let events = two_events();
        assert_eq!(events.register_for_event("a"), RegistrationOutcome::Registered);
        assert!(events.is_registered("a"));
        assert!(events.is_saved("a"));
        assert_eq!(events.get_event_by_id("a").unwrap().event.attendees, 6);
    }

    #[test]
    fn double_registration_is_idempotent() {
        let events = two_events();
        assert_eq!(events.register_for_event("a"), RegistrationOutcome::Registered);
        assert_eq!(
            events.register_for_event("a"),
            RegistrationOutcome::AlreadyRegistered
        );
        assert_eq!(events.get_event_by_id("a").unwrap().event.attendees, 6);
        assert_eq!(events.get_registered_events().len(), 1);
    }

    #[test]
    fn unregister_keeps_saved_and_floors_at_zero() {
        let events = service(vec![event("z", now() + Duration::days(1), 0)]);
        assert_eq!(events.register_for_event("z"), RegistrationOutcome::Registered);
        events
            .update_event(
                "z",
                EventPatch {
                    attendees: Some(0),
                    ..EventPatch::default()
                },
            )
            .unwrap();

        assert_eq!(
            events.unregister_from_event("z"),
            UnregistrationOutcome::Unregistered
        );
        assert!(!events.is_registered("z"));
        assert!(events.is_saved("z"), "unregistering keeps the event saved");
        assert_eq!(events.get_event_by_id("z").unwrap().event.attendees, 0);

        assert_eq!(
            events.unregister_from_event("z"),
            UnregistrationOutcome::NotRegistered
        );
    }

    #[test]
    fn full_and_unknown_events_refuse_registration() {
        let mut full = event("full", now() + Duration::days(3), 10);
        full.max_attendees = Some(10);
        let events = service(vec![full]);

        assert_eq!(events.register_for_event("full"), RegistrationOutcome::EventFull);
        assert!(!events.is_saved("full"));
        assert_eq!(events.register_for_event("nope"), RegistrationOutcome::NotFound);
        assert!(!events.is_registered("nope"));
    }

    #[test]
    fn delete_cascades_to_selection() {
        let events = two_events();
        events.register_for_event("a");
        events.save_event("b");

        assert!(events.delete_event("a"));
        assert!(!events.is_saved("a"));
        assert!(!events.is_registered("a"));
        assert!(events.get_event_by_id("a").is_none());
        assert!(events.is_saved("b"));
        assert!(!events.delete_event("a"));
    }

    #[test]
    fn add_rejects_duplicates_and_prepends() {
        let events = two_events();
        let err = events
            .add_event(event("a", now(), 0))
            .unwrap_err();
        assert!(matches!(err, EventError::DuplicateId(id) if id == "a"));

        events.add_event(event("c", now(), 0)).unwrap();
        assert_eq!(events.events()[0].id, "c");
    }

    #[test]
    fn create_assigns_fresh_ids() {
        let events = two_events();
        let draft = EventDraft {
            title: "Rust Meetup".into(),
            description: "Talks".into(),
            start_date: now(),
            end_date: now() + Duration::hours(2),
            location: EventLocation::Online {
                link: "https://meet".into(),
            },
            categories: vec![EventCategory::Dev],
            max_attendees: None,
            price: None,
            image_url: None,
            organizer: UserProfile::default().as_organizer(),
        };
        let first = events.create_event(draft.clone()).unwrap();
        let second = events.create_event(draft).unwrap();
        assert_ne!(first, second);
        assert!(first.starts_with("event-"));

        let created = events.get_event_by_id(&first).unwrap();
        assert_eq!(created.event.attendees, 0);
        assert!(!created.is_registered);
    }

    #[test]
    fn update_is_noop_for_unknown_and_rejects_invalid_merge() {
        let events = two_events();
        assert!(!events.update_event("missing", EventPatch::default()).unwrap());

        let err = events
            .update_event(
                "a",
                EventPatch {
                    categories: Some(Vec::new()),
                    ..EventPatch::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, EventError::Invalid(ValidationError::NoCategories)));
        assert_eq!(events.get_event_by_id("a").unwrap().event.categories.len(), 1);

        assert!(events
            .update_event(
                "a",
                EventPatch {
                    title: Some("Renamed".into()),
                    ..EventPatch::default()
                },
            )
            .unwrap());
        assert_eq!(events.get_event_by_id("a").unwrap().event.title, "Renamed");
    }

    #[test]
    fn filtered_events_follow_selection() {
        let events = two_events();
        events.set_sort_by(SortBy::Popularity);
        let order: Vec<String> = events.get_filtered_events().into_iter().map(|e| e.id).collect();
        assert_eq!(order, vec!["b", "a"]);

        events.set_search_query("event a");
        assert_eq!(events.get_filtered_events().len(), 1);

        events.set_search_query("");
        assert!(events.toggle_category(EventCategory::Gaming));
        assert!(events.get_filtered_events().is_empty());

        events.clear_filters();
        assert_eq!(events.get_filtered_events().len(), 2);
        assert_eq!(events.selection().sort_by, SortBy::Popularity);
    }

    #[test]
    fn toggle_save_round_trip() {
        let events = two_events();
        assert!(events.toggle_save_event("b"));
        assert_eq!(events.get_saved_events().len(), 1);
        assert!(!events.toggle_save_event("b"));
        assert!(events.get_saved_events().is_empty());
    }

    #[test]
    fn upcoming_uses_clock() {
        let events = two_events();
        events.register_for_event("a");
        events.register_for_event("b");
        let upcoming: Vec<String> = events.get_upcoming_events().into_iter().map(|e| e.id).collect();
        let past: Vec<String> = events.get_past_events().into_iter().map(|e| e.id).collect();
        assert_eq!(upcoming, vec!["b"]);
        assert_eq!(past, vec!["a"]);
    }

    #[test]
    fn price_quote_applies_vip_discount() {
        let mut paid = event("paid", now() + Duration::days(2), 0);
        paid.price = Some(Price {
            amount: 100.0,
            currency: "EUR".into(),
        });
        let events = service(vec![paid, event("free", now(), 0)]);
        let profiles = ProfileService::new(
            UserProfile::default(),
            persister(),
            Arc::new(FixedClock::new(now())),
            config(),
        );

        let quote = events.price_quote("paid", &profiles).unwrap();
        assert_eq!(quote.discount, 0.0);
        assert_eq!(quote.total, 100.0);

        profiles.upgrade_to_vip();
        let quote = events.price_quote("paid", &profiles).unwrap();
        assert!((quote.discount - 15.0).abs() < 1e-9);
        assert!((quote.total - 85.0).abs() < 1e-9);
        assert_eq!(quote.currency, "EUR");

        let free = events.price_quote("free", &profiles).unwrap();
        assert_eq!(free.total, 0.0);
        assert_eq!(free.currency, "USD");
        assert!(events.price_quote("missing", &profiles).is_none());
    }

    #[test]
    fn unknown_ids_cannot_be_saved() {
        let events = two_events();
        assert!(!events.save_event("ghost"));
        assert!(!events.toggle_save_event("ghost"));
        assert!(!events.is_saved("ghost"));
        assert!(events.selection().saved.is_empty());
        assert!(events.save_event("a"));
    }

    #[test]
    fn unsave_removes_only_that_event() {
        let events = two_events();
        events.save_event("a");
        events.save_event("b");
        events.unsave_event("a");
        assert!(!events.is_saved("a"));
        let saved: Vec<String> = events.get_saved_events().into_iter().map(|e| e.id).collect();
        assert_eq!(saved, vec!["b"]);

        events.unsave_event("a");
        assert!(events.is_saved("b"));
    }

    #[test]
    fn selected_categories_replace_previous_choice() {
        let mut games = event("g", now(), 1);
        games.categories = vec![EventCategory::Gaming];
        let events = service(vec![event("d", now(), 1), games]);

        events.set_selected_categories([EventCategory::Gaming]);
        let ids: Vec<String> = events.get_filtered_events().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["g"]);

        events.set_selected_categories([EventCategory::Dev, EventCategory::Gaming]);
        assert_eq!(events.get_filtered_events().len(), 2);
        assert_eq!(events.selection().categories.len(), 2);

        events.set_selected_categories([]);
        assert_eq!(events.get_filtered_events().len(), 2);
    }

    #[test]
    fn feed_splits_featured_from_filtered_list() {
        let mut headline = event("h", now() + Duration::days(1), 10);
        headline.is_featured = true;
        let events = service(vec![event("a", now(), 1), headline, event("b", now(), 2)]);

        let (featured, regular) = events.get_feed();
        assert_eq!(featured.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(), vec!["h"]);
        assert_eq!(regular.len(), 2);

        events.set_search_query("event a");
        let (featured, regular) = events.get_feed();
        assert!(featured.is_empty());
        assert_eq!(regular[0].id, "a");
    }

    #[test]
    fn category_cap_follows_config_updates() {
        let config = config();
        let events = EventService::new(
            Vec::new(),
            Selection::default(),
            persister(),
            Arc::new(FixedClock::new(now())),
            config.clone(),
        );
        let draft = EventDraft {
            title: "Mixer".into(),
            description: "Talks".into(),
            start_date: now(),
            end_date: now() + Duration::hours(1),
            location: EventLocation::Online {
                link: "https://meet".into(),
            },
            categories: vec![EventCategory::Dev, EventCategory::Ai],
            max_attendees: None,
            price: None,
            image_url: None,
            organizer: UserProfile::default().as_organizer(),
        };

        config.update(|config| config.max_event_categories = 1).unwrap();
        let err = events.create_event(draft.clone()).unwrap_err();
        assert!(matches!(
            err,
            EventError::Invalid(ValidationError::TooManyCategories { max: 1 })
        ));

        config.update(|config| config.max_event_categories = 3).unwrap();
        assert!(events.create_event(draft).is_ok());
    }
}
