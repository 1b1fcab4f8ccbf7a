use crate::models::Event;

const SEED_EVENTS: &str = include_str!("../fixtures/events.json");

pub fn seed_events() -> Result<Vec<Event>, serde_json::Error> {
    serde_json::from_str(SEED_EVENTS)
}
