pub mod analytics;
pub mod clock;
pub mod config;
pub mod db;
pub mod events;
pub mod fixtures;
pub mod logging;
pub mod models;
pub mod persistence;
pub mod profile;
pub mod query;
pub mod selection;
mod utils;
pub mod validation;

use std::{collections::HashSet, path::Path, sync::Arc};

use anyhow::Context;

pub use analytics::EventAnalytics;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{AppConfig, ConfigStore};
pub use db::KvStore;
pub use events::{EventError, EventService, PriceQuote, RegistrationOutcome, UnregistrationOutcome};
pub use models::{Event, EventCategory, EventLocation, EventPatch, EventView, SortBy, UserProfile};
pub use profile::ProfileService;
pub use validation::{EventDraft, ValidationError};

use persistence::{Persister, ALL_KEYS, EVENTS_KEY, PROFILE_KEY, SELECTION_KEY};
use selection::{Selection, SelectionSnapshot};

pub struct App {
    pub config: Arc<ConfigStore>,
    pub events: EventService,
    pub profile: ProfileService,
    persister: Arc<Persister>,
    clock: Arc<dyn Clock>,
}

impl App {
    pub fn launch() -> anyhow::Result<Self> {
        let config = ConfigStore::load();
        logging::init(&config.read().log_filter);
        let kv = KvStore::open_default().context("failed to open local storage")?;
        Self::bootstrap(config, kv, Arc::new(SystemClock))
    }

    pub fn open(database: &Path, config: ConfigStore, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let kv = KvStore::open(database)
            .with_context(|| format!("failed to open local storage at {}", database.display()))?;
        Self::bootstrap(config, kv, clock)
    }

    /// Rehydrates the three records from `kv`, then hands `kv` to the writer.
    pub fn bootstrap(config: ConfigStore, kv: KvStore, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let settings = config.read();

        let stored_events = persistence::load_record(&kv, EVENTS_KEY, persistence::validate_events);
        let seeded = stored_events.is_none();
        let events = match stored_events {
            Some(events) => events,
            None => default_events(&settings)?,
        };

        let mut selection = persistence::load_record::<SelectionSnapshot, _>(&kv, SELECTION_KEY, Ok)
            .map(Selection::from_snapshot)
            .unwrap_or_default();
        let known: HashSet<&str> = events.iter().map(|event| event.id.as_str()).collect();
        let pruned = selection.retain_known(&known);
        if pruned > 0 {
            tracing::warn!(pruned, "dropped selections for unknown events");
        }

        let profile: UserProfile = persistence::load_record(&kv, PROFILE_KEY, Ok).unwrap_or_default();

        let persister = Arc::new(Persister::spawn(kv).context("failed to start storage writer")?);
        if seeded {
            persister.write(EVENTS_KEY, &events);
        }
        if pruned > 0 {
            persister.write(SELECTION_KEY, &selection.snapshot());
        }

        tracing::info!(
            events = events.len(),
            saved = selection.saved.len(),
            registered = selection.registered.len(),
            "store ready"
        );

        Ok(Self {
            events: EventService::new(events, selection, persister.clone(), clock.clone(), config.clone()),
            profile: ProfileService::new(profile, persister.clone(), clock.clone(), config.clone()),
            config,
            persister,
            clock,
        })
    }

    pub fn analytics(&self) -> EventAnalytics {
        EventAnalytics::compute(&self.events.events(), self.clock.now())
    }

    pub fn organizer(&self) -> models::Organizer {
        self.profile.profile().as_organizer()
    }

    /// Blocks until all pending writes are on disk.
    pub fn flush(&self) {
        self.persister.flush();
    }

    pub fn reset_all(&self) -> anyhow::Result<()> {
        let events = default_events(&self.config.read())?;
        for key in ALL_KEYS {
            self.persister.remove(key);
        }
        self.events.reset(events, Selection::default());
        self.profile.reset(UserProfile::default());
        tracing::warn!("local storage reset");
        Ok(())
    }
}

fn default_events(config: &AppConfig) -> anyhow::Result<Vec<Event>> {
    if !config.seed_fixtures {
        return Ok(Vec::new());
    }
    fixtures::seed_events().context("bundled fixtures are malformed")
}
