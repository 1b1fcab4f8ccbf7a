use std::{collections::HashSet, thread::JoinHandle};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::db::{KvStore, StorageError};
use crate::models::Event;
use crate::validation::check_event;

pub const SELECTION_KEY: &str = "crio-events-storage";
pub const EVENTS_KEY: &str = "crio-event-list";
pub const PROFILE_KEY: &str = "crio-user-storage";
pub const ALL_KEYS: [&str; 3] = [SELECTION_KEY, EVENTS_KEY, PROFILE_KEY];

pub const STORAGE_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    version: u32,
    state: &'a T,
}

#[derive(Deserialize)]
struct Envelope<T> {
    version: u32,
    state: T,
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unsupported storage version {found}")]
    Version { found: u32 },
    #[error("invalid state: {0}")]
    Invalid(String),
}

pub fn encode<T: Serialize>(state: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(&EnvelopeRef {
        version: STORAGE_VERSION,
        state,
    })
}

pub fn decode<T: DeserializeOwned>(payload: &str) -> Result<T, LoadError> {
    // Check the version before committing to the state's shape.
    let probe: Envelope<serde_json::Value> = serde_json::from_str(payload)?;
    if probe.version != STORAGE_VERSION {
        return Err(LoadError::Version {
            found: probe.version,
        });
    }
    Ok(serde_json::from_value(probe.state)?)
}

/// Reads and validates the record under `key`.
///
/// `None` means "use defaults": either nothing was stored, the record was
/// unusable and has been deleted, or storage itself could not be read.
pub fn load_record<T, F>(kv: &KvStore, key: &str, validate: F) -> Option<T>
where
    T: DeserializeOwned,
    F: FnOnce(T) -> Result<T, LoadError>,
{
    let payload = match kv.get(key) {
        Ok(Some(payload)) => payload,
        Ok(None) => {
            tracing::debug!(key, "no stored record, using defaults");
            return None;
        }
        Err(err) => {
            tracing::warn!(key, "storage read failed, using defaults: {err}");
            return None;
        }
    };

    match decode::<T>(&payload).and_then(validate) {
        Ok(state) => {
            tracing::debug!(key, "record rehydrated");
            Some(state)
        }
        Err(err) => {
            tracing::warn!(key, "discarding stored record: {err}");
            if let Err(err) = kv.remove(key) {
                tracing::warn!(key, "failed to delete discarded record: {err}");
            }
            None
        }
    }
}

pub fn validate_events(events: Vec<Event>) -> Result<Vec<Event>, LoadError> {
    let mut seen = HashSet::new();
    for event in &events {
        if !seen.insert(event.id.as_str()) {
            return Err(LoadError::Invalid(format!("duplicate event id {}", event.id)));
        }
        check_event(event)
            .map_err(|err| LoadError::Invalid(format!("event {}: {err}", event.id)))?;
    }
    Ok(events)
}

enum Command {
    Put { key: &'static str, payload: String },
    Remove { key: &'static str },
    Flush(oneshot::Sender<()>),
}

pub struct Persister {
    tx: Option<mpsc::UnboundedSender<Command>>,
    worker: Option<JoinHandle<()>>,
}

impl Persister {
    pub fn spawn(kv: KvStore) -> Result<Self, StorageError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Command>();
        let worker = std::thread::Builder::new()
            .name("crio-persist".into())
            .spawn(move || {
                while let Some(command) = rx.blocking_recv() {
                    match command {
                        Command::Put { key, payload } => {
                            if let Err(err) = kv.put(key, &payload) {
                                tracing::warn!(key, "persist write failed: {err}");
                            } else {
                                tracing::trace!(key, bytes = payload.len(), "record written");
                            }
                        }
                        Command::Remove { key } => {
                            if let Err(err) = kv.remove(key) {
                                tracing::warn!(key, "persist delete failed: {err}");
                            }
                        }
                        Command::Flush(done) => {
                            let _ = done.send(());
                        }
                    }
                }
                tracing::debug!("persist writer stopped");
            })?;

        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
        })
    }

    /// Queues a snapshot of `state` under `key`. Never blocks on disk.
    pub fn write<T: Serialize>(&self, key: &'static str, state: &T) {
        match encode(state) {
            Ok(payload) => self.send(Command::Put { key, payload }),
            Err(err) => tracing::warn!(key, "failed to encode record: {err}"),
        }
    }

    pub fn remove(&self, key: &'static str) {
        self.send(Command::Remove { key });
    }

    /// Blocks until every previously queued write has been applied.
    ///
    /// Must not be called from inside an async runtime worker.
    pub fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(Command::Flush(done_tx));
        if done_rx.blocking_recv().is_err() {
            tracing::warn!("persist writer gone before flush completed");
        }
    }

    fn send(&self, command: Command) {
        let sent = self
            .tx
            .as_ref()
            .is_some_and(|tx| tx.send(command).is_ok());
        if !sent {
            tracing::warn!("persist writer unavailable, dropping command");
        }
    }
}

impl Drop for Persister {
    fn drop(&mut self) {
        // Closing the channel lets the writer drain and exit.
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("persist writer panicked");
            }
        }
    }
}
