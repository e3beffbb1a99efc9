//! Confirmation events and the broadcast bus that carries them

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;

/// Maximum number of events to buffer per subscriber
const BROADCAST_CAPACITY: usize = 100;

/// Commitment level a confirmation waits for
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Finality {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

impl fmt::Display for Finality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Finality::Processed => "processed",
            Finality::Confirmed => "confirmed",
            Finality::Finalized => "finalized",
        };
        f.write_str(s)
    }
}

/// Details reported with a confirmation
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfirmationDetails {
    pub slot: u64,
    pub finality: Finality,
}

/// Terminal event for a watched signature
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data")]
pub enum ConfirmationEvent {
    Confirmed {
        signature: String,
        details: ConfirmationDetails,
    },
    TimedOut {
        signature: String,
    },
}

impl ConfirmationEvent {
    pub fn signature(&self) -> &str {
        match self {
            ConfirmationEvent::Confirmed { signature, .. } => signature,
            ConfirmationEvent::TimedOut { signature } => signature,
        }
    }
}

/// Source of confirmation events.
///
/// `watch` asks the source to report on a signature; the terminal event
/// arrives later on every receiver returned by `subscribe`. A source may
/// report a signature more than once.
pub trait ConfirmationSource: Send + Sync {
    fn watch(&self, signature: &str, finality: Finality);

    fn subscribe(&self) -> broadcast::Receiver<ConfirmationEvent>;
}

/// Broadcaster for confirmation events
#[derive(Debug)]
pub struct ConfirmationBus {
    sender: broadcast::Sender<ConfirmationEvent>,
    /// Watched signatures still waiting on a terminal event
    watched: Mutex<HashMap<String, Finality>>,
}

impl ConfirmationBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            sender,
            watched: Mutex::new(HashMap::new()),
        }
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<String, Finality>> {
        match self.watched.lock() {
            Ok(watched) => watched,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Broadcast an event to all subscribers. The signature stops being
    /// watched.
    pub fn emit(&self, event: ConfirmationEvent) {
        self.registry().remove(event.signature());
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Signatures watched and not yet reported, sorted by signature
    pub fn watched(&self) -> Vec<(String, Finality)> {
        let mut watched: Vec<_> = self
            .registry()
            .iter()
            .map(|(signature, finality)| (signature.clone(), *finality))
            .collect();
        watched.sort_by(|a, b| a.0.cmp(&b.0));
        watched
    }
}

impl Default for ConfirmationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfirmationSource for ConfirmationBus {
    fn watch(&self, signature: &str, finality: Finality) {
        log::debug!("Watching {} at {}", signature, finality);
        self.registry().insert(signature.to_string(), finality);
    }

    fn subscribe(&self) -> broadcast::Receiver<ConfirmationEvent> {
        self.sender.subscribe()
    }
}
