//! Loreforge domain layer.
//!
//! Pure types and invariants for the game-turn pipeline: world modules,
//! the open-schema game state envelope and its deterministic merges,
//! dice formulas, reviewer corrections, messages, and usage counters.
//!
//! No I/O lives here. Everything that touches a model provider or the
//! document store belongs to `loreforge-engine`.

pub mod campaign;
pub mod corrections;
pub mod dice;
pub mod error;
pub mod ids;
pub mod message;
pub mod state;
pub mod usage;
pub mod world;

pub use campaign::Campaign;
pub use corrections::{apply_corrections, ListCorrection, ResourceCorrection, StateCorrections};
pub use dice::{DiceFormula, DiceParseError, DiceRollResult};
pub use error::DomainError;
pub use ids::{CampaignId, DocumentId, MessageId};
pub use message::{MessageRole, StoredMessage, TokenUsage};
pub use state::{merge_delta, GameState};
pub use usage::{DailyUsage, UsageCounters};
pub use world::WorldModule;
