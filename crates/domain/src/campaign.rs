//! Campaign entity: one character's ongoing story in one world module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::CampaignId;
use crate::state::GameState;
use crate::world::WorldModule;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: CampaignId,
    pub name: String,
    pub world_module: WorldModule,
    /// Open-ended character sheet, shaped by the client.
    pub character: Value,
    pub state: GameState,
    /// Completed turns. Drives the state-reviewer throttle.
    pub turns_played: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    pub fn new(
        name: impl Into<String>,
        world_module: WorldModule,
        character: Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CampaignId::new(),
            name: name.into(),
            world_module,
            character,
            state: world_module.initial_state(),
            turns_played: 0,
            created_at: now,
            updated_at: now,
        }
    }
}
