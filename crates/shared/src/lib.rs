//! Loreforge wire protocol.
//!
//! Types shared between the engine and its clients: request and response
//! DTOs for the turn and campaign HTTP calls.
//!
//! # Design Principles
//!
//! 1. **No business logic** - Pure data types and serialization
//! 2. **camelCase on the wire** - matches the mobile client's payloads
//! 3. **Optional fields skip serialization** - keeps turn responses compact

pub mod requests;
pub mod responses;

pub use requests::{ByokKeys, CampaignCreateRequest, ChatTurn, TurnRequest};
pub use responses::{CampaignCreateResponse, DiceRollReport, PendingChoice, TurnResponse};
