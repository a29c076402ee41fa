//! Metered usage: per-user cumulative counters and a global daily aggregate.
//!
//! The engine only ever increments these; decrements belong to billing
//! flows outside this repository.

use serde::{Deserialize, Serialize};

use crate::message::TokenUsage;

/// Cumulative counters for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageCounters {
    pub turns_used: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl UsageCounters {
    pub fn record_turn(&mut self, usage: TokenUsage) {
        self.turns_used += 1;
        self.prompt_tokens += usage.prompt_tokens as u64;
        self.completion_tokens += usage.completion_tokens as u64;
        self.total_tokens += usage.total_tokens as u64;
    }
}

/// Global aggregate for one calendar day, keyed `YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyUsage {
    pub date: String,
    pub turns: u64,
    pub total_tokens: u64,
}
