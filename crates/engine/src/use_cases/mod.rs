//! Pipeline services: prompt resolution, knowledge retrieval, the three
//! model stages, and the orchestrator that glues them into one turn.

pub mod brain;
pub mod campaign;
pub mod knowledge;
pub mod prompts;
pub mod reviewer;
pub mod turn;
pub mod voice;
