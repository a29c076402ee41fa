pub mod clock;
pub mod persistence;
pub mod ports;
pub mod prompt_templates;
pub mod providers;
pub mod resilient_llm;
