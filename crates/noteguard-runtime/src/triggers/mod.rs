//! Rule-driven automation over note events.

mod engine;

pub use engine::TriggerEngine;
