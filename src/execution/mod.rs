// Bracket-order planning and placement
pub mod orchestrator;
pub mod rounding;

pub use orchestrator::{BracketError, BracketReceipt, BracketStep, Orchestrator};
pub use rounding::round_to;
