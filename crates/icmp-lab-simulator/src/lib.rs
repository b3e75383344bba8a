pub mod engine;
pub mod scenario_runner;
pub mod trace;

pub use engine::{LinkEventSummary, SimulatedTransport};
pub use trace::ScenarioReport;
