//! Control command handlers, organized by functional domain.
//!
//! - `policy`: process access-control watchdog start/stop/status
//! - `netload`: latency sampling start/stop/poll and single pings
//! - `processes`: process listing and manual termination
//! - `logic`: Pure business logic functions (unit-testable)
//! - `state`: Shared `AppState` definition

pub(crate) mod logic;
pub mod netload;
pub mod policy;
pub mod processes;
mod state;

pub use logic::SampleStats;
pub use netload::NetloadReport;
pub use policy::PolicyStatus;
pub use state::AppState;
