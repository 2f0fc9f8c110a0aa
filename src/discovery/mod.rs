//! Movie discovery subsystem
//!
//! An orchestrator coordinates four specialized agents (fetch, search,
//! validate, rank) over a shared request/report protocol to turn one
//! natural-language discovery request into a ranked candidate list.

pub mod agents;
pub mod orchestrator;
pub mod parsers;
pub mod protocol;
pub mod validation;

pub use agents::{AgentSet, FetchAgent, HttpPageFetcher, PageFetcher, RankerAgent, SearchAgent, ValidatorAgent};
pub use orchestrator::{DiscoveryOutcome, DiscoveryRequest, Orchestrator, SourceAttempt};
pub use protocol::{AgentKind, AgentReport, AgentRequest, ReportStatus};
pub use validation::{ExclusionReason, Verdict};
