pub mod consensus;
pub mod correlation;
pub mod error;
pub mod health;
pub mod invoker;
pub mod orchestrator;
pub mod parser;
pub mod prompts;
pub mod providers;
pub mod rate_gate;
pub mod registry;
pub mod selection;
pub mod transport;

pub mod test_support;

pub use consensus::{calculate, calculate_consensus};
pub use error::AgentError;
pub use health::HealthTracker;
pub use invoker::{Invoker, InvokerSettings};
pub use orchestrator::{ConsensusEngine, RoundEvent};
pub use registry::AnalystRegistry;
pub use transport::{AnalystTransport, HttpTransport};
