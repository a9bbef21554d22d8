pub mod message;

pub use message::{InboundMessage, OrchestrationOutcome};
