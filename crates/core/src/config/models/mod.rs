pub mod app_config;
pub mod message_queue;
pub mod observability;
pub mod orchestration;
pub mod route;

// Re-export main types for easier imports
pub use app_config::AppConfig;
pub use message_queue::{BrokerConfig, BrokerType};
pub use observability::ObservabilityConfig;
pub use orchestration::{CredentialConfig, OrchestrationConfig, DEFAULT_API_KEY_HEADER};
pub use route::{RouteConfig, DEFAULT_CREDENTIAL, DEFAULT_SUBSCRIPTION};
