pub mod config;
pub mod credentials;
pub mod errors;
pub mod models;
pub mod traits;

pub use config::{AppConfig, BrokerConfig, BrokerType, RouteConfig};
pub use credentials::{CredentialHeaders, SecretProvider, SecretString};
pub use errors::*;
pub use models::{InboundMessage, OrchestrationOutcome};
pub use traits::{
    Delivery, DeliveryAcker, MessageBroker, OrchestrationService, OrchestrationServiceFactory,
    Subscription,
};
