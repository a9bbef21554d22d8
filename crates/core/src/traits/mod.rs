pub mod message_queue;
pub mod orchestration;

pub use message_queue::{Delivery, DeliveryAcker, MessageBroker, Subscription};
pub use orchestration::{OrchestrationService, OrchestrationServiceFactory};
