pub mod in_memory_queue;
pub mod message_queue;
pub mod message_queue_factory;
pub mod orchestration_client;

pub use in_memory_queue::InMemoryBroker;
pub use message_queue::RabbitMQBroker;
pub use message_queue_factory::BrokerFactory;
pub use orchestration_client::{HttpOrchestrationClient, HttpOrchestrationFactory};
