use std::sync::Arc;

use processor_core::{BrokerConfig, BrokerType, MessageBroker, ProcessorError, ProcessorResult};
use tracing::{debug, info};

use crate::{InMemoryBroker, RabbitMQBroker};

pub struct BrokerFactory;

impl BrokerFactory {
    pub async fn create(config: &BrokerConfig) -> ProcessorResult<Arc<dyn MessageBroker>> {
        debug!("Creating message broker with type: {:?}", config.r#type);

        Self::validate_config(config)?;

        match config.r#type {
            BrokerType::Rabbitmq => {
                info!("Initializing RabbitMQ message broker");
                let rabbitmq = RabbitMQBroker::new(config.clone()).await?;
                Ok(Arc::new(rabbitmq))
            }
            BrokerType::InMemory => {
                info!("Initializing in-memory message broker");
                Ok(Arc::new(InMemoryBroker::new(config.max_delivery_count)))
            }
        }
    }

    pub fn validate_config(config: &BrokerConfig) -> ProcessorResult<()> {
        if config.r#type == BrokerType::Rabbitmq {
            if config.url.is_empty() {
                return Err(ProcessorError::Configuration(
                    "RabbitMQ配置缺失：需要提供有效的AMQP URL".to_string(),
                ));
            }
            if !config.url.starts_with("amqp://") && !config.url.starts_with("amqps://") {
                return Err(ProcessorError::Configuration(
                    "RabbitMQ URL必须以amqp://或amqps://开头".to_string(),
                ));
            }
        }

        if config.max_delivery_count == 0 {
            return Err(ProcessorError::Configuration(
                "最大投递次数必须大于0".to_string(),
            ));
        }

        Ok(())
    }
}
