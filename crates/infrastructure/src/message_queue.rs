use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::StreamExt;
use lapin::{
    acker::Acker,
    options::*,
    types::{AMQPValue, FieldTable, LongString, ShortString},
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer, ExchangeKind,
};
use processor_core::{
    BrokerConfig, Delivery, DeliveryAcker, InboundMessage, MessageBroker, ProcessorError,
    ProcessorResult, RouteConfig, Subscription,
};
use tracing::{debug, info, warn};

const DELIVERY_COUNT_HEADER: &str = "x-delivery-count";

/// RabbitMQ消息代理实现
///
/// 主题映射为 `topic` 交换机，订阅映射为绑定在其上的仲裁队列
/// `<topic>.<subscription>`。重新投递次数和死信转发由队列参数交给代理执行。
pub struct RabbitMQBroker {
    connection: Connection,
    config: BrokerConfig,
}

impl RabbitMQBroker {
    /// 创建新的RabbitMQ连接
    pub async fn new(config: BrokerConfig) -> ProcessorResult<Self> {
        let connect = Connection::connect(&config.url, ConnectionProperties::default());
        let connection =
            tokio::time::timeout(Duration::from_secs(config.connection_timeout_seconds), connect)
                .await
                .map_err(|_| ProcessorError::MessageQueue("连接RabbitMQ超时".to_string()))?
                .map_err(|e| ProcessorError::MessageQueue(format!("连接RabbitMQ失败: {e}")))?;

        info!("Connected to RabbitMQ");

        Ok(Self { connection, config })
    }

    /// 声明路由所需的交换机、队列与死信队列
    async fn declare_topology(&self, channel: &Channel, route: &RouteConfig) -> ProcessorResult<String> {
        let queue_name = route.subscription_path();
        let dead_letter_exchange = format!("{}.dlx", route.topic);
        let dead_letter_queue = format!("{queue_name}.dlq");

        let durable_exchange = ExchangeDeclareOptions {
            durable: true,
            ..Default::default()
        };

        channel
            .exchange_declare(
                &route.topic,
                ExchangeKind::Topic,
                durable_exchange.clone(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                ProcessorError::MessageQueue(format!("声明交换机 {} 失败: {e}", route.topic))
            })?;

        channel
            .exchange_declare(
                &dead_letter_exchange,
                ExchangeKind::Direct,
                durable_exchange,
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                ProcessorError::MessageQueue(format!("声明死信交换机 {dead_letter_exchange} 失败: {e}"))
            })?;

        let durable_queue = QueueDeclareOptions {
            durable: true,
            exclusive: false,
            auto_delete: false,
            ..Default::default()
        };

        channel
            .queue_declare(&dead_letter_queue, durable_queue.clone(), FieldTable::default())
            .await
            .map_err(|e| {
                ProcessorError::MessageQueue(format!("声明死信队列 {dead_letter_queue} 失败: {e}"))
            })?;

        channel
            .queue_bind(
                &dead_letter_queue,
                &dead_letter_exchange,
                &queue_name,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                ProcessorError::MessageQueue(format!("绑定死信队列 {dead_letter_queue} 失败: {e}"))
            })?;

        channel
            .queue_declare(
                &queue_name,
                durable_queue,
                subscription_queue_arguments(
                    &dead_letter_exchange,
                    &queue_name,
                    self.config.max_delivery_count,
                ),
            )
            .await
            .map_err(|e| {
                ProcessorError::MessageQueue(format!("声明队列 {queue_name} 失败: {e}"))
            })?;

        channel
            .queue_bind(
                &queue_name,
                &route.topic,
                "#",
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| ProcessorError::MessageQueue(format!("绑定队列 {queue_name} 失败: {e}")))?;

        debug!(
            queue = %queue_name,
            exchange = %route.topic,
            "Subscription topology declared"
        );
        Ok(queue_name)
    }

    /// 获取连接状态
    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }
}

#[async_trait]
impl MessageBroker for RabbitMQBroker {
    async fn subscribe(&self, route: &RouteConfig) -> ProcessorResult<Box<dyn Subscription>> {
        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(|e| ProcessorError::MessageQueue(format!("创建通道失败: {e}")))?;

        let prefetch = u16::try_from(self.config.max_concurrent_calls).unwrap_or(u16::MAX);
        channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| ProcessorError::MessageQueue(format!("设置预取数量失败: {e}")))?;

        let queue_name = self.declare_topology(&channel, route).await?;
        let consumer_tag = consumer_tag(&route.name);

        let consumer = channel
            .basic_consume(
                &queue_name,
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| ProcessorError::MessageQueue(format!("创建消费者失败: {e}")))?;

        info!(
            route = %route.name,
            queue = %queue_name,
            consumer_tag = %consumer_tag,
            "Subscribed to RabbitMQ queue"
        );

        Ok(Box::new(RabbitMQSubscription {
            _channel: channel,
            consumer,
            queue_name,
        }))
    }

    async fn close(&self) -> ProcessorResult<()> {
        self.connection
            .close(200, "正常关闭")
            .await
            .map_err(|e| ProcessorError::MessageQueue(format!("关闭连接失败: {e}")))?;

        info!("RabbitMQ connection closed");
        Ok(())
    }
}

struct RabbitMQSubscription {
    _channel: Channel,
    consumer: Consumer,
    queue_name: String,
}

#[async_trait]
impl Subscription for RabbitMQSubscription {
    async fn receive(&mut self) -> ProcessorResult<Option<Delivery>> {
        loop {
            let delivery = match self.consumer.next().await {
                Some(Ok(delivery)) => delivery,
                Some(Err(e)) => {
                    return Err(ProcessorError::MessageQueue(format!(
                        "从队列 {} 接收消息失败: {e}",
                        self.queue_name
                    )))
                }
                None => return Ok(None),
            };

            let metadata = DeliveryMetadata::from_amqp(
                &self.queue_name,
                delivery.delivery_tag,
                delivery.redelivered,
                &delivery.properties,
                Utc::now(),
            );

            let body = match String::from_utf8(delivery.data) {
                Ok(body) => body,
                Err(e) => {
                    // 无法作为文本交给编排服务的消息直接转入死信
                    warn!(
                        queue = %self.queue_name,
                        message_id = %metadata.message_id,
                        error = %e,
                        "Message body is not valid UTF-8, dead-lettering"
                    );
                    delivery
                        .acker
                        .nack(BasicNackOptions {
                            requeue: false,
                            ..Default::default()
                        })
                        .await
                        .map_err(|e| ProcessorError::MessageQueue(format!("拒绝消息失败: {e}")))?;
                    continue;
                }
            };

            let message = InboundMessage::new(
                body,
                metadata.delivery_count,
                metadata.enqueued_time_utc,
                metadata.message_id,
            );

            return Ok(Some(Delivery::new(
                message,
                Box::new(RabbitMQAcker {
                    acker: delivery.acker,
                }),
            )));
        }
    }
}

struct RabbitMQAcker {
    acker: Acker,
}

#[async_trait]
impl DeliveryAcker for RabbitMQAcker {
    async fn complete(&self) -> ProcessorResult<()> {
        self.acker
            .ack(BasicAckOptions::default())
            .await
            .map(|_| ())
            .map_err(|e| ProcessorError::MessageQueue(format!("确认消息失败: {e}")))
    }

    async fn abandon(&self) -> ProcessorResult<()> {
        self.acker
            .nack(BasicNackOptions {
                requeue: true,
                ..Default::default()
            })
            .await
            .map(|_| ())
            .map_err(|e| ProcessorError::MessageQueue(format!("拒绝消息失败: {e}")))
    }
}

/// 从AMQP属性中提取的投递元数据
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryMetadata {
    pub delivery_count: u32,
    pub enqueued_time_utc: DateTime<Utc>,
    pub message_id: String,
}

impl DeliveryMetadata {
    pub fn from_amqp(
        queue_name: &str,
        delivery_tag: u64,
        redelivered: bool,
        properties: &BasicProperties,
        received_at: DateTime<Utc>,
    ) -> Self {
        // 仲裁队列在每次退回后累加 x-delivery-count，首次投递时没有该头
        let delivery_count = properties
            .headers()
            .as_ref()
            .and_then(header_delivery_count)
            .map(|returned| returned.saturating_add(1))
            .unwrap_or(if redelivered { 2 } else { 1 });

        let enqueued_time_utc = properties
            .timestamp()
            .as_ref()
            .copied()
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or(received_at);

        let message_id = properties
            .message_id()
            .as_ref()
            .map(|id| id.as_str().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("{queue_name}:{delivery_tag}"));

        Self {
            delivery_count,
            enqueued_time_utc,
            message_id,
        }
    }
}

fn header_delivery_count(headers: &FieldTable) -> Option<u32> {
    let (_, value) = headers
        .inner()
        .iter()
        .find(|(key, _)| key.as_str() == DELIVERY_COUNT_HEADER)?;

    match value {
        AMQPValue::LongLongInt(v) => u32::try_from(*v).ok(),
        AMQPValue::LongInt(v) => u32::try_from(*v).ok(),
        AMQPValue::LongUInt(v) => Some(*v),
        AMQPValue::ShortInt(v) => u32::try_from(*v).ok(),
        AMQPValue::ShortUInt(v) => Some(u32::from(*v)),
        AMQPValue::ShortShortInt(v) => u32::try_from(*v).ok(),
        AMQPValue::ShortShortUInt(v) => Some(u32::from(*v)),
        _ => None,
    }
}

/// 订阅队列的声明参数
fn subscription_queue_arguments(
    dead_letter_exchange: &str,
    dead_letter_routing_key: &str,
    max_delivery_count: u32,
) -> FieldTable {
    let mut arguments = FieldTable::default();
    arguments.insert(
        ShortString::from("x-queue-type"),
        AMQPValue::LongString(LongString::from("quorum")),
    );
    // 允许退回的次数，超出后由代理转入死信
    let delivery_limit = i32::try_from(max_delivery_count.saturating_sub(1)).unwrap_or(i32::MAX);
    arguments.insert(
        ShortString::from("x-delivery-limit"),
        AMQPValue::LongInt(delivery_limit),
    );
    arguments.insert(
        ShortString::from("x-dead-letter-exchange"),
        AMQPValue::LongString(LongString::from(dead_letter_exchange)),
    );
    arguments.insert(
        ShortString::from("x-dead-letter-routing-key"),
        AMQPValue::LongString(LongString::from(dead_letter_routing_key)),
    );
    arguments
}

fn consumer_tag(route_name: &str) -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown-host".to_string());
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{host}-{route_name}-{}", &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with_count(count: i64) -> FieldTable {
        let mut headers = FieldTable::default();
        headers.insert(
            ShortString::from(DELIVERY_COUNT_HEADER),
            AMQPValue::LongLongInt(count),
        );
        headers
    }

    #[test]
    fn test_first_delivery_metadata() {
        let enqueued = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let properties = BasicProperties::default()
            .with_message_id(ShortString::from("m-1"))
            .with_timestamp(enqueued.timestamp() as u64);

        let metadata = DeliveryMetadata::from_amqp(
            "encoding-service.metadata-processor",
            7,
            false,
            &properties,
            Utc::now(),
        );

        assert_eq!(metadata.delivery_count, 1);
        assert_eq!(metadata.enqueued_time_utc, enqueued);
        assert_eq!(metadata.message_id, "m-1");
    }

    #[test]
    fn test_quorum_delivery_count_header() {
        let properties = BasicProperties::default().with_headers(headers_with_count(2));

        let metadata = DeliveryMetadata::from_amqp("q", 1, true, &properties, Utc::now());
        assert_eq!(metadata.delivery_count, 3);
    }

    #[test]
    fn test_redelivered_without_header() {
        let properties = BasicProperties::default();

        let metadata = DeliveryMetadata::from_amqp("q", 1, true, &properties, Utc::now());
        assert_eq!(metadata.delivery_count, 2);
    }

    #[test]
    fn test_missing_properties_fall_back() {
        let received_at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let metadata = DeliveryMetadata::from_amqp(
            "video-events.metadata-processor",
            42,
            false,
            &BasicProperties::default(),
            received_at,
        );

        assert_eq!(metadata.enqueued_time_utc, received_at);
        assert_eq!(metadata.message_id, "video-events.metadata-processor:42");
    }

    #[test]
    fn test_subscription_queue_arguments() {
        let arguments = subscription_queue_arguments("video-events.dlx", "video-events.metadata-processor", 10);
        let inner = arguments.inner();

        let limit = inner
            .iter()
            .find(|(k, _)| k.as_str() == "x-delivery-limit")
            .map(|(_, v)| v.clone());
        assert_eq!(limit, Some(AMQPValue::LongInt(9)));
        assert!(inner.iter().any(|(k, _)| k.as_str() == "x-dead-letter-exchange"));
        assert!(inner.iter().any(|(k, _)| k.as_str() == "x-queue-type"));
    }

    #[test]
    fn test_consumer_tag_contains_route() {
        let tag = consumer_tag("encodingservice");
        assert!(tag.contains("-encodingservice-"));
    }
}
