use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use processor_core::{
    Delivery, DeliveryAcker, InboundMessage, MessageBroker, ProcessorError, ProcessorResult,
    RouteConfig, Subscription,
};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// 内存消息代理实现
///
/// 适用于嵌入式部署和测试。发布到主题的消息会复制到该主题下的每个订阅；
/// 被放弃的消息重新排队，投递次数达到 `max_delivery_count` 后转入该订阅的死信列表。
#[derive(Debug)]
pub struct InMemoryBroker {
    subscriptions: Mutex<HashMap<(String, String), Arc<SubscriptionQueue>>>,
    max_delivery_count: u32,
}

#[derive(Debug)]
struct SubscriptionQueue {
    name: String,
    state: Mutex<QueueState>,
    notify: Notify,
    max_delivery_count: u32,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<StoredMessage>,
    dead_letters: Vec<InboundMessage>,
    in_flight: usize,
    closed: bool,
}

#[derive(Debug, Clone)]
struct StoredMessage {
    body: String,
    enqueued_time_utc: DateTime<Utc>,
    message_id: String,
    delivery_count: u32,
}

impl StoredMessage {
    fn to_inbound(&self) -> InboundMessage {
        InboundMessage::new(
            self.body.clone(),
            self.delivery_count,
            self.enqueued_time_utc,
            self.message_id.clone(),
        )
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // 持锁期间不会panic，中毒只可能来自测试线程，直接沿用内部数据
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SubscriptionQueue {
    fn new(topic: &str, subscription: &str, max_delivery_count: u32) -> Self {
        Self {
            name: format!("{topic}.{subscription}"),
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            max_delivery_count,
        }
    }

    fn enqueue(&self, message: StoredMessage) {
        lock(&self.state).pending.push_back(message);
        self.notify.notify_one();
    }

    fn settle(&self, message: StoredMessage, abandoned: bool) {
        let mut state = lock(&self.state);
        state.in_flight = state.in_flight.saturating_sub(1);

        if !abandoned {
            debug!(subscription = %self.name, message_id = %message.message_id, "Message completed");
            return;
        }

        if message.delivery_count >= self.max_delivery_count {
            warn!(
                subscription = %self.name,
                message_id = %message.message_id,
                delivery_count = message.delivery_count,
                "Max delivery count reached, moving message to dead-letter"
            );
            state.dead_letters.push(message.to_inbound());
        } else {
            debug!(
                subscription = %self.name,
                message_id = %message.message_id,
                delivery_count = message.delivery_count,
                "Message abandoned, requeued"
            );
            state.pending.push_back(message);
            drop(state);
            self.notify.notify_one();
        }
    }
}

impl InMemoryBroker {
    pub fn new(max_delivery_count: u32) -> Self {
        info!(max_delivery_count, "Creating in-memory message broker");
        Self {
            subscriptions: Mutex::new(HashMap::new()),
            max_delivery_count: max_delivery_count.max(1),
        }
    }

    /// 创建订阅（已存在时直接返回）
    pub fn create_subscription(&self, topic: &str, subscription: &str) {
        self.get_or_create(topic, subscription);
    }

    fn get_or_create(&self, topic: &str, subscription: &str) -> Arc<SubscriptionQueue> {
        let mut subscriptions = lock(&self.subscriptions);
        subscriptions
            .entry((topic.to_string(), subscription.to_string()))
            .or_insert_with(|| {
                debug!(topic, subscription, "Creating in-memory subscription");
                Arc::new(SubscriptionQueue::new(
                    topic,
                    subscription,
                    self.max_delivery_count,
                ))
            })
            .clone()
    }

    fn find(&self, topic: &str, subscription: &str) -> ProcessorResult<Arc<SubscriptionQueue>> {
        lock(&self.subscriptions)
            .get(&(topic.to_string(), subscription.to_string()))
            .cloned()
            .ok_or_else(|| {
                ProcessorError::MessageQueue(format!("Subscription '{topic}/{subscription}' not found"))
            })
    }

    /// 发布消息到主题，返回生成的消息ID
    pub fn publish(&self, topic: &str, body: &str) -> ProcessorResult<String> {
        let message_id = uuid::Uuid::new_v4().to_string();
        self.publish_with_id(topic, &message_id, body)?;
        Ok(message_id)
    }

    /// 以指定的消息ID发布消息到主题
    pub fn publish_with_id(&self, topic: &str, message_id: &str, body: &str) -> ProcessorResult<()> {
        if message_id.is_empty() {
            return Err(ProcessorError::MessageQueue(
                "Message ID cannot be empty".to_string(),
            ));
        }

        let targets: Vec<Arc<SubscriptionQueue>> = lock(&self.subscriptions)
            .iter()
            .filter(|((t, _), _)| t == topic)
            .map(|(_, queue)| queue.clone())
            .collect();

        if targets.is_empty() {
            debug!(topic, message_id, "No subscriptions on topic, message dropped");
            return Ok(());
        }

        let stored = StoredMessage {
            body: body.to_string(),
            enqueued_time_utc: Utc::now(),
            message_id: message_id.to_string(),
            delivery_count: 0,
        };

        for queue in targets {
            queue.enqueue(stored.clone());
        }

        debug!(topic, message_id, "Published message");
        Ok(())
    }

    /// 订阅中等待投递的消息数
    pub fn pending_count(&self, topic: &str, subscription: &str) -> ProcessorResult<usize> {
        let queue = self.find(topic, subscription)?;
        let count = lock(&queue.state).pending.len();
        Ok(count)
    }

    /// 已投递但尚未确认的消息数
    pub fn in_flight_count(&self, topic: &str, subscription: &str) -> ProcessorResult<usize> {
        let queue = self.find(topic, subscription)?;
        let count = lock(&queue.state).in_flight;
        Ok(count)
    }

    /// 订阅的死信消息
    pub fn dead_letters(&self, topic: &str, subscription: &str) -> ProcessorResult<Vec<InboundMessage>> {
        let queue = self.find(topic, subscription)?;
        let dead_letters = lock(&queue.state).dead_letters.clone();
        Ok(dead_letters)
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new(10)
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn subscribe(&self, route: &RouteConfig) -> ProcessorResult<Box<dyn Subscription>> {
        let queue = self.get_or_create(&route.topic, &route.subscription);
        info!(route = %route.name, subscription = %queue.name, "Subscribed to in-memory subscription");
        Ok(Box::new(InMemorySubscription { queue }))
    }

    async fn close(&self) -> ProcessorResult<()> {
        let queues: Vec<Arc<SubscriptionQueue>> =
            lock(&self.subscriptions).values().cloned().collect();

        for queue in queues {
            lock(&queue.state).closed = true;
            queue.notify.notify_waiters();
        }

        info!("In-memory message broker closed");
        Ok(())
    }
}

struct InMemorySubscription {
    queue: Arc<SubscriptionQueue>,
}

#[async_trait]
impl Subscription for InMemorySubscription {
    async fn receive(&mut self) -> ProcessorResult<Option<Delivery>> {
        loop {
            // 先注册等待再检查状态，避免错过关闭通知
            let notified = self.queue.notify.notified();

            {
                let mut state = lock(&self.queue.state);
                if state.closed {
                    return Ok(None);
                }

                if let Some(mut message) = state.pending.pop_front() {
                    message.delivery_count += 1;
                    state.in_flight += 1;

                    let inbound = message.to_inbound();
                    let acker = InMemoryAcker {
                        queue: self.queue.clone(),
                        message: Mutex::new(Some(message)),
                        settled: AtomicBool::new(false),
                    };
                    return Ok(Some(Delivery::new(inbound, Box::new(acker))));
                }
            }

            notified.await;
        }
    }
}

struct InMemoryAcker {
    queue: Arc<SubscriptionQueue>,
    message: Mutex<Option<StoredMessage>>,
    settled: AtomicBool,
}

impl InMemoryAcker {
    fn settle(&self, abandoned: bool) -> ProcessorResult<()> {
        if self.settled.swap(true, Ordering::SeqCst) {
            return Err(ProcessorError::MessageQueue(
                "Delivery already settled".to_string(),
            ));
        }

        if let Some(message) = lock(&self.message).take() {
            self.queue.settle(message, abandoned);
        }
        Ok(())
    }
}

#[async_trait]
impl DeliveryAcker for InMemoryAcker {
    async fn complete(&self) -> ProcessorResult<()> {
        self.settle(false)
    }

    async fn abandon(&self) -> ProcessorResult<()> {
        self.settle(true)
    }
}

impl Drop for InMemoryAcker {
    fn drop(&mut self) {
        // 未确认就被丢弃的投递视为锁过期，交还队列
        if !self.settled.load(Ordering::SeqCst) {
            if let Some(message) = lock(&self.message).take() {
                self.queue.settle(message, true);
            }
        }
    }
}
