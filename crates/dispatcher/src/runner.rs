use std::sync::Arc;
use std::time::Duration;

use processor_core::{BrokerConfig, Delivery, MessageBroker, ProcessorError, ProcessorResult};
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn, Instrument};

use crate::TriggerDispatcher;

/// 单条路由的订阅循环
///
/// 接收投递并交给调度器处理：成功则确认，失败则放弃投递，
/// 由代理按最大投递次数重新投递或转入死信。
pub struct SubscriptionRunner {
    dispatcher: Arc<TriggerDispatcher>,
    broker: Arc<dyn MessageBroker>,
    max_concurrent_calls: usize,
    receive_retry_delay: Duration,
}

impl SubscriptionRunner {
    pub fn new(
        dispatcher: Arc<TriggerDispatcher>,
        broker: Arc<dyn MessageBroker>,
        config: &BrokerConfig,
    ) -> Self {
        Self {
            dispatcher,
            broker,
            max_concurrent_calls: config.max_concurrent_calls.max(1),
            receive_retry_delay: Duration::from_millis(config.receive_retry_delay_ms),
        }
    }

    /// 运行直到收到关闭信号或订阅被关闭，返回前等待所有进行中的调用结束
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> ProcessorResult<()> {
        let route = self.dispatcher.route().clone();
        let mut subscription = self.broker.subscribe(&route).await?;
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_calls));
        let mut in_flight = JoinSet::new();

        info!(
            route = %route.name,
            subscription = %route.subscription_path(),
            max_concurrent_calls = self.max_concurrent_calls,
            "Subscription runner started"
        );

        loop {
            let permit = tokio::select! {
                permit = Arc::clone(&semaphore).acquire_owned() => permit
                    .map_err(|e| ProcessorError::Internal(format!("并发许可获取失败: {e}")))?,
                _ = shutdown_rx.recv() => break,
            };

            let received = tokio::select! {
                received = subscription.receive() => received,
                _ = shutdown_rx.recv() => break,
            };

            match received {
                Ok(Some(delivery)) => {
                    let dispatcher = Arc::clone(&self.dispatcher);
                    in_flight.spawn(
                        async move {
                            Self::process(&dispatcher, delivery).await;
                            drop(permit);
                        }
                        .in_current_span(),
                    );
                }
                Ok(None) => {
                    info!(route = %route.name, "Subscription closed by broker");
                    break;
                }
                Err(e) => {
                    drop(permit);
                    error!(route = %route.name, "Failed to receive delivery: {}", e);
                    tokio::select! {
                        _ = tokio::time::sleep(self.receive_retry_delay) => {}
                        _ = shutdown_rx.recv() => break,
                    }
                }
            }

            while let Some(joined) = in_flight.try_join_next() {
                if let Err(e) = joined {
                    error!(route = %route.name, "Dispatch task panicked: {}", e);
                }
            }
        }

        if !in_flight.is_empty() {
            info!(
                route = %route.name,
                "Waiting for {} in-flight invocations",
                in_flight.len()
            );
        }
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!(route = %route.name, "Dispatch task panicked: {}", e);
            }
        }

        info!(route = %route.name, "Subscription runner stopped");
        Ok(())
    }

    async fn process(dispatcher: &TriggerDispatcher, delivery: Delivery) {
        let route = dispatcher.route().name.as_str();

        match dispatcher.handle(&delivery.message).await {
            Ok(()) => {
                if let Err(e) = delivery.complete().await {
                    error!(route, message_id = %delivery.message.message_id, "Failed to complete delivery: {}", e);
                } else {
                    debug!(route, message_id = %delivery.message.message_id, "Delivery completed");
                }
            }
            Err(e) => {
                warn!(
                    route,
                    message_id = %delivery.message.message_id,
                    delivery_count = delivery.message.delivery_count,
                    "Dispatch failed, abandoning delivery: {}",
                    e
                );
                if let Err(e) = delivery.abandon().await {
                    error!(route, message_id = %delivery.message.message_id, "Failed to abandon delivery: {}", e);
                }
            }
        }
    }
}
