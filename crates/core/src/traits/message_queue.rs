use async_trait::async_trait;

use crate::{config::RouteConfig, models::InboundMessage, ProcessorResult};

/// 消息代理抽象接口
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// 订阅路由对应的 (主题, 订阅)
    async fn subscribe(&self, route: &RouteConfig) -> ProcessorResult<Box<dyn Subscription>>;

    /// 关闭与代理的连接
    async fn close(&self) -> ProcessorResult<()>;
}

/// 单个订阅的接收端
#[async_trait]
pub trait Subscription: Send {
    /// 接收下一条投递，订阅关闭时返回 `None`
    async fn receive(&mut self) -> ProcessorResult<Option<Delivery>>;
}

/// 投递的确认句柄
#[async_trait]
pub trait DeliveryAcker: Send + Sync {
    /// 处理成功，从订阅中移除
    async fn complete(&self) -> ProcessorResult<()>;

    /// 处理失败，交还代理按其策略重新投递或转入死信
    async fn abandon(&self) -> ProcessorResult<()>;
}

/// 一次投递：消息本身加上确认句柄
pub struct Delivery {
    pub message: InboundMessage,
    acker: Box<dyn DeliveryAcker>,
}

impl Delivery {
    pub fn new(message: InboundMessage, acker: Box<dyn DeliveryAcker>) -> Self {
        Self { message, acker }
    }

    pub async fn complete(&self) -> ProcessorResult<()> {
        self.acker.complete().await
    }

    pub async fn abandon(&self) -> ProcessorResult<()> {
        self.acker.abandon().await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("message_id", &self.message.message_id)
            .field("delivery_count", &self.message.delivery_count)
            .finish()
    }
}
