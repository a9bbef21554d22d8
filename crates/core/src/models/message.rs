use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// 从订阅收到的一条消息
///
/// 消息体对分发层是不透明的：不解析、不校验。元数据由消息代理提供，
/// 分发器只以只读引用的方式使用它。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub body: String,
    pub delivery_count: u32,
    pub enqueued_time_utc: DateTime<Utc>,
    pub message_id: String,
}

impl InboundMessage {
    pub fn new(
        body: impl Into<String>,
        delivery_count: u32,
        enqueued_time_utc: DateTime<Utc>,
        message_id: impl Into<String>,
    ) -> Self {
        Self {
            body: body.into(),
            delivery_count,
            enqueued_time_utc,
            message_id: message_id.into(),
        }
    }

    /// 入队时间的RFC3339表示，例如 `2024-01-01T00:00:00Z`
    pub fn enqueued_time_rfc3339(&self) -> String {
        self.enqueued_time_utc
            .to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }

    /// 是否为重新投递
    pub fn is_redelivery(&self) -> bool {
        self.delivery_count > 1
    }
}

/// 编排服务的返回结果，分发器不检查其内容
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrchestrationOutcome {
    pub status: u16,
    pub body: String,
}

impl OrchestrationOutcome {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}
