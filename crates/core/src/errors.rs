use thiserror::Error;

/// 处理器错误类型定义
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("消息队列错误: {0}")]
    MessageQueue(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("凭据错误: {0}")]
    Credential(String),

    #[error("编排服务返回失败: HTTP {status} - {body}")]
    Orchestration { status: u16, body: String },

    #[error("网络错误: {0}")]
    Network(String),

    #[error("编排调用超时")]
    ExecutionTimeout,

    #[error("内部错误: {0}")]
    Internal(String),
}

impl ProcessorError {
    /// 是否为编排服务本身返回的失败（而非传输层失败）
    pub fn is_orchestration_failure(&self) -> bool {
        matches!(self, ProcessorError::Orchestration { .. })
    }
}

/// 统一的Result类型
pub type ProcessorResult<T> = std::result::Result<T, ProcessorError>;
