use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    config::RouteConfig, credentials::CredentialHeaders, models::OrchestrationOutcome,
    ProcessorResult,
};

/// 编排服务：接收原始消息体并执行实际的业务处理
///
/// 实现必须能承受并发调用和重复调用（同一消息可能被重新投递）。
#[async_trait]
pub trait OrchestrationService: Send + Sync {
    async fn run(&self, payload: &str) -> ProcessorResult<OrchestrationOutcome>;
}

/// 按请求头集合构造编排服务客户端
pub trait OrchestrationServiceFactory: Send + Sync {
    fn create(
        &self,
        route: &RouteConfig,
        headers: CredentialHeaders,
    ) -> ProcessorResult<Arc<dyn OrchestrationService>>;
}
