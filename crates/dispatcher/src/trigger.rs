use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use processor_core::{
    config::CredentialConfig, credentials::build_headers, CredentialHeaders, InboundMessage,
    OrchestrationOutcome, OrchestrationService, OrchestrationServiceFactory, ProcessorError,
    ProcessorResult, RouteConfig, SecretProvider,
};
use tracing::info;

/// 单条路由的消息触发调度器
///
/// 编排客户端在构造时按凭据头集合创建一次，之后所有投递共用同一个客户端。
/// 调度器本身不做重试、去重或死信处理：`run` 的错误原样返回给调用方。
pub struct TriggerDispatcher {
    route: RouteConfig,
    service: Arc<dyn OrchestrationService>,
    timeout: Option<Duration>,
}

impl TriggerDispatcher {
    pub fn new(
        route: RouteConfig,
        headers: CredentialHeaders,
        factory: &dyn OrchestrationServiceFactory,
    ) -> ProcessorResult<Self> {
        let service = factory.create(&route, headers)?;
        Ok(Self::with_service(route, service))
    }

    /// 解析路由的凭据后构造调度器
    pub fn from_credential(
        route: RouteConfig,
        provider: &dyn SecretProvider,
        credential: &CredentialConfig,
        factory: &dyn OrchestrationServiceFactory,
    ) -> ProcessorResult<Self> {
        let headers = build_headers(provider, &route.credential, credential)?;
        Self::new(route, headers, factory)
    }

    pub fn with_service(route: RouteConfig, service: Arc<dyn OrchestrationService>) -> Self {
        let timeout = route.timeout_seconds.map(Duration::from_secs);
        Self {
            route,
            service,
            timeout,
        }
    }

    pub fn route(&self) -> &RouteConfig {
        &self.route
    }

    /// 处理一条投递
    ///
    /// 成功时恰好输出四条日志：处理标记、入队时间、投递次数和消息ID。
    /// 失败时只有处理标记，错误由调用方记录。
    pub async fn handle(&self, message: &InboundMessage) -> ProcessorResult<()> {
        let route = self.route.name.as_str();
        info!(route, "request processed");

        let start = Instant::now();
        let result = self.invoke(&message.body).await;
        histogram!("dispatch_duration_ms", "route" => self.route.name.clone())
            .record(start.elapsed().as_millis() as f64);

        match result {
            Ok(_) => {
                counter!("dispatch_succeeded_total", "route" => self.route.name.clone())
                    .increment(1);
            }
            Err(e) => {
                counter!("dispatch_failed_total", "route" => self.route.name.clone())
                    .increment(1);
                return Err(e);
            }
        }

        info!(route, "EnqueuedTimeUtc={}", message.enqueued_time_rfc3339());
        info!(route, "DeliveryCount={}", message.delivery_count);
        info!(route, "MessageId={}", message.message_id);

        Ok(())
    }

    async fn invoke(&self, payload: &str) -> ProcessorResult<OrchestrationOutcome> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.service.run(payload))
                .await
                .map_err(|_| ProcessorError::ExecutionTimeout)?,
            None => self.service.run(payload).await,
        }
    }
}
