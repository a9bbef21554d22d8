use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use processor_core::{
    config::OrchestrationConfig, CredentialHeaders, OrchestrationOutcome, OrchestrationService,
    OrchestrationServiceFactory, ProcessorError, ProcessorResult, RouteConfig,
};
use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use tracing::{debug, warn};

/// 通过HTTP调用编排服务
///
/// 消息体原样作为请求体发送，凭据头集合在构造时固定。
pub struct HttpOrchestrationClient {
    endpoint: String,
    headers: CredentialHeaders,
    http_client: reqwest::Client,
}

impl HttpOrchestrationClient {
    pub fn new(
        endpoint: impl Into<String>,
        headers: CredentialHeaders,
        request_timeout: Duration,
    ) -> ProcessorResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ProcessorError::Internal(format!("创建HTTP客户端失败: {e}")))?;

        Ok(Self {
            endpoint: endpoint.into(),
            headers,
            http_client,
        })
    }

    /// 构造一次调用的请求
    pub fn build_request(&self, payload: &str) -> ProcessorResult<reqwest::Request> {
        let mut builder = self
            .http_client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(payload.to_string());

        for (name, secret) in self.headers.iter() {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ProcessorError::Credential(format!("无效的凭据头名称 {name}: {e}"))
            })?;
            let mut header_value = HeaderValue::from_str(secret.expose()).map_err(|_| {
                ProcessorError::Credential(format!("凭据头 {name} 的值包含非法字符"))
            })?;
            header_value.set_sensitive(true);
            builder = builder.header(header_name, header_value);
        }

        builder
            .build()
            .map_err(|e| ProcessorError::Internal(format!("构造编排请求失败: {e}")))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl OrchestrationService for HttpOrchestrationClient {
    async fn run(&self, payload: &str) -> ProcessorResult<OrchestrationOutcome> {
        let request = self.build_request(payload)?;

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| ProcessorError::Network(format!("调用编排服务失败: {e}")))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            warn!(status = status.as_u16(), "Failed to read orchestration response: {}", e);
            ProcessorError::Network(format!("读取编排服务响应失败: {e}"))
        })?;

        if status.is_success() {
            debug!(status = status.as_u16(), "Orchestration call succeeded");
            Ok(OrchestrationOutcome::new(status.as_u16(), body))
        } else {
            warn!(status = status.as_u16(), "Orchestration call failed");
            Err(ProcessorError::Orchestration {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// 为每条路由创建HTTP编排客户端
#[derive(Debug, Clone)]
pub struct HttpOrchestrationFactory {
    config: OrchestrationConfig,
}

impl HttpOrchestrationFactory {
    pub fn new(config: OrchestrationConfig) -> Self {
        Self { config }
    }
}

impl OrchestrationServiceFactory for HttpOrchestrationFactory {
    fn create(
        &self,
        route: &RouteConfig,
        headers: CredentialHeaders,
    ) -> ProcessorResult<Arc<dyn OrchestrationService>> {
        debug!(
            route = %route.name,
            endpoint = %self.config.endpoint,
            headers = ?headers.header_names(),
            "Creating orchestration client"
        );

        let client = HttpOrchestrationClient::new(
            self.config.endpoint.clone(),
            headers,
            Duration::from_secs(self.config.request_timeout_seconds),
        )?;
        Ok(Arc::new(client))
    }
}
