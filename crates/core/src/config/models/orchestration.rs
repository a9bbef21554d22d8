use std::fmt;

use serde::{Deserialize, Serialize};

/// Orchestration service endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    pub endpoint: String,
    pub request_timeout_seconds: u64,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080/api/v1/orchestrations/run".to_string(),
            request_timeout_seconds: 30,
        }
    }
}

impl OrchestrationConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.endpoint.is_empty() {
            return Err(anyhow::anyhow!("编排服务地址不能为空"));
        }

        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(anyhow::anyhow!("编排服务地址必须是HTTP(S)格式"));
        }

        if self.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("请求超时时间必须大于0"));
        }

        Ok(())
    }
}

/// Credential configuration
///
/// The secret is read from `secret_env` at start-up. `secret` is only meant for
/// local runs and is ignored when `secret_env` resolves.
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialConfig {
    #[serde(default = "default_header_name")]
    pub header_name: String,
    #[serde(default)]
    pub secret_env: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
}

pub const DEFAULT_API_KEY_HEADER: &str = "x-api-key";

fn default_header_name() -> String {
    DEFAULT_API_KEY_HEADER.to_string()
}

impl fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialConfig")
            .field("header_name", &self.header_name)
            .field("secret_env", &self.secret_env)
            .field("secret", &self.secret.as_ref().map(|_| "***"))
            .finish()
    }
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            header_name: default_header_name(),
            secret_env: Some("PROCESSOR_ORCHESTRATION_API_KEY".to_string()),
            secret: None,
        }
    }
}

impl CredentialConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.header_name.is_empty() {
            return Err(anyhow::anyhow!("凭据头名称不能为空"));
        }

        if self.secret_env.is_none() && self.secret.is_none() {
            return Err(anyhow::anyhow!("凭据必须配置secret_env或secret"));
        }

        Ok(())
    }
}
