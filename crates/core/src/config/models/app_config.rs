use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use super::{
    message_queue::BrokerConfig,
    observability::ObservabilityConfig,
    orchestration::{CredentialConfig, OrchestrationConfig},
    route::{RouteConfig, DEFAULT_CREDENTIAL},
};

/// Process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub broker: BrokerConfig,
    pub orchestration: OrchestrationConfig,
    pub credentials: HashMap<String, CredentialConfig>,
    pub routes: Vec<RouteConfig>,
    pub observability: ObservabilityConfig,
    pub shutdown_timeout_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut credentials = HashMap::new();
        credentials.insert(DEFAULT_CREDENTIAL.to_string(), CredentialConfig::default());

        Self {
            broker: BrokerConfig::default(),
            orchestration: OrchestrationConfig::default(),
            credentials,
            routes: RouteConfig::default_routes(),
            observability: ObservabilityConfig::default(),
            shutdown_timeout_seconds: 30,
        }
    }
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Default configuration
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: PROCESSOR_, nesting: `__`)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = [
                "config/processor.toml",
                "processor.toml",
                "/etc/metadata-processor/config.toml",
            ];

            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("PROCESSOR")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn validate(&self) -> Result<()> {
        self.broker.validate().context("消息代理配置验证失败")?;

        self.orchestration
            .validate()
            .context("编排服务配置验证失败")?;

        for (name, credential) in &self.credentials {
            credential
                .validate()
                .with_context(|| format!("凭据 {name} 配置验证失败"))?;
        }

        self.validate_routes().context("路由配置验证失败")?;

        self.observability
            .validate()
            .context("可观测性配置验证失败")?;

        if self.shutdown_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("关闭超时时间必须大于0"));
        }

        Ok(())
    }

    fn validate_routes(&self) -> Result<()> {
        if self.routes.is_empty() {
            return Err(anyhow::anyhow!("至少需要配置一条路由"));
        }

        let mut names = HashSet::new();
        let mut subscriptions = HashSet::new();

        for route in &self.routes {
            route.validate()?;

            if !names.insert(route.name.as_str()) {
                return Err(anyhow::anyhow!("路由名称重复: {}", route.name));
            }

            if !subscriptions.insert((route.topic.as_str(), route.subscription.as_str())) {
                return Err(anyhow::anyhow!(
                    "订阅重复: {}/{}",
                    route.topic,
                    route.subscription
                ));
            }

            if !self.credentials.contains_key(&route.credential) {
                return Err(anyhow::anyhow!(
                    "路由 {} 引用了不存在的凭据: {}",
                    route.name,
                    route.credential
                ));
            }
        }

        Ok(())
    }

    pub fn route(&self, name: &str) -> Option<&RouteConfig> {
        self.routes.iter().find(|r| r.name == name)
    }
}
