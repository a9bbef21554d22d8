use serde::{Deserialize, Serialize};

pub const DEFAULT_SUBSCRIPTION: &str = "metadata-processor";
pub const DEFAULT_CREDENTIAL: &str = "orchestration";

/// 一条触发路由：逻辑处理器名 -> (主题, 订阅, 凭据)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    pub name: String,
    pub topic: String,
    pub subscription: String,
    #[serde(default = "default_credential")]
    pub credential: String,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

fn default_credential() -> String {
    DEFAULT_CREDENTIAL.to_string()
}

impl RouteConfig {
    pub fn new(name: &str, topic: &str, subscription: &str) -> Self {
        Self {
            name: name.to_string(),
            topic: topic.to_string(),
            subscription: subscription.to_string(),
            credential: default_credential(),
            timeout_seconds: None,
        }
    }

    pub fn with_credential(mut self, credential: &str) -> Self {
        self.credential = credential.to_string();
        self
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }

    /// 默认的三条路由
    pub fn default_routes() -> Vec<RouteConfig> {
        vec![
            RouteConfig::new("notificationservice", "notification-service", DEFAULT_SUBSCRIPTION),
            RouteConfig::new("metadataprocessor", "video-events", DEFAULT_SUBSCRIPTION),
            RouteConfig::new("encodingservice", "encoding-service", DEFAULT_SUBSCRIPTION),
        ]
    }

    /// 订阅在代理中的完整名称
    pub fn subscription_path(&self) -> String {
        format!("{}.{}", self.topic, self.subscription)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.trim().is_empty() {
            return Err(anyhow::anyhow!("路由名称不能为空"));
        }

        if self.topic.trim().is_empty() {
            return Err(anyhow::anyhow!("路由 {} 的主题不能为空", self.name));
        }

        // 名称两端的空白会让订阅静默地绑定到另一个名字上
        if self.topic.trim() != self.topic || self.subscription.trim() != self.subscription {
            return Err(anyhow::anyhow!(
                "路由 {} 的主题或订阅名称包含首尾空白",
                self.name
            ));
        }

        if self.subscription.is_empty() {
            return Err(anyhow::anyhow!("路由 {} 的订阅名称不能为空", self.name));
        }

        if self.credential.is_empty() {
            return Err(anyhow::anyhow!("路由 {} 未指定凭据", self.name));
        }

        if self.timeout_seconds == Some(0) {
            return Err(anyhow::anyhow!("路由 {} 的超时时间必须大于0", self.name));
        }

        Ok(())
    }
}
