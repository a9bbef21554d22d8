//! 调用编排服务所需的凭据
//!
//! 密钥在启动时从环境变量（或本地配置）解析，之后作为不可变的头集合在
//! 所有调用之间共享。`SecretString` 的 `Debug`/`Display` 都不会输出明文。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::CredentialConfig;
use crate::{ProcessorError, ProcessorResult};

/// 不会被日志泄露的密钥字符串
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(Arc<str>);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Arc::from(value.into()))
    }

    /// 取出明文，仅在构造请求头时使用
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString(***)")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// 附加到每次编排调用上的请求头集合
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialHeaders {
    headers: Vec<(String, SecretString)>,
}

impl CredentialHeaders {
    /// 单条目的API Key头集合
    pub fn api_key(header_name: &str, secret: SecretString) -> Self {
        Self {
            headers: vec![(header_name.to_ascii_lowercase(), secret)],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SecretString)> {
        self.headers.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn get(&self, header_name: &str) -> Option<&SecretString> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(header_name))
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn header_names(&self) -> Vec<&str> {
        self.headers.iter().map(|(name, _)| name.as_str()).collect()
    }
}

/// 密钥来源
pub trait SecretProvider: Send + Sync {
    /// 按凭据配置解析密钥
    fn resolve(&self, name: &str, config: &CredentialConfig) -> ProcessorResult<SecretString>;
}

/// 从进程环境变量读取密钥，未设置时回退到配置中的 `secret`
#[derive(Debug, Default, Clone)]
pub struct EnvSecretProvider;

impl SecretProvider for EnvSecretProvider {
    fn resolve(&self, name: &str, config: &CredentialConfig) -> ProcessorResult<SecretString> {
        if let Some(var) = &config.secret_env {
            match std::env::var(var) {
                Ok(value) if !value.is_empty() => return Ok(SecretString::new(value)),
                Ok(_) => {
                    return Err(ProcessorError::Credential(format!(
                        "凭据 {name} 的环境变量 {var} 为空"
                    )))
                }
                Err(_) if config.secret.is_some() => {}
                Err(_) => {
                    return Err(ProcessorError::Credential(format!(
                        "凭据 {name} 的环境变量 {var} 未设置"
                    )))
                }
            }
        }

        config
            .secret
            .as_ref()
            .filter(|s| !s.is_empty())
            .map(|s| SecretString::new(s.clone()))
            .ok_or_else(|| ProcessorError::Credential(format!("凭据 {name} 没有可用的密钥")))
    }
}

/// 预先注入的密钥表，用于嵌入式运行和测试
#[derive(Debug, Default, Clone)]
pub struct StaticSecretProvider {
    secrets: HashMap<String, SecretString>,
}

impl StaticSecretProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, name: &str, secret: &str) -> Self {
        self.secrets.insert(name.to_string(), SecretString::new(secret));
        self
    }
}

impl SecretProvider for StaticSecretProvider {
    fn resolve(&self, name: &str, _config: &CredentialConfig) -> ProcessorResult<SecretString> {
        self.secrets
            .get(name)
            .cloned()
            .ok_or_else(|| ProcessorError::Credential(format!("凭据 {name} 没有可用的密钥")))
    }
}

/// 解析凭据并构造请求头集合
pub fn build_headers(
    provider: &dyn SecretProvider,
    name: &str,
    config: &CredentialConfig,
) -> ProcessorResult<CredentialHeaders> {
    let secret = provider.resolve(name, config)?;
    Ok(CredentialHeaders::api_key(&config.header_name, secret))
}
