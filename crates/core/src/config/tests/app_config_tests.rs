use crate::config::models::{AppConfig, BrokerType, RouteConfig};

#[test]
fn test_default_config() {
    let config = AppConfig::default();
    assert!(config.validate().is_ok());

    // 验证默认值
    assert_eq!(config.broker.r#type, BrokerType::Rabbitmq);
    assert_eq!(config.broker.max_delivery_count, 10);
    assert_eq!(config.routes.len(), 3);
    assert_eq!(
        config.credentials["orchestration"].header_name,
        "x-api-key"
    );
    assert!(config.credentials["orchestration"].secret.is_none());
}

#[test]
fn test_config_from_toml() {
    let toml_content = r#"
shutdown_timeout_seconds = 10

[broker]
type = "in_memory"
max_concurrent_calls = 4
max_delivery_count = 5

[orchestration]
endpoint = "https://orchestrator.internal/run"
request_timeout_seconds = 15

[credentials.orchestration]
header_name = "x-api-key"
secret_env = "TEST_ORCHESTRATION_KEY"

[[routes]]
name = "encodingservice"
topic = "encoding-service"
subscription = "metadata-processor"
timeout_seconds = 20

[observability]
log_level = "debug"
log_format = "json"
"#;

    let config = AppConfig::from_toml(toml_content).unwrap();

    assert_eq!(config.broker.r#type, BrokerType::InMemory);
    assert_eq!(config.broker.max_concurrent_calls, 4);
    assert_eq!(config.broker.max_delivery_count, 5);
    assert_eq!(config.orchestration.request_timeout_seconds, 15);
    assert_eq!(config.routes.len(), 1);
    assert_eq!(config.routes[0].credential, "orchestration");
    assert_eq!(config.routes[0].timeout_seconds, Some(20));
    assert_eq!(config.observability.log_format, "json");
    assert_eq!(config.shutdown_timeout_seconds, 10);
}

#[test]
fn test_config_toml_roundtrip() {
    let original = AppConfig::default();
    let toml_str = original.to_toml().unwrap();
    let restored = AppConfig::from_toml(&toml_str).unwrap();

    assert_eq!(restored.routes, original.routes);
    assert_eq!(restored.broker.url, original.broker.url);
}

#[test]
fn test_duplicate_route_name_rejected() {
    let mut config = AppConfig::default();
    config.routes.push(RouteConfig::new(
        "encodingservice",
        "another-topic",
        "metadata-processor",
    ));

    assert!(config.validate().is_err());
}

#[test]
fn test_duplicate_subscription_rejected() {
    let mut config = AppConfig::default();
    config.routes.push(RouteConfig::new(
        "encodingservice-2",
        "encoding-service",
        "metadata-processor",
    ));

    assert!(config.validate().is_err());
}

#[test]
fn test_unknown_credential_rejected() {
    let mut config = AppConfig::default();
    config.routes[0] = config.routes[0].clone().with_credential("missing");

    let err = config.validate().unwrap_err();
    assert!(format!("{err:#}").contains("missing"));
}

#[test]
fn test_empty_routes_rejected() {
    let mut config = AppConfig::default();
    config.routes.clear();
    assert!(config.validate().is_err());
}

#[test]
fn test_rabbitmq_url_must_be_amqp() {
    let mut config = AppConfig::default();
    config.broker.url = "redis://localhost:6379".to_string();
    assert!(config.validate().is_err());

    // 内存代理不关心URL
    config.broker.r#type = BrokerType::InMemory;
    assert!(config.validate().is_ok());
}

#[test]
fn test_credential_without_secret_source_rejected() {
    let mut config = AppConfig::default();
    if let Some(credential) = config.credentials.get_mut("orchestration") {
        credential.secret_env = None;
        credential.secret = None;
    }
    assert!(config.validate().is_err());
}

#[test]
fn test_debug_output_redacts_inline_secret() {
    let mut config = AppConfig::default();
    if let Some(credential) = config.credentials.get_mut("orchestration") {
        credential.secret = Some("inline-s3cret-value".to_string());
    }

    let credential_debug = format!("{:?}", config.credentials["orchestration"]);
    assert!(!credential_debug.contains("inline-s3cret-value"));
    assert!(credential_debug.contains("***"));
    assert!(credential_debug.contains("PROCESSOR_ORCHESTRATION_API_KEY"));

    // 整个配置的调试输出同样不含密钥
    assert!(!format!("{config:?}").contains("inline-s3cret-value"));
    assert!(!format!("{config:#?}").contains("inline-s3cret-value"));
}
