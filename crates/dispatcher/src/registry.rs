use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use processor_core::{
    config::CredentialConfig, OrchestrationServiceFactory, ProcessorError, ProcessorResult,
    RouteConfig, SecretProvider,
};
use tracing::info;

use crate::TriggerDispatcher;

/// 路由名称到调度器的映射
pub struct DispatcherRegistry {
    dispatchers: HashMap<String, Arc<TriggerDispatcher>>,
    order: Vec<String>,
}

impl DispatcherRegistry {
    pub fn build(
        routes: &[RouteConfig],
        credentials: &HashMap<String, CredentialConfig>,
        provider: &dyn SecretProvider,
        factory: &dyn OrchestrationServiceFactory,
    ) -> ProcessorResult<Self> {
        let mut registry = Self {
            dispatchers: HashMap::new(),
            order: Vec::new(),
        };
        let mut subscriptions = HashSet::new();

        for route in routes {
            route
                .validate()
                .map_err(|e| ProcessorError::Configuration(e.to_string()))?;

            if !subscriptions.insert((route.topic.clone(), route.subscription.clone())) {
                return Err(ProcessorError::Configuration(format!(
                    "订阅 {} 被多条路由重复使用",
                    route.subscription_path()
                )));
            }

            let credential = credentials.get(&route.credential).ok_or_else(|| {
                ProcessorError::Configuration(format!(
                    "路由 {} 引用了未定义的凭据 {}",
                    route.name, route.credential
                ))
            })?;

            let dispatcher =
                TriggerDispatcher::from_credential(route.clone(), provider, credential, factory)?;
            registry.insert(dispatcher)?;
        }

        info!("Dispatcher registry built with {} routes", registry.len());
        Ok(registry)
    }

    fn insert(&mut self, dispatcher: TriggerDispatcher) -> ProcessorResult<()> {
        let name = dispatcher.route().name.clone();
        if self.dispatchers.contains_key(&name) {
            return Err(ProcessorError::Configuration(format!("路由名称重复: {name}")));
        }

        self.order.push(name.clone());
        self.dispatchers.insert(name, Arc::new(dispatcher));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<TriggerDispatcher>> {
        self.dispatchers.get(name).cloned()
    }

    /// 按配置顺序遍历调度器
    pub fn iter(&self) -> impl Iterator<Item = &Arc<TriggerDispatcher>> {
        self.order.iter().filter_map(|name| self.dispatchers.get(name))
    }

    pub fn len(&self) -> usize {
        self.dispatchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dispatchers.is_empty()
    }
}
