#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use processor_core::{
    config::CredentialConfig, CredentialHeaders, Delivery, DeliveryAcker, InboundMessage,
    MessageBroker, OrchestrationOutcome, OrchestrationService, OrchestrationServiceFactory,
    ProcessorError, ProcessorResult, RouteConfig, Subscription,
};
use tokio::sync::Semaphore;

pub const API_KEY: &str = "43EFE991E8614CFB9EDECF1B0FDED37C";
pub const CREDENTIAL: &str = "orchestration";

/// 记录每次调用的编排服务替身
#[derive(Default)]
pub struct RecordingService {
    payloads: Mutex<Vec<String>>,
    scripted: Mutex<VecDeque<ProcessorResult<OrchestrationOutcome>>>,
}

impl RecordingService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 按顺序返回预设结果，用完后返回成功
    pub fn push_result(&self, result: ProcessorResult<OrchestrationOutcome>) {
        self.scripted.lock().unwrap().push_back(result);
    }

    pub fn fail_with(&self, times: usize, status: u16, body: &str) {
        for _ in 0..times {
            self.push_result(Err(ProcessorError::Orchestration {
                status,
                body: body.to_string(),
            }));
        }
    }

    pub fn payloads(&self) -> Vec<String> {
        self.payloads.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.payloads.lock().unwrap().len()
    }
}

#[async_trait]
impl OrchestrationService for RecordingService {
    async fn run(&self, payload: &str) -> ProcessorResult<OrchestrationOutcome> {
        self.payloads.lock().unwrap().push(payload.to_string());
        self.scripted
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(OrchestrationOutcome::new(200, "ok")))
    }
}

/// 记录构造参数的工厂替身，每条路由对应一个 `RecordingService`
#[derive(Default)]
pub struct RecordingFactory {
    services: Mutex<HashMap<String, Arc<RecordingService>>>,
    created: Mutex<Vec<(String, CredentialHeaders)>>,
}

impl RecordingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn service(&self, route: &str) -> Arc<RecordingService> {
        self.services
            .lock()
            .unwrap()
            .entry(route.to_string())
            .or_insert_with(RecordingService::new)
            .clone()
    }

    pub fn created(&self) -> Vec<(String, CredentialHeaders)> {
        self.created.lock().unwrap().clone()
    }
}

impl OrchestrationServiceFactory for RecordingFactory {
    fn create(
        &self,
        route: &RouteConfig,
        headers: CredentialHeaders,
    ) -> ProcessorResult<Arc<dyn OrchestrationService>> {
        self.created
            .lock()
            .unwrap()
            .push((route.name.clone(), headers));
        Ok(self.service(&route.name))
    }
}

pub fn credentials() -> HashMap<String, CredentialConfig> {
    HashMap::from([(CREDENTIAL.to_string(), CredentialConfig::default())])
}

/// 轮询直到条件成立，超时则测试失败
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 5s"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// 调度器模块输出的日志行
pub fn dispatcher_lines<'a>(lines: &[&'a str]) -> Vec<&'a str> {
    lines
        .iter()
        .copied()
        .filter(|line| line.contains("processor_dispatcher::trigger"))
        .collect()
}

/// 阻塞在闸门上的编排服务，记录同时进行的调用数峰值
pub struct GatedService {
    gate: Semaphore,
    active: AtomicUsize,
    peak: AtomicUsize,
    started: AtomicUsize,
    finished: AtomicUsize,
}

impl GatedService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            started: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        })
    }

    pub fn release(&self, calls: usize) {
        self.gate.add_permits(calls);
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrchestrationService for GatedService {
    async fn run(&self, _payload: &str) -> ProcessorResult<OrchestrationOutcome> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);

        self.gate
            .acquire()
            .await
            .map_err(|e| ProcessorError::Internal(e.to_string()))?
            .forget();

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(OrchestrationOutcome::new(200, "ok"))
    }
}

/// 记录确认结果的确认句柄
pub struct RecordingAcker {
    message_id: String,
    settlements: Arc<Mutex<Vec<(String, &'static str)>>>,
}

#[async_trait]
impl DeliveryAcker for RecordingAcker {
    async fn complete(&self) -> ProcessorResult<()> {
        self.settlements
            .lock()
            .unwrap()
            .push((self.message_id.clone(), "complete"));
        Ok(())
    }

    async fn abandon(&self) -> ProcessorResult<()> {
        self.settlements
            .lock()
            .unwrap()
            .push((self.message_id.clone(), "abandon"));
        Ok(())
    }
}

type Script = Arc<Mutex<VecDeque<ProcessorResult<Option<Delivery>>>>>;

/// 按预设顺序返回接收结果的代理，结果用完后一直等待
#[derive(Default)]
pub struct ScriptedBroker {
    script: Script,
    settlements: Arc<Mutex<Vec<(String, &'static str)>>>,
}

impl ScriptedBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_error(&self, error: ProcessorError) {
        self.script.lock().unwrap().push_back(Err(error));
    }

    pub fn push_message(&self, message: InboundMessage) {
        let acker = RecordingAcker {
            message_id: message.message_id.clone(),
            settlements: self.settlements.clone(),
        };
        self.script
            .lock()
            .unwrap()
            .push_back(Ok(Some(Delivery::new(message, Box::new(acker)))));
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }

    pub fn settlements(&self) -> Vec<(String, &'static str)> {
        self.settlements.lock().unwrap().clone()
    }
}

struct ScriptedSubscription {
    script: Script,
}

#[async_trait]
impl Subscription for ScriptedSubscription {
    async fn receive(&mut self) -> ProcessorResult<Option<Delivery>> {
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }
}

#[async_trait]
impl MessageBroker for ScriptedBroker {
    async fn subscribe(&self, _route: &RouteConfig) -> ProcessorResult<Box<dyn Subscription>> {
        Ok(Box::new(ScriptedSubscription {
            script: self.script.clone(),
        }))
    }

    async fn close(&self) -> ProcessorResult<()> {
        Ok(())
    }
}
