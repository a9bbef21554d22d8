//! 消息触发的调度层
//!
//! 每条路由对应一个 [`TriggerDispatcher`]：它持有构造时固定的编排客户端，
//! 对每条投递调用一次 `run(payload)` 并记录投递元数据。
//! [`SubscriptionRunner`] 负责从代理接收投递、调用调度器并确认或放弃投递。

pub mod registry;
pub mod runner;
pub mod trigger;

pub use registry::DispatcherRegistry;
pub use runner::SubscriptionRunner;
pub use trigger::TriggerDispatcher;
