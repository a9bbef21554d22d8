//! 配置管理
//!
//! 配置按 默认值 -> TOML文件 -> 环境变量 的顺序叠加，加载完成后统一验证。
//! 路由表在进程启动时确定，运行期间不会变化。

pub mod models;

#[cfg(test)]
mod tests;

pub use models::*;
