//! 理理设备账本小程序后端
//!
//! 分层结构：`core` 提供错误、响应、配置、认证与中间件，`infrastructure` 负责数据库与日志，
//! `app` 下按业务划分模块，每个模块由 model、repository、service、handler 组成。

pub mod analytics;
pub mod app;
pub mod core;
pub mod infrastructure;

pub use app::{build_router, AppState};
pub use crate::core::config::Config;
pub use crate::core::error::{CoreError, CoreResult};
