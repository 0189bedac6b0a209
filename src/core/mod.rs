//! 核心层：错误、响应、配置、认证与中间件

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod response;
pub mod service;
