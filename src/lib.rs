//! 安全与信任核心库
//! 限流、IP 封禁、两步验证、密码策略、会话、文件完整性与风险评估

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repository;
pub mod routes;
pub mod services;
pub mod telemetry;
