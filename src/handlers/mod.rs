//! HTTP 处理器模块

pub mod accounts;
pub mod dashboard;
pub mod events;
pub mod health;
pub mod integrity;
pub mod ip_blocks;
pub mod password_policy;
pub mod rate_limits;
pub mod sessions;
pub mod two_factor;
