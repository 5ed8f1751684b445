//! 数据模型模块

pub mod integrity;
pub mod ip_block;
pub mod password_policy;
pub mod rate_limit;
pub mod risk;
pub mod security_event;
pub mod session;
pub mod two_factor;
pub mod user;
