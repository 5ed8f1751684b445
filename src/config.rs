//! 配置系统
//! 从环境变量加载所有配置，使用 Secret 包装敏感信息

use config::{Config, ConfigError, Environment};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// 监听地址，例如 "0.0.0.0:3000"
    pub addr: String,
    /// 对外访问地址，风险评估据此判断是否启用 HTTPS
    pub public_url: String,
    /// 优雅关闭超时时间（秒）
    pub graceful_shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// 数据库连接 URL（使用 Secret 包装，防止日志泄露）
    pub url: Secret<String>,
    /// 最大连接数
    pub max_connections: u32,
    /// 最小连接数
    pub min_connections: u32,
    /// 获取连接超时时间（秒）
    pub acquire_timeout_secs: u64,
    /// 空闲连接超时时间（秒）
    pub idle_timeout_secs: u64,
    /// 连接最大生命周期（秒）
    pub max_lifetime_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别: trace, debug, info, warn, error
    pub level: String,
    /// 日志格式: json, pretty
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// 管理端 JWT 密钥（使用 Secret 包装，防止日志泄露）
    pub jwt_secret: Secret<String>,
    /// 是否信任 X-Forwarded-For 头
    pub trust_proxy: bool,
    /// TOTP 签发者名称（显示在验证器应用中）
    pub totp_issuer: String,
    /// 泄露密码查询接口（k-anonymity range API）
    pub breach_api_url: String,
    /// 泄露密码查询超时（毫秒）
    pub breach_timeout_ms: u64,
    /// 限流台账存储: memory（单实例）或 postgres（多实例共享）
    pub rate_ledger: String,
    /// 限流台账清理周期（秒）
    pub ledger_gc_interval_secs: u64,
    /// 限流台账闲置多久后回收（秒）
    pub ledger_idle_secs: u64,
    /// 过期 IP 封禁清理周期（秒）
    pub block_sweep_interval_secs: u64,
    /// 过期会话清理周期（秒）
    pub session_sweep_interval_secs: u64,
    /// 24 小时内失败登录告警阈值
    pub failed_login_threshold: i64,
    /// 默认管理员账号（风险评估检查是否仍存在）
    pub default_admin_username: String,
    /// 默认管理员密码
    pub default_admin_password: Secret<String>,
    /// 附加到所有响应的安全头，格式 "Header-Name: value"
    pub security_headers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntegrityConfig {
    /// 扫描根目录，记录的路径相对于此目录
    pub base_dir: String,
    /// 受监控的子目录（相对 base_dir）
    pub monitored_roots: Vec<String>,
    /// 跳过的目录名
    pub excluded_dirs: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
    pub integrity: IntegrityConfig,
}

/// 默认安全头
pub fn default_security_headers() -> Vec<String> {
    vec![
        "X-Content-Type-Options: nosniff".to_string(),
        "X-Frame-Options: DENY".to_string(),
        "Strict-Transport-Security: max-age=31536000; includeSubDomains".to_string(),
        "Content-Security-Policy: default-src 'self'".to_string(),
        "Referrer-Policy: strict-origin-when-cross-origin".to_string(),
    ]
}

/// 默认排除目录
pub fn default_excluded_dirs() -> Vec<String> {
    ["node_modules", "target", "dist", "build", "uploads", ".git", ".next", "coverage"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl AppConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Config::builder();

        // 添加默认配置
        settings = settings
            .set_default("server.addr", "0.0.0.0:3000")?
            .set_default("server.public_url", "http://localhost:3000")?
            .set_default("server.graceful_shutdown_timeout_secs", 30)?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout_secs", 30)?
            .set_default("database.idle_timeout_secs", 600)?
            .set_default("database.max_lifetime_secs", 1800)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?
            .set_default("security.jwt_secret", "change-this-secret-in-production-min-32-chars!")?
            .set_default("security.trust_proxy", true)?
            .set_default("security.totp_issuer", "Trust Core")?
            .set_default("security.breach_api_url", "https://api.pwnedpasswords.com/range")?
            .set_default("security.breach_timeout_ms", 5000)?
            .set_default("security.rate_ledger", "memory")?
            .set_default("security.ledger_gc_interval_secs", 60)?
            .set_default("security.ledger_idle_secs", 3600)?
            .set_default("security.block_sweep_interval_secs", 300)?
            .set_default("security.session_sweep_interval_secs", 300)?
            .set_default("security.failed_login_threshold", 50)?
            .set_default("security.default_admin_username", "admin")?
            .set_default("security.default_admin_password", "admin")?
            .set_default("security.security_headers", default_security_headers())?
            .set_default("integrity.base_dir", ".")?
            .set_default("integrity.monitored_roots", vec!["src".to_string()])?
            .set_default("integrity.excluded_dirs", default_excluded_dirs())?;

        // 从环境变量加载配置（前缀为 TRUST_）
        settings = settings.add_source(
            Environment::with_prefix("TRUST")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("integrity.monitored_roots")
                .with_list_parse_key("integrity.excluded_dirs")
                .try_parsing(true),
        );

        let config: AppConfig = settings.build()?.try_deserialize()?;

        // 验证配置
        config.validate()?;

        Ok(config)
    }

    /// 限流台账是否放在数据库中
    pub fn shared_rate_ledger(&self) -> bool {
        self.security.rate_ledger.eq_ignore_ascii_case("postgres")
    }

    /// 对外地址是否为 HTTPS
    pub fn is_https(&self) -> bool {
        self.server.public_url.to_lowercase().starts_with("https://")
    }

    /// 验证配置合法性
    fn validate(&self) -> Result<(), ConfigError> {
        // 验证端口范围
        if let Some(port_str) = self.server.addr.split(':').next_back() {
            if let Ok(port) = port_str.parse::<u16>() {
                if port < 1024 {
                    return Err(ConfigError::Message("Server port should be >= 1024".to_string()));
                }
            }
        }

        // 验证日志级别
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    self.logging.level
                )))
            }
        }

        // 验证日志格式
        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log format: {}. Must be one of: json, pretty",
                    self.logging.format
                )))
            }
        }

        // 验证数据库连接池配置
        if self.database.max_connections < self.database.min_connections {
            return Err(ConfigError::Message(
                "max_connections must be >= min_connections".to_string(),
            ));
        }

        // 验证 JWT 密钥长度（至少 32 字符）
        if self.security.jwt_secret.expose_secret().len() < 32 {
            return Err(ConfigError::Message(
                "JWT secret must be at least 32 characters long".to_string(),
            ));
        }

        if self.security.breach_timeout_ms == 0 || self.security.breach_timeout_ms > 5000 {
            return Err(ConfigError::Message(
                "breach_timeout_ms must be between 1 and 5000".to_string(),
            ));
        }

        match self.security.rate_ledger.to_lowercase().as_str() {
            "memory" | "postgres" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid rate ledger: {}. Must be one of: memory, postgres",
                    self.security.rate_ledger
                )))
            }
        }

        if self.security.ledger_gc_interval_secs == 0
            || self.security.block_sweep_interval_secs == 0
            || self.security.session_sweep_interval_secs == 0
        {
            return Err(ConfigError::Message(
                "sweep intervals must be greater than zero".to_string(),
            ));
        }

        for header in &self.security.security_headers {
            if !header.contains(':') {
                return Err(ConfigError::Message(format!(
                    "Invalid security header '{}', expected 'Name: value'",
                    header
                )));
            }
        }

        Ok(())
    }
}
