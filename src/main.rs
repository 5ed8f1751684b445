//! 安全与信任核心服务入口

use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, signal};
use trust_core::{
    auth::password::PasswordHasher,
    config::AppConfig,
    db,
    handlers::health,
    middleware::AppState,
    repository::{PgRateLedger, StoreSet},
    routes,
    services::{
        sweeper::{spawn_pool_gauges, spawn_sweepers, SweepSchedule},
        InMemoryRateLedger, RateLedger,
    },
    telemetry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ===== CLI 参数处理 =====
    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 {
        match args[1].as_str() {
            "--version" => {
                println!("trust-core {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" => {
                print_help();
                return Ok(());
            }
            _ => {
                eprintln!("未知参数: {}", args[1]);
                print_help();
                std::process::exit(1);
            }
        }
    }

    // 加载 .env 文件（开发环境），生产环境直接设置环境变量
    if let Ok(env) = std::env::var("TRUST_ENV") {
        dotenv::from_filename(format!(".env.{}", env)).ok();
    } else {
        dotenv::from_filename(".env.local").ok();
        dotenv::from_filename(".env.development").ok();
        dotenv::dotenv().ok();
    }

    health::set_start_time();

    // 1. 加载配置
    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        anyhow::anyhow!("Failed to load configuration: {}", e)
    })?;

    // 2. 初始化日志
    telemetry::init_telemetry(&config);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Trust core starting...");

    // 3. 数据库连接池 + 迁移
    let db_pool = db::connect(&config.database).await?;

    tracing::info!("Database initialized");

    // 4. 构建应用状态
    let ledger: Arc<dyn RateLedger> = if config.shared_rate_ledger() {
        Arc::new(PgRateLedger::new(db_pool.clone()))
    } else {
        Arc::new(InMemoryRateLedger::new())
    };
    tracing::info!(rate_ledger = %config.security.rate_ledger, "Rate ledger selected");

    let app_state = Arc::new(AppState::build(
        config.clone(),
        Some(db_pool.clone()),
        StoreSet::postgres(&db_pool),
        ledger,
        Arc::new(PasswordHasher::new()),
    )?);

    // 5. 后台清理任务
    let schedule = SweepSchedule::from_config(&config.security);
    let mut sweepers = spawn_sweepers(
        schedule,
        app_state.rate_limiter.clone(),
        app_state.ip_blocks.clone(),
        app_state.sessions.clone(),
    );
    sweepers.push(spawn_pool_gauges(db_pool.clone(), schedule.ledger_gc_interval));

    // 6. 构建路由并启动服务器
    let app = routes::create_router(app_state);

    let addr = &config.server.addr;
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(addr = %addr, "Server listening");

    // 7. 优雅关闭（需要 ConnectInfo 以获取客户端地址）
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(config.server.graceful_shutdown_timeout_secs))
    .await?;

    for handle in sweepers {
        handle.abort();
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// 优雅关闭信号处理
/// 收到信号后开始排空连接，超时则强制退出
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl+C received, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Terminate signal received, starting graceful shutdown");
        },
    }

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(timeout_secs)).await;
        tracing::warn!("Graceful shutdown timeout reached, forcing exit");
        std::process::exit(1);
    });
}

/// 打印帮助信息
fn print_help() {
    println!("trust-core {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("用法: trust-core [选项]");
    println!();
    println!("选项:");
    println!("  --version     打印版本信息并退出");
    println!("  --help        打印此帮助信息并退出");
    println!();
    println!("环境变量:");
    println!("  所有配置通过 TRUST_ 前缀的环境变量完成");
    println!("  例如 TRUST_DATABASE__URL, TRUST_SECURITY__JWT_SECRET");
}
