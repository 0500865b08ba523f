use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{value_parser, Arg, Command};
use gateway_observability::{
    init_logging, setup_telemetry, BuildInfo, HttpMetrics, HttpTracing, LogFormat, LoggerOptions,
};
use mcp_gateway::app::{create_app, serve};
use mcp_gateway::shutdown::{shutdown_telemetry, ShutdownSignal};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let matches = Command::new("mcp-gateway")
        .version(env!("CARGO_PKG_VERSION"))
        .about("MCP 网关服务")
        .arg(
            Arg::new("listen")
                .long("listen")
                .value_name("ADDR")
                .help("HTTP 监听地址")
                .value_parser(value_parser!(SocketAddr))
                .default_value("0.0.0.0:8080"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .default_value("info"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式")
                .value_parser(["text", "json"])
                .default_value("text"),
        )
        .arg(
            Arg::new("shutdown-timeout")
                .long("shutdown-timeout")
                .value_name("SECONDS")
                .help("优雅关闭超时时间（秒）")
                .value_parser(value_parser!(u64))
                .default_value("10"),
        )
        .get_matches();

    let listen = matches
        .get_one::<SocketAddr>("listen")
        .copied()
        .context("缺少监听地址")?;
    let log_level = matches
        .get_one::<String>("log-level")
        .context("缺少日志级别")?;
    let log_format = matches
        .get_one::<String>("log-format")
        .context("缺少日志格式")?;
    let shutdown_timeout = Duration::from_secs(
        matches
            .get_one::<u64>("shutdown-timeout")
            .copied()
            .unwrap_or(10),
    );

    let options = LoggerOptions {
        level: log_level
            .parse::<LevelFilter>()
            .with_context(|| format!("无效的日志级别: {log_level}"))?,
        format: log_format
            .parse::<LogFormat>()
            .map_err(anyhow::Error::msg)?,
    };

    let build = BuildInfo::new(
        env!("CARGO_PKG_VERSION"),
        option_env!("GIT_SHA").unwrap_or_default(),
        option_env!("GIT_DIRTY").unwrap_or_default(),
    );

    // 遥测初始化期间使用临时的基础日志
    let base_logger = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .with_target(false)
        .finish();
    let setup = {
        let _guard = tracing::subscriber::set_default(base_logger);
        setup_telemetry(&build)
    };
    let telemetry = match setup {
        Ok(telemetry) => telemetry,
        Err(err) => {
            let (source, partial) = err.into_parts();
            // 释放已经启动的信号
            if let Err(shutdown_err) = partial.shutdown(shutdown_timeout).await {
                eprintln!("清理遥测失败: {shutdown_err}");
            }
            return Err(anyhow::Error::new(source).context("初始化遥测失败"));
        }
    };

    // 初始化日志系统
    init_logging(&options, &telemetry).context("初始化日志系统失败")?;

    info!("启动 MCP 网关 {}", build.version);
    info!("监听地址: {listen}");

    let mut http_tracing = HttpTracing::global();
    if telemetry.meter_provider().is_some() {
        http_tracing = http_tracing.with_metrics(HttpMetrics::global());
    }
    let app = create_app(http_tracing);

    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("绑定地址失败: {listen}"))?;

    // 创建关闭信号
    let shutdown = ShutdownSignal::new();
    let server = tokio::spawn(serve(listener, app, shutdown.wait()));

    // 等待关闭信号
    wait_for_shutdown_signal().await;
    info!("收到关闭信号，开始优雅关闭...");
    shutdown.trigger();

    match tokio::time::timeout(shutdown_timeout, server).await {
        Ok(Ok(Ok(()))) => info!("HTTP 服务已优雅关闭"),
        Ok(Ok(Err(e))) => error!("HTTP 服务关闭时发生错误: {e:#}"),
        Ok(Err(e)) => error!("HTTP 服务任务异常退出: {e}"),
        Err(_) => warn!("HTTP 服务关闭超时，强制退出"),
    }

    // 遥测关闭失败只记录，不影响退出码
    if shutdown_telemetry(telemetry, shutdown_timeout).await.is_err() {
        warn!("部分遥测数据可能未导出");
    }

    info!("MCP 网关已退出");
    Ok(())
}

/// 等待关闭信号
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("安装Ctrl+C信号处理器失败: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("安装SIGTERM信号处理器失败: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到Ctrl+C信号");
        },
        _ = terminate => {
            info!("收到SIGTERM信号");
        },
    }
}
