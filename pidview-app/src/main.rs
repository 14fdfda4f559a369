use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use pidview_config::{AppConfig, ConfigError};
use pidview_core::mode::ViewerMode;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

/// P&ID 查看器的实体选择与高亮联动演示
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// 配置文件路径，优先于 PIDVIEW_CONFIG 环境变量
    #[arg(long)]
    config: Option<PathBuf>,

    /// 演示结束前逐行执行的会话命令脚本
    #[arg(long)]
    script: Option<PathBuf>,

    /// 覆盖配置中的查看器模式
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Pid,
    Pld,
    Intelligent,
    Inherit,
}

impl From<ModeArg> for ViewerMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Pid => ViewerMode::Pid,
            ModeArg::Pld => ViewerMode::Pld,
            ModeArg::Intelligent => ViewerMode::Intelligent,
            ModeArg::Inherit => ViewerMode::Inherit,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    let (mut config, discovery_error) = load_configuration(args.config.as_deref())?;
    init_logging(&config);
    if let Some(err) = discovery_error {
        match &err {
            ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
                warn!(path = %path.display(), error = %err, "加载默认配置失败，使用内建默认值");
            }
            ConfigError::Context { .. } | ConfigError::Invalid(_) => {
                warn!(error = %err, "加载默认配置失败，使用内建默认值");
            }
        }
    }
    if let Some(mode) = args.mode {
        config.viewer.mode = mode.into();
    }
    info!(mode = ?config.viewer.mode, "启动 PID 查看器演示");

    let script = match &args.script {
        Some(path) => Some(
            fs::read_to_string(path)
                .with_context(|| format!("读取脚本 {} 失败", path.display()))?,
        ),
        None => None,
    };

    pidview_frontend::run_cli_demo(&config, script.as_deref()).context("执行 CLI 演示失败")?;
    Ok(())
}

/// 显式指定的配置加载失败直接报错；自动发现失败则回退到默认值，并把错误留给日志初始化之后报告。
fn load_configuration(
    explicit: Option<&Path>,
) -> anyhow::Result<(AppConfig, Option<ConfigError>)> {
    if let Some(path) = explicit {
        let config = AppConfig::discover_with(Some(path))
            .with_context(|| format!("加载配置文件 {} 失败", path.display()))?;
        return Ok((config, None));
    }
    match AppConfig::discover() {
        Ok(cfg) => Ok((cfg, None)),
        Err(err) => Ok((AppConfig::default(), Some(err))),
    }
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
