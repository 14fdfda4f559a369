pub mod cli;
pub mod coords;
pub mod errors;
pub mod frame;
pub mod loader;
pub mod overlay;
pub mod router;

use errors::FrontendError;
use pidview_config::AppConfig;
use tracing::info;

/// 启动 CLI 演示或返回错误。`script` 为逐行的会话命令。
pub fn run_cli_demo(config: &AppConfig, script: Option<&str>) -> Result<(), FrontendError> {
    info!("启动 CLI 演示前端");
    cli::run_demo(config, script)
}
