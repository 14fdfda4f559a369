use pidview_engine::errors::EngineError;
use pidview_io::PayloadError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("读取位号载荷失败: {0}")]
    Payload(#[from] PayloadError),
    #[error("打开文档失败: {0}")]
    Engine(#[from] EngineError),
    #[error("序列化选中消息失败: {0}")]
    Message(#[from] serde_json::Error),
}
