pub mod backend;
pub mod bus;
pub mod cache;
pub mod color;
pub mod command;
pub mod memory;
pub mod registry;
pub mod selection;
pub mod session;

pub mod errors {
    use pidview_core::handle::{DocumentId, Handle};
    use thiserror::Error;

    /// 渲染引擎能力面返回的错误。
    #[derive(Debug, Clone, PartialEq, Eq, Error)]
    pub enum BackendError {
        #[error("实体引用已失效")]
        StaleReference,
        #[error("渲染引擎当前不可用")]
        Unavailable,
    }

    #[derive(Debug, Error)]
    pub enum EngineError {
        #[error("渲染引擎尚未初始化")]
        NotInitialized,
        #[error("句柄 {0} 无法解析为有效实体")]
        StaleReference(Handle),
        #[error("文档 {0} 未打开")]
        DocumentNotOpen(DocumentId),
        #[error("文档初始化失败: {0}")]
        InitializationFailed(String),
        #[error("文档 {0} 的初始化已取消")]
        Cancelled(DocumentId),
        #[error("同时打开的文档不能超过 {0} 个")]
        TooManyDocuments(usize),
    }
}
