use std::cell::Cell;
use std::fmt::Display;
use std::future::Future;
use std::rc::Rc;

use pidview_core::handle::DocumentId;
use tracing::{debug, info, warn};

use crate::backend::RenderBackend;
use crate::errors::EngineError;
use crate::selection::{SelectionController, SelectionSettings};
use crate::session::ViewerSession;

pub const DEFAULT_MAX_OPEN_DOCUMENTS: usize = 5;

/// 挂载存活标记。引擎初始化没有取消钩子，完成后以此判断结果是否仍应生效。
#[derive(Debug, Clone)]
pub struct Liveness(Rc<Cell<bool>>);

impl Liveness {
    fn new() -> Self {
        Self(Rc::new(Cell::new(true)))
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.0.get()
    }

    fn revoke(&self) {
        self.0.set(false);
    }
}

/// 单个文档的初始化凭据。
pub struct InitTicket {
    document: DocumentId,
    session: ViewerSession,
    liveness: Liveness,
    settings: SelectionSettings,
}

impl InitTicket {
    #[inline]
    pub fn document(&self) -> &DocumentId {
        &self.document
    }

    #[inline]
    pub fn liveness(&self) -> Liveness {
        self.liveness.clone()
    }

    /// 等待引擎就绪并装入会话。等待期间文档若已关闭，结果被丢弃并返回 `Cancelled`。
    pub async fn run<F, B, E>(self, init: F) -> Result<(), EngineError>
    where
        F: Future<Output = Result<B, E>>,
        B: RenderBackend + 'static,
        E: Display,
    {
        let outcome = init.await;
        if !self.liveness.is_alive() {
            debug!(document = %self.document, "文档已关闭，丢弃初始化结果");
            return Err(EngineError::Cancelled(self.document));
        }
        match outcome {
            Ok(backend) => {
                let controller = SelectionController::new(Box::new(backend), self.settings);
                self.session.install(controller)
            }
            Err(err) => {
                let message = err.to_string();
                self.session.fail(message.clone());
                Err(EngineError::InitializationFailed(message))
            }
        }
    }
}

/// `open` 的结果：新建的会话附带初始化凭据，已打开的文档只重新激活。
pub enum OpenOutcome {
    Created {
        session: ViewerSession,
        ticket: InitTicket,
    },
    Reactivated(ViewerSession),
}

impl OpenOutcome {
    pub fn session(&self) -> &ViewerSession {
        match self {
            OpenOutcome::Created { session, .. } => session,
            OpenOutcome::Reactivated(session) => session,
        }
    }
}

struct OpenDocument {
    id: DocumentId,
    session: ViewerSession,
    liveness: Liveness,
}

/// 文档 ID 到会话的显式注册表。每个文档独占自己的引擎、缓存与选中集。
pub struct DocumentRegistry {
    documents: Vec<OpenDocument>,
    active: Option<DocumentId>,
    max_open: usize,
    settings: SelectionSettings,
}

impl DocumentRegistry {
    pub fn new(settings: SelectionSettings) -> Self {
        Self::with_limit(settings, DEFAULT_MAX_OPEN_DOCUMENTS)
    }

    pub fn with_limit(settings: SelectionSettings, max_open: usize) -> Self {
        Self {
            documents: Vec::new(),
            active: None,
            max_open: max_open.max(1),
            settings,
        }
    }

    pub fn open(&mut self, id: DocumentId) -> Result<OpenOutcome, EngineError> {
        if let Some(existing) = self.documents.iter().find(|doc| doc.id == id) {
            let session = existing.session.clone();
            debug!(document = %id, "文档已打开，切换为活动文档");
            self.active = Some(id);
            return Ok(OpenOutcome::Reactivated(session));
        }
        if self.documents.len() >= self.max_open {
            warn!(document = %id, limit = self.max_open, "打开的文档数量已达上限");
            return Err(EngineError::TooManyDocuments(self.max_open));
        }

        let session = ViewerSession::new(id.clone());
        let liveness = Liveness::new();
        let ticket = InitTicket {
            document: id.clone(),
            session: session.clone(),
            liveness: liveness.clone(),
            settings: self.settings.clone(),
        };
        self.documents.push(OpenDocument {
            id: id.clone(),
            session: session.clone(),
            liveness,
        });
        info!(document = %id, open = self.documents.len(), "打开文档");
        self.active = Some(id);
        Ok(OpenOutcome::Created { session, ticket })
    }

    /// 关闭文档：撤销存活标记，清空选择与缓存。关闭活动文档后激活最近打开的剩余文档。
    pub fn close(&mut self, id: &DocumentId) -> Result<(), EngineError> {
        let position = self
            .documents
            .iter()
            .position(|doc| &doc.id == id)
            .ok_or_else(|| EngineError::DocumentNotOpen(id.clone()))?;
        let document = self.documents.remove(position);
        document.liveness.revoke();
        document.session.close();
        if self.active.as_ref() == Some(id) {
            self.active = self.documents.last().map(|doc| doc.id.clone());
        }
        info!(document = %id, active = ?self.active, "关闭文档");
        Ok(())
    }

    pub fn close_all(&mut self) {
        let ids: Vec<DocumentId> = self.documents.iter().map(|doc| doc.id.clone()).collect();
        for id in ids {
            if let Err(err) = self.close(&id) {
                debug!(document = %id, error = %err, "批量关闭时跳过文档");
            }
        }
    }

    pub fn activate(&mut self, id: &DocumentId) -> Result<ViewerSession, EngineError> {
        let session = self
            .session(id)
            .ok_or_else(|| EngineError::DocumentNotOpen(id.clone()))?;
        self.active = Some(id.clone());
        Ok(session)
    }

    pub fn active(&self) -> Option<ViewerSession> {
        self.active.as_ref().and_then(|id| self.session(id))
    }

    #[inline]
    pub fn active_id(&self) -> Option<&DocumentId> {
        self.active.as_ref()
    }

    pub fn session(&self, id: &DocumentId) -> Option<ViewerSession> {
        self.documents
            .iter()
            .find(|doc| &doc.id == id)
            .map(|doc| doc.session.clone())
    }

    pub fn ids(&self) -> Vec<DocumentId> {
        self.documents.iter().map(|doc| doc.id.clone()).collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
