use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use pidview_core::color::ColorOption;
use pidview_core::entity::EntityRecord;
use pidview_core::equipment::EquipmentIndex;
use pidview_core::geometry::{Point2, Rectangle};
use pidview_core::handle::{DocumentId, Handle};
use pidview_core::request::HighlightRequest;
use tracing::{debug, error, info, trace};

use crate::backend::ViewportCommand;
use crate::errors::EngineError;
use crate::selection::{PickKind, SelectionController, SelectionEvent, SelectionOrigin};

/// 会话命令。指针手势与外部推送都转换为命令，按到达顺序逐条执行。
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Highlight {
        request: HighlightRequest,
        origin: SelectionOrigin,
    },
    Pick {
        rect: Rectangle,
        kind: PickKind,
        additive: bool,
    },
    Hover {
        point: Point2,
        dpr: f64,
    },
    ClearHover,
    Clear,
    ColorOption(ColorOption),
    ColorOptionFor(Handle, ColorOption),
    RestoreSelectionColors,
    ZoomToHandle(Handle),
    ZoomToHandles(Vec<Handle>),
    Navigate(ViewportCommand),
}

impl SessionCommand {
    /// 初始化完成前到达时是否保留并在就绪后重放。指针手势直接丢弃。
    fn is_deferrable(&self) -> bool {
        match self {
            SessionCommand::Highlight { origin, .. } => *origin != SelectionOrigin::Pointer,
            SessionCommand::Clear
            | SessionCommand::ZoomToHandle(_)
            | SessionCommand::ZoomToHandles(_)
            | SessionCommand::Navigate(ViewportCommand::Resize { .. }) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Initializing,
    Ready,
    Failed(String),
    Closed,
}

pub type SelectionListener = Box<dyn FnMut(&SelectionEvent)>;

/// 订阅凭据，用于取消监听。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

enum Readiness {
    Initializing,
    Ready(Box<SelectionController>),
    Failed(String),
    Closed,
}

struct SessionInner {
    document: DocumentId,
    readiness: Readiness,
    queue: VecDeque<SessionCommand>,
    deferred: Vec<SessionCommand>,
    processing: bool,
    hover_suppressed: bool,
    pending_equipment: Option<EquipmentIndex>,
    listeners: Vec<(Subscription, Rc<RefCell<SelectionListener>>)>,
    next_subscription: u64,
}

/// 单个文档的查看会话。
///
/// 会话拥有该文档的选择控制器；所有入口经由命令队列串行化。
/// 监听器回调期间不持有内部借用，回调中再次提交的命令会排在队尾，
/// 待当前命令的通知结束后再执行。
#[derive(Clone)]
pub struct ViewerSession {
    inner: Rc<RefCell<SessionInner>>,
}

impl ViewerSession {
    pub fn new(document: DocumentId) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SessionInner {
                document,
                readiness: Readiness::Initializing,
                queue: VecDeque::new(),
                deferred: Vec::new(),
                processing: false,
                hover_suppressed: false,
                pending_equipment: None,
                listeners: Vec::new(),
                next_subscription: 0,
            })),
        }
    }

    pub fn document(&self) -> DocumentId {
        self.inner.borrow().document.clone()
    }

    pub fn status(&self) -> SessionStatus {
        match &self.inner.borrow().readiness {
            Readiness::Initializing => SessionStatus::Initializing,
            Readiness::Ready(_) => SessionStatus::Ready,
            Readiness::Failed(message) => SessionStatus::Failed(message.clone()),
            Readiness::Closed => SessionStatus::Closed,
        }
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.status() == SessionStatus::Ready
    }

    /// 需要同步结果的调用方（如信息面板）先检查就绪状态。
    pub fn require_ready(&self) -> Result<(), EngineError> {
        let inner = self.inner.borrow();
        match &inner.readiness {
            Readiness::Ready(_) => Ok(()),
            Readiness::Initializing => Err(EngineError::NotInitialized),
            Readiness::Failed(message) => Err(EngineError::InitializationFailed(message.clone())),
            Readiness::Closed => Err(EngineError::DocumentNotOpen(inner.document.clone())),
        }
    }

    /// 读取单个实体的元数据，必要时先写入缓存。
    pub fn entity_record(&self, handle: &Handle) -> Result<EntityRecord, EngineError> {
        self.require_ready()?;
        let mut inner = self.inner.borrow_mut();
        match &mut inner.readiness {
            Readiness::Ready(controller) => controller.record(handle),
            _ => Err(EngineError::NotInitialized),
        }
    }

    /// 初始化完成后装入控制器，并重放初始化期间暂存的外部请求。
    pub fn install(&self, mut controller: SelectionController) -> Result<(), EngineError> {
        {
            let mut inner = self.inner.borrow_mut();
            match inner.readiness {
                Readiness::Initializing => {}
                Readiness::Closed => {
                    controller.teardown();
                    return Err(EngineError::Cancelled(inner.document.clone()));
                }
                _ => return Ok(()),
            }
            if let Some(index) = inner.pending_equipment.take() {
                controller.set_equipment_index(index);
            }
            let deferred = std::mem::take(&mut inner.deferred);
            info!(
                document = %inner.document,
                replayed = deferred.len(),
                "文档查看器初始化完成"
            );
            inner.queue.extend(deferred);
            inner.readiness = Readiness::Ready(Box::new(controller));
        }
        self.drain();
        Ok(())
    }

    /// 初始化失败：这是唯一需要展示给用户的错误。
    pub fn fail(&self, message: impl Into<String>) {
        let mut inner = self.inner.borrow_mut();
        if !matches!(inner.readiness, Readiness::Initializing) {
            return;
        }
        let message = message.into();
        error!(document = %inner.document, error = %message, "文档查看器初始化失败");
        inner.deferred.clear();
        inner.readiness = Readiness::Failed(message);
    }

    pub fn set_equipment_index(&self, index: EquipmentIndex) {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        match &mut inner.readiness {
            Readiness::Ready(controller) => controller.set_equipment_index(index),
            Readiness::Initializing => inner.pending_equipment = Some(index),
            _ => {}
        }
    }

    pub fn set_hover_suppressed(&self, suppressed: bool) {
        self.inner.borrow_mut().hover_suppressed = suppressed;
        if suppressed {
            self.submit(SessionCommand::ClearHover);
        }
    }

    pub fn subscribe(&self, listener: SelectionListener) -> Subscription {
        let mut inner = self.inner.borrow_mut();
        let subscription = Subscription(inner.next_subscription);
        inner.next_subscription += 1;
        inner
            .listeners
            .push((subscription, Rc::new(RefCell::new(listener))));
        subscription
    }

    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut inner = self.inner.borrow_mut();
        let before = inner.listeners.len();
        inner.listeners.retain(|(id, _)| *id != subscription);
        before != inner.listeners.len()
    }

    /// 提交命令。未就绪时外部请求暂存，其余丢弃；已关闭或失败的会话忽略一切命令。
    pub fn submit(&self, command: SessionCommand) {
        {
            let mut inner = self.inner.borrow_mut();
            match inner.readiness {
                Readiness::Ready(_) => {}
                Readiness::Initializing => {
                    if command.is_deferrable() {
                        trace!(document = %inner.document, ?command, "查看器未就绪，命令已暂存");
                        inner.deferred.push(command);
                    } else {
                        trace!(document = %inner.document, "查看器未就绪，丢弃指针命令");
                    }
                    return;
                }
                Readiness::Failed(_) | Readiness::Closed => {
                    debug!(document = %inner.document, "会话不可用，命令被忽略");
                    return;
                }
            }
            inner.queue.push_back(command);
            if inner.processing {
                return;
            }
        }
        self.drain();
    }

    /// 关闭会话：撤销瞬时高亮、丢弃缓存，并向观察者发出一次空选中集通知。
    pub fn close(&self) {
        let (controller, listeners) = {
            let mut inner = self.inner.borrow_mut();
            let previous = std::mem::replace(&mut inner.readiness, Readiness::Closed);
            inner.queue.clear();
            inner.deferred.clear();
            inner.pending_equipment = None;
            let listeners = std::mem::take(&mut inner.listeners);
            debug!(document = %inner.document, "会话已关闭");
            match previous {
                Readiness::Ready(controller) => (Some(controller), listeners),
                _ => (None, Vec::new()),
            }
        };
        if let Some(mut controller) = controller {
            let had_selection = !controller.selection().is_empty();
            controller.teardown();
            if had_selection {
                let event = controller.snapshot_event(SelectionOrigin::Cancel);
                notify(&listeners, &event);
            }
        }
    }

    /// 只读访问控制器，未就绪时返回 `None`。
    pub fn with_controller<R>(&self, f: impl FnOnce(&SelectionController) -> R) -> Option<R> {
        match &self.inner.borrow().readiness {
            Readiness::Ready(controller) => Some(f(controller.as_ref())),
            _ => None,
        }
    }

    pub fn selection(&self) -> Vec<Handle> {
        self.with_controller(|controller| controller.selection().to_vec())
            .unwrap_or_default()
    }

    fn drain(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.processing {
                return;
            }
            inner.processing = true;
        }
        loop {
            let (event, listeners) = {
                let mut guard = self.inner.borrow_mut();
                let inner = &mut *guard;
                let Some(command) = inner.queue.pop_front() else {
                    inner.processing = false;
                    break;
                };
                let hover_suppressed = inner.hover_suppressed;
                let Readiness::Ready(controller) = &mut inner.readiness else {
                    inner.queue.clear();
                    inner.processing = false;
                    break;
                };
                let event = execute(controller, command, hover_suppressed);
                let listeners: Vec<Rc<RefCell<SelectionListener>>> = match event {
                    Some(_) => inner.listeners.iter().map(|(_, l)| Rc::clone(l)).collect(),
                    None => Vec::new(),
                };
                (event, listeners)
            };
            if let Some(event) = event {
                notify_all(&listeners, &event);
            }
        }
    }
}

fn execute(
    controller: &mut SelectionController,
    command: SessionCommand,
    hover_suppressed: bool,
) -> Option<SelectionEvent> {
    match command {
        SessionCommand::Highlight { request, origin } => {
            Some(controller.apply_request(&request, origin))
        }
        SessionCommand::Pick {
            rect,
            kind,
            additive,
        } => controller.pick(rect, kind, additive),
        SessionCommand::Hover { point, dpr } => {
            if !hover_suppressed {
                controller.hover_at(point, dpr);
            }
            None
        }
        SessionCommand::ClearHover => {
            controller.clear_hover();
            None
        }
        SessionCommand::Clear => Some(controller.clear(SelectionOrigin::Cancel)),
        SessionCommand::ColorOption(option) => (controller.apply_color_option(option) > 0)
            .then(|| controller.snapshot_event(SelectionOrigin::Recolor)),
        SessionCommand::ColorOptionFor(handle, option) => controller
            .apply_color_option_to(&handle, option)
            .then(|| controller.snapshot_event(SelectionOrigin::Recolor)),
        SessionCommand::RestoreSelectionColors => (controller.restore_selection_colors().restored
            > 0)
        .then(|| controller.snapshot_event(SelectionOrigin::Recolor)),
        SessionCommand::ZoomToHandle(handle) => {
            controller.zoom_to_handle(&handle);
            None
        }
        SessionCommand::ZoomToHandles(handles) => {
            controller.zoom_to_handles(&handles);
            None
        }
        SessionCommand::Navigate(command) => {
            controller.navigate(command);
            None
        }
    }
}

fn notify(listeners: &[(Subscription, Rc<RefCell<SelectionListener>>)], event: &SelectionEvent) {
    let listeners: Vec<Rc<RefCell<SelectionListener>>> =
        listeners.iter().map(|(_, l)| Rc::clone(l)).collect();
    notify_all(&listeners, event);
}

fn notify_all(listeners: &[Rc<RefCell<SelectionListener>>], event: &SelectionEvent) {
    for listener in listeners {
        match listener.try_borrow_mut() {
            Ok(mut callback) => (callback)(event),
            Err(_) => trace!("监听器正在执行，跳过重入通知"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::memory::{DemoEntities, MemoryBackend};
    use crate::selection::SelectionSettings;

    fn ready_session() -> (ViewerSession, MemoryBackend, DemoEntities) {
        let backend = MemoryBackend::new();
        let ids = backend.populate_demo();
        let session = ViewerSession::new(DocumentId::new("DOC-1"));
        let controller =
            SelectionController::new(Box::new(backend.clone()), SelectionSettings::default());
        session.install(controller).unwrap();
        (session, backend, ids)
    }

    fn highlight(handles: Vec<Handle>, additive: bool) -> SessionCommand {
        SessionCommand::Highlight {
            request: HighlightRequest {
                handles,
                additive,
                ..HighlightRequest::default()
            },
            origin: SelectionOrigin::External,
        }
    }

    #[test]
    fn external_pushes_before_init_are_replayed() {
        let backend = MemoryBackend::new();
        let ids = backend.populate_demo();
        let session = ViewerSession::new(DocumentId::new("DOC-1"));

        session.submit(highlight(vec![ids.valve.clone()], false));
        session.submit(SessionCommand::Pick {
            rect: Rectangle::around(Point2::new(130.0, 130.0), 4.0),
            kind: PickKind::Drag,
            additive: true,
        });
        assert_eq!(session.status(), SessionStatus::Initializing);
        assert!(session.selection().is_empty());

        let controller =
            SelectionController::new(Box::new(backend.clone()), SelectionSettings::default());
        session.install(controller).unwrap();
        assert_eq!(session.selection(), vec![ids.valve.clone()]);
    }

    #[test]
    fn listener_reentry_is_processed_after_current_notification() {
        let (session, _, ids) = ready_session();
        let log: Rc<RefCell<Vec<Vec<Handle>>>> = Rc::new(RefCell::new(Vec::new()));
        let fired = Rc::new(Cell::new(false));

        let reentrant = session.clone();
        let sink = Rc::clone(&log);
        let pump = ids.pump.clone();
        let once = Rc::clone(&fired);
        session.subscribe(Box::new(move |event: &SelectionEvent| {
            sink.borrow_mut().push(event.message.handles.clone());
            if !once.replace(true) {
                reentrant.submit(highlight(vec![pump.clone()], true));
                // 重入命令尚未执行。
                assert_eq!(reentrant.selection(), event.message.handles);
            }
        }));

        session.submit(highlight(vec![ids.valve.clone()], false));
        let log = log.borrow();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], vec![ids.valve.clone()]);
        assert_eq!(log[1], vec![ids.valve.clone(), ids.pump.clone()]);
    }

    #[test]
    fn failed_session_ignores_commands() {
        let session = ViewerSession::new(DocumentId::new("DOC-2"));
        session.fail("脚本加载失败");
        session.submit(SessionCommand::Clear);
        assert_eq!(
            session.status(),
            SessionStatus::Failed("脚本加载失败".to_string())
        );
    }

    #[test]
    fn close_reverts_highlights_and_notifies_once() {
        let (session, backend, ids) = ready_session();
        session.submit(highlight(vec![ids.pump.clone()], false));
        let notified = Rc::new(Cell::new(0));
        let counter = Rc::clone(&notified);
        session.subscribe(Box::new(move |event: &SelectionEvent| {
            assert!(event.message.handles.is_empty());
            counter.set(counter.get() + 1);
        }));

        session.close();
        assert_eq!(notified.get(), 1);
        assert_eq!(session.status(), SessionStatus::Closed);
        assert_eq!(
            backend.live_color(&ids.pump),
            Some(pidview_core::color::ColorValue::Indexed(4))
        );

        session.submit(highlight(vec![ids.valve.clone()], false));
        assert_eq!(notified.get(), 1);
    }

    #[test]
    fn unsubscribed_listeners_are_not_called() {
        let (session, _, ids) = ready_session();
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let subscription = session.subscribe(Box::new(move |_: &SelectionEvent| {
            counter.set(counter.get() + 1)
        }));
        session.submit(highlight(vec![ids.pump.clone()], false));
        assert!(session.unsubscribe(subscription));
        session.submit(SessionCommand::Clear);
        assert_eq!(calls.get(), 1);
    }
}
