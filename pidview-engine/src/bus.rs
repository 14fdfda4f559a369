use pidview_core::handle::{normalize_handles, split_tag_handles};
use pidview_core::request::{HighlightOptions, HighlightRequest};
use tracing::debug;

use crate::selection::{SelectionEvent, SelectionOrigin};
use crate::session::{SessionCommand, Subscription, ViewerSession};

/// 设备树、图层面板等外部界面驱动选择的唯一入口。
///
/// 推送与画布点击进入同一个会话命令队列，由同一个状态机处理，两条路径不会失去同步。
#[derive(Clone)]
pub struct HighlightBus {
    session: ViewerSession,
}

impl HighlightBus {
    pub fn new(session: ViewerSession) -> Self {
        Self { session }
    }

    #[inline]
    pub fn session(&self) -> &ViewerSession {
        &self.session
    }

    /// 推送一组原始句柄。空值与重复值在这里过滤；过滤后为空且非叠加时等价于清空。
    pub fn push_highlight<I, S>(&self, raw: I, options: HighlightOptions)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.push_request(HighlightRequest::from_raw(raw, options));
    }

    /// 推送设备位号载荷中 `/` 分隔的句柄串。
    pub fn push_tag(&self, tag_handle: &str, options: HighlightOptions) {
        let handles = split_tag_handles(tag_handle);
        self.push_request(HighlightRequest {
            handles,
            additive: options.additive,
            color: options.color,
            open_detail_panel: options.open_detail_panel,
        });
    }

    pub fn push_request(&self, request: HighlightRequest) {
        debug!(
            document = %self.session.document(),
            handles = request.handles.len(),
            additive = request.additive,
            "外部高亮推送"
        );
        if request.handles.is_empty() && !request.additive {
            self.session.submit(SessionCommand::Clear);
            return;
        }
        self.session.submit(SessionCommand::Highlight {
            request,
            origin: SelectionOrigin::External,
        });
    }

    pub fn clear(&self) {
        self.session.submit(SessionCommand::Clear);
    }

    /// 定位到一组句柄；单个句柄时额外按聚焦系数放大。
    pub fn zoom_to<I, S>(&self, raw: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut handles = normalize_handles(raw);
        match handles.len() {
            0 => {}
            1 => {
                if let Some(handle) = handles.pop() {
                    self.session.submit(SessionCommand::ZoomToHandle(handle));
                }
            }
            _ => self.session.submit(SessionCommand::ZoomToHandles(handles)),
        }
    }

    pub fn on_selection_changed(&self, listener: impl FnMut(&SelectionEvent) + 'static) -> Subscription {
        self.session.subscribe(Box::new(listener))
    }

    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        self.session.unsubscribe(subscription)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use pidview_core::geometry::{Point2, Rectangle};
    use pidview_core::handle::{DocumentId, Handle};

    use super::*;
    use crate::memory::MemoryBackend;
    use crate::selection::{PickKind, SelectionController, SelectionSettings};

    #[test]
    fn tree_push_and_canvas_click_share_one_selection() {
        let backend = MemoryBackend::new();
        let ids = backend.populate_demo();
        let session = ViewerSession::new(DocumentId::new("DOC-1"));
        session
            .install(SelectionController::new(
                Box::new(backend.clone()),
                SelectionSettings::default(),
            ))
            .unwrap();
        let bus = HighlightBus::new(session.clone());

        let seen: Rc<RefCell<Vec<Vec<Handle>>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        bus.on_selection_changed(move |event| sink.borrow_mut().push(event.message.handles.clone()));

        bus.push_highlight(
            [ids.pump.as_str(), ids.valve.as_str()],
            HighlightOptions::default(),
        );
        // 单击泵中心，叠加模式。
        let center = Point2::new(130.0, 130.0);
        session.submit(SessionCommand::Pick {
            rect: Rectangle::around(center, 4.0),
            kind: PickKind::Click { center, dpr: 1.0 },
            additive: true,
        });

        assert_eq!(session.selection(), vec![ids.valve.clone()]);
        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1], vec![ids.valve.clone()]);
    }

    #[test]
    fn tag_push_splits_handles_and_blank_push_clears() {
        let backend = MemoryBackend::new();
        let ids = backend.populate_demo();
        let session = ViewerSession::new(DocumentId::new("DOC-1"));
        session
            .install(SelectionController::new(
                Box::new(backend.clone()),
                SelectionSettings::default(),
            ))
            .unwrap();
        let bus = HighlightBus::new(session.clone());

        bus.push_tag(
            &format!(" {} / {} /{}", ids.pump, ids.pump_motor, ids.pump),
            HighlightOptions::default(),
        );
        assert_eq!(session.selection(), vec![ids.pump.clone(), ids.pump_motor.clone()]);

        bus.push_highlight(["", "  "], HighlightOptions::default());
        assert!(session.selection().is_empty());
    }
}
