use pidview_config::InteractionConfig;
use pidview_core::geometry::{Rectangle, Vector2, ViewportPoint};
use pidview_engine::backend::ViewportCommand;
use pidview_engine::selection::PickKind;
use pidview_engine::session::{SessionCommand, ViewerSession};
use tracing::{debug, trace};

use crate::coords::{CanvasSurface, sanitize_dpr, to_viewport_point};
use crate::frame::FrameDebouncer;
use crate::overlay::SelectionOverlay;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Middle,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub meta: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        shift: false,
        ctrl: false,
        meta: false,
    };

    /// 任一修饰键按下即为追加（切换）选择。
    #[inline]
    pub fn additive(&self) -> bool {
        self.shift || self.ctrl || self.meta
    }
}

/// 宿主转发给路由器的输入事件，坐标为客户区 CSS 像素。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    PointerDown {
        button: PointerButton,
        client_x: f64,
        client_y: f64,
        modifiers: Modifiers,
        timestamp_ms: u64,
    },
    PointerMove {
        client_x: f64,
        client_y: f64,
    },
    PointerUp {
        button: PointerButton,
        client_x: f64,
        client_y: f64,
        modifiers: Modifiers,
    },
    PointerLeave,
    Wheel {
        client_x: f64,
        client_y: f64,
        delta_y: f64,
    },
    Escape,
    /// 容器尺寸变化通知。
    Resized,
    AnimationFrame,
}

/// 主键手势状态。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureState {
    Idle,
    Armed {
        start: ViewportPoint,
    },
    Dragging {
        start: ViewportPoint,
        current: ViewportPoint,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouterSettings {
    /// CSS 像素。
    pub drag_threshold: f64,
    /// CSS 像素，拾取时乘以像素比。
    pub click_radius: f64,
    pub middle_double_click_ms: u64,
    pub wheel_zoom_factor: f64,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self::from(&InteractionConfig::default())
    }
}

impl From<&InteractionConfig> for RouterSettings {
    fn from(config: &InteractionConfig) -> Self {
        Self {
            drag_threshold: config.drag_threshold,
            click_radius: config.click_radius,
            middle_double_click_ms: config.middle_double_click_ms,
            wheel_zoom_factor: config.wheel_zoom_factor,
        }
    }
}

/// 路由器挂接的视口：文档会话、宿主画布与框选叠加层。
pub struct Viewport {
    pub session: ViewerSession,
    pub canvas: Box<dyn CanvasSurface>,
    pub overlay: SelectionOverlay,
}

#[derive(Debug, Clone, Copy)]
struct PanGesture {
    button: PointerButton,
    last_x: f64,
    last_y: f64,
}

/// 指针交互路由器：把原始输入分类为单击、框选、平移、适应视图与滚轮缩放，
/// 再以会话命令的形式提交。所有手势判定集中在这里。
pub struct PointerRouter {
    viewport: Viewport,
    settings: RouterSettings,
    frames: FrameDebouncer,
    state: GestureState,
    pan: Option<PanGesture>,
    last_middle_down: Option<u64>,
}

impl PointerRouter {
    pub fn new(viewport: Viewport, settings: RouterSettings) -> Self {
        Self {
            frames: FrameDebouncer::new(settings.wheel_zoom_factor),
            viewport,
            settings,
            state: GestureState::Idle,
            pan: None,
            last_middle_down: None,
        }
    }

    pub fn state(&self) -> GestureState {
        self.state
    }

    pub fn is_panning(&self) -> bool {
        self.pan.is_some()
    }

    pub fn session(&self) -> &ViewerSession {
        &self.viewport.session
    }

    pub fn handle(&mut self, event: InputEvent) {
        match event {
            InputEvent::PointerDown {
                button,
                client_x,
                client_y,
                modifiers: _,
                timestamp_ms,
            } => self.on_down(button, client_x, client_y, timestamp_ms),
            InputEvent::PointerMove { client_x, client_y } => self.on_move(client_x, client_y),
            InputEvent::PointerUp {
                button,
                client_x,
                client_y,
                modifiers,
            } => self.on_up(button, client_x, client_y, modifiers),
            InputEvent::PointerLeave => self.on_leave(),
            InputEvent::Wheel {
                client_x,
                client_y,
                delta_y,
            } => self.on_wheel(client_x, client_y, delta_y),
            InputEvent::Escape => self.cancel_selection(),
            InputEvent::Resized => self.on_resized(),
            InputEvent::AnimationFrame => self.on_frame(),
        }
    }

    /// 挂接到视口；返回的 [`Attachment`] 被释放或调用 `detach` 后不再路由任何事件。
    pub fn attach(viewport: Viewport, settings: RouterSettings) -> Attachment {
        debug!(document = %viewport.session.document(), "指针路由器已挂接");
        Attachment {
            router: Some(Self::new(viewport, settings)),
        }
    }

    fn point(&self, client_x: f64, client_y: f64) -> ViewportPoint {
        to_viewport_point(self.viewport.canvas.as_ref(), client_x, client_y)
    }

    fn on_down(&mut self, button: PointerButton, client_x: f64, client_y: f64, timestamp_ms: u64) {
        match button {
            PointerButton::Primary => {
                let start = self.point(client_x, client_y);
                if start.is_degenerate() {
                    trace!("画布未挂载，忽略按下事件");
                    return;
                }
                self.state = GestureState::Armed { start };
                self.viewport.session.submit(SessionCommand::ClearHover);
            }
            PointerButton::Middle => {
                let within_window = self.last_middle_down.is_some_and(|previous| {
                    timestamp_ms.saturating_sub(previous) < self.settings.middle_double_click_ms
                });
                if within_window {
                    debug!("中键双击，适应视图");
                    self.last_middle_down = None;
                    self.pan = None;
                    self.viewport
                        .session
                        .submit(SessionCommand::Navigate(ViewportCommand::ZoomExtents));
                    return;
                }
                self.last_middle_down = Some(timestamp_ms);
                self.begin_pan(button, client_x, client_y);
            }
            PointerButton::Secondary => self.begin_pan(button, client_x, client_y),
        }
    }

    fn begin_pan(&mut self, button: PointerButton, client_x: f64, client_y: f64) {
        self.pan = Some(PanGesture {
            button,
            last_x: client_x,
            last_y: client_y,
        });
    }

    fn on_move(&mut self, client_x: f64, client_y: f64) {
        if let Some(pan) = self.pan.as_mut() {
            let dpr = sanitize_dpr(self.viewport.canvas.device_pixel_ratio());
            let dx = (client_x - pan.last_x) * dpr;
            let dy = (client_y - pan.last_y) * dpr;
            pan.last_x = client_x;
            pan.last_y = client_y;
            if dx != 0.0 || dy != 0.0 {
                self.viewport
                    .session
                    .submit(SessionCommand::Navigate(ViewportCommand::Pan { dx, dy }));
            }
            return;
        }

        let point = self.point(client_x, client_y);
        if point.is_degenerate() {
            return;
        }
        match self.state {
            GestureState::Idle => {
                self.viewport.session.submit(SessionCommand::Hover {
                    point: point.position(),
                    dpr: point.dpr,
                });
            }
            GestureState::Armed { start } => {
                if self.exceeds_threshold(start, point) {
                    trace!("超过拖拽阈值，进入框选");
                    self.state = GestureState::Dragging {
                        start,
                        current: point,
                    };
                    self.redraw_band();
                }
            }
            GestureState::Dragging { start, .. } => {
                self.state = GestureState::Dragging {
                    start,
                    current: point,
                };
                self.redraw_band();
            }
        }
    }

    /// 位移按 CSS 像素计；恰好等于阈值即视为拖拽。
    fn exceeds_threshold(&self, start: ViewportPoint, point: ViewportPoint) -> bool {
        let travelled =
            Vector2::from_points(start.position(), point.position()).length() / point.dpr;
        travelled >= self.settings.drag_threshold
    }

    fn redraw_band(&mut self) {
        if let GestureState::Dragging { start, current } = self.state {
            let rect = Rectangle::from_corners(start.position(), current.position());
            self.viewport
                .overlay
                .draw_rectangle(self.viewport.canvas.as_ref(), rect);
        }
    }

    fn on_up(&mut self, button: PointerButton, client_x: f64, client_y: f64, modifiers: Modifiers) {
        if button != PointerButton::Primary {
            if self.pan.is_some_and(|pan| pan.button == button) {
                self.pan = None;
            }
            return;
        }

        let state = std::mem::replace(&mut self.state, GestureState::Idle);
        self.viewport.overlay.clear();

        let additive = modifiers.additive();
        let release = self.point(client_x, client_y);
        let command = match state {
            GestureState::Idle => None,
            // 按下后没有移动事件就直接在远处松开，同样按框选结算。
            GestureState::Armed { start }
                if !release.is_degenerate() && self.exceeds_threshold(start, release) =>
            {
                Some(SessionCommand::Pick {
                    rect: Rectangle::from_corners(start.position(), release.position()),
                    kind: PickKind::Drag,
                    additive,
                })
            }
            GestureState::Armed { start } => {
                let radius = self.settings.click_radius * start.dpr;
                let center = start.position();
                Some(SessionCommand::Pick {
                    rect: Rectangle::around(center, radius),
                    kind: PickKind::Click {
                        center,
                        dpr: start.dpr,
                    },
                    additive,
                })
            }
            GestureState::Dragging { start, current } => {
                let end = if release.is_degenerate() {
                    current
                } else {
                    release
                };
                Some(SessionCommand::Pick {
                    rect: Rectangle::from_corners(start.position(), end.position()),
                    kind: PickKind::Drag,
                    additive,
                })
            }
        };
        if let Some(command) = command {
            debug!(additive, ?command, "指针手势完成");
            self.viewport.session.submit(command);
        }
    }

    fn on_leave(&mut self) {
        self.pan = None;
        // 拖拽中离开画布时保持手势，松开时照常结算。
        if self.state == GestureState::Idle {
            self.viewport.session.submit(SessionCommand::ClearHover);
        }
    }

    fn on_wheel(&mut self, client_x: f64, client_y: f64, delta_y: f64) {
        let point = self.point(client_x, client_y);
        if point.is_degenerate() {
            return;
        }
        self.frames.queue_wheel(delta_y, point.x, point.y);
    }

    fn on_resized(&mut self) {
        let canvas = self.viewport.canvas.as_ref();
        if let Some(rect) = canvas.bounding_rect() {
            self.frames
                .queue_resize(rect.width, rect.height, canvas.device_pixel_ratio());
        }
        self.redraw_band();
    }

    fn on_frame(&mut self) {
        for command in self.frames.flush() {
            self.viewport.session.submit(SessionCommand::Navigate(command));
        }
    }

    fn cancel_selection(&mut self) {
        self.state = GestureState::Idle;
        self.viewport.overlay.clear();
        self.viewport.session.submit(SessionCommand::Clear);
    }

    fn shutdown(&mut self) {
        self.state = GestureState::Idle;
        self.pan = None;
        self.last_middle_down = None;
        self.frames.cancel();
        self.viewport.overlay.clear();
        self.viewport.session.submit(SessionCommand::ClearHover);
        debug!(document = %self.viewport.session.document(), "指针路由器已解除挂接");
    }
}

/// 路由器挂接句柄。释放时自动解除挂接。
pub struct Attachment {
    router: Option<PointerRouter>,
}

impl Attachment {
    /// 转发事件；已解除挂接时返回 `false`。
    pub fn dispatch(&mut self, event: InputEvent) -> bool {
        match self.router.as_mut() {
            Some(router) => {
                router.handle(event);
                true
            }
            None => false,
        }
    }

    pub fn router(&self) -> Option<&PointerRouter> {
        self.router.as_ref()
    }

    pub fn is_attached(&self) -> bool {
        self.router.is_some()
    }

    pub fn detach(&mut self) {
        if let Some(mut router) = self.router.take() {
            router.shutdown();
        }
    }
}

impl Drop for Attachment {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::{CssRect, HeadlessCanvas};
    use crate::overlay::RecordingOverlay;
    use pidview_core::geometry::Point2;
    use pidview_core::handle::{DocumentId, Handle};
    use pidview_engine::memory::{BackendCall, MemoryBackend};
    use pidview_engine::selection::{SelectionController, SelectionSettings};

    struct Harness {
        backend: MemoryBackend,
        canvas: HeadlessCanvas,
        overlay: RecordingOverlay,
        session: ViewerSession,
        attachment: Attachment,
    }

    fn harness(dpr: f64) -> Harness {
        let backend = MemoryBackend::new();
        backend.populate_demo();
        let session = ViewerSession::new(DocumentId::new("router"));
        session
            .install(SelectionController::new(
                Box::new(backend.clone()),
                SelectionSettings::default(),
            ))
            .unwrap();
        let canvas = HeadlessCanvas::new(CssRect::new(0.0, 0.0, 400.0, 300.0), dpr);
        let overlay = RecordingOverlay::new();
        let attachment = PointerRouter::attach(
            Viewport {
                session: session.clone(),
                canvas: Box::new(canvas.clone()),
                overlay: SelectionOverlay::new(Box::new(overlay.clone())),
            },
            RouterSettings::default(),
        );
        backend.clear_calls();
        Harness {
            backend,
            canvas,
            overlay,
            session,
            attachment,
        }
    }

    fn down(button: PointerButton, x: f64, y: f64, timestamp_ms: u64) -> InputEvent {
        InputEvent::PointerDown {
            button,
            client_x: x,
            client_y: y,
            modifiers: Modifiers::NONE,
            timestamp_ms,
        }
    }

    fn up(button: PointerButton, x: f64, y: f64, modifiers: Modifiers) -> InputEvent {
        InputEvent::PointerUp {
            button,
            client_x: x,
            client_y: y,
            modifiers,
        }
    }

    fn moved(x: f64, y: f64) -> InputEvent {
        InputEvent::PointerMove {
            client_x: x,
            client_y: y,
        }
    }

    fn click(h: &mut Harness, x: f64, y: f64, modifiers: Modifiers) {
        h.attachment.dispatch(down(PointerButton::Primary, x, y, 0));
        h.attachment.dispatch(up(PointerButton::Primary, x, y, modifiers));
    }

    fn handle(raw: &str) -> Handle {
        Handle::new(raw).unwrap()
    }

    fn sorted(mut handles: Vec<Handle>) -> Vec<Handle> {
        handles.sort();
        handles
    }

    #[test]
    fn jitter_below_threshold_is_a_click() {
        let mut h = harness(1.0);
        h.attachment.dispatch(down(PointerButton::Primary, 130.0, 130.0, 0));
        h.attachment.dispatch(moved(132.0, 131.0));
        assert!(matches!(
            h.attachment.router().unwrap().state(),
            GestureState::Armed { .. }
        ));
        h.attachment
            .dispatch(up(PointerButton::Primary, 132.0, 131.0, Modifiers::NONE));

        assert_eq!(h.session.selection(), vec![handle("2A1")]);
        let expected = Rectangle::around(Point2::new(130.0, 130.0), 4.0);
        assert!(h.backend.calls().contains(&BackendCall::Select(expected)));
        assert_eq!(h.attachment.router().unwrap().state(), GestureState::Idle);
    }

    #[test]
    fn movement_of_exactly_the_threshold_starts_a_drag() {
        let mut h = harness(1.0);
        h.attachment.dispatch(down(PointerButton::Primary, 100.0, 100.0, 0));
        h.attachment.dispatch(moved(105.0, 100.0));
        assert!(matches!(
            h.attachment.router().unwrap().state(),
            GestureState::Dragging { .. }
        ));
        h.attachment
            .dispatch(up(PointerButton::Primary, 105.0, 100.0, Modifiers::NONE));

        let expected = Rectangle::from_corners(Point2::new(100.0, 100.0), Point2::new(105.0, 100.0));
        assert!(h.backend.calls().contains(&BackendCall::Select(expected)));
        let click = Rectangle::around(Point2::new(100.0, 100.0), 4.0);
        assert!(!h.backend.calls().contains(&BackendCall::Select(click)));
    }

    #[test]
    fn release_far_from_press_without_moves_is_a_drag() {
        let mut h = harness(1.0);
        h.attachment.dispatch(down(PointerButton::Primary, 90.0, 90.0, 0));
        h.attachment
            .dispatch(up(PointerButton::Primary, 220.0, 165.0, Modifiers::NONE));

        let expected = Rectangle::from_corners(Point2::new(90.0, 90.0), Point2::new(220.0, 165.0));
        let selects: Vec<BackendCall> = h
            .backend
            .calls()
            .into_iter()
            .filter(|call| matches!(call, BackendCall::Select(..)))
            .collect();
        assert_eq!(selects, vec![BackendCall::Select(expected)]);
        assert_eq!(
            sorted(h.session.selection()),
            sorted(vec![
                handle("2A1"),
                handle("2A2"),
                handle("4C0"),
                handle("4C1")
            ])
        );
    }

    #[test]
    fn release_distance_is_measured_in_css_pixels() {
        let mut h = harness(2.0);
        h.attachment.dispatch(down(PointerButton::Primary, 65.0, 65.0, 0));
        h.attachment
            .dispatch(up(PointerButton::Primary, 68.0, 65.0, Modifiers::NONE));
        let expected = Rectangle::around(Point2::new(130.0, 130.0), 8.0);
        assert!(h.backend.calls().contains(&BackendCall::Select(expected)));
    }

    #[test]
    fn click_radius_scales_with_dpr() {
        let mut h = harness(2.0);
        click(&mut h, 65.0, 65.0, Modifiers::NONE);
        let expected = Rectangle::around(Point2::new(130.0, 130.0), 8.0);
        assert!(h.backend.calls().contains(&BackendCall::Select(expected)));
        assert_eq!(h.session.selection(), vec![handle("2A1")]);
    }

    #[test]
    fn drag_draws_band_and_clears_it_on_release() {
        let mut h = harness(1.0);
        h.attachment.dispatch(down(PointerButton::Primary, 90.0, 90.0, 0));
        h.attachment.dispatch(moved(150.0, 120.0));
        assert_eq!(
            h.overlay.visible(),
            Some(Rectangle::from_corners(
                Point2::new(90.0, 90.0),
                Point2::new(150.0, 120.0)
            ))
        );
        h.attachment.dispatch(moved(220.0, 165.0));
        h.attachment
            .dispatch(up(PointerButton::Primary, 220.0, 165.0, Modifiers::NONE));

        assert_eq!(h.overlay.visible(), None);
        assert_eq!(
            sorted(h.session.selection()),
            sorted(vec![
                handle("2A1"),
                handle("2A2"),
                handle("4C0"),
                handle("4C1")
            ])
        );
    }

    #[test]
    fn modifiers_are_read_at_release() {
        let mut h = harness(1.0);
        click(&mut h, 130.0, 130.0, Modifiers::NONE);
        click(
            &mut h,
            310.0,
            130.0,
            Modifiers {
                ctrl: true,
                ..Modifiers::NONE
            },
        );
        assert_eq!(sorted(h.session.selection()), vec![handle("2A1"), handle("3B7")]);

        click(
            &mut h,
            130.0,
            130.0,
            Modifiers {
                meta: true,
                ..Modifiers::NONE
            },
        );
        assert_eq!(h.session.selection(), vec![handle("3B7")]);

        click(&mut h, 130.0, 130.0, Modifiers::NONE);
        assert_eq!(h.session.selection(), vec![handle("2A1")]);
    }

    #[test]
    fn middle_double_click_fits_view_instead_of_panning() {
        let mut h = harness(1.0);
        h.attachment.dispatch(down(PointerButton::Middle, 50.0, 50.0, 1_000));
        h.attachment
            .dispatch(up(PointerButton::Middle, 50.0, 50.0, Modifiers::NONE));
        h.attachment.dispatch(down(PointerButton::Middle, 50.0, 50.0, 1_300));
        assert!(!h.attachment.router().unwrap().is_panning());
        assert!(h.backend.calls().contains(&BackendCall::ZoomExtents));

        h.backend.clear_calls();
        h.attachment.dispatch(down(PointerButton::Middle, 50.0, 50.0, 2_000));
        h.attachment.dispatch(moved(53.0, 49.0));
        assert_eq!(h.backend.calls()[0], BackendCall::Pan(3.0, -1.0));
        assert!(!h.backend.calls().contains(&BackendCall::ZoomExtents));
    }

    #[test]
    fn secondary_button_pans_in_device_pixels() {
        let mut h = harness(2.0);
        h.attachment.dispatch(down(PointerButton::Secondary, 10.0, 10.0, 0));
        h.attachment.dispatch(moved(15.0, 12.0));
        h.attachment
            .dispatch(up(PointerButton::Secondary, 15.0, 12.0, Modifiers::NONE));
        h.attachment.dispatch(moved(20.0, 20.0));

        let pans: Vec<BackendCall> = h
            .backend
            .calls()
            .into_iter()
            .filter(|call| matches!(call, BackendCall::Pan(..)))
            .collect();
        assert_eq!(pans, vec![BackendCall::Pan(10.0, 4.0)]);
        assert!(h.session.selection().is_empty());
    }

    #[test]
    fn wheel_zoom_waits_for_the_animation_frame() {
        let mut h = harness(1.0);
        for delta_y in [-100.0, -50.0, 20.0] {
            h.attachment.dispatch(InputEvent::Wheel {
                client_x: 200.0,
                client_y: 150.0,
                delta_y,
            });
        }
        assert!(h.backend.calls().is_empty());

        h.attachment.dispatch(InputEvent::AnimationFrame);
        let zooms: Vec<BackendCall> = h
            .backend
            .calls()
            .into_iter()
            .filter(|call| matches!(call, BackendCall::ZoomAt(..)))
            .collect();
        assert_eq!(zooms, vec![BackendCall::ZoomAt(1.1, 200.0, 150.0)]);
    }

    #[test]
    fn resize_mid_drag_keeps_the_band_and_syncs_once_per_frame() {
        let mut h = harness(1.0);
        h.attachment.dispatch(down(PointerButton::Primary, 10.0, 10.0, 0));
        h.attachment.dispatch(moved(60.0, 40.0));
        let band = h.overlay.visible();
        assert!(band.is_some());

        h.canvas.set_rect(CssRect::new(0.0, 0.0, 500.0, 320.0));
        h.attachment.dispatch(InputEvent::Resized);
        h.canvas.set_rect(CssRect::new(0.0, 0.0, 640.0, 480.0));
        h.attachment.dispatch(InputEvent::Resized);

        assert_eq!(h.overlay.visible(), band);
        assert_eq!(h.overlay.current_size().width, 640);
        assert!(matches!(
            h.attachment.router().unwrap().state(),
            GestureState::Dragging { .. }
        ));

        h.attachment.dispatch(InputEvent::AnimationFrame);
        let resizes: Vec<BackendCall> = h
            .backend
            .calls()
            .into_iter()
            .filter(|call| matches!(call, BackendCall::Resize(..)))
            .collect();
        assert_eq!(resizes, vec![BackendCall::Resize(640, 480)]);
    }

    #[test]
    fn escape_clears_selection_and_band() {
        let mut h = harness(1.0);
        click(&mut h, 130.0, 130.0, Modifiers::NONE);
        h.attachment.dispatch(down(PointerButton::Primary, 10.0, 10.0, 0));
        h.attachment.dispatch(moved(60.0, 60.0));
        h.attachment.dispatch(InputEvent::Escape);

        assert!(h.session.selection().is_empty());
        assert_eq!(h.overlay.visible(), None);
        assert_eq!(h.attachment.router().unwrap().state(), GestureState::Idle);
    }

    #[test]
    fn unmounted_canvas_turns_gestures_into_noops() {
        let mut h = harness(1.0);
        h.canvas.unmount();
        click(&mut h, 130.0, 130.0, Modifiers::NONE);
        assert!(h.session.selection().is_empty());
        assert!(h.backend.calls().is_empty());
    }

    #[test]
    fn detached_router_ignores_events() {
        let mut h = harness(1.0);
        h.attachment.dispatch(down(PointerButton::Primary, 10.0, 10.0, 0));
        h.attachment.dispatch(moved(60.0, 60.0));
        h.attachment.detach();

        assert!(!h.attachment.is_attached());
        assert_eq!(h.overlay.visible(), None);
        assert!(!h.attachment.dispatch(up(PointerButton::Primary, 60.0, 60.0, Modifiers::NONE)));
        assert!(h.session.selection().is_empty());
    }
}
