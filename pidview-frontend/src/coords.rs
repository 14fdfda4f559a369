use std::cell::Cell;
use std::rc::Rc;

use pidview_core::geometry::ViewportPoint;

/// 画布在页面中的 CSS 包围盒。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CssRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl CssRect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }
}

/// 宿主画布的只读视图。每次调用都应返回当前值，容器可能随时改变尺寸。
pub trait CanvasSurface {
    /// 未挂载时返回 `None`。
    fn bounding_rect(&self) -> Option<CssRect>;
    fn device_pixel_ratio(&self) -> f64;
}

/// 把客户区坐标换算为设备像素视口坐标。
///
/// 包围盒与像素比在每次调用时重新读取；画布未挂载时返回
/// [`ViewportPoint::DEGENERATE`]，调用方应把该手势当作空操作。
pub fn to_viewport_point(
    canvas: &dyn CanvasSurface,
    client_x: f64,
    client_y: f64,
) -> ViewportPoint {
    let Some(rect) = canvas.bounding_rect() else {
        return ViewportPoint::DEGENERATE;
    };
    let dpr = sanitize_dpr(canvas.device_pixel_ratio());
    ViewportPoint::new((client_x - rect.left) * dpr, (client_y - rect.top) * dpr, dpr)
}

/// 非法像素比按 1 处理。
pub fn sanitize_dpr(dpr: f64) -> f64 {
    if dpr.is_finite() && dpr > 0.0 { dpr } else { 1.0 }
}

#[derive(Debug)]
struct CanvasState {
    rect: Cell<Option<CssRect>>,
    dpr: Cell<f64>,
}

/// 无窗口环境下的画布，克隆体共享同一份尺寸，便于模拟容器缩放与卸载。
#[derive(Debug, Clone)]
pub struct HeadlessCanvas {
    state: Rc<CanvasState>,
}

impl HeadlessCanvas {
    pub fn new(rect: CssRect, dpr: f64) -> Self {
        Self {
            state: Rc::new(CanvasState {
                rect: Cell::new(Some(rect)),
                dpr: Cell::new(dpr),
            }),
        }
    }

    pub fn set_rect(&self, rect: CssRect) {
        self.state.rect.set(Some(rect));
    }

    pub fn set_dpr(&self, dpr: f64) {
        self.state.dpr.set(dpr);
    }

    pub fn unmount(&self) {
        self.state.rect.set(None);
    }
}

impl CanvasSurface for HeadlessCanvas {
    fn bounding_rect(&self) -> Option<CssRect> {
        self.state.rect.get()
    }

    fn device_pixel_ratio(&self) -> f64 {
        self.state.dpr.get()
    }
}
