use std::cell::RefCell;
use std::rc::Rc;

use pidview_core::color::Rgb;
use pidview_core::geometry::Rectangle;
use tracing::trace;

use crate::coords::{CanvasSurface, sanitize_dpr};

/// 橡皮筋框的描边与填充样式。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStyle {
    pub stroke: Rgb,
    pub fill: Rgb,
    pub fill_alpha: f32,
    pub line_width: f64,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            stroke: Rgb::new(0x25, 0x63, 0xeb),
            fill: Rgb::new(0x25, 0x63, 0xeb),
            fill_alpha: 0.12,
            line_width: 1.0,
        }
    }
}

/// 叠加层尺寸：CSS 尺寸与设备像素后备尺寸。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlaySize {
    pub css_width: f64,
    pub css_height: f64,
    pub width: u32,
    pub height: u32,
}

impl OverlaySize {
    pub const ZERO: OverlaySize = OverlaySize {
        css_width: 0.0,
        css_height: 0.0,
        width: 0,
        height: 0,
    };

    /// 后备尺寸为 `floor(css * dpr)`。
    pub fn from_css(css_width: f64, css_height: f64, dpr: f64) -> Self {
        let dpr = sanitize_dpr(dpr);
        Self {
            css_width,
            css_height,
            width: backing_extent(css_width, dpr),
            height: backing_extent(css_height, dpr),
        }
    }
}

pub fn backing_extent(css: f64, dpr: f64) -> u32 {
    let value = (css * dpr).floor();
    if value.is_finite() && value > 0.0 {
        value.min(u32::MAX as f64) as u32
    } else {
        0
    }
}

/// 宿主提供的透明绘图层。矩形坐标为设备像素。
pub trait OverlaySurface {
    fn size(&self) -> OverlaySize;
    /// 调整尺寸，同时清空已有内容。
    fn set_size(&mut self, size: OverlaySize);
    fn clear(&mut self);
    fn draw_rect(&mut self, rect: Rectangle, style: &OverlayStyle);
}

/// 框选叠加层。自身不持有任何选中状态，每次绘制前都与画布尺寸重新同步。
pub struct SelectionOverlay {
    surface: Box<dyn OverlaySurface>,
    style: OverlayStyle,
}

impl SelectionOverlay {
    pub fn new(surface: Box<dyn OverlaySurface>) -> Self {
        Self::with_style(surface, OverlayStyle::default())
    }

    pub fn with_style(surface: Box<dyn OverlaySurface>, style: OverlayStyle) -> Self {
        Self { surface, style }
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    /// 与画布尺寸同步；画布未挂载时不做处理。
    pub fn resync(&mut self, canvas: &dyn CanvasSurface) {
        let Some(rect) = canvas.bounding_rect() else {
            return;
        };
        let size = OverlaySize::from_css(rect.width, rect.height, canvas.device_pixel_ratio());
        if size != self.surface.size() {
            trace!(width = size.width, height = size.height, "叠加层尺寸已同步");
            self.surface.set_size(size);
        }
    }

    pub fn draw_rectangle(&mut self, canvas: &dyn CanvasSurface, rect: Rectangle) {
        self.resync(canvas);
        self.surface.clear();
        self.surface.draw_rect(rect.normalized(), &self.style);
    }

    pub fn clear(&mut self) {
        self.surface.clear();
    }
}

/// 记录式叠加层的绘制操作。
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayOp {
    Resize(u32, u32),
    Clear,
    Rect(Rectangle),
}

#[derive(Debug)]
struct RecordingState {
    size: OverlaySize,
    visible: Option<Rectangle>,
    ops: Vec<OverlayOp>,
}

/// 无窗口环境下的叠加层，记录每次操作并保留当前可见的矩形。
#[derive(Debug, Clone)]
pub struct RecordingOverlay {
    state: Rc<RefCell<RecordingState>>,
}

impl Default for RecordingOverlay {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingOverlay {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(RecordingState {
                size: OverlaySize::ZERO,
                visible: None,
                ops: Vec::new(),
            })),
        }
    }

    pub fn visible(&self) -> Option<Rectangle> {
        self.state.borrow().visible
    }

    pub fn current_size(&self) -> OverlaySize {
        self.state.borrow().size
    }

    pub fn ops(&self) -> Vec<OverlayOp> {
        self.state.borrow().ops.clone()
    }
}

impl OverlaySurface for RecordingOverlay {
    fn size(&self) -> OverlaySize {
        self.state.borrow().size
    }

    fn set_size(&mut self, size: OverlaySize) {
        let mut state = self.state.borrow_mut();
        state.size = size;
        state.visible = None;
        state.ops.push(OverlayOp::Resize(size.width, size.height));
    }

    fn clear(&mut self) {
        let mut state = self.state.borrow_mut();
        state.visible = None;
        state.ops.push(OverlayOp::Clear);
    }

    fn draw_rect(&mut self, rect: Rectangle, _style: &OverlayStyle) {
        let mut state = self.state.borrow_mut();
        state.visible = Some(rect);
        state.ops.push(OverlayOp::Rect(rect));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::{CssRect, HeadlessCanvas};

    fn rect(x1: f64, y1: f64, x2: f64, y2: f64) -> Rectangle {
        Rectangle { x1, y1, x2, y2 }
    }

    #[test]
    fn backing_size_floors_css_times_dpr() {
        let size = OverlaySize::from_css(100.5, 33.3, 1.5);
        assert_eq!((size.width, size.height), (150, 49));
        assert_eq!(backing_extent(-4.0, 2.0), 0);
    }

    #[test]
    fn draw_resyncs_before_painting() {
        let canvas = HeadlessCanvas::new(CssRect::new(0.0, 0.0, 200.0, 100.0), 2.0);
        let surface = RecordingOverlay::new();
        let mut overlay = SelectionOverlay::new(Box::new(surface.clone()));

        overlay.draw_rectangle(&canvas, rect(30.0, 40.0, 10.0, 20.0));
        assert_eq!(surface.current_size().width, 400);
        assert_eq!(surface.visible(), Some(rect(10.0, 20.0, 30.0, 40.0)));

        canvas.set_rect(CssRect::new(0.0, 0.0, 300.0, 100.0));
        overlay.draw_rectangle(&canvas, rect(10.0, 20.0, 50.0, 60.0));
        assert_eq!(surface.current_size().width, 600);
        assert_eq!(surface.visible(), Some(rect(10.0, 20.0, 50.0, 60.0)));

        let resizes = surface
            .ops()
            .iter()
            .filter(|op| matches!(op, OverlayOp::Resize(..)))
            .count();
        assert_eq!(resizes, 2);
    }

    #[test]
    fn clear_removes_visible_rectangle() {
        let canvas = HeadlessCanvas::new(CssRect::new(0.0, 0.0, 50.0, 50.0), 1.0);
        let surface = RecordingOverlay::new();
        let mut overlay = SelectionOverlay::new(Box::new(surface.clone()));
        overlay.draw_rectangle(&canvas, rect(1.0, 1.0, 5.0, 5.0));
        overlay.clear();
        assert_eq!(surface.visible(), None);
        assert_eq!(overlay.style().fill_alpha, 0.12);
    }
}
