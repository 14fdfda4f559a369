use pidview_core::color::ColorValue;
use pidview_core::entity::EntityProps;
use pidview_core::geometry::{Bounds2D, Rectangle};
use pidview_core::handle::{EntityRef, Handle};

use crate::errors::BackendError;

/// 渲染引擎对选择引擎暴露的能力面。
///
/// 引擎本身的几何、光栅化流程不在这里实现；这里只声明选择、实体属性读写和视口变换。
/// 所有坐标均为设备像素视口坐标。实现可以是单线程的，不要求 `Send`。
pub trait RenderBackend {
    /// 框选。不返回结果，只修改引擎内部的“当前选中”状态。
    fn select(&mut self, rect: Rectangle) -> Result<(), BackendError>;

    fn unselect(&mut self) -> Result<(), BackendError>;

    /// 引擎自身的选中集，应在 `select` 之后立即读取。
    fn selected(&self) -> Result<Vec<EntityRef>, BackendError>;

    /// 只读取句柄，不触碰颜色等其他属性。
    fn entity_handle(&self, entity: EntityRef) -> Result<Handle, BackendError>;

    /// 打开实体并一次性读出类型、图层与颜色。
    fn open_entity(&self, entity: EntityRef) -> Result<EntityProps, BackendError>;

    fn set_entity_color(&mut self, entity: EntityRef, color: ColorValue)
    -> Result<(), BackendError>;

    /// 按句柄查找实体引用，供外部推送的高亮在未经过框选时解析实体。
    fn resolve_handle(&self, handle: &Handle) -> Option<EntityRef>;

    fn entity_extents(&self, entity: EntityRef) -> Option<Bounds2D>;

    fn pan(&mut self, dx: f64, dy: f64) -> Result<(), BackendError>;

    fn zoom_at(&mut self, factor: f64, x: f64, y: f64) -> Result<(), BackendError>;

    fn zoom_to_entity(&mut self, entity: EntityRef) -> Result<(), BackendError>;

    fn zoom_extents(&mut self) -> Result<(), BackendError>;

    fn resize(&mut self, width: u32, height: u32) -> Result<(), BackendError>;

    /// 刷新渲染。
    fn update(&mut self) -> Result<(), BackendError>;
}

/// 视口导航命令，平移与缩放均使用设备像素。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewportCommand {
    Pan { dx: f64, dy: f64 },
    ZoomAt { factor: f64, x: f64, y: f64 },
    ZoomExtents,
    Resize { width: u32, height: u32 },
}

impl ViewportCommand {
    pub fn apply(self, backend: &mut dyn RenderBackend) -> Result<(), BackendError> {
        match self {
            ViewportCommand::Pan { dx, dy } => backend.pan(dx, dy)?,
            ViewportCommand::ZoomAt { factor, x, y } => backend.zoom_at(factor, x, y)?,
            ViewportCommand::ZoomExtents => backend.zoom_extents()?,
            ViewportCommand::Resize { width, height } => backend.resize(width, height)?,
        }
        backend.update()
    }
}
