//! 内存渲染引擎：不做任何绘制，只按包围矩形维护实体与颜色。
//! CLI 演示和测试都通过它驱动选择引擎。

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use pidview_core::color::{ColorValue, EntityColor, Rgb};
use pidview_core::entity::{EntityKind, EntityProps, LayerInfo};
use pidview_core::geometry::{Bounds2D, Point2, Rectangle};
use pidview_core::handle::{EntityRef, Handle};
use tracing::debug;

use crate::backend::RenderBackend;
use crate::errors::BackendError;

/// 待插入内存引擎的实体描述。
#[derive(Debug, Clone)]
pub struct EntitySpec {
    handle: Handle,
    kind: EntityKind,
    class_name: Option<String>,
    layer: Option<LayerInfo>,
    color: EntityColor,
    bounds: Rectangle,
}

impl EntitySpec {
    pub fn new(handle: Handle, kind: EntityKind, bounds: Rectangle) -> Self {
        Self {
            handle,
            kind,
            class_name: None,
            layer: None,
            color: EntityColor::indexed(7),
            bounds: bounds.normalized(),
        }
    }

    pub fn class_name(mut self, name: impl Into<String>) -> Self {
        self.class_name = Some(name.into());
        self
    }

    pub fn layer(mut self, name: impl Into<String>, color: Option<Rgb>) -> Self {
        self.layer = Some(LayerInfo {
            name: name.into(),
            color,
        });
        self
    }

    pub fn color(mut self, color: EntityColor) -> Self {
        self.color = color;
        self
    }
}

#[derive(Debug, Clone)]
struct MemoryEntity {
    spec: EntitySpec,
    live_color: ColorValue,
}

/// 引擎调用记录，测试据此断言调用次数与顺序。
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Select(Rectangle),
    Unselect,
    SetColor(Handle, ColorValue),
    Pan(f64, f64),
    ZoomAt(f64, f64, f64),
    ZoomToEntity(Handle),
    ZoomExtents,
    Resize(u32, u32),
    Update,
}

#[derive(Debug, Default)]
struct MemoryState {
    entities: Vec<MemoryEntity>,
    engine_selection: Vec<EntityRef>,
    stale: HashSet<EntityRef>,
    unavailable: bool,
    calls: Vec<BackendCall>,
}

impl MemoryState {
    fn entity(&self, entity: EntityRef) -> Result<&MemoryEntity, BackendError> {
        if self.unavailable {
            return Err(BackendError::Unavailable);
        }
        if self.stale.contains(&entity) {
            return Err(BackendError::StaleReference);
        }
        usize::try_from(entity.get())
            .ok()
            .and_then(|index| self.entities.get(index))
            .ok_or(BackendError::StaleReference)
    }

    fn ensure_available(&self) -> Result<(), BackendError> {
        if self.unavailable {
            Err(BackendError::Unavailable)
        } else {
            Ok(())
        }
    }
}

/// 演示文档中的关键句柄。
#[derive(Debug, Clone)]
pub struct DemoEntities {
    pub pump: Handle,
    pub pump_motor: Handle,
    pub valve: Handle,
    pub suction_line: Handle,
    pub discharge_line: Handle,
    pub tag_label: Handle,
}

/// 可克隆的共享句柄；克隆体观察同一份状态，便于把引擎交给会话后继续检查。
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Rc<RefCell<MemoryState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, spec: EntitySpec) -> EntityRef {
        let mut state = self.state.borrow_mut();
        let entity = EntityRef::new(state.entities.len() as u64);
        let live_color = spec.color.value();
        state.entities.push(MemoryEntity { spec, live_color });
        entity
    }

    /// 当前屏幕上的颜色。
    pub fn live_color(&self, handle: &Handle) -> Option<ColorValue> {
        let state = self.state.borrow();
        state
            .entities
            .iter()
            .find(|entity| &entity.spec.handle == handle)
            .map(|entity| entity.live_color)
    }

    /// 模拟文档重载后引用失效。
    pub fn invalidate(&self, handle: &Handle) {
        let mut state = self.state.borrow_mut();
        let stale: Vec<EntityRef> = state
            .entities
            .iter()
            .enumerate()
            .filter(|(_, entity)| &entity.spec.handle == handle)
            .map(|(index, _)| EntityRef::new(index as u64))
            .collect();
        state.stale.extend(stale);
    }

    pub fn set_available(&self, available: bool) {
        self.state.borrow_mut().unavailable = !available;
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    /// 颜色写入次数。
    pub fn color_writes(&self) -> usize {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|call| matches!(call, BackendCall::SetColor(..)))
            .count()
    }

    /// 构建一张小型 P&ID 示例：泵（块参照）、电机、阀门、两段管线与位号文字。
    pub fn populate_demo(&self) -> DemoEntities {
        let handle = Handle::from_static;
        let rect = |x1: f64, y1: f64, x2: f64, y2: f64| Rectangle { x1, y1, x2, y2 };
        let equipment = Some(Rgb::new(0, 255, 255));
        let piping = Some(Rgb::new(0, 255, 0));

        let ids = DemoEntities {
            pump: handle("2A1"),
            pump_motor: handle("2A2"),
            valve: handle("3B7"),
            suction_line: handle("4C0"),
            discharge_line: handle("4C1"),
            tag_label: handle("5D3"),
        };

        self.add(
            EntitySpec::new(ids.pump.clone(), EntityKind::Insert, rect(100.0, 100.0, 160.0, 160.0))
                .class_name("AcDbBlockReference")
                .layer("EQUIPMENT", equipment)
                .color(EntityColor::indexed(4)),
        );
        self.add(
            EntitySpec::new(ids.pump_motor.clone(), EntityKind::Insert, rect(170.0, 110.0, 210.0, 150.0))
                .class_name("AcDbBlockReference")
                .layer("EQUIPMENT", equipment)
                .color(EntityColor::indexed(4)),
        );
        self.add(
            EntitySpec::new(ids.valve.clone(), EntityKind::Insert, rect(300.0, 120.0, 320.0, 140.0))
                .class_name("AcDbBlockReference")
                .layer("VALVE", None)
                .color(EntityColor::rgb(Rgb::new(200, 200, 200))),
        );
        self.add(
            EntitySpec::new(ids.suction_line.clone(), EntityKind::Entity, rect(20.0, 129.0, 100.0, 131.0))
                .class_name("AcDbLine")
                .layer("PIPE", piping)
                .color(EntityColor::indexed(3)),
        );
        self.add(
            EntitySpec::new(ids.discharge_line.clone(), EntityKind::Entity, rect(160.0, 129.0, 300.0, 131.0))
                .class_name("AcDbPolyline")
                .layer("PIPE", piping)
                .color(EntityColor::indexed(3)),
        );
        self.add(
            EntitySpec::new(ids.tag_label.clone(), EntityKind::Entity, rect(110.0, 170.0, 150.0, 180.0))
                .class_name("AcDbMText")
                .layer("ANNOT", None)
                .color(EntityColor::default()),
        );

        debug!(pump = %ids.pump, valve = %ids.valve, "已创建演示实体");
        ids
    }
}

impl RenderBackend for MemoryBackend {
    fn select(&mut self, rect: Rectangle) -> Result<(), BackendError> {
        let mut state = self.state.borrow_mut();
        state.ensure_available()?;
        state.calls.push(BackendCall::Select(rect));
        let hits: Vec<EntityRef> = state
            .entities
            .iter()
            .enumerate()
            .filter(|(_, entity)| entity.spec.bounds.intersects(&rect))
            .map(|(index, _)| EntityRef::new(index as u64))
            .collect();
        for hit in hits {
            if !state.engine_selection.contains(&hit) {
                state.engine_selection.push(hit);
            }
        }
        Ok(())
    }

    fn unselect(&mut self) -> Result<(), BackendError> {
        let mut state = self.state.borrow_mut();
        state.ensure_available()?;
        state.calls.push(BackendCall::Unselect);
        state.engine_selection.clear();
        Ok(())
    }

    fn selected(&self) -> Result<Vec<EntityRef>, BackendError> {
        let state = self.state.borrow();
        state.ensure_available()?;
        Ok(state.engine_selection.clone())
    }

    fn entity_handle(&self, entity: EntityRef) -> Result<Handle, BackendError> {
        let state = self.state.borrow();
        state.entity(entity).map(|entity| entity.spec.handle.clone())
    }

    fn open_entity(&self, entity: EntityRef) -> Result<EntityProps, BackendError> {
        let state = self.state.borrow();
        let entity = state.entity(entity)?;
        Ok(EntityProps {
            handle: entity.spec.handle.clone(),
            kind: entity.spec.kind,
            class_name: entity.spec.class_name.clone(),
            layer: entity.spec.layer.clone(),
            color: entity.spec.color,
        })
    }

    fn set_entity_color(
        &mut self,
        entity: EntityRef,
        color: ColorValue,
    ) -> Result<(), BackendError> {
        let mut state = self.state.borrow_mut();
        let handle = state.entity(entity)?.spec.handle.clone();
        state.calls.push(BackendCall::SetColor(handle, color));
        let index = entity.get() as usize;
        if let Some(target) = state.entities.get_mut(index) {
            target.live_color = color;
        }
        Ok(())
    }

    fn resolve_handle(&self, handle: &Handle) -> Option<EntityRef> {
        let state = self.state.borrow();
        if state.unavailable {
            return None;
        }
        state
            .entities
            .iter()
            .position(|entity| &entity.spec.handle == handle)
            .map(|index| EntityRef::new(index as u64))
            .filter(|entity| !state.stale.contains(entity))
    }

    fn entity_extents(&self, entity: EntityRef) -> Option<Bounds2D> {
        let state = self.state.borrow();
        let entity = state.entity(entity).ok()?;
        let bounds = entity.spec.bounds;
        Some(Bounds2D::new(
            Point2::new(bounds.x1, bounds.y1),
            Point2::new(bounds.x2, bounds.y2),
        ))
    }

    fn pan(&mut self, dx: f64, dy: f64) -> Result<(), BackendError> {
        let mut state = self.state.borrow_mut();
        state.ensure_available()?;
        state.calls.push(BackendCall::Pan(dx, dy));
        Ok(())
    }

    fn zoom_at(&mut self, factor: f64, x: f64, y: f64) -> Result<(), BackendError> {
        let mut state = self.state.borrow_mut();
        state.ensure_available()?;
        state.calls.push(BackendCall::ZoomAt(factor, x, y));
        Ok(())
    }

    fn zoom_to_entity(&mut self, entity: EntityRef) -> Result<(), BackendError> {
        let mut state = self.state.borrow_mut();
        let handle = state.entity(entity)?.spec.handle.clone();
        state.calls.push(BackendCall::ZoomToEntity(handle));
        Ok(())
    }

    fn zoom_extents(&mut self) -> Result<(), BackendError> {
        let mut state = self.state.borrow_mut();
        state.ensure_available()?;
        state.calls.push(BackendCall::ZoomExtents);
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), BackendError> {
        let mut state = self.state.borrow_mut();
        state.ensure_available()?;
        state.calls.push(BackendCall::Resize(width, height));
        Ok(())
    }

    fn update(&mut self) -> Result<(), BackendError> {
        let mut state = self.state.borrow_mut();
        state.ensure_available()?;
        state.calls.push(BackendCall::Update);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_select_hits_intersecting_entities() {
        let mut backend = MemoryBackend::new();
        let ids = backend.populate_demo();

        backend
            .select(Rectangle {
                x1: 90.0,
                y1: 90.0,
                x2: 165.0,
                y2: 165.0,
            })
            .unwrap();
        let handles: Vec<Handle> = backend
            .selected()
            .unwrap()
            .into_iter()
            .map(|entity| backend.entity_handle(entity).unwrap())
            .collect();
        assert!(handles.contains(&ids.pump));
        assert!(handles.contains(&ids.suction_line));
        assert!(!handles.contains(&ids.valve));

        backend.unselect().unwrap();
        assert!(backend.selected().unwrap().is_empty());
    }

    #[test]
    fn invalidated_entities_report_stale() {
        let mut backend = MemoryBackend::new();
        let ids = backend.populate_demo();
        let entity = backend.resolve_handle(&ids.valve).expect("valve exists");

        backend.invalidate(&ids.valve);
        assert!(backend.resolve_handle(&ids.valve).is_none());
        assert_eq!(
            backend.set_entity_color(entity, ColorValue::Indexed(1)),
            Err(BackendError::StaleReference)
        );
        assert_eq!(backend.color_writes(), 0);
    }
}
