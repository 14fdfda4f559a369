use std::collections::HashSet;

use pidview_core::color::{ColorOption, ColorValue, Rgb};
use pidview_core::entity::EntityRecord;
use pidview_core::equipment::{EquipmentIndex, EquipmentInfoEntry};
use pidview_core::geometry::{Bounds2D, Point2, Rectangle};
use pidview_core::handle::{EntityRef, Handle};
use pidview_core::mode::{SelectionPolicy, ViewerMode};
use pidview_core::request::{HighlightRequest, SelectionChanged};
use tracing::{debug, trace, warn};

use crate::backend::{RenderBackend, ViewportCommand};
use crate::cache::EntityMetadataCache;
use crate::color::{ColorOverrideManager, RestoreSummary};
use crate::errors::{BackendError, EngineError};

/// 有序且无重复的句柄集合，顺序只用于稳定的列表展示。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    handles: Vec<Handle>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn contains(&self, handle: &Handle) -> bool {
        self.handles.contains(handle)
    }

    /// 返回是否为新插入。
    pub fn insert(&mut self, handle: Handle) -> bool {
        if self.contains(&handle) {
            return false;
        }
        self.handles.push(handle);
        true
    }

    pub fn remove(&mut self, handle: &Handle) -> bool {
        let before = self.handles.len();
        self.handles.retain(|existing| existing != handle);
        before != self.handles.len()
    }

    /// 切换成员关系，返回切换后是否处于选中状态。
    pub fn toggle(&mut self, handle: Handle) -> bool {
        if self.remove(&handle) {
            false
        } else {
            self.handles.push(handle);
            true
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[Handle] {
        &self.handles
    }

    pub fn iter(&self) -> impl Iterator<Item = &Handle> + '_ {
        self.handles.iter()
    }

    pub fn take(&mut self) -> Vec<Handle> {
        std::mem::take(&mut self.handles)
    }
}

/// 选择控制器的运行参数，由配置层填充。
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionSettings {
    pub mode: ViewerMode,
    pub highlight_color: ColorValue,
    pub hover_color: ColorValue,
    pub equipment_color: ColorValue,
    pub click_radius: f64,
    pub pick_escalation: Vec<f64>,
    pub focus_zoom_factor: f64,
}

impl Default for SelectionSettings {
    fn default() -> Self {
        Self {
            mode: ViewerMode::default(),
            highlight_color: ColorValue::Rgb(Rgb::new(255, 0, 0)),
            hover_color: ColorValue::Rgb(Rgb::new(255, 170, 0)),
            equipment_color: ColorValue::Rgb(Rgb::new(0, 160, 255)),
            click_radius: 4.0,
            pick_escalation: vec![6.0, 10.0],
            focus_zoom_factor: 0.2,
        }
    }
}

/// 框选手势的来源形态。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PickKind {
    /// 单击：矩形是以 `center` 为中心的基础半径方块。
    Click { center: Point2, dpr: f64 },
    Drag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionOrigin {
    Pointer,
    External,
    Recolor,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionState {
    Empty,
    HasSelection,
}

/// 每次选中集变化后同步发给观察者的事件。
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionEvent {
    pub message: SelectionChanged,
    pub records: Vec<EntityRecord>,
    pub equipment: Vec<EquipmentInfoEntry>,
    pub origin: SelectionOrigin,
}

/// 单个文档的选择状态机。持有该文档的引擎实例、元数据缓存与颜色层。
///
/// 每次 [`SelectionController::apply_request`] 依次完成：缓存填充、颜色施加/恢复、
/// 生成观察者事件。调用方以 `&mut self` 串行调用，因此两次应用不会交错。
pub struct SelectionController {
    backend: Box<dyn RenderBackend>,
    cache: EntityMetadataCache,
    colors: ColorOverrideManager,
    selection: SelectionSet,
    equipment: EquipmentIndex,
    settings: SelectionSettings,
    viewport: (u32, u32),
}

impl SelectionController {
    pub fn new(backend: Box<dyn RenderBackend>, settings: SelectionSettings) -> Self {
        Self {
            backend,
            cache: EntityMetadataCache::new(),
            colors: ColorOverrideManager::new(),
            selection: SelectionSet::new(),
            equipment: EquipmentIndex::new(),
            settings,
            viewport: (0, 0),
        }
    }

    #[inline]
    pub fn settings(&self) -> &SelectionSettings {
        &self.settings
    }

    #[inline]
    pub fn policy(&self) -> SelectionPolicy {
        self.settings.mode.policy()
    }

    #[inline]
    pub fn state(&self) -> SelectionState {
        if self.selection.is_empty() {
            SelectionState::Empty
        } else {
            SelectionState::HasSelection
        }
    }

    #[inline]
    pub fn selection(&self) -> &[Handle] {
        self.selection.as_slice()
    }

    #[inline]
    pub fn cache(&self) -> &EntityMetadataCache {
        &self.cache
    }

    #[inline]
    pub fn colors(&self) -> &ColorOverrideManager {
        &self.colors
    }

    #[inline]
    pub fn equipment(&self) -> &EquipmentIndex {
        &self.equipment
    }

    pub fn set_equipment_index(&mut self, index: EquipmentIndex) {
        self.equipment = index;
    }

    pub fn records(&self) -> Vec<EntityRecord> {
        self.cache.snapshot(self.selection.as_slice())
    }

    pub fn record(&mut self, handle: &Handle) -> Result<EntityRecord, EngineError> {
        self.resolve(handle)
            .and_then(|_| self.cache.get(handle).cloned())
            .ok_or_else(|| EngineError::StaleReference(handle.clone()))
    }

    /// 替换或切换选中集，不附带颜色与面板选项。
    pub fn apply_selection(&mut self, handles: &[Handle], additive: bool) -> SelectionEvent {
        let request = HighlightRequest {
            handles: handles.to_vec(),
            additive,
            ..HighlightRequest::default()
        };
        self.apply_request(&request, SelectionOrigin::External)
    }

    pub fn apply_request(
        &mut self,
        request: &HighlightRequest,
        origin: SelectionOrigin,
    ) -> SelectionEvent {
        let handles = self.prepare_handles(&request.handles);
        let color = request.color.unwrap_or(self.settings.highlight_color);

        let (added, removed) = if request.additive {
            self.toggle_groups(&handles)
        } else {
            let incoming: HashSet<&Handle> = handles.iter().collect();
            let removed: Vec<Handle> = self
                .selection
                .iter()
                .filter(|handle| !incoming.contains(handle))
                .cloned()
                .collect();
            self.selection = SelectionSet::new();
            for handle in &handles {
                self.selection.insert(handle.clone());
            }
            (handles, removed)
        };

        for handle in &removed {
            self.colors
                .unhighlight(&mut self.cache, self.backend.as_mut(), handle);
        }
        for handle in &added {
            self.colors
                .highlight(&mut self.cache, self.backend.as_mut(), handle, color);
        }
        if !added.is_empty() || !removed.is_empty() {
            self.flush();
        }

        debug!(
            added = added.len(),
            removed = removed.len(),
            selected = self.selection.len(),
            additive = request.additive,
            ?origin,
            "选中集已更新"
        );
        self.event(request.additive, request.open_detail_panel, origin)
    }

    /// 清空选中集并撤销全部瞬时高亮。引擎失效时错误被吞掉。
    pub fn clear(&mut self, origin: SelectionOrigin) -> SelectionEvent {
        self.apply_request(&HighlightRequest::default(), origin)
    }

    /// 框选或单击拾取。拖拽在当前模式不允许时直接忽略，返回 `None`。
    pub fn pick(
        &mut self,
        rect: Rectangle,
        kind: PickKind,
        additive: bool,
    ) -> Option<SelectionEvent> {
        if kind == PickKind::Drag && !self.policy().allow_drag_select {
            debug!(mode = ?self.settings.mode, "当前模式不支持框选，忽略拖拽");
            return None;
        }

        let mut hits = self.collect_in(rect.normalized());
        if let PickKind::Click { center, dpr } = kind {
            let escalation = self.settings.pick_escalation.clone();
            for radius in escalation {
                if !hits.is_empty() {
                    break;
                }
                trace!(radius, "单击未命中，扩大拾取半径");
                hits = self.collect_in(Rectangle::around(center, radius * dpr));
            }
        }

        let handles: Vec<Handle> = hits.into_iter().map(|(handle, _)| handle).collect();
        let request = HighlightRequest {
            handles,
            additive,
            color: None,
            open_detail_panel: true,
        };
        Some(self.apply_request(&request, SelectionOrigin::Pointer))
    }

    /// 悬停探测。返回当前悬停的句柄组，模式不支持悬停时恒为空。
    pub fn hover_at(&mut self, point: Point2, dpr: f64) -> Vec<Handle> {
        if !self.policy().allow_hover {
            return Vec::new();
        }
        let rect = Rectangle::around(point, self.settings.click_radius * dpr);
        let candidate = self
            .collect_in(rect)
            .into_iter()
            .map(|(handle, _)| handle)
            .find(|handle| self.equipment.is_equipment(handle));
        let group = match candidate {
            Some(handle) => self.expand_resolved(&[handle]),
            None => Vec::new(),
        };
        self.set_hover(&group);
        group
    }

    pub fn clear_hover(&mut self) {
        if self.colors.hovered().is_empty() {
            return;
        }
        self.set_hover(&[]);
    }

    /// 对当前选中集逐个应用颜色选项，返回成功数量。
    pub fn apply_color_option(&mut self, option: ColorOption) -> usize {
        let handles = self.selection.as_slice().to_vec();
        let applied = handles
            .iter()
            .filter(|handle| {
                self.colors
                    .apply_option(&mut self.cache, self.backend.as_mut(), handle, option)
            })
            .count();
        if applied > 0 {
            self.flush();
        }
        debug!(option = %option.id(), applied, total = handles.len(), "颜色选项已应用");
        applied
    }

    /// 把指定句柄的颜色设为选项值，不要求其处于选中状态。
    pub fn apply_color_option_to(&mut self, handle: &Handle, option: ColorOption) -> bool {
        let applied =
            self.colors
                .apply_option(&mut self.cache, self.backend.as_mut(), handle, option);
        if applied {
            self.flush();
        }
        applied
    }

    pub fn restore_selection_colors(&mut self) -> RestoreSummary {
        let handles = self.selection.as_slice().to_vec();
        let summary = self
            .colors
            .restore_all(&mut self.cache, self.backend.as_mut(), &handles);
        if summary.restored > 0 {
            self.flush();
        }
        summary
    }

    /// 缩放到单个实体，然后以视口中心按聚焦系数再缩放一次。
    pub fn zoom_to_handle(&mut self, handle: &Handle) -> bool {
        let Some(entity) = self.resolve(handle) else {
            debug!(handle = %handle, "缩放目标无法解析");
            return false;
        };
        let (width, height) = self.viewport;
        let result = self.backend.zoom_to_entity(entity).and_then(|()| {
            self.backend.zoom_at(
                self.settings.focus_zoom_factor,
                f64::from(width) / 2.0,
                f64::from(height) / 2.0,
            )
        });
        self.finish_view_change(result)
    }

    /// 多个实体时选择范围中心最接近整体中心的那个。
    pub fn zoom_to_handles(&mut self, handles: &[Handle]) -> bool {
        let mut entries: Vec<(EntityRef, Point2)> = Vec::new();
        let mut union = Bounds2D::empty();
        for handle in handles {
            let Some(entity) = self.resolve(handle) else {
                continue;
            };
            let Some(extents) = self.backend.entity_extents(entity) else {
                continue;
            };
            if extents.is_empty() {
                continue;
            }
            union.include_bounds(&extents);
            entries.push((entity, extents.center()));
        }
        if entries.is_empty() {
            return false;
        }
        let center = union.center().as_vec2();
        let best = entries
            .iter()
            .min_by(|(_, a), (_, b)| {
                let da = a.as_vec2().distance_squared(center);
                let db = b.as_vec2().distance_squared(center);
                da.total_cmp(&db)
            })
            .map(|(entity, _)| *entity);
        let Some(best) = best else {
            return false;
        };
        let result = self.backend.zoom_to_entity(best);
        self.finish_view_change(result)
    }

    pub fn navigate(&mut self, command: ViewportCommand) -> bool {
        if let ViewportCommand::Resize { width, height } = command {
            return self.resize(width, height);
        }
        match command.apply(self.backend.as_mut()) {
            Ok(()) => true,
            Err(err) => {
                warn!(?command, error = %err, "视口操作失败");
                false
            }
        }
    }

    /// 同步引擎后备尺寸。零尺寸与未变化的尺寸被忽略。
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 || self.viewport == (width, height) {
            return false;
        }
        let result = ViewportCommand::Resize { width, height }.apply(self.backend.as_mut());
        match result {
            Ok(()) => {
                self.viewport = (width, height);
                true
            }
            Err(err) => {
                warn!(width, height, error = %err, "同步视口尺寸失败");
                false
            }
        }
    }

    /// 关闭文档时调用：撤销瞬时颜色并丢弃缓存。
    pub fn teardown(&mut self) {
        self.clear_hover();
        let handles = self.selection.take();
        for handle in &handles {
            self.colors
                .unhighlight(&mut self.cache, self.backend.as_mut(), handle);
        }
        self.colors.reset();
        self.cache.clear_all();
        self.flush();
    }

    fn event(&self, additive: bool, open_detail_panel: bool, origin: SelectionOrigin) -> SelectionEvent {
        let handles = self.selection.as_slice().to_vec();
        SelectionEvent {
            records: self.cache.snapshot(&handles),
            equipment: self.equipment.info_entries(&handles),
            message: SelectionChanged {
                handles,
                additive,
                open_detail_panel,
            },
            origin,
        }
    }

    /// 供颜色变更后刷新观察者使用。
    pub fn snapshot_event(&self, origin: SelectionOrigin) -> SelectionEvent {
        self.event(false, false, origin)
    }

    /// 设备过滤、位号组扩展，并确保每个句柄都已进入缓存。
    /// 无法解析的句柄被丢弃，已选中的句柄保留以便切换时能被移除。
    fn prepare_handles(&mut self, raw: &[Handle]) -> Vec<Handle> {
        let policy = self.policy();
        let filtered: Vec<Handle> = if policy.restrict_to_equipment {
            raw.iter()
                .filter(|handle| self.equipment.is_equipment(handle))
                .cloned()
                .collect()
        } else {
            raw.to_vec()
        };
        if filtered.len() != raw.len() {
            debug!(dropped = raw.len() - filtered.len(), "非设备句柄已过滤");
        }
        self.expand_resolved(&filtered)
    }

    /// 以位号组为单位切换：组内首个句柄决定整组加入还是移出。
    /// 切换后再扩展一次选中集，补齐仍有成员留在选中集内的组。
    fn toggle_groups(&mut self, handles: &[Handle]) -> (Vec<Handle>, Vec<Handle>) {
        let mut added = Vec::new();
        let mut removed = Vec::new();
        let mut visited: HashSet<Handle> = HashSet::new();
        for handle in handles {
            if visited.contains(handle) {
                continue;
            }
            let deselect = self.selection.contains(handle);
            for member in self.expand_resolved(std::slice::from_ref(handle)) {
                if !visited.insert(member.clone()) {
                    continue;
                }
                if deselect {
                    if self.selection.remove(&member) {
                        removed.push(member);
                    }
                } else if self.selection.insert(member.clone()) {
                    added.push(member);
                }
            }
        }

        let current = self.selection.as_slice().to_vec();
        for member in self.expand_resolved(&current) {
            if removed.contains(&member) {
                continue;
            }
            if self.selection.insert(member.clone()) {
                added.push(member);
            }
        }
        (added, removed)
    }

    fn expand_resolved(&mut self, handles: &[Handle]) -> Vec<Handle> {
        let expanded = if self.equipment.is_empty() {
            let mut seen: HashSet<&Handle> = HashSet::new();
            handles
                .iter()
                .filter(|handle| seen.insert(handle))
                .cloned()
                .collect()
        } else {
            self.equipment.expand_group(handles)
        };
        expanded
            .into_iter()
            .filter(|handle| self.selection.contains(handle) || self.resolve(handle).is_some())
            .collect()
    }

    fn resolve(&mut self, handle: &Handle) -> Option<EntityRef> {
        self.cache
            .ensure_handle(handle, self.backend.as_ref())
            .map(|record| record.entity_ref)
    }

    fn set_hover(&mut self, handles: &[Handle]) {
        let color = self.settings.hover_color;
        self.colors
            .set_hover(&mut self.cache, self.backend.as_mut(), handles, color);
        self.flush();
    }

    /// 按引擎顺序收集矩形内实体并写入缓存。
    /// 结束时无论成功与否都会取消引擎自身的选中并刷新。
    fn collect_in(&mut self, rect: Rectangle) -> Vec<(Handle, EntityRef)> {
        let hits = match query_engine(self.backend.as_mut(), rect) {
            Ok(hits) => hits,
            Err(err) => {
                warn!(?rect, error = %err, "框选查询失败");
                Vec::new()
            }
        };
        if let Err(err) = self.backend.unselect().and_then(|()| self.backend.update()) {
            debug!(error = %err, "重置引擎选中状态失败");
        }
        hits.into_iter()
            .filter(|(handle, entity)| {
                self.cache
                    .ensure(handle, *entity, self.backend.as_ref())
                    .is_some()
            })
            .collect()
    }

    fn finish_view_change(&mut self, result: Result<(), BackendError>) -> bool {
        match result.and_then(|()| self.backend.update()) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "视口缩放失败");
                false
            }
        }
    }

    fn flush(&mut self) {
        if let Err(err) = self.backend.update() {
            debug!(error = %err, "刷新渲染失败");
        }
    }
}

fn query_engine(
    backend: &mut dyn RenderBackend,
    rect: Rectangle,
) -> Result<Vec<(Handle, EntityRef)>, BackendError> {
    backend.unselect()?;
    backend.select(rect)?;
    let mut hits: Vec<(Handle, EntityRef)> = Vec::new();
    for entity in backend.selected()? {
        match backend.entity_handle(entity) {
            Ok(handle) => {
                if !hits.iter().any(|(existing, _)| existing == &handle) {
                    hits.push((handle, entity));
                }
            }
            Err(err) => trace!(error = %err, "跳过无法读取句柄的实体"),
        }
    }
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use pidview_core::equipment::TagRef;

    use super::*;
    use crate::memory::{BackendCall, DemoEntities, MemoryBackend};

    fn controller_with(mode: ViewerMode) -> (SelectionController, MemoryBackend, DemoEntities) {
        let backend = MemoryBackend::new();
        let ids = backend.populate_demo();
        let settings = SelectionSettings {
            mode,
            ..SelectionSettings::default()
        };
        let controller = SelectionController::new(Box::new(backend.clone()), settings);
        (controller, backend, ids)
    }

    fn demo_index(ids: &DemoEntities) -> EquipmentIndex {
        let mut index = EquipmentIndex::new();
        index.insert_tag(TagRef {
            tag_no: "P-101".to_string(),
            function: Some("PUMP".to_string()),
            tag_type: "EQUIPMENT".to_string(),
            lib_desc: Some("Centrifugal pump".to_string()),
            tag_handle: format!("{}/{}", ids.pump, ids.pump_motor),
        });
        index.insert_tag(TagRef {
            tag_no: "V-201".to_string(),
            function: Some("VALVE".to_string()),
            tag_type: "EQUIPMENT".to_string(),
            lib_desc: None,
            tag_handle: ids.valve.to_string(),
        });
        index
    }

    #[test]
    fn selection_set_toggle_keeps_order() {
        let a = Handle::new("A").unwrap();
        let b = Handle::new("B").unwrap();
        let mut set = SelectionSet::new();
        assert!(set.toggle(a.clone()));
        assert!(set.toggle(b.clone()));
        assert!(!set.insert(a.clone()));
        assert!(!set.toggle(a.clone()));
        assert_eq!(set.as_slice(), &[b]);
    }

    #[test]
    fn replace_then_additive_toggles_membership() {
        let (mut controller, backend, ids) = controller_with(ViewerMode::Intelligent);

        let event = controller.apply_selection(&[ids.pump.clone(), ids.valve.clone()], false);
        assert_eq!(event.message.handles, vec![ids.pump.clone(), ids.valve.clone()]);
        assert_eq!(controller.state(), SelectionState::HasSelection);
        assert_eq!(backend.live_color(&ids.pump), Some(controller.settings().highlight_color));

        let event = controller.apply_selection(&[ids.pump.clone()], true);
        assert_eq!(event.message.handles, vec![ids.valve.clone()]);
        assert_eq!(backend.live_color(&ids.pump), Some(ColorValue::Indexed(4)));
        assert_eq!(event.records.len(), 1);
        assert_eq!(event.records[0].handle, ids.valve);
    }

    #[test]
    fn clearing_empty_selection_writes_no_colors() {
        let (mut controller, backend, _) = controller_with(ViewerMode::Intelligent);
        let event = controller.clear(SelectionOrigin::Cancel);
        assert!(event.message.handles.is_empty());
        assert_eq!(controller.state(), SelectionState::Empty);
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn click_pick_escalates_radius_and_cleans_engine_selection() {
        let (mut controller, backend, ids) = controller_with(ViewerMode::Intelligent);
        // 阀门在 (300..320, 120..140)；点击点距其左边 8px，基础半径 4 与 6 都不命中。
        let center = Point2::new(292.0, 145.0);
        let rect = Rectangle::around(center, 4.0);
        let event = controller
            .pick(rect, PickKind::Click { center, dpr: 1.0 }, false)
            .unwrap();
        assert_eq!(event.message.handles, vec![ids.valve.clone()]);
        assert!(event.message.open_detail_panel);

        let calls = backend.calls();
        let selects = calls
            .iter()
            .filter(|call| matches!(call, BackendCall::Select(_)))
            .count();
        assert_eq!(selects, 3);
        let last_select = calls
            .iter()
            .rposition(|call| matches!(call, BackendCall::Select(_)))
            .unwrap();
        assert_eq!(calls[last_select + 1], BackendCall::Unselect);
    }

    #[test]
    fn drag_pick_is_ignored_outside_intelligent_mode() {
        let (mut controller, _, _) = controller_with(ViewerMode::Pld);
        let rect = Rectangle::from_corners(Point2::new(0.0, 0.0), Point2::new(400.0, 400.0));
        assert!(controller.pick(rect, PickKind::Drag, false).is_none());
        assert!(controller.selection().is_empty());
    }

    #[test]
    fn pid_mode_filters_and_expands_tag_groups() {
        let (mut controller, _, ids) = controller_with(ViewerMode::Pid);
        controller.set_equipment_index(demo_index(&ids));

        let event = controller.apply_selection(&[ids.pump_motor.clone(), ids.suction_line.clone()], false);
        assert_eq!(event.message.handles, vec![ids.pump_motor.clone(), ids.pump.clone()]);
        assert_eq!(event.equipment.len(), 1);
        assert_eq!(event.equipment[0].tag_no, "P-101");
        assert_eq!(event.equipment[0].handles.len(), 2);
    }

    #[test]
    fn additive_toggle_keeps_tag_groups_whole() {
        let (mut controller, _, ids) = controller_with(ViewerMode::Intelligent);
        controller.apply_selection(&[ids.pump.clone()], false);
        controller.set_equipment_index(demo_index(&ids));

        let event = controller.apply_selection(&[ids.pump_motor.clone()], true);
        let mut handles = event.message.handles.clone();
        handles.sort();
        let mut group = vec![ids.pump.clone(), ids.pump_motor.clone()];
        group.sort();
        assert_eq!(handles, group);

        let event = controller.apply_selection(&[ids.pump.clone()], true);
        assert!(event.message.handles.is_empty());
        assert_eq!(controller.state(), SelectionState::Empty);
    }

    #[test]
    fn hover_returns_to_selection_highlight() {
        let (mut controller, backend, ids) = controller_with(ViewerMode::Pid);
        controller.set_equipment_index(demo_index(&ids));
        controller.apply_selection(&[ids.valve.clone()], false);

        let hovered = controller.hover_at(Point2::new(310.0, 130.0), 1.0);
        assert_eq!(hovered, vec![ids.valve.clone()]);
        assert_eq!(backend.live_color(&ids.valve), Some(controller.settings().hover_color));

        let hovered = controller.hover_at(Point2::new(600.0, 600.0), 1.0);
        assert!(hovered.is_empty());
        assert_eq!(backend.live_color(&ids.valve), Some(controller.settings().highlight_color));
    }

    #[test]
    fn unresolvable_handles_are_dropped() {
        let (mut controller, _, ids) = controller_with(ViewerMode::Intelligent);
        let ghost = Handle::new("FFFF").unwrap();
        let event = controller.apply_selection(&[ghost.clone(), ids.valve.clone()], false);
        assert_eq!(event.message.handles, vec![ids.valve.clone()]);
        assert!(matches!(
            controller.record(&ghost),
            Err(EngineError::StaleReference(_))
        ));
        assert_eq!(controller.record(&ids.tag_label).unwrap().type_name, "MText");
    }

    #[test]
    fn zoom_to_handles_picks_entity_nearest_union_center() {
        let (mut controller, backend, ids) = controller_with(ViewerMode::Intelligent);
        controller.resize(800, 600);
        assert!(controller.zoom_to_handles(&[
            ids.suction_line.clone(),
            ids.pump.clone(),
            ids.valve.clone(),
        ]));
        assert!(backend.calls().contains(&BackendCall::ZoomToEntity(ids.pump.clone())));

        backend.clear_calls();
        assert!(controller.zoom_to_handle(&ids.valve));
        let calls = backend.calls();
        assert_eq!(calls[0], BackendCall::ZoomToEntity(ids.valve.clone()));
        assert_eq!(calls[1], BackendCall::ZoomAt(0.2, 400.0, 300.0));
        assert!(!controller.zoom_to_handle(&Handle::new("FFFF").unwrap()));
    }

    #[test]
    fn resize_ignores_zero_and_unchanged_sizes() {
        let (mut controller, backend, _) = controller_with(ViewerMode::Intelligent);
        assert!(!controller.resize(0, 300));
        assert!(controller.resize(640, 480));
        assert!(!controller.resize(640, 480));
        let resizes = backend
            .calls()
            .iter()
            .filter(|call| matches!(call, BackendCall::Resize(..)))
            .count();
        assert_eq!(resizes, 1);
    }

    #[test]
    fn teardown_reverts_highlight_and_drops_cache() {
        let (mut controller, backend, ids) = controller_with(ViewerMode::Intelligent);
        controller.apply_selection(&[ids.pump.clone()], false);
        backend.set_available(false);
        controller.teardown();
        assert!(controller.selection().is_empty());
        assert!(controller.cache().is_empty());
    }
}
