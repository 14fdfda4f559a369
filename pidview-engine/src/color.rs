use std::collections::HashMap;

use pidview_core::color::{ColorOption, ColorValue};
use pidview_core::handle::Handle;
use tracing::{debug, warn};

use crate::backend::RenderBackend;
use crate::cache::EntityMetadataCache;

/// 批量恢复的结果统计。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub restored: usize,
    pub failed: usize,
}

/// 颜色覆盖管理器。
///
/// 每个实体的屏幕颜色由三层叠加决定，优先级从高到低：
/// 悬停色、选中高亮色、基础色（用户覆盖色或原色）。
/// 高亮与悬停是瞬时层，只记录在本结构中；用户覆盖写在缓存记录上。
/// 所有入口都会吞掉单个实体的引擎错误并返回 `false`。
#[derive(Debug, Default)]
pub struct ColorOverrideManager {
    highlighted: HashMap<Handle, ColorValue>,
    hovered: HashMap<Handle, ColorValue>,
}

impl ColorOverrideManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 用户覆盖色立即生效，即使实体当前处于高亮中。
    pub fn apply_override(
        &mut self,
        cache: &mut EntityMetadataCache,
        backend: &mut dyn RenderBackend,
        handle: &Handle,
        value: ColorValue,
        option_id: Option<String>,
    ) -> bool {
        let Some(record) = cache.ensure_handle(handle, &*backend) else {
            debug!(handle = %handle, "覆盖颜色时无法解析实体");
            return false;
        };
        if let Err(err) = backend.set_entity_color(record.entity_ref, value) {
            warn!(handle = %handle, error = %err, "写入覆盖颜色失败");
            return false;
        }
        record.record_override(value, option_id);
        true
    }

    /// 按 UI 选项应用颜色；`restore-initial` 等价于 [`Self::restore`]。
    pub fn apply_option(
        &mut self,
        cache: &mut EntityMetadataCache,
        backend: &mut dyn RenderBackend,
        handle: &Handle,
        option: ColorOption,
    ) -> bool {
        match option {
            ColorOption::Apply(value) => {
                self.apply_override(cache, backend, handle, value, Some(option.id()))
            }
            ColorOption::RestoreInitial => self.restore(cache, backend, handle),
        }
    }

    /// 写回首次接触时记录的原色。没有覆盖时为空操作。
    pub fn restore(
        &mut self,
        cache: &mut EntityMetadataCache,
        backend: &mut dyn RenderBackend,
        handle: &Handle,
    ) -> bool {
        let Some(record) = cache.get_mut(handle) else {
            return true;
        };
        if !record.has_color_changed {
            return true;
        }
        if let Err(err) = backend.set_entity_color(record.entity_ref, record.original_color()) {
            warn!(handle = %handle, error = %err, "恢复原色失败");
            return false;
        }
        record.clear_override();
        true
    }

    pub fn restore_all(
        &mut self,
        cache: &mut EntityMetadataCache,
        backend: &mut dyn RenderBackend,
        handles: &[Handle],
    ) -> RestoreSummary {
        let mut summary = RestoreSummary::default();
        for handle in handles {
            if self.restore(cache, backend, handle) {
                summary.restored += 1;
            } else {
                summary.failed += 1;
            }
        }
        if summary.failed > 0 {
            warn!(
                restored = summary.restored,
                failed = summary.failed,
                "部分实体未能恢复原色"
            );
        }
        summary
    }

    /// 施加选中高亮。重复高亮同一颜色不会再次写入引擎。
    pub fn highlight(
        &mut self,
        cache: &mut EntityMetadataCache,
        backend: &mut dyn RenderBackend,
        handle: &Handle,
        color: ColorValue,
    ) -> bool {
        if self.highlighted.get(handle) == Some(&color) {
            return true;
        }
        if cache.ensure_handle(handle, &*backend).is_none() {
            return false;
        }
        let previous = self.highlighted.insert(handle.clone(), color);
        if self.paint(cache, backend, handle) {
            return true;
        }
        match previous {
            Some(previous) => self.highlighted.insert(handle.clone(), previous),
            None => self.highlighted.remove(handle),
        };
        false
    }

    /// 撤销选中高亮，回到悬停色或高亮前的颜色。未高亮时不触碰引擎。
    pub fn unhighlight(
        &mut self,
        cache: &mut EntityMetadataCache,
        backend: &mut dyn RenderBackend,
        handle: &Handle,
    ) -> bool {
        if self.highlighted.remove(handle).is_none() {
            return true;
        }
        self.paint(cache, backend, handle)
    }

    /// 用新的悬停集合替换旧集合。离开悬停的实体回到高亮色或基础色。
    pub fn set_hover(
        &mut self,
        cache: &mut EntityMetadataCache,
        backend: &mut dyn RenderBackend,
        handles: &[Handle],
        color: ColorValue,
    ) {
        let leaving: Vec<Handle> = self
            .hovered
            .keys()
            .filter(|handle| !handles.contains(handle))
            .cloned()
            .collect();
        for handle in leaving {
            self.hovered.remove(&handle);
            self.paint(cache, backend, &handle);
        }
        for handle in handles {
            if self.hovered.get(handle) == Some(&color) {
                continue;
            }
            if cache.ensure_handle(handle, &*backend).is_none() {
                continue;
            }
            self.hovered.insert(handle.clone(), color);
            if !self.paint(cache, backend, handle) {
                self.hovered.remove(handle);
            }
        }
    }

    pub fn clear_hover(&mut self, cache: &mut EntityMetadataCache, backend: &mut dyn RenderBackend) {
        self.set_hover(cache, backend, &[], ColorValue::FALLBACK);
    }

    #[inline]
    pub fn is_highlighted(&self, handle: &Handle) -> bool {
        self.highlighted.contains_key(handle)
    }

    #[inline]
    pub fn highlight_color(&self, handle: &Handle) -> Option<ColorValue> {
        self.highlighted.get(handle).copied()
    }

    #[inline]
    pub fn is_hovered(&self, handle: &Handle) -> bool {
        self.hovered.contains_key(handle)
    }

    pub fn hovered(&self) -> Vec<Handle> {
        let mut handles: Vec<Handle> = self.hovered.keys().cloned().collect();
        handles.sort();
        handles
    }

    /// 丢弃瞬时层而不写引擎，用于文档关闭。
    pub fn reset(&mut self) {
        self.highlighted.clear();
        self.hovered.clear();
    }

    /// 当前应呈现的颜色。
    pub fn effective_color(&self, cache: &EntityMetadataCache, handle: &Handle) -> Option<ColorValue> {
        let record = cache.get(handle)?;
        Some(
            self.hovered
                .get(handle)
                .or_else(|| self.highlighted.get(handle))
                .copied()
                .unwrap_or_else(|| record.base_color()),
        )
    }

    fn paint(
        &self,
        cache: &EntityMetadataCache,
        backend: &mut dyn RenderBackend,
        handle: &Handle,
    ) -> bool {
        let Some(record) = cache.get(handle) else {
            return false;
        };
        let Some(color) = self.effective_color(cache, handle) else {
            return false;
        };
        match backend.set_entity_color(record.entity_ref, color) {
            Ok(()) => true,
            Err(err) => {
                warn!(handle = %handle, error = %err, "写入实体颜色失败，已忽略");
                false
            }
        }
    }
}
