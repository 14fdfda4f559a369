use std::collections::HashMap;

use pidview_core::entity::EntityRecord;
use pidview_core::handle::{EntityRef, Handle};
use tracing::{debug, warn};

use crate::backend::RenderBackend;

/// 以句柄为键的实体元数据缓存，随选择惰性填充，只在文档关闭时整体清空。
#[derive(Debug, Default)]
pub struct EntityMetadataCache {
    records: HashMap<Handle, EntityRecord>,
}

impl EntityMetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已缓存时直接返回，不会重新读取颜色；否则读取引擎属性一次并写入缓存。
    /// 引用失效时返回 `None`。
    pub fn ensure(
        &mut self,
        handle: &Handle,
        entity: EntityRef,
        backend: &dyn RenderBackend,
    ) -> Option<&mut EntityRecord> {
        if !self.records.contains_key(handle) {
            let props = match backend.open_entity(entity) {
                Ok(props) => props,
                Err(err) => {
                    warn!(handle = %handle, error = %err, "读取实体属性失败，已跳过");
                    return None;
                }
            };
            let mut record = EntityRecord::capture(entity, props);
            // 以请求方的句柄为准，与选中集保持一致。
            record.handle = handle.clone();
            debug!(
                handle = %handle,
                type_name = %record.type_name,
                original = ?record.original_color(),
                "实体元数据已缓存"
            );
            self.records.insert(handle.clone(), record);
        }
        self.records.get_mut(handle)
    }

    /// 仅凭句柄确保缓存，供外部推送使用。已缓存的记录沿用其实体引用。
    pub fn ensure_handle(
        &mut self,
        handle: &Handle,
        backend: &dyn RenderBackend,
    ) -> Option<&mut EntityRecord> {
        if self.records.contains_key(handle) {
            return self.records.get_mut(handle);
        }
        let entity = backend.resolve_handle(handle)?;
        self.ensure(handle, entity, backend)
    }

    #[inline]
    pub fn get(&self, handle: &Handle) -> Option<&EntityRecord> {
        self.records.get(handle)
    }

    #[inline]
    pub fn get_mut(&mut self, handle: &Handle) -> Option<&mut EntityRecord> {
        self.records.get_mut(handle)
    }

    #[inline]
    pub fn contains(&self, handle: &Handle) -> bool {
        self.records.contains_key(handle)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 按给定顺序复制记录，跳过未缓存的句柄。
    pub fn snapshot(&self, handles: &[Handle]) -> Vec<EntityRecord> {
        handles
            .iter()
            .filter_map(|handle| self.records.get(handle).cloned())
            .collect()
    }

    pub fn clear_all(&mut self) {
        debug!(records = self.records.len(), "清空实体元数据缓存");
        self.records.clear();
    }
}
