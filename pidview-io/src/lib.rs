use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use pidview_core::equipment::{EquipmentIndex, TagRef};
use pidview_core::handle::{Handle, split_tag_handles};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("failed to read file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// 文档载荷与设备树行数据的加载接口。
pub trait PayloadLoader {
    fn load_document(&self, path: &Path) -> Result<DocumentPayload, PayloadError>;
    fn load_equipment_rows(&self, path: &Path) -> Result<Vec<EquipmentRow>, PayloadError>;
}

pub struct JsonPayloadFacade;

impl JsonPayloadFacade {
    pub fn new() -> Self {
        Self
    }

    fn read(path: &Path) -> Result<String, PayloadError> {
        fs::read_to_string(path).map_err(|source| PayloadError::Read {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl Default for JsonPayloadFacade {
    fn default() -> Self {
        Self::new()
    }
}

impl PayloadLoader for JsonPayloadFacade {
    fn load_document(&self, path: &Path) -> Result<DocumentPayload, PayloadError> {
        parse_document(&Self::read(path)?)
    }

    fn load_equipment_rows(&self, path: &Path) -> Result<Vec<EquipmentRow>, PayloadError> {
        parse_equipment_rows(&Self::read(path)?)
    }
}

pub fn parse_document(data: &str) -> Result<DocumentPayload, PayloadError> {
    Ok(serde_json::from_str(data)?)
}

pub fn parse_equipment_rows(data: &str) -> Result<Vec<EquipmentRow>, PayloadError> {
    Ok(serde_json::from_str(data)?)
}

/// 接口里的编号字段有时是数字、有时是字符串，统一读成字符串。
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Integer(i64),
        Float(f64),
    }

    let value = Option::<Raw>::deserialize(deserializer)?;
    Ok(value
        .map(|raw| match raw {
            Raw::Text(text) => text.trim().to_string(),
            Raw::Integer(value) => value.to_string(),
            Raw::Float(value) => value.to_string(),
        })
        .filter(|text| !text.is_empty()))
}

/// 打开文档时随附的载荷，只保留选择引擎关心的字段。
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DocumentPayload {
    #[serde(rename = "DOCNO", alias = "docno", deserialize_with = "lenient_string", default)]
    pub docno: Option<String>,
    #[serde(rename = "DOCVR", alias = "docVer", deserialize_with = "lenient_string", default)]
    pub docvr: Option<String>,
    #[serde(default)]
    pub tags: Vec<DocumentTag>,
}

impl DocumentPayload {
    /// 由位号列表构建句柄交叉索引，没有句柄的位号被跳过。
    pub fn equipment_index(&self) -> EquipmentIndex {
        let mut index = EquipmentIndex::new();
        for tag in &self.tags {
            if let Some(tag_ref) = tag.to_tag_ref() {
                index.insert_tag(tag_ref);
            }
        }
        index
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DocumentTag {
    #[serde(rename = "TAGNO", alias = "tagNo", deserialize_with = "lenient_string", default)]
    pub tag_no: Option<String>,
    #[serde(rename = "FUNCTION", alias = "function", default)]
    pub function: Option<String>,
    #[serde(rename = "TAG_TYPE", alias = "tagType", default)]
    pub tag_type: Option<String>,
    #[serde(rename = "LIBDS", alias = "libDs", default)]
    pub lib_desc: Option<String>,
    #[serde(rename = "TAGHANDLE", alias = "tagHandle", deserialize_with = "lenient_string", default)]
    pub tag_handle: Option<String>,
}

impl DocumentTag {
    pub fn to_tag_ref(&self) -> Option<TagRef> {
        let tag_handle = self.tag_handle.clone()?;
        if split_tag_handles(&tag_handle).is_empty() {
            return None;
        }
        Some(TagRef {
            tag_no: self.tag_no.clone().unwrap_or_default(),
            function: self.function.clone().filter(|value| !value.is_empty()),
            tag_type: self
                .tag_type
                .clone()
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| "UNKNOWN".to_string()),
            lib_desc: self.lib_desc.clone(),
            tag_handle,
        })
    }
}

/// 设备树接口返回的一行：库节点信息加可选的一个位号。
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentRow {
    #[serde(deserialize_with = "lenient_string", default)]
    pub lib_id: Option<String>,
    #[serde(default)]
    pub lib_desc: Option<String>,
    #[serde(default)]
    pub lib_name: Option<String>,
    #[serde(deserialize_with = "lenient_string", default)]
    pub parent: Option<String>,
    #[serde(deserialize_with = "lenient_string", default)]
    pub lib_lv: Option<String>,
    #[serde(deserialize_with = "lenient_string", default)]
    pub tag_id: Option<String>,
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub intelligent: Option<String>,
    #[serde(default)]
    pub tag_type: Option<String>,
    #[serde(default)]
    pub handle: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquipmentTag {
    pub id: String,
    pub label: String,
    pub tag_type: String,
    pub handles: Vec<Handle>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquipmentNode {
    pub id: String,
    pub label: String,
    pub description: Option<String>,
    pub parent: Option<String>,
    pub level: Option<String>,
    pub intelligent: Option<String>,
    pub tags: Vec<EquipmentTag>,
    pub children: Vec<EquipmentNode>,
    /// 本节点及全部子孙节点的句柄，去重。
    pub total_handles: Vec<Handle>,
}

impl EquipmentNode {
    #[inline]
    pub fn total_count(&self) -> usize {
        self.total_handles.len()
    }
}

/// 设备树及其派生索引。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EquipmentModel {
    pub tree: Vec<EquipmentNode>,
    pub all_handles: Vec<Handle>,
    pub handles_by_lib_id: HashMap<String, Vec<Handle>>,
    pub parent_by_lib_id: HashMap<String, Option<String>>,
}

struct NodeDraft {
    id: String,
    label: String,
    description: Option<String>,
    parent: Option<String>,
    level: Option<String>,
    intelligent: Option<String>,
    tags: Vec<EquipmentTag>,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.clone().filter(|text| !text.trim().is_empty())
}

fn by_label(a: &EquipmentNode, b: &EquipmentNode) -> Ordering {
    a.label.cmp(&b.label)
}

impl EquipmentModel {
    /// 由设备树行构建模型：同一库节点的行合并，同一位号的句柄合并去重，
    /// 父节点不存在的节点作为根，子节点按标签排序。
    pub fn build(rows: &[EquipmentRow]) -> Self {
        let mut drafts: Vec<NodeDraft> = Vec::new();
        let mut position: HashMap<String, usize> = HashMap::new();

        for row in rows {
            let Some(lib_id) = non_empty(&row.lib_id) else {
                continue;
            };
            let index = *position.entry(lib_id.clone()).or_insert_with(|| {
                let description = non_empty(&row.lib_desc);
                let label = description
                    .clone()
                    .or_else(|| non_empty(&row.lib_name))
                    .unwrap_or_else(|| format!("LIB-{lib_id}"));
                drafts.push(NodeDraft {
                    id: lib_id.clone(),
                    label,
                    description,
                    parent: non_empty(&row.parent),
                    level: non_empty(&row.lib_lv),
                    intelligent: non_empty(&row.intelligent),
                    tags: Vec::new(),
                });
                drafts.len() - 1
            });

            let Some(tag_id) = non_empty(&row.tag_id) else {
                continue;
            };
            let handles = row
                .handle
                .as_deref()
                .map(split_tag_handles)
                .unwrap_or_default();
            let node = &mut drafts[index];
            match node.tags.iter_mut().find(|tag| tag.id == tag_id) {
                Some(existing) => {
                    for handle in handles {
                        if !existing.handles.contains(&handle) {
                            existing.handles.push(handle);
                        }
                    }
                }
                None => {
                    let label = non_empty(&row.function)
                        .or_else(|| non_empty(&row.intelligent))
                        .unwrap_or_else(|| tag_id.clone());
                    node.tags.push(EquipmentTag {
                        id: tag_id,
                        label,
                        tag_type: non_empty(&row.tag_type).unwrap_or_else(|| "UNKNOWN".to_string()),
                        handles,
                    });
                }
            }
        }

        let mut children: HashMap<String, Vec<usize>> = HashMap::new();
        let mut roots: Vec<usize> = Vec::new();
        for (index, draft) in drafts.iter().enumerate() {
            match &draft.parent {
                Some(parent) if position.contains_key(parent) => {
                    children.entry(parent.clone()).or_default().push(index);
                }
                _ => roots.push(index),
            }
        }

        let mut model = EquipmentModel::default();
        let mut all_seen: HashSet<Handle> = HashSet::new();
        let mut tree: Vec<EquipmentNode> = roots
            .into_iter()
            .map(|root| model.annotate(root, &drafts, &children, &mut all_seen))
            .collect();
        tree.sort_by(by_label);
        model.tree = tree;
        model
    }

    fn annotate(
        &mut self,
        index: usize,
        drafts: &[NodeDraft],
        children: &HashMap<String, Vec<usize>>,
        all_seen: &mut HashSet<Handle>,
    ) -> EquipmentNode {
        let draft = &drafts[index];
        let mut total: Vec<Handle> = Vec::new();
        let mut seen: HashSet<Handle> = HashSet::new();
        for handle in draft.tags.iter().flat_map(|tag| tag.handles.iter()) {
            if seen.insert(handle.clone()) {
                total.push(handle.clone());
            }
            if all_seen.insert(handle.clone()) {
                self.all_handles.push(handle.clone());
            }
        }

        let mut nodes: Vec<EquipmentNode> = children
            .get(&draft.id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .map(|child| self.annotate(*child, drafts, children, all_seen))
            .collect();
        for node in &nodes {
            for handle in &node.total_handles {
                if seen.insert(handle.clone()) {
                    total.push(handle.clone());
                }
            }
        }
        nodes.sort_by(by_label);

        self.handles_by_lib_id.insert(draft.id.clone(), total.clone());
        self.parent_by_lib_id.insert(draft.id.clone(), draft.parent.clone());
        EquipmentNode {
            id: draft.id.clone(),
            label: draft.label.clone(),
            description: draft.description.clone(),
            parent: draft.parent.clone(),
            level: draft.level.clone(),
            intelligent: draft.intelligent.clone(),
            tags: draft.tags.clone(),
            children: nodes,
            total_handles: total,
        }
    }

    pub fn handles_for(&self, lib_id: &str) -> &[Handle] {
        self.handles_by_lib_id
            .get(lib_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn parent_of(&self, lib_id: &str) -> Option<&str> {
        self.parent_by_lib_id
            .get(lib_id)
            .and_then(|parent| parent.as_deref())
    }

    /// 把树中的全部句柄登记为可选设备。
    pub fn register_equipment(&self, index: &mut EquipmentIndex) {
        index.extend_equipment(self.all_handles.iter().cloned());
    }
}
