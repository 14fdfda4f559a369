pub mod geometry {
    use glam::DVec2;
    use serde::{Deserialize, Serialize};

    /// 二维点，内部以 `glam::DVec2` 表示。既用于客户端坐标，也用于设备像素坐标。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self::from_vec(value)
        }
    }

    /// 二维向量，主要用于手势位移与平移量。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector2(pub DVec2);

    impl Vector2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_points(start: Point2, end: Point2) -> Self {
            Self(end.0 - start.0)
        }

        #[inline]
        pub fn length(self) -> f64 {
            self.0.length()
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }
    }

    /// 设备像素视口坐标，附带采样时的设备像素比。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct ViewportPoint {
        pub x: f64,
        pub y: f64,
        pub dpr: f64,
    }

    impl ViewportPoint {
        /// 画布未挂载时返回的退化点，调用方应视为空操作。
        pub const DEGENERATE: ViewportPoint = ViewportPoint {
            x: 0.0,
            y: 0.0,
            dpr: 1.0,
        };

        #[inline]
        pub fn new(x: f64, y: f64, dpr: f64) -> Self {
            Self { x, y, dpr }
        }

        #[inline]
        pub fn is_degenerate(&self) -> bool {
            *self == Self::DEGENERATE
        }

        #[inline]
        pub fn position(&self) -> Point2 {
            Point2::new(self.x, self.y)
        }
    }

    /// 设备像素视口空间中的矩形。通过构造函数得到的矩形总是规范化的（`x1<=x2, y1<=y2`）。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Rectangle {
        pub x1: f64,
        pub y1: f64,
        pub x2: f64,
        pub y2: f64,
    }

    impl Rectangle {
        /// 由任意两个角点构造，结果已规范化。
        pub fn from_corners(a: Point2, b: Point2) -> Self {
            Self {
                x1: a.x().min(b.x()),
                y1: a.y().min(b.y()),
                x2: a.x().max(b.x()),
                y2: a.y().max(b.y()),
            }
        }

        /// 以 `center` 为中心、半边长为 `radius` 的正方形。
        pub fn around(center: Point2, radius: f64) -> Self {
            let r = radius.abs();
            Self {
                x1: center.x() - r,
                y1: center.y() - r,
                x2: center.x() + r,
                y2: center.y() + r,
            }
        }

        #[inline]
        pub fn normalized(self) -> Self {
            Self::from_corners(Point2::new(self.x1, self.y1), Point2::new(self.x2, self.y2))
        }

        #[inline]
        pub fn is_normalized(&self) -> bool {
            self.x1 <= self.x2 && self.y1 <= self.y2
        }

        #[inline]
        pub fn width(&self) -> f64 {
            (self.x2 - self.x1).abs()
        }

        #[inline]
        pub fn height(&self) -> f64 {
            (self.y2 - self.y1).abs()
        }

        #[inline]
        pub fn center(&self) -> Point2 {
            Point2::new((self.x1 + self.x2) * 0.5, (self.y1 + self.y2) * 0.5)
        }

        pub fn intersects(&self, other: &Rectangle) -> bool {
            let a = self.normalized();
            let b = other.normalized();
            a.x1 <= b.x2 && b.x1 <= a.x2 && a.y1 <= b.y2 && b.y1 <= a.y2
        }
    }

    /// 轴对齐边界框，用于实体范围与缩放定位。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Bounds2D {
        min: Point2,
        max: Point2,
    }

    impl Bounds2D {
        #[inline]
        pub fn new(min: Point2, max: Point2) -> Self {
            Self { min, max }
        }

        #[inline]
        pub fn empty() -> Self {
            Self {
                min: Point2::new(f64::INFINITY, f64::INFINITY),
                max: Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            }
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.min.x() > self.max.x() || self.min.y() > self.max.y()
        }

        #[inline]
        pub fn min(&self) -> Point2 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Point2 {
            self.max
        }

        pub fn include_point(&mut self, point: Point2) {
            if self.is_empty() {
                self.min = point;
                self.max = point;
                return;
            }
            self.min = Point2::from_vec(self.min.as_vec2().min(point.as_vec2()));
            self.max = Point2::from_vec(self.max.as_vec2().max(point.as_vec2()));
        }

        pub fn include_bounds(&mut self, other: &Bounds2D) {
            if other.is_empty() {
                return;
            }
            self.include_point(other.min);
            self.include_point(other.max);
        }

        #[inline]
        pub fn center(&self) -> Point2 {
            debug_assert!(!self.is_empty());
            Point2::from_vec((self.min.as_vec2() + self.max.as_vec2()) * 0.5)
        }
    }

}

pub mod handle {
    use std::fmt;

    use serde::{Deserialize, Serialize};

    /// 渲染引擎提供的实体句柄。只比较相等性，从不解析其内容。
    #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct Handle(String);

    impl Handle {
        /// 去除首尾空白后构造句柄；空串视为无效输入。
        pub fn new(raw: impl AsRef<str>) -> Option<Self> {
            let trimmed = raw.as_ref().trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(Self(trimmed.to_string()))
            }
        }

        /// 内置常量句柄，调用方保证非空且无首尾空白。
        pub fn from_static(raw: &'static str) -> Self {
            debug_assert!(!raw.trim().is_empty());
            Self(raw.to_string())
        }

        #[inline]
        pub fn as_str(&self) -> &str {
            &self.0
        }
    }

    impl fmt::Display for Handle {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

    /// 引擎内部实体引用的不透明令牌，仅在所属文档的引擎实例内有效。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct EntityRef(u64);

    impl EntityRef {
        #[inline]
        pub fn new(raw: u64) -> Self {
            Self(raw)
        }

        #[inline]
        pub fn get(self) -> u64 {
            self.0
        }
    }

    /// 打开文档的标识（文档编号）。
    #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct DocumentId(String);

    impl DocumentId {
        pub fn new(raw: impl Into<String>) -> Self {
            Self(raw.into())
        }

        #[inline]
        pub fn as_str(&self) -> &str {
            &self.0
        }
    }

    impl fmt::Display for DocumentId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

    /// 过滤空值并按首次出现顺序去重。
    pub fn normalize_handles<I, S>(raw: I) -> Vec<Handle>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut handles: Vec<Handle> = Vec::new();
        for handle in raw.into_iter().filter_map(Handle::new) {
            if !handles.contains(&handle) {
                handles.push(handle);
            }
        }
        handles
    }

    /// 拆分设备位号中以 `/` 分隔的句柄串。
    pub fn split_tag_handles(raw: &str) -> Vec<Handle> {
        normalize_handles(raw.split('/'))
    }

}

pub mod color {
    use std::str::FromStr;

    use serde::{Deserialize, Serialize};
    use thiserror::Error;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Rgb {
        pub r: u8,
        pub g: u8,
        pub b: u8,
    }

    impl Rgb {
        #[inline]
        pub const fn new(r: u8, g: u8, b: u8) -> Self {
            Self { r, g, b }
        }
    }

    impl From<[u8; 3]> for Rgb {
        fn from(value: [u8; 3]) -> Self {
            Self::new(value[0], value[1], value[2])
        }
    }

    /// 实体颜色值：ACI 索引色或显式 RGB。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum ColorValue {
        Indexed(u8),
        Rgb(Rgb),
    }

    impl ColorValue {
        /// 引擎无法读出颜色时使用的回退值（ACI 7）。
        pub const FALLBACK: ColorValue = ColorValue::Indexed(7);
    }

    impl From<Rgb> for ColorValue {
        fn from(value: Rgb) -> Self {
            ColorValue::Rgb(value)
        }
    }

    /// 引擎上报的颜色方式，对应 kColor / kIndexed / kDefault。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
    pub enum ColorType {
        Color,
        Indexed,
        #[default]
        Default,
    }

    /// 首次接触实体时从引擎读取的颜色描述。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
    pub struct EntityColor {
        pub color_type: ColorType,
        pub index: Option<u8>,
        pub true_color: Option<Rgb>,
    }

    impl EntityColor {
        pub fn rgb(rgb: Rgb) -> Self {
            Self {
                color_type: ColorType::Color,
                index: None,
                true_color: Some(rgb),
            }
        }

        pub fn indexed(index: u8) -> Self {
            Self {
                color_type: ColorType::Indexed,
                index: Some(index),
                true_color: None,
            }
        }

        /// 折算为可写回引擎的颜色值。
        pub fn value(&self) -> ColorValue {
            match (self.color_type, self.true_color, self.index) {
                (ColorType::Color, Some(rgb), _) => ColorValue::Rgb(rgb),
                (ColorType::Indexed, _, Some(index)) => ColorValue::Indexed(index),
                (ColorType::Default, Some(rgb), _) => ColorValue::Rgb(rgb),
                (ColorType::Default, None, Some(index)) => ColorValue::Indexed(index),
                _ => ColorValue::FALLBACK,
            }
        }
    }

    pub const RESTORE_INITIAL: &str = "restore-initial";

    /// 调色板条目。
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PaletteEntry {
        pub id: &'static str,
        pub label: &'static str,
        pub value: ColorValue,
    }

    /// 固定 8 色调色板：黑色加 ACI 1-7。
    pub const PALETTE: [PaletteEntry; 8] = [
        PaletteEntry {
            id: "rgb:0,0,0",
            label: "Black",
            value: ColorValue::Rgb(Rgb::new(0, 0, 0)),
        },
        PaletteEntry {
            id: "index:1",
            label: "Red",
            value: ColorValue::Indexed(1),
        },
        PaletteEntry {
            id: "index:2",
            label: "Yellow",
            value: ColorValue::Indexed(2),
        },
        PaletteEntry {
            id: "index:3",
            label: "Green",
            value: ColorValue::Indexed(3),
        },
        PaletteEntry {
            id: "index:4",
            label: "Cyan",
            value: ColorValue::Indexed(4),
        },
        PaletteEntry {
            id: "index:5",
            label: "Blue",
            value: ColorValue::Indexed(5),
        },
        PaletteEntry {
            id: "index:6",
            label: "Magenta",
            value: ColorValue::Indexed(6),
        },
        PaletteEntry {
            id: "index:7",
            label: "White",
            value: ColorValue::Indexed(7),
        },
    ];

    /// UI 颜色选项。`RestoreInitial` 只是一次性指令，不会作为状态保存。
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum ColorOption {
        Apply(ColorValue),
        RestoreInitial,
    }

    impl ColorOption {
        /// 选项的字符串 ID，与 `FromStr` 互逆。
        pub fn id(&self) -> String {
            match self {
                ColorOption::RestoreInitial => RESTORE_INITIAL.to_string(),
                ColorOption::Apply(ColorValue::Indexed(index)) => format!("index:{index}"),
                ColorOption::Apply(ColorValue::Rgb(rgb)) => {
                    format!("rgb:{},{},{}", rgb.r, rgb.g, rgb.b)
                }
            }
        }

        /// 面板下拉框的可选项；颜色被修改过时才提供“恢复原色”。
        pub fn menu(has_color_changed: bool) -> Vec<ColorOption> {
            let mut options = Vec::with_capacity(PALETTE.len() + 1);
            if has_color_changed {
                options.push(ColorOption::RestoreInitial);
            }
            options.extend(PALETTE.iter().map(|entry| ColorOption::Apply(entry.value)));
            options
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Error)]
    #[error("无法识别的颜色选项: {0}")]
    pub struct ColorOptionError(pub String);

    impl FromStr for ColorOption {
        type Err = ColorOptionError;

        fn from_str(raw: &str) -> Result<Self, Self::Err> {
            let value = raw.trim();
            let invalid = || ColorOptionError(raw.to_string());
            if value == RESTORE_INITIAL {
                return Ok(ColorOption::RestoreInitial);
            }
            if let Some(index) = value.strip_prefix("index:") {
                let index: u8 = index.trim().parse().map_err(|_| invalid())?;
                if !(1..=7).contains(&index) {
                    return Err(invalid());
                }
                return Ok(ColorOption::Apply(ColorValue::Indexed(index)));
            }
            if let Some(channels) = value.strip_prefix("rgb:") {
                let parts: Vec<u8> = channels
                    .split(',')
                    .map(|part| part.trim().parse::<u8>())
                    .collect::<Result<_, _>>()
                    .map_err(|_| invalid())?;
                let [r, g, b] = parts.as_slice() else {
                    return Err(invalid());
                };
                return Ok(ColorOption::Apply(ColorValue::Rgb(Rgb::new(*r, *g, *b))));
            }
            Err(invalid())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn palette_ids_parse_back() {
            for entry in PALETTE {
                let option: ColorOption = entry.id.parse().expect("palette id should parse");
                assert_eq!(option, ColorOption::Apply(entry.value));
                assert_eq!(option.id(), entry.id);
            }
            assert_eq!(
                "restore-initial".parse::<ColorOption>().unwrap(),
                ColorOption::RestoreInitial
            );
        }

        #[test]
        fn malformed_options_are_rejected() {
            assert!("index:0".parse::<ColorOption>().is_err());
            assert!("index:8".parse::<ColorOption>().is_err());
            assert!("rgb:1,2".parse::<ColorOption>().is_err());
            assert!("rgb:1,2,300".parse::<ColorOption>().is_err());
            let err = "red".parse::<ColorOption>().unwrap_err();
            assert_eq!(err.to_string(), "无法识别的颜色选项: red");
        }

        #[test]
        fn menu_offers_restore_only_after_change() {
            assert_eq!(ColorOption::menu(false).len(), 8);
            let menu = ColorOption::menu(true);
            assert_eq!(menu.len(), 9);
            assert_eq!(menu[0], ColorOption::RestoreInitial);
        }

        #[test]
        fn entity_color_resolution_prefers_declared_type() {
            assert_eq!(
                EntityColor::rgb(Rgb::new(1, 2, 3)).value(),
                ColorValue::Rgb(Rgb::new(1, 2, 3))
            );
            assert_eq!(EntityColor::indexed(3).value(), ColorValue::Indexed(3));
            let by_default = EntityColor {
                color_type: ColorType::Default,
                index: Some(5),
                true_color: None,
            };
            assert_eq!(by_default.value(), ColorValue::Indexed(5));
            assert_eq!(EntityColor::default().value(), ColorValue::FALLBACK);
        }
    }
}

pub mod entity {
    use serde::{Deserialize, Serialize};

    use crate::color::{ColorType, ColorValue, EntityColor, Rgb};
    use crate::handle::{EntityRef, Handle};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "UPPERCASE")]
    pub enum EntityKind {
        Entity,
        Insert,
        Unknown,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct LayerInfo {
        pub name: String,
        pub color: Option<Rgb>,
    }

    /// 引擎 `openEntity` 一次读出的属性快照。
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct EntityProps {
        pub handle: Handle,
        pub kind: EntityKind,
        pub class_name: Option<String>,
        pub layer: Option<LayerInfo>,
        pub color: EntityColor,
    }

    /// 缓存中的实体元数据。
    ///
    /// `original_color` 只在构造时写入一次，没有任何修改入口，
    /// 因此无论覆盖多少次，恢复时总能回到首次接触时的颜色。
    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct EntityRecord {
        pub handle: Handle,
        pub kind: EntityKind,
        pub type_name: String,
        pub layer: Option<String>,
        pub layer_color: Option<Rgb>,
        pub color_type: ColorType,
        pub index_color: Option<u8>,
        pub true_color: Option<Rgb>,
        original_color: ColorValue,
        pub current_override: Option<ColorValue>,
        pub last_color_option: Option<String>,
        pub has_color_changed: bool,
        #[serde(skip)]
        pub entity_ref: EntityRef,
    }

    impl EntityRecord {
        pub fn capture(entity_ref: EntityRef, props: EntityProps) -> Self {
            let type_name = display_type_name(props.class_name.as_deref(), props.kind);
            let (layer, layer_color) = match props.layer {
                Some(info) => (Some(info.name), info.color),
                None => (None, None),
            };
            Self {
                handle: props.handle,
                kind: props.kind,
                type_name,
                layer,
                layer_color,
                color_type: props.color.color_type,
                index_color: props.color.index,
                true_color: props.color.true_color,
                original_color: props.color.value(),
                current_override: None,
                last_color_option: None,
                has_color_changed: false,
                entity_ref,
            }
        }

        #[inline]
        pub fn original_color(&self) -> ColorValue {
            self.original_color
        }

        /// 高亮之前应呈现的颜色：用户覆盖色优先，否则为原色。
        #[inline]
        pub fn base_color(&self) -> ColorValue {
            self.current_override.unwrap_or(self.original_color)
        }

        pub fn record_override(&mut self, value: ColorValue, option_id: Option<String>) {
            self.current_override = Some(value);
            self.last_color_option = option_id;
            self.has_color_changed = true;
        }

        pub fn clear_override(&mut self) {
            self.current_override = None;
            self.last_color_option = None;
            self.has_color_changed = false;
        }
    }

    /// 去掉 `AcDb` 前缀得到显示用类型名；块参照固定为 `Insert`。
    pub fn display_type_name(class_name: Option<&str>, kind: EntityKind) -> String {
        if kind == EntityKind::Insert {
            return "Insert".to_string();
        }
        match class_name {
            Some(name) if !name.is_empty() => name.strip_prefix("AcDb").unwrap_or(name).to_string(),
            _ => "unknown".to_string(),
        }
    }

}

pub mod request {
    use serde::{Deserialize, Serialize};

    use crate::color::ColorValue;
    use crate::handle::{Handle, normalize_handles};

    /// 指针选择与外部高亮推送共用的唯一消息形态。
    #[derive(Debug, Clone, PartialEq, Eq, Default)]
    pub struct HighlightRequest {
        pub handles: Vec<Handle>,
        pub additive: bool,
        pub color: Option<ColorValue>,
        pub open_detail_panel: bool,
    }

    impl HighlightRequest {
        /// 由外部原始字符串构造，空值与重复值在进入引擎前过滤掉。
        pub fn from_raw<I, S>(raw: I, options: HighlightOptions) -> Self
        where
            I: IntoIterator<Item = S>,
            S: AsRef<str>,
        {
            Self {
                handles: normalize_handles(raw),
                additive: options.additive,
                color: options.color,
                open_detail_panel: options.open_detail_panel,
            }
        }
    }

    /// 外部界面推送高亮时的选项。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct HighlightOptions {
        pub additive: bool,
        pub color: Option<ColorValue>,
        pub open_detail_panel: bool,
    }

    /// 每次选中集变化时发给宿主 UI 的消息；`handles` 是完整选中集而非增量。
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct SelectionChanged {
        pub handles: Vec<Handle>,
        pub additive: bool,
        pub open_detail_panel: bool,
    }

}

pub mod equipment {
    use std::collections::{HashMap, HashSet};

    use serde::{Deserialize, Serialize};

    use crate::handle::{Handle, split_tag_handles};

    /// 文档载荷中的一条设备位号引用。
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct TagRef {
        pub tag_no: String,
        pub function: Option<String>,
        pub tag_type: String,
        pub lib_desc: Option<String>,
        pub tag_handle: String,
    }

    /// 设备信息面板的一组条目：同一位号、同一功能下的选中句柄。
    #[derive(Debug, Clone, PartialEq, Eq, Serialize)]
    pub struct EquipmentInfoEntry {
        pub tag_no: String,
        pub function: Option<String>,
        pub handles: Vec<Handle>,
        pub tag_type: String,
        pub lib_desc: Option<String>,
        pub handle_key: String,
    }

    /// 句柄 ↔ 位号的交叉索引，用于设备过滤与位号组扩展。
    #[derive(Debug, Clone, Default)]
    pub struct EquipmentIndex {
        tags_by_handle: HashMap<Handle, Vec<TagRef>>,
        handles_by_tag: HashMap<String, Vec<Handle>>,
        equipment: HashSet<Handle>,
    }

    impl EquipmentIndex {
        pub fn new() -> Self {
            Self::default()
        }

        /// 登记一条位号；`tag_handle` 可以包含多个 `/` 分隔的句柄。
        pub fn insert_tag(&mut self, tag: TagRef) {
            let handles = split_tag_handles(&tag.tag_handle);
            for handle in handles {
                self.equipment.insert(handle.clone());
                if !tag.tag_no.is_empty() {
                    let group = self.handles_by_tag.entry(tag.tag_no.clone()).or_default();
                    if !group.contains(&handle) {
                        group.push(handle.clone());
                    }
                }
                self.tags_by_handle.entry(handle).or_default().push(tag.clone());
            }
        }

        /// 追加仅用于选择过滤的设备句柄（来自设备树）。
        pub fn extend_equipment<I: IntoIterator<Item = Handle>>(&mut self, handles: I) {
            self.equipment.extend(handles);
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.equipment.is_empty()
        }

        #[inline]
        pub fn is_equipment(&self, handle: &Handle) -> bool {
            self.equipment.contains(handle)
        }

        pub fn tags_for(&self, handle: &Handle) -> &[TagRef] {
            self.tags_by_handle
                .get(handle)
                .map(Vec::as_slice)
                .unwrap_or(&[])
        }

        /// 把每个句柄扩展为共享位号的全部句柄，保持首次出现顺序。
        pub fn expand_group(&self, handles: &[Handle]) -> Vec<Handle> {
            let mut seen: HashSet<&Handle> = HashSet::new();
            let mut expanded: Vec<Handle> = Vec::new();
            for handle in handles {
                if seen.insert(handle) {
                    expanded.push(handle.clone());
                }
                for tag in self.tags_for(handle) {
                    let Some(group) = self.handles_by_tag.get(&tag.tag_no) else {
                        continue;
                    };
                    for related in group {
                        if seen.insert(related) {
                            expanded.push(related.clone());
                        }
                    }
                }
            }
            expanded
        }

        /// 按 `(位号, 功能)` 对选中句柄分组。
        pub fn info_entries(&self, handles: &[Handle]) -> Vec<EquipmentInfoEntry> {
            let mut entries: Vec<EquipmentInfoEntry> = Vec::new();
            for handle in handles {
                for tag in self.tags_for(handle) {
                    let existing = entries
                        .iter_mut()
                        .find(|entry| entry.tag_no == tag.tag_no && entry.function == tag.function);
                    match existing {
                        Some(entry) => {
                            if !entry.handles.contains(handle) {
                                entry.handles.push(handle.clone());
                            }
                        }
                        None => entries.push(EquipmentInfoEntry {
                            tag_no: tag.tag_no.clone(),
                            function: tag.function.clone(),
                            handles: vec![handle.clone()],
                            tag_type: tag.tag_type.clone(),
                            lib_desc: tag.lib_desc.clone(),
                            handle_key: tag.tag_handle.clone(),
                        }),
                    }
                }
            }
            entries
        }
    }

}

pub mod mode {
    use serde::{Deserialize, Serialize};

    /// 查看器工作模式，决定选择策略。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
    #[serde(rename_all = "lowercase")]
    pub enum ViewerMode {
        Pid,
        Pld,
        #[default]
        Intelligent,
        Inherit,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SelectionPolicy {
        pub allow_drag_select: bool,
        pub restrict_to_equipment: bool,
        pub allow_hover: bool,
    }

    impl ViewerMode {
        pub fn policy(self) -> SelectionPolicy {
            SelectionPolicy {
                allow_drag_select: self == ViewerMode::Intelligent,
                restrict_to_equipment: self == ViewerMode::Pid,
                allow_hover: self == ViewerMode::Pid,
            }
        }
    }
}
