use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use pidview_core::color::Rgb;
use pidview_core::mode::ViewerMode;
use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_ENV: &str = "PIDVIEW_CONFIG";

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub viewer: ViewerConfig,
    #[serde(default)]
    pub interaction: InteractionConfig,
    #[serde(default)]
    pub colors: ColorConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// 自动发现配置文件：优先读取环境变量 `PIDVIEW_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        Self::discover_with(None)
    }

    /// 命令行显式给出的路径优先于环境变量。
    pub fn discover_with(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Some(path) = env::var_os(CONFIG_ENV) {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let interaction = &self.interaction;
        if !(interaction.drag_threshold.is_finite() && interaction.drag_threshold > 0.0) {
            return Err(ConfigError::Invalid(
                "interaction.drag_threshold 必须为正数".to_string(),
            ));
        }
        if !(interaction.click_radius.is_finite() && interaction.click_radius > 0.0) {
            return Err(ConfigError::Invalid(
                "interaction.click_radius 必须为正数".to_string(),
            ));
        }
        if interaction
            .pick_escalation
            .iter()
            .any(|radius| !(radius.is_finite() && *radius > 0.0))
        {
            return Err(ConfigError::Invalid(
                "interaction.pick_escalation 只能包含正数".to_string(),
            ));
        }
        if !(interaction.wheel_zoom_factor.is_finite() && interaction.wheel_zoom_factor > 1.0) {
            return Err(ConfigError::Invalid(
                "interaction.wheel_zoom_factor 必须大于 1".to_string(),
            ));
        }
        if self.viewer.max_open_documents == 0 {
            return Err(ConfigError::Invalid(
                "viewer.max_open_documents 不能为 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewerConfig {
    #[serde(default)]
    pub mode: ViewerMode,
    #[serde(default = "ViewerConfig::default_max_open")]
    pub max_open_documents: usize,
}

impl ViewerConfig {
    fn default_max_open() -> usize {
        5
    }
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            mode: ViewerMode::default(),
            max_open_documents: Self::default_max_open(),
        }
    }
}

/// 指针交互参数，长度单位为 CSS 像素（拾取半径会乘以设备像素比）。
#[derive(Debug, Clone, Deserialize)]
pub struct InteractionConfig {
    #[serde(default = "InteractionConfig::default_drag_threshold")]
    pub drag_threshold: f64,
    #[serde(default = "InteractionConfig::default_click_radius")]
    pub click_radius: f64,
    #[serde(default = "InteractionConfig::default_pick_escalation")]
    pub pick_escalation: Vec<f64>,
    #[serde(default = "InteractionConfig::default_double_click_ms")]
    pub middle_double_click_ms: u64,
    #[serde(default = "InteractionConfig::default_wheel_zoom_factor")]
    pub wheel_zoom_factor: f64,
    #[serde(default = "InteractionConfig::default_focus_zoom_factor")]
    pub focus_zoom_factor: f64,
}

impl InteractionConfig {
    fn default_drag_threshold() -> f64 {
        5.0
    }

    fn default_click_radius() -> f64 {
        4.0
    }

    fn default_pick_escalation() -> Vec<f64> {
        vec![6.0, 10.0]
    }

    fn default_double_click_ms() -> u64 {
        400
    }

    fn default_wheel_zoom_factor() -> f64 {
        1.1
    }

    fn default_focus_zoom_factor() -> f64 {
        0.2
    }
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            drag_threshold: Self::default_drag_threshold(),
            click_radius: Self::default_click_radius(),
            pick_escalation: Self::default_pick_escalation(),
            middle_double_click_ms: Self::default_double_click_ms(),
            wheel_zoom_factor: Self::default_wheel_zoom_factor(),
            focus_zoom_factor: Self::default_focus_zoom_factor(),
        }
    }
}

/// 高亮颜色，TOML 中写作 `[r, g, b]`。
#[derive(Debug, Clone, Deserialize)]
pub struct ColorConfig {
    #[serde(default = "ColorConfig::default_selection")]
    pub selection: [u8; 3],
    #[serde(default = "ColorConfig::default_hover")]
    pub hover: [u8; 3],
    #[serde(default = "ColorConfig::default_equipment")]
    pub equipment: [u8; 3],
}

impl ColorConfig {
    fn default_selection() -> [u8; 3] {
        [255, 0, 0]
    }

    fn default_hover() -> [u8; 3] {
        [255, 170, 0]
    }

    fn default_equipment() -> [u8; 3] {
        [0, 160, 255]
    }

    #[inline]
    pub fn selection_rgb(&self) -> Rgb {
        Rgb::from(self.selection)
    }

    #[inline]
    pub fn hover_rgb(&self) -> Rgb {
        Rgb::from(self.hover)
    }

    #[inline]
    pub fn equipment_rgb(&self) -> Rgb {
        Rgb::from(self.equipment)
    }
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            selection: Self::default_selection(),
            hover: Self::default_hover(),
            equipment: Self::default_equipment(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
    #[error("配置取值无效: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_returned_when_file_missing() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.viewer.mode, ViewerMode::Intelligent);
        assert_eq!(cfg.viewer.max_open_documents, 5);
        assert_eq!(cfg.interaction.pick_escalation, vec![6.0, 10.0]);
        assert_eq!(cfg.interaction.middle_double_click_ms, 400);
        assert_eq!(cfg.colors.selection_rgb(), Rgb::new(255, 0, 0));
    }

    #[test]
    fn load_from_temp_file() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(
            file,
            r#"
            [logging]
            level = "debug"

            [viewer]
            mode = "pid"
            max_open_documents = 3

            [interaction]
            drag_threshold = 3.0
            pick_escalation = [8.0]

            [colors]
            hover = [1, 2, 3]
            "#
        )
        .unwrap();

        let cfg = AppConfig::from_file(file.path()).expect("load config");
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.viewer.mode, ViewerMode::Pid);
        assert_eq!(cfg.viewer.max_open_documents, 3);
        assert!((cfg.interaction.drag_threshold - 3.0).abs() < f64::EPSILON);
        assert!((cfg.interaction.click_radius - 4.0).abs() < f64::EPSILON);
        assert_eq!(cfg.interaction.pick_escalation, vec![8.0]);
        assert_eq!(cfg.colors.hover_rgb(), Rgb::new(1, 2, 3));
        assert_eq!(cfg.colors.equipment_rgb(), Rgb::new(0, 160, 255));
    }

    #[test]
    fn explicit_path_wins_and_invalid_values_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(file, "[interaction]\nwheel_zoom_factor = 0.5").unwrap();
        let err = AppConfig::discover_with(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let missing = AppConfig::discover_with(Some(Path::new("/nonexistent/pidview.toml")));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn malformed_toml_reports_parse_error() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(file, "[viewer]\nmode = \"sideways\"").unwrap();
        let err = AppConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
