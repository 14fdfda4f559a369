use std::convert::Infallible;
use std::env;
use std::path::PathBuf;

use futures::executor::block_on;
use pidview_config::AppConfig;
use pidview_core::color::ColorValue;
use pidview_core::handle::DocumentId;
use pidview_engine::memory::{DemoEntities, MemoryBackend};
use pidview_engine::registry::{DocumentRegistry, OpenOutcome};
use pidview_engine::selection::SelectionSettings;
use pidview_engine::session::ViewerSession;
use pidview_io::{DocumentPayload, JsonPayloadFacade, PayloadLoader, parse_document};
use tracing::{info, warn};

use crate::errors::FrontendError;

pub const TAGS_ENV: &str = "PIDVIEW_TAGS_JSON";

const DEMO_DOCUMENT: &str = include_str!("../data/demo_document.json");

/// 位号载荷来源，便于前端呈现加载信息。
#[derive(Debug, Clone)]
pub enum PayloadSource {
    File(PathBuf),
    Demo,
}

/// 打开后的演示文档：注册表、会话、内存引擎与位号载荷。
pub struct LoadedDocument {
    pub registry: DocumentRegistry,
    pub session: ViewerSession,
    pub backend: MemoryBackend,
    pub demo_entities: DemoEntities,
    pub payload: DocumentPayload,
    pub source: PayloadSource,
}

/// 把配置映射为选择控制器参数。
pub fn selection_settings(config: &AppConfig) -> SelectionSettings {
    SelectionSettings {
        mode: config.viewer.mode,
        highlight_color: ColorValue::Rgb(config.colors.selection_rgb()),
        hover_color: ColorValue::Rgb(config.colors.hover_rgb()),
        equipment_color: ColorValue::Rgb(config.colors.equipment_rgb()),
        click_radius: config.interaction.click_radius,
        pick_escalation: config.interaction.pick_escalation.clone(),
        focus_zoom_factor: config.interaction.focus_zoom_factor,
    }
}

/// 从环境变量 `PIDVIEW_TAGS_JSON` 指定的路径读取位号载荷，
/// 若失败则回退到内置示例。
pub fn load_payload_from_env_or_demo() -> Result<(DocumentPayload, PayloadSource), FrontendError> {
    if let Some(path) = env::var_os(TAGS_ENV) {
        let path = PathBuf::from(path);
        match JsonPayloadFacade::new().load_document(&path) {
            Ok(payload) => {
                info!(path = %path.display(), tags = payload.tags.len(), "从文件加载位号载荷成功");
                return Ok((payload, PayloadSource::File(path)));
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "加载位号载荷失败，回退到内置示例");
            }
        }
    }
    Ok((parse_document(DEMO_DOCUMENT)?, PayloadSource::Demo))
}

/// 打开内置演示图纸：在注册表中创建会话，等待内存引擎初始化完成，再装入位号索引。
pub fn open_demo_document(config: &AppConfig) -> Result<LoadedDocument, FrontendError> {
    let (payload, source) = load_payload_from_env_or_demo()?;
    let id = DocumentId::new(payload.docno.clone().unwrap_or_else(|| "demo".to_string()));

    let mut registry =
        DocumentRegistry::with_limit(selection_settings(config), config.viewer.max_open_documents);
    let backend = MemoryBackend::new();
    let demo_entities = backend.populate_demo();

    let session = match registry.open(id)? {
        OpenOutcome::Created { session, ticket } => {
            let engine = backend.clone();
            block_on(ticket.run(async move { Ok::<_, Infallible>(engine) }))?;
            session
        }
        OpenOutcome::Reactivated(session) => session,
    };
    session.set_equipment_index(payload.equipment_index());
    info!(document = %session.document(), mode = ?config.viewer.mode, "演示文档已就绪");

    Ok(LoadedDocument {
        registry,
        session,
        backend,
        demo_entities,
        payload,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pidview_core::color::Rgb;

    #[test]
    fn settings_follow_configuration() {
        let mut config = AppConfig::default();
        config.colors.selection = [1, 2, 3];
        config.interaction.click_radius = 7.5;
        let settings = selection_settings(&config);
        assert_eq!(settings.highlight_color, ColorValue::Rgb(Rgb::new(1, 2, 3)));
        assert_eq!(settings.click_radius, 7.5);
        assert_eq!(settings.pick_escalation, vec![6.0, 10.0]);
    }

    #[test]
    fn demo_document_opens_ready_with_equipment_index() {
        let loaded = open_demo_document(&AppConfig::default()).unwrap();
        assert!(loaded.session.is_ready());
        assert_eq!(loaded.registry.len(), 1);
        assert_eq!(loaded.payload.tags.len(), 3);
        let pump = loaded.demo_entities.pump.clone();
        let is_equipment = loaded
            .session
            .with_controller(|controller| controller.equipment().is_equipment(&pump));
        assert_eq!(is_equipment, Some(true));
    }
}
