use std::cell::RefCell;
use std::rc::Rc;

use pidview_config::AppConfig;
use pidview_core::request::HighlightOptions;
use pidview_engine::bus::HighlightBus;
use pidview_engine::command::{CommandBus, CommandContext, CommandRequest};
use pidview_engine::selection::SelectionEvent;
use pidview_engine::session::ViewerSession;
use tracing::{info, warn};

use crate::coords::{CssRect, HeadlessCanvas};
use crate::errors::FrontendError;
use crate::loader::{PayloadSource, open_demo_document};
use crate::overlay::{RecordingOverlay, SelectionOverlay};
use crate::router::{
    InputEvent, Modifiers, PointerButton, PointerRouter, RouterSettings, Viewport,
};

type Transcript = Rc<RefCell<Vec<String>>>;

/// 简易 CLI 演示：打开内置 P&ID 示例，模拟一组指针手势与设备树推送，
/// 然后依次执行脚本命令，打印每次选中变化。
pub fn run_demo(config: &AppConfig, script: Option<&str>) -> Result<(), FrontendError> {
    let lines = build_transcript(config, script)?;
    info!(lines = lines.len(), "CLI 演示完成");
    for line in lines {
        println!("{line}");
    }
    Ok(())
}

/// 生成演示输出而不打印，便于测试。
pub fn build_transcript(config: &AppConfig, script: Option<&str>) -> Result<Vec<String>, FrontendError> {
    let mut loaded = open_demo_document(config)?;
    let transcript: Transcript = Rc::new(RefCell::new(Vec::new()));
    let session = loaded.session.clone();

    push(&transcript, "PID 查看器 CLI 演示".to_string());
    match &loaded.source {
        PayloadSource::File(path) => {
            push(&transcript, format!("已从文件加载位号载荷：{}", path.display()));
        }
        PayloadSource::Demo => {
            push(&transcript, "使用内置示例位号载荷".to_string());
        }
    }
    push(
        &transcript,
        format!(
            "文档 {} (版本 {})，模式 {:?}，位号 {} 个",
            session.document(),
            loaded.payload.docvr.as_deref().unwrap_or("-"),
            config.viewer.mode,
            loaded.payload.tags.len()
        ),
    );

    let command_bus = CommandBus::new();
    push(
        &transcript,
        format!("支持的命令: {}", command_bus.available_commands().join(", ")),
    );

    let sink = transcript.clone();
    let mut failures: Vec<String> = Vec::new();
    let subscription = session.subscribe(Box::new(move |event: &SelectionEvent| {
        match describe_event(event) {
            Ok(lines) => sink.borrow_mut().extend(lines),
            Err(err) => warn!(error = %err, "无法描述选中事件"),
        }
    }));

    let canvas = HeadlessCanvas::new(CssRect::new(0.0, 0.0, 400.0, 300.0), 1.0);
    let overlay = RecordingOverlay::new();
    let mut attachment = PointerRouter::attach(
        Viewport {
            session: session.clone(),
            canvas: Box::new(canvas),
            overlay: SelectionOverlay::new(Box::new(overlay)),
        },
        RouterSettings::from(&config.interaction),
    );
    let ids = loaded.demo_entities.clone();

    push(&transcript, format!("> 单击泵 {}", ids.pump));
    click(&mut attachment, 130.0, 130.0, Modifiers::NONE);

    push(&transcript, format!("> Ctrl+单击阀门 {}", ids.valve));
    click(
        &mut attachment,
        310.0,
        130.0,
        Modifiers {
            ctrl: true,
            ..Modifiers::NONE
        },
    );

    push(&transcript, "> 框选泵区域".to_string());
    attachment.dispatch(pointer_down(90.0, 90.0));
    attachment.dispatch(InputEvent::PointerMove {
        client_x: 220.0,
        client_y: 165.0,
    });
    attachment.dispatch(InputEvent::PointerUp {
        button: PointerButton::Primary,
        client_x: 220.0,
        client_y: 165.0,
        modifiers: Modifiers::NONE,
    });

    push(&transcript, "> Esc".to_string());
    attachment.dispatch(InputEvent::Escape);

    push(&transcript, format!("> 设备树推送 {}", ids.valve));
    let bus = HighlightBus::new(session.clone());
    bus.push_tag(
        ids.valve.as_str(),
        HighlightOptions {
            additive: false,
            color: session.with_controller(|controller| controller.settings().equipment_color),
            open_detail_panel: true,
        },
    );

    if let Some(script) = script {
        let context = CommandContext { session: &session };
        for line in script.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some(request) = CommandRequest::parse_line(line) else {
                continue;
            };
            push(&transcript, format!("> {line}"));
            if let Err(err) = dispatch_cli_command(&command_bus, &request, &context, &transcript) {
                failures.push(err);
            }
        }
    }

    attachment.detach();
    summarize(&session, &transcript);

    let id = session.document();
    push(&transcript, format!("> 关闭文档 {id}"));
    loaded.registry.close(&id)?;
    session.unsubscribe(subscription);
    if !failures.is_empty() {
        warn!(count = failures.len(), "部分脚本命令执行失败");
    }

    let lines = transcript.borrow().clone();
    Ok(lines)
}

fn push(transcript: &Transcript, line: String) {
    transcript.borrow_mut().push(line);
}

fn pointer_down(client_x: f64, client_y: f64) -> InputEvent {
    InputEvent::PointerDown {
        button: PointerButton::Primary,
        client_x,
        client_y,
        modifiers: Modifiers::NONE,
        timestamp_ms: 0,
    }
}

fn click(attachment: &mut crate::router::Attachment, x: f64, y: f64, modifiers: Modifiers) {
    attachment.dispatch(pointer_down(x, y));
    attachment.dispatch(InputEvent::PointerUp {
        button: PointerButton::Primary,
        client_x: x,
        client_y: y,
        modifiers,
    });
}

fn dispatch_cli_command(
    command_bus: &CommandBus,
    request: &CommandRequest,
    context: &CommandContext<'_>,
    transcript: &Transcript,
) -> Result<(), String> {
    let response = command_bus.dispatch(request, context);
    let message = response
        .message
        .unwrap_or_else(|| "命令未返回消息".to_string());
    if response.success {
        info!(command = %request.name, message = %message, "命令执行成功");
        push(transcript, format!("Ok({}): {message}", request.name));
        Ok(())
    } else {
        warn!(command = %request.name, message = %message, "命令执行失败");
        push(transcript, format!("Err({}): {message}", request.name));
        Err(message)
    }
}

fn describe_event(event: &SelectionEvent) -> Result<Vec<String>, serde_json::Error> {
    let mut lines = vec![format!(
        "选中变化[{:?}]: {}",
        event.origin,
        serde_json::to_string(&event.message)?
    )];
    for record in &event.records {
        lines.push(format!(
            "  - {} 类型={} 图层={} 原色={:?}{}",
            record.handle,
            record.type_name,
            record.layer.as_deref().unwrap_or("-"),
            record.original_color(),
            match record.last_color_option.as_deref() {
                Some(option) => format!(" 覆盖={option}"),
                None => String::new(),
            }
        ));
    }
    for entry in &event.equipment {
        lines.push(format!(
            "  * 位号 {} [{}] {} 句柄={}",
            entry.tag_no,
            entry.function.as_deref().unwrap_or("-"),
            entry.lib_desc.as_deref().unwrap_or(&entry.tag_type),
            entry.handle_key
        ));
    }
    Ok(lines)
}

fn summarize(session: &ViewerSession, transcript: &Transcript) {
    let selection = session.selection();
    if selection.is_empty() {
        push(transcript, "当前尚未选中任何实体。".to_string());
    } else {
        let handles: Vec<String> = selection.iter().map(|handle| handle.to_string()).collect();
        push(transcript, format!("选中集包含句柄：{}", handles.join(", ")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_reports_each_selection_change() {
        let lines = build_transcript(&AppConfig::default(), None).unwrap();
        let text = lines.join("\n");
        assert!(text.contains("支持的命令: clear_selection, color"));
        assert!(text.contains(r#""handles":["2A1","2A2"]"#), "{text}");
        assert!(text.contains(r#""handles":["2A1","2A2","3B7"]"#), "{text}");
        assert!(text.contains("位号 P-101 [PUMP] Centrifugal pump"));
        assert!(text.contains(r#"选中变化[External]: {"handles":["3B7"]"#), "{text}");
        assert!(lines.last().unwrap().contains("关闭文档") || text.contains("选中变化[Cancel]"));
    }

    #[test]
    fn script_failures_are_reported_but_not_fatal() {
        let script = "# 注释\ncolor index:5\ncolor purple\nrestore_colors\n";
        let lines = build_transcript(&AppConfig::default(), Some(script)).unwrap();
        assert!(lines.iter().any(|line| line.starts_with("Ok(color)")));
        assert!(lines.iter().any(|line| line.starts_with("Err(color)")));
        assert!(lines.iter().any(|line| line.contains("覆盖=index:5")));
        assert!(lines.iter().any(|line| line == "选中集包含句柄：3B7"));
    }
}
