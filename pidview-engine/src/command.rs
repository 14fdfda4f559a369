use std::collections::HashMap;

use pidview_core::color::ColorOption;
use pidview_core::handle::normalize_handles;
use pidview_core::request::HighlightRequest;

use crate::backend::ViewportCommand;
use crate::selection::SelectionOrigin;
use crate::session::{SessionCommand, ViewerSession};

#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub name: String,
    pub args: Vec<String>,
}

impl CommandRequest {
    /// 按空白拆分一行脚本：首个词为命令名，其余为参数。
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let name = words.next()?.to_string();
        Some(Self {
            name,
            args: words.map(str::to_string).collect(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct CommandResponse {
    pub success: bool,
    pub message: Option<String>,
}

impl CommandResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

pub trait CommandHandler: Send + Sync {
    fn name(&self) -> &'static str;
    fn execute(&self, request: &CommandRequest, context: &CommandContext<'_>) -> CommandResponse;
}

pub struct CommandContext<'a> {
    pub session: &'a ViewerSession,
}

/// 以名称分发的会话命令，供脚本与调试控制台使用。
pub struct CommandBus {
    handlers: HashMap<&'static str, Box<dyn CommandHandler>>,
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandBus {
    pub fn new() -> Self {
        let mut bus = Self {
            handlers: HashMap::new(),
        };
        bus.register(SelectCommand { additive: false });
        bus.register(SelectCommand { additive: true });
        bus.register(ClearSelectionCommand);
        bus.register(ColorCommand);
        bus.register(ColorMenuCommand);
        bus.register(RestoreColorsCommand);
        bus.register(ZoomToCommand);
        bus.register(ZoomExtentsCommand);
        bus
    }

    pub fn register<H: CommandHandler + 'static>(&mut self, handler: H) {
        self.handlers.insert(handler.name(), Box::new(handler));
    }

    pub fn dispatch(&self, request: &CommandRequest, context: &CommandContext<'_>) -> CommandResponse {
        if let Some(handler) = self.handlers.get(request.name.as_str()) {
            handler.execute(request, context)
        } else {
            CommandResponse::err(format!("未知命令: {}", request.name))
        }
    }

    pub fn available_commands(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

struct SelectCommand {
    additive: bool,
}

impl CommandHandler for SelectCommand {
    fn name(&self) -> &'static str {
        if self.additive { "toggle" } else { "select" }
    }

    fn execute(&self, request: &CommandRequest, context: &CommandContext<'_>) -> CommandResponse {
        let handles = normalize_handles(&request.args);
        if handles.is_empty() && self.additive {
            return CommandResponse::err("缺少句柄参数");
        }
        let count = handles.len();
        let session_command = if handles.is_empty() {
            SessionCommand::Clear
        } else {
            SessionCommand::Highlight {
                request: HighlightRequest {
                    handles,
                    additive: self.additive,
                    ..HighlightRequest::default()
                },
                origin: SelectionOrigin::External,
            }
        };
        context.session.submit(session_command);
        CommandResponse::ok(format!(
            "已提交 {count} 个句柄，当前选中 {} 个",
            context.session.selection().len()
        ))
    }
}

struct ClearSelectionCommand;

impl CommandHandler for ClearSelectionCommand {
    fn name(&self) -> &'static str {
        "clear_selection"
    }

    fn execute(&self, _request: &CommandRequest, context: &CommandContext<'_>) -> CommandResponse {
        context.session.submit(SessionCommand::Clear);
        CommandResponse::ok("选中集已清空")
    }
}

struct ColorCommand;

impl CommandHandler for ColorCommand {
    fn name(&self) -> &'static str {
        "color"
    }

    fn execute(&self, request: &CommandRequest, context: &CommandContext<'_>) -> CommandResponse {
        let Some(raw) = request.args.first() else {
            return CommandResponse::err("缺少颜色选项参数");
        };
        match raw.parse::<ColorOption>() {
            Ok(option) => {
                context.session.submit(SessionCommand::ColorOption(option));
                CommandResponse::ok(format!("已应用颜色选项 {}", option.id()))
            }
            Err(err) => CommandResponse::err(err.to_string()),
        }
    }
}

/// 列出当前选中集可用的颜色选项。
struct ColorMenuCommand;

impl CommandHandler for ColorMenuCommand {
    fn name(&self) -> &'static str {
        "colors"
    }

    fn execute(&self, _request: &CommandRequest, context: &CommandContext<'_>) -> CommandResponse {
        let Some(changed) = context.session.with_controller(|controller| {
            controller
                .records()
                .iter()
                .any(|record| record.has_color_changed)
        }) else {
            return CommandResponse::err("文档尚未就绪");
        };
        let ids: Vec<String> = ColorOption::menu(changed)
            .iter()
            .map(ColorOption::id)
            .collect();
        CommandResponse::ok(ids.join(" "))
    }
}

struct RestoreColorsCommand;

impl CommandHandler for RestoreColorsCommand {
    fn name(&self) -> &'static str {
        "restore_colors"
    }

    fn execute(&self, _request: &CommandRequest, context: &CommandContext<'_>) -> CommandResponse {
        context.session.submit(SessionCommand::RestoreSelectionColors);
        CommandResponse::ok("选中实体已恢复原色")
    }
}

struct ZoomToCommand;

impl CommandHandler for ZoomToCommand {
    fn name(&self) -> &'static str {
        "zoom_to"
    }

    fn execute(&self, request: &CommandRequest, context: &CommandContext<'_>) -> CommandResponse {
        let mut handles = normalize_handles(&request.args);
        let command = match handles.len() {
            0 => return CommandResponse::err("缺少句柄参数"),
            1 => match handles.pop() {
                Some(handle) => SessionCommand::ZoomToHandle(handle),
                None => return CommandResponse::err("缺少句柄参数"),
            },
            _ => SessionCommand::ZoomToHandles(handles),
        };
        context.session.submit(command);
        CommandResponse::ok("视口已定位")
    }
}

struct ZoomExtentsCommand;

impl CommandHandler for ZoomExtentsCommand {
    fn name(&self) -> &'static str {
        "zoom_extents"
    }

    fn execute(&self, _request: &CommandRequest, context: &CommandContext<'_>) -> CommandResponse {
        context
            .session
            .submit(SessionCommand::Navigate(ViewportCommand::ZoomExtents));
        CommandResponse::ok("视口已缩放至全图")
    }
}
