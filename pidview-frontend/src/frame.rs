use pidview_engine::backend::ViewportCommand;

use crate::overlay::backing_extent;

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingWheel {
    delta: f64,
    x: f64,
    y: f64,
}

/// 把滚轮与尺寸变化合并为每个动画帧最多一次的视口命令。
///
/// 滚轮增量在帧内累加，缩放方向由累计值的符号决定，缩放中心取最后一次光标位置；
/// 尺寸变化只保留最后一次。
#[derive(Debug, Clone)]
pub struct FrameDebouncer {
    zoom_factor: f64,
    wheel: Option<PendingWheel>,
    resize: Option<(u32, u32)>,
}

impl FrameDebouncer {
    pub fn new(zoom_factor: f64) -> Self {
        Self {
            zoom_factor,
            wheel: None,
            resize: None,
        }
    }

    /// 光标位置为设备像素。
    pub fn queue_wheel(&mut self, delta_y: f64, x: f64, y: f64) {
        let pending = self.wheel.get_or_insert(PendingWheel {
            delta: 0.0,
            x,
            y,
        });
        pending.delta += delta_y;
        pending.x = x;
        pending.y = y;
    }

    pub fn queue_resize(&mut self, css_width: f64, css_height: f64, dpr: f64) {
        self.resize = Some((backing_extent(css_width, dpr), backing_extent(css_height, dpr)));
    }

    pub fn is_pending(&self) -> bool {
        self.wheel.is_some() || self.resize.is_some()
    }

    pub fn cancel(&mut self) {
        self.wheel = None;
        self.resize = None;
    }

    /// 动画帧回调：取出本帧合并后的命令，尺寸同步在缩放之前。
    pub fn flush(&mut self) -> Vec<ViewportCommand> {
        let mut commands = Vec::new();
        if let Some((width, height)) = self.resize.take() {
            commands.push(ViewportCommand::Resize { width, height });
        }
        if let Some(wheel) = self.wheel.take() {
            if wheel.delta != 0.0 {
                let factor = if wheel.delta > 0.0 {
                    1.0 / self.zoom_factor
                } else {
                    self.zoom_factor
                };
                commands.push(ViewportCommand::ZoomAt {
                    factor,
                    x: wheel.x,
                    y: wheel.y,
                });
            }
        }
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wheel_events_collapse_into_one_zoom_per_frame() {
        let mut frames = FrameDebouncer::new(1.1);
        frames.queue_wheel(-40.0, 10.0, 10.0);
        frames.queue_wheel(-20.0, 12.0, 14.0);
        frames.queue_wheel(10.0, 16.0, 18.0);
        assert!(frames.is_pending());

        let commands = frames.flush();
        assert_eq!(
            commands,
            vec![ViewportCommand::ZoomAt {
                factor: 1.1,
                x: 16.0,
                y: 18.0
            }]
        );
        assert!(frames.flush().is_empty());
    }

    #[test]
    fn scrolling_down_zooms_out() {
        let mut frames = FrameDebouncer::new(2.0);
        frames.queue_wheel(3.0, 0.0, 0.0);
        assert_eq!(
            frames.flush(),
            vec![ViewportCommand::ZoomAt {
                factor: 0.5,
                x: 0.0,
                y: 0.0
            }]
        );
    }

    #[test]
    fn last_resize_wins_and_precedes_zoom() {
        let mut frames = FrameDebouncer::new(1.1);
        frames.queue_resize(100.0, 100.0, 1.0);
        frames.queue_wheel(-1.0, 5.0, 5.0);
        frames.queue_resize(320.4, 200.0, 1.5);

        let commands = frames.flush();
        assert_eq!(
            commands[0],
            ViewportCommand::Resize {
                width: 480,
                height: 300
            }
        );
        assert_eq!(commands.len(), 2);
    }

    #[test]
    fn cancelled_frame_emits_nothing() {
        let mut frames = FrameDebouncer::new(1.1);
        frames.queue_resize(10.0, 10.0, 1.0);
        frames.cancel();
        assert!(!frames.is_pending());
        assert!(frames.flush().is_empty());
    }
}
