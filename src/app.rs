//! The periodic monitoring driver and its presentation shell.
//!
//! Everything runs on the winit event-loop thread: a tick fires every [`TICK_INTERVAL`], reads one
//! camera frame, runs the [`Analyzer`], feeds the classified reading into the
//! [`Monitor`](crate::monitor::Monitor), and puts the annotated frame on screen. A slow tick
//! delays the next one instead of overlapping it.
//!
//! Reminders are not modal dialogs: when the monitor decides to remind, the shell overlays a
//! banner with two keyboard actions and keeps ticking. The user's choice is fed back into the
//! monitor asynchronously.
//!
//! Controls:
//!
//! * `Space`/`P`: pause/resume monitoring (pausing releases the camera device)
//! * `S`: while the reminder banner is up, snooze reminders for 10 minutes
//! * `Enter`: while the reminder banner is up, dismiss the reminder
//! * `Escape`: quit

use std::time::{Duration, Instant};

use itertools::Itertools;
use winit::{
    event::{ElementState, Event, KeyboardInput, StartCause, VirtualKeyCode, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
};

use crate::gui::{Gpu, Renderer, Window};
use crate::image::{draw, Color, Image, Rect, Resolution};
use crate::monitor::{Decision, Monitor, ReminderResponse, State};
use crate::timer::Timer;
use crate::video::webcam::{Webcam, WebcamOptions};

/// Interval between monitoring ticks.
pub const TICK_INTERVAL: Duration = Duration::from_secs(3);

/// One classified reading produced by an [`Analyzer`].
pub struct Observation {
    /// Human-readable status line, drawn onto the preview frame.
    pub label: String,
    /// Whether the monitored condition is currently bad.
    pub bad: bool,
    /// Color used for the status line and overlay markers.
    pub color: Color,
}

/// The per-application half of a monitor: inference and classification for one kind of condition.
pub trait Analyzer {
    /// Name shown as the window title.
    fn name(&self) -> &'static str;

    /// Message shown in the reminder banner when the bad condition has persisted.
    fn reminder(&self) -> &'static str;

    /// Analyzes one camera frame, drawing overlay markers onto it.
    ///
    /// Returns `None` when the frame contains no usable reading (nothing detected, or degenerate
    /// geometry). Such ticks feed nothing into the monitor: absent data neither extends nor
    /// resets a streak.
    fn analyze(&mut self, image: &mut Image) -> anyhow::Result<Option<Observation>>;

    /// Profiling timers, logged after every tick.
    fn timers(&self) -> Box<dyn Iterator<Item = &Timer> + '_>;
}

/// Runs the monitoring loop with the given analyzer until the user quits.
pub fn run<A: Analyzer + 'static>(analyzer: A) -> anyhow::Result<()> {
    let event_loop = EventLoop::new();

    let webcam = match Webcam::open(WebcamOptions::default()) {
        Ok(webcam) => Some(webcam),
        Err(e) => {
            log::error!("cannot access camera: {e}");
            None
        }
    };

    let resolution = webcam
        .as_ref()
        .map_or(Resolution::RES_720P, |w| w.resolution());
    let window = Window::open(&event_loop, analyzer.name(), resolution)?;
    let renderer = Renderer::new(window, Gpu::get())?;

    let status = if webcam.is_some() {
        "Monitoring...".to_string()
    } else {
        "Error: Cannot access camera.".to_string()
    };

    let mut app = App {
        analyzer,
        monitor: Monitor::new(),
        webcam,
        renderer,
        resolution,
        status,
        paused: false,
        prompt: false,
        next_tick: Instant::now() + TICK_INTERVAL,
    };
    app.refresh_blank();

    event_loop.run(move |event, _, flow| {
        app.handle(&event, flow);
    })
}

struct App<A: Analyzer> {
    analyzer: A,
    monitor: Monitor,
    /// `None` while paused or when the camera could not be opened.
    webcam: Option<Webcam>,
    renderer: Renderer,
    resolution: Resolution,
    status: String,
    paused: bool,
    /// Whether the reminder banner is awaiting a user response.
    prompt: bool,
    next_tick: Instant,
}

impl<A: Analyzer> App<A> {
    fn handle(&mut self, event: &Event<'_, ()>, flow: &mut ControlFlow) {
        match event {
            Event::NewEvents(StartCause::ResumeTimeReached { .. }) => {
                self.tick();
            }
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested => {
                    self.quit(flow);
                    return;
                }
                WindowEvent::KeyboardInput {
                    input:
                        KeyboardInput {
                            state: ElementState::Pressed,
                            virtual_keycode: Some(key),
                            ..
                        },
                    ..
                } => {
                    if self.key_pressed(*key, flow) {
                        return;
                    }
                }
                _ => {}
            },
            Event::RedrawRequested(_) => {
                self.renderer.redraw();
            }
            _ => {}
        }

        *flow = ControlFlow::WaitUntil(self.next_tick);
    }

    /// Handles a key press. Returns `true` if the application is exiting.
    fn key_pressed(&mut self, key: VirtualKeyCode, flow: &mut ControlFlow) -> bool {
        match key {
            VirtualKeyCode::Escape => {
                self.quit(flow);
                return true;
            }
            VirtualKeyCode::Space | VirtualKeyCode::P => self.toggle_pause(),
            VirtualKeyCode::S if self.prompt => {
                self.monitor
                    .resolve(ReminderResponse::Snooze, Instant::now());
                self.prompt = false;
                self.status = "Snoozed for 10 minutes.".to_string();
                self.refresh_blank();
            }
            VirtualKeyCode::Return if self.prompt => {
                self.monitor
                    .resolve(ReminderResponse::Acknowledge, Instant::now());
                self.prompt = false;
            }
            _ => {}
        }
        false
    }

    fn quit(&mut self, flow: &mut ControlFlow) {
        // Release the camera before tearing the window down.
        self.webcam = None;
        *flow = ControlFlow::Exit;
    }

    fn toggle_pause(&mut self) {
        if self.paused {
            match Webcam::open(WebcamOptions::default()) {
                Ok(webcam) => {
                    self.webcam = Some(webcam);
                    self.status = "Monitoring...".to_string();
                }
                Err(e) => {
                    log::error!("cannot access camera: {e}");
                    self.webcam = None;
                    self.status = "Error: Cannot access camera.".to_string();
                }
            }
            self.paused = false;
        } else {
            self.webcam = None;
            self.paused = true;
            self.status = "Paused.".to_string();
        }
        self.refresh_blank();
    }

    fn tick(&mut self) {
        self.next_tick = Instant::now() + TICK_INTERVAL;

        let now = Instant::now();
        if self.paused {
            return;
        }
        if self.monitor.is_snoozed(now) {
            // Snoozed ticks skip everything, including capture and inference.
            return;
        }

        let Some(webcam) = &mut self.webcam else {
            return;
        };

        let mut image = match webcam.read() {
            Ok(image) => image,
            Err(e) => {
                // Transient; the next tick is the retry.
                log::error!("camera error: {e}");
                self.status = "Camera error.".to_string();
                self.refresh_blank();
                return;
            }
        };

        match self.analyzer.analyze(&mut image) {
            Ok(Some(observation)) => {
                if let Decision::Remind = self.monitor.observe(now, observation.bad) {
                    self.prompt = true;
                }
                self.status = observation.label.clone();
                draw::text(&mut image, 30, 50, &observation.label)
                    .align_left()
                    .color(observation.color);
            }
            Ok(None) => {
                self.status = "No detection.".to_string();
                draw::text(&mut image, 30, 50, &self.status)
                    .align_left()
                    .color(Color::YELLOW);
            }
            Err(e) => {
                log::error!("inference error: {e}");
                self.status = "Inference error.".to_string();
            }
        }

        // The reminder clears itself if the condition recovers before the user responds.
        if self.prompt && self.monitor.state(now) == State::Idle {
            self.prompt = false;
        }
        if self.prompt {
            self.draw_reminder(&mut image);
        }

        self.present(&image);

        if let Some(webcam) = &self.webcam {
            log::debug!(
                "tick: {}",
                webcam
                    .timers()
                    .chain(self.analyzer.timers())
                    .map(|t| t.to_string())
                    .join(", "),
            );
        }
    }

    /// Draws the reminder banner with its two keyboard actions.
    fn draw_reminder(&mut self, image: &mut Image) {
        let width = image.width() as f32;
        let height = image.height() as f32;
        let banner_h = 80.0;
        draw::rect(
            image,
            Rect::from_top_left(0.0, height - banner_h, width, banner_h),
        )
        .color(Color::BLACK)
        .fill();

        let center_x = (width / 2.0) as i32;
        let y = (height - banner_h) as i32;
        draw::text(image, center_x, y + 25, self.analyzer.reminder()).color(Color::WHITE);
        draw::text(image, center_x, y + 55, "[S] Snooze 10 min    [Enter] Dismiss")
            .color(Color::YELLOW);
    }

    /// Displays a blank frame with the current status line.
    fn refresh_blank(&mut self) {
        let mut image = Image::new(self.resolution.width(), self.resolution.height());
        draw::text(&mut image, 30, 50, &self.status)
            .align_left()
            .color(Color::WHITE);
        self.present(&image);
    }

    fn present(&mut self, image: &Image) {
        self.renderer.update_texture(image.resolution(), image.data());
        self.renderer.window().request_redraw();
    }
}
