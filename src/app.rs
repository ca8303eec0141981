//! Window shell and input bindings
//!
//! Binds the winit event loop to the controller: one controller tick per
//! redraw, keyboard mapped to the playback operations. All simulation state
//! lives in the controller; this module only routes events.

use std::sync::Arc;

use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowAttributes},
};

use crate::config::{ExecMode, SimulationConfig};
use crate::gfx::RenderEngine;
use crate::simulation::GenerationController;

/// The application: owns the event loop until `run` consumes it.
pub struct GridLifeApp {
    event_loop: EventLoop<()>,
    state: AppState,
}

struct AppState {
    config: SimulationConfig,
    controller: GenerationController,
    window: Option<Arc<Window>>,
    render_engine: Option<RenderEngine>,
    /// First fatal error; the loop exits and `run` reports it.
    fatal: Option<anyhow::Error>,
}

impl GridLifeApp {
    pub fn new(config: SimulationConfig, controller: GenerationController) -> anyhow::Result<Self> {
        let event_loop = EventLoop::new()?;
        event_loop.set_control_flow(ControlFlow::Poll);
        Ok(Self {
            event_loop,
            state: AppState {
                config,
                controller,
                window: None,
                render_engine: None,
                fatal: None,
            },
        })
    }

    /// Run the event loop until quit or a fatal error.
    pub fn run(mut self) -> anyhow::Result<()> {
        log::info!("controls:");
        log::info!("  space  start/stop");
        log::info!("  c      toggle CPU/device stepper");
        log::info!("  s      toggle single-generation mode");
        log::info!("  a      toggle blocking/polled readback");
        log::info!("  r      reset to seeded population");
        log::info!("  q/esc  quit");

        self.event_loop.run_app(&mut self.state)?;
        match self.state.fatal {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl AppState {
    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{error:#}");
        if self.fatal.is_none() {
            self.fatal = Some(error);
        }
        event_loop.exit();
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, key: KeyCode) {
        match key {
            KeyCode::Space => self.controller.toggle_pause(),
            KeyCode::KeyC => {
                // A run started with --cpu has no compute stepper yet;
                // build it on the display device the first time the user
                // asks for device mode. Failure leaves CPU mode active.
                if !self.controller.has_device() {
                    if let Some(engine) = self.render_engine.as_ref() {
                        if let Err(e) = self
                            .controller
                            .setup_device(engine.device(), engine.queue())
                        {
                            log::error!("device stepper setup failed: {e}");
                            return;
                        }
                    }
                }
                match self.controller.toggle_mode() {
                    Ok(mode) => log::info!("now stepping on {mode:?}"),
                    Err(e) => log::error!("mode switch failed: {e}"),
                }
            }
            KeyCode::KeyS => self.controller.toggle_single_step(),
            KeyCode::KeyA => self.controller.toggle_readback(),
            KeyCode::KeyR => {
                if let Err(e) = self.controller.reset() {
                    self.fail(event_loop, anyhow::Error::new(e).context("reset failed"));
                }
            }
            KeyCode::KeyQ | KeyCode::Escape => event_loop.exit(),
            _ => {}
        }
    }

    fn update_title(&self) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        let mode = match self.controller.mode() {
            ExecMode::Cpu => "CPU",
            ExecMode::Device => "GPU",
        };
        let timing = self
            .controller
            .execution_time_ms()
            .map(|ms| format!(" @ {ms:.3} ms/generation"))
            .unwrap_or_default();
        window.set_title(&format!(
            "Conway's Game of Life [{mode}] generation {}{timing}",
            self.controller.generation_count()
        ));
    }
}

impl ApplicationHandler for AppState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match event_loop.create_window(
            WindowAttributes::default()
                .with_title("Conway's Game of Life")
                .with_inner_size(winit::dpi::LogicalSize::new(
                    self.config.width.clamp(256, 1600),
                    self.config.height.clamp(256, 1200),
                )),
        ) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                return self.fail(event_loop, anyhow::Error::new(e).context("window creation"))
            }
        };
        self.window = Some(window.clone());

        let (width, height) = window.inner_size().into();
        let engine = match pollster::block_on(RenderEngine::new(
            window.clone(),
            width,
            height,
            self.config.width,
            self.config.height,
        )) {
            Ok(engine) => engine,
            Err(e) => {
                return self.fail(event_loop, anyhow::Error::new(e).context("display setup"))
            }
        };

        // Device-mode startup builds the compute stepper on the display
        // device. Failure here is fatal: there is no silent CPU fallback.
        if self.config.mode == ExecMode::Device && !self.controller.has_device() {
            if let Err(e) = self
                .controller
                .setup_device(engine.device(), engine.queue())
            {
                return self.fail(
                    event_loop,
                    anyhow::Error::new(e).context("device stepper setup"),
                );
            }
        }

        self.render_engine = Some(engine);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => self.handle_key(event_loop, key),
            WindowEvent::Resized(PhysicalSize { width, height }) => {
                if let Some(engine) = self.render_engine.as_mut() {
                    engine.resize(width, height);
                }
            }
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::RedrawRequested => {
                match self.controller.tick() {
                    Ok(_presented) => {}
                    Err(e) => {
                        return self.fail(
                            event_loop,
                            anyhow::Error::new(e).context("generation step"),
                        )
                    }
                }
                if let Some(engine) = self.render_engine.as_mut() {
                    engine.upload_image(self.controller.image());
                    engine.render_frame();
                }
                self.update_title();
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}
