use std::sync::Arc;
use std::time::Instant;

use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowAttributes, WindowId};

use crate::backend::WgpuBackend;
use crate::engine::Engine;
use crate::error::{BackendError, Error, Result};
use crate::logging::{LoggingConfig, init_logging};
use crate::renderer::RendererSettings;

/// Configuration for the windowed runner.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub renderer: RendererSettings,
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Umbra".to_string(),
            width: 800,
            height: 600,
            renderer: RendererSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn renderer(mut self, settings: RendererSettings) -> Self {
        self.renderer = settings;
        self
    }

    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }
}

type SetupFn = Box<dyn FnOnce(&mut Engine<WgpuBackend>) -> Result<()>>;

/// Opens a window and drives an [`Engine`] from the winit event loop.
///
/// `setup` runs once the window and GPU exist and populates the scene. Each
/// redraw calls [`Engine::frame`] with the time since startup; resizes call
/// [`Engine::resize`]. The first error from setup or from a frame stops the
/// loop and is returned.
///
/// # Example
/// ```ignore
/// umbra::run(AppConfig::new().title("Shadows"), |engine| {
///     let (backend, scene) = engine.parts_mut();
///     // build materials with `backend`, add actors to `scene`
///     Ok(())
/// })?;
/// ```
pub fn run<S>(config: AppConfig, setup: S) -> Result<()>
where
    S: FnOnce(&mut Engine<WgpuBackend>) -> Result<()> + 'static,
{
    init_logging(config.logging.clone());
    log::info!("starting '{}' at {}x{}", config.title, config.width, config.height);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App {
        state: AppState::Pending {
            config,
            setup: Some(Box::new(setup)),
        },
        error: None,
    };
    event_loop.run_app(&mut app)?;

    match app.error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

enum AppState {
    Pending {
        config: AppConfig,
        setup: Option<SetupFn>,
    },
    Running {
        window: Arc<Window>,
        engine: Engine<WgpuBackend>,
        start_time: Instant,
        last_frame: Instant,
    },
}

struct App {
    state: AppState,
    error: Option<Error>,
}

impl App {
    fn start(config: &AppConfig, setup: SetupFn, event_loop: &ActiveEventLoop) -> Result<AppState> {
        let attributes = WindowAttributes::default()
            .with_title(&config.title)
            .with_inner_size(winit::dpi::LogicalSize::new(config.width, config.height));
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .map_err(|e| BackendError::Surface(e.to_string()))?,
        );

        let backend = WgpuBackend::new(window.clone())?;
        let mut engine = Engine::new(backend, config.renderer.clone())?;
        setup(&mut engine)?;
        window.request_redraw();

        Ok(AppState::Running {
            window,
            engine,
            start_time: Instant::now(),
            last_frame: Instant::now(),
        })
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: Error) {
        log::error!("{err}");
        self.error = Some(err);
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let AppState::Pending { config, setup } = &mut self.state else {
            return;
        };
        let Some(setup) = setup.take() else {
            return;
        };
        match Self::start(config, setup, event_loop) {
            Ok(state) => self.state = state,
            Err(err) => self.fail(event_loop, err),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let AppState::Running {
            window,
            engine,
            start_time,
            last_frame,
        } = &mut self.state
        else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => engine.resize(size.width, size.height),
            WindowEvent::RedrawRequested => {
                let now = Instant::now();
                let time = start_time.elapsed().as_secs_f32();
                let delta = now.duration_since(*last_frame).as_secs_f32();
                *last_frame = now;

                if let Err(err) = engine.frame(time, delta) {
                    self.error = Some(err);
                    event_loop.exit();
                    return;
                }
                window.request_redraw();
            }
            _ => {}
        }
    }
}
