//! Application runner and event loop.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ash::vk;
use lumen_gpu::{DrawRecorder, FrameTarget, GpuError, RenderContextBuilder};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::app::LumenApp;
use crate::context::AppContext;
use crate::frame::FrameContext;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Window title, also used as the Vulkan application name.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Target frames per second (None for unlimited).
    pub target_fps: Option<u32>,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
    /// Color every frame is cleared to.
    pub clear_color: [f32; 4],
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Lumen".to_string(),
            width: 800,
            height: 600,
            target_fps: None,
            validation: cfg!(debug_assertions),
            clear_color: [0.02, 0.02, 0.03, 1.0],
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the target FPS. Zero means unlimited.
    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = Some(fps).filter(|&fps| fps > 0);
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Set the clear color.
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Minimum time per frame implied by the FPS target.
    pub fn target_frame_time(&self) -> Option<Duration> {
        self.target_fps
            .filter(|&fps| fps > 0)
            .map(|fps| Duration::from_nanos(1_000_000_000 / u64::from(fps)))
    }
}

/// Run a `LumenApp` with the given configuration.
///
/// Initializes logging, creates the window and render context, and runs the
/// event loop until the window is closed or a frame fails.
pub fn run_app<A: LumenApp + 'static>(config: AppConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("{} starting...", config.title);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner::<A> {
        config,
        state: None,
        failed: false,
    };

    event_loop.run_app(&mut runner)?;

    if runner.failed {
        anyhow::bail!("Application terminated after a fatal error");
    }

    Ok(())
}

/// Internal application runner that implements winit's `ApplicationHandler`.
struct AppRunner<A: LumenApp> {
    config: AppConfig,
    state: Option<AppState<A>>,
    failed: bool,
}

/// Internal application state.
struct AppState<A: LumenApp> {
    app: A,
    ctx: AppContext,
    target_frame_time: Option<Duration>,
    stats: FpsStats,
}

impl<A: LumenApp + 'static> ApplicationHandler for AppRunner<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        info!("Creating application state...");

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Application ready!");
            }
            Err(e) => {
                error!("Failed to initialize application: {e:#}");
                self.failed = true;
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        // Let the app handle the event first
        if let Some(state) = &mut self.state {
            if state.app.on_event(&event) {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                self.shutdown(event_loop);
            }
            WindowEvent::RedrawRequested => {
                let Some(state) = &mut self.state else {
                    return;
                };
                match state.render_frame() {
                    Ok(()) => state.ctx.window.request_redraw(),
                    Err(GpuError::SurfaceOutOfDate) => {
                        error!(
                            "Window surface changed and the swapchain cannot be rebuilt, exiting"
                        );
                        self.failed = true;
                        self.shutdown(event_loop);
                    }
                    Err(e) => {
                        error!("Render error: {e}");
                        self.failed = true;
                        self.shutdown(event_loop);
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.ctx.window.request_redraw();
        }
    }
}

impl<A: LumenApp + 'static> AppRunner<A> {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState<A>> {
        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height))
            .with_resizable(false);

        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let size = window.inner_size();
        let drawable_size = vk::Extent2D {
            width: size.width,
            height: size.height,
        };

        // SAFETY: AppContext releases the render context before the window
        let render = unsafe {
            RenderContextBuilder::new()
                .app_name(&self.config.title)
                .validation(self.config.validation)
                .clear_color(self.config.clear_color)
                .build(window.as_ref(), drawable_size)?
        };

        info!("GPU: {}", render.device_name());

        let mut ctx = AppContext::new(window, render);
        let app = A::init(&mut ctx)?;

        Ok(AppState {
            app,
            ctx,
            target_frame_time: self.config.target_frame_time(),
            stats: FpsStats::default(),
        })
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(mut state) = self.state.take() {
            state.cleanup();
        }
        event_loop.exit();
    }
}

impl<A: LumenApp> AppState<A> {
    fn render_frame(&mut self) -> lumen_gpu::Result<()> {
        let frame_start = Instant::now();

        let now = Instant::now();
        let dt = now.duration_since(self.ctx.last_frame_time).as_secs_f32();
        self.ctx.last_frame_time = now;
        self.stats.record(dt);

        self.app.update(&self.ctx, dt);

        let mut recorder = AppRecorder {
            app: &mut self.app,
            dt,
            frame_number: self.ctx.frame_count,
        };
        self.ctx.render.run_frame(&mut recorder)?;
        self.ctx.frame_count += 1;

        // Frame pacing
        if let Some(target) = self.target_frame_time {
            let elapsed = frame_start.elapsed();
            if elapsed < target {
                thread::sleep(target - elapsed);
            }
        }

        Ok(())
    }

    fn cleanup(&mut self) {
        if let Some(summary) = self.stats.summary() {
            info!("FPS Statistics:");
            info!("  Min: {:.1}", summary.min);
            info!("  Max: {:.1}", summary.max);
            info!("  Avg: {:.1}", summary.avg);
            info!("  Total frames: {}", self.ctx.frame_count);
        }

        info!("Starting cleanup...");
        if let Err(e) = self.ctx.render.wait_idle() {
            error!("Failed to wait idle: {e}");
        }

        // Let the app release its GPU resources before the context goes
        self.app.cleanup(&mut self.ctx);

        info!("Cleanup complete");
    }
}

/// Forwards the frame's draw recording to the application.
struct AppRecorder<'a, A> {
    app: &'a mut A,
    dt: f32,
    frame_number: u64,
}

impl<A: LumenApp> DrawRecorder for AppRecorder<'_, A> {
    fn record(
        &mut self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        target: &FrameTarget,
    ) -> lumen_gpu::Result<()> {
        let mut frame = FrameContext::new(device, cmd, *target, self.dt, self.frame_number);
        self.app
            .render(&mut frame)
            .map_err(|e| GpuError::Other(format!("Application render failed: {e:#}")))
    }
}

/// Frame rate extremes and running sum.
#[derive(Debug, Clone, Copy)]
struct FpsStats {
    min: f64,
    max: f64,
    sum: f64,
    samples: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct FpsSummary {
    min: f64,
    max: f64,
    avg: f64,
}

impl Default for FpsStats {
    fn default() -> Self {
        Self {
            min: f64::MAX,
            max: 0.0,
            sum: 0.0,
            samples: 0,
        }
    }
}

impl FpsStats {
    /// Record one frame time. Zero-length frames carry no rate and are skipped.
    fn record(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        let fps = 1.0 / f64::from(dt);
        self.min = self.min.min(fps);
        self.max = self.max.max(fps);
        self.sum += fps;
        self.samples += 1;
    }

    fn summary(&self) -> Option<FpsSummary> {
        (self.samples > 0).then(|| FpsSummary {
            min: self.min,
            max: self.max,
            avg: self.sum / self.samples as f64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_config() {
        let config = AppConfig::default();
        assert_eq!(config.title, "Lumen");
        assert_eq!((config.width, config.height), (800, 600));
        assert_eq!(config.validation, cfg!(debug_assertions));
        assert!(config.target_fps.is_none());
        assert!(config.target_frame_time().is_none());
    }

    #[test]
    fn builder_methods() {
        let config = AppConfig::new("Triangle")
            .with_size(1024, 768)
            .with_validation(false)
            .with_clear_color([1.0, 0.0, 0.0, 1.0])
            .with_target_fps(60);

        assert_eq!(config.title, "Triangle");
        assert_eq!((config.width, config.height), (1024, 768));
        assert!(!config.validation);
        assert_eq!(config.clear_color, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(config.target_fps, Some(60));
    }

    #[test]
    fn frame_time_from_target_fps() {
        let config = AppConfig::default().with_target_fps(50);
        assert_eq!(config.target_frame_time(), Some(Duration::from_millis(20)));

        let unlimited = AppConfig::default().with_target_fps(0);
        assert!(unlimited.target_frame_time().is_none());
    }

    #[test]
    fn fps_stats() {
        let mut stats = FpsStats::default();
        assert!(stats.summary().is_none());

        stats.record(0.01);
        stats.record(0.02);
        stats.record(0.0);

        let summary = stats.summary().unwrap();
        assert_relative_eq!(summary.min, 50.0, epsilon = 1e-3);
        assert_relative_eq!(summary.max, 100.0, epsilon = 1e-3);
        assert_relative_eq!(summary.avg, 75.0, epsilon = 1e-3);
    }
}
