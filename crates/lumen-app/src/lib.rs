//! Application framework for the Lumen renderer.
//!
//! This crate provides a trait-based application framework that handles
//! common boilerplate like:
//! - Logging initialization
//! - Window creation
//! - Render context initialization
//! - Driving the render loop and frame pacing
//! - Event loop handling
//!
//! # Example
//!
//! ```no_run
//! use lumen_app::{run_app, AppConfig, AppContext, FrameContext, LumenApp};
//!
//! struct MyApp;
//!
//! impl LumenApp for MyApp {
//!     fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
//!         Ok(MyApp)
//!     }
//!
//!     fn update(&mut self, ctx: &AppContext, dt: f32) {}
//!
//!     fn render(&mut self, frame: &mut FrameContext) -> anyhow::Result<()> {
//!         // The image is already cleared; record draws here
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app::<MyApp>(AppConfig::default())
//! }
//! ```

mod app;
mod context;
mod frame;
mod runner;

pub use app::LumenApp;
pub use context::AppContext;
pub use frame::FrameContext;
pub use runner::{run_app, AppConfig};

// Re-export commonly used types for convenience
pub use lumen_gpu::{RenderContext, RenderContextBuilder};
pub use winit::event::WindowEvent;
