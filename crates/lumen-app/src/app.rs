//! `LumenApp` trait definition.

use crate::context::AppContext;
use crate::frame::FrameContext;
use winit::event::WindowEvent;

/// Trait for Lumen applications.
///
/// The framework creates the window and render context, drives the frame
/// loop and tears everything down in order on exit.
pub trait LumenApp: Sized {
    /// Initialize the application.
    ///
    /// Called once after the window and render context exist. This is the
    /// place to build pipelines and upload geometry.
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self>;

    /// Update application state.
    ///
    /// Called every frame before rendering with the time since the last frame
    /// in seconds.
    fn update(&mut self, ctx: &AppContext, dt: f32);

    /// Record draw commands for one frame.
    ///
    /// The framework has already acquired the image, transitioned it and
    /// begun a rendering pass that clears it, with viewport and scissor set
    /// to the full extent. Submission and presentation happen afterwards.
    fn render(&mut self, frame: &mut FrameContext) -> anyhow::Result<()>;

    /// Handle window events.
    ///
    /// Return `true` if the event was handled and should not be processed
    /// further.
    #[allow(unused_variables)]
    fn on_event(&mut self, event: &WindowEvent) -> bool {
        false
    }

    /// Release resources before shutdown.
    ///
    /// The GPU is idle when this is called.
    #[allow(unused_variables)]
    fn cleanup(&mut self, ctx: &mut AppContext) {}
}
