//! Lumen triangle demo
//!
//! Draws a vertex-colored triangle from device-local vertex and index
//! buffers through the whole render stack.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p lumen-triangle -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! - `--no-validation`: Disable Vulkan validation layers
//! - `-h, --help`: Print help message
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod app;

use lumen_app::{run_app, AppConfig};

use crate::app::Triangle;

const WIDTH: u32 = 800;
const HEIGHT: u32 = 600;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.iter().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    let mut config = AppConfig::new("Lumen Triangle").with_size(WIDTH, HEIGHT);
    if args.iter().any(|arg| arg == "--no-validation") {
        config = config.with_validation(false);
    }

    run_app::<Triangle>(config)
}

fn print_help() {
    eprintln!(
        "Lumen triangle demo

USAGE:
    lumen-triangle [OPTIONS]

OPTIONS:
    --no-validation    Disable Vulkan validation layers
    -h, --help         Print this help message

ENVIRONMENT:
    RUST_LOG           Log filter (default: info)"
    );
}
