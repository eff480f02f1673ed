#![warn(clippy::all)]
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] // hide console window on Windows in release

use trade_view::{Arguments, DashboardApp, EngineConfig};

/*
cargo fmt
cargo test -- --nocapture
cargo test -- --show-output tests_query_builder
cargo run -- --help
cargo run -- --host 13.229.109.174 --port 8099
cargo run -- --local ./snapshots
cargo doc --open
cargo b -r && cargo install --path=.
*/

#[cfg(not(target_arch = "wasm32"))]
fn main() -> eframe::Result<()> {
    // Initialize the tracing subscriber for logging.
    // Use RUST_LOG environment variable to set logging level.  eg `export RUST_LOG=debug`
    tracing_subscriber::fmt::init();

    // Parse command-line arguments.
    let args = Arguments::build();

    // RUST_LOG=debug cargo run -- --local ./snapshots
    tracing::debug!("main()\nArguments: {args:#?}");

    // Configure the native options for the eframe application.
    let native_options = eframe::NativeOptions {
        centered: true,
        persist_window: true,
        vsync: true,
        viewport: egui::ViewportBuilder::default().with_inner_size([1280.0, 900.0]),
        ..Default::default()
    };

    // Run the eframe application.
    eframe::run_native(
        "Trade View",
        native_options,
        Box::new(move |creation_context| {
            // Resolve where to connect, then open the connection and start the initial load.
            let config = EngineConfig::new(&args)?;
            tracing::debug!("main()\nEngineConfig: {config:#?}");

            match DashboardApp::new(creation_context, &config) {
                Ok(app) => Ok(Box::new(app)),
                Err(err) => {
                    tracing::error!("Failed to initialize DashboardApp: {err}");
                    Err(err.into())
                }
            }
        }),
    )
}
