//! Forge Engine Runtime
//!
//! Minimal binary that links engine crates, boots platform services, and
//! drives the ECS `App` for one placeholder tick.

use anyhow::Result;
use forge_core::app::App;
use tracing_subscriber;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    tracing::info!("Forge Engine v{}", forge_core::VERSION);
    tracing::info!("Initializing services...");
    forge_services::init_services();

    let mut app = App::new();
    tracing::info!("Runtime initialized successfully");
    tracing::info!("Phase 0: Placeholder - will run game loop in PoC 1");
    app.update();

    Ok(())
}
