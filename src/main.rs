//! Tinyway - a minimal Wayland compositor
//!
//! This is the entry point: it loads the configuration, brings the server
//! up, launches the session client and runs until SIGINT or SIGTERM.

use log::{info, warn};

use tinyway::config::Config;
use tinyway::server::{Server, ShutdownWatcher};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Starting Tinyway compositor");

    let config = Config::load()?;
    let server = Server::new(&config)?;

    let socket = server.add_socket_auto()?;
    server.start()?;

    let client = match server.launch_client(config.client.command.as_deref()) {
        Ok(client) => client,
        Err(e) => {
            warn!("Failed to launch client: {}", e);
            None
        }
    };
    let watcher = ShutdownWatcher::spawn(server.terminator(), client)?;

    info!("Running compositor on WAYLAND_DISPLAY={}", socket);
    server.run()?;
    watcher.join();

    Ok(())
}
