//! Launching the session client against a bound socket
//!
//! Kept to a single test: it changes the process environment.

use std::fs;
use std::os::unix::fs::PermissionsExt;

use tinyway::config::Config;
use tinyway::server::Server;

#[test]
fn test_client_inherits_wayland_display() {
    let runtime_dir = tempfile::tempdir().unwrap();
    std::env::set_var("XDG_RUNTIME_DIR", runtime_dir.path());
    std::env::remove_var("WAYLAND_DISPLAY");

    let mut config = Config::default();
    config.backend.name = Some("headless".to_string());
    config.backend.outputs.clear();
    config.client.command = None;
    let server = Server::new(&config).unwrap();

    // the client records what it was handed
    let script = runtime_dir.path().join("client.sh");
    let seen = runtime_dir.path().join("seen");
    fs::write(
        &script,
        format!(
            "#!/bin/sh\nprintf '%s' \"$WAYLAND_DISPLAY\" > '{}'\n",
            seen.display()
        ),
    )
    .unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

    let mut child = server
        .launch_client(Some(script.to_str().unwrap()))
        .unwrap()
        .unwrap();
    assert!(child.wait().unwrap().success());

    let socket = server.display().display().socket_name().unwrap();
    assert!(runtime_dir.path().join(&socket).exists());
    assert_eq!(fs::read_to_string(&seen).unwrap(), socket);
    assert_eq!(std::env::var("WAYLAND_DISPLAY").unwrap(), socket);

    // a second launch reuses the socket
    assert!(server.launch_client(None).unwrap().is_none());
    assert_eq!(server.display().display().socket_name(), Some(socket));
}
