//! Launching the session client

use std::process::{Child, Command};

use log::info;

use crate::error::Error;

/// Spawn `command` with no arguments, inheriting the environment
///
/// `WAYLAND_DISPLAY` must already point at the server's socket; see
/// [`Server::launch_client`](super::Server::launch_client).
pub fn spawn_client(command: Option<&str>) -> Result<Option<Child>, Error> {
    let Some(command) = command else {
        info!("No client configured");
        return Ok(None);
    };
    let child = Command::new(command).spawn()?;
    info!("Launched {} (pid {})", command, child.id());
    Ok(Some(child))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_command() {
        assert!(spawn_client(None).unwrap().is_none());
    }

    #[test]
    fn test_spawn_and_wait() {
        let mut child = spawn_client(Some("true")).unwrap().unwrap();
        assert!(child.wait().unwrap().success());
    }

    #[test]
    fn test_missing_program() {
        let err = spawn_client(Some("/nonexistent/tinyway-client")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
