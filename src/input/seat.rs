//! Input seat coordination

use log::debug;

use crate::backend::RequestSetCursorEvent;
use crate::compositor::CompositorState;

/// Seat capabilities
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeatCapabilities {
    pub keyboard: bool,
    pub pointer: bool,
    pub touch: bool,
}

impl SeatCapabilities {
    /// Convert to Wayland capability flags
    pub fn to_wayland(&self) -> u32 {
        let mut flags = 0u32;
        if self.pointer {
            flags |= 1;
        }
        if self.keyboard {
            flags |= 2;
        }
        if self.touch {
            flags |= 4;
        }
        flags
    }
}

impl CompositorState {
    /// Current seat capabilities
    ///
    /// A pointer is always advertised since the cursor exists even without a
    /// pointer device.
    pub fn seat_capabilities(&self) -> SeatCapabilities {
        SeatCapabilities {
            keyboard: self.seat.keyboard().is_some(),
            pointer: true,
            touch: false,
        }
    }

    pub(crate) fn update_seat_capabilities(&mut self) {
        self.seat
            .set_capabilities(self.seat_capabilities().to_wayland());
    }

    /// Apply a client's cursor image if that client has pointer focus
    pub fn handle_request_set_cursor(&mut self, event: &RequestSetCursorEvent) {
        if self.seat.pointer_focused_client() != Some(event.seat_client) {
            debug!(
                "Ignoring cursor image from unfocused client {:?}",
                event.seat_client.client()
            );
            return;
        }
        self.cursor
            .set_surface(event.surface.as_ref(), event.hotspot_x, event.hotspot_y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ClientId, CursorImage, InputDeviceType};
    use crate::config::Config;
    use crate::server::Server;

    fn server() -> Server {
        let mut config = Config::default();
        config.backend.name = Some("headless".to_string());
        config.backend.keyboard = false;
        config.client.command = None;
        let server = Server::new(&config).unwrap();
        server.start().unwrap();
        server
    }

    #[test]
    fn test_seat_capabilities() {
        let caps = SeatCapabilities {
            keyboard: true,
            pointer: true,
            touch: false,
        };
        assert_eq!(caps.to_wayland(), 3); // pointer (1) + keyboard (2)
    }

    #[test]
    fn test_capabilities_follow_keyboard() {
        let server = server();
        assert_eq!(server.state().seat.capabilities(), 1);

        server.backend().add_input("kbd", InputDeviceType::Keyboard);
        assert_eq!(server.state().seat.capabilities(), 3);
    }

    #[test]
    fn test_focused_client_sets_image() {
        let server = server();
        let compositor = server.display().compositor().unwrap().clone();
        let client = ClientId::new();
        let focused = compositor.create_surface(client);
        let image = compositor.create_surface(client);
        server.state().seat.pointer_notify_enter(&focused, 0.0, 0.0);

        let seat = server.state().seat.get().clone();
        seat.request_set_cursor(client, Some(&image), 1, 4, 5);

        assert_eq!(
            server.state().cursor.image(),
            CursorImage::Surface {
                surface: image,
                hotspot: (4, 5)
            }
        );
    }

    #[test]
    fn test_unfocused_client_ignored() {
        let server = server();
        let compositor = server.display().compositor().unwrap().clone();
        let focused = compositor.create_surface(ClientId::new());
        let other = ClientId::new();
        let image = compositor.create_surface(other);
        server.state().seat.pointer_notify_enter(&focused, 0.0, 0.0);

        let seat = server.state().seat.get().clone();
        let before = server.state().cursor.image();
        seat.request_set_cursor(other, Some(&image), 1, 4, 5);

        assert_eq!(server.state().cursor.image(), before);
    }

    #[test]
    fn test_no_focus_ignored() {
        let server = server();
        let compositor = server.display().compositor().unwrap().clone();
        let client = ClientId::new();
        let image = compositor.create_surface(client);

        let seat = server.state().seat.get().clone();
        seat.request_set_cursor(client, Some(&image), 1, 0, 0);

        assert_eq!(server.state().cursor.image(), CursorImage::Hidden);
    }
}
