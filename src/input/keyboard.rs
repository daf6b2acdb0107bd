//! Keyboard handling

use log::{info, warn};

use crate::backend::InputDevice;
use crate::compositor::CompositorState;

impl CompositorState {
    /// Make `device` the seat's keyboard; the most recent keyboard wins
    pub(crate) fn attach_keyboard(&mut self, device: &InputDevice) {
        let Some(keyboard) = device.keyboard() else {
            warn!("{} reported as a keyboard without one", device.name());
            return;
        };
        let (rate, delay) = keyboard.repeat_info();
        self.seat.set_keyboard(Some(keyboard));
        info!(
            "Keyboard {} attached to {} (repeat {}/s after {}ms)",
            device.name(),
            self.seat.name(),
            rate,
            delay
        );
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::InputDeviceType;
    use crate::config::Config;
    use crate::server::Server;

    #[test]
    fn test_last_keyboard_wins() {
        let mut config = Config::default();
        config.backend.name = Some("headless".to_string());
        config.backend.keyboard = false;
        config.client.command = None;
        let server = Server::new(&config).unwrap();
        server.start().unwrap();

        let backend = server.backend();
        backend.add_input("kbd1", InputDeviceType::Keyboard);
        let second = backend.add_input("kbd2", InputDeviceType::Keyboard);

        assert_eq!(server.state().seat.keyboard().as_ref(), second.keyboard());
    }
}
