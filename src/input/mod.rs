//! Input handling module
//!
//! Routes the devices the backend reports: pointers drive the cursor,
//! keyboards go to the seat, anything else is ignored.

pub mod keyboard;
pub mod pointer;
pub mod seat;

use log::debug;

use crate::backend::{InputDevice, InputDeviceType};
use crate::compositor::CompositorState;

pub use pointer::CursorImagePolicy;
pub use seat::SeatCapabilities;

impl CompositorState {
    /// Route a newly reported input device
    pub fn handle_new_input(&mut self, device: &InputDevice) {
        match device.kind() {
            InputDeviceType::Pointer => self.attach_pointer(device),
            InputDeviceType::Keyboard => self.attach_keyboard(device),
            other => debug!("Ignoring {:?} device {}", other, device.name()),
        }
        self.update_seat_capabilities();
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::InputDeviceType;
    use crate::config::Config;
    use crate::server::Server;

    #[test]
    fn test_other_devices_ignored() {
        let mut config = Config::default();
        config.backend.name = Some("headless".to_string());
        config.backend.pointer = false;
        config.backend.keyboard = false;
        config.client.command = None;
        let server = Server::new(&config).unwrap();
        server.start().unwrap();

        let backend = server.backend();
        backend.add_input("touchscreen", InputDeviceType::Touch);
        backend.add_input("lid", InputDeviceType::Switch);

        let state = server.state();
        assert!(state.cursor.attached_devices().is_empty());
        assert!(state.seat.keyboard().is_none());
    }
}
