//! Pointer (mouse/trackpad) handling

use log::debug;

use crate::backend::{CursorImage, InputDevice, PointerMotionEvent};
use crate::compositor::CompositorState;
use crate::config::CursorConfig;

/// Theme image shown after pointer motion
pub const DEFAULT_CURSOR: &str = "default";

/// What pointer motion does to the cursor image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorImagePolicy {
    /// Every motion resets the image to the default theme cursor
    #[default]
    ResetOnMotion,
    /// A client-set image survives motion
    KeepClientImage,
}

impl CursorImagePolicy {
    pub fn from_config(config: &CursorConfig) -> Self {
        if config.keep_client_image {
            CursorImagePolicy::KeepClientImage
        } else {
            CursorImagePolicy::ResetOnMotion
        }
    }
}

impl CompositorState {
    /// Let `device` drive the cursor
    pub(crate) fn attach_pointer(&mut self, device: &InputDevice) {
        if self.cursor.attach_input_device(device) {
            debug!("Pointer {} attached to the cursor", device.name());
        }
    }

    /// Move the cursor by a relative delta and update its image
    pub fn handle_cursor_motion(&mut self, event: &PointerMotionEvent) {
        self.cursor
            .move_by(Some(&event.device), event.delta_x, event.delta_y);

        let client_image = matches!(self.cursor.image(), CursorImage::Surface { .. });
        if client_image && self.cursor_policy == CursorImagePolicy::KeepClientImage {
            return;
        }
        self.cursor.set_xcursor(&self.xcursor_manager, DEFAULT_CURSOR);
    }

    /// Forward the end of a pointer event batch to the seat
    pub fn handle_cursor_frame(&mut self, _: &()) {
        self.seat.pointer_notify_frame();
    }
}
