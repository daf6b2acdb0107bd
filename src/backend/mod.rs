//! Backend module
//!
//! The toolkit the compositor core drives:
//! - Display endpoint with its calloop event loop and wayland socket
//! - Protocol dispatch routing client requests to the toolkit objects
//! - Headless backend producing virtual outputs and input devices
//! - Output layout, scene graph, cursor and seat
//! - Creation/destruction ledger used to check teardown

pub mod cursor;
pub mod display;
pub mod event_loop;
pub mod globals;
pub mod headless;
pub mod input;
pub mod layout;
pub mod ledger;
pub mod output;
pub mod protocol;
pub mod render;
pub mod scene;
pub mod seat;
pub mod shell;

pub use cursor::{Cursor, CursorImage, XcursorManager};
pub use display::{Display, Global};
pub use event_loop::{EventLoop, Terminator};
pub use globals::{Compositor, DataDeviceManager, Subcompositor};
pub use headless::Backend;
pub use input::{InputDevice, InputDeviceType, Keyboard, PointerMotionEvent};
pub use layout::{LayoutBox, LayoutOutput, OutputLayout};
pub use output::{Mode, Output, OutputId, OutputState, OutputStateFields, DEFAULT_MODE};
pub use protocol::{ClientState, ProtocolState, SeatGlobal};
pub use render::{Allocator, Renderer};
pub use scene::{NodeId, NodeKind, Scene, SceneOutput, SceneOutputLayout};
pub use seat::{RequestSetCursorEvent, Seat, SeatClient};
pub use shell::{ClientId, Surface, SurfaceId, XdgShell, XdgSurface, XdgSurfaceRole};
