//! Real wayland clients talking to the server over a socket pair

use std::os::unix::net::UnixStream;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tinyway::backend::{CursorImage, NodeKind, XdgSurfaceRole};
use tinyway::config::Config;
use tinyway::server::Server;
use wayland_client::globals::{registry_queue_init, GlobalListContents};
use wayland_client::protocol::{
    wl_callback, wl_compositor, wl_pointer, wl_registry, wl_seat, wl_surface,
};
use wayland_client::{delegate_noop, Connection, Dispatch, QueueHandle, WEnum};
use wayland_protocols::xdg::shell::client::{xdg_surface, xdg_toplevel, xdg_wm_base};

fn config() -> Config {
    let mut config = Config::default();
    config.backend.name = Some("headless".to_string());
    config.backend.outputs.clear();
    config.backend.pointer = false;
    config.backend.keyboard = false;
    config.client.command = None;
    config
}

/// Hand the server end of a fresh socket pair to the display
fn connect(server: &Server) -> UnixStream {
    let (client, server_end) = UnixStream::pair().unwrap();
    server.display().display().insert_client(server_end).unwrap();
    client
}

/// Dispatch the server until the client thread reports back
fn wait_for<T>(server: &Server, rx: &mpsc::Receiver<T>) -> T {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match rx.try_recv() {
            Ok(value) => return value,
            Err(mpsc::TryRecvError::Empty) => {}
            Err(mpsc::TryRecvError::Disconnected) => panic!("client thread exited early"),
        }
        assert!(Instant::now() < deadline, "timed out waiting for the client");
        server.dispatch(Some(Duration::from_millis(10))).unwrap();
    }
}

#[derive(Default)]
struct App {
    configured: bool,
    frame_done: bool,
    capabilities: Option<u32>,
}

impl Dispatch<wl_registry::WlRegistry, GlobalListContents> for App {
    fn event(
        _state: &mut Self,
        _proxy: &wl_registry::WlRegistry,
        _event: wl_registry::Event,
        _data: &GlobalListContents,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
    }
}

impl Dispatch<xdg_surface::XdgSurface, ()> for App {
    fn event(
        state: &mut Self,
        proxy: &xdg_surface::XdgSurface,
        event: xdg_surface::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let xdg_surface::Event::Configure { serial } = event {
            proxy.ack_configure(serial);
            state.configured = true;
        }
    }
}

impl Dispatch<wl_callback::WlCallback, ()> for App {
    fn event(
        state: &mut Self,
        _proxy: &wl_callback::WlCallback,
        event: wl_callback::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_callback::Event::Done { .. } = event {
            state.frame_done = true;
        }
    }
}

impl Dispatch<wl_seat::WlSeat, ()> for App {
    fn event(
        state: &mut Self,
        _proxy: &wl_seat::WlSeat,
        event: wl_seat::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_seat::Event::Capabilities {
            capabilities: WEnum::Value(capabilities),
        } = event
        {
            state.capabilities = Some(capabilities.bits());
        }
    }
}

delegate_noop!(App: ignore wl_compositor::WlCompositor);
delegate_noop!(App: ignore wl_surface::WlSurface);
delegate_noop!(App: ignore wl_pointer::WlPointer);
delegate_noop!(App: ignore xdg_wm_base::XdgWmBase);
delegate_noop!(App: ignore xdg_toplevel::XdgToplevel);

#[test]
fn test_registry_lists_globals() {
    let server = Server::new(&config()).unwrap();
    server.start().unwrap();
    let stream = connect(&server);

    let (tx, rx) = mpsc::channel();
    let client = thread::spawn(move || {
        let conn = Connection::from_socket(stream).unwrap();
        let (globals, _queue) = registry_queue_init::<App>(&conn).unwrap();
        let globals: Vec<(String, u32)> = globals
            .contents()
            .clone_list()
            .into_iter()
            .map(|g| (g.interface, g.version))
            .collect();
        tx.send(globals).unwrap();
    });
    let globals = wait_for(&server, &rx);
    client.join().unwrap();

    for (interface, version) in [
        ("wl_compositor", 5),
        ("wl_subcompositor", 1),
        ("wl_data_device_manager", 3),
        ("xdg_wm_base", 3),
        ("wl_seat", 7),
        ("wl_shm", 1),
    ] {
        assert!(
            globals.contains(&(interface.to_string(), version)),
            "{} v{} missing from {:?}",
            interface,
            version,
            globals
        );
    }
}

#[test]
fn test_client_toplevel_mapped_framed_and_dropped() {
    let server = Server::new(&config()).unwrap();
    server.start().unwrap();
    let output = server.backend().add_output("HEADLESS-1", Vec::new());
    let stream = connect(&server);

    let (to_test, from_client) = mpsc::channel();
    let (to_client, from_test) = mpsc::channel::<()>();
    let client = thread::spawn(move || {
        let conn = Connection::from_socket(stream).unwrap();
        let (globals, mut queue) = registry_queue_init::<App>(&conn).unwrap();
        let qh = queue.handle();
        let compositor: wl_compositor::WlCompositor = globals.bind(&qh, 1..=5, ()).unwrap();
        let wm_base: xdg_wm_base::XdgWmBase = globals.bind(&qh, 1..=3, ()).unwrap();

        let surface = compositor.create_surface(&qh, ());
        let xdg_surface = wm_base.get_xdg_surface(&surface, &qh, ());
        let toplevel = xdg_surface.get_toplevel(&qh, ());
        toplevel.set_title("foot".to_string());
        let _frame = surface.frame(&qh, ());
        surface.commit();

        let mut app = App::default();
        queue.roundtrip(&mut app).unwrap();
        to_test.send(app.configured).unwrap();

        from_test.recv().unwrap();
        while !app.frame_done {
            queue.blocking_dispatch(&mut app).unwrap();
        }
        to_test.send(app.frame_done).unwrap();

        // keep the connection open until the server side is checked
        from_test.recv().unwrap();
    });

    assert!(wait_for(&server, &from_client), "toplevel was not configured");
    let compositor = server.display().compositor().unwrap().clone();
    let shell = server.display().xdg_shell().unwrap().clone();
    assert_eq!(compositor.surfaces().len(), 1);
    let mapped = shell.surfaces();
    assert_eq!(mapped.len(), 1);
    assert_eq!(mapped[0].role(), XdgSurfaceRole::Toplevel);
    {
        let state = server.state();
        let children = state.scene.children(state.scene.root());
        assert_eq!(
            children
                .iter()
                .map(|n| state.scene.kind(*n))
                .collect::<Vec<_>>(),
            vec![Some(NodeKind::XdgSurface(mapped[0].clone()))]
        );
    }

    output.send_frame();
    to_client.send(()).unwrap();
    assert!(wait_for(&server, &from_client), "frame callback not delivered");
    assert!(mapped[0].surface().last_frame_done().is_some());

    to_client.send(()).unwrap();
    client.join().unwrap();

    // the client hung up: its surface and scene node go away
    let deadline = Instant::now() + Duration::from_secs(5);
    while !shell.surfaces().is_empty() {
        assert!(Instant::now() < deadline, "surface outlived its client");
        server.dispatch(Some(Duration::from_millis(10))).unwrap();
    }
    assert!(mapped[0].surface().is_destroyed());
    let state = server.state();
    assert!(state.scene.children(state.scene.root()).is_empty());
}

#[test]
fn test_seat_capabilities_and_set_cursor_over_the_wire() {
    let mut config = config();
    config.backend.outputs = vec![Default::default()];
    config.backend.keyboard = true;
    let server = Server::new(&config).unwrap();
    server.start().unwrap();
    let stream = connect(&server);

    let (to_test, from_client) = mpsc::channel();
    let (to_client, from_test) = mpsc::channel::<()>();
    let client = thread::spawn(move || {
        let conn = Connection::from_socket(stream).unwrap();
        let (globals, mut queue) = registry_queue_init::<App>(&conn).unwrap();
        let qh = queue.handle();
        let compositor: wl_compositor::WlCompositor = globals.bind(&qh, 1..=5, ()).unwrap();
        let seat: wl_seat::WlSeat = globals.bind(&qh, 1..=7, ()).unwrap();
        let pointer = seat.get_pointer(&qh, ());
        let surface = compositor.create_surface(&qh, ());

        let mut app = App::default();
        queue.roundtrip(&mut app).unwrap();
        to_test.send(app.capabilities).unwrap();

        from_test.recv().unwrap();
        pointer.set_cursor(1, Some(&surface), 3, 4);
        queue.roundtrip(&mut app).unwrap();
        to_test.send(None).unwrap();

        from_test.recv().unwrap();
    });

    assert_eq!(wait_for(&server, &from_client), Some(3));
    assert_eq!(server.state().seat.bound_count(), 1);
    let compositor = server.display().compositor().unwrap().clone();
    let surfaces = compositor.surfaces();
    assert_eq!(surfaces.len(), 1);
    server
        .state()
        .seat
        .pointer_notify_enter(&surfaces[0], 1.0, 1.0);

    to_client.send(()).unwrap();
    wait_for(&server, &from_client);
    assert!(matches!(
        server.state().cursor.image(),
        CursorImage::Surface { hotspot: (3, 4), .. }
    ));

    to_client.send(()).unwrap();
    client.join().unwrap();
}
