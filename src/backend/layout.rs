//! Output layout: outputs arranged in one 2D coordinate space

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use log::{debug, warn};

use super::ledger;
use super::output::Output;
use crate::utils::{Resource, Signal, Subscription};

/// A rectangle in layout coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LayoutBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl LayoutBox {
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Whether the point lies inside, right and bottom edges excluded
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        !self.is_empty()
            && x >= self.x as f64
            && x < (self.x + self.width) as f64
            && y >= self.y as f64
            && y < (self.y + self.height) as f64
    }

    /// The point of the box closest to (x, y)
    pub fn closest_point(&self, x: f64, y: f64) -> (f64, f64) {
        let cx = x.clamp(self.x as f64, (self.x + self.width - 1) as f64);
        let cy = y.clamp(self.y as f64, (self.y + self.height - 1) as f64);
        (cx, cy)
    }
}

#[derive(Debug, Default)]
pub struct OutputLayoutEvents {
    /// An output was placed in the layout
    pub add: Signal<LayoutOutput>,
    /// Placement of one or more outputs changed
    pub change: Signal<()>,
    pub destroy: Signal<()>,
}

/// An output's placement in a layout
#[derive(Clone)]
pub struct LayoutOutput(Rc<LayoutOutputInner>);

struct LayoutOutputInner {
    output: Output,
    x: Cell<i32>,
    y: Cell<i32>,
}

impl LayoutOutput {
    pub fn output(&self) -> &Output {
        &self.0.output
    }

    pub fn x(&self) -> i32 {
        self.0.x.get()
    }

    pub fn y(&self) -> i32 {
        self.0.y.get()
    }

    /// The region the output covers
    pub fn layout_box(&self) -> LayoutBox {
        let (width, height) = self.0.output.effective_resolution();
        LayoutBox {
            x: self.x(),
            y: self.y(),
            width,
            height,
        }
    }
}

impl PartialEq for LayoutOutput {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for LayoutOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutOutput")
            .field("output", &self.0.output.name())
            .field("x", &self.x())
            .field("y", &self.y())
            .finish()
    }
}

struct Entry {
    layout_output: LayoutOutput,
    _output_destroy: Subscription,
}

/// Arrangement of outputs
#[derive(Clone)]
pub struct OutputLayout(Rc<LayoutInner>);

struct LayoutInner {
    entries: RefCell<Vec<Entry>>,
    destroyed: Cell<bool>,
    events: OutputLayoutEvents,
}

impl OutputLayout {
    pub fn create() -> Option<OutputLayout> {
        ledger::record_create(Self::KIND);
        Some(OutputLayout(Rc::new(LayoutInner {
            entries: RefCell::new(Vec::new()),
            destroyed: Cell::new(false),
            events: OutputLayoutEvents::default(),
        })))
    }

    /// Place `output` right of every output already in the layout
    ///
    /// Adding an output twice returns its existing placement.
    pub fn add_auto(&self, output: &Output) -> Option<LayoutOutput> {
        if self.is_destroyed() || output.is_destroyed() {
            warn!("Cannot add {} to the layout", output.name());
            return None;
        }
        if let Some(existing) = self.get(output) {
            return Some(existing);
        }

        let layout_output = LayoutOutput(Rc::new(LayoutOutputInner {
            output: output.clone(),
            x: Cell::new(self.right_edge()),
            y: Cell::new(0),
        }));

        let weak: Weak<LayoutInner> = Rc::downgrade(&self.0);
        let removed = output.clone();
        let sub = output.events().destroy.connect(move |_| {
            if let Some(inner) = weak.upgrade() {
                OutputLayout(inner).remove(&removed);
            }
        });
        self.0.entries.borrow_mut().push(Entry {
            layout_output: layout_output.clone(),
            _output_destroy: sub,
        });
        debug!(
            "Output {} placed at ({}, {})",
            output.name(),
            layout_output.x(),
            layout_output.y()
        );

        self.0.events.add.emit(layout_output.clone());
        self.0.events.change.emit(());
        Some(layout_output)
    }

    /// Drop `output` from the layout and close the gap it leaves
    pub fn remove(&self, output: &Output) {
        let removed: Vec<Entry> = {
            let mut entries = self.0.entries.borrow_mut();
            let (gone, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut *entries)
                .into_iter()
                .partition(|e| e.layout_output.output() == output);
            *entries = kept;
            gone
        };
        if removed.is_empty() {
            return;
        }
        drop(removed);
        self.reflow();
        self.0.events.change.emit(());
    }

    /// Placement of `output`, if it is in the layout
    pub fn get(&self, output: &Output) -> Option<LayoutOutput> {
        self.0
            .entries
            .borrow()
            .iter()
            .find(|e| e.layout_output.output() == output)
            .map(|e| e.layout_output.clone())
    }

    /// Outputs in placement order
    pub fn outputs(&self) -> Vec<LayoutOutput> {
        self.0
            .entries
            .borrow()
            .iter()
            .map(|e| e.layout_output.clone())
            .collect()
    }

    /// Region covered by `output`
    pub fn output_box(&self, output: &Output) -> Option<LayoutBox> {
        self.get(output).map(|lo| lo.layout_box())
    }

    /// Bounding box of all outputs
    pub fn get_box(&self) -> LayoutBox {
        let boxes: Vec<LayoutBox> = self.boxes();
        let Some(first) = boxes.first().copied() else {
            return LayoutBox::default();
        };
        let (x1, y1, x2, y2) = boxes.iter().fold(
            (first.x, first.y, first.x + first.width, first.y + first.height),
            |(x1, y1, x2, y2), b| {
                (
                    x1.min(b.x),
                    y1.min(b.y),
                    x2.max(b.x + b.width),
                    y2.max(b.y + b.height),
                )
            },
        );
        LayoutBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        }
    }

    /// Output under the point
    pub fn output_at(&self, x: f64, y: f64) -> Option<Output> {
        self.outputs()
            .into_iter()
            .find(|lo| lo.layout_box().contains_point(x, y))
            .map(|lo| lo.output().clone())
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        self.boxes().iter().any(|b| b.contains_point(x, y))
    }

    /// Closest point to (x, y) on any output
    ///
    /// `None` when no output covers any area.
    pub fn closest_point(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        self.boxes()
            .iter()
            .map(|b| b.closest_point(x, y))
            .min_by(|a, b| {
                let da = (a.0 - x).powi(2) + (a.1 - y).powi(2);
                let db = (b.0 - x).powi(2) + (b.1 - y).powi(2);
                da.total_cmp(&db)
            })
    }

    pub fn events(&self) -> &OutputLayoutEvents {
        &self.0.events
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.get()
    }

    fn boxes(&self) -> Vec<LayoutBox> {
        self.0
            .entries
            .borrow()
            .iter()
            .map(|e| e.layout_output.layout_box())
            .filter(|b| !b.is_empty())
            .collect()
    }

    fn right_edge(&self) -> i32 {
        self.boxes()
            .iter()
            .map(|b| b.x + b.width)
            .max()
            .unwrap_or(0)
    }

    fn reflow(&self) {
        let mut x = 0;
        for entry in self.0.entries.borrow().iter() {
            let lo = &entry.layout_output;
            lo.0.x.set(x);
            lo.0.y.set(0);
            x += lo.layout_box().width;
        }
    }
}

impl Resource for OutputLayout {
    const KIND: &'static str = "output layout";

    fn destroy(self) {
        if self.0.destroyed.replace(true) {
            return;
        }
        self.0.events.destroy.emit(());
        let entries = std::mem::take(&mut *self.0.entries.borrow_mut());
        drop(entries);
        ledger::record_destroy(Self::KIND);
    }
}

impl std::fmt::Debug for OutputLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputLayout")
            .field("outputs", &self.outputs())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::display::Display;
    use crate::backend::headless::Backend;
    use crate::backend::output::{Mode, OutputState};
    use crate::backend::render::{Allocator, Renderer};

    struct Fixture {
        display: Display,
        backend: Backend,
        renderer: Renderer,
        allocator: Allocator,
    }

    impl Fixture {
        fn new() -> Self {
            let display = Display::create().unwrap();
            let backend = Backend::create(&display, "headless").unwrap();
            let renderer = Renderer::autocreate(&backend).unwrap();
            let allocator = Allocator::autocreate(&backend, &renderer).unwrap();
            Self {
                display,
                backend,
                renderer,
                allocator,
            }
        }

        fn enabled_output(&self, name: &str, width: i32, height: i32) -> Output {
            let output = self.backend.add_output(
                name,
                vec![Mode {
                    width,
                    height,
                    refresh: 60000,
                    preferred: true,
                }],
            );
            assert!(output.init_render(&self.allocator, &self.renderer));
            let mut state = OutputState::new();
            state.set_enabled(true);
            assert!(output.commit_state(&state));
            output
        }

        fn teardown(self) {
            self.allocator.destroy();
            self.renderer.destroy();
            self.backend.destroy();
            self.display.destroy();
        }
    }

    #[test]
    fn test_auto_placement_left_to_right() {
        let fx = Fixture::new();
        let layout = OutputLayout::create().unwrap();
        let a = fx.enabled_output("A", 1920, 1080);
        let b = fx.enabled_output("B", 1280, 720);

        let la = layout.add_auto(&a).unwrap();
        let lb = layout.add_auto(&b).unwrap();
        assert_eq!((la.x(), la.y()), (0, 0));
        assert_eq!((lb.x(), lb.y()), (1920, 0));
        assert_eq!(
            layout.get_box(),
            LayoutBox {
                x: 0,
                y: 0,
                width: 3200,
                height: 1080
            }
        );
        assert_eq!(layout.add_auto(&a), Some(la));

        layout.destroy();
        fx.teardown();
    }

    #[test]
    fn test_closest_point_clamps() {
        let fx = Fixture::new();
        let layout = OutputLayout::create().unwrap();
        assert_eq!(layout.closest_point(5.0, 5.0), None);

        let a = fx.enabled_output("A", 1920, 1080);
        layout.add_auto(&a).unwrap();
        assert_eq!(layout.closest_point(-50.0, -50.0), Some((0.0, 0.0)));
        assert_eq!(layout.closest_point(5000.0, 10.0), Some((1919.0, 10.0)));
        assert!(layout.contains_point(10.0, 5.0));
        assert!(!layout.contains_point(1920.0, 5.0));
        assert_eq!(layout.output_at(10.0, 5.0), Some(a));

        layout.destroy();
        fx.teardown();
    }

    #[test]
    fn test_removed_on_output_destroy() {
        let fx = Fixture::new();
        let layout = OutputLayout::create().unwrap();
        let a = fx.enabled_output("A", 1920, 1080);
        let b = fx.enabled_output("B", 1280, 720);
        layout.add_auto(&a).unwrap();
        let lb = layout.add_auto(&b).unwrap();

        fx.backend.remove_output(&a);
        assert_eq!(layout.outputs(), vec![lb.clone()]);
        assert_eq!(lb.x(), 0);
        assert!(layout.output_box(&a).is_none());

        layout.destroy();
        fx.teardown();
    }
}
