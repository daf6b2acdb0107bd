//! Scene graph
//!
//! The scene is a tree of nodes rooted at one tree node. Children are kept
//! in stacking order, the last child is drawn frontmost. Nothing is
//! rasterised: committing a scene output only records whether the scene
//! changed since its previous frame.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, warn};

use super::layout::{LayoutOutput, OutputLayout};
use super::ledger;
use super::output::Output;
use super::shell::{Surface, XdgSurface};
use crate::utils::{Resource, Subscription, Time};

/// Unique identifier for scene nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u64);

impl NodeId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        NodeId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// What a node draws
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Groups other nodes
    Tree,
    /// A client xdg surface
    XdgSurface(XdgSurface),
}

struct Node {
    parent: Option<NodeId>,
    kind: NodeKind,
    children: Vec<NodeId>,
    _surface_destroy: Option<Subscription>,
}

/// The render tree
#[derive(Clone)]
pub struct Scene(Rc<SceneInner>);

struct SceneInner {
    root: NodeId,
    nodes: RefCell<HashMap<NodeId, Node>>,
    outputs: RefCell<Vec<SceneOutput>>,
    /// Bumped on every change to the tree
    damage: Cell<u64>,
    destroyed: Cell<bool>,
}

impl Scene {
    pub fn create() -> Option<Scene> {
        let root = NodeId::new();
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            Node {
                parent: None,
                kind: NodeKind::Tree,
                children: Vec::new(),
                _surface_destroy: None,
            },
        );
        ledger::record_create(Self::KIND);
        Some(Scene(Rc::new(SceneInner {
            root,
            nodes: RefCell::new(nodes),
            outputs: RefCell::new(Vec::new()),
            damage: Cell::new(0),
            destroyed: Cell::new(false),
        })))
    }

    /// The root tree node
    pub fn root(&self) -> NodeId {
        self.0.root
    }

    /// Add a node drawing `xdg_surface` on top of `parent`'s children
    ///
    /// The node removes itself when the surface is destroyed.
    pub fn xdg_surface_create(&self, parent: NodeId, xdg_surface: &XdgSurface) -> Option<NodeId> {
        if self.is_destroyed() || xdg_surface.surface().is_destroyed() {
            return None;
        }
        let id = NodeId::new();

        let weak: Weak<SceneInner> = Rc::downgrade(&self.0);
        let sub = xdg_surface.surface().events().destroy.connect(move |_| {
            if let Some(inner) = weak.upgrade() {
                Scene(inner).node_destroy(id);
            }
        });

        {
            let mut nodes = self.0.nodes.borrow_mut();
            let Some(parent_node) = nodes.get_mut(&parent) else {
                warn!("Scene node {:?} does not exist", parent);
                return None;
            };
            parent_node.children.push(id);
            nodes.insert(
                id,
                Node {
                    parent: Some(parent),
                    kind: NodeKind::XdgSurface(xdg_surface.clone()),
                    children: Vec::new(),
                    _surface_destroy: Some(sub),
                },
            );
        }
        ledger::record_create("scene node");
        self.damage();
        Some(id)
    }

    /// Move `node` above its siblings
    pub fn raise_to_top(&self, node: NodeId) {
        {
            let mut nodes = self.0.nodes.borrow_mut();
            let Some(parent) = nodes.get(&node).and_then(|n| n.parent) else {
                return;
            };
            let Some(parent) = nodes.get_mut(&parent) else {
                return;
            };
            if parent.children.last() == Some(&node) {
                return;
            }
            parent.children.retain(|c| *c != node);
            parent.children.push(node);
        }
        self.damage();
    }

    /// Remove `node` and everything below it
    pub fn node_destroy(&self, node: NodeId) {
        if node == self.0.root {
            warn!("The scene root cannot be destroyed on its own");
            return;
        }
        let removed = {
            let mut nodes = self.0.nodes.borrow_mut();
            let Some(parent) = nodes.get(&node).and_then(|n| n.parent) else {
                return;
            };
            if let Some(parent) = nodes.get_mut(&parent) {
                parent.children.retain(|c| *c != node);
            }
            let mut removed = Vec::new();
            let mut stack = vec![node];
            while let Some(id) = stack.pop() {
                if let Some(n) = nodes.remove(&id) {
                    stack.extend(n.children.iter().copied());
                    removed.push(n);
                }
            }
            removed
        };
        for _ in &removed {
            ledger::record_destroy("scene node");
        }
        debug!("Removed {} scene node(s)", removed.len());
        drop(removed);
        self.damage();
    }

    /// Children of `node`, back to front
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.0
            .nodes
            .borrow()
            .get(&node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    pub fn kind(&self, node: NodeId) -> Option<NodeKind> {
        self.0.nodes.borrow().get(&node).map(|n| n.kind.clone())
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.0.nodes.borrow().contains_key(&node)
    }

    /// Client surfaces in the tree, back to front
    pub fn surfaces(&self) -> Vec<Surface> {
        let nodes = self.0.nodes.borrow();
        let mut surfaces = Vec::new();
        let mut stack = vec![self.0.root];
        while let Some(id) = stack.pop() {
            let Some(node) = nodes.get(&id) else {
                continue;
            };
            if let NodeKind::XdgSurface(xdg) = &node.kind {
                surfaces.push(xdg.surface().clone());
            }
            stack.extend(node.children.iter().rev().copied());
        }
        surfaces
    }

    /// Change counter, bumped whenever the tree is modified
    pub fn damage_seq(&self) -> u64 {
        self.0.damage.get()
    }

    /// The scene output showing `output`
    pub fn get_scene_output(&self, output: &Output) -> Option<SceneOutput> {
        self.0
            .outputs
            .borrow()
            .iter()
            .find(|so| so.output() == output)
            .cloned()
    }

    pub fn outputs(&self) -> Vec<SceneOutput> {
        self.0.outputs.borrow().clone()
    }

    /// Keep scene outputs positioned where `layout` places their outputs
    pub fn attach_output_layout(&self, layout: &OutputLayout) -> Option<SceneOutputLayout> {
        if self.is_destroyed() || layout.is_destroyed() {
            return None;
        }
        let inner = Rc::new(SceneOutputLayoutInner {
            entries: RefCell::new(Vec::new()),
            change: RefCell::new(None),
        });
        let weak: Weak<SceneOutputLayoutInner> = Rc::downgrade(&inner);
        let sub = layout.events().change.connect(move |_| {
            if let Some(inner) = weak.upgrade() {
                SceneOutputLayout(inner).sync();
            }
        });
        *inner.change.borrow_mut() = Some(sub);
        Some(SceneOutputLayout(inner))
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.get()
    }

    fn damage(&self) {
        self.0.damage.set(self.0.damage.get() + 1);
    }
}

impl Resource for Scene {
    const KIND: &'static str = "scene";

    fn destroy(self) {
        if self.0.destroyed.replace(true) {
            return;
        }
        let outputs = std::mem::take(&mut *self.0.outputs.borrow_mut());
        for output in outputs {
            output.destroy();
        }
        let nodes = std::mem::take(&mut *self.0.nodes.borrow_mut());
        for (id, _) in nodes.iter() {
            if *id != self.0.root {
                ledger::record_destroy("scene node");
            }
        }
        drop(nodes);
        ledger::record_destroy(Self::KIND);
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("nodes", &self.0.nodes.borrow().len())
            .field("outputs", &self.0.outputs.borrow().len())
            .finish()
    }
}

/// One output's view of the scene
#[derive(Clone)]
pub struct SceneOutput(Rc<SceneOutputInner>);

struct SceneOutputInner {
    output: Output,
    scene: Weak<SceneInner>,
    x: Cell<i32>,
    y: Cell<i32>,
    commits: Cell<u64>,
    frames_rendered: Cell<u64>,
    rendered_damage: Cell<Option<u64>>,
    frame_done: Cell<Option<Time>>,
    destroyed: Cell<bool>,
    output_destroy: RefCell<Option<Subscription>>,
}

impl SceneOutput {
    /// Create the scene output for `output`
    ///
    /// It is destroyed along with the output or the scene.
    pub fn create(scene: &Scene, output: &Output) -> Option<SceneOutput> {
        if scene.is_destroyed() || output.is_destroyed() {
            return None;
        }
        if let Some(existing) = scene.get_scene_output(output) {
            return Some(existing);
        }

        let scene_output = SceneOutput(Rc::new(SceneOutputInner {
            output: output.clone(),
            scene: Rc::downgrade(&scene.0),
            x: Cell::new(0),
            y: Cell::new(0),
            commits: Cell::new(0),
            frames_rendered: Cell::new(0),
            rendered_damage: Cell::new(None),
            frame_done: Cell::new(None),
            destroyed: Cell::new(false),
            output_destroy: RefCell::new(None),
        }));

        let weak: Weak<SceneOutputInner> = Rc::downgrade(&scene_output.0);
        let sub = output.events().destroy.connect(move |_| {
            if let Some(inner) = weak.upgrade() {
                SceneOutput(inner).destroy();
            }
        });
        *scene_output.0.output_destroy.borrow_mut() = Some(sub);

        scene.0.outputs.borrow_mut().push(scene_output.clone());
        ledger::record_create("scene output");
        Some(scene_output)
    }

    pub fn output(&self) -> &Output {
        &self.0.output
    }

    pub fn position(&self) -> (i32, i32) {
        (self.0.x.get(), self.0.y.get())
    }

    pub fn set_position(&self, x: i32, y: i32) {
        self.0.x.set(x);
        self.0.y.set(y);
    }

    /// Submit the scene to the output
    ///
    /// Fails while the output is disabled. A frame is only rendered when the
    /// scene changed since the previous one.
    pub fn commit(&self) -> bool {
        let Some(scene) = self.0.scene.upgrade() else {
            return false;
        };
        if self.is_destroyed() || !self.0.output.is_enabled() {
            return false;
        }
        self.0.commits.set(self.0.commits.get() + 1);

        let damage = scene.damage.get();
        if self.0.rendered_damage.get() != Some(damage) {
            self.0.rendered_damage.set(Some(damage));
            self.0.frames_rendered.set(self.0.frames_rendered.get() + 1);
        }
        true
    }

    /// Tell every surface in the scene that a frame was presented at `now`
    pub fn send_frame_done(&self, now: Time) {
        let Some(scene) = self.0.scene.upgrade() else {
            return;
        };
        self.0.frame_done.set(Some(now));
        for surface in Scene(scene).surfaces() {
            surface.send_frame_done(now);
        }
    }

    /// Number of successful commits
    pub fn commit_count(&self) -> u64 {
        self.0.commits.get()
    }

    /// Number of commits that produced a new frame
    pub fn frames_rendered(&self) -> u64 {
        self.0.frames_rendered.get()
    }

    pub fn last_frame_done(&self) -> Option<Time> {
        self.0.frame_done.get()
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.get()
    }

    fn destroy(&self) {
        if self.0.destroyed.replace(true) {
            return;
        }
        if let Some(scene) = self.0.scene.upgrade() {
            if let Ok(mut outputs) = scene.outputs.try_borrow_mut() {
                outputs.retain(|so| !Rc::ptr_eq(&so.0, &self.0));
            }
        }
        self.0.output_destroy.borrow_mut().take();
        ledger::record_destroy("scene output");
    }
}

impl PartialEq for SceneOutput {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for SceneOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneOutput")
            .field("output", &self.0.output.name())
            .field("position", &self.position())
            .field("commits", &self.commit_count())
            .finish()
    }
}

/// Keeps scene outputs in sync with an output layout
#[derive(Clone)]
pub struct SceneOutputLayout(Rc<SceneOutputLayoutInner>);

struct SceneOutputLayoutInner {
    entries: RefCell<Vec<(LayoutOutput, SceneOutput)>>,
    change: RefCell<Option<Subscription>>,
}

impl SceneOutputLayout {
    /// Position `scene_output` wherever the layout puts `layout_output`
    pub fn add_output(&self, layout_output: &LayoutOutput, scene_output: &SceneOutput) {
        scene_output.set_position(layout_output.x(), layout_output.y());
        self.0
            .entries
            .borrow_mut()
            .push((layout_output.clone(), scene_output.clone()));
    }

    /// Scene outputs being tracked
    pub fn outputs(&self) -> Vec<SceneOutput> {
        self.0
            .entries
            .borrow()
            .iter()
            .filter(|(_, so)| !so.is_destroyed())
            .map(|(_, so)| so.clone())
            .collect()
    }

    fn sync(&self) {
        let mut entries = self.0.entries.borrow_mut();
        entries.retain(|(_, so)| !so.is_destroyed());
        for (lo, so) in entries.iter() {
            so.set_position(lo.x(), lo.y());
        }
    }
}

impl std::fmt::Debug for SceneOutputLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneOutputLayout")
            .field("outputs", &self.0.entries.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::display::Display;
    use crate::backend::shell::{ClientId, XdgShell};
    use crate::utils::Clock;

    fn toplevel(shell: &XdgShell) -> XdgSurface {
        let surface = Surface::new(ClientId::new());
        shell.get_toplevel(&surface, None)
    }

    #[test]
    fn test_newest_node_on_top() {
        let display = Display::create().unwrap();
        let shell = XdgShell::create(&display, 3).unwrap();
        let scene = Scene::create().unwrap();

        let a = scene.xdg_surface_create(scene.root(), &toplevel(&shell)).unwrap();
        let b = scene.xdg_surface_create(scene.root(), &toplevel(&shell)).unwrap();
        assert_eq!(scene.children(scene.root()), vec![a, b]);

        scene.raise_to_top(a);
        assert_eq!(scene.children(scene.root()), vec![b, a]);

        scene.destroy();
        display.destroy();
    }

    #[test]
    fn test_node_removed_with_surface() {
        let before = ledger::snapshot();
        let display = Display::create().unwrap();
        let shell = XdgShell::create(&display, 3).unwrap();
        let scene = Scene::create().unwrap();

        let xdg = toplevel(&shell);
        let node = scene.xdg_surface_create(scene.root(), &xdg).unwrap();
        let damage = scene.damage_seq();
        assert_eq!(scene.surfaces(), vec![xdg.surface().clone()]);

        xdg.surface().destroy();
        assert!(!scene.contains(node));
        assert!(scene.children(scene.root()).is_empty());
        assert!(scene.damage_seq() > damage);

        scene.destroy();
        display.destroy();
        assert!(ledger::snapshot().since(&before).is_balanced());
    }

    #[test]
    fn test_unknown_parent() {
        let display = Display::create().unwrap();
        let shell = XdgShell::create(&display, 3).unwrap();
        let scene = Scene::create().unwrap();

        assert!(scene.xdg_surface_create(NodeId(u64::MAX), &toplevel(&shell)).is_none());

        scene.destroy();
        display.destroy();
    }

    #[test]
    fn test_frame_done_reaches_surfaces() {
        let display = Display::create().unwrap();
        let shell = XdgShell::create(&display, 3).unwrap();
        let scene = Scene::create().unwrap();
        let backend = crate::backend::headless::Backend::create(&display, "headless").unwrap();
        let output = backend.add_output("HEADLESS-1", Vec::new());
        let scene_output = SceneOutput::create(&scene, &output).unwrap();

        let xdg = toplevel(&shell);
        scene.xdg_surface_create(scene.root(), &xdg).unwrap();

        // disabled outputs do not take frames
        assert!(!scene_output.commit());

        let now = Clock::new().now();
        scene_output.send_frame_done(now);
        assert_eq!(scene_output.last_frame_done(), Some(now));
        assert_eq!(xdg.surface().last_frame_done(), Some(now));

        backend.remove_output(&output);
        assert!(scene_output.is_destroyed());
        assert!(scene.get_scene_output(&output).is_none());

        backend.destroy();
        scene.destroy();
        display.destroy();
    }
}
