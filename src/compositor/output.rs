//! Output management
//!
//! Configures outputs as the backend reports them and keeps one record per
//! configured output. A record owns the output's frame and destroy
//! subscriptions, so dropping it stops all callbacks for that output.

use std::collections::HashMap;

use log::{debug, info, warn};

use crate::backend::{LayoutOutput, Output, OutputId, OutputState, SceneOutput};
use crate::compositor::CompositorState;
use crate::utils::Subscription;

/// A configured output
#[derive(Debug)]
pub struct OutputRecord {
    /// The backend's output
    pub output: Output,
    /// Its placement in the layout
    pub layout_output: LayoutOutput,
    /// Its view of the scene
    pub scene_output: SceneOutput,
    _frame: Subscription,
    _destroy: Subscription,
}

/// Manager for all configured outputs
#[derive(Debug)]
pub struct OutputManager {
    outputs: HashMap<OutputId, OutputRecord>,
}

impl OutputManager {
    /// Create a new output manager
    pub fn new() -> Self {
        Self {
            outputs: HashMap::new(),
        }
    }

    fn insert(&mut self, record: OutputRecord) {
        self.outputs.insert(record.output.id(), record);
    }

    /// Get an output record by ID
    pub fn get(&self, id: OutputId) -> Option<&OutputRecord> {
        self.outputs.get(&id)
    }

    /// Remove an output record, dropping its subscriptions
    pub fn remove(&mut self, id: OutputId) -> Option<OutputRecord> {
        self.outputs.remove(&id)
    }

    /// Get all output records
    pub fn iter(&self) -> impl Iterator<Item = (&OutputId, &OutputRecord)> {
        self.outputs.iter()
    }

    /// Get count of outputs
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

impl Default for OutputManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositorState {
    /// Configure a newly reported output and put it in the layout and scene
    ///
    /// An output that cannot be attached to the renderer or refuses its
    /// configuration is left alone.
    pub fn handle_new_output(&mut self, output: &Output) {
        debug!("New output {}", output.name());

        if !output.init_render(&self.allocator, &self.renderer) {
            warn!("Failed to attach output {} to the renderer", output.name());
            return;
        }

        {
            let mut state = OutputState::new();
            state.set_enabled(true);
            if let Some(mode) = output.preferred_mode() {
                state.set_mode(mode);
            }
            if !output.commit_state(&state) {
                warn!("Failed to configure output {}", output.name());
                return;
            }
        }

        let Some(layout_output) = self.output_layout.add_auto(output) else {
            warn!("Failed to add output {} to the layout", output.name());
            return;
        };
        let Some(scene_output) = SceneOutput::create(&self.scene, output) else {
            warn!("Failed to create a scene output for {}", output.name());
            return;
        };
        self.scene_output_layout
            .add_output(&layout_output, &scene_output);

        let frame = Subscription::bind(&self.this, &output.events().frame, {
            let scene_output = scene_output.clone();
            move |state: &mut CompositorState, _: &()| state.handle_output_frame(&scene_output)
        });
        let destroy = Subscription::bind(&self.this, &output.events().destroy, {
            let id = output.id();
            move |state: &mut CompositorState, _: &()| state.handle_output_destroy(id)
        });

        info!(
            "Output {} enabled at ({}, {}) with {:?}",
            output.name(),
            layout_output.x(),
            layout_output.y(),
            output.current_mode()
        );
        self.outputs.insert(OutputRecord {
            output: output.clone(),
            layout_output,
            scene_output,
            _frame: frame,
            _destroy: destroy,
        });
    }

    /// Render the scene for one output and tell clients the frame is done
    fn handle_output_frame(&mut self, scene_output: &SceneOutput) {
        if !scene_output.commit() {
            debug!("Skipped frame on {}", scene_output.output().name());
        }
        scene_output.send_frame_done(self.clock.now());
    }

    fn handle_output_destroy(&mut self, id: OutputId) {
        if let Some(record) = self.outputs.remove(id) {
            info!("Output {} removed", record.output.name());
        }
    }
}
