//! Single-owner handles over native resources
//!
//! Every toolkit object the server creates is wrapped in a [`Handle`]. The
//! handle is the only owner allowed to tear the resource down, and does so
//! exactly once when it is dropped.

use std::fmt;
use std::ops::Deref;

use log::{debug, warn};

use crate::error::Error;

/// A native resource with a specific destroy operation
pub trait Resource {
    /// Human readable name used in logs and errors
    const KIND: &'static str;

    /// Tear the resource down
    fn destroy(self);
}

/// Owns one native resource and destroys it on drop
///
/// An empty handle (see [`Handle::empty`] and [`Handle::take`]) owns nothing
/// and does nothing when dropped.
pub struct Handle<R: Resource> {
    raw: Option<R>,
}

impl<R: Resource> Handle<R> {
    /// Run a creation primitive and wrap its result
    ///
    /// Returns `None` when the primitive could not allocate the resource.
    pub fn try_create<F>(create: F) -> Option<Self>
    where
        F: FnOnce() -> Option<R>,
    {
        match create() {
            Some(raw) => {
                debug!("Created {}", R::KIND);
                Some(Self { raw: Some(raw) })
            }
            None => {
                warn!("Failed to create {}", R::KIND);
                None
            }
        }
    }

    /// Like [`Handle::try_create`], turning failure into an [`Error`]
    pub fn create<F>(create: F) -> Result<Self, Error>
    where
        F: FnOnce() -> Option<R>,
    {
        Self::try_create(create).ok_or(Error::ResourceCreation(R::KIND))
    }

    /// A handle that owns nothing
    pub fn empty() -> Self {
        Self { raw: None }
    }

    /// Whether this handle owns nothing
    pub fn is_empty(&self) -> bool {
        self.raw.is_none()
    }

    /// Access the owned resource
    ///
    /// # Panics
    ///
    /// Panics if the handle is empty.
    pub fn get(&self) -> &R {
        match &self.raw {
            Some(raw) => raw,
            None => panic!("use of an empty {} handle", R::KIND),
        }
    }

    /// Move ownership out of this handle, leaving it empty
    pub fn take(&mut self) -> Self {
        Self {
            raw: self.raw.take(),
        }
    }
}

impl<R: Resource> Deref for Handle<R> {
    type Target = R;

    fn deref(&self) -> &R {
        self.get()
    }
}

impl<R: Resource> Default for Handle<R> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<R: Resource> Drop for Handle<R> {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            debug!("Destroying {}", R::KIND);
            raw.destroy();
        }
    }
}

impl<R: Resource> fmt::Debug for Handle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("kind", &R::KIND)
            .field("empty", &self.is_empty())
            .finish()
    }
}
