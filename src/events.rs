//! Landmark result notifications.
//!
//! Listeners receive at most one `OrientationUpdated` per tick: the first face
//! found in the frame. Additional faces are drawn but not published.

use serde::Serialize;

use crate::detect::{FaceRect, LandmarkPoint};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OrientationUpdated {
    pub rect: FaceRect,
    pub landmarks: Vec<LandmarkPoint>,
}

type Listener = Box<dyn FnMut(&OrientationUpdated) + Send>;

/// Multicast list of listeners.
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<Listener>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: FnMut(&OrientationUpdated) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    pub fn emit(&mut self, event: &OrientationUpdated) {
        for listener in &mut self.listeners {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
