//! The merged, name-keyed view of all tools available to one run.

mod builder;

use std::collections::HashMap;

use toolrelay_model::ModelTool;

use crate::backend::BackendHandle;
use crate::tool::ToolDescriptor;
pub use builder::CatalogBuilder;

/// Records that a tool name was registered twice.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Collision {
    /// The contested tool name.
    pub tool: String,
    /// The back-end that owned the name before.
    pub previous: String,
    /// The back-end that owns the name now.
    pub current: String,
}

struct Entry {
    descriptor: ToolDescriptor,
    backend: BackendHandle,
}

/// Maps tool names to the back-end that serves them.
///
/// # Overwrite policy
///
/// Names are unique. Registering a name that is already present replaces
/// the previous entry (descriptor and back-end) in place, logs a warning
/// and records a [`Collision`]. There is no merging. The position of the
/// name in [`definitions`](Self::definitions) is the position of its first
/// registration.
#[derive(Default)]
pub struct Catalog {
    entries: HashMap<String, Entry>,
    order: Vec<String>,
    collisions: Vec<Collision>,
}

impl Catalog {
    /// Registers a tool served by `backend`.
    ///
    /// Returns the collision if the name was already taken.
    pub fn register(
        &mut self,
        descriptor: ToolDescriptor,
        backend: BackendHandle,
    ) -> Option<Collision> {
        let name = descriptor.name.clone();
        let entry = Entry {
            descriptor,
            backend,
        };
        let Some(previous) = self.entries.insert(name.clone(), entry) else {
            self.order.push(name);
            return None;
        };

        let collision = Collision {
            current: self.entries[&name].backend.id().to_owned(),
            previous: previous.backend.id().to_owned(),
            tool: name,
        };
        warn!(
            tool = %collision.tool,
            previous = %collision.previous,
            current = %collision.current,
            "tool name is already registered, overwriting previous registration"
        );
        self.collisions.push(collision.clone());
        Some(collision)
    }

    /// Returns the back-end serving `name`.
    #[inline]
    pub fn backend(&self, name: &str) -> Option<&BackendHandle> {
        self.entries.get(name).map(|entry| &entry.backend)
    }

    /// Returns the descriptor registered for `name`.
    #[inline]
    pub fn descriptor(&self, name: &str) -> Option<&ToolDescriptor> {
        self.entries.get(name).map(|entry| &entry.descriptor)
    }

    /// Returns the tool names in registration order.
    #[inline]
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Returns the collisions seen so far.
    #[inline]
    pub fn collisions(&self) -> &[Collision] {
        &self.collisions
    }

    /// Returns the number of distinct tool names.
    #[inline]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns whether no tool is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Returns the tool list sent to the model.
    pub fn definitions(&self) -> Vec<ModelTool> {
        self.order
            .iter()
            .filter_map(|name| self.entries.get(name))
            .map(|entry| entry.descriptor.to_model_tool())
            .collect()
    }
}
