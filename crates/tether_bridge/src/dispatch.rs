//! # Command Dispatch
//!
//! Routes a decoded command to its handler by name.
//!
//! ## Handler Classes
//!
//! | Class             | Examples                                         |
//! |-------------------|--------------------------------------------------|
//! | `Registry`        | makeObject, destroyObject, setParent, geometry   |
//! | `ClockDiagnostic` | _teatime, croquetPing, log, measure              |
//! | `PassThrough`     | anything the application registers itself       |
//!
//! A name with no entry goes to the endpoint's fallback, and failing that is
//! logged and dropped. Nothing here is fatal.

use std::collections::HashMap;
use std::fmt;

use crate::error::BridgeResult;
use crate::protocol::Command;

/// A handler bound to an endpoint type `C`.
pub type Handler<C> = fn(&mut C, &Command) -> BridgeResult<()>;

/// Caller-supplied handler for commands with no table entry. Returns
/// `true` if it consumed the command.
pub type FallbackHandler = Box<dyn FnMut(&Command) -> bool + Send>;

/// What a handler touches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HandlerClass {
    /// Creates, destroys, reparents or moves objects.
    Registry,
    /// Clock beacons, ping, log forwarding and measurement.
    ClockDiagnostic,
    /// Application-specific.
    PassThrough,
}

/// How a command was handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatched {
    /// A table entry ran.
    Handled(HandlerClass),
    /// No entry; the fallback consumed it.
    Fallback,
    /// Nobody wanted it.
    Unknown,
}

struct Entry<C> {
    class: HandlerClass,
    handler: Handler<C>,
}

impl<C> Clone for Entry<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for Entry<C> {}

/// Name → handler map for one endpoint type.
pub struct DispatchTable<C> {
    entries: HashMap<&'static str, Entry<C>>,
}

impl<C> DispatchTable<C> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Binds `name` to `handler`, replacing any earlier binding.
    pub fn register(&mut self, name: &'static str, class: HandlerClass, handler: Handler<C>) -> &mut Self {
        self.entries.insert(name, Entry { class, handler });
        self
    }

    /// Removes a binding. Returns true if there was one.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    /// Class of the handler bound to `name`.
    #[must_use]
    pub fn class_of(&self, name: &str) -> Option<HandlerClass> {
        self.entries.get(name).map(|entry| entry.class)
    }

    /// True if `name` has a binding.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runs the handler for `command` against `context`.
    ///
    /// `fallback` sees commands with no binding.
    ///
    /// # Errors
    ///
    /// Whatever the handler returns. The caller logs it and moves on.
    pub fn dispatch(
        &self,
        context: &mut C,
        command: &Command,
        fallback: Option<&mut FallbackHandler>,
    ) -> BridgeResult<Dispatched> {
        if let Some(entry) = self.entries.get(command.name.as_str()) {
            (entry.handler)(context, command)?;
            return Ok(Dispatched::Handled(entry.class));
        }
        if let Some(handler) = fallback {
            if handler(command) {
                return Ok(Dispatched::Fallback);
            }
        }
        Ok(Dispatched::Unknown)
    }
}

impl<C> Default for DispatchTable<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Clone for DispatchTable<C> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<C> fmt::Debug for DispatchTable<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.entries.keys().copied().collect();
        names.sort_unstable();
        f.debug_struct("DispatchTable").field("commands", &names).finish()
    }
}
