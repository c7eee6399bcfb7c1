//! Teardown entries.
//!
//! Everything an object must release when it is destroyed is pushed onto
//! its teardown list. Destruction runs the list in reverse order.

use std::fmt;

use super::Object;
use crate::reactive::runtime::{self, ObjectKey};
use crate::reactive::Connection;
use crate::error::ScriptError;

pub(crate) enum TeardownEntry {
    /// A child object, destroyed with its parent.
    Child(ObjectKey),
    /// A connection made on this object's behalf to another object's signal.
    Connection(Connection),
    /// A user callback registered with [`Object::on_destroy`].
    Cleanup(Box<dyn FnOnce()>),
}

impl TeardownEntry {
    pub(crate) fn run(self) {
        match self {
            TeardownEntry::Child(child) => Object::from_key(child).destroy(),
            TeardownEntry::Connection(connection) => {
                connection.disconnect();
            }
            TeardownEntry::Cleanup(callback) => {
                let outcome = runtime::guarded(|| {
                    callback();
                    Ok::<_, ScriptError>(())
                });
                if let Err(err) = outcome {
                    runtime::record(|d| d.handler_errors += 1);
                    tracing::error!(error = %err, "destruction callback failed");
                }
            }
        }
    }

    pub(crate) fn is_child(&self, key: ObjectKey) -> bool {
        matches!(self, TeardownEntry::Child(child) if *child == key)
    }

    pub(crate) fn is_connection(&self, connection: Connection) -> bool {
        matches!(self, TeardownEntry::Connection(c) if *c == connection)
    }
}

impl fmt::Debug for TeardownEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeardownEntry::Child(child) => f.debug_tuple("Child").field(child).finish(),
            TeardownEntry::Connection(c) => f.debug_tuple("Connection").field(c).finish(),
            TeardownEntry::Cleanup(_) => f.write_str("Cleanup(..)"),
        }
    }
}
