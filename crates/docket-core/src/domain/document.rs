//! Identity of a stored document.

use std::fmt;
use std::hash::Hash;

/// Anything the document store can hold: cloneable, sendable, with an id.
pub trait Document: Clone + Send + Sync + 'static {
    type Id: Clone + Eq + Hash + fmt::Display + fmt::Debug + Send + Sync + 'static;

    fn id(&self) -> &Self::Id;
}
