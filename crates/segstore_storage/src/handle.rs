//! Ownership of a resource shared between an input and its clones.

use std::sync::{Arc, Weak};

/// A resource held by an owning input and weakly referenced by its clones.
///
/// Only the owner can release the resource. Once released, clones can no
/// longer reach it; a clone in the middle of a read keeps it alive until that
/// read finishes.
#[derive(Debug)]
pub(crate) enum SharedHandle<T: ?Sized> {
    /// Held by the instance that opened the resource.
    Owner(Arc<T>),
    /// Held by clones and slices.
    Clone(Weak<T>),
    /// The owner released the resource.
    Released,
}

impl<T: ?Sized> SharedHandle<T> {
    /// Wraps a freshly opened resource.
    pub(crate) fn owner(resource: Arc<T>) -> Self {
        Self::Owner(resource)
    }

    /// Returns a non-owning handle to the same resource.
    pub(crate) fn share(&self) -> Self {
        match self {
            Self::Owner(arc) => Self::Clone(Arc::downgrade(arc)),
            Self::Clone(weak) => Self::Clone(weak.clone()),
            Self::Released => Self::Released,
        }
    }

    /// Runs `f` against the resource, or returns `None` once it is released.
    pub(crate) fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        match self {
            Self::Owner(arc) => Some(f(arc)),
            Self::Clone(weak) => weak.upgrade().map(|arc| f(&arc)),
            Self::Released => None,
        }
    }

    /// Returns true if this handle does not own the resource.
    pub(crate) fn is_clone(&self) -> bool {
        matches!(self, Self::Clone(_))
    }

    /// Drops the owner's reference. Returns false (and does nothing) for clones.
    pub(crate) fn release(&mut self) -> bool {
        match self {
            Self::Owner(_) => {
                *self = Self::Released;
                true
            }
            Self::Released => true,
            Self::Clone(_) => false,
        }
    }
}
