//! Tri-state object handles: null / non-owning / owning.

use std::rc::Weak;

use crate::id::ObjectId;
use crate::runtime::RuntimeInnerCell;

/// A lightweight, `Copy` reference to an object by identity, with no
/// ownership semantics at all. Handed to an object's own event callbacks
/// as "myself", and to sibling objects that only need to name another
/// object without taking part in its lifetime.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NonOwningHandle {
    pub(crate) id: ObjectId,
}

impl NonOwningHandle {
    pub(crate) fn new(id: ObjectId) -> Self {
        Self { id }
    }

    /// The null non-owning handle.
    pub fn null() -> Self {
        Self { id: ObjectId::NULL }
    }

    pub fn id(self) -> ObjectId {
        self.id
    }

    pub fn is_null(self) -> bool {
        self.id.is_null()
    }
}

pub(crate) type WeakRuntime = Weak<RuntimeInnerCell>;

enum HandleState {
    Null,
    NonOwning(WeakRuntime, ObjectId),
    Owning(WeakRuntime, ObjectId),
}

/// A tri-state handle to a [`crate::QaoObject`].
///
/// * **Null** — names nothing.
/// * **Non-owning** — names a live (or since-destroyed) object without
///   affecting its lifetime.
/// * **Owning** — the unique handle responsible for the object's lifetime.
///   Dropping an owning handle detaches (if attached) and destroys the
///   object. Cloning an owning handle yields a non-owning copy: there is
///   never a double-owner.
pub struct Handle {
    state: HandleState,
}

impl Handle {
    /// The null handle.
    pub fn null() -> Self {
        Self {
            state: HandleState::Null,
        }
    }

    pub(crate) fn owning(runtime: WeakRuntime, id: ObjectId) -> Self {
        Self {
            state: HandleState::Owning(runtime, id),
        }
    }

    pub(crate) fn non_owning(runtime: WeakRuntime, id: ObjectId) -> Self {
        Self {
            state: HandleState::NonOwning(runtime, id),
        }
    }

    /// The identity this handle names, or [`ObjectId::NULL`] if null.
    pub fn id(&self) -> ObjectId {
        match &self.state {
            HandleState::Null => ObjectId::NULL,
            HandleState::NonOwning(_, id) | HandleState::Owning(_, id) => *id,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self.state, HandleState::Null)
    }

    pub fn is_owning(&self) -> bool {
        matches!(self.state, HandleState::Owning(..))
    }

    pub fn is_non_owning(&self) -> bool {
        matches!(self.state, HandleState::NonOwning(..))
    }

    /// A cheap, `Copy` non-owning view of this handle's identity.
    pub fn as_non_owning(&self) -> NonOwningHandle {
        NonOwningHandle::new(self.id())
    }

    /// Detaches the named object from its runtime (if attached) and converts
    /// this handle into an owning one, regardless of its previous state.
    /// Mirrors the factory's destruction protocol symmetry: detaching an
    /// object owned by the scheduler yields ownership back to the caller.
    pub fn detach(self, runtime: &crate::runtime::RuntimeRef) -> Handle {
        runtime.detach_object(self.id())
    }
}

impl Clone for Handle {
    fn clone(&self) -> Self {
        match &self.state {
            HandleState::Null => Self::null(),
            // Copy of an owning handle yields a non-owning copy: never a double-owner.
            HandleState::Owning(w, id) | HandleState::NonOwning(w, id) => {
                Self::non_owning(w.clone(), *id)
            }
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if let HandleState::Owning(weak, id) = &self.state {
            if let Some(cell) = weak.upgrade() {
                cell.borrow_mut().destroy_object(*id);
            }
        }
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.state {
            HandleState::Null => "null",
            HandleState::NonOwning(..) => "non-owning",
            HandleState::Owning(..) => "owning",
        };
        write!(f, "Handle({kind}, {:?})", self.id())
    }
}
