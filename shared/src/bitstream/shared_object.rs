use std::{
    collections::{hash_set, HashSet},
    hash::{Hash, Hasher},
    ops::Deref,
    rc::{Rc, Weak},
    sync::atomic::{AtomicU32, Ordering},
};

use super::Object;

static NEXT_ID: AtomicU32 = AtomicU32::new(1);

fn next_id() -> u32 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// An immutable object shared by reference between octree values and peers.
/// Objects derived from one another share an origin id, which lets the
/// bitstream send a successor as a delta against its acknowledged predecessor.
#[derive(Debug)]
pub struct SharedObject {
    id: u32,
    origin_id: u32,
    remote_id: u32,
    remote_origin_id: u32,
    object: Object,
}

impl SharedObject {
    pub fn new(object: Object) -> SharedObjectPointer {
        let id = next_id();
        SharedObjectPointer(Rc::new(Self {
            id,
            origin_id: id,
            remote_id: 0,
            remote_origin_id: 0,
            object,
        }))
    }

    /// Creates a new object that replaces this one
    pub fn successor(&self, object: Object) -> SharedObjectPointer {
        SharedObjectPointer(Rc::new(Self {
            id: next_id(),
            origin_id: self.origin_id,
            remote_id: 0,
            remote_origin_id: 0,
            object,
        }))
    }

    pub(crate) fn received(
        object: Object,
        origin_id: Option<u32>,
        remote_id: u32,
        remote_origin_id: u32,
    ) -> SharedObjectPointer {
        let id = next_id();
        SharedObjectPointer(Rc::new(Self {
            id,
            origin_id: origin_id.unwrap_or(id),
            remote_id,
            remote_origin_id,
            object,
        }))
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn origin_id(&self) -> u32 {
        self.origin_id
    }

    /// The id the sending peer uses for this object, or 0 if created locally
    pub fn remote_id(&self) -> u32 {
        self.remote_id
    }

    pub fn remote_origin_id(&self) -> u32 {
        self.remote_origin_id
    }

    pub fn object(&self) -> &Object {
        &self.object
    }

    /// Compares contents rather than identity
    pub fn equals(&self, other: &SharedObject) -> bool {
        self.object == other.object
    }
}

/// Reference to a `SharedObject`; equality and hashing are by identity
#[derive(Debug, Clone)]
pub struct SharedObjectPointer(pub(crate) Rc<SharedObject>);

impl SharedObjectPointer {
    pub fn downgrade(&self) -> Weak<SharedObject> {
        Rc::downgrade(&self.0)
    }

    pub fn strong_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }
}

impl Deref for SharedObjectPointer {
    type Target = SharedObject;

    fn deref(&self) -> &SharedObject {
        &self.0
    }
}

impl PartialEq for SharedObjectPointer {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for SharedObjectPointer {}

impl Hash for SharedObjectPointer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.0).hash(state);
    }
}

/// Compares two optional objects by contents
pub fn shared_objects_equal(
    first: Option<&SharedObjectPointer>,
    second: Option<&SharedObjectPointer>,
) -> bool {
    match (first, second) {
        (Some(first), Some(second)) => first.equals(second),
        (None, None) => true,
        _ => false,
    }
}

/// An unordered set of shared objects
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SharedObjectSet(HashSet<SharedObjectPointer>);

impl SharedObjectSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, object: SharedObjectPointer) -> bool {
        self.0.insert(object)
    }

    pub fn remove(&mut self, object: &SharedObjectPointer) -> bool {
        self.0.remove(object)
    }

    pub fn contains(&self, object: &SharedObjectPointer) -> bool {
        self.0.contains(object)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> hash_set::Iter<'_, SharedObjectPointer> {
        self.0.iter()
    }

    /// Sets are equal if every object of one has an equal-content counterpart
    /// in the other
    pub fn deep_equals(&self, other: &SharedObjectSet) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|first| other.iter().any(|second| first.equals(second)))
    }
}

impl FromIterator<SharedObjectPointer> for SharedObjectSet {
    fn from_iter<T: IntoIterator<Item = SharedObjectPointer>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
