//! Ownership ledger: the set of allocations an entry releases together.
//!
//! A stored value frequently owns other heap objects. Rather than teaching the
//! value type how to free itself, the caller hands the store an [`OwnedSet`]
//! alongside the value at insert time. The store drops the whole set and then
//! the value when the entry is removed or the store is destroyed. Transfer is
//! one-directional and total: nothing is reference counted.

use core::any::Any;
use core::fmt;

/// Ordered collection of exclusively owned boxes, released as one unit.
#[derive(Default)]
pub struct OwnedSet {
    resources: Vec<Box<dyn Any>>,
}

impl OwnedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Box `resource` and append it.
    pub fn owning<T: Any>(mut self, resource: T) -> Self {
        self.push(Box::new(resource));
        self
    }

    /// Append an allocation the caller already boxed.
    pub fn owning_boxed(mut self, resource: Box<dyn Any>) -> Self {
        self.push(resource);
        self
    }

    pub fn push(&mut self, resource: Box<dyn Any>) {
        self.resources.push(resource);
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Borrow the `index`-th resource if it has type `T`.
    pub fn get<T: Any>(&self, index: usize) -> Option<&T> {
        self.resources.get(index)?.downcast_ref::<T>()
    }

    pub fn get_mut<T: Any>(&mut self, index: usize) -> Option<&mut T> {
        self.resources.get_mut(index)?.downcast_mut::<T>()
    }

    /// Drop every resource in insertion order; returns how many were released.
    pub fn release(self) -> usize {
        let n = self.resources.len();
        for resource in self.resources {
            drop(resource);
        }
        n
    }
}

impl fmt::Debug for OwnedSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedSet")
            .field("len", &self.resources.len())
            .finish()
    }
}

impl<T: Any> FromIterator<Box<T>> for OwnedSet {
    fn from_iter<I: IntoIterator<Item = Box<T>>>(iter: I) -> Self {
        Self {
            resources: iter.into_iter().map(|b| b as Box<dyn Any>).collect(),
        }
    }
}

/// Outcome written to an [`InsertOptions`] result sink.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InsertStatus {
    #[default]
    Pending,
    Success,
    Failure,
}

/// Per-insert options: auxiliaries the entry will own and an optional cell
/// that receives the outcome.
#[derive(Debug, Default)]
pub struct InsertOptions<'a> {
    pub owned: OwnedSet,
    pub result_sink: Option<&'a mut InsertStatus>,
}

impl<'a> InsertOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owning<T: Any>(mut self, resource: T) -> Self {
        self.owned.push(Box::new(resource));
        self
    }

    pub fn owning_boxed(mut self, resource: Box<dyn Any>) -> Self {
        self.owned.push(resource);
        self
    }

    /// Replace the auxiliary set wholesale.
    pub fn with_owned(mut self, owned: OwnedSet) -> Self {
        self.owned = owned;
        self
    }

    pub fn report_to(mut self, sink: &'a mut InsertStatus) -> Self {
        self.result_sink = Some(sink);
        self
    }

    pub(crate) fn into_parts(self) -> (OwnedSet, Option<&'a mut InsertStatus>) {
        (self.owned, self.result_sink)
    }
}
