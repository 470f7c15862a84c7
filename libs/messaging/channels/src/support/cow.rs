use parking_lot::RwLock;
use std::sync::Arc;

/// List whose readers take a point-in-time snapshot.
///
/// Writers copy the backing vector and swap it in, so iterating a snapshot
/// never holds a lock and never observes a concurrent mutation.
#[derive(Debug)]
pub(crate) struct CopyOnWriteList<T> {
    inner: RwLock<Arc<Vec<T>>>,
}

impl<T: Clone> CopyOnWriteList<T> {
    pub(crate) fn new() -> Self {
        Self {
            inner: RwLock::new(Arc::new(Vec::new())),
        }
    }

    pub(crate) fn snapshot(&self) -> Arc<Vec<T>> {
        Arc::clone(&self.inner.read())
    }

    pub(crate) fn push(&self, item: T) {
        let mut guard = self.inner.write();
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push(item);
        *guard = Arc::new(next);
    }

    /// Append unless an element considered equal by `same` is present
    pub(crate) fn push_if_absent(&self, item: T, same: impl Fn(&T, &T) -> bool) -> bool {
        let mut guard = self.inner.write();
        if guard.iter().any(|existing| same(existing, &item)) {
            return false;
        }
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push(item);
        *guard = Arc::new(next);
        true
    }

    /// Remove every element matching `predicate`, returning how many were removed
    pub(crate) fn remove_where(&self, predicate: impl Fn(&T) -> bool) -> usize {
        let mut guard = self.inner.write();
        let next: Vec<T> = guard.iter().filter(|item| !predicate(item)).cloned().collect();
        let removed = guard.len() - next.len();
        if removed > 0 {
            *guard = Arc::new(next);
        }
        removed
    }

    pub(crate) fn replace(&self, items: Vec<T>) {
        *self.inner.write() = Arc::new(items);
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.read().len()
    }
}

impl<T: Clone> Default for CopyOnWriteList<T> {
    fn default() -> Self {
        Self::new()
    }
}
