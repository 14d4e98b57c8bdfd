use super::Aio;
use crate::utils::{Key, Slab};

struct Node {
    aio: Aio,
    prev: Option<Key>,
    next: Option<Key>,
}

/// A FIFO of pending operations.
///
/// Nodes live in a [`Slab`] and are doubly linked through their keys, so
/// any entry can be unlinked in O(1) given the key returned by
/// [`append`](Self::append). Keys are generation-checked: once an entry
/// has been removed its key never matches again.
pub(crate) struct AioList {
    nodes: Slab<Node>,
    head: Option<Key>,
    tail: Option<Key>,
}

impl AioList {
    pub(crate) fn new() -> Self {
        Self {
            nodes: Slab::new(8),
            head: None,
            tail: None,
        }
    }

    /// Appends `aio` at the tail and returns its link.
    pub(crate) fn append(&mut self, aio: Aio) -> Key {
        let prev = self.tail;
        let key = self.nodes.insert(Node {
            aio,
            prev,
            next: None,
        });

        match prev.and_then(|p| self.nodes.get_mut(p)) {
            Some(node) => node.next = Some(key),
            None => self.head = Some(key),
        }
        self.tail = Some(key);

        key
    }

    /// The operation at the head of the queue.
    pub(crate) fn first(&self) -> Option<&Aio> {
        self.head
            .and_then(|key| self.nodes.get(key))
            .map(|node| &node.aio)
    }

    pub(crate) fn first_key(&self) -> Option<Key> {
        self.head
    }

    /// Unlinks the entry under `key`, if it is still linked.
    pub(crate) fn remove(&mut self, key: Key) -> Option<Aio> {
        let node = self.nodes.remove(key)?;

        match node.prev.and_then(|p| self.nodes.get_mut(p)) {
            Some(prev) => prev.next = node.next,
            None => self.head = node.next,
        }
        match node.next.and_then(|n| self.nodes.get_mut(n)) {
            Some(next) => next.prev = node.prev,
            None => self.tail = node.prev,
        }

        Some(node.aio)
    }

    /// Unlinks the entry under `key` only if it still holds `aio`.
    pub(crate) fn remove_if(&mut self, key: Key, aio: &Aio) -> Option<Aio> {
        match self.nodes.get(key) {
            Some(node) if Aio::ptr_eq(&node.aio, aio) => self.remove(key),
            _ => None,
        }
    }

    pub(crate) fn pop_front(&mut self) -> Option<Aio> {
        let head = self.head?;
        self.remove(head)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }
}
