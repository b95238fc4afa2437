//! Doubly-linked sequence container with O(1) splicing by handle.
//!
//! Nodes live in a slot arena owned by the list. `prev`/`next` links are slot
//! indices, so the list is the only owner of every value and no link can
//! outlive the node it points at. Removed slots go on a free list and are
//! reused by later insertions.
//!
//! Insertions hand back a [`NodeRef`], a small `Copy` handle carrying the id of
//! the issuing list, the slot index and the slot generation. Every operation
//! that accepts a handle checks it first:
//!
//! - a handle issued by another list (or by this list before [`clear`]) fails
//!   with [`PatternError::ForeignNode`];
//! - a handle whose node was already removed fails with
//!   [`PatternError::StaleNode`].
//!
//! A rejected call never modifies the list.
//!
//! [`clear`]: DoublyLinkedList::clear

use std::fmt;
use std::iter::FusedIterator;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{PatternError, Result};

static NEXT_LIST_ID: AtomicU64 = AtomicU64::new(1);

fn next_list_id() -> u64 {
    NEXT_LIST_ID.fetch_add(1, Ordering::Relaxed)
}

// ============================================================
// HANDLES AND NODES
// ============================================================

/// Handle to a node of a specific [`DoublyLinkedList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    list: u64,
    slot: u32,
    generation: u32,
}

#[derive(Debug, Clone)]
struct Node<T> {
    value: T,
    prev: Option<u32>,
    next: Option<u32>,
}

#[derive(Debug, Clone)]
enum Slot<T> {
    Occupied { generation: u32, node: Node<T> },
    Vacant { generation: u32, next_free: Option<u32> },
}

impl<T> Slot<T> {
    #[inline]
    fn generation(&self) -> u32 {
        match self {
            Slot::Occupied { generation, .. } | Slot::Vacant { generation, .. } => *generation,
        }
    }

    #[inline]
    fn next_free(&self) -> Option<u32> {
        match self {
            Slot::Vacant { next_free, .. } => *next_free,
            Slot::Occupied { .. } => None,
        }
    }
}

// ============================================================
// LIST
// ============================================================

/// Doubly-linked list of `T` with handle-based O(1) insertion and removal.
pub struct DoublyLinkedList<T> {
    id: u64,
    slots: Vec<Slot<T>>,
    free_head: Option<u32>,
    head: Option<u32>,
    tail: Option<u32>,
    len: usize,
}

impl<T> DoublyLinkedList<T> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty list with room for `capacity` nodes before reallocating.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            id: next_list_id(),
            slots: Vec::with_capacity(capacity),
            free_head: None,
            head: None,
            tail: None,
            len: 0,
        }
    }

    /// Number of live nodes. O(1).
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    // ===========================================
    // Insertion
    // ===========================================

    /// Adds `value` after the current tail and returns its handle.
    pub fn append(&mut self, value: T) -> NodeRef {
        let old_tail = self.tail;
        let node = self.allocate(Node {
            value,
            prev: old_tail,
            next: None,
        });

        match old_tail {
            Some(tail) => self.set_next(tail, Some(node.slot)),
            None => self.head = Some(node.slot),
        }
        self.tail = Some(node.slot);
        node
    }

    /// Adds `value` before the current head and returns its handle.
    pub fn appendleft(&mut self, value: T) -> NodeRef {
        let old_head = self.head;
        let node = self.allocate(Node {
            value,
            prev: None,
            next: old_head,
        });

        match old_head {
            Some(head) => self.set_prev(head, Some(node.slot)),
            None => self.tail = Some(node.slot),
        }
        self.head = Some(node.slot);
        node
    }

    /// Appends `value` and, once the list holds more than `capacity` values,
    /// evicts the oldest one.
    ///
    /// At most one value is evicted per call. With `capacity == 0` the value
    /// just appended is evicted again and the returned handle is already stale.
    pub fn append_bounded(&mut self, value: T, capacity: usize) -> (NodeRef, Option<T>) {
        let node = self.append(value);
        let evicted = if self.len > capacity {
            self.popleft().ok()
        } else {
            None
        };
        (node, evicted)
    }

    /// Splices `value` directly after `node`.
    pub fn insert_after(&mut self, node: NodeRef, value: T) -> Result<NodeRef> {
        let anchor = self.resolve(node)?;
        let next = self.node(anchor).and_then(|n| n.next);
        let inserted = self.allocate(Node {
            value,
            prev: Some(anchor),
            next,
        });

        match next {
            Some(next) => self.set_prev(next, Some(inserted.slot)),
            None => self.tail = Some(inserted.slot),
        }
        self.set_next(anchor, Some(inserted.slot));
        Ok(inserted)
    }

    /// Splices `value` directly before `node`.
    pub fn insert_before(&mut self, node: NodeRef, value: T) -> Result<NodeRef> {
        let anchor = self.resolve(node)?;
        let prev = self.node(anchor).and_then(|n| n.prev);
        let inserted = self.allocate(Node {
            value,
            prev,
            next: Some(anchor),
        });

        match prev {
            Some(prev) => self.set_next(prev, Some(inserted.slot)),
            None => self.head = Some(inserted.slot),
        }
        self.set_prev(anchor, Some(inserted.slot));
        Ok(inserted)
    }

    // ===========================================
    // Removal
    // ===========================================

    /// Removes and returns the tail value.
    pub fn pop(&mut self) -> Result<T> {
        let tail = self.tail.ok_or(PatternError::EmptyContainer { op: "pop" })?;
        self.unlink(tail)
            .ok_or(PatternError::EmptyContainer { op: "pop" })
    }

    /// Removes and returns the head value.
    pub fn popleft(&mut self) -> Result<T> {
        let head = self.head.ok_or(PatternError::EmptyContainer { op: "popleft" })?;
        self.unlink(head)
            .ok_or(PatternError::EmptyContainer { op: "popleft" })
    }

    /// Unlinks `node`, re-linking its neighbours, and returns its value.
    pub fn remove_node(&mut self, node: NodeRef) -> Result<T> {
        let slot = self.resolve(node)?;
        self.unlink(slot).ok_or(PatternError::StaleNode)
    }

    /// Drops every value and returns the list to the empty state.
    ///
    /// Handles issued before the call are foreign afterwards.
    pub fn clear(&mut self) {
        self.id = next_list_id();
        self.slots.clear();
        self.free_head = None;
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    // ===========================================
    // Access and navigation
    // ===========================================

    pub fn front(&self) -> Option<&T> {
        self.head.and_then(|i| self.node(i)).map(|n| &n.value)
    }

    pub fn back(&self) -> Option<&T> {
        self.tail.and_then(|i| self.node(i)).map(|n| &n.value)
    }

    pub fn front_node(&self) -> Option<NodeRef> {
        self.head.and_then(|i| self.handle_at(i))
    }

    pub fn back_node(&self) -> Option<NodeRef> {
        self.tail.and_then(|i| self.handle_at(i))
    }

    /// Handle of the node following `node`, or `None` at the tail or for an
    /// invalid handle.
    pub fn next_node(&self, node: NodeRef) -> Option<NodeRef> {
        let slot = self.resolve(node).ok()?;
        self.node(slot)?.next.and_then(|i| self.handle_at(i))
    }

    /// Handle of the node preceding `node`, or `None` at the head or for an
    /// invalid handle.
    pub fn prev_node(&self, node: NodeRef) -> Option<NodeRef> {
        let slot = self.resolve(node).ok()?;
        self.node(slot)?.prev.and_then(|i| self.handle_at(i))
    }

    pub fn get(&self, node: NodeRef) -> Option<&T> {
        let slot = self.resolve(node).ok()?;
        self.node(slot).map(|n| &n.value)
    }

    pub fn get_mut(&mut self, node: NodeRef) -> Option<&mut T> {
        let slot = self.resolve(node).ok()?;
        self.node_mut(slot).map(|n| &mut n.value)
    }

    /// Returns true if `node` is a live node of this list.
    pub fn contains(&self, node: NodeRef) -> bool {
        self.resolve(node).is_ok()
    }

    // ===========================================
    // Traversal
    // ===========================================

    /// Head-to-tail traversal. Reverse it for tail-to-head.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            front: self.head,
            back: self.tail,
            remaining: self.len,
        }
    }

    /// Tail-to-head traversal.
    pub fn iter_rev(&self) -> std::iter::Rev<Iter<'_, T>> {
        self.iter().rev()
    }

    // ===========================================
    // Internal helpers
    // ===========================================

    fn handle_at(&self, slot: u32) -> Option<NodeRef> {
        match self.slots.get(slot as usize)? {
            Slot::Occupied { generation, .. } => Some(NodeRef {
                list: self.id,
                slot,
                generation: *generation,
            }),
            Slot::Vacant { .. } => None,
        }
    }

    fn resolve(&self, node: NodeRef) -> Result<u32> {
        if node.list != self.id {
            return Err(PatternError::ForeignNode);
        }
        match self.slots.get(node.slot as usize) {
            Some(Slot::Occupied { generation, .. }) if *generation == node.generation => {
                Ok(node.slot)
            }
            _ => Err(PatternError::StaleNode),
        }
    }

    #[inline]
    fn node(&self, slot: u32) -> Option<&Node<T>> {
        match self.slots.get(slot as usize)? {
            Slot::Occupied { node, .. } => Some(node),
            Slot::Vacant { .. } => None,
        }
    }

    #[inline]
    fn node_mut(&mut self, slot: u32) -> Option<&mut Node<T>> {
        match self.slots.get_mut(slot as usize)? {
            Slot::Occupied { node, .. } => Some(node),
            Slot::Vacant { .. } => None,
        }
    }

    #[inline]
    fn set_next(&mut self, slot: u32, next: Option<u32>) {
        if let Some(node) = self.node_mut(slot) {
            node.next = next;
        }
    }

    #[inline]
    fn set_prev(&mut self, slot: u32, prev: Option<u32>) {
        if let Some(node) = self.node_mut(slot) {
            node.prev = prev;
        }
    }

    fn allocate(&mut self, node: Node<T>) -> NodeRef {
        let slot = match self.free_head {
            Some(slot) => {
                let entry = &mut self.slots[slot as usize];
                debug_assert!(matches!(entry, Slot::Vacant { .. }), "free slot is occupied");
                self.free_head = entry.next_free();
                let generation = entry.generation();
                *entry = Slot::Occupied { generation, node };
                slot
            }
            None => {
                let slot = u32::try_from(self.slots.len())
                    .unwrap_or_else(|_| panic!("DoublyLinkedList capacity overflow"));
                self.slots.push(Slot::Occupied {
                    generation: 0,
                    node,
                });
                slot
            }
        };

        self.len += 1;
        NodeRef {
            list: self.id,
            slot,
            generation: self.slots[slot as usize].generation(),
        }
    }

    /// Detaches the node in `slot` from its neighbours and frees the slot.
    fn unlink(&mut self, slot: u32) -> Option<T> {
        let (prev, next) = self.node(slot).map(|n| (n.prev, n.next))?;

        match prev {
            Some(prev) => self.set_next(prev, next),
            None => self.head = next,
        }
        match next {
            Some(next) => self.set_prev(next, prev),
            None => self.tail = prev,
        }

        // Slots with an exhausted generation are retired instead of reused.
        let entry = &mut self.slots[slot as usize];
        let (generation, reusable) = match entry.generation().checked_add(1) {
            Some(generation) => (generation, true),
            None => (u32::MAX, false),
        };
        let vacant = Slot::Vacant {
            generation,
            next_free: if reusable { self.free_head } else { None },
        };
        let removed = std::mem::replace(entry, vacant);
        if reusable {
            self.free_head = Some(slot);
        }
        self.len -= 1;

        match removed {
            Slot::Occupied { node, .. } => Some(node.value),
            Slot::Vacant { .. } => None,
        }
    }
}

impl<T> Default for DoublyLinkedList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Clone for DoublyLinkedList<T> {
    /// The clone gets its own list id: handles issued by `self` are foreign to it.
    fn clone(&self) -> Self {
        Self {
            id: next_list_id(),
            slots: self.slots.clone(),
            free_head: self.free_head,
            head: self.head,
            tail: self.tail,
            len: self.len,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for DoublyLinkedList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: PartialEq> PartialEq for DoublyLinkedList<T> {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl<T: Eq> Eq for DoublyLinkedList<T> {}

impl<T> FromIterator<T> for DoublyLinkedList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut list = Self::new();
        list.extend(iter);
        list
    }
}

impl<T> Extend<T> for DoublyLinkedList<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.append(value);
        }
    }
}

// ============================================================
// ITERATORS
// ============================================================

/// Borrowing traversal over a [`DoublyLinkedList`].
///
/// Bounded by the length at creation time; both ends can be consumed.
pub struct Iter<'a, T> {
    list: &'a DoublyLinkedList<T>,
    front: Option<u32>,
    back: Option<u32>,
    remaining: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let node = self.list.node(self.front?)?;
        self.front = node.next;
        self.remaining -= 1;
        Some(&node.value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> DoubleEndedIterator for Iter<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let node = self.list.node(self.back?)?;
        self.back = node.prev;
        self.remaining -= 1;
        Some(&node.value)
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

impl<T> FusedIterator for Iter<'_, T> {}

impl<T> Clone for Iter<'_, T> {
    fn clone(&self) -> Self {
        Self {
            list: self.list,
            front: self.front,
            back: self.back,
            remaining: self.remaining,
        }
    }
}

impl<'a, T> IntoIterator for &'a DoublyLinkedList<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Owning traversal, draining the list from either end.
pub struct IntoIter<T> {
    list: DoublyLinkedList<T>,
}

impl<T> Iterator for IntoIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.list.popleft().ok()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.list.len, Some(self.list.len))
    }
}

impl<T> DoubleEndedIterator for IntoIter<T> {
    fn next_back(&mut self) -> Option<T> {
        self.list.pop().ok()
    }
}

impl<T> ExactSizeIterator for IntoIter<T> {}

impl<T> IntoIterator for DoublyLinkedList<T> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter { list: self }
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn forward<T: Clone>(list: &DoublyLinkedList<T>) -> Vec<T> {
        list.iter().cloned().collect()
    }

    fn backward<T: Clone>(list: &DoublyLinkedList<T>) -> Vec<T> {
        list.iter_rev().cloned().collect()
    }

    #[test]
    fn test_append_pop_sequence() {
        let mut list = DoublyLinkedList::new();
        list.append(1);
        list.append(2);
        list.appendleft(0);
        assert_eq!(forward(&list), vec![0, 1, 2]);

        assert_eq!(list.pop().unwrap(), 2);
        assert_eq!(forward(&list), vec![0, 1]);

        assert_eq!(list.popleft().unwrap(), 0);
        assert_eq!(forward(&list), vec![1]);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_pop_empty() {
        let mut list: DoublyLinkedList<i32> = DoublyLinkedList::new();
        assert!(matches!(
            list.pop(),
            Err(PatternError::EmptyContainer { op: "pop" })
        ));
        assert!(matches!(
            list.popleft(),
            Err(PatternError::EmptyContainer { op: "popleft" })
        ));

        list.append(7);
        assert_eq!(list.pop().unwrap(), 7);
        assert!(list.is_empty());
    }

    #[test]
    fn test_insert_after_then_remove_restores() {
        let mut list: DoublyLinkedList<i32> = (1..=4).collect();
        let before = forward(&list);
        let anchor = list.front_node().unwrap();
        let second = list.next_node(anchor).unwrap();

        let inserted = list.insert_after(second, 99).unwrap();
        assert_eq!(forward(&list), vec![1, 2, 99, 3, 4]);

        assert_eq!(list.remove_node(inserted).unwrap(), 99);
        assert_eq!(forward(&list), before);
        assert_eq!(backward(&list), vec![4, 3, 2, 1]);
    }

    #[test]
    fn test_insert_at_ends_updates_head_and_tail() {
        let mut list = DoublyLinkedList::new();
        let only = list.append("b");
        let head = list.insert_before(only, "a").unwrap();
        let tail = list.insert_after(only, "c").unwrap();

        assert_eq!(list.front_node(), Some(head));
        assert_eq!(list.back_node(), Some(tail));
        assert_eq!(forward(&list), vec!["a", "b", "c"]);
        assert_eq!(backward(&list), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_remove_ends() {
        let mut list = DoublyLinkedList::new();
        let a = list.append(1);
        list.append(2);
        let c = list.append(3);

        list.remove_node(a).unwrap();
        list.remove_node(c).unwrap();
        assert_eq!(forward(&list), vec![2]);
        assert_eq!(list.front(), Some(&2));
        assert_eq!(list.back(), Some(&2));
    }

    #[test]
    fn test_stale_handle_rejected() {
        let mut list = DoublyLinkedList::new();
        let a = list.append(1);
        list.append(2);
        list.remove_node(a).unwrap();

        assert!(matches!(list.remove_node(a), Err(PatternError::StaleNode)));
        assert!(matches!(
            list.insert_after(a, 5),
            Err(PatternError::StaleNode)
        ));
        assert_eq!(list.get(a), None);

        // Slot reuse must not revive the old handle.
        let reused = list.append(3);
        assert_ne!(reused, a);
        assert!(!list.contains(a));
        assert_eq!(forward(&list), vec![2, 3]);
    }

    #[test]
    fn test_foreign_handle_rejected() {
        let mut ours = DoublyLinkedList::new();
        let mut theirs = DoublyLinkedList::new();
        ours.append(1);
        let foreign = theirs.append(1);

        assert!(matches!(
            ours.remove_node(foreign),
            Err(PatternError::ForeignNode)
        ));
        assert!(matches!(
            ours.insert_before(foreign, 0),
            Err(PatternError::ForeignNode)
        ));
        assert_eq!(forward(&ours), vec![1]);
        assert_eq!(theirs.len(), 1);
    }

    #[test]
    fn test_clear() {
        let mut list: DoublyLinkedList<i32> = (0..10).collect();
        let old = list.front_node().unwrap();
        list.clear();

        assert_eq!(list.len(), 0);
        assert_eq!(list.iter().count(), 0);
        assert!(matches!(list.remove_node(old), Err(PatternError::ForeignNode)));

        list.append(42);
        assert_eq!(forward(&list), vec![42]);
    }

    #[test]
    fn test_append_bounded_evicts_oldest() {
        let mut window = DoublyLinkedList::new();
        let mut evicted = Vec::new();
        for i in 0..6 {
            let (_, out) = window.append_bounded(i, 3);
            evicted.extend(out);
        }
        assert_eq!(forward(&window), vec![3, 4, 5]);
        assert_eq!(evicted, vec![0, 1, 2]);
    }

    #[test]
    fn test_iterator_is_restartable_and_exact() {
        let list: DoublyLinkedList<i32> = (0..5).collect();
        let iter = list.iter();
        assert_eq!(iter.len(), 5);
        assert_eq!(list.iter().sum::<i32>(), 10);
        assert_eq!(list.iter().sum::<i32>(), 10);

        let mut both = list.iter();
        assert_eq!(both.next(), Some(&0));
        assert_eq!(both.next_back(), Some(&4));
        assert_eq!(both.collect::<Vec<_>>(), vec![&1, &2, &3]);
    }

    #[test]
    fn test_get_mut_and_navigation() {
        let mut list = DoublyLinkedList::new();
        let a = list.append(10);
        let b = list.append(20);
        *list.get_mut(b).unwrap() += 1;

        assert_eq!(list.get(b), Some(&21));
        assert_eq!(list.next_node(a), Some(b));
        assert_eq!(list.prev_node(b), Some(a));
        assert_eq!(list.prev_node(a), None);
        assert_eq!(list.next_node(b), None);
    }

    #[test]
    fn test_clone_is_independent() {
        let mut list: DoublyLinkedList<i32> = (0..3).collect();
        let handle = list.front_node().unwrap();
        let mut copy = list.clone();

        assert_eq!(copy, list);
        assert!(matches!(copy.remove_node(handle), Err(PatternError::ForeignNode)));
        copy.pop().unwrap();
        list.remove_node(handle).unwrap();
        assert_eq!(forward(&list), vec![1, 2]);
        assert_eq!(forward(&copy), vec![0, 1]);
    }

    #[test]
    fn test_into_iter_drains_both_ends() {
        let list: DoublyLinkedList<i32> = (0..4).collect();
        let mut drain = list.into_iter();
        assert_eq!(drain.next_back(), Some(3));
        assert_eq!(drain.collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_debug_format() {
        let list: DoublyLinkedList<i32> = (1..=3).collect();
        assert_eq!(format!("{list:?}"), "[1, 2, 3]");
    }

    #[test]
    fn test_exhausted_slot_is_retired() {
        let mut list = DoublyLinkedList::new();
        let first = list.append(0);
        list.remove_node(first).unwrap();
        if let Slot::Vacant { generation, .. } = &mut list.slots[0] {
            *generation = u32::MAX;
        }

        let last_use = list.append(1);
        assert_eq!(last_use.slot, 0);
        assert_eq!(list.remove_node(last_use).unwrap(), 1);

        let fresh = list.append(2);
        assert_ne!(fresh.slot, 0);
        assert!(matches!(list.remove_node(last_use), Err(PatternError::StaleNode)));
        assert!(matches!(list.insert_after(last_use, 3), Err(PatternError::StaleNode)));
        assert_eq!(forward(&list), vec![2]);
        assert_eq!(list.slots.len(), 2);
    }
}
