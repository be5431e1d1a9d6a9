//! Doubly linked list over an arena of node slots
//!
//! Nodes live in a `Vec` and link to each other by index. Slot 0 is the
//! sentinel: its `next` is the head and its `prev` is the tail, so inserting
//! at either end or next to an existing node needs no special cases.
//!
//! Slots released by `remove` are pushed onto a private vacant stack and
//! reused by the next insertion. Every slot carries a generation that is
//! bumped when the slot is released; a [`NodeHandle`] remembers the
//! generation it was issued with, so a handle to a removed node never
//! resolves to whatever now occupies the slot.
//!
//! Like the free list, the list has no internal locking.

use std::fmt;

const SENTINEL: usize = 0;

/// Handle to a node of a [`LinkedList`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    index: usize,
    generation: u64,
}

struct Node<T> {
    item: Option<T>,
    prev: usize,
    next: usize,
    generation: u64,
}

/// Sentinel-headed doubly linked list
pub struct LinkedList<T> {
    nodes: Vec<Node<T>>,
    vacant: Vec<usize>,
    len: usize,
}

impl<T> LinkedList<T> {
    /// Create an empty list
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                item: None,
                prev: SENTINEL,
                next: SENTINEL,
                generation: 0,
            }],
            vacant: Vec::new(),
            len: 0,
        }
    }

    /// Number of items in the list
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the list is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert an item at the head
    pub fn add_head(&mut self, item: T) -> NodeHandle {
        let next = self.nodes[SENTINEL].next;
        self.insert_between(item, SENTINEL, next)
    }

    /// Insert an item at the tail
    pub fn add_tail(&mut self, item: T) -> NodeHandle {
        let prev = self.nodes[SENTINEL].prev;
        self.insert_between(item, prev, SENTINEL)
    }

    /// Insert an item right after `node`
    ///
    /// Hands the item back if `node` no longer exists.
    pub fn add_after(&mut self, item: T, node: NodeHandle) -> Result<NodeHandle, T> {
        if !self.is_live(node) {
            return Err(item);
        }
        let next = self.nodes[node.index].next;
        Ok(self.insert_between(item, node.index, next))
    }

    /// Insert an item right before `node`
    ///
    /// Hands the item back if `node` no longer exists.
    pub fn add_before(&mut self, item: T, node: NodeHandle) -> Result<NodeHandle, T> {
        if !self.is_live(node) {
            return Err(item);
        }
        let prev = self.nodes[node.index].prev;
        Ok(self.insert_between(item, prev, node.index))
    }

    /// Unlink a node and return its item
    pub fn remove(&mut self, node: NodeHandle) -> Option<T> {
        if !self.is_live(node) {
            return None;
        }
        Some(self.unlink(node.index))
    }

    /// Unlink a node and drop its item, returning whether the node existed
    pub fn delete(&mut self, node: NodeHandle) -> bool {
        self.remove(node).is_some()
    }

    /// Unlink the head node and return its item
    pub fn pop_head(&mut self) -> Option<T> {
        let head = self.head()?;
        self.remove(head)
    }

    /// Handle of the first node
    pub fn head(&self) -> Option<NodeHandle> {
        self.handle_at(self.nodes[SENTINEL].next)
    }

    /// Handle of the last node
    pub fn tail(&self) -> Option<NodeHandle> {
        self.handle_at(self.nodes[SENTINEL].prev)
    }

    /// Handle of the node after `node`
    pub fn next(&self, node: NodeHandle) -> Option<NodeHandle> {
        if !self.is_live(node) {
            return None;
        }
        self.handle_at(self.nodes[node.index].next)
    }

    /// Handle of the node before `node`
    pub fn prev(&self, node: NodeHandle) -> Option<NodeHandle> {
        if !self.is_live(node) {
            return None;
        }
        self.handle_at(self.nodes[node.index].prev)
    }

    /// Borrow the item stored at `node`
    pub fn get(&self, node: NodeHandle) -> Option<&T> {
        if !self.is_live(node) {
            return None;
        }
        self.nodes[node.index].item.as_ref()
    }

    /// Mutably borrow the item stored at `node`
    pub fn get_mut(&mut self, node: NodeHandle) -> Option<&mut T> {
        if !self.is_live(node) {
            return None;
        }
        self.nodes[node.index].item.as_mut()
    }

    /// Borrow the first item
    pub fn front(&self) -> Option<&T> {
        self.head().and_then(|h| self.get(h))
    }

    /// Mutably borrow the first item
    pub fn front_mut(&mut self) -> Option<&mut T> {
        let head = self.head()?;
        self.get_mut(head)
    }

    /// Find the first node, starting at `start` (inclusive) or at the head,
    /// whose item matches `predicate`
    pub fn find<P>(&self, start: Option<NodeHandle>, mut predicate: P) -> Option<NodeHandle>
    where
        P: FnMut(&T) -> bool,
    {
        let mut cursor = match start {
            Some(node) if self.is_live(node) => Some(node),
            Some(_) => None,
            None => self.head(),
        };

        while let Some(node) = cursor {
            if let Some(item) = self.get(node) {
                if predicate(item) {
                    return Some(node);
                }
            }
            cursor = self.next(node);
        }

        None
    }

    /// Find the first node holding an item equal to `item`
    pub fn find_item(&self, item: &T) -> Option<NodeHandle>
    where
        T: PartialEq,
    {
        self.find(None, |candidate| candidate == item)
    }

    /// Iterate over the items from head to tail
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.nodes[SENTINEL].next,
            remaining: self.len,
        }
    }

    /// Remove every item, returning them in list order
    pub fn drain(&mut self) -> Vec<T> {
        let mut items = Vec::with_capacity(self.len);
        while let Some(item) = self.pop_head() {
            items.push(item);
        }
        items
    }

    /// Remove and drop every item
    pub fn clear(&mut self) {
        self.drain();
    }

    fn is_live(&self, node: NodeHandle) -> bool {
        node.index != SENTINEL
            && self
                .nodes
                .get(node.index)
                .map(|slot| slot.generation == node.generation && slot.item.is_some())
                .unwrap_or(false)
    }

    fn handle_at(&self, index: usize) -> Option<NodeHandle> {
        if index == SENTINEL {
            return None;
        }
        Some(NodeHandle {
            index,
            generation: self.nodes[index].generation,
        })
    }

    fn insert_between(&mut self, item: T, prev: usize, next: usize) -> NodeHandle {
        let index = match self.vacant.pop() {
            Some(index) => {
                let slot = &mut self.nodes[index];
                slot.item = Some(item);
                slot.prev = prev;
                slot.next = next;
                index
            }
            None => {
                self.nodes.push(Node {
                    item: Some(item),
                    prev,
                    next,
                    generation: 0,
                });
                self.nodes.len() - 1
            }
        };

        self.nodes[prev].next = index;
        self.nodes[next].prev = index;
        self.len += 1;

        NodeHandle {
            index,
            generation: self.nodes[index].generation,
        }
    }

    fn unlink(&mut self, index: usize) -> T {
        let (prev, next) = (self.nodes[index].prev, self.nodes[index].next);
        self.nodes[prev].next = next;
        self.nodes[next].prev = prev;

        let slot = &mut self.nodes[index];
        slot.generation = slot.generation.wrapping_add(1);
        let item = match slot.item.take() {
            Some(item) => item,
            None => unreachable!("linked node without item"),
        };

        self.vacant.push(index);
        self.len -= 1;
        item
    }
}

impl<T> Default for LinkedList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for LinkedList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T> FromIterator<T> for LinkedList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut list = LinkedList::new();
        for item in iter {
            list.add_tail(item);
        }
        list
    }
}

impl<'a, T> IntoIterator for &'a LinkedList<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Borrowing iterator over a [`LinkedList`]
pub struct Iter<'a, T> {
    list: &'a LinkedList<T>,
    cursor: usize,
    remaining: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == SENTINEL {
            return None;
        }
        let node = &self.list.nodes[self.cursor];
        self.cursor = node.next;
        self.remaining = self.remaining.saturating_sub(1);
        node.item.as_ref()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}
