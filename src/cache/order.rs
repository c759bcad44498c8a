//! Insertion Order Module
//!
//! Arena-backed doubly linked list holding cache entries oldest to newest.

// == Slot ==
/// Stable handle to a node in an [`InsertionOrder`].
///
/// A slot stays valid until the node is removed; afterwards it may be reused
/// by a later insertion.
pub type Slot = usize;

#[derive(Debug)]
struct Node<T> {
    item: T,
    prev: Option<Slot>,
    next: Option<Slot>,
}

// == Insertion Order ==
/// Tracks items in insertion order for FIFO eviction.
///
/// - Front = oldest insertion
/// - Back = newest insertion
///
/// Push and unlink are O(1). Freed slots are recycled through a free list.
#[derive(Debug)]
pub struct InsertionOrder<T> {
    nodes: Vec<Option<Node<T>>>,
    free: Vec<Slot>,
    head: Option<Slot>,
    tail: Option<Slot>,
    len: usize,
}

impl<T> Default for InsertionOrder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> InsertionOrder<T> {
    // == Constructor ==
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    // == Push Back ==
    /// Links `item` at the newest end and returns its slot.
    pub fn push_back(&mut self, item: T) -> Slot {
        let node = Node {
            item,
            prev: self.tail,
            next: None,
        };

        let slot = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                slot
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };

        match self.tail {
            Some(tail) => {
                if let Some(node) = self.nodes[tail].as_mut() {
                    node.next = Some(slot);
                }
            }
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
        self.len += 1;
        slot
    }

    // == Remove ==
    /// Unlinks the node at `slot` and returns its item.
    ///
    /// Returns None if the slot is not occupied.
    pub fn remove(&mut self, slot: Slot) -> Option<T> {
        let node = self.nodes.get_mut(slot)?.take()?;

        match node.prev {
            Some(prev) => {
                if let Some(p) = self.nodes[prev].as_mut() {
                    p.next = node.next;
                }
            }
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => {
                if let Some(n) = self.nodes[next].as_mut() {
                    n.prev = node.prev;
                }
            }
            None => self.tail = node.prev,
        }

        self.free.push(slot);
        self.len -= 1;
        Some(node.item)
    }

    /// Slot of the oldest item.
    pub fn front(&self) -> Option<Slot> {
        self.head
    }

    /// Slot following `slot` towards the newest end.
    pub fn next(&self, slot: Slot) -> Option<Slot> {
        self.nodes.get(slot)?.as_ref()?.next
    }

    pub fn get(&self, slot: Slot) -> Option<&T> {
        self.nodes.get(slot)?.as_ref().map(|node| &node.item)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterates items oldest to newest.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            order: self,
            cursor: self.head,
        }
    }
}

// == Iterator ==
pub struct Iter<'a, T> {
    order: &'a InsertionOrder<T>,
    cursor: Option<Slot>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.cursor?;
        let node = self.order.nodes.get(slot)?.as_ref()?;
        self.cursor = node.next;
        Some(&node.item)
    }
}
