//! Index-arena doubly linked list used for recency ordering.
//!
//! Nodes live in a `Vec` and link to each other by index, with two sentinel
//! nodes at fixed slots so that no operation has to special-case the ends:
//!
//! ```text
//!     slot:   0        4        2        7        1
//!           [HEAD] ⇄ [ mru ] ⇄ [ ... ] ⇄ [ lru ] ⇄ [TAIL]
//!
//!     free list: [3, 5, 6]   (slots of removed nodes, reused first)
//! ```
//!
//! Every operation is O(1). Slot indices stay valid until the node is
//! removed, so the owner can keep them in a hash map.

/// Most-recently-used end.
const HEAD: usize = 0;
/// Least-recently-used end.
const TAIL: usize = 1;
const NIL: usize = usize::MAX;

struct Node<T> {
    /// `None` for the sentinels and for free slots.
    item: Option<T>,
    prev: usize,
    next: usize,
}

impl<T> Node<T> {
    const fn sentinel(prev: usize, next: usize) -> Self {
        Self {
            item: None,
            prev,
            next,
        }
    }
}

pub(crate) struct RecencyList<T> {
    nodes: Vec<Node<T>>,
    free: Vec<usize>,
    len: usize,
}

impl<T> RecencyList<T> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        let mut nodes = Vec::with_capacity(capacity.saturating_add(2));
        nodes.push(Node::sentinel(NIL, TAIL));
        nodes.push(Node::sentinel(HEAD, NIL));
        Self {
            nodes,
            free: Vec::new(),
            len: 0,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Inserts at the most-recently-used end and returns the slot.
    pub(crate) fn push_front(&mut self, item: T) -> usize {
        let idx = match self.free.pop() {
            Some(idx) => {
                self.nodes[idx].item = Some(item);
                idx
            }
            None => {
                self.nodes.push(Node {
                    item: Some(item),
                    prev: NIL,
                    next: NIL,
                });
                self.nodes.len() - 1
            }
        };
        self.link_after_head(idx);
        self.len += 1;
        idx
    }

    /// Marks `idx` most recently used.
    pub(crate) fn move_to_front(&mut self, idx: usize) {
        if self.nodes[HEAD].next == idx {
            return;
        }
        self.unlink(idx);
        self.link_after_head(idx);
    }

    /// Removes and returns the least-recently-used item.
    pub(crate) fn pop_back(&mut self) -> Option<T> {
        let idx = self.nodes[TAIL].prev;
        if idx == HEAD {
            return None;
        }
        self.remove(idx)
    }

    /// Removes the item in slot `idx`.
    pub(crate) fn remove(&mut self, idx: usize) -> Option<T> {
        let item = self.nodes.get_mut(idx)?.item.take()?;
        self.unlink(idx);
        self.free.push(idx);
        self.len -= 1;
        Some(item)
    }

    #[inline]
    pub(crate) fn get(&self, idx: usize) -> Option<&T> {
        self.nodes.get(idx)?.item.as_ref()
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, idx: usize) -> Option<&mut T> {
        self.nodes.get_mut(idx)?.item.as_mut()
    }

    /// Iterates from most to least recently used.
    pub(crate) fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.nodes[HEAD].next,
        }
    }

    fn link_after_head(&mut self, idx: usize) {
        let old_first = self.nodes[HEAD].next;
        self.nodes[idx].prev = HEAD;
        self.nodes[idx].next = old_first;
        self.nodes[HEAD].next = idx;
        self.nodes[old_first].prev = idx;
    }

    fn unlink(&mut self, idx: usize) {
        let prev = self.nodes[idx].prev;
        let next = self.nodes[idx].next;
        self.nodes[prev].next = next;
        self.nodes[next].prev = prev;
        self.nodes[idx].prev = NIL;
        self.nodes[idx].next = NIL;
    }

    /// Walks the list both ways and checks links and length agree.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) -> Result<(), String> {
        let mut forward = 0;
        let mut prev = HEAD;
        let mut cur = self.nodes[HEAD].next;
        while cur != TAIL {
            if self.nodes[cur].prev != prev {
                return Err(format!("slot {} has prev {} expected {}", cur, self.nodes[cur].prev, prev));
            }
            if self.nodes[cur].item.is_none() {
                return Err(format!("linked slot {} is empty", cur));
            }
            forward += 1;
            if forward > self.len {
                return Err("cycle detected".into());
            }
            prev = cur;
            cur = self.nodes[cur].next;
        }
        if self.nodes[TAIL].prev != prev {
            return Err("tail does not point at last node".into());
        }
        if forward != self.len {
            return Err(format!("walked {} nodes but len is {}", forward, self.len));
        }
        if self.nodes.len() - 2 != self.len + self.free.len() {
            return Err("slots leaked".into());
        }
        Ok(())
    }
}

pub(crate) struct Iter<'a, T> {
    list: &'a RecencyList<T>,
    cursor: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        if self.cursor == TAIL {
            return None;
        }
        let node = &self.list.nodes[self.cursor];
        self.cursor = node.next;
        node.item.as_ref()
    }
}
