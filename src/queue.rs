//! Binary heap ordered by a caller-supplied priority predicate

use std::fmt;

/// Max-heap over `T` where `is_higher_priority(a, b)` decides whether `a`
/// should come out before `b`.
///
/// Equal-priority items come out in no particular order; any tie-breaking
/// belongs in the predicate.
pub struct PriorityQueue<T, F>
where
    F: Fn(&T, &T) -> bool,
{
    heap: Vec<T>,
    is_higher_priority: F,
}

impl<T, F> PriorityQueue<T, F>
where
    F: Fn(&T, &T) -> bool,
{
    pub fn new(is_higher_priority: F) -> Self {
        Self {
            heap: Vec::new(),
            is_higher_priority,
        }
    }

    pub fn with_capacity(capacity: usize, is_higher_priority: F) -> Self {
        Self {
            heap: Vec::with_capacity(capacity),
            is_higher_priority,
        }
    }

    pub fn push(&mut self, item: T) {
        self.heap.push(item);
        self.sift_up(self.heap.len() - 1);
    }

    /// Remove and return the highest-priority item, `None` when empty
    pub fn pop(&mut self) -> Option<T> {
        if self.heap.is_empty() {
            return None;
        }
        let last = self.heap.len() - 1;
        self.heap.swap(0, last);
        let top = self.heap.pop();
        if !self.heap.is_empty() {
            self.sift_down(0);
        }
        top
    }

    pub fn peek(&self) -> Option<&T> {
        self.heap.first()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if !(self.is_higher_priority)(&self.heap[index], &self.heap[parent]) {
                break;
            }
            self.heap.swap(index, parent);
            index = parent;
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * index + 1;
            let right = left + 1;
            let mut best = index;

            if left < len && (self.is_higher_priority)(&self.heap[left], &self.heap[best]) {
                best = left;
            }
            if right < len && (self.is_higher_priority)(&self.heap[right], &self.heap[best]) {
                best = right;
            }
            if best == index {
                break;
            }
            self.heap.swap(index, best);
            index = best;
        }
    }
}

impl<T: fmt::Debug, F> fmt::Debug for PriorityQueue<T, F>
where
    F: Fn(&T, &T) -> bool,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorityQueue")
            .field("len", &self.heap.len())
            .field("top", &self.heap.first())
            .finish()
    }
}
