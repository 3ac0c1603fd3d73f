use std::cmp::Ordering;
use std::mem;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

const MAX_HEIGHT: usize = 12;

struct Node<K, V> {
    key: K,
    value: V,
    /// One forward link per level this node participates in.
    forward: Vec<Option<usize>>,
    /// Base-level links spanned by each forward link. A link to the end of
    /// the list spans to the virtual position `len`.
    width: Vec<usize>,
}

/// An ordered map with O(log n) lookup by key and by position.
///
/// A skip list whose links carry widths, so the n-th smallest key is found
/// by the same descent as a key lookup. Nodes live in a slab indexed by
/// `usize`, which keeps the structure free of pointer juggling.
///
/// The level generator is an injected [`SmallRng`]; tests seed it to make
/// structural assertions reproducible.
pub struct IndexableSkipList<K, V> {
    nodes: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    head_forward: Vec<Option<usize>>,
    head_width: Vec<usize>,
    len: usize,
    override_existing: bool,
    rng: SmallRng,
}

impl<K: Ord, V> IndexableSkipList<K, V> {
    /// Creates an empty list.
    ///
    /// With `override_existing`, inserting an equal key replaces the value
    /// in place; without it, equal keys stack as duplicates.
    pub fn new(override_existing: bool) -> IndexableSkipList<K, V> {
        IndexableSkipList::with_rng(override_existing, SmallRng::from_entropy())
    }

    /// Creates an empty list with a caller-supplied level generator.
    pub fn with_rng(override_existing: bool, rng: SmallRng) -> IndexableSkipList<K, V> {
        IndexableSkipList {
            nodes: Vec::new(),
            free: Vec::new(),
            head_forward: vec![None],
            head_width: vec![1],
            len: 0,
            override_existing,
            rng,
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the list holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn height(&self) -> usize {
        self.head_forward.len()
    }

    fn node(&self, idx: usize) -> &Node<K, V> {
        self.nodes[idx].as_ref().expect("skip list slab slot is free")
    }

    fn node_mut(&mut self, idx: usize) -> &mut Node<K, V> {
        self.nodes[idx].as_mut().expect("skip list slab slot is free")
    }

    /// `None` stands for the head pseudo-node.
    fn forward(&self, at: Option<usize>, level: usize) -> Option<usize> {
        match at {
            None => self.head_forward[level],
            Some(idx) => self.node(idx).forward[level],
        }
    }

    fn width(&self, at: Option<usize>, level: usize) -> usize {
        match at {
            None => self.head_width[level],
            Some(idx) => self.node(idx).width[level],
        }
    }

    fn set_forward(&mut self, at: Option<usize>, level: usize, to: Option<usize>) {
        match at {
            None => self.head_forward[level] = to,
            Some(idx) => self.node_mut(idx).forward[level] = to,
        }
    }

    fn set_width(&mut self, at: Option<usize>, level: usize, width: usize) {
        match at {
            None => self.head_width[level] = width,
            Some(idx) => self.node_mut(idx).width[level] = width,
        }
    }

    /// Walks to the insertion point of `key`, recording per level the last
    /// node strictly before it and the number of base links crossed.
    fn path_to(&self, key: &K) -> (Vec<Option<usize>>, Vec<usize>) {
        let height = self.height();
        let mut update = vec![None; height];
        let mut rank = vec![0; height];
        let mut cur: Option<usize> = None;
        let mut crossed = 0;
        for level in (0..height).rev() {
            while let Some(next) = self.forward(cur, level) {
                if self.node(next).key < *key {
                    crossed += self.width(cur, level);
                    cur = Some(next);
                } else {
                    break;
                }
            }
            update[level] = cur;
            rank[level] = crossed;
        }
        (update, rank)
    }

    fn alloc(&mut self, node: Node<K, V>) -> usize {
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = Some(node);
                idx
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    /// Flips a fair coin per level, capped at one above the current height
    /// and at the maximum height.
    fn random_level(&mut self) -> usize {
        let cap = (self.height() + 1).min(MAX_HEIGHT);
        let mut level = 1;
        while level < cap && self.rng.gen::<bool>() {
            level += 1;
        }
        level
    }

    /// Inserts `key`, returning the replaced value when an equal key was
    /// overridden.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let (mut update, mut rank) = self.path_to(&key);

        if self.override_existing {
            if let Some(next) = self.forward(update[0], 0) {
                if self.node(next).key == key {
                    let old = mem::replace(&mut self.node_mut(next).value, value);
                    return Some(old);
                }
            }
        }

        let level = self.random_level();
        if level > self.height() {
            self.head_forward.push(None);
            self.head_width.push(self.len + 1);
            update.push(None);
            rank.push(0);
        }

        let idx = self.alloc(Node {
            key,
            value,
            forward: vec![None; level],
            width: vec![0; level],
        });

        for l in 0..level {
            let prev = update[l];
            let gap = rank[0] - rank[l];
            let prev_width = self.width(prev, l);
            let next = self.forward(prev, l);
            {
                let node = self.node_mut(idx);
                node.forward[l] = next;
                node.width[l] = prev_width - gap;
            }
            self.set_forward(prev, l, Some(idx));
            self.set_width(prev, l, gap + 1);
        }
        for l in level..self.height() {
            let prev = update[l];
            let grown = self.width(prev, l) + 1;
            self.set_width(prev, l, grown);
        }

        self.len += 1;
        None
    }

    /// Removes `key`, returning its value.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let (update, _) = self.path_to(key);
        let target = self.forward(update[0], 0)?;
        if self.node(target).key != *key {
            return None;
        }
        let target_height = self.node(target).forward.len();

        for l in 0..self.height() {
            if l < target_height && self.forward(update[l], l) == Some(target) {
                let joined = self.width(update[l], l) + self.node(target).width[l] - 1;
                let next = self.node(target).forward[l];
                self.set_forward(update[l], l, next);
                self.set_width(update[l], l, joined);
            } else {
                let shrunk = self.width(update[l], l) - 1;
                self.set_width(update[l], l, shrunk);
            }
        }

        while self.height() > 1 && self.head_forward[self.height() - 1].is_none() {
            self.head_forward.pop();
            self.head_width.pop();
        }

        self.len -= 1;
        let node = self.nodes[target].take().expect("skip list slab slot is free");
        self.free.push(target);
        Some(node.value)
    }

    fn find_index(&self, key: &K) -> Option<usize> {
        let mut cur: Option<usize> = None;
        for level in (0..self.height()).rev() {
            while let Some(next) = self.forward(cur, level) {
                match self.node(next).key.cmp(key) {
                    Ordering::Less => cur = Some(next),
                    Ordering::Equal => return Some(next),
                    Ordering::Greater => break,
                }
            }
        }
        None
    }

    /// Looks up a key.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.find_index(key).map(|idx| &self.node(idx).value)
    }

    /// Looks up a key mutably.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let idx = self.find_index(key)?;
        Some(&mut self.node_mut(idx).value)
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &K) -> bool {
        self.find_index(key).is_some()
    }

    /// Returns the entry at `index` in comparator order, zero based.
    pub fn get_at(&self, index: usize) -> Option<(&K, &V)> {
        if index >= self.len {
            return None;
        }
        let mut remaining = index + 1;
        let mut cur: Option<usize> = None;
        for level in (0..self.height()).rev() {
            loop {
                let width = self.width(cur, level);
                if width > remaining {
                    break;
                }
                match self.forward(cur, level) {
                    Some(next) => {
                        remaining -= width;
                        cur = Some(next);
                    }
                    None => break,
                }
            }
        }
        cur.map(|idx| {
            let node = self.node(idx);
            (&node.key, &node.value)
        })
    }

    /// Iterates entries in comparator order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            list: self,
            cur: self.head_forward[0],
        }
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.head_forward = vec![None];
        self.head_width = vec![1];
        self.len = 0;
    }
}

/// In-order iterator over a skip list.
pub struct Iter<'a, K, V> {
    list: &'a IndexableSkipList<K, V>,
    cur: Option<usize>,
}

impl<'a, K: Ord, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<(&'a K, &'a V)> {
        let idx = self.cur?;
        let node = self.list.node(idx);
        self.cur = node.forward[0];
        Some((&node.key, &node.value))
    }
}
