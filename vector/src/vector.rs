use std::{
    fmt,
    hash::{Hash, Hasher},
    iter::FusedIterator,
    ops::Index,
};

use imbl_sized_chunks::Chunk;

use crate::{
    error::{check_index, Error, Result},
    node::{index_at, EditId, Owner, Ref, Trie},
    transient::Transient,
    Const, ValidBranchingConstant,
};

/// A persistent vector.
///
/// Cloning is cheap, and every update returns a new vector that shares all
/// unchanged parts of the old one. The parameter `N` is the branching factor
/// of the underlying trie. For performance, it should always be a power of 2.
/// Values between `8` and `64` are pretty reasonable.
#[derive(Clone)]
pub struct Vector<T, const N: usize = 32>
where
    Const<N>: ValidBranchingConstant,
{
    pub(crate) trie: Trie<T, N>,
    // Never empty unless the whole vector is.
    pub(crate) tail: Ref<Chunk<T, N>>,
    pub(crate) length: usize,
}

impl<T, const N: usize> Vector<T, N>
where
    Const<N>: ValidBranchingConstant,
{
    pub fn new() -> Self {
        Self {
            trie: Trie::new(),
            tail: Ref::new(Chunk::new()),
            length: 0,
        }
    }

    /// The number of elements in this vector.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use persistent_vector::Vector;
    /// let v: Vector<_> = Vector::from([0, 1, 2, 3, 4, 5]);
    /// assert_eq!(v.len(), 6);
    /// ```
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Gets an element at a given index, or `None` if `idx` is out-of-bounds.
    pub fn get(&self, idx: usize) -> Option<&T> {
        self.trie
            .values_for(&self.tail, self.length, idx)
            .and_then(|values| values.get(index_at::<N>(0, idx)))
    }

    /// Gets an element at a given index.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use persistent_vector::{Error, Vector};
    /// let v: Vector<_> = Vector::from([1, 2, 3]);
    /// assert_eq!(v.nth(1), Ok(&2));
    /// assert_eq!(v.nth(3), Err(Error::IndexOutOfRange { index: 3, len: 3 }));
    /// ```
    pub fn nth(&self, idx: usize) -> Result<&T> {
        self.get(idx).ok_or(Error::IndexOutOfRange {
            index: idx,
            len: self.length,
        })
    }

    /// The last element. On an empty vector this fails like `nth(len - 1)`
    /// would, with an index of `usize::MAX`.
    pub fn peek(&self) -> Result<&T> {
        self.nth(self.length.wrapping_sub(1))
    }

    pub fn iter(&self) -> Iter<'_, T, N> {
        self.into_iter()
    }

    /// Asserts that the internal structure is consistent. Only useful for
    /// testing this crate.
    pub fn check_invariants(&self) {
        assert!(self.tail.len() <= N);
        assert_eq!(self.tail.is_empty(), self.is_empty());
        // Everything reachable from a vector must be safe to share.
        self.trie
            .check_invariants(self.length - self.tail.len(), &[Owner::Shared]);
    }
}

impl<T: Clone, const N: usize> Vector<T, N>
where
    Const<N>: ValidBranchingConstant,
{
    /// Returns a new vector with the element at `idx` replaced by `elt`.
    ///
    /// Only the nodes on the path from the root to `idx` are copied; everything
    /// else is shared with `self`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use persistent_vector::Vector;
    /// let v: Vector<_> = (1..=33).collect();
    /// let w = v.assoc(0, 99).unwrap();
    /// assert_eq!(w.nth(0), Ok(&99));
    /// assert_eq!(v.nth(0), Ok(&1));
    /// assert!(v.assoc(33, 0).is_err());
    /// ```
    pub fn assoc(&self, idx: usize, elt: T) -> Result<Self> {
        check_index(idx, self.length)?;
        let mut ret = self.clone();
        if idx >= self.tail_offset() {
            let mut tail = Chunk::clone(&self.tail);
            tail[index_at::<N>(0, idx)] = elt;
            ret.tail = Ref::new(tail);
        } else {
            ret.trie.assoc(idx, elt, Owner::Shared);
        }
        Ok(ret)
    }

    /// Returns a new vector with `elt` appended.
    ///
    /// Runs in amortized constant time: most of the time only the tail is
    /// copied, and once every `N` elements the tail moves into the trie.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use persistent_vector::Vector;
    /// let v: Vector<_> = (1..=33).collect();
    /// let w = v.conj(42);
    /// assert_eq!(w.nth(33), Ok(&42));
    /// assert_eq!(v.len(), 33);
    /// ```
    pub fn conj(&self, elt: T) -> Self {
        if !self.tail.is_full() {
            let mut tail = Chunk::clone(&self.tail);
            tail.push_back(elt);
            return Self {
                trie: self.trie.clone(),
                tail: Ref::new(tail),
                length: self.length + 1,
            };
        }

        let mut trie = self.trie.clone();
        trie.push_leaf(self.length, Chunk::clone(&self.tail), Owner::Shared);
        Self {
            trie,
            tail: Ref::new(Chunk::unit(elt)),
            length: self.length + 1,
        }
    }

    /// Creates a [`Transient`] holding the same elements, for cheap bulk
    /// updates. The trie stays shared until the transient first writes to it.
    pub fn transient(&self) -> Transient<T, N> {
        let edit = EditId::fresh();
        log::trace!(
            "thawing vector of length {} into transient {edit}",
            self.length
        );
        Transient::from_parts(edit, self.trie.clone(), Chunk::clone(&self.tail), self.length)
    }

    fn tail_offset(&self) -> usize {
        self.length - self.tail.len()
    }
}

impl<T, const N: usize> Default for Vector<T, N>
where
    Const<N>: ValidBranchingConstant,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Iterates over a trie followed by its tail, one leaf at a time.
#[derive(Debug, Clone)]
pub struct Iter<'a, T, const N: usize>
where
    Const<N>: ValidBranchingConstant,
{
    trie: &'a Trie<T, N>,
    tail: Option<&'a [T]>,
    tail_offset: usize,
    // Index of the first element of the next leaf to load from the trie.
    next_leaf: usize,
    leaf: std::slice::Iter<'a, T>,
    remaining: usize,
}

impl<'a, T, const N: usize> Iter<'a, T, N>
where
    Const<N>: ValidBranchingConstant,
{
    pub(crate) fn new(trie: &'a Trie<T, N>, tail: &'a [T], len: usize) -> Self {
        Iter {
            trie,
            tail: Some(tail),
            tail_offset: len - tail.len(),
            next_leaf: 0,
            leaf: [].iter(),
            remaining: len,
        }
    }
}

impl<'a, T, const N: usize> Iterator for Iter<'a, T, N>
where
    Const<N>: ValidBranchingConstant,
{
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(ret) = self.leaf.next() {
                self.remaining -= 1;
                return Some(ret);
            }

            if self.next_leaf < self.tail_offset {
                self.leaf = self.trie.leaf(self.next_leaf)?.iter();
                self.next_leaf += N;
            } else {
                self.leaf = self.tail.take()?.iter();
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T, const N: usize> ExactSizeIterator for Iter<'_, T, N> where
    Const<N>: ValidBranchingConstant
{
}

impl<T, const N: usize> FusedIterator for Iter<'_, T, N> where Const<N>: ValidBranchingConstant {}

/// An owning iterator, which clones elements out of the (possibly shared) trie.
#[derive(Debug, Clone)]
pub struct IntoIter<T, const N: usize>
where
    Const<N>: ValidBranchingConstant,
{
    vec: Vector<T, N>,
    front: usize,
    back: usize,
}

impl<T: Clone, const N: usize> Iterator for IntoIter<T, N>
where
    Const<N>: ValidBranchingConstant,
{
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.front == self.back {
            return None;
        }
        let ret = self.vec.get(self.front).cloned();
        self.front += 1;
        ret
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.back - self.front;
        (len, Some(len))
    }
}

impl<T: Clone, const N: usize> DoubleEndedIterator for IntoIter<T, N>
where
    Const<N>: ValidBranchingConstant,
{
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front == self.back {
            return None;
        }
        self.back -= 1;
        self.vec.get(self.back).cloned()
    }
}

impl<T: Clone, const N: usize> ExactSizeIterator for IntoIter<T, N> where
    Const<N>: ValidBranchingConstant
{
}

impl<T: Clone, const N: usize> FusedIterator for IntoIter<T, N> where
    Const<N>: ValidBranchingConstant
{
}

impl<'a, T, const N: usize> IntoIterator for &'a Vector<T, N>
where
    Const<N>: ValidBranchingConstant,
{
    type Item = &'a T;
    type IntoIter = Iter<'a, T, N>;

    fn into_iter(self) -> Self::IntoIter {
        Iter::new(&self.trie, &self.tail, self.length)
    }
}

impl<T: Clone, const N: usize> IntoIterator for Vector<T, N>
where
    Const<N>: ValidBranchingConstant,
{
    type Item = T;
    type IntoIter = IntoIter<T, N>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            back: self.length,
            front: 0,
            vec: self,
        }
    }
}

impl<T: Clone, const N: usize> FromIterator<T> for Vector<T, N>
where
    Const<N>: ValidBranchingConstant,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        iter.into_iter().collect::<Transient<T, N>>().persistent()
    }
}

impl<T: Clone, const N: usize> Extend<T> for Vector<T, N>
where
    Const<N>: ValidBranchingConstant,
{
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        let mut transient = self.transient();
        transient.extend(iter);
        *self = transient.persistent();
    }
}

impl<T: Clone, const N: usize> From<Vec<T>> for Vector<T, N>
where
    Const<N>: ValidBranchingConstant,
{
    fn from(vec: Vec<T>) -> Self {
        vec.into_iter().collect()
    }
}

impl<T: Clone, const N: usize, const K: usize> From<[T; K]> for Vector<T, N>
where
    Const<N>: ValidBranchingConstant,
{
    fn from(arr: [T; K]) -> Self {
        arr.into_iter().collect()
    }
}

impl<T, const N: usize> Index<usize> for Vector<T, N>
where
    Const<N>: ValidBranchingConstant,
{
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        match self.get(index) {
            Some(elt) => elt,
            None => panic!(
                "index out of range [{index}] with length {}",
                self.length
            ),
        }
    }
}

// Equality and hashing only look at the elements, never at how the trie
// happens to be laid out in memory.
impl<T: PartialEq, const N: usize> PartialEq for Vector<T, N>
where
    Const<N>: ValidBranchingConstant,
{
    fn eq(&self, other: &Self) -> bool {
        self.length == other.length && self.iter().eq(other.iter())
    }
}

impl<T: Eq, const N: usize> Eq for Vector<T, N> where Const<N>: ValidBranchingConstant {}

impl<T: Hash, const N: usize> Hash for Vector<T, N>
where
    Const<N>: ValidBranchingConstant,
{
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.length.hash(state);
        for elt in self {
            elt.hash(state);
        }
    }
}

impl<T: fmt::Debug, const N: usize> fmt::Debug for Vector<T, N>
where
    Const<N>: ValidBranchingConstant,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self).finish()
    }
}

/// Writes the elements space-separated between brackets, e.g. `[1 2 3]`.
pub(crate) fn fmt_elements<'a, T: fmt::Display + 'a>(
    f: &mut fmt::Formatter<'_>,
    elts: impl Iterator<Item = &'a T>,
) -> fmt::Result {
    write!(f, "[")?;
    for (i, elt) in elts.enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{elt}")?;
    }
    write!(f, "]")
}

impl<T: fmt::Display, const N: usize> fmt::Display for Vector<T, N>
where
    Const<N>: ValidBranchingConstant,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_elements(f, self.iter())
    }
}

impl<T: serde::Serialize, const N: usize> serde::Serialize for Vector<T, N>
where
    Const<N>: ValidBranchingConstant,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeSeq;

        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for elt in self.iter() {
            seq.serialize_element(elt)?;
        }
        seq.end()
    }
}

impl<'de, T: Clone + serde::Deserialize<'de>, const N: usize> serde::Deserialize<'de>
    for Vector<T, N>
where
    Const<N>: ValidBranchingConstant,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let vec: Vec<T> = Vec::deserialize(deserializer)?;
        Ok(vec.into_iter().collect())
    }
}
