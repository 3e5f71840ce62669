//! Transient vectors, for building and bulk-updating [`Vector`]s.
//!
//! A [`Transient`] has the same shape as a [`Vector`], plus an id that is
//! unique to it. The first time an update reaches a node, the node is copied
//! and the copy is tagged with that id; later updates that reach a tagged node
//! edit it in place. Nodes still shared with some [`Vector`] are never
//! modified.
//!
//! # Single use
//!
//! There is exactly one owner of a transient at any time. Operations take it
//! either by value (returning the updated transient) or by unique reference,
//! and [`Transient::persistent`] consumes it, so a transient can't be used
//! again once it has been turned into a vector:
//!
//! ```compile_fail
//! # use persistent_vector::Transient;
//! let t: Transient<i32> = Transient::new();
//! let v = t.persistent();
//! let w = t.conj(1); // `t` was moved by `persistent`
//! ```
//!
//! The same goes for the consuming updates:
//!
//! ```compile_fail
//! # use persistent_vector::Transient;
//! let t: Transient<i32> = Transient::new();
//! let t2 = t.conj(1);
//! let t3 = t.conj(2); // `t` was moved by the first `conj`
//! ```

use std::fmt;

use imbl_sized_chunks::Chunk;

use crate::{
    error::{check_index, Error, Result},
    node::{index_at, EditId, Owner, Ref, Trie},
    vector::{fmt_elements, Iter},
    Const, ValidBranchingConstant, Vector,
};

/// A mutable, exclusively owned view of a [`Vector`].
///
/// Transients are not `Clone`, and have no internal synchronization.
pub struct Transient<T, const N: usize = 32>
where
    Const<N>: ValidBranchingConstant,
{
    edit: EditId,
    trie: Trie<T, N>,
    // Unlike a vector's tail, this one is never shared.
    tail: Chunk<T, N>,
    length: usize,
}

impl<T, const N: usize> Transient<T, N>
where
    Const<N>: ValidBranchingConstant,
{
    pub fn new() -> Self {
        Self::from_parts(EditId::fresh(), Trie::new(), Chunk::new(), 0)
    }

    pub(crate) fn from_parts(
        edit: EditId,
        trie: Trie<T, N>,
        tail: Chunk<T, N>,
        length: usize,
    ) -> Self {
        Transient {
            edit,
            trie,
            tail,
            length,
        }
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn get(&self, idx: usize) -> Option<&T> {
        self.trie
            .values_for(&self.tail, self.length, idx)
            .and_then(|values| values.get(index_at::<N>(0, idx)))
    }

    pub fn nth(&self, idx: usize) -> Result<&T> {
        self.get(idx).ok_or(Error::IndexOutOfRange {
            index: idx,
            len: self.length,
        })
    }

    pub fn peek(&self) -> Result<&T> {
        self.nth(self.length.wrapping_sub(1))
    }

    pub fn iter(&self) -> Iter<'_, T, N> {
        Iter::new(&self.trie, &self.tail, self.length)
    }

    /// Asserts that the internal structure is consistent. Only useful for
    /// testing this crate.
    pub fn check_invariants(&self) {
        assert!(self.tail.len() <= N);
        assert_eq!(self.tail.is_empty(), self.is_empty());
        self.trie.check_invariants(
            self.length - self.tail.len(),
            &[Owner::Shared, Owner::Edit(self.edit)],
        );
    }

    fn tail_offset(&self) -> usize {
        self.length - self.tail.len()
    }
}

impl<T: Clone, const N: usize> Transient<T, N>
where
    Const<N>: ValidBranchingConstant,
{
    /// Appends an element.
    pub fn push(&mut self, elt: T) {
        if !self.tail.is_full() {
            self.tail.push_back(elt);
        } else {
            let leaf = std::mem::replace(&mut self.tail, Chunk::unit(elt));
            self.trie.push_leaf(self.length, leaf, Owner::Edit(self.edit));
        }
        self.length += 1;
    }

    /// Replaces the element at `idx`.
    pub fn set(&mut self, idx: usize, elt: T) -> Result<()> {
        check_index(idx, self.length)?;
        if idx >= self.tail_offset() {
            self.tail[index_at::<N>(0, idx)] = elt;
        } else {
            self.trie.assoc(idx, elt, Owner::Edit(self.edit));
        }
        Ok(())
    }

    /// Appends an element, returning the updated transient.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use persistent_vector::Transient;
    /// let t: Transient<_> = Transient::new().conj(1).conj(2);
    /// assert_eq!(t.persistent().to_string(), "[1 2]");
    /// ```
    pub fn conj(mut self, elt: T) -> Self {
        self.push(elt);
        self
    }

    /// Replaces the element at `idx`, returning the updated transient.
    ///
    /// If `idx` is out of range the transient is dropped along with the error;
    /// use [`Transient::set`] to keep it.
    pub fn assoc(mut self, idx: usize, elt: T) -> Result<Self> {
        self.set(idx, elt)?;
        Ok(self)
    }

    /// Turns this transient into a [`Vector`].
    ///
    /// The nodes this transient created are handed over to the vector as they
    /// are (only their tags change), so this takes time proportional to the
    /// number of nodes the transient wrote to, not to its length.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use persistent_vector::Vector;
    /// let v: Vector<_> = Vector::from([1, 2, 3]);
    /// let mut t = v.transient();
    /// t.push(4);
    /// t.set(0, 0).unwrap();
    /// let w = t.persistent();
    /// assert_eq!(w.to_string(), "[0 2 3 4]");
    /// assert_eq!(v.to_string(), "[1 2 3]");
    /// ```
    pub fn persistent(mut self) -> Vector<T, N> {
        self.trie.release(self.edit);
        log::trace!(
            "froze transient {} into vector of length {} (depth {})",
            self.edit,
            self.length,
            self.trie.depth()
        );
        Vector {
            trie: self.trie,
            tail: Ref::new(self.tail),
            length: self.length,
        }
    }
}

impl<T, const N: usize> Default for Transient<T, N>
where
    Const<N>: ValidBranchingConstant,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone, const N: usize> Extend<T> for Transient<T, N>
where
    Const<N>: ValidBranchingConstant,
{
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for elt in iter {
            self.push(elt);
        }
    }
}

impl<T: Clone, const N: usize> FromIterator<T> for Transient<T, N>
where
    Const<N>: ValidBranchingConstant,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut ret = Transient::new();
        ret.extend(iter);
        ret
    }
}

impl<T: fmt::Debug, const N: usize> fmt::Debug for Transient<T, N>
where
    Const<N>: ValidBranchingConstant,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transient")
            .field("edit", &self.edit)
            .field("elements", &self.iter().collect::<Vec<_>>())
            .finish()
    }
}

impl<T: fmt::Display, const N: usize> fmt::Display for Transient<T, N>
where
    Const<N>: ValidBranchingConstant,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_elements(f, self.iter())
    }
}
