//! The trie underneath [`Vector`](crate::Vector) and [`Transient`](crate::Transient).
//!
//! Both types walk the same trie with the same code; the only difference is
//! the [`Owner`] they pass along. A persistent update passes [`Owner::Shared`]
//! and therefore copies every node on the path it touches. A transient passes
//! its own [`Owner::Edit`] tag, copies a node the first time it reaches it and
//! tags the copy, and from then on edits that copy in place.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use imbl_sized_chunks::Chunk;

use crate::{metrics::increment, Const, ValidBranchingConstant};

#[cfg(feature = "arc")]
pub(crate) use std::sync::Arc as Ref;
#[cfg(not(feature = "arc"))]
pub(crate) use std::rc::Rc as Ref;

type Interior<T, const N: usize> = Chunk<Ref<Node<T, N>>, N>;

/// `idx` is the global index into the root node, and we are some
/// possibly-intermediate node at `level` (where the leaf is at level zero).
/// Which of our slots does the global index belong to?
pub(crate) fn index_at<const N: usize>(level: u8, idx: usize) -> usize {
    let shifted: usize = idx >> (N.ilog2() * u32::from(level));
    shifted & (N - 1)
}

/// Returns true if a trie of the given depth can hold `count` elements, so that
/// a full tail can be moved into it without adding a level above the root.
pub(crate) fn is_deep_enough_to_append<const N: usize>(depth: u8, count: usize) -> bool {
    let leaves = count >> N.ilog2();
    // A capacity that doesn't fit in a usize is always enough.
    1usize
        .checked_shl(N.ilog2() * u32::from(depth))
        .map_or(true, |capacity| leaves <= capacity)
}

/// Identifies one transient lineage. Ids are never handed out twice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct EditId(u64);

impl EditId {
    pub(crate) fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        EditId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for EditId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Who may mutate a node in place.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Owner {
    /// Reachable from published vectors; never mutated.
    Shared,
    /// Created by the transient with this id, which may edit it in place.
    Edit(EditId),
}

#[derive(Debug, Clone)]
enum Body<T, const N: usize> {
    Leaf { data: Chunk<T, N> },
    Interior { children: Interior<T, N> },
}

#[derive(Debug, Clone)]
pub(crate) struct Node<T, const N: usize> {
    owner: Owner,
    body: Body<T, N>,
}

impl<T, const N: usize> Node<T, N>
where
    Const<N>: ValidBranchingConstant,
{
    fn leaf(owner: Owner, data: Chunk<T, N>) -> Self {
        Node {
            owner,
            body: Body::Leaf { data },
        }
    }

    fn interior(owner: Owner, children: Interior<T, N>) -> Self {
        Node {
            owner,
            body: Body::Interior { children },
        }
    }

    /// Wraps `data` in `height` levels of single-child interior nodes.
    fn path(owner: Owner, height: u8, data: Chunk<T, N>) -> Self {
        let mut node = Node::leaf(owner, data);
        for _ in 0..height {
            node = Node::interior(owner, Chunk::unit(Ref::new(node)));
        }
        node
    }

    fn child(&self, slot: usize) -> Option<&Node<T, N>> {
        match &self.body {
            Body::Leaf { .. } => None,
            Body::Interior { children } => children.get(slot).map(|c| &**c),
        }
    }

    fn children_mut(&mut self) -> &mut Interior<T, N> {
        match &mut self.body {
            Body::Interior { children } => children,
            Body::Leaf { .. } => unreachable!("leaf node above level 0"),
        }
    }

    fn data_mut(&mut self) -> &mut Chunk<T, N> {
        match &mut self.body {
            Body::Leaf { data } => data,
            Body::Interior { .. } => unreachable!("interior node at level 0"),
        }
    }

    /// Checks the shape of this subtree and returns its length.
    ///
    /// `height` is the level of this node, and `right_most` says whether it
    /// lies on the right-most path of the trie (the only place where interior
    /// nodes may be partially filled). Every owner tag must be one of `allowed`.
    fn check(&self, height: u8, right_most: bool, allowed: &[Owner]) -> usize {
        assert!(
            allowed.contains(&self.owner),
            "unexpected owner {:?}",
            self.owner
        );
        match &self.body {
            Body::Leaf { data } => {
                assert_eq!(height, 0);
                // Leaves only ever come from full tails.
                assert!(data.is_full());
                data.len()
            }
            Body::Interior { children } => {
                assert!(height > 0);
                assert!(!children.is_empty());
                let full = N.pow(u32::from(height));
                let last = children.len() - 1;
                let mut len = 0;
                for (i, child) in children.iter().enumerate() {
                    let child_len = child.check(height - 1, right_most && i == last, allowed);
                    if !(right_most && i == last) {
                        assert_eq!(child_len, full);
                    }
                    len += child_len;
                }
                len
            }
        }
    }
}

impl<T: Clone, const N: usize> Node<T, N>
where
    Const<N>: ValidBranchingConstant,
{
    /// Copies this node (but none of its children) and tags the copy with `owner`.
    fn clone_for(&self, owner: Owner) -> Self {
        increment!("persistent_vector.node_clones");
        Node {
            owner,
            body: self.body.clone(),
        }
    }

    /// Gets mutable access to the node behind `this`, first replacing it with a
    /// copy tagged `owner` unless `owner` is a transient that already owns it.
    ///
    /// [`Owner::Shared`] never matches, so a persistent walk copies every node.
    fn editable(this: &mut Ref<Self>, owner: Owner) -> &mut Self {
        let in_place =
            matches!(owner, Owner::Edit(_)) && this.owner == owner && Ref::get_mut(this).is_some();
        if in_place {
            increment!("persistent_vector.in_place_edits");
        } else {
            *this = Ref::new(this.clone_for(owner));
        }
        // `this` is unique by now, so this never clones.
        Ref::make_mut(this)
    }

    fn release(this: &mut Ref<Self>, edit: EditId) {
        // Nodes that aren't ours were never edited by us, and neither were
        // their descendants.
        if this.owner != Owner::Edit(edit) {
            return;
        }
        let node = Node::editable(this, Owner::Edit(edit));
        node.owner = Owner::Shared;
        if let Body::Interior { children } = &mut node.body {
            for child in children.iter_mut() {
                Node::release(child, edit);
            }
        }
    }
}

/// The part of a vector that isn't the tail.
///
/// The trie only ever holds full leaves, so its length is always a multiple of
/// `N`. When `depth` is zero, the root (if any) is a single leaf.
#[derive(Debug, Clone)]
pub(crate) struct Trie<T, const N: usize> {
    root: Option<Ref<Node<T, N>>>,
    depth: u8,
}

impl<T, const N: usize> Trie<T, N>
where
    Const<N>: ValidBranchingConstant,
{
    pub(crate) fn new() -> Self {
        Trie {
            root: None,
            depth: 0,
        }
    }

    pub(crate) fn depth(&self) -> u8 {
        self.depth
    }

    /// Returns the leaf containing `index`, or `None` if the trie is too short.
    pub(crate) fn leaf(&self, index: usize) -> Option<&Chunk<T, N>> {
        let mut node = self.root.as_deref()?;
        for level in (1..=self.depth).rev() {
            node = node.child(index_at::<N>(level, index))?;
        }
        match &node.body {
            Body::Leaf { data } => Some(data),
            Body::Interior { .. } => None,
        }
    }

    /// Returns the values holding `index` in a vector made of this trie
    /// followed by `tail`, where `len` counts both.
    pub(crate) fn values_for<'a>(
        &'a self,
        tail: &'a [T],
        len: usize,
        index: usize,
    ) -> Option<&'a [T]> {
        if index >= len {
            None
        } else if index >= len - tail.len() {
            Some(tail)
        } else {
            self.leaf(index).map(|data| data.as_slice())
        }
    }

    /// Asserts the trie's shape, given that it should contain `len` elements
    /// and that every node must be tagged with one of `allowed`.
    pub(crate) fn check_invariants(&self, len: usize, allowed: &[Owner]) {
        assert_eq!(len % N, 0);
        match &self.root {
            None => {
                assert_eq!(len, 0);
                assert_eq!(self.depth, 0);
            }
            Some(root) => {
                assert!(len <= N.pow(u32::from(self.depth) + 1));
                if let Body::Interior { children } = &root.body {
                    // Otherwise the trie would be one level deeper than needed.
                    assert!(children.len() > 1);
                }
                assert_eq!(root.check(self.depth, true, allowed), len);
            }
        }
    }
}

impl<T: Clone, const N: usize> Trie<T, N>
where
    Const<N>: ValidBranchingConstant,
{
    /// Replaces the element at `index`, which must be held by the trie.
    pub(crate) fn assoc(&mut self, index: usize, value: T, owner: Owner) {
        let Some(root) = self.root.as_mut() else {
            unreachable!("assoc on an empty trie");
        };
        let mut node = Node::editable(root, owner);
        for level in (1..=self.depth).rev() {
            node = Node::editable(&mut node.children_mut()[index_at::<N>(level, index)], owner);
        }
        node.data_mut()[index_at::<N>(0, index)] = value;
    }

    /// Moves a full tail into the trie as a new leaf.
    ///
    /// `count` is the length of the vector including that tail.
    pub(crate) fn push_leaf(&mut self, count: usize, data: Chunk<T, N>, owner: Owner) {
        debug_assert!(data.is_full());
        let Some(root) = self.root.take() else {
            self.root = Some(Ref::new(Node::leaf(owner, data)));
            return;
        };

        if !is_deep_enough_to_append::<N>(self.depth, count) {
            // The old root is full, so the new leaf always starts the second
            // subtree of the new root.
            let mut children = Chunk::new();
            children.push_back(root);
            children.push_back(Ref::new(Node::path(owner, self.depth, data)));
            self.root = Some(Ref::new(Node::interior(owner, children)));
            self.depth += 1;
            increment!("persistent_vector.depth_increases");
            log::trace!("trie grew to depth {} at length {count}", self.depth);
            return;
        }

        let index = count - 1;
        let mut level = self.depth;
        let mut node = Node::editable(self.root.insert(root), owner);
        loop {
            let slot = index_at::<N>(level, index);
            let children = node.children_mut();
            if slot == children.len() {
                children.push_back(Ref::new(Node::path(owner, level - 1, data)));
                return;
            }
            node = Node::editable(&mut children[slot], owner);
            level -= 1;
        }
    }

    /// Tags every node owned by `edit` as shared, so that no transient may
    /// edit this trie in place anymore.
    pub(crate) fn release(&mut self, edit: EditId) {
        if let Some(root) = self.root.as_mut() {
            Node::release(root, edit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_of<const N: usize>(start: usize) -> Chunk<usize, N> {
        (start..start + N).collect()
    }

    fn trie_of<const N: usize>(leaves: usize, owner: Owner) -> Trie<usize, N>
    where
        Const<N>: ValidBranchingConstant,
    {
        let mut trie = Trie::new();
        for i in 0..leaves {
            trie.push_leaf((i + 1) * N, leaf_of::<N>(i * N), owner);
        }
        trie
    }

    #[test]
    fn addressing() {
        assert_eq!(index_at::<32>(0, 33), 1);
        assert_eq!(index_at::<32>(1, 33), 1);
        assert_eq!(index_at::<32>(1, 31), 0);
        assert_eq!(index_at::<32>(2, 32 * 32 + 5), 1);
        assert_eq!(index_at::<4>(0, 0b10_11_01), 0b01);
        assert_eq!(index_at::<4>(1, 0b10_11_01), 0b11);
        assert_eq!(index_at::<4>(2, 0b10_11_01), 0b10);
    }

    #[test]
    fn depth_growth_threshold() {
        // A single leaf at depth zero.
        assert!(is_deep_enough_to_append::<32>(0, 32));
        assert!(!is_deep_enough_to_append::<32>(0, 64));
        // Depth one holds 32 leaves.
        assert!(is_deep_enough_to_append::<32>(1, 32 * 32));
        assert!(!is_deep_enough_to_append::<32>(1, 32 * 32 + 32));
        // At N = 2, usize::MAX elements fill 2^63 - 1 leaves.
        assert!(!is_deep_enough_to_append::<2>(62, usize::MAX));
        assert!(is_deep_enough_to_append::<2>(63, usize::MAX));
        // The capacity of a depth-64 trie overflows a usize.
        assert!(is_deep_enough_to_append::<2>(64, usize::MAX));
        assert!(is_deep_enough_to_append::<32>(13, usize::MAX));
    }

    #[test]
    fn lookup() {
        let trie = trie_of::<4>(13, Owner::Shared);
        trie.check_invariants(52, &[Owner::Shared]);
        assert_eq!(trie.depth(), 2);
        for i in 0..52 {
            assert_eq!(trie.leaf(i).map(|l| l[i % 4]), Some(i));
        }
        assert!(trie.leaf(52).is_none());
    }

    #[test]
    fn shared_assoc_copies_path() {
        let trie = trie_of::<4>(4, Owner::Shared);
        assert_eq!(trie.depth(), 1);
        let mut updated = trie.clone();
        updated.assoc(6, 100, Owner::Shared);

        assert_eq!(trie.leaf(6).map(|l| l[2]), Some(6));
        assert_eq!(updated.leaf(6).map(|l| l[2]), Some(100));

        let (Some(old), Some(new)) = (&trie.root, &updated.root) else {
            panic!("missing root");
        };
        assert!(!Ref::ptr_eq(old, new));
        let (Body::Interior { children: old }, Body::Interior { children: new }) =
            (&old.body, &new.body)
        else {
            panic!("expected interior roots");
        };
        // Only the leaf holding index 6 was copied.
        assert!(!Ref::ptr_eq(&old[1], &new[1]));
        for i in [0, 2, 3] {
            assert!(Ref::ptr_eq(&old[i], &new[i]));
        }
    }

    #[test]
    fn edits_in_place_once_owned() {
        let edit = EditId::fresh();
        let owner = Owner::Edit(edit);
        let mut trie = trie_of::<4>(5, Owner::Shared);
        let snapshot = trie.clone();

        trie.assoc(6, 100, owner);
        let first = trie.root.as_ref().map(Ref::as_ptr);
        trie.check_invariants(20, &[Owner::Shared, owner]);
        trie.assoc(7, 101, owner);
        let second = trie.root.as_ref().map(Ref::as_ptr);
        assert_eq!(first, second);

        assert_eq!(snapshot.leaf(6).map(|l| l[2]), Some(6));
        assert_eq!(snapshot.leaf(7).map(|l| l[3]), Some(7));
        assert_eq!(trie.leaf(6).map(|l| l[2]), Some(100));
        assert_eq!(trie.leaf(7).map(|l| l[3]), Some(101));
    }

    #[test]
    fn foreign_owner_is_copied() {
        let mine = Owner::Edit(EditId::fresh());
        let theirs = Owner::Edit(EditId::fresh());
        let mut trie = trie_of::<4>(3, theirs);
        let snapshot = trie.clone();
        trie.assoc(0, 7, mine);
        let (Some(before), Some(after)) = (&snapshot.root, &trie.root) else {
            panic!("missing root");
        };
        assert!(!Ref::ptr_eq(before, after));
        assert_eq!(after.owner, mine);
        assert_eq!(snapshot.leaf(0).map(|l| l[0]), Some(0));
    }

    #[test]
    fn release_clears_tags() {
        let edit = EditId::fresh();
        let mut trie = trie_of::<4>(17, Owner::Edit(edit));
        trie.check_invariants(68, &[Owner::Edit(edit)]);
        trie.release(edit);
        trie.check_invariants(68, &[Owner::Shared]);
    }
}
