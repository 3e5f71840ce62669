//! Persistent vectors with structural sharing.
//!
//! [`Vector`] is a persistent vector (also known as a "bitmapped vector trie"),
//! as described [here](https://hypirion.com/musings/understanding-persistent-vector-pt-1).
//! Every update returns a new vector and leaves the original untouched; the two
//! share every node of the trie that the update didn't need to rewrite. The
//! most recently appended elements live in a small "tail" buffer outside of the
//! trie, which makes appending amortized constant time.
//!
//! [`Transient`] is the bulk-construction counterpart: an exclusively owned
//! builder over the same representation that edits nodes in place once it has
//! copied them. It is obtained with [`Vector::transient`] and turned back into
//! a [`Vector`] with [`Transient::persistent`].
//!
//! ```rust
//! # use persistent_vector::Vector;
//! let v: Vector<i32> = (1..=33).collect();
//! let w = v.conj(42);
//! assert_eq!(v.len(), 33);
//! assert_eq!(w.nth(33), Ok(&42));
//!
//! let u = v.assoc(0, 99).unwrap();
//! assert_eq!(u.nth(0), Ok(&99));
//! assert_eq!(v.nth(0), Ok(&1));
//! ```

// Not yet implemented (do we need them?)
// - pop / truncate
// - slicing

pub mod error;
mod metrics;
mod node;
pub mod transient;
pub mod vector;

/// [`Vector`] takes a "branching factor" parameter, which must be a
/// reasonably-sized power of two. We use this trait to enforce that.
pub trait ValidBranchingConstant {}
pub struct Const<const N: usize> {}

impl ValidBranchingConstant for Const<2> {}
impl ValidBranchingConstant for Const<4> {}
impl ValidBranchingConstant for Const<8> {}
impl ValidBranchingConstant for Const<16> {}
impl ValidBranchingConstant for Const<32> {}
impl ValidBranchingConstant for Const<64> {}
impl ValidBranchingConstant for Const<128> {}

pub use error::{Error, Result};
pub use transient::Transient;
pub use vector::Vector;
