//! Errors reported by indexed operations.

/// An error that occurred while reading or updating a vector.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("index out of range [{index}] with length {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Fails with [`Error::IndexOutOfRange`] unless `index` addresses one of `len`
/// elements.
pub(crate) fn check_index(index: usize, len: usize) -> Result<()> {
    if index < len {
        Ok(())
    } else {
        Err(Error::IndexOutOfRange { index, len })
    }
}
