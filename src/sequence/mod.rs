//! L1: `SequenceData` + `EntitySequence` + `TypeSequenceManager`.
//!
//! Entities are allocated in contiguous id-blocks per type. Grounded on
//! `original_source/src/SequenceData.hpp` and `EntitySequence.hpp`: a
//! `SequenceData` owns the raw backing arrays for a handle range, and one or
//! more non-overlapping `EntitySequence`s describe which sub-ranges of it are
//! currently live. Handles are never reused within a session, so allocation
//! only ever grows a `SequenceData` forward; there is no general free-list
//! to search.

mod data;
mod iterator;
mod manager;

pub use data::{SequenceData, SequenceDataKind, SequenceShape};
pub use iterator::RangeIntersectionIter;
pub use manager::TypeSequenceManager;

#[cfg(test)]
#[path = "sequence_tests.rs"]
mod sequence_tests;
