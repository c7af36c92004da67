//! L3: `TagServer` — registers tags and routes per-entity reads/writes to
//! dense arrays in L1 or to rank-wide sparse/bit/variable maps, mirroring
//! MOAB's dense/sparse/bit/mesh tag storage classes.

mod server;

pub use server::{TagDescriptor, TagId, TagServer, TagSize, TagStorage};
