//! L6: inter-rank resolution and ghost exchange. `transport` abstracts the
//! point-to-point/collective layer (MPI in production, `InProcessTransport`
//! for tests); `comm` implements the resolve/ghost/tag-exchange protocol on
//! top of it.

mod comm;
mod transport;

pub use comm::{ParallelComm, PStatus, SharingTags, MAX_SHARING_PROCS};
pub use transport::{InProcessTransport, Transport};
