//! Distributed triangle counting with mailbox bound actors.
//!
//! The lower triangle of an undirected graph is spread row-cyclically over a
//! fixed set of workers. Each worker pushes its rows, in chunks, to the owners
//! of their neighbors; receivers intersect and accumulate, and a barrier
//! followed by a sum reduction yields the global count.

pub mod active_message;
pub mod error;
pub mod graph;
pub mod intersection;
pub mod options;
pub mod printer;
pub mod runtime;

pub use active_message::selector::{
    count_triangles, triangle_count, ActorState, Packet, TcConfig, TcRun, DEFAULT_CHUNK_SIZE,
};
pub use error::{Result, TcError};
pub use graph::{Graph, LocalRows};
pub use intersection::sorted_intersection_count;
pub use runtime::{WorkerCtx, World};
