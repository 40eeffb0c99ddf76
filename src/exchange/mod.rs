//! The exchange coordinator and the protocol it speaks with the replicas.

mod coordinator;
pub mod ladder;
mod protocol;
mod swap;

pub use coordinator::{RunData, Seeds, run};
pub use protocol::{CoordinatorLink, ReplicaLink, Resume, SwapMessage, link};
pub use swap::{SwapRound, decide, exchange_adjacent, swap_probability};
