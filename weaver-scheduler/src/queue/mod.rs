mod peer;
mod retry;
mod standby;

pub use peer::PeerTaskPriorityQueue;
pub use retry::{FailedDispatchRetryQueue, RetryEntry};
pub use standby::StandbyDispatchQueue;
