pub mod poller;
pub mod state;
pub mod write_queue;

pub use poller::{ResponseOutcome, Scheduler, StepOutcome};
pub use state::{SchedulerState, SchedulerTimings, MIN_SEND_INTERVAL, RESPONSE_TIMEOUT};
pub use write_queue::{WriteQueue, WriteRequest};
