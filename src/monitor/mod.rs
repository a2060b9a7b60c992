//! Entry resolution, scheduling and the event countdown

pub mod countdown;
pub mod dates;
pub mod engine;
pub mod resolver;

pub use countdown::{Countdown, CountdownTarget, CountdownTick};
pub use engine::{EngineConfig, MonitorEngine, PollTrigger};
pub use resolver::{is_new_entry, resolve_latest};
