//! Broadcasting for real-time job streaming.

pub mod job_updates;

pub use job_updates::JobUpdateBroadcaster;
