//! The job session vocabulary shared by job trackers: job templates, job states, job info records, the
//! [`JobTracker`] and [`Allocator`] traits, and the helpers trackers use for functionality their backend does not
//! provide natively (array jobs, waiting for a state).

pub mod array_job;
pub mod wait;

mod job_info;
pub use job_info::*;

mod job_state;
pub use job_state::*;

mod job_template;
pub use job_template::*;

mod tracker;
pub use tracker::*;

pub type Error = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = Error> = std::result::Result<T, E>;
