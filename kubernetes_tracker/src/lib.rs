pub mod cli;
pub mod control;
pub mod convert;
pub mod kubectl;
pub mod process;
pub mod state;
pub mod store;
pub mod time_ext;
pub mod tracker;

pub(crate) mod temp_path;
pub(crate) mod version;

pub use kubectl::{ConfigError, Kubectl, KubectlConfig};
pub use store::WorkloadStore;
pub use tracker::{KubernetesAllocator, KubernetesTracker, BACKEND};

pub type Error = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = Error> = std::result::Result<T, E>;
