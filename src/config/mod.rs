//! Configuration file loading
//!
//! All configs are declarative YAML decoded into typed shapes and
//! validated after load. Class names are read-only once loaded.

pub mod ec2;
pub mod jobs;
pub mod nodes;
pub mod pods;

pub use jobs::{JobClass, JobConfig};
pub use nodes::{NodeClass, NodeConfig, NodeResources};
pub use pods::{PodClass, PodConfig};
