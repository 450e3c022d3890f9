//! Per-report-type collection runs over the active fleet.

mod definitions;
mod inspector;
mod job;

pub use definitions::{find_collection_job, CollectionJobSpec, BUILTIN_COLLECTION_JOBS};
pub use inspector::RecordInspector;
pub use job::{CollectionJob, CollectionOptions};

#[cfg(test)]
pub(crate) use job::tests::{StubProvider, VINS};
