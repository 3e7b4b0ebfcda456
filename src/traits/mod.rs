pub mod artifact;
pub mod status;
pub mod transport;

pub use artifact::ArtifactStore;
pub use status::{LogSink, StatusSink};
pub use transport::{DfuBackend, DfuDevice};

#[cfg(test)]
pub use artifact::MockArtifactStore;
#[cfg(test)]
pub use status::MockStatusSink;
