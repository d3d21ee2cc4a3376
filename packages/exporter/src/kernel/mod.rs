//! Infrastructure: dependency container, collaborator traits, job machinery,
//! and the default archive/publisher adapters.

pub mod deps;
pub mod jobs;
pub mod local_publisher;
pub mod traits;
pub mod zip_archive;

pub use deps::ExportDeps;
pub use local_publisher::LocalBlobPublisher;
pub use traits::{ArchiveBuilder, BlobPublisher, EvidenceProvider, NamedPayload, ProviderError};
pub use zip_archive::ZipArchiveBuilder;
