//! Participant record sources
//!
//! The pipeline only needs an ordered list of [`ParticipantRecord`]s for one
//! experiment version. Where they come from sits behind [`RecordSource`].

pub mod locator;
pub mod sqlite_source;

pub use locator::StoreLocator;
pub use sqlite_source::SqliteRecordSource;

use crate::error::StoreError;
use crate::record::ParticipantRecord;

/// Backend trait for fetching participant records
pub trait RecordSource {
    /// All records tagged with `version`, in a stable fetch order.
    fn fetch(&self, version: &str) -> Result<Vec<ParticipantRecord>, StoreError>;

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;
}
