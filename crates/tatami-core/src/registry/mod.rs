//! Registration storage and the Batch Persister.

mod persist;
mod repository;

pub use persist::{PersistError, RowFailure, UploadOutcome, persist, reconcile_failures};
pub use repository::{NewParticipant, RegistryRepository, StoredParticipant};
