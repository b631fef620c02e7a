//! Persistence collaborators used around a session
//!
//! Users are resolved from already-issued access tokens and finished
//! recordings are handed to a `RecordStore`. Credential handling and
//! token issuance live outside this crate.

mod models;
mod records;
mod users;

pub use models::{Recording, User, UserProfile};
pub use records::{JsonlRecordStore, RecordStore};
pub use users::{StaticUserDirectory, UserDirectory};
