pub mod atomic_file;
pub mod credentials;
pub mod crypto;
pub mod errors;
pub mod faces;
pub mod notes;
pub mod payload;
pub mod sessions;
pub mod users;

pub use errors::{AppError, AppResult, ErrorKind};
