pub mod error;

pub use error::{ErrorKind, RestoreError, Result};
