//! Domain subsystem.
//!
//! # Data Flow
//! ```text
//! HTTP handler
//!     → usecase.rs (validation, orchestration)
//!     → ports.rs (UsersRepository, Cache)
//!     → outbound adapters
//!
//! Failures:
//!     StoreError / validation
//!     → error.rs (AppError with kind, code, message, operation chain)
//!     → dispatcher classifies and encodes
//! ```

pub mod error;
pub mod ports;
pub mod usecase;
pub mod user;

pub use error::{classify, AppError, Classification, ErrorKind, FieldPath};
pub use ports::{Cache, CacheError, StoreError, UsersRepository};
pub use usecase::UserService;
pub use user::User;
