pub mod accounting;

pub use accounting::{accounting_middleware, InternalRedirect};
