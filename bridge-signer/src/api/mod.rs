//! REST API of the signer node.

pub mod generic;

pub use generic::{constant_time_eq, handle_rejection, status_for, ApiServer};
