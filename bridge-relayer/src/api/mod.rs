//! REST status API of the relayer.

pub mod generic;

pub use generic::{handle_rejection, ApiServer, RelayerHealth, RequestSummary, StatsResponse};
