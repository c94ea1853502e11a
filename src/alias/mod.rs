//! Alias swap protocol
//!
//! Every alias mutation is a single atomic backend request, so there is no
//! observable instant where the specific alias resolves to nothing. The swap
//! hands back the indexes it displaced; deleting them is a separate,
//! best-effort step.

mod swap;

pub use swap::{AliasSwapper, ShardWait};
