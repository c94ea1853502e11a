//! Convergence engine
//!
//! A sequential state machine over one physical index:
//! `EnsureIndex → ValidateSettings → ValidateAnalyzers → ValidateMapping →
//! ValidateAlias → Reopen`. Each phase inspects one section and applies the
//! cheapest safe correction the operator's options allow. Drift that cannot
//! be corrected is reported and the run carries on; backend failures end it.

mod engine;
mod report;

pub use engine::{ConvergeOptions, ConvergenceEngine};
pub use report::{Correction, Issue, Phase, RunReport, Section};
