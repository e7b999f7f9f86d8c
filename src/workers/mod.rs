pub mod reconciliation;

pub use reconciliation::{ReconcileOutcome, ReconciliationSweeper, SweepReport};
