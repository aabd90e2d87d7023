//! Background workers.

mod reconciliation_sweep;

pub use reconciliation_sweep::{
    ReconciliationSweep, ReconciliationSweepConfig, SweepReport, ABANDONED_ORDER_REASON,
};
