//! Graph reconciliation
//!
//! Turns a record's classification into taxonomy nodes and membership edges,
//! converging the stored edge sets on the desired ones.

mod reconciler;
mod report;


pub use reconciler::{GraphReconciler, ReconcileError, ReconcileRequest};
pub use report::{EdgeDiff, ReconcileReport};
