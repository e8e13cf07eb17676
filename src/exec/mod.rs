//! # Execution Layer
//!
//! The parallel aggregation kernel and its supporting pieces:
//!
//! - [`reduction`]: the `(count, sum, sum_sq)` fold state with a
//!   commutative merge;
//! - [`kernel`]: region-partitioned scoped-thread folding, plus the fused
//!   sample-and-fold path over the flat cache;
//! - [`cancel`]: the cooperative stop flag shared by a query's workers;
//! - [`scaler`]: population estimates, confidence intervals, and the
//!   stability decision.

pub mod cancel;
pub mod kernel;
pub mod reduction;
pub mod scaler;

pub use cancel::CancelToken;
pub use kernel::{fold_records, fold_region_stride, AmountFilter};
pub use reduction::Reduction;
pub use scaler::{
    confidence_for_sample_size, estimate, stability_status, Aggregate, Estimate, Status,
};
