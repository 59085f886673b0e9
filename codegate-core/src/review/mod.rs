//! Review module for code review runs
//!
//! This module turns a change into review units, dispatches them over a
//! bounded worker pool, and assembles the live status and final report.

mod dispatcher;
pub mod flow;
pub mod report;
mod results;

pub use dispatcher::{
    failure_text, DispatchObserver, DispatchOptions, DispatchStats, Dispatcher, ReviewEngine,
};
pub use flow::{Preparation, PreparedReview, ReviewFlow};
pub use report::{Report, ReportMeta};
pub use results::{
    DispatchPlan, FileChange, ResultSet, ReviewItem, ReviewMode, StatusSnapshot, SUMMARY_UNIT,
};
