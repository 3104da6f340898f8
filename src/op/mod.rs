//! UserOp / Batch — the unit of user-requested work.

pub mod user_op;

pub use user_op::{Batch, OpType, UserOp, UserOpStatus};
