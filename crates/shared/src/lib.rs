//! Wire and domain types shared by the plan editor core and its front ends.

pub mod domain;
pub mod error;
pub mod protocol;
