//! Request orchestration: score fusion, weighted multi-query merge, and
//! the search lifecycle.

pub mod fusion;
pub mod merge;
pub mod search;
