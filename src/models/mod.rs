//! Domain model module declarations.

pub mod event;
pub mod page;
pub mod task;
