//! CLI Commands

pub mod record;
pub mod replay;
pub mod session;
