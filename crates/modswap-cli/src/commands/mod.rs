//! CLI command implementations

pub mod console;
pub mod init;
pub mod inspect;
pub mod new;
pub mod resolve;
