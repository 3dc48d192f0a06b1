//! modswap kernel
//!
//! The vocabulary shared by the lifecycle core, the reference host and the
//! operator CLI: what a module is, which capabilities a host must expose so
//! that modules can be taken out of it again, and how configuration is read.

// module model
pub mod module;
pub use module::*;

// host capabilities
pub mod host;
pub use host::*;

// command table model
pub mod command;
pub use command::*;

// event subscriptions
pub mod event;
pub use event::*;

// code loaders and module entry points
pub mod loader;
pub use loader::*;

// cooperative unload hook
pub mod gentle;
pub use gentle::GentleUnload;

// configuration
pub mod config;

// error module
pub mod error;
