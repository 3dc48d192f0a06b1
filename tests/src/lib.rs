//! modswap testing utilities
//!
//! Fixtures for exercising the lifecycle manager against real module
//! archives without a real host:
//! - [`fixtures`]: a temporary module directory and a ready-made harness
//! - [`modules`]: module entry points and handlers that record what happens to them
//! - [`faults`]: host and loader wrappers that fail on demand

pub mod faults;
pub mod modules;

pub use faults::{FaultyHost, FlakyLoaderFactory};
pub use fixtures::{Harness, ModuleDir};
pub use modules::{FixedAnswer, HookLog, PanickingDisable, RecordingModule, StructuralHandler};
