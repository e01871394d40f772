//! Build-time persistence bytecode enhancement.
//!
//! After a build, the enhancer finds compiled classes that carry persistence
//! metadata (descriptor files or source annotations), groups them per build
//! unit, and runs an external enhancer once per unit inside an environment
//! scoped to that unit's outputs and dependency closure.
pub mod backend;
pub mod command_backend;
pub mod config;
pub mod display;
pub mod environment;
pub mod error;
pub mod group;
pub mod locate;
pub mod orchestrator;
pub mod project;
pub mod record;
pub mod report;
pub mod scan;
pub mod task;
