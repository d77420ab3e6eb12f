//! Test utilities for on-disk makefile projects.
//!
//! Integration tests build small project trees in temporary directories
//! and run either the library pipeline or the compiled binary against
//! them.

pub mod gmake2cmake;
pub mod project;

pub use gmake2cmake::{Gmake2cmakeRun, run_gmake2cmake_in};
pub use project::{MakeProject, write_tree};
