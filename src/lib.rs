//! gmake2cmake core library.
//!
//! This library reads a GNU make project (following includes and
//! recursive sub-builds), evaluates its variables and rules, infers the
//! compile and link actions its recipes perform, and builds a
//! target-based project IR for a build-generator backend. Problems in the
//! input never abort a run: they are collected as diagnostics and unknown
//! constructs next to a best-effort result.

pub mod ast;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod discovery;
pub mod eval;
pub mod fs;
pub mod ir;
pub mod parser;
pub mod pattern;
pub mod pipeline;
pub mod runner;
pub mod unknown;
