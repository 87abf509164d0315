//! corewrap — package core dumps with the binary modules needed to debug
//! them elsewhere, and exchange the result with a dumpling storage service.
//!
//! A core dump alone is rarely enough to re-open a crash on another
//! machine: the debugger also needs every binary image that was mapped
//! into the crashed process. This crate reads the module list straight out
//! of the core file's `NT_FILE` note, bundles core + modules + any
//! explicitly requested files into a zip archive keyed by absolute path,
//! and can upload/download such archives and attach triage metadata to
//! them.
//!
//! # Module overview
//!
//! - [`error`] — Error types used throughout the crate.
//! - [`path_set`] — Deduplicating set of absolute paths to package.
//! - [`modules`] — Mapped-module discovery from an ELF core file.
//! - [`bundle`] — Wrap pipeline combining core, explicit paths and
//!   discovered modules.
//! - [`archive`] — Zip packaging and extraction preserving absolute path
//!   structure.
//! - [`transfer`] — Blocking HTTP client for the dumpling service.
//! - [`triage`] — Host identity snapshot and triage-file loading.

pub mod archive;
pub mod bundle;
pub mod error;
pub mod modules;
pub mod path_set;
pub mod transfer;
pub mod triage;
