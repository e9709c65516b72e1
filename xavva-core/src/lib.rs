//! Xavva Core - side-effect-free building blocks
//!
//! This crate holds the pieces of the xavva CLI that can be reasoned about
//! without spawning processes or touching the console: the shared path filter,
//! the subprocess line splitter, the log classifier rule table, server
//! readiness tracking and the watch debounce state.
//!
//! Everything that talks to Maven, Gradle, Tomcat or the terminal lives in the
//! `xavva` crate.

mod classify;
mod lines;
mod path_filter;
mod readiness;
mod watch;

pub use classify::*;
pub use lines::*;
pub use path_filter::*;
pub use readiness::*;
pub use watch::*;
