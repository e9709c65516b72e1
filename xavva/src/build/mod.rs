//! Build and deploy
//!
//! Handles:
//! - Running Maven or Gradle with streamed, summarized output
//! - Locating the WAR and exploding it into Tomcat's webapps
//! - Incremental class and resource sync into a running app

mod artifact;
mod runner;

pub use artifact::*;
pub use runner::*;
