mod error;
mod resolved;
mod xavva_toml;

pub use error::*;
pub use resolved::*;
pub use xavva_toml::*;
