//! Command-line tools for unicam.
//!
//! The `unicam` binary is a thin clap front end over these modules:
//!
//! - `unicam list`: registered backends, presets and plugin discovery failures
//! - `unicam info <CAMERA>`: current value of every property
//! - `unicam docs [BACKEND…]`: property reference as HTML or Markdown
//! - `unicam grab <CAMERA>`: record frames to raw files or a multi-page TIFF
//! - `unicam benchmark <ADDRESS>`: bandwidth through the device proxy
//!
//! Every tool goes through the public camera API only.

pub mod benchmark;
pub mod docs;
pub mod grab;
pub mod info;
pub mod logging;
pub mod session;

pub use session::{Assignment, Session};
