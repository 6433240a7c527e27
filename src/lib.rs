//! Julia set rendering: a WGSL kernel computes an iteration count per pixel,
//! and the counts are coloured with a six-segment hue sweep and shown in a
//! window.

pub mod canvas;
pub mod colour;
pub mod command_buffer;
pub mod command_encoder;
pub mod complex;
pub mod compute;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod field;
pub mod julia;
pub mod pipeline;
pub mod program;
pub mod screen;
pub mod selector;
pub mod typed_buffer;
pub mod var;

mod scope;

pub use error::{Error, Result};
