//! hardsnap CLI library - exports modules for testing

pub mod cmd;
pub mod config;
pub mod logging;
pub mod util;
