//! Mirror a photo library's albums into a directory-per-album tree.

pub mod config;
pub mod control;
pub mod db;
pub mod export;
pub mod logging;
pub mod mirror;
pub mod progress;
pub mod sensor;
pub mod sync;
pub mod web;
