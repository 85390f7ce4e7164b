//! Command-line front end (`cli` feature)

mod config;
#[path = "main.rs"]
mod main_impl;

pub use main_impl::{main, Cli};
