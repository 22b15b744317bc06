pub mod app;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod error;
pub mod process;
pub mod session;
pub mod tasks;
pub mod ui;
pub mod util;
pub mod workdir;
