mod app;
mod bridge;
mod cache;
mod cli;
mod config;
mod error;
mod game;
mod grid;
mod ini;
mod keybind;
mod logging;
mod models;
mod optimistic;
mod panel;
mod reports;
mod safe_mode;
mod store;
mod ui;
mod watch;

use anyhow::Result;

fn main() -> Result<()> {
    cli::run()
}
