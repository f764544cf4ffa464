//! Chartwatch daemon: Chromium page access and configuration for the
//! `chartwatch` binary.

pub mod browser;
pub mod config;

pub use browser::{find_chromium, BrowserOptions, ChromiumPage};
pub use config::{Overrides, RunOptions, Settings};
