//! Terminal front end for the `termdeck` player.

pub mod cli;
pub mod commands;
pub mod config;
pub mod runtime;
pub mod terminal;
pub mod view;
