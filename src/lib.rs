// ABOUTME: Library module for sqldump
// ABOUTME: Exports all core functionality for use in binary and tests

pub mod commands;
pub mod config;
pub mod dialect;
pub mod dump;
pub mod error;
pub mod utils;
