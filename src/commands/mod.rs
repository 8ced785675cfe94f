// ABOUTME: Command implementations invoked by the CLI
// ABOUTME: Exports the export command

pub mod export;

pub use export::export;
