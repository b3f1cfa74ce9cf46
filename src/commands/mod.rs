// Manifest-driven commands: apply, diff, validate
pub mod declarative;

// Download cache inspection
pub mod cache;
