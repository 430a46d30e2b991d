//! Core trait definitions shared by pipeline outputs.

/// A type that can produce a summary of its contents.
pub trait Summarizable {
    /// A one-line summary suitable for display and logging.
    fn summary(&self) -> String;
}
