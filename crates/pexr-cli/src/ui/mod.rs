//! Terminal output.

pub mod reporter;

pub use reporter::ConsoleReporter;
