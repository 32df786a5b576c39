//! Data shapes handed to the presentation layer.

/// Read-only round views for the presentation layer.
pub mod view;
