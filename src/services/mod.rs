// Product hierarchy
pub mod catalog;

// Quotes and their review workflow
pub mod quotes;

// Admin-managed settings and user directory
pub mod profiles;
pub mod settings;
