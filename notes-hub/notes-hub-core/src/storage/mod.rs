//! Storage backends for the page tree and permission records.

pub mod memory;
