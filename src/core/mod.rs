// src/core/mod.rs

/// Path checks for user input, plus file name helpers.
pub mod paths;
