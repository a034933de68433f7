//! Small shared helpers.

pub mod regex_ext;
