//! CLI command implementations.

pub(crate) mod serve;

pub(crate) use serve::{LogFormat, ServeArgs};
