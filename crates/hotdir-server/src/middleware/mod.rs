//! Response header middleware.

pub(crate) mod headers;
