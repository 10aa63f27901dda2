//! ABF1 dialect: flat fixed-offset header and writer.
//!
//! - **Header** ([`header`]): the ~2 KiB fixed-offset header and its
//!   16-entry per-channel arrays.
//! - **Writer** ([`writer`]): synthesizes a minimal valid ABF1 file from
//!   an in-memory sample array.
pub mod header;
pub mod writer;
