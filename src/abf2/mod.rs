//! ABF2 dialect: section-mapped header.
//!
//! - **Header & Section Map** ([`header`]): the 76-byte file header and
//!   the 18-entry section map that follows it.
//! - **Section Parsers** ([`sections`]): the modeled sections (protocol,
//!   ADC, DAC, epoch table, tags, synch array, strings, data) read
//!   through the section map.
pub mod header;
pub mod sections;
