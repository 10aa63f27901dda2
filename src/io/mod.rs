//! Byte-level I/O utilities.
//!
//! - **Byte Reader** ([`reader`]): random-access little-endian primitive
//!   decoding against a file-backed or in-memory buffer.
//! - **Struct Map Decoder** ([`struct_map`]): declarative `(name, format)`
//!   field lists read sequentially or repeated across a section.
pub mod reader;
pub mod struct_map;
