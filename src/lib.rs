//! Reader and writer for Axon Binary Format (ABF) electrophysiology
//! recordings.
//!
//! ABF is the file format patch-clamp acquisition software (pCLAMP,
//! Clampex) uses to store one or more analog channels of signal data
//! captured in sweeps, together with the instrument configuration that
//! was active while recording: protocol, per-channel gain/offset, the
//! stimulus epoch table, digital outputs, and user comment tags.
//!
//! Two on-disk dialects exist. ABF1 ([`abf1`]) is a flat, fixed-byte-offset
//! header followed directly by the data block. ABF2 ([`abf2`]) is a short
//! file header pointing at a Section Map, itself pointing at a collection
//! of variable-length typed sections. [`open`] auto-detects the dialect
//! from the file signature and returns a single [`model::Recording`] view
//! regardless of which one was on disk.
//!
//! ```no_run
//! let recording = abf::open("16d05007_vc_tags.abf")?;
//! let sweep = recording.set_sweep(0, 0, false)?;
//! println!("{} samples in {}", sweep.y.len(), sweep.label_y);
//! # Ok::<(), abf::Error>(())
//! ```

use std::fs::File;
use std::path::Path;

pub use crate::error::{Error, Result};
pub use crate::model::Recording;

/// ABF1 dialect support: flat fixed-offset header, writer.
pub mod abf1;

/// ABF2 dialect support: section-mapped header, section parsers.
pub mod abf2;

pub mod error;

/// Byte-level I/O: the random-access reader and the declarative
/// struct-map decoder both dialects are built from.
pub mod io;

/// The dialect-agnostic recording model: channels, DACs, the epoch
/// table, tags, and sweep/waveform reconstruction.
pub mod model;

/// Sweep sample decoding: interleaved block reads, int16/float32 paths.
pub mod sweep;

/// The 1-based string pool used by ABF2's `StringsSection`.
pub mod strings;

/// Construction-time options for [`open_with_options`].
///
/// `strict`, when set, turns a nonempty section the parser does not
/// otherwise model (see [`abf2::sections::read_sections`]) into a hard
/// [`Error::Format`](crate::error::Error::Format) instead of a logged
/// warning. ABF1 has no equivalent leniency point, so `strict` has no
/// effect when reading an ABF1 file.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOptions {
    pub strict: bool,
}

/// Opens an ABF1 or ABF2 file and builds its logical [`Recording`] view.
///
/// Reads and validates the whole header and section table up front;
/// sweep sample data is not touched until [`Recording::set_sweep`] is
/// called. A signature that matches neither dialect, or a structurally
/// inconsistent section map, fails the whole call — partial recordings
/// are never returned.
pub fn open(path: impl AsRef<Path>) -> Result<Recording> {
    open_with_options(path, ReadOptions::default())
}

/// Like [`open`], but with explicit [`ReadOptions`].
pub fn open_with_options(path: impl AsRef<Path>, options: ReadOptions) -> Result<Recording> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let len = file.metadata()?.len();
    let mut reader = io::reader::ByteReader::new(file, len);

    match abf2::header::read_header(&mut reader) {
        Ok((header, map)) => {
            log::debug!("{}: ABF2, file version {:?}", path.display(), header.version);
            let sections = abf2::sections::read_sections(&mut reader, &map, options.strict)?;
            model::from_abf2(path, header, map, sections)
        }
        Err(Error::UnsupportedDialect(_)) => {
            log::debug!("{}: ABF2 signature not found, trying ABF1", path.display());
            let header = abf1::header::read_header(&mut reader)?;
            model::from_abf1(path, header)
        }
        Err(e) => Err(e),
    }
}
