use std::{fmt, str::FromStr};

use yank_core::resume::ResumeRecord;

const MARKER_EXTENSION: &str = "part";

/// On-disk form of a resume record: `<absoluteResumeOffset>,<originalLimit>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker(pub ResumeRecord);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MalformedMarker;

impl FromStr for Marker {
    type Err = MalformedMarker;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (offset, limit) = s.split_once(',').ok_or(MalformedMarker)?;
        let parse = |v: &str| {
            if v.is_empty() || !v.bytes().all(|b| b.is_ascii_digit()) {
                return Err(MalformedMarker);
            }
            v.parse::<u64>().map_err(|_| MalformedMarker)
        };
        Ok(Marker(ResumeRecord {
            resume_offset: parse(offset)?,
            original_limit: parse(limit)?,
        }))
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.0.resume_offset, self.0.original_limit)
    }
}

/// Name of the marker holding chunk `chunk_id` of `file_name`.
pub fn marker_file_name(file_name: &str, chunk_id: u32) -> String {
    format!(
        "{fname}.{id}.{ext}",
        fname = file_name,
        id = chunk_id,
        ext = MARKER_EXTENSION
    )
}

/// Chunk id encoded in `name` if it is a marker of `file_name`, `None` for
/// anything else (including markers of other destinations).
pub fn parse_marker_file_name(name: &str, file_name: &str) -> Option<u32> {
    let id = name
        .strip_prefix(file_name)?
        .strip_prefix('.')?
        .strip_suffix(MARKER_EXTENSION)?
        .strip_suffix('.')?;
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    id.parse().ok()
}
