// Common Vorbis comment field names

/// Field names as written by broadcast software. Matching is case-insensitive.
pub struct VorbisFields;

impl VorbisFields {
    pub const TITLE: &str = "TITLE";
    pub const ARTIST: &str = "ARTIST";
}
