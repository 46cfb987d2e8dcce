// chainsong MIDI boundary
//
// Everything that touches Standard MIDI File bytes lives here, keeping the
// engine free of file formats:
// - file.rs: SMF parsing into raw per-track event streams, and writing
//   assembled tracks back out
// - demo.rs: built-in demo melody fabrication
// - error.rs: boundary error types wrapping IO, parse, and engine errors
//
// Live port enumeration and playback are deliberately out of scope; the
// pipeline ends at a written .mid file.

pub mod demo;
pub mod error;
pub mod file;

pub use error::{MidiError, Result};
pub use file::{NamedRawTrack, load_tracks, track_to_smf_bytes, write_track};
