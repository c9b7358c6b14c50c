//! `mudio`: the byte-level edge of the world server.
//!
//! - `telnet`: strips 3-byte `IAC <cmd> <opt>` control sequences from the raw stream,
//! - `line`: LF/CRLF line framing over the filtered stream (`BytesMut::split_to(..).freeze()`),
//! - `latin1`: one-byte-per-char text conversion used on the wire.

pub mod latin1;
pub mod line;
pub mod telnet;
