//! Telnet control-sequence stripping.
//!
//! Deliberately simpler than a full IAC state machine: byte 255 starts a control
//! sequence and the next two bytes are dropped with it, whatever they are. No
//! negotiation replies are generated; the peer's requests simply go unanswered.

pub const IAC: u8 = 255;

/// Bytes that follow `IAC` and belong to the same control sequence.
const SEQ_TAIL: u8 = 2;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum State {
    #[default]
    Data,
    /// Inside a control sequence; this many bytes are still to be dropped.
    Control { remaining: u8 },
}

#[derive(Debug, Default)]
pub struct ControlFilter {
    state: State,
}

impl ControlFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a control sequence is open, i.e. the last chunk ended mid-sequence.
    pub fn in_sequence(&self) -> bool {
        self.state != State::Data
    }

    /// Filter a chunk, appending the surviving bytes to `out`.
    ///
    /// State carries across calls, so a sequence split over two reads is still removed.
    pub fn filter_into(&mut self, chunk: &[u8], out: &mut Vec<u8>) {
        out.reserve(chunk.len());
        for &b in chunk {
            match self.state {
                State::Data => {
                    if b == IAC {
                        self.state = State::Control {
                            remaining: SEQ_TAIL,
                        };
                    } else {
                        out.push(b);
                    }
                }
                State::Control { remaining } => {
                    self.state = if remaining > 1 {
                        State::Control {
                            remaining: remaining - 1,
                        }
                    } else {
                        State::Data
                    };
                }
            }
        }
    }

    pub fn filter(&mut self, chunk: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(chunk.len());
        self.filter_into(chunk, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_plain_data() {
        let mut f = ControlFilter::new();
        assert_eq!(f.filter(b"hello\n"), b"hello\n");
        assert!(!f.in_sequence());
    }

    #[test]
    fn strips_will_echo() {
        let mut f = ControlFilter::new();
        assert_eq!(f.filter(&[b'A', 255, 251, 1, b'B']), vec![b'A', b'B']);
    }

    #[test]
    fn strips_back_to_back_sequences() {
        let mut f = ControlFilter::new();
        let d = f.filter(&[255, 253, 1, 255, 251, 3, b'x']); // IAC DO 1, IAC WILL 3
        assert_eq!(d, vec![b'x']);
    }

    #[test]
    fn handles_sequence_split_across_calls() {
        let mut f = ControlFilter::new();
        assert_eq!(f.filter(&[b'a', 255]), vec![b'a']);
        assert!(f.in_sequence());
        assert!(f.filter(&[253]).is_empty());
        assert!(f.in_sequence());
        assert_eq!(f.filter(&[24, b'z']), vec![b'z']);
        assert!(!f.in_sequence());
    }

    #[test]
    fn doubled_iac_consumes_following_byte() {
        // No IAC-IAC escape: the second 255 and the byte after it are both dropped.
        let mut f = ControlFilter::new();
        assert_eq!(f.filter(&[255, 255, b'a', b'b']), vec![b'b']);
    }
}
