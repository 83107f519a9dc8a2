//! ELM327 reply framing. A reply is everything up to the `>` prompt

use super::Framer;

/// Longest reply kept before the prompt, 3 characters per byte of a 4KiB frame plus slack
const MAX_LINE: usize = 4096 * 3 + 7;

/// Prompt terminated line state machine.
///
/// Carriage returns become spaces and other non printable characters are dropped. The emitted
/// line is trimmed. A line longer than [MAX_LINE] is discarded whole at its prompt
#[derive(Debug, Clone, Default)]
pub struct ElmFramer {
    line: String,
    overflowed: bool,
}

impl Framer for ElmFramer {
    type Frame = String;

    fn step(mut self, byte: u8) -> (Self, Option<String>) {
        match byte {
            b'>' if self.overflowed => {
                log::warn!("Discarding reply longer than {MAX_LINE} characters");
                (Self::default(), None)
            }
            b'>' => {
                let line = self.line.trim().to_string();
                (Self::default(), Some(line))
            }
            _ if self.overflowed => (self, None),
            b'\r' | 32..=126 if self.line.len() >= MAX_LINE => {
                self.line.clear();
                self.overflowed = true;
                (self, None)
            }
            b'\r' => {
                self.line.push(' ');
                (self, None)
            }
            32..=126 => {
                self.line.push(byte as char);
                (self, None)
            }
            _ => (self, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::frames;

    #[test]
    fn lines_split_on_prompt() {
        let raw = b"ELM327 v2.1\r\r>OK\r\n>\r6CF0107C01\r6CF0107C02\r\r>";
        let lines: Vec<String> = frames::<ElmFramer, _>(raw.iter().copied()).collect();
        assert_eq!(lines, vec!["ELM327 v2.1", "OK", "6CF0107C01 6CF0107C02"]);
    }

    #[test]
    fn overlong_line_is_discarded() {
        let mut raw = vec![b'A'; MAX_LINE + 10];
        raw.extend_from_slice(b"\r>OK\r>");
        let lines: Vec<String> = frames::<ElmFramer, _>(raw.into_iter()).collect();
        assert_eq!(lines, vec!["OK"]);

        let mut raw = vec![b'B'; MAX_LINE];
        raw.push(b'>');
        let lines: Vec<String> = frames::<ElmFramer, _>(raw.into_iter()).collect();
        assert_eq!(lines[0].len(), MAX_LINE);
    }

    #[test]
    fn unterminated_line_is_not_emitted() {
        let lines: Vec<String> = frames::<ElmFramer, _>(b"NO DA".iter().copied()).collect();
        assert!(lines.is_empty());
    }
}
