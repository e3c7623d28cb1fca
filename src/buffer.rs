// Per-console reading buffer: the user-space mirror of tty output, or of
// the screen snapshot in screen mode.
//
// All positions into the text (reading cursor, visual cursor, named marks)
// are indices, invalidated explicitly whenever the front of the buffer is
// trimmed.  An index equal to the text length is never valid; a None
// cursor means the reading position was lost to overflow.

/// Marks a through z, plus the left cut mark and the read-next mark.
pub const NUM_MARKS: usize = 28;
pub const MARK_LEFT: usize = 26;
pub const MARK_READNEXT: usize = 27;

/// Post-processing switches for incoming tty text.
pub const PP_CTRL_H: u8 = 0x1;
pub const PP_CRLF: u8 = 0x2;
pub const PP_STRIP_CTRL: u8 = 0x4;
pub const PP_STRIP_ESCB: u8 = 0x8;
pub const PP_DEFAULT: u8 = PP_CTRL_H | PP_CRLF | PP_STRIP_CTRL | PP_STRIP_ESCB;

pub const NOMEM_APOLOGY: &str = "The reader cannot allocate space for this console";

pub struct ReadingBuffer {
    pub text: Vec<u32>,
    pub cursor: Option<usize>,
    pub v_cursor: Option<usize>,
    pub attribs: Option<Vec<u8>>,
    pub marks: [Option<usize>; NUM_MARKS],
    /// sentinel buffer standing in for a console we could not allocate
    pub nomem: bool,
}

/// What a front-trim did to the buffer, so imark bookkeeping outside the
/// buffer can follow along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trim {
    None,
    /// `diff` code points were dropped from the front.
    Front(usize),
    /// everything previously in the buffer is gone
    Replaced,
}

impl Default for ReadingBuffer {
    fn default() -> Self {
        ReadingBuffer {
            text: Vec::new(),
            cursor: Some(0),
            v_cursor: None,
            attribs: None,
            marks: [None; NUM_MARKS],
            nomem: false,
        }
    }
}

impl ReadingBuffer {
    pub fn nomem_sentinel() -> ReadingBuffer {
        ReadingBuffer {
            text: NOMEM_APOLOGY.chars().map(|c| c as u32).collect(),
            cursor: Some(0),
            nomem: true,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Code point at `pos`, or 0 past the end (the sentinel convention).
    pub fn at(&self, pos: usize) -> u32 {
        self.text.get(pos).copied().unwrap_or(0)
    }

    pub fn clear(&mut self) {
        if self.nomem {
            return;
        }
        self.text.clear();
        self.cursor = Some(0);
        self.marks = [None; NUM_MARKS];
    }

    fn shift_positions(&mut self, diff: usize) {
        self.cursor = self.cursor.and_then(|c| c.checked_sub(diff));
        for m in &mut self.marks {
            *m = m.and_then(|p| p.checked_sub(diff));
        }
    }

    /// Append catch-up text, trimming from the front so the buffer never
    /// exceeds `max` code points.  Cursor and marks shift with the text or
    /// become None when the text under them is dropped.
    pub fn append(&mut self, new: &[u32], max: usize) -> Trim {
        if self.nomem {
            return Trim::None;
        }
        let nlen = self.text.len() + new.len();
        if nlen <= max {
            self.text.extend_from_slice(new);
            return Trim::None;
        }
        let diff = nlen - max;
        if diff >= self.text.len() {
            // complete replacement; keep only the newest `max` points
            let skip = new.len() - max.min(new.len());
            self.text.clear();
            self.text.extend_from_slice(&new[skip..]);
            self.cursor = None;
            self.marks = [None; NUM_MARKS];
            Trim::Replaced
        } else {
            self.text.drain(..diff);
            self.text.extend_from_slice(new);
            self.shift_positions(diff);
            Trim::Front(diff)
        }
    }

    /// Clean up freshly appended text in place: ^H erasure, CRLF → LF,
    /// drop other control characters, strip `ESC [ .. letter` sequences.
    /// `from` is where the new text started; processing backs up a little
    /// in case an escape sequence straddled two reads.
    pub fn postprocess(&mut self, from: usize, flags: u8) {
        if flags == 0 || self.nomem {
            return;
        }
        let mut s = from.saturating_sub(20);
        let mut t = s; // write position

        while s < self.text.len() {
            let c = self.text[s];

            if c == '\r' as u32
                && flags & PP_CRLF != 0
                && self.text.get(s + 1) == Some(&('\n' as u32))
            {
                s += 1;
                continue;
            }

            if c == 0x08 && flags & PP_CTRL_H != 0 {
                s += 1;
                if t == 0 {
                    continue; // nothing to erase
                }
                t -= 1;
                // pull back any cursor or mark that sat on the erased cell
                if let Some(cur) = self.cursor {
                    if cur >= t {
                        self.cursor = Some(if t > 0 { t - 1 } else { t });
                    }
                }
                for m in &mut self.marks {
                    if let Some(p) = *m {
                        if p >= t {
                            *m = if p == t + 1 { Some(t) } else { None };
                        }
                    }
                }
                continue;
            }

            if c == 0x1b
                && flags & PP_STRIP_ESCB != 0
                && self.text.get(s + 1) == Some(&('[' as u32))
            {
                let mut j = 2usize;
                while j < 20 {
                    match self.text.get(s + j) {
                        Some(&d) if d < 256 && (d as u8 as char).is_ascii_alphabetic() => break,
                        Some(_) => j += 1,
                        None => {
                            j = 20;
                            break;
                        }
                    }
                }
                if j < 20 {
                    // cursor repositioning usually starts a new block of text
                    if self.text[s + j] == 'H' as u32 {
                        self.text[t] = '\n' as u32;
                        t += 1;
                    }
                    s += j + 1;
                    continue;
                }
            }

            if c < ' ' as u32
                && !matches!(c, 0x07 | 0x08 | 0x09 | 0x0a | 0x0d)
                && flags & PP_STRIP_CTRL != 0
            {
                s += 1;
                continue;
            }

            self.text[t] = c;
            t += 1;
            s += 1;
        }

        self.text.truncate(t);
        if let Some(cur) = self.cursor {
            if cur > t {
                self.cursor = Some(t.saturating_sub(1));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u(s: &str) -> Vec<u32> {
        s.chars().map(|c| c as u32).collect()
    }

    fn text_of(b: &ReadingBuffer) -> String {
        b.text
            .iter()
            .map(|&c| char::from_u32(c).unwrap_or('?'))
            .collect()
    }

    #[test]
    fn append_within_budget_keeps_positions() {
        let mut b = ReadingBuffer::default();
        b.append(&u("hello "), 100);
        b.cursor = Some(3);
        b.marks[0] = Some(1);
        assert_eq!(b.append(&u("world"), 100), Trim::None);
        assert_eq!(b.cursor, Some(3));
        assert_eq!(b.marks[0], Some(1));
    }

    #[test]
    fn front_trim_shifts_and_nulls() {
        let mut b = ReadingBuffer::default();
        b.append(&u("0123456789"), 100);
        b.cursor = Some(8);
        b.marks[0] = Some(2);
        b.marks[1] = Some(9);
        assert_eq!(b.append(&u("abcde"), 10), Trim::Front(5));
        assert_eq!(text_of(&b), "56789abcde");
        assert_eq!(b.cursor, Some(3));
        assert_eq!(b.marks[0], None); // was in the dropped prefix
        assert_eq!(b.marks[1], Some(4));
    }

    #[test]
    fn oversized_append_replaces_everything() {
        let mut b = ReadingBuffer::default();
        b.append(&u("old"), 8);
        b.cursor = Some(1);
        let big: Vec<u32> = (0..20u32).map(|i| 'a' as u32 + i).collect();
        assert_eq!(b.append(&big, 8), Trim::Replaced);
        assert_eq!(b.len(), 8);
        assert_eq!(b.cursor, None);
        assert_eq!(b.at(7), 'a' as u32 + 19);
    }

    #[test]
    fn crlf_collapses() {
        let mut b = ReadingBuffer::default();
        b.append(&u("one\r\ntwo\r\n"), 100);
        b.postprocess(0, PP_DEFAULT);
        assert_eq!(text_of(&b), "one\ntwo\n");
    }

    #[test]
    fn backspace_erases_previous() {
        let mut b = ReadingBuffer::default();
        b.append(&u("cat\x08\x08ow"), 100);
        b.postprocess(0, PP_DEFAULT);
        assert_eq!(text_of(&b), "cow");
    }

    #[test]
    fn ansi_escape_stripped_and_home_makes_newline() {
        let mut b = ReadingBuffer::default();
        b.append(&u("a\x1b[2Jb\x1b[1;1Hc"), 100);
        b.postprocess(0, PP_DEFAULT);
        assert_eq!(text_of(&b), "ab\nc");
    }

    #[test]
    fn bare_controls_stripped_but_bell_kept() {
        let mut b = ReadingBuffer::default();
        b.append(&u("a\x01b\x07c"), 100);
        b.postprocess(0, PP_DEFAULT);
        assert_eq!(text_of(&b), "ab\x07c");
    }

    #[test]
    fn nomem_sentinel_refuses_data() {
        let mut b = ReadingBuffer::nomem_sentinel();
        let before = b.len();
        assert_eq!(b.append(&u("x"), 100), Trim::None);
        assert_eq!(b.len(), before);
        assert!(text_of(&b).contains("allocate"));
    }
}
