// Speech synthesizer driver: framing on the way out, index-marker parsing
// on the way back.
//
// A sentence goes out with an index marker after each token.  As the unit
// speaks, it hands the markers back; each one resolves to a buffer
// position through the imark table, and the reading cursor follows the
// speech.  The last marker of an utterance ends it.

mod style;
pub mod transport;

pub use style::Style;

use crate::bind::Bindings;
use crate::cursor::Sentence;
use std::io::{self, Write};
use std::os::unix::io::RawFd;
use std::process::ChildStdin;

/// Labels ride in one of two ranges, alternating per utterance, so a
/// late marker from an interrupted sentence cannot be mistaken for one
/// from the current sentence.
const LABEL_RANGE_A: u8 = 1;
const LABEL_RANGE_B: u8 = 51;

enum Sink {
    File(std::fs::File),
    Child(ChildStdin),
    Mem(Vec<u8>),
}

impl Sink {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self {
            Sink::File(f) => f.write_all(bytes),
            Sink::Child(c) => c.write_all(bytes),
            Sink::Mem(v) => {
                v.extend_from_slice(bytes);
                Ok(())
            }
        }
    }
}

/// Something the returned bytes resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthEvent {
    /// The unit reached a marker: move the reading cursor here.  `last`
    /// means the utterance is finished.
    Cursor { pos: usize, last: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamError {
    /// already at the end of the 0..9 scale
    Range,
    /// this style has no such knob
    Unsupported,
}

pub struct Synth {
    pub style: Style,
    out: Sink,
    /// fd polled for write readiness; None means always ready
    out_fd: Option<RawFd>,

    pub volume: i32,
    pub speed: i32,
    pub pitch: i32,
    pub voice: i32,

    imark_start: Option<usize>,
    imark_loc: Vec<u16>,
    imark_first: u8,
    use_range_b: bool,
    /// BNS and Accent return unlabeled control-F acks; count them
    bns_acks: usize,

    carry: Vec<u8>,
}

impl Synth {
    fn with_sink(style: Style, out: Sink, out_fd: Option<RawFd>) -> Synth {
        let (volume, speed, pitch, voice) = style.start_values();
        Synth {
            style,
            out,
            out_fd,
            volume,
            speed,
            pitch,
            voice,
            imark_start: None,
            imark_loc: Vec::new(),
            imark_first: LABEL_RANGE_A,
            use_range_b: false,
            bns_acks: 0,
            carry: Vec::new(),
        }
    }

    pub fn over_file(style: Style, file: std::fs::File, fd: RawFd) -> Synth {
        Synth::with_sink(style, Sink::File(file), Some(fd))
    }

    pub fn over_child(style: Style, stdin: ChildStdin, fd: RawFd) -> Synth {
        Synth::with_sink(style, Sink::Child(stdin), Some(fd))
    }

    /// Collects output in memory; tests read it back with take_output.
    pub fn memory(style: Style) -> Synth {
        Synth::with_sink(style, Sink::Mem(Vec::new()), None)
    }

    pub fn take_output(&mut self) -> Vec<u8> {
        match &mut self.out {
            Sink::Mem(v) => std::mem::take(v),
            _ => Vec::new(),
        }
    }

    fn cr(&mut self) -> io::Result<()> {
        let bytes = self.style.cr_bytes().to_vec();
        self.out.write_all(&bytes)
    }

    fn write_codepoints(&mut self, text: &[u32]) -> io::Result<()> {
        let mut bytes = Vec::with_capacity(text.len());
        for &c in text {
            match char::from_u32(c) {
                Some(ch) => {
                    let mut b = [0u8; 4];
                    bytes.extend_from_slice(ch.encode_utf8(&mut b).as_bytes());
                }
                None => bytes.push(b'?'),
            }
        }
        self.out.write_all(&bytes)
    }

    /// Send a short phrase with no markers; assumed spoken immediately.
    pub fn say_string(&mut self, s: &str) -> io::Result<()> {
        if !s.is_empty() {
            self.out.write_all(s.as_bytes())?;
        }
        self.cr()
    }

    /// Speak one character through its pronunciation, if it has one.
    pub fn say_char(&mut self, c: u32, bindings: &Bindings) -> io::Result<()> {
        match bindings.get_punc(c) {
            Some(name) => {
                let name = name.to_string();
                self.out.write_all(name.as_bytes())?;
            }
            None => self.write_codepoints(&[c])?,
        }
        self.cr()
    }

    /// Send a prepared sentence with an index marker after each token.
    /// `cursor_pos` is the reading cursor at the moment of extraction;
    /// markers resolve relative to it as they come back.
    pub fn say_indexed(&mut self, sentence: &Sentence, cursor_pos: usize) -> io::Result<()> {
        // token starts: position 0 plus every non-zero offset
        let mut starts: Vec<(usize, u16)> = Vec::new();
        if !sentence.text.is_empty() {
            starts.push((0, sentence.offsets[0]));
            for (i, &o) in sentence.offsets.iter().enumerate().take(sentence.text.len()).skip(1) {
                if o != 0 {
                    starts.push((i, o));
                }
            }
        }

        self.imark_start = Some(cursor_pos);
        self.imark_loc.clear();
        self.bns_acks = 0;
        self.imark_first = if self.style.bare_index_ack() {
            0
        } else {
            self.use_range_b = !self.use_range_b;
            if self.use_range_b {
                LABEL_RANGE_B
            } else {
                LABEL_RANGE_A
            }
        };

        let mut label = self.imark_first;
        for (k, &(start, loc)) in starts.iter().enumerate() {
            let end = starts
                .get(k + 1)
                .map(|&(p, _)| p)
                .unwrap_or(sentence.text.len());
            self.write_codepoints(&sentence.text[start..end])?;
            self.imark_loc.push(loc);
            // A DoubleTalk chokes on a marker right after a one-or-two
            // letter leading word; it still gets counted.
            let skip = self.style == Style::DoubleTalk && end <= 2 && k + 1 < starts.len();
            if !skip {
                let bytes = self.style.index_bytes(label);
                self.out.write_all(&bytes)?;
            }
            label = label.saturating_add(1);
        }

        self.cr()?;
        if self.imark_loc.is_empty() || self.style == Style::Generic {
            // nothing will come back; treat it like a plain phrase
            self.imark_start = None;
            self.imark_loc.clear();
        }
        tracing::debug!(
            marks = self.imark_loc.len(),
            first = self.imark_first,
            "sentence dispatched"
        );
        Ok(())
    }

    /// An utterance is in flight and not yet fully acknowledged.
    pub fn speaking(&self) -> bool {
        self.imark_start.is_some()
    }

    /// The first label of the current utterance; what the unit will echo
    /// back for the opening token.
    pub fn first_label(&self) -> u8 {
        self.imark_first
    }

    /// Would the unit block if we sent more, or is it mid-sentence?
    pub fn still_talking(&self) -> bool {
        if let Some(fd) = self.out_fd {
            if !write_ready(fd) {
                return true;
            }
        }
        self.imark_start.is_some()
    }

    /// Silence now.  Also abandons the in-flight markers.
    pub fn shutup(&mut self) -> io::Result<()> {
        let b = [self.style.interrupt_byte()];
        self.out.write_all(&b)?;
        self.cancel();
        Ok(())
    }

    /// Forget the in-flight utterance without touching the wire.
    pub fn cancel(&mut self) {
        self.imark_start = None;
        self.bns_acks = 0;
    }

    /// Feed bytes read from the synthesizer; resolved markers come back
    /// as cursor events.
    pub fn receive(&mut self, bytes: &[u8]) -> Vec<SynthEvent> {
        self.carry.extend_from_slice(bytes);
        let mut events = Vec::new();
        let mut i = 0usize;

        while i < self.carry.len() {
            let c = self.carry[i];
            match self.style {
                Style::DoubleTalk | Style::Espeakup => {
                    if (1..=99).contains(&c) {
                        let label = c;
                        i += 1;
                        self.resolve(label, &mut events);
                        continue;
                    }
                    tracing::trace!(byte = c, "synth byte ignored");
                    i += 1;
                }
                Style::DecExpress | Style::DecPc => {
                    if c == 0x1b {
                        // ESC P 0 ; 3 2 ; <n> z
                        match parse_dec_frame(&self.carry[i..]) {
                            DecFrame::Need => break, // wait for more bytes
                            DecFrame::Mark(label, used) => {
                                i += used;
                                self.resolve(label, &mut events);
                                continue;
                            }
                            DecFrame::Junk => {
                                i += 1;
                            }
                        }
                        continue;
                    }
                    i += 1;
                }
                Style::Bns | Style::Ace => {
                    if c == 0x06 {
                        i += 1;
                        self.bns_acks += 1;
                        let idx = self.bns_acks - 1;
                        self.apply_mark(idx, &mut events);
                        continue;
                    }
                    i += 1;
                }
                Style::Generic => {
                    i += 1;
                }
            }
        }

        self.carry.drain(..i);
        events
    }

    fn resolve(&mut self, label: u8, events: &mut Vec<SynthEvent>) {
        tracing::debug!(label, "index marker returned");
        let idx = match label.checked_sub(self.imark_first) {
            Some(d) => d as usize,
            None => return,
        };
        self.apply_mark(idx, events);
    }

    fn apply_mark(&mut self, idx: usize, events: &mut Vec<SynthEvent>) {
        let Some(start) = self.imark_start else {
            return;
        };
        if idx >= self.imark_loc.len() {
            return;
        }
        let pos = start + self.imark_loc[idx] as usize;
        let last = idx == self.imark_loc.len() - 1;
        if last {
            self.imark_start = None;
            self.bns_acks = 0;
        }
        events.push(SynthEvent::Cursor { pos, last });
    }

    // ---- parameters ----

    pub fn set_volume(&mut self, n: i32) -> Result<(), ParamError> {
        let cmd = self.style.volume_cmd(n).ok_or(if (0..=9).contains(&n) {
            ParamError::Unsupported
        } else {
            ParamError::Range
        })?;
        let _ = self.out.write_all(&cmd);
        self.volume = n;
        Ok(())
    }

    pub fn set_speed(&mut self, n: i32) -> Result<(), ParamError> {
        let cmd = self.style.speed_cmd(n).ok_or(if (0..=9).contains(&n) {
            ParamError::Unsupported
        } else {
            ParamError::Range
        })?;
        let _ = self.out.write_all(&cmd);
        self.speed = n;
        Ok(())
    }

    pub fn set_pitch(&mut self, n: i32) -> Result<(), ParamError> {
        let cmd = self.style.pitch_cmd(n).ok_or(if (0..=9).contains(&n) {
            ParamError::Unsupported
        } else {
            ParamError::Range
        })?;
        let _ = self.out.write_all(&cmd);
        self.pitch = n;
        Ok(())
    }

    pub fn set_voice(&mut self, v: i32) -> Result<(), ParamError> {
        let (cmd, pitch) = self.style.voice_cmd(v).ok_or(ParamError::Unsupported)?;
        let _ = self.out.write_all(&cmd);
        let _ = self.cr();
        self.voice = v;
        if let Some(p) = pitch {
            self.pitch = p;
        }
        Ok(())
    }

    pub fn inc_volume(&mut self) -> Result<(), ParamError> {
        if self.volume >= 9 {
            return Err(ParamError::Range);
        }
        self.set_volume(self.volume + 1)
    }

    pub fn dec_volume(&mut self) -> Result<(), ParamError> {
        if self.volume <= 0 {
            return Err(ParamError::Range);
        }
        self.set_volume(self.volume - 1)
    }

    pub fn inc_speed(&mut self) -> Result<(), ParamError> {
        if self.speed >= 9 {
            return Err(ParamError::Range);
        }
        self.set_speed(self.speed + 1)
    }

    pub fn dec_speed(&mut self) -> Result<(), ParamError> {
        if self.speed <= 0 {
            return Err(ParamError::Range);
        }
        self.set_speed(self.speed - 1)
    }

    pub fn inc_pitch(&mut self) -> Result<(), ParamError> {
        if self.pitch >= 9 {
            return Err(ParamError::Range);
        }
        self.set_pitch(self.pitch + 1)
    }

    pub fn dec_pitch(&mut self) -> Result<(), ParamError> {
        if self.pitch <= 0 {
            return Err(ParamError::Range);
        }
        self.set_pitch(self.pitch - 1)
    }

    /// The front of the buffer was trimmed by `diff`; keep the in-flight
    /// markers pointing at the same text, or drop them if it scrolled off.
    pub fn shift_imarks(&mut self, diff: Option<usize>) {
        match (self.imark_start, diff) {
            (Some(start), Some(d)) => {
                self.imark_start = start.checked_sub(d);
            }
            (Some(_), None) => self.imark_start = None,
            _ => {}
        }
    }
}

enum DecFrame {
    /// incomplete; wait for more bytes
    Need,
    Mark(u8, usize),
    Junk,
}

/// DEC index acknowledgement: `ESC P 0 ; 3 2 ; <n> z` with a one or two
/// digit label.
fn parse_dec_frame(b: &[u8]) -> DecFrame {
    const HEAD: &[u8] = b"\x1bP0;32;";
    if b.len() < 8 {
        return DecFrame::Need;
    }
    if &b[..7] != HEAD {
        return DecFrame::Junk;
    }
    if b[7] == b'z' {
        return DecFrame::Mark(0, 8);
    }
    if b[7].is_ascii_digit() {
        if b.len() < 9 {
            return DecFrame::Need;
        }
        if b[8] == b'z' {
            return DecFrame::Mark(b[7] - b'0', 9);
        }
        if b[8].is_ascii_digit() {
            if b.len() < 10 {
                return DecFrame::Need;
            }
            if b[9] == b'z' {
                return DecFrame::Mark((b[7] - b'0') * 10 + (b[8] - b'0'), 10);
            }
        }
    }
    DecFrame::Junk
}

fn write_ready(fd: RawFd) -> bool {
    let mut pfd = libc::pollfd { fd, events: libc::POLLOUT, revents: 0 };
    // SAFETY: poll reads one valid pollfd struct and a zero timeout.
    let rc = unsafe { libc::poll(&mut pfd, 1, 0) };
    if rc < 0 {
        return true; // treat errors as ready; the write will report them
    }
    rc > 0 && pfd.revents & libc::POLLOUT != 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::Sentence;

    fn sent(text: &str, offsets: Vec<u16>) -> Sentence {
        Sentence { text: text.chars().map(|c| c as u32).collect(), offsets }
    }

    // "Hello world!" as two tokens at source offsets 0 and 6
    fn hello() -> Sentence {
        let mut offsets = vec![0u16; 12];
        offsets[6] = 6;
        offsets.push(12);
        sent("Hello world!", offsets)
    }

    #[test]
    fn doubletalk_index_flow() {
        let mut sy = Synth::memory(Style::DoubleTalk);
        sy.say_indexed(&hello(), 40).unwrap();
        let wire = sy.take_output();
        let s = String::from_utf8_lossy(&wire);
        assert!(s.contains("Hello "));
        assert!(s.contains("i"));
        assert!(s.ends_with('\r'));

        // first marker: cursor to the sentence start
        let ev = sy.receive(&[sy.imark_first]);
        assert_eq!(ev, vec![SynthEvent::Cursor { pos: 40, last: false }]);
        assert!(sy.speaking());
        // second marker: cursor forward 6, utterance done
        let ev = sy.receive(&[sy.imark_first + 1]);
        assert_eq!(ev, vec![SynthEvent::Cursor { pos: 46, last: true }]);
        assert!(!sy.speaking());
    }

    #[test]
    fn dec_wire_format_and_parsing() {
        let mut sy = Synth::memory(Style::DecExpress);
        sy.say_indexed(&hello(), 0).unwrap();
        let first = sy.imark_first;
        let wire = String::from_utf8_lossy(&sy.take_output()).into_owned();
        assert!(wire.contains(&format!("[:i r {first}]")));
        assert!(wire.contains(&format!("[:i r {}]", first + 1)));
        assert!(wire.ends_with("\x0b\r"));

        let ack1 = format!("\x1bP0;32;{first}z");
        let ev = sy.receive(ack1.as_bytes());
        assert_eq!(ev, vec![SynthEvent::Cursor { pos: 0, last: false }]);
        let ack2 = format!("\x1bP0;32;{}z", first + 1);
        let ev = sy.receive(ack2.as_bytes());
        assert_eq!(ev, vec![SynthEvent::Cursor { pos: 6, last: true }]);
    }

    #[test]
    fn dec_frames_survive_partial_reads() {
        let mut sy = Synth::memory(Style::DecExpress);
        sy.say_indexed(&hello(), 0).unwrap();
        let first = sy.imark_first;
        let ack = format!("\x1bP0;32;{first}z");
        let (a, b) = ack.as_bytes().split_at(4);
        assert!(sy.receive(a).is_empty());
        let ev = sy.receive(b);
        assert_eq!(ev, vec![SynthEvent::Cursor { pos: 0, last: false }]);
    }

    #[test]
    fn bns_counts_bare_acks() {
        let mut sy = Synth::memory(Style::Bns);
        sy.say_indexed(&hello(), 10).unwrap();
        let ev = sy.receive(&[0x06]);
        assert_eq!(ev, vec![SynthEvent::Cursor { pos: 10, last: false }]);
        let ev = sy.receive(&[0x06]);
        assert_eq!(ev, vec![SynthEvent::Cursor { pos: 16, last: true }]);
    }

    #[test]
    fn late_marker_from_previous_utterance_is_ignored() {
        let mut sy = Synth::memory(Style::DoubleTalk);
        sy.say_indexed(&hello(), 0).unwrap();
        let old_first = sy.imark_first;
        sy.shutup().unwrap();
        sy.say_indexed(&hello(), 0).unwrap();
        assert_ne!(sy.imark_first, old_first);
        // the old range resolves to an out-of-range index now
        let ev = sy.receive(&[old_first]);
        assert!(ev.is_empty() || sy.imark_first < old_first);
    }

    #[test]
    fn shutup_cancels_markers() {
        let mut sy = Synth::memory(Style::DoubleTalk);
        sy.say_indexed(&hello(), 0).unwrap();
        sy.shutup().unwrap();
        assert!(!sy.speaking());
        let first = sy.imark_first;
        assert!(sy.receive(&[first]).is_empty());
        let wire = sy.take_output();
        assert_eq!(*wire.last().unwrap(), 24);
    }

    #[test]
    fn trim_shifts_inflight_markers() {
        let mut sy = Synth::memory(Style::DoubleTalk);
        sy.say_indexed(&hello(), 100).unwrap();
        sy.shift_imarks(Some(30));
        let first = sy.imark_first;
        let ev = sy.receive(&[first]);
        assert_eq!(ev, vec![SynthEvent::Cursor { pos: 70, last: false }]);
        // trimmed past the start: markers die
        sy.shift_imarks(Some(1000));
        assert!(sy.receive(&[first + 1]).is_empty());
    }

    #[test]
    fn parameters_write_style_strings() {
        let mut sy = Synth::memory(Style::DoubleTalk);
        sy.set_volume(7).unwrap();
        assert_eq!(sy.take_output(), b"\x017v".to_vec());
        assert_eq!(sy.volume, 7);
        sy.volume = 9;
        assert_eq!(sy.inc_volume(), Err(ParamError::Range));

        let mut sy = Synth::memory(Style::Generic);
        assert_eq!(sy.set_volume(5), Err(ParamError::Unsupported));
    }

    #[test]
    fn say_char_uses_pronunciation() {
        let b = Bindings::default();
        let mut sy = Synth::memory(Style::DoubleTalk);
        sy.say_char('}' as u32, &b).unwrap();
        assert_eq!(sy.take_output(), b"right brace\r".to_vec());
        sy.say_char('k' as u32, &b).unwrap();
        assert_eq!(sy.take_output(), b"k\r".to_vec());
    }
}
