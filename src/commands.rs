// Speech commands and the reading engine.
//
// Config files bind chords to command names; the dispatcher validates
// the names at load time and the Reader executes them against the bridge
// and the synthesizer.  Continuous reading is driven by index markers:
// each completed sentence pulls the next one.

use crate::bind::{is_alpha, Bindings};
use crate::bridge::{Action, Bridge, KS_DEFAULT};
use crate::cursor::{Sentence, GS_ONEWORD, GS_REPEAT, GS_STOPLINE};
use crate::keynames::main_block_char;
use crate::proto::SS_SHIFT;
use crate::synth::{ParamError, Synth, SynthEvent};
use std::io;

/// A sentence is clipped to this many code points before dispatch.
const SENTENCE_LEN: usize = 250;
const WORD_LEN: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechCmd {
    Stop,
    Read,
    PrevChar,
    CurrChar,
    NextChar,
    PrevWord,
    CurrWord,
    NextWord,
    PrevLine,
    CurrLine,
    NextLine,
    StartLine,
    EndLine,
    StartBuf,
    EndBuf,
    SearchDown,
    SearchUp,
    Mark,
    Jump,
    Louder,
    Softer,
    Faster,
    Slower,
    Higher,
    Lower,
    Volume,
    Speed,
    Pitch,
    Voice,
    KeyEcho,
    AutoRead,
    Screen,
    Suspend,
    Bypass,
    ClearBuf,
    DumpBuf,
    Reload,
}

static NAMES: &[(&str, SpeechCmd)] = &[
    ("stop", SpeechCmd::Stop),
    ("read", SpeechCmd::Read),
    ("prevchar", SpeechCmd::PrevChar),
    ("currchar", SpeechCmd::CurrChar),
    ("nextchar", SpeechCmd::NextChar),
    ("prevword", SpeechCmd::PrevWord),
    ("currword", SpeechCmd::CurrWord),
    ("nextword", SpeechCmd::NextWord),
    ("prevline", SpeechCmd::PrevLine),
    ("currline", SpeechCmd::CurrLine),
    ("nextline", SpeechCmd::NextLine),
    ("startline", SpeechCmd::StartLine),
    ("endline", SpeechCmd::EndLine),
    ("startbuf", SpeechCmd::StartBuf),
    ("endbuf", SpeechCmd::EndBuf),
    ("searchdown", SpeechCmd::SearchDown),
    ("searchup", SpeechCmd::SearchUp),
    ("mark", SpeechCmd::Mark),
    ("jump", SpeechCmd::Jump),
    ("louder", SpeechCmd::Louder),
    ("softer", SpeechCmd::Softer),
    ("faster", SpeechCmd::Faster),
    ("slower", SpeechCmd::Slower),
    ("higher", SpeechCmd::Higher),
    ("lower", SpeechCmd::Lower),
    ("volume", SpeechCmd::Volume),
    ("speed", SpeechCmd::Speed),
    ("pitch", SpeechCmd::Pitch),
    ("voice", SpeechCmd::Voice),
    ("keyecho", SpeechCmd::KeyEcho),
    ("autoread", SpeechCmd::AutoRead),
    ("screen", SpeechCmd::Screen),
    ("suspend", SpeechCmd::Suspend),
    ("bypass", SpeechCmd::Bypass),
    ("clearbuf", SpeechCmd::ClearBuf),
    ("dumpbuf", SpeechCmd::DumpBuf),
    ("reload", SpeechCmd::Reload),
];

impl SpeechCmd {
    pub fn parse(s: &str) -> Option<SpeechCmd> {
        let s = s.trim();
        NAMES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(s))
            .map(|&(_, c)| c)
    }

    pub fn name(self) -> &'static str {
        NAMES
            .iter()
            .find(|&&(_, c)| c == self)
            .map(|&(n, _)| n)
            .expect("every command is named")
    }
}

/// The config-file syntax checker: canonicalize a command name or reject
/// the line.
pub fn check_syntax(s: &str) -> Option<String> {
    SpeechCmd::parse(s).map(|c| c.name().to_string())
}

/// Replace words through the dictionary (with suffix awareness) and
/// optionally expand punctuation into its spoken names, keeping the
/// index-marker offsets pointed at the source text.
pub fn prepare(sent: &Sentence, bindings: &Bindings, expand_punct: bool) -> Sentence {
    let mut out = Sentence::default();
    let n = sent.text.len();

    fn push_run(out: &mut Sentence, run: &[u32], ofs: u16) {
        for (k, &c) in run.iter().enumerate() {
            out.text.push(c);
            out.offsets.push(if k == 0 { ofs } else { 0 });
        }
    }

    let mut i = 0usize;
    while i < n {
        let c = sent.text[i];
        if is_alpha(c) {
            let start = i;
            while i < n && is_alpha(sent.text[i]) {
                i += 1;
            }
            let word = &sent.text[start..i];
            match bindings.replace_word(word) {
                Some(rep) => push_run(&mut out, &rep, sent.offsets[start]),
                None => push_run(&mut out, word, sent.offsets[start]),
            }
            continue;
        }
        if expand_punct && c != ' ' as u32 && c != '\n' as u32 && c != 0x07 {
            if let Some(name) = bindings.get_punc(c) {
                let spoken: Vec<u32> = name.chars().map(|ch| ch as u32).collect();
                if !out.text.is_empty() && out.text.last() != Some(&(' ' as u32)) {
                    push_run(&mut out, &[' ' as u32], 0);
                }
                push_run(&mut out, &spoken, sent.offsets[i]);
                push_run(&mut out, &[' ' as u32], 0);
                i += 1;
                continue;
            }
        }
        push_run(&mut out, &[c], sent.offsets[i]);
        i += 1;
    }

    out.offsets.push(*sent.offsets.last().unwrap_or(&0));
    out
}

/// What a pending single-key or string capture is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pending {
    MarkSet,
    MarkJump,
    Search { backward: bool },
    Volume,
    Speed,
    Pitch,
    Voice,
}

pub struct Reader {
    pub reading: bool,
    pub go_read: bool,
    pub auto_read: bool,
    pub echo_mode: bool,
    pub suspended: bool,
    pub reload_requested: bool,
    /// expand punctuation names inside sentences
    pub expand_punct: bool,
    pub pending: Option<Pending>,
    pub sent_base: usize,
    pub sent_consumed: usize,
}

impl Default for Reader {
    fn default() -> Self {
        Reader {
            reading: false,
            go_read: false,
            auto_read: true,
            echo_mode: false,
            suspended: false,
            reload_requested: false,
            expand_punct: false,
            pending: None,
            sent_base: 0,
            sent_consumed: 0,
        }
    }
}

impl Reader {
    /// Stop speech and forget any reading in progress.
    pub fn interrupt(&mut self, synth: &mut Synth) -> io::Result<()> {
        synth.shutup()?;
        self.reading = false;
        self.go_read = false;
        Ok(())
    }

    fn speak_text(&self, synth: &mut Synth, bridge: &Bridge, sent: &Sentence) -> io::Result<()> {
        let prepped = prepare(sent, &bridge.bindings, self.expand_punct);
        synth.say_string(&prepped.to_string_lossy())
    }

    fn speak_char(&self, synth: &mut Synth, bridge: &Bridge) -> io::Result<()> {
        let c = match bridge.buffer().cursor {
            Some(p) => bridge.buffer().at(p),
            None => 0,
        };
        if c == 0 {
            return Ok(());
        }
        synth.say_char(c, &bridge.bindings)
    }

    fn speak_word(&self, synth: &mut Synth, bridge: &mut Bridge) -> io::Result<()> {
        bridge.cursor_set();
        if !bridge.start_word() {
            return Ok(());
        }
        bridge.cursor_sync();
        if let Some(sent) = bridge.sentence(WORD_LEN, GS_ONEWORD | GS_REPEAT) {
            self.speak_text(synth, bridge, &sent)?;
        }
        Ok(())
    }

    fn speak_line(&self, synth: &mut Synth, bridge: &mut Bridge) -> io::Result<()> {
        bridge.cursor_set();
        bridge.start_line();
        bridge.cursor_sync();
        if let Some(sent) = bridge.sentence(SENTENCE_LEN, GS_STOPLINE | GS_REPEAT) {
            self.speak_text(synth, bridge, &sent)?;
        }
        Ok(())
    }

    /// Pull the sentence at the cursor and hand it to the synthesizer
    /// with index markers.  Clears `reading` when the buffer runs dry.
    pub fn read_next_part(&mut self, bridge: &mut Bridge, synth: &mut Synth) -> io::Result<()> {
        // step over the blank space between sentences
        let Some(mut cur) = bridge.buffer().cursor else {
            self.reading = false;
            return bridge.highbeeps();
        };
        loop {
            let c = bridge.buffer().at(cur);
            if matches!(c, 0x20 | 0x0a | 0x0d | 0x07) {
                cur += 1;
                continue;
            }
            break;
        }
        if cur >= bridge.buffer().len() {
            self.reading = false;
            return Ok(());
        }
        bridge.buffer_mut().cursor = Some(cur);

        let Some(sent) = bridge.sentence(SENTENCE_LEN, GS_STOPLINE | GS_REPEAT) else {
            self.reading = false;
            return Ok(());
        };
        if sent.text.is_empty() {
            self.reading = false;
            return Ok(());
        }
        let prepped = prepare(&sent, &bridge.bindings, self.expand_punct);
        self.sent_base = cur;
        self.sent_consumed = *prepped.offsets.last().unwrap_or(&0) as usize;
        synth.say_indexed(&prepped, cur)
    }

    /// An index marker resolved to a buffer position.
    pub fn on_synth_event(
        &mut self,
        ev: SynthEvent,
        bridge: &mut Bridge,
        synth: &mut Synth,
    ) -> io::Result<()> {
        let SynthEvent::Cursor { pos, last } = ev;
        if !bridge.set_cursor_clamped(pos) {
            // the spoken text scrolled away; stop chasing it
            synth.cancel();
            self.reading = false;
            return Ok(());
        }
        if last && self.reading {
            let next = self.sent_base + self.sent_consumed;
            bridge.set_cursor_clamped(next);
            self.read_next_part(bridge, synth)?;
        }
        Ok(())
    }

    /// Output landed on the foreground console.
    pub fn on_more_chars(
        &mut self,
        echo: u8,
        ch: u32,
        bridge: &mut Bridge,
        synth: &mut Synth,
    ) -> io::Result<()> {
        if self.suspended {
            return Ok(());
        }
        if echo == 1 && self.echo_mode {
            if let Some(c) = char::from_u32(ch) {
                if !c.is_control() {
                    self.interrupt(synth)?;
                    synth.say_char(ch, &bridge.bindings)?;
                    return Ok(());
                }
            }
        }
        if !self.reading && self.auto_read && !bridge.screen_mode() && echo == 0 {
            self.go_read = true;
        }
        Ok(())
    }

    /// Console switch kills any reading in progress.
    pub fn on_console_switch(
        &mut self,
        bridge: &mut Bridge,
        synth: &mut Synth,
    ) -> io::Result<()> {
        self.interrupt(synth)?;
        self.pending = None;
        synth.say_string(&format!("console {}", bridge.fgc))
    }

    fn param_feedback(&self, bridge: &mut Bridge, r: Result<(), ParamError>) -> io::Result<()> {
        match r {
            Ok(()) => Ok(()),
            Err(ParamError::Range) => bridge.highbeeps(),
            Err(ParamError::Unsupported) => bridge.buzz(),
        }
    }

    pub fn execute(
        &mut self,
        cmd: SpeechCmd,
        bridge: &mut Bridge,
        synth: &mut Synth,
    ) -> io::Result<()> {
        tracing::debug!(command = cmd.name(), "speech command");

        // Any command except suspend wakes us from suspension.
        if self.suspended {
            if cmd == SpeechCmd::Suspend {
                bridge.resume_keys();
                self.suspended = false;
                return synth.say_string("resuming");
            }
            return Ok(());
        }

        match cmd {
            SpeechCmd::Stop => self.interrupt(synth),

            SpeechCmd::Read => {
                self.reading = true;
                self.read_next_part(bridge, synth)
            }

            SpeechCmd::PrevChar | SpeechCmd::NextChar => {
                self.interrupt(synth)?;
                bridge.cursor_set();
                let ok = if cmd == SpeechCmd::PrevChar {
                    bridge.back()
                } else {
                    bridge.forward()
                };
                if !ok {
                    return bridge.highbeeps();
                }
                bridge.cursor_sync();
                self.speak_char(synth, bridge)
            }

            SpeechCmd::CurrChar => {
                self.interrupt(synth)?;
                self.speak_char(synth, bridge)
            }

            SpeechCmd::PrevWord | SpeechCmd::NextWord => {
                self.interrupt(synth)?;
                bridge.cursor_set();
                let ok = if cmd == SpeechCmd::PrevWord {
                    bridge.prev_word()
                } else {
                    bridge.next_word()
                };
                if !ok {
                    return bridge.highbeeps();
                }
                bridge.cursor_sync();
                self.speak_word(synth, bridge)
            }

            SpeechCmd::CurrWord => {
                self.interrupt(synth)?;
                self.speak_word(synth, bridge)
            }

            SpeechCmd::PrevLine | SpeechCmd::NextLine => {
                self.interrupt(synth)?;
                bridge.cursor_set();
                let ok = if cmd == SpeechCmd::PrevLine {
                    bridge.prev_line()
                } else {
                    bridge.next_line()
                };
                if !ok {
                    return bridge.highbeeps();
                }
                bridge.cursor_sync();
                self.speak_line(synth, bridge)
            }

            SpeechCmd::CurrLine => {
                self.interrupt(synth)?;
                self.speak_line(synth, bridge)
            }

            SpeechCmd::StartLine | SpeechCmd::EndLine => {
                self.interrupt(synth)?;
                bridge.cursor_set();
                if cmd == SpeechCmd::StartLine {
                    bridge.start_line();
                } else {
                    bridge.end_line();
                }
                bridge.cursor_sync();
                self.speak_char(synth, bridge)
            }

            SpeechCmd::StartBuf | SpeechCmd::EndBuf => {
                self.interrupt(synth)?;
                if cmd == SpeechCmd::StartBuf {
                    bridge.start_buf();
                } else {
                    bridge.end_buf();
                }
                bridge.cursor_sync();
                self.speak_line(synth, bridge)
            }

            SpeechCmd::SearchDown | SpeechCmd::SearchUp => {
                self.interrupt(synth)?;
                self.pending = Some(Pending::Search {
                    backward: cmd == SpeechCmd::SearchUp,
                });
                bridge.start_keystring(64, KS_DEFAULT)
            }

            SpeechCmd::Mark => {
                self.pending = Some(Pending::MarkSet);
                bridge.start_get1key()
            }

            SpeechCmd::Jump => {
                self.pending = Some(Pending::MarkJump);
                bridge.start_get1key()
            }

            SpeechCmd::Louder => {
                let r = synth.inc_volume();
                self.param_feedback(bridge, r)
            }
            SpeechCmd::Softer => {
                let r = synth.dec_volume();
                self.param_feedback(bridge, r)
            }
            SpeechCmd::Faster => {
                let r = synth.inc_speed();
                self.param_feedback(bridge, r)
            }
            SpeechCmd::Slower => {
                let r = synth.dec_speed();
                self.param_feedback(bridge, r)
            }
            SpeechCmd::Higher => {
                let r = synth.inc_pitch();
                self.param_feedback(bridge, r)
            }
            SpeechCmd::Lower => {
                let r = synth.dec_pitch();
                self.param_feedback(bridge, r)
            }

            SpeechCmd::Volume => {
                self.pending = Some(Pending::Volume);
                bridge.start_get1key()
            }
            SpeechCmd::Speed => {
                self.pending = Some(Pending::Speed);
                bridge.start_get1key()
            }
            SpeechCmd::Pitch => {
                self.pending = Some(Pending::Pitch);
                bridge.start_get1key()
            }
            SpeechCmd::Voice => {
                self.pending = Some(Pending::Voice);
                bridge.start_get1key()
            }

            SpeechCmd::KeyEcho => {
                self.echo_mode = !self.echo_mode;
                bridge.tone_onoff(self.echo_mode)
            }

            SpeechCmd::AutoRead => {
                self.auto_read = !self.auto_read;
                bridge.tone_onoff(self.auto_read)
            }

            SpeechCmd::Screen => {
                self.interrupt(synth)?;
                let on = !bridge.screen_mode();
                match bridge.set_screen_mode(on) {
                    Ok(()) => synth.say_string(if on { "screen mode" } else { "line mode" }),
                    Err(e) => {
                        tracing::warn!(error = %e, "screen snapshot failed");
                        bridge.buzz()
                    }
                }
            }

            SpeechCmd::Suspend => {
                self.interrupt(synth)?;
                bridge.suspend_keys(SpeechCmd::Suspend.name());
                self.suspended = true;
                synth.say_string("suspending")
            }

            SpeechCmd::Bypass => bridge.bypass(),

            SpeechCmd::ClearBuf => {
                self.interrupt(synth)?;
                bridge.clear_buffer();
                synth.say_string("buffer cleared")
            }

            SpeechCmd::DumpBuf => match bridge.dump_buffer("/tmp") {
                Ok(path) => synth.say_string(&format!("dumped to {}", path.display())),
                Err(e) => {
                    tracing::warn!(error = %e, "buffer dump failed");
                    bridge.buzz()
                }
            },

            SpeechCmd::Reload => {
                self.reload_requested = true;
                Ok(())
            }
        }
    }

    /// A single captured key arrived for a pending command.
    pub fn on_key1(
        &mut self,
        keycode: u8,
        ss: u8,
        bridge: &mut Bridge,
        synth: &mut Synth,
    ) -> io::Result<()> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };
        let ch = main_block_char(keycode, ss & SS_SHIFT != 0).map(|c| c as char);

        match pending {
            Pending::MarkSet | Pending::MarkJump => {
                let Some(c) = ch.filter(|c| c.is_ascii_lowercase()) else {
                    return bridge.bell();
                };
                let idx = (c as u8 - b'a') as usize;
                let ok = if pending == Pending::MarkSet {
                    bridge.set_mark(idx)
                } else {
                    bridge.jump_mark(idx)
                };
                if !ok {
                    return bridge.highbeeps();
                }
                if pending == Pending::MarkJump {
                    self.speak_line(synth, bridge)
                } else {
                    synth.say_string(&format!("mark {c}"))
                }
            }

            Pending::Volume | Pending::Speed | Pending::Pitch | Pending::Voice => {
                let Some(d) = ch.filter(|c| c.is_ascii_digit()) else {
                    return bridge.bell();
                };
                let n = (d as u8 - b'0') as i32;
                let r = match pending {
                    Pending::Volume => synth.set_volume(n),
                    Pending::Speed => synth.set_speed(n),
                    Pending::Pitch => synth.set_pitch(n),
                    _ => synth.set_voice(n),
                };
                self.param_feedback(bridge, r)
            }

            Pending::Search { .. } => Ok(()), // searches use keystring, not a key
        }
    }

    /// A collected string arrived (search text).
    pub fn on_keystring(
        &mut self,
        text: Option<String>,
        bridge: &mut Bridge,
        synth: &mut Synth,
    ) -> io::Result<()> {
        let Some(Pending::Search { backward }) = self.pending.take() else {
            return Ok(());
        };
        let Some(needle) = text.filter(|t| !t.is_empty()) else {
            return Ok(()); // aborted
        };
        bridge.cursor_set();
        if bridge.search(&needle, backward, false) {
            bridge.cursor_sync();
            self.speak_line(synth, bridge)
        } else {
            bridge.highbeeps()
        }
    }

    /// Route one bridge action.
    pub fn on_action(
        &mut self,
        action: &Action,
        bridge: &mut Bridge,
        synth: &mut Synth,
    ) -> io::Result<()> {
        match action {
            Action::ConsoleSwitch(_) => self.on_console_switch(bridge, synth),
            Action::MoreChars { echo, ch } => self.on_more_chars(*echo, *ch, bridge, synth),
            Action::Overflow { diff } => {
                synth.shift_imarks(*diff);
                if bridge.buffer().cursor.is_none() {
                    // the reading position scrolled off the back
                    self.reading = false;
                    bridge.highbeeps()
                } else {
                    Ok(())
                }
            }
            Action::Key1 { key, ss } => self.on_key1(*key, *ss, bridge, synth),
            Action::KeystringDone { text } => self.on_keystring(text.clone(), bridge, synth),
            Action::KsEcho(c) => {
                if self.echo_mode {
                    synth.say_char(*c as u32, &bridge.bindings)?;
                }
                Ok(())
            }
            Action::Key { key, ss, .. } => {
                // resolved by the caller against the bindings table
                tracing::trace!(key = *key, ss = *ss, "unbound key action reached reader");
                Ok(())
            }
        }
    }
}
