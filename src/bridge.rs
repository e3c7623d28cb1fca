// The user-space side of the intercept device: reconstructs a reading
// buffer per console, dispatches events, expands macros, and carries the
// temp-cursor API the reading commands are built on.
//
// The original design called back into application handlers from inside
// the event loop; here events() returns a list of actions instead and the
// main loop acts on them, which is what makes the no-reentrancy rule
// (handlers must not call events()) impossible to break.

use crate::bind::{build_mkcode, Bindings, ConfigError, KeyOp, Lang, SyntaxChecker};
use crate::buffer::{ReadingBuffer, Trim, NUM_MARKS, PP_DEFAULT};
use crate::cursor::{self, Sentence};
use crate::intercept::InterceptState;
use crate::keynames::main_block_char;
use crate::proto::{self, cmd, Event, KEY_T, LED_CAPSLOCK, SS_ALT, SS_CTRL, SS_SHIFT};
use crate::screen;
use input_linux_sys as key;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::unix::fs::FileExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::PathBuf;

/// Reading buffers keep this many code points of tty history.
pub const TTY_LOG_SIZE: usize = 50_000;
const MAX_CONSOLES: usize = 63;

/// Properties for collecting a typed string.
pub const KS_BADBELL: u8 = 0x1;
pub const KS_BADSTOP: u8 = 0x2;
pub const KS_BOUNDARYBEEPS: u8 = 0x4;
pub const KS_BOUNDARYSTOP: u8 = 0x8;
pub const KS_GOODCLICK: u8 = 0x10;
pub const KS_ESCCR: u8 = 0x20;
pub const KS_BACKUP: u8 = 0x40;
pub const KS_DEFAULT: u8 = KS_BADBELL | KS_GOODCLICK | KS_BOUNDARYBEEPS | KS_ESCCR | KS_BACKUP;

/// What the main loop should do about a batch of device events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// a captured chord bound to a speech command (macros are expanded
    /// internally and never surface)
    Key { key: u8, ss: u8, leds: u8 },
    /// the foreground console changed
    ConsoleSwitch(usize),
    /// a character hit the foreground log
    MoreChars { echo: u8, ch: u32 },
    /// the foreground buffer was trimmed; None means wholesale replacement
    Overflow { diff: Option<usize> },
    /// keystring collection finished; None means aborted
    KeystringDone { text: Option<String> },
    /// single-key capture finished
    Key1 { key: u8, ss: u8 },
    /// echo a character the user typed into a keystring
    KsEcho(char),
}

/// The device: a real fd, or the in-process intercept state machine used
/// by tests and the config-check mode.
pub enum DeviceLink {
    Fd(File),
    Sim(InterceptState),
}

impl DeviceLink {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self {
            DeviceLink::Fd(f) => f.write_all(bytes),
            DeviceLink::Sim(st) => {
                st.write(bytes);
                Ok(())
            }
        }
    }

    fn read_batch(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            DeviceLink::Fd(f) => f.read(buf),
            DeviceLink::Sim(st) => {
                let v = st.read(buf.len());
                buf[..v.len()].copy_from_slice(&v);
                Ok(v.len())
            }
        }
    }

    fn raw_fd(&self) -> Option<RawFd> {
        match self {
            DeviceLink::Fd(f) => Some(f.as_raw_fd()),
            DeviceLink::Sim(_) => None,
        }
    }
}

enum KeyCapture {
    Text { text: String, max: usize, props: u8 },
    OneKey,
}

pub struct Bridge {
    link: DeviceLink,
    vcs: Option<File>,
    test_snap: Option<Vec<u8>>,

    bufs: Vec<Option<Box<ReadingBuffer>>>,
    nomem: ReadingBuffer,
    screen: ReadingBuffer,
    screen_mode: bool,
    /// consoles at or beyond this index use the nomem sentinel
    alloc_limit: usize,

    /// foreground console minor, 1-based
    pub fgc: usize,
    pub lang: Lang,
    pub postprocess: u8,
    pub bindings: Bindings,

    /// screen geometry from the last snapshot
    pub vc_rows: usize,
    pub vc_cols: usize,
    pub vc_row: usize,
    pub vc_col: usize,

    tc: Option<usize>,
    capture: Option<KeyCapture>,
    log_size: usize,
}

impl Bridge {
    fn build(link: DeviceLink, vcs: Option<File>, lang: Lang) -> Bridge {
        Bridge {
            link,
            vcs,
            test_snap: None,
            bufs: (0..MAX_CONSOLES).map(|_| None).collect(),
            nomem: ReadingBuffer::nomem_sentinel(),
            screen: ReadingBuffer::default(),
            screen_mode: false,
            alloc_limit: MAX_CONSOLES,
            fgc: 1,
            lang,
            postprocess: PP_DEFAULT,
            bindings: Bindings::with_lang(lang),
            vc_rows: 0,
            vc_cols: 0,
            vc_row: 0,
            vc_col: 0,
            tc: None,
            capture: None,
            log_size: TTY_LOG_SIZE,
        }
    }

    /// Open the real intercept device plus the screen-snapshot device.
    pub fn open(devname: &str, lang: Lang) -> io::Result<Bridge> {
        let vcs = File::open("/dev/vcsa")?;
        let dev = File::options().read(true).write(true).open(devname)?;
        let mut bridge = Bridge::build(DeviceLink::Fd(dev), Some(vcs), lang);
        bridge.reset_configure();
        bridge.write_cmd(&cmd::bufsize(TTY_LOG_SIZE as u16))?;
        Ok(bridge)
    }

    /// A bridge wired to the in-process intercept state machine.
    pub fn sim(lang: Lang) -> Bridge {
        let mut st = InterceptState::default();
        st.open().expect("fresh state opens");
        let mut bridge = Bridge::build(DeviceLink::Sim(st), None, lang);
        bridge.reset_configure();
        let _ = bridge.write_cmd(&cmd::bufsize(TTY_LOG_SIZE as u16));
        bridge
    }

    /// Direct access to the simulated device, when there is one.
    pub fn sim_mut(&mut self) -> Option<&mut InterceptState> {
        match &mut self.link {
            DeviceLink::Sim(st) => Some(st),
            DeviceLink::Fd(_) => None,
        }
    }

    pub fn raw_fd(&self) -> Option<RawFd> {
        self.link.raw_fd()
    }

    pub fn set_log_size(&mut self, n: usize) {
        self.log_size = n.max(16);
    }

    pub fn set_alloc_limit(&mut self, n: usize) {
        self.alloc_limit = n.min(MAX_CONSOLES);
    }

    /// Inject a snapshot image for screen mode when no vcsa device is
    /// attached (sim and tests).
    pub fn set_test_snapshot(&mut self, raw: Vec<u8>) {
        self.test_snap = Some(raw);
    }

    fn write_cmd(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.link.write_all(bytes)
    }

    // ---- buffers ----

    fn ensure_console(&mut self, minor: usize) {
        if minor == 0 || minor > MAX_CONSOLES {
            return;
        }
        let idx = minor - 1;
        if self.bufs[idx].is_none() && idx < self.alloc_limit {
            self.bufs[idx] = Some(Box::default());
        }
    }

    /// The buffer under the reading commands: the screen image in screen
    /// mode, else the foreground console's log.
    pub fn buffer(&self) -> &ReadingBuffer {
        if self.screen_mode {
            &self.screen
        } else {
            match self.bufs.get(self.fgc - 1).and_then(|b| b.as_deref()) {
                Some(b) => b,
                None => &self.nomem,
            }
        }
    }

    pub fn buffer_mut(&mut self) -> &mut ReadingBuffer {
        if self.screen_mode {
            &mut self.screen
        } else {
            let idx = self.fgc - 1;
            match self.bufs.get_mut(idx).and_then(|b| b.as_deref_mut()) {
                Some(b) => b,
                None => &mut self.nomem,
            }
        }
    }

    pub fn screen_mode(&self) -> bool {
        self.screen_mode
    }

    /// Drop the tty log for the current console.
    pub fn clear_buffer(&mut self) {
        if !self.screen_mode {
            self.buffer_mut().clear();
        }
    }

    /// Raw utf-8 image of the current reading buffer, for inspection.
    pub fn dump_buffer(&self, dir: &str) -> io::Result<PathBuf> {
        let path = PathBuf::from(dir).join(format!("buf{}", self.fgc));
        let text: String = self
            .buffer()
            .text
            .iter()
            .map(|&c| char::from_u32(c).unwrap_or('?'))
            .collect();
        std::fs::write(&path, text)?;
        Ok(path)
    }

    // ---- events ----

    /// Drain one batch of device events into actions for the main loop.
    pub fn events(&mut self) -> io::Result<Vec<Action>> {
        let mut buf = vec![0u8; self.log_size * 4 + 400];
        let n = self.link.read_batch(&mut buf)?;
        tracing::trace!(bytes = n, "device batch");
        let mut actions = Vec::new();
        let mut screen_refreshed = false;

        for ev in proto::decode_events(&buf[..n]) {
            match ev {
                Event::Fgc(minor) => {
                    tracing::debug!(minor, "console switch");
                    self.fgc = (minor as usize).max(1);
                    self.ensure_console(self.fgc);
                    if self.screen_mode {
                        self.screen.cursor = self.screen.v_cursor;
                        self.screen.marks = [None; NUM_MARKS];
                    }
                    actions.push(Action::ConsoleSwitch(self.fgc));
                }

                Event::NewChars { minor, text } => {
                    let minor = minor as usize;
                    self.ensure_console(minor);
                    let foreground = minor == self.fgc && !self.screen_mode;
                    let log_size = self.log_size;
                    let pp = self.postprocess;
                    let Some(rb) = self
                        .bufs
                        .get_mut(minor.wrapping_sub(1))
                        .and_then(|b| b.as_deref_mut())
                    else {
                        continue;
                    };
                    let old_len = rb.len();
                    let trim = rb.append(&text, log_size);
                    let from = match trim {
                        Trim::None => old_len,
                        Trim::Front(d) => old_len - d,
                        Trim::Replaced => 0,
                    };
                    rb.postprocess(from, pp);
                    if foreground {
                        match trim {
                            Trim::None => {}
                            Trim::Front(d) => actions.push(Action::Overflow { diff: Some(d) }),
                            Trim::Replaced => actions.push(Action::Overflow { diff: None }),
                        }
                    }
                }

                Event::MoreChars { echo, ch } => {
                    actions.push(Action::MoreChars { echo, ch });
                }

                Event::RefreshAck => {
                    tracing::trace!("refresh acknowledged");
                }

                Event::Keystroke { key, ss, leds } => {
                    tracing::debug!(key, ss, "keystroke");
                    if self.screen_mode && !screen_refreshed {
                        let _ = self.screen_snap();
                        if self.screen.cursor.is_none() {
                            self.screen.cursor = self.screen.v_cursor;
                        }
                        screen_refreshed = true;
                    }
                    if self.capture.is_some() {
                        self.feed_capture(key, ss, leds, &mut actions)?;
                        continue;
                    }
                    if let Some(mk) = build_mkcode(key, ss & 0xf) {
                        if let Some(m) = self.bindings.get_macro(mk).map(str::to_string) {
                            self.run_macro(&m)?;
                            continue;
                        }
                    }
                    actions.push(Action::Key { key, ss, leds });
                }
            }
        }
        Ok(actions)
    }

    fn run_macro(&mut self, m: &str) -> io::Result<()> {
        if let Some(command) = m.strip_prefix('|') {
            tracing::debug!(command, "macro runs a shell command");
            match std::process::Command::new("/bin/sh").arg("-c").arg(command).status() {
                Ok(status) if !status.success() => {
                    tracing::warn!(code = ?status.code(), "macro command failed");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "macro command failed to start"),
            }
            Ok(())
        } else {
            self.inject_string(m)
        }
    }

    /// Ask for catch-up data, then drain it.
    pub fn refresh(&mut self) -> io::Result<Vec<Action>> {
        self.write_cmd(&cmd::refresh())?;
        let actions = self.events()?;
        if self.screen_mode {
            self.screen_snap()?;
        }
        Ok(actions)
    }

    /// Push text into the console's input queue.
    pub fn inject_string(&mut self, s: &str) -> io::Result<()> {
        if s.len() > u16::MAX as usize {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "string too long"));
        }
        self.write_cmd(&cmd::push_tty(s))
    }

    // ---- screen mode ----

    fn snapshot_image(&mut self) -> io::Result<Vec<u8>> {
        if let Some(raw) = &self.test_snap {
            return Ok(raw.clone());
        }
        let Some(vcs) = &self.vcs else {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no snapshot device"));
        };
        let mut header = [0u8; 4];
        vcs.read_exact_at(&mut header, 0)?;
        let cells = header[0] as usize * header[1] as usize;
        let mut raw = vec![0u8; 4 + 2 * cells];
        vcs.read_exact_at(&mut raw, 0)?;
        Ok(raw)
    }

    fn screen_snap(&mut self) -> io::Result<()> {
        let raw = self.snapshot_image()?;
        let snap = screen::decode_snapshot(&raw, self.lang)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "bad snapshot"))?;
        self.vc_rows = snap.rows;
        self.vc_cols = snap.cols;
        self.vc_row = snap.cursor_row;
        self.vc_col = snap.cursor_col;
        self.screen.text = snap.text;
        self.screen.attribs = Some(snap.attribs);
        self.screen.v_cursor = Some(snap.v_cursor);
        if self
            .screen
            .cursor
            .is_none_or(|c| c >= self.screen.text.len())
        {
            self.screen.cursor = Some(snap.v_cursor);
        }
        Ok(())
    }

    /// Toggle between the tty log and the screen image.
    pub fn set_screen_mode(&mut self, on: bool) -> io::Result<()> {
        self.screen_mode = false;
        self.ensure_console(self.fgc);
        self.tc = None;
        if !on {
            return Ok(());
        }
        self.screen.cursor = None;
        self.screen_snap()?;
        self.screen.marks = [None; NUM_MARKS];
        self.screen_mode = true;
        Ok(())
    }

    // ---- key capture (typed strings) ----

    /// Divert keystrokes into an internal string collector; the result
    /// arrives later as `Action::KeystringDone`.
    pub fn start_keystring(&mut self, max: usize, props: u8) -> io::Result<()> {
        self.write_cmd(&cmd::divert(true))?;
        self.capture = Some(KeyCapture::Text { text: String::new(), max, props });
        Ok(())
    }

    /// Grab exactly one key; it arrives as `Action::Key1`.
    pub fn start_get1key(&mut self) -> io::Result<()> {
        self.write_cmd(&cmd::divert(true))?;
        self.capture = Some(KeyCapture::OneKey);
        Ok(())
    }

    pub fn capturing(&self) -> bool {
        self.capture.is_some()
    }

    fn feed_capture(
        &mut self,
        keycode: u8,
        ss: u8,
        leds: u8,
        actions: &mut Vec<Action>,
    ) -> io::Result<()> {
        let Some(cap) = self.capture.take() else {
            return Ok(());
        };
        let (mut text, max, props) = match cap {
            KeyCapture::OneKey => {
                self.write_cmd(&cmd::divert(false))?;
                actions.push(Action::Key1 { key: keycode, ss });
                return Ok(());
            }
            KeyCapture::Text { text, max, props } => (text, max, props),
        };

        enum Outcome {
            Collecting,
            Done,
            Aborted,
        }
        let mut outcome = Outcome::Collecting;
        let mut bad = false;

        if keycode == key::KEY_ESC as u8 {
            if props & KS_ESCCR != 0 {
                self.cr_sound()?;
            }
            outcome = Outcome::Aborted;
        } else if keycode == key::KEY_ENTER as u8 {
            outcome = Outcome::Done;
        } else if ss & SS_ALT == 0
            && (keycode == key::KEY_BACKSPACE as u8
                || (ss & SS_CTRL != 0 && keycode == key::KEY_H as u8 && props & KS_BACKUP != 0))
        {
            text.pop();
            if props & KS_GOODCLICK != 0 {
                self.click()?;
            }
            actions.push(Action::KsEcho('\u{8}'));
        } else if keycode > key::KEY_SPACE as u8 || ss & (SS_ALT | SS_CTRL) != 0 {
            bad = true;
        } else {
            match main_block_char(keycode, ss & SS_SHIFT != 0) {
                None => bad = true,
                Some(mut c) => {
                    if leds & LED_CAPSLOCK != 0 && c.is_ascii_alphabetic() {
                        c ^= 0x20;
                    }
                    if text.len() + 1 >= max {
                        if props & KS_BOUNDARYBEEPS != 0 {
                            self.highbeeps()?;
                        }
                        if props & KS_BOUNDARYSTOP != 0 {
                            outcome = Outcome::Aborted;
                        }
                    } else {
                        if props & KS_GOODCLICK != 0 {
                            if c.is_ascii_uppercase() {
                                self.highcap()?;
                            } else {
                                self.click()?;
                            }
                        }
                        actions.push(Action::KsEcho(c as char));
                        text.push(c as char);
                    }
                }
            }
        }

        if bad {
            if props & KS_BADBELL != 0 {
                self.bell()?;
            }
            if props & KS_BADSTOP != 0 {
                outcome = Outcome::Aborted;
            }
        }

        match outcome {
            Outcome::Collecting => {
                self.capture = Some(KeyCapture::Text { text, max, props });
            }
            Outcome::Done => {
                self.write_cmd(&cmd::divert(false))?;
                actions.push(Action::KeystringDone { text: Some(text) });
            }
            Outcome::Aborted => {
                self.write_cmd(&cmd::divert(false))?;
                actions.push(Action::KeystringDone { text: None });
            }
        }
        Ok(())
    }

    // ---- sounds ----

    pub fn click(&mut self) -> io::Result<()> {
        self.write_cmd(&cmd::click())
    }

    pub fn cr_sound(&mut self) -> io::Result<()> {
        self.write_cmd(&cmd::cr())
    }

    pub fn bell(&mut self) -> io::Result<()> {
        self.write_cmd(&cmd::notes(&[(1800, 10)]))
    }

    pub fn buzz(&mut self) -> io::Result<()> {
        self.write_cmd(&cmd::notes(&[(120, 20)]))
    }

    pub fn highbeeps(&mut self) -> io::Result<()> {
        self.write_cmd(&cmd::notes(&[(2800, 4), (3300, 3)]))
    }

    pub fn highcap(&mut self) -> io::Result<()> {
        self.write_cmd(&cmd::notes(&[(3000, 3)]))
    }

    pub fn tone_onoff(&mut self, on: bool) -> io::Result<()> {
        let snd: &[(u16, u8)] = if on { &[(700, 12)] } else { &[(270, 8)] };
        self.write_cmd(&cmd::notes(snd))
    }

    pub fn notes(&mut self, list: &[(u16, u8)]) -> io::Result<()> {
        self.write_cmd(&cmd::notes(list))
    }

    /// A rising or falling scale between two frequencies.
    pub fn scale(&mut self, f1: u16, f2: u16, step: i8, duration: u16) -> io::Result<()> {
        self.write_cmd(&cmd::steps(step, f1, f2, duration))
    }

    pub fn sounds(&mut self, on: bool) -> io::Result<()> {
        self.write_cmd(&cmd::sounds(on))
    }

    pub fn tty_clicks(&mut self, on: bool) -> io::Result<()> {
        self.write_cmd(&cmd::sounds_tty(on))
    }

    pub fn kmsg_tones(&mut self, on: bool) -> io::Result<()> {
        self.write_cmd(&cmd::sounds_kmsg(on))
    }

    pub fn obreak(&mut self, tenths: u8) -> io::Result<()> {
        self.write_cmd(&cmd::obreak(tenths))
    }

    pub fn bypass(&mut self) -> io::Result<()> {
        self.write_cmd(&cmd::bypass())
    }

    pub fn monitor(&mut self, on: bool) -> io::Result<()> {
        self.write_cmd(&cmd::monitor(on))
    }

    // ---- configuration ----

    fn apply_ops(&mut self, ops: &[KeyOp]) {
        for op in ops {
            let r = match *op {
                KeyOp::Set { key, ss } => self.write_cmd(&cmd::set_key(key, ss)),
                KeyOp::Unset { key, ss } => self.write_cmd(&cmd::unset_key(key, ss & !KEY_T)),
                KeyOp::Meta { key, mask } => self.write_cmd(&cmd::ismeta(key, mask)),
                KeyOp::ClearAll => self.write_cmd(&cmd::clear_keys()),
            };
            if let Err(e) = r {
                tracing::warn!(error = %e, "key op failed");
            }
        }
    }

    /// Apply one config line, keeping the driver's capture tables in sync.
    pub fn line_configure(
        &mut self,
        line: &str,
        syntax: Option<&SyntaxChecker>,
    ) -> Result<(), ConfigError> {
        let ops = self.bindings.line_configure(line, syntax)?;
        self.apply_ops(&ops);
        Ok(())
    }

    /// Back to built-in defaults: no captures, no macros, the language's
    /// stock punctuation names.
    pub fn reset_configure(&mut self) {
        let ops = self.bindings.reset();
        self.apply_ops(&ops);
    }

    /// Temporarily stop listening, except for the wake-up command and
    /// macros that run system commands.
    pub fn suspend_keys(&mut self, except: &str) {
        let ops = self.bindings.suspend_ops(except);
        self.apply_ops(&ops);
    }

    pub fn resume_keys(&mut self) {
        let ops = self.bindings.resume_ops();
        self.apply_ops(&ops);
    }

    // ---- cursor API ----

    /// Copy the committed reading cursor into the temp cursor.
    pub fn cursor_set(&mut self) {
        self.tc = self.buffer().cursor;
    }

    /// Commit the temp cursor.
    pub fn cursor_sync(&mut self) {
        let tc = self.tc;
        self.buffer_mut().cursor = tc;
    }

    pub fn temp_cursor(&self) -> Option<usize> {
        self.tc
    }

    /// Character under the temp cursor, 0 if there is none.
    pub fn getc(&self) -> u32 {
        match self.tc {
            Some(p) => self.buffer().at(p),
            None => 0,
        }
    }

    fn motion_ready(&self) -> Option<usize> {
        if self.buffer().is_empty() {
            return None;
        }
        self.tc.filter(|&p| p < self.buffer().len())
    }

    pub fn forward(&mut self) -> bool {
        let Some(tc) = self.motion_ready() else {
            return false;
        };
        match cursor::forward(&self.buffer().text, tc) {
            Some(p) => {
                self.tc = Some(p);
                true
            }
            None => false,
        }
    }

    pub fn back(&mut self) -> bool {
        let Some(tc) = self.motion_ready() else {
            return false;
        };
        match cursor::back(&self.buffer().text, tc) {
            Some(p) => {
                self.tc = Some(p);
                true
            }
            None => false,
        }
    }

    /// Move to the start of the line; returns the column number, or 0 on
    /// an empty buffer.
    pub fn start_line(&mut self) -> usize {
        let Some(tc) = self.motion_ready() else {
            return 0;
        };
        let (pos, col) = cursor::start_line(&self.buffer().text, tc);
        self.tc = Some(pos);
        col
    }

    pub fn end_line(&mut self) -> bool {
        let Some(tc) = self.motion_ready() else {
            return false;
        };
        self.tc = Some(cursor::end_line(&self.buffer().text, tc));
        true
    }

    pub fn start_word(&mut self) -> bool {
        let Some(tc) = self.motion_ready() else {
            return false;
        };
        self.tc = Some(cursor::start_word(&self.buffer().text, tc));
        true
    }

    pub fn end_word(&mut self) -> bool {
        let Some(tc) = self.motion_ready() else {
            return false;
        };
        self.tc = Some(cursor::end_word(&self.buffer().text, tc));
        true
    }

    pub fn start_buf(&mut self) {
        self.tc = Some(0);
    }

    pub fn end_buf(&mut self) {
        let len = self.buffer().len();
        self.tc = Some(len.saturating_sub(1));
    }

    pub fn left_spaces(&mut self) {
        if let Some(tc) = self.motion_ready() {
            self.tc = Some(cursor::skip_left_spaces(&self.buffer().text, tc));
        }
    }

    pub fn right_spaces(&mut self) {
        if let Some(tc) = self.motion_ready() {
            self.tc = Some(cursor::skip_right_spaces(&self.buffer().text, tc));
        }
    }

    pub fn next_line(&mut self) -> bool {
        if !self.end_line() {
            return false;
        }
        self.forward()
    }

    pub fn prev_line(&mut self) -> bool {
        self.start_line();
        if !self.back() {
            return false;
        }
        self.start_line() != 0
    }

    pub fn next_word(&mut self) -> bool {
        if !self.end_word() {
            return false;
        }
        if !self.forward() {
            return false;
        }
        while self.getc() == ' ' as u32 {
            if !self.forward() {
                return false;
            }
        }
        true
    }

    pub fn prev_word(&mut self) -> bool {
        self.start_word();
        if !self.back() {
            return false;
        }
        while self.getc() == ' ' as u32 {
            if !self.back() {
                return false;
            }
        }
        self.start_word()
    }

    /// Case-insensitive search from the temp cursor.
    pub fn search(&mut self, needle: &str, backward: bool, from_line: bool) -> bool {
        let Some(tc) = self.motion_ready() else {
            return false;
        };
        match cursor::search(&self.buffer().text, tc, needle, backward, from_line) {
            Some(p) => {
                self.tc = Some(p);
                true
            }
            None => false,
        }
    }

    // ---- marks ----

    pub fn set_mark(&mut self, index: usize) -> bool {
        let cur = self.buffer().cursor;
        if index >= NUM_MARKS || cur.is_none() {
            return false;
        }
        self.buffer_mut().marks[index] = cur;
        true
    }

    pub fn jump_mark(&mut self, index: usize) -> bool {
        if index >= NUM_MARKS {
            return false;
        }
        match self.buffer().marks[index] {
            Some(p) if p < self.buffer().len() => {
                self.buffer_mut().cursor = Some(p);
                true
            }
            _ => false,
        }
    }

    // ---- reading ----

    /// Extract a prepared sentence at the committed cursor.
    pub fn sentence(&self, max: usize, props: u8) -> Option<Sentence> {
        let rb = self.buffer();
        let cur = rb.cursor?;
        Some(cursor::get_sentence(&rb.text, cur, max, props, &self.bindings))
    }

    /// Move the committed cursor, clamping to the buffer.  Returns false
    /// when the position had scrolled away entirely.
    pub fn set_cursor_clamped(&mut self, pos: usize) -> bool {
        let len = self.buffer().len();
        if pos < len {
            self.buffer_mut().cursor = Some(pos);
            true
        } else {
            let end = len.saturating_sub(1);
            self.buffer_mut().cursor = Some(end);
            false
        }
    }
}
