// The intercept driver as a deterministic state machine.
//
// This is the kernel side of the protocol with the kernel taken out: the
// notifier callbacks become plain methods (key_down, vt_char, vt_switch,
// printk), the jiffies clock becomes a millisecond parameter, and the
// device file-ops become write()/read().  The daemon normally talks to the
// real character device; this state machine is the reference for those
// semantics and stands in for the device in tests and in the config-check
// CLI mode, wired up through the same byte protocol.

mod echo;
mod ring;

pub use echo::EchoTracker;
pub use ring::ConsoleLog;

use crate::proto::{Cmd, KEY_T, LED_CAPSLOCK, LED_NUMLOCK, NUM_KEYS};
use input_linux_sys as key;

pub const MAX_CONSOLES: usize = 63;
/// Default per-console log capacity in code points.
pub const DEFAULT_LOG_CAPACITY: usize = 50_000;
/// The event queue is a one-shot linear buffer; keystrokes that don't fit
/// are dropped, capture must never block.
const QUEUE_LEN: usize = 400;

const NOMEM_MESSAGE: &str = "Cannot allocate space for this console";

/// Marks the key-handling the kernel already does (shift, alt, locks);
/// such keys are never treated as user-defined metas.
const SS_KERNEL: u8 = 0x20;

enum LogSlot {
    Empty,
    Ready(ConsoleLog),
    Nomem,
}

/// Side effects that leave the state machine: sounds for the click sink
/// and text injected into the console's input queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Inject(Vec<u8>),
    Click,
    CrSound,
    Notes(Vec<(u16, u8)>),
    Steps { f1: u16, f2: u16, step: i8, duration: u16 },
    Sounds(bool),
    SoundsTty(bool),
    SoundsKmsg(bool),
}

pub struct InterceptState {
    logs: Vec<LogSlot>,
    nomem_sent: Vec<bool>,
    log_capacity: usize,
    /// consoles at or beyond this index fail allocation (resource bound;
    /// tests use it to drive the nomem path)
    console_limit: usize,

    capture: [u16; NUM_KEYS],
    passt: [u16; NUM_KEYS],
    ismeta: [u8; NUM_KEYS],
    metaflag: [bool; 4],

    divert: bool,
    monitor: bool,
    bypass: bool,

    queue: Vec<u8>,
    user_bufsize: usize,
    obreak_tenths: u8,
    last_out_ms: Option<u64>,

    fgc: usize, // 0-based
    echo: EchoTracker,
    in_use: bool,
    effects: Vec<Effect>,
}

impl Default for InterceptState {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}

impl InterceptState {
    pub fn with_capacity(log_capacity: usize) -> InterceptState {
        InterceptState {
            logs: (0..MAX_CONSOLES).map(|_| LogSlot::Empty).collect(),
            nomem_sent: vec![false; MAX_CONSOLES],
            log_capacity,
            console_limit: MAX_CONSOLES,
            capture: [0; NUM_KEYS],
            passt: [0; NUM_KEYS],
            ismeta: [0; NUM_KEYS],
            metaflag: [false; 4],
            divert: false,
            monitor: false,
            bypass: false,
            queue: Vec::with_capacity(QUEUE_LEN),
            user_bufsize: 256,
            obreak_tenths: 5,
            last_out_ms: None,
            fgc: 0,
            echo: EchoTracker::default(),
            in_use: false,
            effects: Vec::new(),
        }
    }

    /// Cap the number of consoles that can allocate a log; the rest get
    /// the nomem diagnostic.
    pub fn set_console_limit(&mut self, n: usize) {
        self.console_limit = n.min(MAX_CONSOLES);
    }

    fn reset_meta(&mut self) {
        self.ismeta = [0; NUM_KEYS];
        for k in [
            key::KEY_LEFTCTRL,
            key::KEY_RIGHTCTRL,
            key::KEY_LEFTSHIFT,
            key::KEY_RIGHTSHIFT,
            key::KEY_LEFTALT,
            key::KEY_RIGHTALT,
            key::KEY_CAPSLOCK,
            key::KEY_NUMLOCK,
            key::KEY_SCROLLLOCK,
        ] {
            self.ismeta[k as usize] = SS_KERNEL;
        }
        self.metaflag = [false; 4];
    }

    fn clear_keys(&mut self) {
        self.capture = [0; NUM_KEYS];
        self.passt = [0; NUM_KEYS];
    }

    /// Exclusive open.  Seeds the queue with the current foreground
    /// console so the reader knows where it is.
    pub fn open(&mut self) -> Result<(), ()> {
        if self.in_use {
            return Err(());
        }
        for slot in &mut self.logs {
            if let LogSlot::Ready(l) = slot {
                l.reset();
            }
            if matches!(slot, LogSlot::Nomem) {
                *slot = LogSlot::Empty;
            }
        }
        self.nomem_sent.iter_mut().for_each(|b| *b = false);
        self.reset_meta();
        self.clear_keys();
        self.divert = false;
        self.monitor = false;
        self.bypass = false;
        self.queue.clear();
        self.queue
            .extend_from_slice(&[Cmd::Fgc as u8, self.fgc as u8 + 1, 0, 0]);
        self.ensure_log(self.fgc);
        self.in_use = true;
        Ok(())
    }

    pub fn close(&mut self) {
        self.in_use = false;
        self.queue.clear();
    }

    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    pub fn poll_ready(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn fg_console(&self) -> usize {
        self.fgc
    }

    /// Oldest-to-newest contents of a console's log, for tests.
    pub fn log_snapshot(&self, mino: usize) -> Vec<u32> {
        match &self.logs[mino] {
            LogSlot::Ready(l) => l.snapshot(),
            _ => Vec::new(),
        }
    }

    fn ensure_log(&mut self, mino: usize) {
        if matches!(self.logs[mino], LogSlot::Empty) {
            self.logs[mino] = if mino < self.console_limit {
                LogSlot::Ready(ConsoleLog::new(self.log_capacity))
            } else {
                tracing::warn!(console = mino + 1, "log allocation denied");
                LogSlot::Nomem
            };
        }
    }

    fn queue_room(&self, n: usize) -> bool {
        self.queue.len() + n <= QUEUE_LEN
    }

    // ---- keyboard pipeline ----

    /// A key went down.  Returns true when the key should be forwarded to
    /// the console, false when it is swallowed.
    pub fn key_down(&mut self, keycode: u8, ss: u8, leds: u8, now_ms: u64) -> bool {
        if !self.in_use {
            return true;
        }
        let k = keycode as usize;

        // user-defined meta keys toggle simulated shift bits and vanish
        if k < NUM_KEYS {
            let m = self.ismeta[k];
            if m != 0 && m != SS_KERNEL {
                for j in 0..4 {
                    if m & (1 << j) != 0 {
                        self.metaflag[j] = true;
                    }
                }
                return false;
            }
        }

        let mut ss = ss & 0xf;
        for j in 0..4 {
            if self.metaflag[j] {
                ss |= 1 << j;
            }
        }

        let action = if k < NUM_KEYS { self.capture[k] } else { 0 };

        let mut divert = self.divert;
        let mut monitor = self.monitor;
        let mut bypass = self.bypass;
        // hardware metas are exempt from redirection
        if (divert || monitor || bypass) && k < NUM_KEYS && self.ismeta[k] != 0 {
            divert = false;
            monitor = false;
            bypass = false;
        }

        let mut keep = divert || monitor;
        let mut send = false;

        if bypass {
            self.bypass = false;
            send = true;
        } else if leds & LED_NUMLOCK != 0
            && keycode >= key::KEY_KP7 as u8
            && keycode <= key::KEY_KPDOT as u8
            && keycode != key::KEY_KPMINUS as u8
            && keycode != key::KEY_KPPLUS as u8
        {
            // numpad is numbers when numlock is on
            if !divert {
                send = true;
            }
        } else if action & (1 << ss) != 0 {
            keep = true;
            if k < NUM_KEYS && self.passt[k] & (1 << ss) != 0 {
                send = true;
            }
        } else if !divert {
            send = true;
        }

        if keep {
            if self.queue_room(4) {
                self.queue
                    .extend_from_slice(&[Cmd::Keystroke as u8, keycode, ss, leds]);
            } else {
                tracing::debug!(keycode, "event queue full, keystroke dropped");
            }
        }

        if send {
            self.echo.post_keycode(
                keycode,
                ss,
                leds & LED_NUMLOCK != 0,
                leds & LED_CAPSLOCK != 0,
                now_ms,
            );
            // a forwarded key ends the current output burst
            self.last_out_ms = None;
        }
        send
    }

    /// A key went up; only matters for user-defined metas.
    pub fn key_up(&mut self, keycode: u8) {
        let k = keycode as usize;
        if !self.in_use || k >= NUM_KEYS {
            return;
        }
        let m = self.ismeta[k];
        if m != 0 && m != SS_KERNEL {
            for j in 0..4 {
                if m & (1 << j) != 0 {
                    self.metaflag[j] = false;
                }
            }
        }
    }

    /// The console reports a unicode keystroke; feeds echo detection.
    pub fn key_unicode(&mut self, c: u32, now_ms: u64) {
        if self.in_use {
            self.echo.post_unicode(c, now_ms);
        }
    }

    // ---- output pipeline ----

    fn pushlog(&mut self, c: u32, mino: usize, from_vt: bool, now_ms: u64) {
        let is_fg = mino == self.fgc;
        let mut echo = 0u8;
        let mut throw = false;

        if is_fg {
            if from_vt {
                echo = self.echo.classify(c, now_ms);
            }
            if echo != 0 {
                // echo is announced immediately, always
                throw = true;
            } else {
                throw = match self.last_out_ms {
                    None => true,
                    Some(last) => {
                        self.obreak_tenths == 0
                            || now_ms.saturating_sub(last) >= self.obreak_tenths as u64 * 100
                    }
                };
                self.last_out_ms = Some(now_ms);
            }
        }

        let LogSlot::Ready(log) = &mut self.logs[mino] else {
            return;
        };
        log.append(c);

        if throw && self.queue.len() + 8 <= QUEUE_LEN {
            self.queue
                .extend_from_slice(&[Cmd::TtyMorechars as u8, echo, 0, 0]);
            self.queue.extend_from_slice(&c.to_le_bytes());
            if echo != 0 {
                log.set_echopoint_head();
            }
        }
    }

    /// One character is about to be written to virtual console `mino`.
    pub fn vt_char(&mut self, mino: usize, c: u32, now_ms: u64) {
        if !self.in_use || c == 0 || mino >= MAX_CONSOLES {
            return;
        }
        self.ensure_log(mino);
        self.pushlog(c, mino, true, now_ms);
    }

    /// The foreground console changed.
    pub fn vt_switch(&mut self, new_fg: usize) {
        if !self.in_use || new_fg >= MAX_CONSOLES || new_fg == self.fgc {
            return;
        }
        self.fgc = new_fg;
        // retry a failed allocation on switch
        if matches!(self.logs[new_fg], LogSlot::Nomem) {
            self.logs[new_fg] = LogSlot::Empty;
        }
        self.ensure_log(new_fg);
        self.last_out_ms = None;
        self.echo.flush();
        if self.queue_room(4) {
            self.queue
                .extend_from_slice(&[Cmd::Fgc as u8, new_fg as u8 + 1, 0, 0]);
        }
    }

    /// Kernel log text; goes into the foreground log even though it never
    /// transits a tty.
    pub fn printk(&mut self, msg: &str, now_ms: u64) {
        if !self.in_use {
            return;
        }
        for c in msg.chars() {
            self.pushlog(c as u32, self.fgc, false, now_ms);
        }
    }

    // ---- device file-ops ----

    /// Process a run of write-direction commands.
    pub fn write(&mut self, buf: &[u8]) {
        if !self.in_use {
            return;
        }
        let mut i = 0usize;
        while i < buf.len() {
            let c = buf[i];
            i += 1;
            match Cmd::from_byte(c) {
                Some(Cmd::ClearKeys) => {
                    self.clear_keys();
                    self.reset_meta();
                }
                Some(Cmd::SetKey) => {
                    if buf.len() - i < 2 {
                        break;
                    }
                    let k = buf[i] as usize;
                    let ss = buf[i + 1];
                    i += 2;
                    if k < NUM_KEYS {
                        let tee = ss & KEY_T != 0;
                        let ss = ss & 0xf;
                        self.capture[k] |= 1 << ss;
                        if tee {
                            self.passt[k] |= 1 << ss;
                        } else {
                            self.passt[k] &= !(1 << ss);
                        }
                    }
                }
                Some(Cmd::UnsetKey) => {
                    if buf.len() - i < 2 {
                        break;
                    }
                    let k = buf[i] as usize;
                    let ss = buf[i + 1] & 0xf;
                    i += 2;
                    if k < NUM_KEYS {
                        self.passt[k] = 0;
                        self.capture[k] &= !(1u16 << ss);
                    }
                }
                Some(Cmd::IsMeta) => {
                    if buf.len() - i < 2 {
                        break;
                    }
                    let k = buf[i] as usize;
                    let mask = buf[i + 1];
                    i += 2;
                    if k < NUM_KEYS {
                        self.ismeta[k] = mask;
                    }
                }
                Some(Cmd::PushTty) => {
                    if buf.len() - i < 2 {
                        break;
                    }
                    let n = buf[i] as usize | ((buf[i + 1] as usize) << 8);
                    i += 2;
                    if buf.len() - i < n {
                        break;
                    }
                    self.effects.push(Effect::Inject(buf[i..i + n].to_vec()));
                    i += n;
                }
                Some(kind @ (Cmd::Sounds | Cmd::SoundsTty | Cmd::SoundsKmsg)) => {
                    if buf.len() - i < 1 {
                        break;
                    }
                    let on = buf[i] != 0;
                    i += 1;
                    self.effects.push(match kind {
                        Cmd::Sounds => Effect::Sounds(on),
                        Cmd::SoundsTty => Effect::SoundsTty(on),
                        _ => Effect::SoundsKmsg(on),
                    });
                }
                Some(Cmd::Click) => self.effects.push(Effect::Click),
                Some(Cmd::Cr) => self.effects.push(Effect::CrSound),
                Some(Cmd::Swoop) => {
                    // reserved
                    if buf.len() - i < 3 {
                        break;
                    }
                    i += 3;
                }
                Some(Cmd::Notes) => {
                    if buf.len() - i < 1 {
                        break;
                    }
                    let n = buf[i] as usize;
                    i += 1;
                    let mut list = Vec::new();
                    let mut j = 0;
                    while j < n && buf.len() - i >= 3 {
                        let freq = buf[i] as u16 | ((buf[i + 1] as u16) << 8);
                        list.push((freq, buf[i + 2]));
                        i += 3;
                        j += 1;
                    }
                    if !list.is_empty() {
                        self.effects.push(Effect::Notes(list));
                    }
                }
                Some(Cmd::Steps) => {
                    if buf.len() - i < 7 {
                        break;
                    }
                    let step = buf[i] as i8;
                    let f1 = buf[i + 1] as u16 | ((buf[i + 2] as u16) << 8);
                    let f2 = buf[i + 3] as u16 | ((buf[i + 4] as u16) << 8);
                    let duration = buf[i + 5] as u16 | ((buf[i + 6] as u16) << 8);
                    i += 7;
                    self.effects.push(Effect::Steps { f1, f2, step, duration });
                }
                Some(Cmd::Refresh) => {
                    if self.queue_room(4) {
                        self.queue
                            .extend_from_slice(&[Cmd::Refresh as u8, 0, 0, 0]);
                    }
                }
                Some(Cmd::Bypass) => self.bypass = true,
                Some(Cmd::Divert) => {
                    if buf.len() - i < 1 {
                        break;
                    }
                    self.divert = buf[i] != 0;
                    i += 1;
                }
                Some(Cmd::Monitor) => {
                    if buf.len() - i < 1 {
                        break;
                    }
                    self.monitor = buf[i] != 0;
                    i += 1;
                }
                Some(Cmd::Obreak) => {
                    if buf.len() - i < 1 {
                        break;
                    }
                    self.obreak_tenths = buf[i];
                    i += 1;
                }
                Some(Cmd::Bufsize) => {
                    if buf.len() - i < 2 {
                        break;
                    }
                    let n = (buf[i] as usize | ((buf[i + 1] as usize) << 8)).clamp(256, 65535);
                    i += 2;
                    self.user_bufsize = n;
                }
                _ => {}
            }
        }
    }

    /// Serialize one batch of events, catch-up data first.  Returns an
    /// empty vec when nothing is queued (the device read would block).
    pub fn read(&mut self, max_len: usize) -> Vec<u8> {
        if !self.in_use || self.queue.is_empty() {
            return Vec::new();
        }

        // Skip to the last FGC: earlier console switches are stale.
        let q = &self.queue;
        let mut tail = 0usize;
        {
            let mut t = 0usize;
            while t + 4 <= q.len() {
                if q[t] == Cmd::Fgc as u8 {
                    tail = t;
                }
                t += if q[t] == Cmd::TtyMorechars as u8 { 8 } else { 4 };
            }
        }

        // Does anything in the queue force a catch-up?
        let log_pending = match &self.logs[self.fgc] {
            LogSlot::Ready(l) => l.behind(),
            _ => !self.nomem_sent[self.fgc],
        };
        let mut catchup_echo = false;
        let mut catchup_head = false;
        if log_pending {
            let mut t = tail;
            while t + 4 <= q.len() {
                if q[t] == Cmd::TtyMorechars as u8 {
                    if q[t + 1] != 0 {
                        catchup_echo = true;
                    }
                    t += 8;
                    continue;
                }
                catchup_head = true;
                break;
            }
        }

        let has_echopoint = matches!(&self.logs[self.fgc], LogSlot::Ready(l) if l.has_echopoint());
        let (catchup, to_echo) = if catchup_head {
            (true, false)
        } else if catchup_echo && has_echopoint {
            (true, true)
        } else {
            (false, false)
        };

        let mut staging: Vec<u32> = Vec::new();
        if catchup {
            match &mut self.logs[self.fgc] {
                LogSlot::Ready(l) => staging = l.take_catchup(to_echo),
                _ => {
                    staging = NOMEM_MESSAGE.chars().map(|c| c as u32).collect();
                    self.nomem_sent[self.fgc] = true;
                }
            }
        }

        let mut out = Vec::with_capacity(max_len.min(QUEUE_LEN));
        let mut pos = tail;

        // the console-switch notice always leads
        if self.queue[pos] == Cmd::Fgc as u8 && max_len >= 4 {
            out.extend_from_slice(&self.queue[pos..pos + 4]);
            pos += 4;
        }

        if catchup {
            // ratchet down to the reader's buffer, dropping the oldest
            if staging.len() > self.user_bufsize {
                let cut = staging.len() - self.user_bufsize;
                staging.drain(..cut);
            }
            if max_len - out.len() >= (staging.len() + 1) * 4 {
                out.push(Cmd::TtyNewchars as u8);
                out.push(self.fgc as u8 + 1);
                out.push(staging.len() as u8);
                out.push((staging.len() >> 8) as u8);
                for c in &staging {
                    out.extend_from_slice(&c.to_le_bytes());
                }
            }
        }

        // remaining events, whole records only
        while pos + 4 <= self.queue.len() {
            let rec = if self.queue[pos] == Cmd::TtyMorechars as u8 { 8 } else { 4 };
            if pos + rec > self.queue.len() || out.len() + rec > max_len {
                break;
            }
            out.extend_from_slice(&self.queue[pos..pos + rec]);
            pos += rec;
        }

        self.queue.drain(..pos);
        out
    }
}

#[cfg(test)]
mod tests;
