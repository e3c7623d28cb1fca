// Echo detection: did a character appearing on the console come from a key
// the user just pressed?
//
// Recently pressed keys sit in a small FIFO with timestamps.  A console
// character that directly matches a pending key is class-1 echo.  Keys
// with multi-character echoes (tab, return, escape, backspace) arm a small
// state machine whose continuation characters are class-2 echo.

use crate::keynames::main_block_char;
use crate::proto::{SS_ALT, SS_CTRL, SS_SHIFT};
use input_linux_sys as key;

const MAX_PENDING: usize = 8;
/// Pending keys older than this are assumed to have scrolled by unechoed.
const EXPIRE_MS: u64 = 3_000;

#[derive(Clone, Copy)]
struct Pending {
    unicode: u32,
    when_ms: u64,
    from_unicode: bool,
}

#[derive(Clone, Copy, PartialEq)]
enum State {
    Idle,
    /// tab matched a space; more spaces may follow
    TabSpaces,
    /// return matched CR; a LF is coming
    CrLf,
    /// escape matched `^`; a `[` is coming
    EscBracket,
    /// delete matched ^H; a space is next
    DelSpace,
    /// then one more ^H
    DelBack,
}

pub struct EchoTracker {
    pending: Vec<Pending>,
    state: State,
}

impl Default for EchoTracker {
    fn default() -> Self {
        EchoTracker { pending: Vec::with_capacity(MAX_PENDING), state: State::Idle }
    }
}

impl EchoTracker {
    pub fn flush(&mut self) {
        self.pending.clear();
        self.state = State::Idle;
    }

    fn push(&mut self, unicode: u32, when_ms: u64, from_unicode: bool) {
        if self.pending.len() == MAX_PENDING {
            self.pending.remove(0);
        }
        self.pending.push(Pending { unicode, when_ms, from_unicode });
    }

    /// Record a unicode keyboard event.  The keycode path usually posts the
    /// same key first; replace that guess with the authoritative value.
    pub fn post_unicode(&mut self, c: u32, now_ms: u64) {
        if let Some(last) = self.pending.last() {
            if !last.from_unicode {
                self.pending.pop();
            }
        }
        self.push(c, now_ms, true);
    }

    /// Record a key that was forwarded to the console, guessing its echo
    /// character from the qwerty main block.  Mirrors what the console's
    /// own keymap would produce closely enough to catch echoes.
    pub fn post_keycode(&mut self, keycode: u8, ss: u8, leds_numlock: bool, leds_capslock: bool, now_ms: u64) {
        let mut keycode = keycode;
        let mut ss = ss;

        if keycode == key::KEY_KPENTER as u8 {
            keycode = key::KEY_ENTER as u8;
        }

        // with numlock the keypad produces digits and operators
        if leds_numlock && ss & SS_ALT == 0 {
            const PADNUMBERS: [u8; 12] = [
                key::KEY_7 as u8,
                key::KEY_8 as u8,
                key::KEY_9 as u8,
                0,
                key::KEY_4 as u8,
                key::KEY_5 as u8,
                key::KEY_6 as u8,
                0,
                key::KEY_1 as u8,
                key::KEY_2 as u8,
                key::KEY_3 as u8,
                key::KEY_0 as u8,
            ];
            if keycode == key::KEY_KPASTERISK as u8 {
                keycode = key::KEY_8 as u8;
                ss = SS_SHIFT;
            } else if keycode == key::KEY_KPSLASH as u8 {
                keycode = key::KEY_SLASH as u8;
                ss = 0;
            } else if keycode == key::KEY_KPPLUS as u8 {
                keycode = key::KEY_EQUAL as u8;
                ss = SS_SHIFT;
            } else if keycode == key::KEY_KPMINUS as u8 {
                keycode = key::KEY_MINUS as u8;
                ss = 0;
            } else if keycode == key::KEY_KPDOT as u8 {
                keycode = key::KEY_DOT as u8;
                ss = 0;
            } else if keycode >= key::KEY_KP7 as u8 && keycode <= key::KEY_KP0 as u8 {
                keycode = PADNUMBERS[(keycode - key::KEY_KP7 as u8) as usize];
                ss = 0;
            }
        }

        if keycode > key::KEY_SPACE as u8 {
            return;
        }
        let Some(mut c) = main_block_char(keycode, ss & SS_SHIFT != 0) else {
            return;
        };
        if c == b'\r' {
            ss = 0;
        }
        // alt chords don't echo anything predictable
        if ss & SS_ALT != 0 {
            return;
        }
        if ss & SS_CTRL != 0 {
            if !c.is_ascii_alphabetic() {
                return;
            }
            c = (c | 0x20) - (b'a' - 1);
        }
        if leds_capslock && c.is_ascii_alphabetic() {
            c ^= 0x20;
        }
        self.push(c as u32, now_ms, false);
    }

    fn drop_front(&mut self, n: usize) {
        self.pending.drain(..n.min(self.pending.len()));
        if self.pending.is_empty() {
            self.state = State::Idle;
        }
    }

    /// Classify a console character.  0 = not echo, 1 = direct echo,
    /// 2 = indirect echo (a continuation like the spaces behind a tab).
    pub fn classify(&mut self, c: u32, now_ms: u64) -> u8 {
        // continuations depend only on the state machine
        match self.state {
            State::TabSpaces if c == ' ' as u32 => return 2,
            State::CrLf if c == '\n' as u32 => {
                self.state = State::Idle;
                return 2;
            }
            State::EscBracket if c == '[' as u32 => {
                self.state = State::Idle;
                return 2;
            }
            State::DelSpace if c == ' ' as u32 => {
                self.state = State::DelBack;
                return 2;
            }
            State::DelBack if c == 0x08 => {
                self.state = State::Idle;
                return 2;
            }
            _ => {}
        }

        self.state = State::Idle;
        if self.pending.is_empty() {
            return 0;
        }

        // shed expired keys
        let live_from = self
            .pending
            .iter()
            .position(|p| now_ms.saturating_sub(p.when_ms) <= EXPIRE_MS)
            .unwrap_or(self.pending.len());
        if live_from > 0 {
            self.drop_front(live_from);
            if self.pending.is_empty() {
                return 0;
            }
        }

        // multi-character echoes have to match on the first pending key
        let d = self.pending[0].unicode;
        if d == '\t' as u32 && c == ' ' as u32 {
            self.drop_front(1);
            self.state = State::TabSpaces;
            return 2;
        }
        if (d == '\r' as u32 || d == '\n' as u32) && c == '\r' as u32 {
            self.drop_front(1);
            self.state = State::CrLf;
            return 1;
        }
        if d == 0x1b && c == '^' as u32 {
            self.drop_front(1);
            self.state = State::EscBracket;
            return 2;
        }
        if (d == 0x08 || d == 0x7f) && c == 0x08 {
            self.drop_front(1);
            self.state = State::DelSpace;
            return 2;
        }

        for j in 0..self.pending.len() {
            if self.pending[j].unicode == c {
                self.drop_front(j + 1);
                return 1;
            }
        }

        // Tab completion: only match tab against an immediate space,
        // otherwise stop waiting for it.
        if d == '\t' as u32 {
            self.drop_front(1);
        }

        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_echo_is_class_one() {
        let mut e = EchoTracker::default();
        e.post_unicode('a' as u32, 0);
        assert_eq!(e.classify('a' as u32, 100), 1);
        // consumed: a second 'a' is plain output
        assert_eq!(e.classify('a' as u32, 100), 0);
    }

    #[test]
    fn expired_keys_do_not_echo() {
        let mut e = EchoTracker::default();
        e.post_unicode('a' as u32, 0);
        assert_eq!(e.classify('a' as u32, 3_500), 0);
    }

    #[test]
    fn return_echoes_cr_then_lf() {
        let mut e = EchoTracker::default();
        e.post_unicode('\r' as u32, 0);
        assert_eq!(e.classify('\r' as u32, 10), 1);
        assert_eq!(e.classify('\n' as u32, 10), 2);
        assert_eq!(e.classify('\n' as u32, 10), 0);
    }

    #[test]
    fn tab_matches_run_of_spaces() {
        let mut e = EchoTracker::default();
        e.post_unicode('\t' as u32, 0);
        assert_eq!(e.classify(' ' as u32, 5), 2);
        assert_eq!(e.classify(' ' as u32, 5), 2);
        // any other character leaves the state machine
        assert_eq!(e.classify('x' as u32, 5), 0);
    }

    #[test]
    fn backspace_echo_is_bs_space_bs() {
        let mut e = EchoTracker::default();
        e.post_unicode(0x7f, 0);
        assert_eq!(e.classify(0x08, 1), 2);
        assert_eq!(e.classify(' ' as u32, 1), 2);
        assert_eq!(e.classify(0x08, 1), 2);
        assert_eq!(e.classify(0x08, 1), 0);
    }

    #[test]
    fn keycode_path_guesses_shift_and_ctrl() {
        let mut e = EchoTracker::default();
        // shift-a on the main block
        e.post_keycode(key::KEY_A as u8, SS_SHIFT, false, false, 0);
        assert_eq!(e.classify('A' as u32, 1), 1);
        // control-d becomes 0x04
        e.post_keycode(key::KEY_D as u8, SS_CTRL, false, false, 2);
        assert_eq!(e.classify(4, 3), 1);
    }

    #[test]
    fn interposed_output_breaks_tab_match() {
        let mut e = EchoTracker::default();
        e.post_unicode('\t' as u32, 0);
        // tab must match a space immediately; an 'x' drops it
        assert_eq!(e.classify('x' as u32, 1), 0);
        assert_eq!(e.classify(' ' as u32, 1), 0);
    }
}
