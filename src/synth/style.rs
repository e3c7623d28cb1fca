// Synthesizer protocol families.  A style picks the framing for carriage
// return, the silence interrupt, index markers, and the volume / speed /
// pitch / voice parameter strings, all over a 0..9 scalar.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Style {
    /// no index markers, no parameters; text and CR only
    #[default]
    Generic,
    /// DoubleTalk, LiteTalk, TripleTalk
    DoubleTalk,
    /// DECtalk Express
    DecExpress,
    /// DECtalk PC
    DecPc,
    /// Braille 'n Speak
    Bns,
    /// Accent
    Ace,
    /// espeakup connector, speaks the DoubleTalk dialect
    Espeakup,
}

impl Style {
    /// Parse the short synth name used on the command line.
    pub fn from_name(name: &str) -> Option<Style> {
        Some(match name {
            "dbe" => Style::DoubleTalk,
            "dte" => Style::DecExpress,
            "dtp" => Style::DecPc,
            "bns" => Style::Bns,
            "ace" => Style::Ace,
            "esp" => Style::Espeakup,
            "generic" => Style::Generic,
            _ => return None,
        })
    }

    pub fn is_dec(self) -> bool {
        matches!(self, Style::DecExpress | Style::DecPc)
    }

    /// The index acknowledgement is a bare control-F with no label.
    pub fn bare_index_ack(self) -> bool {
        matches!(self, Style::Bns | Style::Ace)
    }

    /// Byte that silences the unit immediately.
    pub fn interrupt_byte(self) -> u8 {
        match self {
            Style::DoubleTalk | Style::Espeakup | Style::Bns | Style::Ace => 24,
            _ => 3,
        }
    }

    /// The "start speaking" terminator; DEC units want ^K first.
    pub fn cr_bytes(self) -> &'static [u8] {
        if self.is_dec() {
            b"\x0b\r"
        } else {
            b"\r"
        }
    }

    /// Encoded index marker for `label`, or empty when the style has none.
    pub fn index_bytes(self, label: u8) -> Vec<u8> {
        match self {
            Style::DoubleTalk | Style::Espeakup => format!("\x01{label}i").into_bytes(),
            Style::DecExpress | Style::DecPc => format!("[:i r {label}]").into_bytes(),
            Style::Bns | Style::Ace => vec![0x06],
            Style::Generic => Vec::new(),
        }
    }

    /// Power-on parameter values (volume, speed, pitch, voice).
    pub fn start_values(self) -> (i32, i32, i32, i32) {
        match self {
            Style::DoubleTalk | Style::Espeakup => (5, 5, 4, 0),
            Style::Bns | Style::Ace => (7, 5, 3, 0),
            _ => (5, 5, 3, 0),
        }
    }

    /// A setup string sent once after the port opens.
    pub fn init_string(self) -> Option<&'static str> {
        match self {
            Style::DoubleTalk => Some("\x01@ \x012b \x0126g \x012o \x0194i "),
            _ => None,
        }
    }

    pub fn volume_cmd(self, n: i32) -> Option<Vec<u8>> {
        if !(0..=9).contains(&n) {
            return None;
        }
        Some(match self {
            Style::DoubleTalk | Style::Espeakup => format!("\x01{n}v").into_bytes(),
            Style::DecPc => {
                let v = 10 + 8 * n;
                format!("[:vo set {v:02}]").into_bytes()
            }
            Style::DecExpress => {
                // the Express takes volume from 60 to 86
                let v = 60 + n * 72 / 25;
                format!("[:dv g5 {v:02}]").into_bytes()
            }
            Style::Bns => format!("\x05{:02}V", (n + 1) * 16 / 10).into_bytes(),
            Style::Ace => format!("\x1bA{n}").into_bytes(),
            Style::Generic => return None,
        })
    }

    pub fn speed_cmd(self, n: i32) -> Option<Vec<u8>> {
        if !(0..=9).contains(&n) {
            return None;
        }
        Some(match self {
            Style::DoubleTalk | Style::Espeakup => format!("\x01{n}s\x01{n}a").into_bytes(),
            Style::DecExpress | Style::DecPc => format!("[:ra {}]", 50 * n + 120).into_bytes(),
            Style::Bns => format!("\x05{:02}E", (n + 1) * 14 / 10).into_bytes(),
            Style::Ace => {
                const RATE: &[u8; 10] = b"02468ACEGH";
                vec![0x1b, b'R', RATE[n as usize]]
            }
            Style::Generic => return None,
        })
    }

    pub fn pitch_cmd(self, n: i32) -> Option<Vec<u8>> {
        if !(0..=9).contains(&n) {
            return None;
        }
        Some(match self {
            Style::DoubleTalk | Style::Espeakup => {
                format!("\x01{}p", 9 * n + 10).into_bytes()
            }
            Style::DecExpress | Style::DecPc => {
                const HERTZ: [i32; 10] = [66, 80, 98, 120, 144, 170, 200, 240, 290, 340];
                format!("[:dv ap {}]", HERTZ[n as usize]).into_bytes()
            }
            Style::Bns => format!("\x05{:02}P", (n + 1) * 6).into_bytes(),
            Style::Ace => format!("\x1bP{n}").into_bytes(),
            Style::Generic => return None,
        })
    }

    /// Voices 1..8 where supported.  Returns the command and the pitch the
    /// voice change implies, if any.
    pub fn voice_cmd(self, v: i32) -> Option<(Vec<u8>, Option<i32>)> {
        match self {
            Style::DoubleTalk | Style::Espeakup => {
                if !(1..=8).contains(&v) {
                    return None;
                }
                const PITCH: [i32; 10] = [2, 4, 2, 4, 6, 4, 5, 1, 8, 2];
                Some((format!("\x01{}o", v - 1).into_bytes(), Some(PITCH[v as usize])))
            }
            Style::DecExpress | Style::DecPc => {
                if !(1..=8).contains(&v) {
                    return None;
                }
                const CHARS: &[u8; 10] = b"xphfdburwk";
                const PITCH: [i32; 10] = [-1, 3, 1, 4, 3, 6, 7, 6, 2, 8];
                Some((
                    format!("[:n{}]", CHARS[v as usize] as char).into_bytes(),
                    Some(PITCH[v as usize]),
                ))
            }
            Style::Ace => {
                if !(1..=9).contains(&v) {
                    return None;
                }
                Some((format!("\x1bV{v}").into_bytes(), None))
            }
            _ => None,
        }
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Style::Generic => "generic",
            Style::DoubleTalk => "DoubleTalk",
            Style::DecExpress => "DECtalk Express",
            Style::DecPc => "DECtalk PC",
            Style::Bns => "Braille 'n Speak",
            Style::Ace => "Accent",
            Style::Espeakup => "espeakup",
        };
        f.write_str(name)
    }
}
