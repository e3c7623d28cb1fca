// Key code tables shared by the config parser, the echo tracker, and the
// keystring collector.  Key codes are the Linux input codes from
// input-linux-sys, which all fit in a u8 for the capturable range.

use input_linux_sys as key;

/// Named keys accepted in config-file chord spellings, e.g. `^home`.
pub static NAMED_KEYS: phf::Map<&'static str, u8> = phf::phf_map! {
    "up" => key::KEY_UP as u8,
    "left" => key::KEY_LEFT as u8,
    "right" => key::KEY_RIGHT as u8,
    "down" => key::KEY_DOWN as u8,
    "home" => key::KEY_HOME as u8,
    "end" => key::KEY_END as u8,
    "pageup" => key::KEY_PAGEUP as u8,
    "pagedown" => key::KEY_PAGEDOWN as u8,
    "insert" => key::KEY_INSERT as u8,
    "delete" => key::KEY_DELETE as u8,
    "leftmeta" => key::KEY_LEFTMETA as u8,
    "rightmeta" => key::KEY_RIGHTMETA as u8,
    "scroll" => key::KEY_SCROLLLOCK as u8,
    "pause" => key::KEY_PAUSE as u8,
    "sysrq" => key::KEY_SYSRQ as u8,
};

/// Keypad keys in the order `* + <unused> - . / 0 1 .. 9`, indexed by
/// `c - '*'` for the spelling `#<c>`.
pub static NUMPAD: [u8; 16] = [
    key::KEY_KPASTERISK as u8,
    key::KEY_KPPLUS as u8,
    0,
    key::KEY_KPMINUS as u8,
    key::KEY_KPDOT as u8,
    key::KEY_KPSLASH as u8,
    key::KEY_KP0 as u8,
    key::KEY_KP1 as u8,
    key::KEY_KP2 as u8,
    key::KEY_KP3 as u8,
    key::KEY_KP4 as u8,
    key::KEY_KP5 as u8,
    key::KEY_KP6 as u8,
    key::KEY_KP7 as u8,
    key::KEY_KP8 as u8,
    key::KEY_KP9 as u8,
];

pub static LETTERS: [u8; 26] = [
    key::KEY_A as u8,
    key::KEY_B as u8,
    key::KEY_C as u8,
    key::KEY_D as u8,
    key::KEY_E as u8,
    key::KEY_F as u8,
    key::KEY_G as u8,
    key::KEY_H as u8,
    key::KEY_I as u8,
    key::KEY_J as u8,
    key::KEY_K as u8,
    key::KEY_L as u8,
    key::KEY_M as u8,
    key::KEY_N as u8,
    key::KEY_O as u8,
    key::KEY_P as u8,
    key::KEY_Q as u8,
    key::KEY_R as u8,
    key::KEY_S as u8,
    key::KEY_T as u8,
    key::KEY_U as u8,
    key::KEY_V as u8,
    key::KEY_W as u8,
    key::KEY_X as u8,
    key::KEY_Y as u8,
    key::KEY_Z as u8,
];

pub static DIGITS: [u8; 10] = [
    key::KEY_0 as u8,
    key::KEY_1 as u8,
    key::KEY_2 as u8,
    key::KEY_3 as u8,
    key::KEY_4 as u8,
    key::KEY_5 as u8,
    key::KEY_6 as u8,
    key::KEY_7 as u8,
    key::KEY_8 as u8,
    key::KEY_9 as u8,
];

pub static OTHER_CHARS: &str = "`-=[]';,./";

pub static OTHER_CODES: [u8; 10] = [
    key::KEY_GRAVE as u8,
    key::KEY_MINUS as u8,
    key::KEY_EQUAL as u8,
    key::KEY_LEFTBRACE as u8,
    key::KEY_RIGHTBRACE as u8,
    key::KEY_APOSTROPHE as u8,
    key::KEY_SEMICOLON as u8,
    key::KEY_COMMA as u8,
    key::KEY_DOT as u8,
    key::KEY_SLASH as u8,
];

/// The main block of a qwerty keyboard by key code, unshifted and shifted.
/// A space in any position other than KEY_SPACE means "no printable char".
/// Used to guess echo characters and to collect typed strings; the same
/// assumption the original stack makes.
pub static LOWERCODE: &[u8; 58] =
    b" \x1b1234567890-=\x08\tqwertyuiop[]\r asdfghjkl;'` \\zxcvbnm,./    ";
pub static UPPERCODE: &[u8; 58] =
    b" \x1b!@#$%^&*()_+\x08\tQWERTYUIOP{}\r ASDFGHJKL:\"~ |ZXCVBNM<>?    ";

/// Printable (or control) character for a key in the main block, or None.
pub fn main_block_char(keycode: u8, shifted: bool) -> Option<u8> {
    let table = if shifted { UPPERCODE } else { LOWERCODE };
    let c = *table.get(keycode as usize)?;
    if c == b' ' && keycode != key::KEY_SPACE as u8 {
        return None;
    }
    Some(c)
}

/// Spelling for a key code, for error messages and the debug log.
pub static KEY_LABELS: phf::Map<u8, &'static str> = phf::phf_map! {
    1u8 => "escape",
    14u8 => "backspace",
    15u8 => "tab",
    28u8 => "enter",
    57u8 => "space",
    59u8 => "F1",
    60u8 => "F2",
    61u8 => "F3",
    62u8 => "F4",
    63u8 => "F5",
    64u8 => "F6",
    65u8 => "F7",
    66u8 => "F8",
    67u8 => "F9",
    68u8 => "F10",
    87u8 => "F11",
    88u8 => "F12",
    102u8 => "home",
    103u8 => "up",
    104u8 => "pageup",
    105u8 => "left",
    106u8 => "right",
    107u8 => "end",
    108u8 => "down",
    109u8 => "pagedown",
    110u8 => "insert",
    111u8 => "delete",
};

pub fn key_label(keycode: u8) -> &'static str {
    KEY_LABELS.get(&keycode).copied().unwrap_or("?")
}
