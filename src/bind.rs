// Key bindings and pronunciations.
//
// A chord (key code + 4-bit shift mask) folds into a modified key code,
// the index into the macro and speech-command tables.  This module also
// owns the punctuation and word-replacement dictionaries and the config
// line grammar that feeds all of them.
//
// The tables mirror what the intercept driver must be told; applying a
// config line therefore returns a list of key operations for the caller
// to send down to the device.

use crate::keynames::{DIGITS, LETTERS, NAMED_KEYS, NUMPAD, OTHER_CHARS, OTHER_CODES};
use crate::proto::{KEY_T, NUM_KEYS, SS_ALT, SS_CTRL, SS_LALT, SS_RALT, SS_SHIFT};
use input_linux_sys as key;
use std::fmt;

pub const MK_RANGE: usize = NUM_KEYS * 16;
/// Longest word the replacement dictionary accepts.
pub const WORD_LEN: usize = 18;
pub const DICT_WORDS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lang {
    #[default]
    En,
    De,
    PtBr,
}

impl Lang {
    /// Pick a language from a locale string like "de_DE.UTF-8".
    pub fn from_locale(locale: &str) -> Lang {
        let l = locale.to_ascii_lowercase();
        if l.starts_with("de") {
            Lang::De
        } else if l.starts_with("pt") {
            Lang::PtBr
        } else {
            Lang::En
        }
    }

    /// The word spliced into "dash length 23" style repeat tokens.
    pub fn length_word(self) -> &'static str {
        match self {
            Lang::En => " length ",
            Lang::De => " langes ",
            Lang::PtBr => " cumprimento ",
        }
    }
}

// ---- character classes over raw code points ----

pub fn is_alpha(c: u32) -> bool {
    char::from_u32(c).is_some_and(|ch| ch.is_alphabetic())
}

pub fn is_digit(c: u32) -> bool {
    (c as u8 as char).is_ascii_digit() && c < 0x80
}

pub fn is_alnum(c: u32) -> bool {
    is_alpha(c) || is_digit(c)
}

pub fn to_lower(c: u32) -> u32 {
    char::from_u32(c)
        .map(|ch| ch.to_lowercase().next().unwrap_or(ch) as u32)
        .unwrap_or(c)
}

/// Fold a code point down to lower-case ascii as best we can; the search
/// and word-replacement paths compare through this.
pub fn unaccent(c: u32) -> char {
    if c < 0x80 {
        return (c as u8 as char).to_ascii_lowercase();
    }
    match c {
        0xc0..=0xc6 | 0xe0..=0xe6 => 'a',
        0xc7 | 0xe7 => 'c',
        0xc8..=0xcb | 0xe8..=0xeb => 'e',
        0xcc..=0xcf | 0xec..=0xef => 'i',
        0xd0 | 0xf0 => 'd',
        0xd1 | 0xf1 => 'n',
        0xd2..=0xd6 | 0xd8 | 0xf2..=0xf6 | 0xf8 => 'o',
        0xd9..=0xdc | 0xf9..=0xfc => 'u',
        0xdd | 0xfd | 0xff => 'y',
        0xdf => 's',
        0xa0 => ' ',
        0x91 | 0x92 | 0x2018 | 0x2019 => '\'',
        0x93 | 0x94 | 0x201c | 0x201d => '`',
        0x95 | 0x2022 => '*',
        0x99 => '\'',
        0x113 => '`',
        0xad | 0x96 | 0x97 | 0x2010 | 0x2013 | 0x2014 => '-',
        _ => '~',
    }
}

fn is_vowel(c: char) -> bool {
    matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y')
}

// ---- modified key codes ----

pub fn build_mkcode(keycode: u8, ss: u8) -> Option<usize> {
    if keycode as usize >= NUM_KEYS || ss & !0xf != 0 {
        return None;
    }
    Some(ss as usize * NUM_KEYS + keycode as usize)
}

/// A parsed chord spelling, before it collapses to an mkcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chord {
    pub key: u8,
    pub ss: u8,
    /// the spelling used `@` (either alt); bindings duplicate to both alts
    pub ealt: bool,
}

/// Parse a chord spelling (`^F7`, `+#8`, `l@t`, `pagedown`...) off the
/// front of a config line.  Returns the chord and the rest of the line.
pub fn parse_chord(s: &str) -> Option<(Chord, &str)> {
    let b = s.as_bytes();
    let mut i = 0usize;
    let mut ss = 0u8;
    let mut ealt = false;

    loop {
        match b.get(i) {
            Some(b'+') => {
                ss |= SS_SHIFT;
                i += 1;
            }
            Some(b'^') => {
                ss |= SS_CTRL;
                i += 1;
            }
            Some(b'@') => {
                ss |= SS_ALT;
                ealt = true;
                i += 1;
            }
            Some(b'l') | Some(b'L') if b.get(i + 1) == Some(&b'@') => {
                ss |= SS_LALT;
                i += 2;
            }
            Some(b'r') | Some(b'R') if b.get(i + 1) == Some(&b'@') => {
                ss |= SS_RALT;
                i += 2;
            }
            _ => break,
        }
    }

    // function keys
    if matches!(b.get(i), Some(b'f') | Some(b'F')) && b.get(i + 1).is_some_and(u8::is_ascii_digit) {
        i += 1;
        let mut n = 0usize;
        while let Some(d) = b.get(i).filter(|d| d.is_ascii_digit()) {
            n = n * 10 + (d - b'0') as usize;
            i += 1;
        }
        if n == 0 || n > 12 {
            return None;
        }
        let keycode = if n <= 10 {
            key::KEY_F1 as u8 + n as u8 - 1
        } else {
            key::KEY_F11 as u8 + n as u8 - 11
        };
        return Some((Chord { key: keycode, ss, ealt }, &s[i..]));
    }

    // numpad
    if b.get(i) == Some(&b'#') {
        if let Some(&c) = b.get(i + 1) {
            if (b'*'..=b'9').contains(&c) && c != b',' {
                let keycode = NUMPAD[(c - b'*') as usize];
                if keycode != 0 {
                    return Some((Chord { key: keycode, ss, ealt }, &s[i + 2..]));
                }
            }
        }
        return None;
    }

    // named keys, case-insensitive, not followed by another letter
    for (name, &keycode) in NAMED_KEYS.entries() {
        let n = name.len();
        if s.len() - i >= n
            && s.is_char_boundary(i + n)
            && s[i..i + n].eq_ignore_ascii_case(name)
        {
            let next = b.get(i + n);
            if next.is_none_or(|c| !c.is_ascii_alphabetic()) {
                return Some((Chord { key: keycode, ss, ealt }, &s[i + n..]));
            }
        }
    }

    // the lower 48: only sensible when adjusted by control or alt
    if ss & (SS_ALT | SS_CTRL) == 0 {
        return None;
    }
    let c = *b.get(i)?;
    if let Some(&next) = b.get(i + 1) {
        if !matches!(next, b' ' | b'\t' | b'<' | b'|') {
            return None;
        }
    }
    let keycode = if c.is_ascii_alphabetic() {
        LETTERS[(c.to_ascii_lowercase() - b'a') as usize]
    } else if c.is_ascii_digit() {
        DIGITS[(c - b'0') as usize]
    } else {
        let pos = OTHER_CHARS.find(c as char)?;
        OTHER_CODES[pos]
    };
    Some((Chord { key: keycode, ss, ealt }, &s[i + 1..]))
}

// ---- errors ----

/// Numbered so a front end can localize the message per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// malformed directive
    Syntax,
    /// the speech command was rejected by the dispatcher
    UnknownCommand,
    /// tried to bind a key that can only go to the console
    Reserved,
    /// word or replacement longer than WORD_LEN
    WordTooLong,
    /// replacement dictionary is full
    DictFull,
    /// a punctuation mark needs a pronunciation
    NoPronunciation,
    /// not a code point you can pronounce
    BadPuncChar,
}

impl ConfigError {
    pub fn code(self) -> i32 {
        match self {
            ConfigError::Syntax => -1,
            ConfigError::UnknownCommand => -2,
            ConfigError::Reserved => -3,
            ConfigError::WordTooLong => -6,
            ConfigError::DictFull => -7,
            ConfigError::NoPronunciation => -8,
            ConfigError::BadPuncChar => -9,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ConfigError::Syntax => "syntax error",
            ConfigError::UnknownCommand => "unknown speech command",
            ConfigError::Reserved => "this key cannot be captured without a modifier",
            ConfigError::WordTooLong => "word too long",
            ConfigError::DictFull => "replacement dictionary is full",
            ConfigError::NoPronunciation => "punctuation needs a pronunciation",
            ConfigError::BadPuncChar => "cannot set a pronunciation for that character",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for ConfigError {}

/// Key operations a config line implies; the caller sends them to the
/// intercept device so the tables stay in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOp {
    Set { key: u8, ss: u8 },
    Unset { key: u8, ss: u8 },
    Meta { key: u8, mask: u8 },
    ClearAll,
}

/// Validates (and may canonicalize) a speech command string.
pub type SyntaxChecker<'a> = dyn Fn(&str) -> Option<String> + 'a;

// ---- the binding tables ----

pub struct Bindings {
    macros: Vec<Option<String>>,
    speech: Vec<Option<String>>,
    /// user meta keys and pass-through bits, mirroring the driver
    ismeta: [u8; NUM_KEYS],
    passt: [u16; NUM_KEYS],
    punc: Vec<(u32, String)>,
    words: Vec<(String, String)>,
    pub lang: Lang,
}

impl Default for Bindings {
    fn default() -> Self {
        let mut b = Bindings {
            macros: vec![None; MK_RANGE],
            speech: vec![None; MK_RANGE],
            ismeta: [0; NUM_KEYS],
            passt: [0; NUM_KEYS],
            punc: Vec::new(),
            words: Vec::new(),
            lang: Lang::En,
        };
        b.seed_punctuation();
        b
    }
}

impl Bindings {
    pub fn with_lang(lang: Lang) -> Bindings {
        let mut b = Bindings { lang, ..Default::default() };
        b.punc.clear();
        b.seed_punctuation();
        b
    }

    // macros

    pub fn set_macro(&mut self, mkcode: usize, s: &str) {
        if mkcode < MK_RANGE {
            self.speech[mkcode] = None;
            self.macros[mkcode] = Some(s.to_string());
        }
    }

    pub fn get_macro(&self, mkcode: usize) -> Option<&str> {
        self.macros.get(mkcode)?.as_deref()
    }

    pub fn clear_macro(&mut self, mkcode: usize) {
        if mkcode < MK_RANGE {
            self.macros[mkcode] = None;
        }
    }

    // speech commands

    pub fn set_speech(&mut self, mkcode: usize, s: &str) {
        if mkcode < MK_RANGE {
            self.macros[mkcode] = None;
            self.speech[mkcode] = Some(s.to_string());
        }
    }

    pub fn get_speech(&self, mkcode: usize) -> Option<&str> {
        self.speech.get(mkcode)?.as_deref()
    }

    pub fn clear_speech(&mut self, mkcode: usize) {
        if mkcode < MK_RANGE {
            self.speech[mkcode] = None;
        }
    }

    // punctuation pronunciations

    pub fn set_punc(&mut self, c: u32, name: &str) {
        self.clear_punc(c);
        self.punc.push((c, name.to_string()));
    }

    pub fn get_punc(&self, c: u32) -> Option<&str> {
        self.punc
            .iter()
            .find(|(p, _)| *p == c)
            .map(|(_, n)| n.as_str())
    }

    pub fn clear_punc(&mut self, c: u32) {
        self.punc.retain(|(p, _)| *p != c);
    }

    // word replacements

    fn lower_word(&self, w: &str) -> Result<String, ConfigError> {
        let mut out = String::new();
        for ch in w.chars() {
            if !ch.is_alphabetic() {
                return Err(ConfigError::Syntax);
            }
            out.extend(ch.to_lowercase());
            if out.chars().count() > WORD_LEN {
                return Err(ConfigError::WordTooLong);
            }
        }
        Ok(out)
    }

    /// Install, replace, or (with None) remove a replacement.
    pub fn set_word(&mut self, word: &str, replacement: Option<&str>) -> Result<(), ConfigError> {
        let key = self.lower_word(word)?;
        if let Some(r) = replacement {
            if r.chars().count() > WORD_LEN {
                return Err(ConfigError::WordTooLong);
            }
        }
        let found = self.words.iter().position(|(w, _)| *w == key);
        match (found, replacement) {
            (Some(i), Some(r)) => self.words[i].1 = r.to_string(),
            (Some(i), None) => {
                self.words.remove(i);
            }
            (None, Some(r)) => {
                if self.words.len() == DICT_WORDS {
                    return Err(ConfigError::DictFull);
                }
                self.words.push((key, r.to_string()));
            }
            (None, None) => {}
        }
        Ok(())
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    pub fn lookup_word(&self, lower: &str) -> Option<&str> {
        self.words
            .iter()
            .find(|(w, _)| w == lower)
            .map(|(_, r)| r.as_str())
    }

    /// Dictionary replacement with English suffix awareness: if "computer"
    /// goes to "compeuter", "computers" follows along.
    pub fn replace_word(&self, word: &[u32]) -> Option<Vec<u32>> {
        if word.len() > WORD_LEN {
            return None;
        }
        let mut lower = String::new();
        for &c in word {
            let ch = char::from_u32(c)?;
            if !ch.is_alphabetic() {
                return None;
            }
            lower.extend(ch.to_lowercase());
        }
        if let Some(r) = self.lookup_word(&lower) {
            return Some(r.chars().map(|c| c as u32).collect());
        }

        if self.lang != Lang::En {
            return None;
        }
        let mut root: Vec<char> = lower.chars().collect();
        let suffix = mkroot_english(&mut root);
        if suffix == 0 {
            return None;
        }
        let root_str: String = root.iter().collect();
        let r = self.lookup_word(&root_str)?;
        // can't reattach a suffix around punctuation or digits
        let mut rebuilt: Vec<char> = r.chars().collect();
        if rebuilt.iter().any(|&c| c != ' ' && !c.is_alphabetic()) {
            return None;
        }
        reconst_english(&mut rebuilt, suffix);
        Some(rebuilt.iter().map(|&c| c as u32).collect())
    }

    // suspension

    /// Uncapture everything except chords bound to the speech command
    /// `except` and macros that run system commands.
    pub fn suspend_ops(&self, except: &str) -> Vec<KeyOp> {
        let mut ops = vec![KeyOp::ClearAll];
        for ss in 0..16u8 {
            for keycode in 0..NUM_KEYS as u8 {
                let mk = ss as usize * NUM_KEYS + keycode as usize;
                if self.get_speech(mk) == Some(except) {
                    ops.push(KeyOp::Set { key: keycode, ss });
                }
                if self.get_macro(mk).is_some_and(|m| m.starts_with('|')) {
                    ops.push(KeyOp::Set { key: keycode, ss });
                }
            }
        }
        ops
    }

    /// Re-capture everything that has a binding, with its T flag, and
    /// restore user metas.
    pub fn resume_ops(&self) -> Vec<KeyOp> {
        let mut ops = vec![KeyOp::ClearAll];
        for keycode in 0..NUM_KEYS as u8 {
            if self.ismeta[keycode as usize] != 0 {
                ops.push(KeyOp::Meta { key: keycode, mask: self.ismeta[keycode as usize] });
            }
            for ss in 0..16u8 {
                let mk = ss as usize * NUM_KEYS + keycode as usize;
                if self.get_speech(mk).is_some() || self.get_macro(mk).is_some() {
                    let tee = if self.passt[keycode as usize] & (1 << ss) != 0 {
                        KEY_T
                    } else {
                        0
                    };
                    ops.push(KeyOp::Set { key: keycode, ss: ss | tee });
                }
            }
        }
        ops
    }

    /// Wipe everything and reseed the language's punctuation defaults.
    pub fn reset(&mut self) -> Vec<KeyOp> {
        self.macros.iter_mut().for_each(|m| *m = None);
        self.speech.iter_mut().for_each(|m| *m = None);
        self.ismeta = [0; NUM_KEYS];
        self.passt = [0; NUM_KEYS];
        self.words.clear();
        self.punc.clear();
        self.seed_punctuation();
        vec![KeyOp::ClearAll]
    }

    fn seed_punctuation(&mut self) {
        let table: &[(u32, &str)] = match self.lang {
            Lang::En => ENGLISH_PUNC,
            Lang::De => GERMAN_PUNC,
            Lang::PtBr => PORTUGUESE_PUNC,
        };
        for &(c, name) in table {
            self.punc.push((c, name.to_string()));
        }
    }

    // ---- the config line grammar ----

    /// Process one configuration line.  On success returns the key
    /// operations to forward to the intercept device.
    pub fn line_configure(
        &mut self,
        line: &str,
        syntax: Option<&SyntaxChecker>,
    ) -> Result<Vec<KeyOp>, ConfigError> {
        let s = line.trim_start();
        if s.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(rest) = s.strip_prefix('#') {
            let next = rest.chars().next();
            match next {
                // `## name` sets the pronunciation of '#'
                Some('#') if rest[1..].starts_with([' ', '\t']) => {
                    let name = rest[1..].trim();
                    if name.is_empty() {
                        return Err(ConfigError::NoPronunciation);
                    }
                    self.set_punc('#' as u32, name);
                    return Ok(Vec::new());
                }
                // `#5`, `#.` and friends are numpad chords; fall through
                Some(c) if c.is_ascii_digit() || ".+-*/".contains(c) => {}
                _ => return Ok(Vec::new()), // comment
            }
        }

        if let Some((chord, rest)) = parse_chord(s) {
            return self.configure_key(chord, rest, syntax);
        }

        // pronunciation of a punctuation mark or a word
        let mut parts = s.splitn(2, [' ', '\t']);
        let token = parts.next().unwrap();
        let rest = parts.next().map(str::trim).unwrap_or("");

        let mut chars = token.chars();
        let first = chars.next().unwrap();
        let single = chars.next().is_none();

        let target = if single {
            Some(first as u32)
        } else if first == 'u' && token[1..].chars().all(|c| c.is_ascii_digit()) {
            token[1..].parse::<u32>().ok()
        } else if first == 'x' && token[1..].chars().all(|c| c.is_ascii_hexdigit()) {
            u32::from_str_radix(&token[1..], 16).ok()
        } else {
            None
        };

        if let Some(c) = target {
            if !single && char::from_u32(c).is_none() {
                return Err(ConfigError::BadPuncChar);
            }
            if c <= ' ' as u32 || c >= 0x7fff_ffff || is_alnum(c) {
                // a letter token of length one is a word, not punctuation
                if single && is_alpha(c) {
                    return self.configure_word(token, rest);
                }
                return Err(ConfigError::BadPuncChar);
            }
            if rest.is_empty() {
                return Err(ConfigError::NoPronunciation);
            }
            self.set_punc(c, rest);
            return Ok(Vec::new());
        }

        self.configure_word(token, rest)
    }

    fn configure_word(&mut self, word: &str, rest: &str) -> Result<Vec<KeyOp>, ConfigError> {
        if rest.starts_with('<') || rest.starts_with('|') {
            // looks like a macro for a key we can never capture
            return Err(ConfigError::Reserved);
        }
        if rest.is_empty() {
            self.set_word(word, None)?;
        } else {
            self.set_word(word, Some(rest))?;
        }
        Ok(Vec::new())
    }

    fn configure_key(
        &mut self,
        chord: Chord,
        rest: &str,
        syntax: Option<&SyntaxChecker>,
    ) -> Result<Vec<KeyOp>, ConfigError> {
        let rest = rest.trim_start();

        // a bare run of shift prefixes declares a user meta key
        if chord.ss == 0 && !rest.is_empty() {
            if let Some(mask) = parse_meta_mask(rest) {
                self.ismeta[chord.key as usize] = mask;
                return Ok(vec![KeyOp::Meta { key: chord.key, mask }]);
            }
        }

        // with `@`, bind both left and right alt
        let states: Vec<u8> = if chord.ealt {
            vec![chord.ss & !SS_RALT, chord.ss & !SS_LALT]
        } else {
            vec![chord.ss]
        };

        let first = rest.chars().next();

        if matches!(first, Some('<') | Some('|')) {
            if rest[1..].is_empty() {
                return Ok(self.clear_binding(chord, &states));
            }
            // the pipe stays in the macro; it marks a shell command
            let text = if first == Some('<') { &rest[1..] } else { rest };
            let mut ops = Vec::new();
            for &ss in &states {
                let mk = build_mkcode(chord.key, ss).ok_or(ConfigError::Syntax)?;
                self.set_macro(mk, text);
                self.passt[chord.key as usize] &= !(1 << ss);
                ops.push(KeyOp::Set { key: chord.key, ss });
            }
            return Ok(ops);
        }

        let (tee, rest) = match rest.strip_prefix('T') {
            Some(r) if r.starts_with([' ', '\t']) => (true, r.trim_start()),
            _ => (false, rest),
        };

        if rest.is_empty() {
            return Ok(self.clear_binding(chord, &states));
        }

        // a speech command of the caller's design
        let command = match syntax {
            Some(check) => check(rest).ok_or(ConfigError::UnknownCommand)?,
            None => rest.to_string(),
        };
        let mut ops = Vec::new();
        for &ss in &states {
            let mk = build_mkcode(chord.key, ss).ok_or(ConfigError::Syntax)?;
            self.set_speech(mk, &command);
            if tee {
                self.passt[chord.key as usize] |= 1 << ss;
            } else {
                self.passt[chord.key as usize] &= !(1 << ss);
            }
            ops.push(KeyOp::Set { key: chord.key, ss: ss | if tee { KEY_T } else { 0 } });
        }
        Ok(ops)
    }

    fn clear_binding(&mut self, chord: Chord, states: &[u8]) -> Vec<KeyOp> {
        let mut ops = Vec::new();
        for &ss in states {
            if let Some(mk) = build_mkcode(chord.key, ss) {
                self.clear_macro(mk);
                self.clear_speech(mk);
            }
            self.passt[chord.key as usize] &= !(1 << ss);
            ops.push(KeyOp::Unset { key: chord.key, ss });
        }
        if chord.ss == 0 {
            self.ismeta[chord.key as usize] = 0;
            ops.push(KeyOp::Meta { key: chord.key, mask: 0 });
        }
        ops
    }
}

/// `+^`, `l@`, `r@+` and the like: the simulated state a meta key holds.
fn parse_meta_mask(s: &str) -> Option<u8> {
    let b = s.trim_end().as_bytes();
    let mut mask = 0u8;
    let mut i = 0usize;
    while i < b.len() {
        match b[i] {
            b'+' => {
                mask |= SS_SHIFT;
                i += 1;
            }
            b'^' => {
                mask |= SS_CTRL;
                i += 1;
            }
            b'l' | b'L' if b.get(i + 1) == Some(&b'@') => {
                mask |= SS_LALT;
                i += 2;
            }
            b'r' | b'R' if b.get(i + 1) == Some(&b'@') => {
                mask |= SS_RALT;
                i += 2;
            }
            _ => return None,
        }
    }
    if mask == 0 {
        None
    } else {
        Some(mask)
    }
}

// ---- English root words ----

/// Strip a common suffix, leaving the root in `word`.  Returns a suffix
/// code for reconst_english, or 0 if nothing safe could be removed.
fn mkroot_english(word: &mut Vec<char>) -> u8 {
    let wdlen = word.len();
    if wdlen < 5 {
        return 0;
    }
    let l = wdlen - 5;
    let (l0, l1, l2, l3, l4) = (word[l], word[l + 1], word[l + 2], word[l + 3], word[l + 4]);

    if l4 == 's' {
        if matches!(l3, 's' | 'i' | 'a' | 'u') {
            return 0;
        }
        if l3 == '\'' {
            word.truncate(l + 3);
            return 11;
        }
        if l3 == 'e' {
            if l2 == 'i' {
                word[l + 2] = 'y';
                word.truncate(l + 3);
                return 3;
            }
            if matches!(l2, 's' | 'h' | 'z') {
                word.truncate(l + 3);
                return 2;
            }
        }
        word.truncate(l + 4);
        return 1;
    }

    if l == 0 {
        return 0;
    }

    if l4 == 'l' && l3 == 'l' && l2 == '\'' {
        word.truncate(l + 2);
        return 12;
    }

    if l4 == 'g' {
        if l3 != 'n' || l2 != 'i' {
            return 0;
        }
        if !is_vowel(l1) {
            if l1 == l0 {
                word.truncate(l + 1);
                return 5;
            }
            if is_vowel(l0) && l0 < 'w' && !is_vowel(word[l - 1]) {
                word[l + 2] = 'e';
                word.truncate(l + 3);
                return 6;
            }
        }
        word.truncate(l + 2);
        return 4;
    }

    if l4 == 'd' {
        if l3 != 'e' {
            return 0;
        }
        if l2 == 'i' {
            word[l + 2] = 'y';
            word.truncate(l + 3);
            return 10;
        }
        if !is_vowel(l2) {
            if l2 == l1 {
                word.truncate(l + 2);
                return 8;
            }
            if is_vowel(l1) && l1 < 'w' && !is_vowel(l0) {
                word.truncate(l + 4);
                return 7;
            }
        }
        word.truncate(l + 3);
        return 9;
    }

    0
}

/// Put the suffix that mkroot_english removed back onto a replacement.
fn reconst_english(word: &mut Vec<char>, suffix: u8) {
    const SUFTAB: &str = "s   es  ies ing ing ing d   ed  ed  ied 's  'll ";
    const SUFDROP: &[u8] = b"  y  e   y  ";
    const SUFDOUBLE: [bool; 12] =
        [false, false, false, false, true, false, false, true, false, false, false, false];

    let r = (suffix - 1) as usize;
    if SUFDOUBLE[r] {
        if let Some(&c) = word.last() {
            word.push(c);
        }
    }
    if word.last() == Some(&(SUFDROP[r] as char)) {
        word.pop();
    }
    for ch in SUFTAB[4 * r..4 * r + 4].chars() {
        if ch == ' ' {
            break;
        }
        word.push(ch);
    }
}

// ---- default pronunciations per language ----

static ENGLISH_PUNC: &[(u32, &str)] = &[
    (7, "bell"),
    (8, "backspace"),
    (9, "tab"),
    (10, "newline"),
    (12, "formfeed"),
    (13, "return"),
    (27, "escape"),
    (' ' as u32, "space"),
    ('!' as u32, "bang"),
    ('"' as u32, "quote"),
    ('#' as u32, "pound"),
    ('$' as u32, "dollar"),
    ('%' as u32, "percent"),
    ('&' as u32, "and"),
    ('\'' as u32, "apostrophe"),
    ('(' as u32, "left paren"),
    (')' as u32, "right paren"),
    ('*' as u32, "star"),
    ('+' as u32, "plus"),
    (',' as u32, "comma"),
    ('-' as u32, "dash"),
    ('.' as u32, "period"),
    ('/' as u32, "slash"),
    (':' as u32, "colon"),
    (';' as u32, "semicolon"),
    ('<' as u32, "less than"),
    ('=' as u32, "equals"),
    ('>' as u32, "greater than"),
    ('?' as u32, "question mark"),
    ('@' as u32, "at sign"),
    ('[' as u32, "left bracket"),
    ('\\' as u32, "backslash"),
    (']' as u32, "right bracket"),
    ('^' as u32, "up arrow"),
    ('_' as u32, "underscore"),
    ('`' as u32, "backquote"),
    ('{' as u32, "left brace"),
    ('|' as u32, "pipe"),
    ('}' as u32, "right brace"),
    ('~' as u32, "tilde"),
    (0x7f, "delete"),
    (0xa0, "break space"),
    (0xa1, "bang up"),
    (0xa2, "cents"),
    (0xa3, "pounds"),
    (0xa4, "currency"),
    (0xa5, "yen"),
    (0xa6, "broken bar"),
    (0xa7, "section"),
    (0xa8, "diaeresis"),
    (0xa9, "copyright"),
    (0xab, "left arrow"),
    (0xac, "not"),
    (0xad, "soft hyphen"),
    (0xae, "registered"),
    (0xaf, "macron"),
    (0xb0, "degrees"),
    (0xb1, "plus minus"),
    (0xb2, "squared"),
    (0xb3, "cubed"),
    (0xb4, "acute"),
    (0xb5, "micro"),
    (0xb6, "pilcrow"),
    (0xb7, "bullet"),
    (0xb8, "cedilla"),
    (0xbb, "right arrow"),
    (0xbc, "one fourth"),
    (0xbd, "one half"),
    (0xbe, "three fourths"),
    (0xbf, "question up"),
    (0xd7, "times"),
    (0xf7, "divided by"),
];

static GERMAN_PUNC: &[(u32, &str)] = &[
    (7, "Piepsen"),
    (8, "R\u{fc}cktaste"),
    (9, "Tab"),
    (10, "Zeilenumbruch"),
    (12, "Seitenvorschub"),
    (13, "Eingabe"),
    (27, "Escape"),
    (' ' as u32, "Leerzeichen"),
    ('!' as u32, "Ausrufezeichen"),
    ('"' as u32, "Anf\u{fc}hrungszeichen"),
    ('#' as u32, "Raute"),
    ('$' as u32, "Dollar"),
    ('%' as u32, "Prozent"),
    ('&' as u32, "und"),
    ('\'' as u32, "Apostroph"),
    ('(' as u32, "linke runde Klammer"),
    (')' as u32, "rechte runde Klammer"),
    ('*' as u32, "Stern"),
    ('+' as u32, "Plus"),
    (',' as u32, "Komma"),
    ('-' as u32, "Strich"),
    ('.' as u32, "Punkt"),
    ('/' as u32, "Schr\u{e4}gstrich"),
    (':' as u32, "Doppelpunkt"),
    (';' as u32, "Semikolon"),
    ('<' as u32, "kleiner als"),
    ('=' as u32, "gleich"),
    ('>' as u32, "gr\u{f6}\u{df}er als"),
    ('?' as u32, "Fragezeichen"),
    ('@' as u32, "Klammeraffe"),
    ('[' as u32, "eckige Klammer auf"),
    ('\\' as u32, "umgekehrter Schr\u{e4}gstrich"),
    (']' as u32, "eckige Klammer zu"),
    ('^' as u32, "Zirkumflex"),
    ('_' as u32, "Unterstrich"),
    ('`' as u32, "Gravis"),
    ('{' as u32, "geschweifte Klammer auf"),
    ('|' as u32, "senkrechter Strich"),
    ('}' as u32, "geschweifte Klammer zu"),
    ('~' as u32, "Tilde"),
    (0x7f, "entfernen"),
    (0xb0, "Grad"),
    (0xb1, "Plus Minus"),
    (0xd7, "mal"),
    (0xf7, "geteilt durch"),
];

static PORTUGUESE_PUNC: &[(u32, &str)] = &[
    (7, "bipe"),
    (9, "tab"),
    (10, "linha nova"),
    (13, "enter"),
    (27, "esc"),
    (' ' as u32, "espa\u{e7}o"),
    ('!' as u32, "exclama\u{e7}\u{e3}o"),
    ('"' as u32, "aspas"),
    ('#' as u32, "cardinal"),
    ('$' as u32, "cifr\u{e3}o"),
    ('%' as u32, "por cento"),
    ('&' as u32, "e"),
    ('\'' as u32, "ap\u{f3}strofo"),
    ('(' as u32, "abre par\u{ea}nteses"),
    (')' as u32, "fecha par\u{ea}nteses"),
    ('*' as u32, "asterisco"),
    ('+' as u32, "mais"),
    (',' as u32, "v\u{ed}rgula"),
    ('-' as u32, "h\u{ed}fen"),
    ('.' as u32, "ponto"),
    ('/' as u32, "barra"),
    (':' as u32, "dois pontos"),
    (';' as u32, "ponto e v\u{ed}rgula"),
    ('<' as u32, "menor"),
    ('=' as u32, "igual"),
    ('>' as u32, "maior"),
    ('?' as u32, "interroga\u{e7}\u{e3}o"),
    ('@' as u32, "arroba"),
    ('[' as u32, "abre colchetes"),
    ('\\' as u32, "barra invertida"),
    (']' as u32, "fecha colchetes"),
    ('^' as u32, "circunflexo"),
    ('_' as u32, "sublinhado"),
    ('`' as u32, "grave"),
    ('{' as u32, "abre chaves"),
    ('|' as u32, "barra vertical"),
    ('}' as u32, "fecha chaves"),
    ('~' as u32, "til"),
    (0x7f, "delete"),
    (0xd7, "vezes"),
    (0xf7, "dividido por"),
];
