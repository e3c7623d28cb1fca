//! Continuous reading with index markers: the reader, the bridge, and a
//! memory-backed synthesizer working together.

use vcspeak::bridge::Bridge;
use vcspeak::commands::Reader;
use vcspeak::synth::{Style, Synth, SynthEvent};

fn setup(text: &str) -> (Bridge, Synth, Reader) {
    let mut bridge = Bridge::sim(vcspeak::bind::Lang::En);
    {
        let st = bridge.sim_mut().unwrap();
        for (i, c) in text.chars().enumerate() {
            st.vt_char(0, c as u32, i as u64);
        }
    }
    bridge.refresh().unwrap();
    bridge.buffer_mut().cursor = Some(0);
    let synth = Synth::memory(Style::DoubleTalk);
    (bridge, synth, Reader::default())
}

#[test]
fn read_command_tracks_the_cursor() {
    let (mut bridge, mut synth, mut reader) = setup("Hello world!\n");
    reader
        .execute(vcspeak::commands::SpeechCmd::Read, &mut bridge, &mut synth)
        .unwrap();
    assert!(reader.reading);
    assert!(synth.speaking());
    let wire = synth.take_output();
    assert!(String::from_utf8_lossy(&wire).starts_with("Hello "));

    // markers come home one by one; the cursor follows
    let first = synth.first_label();
    let ev = synth.receive(&[first]);
    assert_eq!(ev, vec![SynthEvent::Cursor { pos: 0, last: false }]);
    reader.on_synth_event(ev[0], &mut bridge, &mut synth).unwrap();
    assert_eq!(bridge.buffer().cursor, Some(0));

    let ev = synth.receive(&[first + 1]);
    assert_eq!(ev, vec![SynthEvent::Cursor { pos: 6, last: false }]);
    reader.on_synth_event(ev[0], &mut bridge, &mut synth).unwrap();
    assert_eq!(bridge.buffer().cursor, Some(6));
}

#[test]
fn finished_sentence_pulls_the_next_one() {
    let (mut bridge, mut synth, mut reader) = setup("one one\ntwo two\n");
    reader
        .execute(vcspeak::commands::SpeechCmd::Read, &mut bridge, &mut synth)
        .unwrap();
    let first = synth.first_label();
    let wire = String::from_utf8_lossy(&synth.take_output()).into_owned();
    // markers interleave with the tokens on the wire
    assert!(wire.starts_with("one "));

    // drain the first sentence's markers: "one"(0) "one"(4) "\n"(7)
    for label in [first, first + 1, first + 2] {
        for ev in synth.receive(&[label]) {
            reader.on_synth_event(ev, &mut bridge, &mut synth).unwrap();
        }
    }
    // the reader moved on to the second line by itself
    assert!(reader.reading);
    assert!(synth.speaking());
    let wire = String::from_utf8_lossy(&synth.take_output()).into_owned();
    assert!(wire.starts_with("two "), "next sentence sent: {wire:?}");
    assert_eq!(bridge.buffer().cursor, Some(8));

    // drain the second sentence; the buffer runs dry and reading stops
    let first = synth.first_label();
    for label in [first, first + 1, first + 2] {
        for ev in synth.receive(&[label]) {
            reader.on_synth_event(ev, &mut bridge, &mut synth).unwrap();
        }
    }
    assert!(!reader.reading);
    assert!(!synth.speaking());
}

#[test]
fn stop_command_interrupts() {
    let (mut bridge, mut synth, mut reader) = setup("a long long line\n");
    reader
        .execute(vcspeak::commands::SpeechCmd::Read, &mut bridge, &mut synth)
        .unwrap();
    synth.take_output();
    reader
        .execute(vcspeak::commands::SpeechCmd::Stop, &mut bridge, &mut synth)
        .unwrap();
    assert!(!reader.reading);
    assert!(!synth.speaking());
    // the interrupt byte went out
    assert_eq!(synth.take_output(), vec![24]);
    // a stale marker no longer moves anything
    assert!(synth.receive(&[1]).is_empty());
}

#[test]
fn word_and_line_commands_speak_and_move() {
    let (mut bridge, mut synth, mut reader) = setup("alpha beta\ngamma delta\n");
    reader
        .execute(vcspeak::commands::SpeechCmd::NextWord, &mut bridge, &mut synth)
        .unwrap();
    assert_eq!(bridge.buffer().cursor, Some(6));
    // the interrupt byte precedes the word
    let wire = synth.take_output();
    assert!(String::from_utf8_lossy(&wire).contains("beta"));

    reader
        .execute(vcspeak::commands::SpeechCmd::NextLine, &mut bridge, &mut synth)
        .unwrap();
    assert_eq!(bridge.buffer().cursor, Some(11));
    let wire = synth.take_output();
    // the whole line is spoken from its start
    let s = String::from_utf8_lossy(&wire);
    assert!(s.contains("gamma delta"), "spoke {s:?}");

    reader
        .execute(vcspeak::commands::SpeechCmd::CurrChar, &mut bridge, &mut synth)
        .unwrap();
    let wire = synth.take_output();
    assert!(String::from_utf8_lossy(&wire).ends_with("g\r"));
}

#[test]
fn boundary_motion_beeps_instead_of_moving() {
    let (mut bridge, mut synth, mut reader) = setup("x\n");
    bridge.buffer_mut().cursor = Some(0);
    reader
        .execute(vcspeak::commands::SpeechCmd::PrevChar, &mut bridge, &mut synth)
        .unwrap();
    // cursor stayed, and the boundary beeps went to the device
    assert_eq!(bridge.buffer().cursor, Some(0));
    let effects = bridge.sim_mut().unwrap().take_effects();
    assert!(!effects.is_empty());
}

#[test]
fn auto_read_arms_on_fresh_output() {
    let (mut bridge, mut synth, mut reader) = setup("prompt\n");
    reader
        .on_more_chars(0, 'x' as u32, &mut bridge, &mut synth)
        .unwrap();
    assert!(reader.go_read);

    // echoes of typed keys never trigger auto read
    reader.go_read = false;
    reader
        .on_more_chars(1, 'x' as u32, &mut bridge, &mut synth)
        .unwrap();
    assert!(!reader.go_read);

    // and neither does anything while suspended
    reader.suspended = true;
    reader
        .on_more_chars(0, 'x' as u32, &mut bridge, &mut synth)
        .unwrap();
    assert!(!reader.go_read);
}

#[test]
fn echo_mode_speaks_typed_characters() {
    let (mut bridge, mut synth, mut reader) = setup("x\n");
    reader.echo_mode = true;
    reader
        .on_more_chars(1, 'q' as u32, &mut bridge, &mut synth)
        .unwrap();
    let wire = synth.take_output();
    let s = String::from_utf8_lossy(&wire);
    // interrupt byte, then the character
    assert!(s.ends_with("q\r"));
    assert!(wire.contains(&24));
}

#[test]
fn overflow_while_reading_gives_up_gracefully() {
    let (mut bridge, mut synth, mut reader) = setup("some text to read\n");
    reader
        .execute(vcspeak::commands::SpeechCmd::Read, &mut bridge, &mut synth)
        .unwrap();
    synth.take_output();
    // the whole buffer gets replaced under our feet
    reader
        .on_action(
            &vcspeak::bridge::Action::Overflow { diff: None },
            &mut bridge,
            &mut synth,
        )
        .unwrap();
    // note: the bridge buffer itself still has a cursor here; the action
    // only tells the synth its markers are stale
    assert!(!synth.speaking());
    let first = synth.first_label();
    assert!(synth.receive(&[first]).is_empty());
}
