use super::*;
use crate::proto::{decode_events, Event};

fn opened() -> InterceptState {
    let mut st = InterceptState::with_capacity(1024);
    st.open().unwrap();
    // swallow the startup FGC notice
    let _ = st.read(4096);
    st
}

fn type_text(st: &mut InterceptState, text: &str, mut now: u64) -> u64 {
    for ch in text.chars() {
        st.vt_char(0, ch as u32, now);
        now += 1;
    }
    now
}

#[test]
fn open_is_exclusive() {
    let mut st = InterceptState::default();
    st.open().unwrap();
    assert!(st.open().is_err());
    st.close();
    assert!(st.open().is_ok());
}

#[test]
fn open_reports_foreground_console() {
    let mut st = InterceptState::default();
    st.open().unwrap();
    let ev = decode_events(&st.read(4096));
    assert_eq!(ev, vec![Event::Fgc(1)]);
}

#[test]
fn captured_key_is_swallowed_and_queued() {
    let mut st = opened();
    st.write(&crate::proto::cmd::set_key(61, 0x01)); // shift F3
    assert!(!st.key_down(61, 0x01, 0, 0));
    let ev = decode_events(&st.read(4096));
    assert_eq!(ev, vec![Event::Keystroke { key: 61, ss: 0x01, leds: 0 }]);
}

#[test]
fn uncaptured_shift_state_passes_through() {
    let mut st = opened();
    st.write(&crate::proto::cmd::set_key(61, 0x01));
    // control F3 is not captured
    assert!(st.key_down(61, 0x04, 0, 0));
    assert!(!st.poll_ready());
}

#[test]
fn tee_flag_captures_and_forwards() {
    let mut st = opened();
    st.write(&crate::proto::cmd::set_key(20, 0x04 | KEY_T)); // ^T, pass through
    assert!(st.key_down(20, 0x04, 0, 0));
    let ev = decode_events(&st.read(4096));
    assert_eq!(ev, vec![Event::Keystroke { key: 20, ss: 0x04, leds: 0 }]);
}

#[test]
fn bypass_is_one_shot() {
    let mut st = opened();
    st.write(&crate::proto::cmd::set_key(19, 0)); // plain R captured
    st.write(&crate::proto::cmd::bypass());
    assert!(st.key_down(19, 0, 0, 0)); // sails through
    assert!(!st.key_down(19, 0, 0, 10)); // captured again
}

#[test]
fn divert_takes_everything_except_metas() {
    let mut st = opened();
    st.write(&crate::proto::cmd::divert(true));
    assert!(!st.key_down(30, 0, 0, 0)); // 'a' diverted
    let ev = decode_events(&st.read(4096));
    assert_eq!(ev, vec![Event::Keystroke { key: 30, ss: 0, leds: 0 }]);
    // left shift is kernel meta; still passes
    assert!(st.key_down(input_linux_sys::KEY_LEFTSHIFT as u8, 0, 0, 0));
}

#[test]
fn user_meta_key_simulates_shift_state() {
    let mut st = opened();
    st.write(&crate::proto::cmd::ismeta(58, crate::proto::SS_CTRL)); // capslock acts as ctrl
    st.write(&crate::proto::cmd::set_key(19, crate::proto::SS_CTRL));
    assert!(!st.key_down(58, 0, 0, 0)); // meta key itself swallowed
    assert!(!st.key_down(19, 0, 0, 0)); // plain R now reads as ^R
    let ev = decode_events(&st.read(4096));
    assert_eq!(
        ev,
        vec![Event::Keystroke { key: 19, ss: crate::proto::SS_CTRL, leds: 0 }]
    );
    st.key_up(58);
    assert!(st.key_down(19, 0, 0, 0)); // back to plain
}

#[test]
fn numlocked_keypad_goes_to_console() {
    let mut st = opened();
    let kp5 = input_linux_sys::KEY_KP5 as u8;
    st.write(&crate::proto::cmd::set_key(kp5, 0));
    assert!(!st.key_down(kp5, 0, 0, 0)); // captured with numlock off
    let _ = st.read(4096);
    assert!(st.key_down(kp5, 0, LED_NUMLOCK, 0)); // numbers with numlock on
    assert!(!st.poll_ready());
}

#[test]
fn output_burst_emits_single_morechars() {
    // E6: "abcdef" in one burst produces exactly one event
    let mut st = opened();
    type_text(&mut st, "abcdef", 0);
    let ev = decode_events(&st.read(4096));
    let more: Vec<_> = ev
        .iter()
        .filter(|e| matches!(e, Event::MoreChars { .. }))
        .collect();
    assert_eq!(more.len(), 1);
    assert_eq!(more[0], &Event::MoreChars { echo: 0, ch: 'a' as u32 });
}

#[test]
fn output_break_separates_bursts() {
    // E6: two bursts separated by more than the break both announce
    let mut st = opened();
    let now = type_text(&mut st, "abc", 0);
    type_text(&mut st, "def", now + 800);
    let ev = decode_events(&st.read(4096));
    let more: Vec<_> = ev
        .iter()
        .filter_map(|e| match e {
            Event::MoreChars { echo: 0, ch } => Some(*ch),
            _ => None,
        })
        .collect();
    assert_eq!(more, vec!['a' as u32, 'd' as u32]);
}

#[test]
fn obreak_zero_disables_throttling() {
    let mut st = opened();
    st.write(&crate::proto::cmd::obreak(0));
    type_text(&mut st, "ab", 0);
    let ev = decode_events(&st.read(4096));
    let more = ev
        .iter()
        .filter(|e| matches!(e, Event::MoreChars { .. }))
        .count();
    assert_eq!(more, 2);
}

#[test]
fn echo_class_morechars_is_never_suppressed() {
    // Property 8 + ordering: echoed chars bypass the output-break window.
    let mut st = opened();
    type_text(&mut st, "noise", 0);
    st.key_unicode('x' as u32, 10);
    st.vt_char(0, 'x' as u32, 20); // within the break window, but echo
    let ev = decode_events(&st.read(4096));
    assert!(ev.contains(&Event::MoreChars { echo: 1, ch: 'x' as u32 }));
}

#[test]
fn catchup_precedes_keystroke() {
    // Property 2: after a keystroke event, the reader has all prior output.
    let mut st = opened();
    st.write(&crate::proto::cmd::set_key(60, 0)); // F2
    type_text(&mut st, "hello\n", 0);
    st.key_down(60, 0, 0, 700);
    let ev = decode_events(&st.read(4096));
    match &ev[..] {
        [Event::NewChars { minor: 1, text }, Event::MoreChars { .. }, Event::Keystroke { key: 60, .. }] =>
        {
            assert_eq!(
                text.clone(),
                "hello\n".chars().map(|c| c as u32).collect::<Vec<u32>>()
            );
        }
        other => panic!("unexpected sequence {other:?}"),
    }
}

#[test]
fn refresh_forces_catchup() {
    let mut st = opened();
    type_text(&mut st, "later text", 0);
    let _ = st.read(4096); // burst notice alone; no catch-up yet
    type_text(&mut st, "x", 50); // within break window: no event, data pending
    assert!(!st.poll_ready());
    st.write(&crate::proto::cmd::refresh());
    let ev = decode_events(&st.read(4096));
    assert_eq!(
        ev,
        vec![
            Event::NewChars {
                minor: 1,
                text: "later textx".chars().map(|c| c as u32).collect()
            },
            Event::RefreshAck
        ]
    );
}

#[test]
fn plain_morechars_without_echo_defers_catchup() {
    let mut st = opened();
    type_text(&mut st, "abc", 0);
    let ev = decode_events(&st.read(4096));
    // the burst notice arrives alone; the text stays in the ring
    assert_eq!(ev, vec![Event::MoreChars { echo: 0, ch: 'a' as u32 }]);
    st.write(&crate::proto::cmd::refresh());
    let ev = decode_events(&st.read(4096));
    assert!(matches!(&ev[0], Event::NewChars { text, .. } if text.len() == 3));
}

#[test]
fn stale_console_switches_coalesce() {
    let mut st = opened();
    st.vt_switch(1);
    st.vt_switch(2);
    st.vt_switch(3);
    let ev = decode_events(&st.read(4096));
    assert_eq!(ev, vec![Event::Fgc(4)]);
}

#[test]
fn catchup_clamps_to_user_bufsize_from_oldest() {
    let mut st = opened();
    st.write(&crate::proto::cmd::bufsize(256)); // floor value
    let mut now = 0;
    for _ in 0..40 {
        now = type_text(&mut st, "0123456789", now);
    }
    st.write(&crate::proto::cmd::refresh());
    let ev = decode_events(&st.read(8192));
    let Event::NewChars { text, .. } = &ev[0] else {
        panic!("expected catch-up, got {ev:?}");
    };
    assert_eq!(text.len(), 256);
    // the newest text survives
    assert_eq!(text[255], '9' as u32);
}

#[test]
fn printk_lands_in_foreground_log() {
    let mut st = opened();
    st.printk("oops: kernel said a thing\n", 0);
    st.write(&crate::proto::cmd::refresh());
    let ev = decode_events(&st.read(8192));
    assert!(matches!(&ev[0], Event::NewChars { text, .. }
        if text.iter().map(|&c| char::from_u32(c).unwrap()).collect::<String>()
            .starts_with("oops")));
}

#[test]
fn nomem_console_reports_diagnostic_once() {
    let mut st = InterceptState::with_capacity(1024);
    st.set_console_limit(0);
    st.open().unwrap();
    // the startup read carries the diagnostic as catch-up text
    let ev = decode_events(&st.read(8192));
    assert_eq!(ev[0], Event::Fgc(1));
    let Event::NewChars { text, .. } = &ev[1] else {
        panic!("expected nomem text, got {ev:?}");
    };
    let s: String = text.iter().map(|&c| char::from_u32(c).unwrap()).collect();
    assert!(s.contains("allocate"));
    // later refreshes do not repeat it
    st.write(&crate::proto::cmd::refresh());
    let ev = decode_events(&st.read(8192));
    assert_eq!(ev, vec![Event::RefreshAck]);
}

#[test]
fn queue_overflow_drops_keystrokes_silently() {
    let mut st = opened();
    st.write(&crate::proto::cmd::set_key(30, 0));
    for _ in 0..200 {
        st.key_down(30, 0, 0, 0);
    }
    let ev = decode_events(&st.read(100_000));
    // 400-byte queue holds at most 100 keystroke records
    assert!(ev.len() <= 100);
    assert!(ev.iter().all(|e| matches!(e, Event::Keystroke { .. })));
}

#[test]
fn push_tty_surfaces_as_inject_effect() {
    let mut st = opened();
    st.write(&crate::proto::cmd::push_tty("hello world\n"));
    assert_eq!(
        st.take_effects(),
        vec![Effect::Inject(b"hello world\n".to_vec())]
    );
}

#[test]
fn ring_reconstruction_modulo_overflow() {
    // Property 1 at the device level: reader sees exactly the ring suffix.
    let mut st = InterceptState::with_capacity(64);
    st.open().unwrap();
    let _ = st.read(4096);
    st.write(&crate::proto::cmd::bufsize(4096));
    let mut now = 0;
    for chunk in 0..10 {
        now = type_text(&mut st, &format!("chunk {chunk} text;"), now);
        now += 1000;
    }
    st.write(&crate::proto::cmd::refresh());
    let mut got: Vec<u32> = Vec::new();
    loop {
        let batch = st.read(8192);
        if batch.is_empty() {
            break;
        }
        for ev in decode_events(&batch) {
            if let Event::NewChars { text, .. } = ev {
                got.extend(text);
            }
        }
    }
    assert_eq!(got, st.log_snapshot(0));
}
