//! End-to-end tests over the bridge wired to the in-process intercept
//! state machine: the full event path from key-down and tty output to
//! reading-buffer state and actions.

use vcspeak::bind::build_mkcode;
use vcspeak::bridge::{Action, Bridge, KS_DEFAULT};
use vcspeak::commands::check_syntax;
use vcspeak::intercept::Effect;
use vcspeak::proto::{SS_CTRL, SS_SHIFT};

const KEY_F3: u8 = 61;
const KEY_R: u8 = 19;
const KEY_X: u8 = 45;
const KEY_T: u8 = 20;
const KEY_H: u8 = 35;
const KEY_I: u8 = 23;
const KEY_ENTER: u8 = 28;
const KEY_ESC: u8 = 1;

fn sim_bridge() -> Bridge {
    Bridge::sim(vcspeak::bind::Lang::En)
}

fn feed_text(bridge: &mut Bridge, text: &str, mut now: u64) -> u64 {
    let st = bridge.sim_mut().unwrap();
    for c in text.chars() {
        st.vt_char(0, c as u32, now);
        now += 1;
    }
    now
}

fn buffer_string(bridge: &Bridge) -> String {
    bridge
        .buffer()
        .text
        .iter()
        .map(|&c| char::from_u32(c).unwrap_or('?'))
        .collect()
}

#[test]
fn macro_binding_injects_text() {
    // shift F3 types a phrase into the console
    let mut bridge = sim_bridge();
    bridge
        .line_configure("+F3 <hello world", Some(&check_syntax))
        .unwrap();

    assert!(!bridge.sim_mut().unwrap().key_down(KEY_F3, SS_SHIFT, 0, 0));
    let actions = bridge.events().unwrap();
    assert!(actions.iter().all(|a| !matches!(a, Action::Key { .. })));
    assert_eq!(
        bridge.sim_mut().unwrap().take_effects(),
        vec![Effect::Inject(b"hello world".to_vec())]
    );
}

#[test]
fn speech_command_reaches_the_application() {
    let mut bridge = sim_bridge();
    bridge.line_configure("^r read", Some(&check_syntax)).unwrap();

    assert!(!bridge.sim_mut().unwrap().key_down(KEY_R, SS_CTRL, 0, 0));
    let actions = bridge.events().unwrap();
    let key = actions
        .iter()
        .find_map(|a| match a {
            Action::Key { key, ss, .. } => Some((*key, *ss)),
            _ => None,
        })
        .expect("key action");
    assert_eq!(key, (KEY_R, SS_CTRL));
    let mk = build_mkcode(KEY_R, SS_CTRL).unwrap();
    assert_eq!(bridge.bindings.get_speech(mk), Some("read"));
}

#[test]
fn buffer_mirrors_console_output() {
    let mut bridge = sim_bridge();
    feed_text(&mut bridge, "first line\nsecond line\n", 0);
    bridge.refresh().unwrap();
    assert_eq!(buffer_string(&bridge), "first line\nsecond line\n");
}

#[test]
fn keystroke_catchup_means_buffer_is_current() {
    // after a captured keystroke arrives, everything written before it
    // is in the reading buffer
    let mut bridge = sim_bridge();
    bridge.line_configure("^r read", Some(&check_syntax)).unwrap();
    let now = feed_text(&mut bridge, "prompt$ ", 0);
    bridge.sim_mut().unwrap().key_down(KEY_R, SS_CTRL, 0, now);
    let actions = bridge.events().unwrap();
    assert!(actions.iter().any(|a| matches!(a, Action::Key { .. })));
    assert_eq!(buffer_string(&bridge), "prompt$ ");
}

#[test]
fn overflow_trims_front_and_nulls_positions() {
    // a burst larger than the log keeps only the newest text and kills
    // the cursor and marks that pointed into the lost prefix
    let mut bridge = sim_bridge();
    bridge.set_log_size(64);
    feed_text(&mut bridge, "0123456789\n", 0);
    bridge.refresh().unwrap();
    bridge.buffer_mut().cursor = Some(2);
    bridge.buffer_mut().marks[0] = Some(1);

    let mut now = 2000;
    for _ in 0..12 {
        now = feed_text(&mut bridge, "abcdefghij\n", now);
        now += 1000;
    }
    let actions = bridge.refresh().unwrap();
    assert!(actions
        .iter()
        .any(|a| matches!(a, Action::Overflow { .. })));
    assert!(bridge.buffer().len() <= 64);
    assert_eq!(bridge.buffer().cursor, None);
    assert_eq!(bridge.buffer().marks[0], None);
    // the newest text survived
    assert!(buffer_string(&bridge).ends_with("abcdefghij\n"));
}

#[test]
fn crlf_and_controls_are_postprocessed() {
    let mut bridge = sim_bridge();
    feed_text(&mut bridge, "one\r\ntw\x08o\n", 0);
    bridge.refresh().unwrap();
    assert_eq!(buffer_string(&bridge), "one\nto\n");
}

#[test]
fn per_console_logs_are_independent() {
    let mut bridge = sim_bridge();
    feed_text(&mut bridge, "console one text\n", 0);
    bridge.refresh().unwrap();
    // switch to console 2, type there, switch back
    {
        let st = bridge.sim_mut().unwrap();
        st.vt_switch(1);
        for (i, c) in "other\n".chars().enumerate() {
            st.vt_char(1, c as u32, 1000 + i as u64);
        }
    }
    bridge.refresh().unwrap();
    assert_eq!(bridge.fgc, 2);
    assert_eq!(buffer_string(&bridge), "other\n");
    bridge.sim_mut().unwrap().vt_switch(0);
    bridge.refresh().unwrap();
    assert_eq!(bridge.fgc, 1);
    assert_eq!(buffer_string(&bridge), "console one text\n");
}

#[test]
fn keystring_collects_typed_text() {
    let mut bridge = sim_bridge();
    bridge.start_keystring(32, KS_DEFAULT).unwrap();
    {
        let st = bridge.sim_mut().unwrap();
        // divert is on: plain letters go to us now
        assert!(!st.key_down(KEY_H, 0, 0, 0));
        assert!(!st.key_down(KEY_I, 0, 0, 1));
        assert!(!st.key_down(KEY_ENTER, 0, 0, 2));
    }
    let actions = bridge.events().unwrap();
    let echoes: String = actions
        .iter()
        .filter_map(|a| match a {
            Action::KsEcho(c) => Some(*c),
            _ => None,
        })
        .collect();
    assert_eq!(echoes, "hi");
    assert!(actions
        .iter()
        .any(|a| *a == Action::KeystringDone { text: Some("hi".into()) }));
    assert!(!bridge.capturing());
}

#[test]
fn keystring_escape_aborts() {
    let mut bridge = sim_bridge();
    bridge.start_keystring(32, KS_DEFAULT).unwrap();
    {
        let st = bridge.sim_mut().unwrap();
        st.key_down(KEY_H, 0, 0, 0);
        st.key_down(KEY_ESC, 0, 0, 1);
    }
    let actions = bridge.events().unwrap();
    assert!(actions
        .iter()
        .any(|a| *a == Action::KeystringDone { text: None }));
}

#[test]
fn suspend_keeps_only_the_wakeup_and_system_keys() {
    // E7: ^X bound to the suspend command, alt-t runs a shell command
    let mut bridge = sim_bridge();
    bridge.line_configure("^x suspend", Some(&check_syntax)).unwrap();
    bridge.line_configure("@t |reboot", Some(&check_syntax)).unwrap();
    bridge.line_configure("^r read", Some(&check_syntax)).unwrap();

    bridge.suspend_keys("suspend");
    {
        let st = bridge.sim_mut().unwrap();
        // ^R no longer captured
        assert!(st.key_down(KEY_R, SS_CTRL, 0, 0));
        // ^X still captured
        assert!(!st.key_down(KEY_X, SS_CTRL, 0, 1));
        // both alt flavors of t still captured (system command)
        assert!(!st.key_down(KEY_T, 0x02, 0, 2));
        assert!(!st.key_down(KEY_T, 0x08, 0, 3));
    }

    bridge.resume_keys();
    assert!(!bridge.sim_mut().unwrap().key_down(KEY_R, SS_CTRL, 0, 10));
}

#[test]
fn screen_mode_reads_the_snapshot() {
    let mut bridge = sim_bridge();
    feed_text(&mut bridge, "tty log text\n", 0);
    bridge.refresh().unwrap();

    // a 2x10 screen filled with 'x', cursor at row 1 col 2
    let mut raw = vec![2u8, 10, 2, 1];
    for _ in 0..20 {
        raw.push(b'x');
        raw.push(7);
    }
    bridge.set_test_snapshot(raw);
    bridge.set_screen_mode(true).unwrap();

    assert_eq!(buffer_string(&bridge), "xxxxxxxxxx\nxxxxxxxxxx\n");
    assert_eq!(bridge.buffer().v_cursor, Some(11 + 2));
    assert_eq!(bridge.buffer().cursor, bridge.buffer().v_cursor);
    assert_eq!(bridge.vc_rows, 2);
    assert_eq!(bridge.vc_cols, 10);

    // and back to the tty log
    bridge.set_screen_mode(false).unwrap();
    assert_eq!(buffer_string(&bridge), "tty log text\n");
}

#[test]
fn cursor_probe_and_commit() {
    // failed probes leave the committed cursor alone
    let mut bridge = sim_bridge();
    feed_text(&mut bridge, "only line\n", 0);
    bridge.refresh().unwrap();
    bridge.buffer_mut().cursor = Some(3);

    bridge.cursor_set();
    assert!(!bridge.next_line()); // there is no second line
    bridge.cursor_set();
    while bridge.forward() {}
    // committed cursor untouched by all that wandering
    assert_eq!(bridge.buffer().cursor, Some(3));
    bridge.cursor_set();
    assert_eq!(bridge.start_line(), 4);
    bridge.cursor_sync();
    assert_eq!(bridge.buffer().cursor, Some(0));
}

#[test]
fn marks_set_and_jump() {
    let mut bridge = sim_bridge();
    feed_text(&mut bridge, "alpha beta gamma\n", 0);
    bridge.refresh().unwrap();
    bridge.buffer_mut().cursor = Some(6);
    assert!(bridge.set_mark(1));
    bridge.buffer_mut().cursor = Some(0);
    assert!(bridge.jump_mark(1));
    assert_eq!(bridge.buffer().cursor, Some(6));
    assert!(!bridge.jump_mark(2)); // never set
}

#[test]
fn nomem_console_carries_the_apology() {
    let mut bridge = sim_bridge();
    bridge.set_alloc_limit(0);
    // force reallocation of the foreground console
    bridge.sim_mut().unwrap().vt_switch(1);
    bridge.events().unwrap();
    bridge.sim_mut().unwrap().vt_switch(0);
    bridge.events().unwrap();
    assert!(bridge.buffer().nomem);
    assert!(buffer_string(&bridge).contains("allocate"));
}
