// Main application entry point.
// Orchestrates command-line parsing, device and synthesizer setup, the
// select-based event loop, signal handling, and shutdown.

use colored::*;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use std::io::{self, BufRead};
use std::os::unix::io::RawFd;
use std::path::Path;
use std::process::exit;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use vcspeak::bind::Lang;
use vcspeak::bridge::{Action, Bridge};
use vcspeak::cli;
use vcspeak::commands::{self, check_syntax, Reader, SpeechCmd};
use vcspeak::cursor::GS_REPEAT;
use vcspeak::fifo::Fifo;
use vcspeak::synth::transport::{watch_pipe_signals, PipeSynth, SerialPort};
use vcspeak::synth::{Style, Synth};

/// Factory bindings, used when no config file is given.  The numeric
/// keypad reads, control chords drive the synthesizer.
const DEFAULT_CONFIG: &str = "\
#7 prevline\n\
#8 currline\n\
#9 nextline\n\
#4 prevword\n\
#5 currword\n\
#6 nextword\n\
#1 prevchar\n\
#2 currchar\n\
#3 nextchar\n\
#0 read\n\
#. stop\n\
#- startbuf\n\
#+ endbuf\n\
^f1 volume\n\
^f2 speed\n\
^f3 pitch\n\
^f4 voice\n\
^f5 searchdown\n\
^f6 searchup\n\
^f7 mark\n\
^f8 jump\n\
^f9 screen\n\
^f10 keyecho\n\
^f11 autoread\n\
^f12 suspend\n\
";

fn init_tracing(log_file: Option<&Path>) {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_env("VCSPEAK_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    match log_file {
        Some(path) => match std::fs::OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => {
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(std::sync::Mutex::new(f))
                    .with_ansi(false)
                    .init();
            }
            Err(e) => {
                eprintln!("{} {}", "Cannot open log file, logging to stderr:".yellow(), e);
                tracing_subscriber::fmt().with_env_filter(filter).init();
            }
        },
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .init();
        }
    }
}

fn pick_language() -> Lang {
    std::env::var("LANG")
        .map(|l| Lang::from_locale(&l))
        .unwrap_or_default()
}

/// Compare the device node against the major/minor the module exposes in
/// sysfs, and recreate it if it disagrees.  Root only; anyone else just
/// lives with the node they have.
fn node_check(devname: &str) {
    // SAFETY: geteuid has no preconditions.
    if unsafe { libc::geteuid() } != 0 {
        return;
    }
    let base = Path::new(devname)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("acsint");
    let sys = format!("/sys/devices/virtual/misc/{base}/dev");
    let Ok(text) = std::fs::read_to_string(&sys) else {
        return; // nothing in /sys to help us
    };
    let mut parts = text.trim().split(':');
    let (Some(maj), Some(min)) = (parts.next(), parts.next()) else {
        return;
    };
    let (Ok(maj), Ok(min)) = (maj.parse::<u32>(), min.parse::<u32>()) else {
        return;
    };

    if let Ok(md) = std::fs::metadata(devname) {
        use std::os::unix::fs::MetadataExt;
        let rdev = md.rdev();
        // SAFETY: major/minor are pure bit extractors.
        let (cmaj, cmin) = unsafe { (libc::major(rdev), libc::minor(rdev)) };
        if cmaj == maj && cmin == min {
            return;
        }
        let _ = std::fs::remove_file(devname);
    }

    let Ok(cname) = std::ffi::CString::new(devname) else {
        return;
    };
    // SAFETY: mknod with a valid nul-terminated path; failure surfaces
    // later when the open fails.
    unsafe {
        let dev = libc::makedev(maj, min);
        libc::mknod(cname.as_ptr(), libc::S_IFCHR | 0o666, dev);
    }
}

/// Load a config file line by line, reporting errors with file and line
/// number.  Returns the number of bad lines.
fn load_config(bridge: &mut Bridge, path: &Path) -> usize {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("{} {}: {}", "Cannot read".red(), path.display(), e);
            return 1;
        }
    };
    let mut bad = 0;
    for (lineno, line) in text.lines().enumerate() {
        if let Err(e) = bridge.line_configure(line, Some(&check_syntax)) {
            eprintln!("{}:{}: {} ({})", path.display(), lineno + 1, e, e.code());
            bad += 1;
        }
    }
    bad
}

fn load_defaults(bridge: &mut Bridge) {
    for line in DEFAULT_CONFIG.lines() {
        if let Err(e) = bridge.line_configure(line, Some(&check_syntax)) {
            // the factory table must always load
            panic!("default binding rejected: {line}: {e}");
        }
    }
}

/// tts / ltts: run stdin through the text-preparation pipeline.
fn test_tts(args: &cli::Args, literal: bool) -> ! {
    let mut bridge = Bridge::sim(pick_language());
    if let Some(cfg) = &args.config {
        load_config(&mut bridge, cfg);
    }
    let expand = literal || args.alnum;
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let text: Vec<u32> = line.chars().map(|c| c as u32).collect();
        let sent =
            vcspeak::cursor::get_sentence(&text, 0, text.len() + 60, GS_REPEAT, &bridge.bindings);
        let prepped = commands::prepare(&sent, &bridge.bindings, expand);
        println!("{}", prepped.to_string_lossy());
    }
    exit(0);
}

/// tc: parse the config file and report, without touching any devices.
fn test_config(args: &cli::Args) -> ! {
    let mut bridge = Bridge::sim(pick_language());
    let bad = match &args.config {
        Some(cfg) => load_config(&mut bridge, cfg),
        None => {
            eprintln!("{}", "tc needs a config file (-c)".red());
            exit(1);
        }
    };
    if bad == 0 {
        println!("config ok");
        exit(0);
    }
    exit(1);
}

fn select_readable(fds: &[Option<RawFd>]) -> io::Result<Vec<bool>> {
    // SAFETY: FD_ZERO/FD_SET/FD_ISSET manipulate a local fd_set; select
    // blocks until one of the registered fds is readable.
    unsafe {
        let mut set: libc::fd_set = std::mem::zeroed();
        libc::FD_ZERO(&mut set);
        let mut nfds = 0;
        for fd in fds.iter().flatten() {
            libc::FD_SET(*fd, &mut set);
            nfds = nfds.max(*fd + 1);
        }
        let rc = libc::select(
            nfds,
            &mut set,
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            std::ptr::null_mut(),
        );
        if rc < 0 {
            let e = io::Error::last_os_error();
            if e.kind() == io::ErrorKind::Interrupted {
                return Ok(vec![false; fds.len()]);
            }
            return Err(e);
        }
        Ok(fds
            .iter()
            .map(|fd| fd.is_some_and(|fd| libc::FD_ISSET(fd, &set)))
            .collect())
    }
}

/// One read from a raw fd, retrying EINTR.
fn read_some(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        // SAFETY: reads into a valid owned buffer of the stated length.
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if n < 0 {
            let e = io::Error::last_os_error();
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(e);
        }
        return Ok(n as usize);
    }
}

struct SynthLine {
    read_fd: RawFd,
    pipe: Option<PipeSynth>,
    _serial: Option<SerialPort>,
}

fn open_synth(style: Style, port: &str) -> io::Result<(Synth, SynthLine)> {
    if let Some(cmd) = port.strip_prefix('|') {
        let mut pipe = PipeSynth::spawn(cmd)?;
        let stdin = pipe
            .to_child
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "no child stdin"))?;
        let fd = {
            use std::os::unix::io::AsRawFd;
            stdin.as_raw_fd()
        };
        let read_fd = pipe.read_fd();
        let synth = Synth::over_child(style, stdin, fd);
        Ok((synth, SynthLine { read_fd, pipe: Some(pipe), _serial: None }))
    } else {
        let idx: u8 = port
            .parse()
            .ok()
            .filter(|&n| n <= 3)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "port must be 0-3"))?;
        let dev = format!("/dev/ttyS{idx}");
        let serial = SerialPort::open(&dev, 9600)?;
        let file = serial.try_clone()?;
        let fd = serial.raw_fd();
        let synth = Synth::over_file(style, file, fd);
        Ok((synth, SynthLine { read_fd: fd, pipe: None, _serial: Some(serial) }))
    }
}

fn start_jingle(bridge: &mut Bridge) {
    const NOTES: &[(u16, u8)] = &[
        (476, 5),
        (530, 5),
        (596, 5),
        (662, 5),
        (762, 5),
        (858, 5),
        (942, 5),
    ];
    let _ = bridge.notes(NOTES);
}

fn main() {
    let args = cli::parse_args();
    init_tracing(args.log_file.as_deref());

    match args.synth.as_str() {
        "tts" => test_tts(&args, false),
        "ltts" => test_tts(&args, true),
        "tc" => test_config(&args),
        _ => {}
    }

    let Some(style) = Style::from_name(&args.synth) else {
        eprintln!("{} {}", "Unknown synthesizer:".red().bold(), args.synth);
        exit(1);
    };
    let Some(port) = args.port.clone() else {
        eprintln!("{}", "A serial port number or |command is required".red());
        exit(1);
    };

    node_check(&args.device);

    let mut bridge = match Bridge::open(&args.device, pick_language()) {
        Ok(b) => b,
        Err(e) => {
            match e.raw_os_error() {
                Some(libc::EBUSY) => eprintln!(
                    "{} {}",
                    args.device.bold(),
                    "is busy; another screen reader holds it".red()
                ),
                Some(libc::EACCES) => eprintln!(
                    "{} {}\n{}",
                    "Permission denied opening".red(),
                    args.device.bold(),
                    "add yourself to the device's group, or run as root".yellow()
                ),
                Some(libc::ENOENT) => eprintln!(
                    "{} {}\n{}",
                    args.device.bold(),
                    "does not exist".red(),
                    "is the intercept module loaded? mknod may be needed".yellow()
                ),
                _ => eprintln!("{} {}: {}", "Cannot open".red(), args.device.bold(), e),
            }
            exit(1);
        }
    };

    match &args.config {
        Some(cfg) => {
            load_config(&mut bridge, cfg);
        }
        None => load_defaults(&mut bridge),
    }

    if args.daemon {
        // SAFETY: daemon(0,1) forks and detaches, keeping stderr open so
        // the reload path can still report; setsid makes us the group
        // leader so a child synth dies with us.
        unsafe {
            if libc::daemon(0, 1) != 0 {
                eprintln!("{}", "daemon() failed".red());
                exit(1);
            }
            libc::setsid();
        }
    }

    let (pipe_broken, child_exited) = match watch_pipe_signals() {
        Ok(flags) => flags,
        Err(e) => {
            eprintln!("{} {}", "Cannot install signal handlers:".red(), e);
            exit(1);
        }
    };
    let shutdown = Arc::new(AtomicBool::new(false));
    for sig in [SIGTERM, SIGINT] {
        if signal_hook::flag::register(sig, Arc::clone(&shutdown)).is_err() {
            eprintln!("{}", "Cannot install signal handlers".red());
            exit(1);
        }
    }

    let (mut synth, mut line) = match open_synth(style, &port) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("{} {}: {}", "Cannot open synthesizer".red(), port.bold(), e);
            exit(1);
        }
    };

    start_jingle(&mut bridge);
    if let Some(init) = style.init_string() {
        let _ = synth.say_string(init);
    }
    let _ = synth.say_string("vcspeak ready");

    let mut fifo = args.fifo.as_deref().and_then(|p| match Fifo::open(p) {
        Ok(f) => Some(f),
        Err(e) => {
            eprintln!("{} {}: {}", "Cannot open fifo".yellow(), p, e);
            None
        }
    });

    // a small gap in output usually means something new to read
    let _ = bridge.obreak(4);

    let mut reader = Reader { expand_punct: args.alnum, ..Reader::default() };
    let dev_fd = bridge.raw_fd();

    tracing::info!(style = %style, "entering event loop");

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        // a dead software synth gets respawned
        if line.pipe.is_some()
            && (pipe_broken.swap(false, Ordering::SeqCst)
                || child_exited.swap(false, Ordering::SeqCst))
        {
            let dead = line.pipe.as_mut().is_some_and(|p| p.is_dead());
            if dead {
                tracing::warn!("software synth died, respawning");
                let _ = bridge.buzz();
                match open_synth(style, &port) {
                    Ok((s, l)) => {
                        synth = s;
                        line = l;
                    }
                    Err(e) => {
                        eprintln!("{} {}", "Cannot respawn synthesizer:".red(), e);
                        break;
                    }
                }
            }
        }

        let fds = [dev_fd, Some(line.read_fd), fifo.as_ref().map(|f| f.raw_fd())];
        let ready = match select_readable(&fds) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(error = %e, "select failed");
                break;
            }
        };

        let mut last_cmd: Option<SpeechCmd> = None;

        if ready[0] {
            match bridge.events() {
                Ok(actions) => {
                    handle_actions(&actions, &mut bridge, &mut synth, &mut reader, &mut last_cmd)
                }
                Err(e) => {
                    tracing::error!(error = %e, "device read failed");
                    break;
                }
            }
        }

        if ready[1] {
            let mut buf = [0u8; 64];
            match read_some(line.read_fd, &mut buf) {
                Ok(0) => {
                    // pipe EOF is handled by the respawn path; don't spin
                    thread::sleep(Duration::from_millis(50));
                }
                Ok(n) => {
                    for ev in synth.receive(&buf[..n]) {
                        if let Err(e) = reader.on_synth_event(ev, &mut bridge, &mut synth) {
                            tracing::warn!(error = %e, "index event failed");
                        }
                    }
                }
                Err(e) => tracing::warn!(error = %e, "synth read failed"),
            }
        }

        if ready[2] {
            if let Some(f) = fifo.as_mut() {
                match f.read_lines() {
                    Ok(lines) => {
                        for msg in lines {
                            let _ = reader.interrupt(&mut synth);
                            let _ = synth.say_string(&msg);
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "fifo read failed"),
                }
            }
        }

        // at most one speech command per pass; the user may have typed
        // ahead of us and only the last one counts
        if let Some(cmd) = last_cmd {
            if let Err(e) = reader.execute(cmd, &mut bridge, &mut synth) {
                tracing::warn!(error = %e, "command failed");
            }
        }

        if reader.reload_requested {
            reader.reload_requested = false;
            bridge.reset_configure();
            match &args.config {
                Some(cfg) => {
                    load_config(&mut bridge, cfg);
                }
                None => load_defaults(&mut bridge),
            }
            let _ = synth.say_string("configuration reloaded");
        }

        if reader.go_read {
            reader.go_read = false;
            auto_read_pass(&mut bridge, &mut synth, &mut reader);
        }
    }

    tracing::info!("shutting down");
    let _ = synth.shutup();
}

fn handle_actions(
    actions: &[Action],
    bridge: &mut Bridge,
    synth: &mut Synth,
    reader: &mut Reader,
    last_cmd: &mut Option<SpeechCmd>,
) {
    for action in actions {
        match action {
            Action::Key { key, ss, .. } => {
                let mk = vcspeak::bind::build_mkcode(*key, ss & 0xf);
                let cmd = mk
                    .and_then(|mk| bridge.bindings.get_speech(mk))
                    .and_then(SpeechCmd::parse);
                match cmd {
                    Some(c) => *last_cmd = Some(c),
                    None => {
                        tracing::debug!(key = *key, ss = *ss, "captured key with no binding");
                    }
                }
            }
            other => {
                if let Err(e) = reader.on_action(other, bridge, synth) {
                    tracing::warn!(error = %e, "action failed");
                }
            }
        }
    }
}

/// Auto-read: wait a moment for output to settle, refresh, and read the
/// fresh text.  A keystroke that sneaks in during the refresh wins.
fn auto_read_pass(bridge: &mut Bridge, synth: &mut Synth, reader: &mut Reader) {
    thread::sleep(Duration::from_millis(25));
    let mut from = bridge.buffer().len();

    let actions = match bridge.refresh() {
        Ok(a) => a,
        Err(e) => {
            tracing::warn!(error = %e, "refresh failed");
            return;
        }
    };
    for action in &actions {
        if let Action::Overflow { diff } = action {
            from = match diff {
                Some(d) => from.saturating_sub(*d),
                None => 0,
            };
        }
    }
    let mut last_cmd = None;
    handle_actions(&actions, bridge, synth, reader, &mut last_cmd);
    if let Some(cmd) = last_cmd {
        // the keystroke wins over automatic reading
        let _ = reader.execute(cmd, bridge, synth);
        return;
    }
    if reader.reading {
        return;
    }

    // skip the blank space and start reading at the first new character
    let mut pos = from;
    loop {
        let c = bridge.buffer().at(pos);
        if matches!(c, 0x20 | 0x0a | 0x0d | 0x07) {
            pos += 1;
            continue;
        }
        break;
    }
    if pos >= bridge.buffer().len() {
        return;
    }
    bridge.buffer_mut().cursor = Some(pos);
    reader.reading = true;
    if let Err(e) = reader.read_next_part(bridge, synth) {
        tracing::warn!(error = %e, "auto read failed");
    }
}
