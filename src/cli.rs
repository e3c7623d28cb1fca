use clap::Parser;
use std::path::PathBuf;

/// A screen reader for the Linux virtual consoles.
#[derive(Parser, Debug, Clone)]
#[command(
    version,
    about,
    long_about = "A screen reader for the Linux virtual consoles.\n\
Reads keystrokes and tty output through the intercept device, keeps a reading\n\
buffer per console, and drives a speech synthesizer over a serial port or a\n\
child-process pipe.  Index markers coming back from the synthesizer keep the\n\
reading cursor on the word being spoken.\n\
\n\
EXAMPLES:\n\
  # DoubleTalk on the first serial port:\n\
  vcspeak dbe 0\n\
\n\
  # espeakup as a piped software synth, daemonized:\n\
  vcspeak -d esp '|espeakup --stdin'\n\
\n\
  # check a config file without starting the daemon:\n\
  vcspeak -c /etc/vcspeak.cfg tc\n\
\n\
  # run text through the preparation pipeline (stdin to stdout):\n\
  vcspeak tts < story.txt"
)]
pub struct Args {
    /// Synthesizer style: dbe, dte, dtp, bns, ace, esp, generic.
    /// Or a test mode: tts (prepare stdin text), ltts (same, speaking all
    /// punctuation), tc (check the config file).
    pub synth: String,

    /// Serial port index 0-3, or '|command' to pipe through a software
    /// synthesizer.
    pub port: Option<String>,

    /// Fork into the background after startup.
    #[arg(short = 'd', long)]
    pub daemon: bool,

    /// Expand punctuation inside sentences into its spoken names.
    #[arg(short = 'a', long)]
    pub alnum: bool,

    /// Configuration file with key bindings and pronunciations.
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// The intercept character device.
    #[arg(long, value_name = "DEV", default_value = "/dev/acsint")]
    pub device: String,

    /// Fifo accepting lines of text to speak from other processes.
    #[arg(long, value_name = "PATH")]
    pub fifo: Option<String>,

    /// Append a protocol debug log to this file.
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,
}

pub fn parse_args() -> Args {
    Args::parse()
}
