//! MPlayer slave-mode protocol: command formatting and output-line recognizers.
//!
//! Reference: http://www.mplayerhq.hu/DOCS/tech/slave.txt
//!
//! The protocol carries no request identifiers. Replies are recognized purely
//! by the shape of the next relevant output line.

use std::fmt;

/// Marker printed once MPlayer has started and accepts commands.
const READY_BANNER: &str = "CPLAYER: MPlayer";
/// Marker printed once a loaded file begins to play.
const PLAYBACK_STARTED: &str = "CPLAYER: Starting playback";
/// Marker printed when playback is paused.
const PAUSE_BANNER: &str = "=====  PAUSE  =====";
/// Marker printed after a seek completes.
const POSITION_REPORT: &str = "Position:";
const OPEN_PREFIX: &str = "OPEN: ";
const OPEN_FAILURES: [&str; 2] = ["File not found", "Failed to open"];
const EOF_PREFIX: &str = "EOF code:";

/// Single token of a command line.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
  /// Bare word, written as is.
  Word(String),
  /// String argument, written double-quoted.
  Str(String),
  Int(i64),
  Float(f64),
}

impl fmt::Display for Arg {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Arg::Word(w) => f.write_str(w),
      Arg::Str(s) => write!(f, "\"{}\"", s),
      Arg::Int(n) => write!(f, "{}", n),
      Arg::Float(n) => write!(f, "{}", n),
    }
  }
}

impl From<&str> for Arg {
  fn from(word: &str) -> Self {
    Arg::Word(word.to_string())
  }
}

impl From<i64> for Arg {
  fn from(n: i64) -> Self {
    Arg::Int(n)
  }
}

impl From<f64> for Arg {
  fn from(n: f64) -> Self {
    Arg::Float(n)
  }
}

/// Seek mode understood by the `seek` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekType {
  /// Offset in seconds from the current position.
  Relative,
  /// Absolute position in seconds.
  Absolute,
}

impl SeekType {
  /// Numeric type code expected by MPlayer.
  pub fn code(self) -> i64 {
    match self {
      SeekType::Relative => 0,
      SeekType::Absolute => 2,
    }
  }
}

/// Command written to MPlayer's stdin.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineCommand {
  pub args: Vec<Arg>,
}

impl EngineCommand {
  pub fn new(args: Vec<Arg>) -> Self {
    Self { args }
  }

  /// Load a file for playback.
  pub fn loadfile(path: &str) -> Self {
    Self::new(vec!["loadfile".into(), Arg::Str(path.to_string())])
  }

  /// Toggle pause.
  pub fn pause() -> Self {
    Self::new(vec!["pause".into()])
  }

  /// Stop playback and unload the file.
  pub fn stop() -> Self {
    Self::new(vec!["stop".into()])
  }

  /// Seek without changing the pause state.
  pub fn seek(value: f64, seek_type: SeekType) -> Self {
    Self::new(vec![
      "pausing_keep".into(),
      "seek".into(),
      value.into(),
      seek_type.code().into(),
    ])
  }

  /// Query a property; the answer arrives as `ANS_<name>=<value>`.
  pub fn get_property(name: &str) -> Self {
    Self::new(vec![
      "pausing_keep_force".into(),
      "get_property".into(),
      name.into(),
    ])
  }

  /// Set a numeric property.
  pub fn set_property(name: &str, value: f64) -> Self {
    Self::new(vec![
      "pausing_keep_force".into(),
      "set_property".into(),
      name.into(),
      value.into(),
    ])
  }

  /// Exact line written to stdin, without the trailing newline.
  pub fn to_line(&self) -> String {
    self
      .args
      .iter()
      .map(|a| a.to_string())
      .collect::<Vec<_>>()
      .join(" ")
  }
}

impl fmt::Display for EngineCommand {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.to_line())
  }
}

/// Output stream a line was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSource {
  Stdout,
  Stderr,
}

/// One decoded line of engine output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineLine {
  pub source: LineSource,
  pub text: String,
}

impl EngineLine {
  pub fn stdout(text: impl Into<String>) -> Self {
    Self {
      source: LineSource::Stdout,
      text: text.into(),
    }
  }

  pub fn stderr(text: impl Into<String>) -> Self {
    Self {
      source: LineSource::Stderr,
      text: text.into(),
    }
  }

  pub fn is_ready_banner(&self) -> bool {
    self.source == LineSource::Stdout && self.text.contains(READY_BANNER)
  }

  pub fn is_playback_started(&self) -> bool {
    self.text.contains(PLAYBACK_STARTED)
  }

  pub fn is_pause_banner(&self) -> bool {
    self.text.contains(PAUSE_BANNER)
  }

  pub fn is_position_report(&self) -> bool {
    self.text.contains(POSITION_REPORT)
  }

  /// Error text of an `OPEN:` failure line, with the prefix stripped.
  pub fn open_error(&self) -> Option<&str> {
    let start = self.text.find(OPEN_PREFIX)?;
    let reason = self.text[start + OPEN_PREFIX.len()..].trim_end();
    OPEN_FAILURES
      .iter()
      .any(|f| reason.starts_with(f))
      .then_some(reason)
  }

  /// Raw value of an `ANS_<property>=` answer line.
  pub fn answer(&self, property: &str) -> Option<&str> {
    let marker = format!("ANS_{}=", property);
    let start = self.text.find(&marker)?;
    Some(self.text[start + marker.len()..].trim_end())
  }

  /// Completion code of an `EOF code: <n>` line.
  pub fn eof_code(&self) -> Option<i32> {
    let start = self.text.find(EOF_PREFIX)?;
    self.text[start + EOF_PREFIX.len()..]
      .split_whitespace()
      .next()?
      .parse()
      .ok()
  }
}

/// EOF codes 0 and 1 mean the file played to its natural end.
pub fn is_normal_eof(code: i32) -> bool {
  code == 0 || code == 1
}
