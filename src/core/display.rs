/// Display consumer — reveals fragments word by word inside a bounded text
/// region, fading the region out when the next fragment would not fit.
///
/// Every delivered fragment is acknowledged exactly once, after its last
/// word is visible.
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::core::dispatcher::{Delivery, FragmentReceiver};
use crate::schema::config::DisplayConfig;

/// A bounded text surface.
pub trait Renderer: Send {
    /// Whether `candidate` would exceed the visible region.
    fn would_overflow(&self, candidate: &str) -> bool;
    /// Show `text` as the full content of the region.
    fn render(&mut self, text: &str);
    /// Empty the region.
    fn clear(&mut self);
    /// Typing indicator toggle. Optional.
    fn set_typing(&mut self, _active: bool) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayState {
    Idle,
    Typing,
    Fading,
    AtRest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplaySettings {
    pub word_delay: Duration,
    pub fade_pause: Duration,
}

impl DisplaySettings {
    pub fn instant() -> Self {
        Self {
            word_delay: Duration::ZERO,
            fade_pause: Duration::ZERO,
        }
    }
}

impl From<&DisplayConfig> for DisplaySettings {
    fn from(config: &DisplayConfig) -> Self {
        Self {
            word_delay: Duration::from_millis(config.word_delay_ms),
            fade_pause: Duration::from_millis(config.fade_pause_ms),
        }
    }
}

pub struct Display<R: Renderer> {
    renderer: R,
    settings: DisplaySettings,
    state: DisplayState,
    shown: Vec<String>,
    presented: u64,
}

impl<R: Renderer> Display<R> {
    pub fn new(renderer: R, settings: DisplaySettings) -> Self {
        Self {
            renderer,
            settings,
            state: DisplayState::Idle,
            shown: Vec::new(),
            presented: 0,
        }
    }

    pub fn state(&self) -> DisplayState {
        self.state
    }

    /// Words currently visible.
    pub fn shown(&self) -> String {
        self.shown.join(" ")
    }

    /// Present one delivery and acknowledge it. Returns `true` when the
    /// region was faded out first.
    pub fn present(&mut self, delivery: Delivery) -> bool {
        let (fragment, ack) = delivery.into_parts();
        let incoming: Vec<String> = fragment.text.split_whitespace().map(str::to_string).collect();

        let mut faded = false;
        if !self.shown.is_empty() {
            let candidate = format!("{} {}", self.shown(), incoming.join(" "));
            if self.renderer.would_overflow(&candidate) {
                self.fade();
                faded = true;
            }
        }

        self.type_out(incoming);
        self.presented += 1;
        debug!(
            seq = fragment.seq,
            words = fragment.word_count(),
            faded,
            "fragment presented"
        );
        ack.acknowledge();
        faded
    }

    /// Present deliveries until the producer goes away, then hand back the
    /// renderer.
    pub fn run(mut self, receiver: FragmentReceiver) -> R {
        while let Some(delivery) = receiver.recv() {
            self.present(delivery);
        }
        debug!(presented = self.presented, "display consumer finished");
        self.renderer
    }

    fn fade(&mut self) {
        self.state = DisplayState::Fading;
        pause(self.settings.fade_pause);
        self.renderer.clear();
        self.shown.clear();
        self.state = DisplayState::Idle;
    }

    fn type_out(&mut self, words: Vec<String>) {
        self.state = DisplayState::Typing;
        self.renderer.set_typing(true);
        for word in words {
            self.shown.push(word);
            let revealed = self.shown.join(" ");
            self.renderer.render(&revealed);
            pause(self.settings.word_delay);
        }
        self.renderer.set_typing(false);
        self.state = DisplayState::AtRest;
    }
}

fn pause(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}

/// Renders into a terminal-like writer, a fixed number of columns wide and
/// rows tall. Line breaks come from the same first-fit `textwrap` layout
/// that measures overflow, and only the newly revealed tail is written.
pub struct TerminalRenderer<W: Write + Send> {
    out: W,
    columns: usize,
    rows: usize,
    /// Lines currently on screen, as laid out by `layout`.
    lines: Vec<String>,
    failed: bool,
}

impl<W: Write + Send> TerminalRenderer<W> {
    pub fn new(out: W, columns: usize, rows: usize) -> Self {
        Self {
            out,
            columns: columns.max(1),
            rows: rows.max(1),
            lines: Vec::new(),
            failed: false,
        }
    }

    pub fn from_config(out: W, config: &DisplayConfig) -> Self {
        Self::new(out, config.columns, config.rows)
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// First-fit keeps earlier lines stable as words are appended.
    fn layout(&self, text: &str) -> Vec<String> {
        let options = textwrap::Options::new(self.columns)
            .wrap_algorithm(textwrap::WrapAlgorithm::FirstFit);
        textwrap::wrap(text, options)
            .into_iter()
            .map(|line| line.into_owned())
            .filter(|line| !line.is_empty())
            .collect()
    }

    fn write_lines(&mut self, lines: &[String]) -> std::io::Result<()> {
        let mut start = 0;
        if let Some(last) = self.lines.last() {
            let tail = self.lines.len() - 1;
            let extends = lines.len() > tail
                && lines[..tail] == self.lines[..tail]
                && lines[tail].starts_with(last.as_str());
            if extends {
                write!(self.out, "{}", &lines[tail][last.len()..])?;
                start = tail + 1;
            } else {
                // Not a continuation of what is shown: start a fresh region.
                write!(self.out, "\n\n")?;
            }
        }
        for (offset, line) in lines[start..].iter().enumerate() {
            if start > 0 || offset > 0 {
                writeln!(self.out)?;
            }
            write!(self.out, "{}", line)?;
        }
        self.out.flush()
    }

    fn report(&mut self, result: std::io::Result<()>) {
        if let Err(err) = result {
            if !self.failed {
                warn!(error = %err, "terminal write failed");
                self.failed = true;
            }
        }
    }
}

impl<W: Write + Send> Renderer for TerminalRenderer<W> {
    fn would_overflow(&self, candidate: &str) -> bool {
        self.layout(candidate).len() > self.rows
    }

    fn render(&mut self, text: &str) {
        let lines = self.layout(text);
        let result = self.write_lines(&lines);
        self.lines = lines;
        self.report(result);
    }

    fn clear(&mut self) {
        let result = if self.lines.is_empty() {
            Ok(())
        } else {
            write!(self.out, "\n\n").and_then(|_| self.out.flush())
        };
        self.lines.clear();
        self.report(result);
    }
}

/// One observable renderer call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOp {
    Render(String),
    Clear,
    Typing(bool),
}

/// In-memory renderer with a word-count capacity. Clones share the log of
/// calls, so a handle kept on another thread can inspect it.
#[derive(Debug, Clone)]
pub struct RecordingRenderer {
    capacity_words: usize,
    ops: Arc<Mutex<Vec<RenderOp>>>,
}

impl RecordingRenderer {
    pub fn new(capacity_words: usize) -> Self {
        Self {
            capacity_words,
            ops: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn ops(&self) -> Vec<RenderOp> {
        self.ops
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The text shown at the moment of each clear, plus the final text.
    pub fn screens(&self) -> Vec<String> {
        let mut screens = Vec::new();
        let mut last = String::new();
        for op in self.ops() {
            match op {
                RenderOp::Render(text) => last = text,
                RenderOp::Clear => screens.push(std::mem::take(&mut last)),
                RenderOp::Typing(_) => {}
            }
        }
        if !last.is_empty() {
            screens.push(last);
        }
        screens
    }

    fn push(&self, op: RenderOp) {
        self.ops
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(op);
    }
}

impl Renderer for RecordingRenderer {
    fn would_overflow(&self, candidate: &str) -> bool {
        candidate.split_whitespace().count() > self.capacity_words
    }

    fn render(&mut self, text: &str) {
        self.push(RenderOp::Render(text.to_string()));
    }

    fn clear(&mut self) {
        self.push(RenderOp::Clear);
    }

    fn set_typing(&mut self, active: bool) {
        self.push(RenderOp::Typing(active));
    }
}
