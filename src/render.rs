//! Incremental answer reveal
//!
//! A [`RenderJob`] walks `Pending -> Revealing -> Finalized`, one
//! whitespace or word chunk per tick, appended raw. After the last chunk the
//! raw text is replaced by the formatted rendering of the whole answer, so
//! markers split across chunks are never shown half-parsed.
//!
//! [`RenderScheduler`] owns one display slot. Starting a job bumps the slot
//! generation under the slot lock and aborts the previous tick task; a tick
//! only writes while its generation is current, so an old job can never
//! write into a newer one's output.

use std::ops::Range;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::markdown;

/// Delay between two revealed chunks
pub const DEFAULT_TICK: Duration = Duration::from_millis(15);

/// Lifecycle of one render job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Pending,
    Revealing,
    Finalized,
    Superseded,
}

impl RenderState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RenderState::Finalized | RenderState::Superseded)
    }
}

/// Output region an answer is rendered into
pub trait Display: Send + 'static {
    /// A new job took the slot; drop whatever is shown
    fn reset(&mut self);
    /// Append unformatted text
    fn append_raw(&mut self, chunk: &str);
    /// Keep the newest content in view
    fn scroll_to_latest(&mut self);
    /// Replace the slot content with the finished rendering
    fn show_formatted(&mut self, formatted: &str);
    /// A line outside the answer slot: greeting, apology, replayed user turn
    fn notice(&mut self, text: &str);
}

/// Formatting pass applied once a job finalizes
pub type Formatter = fn(&str) -> String;

/// Split text into alternating runs of whitespace and non-whitespace
pub fn chunk_ranges(text: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = 0;
    let mut current: Option<bool> = None;

    for (i, c) in text.char_indices() {
        let ws = c.is_whitespace();
        match current {
            Some(prev) if prev != ws => {
                ranges.push(start..i);
                start = i;
            }
            _ => {}
        }
        current = Some(ws);
    }
    if start < text.len() {
        ranges.push(start..text.len());
    }
    ranges
}

/// State machine revealing one answer
#[derive(Debug)]
pub struct RenderJob {
    text: String,
    chunks: Vec<Range<usize>>,
    next: usize,
    state: RenderState,
}

impl RenderJob {
    pub fn new(text: &str) -> Self {
        Self {
            chunks: chunk_ranges(text),
            text: text.to_string(),
            next: 0,
            state: RenderState::Pending,
        }
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Advance one tick: reveal the next chunk, or finalize once all are out
    pub fn step(&mut self, display: &mut dyn Display, format: Formatter) -> RenderState {
        match self.state {
            RenderState::Finalized | RenderState::Superseded => return self.state,
            RenderState::Pending => self.state = RenderState::Revealing,
            RenderState::Revealing => {}
        }

        if let Some(range) = self.chunks.get(self.next) {
            display.append_raw(&self.text[range.clone()]);
            display.scroll_to_latest();
            self.next += 1;
        } else {
            self.finalize(display, format);
        }
        self.state
    }

    /// Skip any remaining chunks and show the formatted answer
    pub fn finalize(&mut self, display: &mut dyn Display, format: Formatter) {
        display.show_formatted(&format(&self.text));
        display.scroll_to_latest();
        self.state = RenderState::Finalized;
    }

    pub fn supersede(&mut self) {
        if !self.state.is_terminal() {
            self.state = RenderState::Superseded;
        }
    }
}

struct Slot<D> {
    display: D,
    generation: u64,
}

/// Observer for one started job
pub struct RenderHandle {
    generation: u64,
    state: watch::Receiver<RenderState>,
}

impl RenderHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> RenderState {
        *self.state.borrow()
    }

    /// Wait until the job is finalized or superseded
    pub async fn finished(mut self) -> RenderState {
        loop {
            let state = *self.state.borrow_and_update();
            if state.is_terminal() {
                return state;
            }
            if self.state.changed().await.is_err() {
                // Sender gone without a terminal state: the task was aborted
                let state = *self.state.borrow();
                return if state.is_terminal() {
                    state
                } else {
                    RenderState::Superseded
                };
            }
        }
    }
}

/// Drives render jobs for a single display slot
pub struct RenderScheduler<D: Display> {
    slot: Arc<Mutex<Slot<D>>>,
    tick: Duration,
    format: Formatter,
    current: Option<(JoinHandle<()>, watch::Sender<RenderState>)>,
}

impl<D: Display> RenderScheduler<D> {
    pub fn new(display: D) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot {
                display,
                generation: 0,
            })),
            tick: DEFAULT_TICK,
            format: markdown::render,
            current: None,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_formatter(mut self, format: Formatter) -> Self {
        self.format = format;
        self
    }

    /// Run `f` against the display under the slot lock
    pub fn with_display<R>(&self, f: impl FnOnce(&mut D) -> R) -> R {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut slot.display)
    }

    /// Show `text` in the slot, replacing any job still revealing.
    ///
    /// Without animation (or for empty text) the formatted answer appears
    /// at once and the job is finalized before this returns.
    pub fn play(&mut self, text: &str, animate: bool) -> RenderHandle {
        self.cancel_current();

        let mut job = RenderJob::new(text);
        let (tx, rx) = watch::channel(RenderState::Pending);

        let generation = {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            slot.generation += 1;
            slot.display.reset();
            if !animate || text.is_empty() {
                job.finalize(&mut slot.display, self.format);
            }
            slot.generation
        };

        if job.state() == RenderState::Finalized {
            tx.send_replace(RenderState::Finalized);
            return RenderHandle {
                generation,
                state: rx,
            };
        }

        let slot = self.slot.clone();
        let tick = self.tick;
        let format = self.format;
        let task_tx = tx.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of an interval completes immediately
            interval.tick().await;

            loop {
                interval.tick().await;
                let state = {
                    let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
                    if slot.generation != generation {
                        job.supersede();
                        job.state()
                    } else {
                        job.step(&mut slot.display, format)
                    }
                };
                task_tx.send_replace(state);
                if state.is_terminal() {
                    break;
                }
            }
        });

        self.current = Some((handle, tx));
        RenderHandle {
            generation,
            state: rx,
        }
    }

    /// Stop the job currently revealing, if any. Its output stays as it is
    /// until the next job resets the slot.
    pub fn cancel_current(&mut self) {
        if let Some((handle, tx)) = self.current.take() {
            handle.abort();
            tx.send_if_modified(|state| {
                if state.is_terminal() {
                    false
                } else {
                    *state = RenderState::Superseded;
                    true
                }
            });
        }
    }

    /// Finish the current job immediately, formatted
    pub fn skip_to_end(&mut self, text: &str) -> RenderHandle {
        self.play(text, false)
    }

    /// Print a line outside the slot, stopping any job still revealing
    pub fn notice(&mut self, text: &str) {
        self.cancel_current();
        self.with_display(|d| d.notice(text));
    }
}

impl<D: Display> Drop for RenderScheduler<D> {
    fn drop(&mut self) {
        if let Some((handle, _)) = self.current.take() {
            handle.abort();
        }
    }
}
