//! Terminal printer for a running execution
//!
//! Lifecycle events are printed as they arrive. With streaming enabled,
//! agent output is collected per agent in a [`ChunkBuffer`] and written a
//! line at a time, so output from parallel agents does not interleave
//! mid-line.

use crate::cli::output::{create_progress_bar, format_event};
use crate::execution::{ExecutionEvent, ProgressChunk, ProgressEmitter};
use console::style;
use indicatif::ProgressBar;
use std::collections::HashMap;
use std::sync::Mutex;

/// Default per-agent buffer size in bytes
pub const DEFAULT_BUFFER_CAPACITY: usize = 4096;

/// Bounded text buffer for one agent's output
#[derive(Debug, Clone)]
pub struct ChunkBuffer {
    pending: String,
    capacity: usize,
}

impl ChunkBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: String::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append text, returning whatever became ready to print
    ///
    /// Complete lines are released as soon as a newline arrives; a partial
    /// line is released once the buffer reaches its capacity.
    pub fn push(&mut self, text: &str) -> Option<String> {
        self.pending.push_str(text);
        if self.pending.len() >= self.capacity {
            return self.drain();
        }
        self.flush()
    }

    /// Take every complete line, keeping a trailing partial line
    pub fn flush(&mut self) -> Option<String> {
        let end = self.pending.rfind('\n')? + 1;
        let rest = self.pending.split_off(end);
        Some(std::mem::replace(&mut self.pending, rest))
    }

    /// Take everything, partial line included
    pub fn drain(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.pending))
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Prints execution events to the terminal with a step progress bar
pub struct TerminalPrinter {
    stream: bool,
    progress: ProgressBar,
    capacity: usize,
    /// Keyed by (step, agent position); holds the agent type for the prefix
    buffers: Mutex<HashMap<(usize, usize), (String, ChunkBuffer)>>,
}

impl TerminalPrinter {
    pub fn new(stream: bool, total_steps: usize) -> Self {
        Self::with_progress(stream, create_progress_bar(total_steps))
    }

    /// Printer without a visible progress bar
    pub fn hidden(stream: bool) -> Self {
        Self::with_progress(stream, ProgressBar::hidden())
    }

    fn with_progress(stream: bool, progress: ProgressBar) -> Self {
        Self {
            stream,
            progress,
            capacity: DEFAULT_BUFFER_CAPACITY,
            buffers: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    fn print(&self, line: &str) {
        self.progress.println(line);
    }

    fn print_output(&self, agent_type: &str, text: &str) {
        let prefix = style(format!("[{}]", agent_type)).dim();
        for line in text.lines() {
            self.print(&format!("    {} {}", prefix, line));
        }
    }

    fn buffer_chunk(&self, chunk: &ProgressChunk) {
        let ready = match self.buffers.lock() {
            Ok(mut buffers) => buffers
                .entry((chunk.step, chunk.agent))
                .or_insert_with(|| (chunk.agent_type.clone(), ChunkBuffer::new(self.capacity)))
                .1
                .push(&chunk.text),
            Err(_) => return,
        };
        if let Some(ready) = ready {
            self.print_output(&chunk.agent_type, &ready);
        }
    }

    /// Print whatever is left of one agent's output
    fn drain_agent(&self, step: usize, agent: usize) {
        let rest = match self.buffers.lock() {
            Ok(mut buffers) => buffers
                .remove(&(step, agent))
                .and_then(|(agent_type, mut buffer)| buffer.drain().map(|text| (agent_type, text))),
            Err(_) => return,
        };
        if let Some((agent_type, text)) = rest {
            self.print_output(&agent_type, &text);
        }
    }

    /// Print all buffered output and stop the progress bar
    pub fn finish(&self) {
        let pending: Vec<(String, String)> = match self.buffers.lock() {
            Ok(mut buffers) => buffers
                .drain()
                .filter_map(|(_, (agent, mut buffer))| buffer.drain().map(|text| (agent, text)))
                .collect(),
            Err(_) => Vec::new(),
        };
        for (agent, text) in pending {
            self.print_output(&agent, &text);
        }
        self.progress.finish_and_clear();
    }
}

impl ProgressEmitter for TerminalPrinter {
    fn publish(&self, _channel: &str, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::StreamChunk(chunk) => {
                if self.stream {
                    self.buffer_chunk(chunk);
                }
                return;
            }
            ExecutionEvent::AgentCompleted { step, agent, .. }
            | ExecutionEvent::AgentFailed { step, agent, .. } => self.drain_agent(*step, *agent),
            ExecutionEvent::StepStarted { step, .. } => {
                self.progress.set_message(format!("step {}", step));
            }
            ExecutionEvent::StepCompleted { .. } => self.progress.inc(1),
            _ => {}
        }

        if let Some(line) = format_event(event) {
            self.print(&line);
        }
    }
}
