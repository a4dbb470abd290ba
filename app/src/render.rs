use shiori_core::{ChatMessage, SpeechError, StreamingTurnState, TranscriptState};
use std::collections::HashSet;
use std::io::{self, Write};

/// Writes a streaming reply to a terminal incrementally.
///
/// Each `Updated` snapshot carries the whole text assembled so far; only the
/// part not yet printed is written.
#[derive(Debug, Default)]
pub struct ChatPrinter {
    printed: usize,
    line_open: bool,
    started_tools: HashSet<String>,
    finished_tools: HashSet<String>,
}

impl ChatPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, state: &StreamingTurnState, out: &mut impl Write) -> io::Result<()> {
        // The idle snapshot that closes a turn carries nothing to print.
        if !state.active {
            return Ok(());
        }
        for tool in &state.tool_invocations {
            if self.started_tools.insert(tool.id.clone()) {
                self.break_line(out)?;
                writeln!(out, "[tool] {} ...", tool.name)?;
            }
            if let Some(result) = &tool.result {
                if self.finished_tools.insert(tool.id.clone()) {
                    self.break_line(out)?;
                    writeln!(out, "[tool] {} -> {}", tool.name, result)?;
                }
            }
        }

        if state.assembled_text.len() < self.printed {
            // A new turn started over.
            self.printed = 0;
        }
        if let Some(fresh) = state.assembled_text.get(self.printed..) {
            if !fresh.is_empty() {
                write!(out, "{fresh}")?;
                self.printed = state.assembled_text.len();
                self.line_open = true;
            }
        }
        out.flush()
    }

    /// Print whatever the final message adds beyond the streamed text and end
    /// the line.
    pub fn complete(&mut self, message: &ChatMessage, out: &mut impl Write) -> io::Result<()> {
        if let Some(rest) = message.message.get(self.printed..) {
            write!(out, "{rest}")?;
        }
        writeln!(out)?;
        self.printed = 0;
        self.line_open = false;
        out.flush()
    }

    fn break_line(&mut self, out: &mut impl Write) -> io::Result<()> {
        if self.line_open {
            writeln!(out)?;
            self.line_open = false;
        }
        Ok(())
    }
}

/// Writes transcript progress as one line per change.
#[derive(Debug, Default)]
pub struct TranscriptPrinter {
    last_final: String,
    last_interim: String,
}

impl TranscriptPrinter {
    pub fn update(&mut self, transcript: &TranscriptState, out: &mut impl Write) -> io::Result<()> {
        if transcript.final_text != self.last_final {
            if !transcript.final_text.is_empty() {
                writeln!(out, "final:   {}", transcript.final_text)?;
            }
            self.last_final = transcript.final_text.clone();
        }
        if transcript.interim_text != self.last_interim {
            if !transcript.interim_text.is_empty() {
                writeln!(out, "interim: {}", transcript.display_text())?;
            }
            self.last_interim = transcript.interim_text.clone();
        }
        out.flush()
    }
}

pub fn speech_failure(error: &SpeechError) -> String {
    format!("voice input stopped: {}", error.user_message())
}
