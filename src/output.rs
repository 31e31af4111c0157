//! Terminal rendering of pipeline events.
//!
//! The terminal stands in for the editor view: the highlighted sentence is
//! printed as it becomes audible, status lines go to stderr.

use crate::pipeline::types::PipelineEvent;
use owo_colors::OwoColorize;
use std::io::{self, Write};

/// Clear the current terminal line.
pub fn clear_line() {
    eprint!("\r\x1b[2K");
}

/// Renders events for one run.
pub struct EventRenderer {
    segments: Vec<String>,
    json: bool,
    quiet: bool,
    colored: bool,
}

impl EventRenderer {
    pub fn new(segments: Vec<String>) -> Self {
        Self {
            segments,
            json: false,
            quiet: false,
            colored: true,
        }
    }

    /// One JSON object per event on stdout.
    pub fn json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    /// Suppress status lines (highlights and JSON are still printed).
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn colored(mut self, colored: bool) -> Self {
        self.colored = colored;
        self
    }

    /// Text for a highlight line, `None` for an index outside the segments.
    pub fn highlight_line(&self, index: usize) -> Option<String> {
        let sentence = self.segments.get(index)?;
        let position = format!("[{}/{}]", index + 1, self.segments.len());
        Some(if self.colored {
            format!("{} {}", position.dimmed(), sentence.bold())
        } else {
            format!("{position} {sentence}")
        })
    }

    /// Text for a status line.
    pub fn status_line(&self, text: &str) -> String {
        if self.colored {
            text.cyan().to_string()
        } else {
            text.to_string()
        }
    }

    /// Print one event.
    pub fn render(&self, event: &PipelineEvent) {
        if self.json {
            match serde_json::to_string(event) {
                Ok(line) => {
                    let mut stdout = io::stdout().lock();
                    if writeln!(stdout, "{line}").and_then(|()| stdout.flush()).is_err() {
                        tracing::debug!("stdout closed, event not printed");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Failed to serialize event"),
            }
            return;
        }

        match event {
            PipelineEvent::Highlight { index } => match self.highlight_line(*index) {
                Some(line) => {
                    clear_line();
                    println!("{line}");
                }
                None => tracing::warn!(index, "Highlight for unknown sentence"),
            },
            PipelineEvent::Status { text } => {
                if !self.quiet {
                    clear_line();
                    eprintln!("{}", self.status_line(text));
                }
            }
            PipelineEvent::ClearHighlight => {
                io::stdout().flush().ok();
            }
            PipelineEvent::Finished => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer() -> EventRenderer {
        EventRenderer::new(vec!["Hello world.".to_string(), "How are you?".to_string()])
            .colored(false)
    }

    #[test]
    fn test_highlight_line_shows_position_and_sentence() {
        assert_eq!(
            renderer().highlight_line(1).as_deref(),
            Some("[2/2] How are you?")
        );
    }

    #[test]
    fn test_highlight_line_out_of_range() {
        assert!(renderer().highlight_line(2).is_none());
    }

    #[test]
    fn test_colored_highlight_keeps_text() {
        let line = renderer().colored(true).highlight_line(0).unwrap();
        assert!(line.contains("Hello world."));
        assert!(line.contains("\x1b["), "expected ANSI styling in {line:?}");
    }

    #[test]
    fn test_status_line_plain() {
        assert_eq!(renderer().status_line("Ready"), "Ready");
    }
}
