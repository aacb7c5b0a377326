//! Scripted channel for session and workflow tests

use std::collections::VecDeque;

use crate::Channel;

#[derive(Clone, Debug, PartialEq)]
pub struct MockError;

/// Replays scripted reply lines, falling back to a fixed reply once the
/// script is exhausted (`None` meaning a read timeout).
#[derive(Default)]
pub struct MockChannel {
    pub writes: Vec<String>,
    pub reads: usize,
    pub script: VecDeque<Option<String>>,
    pub fallback: Option<String>,
    pub fail_writes: bool,
}

impl MockChannel {
    /// Replies `OK` to everything
    pub fn ok() -> Self {
        Self::always("OK")
    }

    /// Replies with the same line to every read
    pub fn always(reply: &str) -> Self {
        Self { fallback: Some(reply.to_string()), ..Default::default() }
    }

    /// Never replies
    pub fn silent() -> Self {
        Self::default()
    }

    /// Queue replies ahead of the fallback
    pub fn with_script(mut self, script: &[Option<&str>]) -> Self {
        self.script = script.iter().map(|s| s.map(String::from)).collect();
        self
    }

    /// Writes that were exit commands
    pub fn exits(&self) -> usize {
        self.writes.iter().filter(|w| w.as_str() == "C").count()
    }

    /// Writes that were program commands
    pub fn programs(&self) -> Vec<&str> {
        self.writes
            .iter()
            .filter(|w| w.starts_with('P'))
            .map(|w| w.as_str())
            .collect()
    }
}

impl Channel for MockChannel {
    type Error = MockError;

    fn write(&mut self, data: &str) -> Result<(), MockError> {
        if self.fail_writes {
            return Err(MockError);
        }
        self.writes.push(data.to_string());
        Ok(())
    }

    fn read_line(&mut self, _timeout_ms: u32) -> Result<Option<String>, MockError> {
        self.reads += 1;

        match self.script.pop_front() {
            Some(r) => Ok(r),
            None => Ok(self.fallback.clone()),
        }
    }
}
