// src/core/sink.rs
//! Interactive output: progress notices and markdown messages for the person at the terminal

use tracing::info;

/// Write-only channel to the user
pub trait OutputSink: Send + Sync {
    /// Short status line while the pipeline works
    fn progress(&self, message: &str);

    /// A message meant to be read, e.g. a clarification request
    fn markdown(&self, message: &str);
}

/// Progress goes to the log on stderr, markdown to stdout
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl OutputSink for ConsoleSink {
    fn progress(&self, message: &str) {
        info!("{}", message);
    }

    fn markdown(&self, message: &str) {
        println!("{}", message);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Sink that keeps everything it was given, tagged by channel
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub messages: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        pub(crate) fn markdown_messages(&self) -> Vec<String> {
            self.messages.lock().unwrap().iter()
                .filter_map(|m| m.strip_prefix("markdown: ").map(str::to_string))
                .collect()
        }

        pub(crate) fn progress_messages(&self) -> Vec<String> {
            self.messages.lock().unwrap().iter()
                .filter_map(|m| m.strip_prefix("progress: ").map(str::to_string))
                .collect()
        }
    }

    impl OutputSink for RecordingSink {
        fn progress(&self, message: &str) {
            self.messages.lock().unwrap().push(format!("progress: {}", message));
        }

        fn markdown(&self, message: &str) {
            self.messages.lock().unwrap().push(format!("markdown: {}", message));
        }
    }

    #[test]
    fn test_recording_sink_separates_channels() {
        let sink = RecordingSink::default();
        sink.progress("scanning");
        sink.markdown("**pick one**");
        assert_eq!(sink.progress_messages(), vec!["scanning"]);
        assert_eq!(sink.markdown_messages(), vec!["**pick one**"]);
    }
}
