use crate::core::config::data::Config;

impl Config {
    /// Lines shown by `parlance set` with no key: effective values, with
    /// `(default)` marking the ones not set in the file.
    pub fn describe(&self) -> Vec<String> {
        let marker = |is_set: bool| if is_set { "" } else { " (default)" };
        let mut lines = vec![
            format!(
                "  base-url: {}{}",
                self.base_url(),
                marker(self.base_url.is_some())
            ),
            format!(
                "  chat-url: {}{}",
                self.chat_url(),
                marker(self.chat_path.is_some())
            ),
            format!(
                "  transcribe-url: {}{}",
                self.transcribe_url(),
                marker(self.transcribe_path.is_some())
            ),
            format!(
                "  stream-protocol: {}{}",
                self.stream_protocol(),
                marker(self.stream_protocol.is_some())
            ),
            format!(
                "  max-attachments: {}{}",
                self.max_attachments(),
                marker(self.max_attachments.is_some())
            ),
        ];
        match self.request_timeout() {
            Some(timeout) => lines.push(format!("  request-timeout: {}s", timeout.as_secs())),
            None => lines.push("  request-timeout: (none)".to_string()),
        }
        if self.headers.is_empty() {
            lines.push("  headers: (none set)".to_string());
        } else {
            lines.push("  headers:".to_string());
            for name in self.headers.keys() {
                lines.push(format!("    {name}: <set>"));
            }
        }
        lines
    }

    pub fn print_all(&self) {
        println!("Current configuration:");
        for line in self.describe() {
            println!("{line}");
        }
    }
}
