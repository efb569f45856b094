//! Line-oriented text buffer with indentation.

const INDENT: &str = "    ";

/// Accumulates VHDL source lines.
#[derive(Debug, Default)]
pub(crate) struct LineWriter {
    output: Vec<String>,
    depth: usize,
}

impl LineWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push one line at the current indentation.
    pub fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if text.is_empty() {
            self.output.push(String::new());
        } else {
            self.output.push(format!("{}{}", INDENT.repeat(self.depth), text));
        }
    }

    pub fn blank(&mut self) {
        self.output.push(String::new());
    }

    pub fn indent(&mut self) {
        self.depth += 1;
    }

    pub fn dedent(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Joined text with a trailing newline.
    pub fn finish(self) -> String {
        let mut text = self.output.join("\n");
        text.push('\n');
        text
    }
}
