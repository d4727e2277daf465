// ============================================================
// Layer 4 — Text Preprocessor
// ============================================================
// Normalises raw corpus lines before they reach the tokenizer.
//
// Corpora such as PTB or SNLI dumps are mostly clean, but
// copies found in the wild carry:
//   - Non-breaking spaces (U+00A0) and zero-width spaces
//   - Byte order marks at the start of the file
//   - Tabs and carriage returns from Windows line endings
//   - Runs of spaces from column alignment
//
// Cleaning steps (applied in order):
//   1. Map Unicode whitespace variants and control characters to a space
//   2. Collapse runs of spaces into one
//   3. Trim both ends
//   4. Optionally lowercase
//
// Line structure matters for the language model (every line
// ends with [EOS]), so this cleaner never merges lines.

pub struct Preprocessor {
    lowercase: bool,
}

impl Preprocessor {
    pub fn new() -> Self {
        Self { lowercase: false }
    }

    /// Also fold everything to lowercase
    pub fn lowercasing() -> Self {
        Self { lowercase: true }
    }

    /// Clean a single line. Newlines inside the input are treated
    /// as whitespace, so the result is always one line.
    pub fn clean_line(&self, line: &str) -> String {
        let mut out        = String::with_capacity(line.len());
        let mut last_space = true; // swallows leading whitespace

        for c in line.chars() {
            let c = match c {
                '\u{00A0}' | '\u{200B}' | '\u{FEFF}' => ' ',
                c if c.is_whitespace() || c.is_control() => ' ',
                c => c,
            };

            if c == ' ' {
                if !last_space {
                    out.push(' ');
                }
                last_space = true;
            } else if self.lowercase {
                out.extend(c.to_lowercase());
                last_space = false;
            } else {
                out.push(c);
                last_space = false;
            }
        }

        // At most one trailing space can survive the loop
        if out.ends_with(' ') {
            out.pop();
        }
        out
    }

    /// Clean every line of a document, dropping lines that end up empty.
    pub fn clean_lines(&self, text: &str) -> Vec<String> {
        text.lines()
            .map(|line| self.clean_line(line))
            .filter(|line| !line.is_empty())
            .collect()
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_multiple_spaces() {
        let p = Preprocessor::new();
        assert_eq!(p.clean_line("the   cat \t sat"), "the cat sat");
    }

    #[test]
    fn test_trims_edges() {
        let p = Preprocessor::new();
        assert_eq!(p.clean_line("  \u{FEFF}hello world \r"), "hello world");
    }

    #[test]
    fn test_removes_control_chars() {
        let p = Preprocessor::new();
        assert_eq!(p.clean_line("hello\x01world"), "hello world");
        assert_eq!(p.clean_line("a\u{00A0}b\u{200B}c"), "a b c");
    }

    #[test]
    fn test_lowercasing() {
        let p = Preprocessor::lowercasing();
        assert_eq!(p.clean_line("A Man IS Playing"), "a man is playing");
    }

    #[test]
    fn test_clean_lines_drops_blank_lines() {
        let p = Preprocessor::new();
        let lines = p.clean_lines("one\n\n   \ntwo  three\n");
        assert_eq!(lines, vec!["one".to_string(), "two three".to_string()]);
    }

    #[test]
    fn test_empty_string() {
        assert_eq!(Preprocessor::new().clean_line(""), "");
    }
}
