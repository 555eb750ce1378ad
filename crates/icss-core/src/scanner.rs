/// A non-blank source line with its position.
///
/// `column` is 1 for a line without indentation; `offset` is the byte
/// offset of the first non-blank character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineToken {
    pub text: String,
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

/// Line scanner over raw source text.
///
/// Detects the document's line terminator once at construction (`\r\n`,
/// then `\r`, then `\n`, by presence) and yields right-trimmed non-blank
/// lines. Blank lines never produce tokens, so consumers can rely on
/// token adjacency rather than line adjacency.
pub struct Scanner<'a> {
    source: &'a str,
    terminator: &'static str,
    pos: usize,
    line: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        let terminator = if source.contains("\r\n") {
            "\r\n"
        } else if source.contains('\r') {
            "\r"
        } else {
            "\n"
        };
        Self {
            source,
            terminator,
            pos: 0,
            line: 1,
        }
    }

    /// Next non-blank line token, or `None` at end of input.
    pub fn scan(&mut self) -> Option<LineToken> {
        let len = self.source.len();
        loop {
            if self.pos >= len {
                return None;
            }
            let eol = self.source[self.pos..]
                .find(self.terminator)
                .map(|i| self.pos + i)
                .unwrap_or(len);

            let mut bol = self.pos;
            let mut column = 1;
            while bol < eol {
                let byte = self.source.as_bytes()[bol];
                if byte == b' ' || byte == b'\t' {
                    bol += 1;
                    column += 1;
                } else {
                    break;
                }
            }

            let text = self.source[bol..eol].trim_end();
            let line = self.line;

            if eol == len {
                self.pos = len;
                if text.is_empty() {
                    return None;
                }
            } else {
                self.pos = eol + self.terminator.len();
                self.line += 1;
                if text.is_empty() {
                    continue;
                }
            }

            return Some(LineToken {
                text: text.to_string(),
                offset: bol,
                line,
                column,
            });
        }
    }
}

impl Iterator for Scanner<'_> {
    type Item = LineToken;

    fn next(&mut self) -> Option<LineToken> {
        self.scan()
    }
}
