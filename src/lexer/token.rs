// Protolens Token Definitions

use std::fmt;

/// A raw lexical token.
///
/// `offset` is the exclusive end of the token inside the scanned buffer.
/// For string content tokens `text` holds the unescaped value, so its length
/// may differ from the raw source span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub offset: usize,
}

impl Token {
    pub fn new(text: impl Into<String>, offset: usize) -> Self {
        Self {
            text: text.into(),
            offset,
        }
    }

    pub fn width(&self) -> usize {
        self.text.len()
    }

    /// Start index, valid for tokens whose text is a verbatim slice of the source.
    pub fn start(&self) -> usize {
        self.offset.saturating_sub(self.width())
    }

    pub fn is(&self, text: &str) -> bool {
        self.text == text
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentStyle {
    /// `//` or `///`
    Line,
    /// `/* */` or `/** */`
    Block,
}

/// A documentation comment recorded by the tokenizer, keyed by the line it ends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub text: String,
    pub style: CommentStyle,
    /// Only whitespace precedes the comment opener on its line.
    pub line_empty: bool,
    /// No code appeared between the previous line break and the comment.
    pub leading: bool,
}
