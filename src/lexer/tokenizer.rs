// Protolens Tokenizer
// Forward-only, peekable scanner over raw proto source used for look-back
// around a cursor where the syntax tree is unreliable

use regex::Regex;
use rustc_hash::FxHashMap;
use std::sync::OnceLock;

use super::token::{Comment, CommentStyle, Token};
use crate::error::{TokenizeError, TokenizeResult};

fn is_delimiter(c: char) -> bool {
    c.is_whitespace()
        || matches!(
            c,
            '{' | '}' | '=' | ';' | ':' | '[' | ']' | ',' | '\'' | '"' | '(' | ')' | '<' | '>'
        )
}

fn comment_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^ *[*/]+ *").expect("valid comment prefix pattern"))
}

fn alternate_comment_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*\*?/*").expect("valid comment prefix pattern"))
}

fn double_slash_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*/{1,2}").expect("valid comment line pattern"))
}

/// Resolve backslash escapes inside a string literal body.
pub fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('\0'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Lexical scanner over proto source.
///
/// Whitespace and comments are skipped. In the default mode only `///` and
/// `/** */` comments are recorded as documentation; in alternate mode every
/// comment is, and consecutive leading `//` lines merge into one.
pub struct Tokenizer<'a> {
    source: &'a str,
    offset: usize,
    line: usize,
    last_comment_line: Option<usize>,
    comments: FxHashMap<usize, Comment>,
    stack: Vec<Token>,
    string_delimiter: Option<u8>,
    alternate_comment_mode: bool,
    failure: Option<TokenizeError>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self::with_mode(source, false)
    }

    pub fn alternate(source: &'a str) -> Self {
        Self::with_mode(source, true)
    }

    pub fn with_mode(source: &'a str, alternate_comment_mode: bool) -> Self {
        Self {
            source,
            offset: 0,
            line: 0,
            last_comment_line: None,
            comments: FxHashMap::default(),
            stack: Vec::new(),
            string_delimiter: None,
            alternate_comment_mode,
            failure: None,
        }
    }

    /// Current zero-based line.
    pub fn row(&self) -> usize {
        self.line
    }

    /// Consume and return the next token, `None` at end of input.
    ///
    /// An `IllegalSyntax` failure is sticky: every later call returns it again.
    pub fn next(&mut self) -> TokenizeResult<Option<Token>> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        if let Some(token) = self.stack.pop() {
            return Ok(Some(token));
        }
        match self.scan() {
            Ok(token) => Ok(token),
            Err(err) => {
                self.failure = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Return the next token without consuming it.
    pub fn peek(&mut self) -> TokenizeResult<Option<&Token>> {
        if self.stack.is_empty() {
            match self.next()? {
                Some(token) => self.stack.push(token),
                None => return Ok(None),
            }
        }
        Ok(self.stack.last())
    }

    /// Push a token back; it is returned by the next call to `next`.
    pub fn push(&mut self, token: Token) {
        self.stack.push(token);
    }

    /// Consume the next token if it equals `expected`.
    pub fn skip(&mut self, expected: &str, optional: bool) -> TokenizeResult<bool> {
        let found = self.peek()?.map(|t| t.text.clone());
        if found.as_deref() == Some(expected) {
            self.next()?;
            return Ok(true);
        }
        if !optional {
            return Err(TokenizeError::UnexpectedToken {
                found: found.unwrap_or_default(),
                expected: expected.to_string(),
                line: self.line,
            });
        }
        Ok(false)
    }

    /// Take the documentation comment attached to the current position.
    ///
    /// Without `trailing_line`, returns the leading comment on the line just
    /// before the current one. With it, returns the trailing comment recorded
    /// on exactly that line. A comment is handed out at most once.
    pub fn cmnt(&mut self, trailing_line: Option<usize>) -> Option<String> {
        match trailing_line {
            None => {
                let key = self.line.checked_sub(1)?;
                let comment = self.comments.remove(&key)?;
                let eligible = self.alternate_comment_mode
                    || comment.style == CommentStyle::Block
                    || comment.line_empty;
                (eligible && comment.leading).then_some(comment.text)
            }
            Some(line) => {
                if self.last_comment_line.map_or(true, |last| last < line) {
                    // A failure here stays recorded and resurfaces from next().
                    let _ = self.peek();
                }
                let comment = self.comments.remove(&line)?;
                let eligible = !comment.line_empty
                    && (self.alternate_comment_mode || comment.style == CommentStyle::Line);
                (eligible && !comment.leading).then_some(comment.text)
            }
        }
    }

    /// Drain the remaining tokens as an iterator that stops after the first error.
    pub fn tokens(self) -> Tokens<'a> {
        Tokens {
            tokenizer: self,
            done: false,
        }
    }

    fn illegal(&self, subject: &'static str) -> TokenizeError {
        TokenizeError::IllegalSyntax {
            subject,
            line: self.line,
        }
    }

    fn byte_at(&self, pos: usize) -> Option<u8> {
        self.source.as_bytes().get(pos).copied()
    }

    fn char_at(&self, pos: usize) -> Option<char> {
        self.source.get(pos..).and_then(|rest| rest.chars().next())
    }

    fn find_end_of_line(&self, from: usize) -> usize {
        self.source[from..]
            .find('\n')
            .map(|i| from + i)
            .unwrap_or(self.source.len())
    }

    fn is_double_slash_comment_line(&self, from: usize) -> bool {
        let end = self.find_end_of_line(from);
        double_slash_line().is_match(&self.source[from..end])
    }

    fn scan(&mut self) -> TokenizeResult<Option<Token>> {
        if let Some(delimiter) = self.string_delimiter {
            return self.read_string(delimiter).map(Some);
        }

        let mut leading = self.offset == 0;
        loop {
            loop {
                let Some(c) = self.char_at(self.offset) else {
                    return Ok(None);
                };
                if !c.is_whitespace() {
                    break;
                }
                if c == '\n' {
                    leading = true;
                    self.line += 1;
                }
                self.offset += c.len_utf8();
            }

            if self.byte_at(self.offset) != Some(b'/') {
                break;
            }
            self.offset += 1;
            match self.byte_at(self.offset) {
                None => return Err(self.illegal("comment")),
                Some(b'/') if self.alternate_comment_mode => self.merged_line_comment(&mut leading),
                Some(b'/') => self.line_comment(&mut leading),
                Some(b'*') => self.block_comment(&mut leading)?,
                Some(_) => return Ok(Some(Token::new("/", self.offset))),
            }
        }

        let start = self.offset;
        let Some(first) = self.char_at(start) else {
            return Ok(None);
        };
        let mut end = start + first.len_utf8();
        if !is_delimiter(first) {
            while let Some(c) = self.char_at(end) {
                if is_delimiter(c) {
                    break;
                }
                end += c.len_utf8();
            }
        }
        self.offset = end;
        let text = &self.source[start..end];
        if text == "\"" || text == "'" {
            self.string_delimiter = Some(text.as_bytes()[0]);
        }
        Ok(Some(Token::new(text, end)))
    }

    // self.offset sits on the second slash.
    fn line_comment(&mut self, leading: &mut bool) {
        let opener = self.offset - 1;
        let is_doc = self.byte_at(self.offset + 1) == Some(b'/');
        let eol = self.find_end_of_line(self.offset);
        if is_doc {
            self.set_comment(opener, opener + 3, eol, CommentStyle::Line, *leading);
            // a trailing comment never spans lines
            *leading = true;
        }
        self.offset = eol;
        if eol < self.source.len() {
            self.offset += 1;
            self.line += 1;
        }
    }

    // self.offset sits on the second slash.
    fn merged_line_comment(&mut self, leading: &mut bool) {
        let opener = self.offset - 1;
        let mut body_end;
        let mut newline_consumed = false;
        loop {
            body_end = self.find_end_of_line(self.offset);
            if body_end == self.source.len() {
                self.offset = body_end;
                break;
            }
            self.offset = body_end + 1;
            if !*leading || !self.is_double_slash_comment_line(self.offset) {
                newline_consumed = true;
                break;
            }
            self.line += 1;
        }
        self.set_comment(opener, opener + 2, body_end, CommentStyle::Line, *leading);
        *leading = true;
        if newline_consumed {
            self.line += 1;
        }
    }

    // self.offset sits on the asterisk.
    fn block_comment(&mut self, leading: &mut bool) -> TokenizeResult<()> {
        let opener = self.offset - 1;
        let Some(close) = self.source[opener + 2..].find("*/").map(|i| opener + 2 + i) else {
            self.line += self.source[opener..].matches('\n').count();
            self.offset = self.source.len();
            return Err(self.illegal("comment"));
        };
        self.line += self.source[opener..close].matches('\n').count();
        self.offset = close + 2;

        let is_doc = self.alternate_comment_mode || self.byte_at(opener + 2) == Some(b'*');
        if is_doc {
            let skip = if self.alternate_comment_mode { 2 } else { 3 };
            let body_start = (opener + skip).min(close);
            self.set_comment(opener, body_start, close, CommentStyle::Block, *leading);
            *leading = true;
        }
        Ok(())
    }

    fn set_comment(
        &mut self,
        opener: usize,
        body_start: usize,
        body_end: usize,
        style: CommentStyle,
        leading: bool,
    ) {
        let line_empty = self.source[..opener]
            .bytes()
            .rev()
            .take_while(|b| *b != b'\n')
            .all(|b| b == b' ' || b == b'\t');

        let prefix = if self.alternate_comment_mode {
            alternate_comment_prefix()
        } else {
            comment_prefix()
        };
        let text = self.source[body_start..body_end]
            .split('\n')
            .map(|line| prefix.replace(line, "").trim().to_string())
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string();

        self.comments.insert(
            self.line,
            Comment {
                text,
                style,
                line_empty,
                leading,
            },
        );
        self.last_comment_line = Some(self.line);
    }

    // self.offset sits just after the opening quote.
    fn read_string(&mut self, delimiter: u8) -> TokenizeResult<Token> {
        let bytes = self.source.as_bytes();
        let start = self.offset;
        let mut i = start;
        let mut newlines = 0;
        loop {
            match bytes.get(i) {
                None => return Err(self.illegal("string")),
                Some(b'\\') => {
                    if bytes.get(i + 1) == Some(&b'\n') {
                        newlines += 1;
                    }
                    i += 2;
                }
                Some(&b) if b == delimiter => break,
                Some(b'\n') => {
                    newlines += 1;
                    i += 1;
                }
                Some(_) => i += 1,
            }
        }

        self.line += newlines;
        self.offset = i + 1;
        self.string_delimiter = None;
        let quote = if delimiter == b'\'' { "'" } else { "\"" };
        self.push(Token::new(quote, self.offset));
        Ok(Token::new(unescape(&self.source[start..i]), i))
    }
}

/// Iterator adaptor over a tokenizer, yielding the first error and then stopping.
pub struct Tokens<'a> {
    tokenizer: Tokenizer<'a>,
    done: bool,
}

impl Iterator for Tokens<'_> {
    type Item = TokenizeResult<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.tokenizer.next() {
            Ok(Some(token)) => Some(Ok(token)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
