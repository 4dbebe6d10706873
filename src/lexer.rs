use thiserror::Error;

use crate::token::Token;

enum StepOutcome {
    Emit(Token),
    Continue,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("Unterminated string literal at position {position}")]
    UnterminatedString { position: usize },
    #[error("Invalid number literal '{literal}' at position {position}")]
    InvalidNumberLiteral { literal: String, position: usize },
}

pub type LexResult<T> = Result<T, LexError>;

/// Streaming scanner over a mython source text.
///
/// The scanner always holds one produced token: `current` returns it and
/// `advance` computes the next one. Block structure is synthesized from
/// leading whitespace: the indentation unit is exactly two spaces, and while
/// the emitted indentation level differs from the current line's level, each
/// `advance` emits one `Indent` or `Dedent` until they agree.
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    start_of_line: bool,
    current_indent: usize,
    line_indent: usize,
    current: Token,
}

impl<'a> Lexer<'a> {
    /// Creates a lexer and scans the first token of `input`.
    pub fn new(input: &'a str) -> LexResult<Self> {
        let mut lexer = Self {
            input,
            pos: 0,
            start_of_line: true,
            current_indent: 0,
            line_indent: 0,
            current: Token::Eof,
        };
        lexer.advance()?;
        Ok(lexer)
    }

    /// The last token produced.
    pub fn current(&self) -> &Token {
        &self.current
    }

    /// Scans the next token and makes it current.
    pub fn advance(&mut self) -> LexResult<&Token> {
        loop {
            match self.step()? {
                StepOutcome::Emit(token) => {
                    self.current = token;
                    return Ok(&self.current);
                }
                StepOutcome::Continue => continue,
            }
        }
    }

    fn step(&mut self) -> LexResult<StepOutcome> {
        let Some(ch) = self.peek_char() else {
            return Ok(StepOutcome::Emit(self.read_end_of_input()));
        };

        match ch {
            '\n' => Ok(self.read_line_end()),
            '#' => {
                self.skip_comment();
                Ok(StepOutcome::Continue)
            }
            ' ' => {
                self.read_spaces();
                Ok(StepOutcome::Continue)
            }
            _ if self.start_of_line && self.current_indent != self.line_indent => {
                Ok(StepOutcome::Emit(self.read_indent_change()))
            }
            _ => {
                let token = self.read_significant_token()?;
                self.start_of_line = false;
                Ok(StepOutcome::Emit(token))
            }
        }
    }

    /// End of input: close an unterminated final line with `Newline`, then
    /// drain the open indentation levels one `Dedent` per call, then `Eof`.
    fn read_end_of_input(&mut self) -> Token {
        if !self.start_of_line {
            self.next_line();
            return Token::Newline;
        }
        if self.current_indent > 0 {
            self.current_indent -= 1;
            return Token::Dedent;
        }
        Token::Eof
    }

    fn read_line_end(&mut self) -> StepOutcome {
        self.consume_char();
        if self.start_of_line {
            // Blank line: no token.
            self.next_line();
            StepOutcome::Continue
        } else {
            self.next_line();
            StepOutcome::Emit(Token::Newline)
        }
    }

    fn next_line(&mut self) {
        self.start_of_line = true;
        self.line_indent = 0;
    }

    fn skip_comment(&mut self) {
        // Up to, but not including, the newline.
        self.consume_while(|c| c != '\n');
    }

    fn read_spaces(&mut self) {
        let count = self.consume_while(|c| c == ' ');
        if self.start_of_line {
            self.line_indent = count / 2;
        }
    }

    /// One step towards the current line's indentation level. `start_of_line`
    /// stays set until a significant token is produced, so consecutive calls
    /// keep adjusting until the levels agree.
    fn read_indent_change(&mut self) -> Token {
        if self.current_indent < self.line_indent {
            self.current_indent += 1;
            Token::Indent
        } else {
            self.current_indent -= 1;
            Token::Dedent
        }
    }

    fn read_significant_token(&mut self) -> LexResult<Token> {
        let ch = self.peek_char().unwrap_or_default();
        if ch.is_ascii_digit() {
            self.read_number()
        } else if ch.is_ascii_alphabetic() || ch == '_' {
            Ok(self.read_name())
        } else if ch == '"' || ch == '\'' {
            self.read_string()
        } else {
            Ok(self.read_char_token())
        }
    }

    fn read_number(&mut self) -> LexResult<Token> {
        let start = self.pos;
        self.consume_while(|c| c.is_ascii_digit());
        let literal = &self.input[start..self.pos];
        let value = literal
            .parse::<i64>()
            .map_err(|_| LexError::InvalidNumberLiteral {
                literal: literal.to_string(),
                position: start,
            })?;
        Ok(Token::Number(value))
    }

    fn read_name(&mut self) -> Token {
        let start = self.pos;
        self.consume_while(|c| c.is_ascii_alphanumeric() || c == '_');
        let name = &self.input[start..self.pos];
        Token::keyword(name).unwrap_or_else(|| Token::Id(name.to_string()))
    }

    /// String literal delimited by `'` or `"`. The escapes `\"`, `\'`, `\n`
    /// and `\t` are recognized; any other backslash pair is consumed and
    /// dropped. A raw newline inside the literal is kept verbatim.
    fn read_string(&mut self) -> LexResult<Token> {
        let start = self.pos;
        let quote = self.consume_char().unwrap_or_default();
        let mut text = String::new();
        loop {
            let ch = match self.consume_char() {
                Some(ch) => ch,
                None => return Err(LexError::UnterminatedString { position: start }),
            };
            if ch == quote {
                return Ok(Token::String(text));
            }
            if ch != '\\' {
                text.push(ch);
                continue;
            }
            match self.consume_char() {
                Some('"') => text.push('"'),
                Some('\'') => text.push('\''),
                Some('n') => text.push('\n'),
                Some('t') => text.push('\t'),
                Some(_) => {}
                None => return Err(LexError::UnterminatedString { position: start }),
            }
        }
    }

    fn read_char_token(&mut self) -> Token {
        let first = self.consume_char().unwrap_or_default();
        if let Some(second) = self.peek_char() {
            if let Some(token) = Token::dual_char(first, second) {
                self.consume_char();
                return token;
            }
        }
        Token::Char(first)
    }

    fn consume_while<P>(&mut self, keep_predicate: P) -> usize
    where
        P: Fn(char) -> bool,
    {
        let mut count = 0;
        while let Some(c) = self.peek_char() {
            if !keep_predicate(c) {
                break;
            }
            self.consume_char();
            count += 1;
        }
        count
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn consume_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }
}

/// Drains a lexer into a token vector ending with `Eof`.
pub fn tokenize(input: &str) -> LexResult<Vec<Token>> {
    let mut lexer = Lexer::new(input)?;
    let mut tokens = vec![lexer.current().clone()];
    while tokens.last() != Some(&Token::Eof) {
        tokens.push(lexer.advance()?.clone());
    }
    Ok(tokens)
}
