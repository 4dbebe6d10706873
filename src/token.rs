/// The closed token set produced by the lexer.
///
/// `Indent`, `Dedent` and `Newline` are synthetic: they encode the block
/// structure that mython expresses through significant whitespace. Any single
/// character with no classification of its own is carried as `Char`, which
/// lets the parser decide what `:`, `(`, `.` and friends mean in context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Number(i64),
    Id(String),
    String(String),
    Char(char),

    // Keywords
    Class,
    Return,
    If,
    Else,
    Def,
    Print,
    And,
    Or,
    Not,
    None,
    True,
    False,

    // Two-character operators
    Eq,
    NotEq,
    LessOrEq,
    GreaterOrEq,

    // Structural
    Newline,
    Indent,
    Dedent,
    Eof,
}

impl Token {
    /// Keyword lookup for an identifier-shaped lexeme.
    pub(crate) fn keyword(name: &str) -> Option<Token> {
        let token = match name {
            "class" => Token::Class,
            "return" => Token::Return,
            "if" => Token::If,
            "else" => Token::Else,
            "def" => Token::Def,
            "print" => Token::Print,
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            "None" => Token::None,
            "True" => Token::True,
            "False" => Token::False,
            _ => return None,
        };
        Some(token)
    }

    /// Two-character operator lookup; `first` has been consumed, `second` peeked.
    pub(crate) fn dual_char(first: char, second: char) -> Option<Token> {
        let token = match (first, second) {
            ('=', '=') => Token::Eq,
            ('!', '=') => Token::NotEq,
            ('<', '=') => Token::LessOrEq,
            ('>', '=') => Token::GreaterOrEq,
            _ => return None,
        };
        Some(token)
    }
}
