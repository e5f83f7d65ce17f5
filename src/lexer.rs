/// Byte-level scanner for the rule language.
///
/// Single pass, one byte of lookahead. Whitespace is skipped silently.
/// Strings are `"`-delimited with no escape handling; the body is the raw
/// bytes between the quotes. Numbers are a digit run with at most one `.`;
/// the parser decides integer vs. float. A lone `&` or `|` (or any unknown
/// byte) produces an `Illegal` token — the parser turns it into an error.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Illegal,
    Eof,

    // Literals and names
    Ident,
    Number,
    Str,

    // Operators
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    And,
    Or,
    Bang,

    // Punctuation
    Comma,
    LParen,
    RParen,

    // Keywords
    If,
    Is,
    Else,
    Then,
    True,
    False,
}

impl TokenKind {
    /// Human-readable form for diagnostics.
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Illegal => "illegal token",
            TokenKind::Eof => "end of input",
            TokenKind::Ident => "identifier",
            TokenKind::Number => "number",
            TokenKind::Str => "string",
            TokenKind::Assign => "'='",
            TokenKind::Plus => "'+'",
            TokenKind::Minus => "'-'",
            TokenKind::Star => "'*'",
            TokenKind::Slash => "'/'",
            TokenKind::Percent => "'%'",
            TokenKind::Eq => "'=='",
            TokenKind::NotEq => "'!='",
            TokenKind::Lt => "'<'",
            TokenKind::Gt => "'>'",
            TokenKind::LtEq => "'<='",
            TokenKind::GtEq => "'>='",
            TokenKind::And => "'&&'",
            TokenKind::Or => "'||'",
            TokenKind::Bang => "'!'",
            TokenKind::Comma => "','",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::If => "'if'",
            TokenKind::Is => "'is'",
            TokenKind::Else => "'else'",
            TokenKind::Then => "'then'",
            TokenKind::True => "'true'",
            TokenKind::False => "'false'",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub literal: String,
}

impl Token {
    fn new(kind: TokenKind, literal: impl Into<String>) -> Token {
        Token {
            kind,
            literal: literal.into(),
        }
    }
}

fn keyword_kind(ident: &str) -> Option<TokenKind> {
    match ident {
        "if" => Some(TokenKind::If),
        "is" => Some(TokenKind::Is),
        "else" => Some(TokenKind::Else),
        "then" => Some(TokenKind::Then),
        "true" => Some(TokenKind::True),
        "false" => Some(TokenKind::False),
        _ => None,
    }
}

pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer {
            input: source.as_bytes(),
            pos: 0,
        }
    }

    #[inline]
    fn current(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    #[inline]
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos + 1).copied()
    }

    #[inline]
    fn advance(&mut self) {
        self.pos += 1;
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current() {
            match ch {
                b' ' | b'\t' | b'\n' | b'\r' => self.advance(),
                _ => break,
            }
        }
    }

    fn read_number(&mut self) -> Token {
        let start = self.pos;
        let mut seen_dot = false;
        while let Some(ch) = self.current() {
            match ch {
                b'0'..=b'9' => self.advance(),
                b'.' if !seen_dot => {
                    seen_dot = true;
                    self.advance();
                }
                _ => break,
            }
        }
        Token::new(TokenKind::Number, self.slice(start))
    }

    fn read_string(&mut self) -> Token {
        self.advance(); // opening quote
        let start = self.pos;
        while let Some(ch) = self.current() {
            if ch == b'"' {
                let body = self.slice(start);
                self.advance(); // closing quote
                return Token::new(TokenKind::Str, body);
            }
            self.advance();
        }
        // Ran off the end without a closing quote.
        Token::new(TokenKind::Illegal, self.slice(start))
    }

    fn read_identifier(&mut self) -> Token {
        let start = self.pos;
        while let Some(ch) = self.current() {
            match ch {
                b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' => self.advance(),
                _ => break,
            }
        }
        let name = self.slice(start);
        match keyword_kind(&name) {
            Some(kind) => Token::new(kind, name),
            None => Token::new(TokenKind::Ident, name),
        }
    }

    fn slice(&self, start: usize) -> String {
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }

    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();

        let ch = match self.current() {
            None => return Token::new(TokenKind::Eof, ""),
            Some(ch) => ch,
        };

        match ch {
            b'0'..=b'9' => self.read_number(),
            b'"' => self.read_string(),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.read_identifier(),
            b'=' => {
                self.advance();
                if self.current() == Some(b'=') {
                    self.advance();
                    Token::new(TokenKind::Eq, "==")
                } else {
                    Token::new(TokenKind::Assign, "=")
                }
            }
            b'!' => {
                self.advance();
                if self.current() == Some(b'=') {
                    self.advance();
                    Token::new(TokenKind::NotEq, "!=")
                } else {
                    Token::new(TokenKind::Bang, "!")
                }
            }
            b'<' => {
                self.advance();
                if self.current() == Some(b'=') {
                    self.advance();
                    Token::new(TokenKind::LtEq, "<=")
                } else {
                    Token::new(TokenKind::Lt, "<")
                }
            }
            b'>' => {
                self.advance();
                if self.current() == Some(b'=') {
                    self.advance();
                    Token::new(TokenKind::GtEq, ">=")
                } else {
                    Token::new(TokenKind::Gt, ">")
                }
            }
            b'&' => {
                if self.peek() == Some(b'&') {
                    self.advance();
                    self.advance();
                    Token::new(TokenKind::And, "&&")
                } else {
                    self.advance();
                    Token::new(TokenKind::Illegal, "&")
                }
            }
            b'|' => {
                if self.peek() == Some(b'|') {
                    self.advance();
                    self.advance();
                    Token::new(TokenKind::Or, "||")
                } else {
                    self.advance();
                    Token::new(TokenKind::Illegal, "|")
                }
            }
            b'+' => self.single(TokenKind::Plus, "+"),
            b'-' => self.single(TokenKind::Minus, "-"),
            b'*' => self.single(TokenKind::Star, "*"),
            b'/' => self.single(TokenKind::Slash, "/"),
            b'%' => self.single(TokenKind::Percent, "%"),
            b',' => self.single(TokenKind::Comma, ","),
            b'(' => self.single(TokenKind::LParen, "("),
            b')' => self.single(TokenKind::RParen, ")"),
            other => {
                self.advance();
                Token::new(TokenKind::Illegal, (other as char).to_string())
            }
        }
    }

    fn single(&mut self, kind: TokenKind, literal: &str) -> Token {
        self.advance();
        Token::new(kind, literal)
    }

    /// Scan the whole input, ending with exactly one EOF token.
    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }
        tokens
    }
}
