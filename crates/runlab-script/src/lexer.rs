//! Tokenizer for the JavaScript subset.
//!
//! Produces the whole token stream up front. Each token remembers whether a
//! line terminator preceded it, which is all the parser needs for its
//! simplified automatic semicolon insertion.

use crate::error::ParseError;

/// Reserved words the parser treats specially.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Let,
    Const,
    Var,
    Function,
    Return,
    If,
    Else,
    While,
    Do,
    For,
    In,
    Instanceof,
    Break,
    Continue,
    Throw,
    Try,
    Catch,
    Finally,
    New,
    Delete,
    Typeof,
    Void,
    True,
    False,
    Null,
    This,
    Switch,
    Case,
    Default,
    Await,
}

impl Keyword {
    fn from_word(word: &str) -> Option<Keyword> {
        let keyword = match word {
            "let" => Keyword::Let,
            "const" => Keyword::Const,
            "var" => Keyword::Var,
            "function" => Keyword::Function,
            "return" => Keyword::Return,
            "if" => Keyword::If,
            "else" => Keyword::Else,
            "while" => Keyword::While,
            "do" => Keyword::Do,
            "for" => Keyword::For,
            "in" => Keyword::In,
            "instanceof" => Keyword::Instanceof,
            "break" => Keyword::Break,
            "continue" => Keyword::Continue,
            "throw" => Keyword::Throw,
            "try" => Keyword::Try,
            "catch" => Keyword::Catch,
            "finally" => Keyword::Finally,
            "new" => Keyword::New,
            "delete" => Keyword::Delete,
            "typeof" => Keyword::Typeof,
            "void" => Keyword::Void,
            "true" => Keyword::True,
            "false" => Keyword::False,
            "null" => Keyword::Null,
            "this" => Keyword::This,
            "switch" => Keyword::Switch,
            "case" => Keyword::Case,
            "default" => Keyword::Default,
            "await" => Keyword::Await,
            _ => return None,
        };
        Some(keyword)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::Let => "let",
            Keyword::Const => "const",
            Keyword::Var => "var",
            Keyword::Function => "function",
            Keyword::Return => "return",
            Keyword::If => "if",
            Keyword::Else => "else",
            Keyword::While => "while",
            Keyword::Do => "do",
            Keyword::For => "for",
            Keyword::In => "in",
            Keyword::Instanceof => "instanceof",
            Keyword::Break => "break",
            Keyword::Continue => "continue",
            Keyword::Throw => "throw",
            Keyword::Try => "try",
            Keyword::Catch => "catch",
            Keyword::Finally => "finally",
            Keyword::New => "new",
            Keyword::Delete => "delete",
            Keyword::Typeof => "typeof",
            Keyword::Void => "void",
            Keyword::True => "true",
            Keyword::False => "false",
            Keyword::Null => "null",
            Keyword::This => "this",
            Keyword::Switch => "switch",
            Keyword::Case => "case",
            Keyword::Default => "default",
            Keyword::Await => "await",
        }
    }
}

/// Operators and delimiters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punct {
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Semi,
    Comma,
    Dot,
    QuestionDot,
    Ellipsis,
    Colon,
    Question,
    Arrow,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    StarStarAssign,
    Eq,
    StrictEq,
    NotEq,
    StrictNotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    StarStar,
    PlusPlus,
    MinusMinus,
    Bang,
    Tilde,
    AmpAmp,
    PipePipe,
    QuestionQuestion,
    Amp,
    Pipe,
    Caret,
    Shl,
    Shr,
    UShr,
}

/// Longest match first.
const PUNCTUATORS: &[(&str, Punct)] = &[
    (">>>", Punct::UShr),
    ("===", Punct::StrictEq),
    ("!==", Punct::StrictNotEq),
    ("**=", Punct::StarStarAssign),
    ("...", Punct::Ellipsis),
    ("=>", Punct::Arrow),
    ("==", Punct::Eq),
    ("!=", Punct::NotEq),
    ("<=", Punct::LtEq),
    (">=", Punct::GtEq),
    ("+=", Punct::PlusAssign),
    ("-=", Punct::MinusAssign),
    ("*=", Punct::StarAssign),
    ("/=", Punct::SlashAssign),
    ("%=", Punct::PercentAssign),
    ("**", Punct::StarStar),
    ("++", Punct::PlusPlus),
    ("--", Punct::MinusMinus),
    ("&&", Punct::AmpAmp),
    ("||", Punct::PipePipe),
    ("??", Punct::QuestionQuestion),
    ("?.", Punct::QuestionDot),
    ("<<", Punct::Shl),
    (">>", Punct::Shr),
    ("{", Punct::LBrace),
    ("}", Punct::RBrace),
    ("(", Punct::LParen),
    (")", Punct::RParen),
    ("[", Punct::LBracket),
    ("]", Punct::RBracket),
    (";", Punct::Semi),
    (",", Punct::Comma),
    (".", Punct::Dot),
    (":", Punct::Colon),
    ("?", Punct::Question),
    ("=", Punct::Assign),
    ("<", Punct::Lt),
    (">", Punct::Gt),
    ("+", Punct::Plus),
    ("-", Punct::Minus),
    ("*", Punct::Star),
    ("/", Punct::Slash),
    ("%", Punct::Percent),
    ("!", Punct::Bang),
    ("~", Punct::Tilde),
    ("&", Punct::Amp),
    ("|", Punct::Pipe),
    ("^", Punct::Caret),
];

impl Punct {
    pub fn as_str(self) -> &'static str {
        PUNCTUATORS
            .iter()
            .find(|(_, p)| *p == self)
            .map(|(text, _)| *text)
            .unwrap_or("?")
    }
}

/// Raw source of one `${...}` substitution inside a template literal.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateSubstitution {
    pub source: String,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Str(String),
    /// `quasis.len() == substitutions.len() + 1`.
    Template {
        quasis: Vec<String>,
        substitutions: Vec<TemplateSubstitution>,
    },
    Ident(String),
    Keyword(Keyword),
    Punct(Punct),
    Eof,
}

impl TokenKind {
    /// Human-readable form used in "Unexpected token" messages.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Number(n) => format!("number {n}"),
            TokenKind::Str(_) => "string".to_string(),
            TokenKind::Template { .. } => "template literal".to_string(),
            TokenKind::Ident(name) => format!("identifier '{name}'"),
            TokenKind::Keyword(k) => format!("'{}'", k.as_str()),
            TokenKind::Punct(p) => format!("'{}'", p.as_str()),
            TokenKind::Eof => "end of input".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
    pub column: u32,
    /// A line terminator appeared between the previous token and this one.
    pub newline_before: bool,
}

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer::with_position(source, 1, 1)
    }

    /// Starts counting lines and columns from the given position. Used for
    /// template substitutions, which are lexed separately.
    pub fn with_position(source: &str, line: u32, column: u32) -> Self {
        Lexer {
            chars: source.chars().collect(),
            pos: 0,
            line,
            column,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        let mut newline_before = false;
        loop {
            newline_before |= self.skip_trivia()?;
            let (line, column) = (self.line, self.column);
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    line,
                    column,
                    newline_before: true,
                });
                return Ok(tokens);
            };

            let kind = if c.is_ascii_digit()
                || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()))
            {
                self.number()?
            } else if c == '"' || c == '\'' {
                self.string(c)?
            } else if c == '`' {
                self.template()?
            } else if is_ident_start(c) {
                self.identifier()
            } else {
                self.punct()?
            };

            tokens.push(Token {
                kind,
                line,
                column,
                newline_before,
            });
            newline_before = false;
        }
    }

    // -----------------------------------------------------------------------
    // Character helpers
    // -----------------------------------------------------------------------

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.line, self.column)
    }

    /// Skips whitespace and comments, reporting whether a newline was seen.
    fn skip_trivia(&mut self) -> Result<bool, ParseError> {
        let mut newline = false;
        while let Some(c) = self.peek() {
            match c {
                '\n' | '\u{2028}' | '\u{2029}' => {
                    newline = true;
                    self.advance();
                }
                c if c.is_whitespace() || c == '\u{feff}' => {
                    self.advance();
                }
                '/' if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                '/' if self.peek_at(1) == Some('*') => {
                    let (line, column) = (self.line, self.column);
                    self.advance();
                    self.advance();
                    loop {
                        match self.advance() {
                            Some('*') if self.peek() == Some('/') => {
                                self.advance();
                                break;
                            }
                            Some('\n') => newline = true,
                            Some(_) => {}
                            None => {
                                return Err(ParseError::new(
                                    "Unterminated comment",
                                    line,
                                    column,
                                ))
                            }
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(newline)
    }

    // -----------------------------------------------------------------------
    // Literals
    // -----------------------------------------------------------------------

    fn number(&mut self) -> Result<TokenKind, ParseError> {
        let start_column = self.column;
        let radix = match (self.peek(), self.peek_at(1)) {
            (Some('0'), Some('x' | 'X')) => Some(16),
            (Some('0'), Some('o' | 'O')) => Some(8),
            (Some('0'), Some('b' | 'B')) => Some(2),
            _ => None,
        };

        let value = if let Some(radix) = radix {
            self.advance();
            self.advance();
            let mut digits = String::new();
            while let Some(c) = self.peek() {
                if c == '_' {
                    self.advance();
                } else if c.is_digit(radix) {
                    digits.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
            if digits.is_empty() {
                return Err(self.error("Invalid or unexpected token"));
            }
            digits
                .chars()
                .filter_map(|d| d.to_digit(radix))
                .fold(0f64, |acc, d| acc * radix as f64 + d as f64)
        } else {
            let mut text = String::new();
            self.digits_into(&mut text);
            if self.peek() == Some('.') && self.peek_at(1).map_or(true, |c| !is_ident_start(c)) {
                text.push('.');
                self.advance();
                self.digits_into(&mut text);
            }
            if matches!(self.peek(), Some('e' | 'E')) {
                let sign = self.peek_at(1);
                let has_sign = matches!(sign, Some('+' | '-'));
                let first_digit = if has_sign { self.peek_at(2) } else { sign };
                if first_digit.is_some_and(|c| c.is_ascii_digit()) {
                    text.push('e');
                    self.advance();
                    if has_sign {
                        if let Some(s) = self.advance() {
                            text.push(s);
                        }
                    }
                    self.digits_into(&mut text);
                }
            }
            text.parse::<f64>().map_err(|_| {
                ParseError::new("Invalid or unexpected token", self.line, start_column)
            })?
        };

        if self.peek().is_some_and(is_ident_start) {
            return Err(self.error("Invalid or unexpected token"));
        }
        Ok(TokenKind::Number(value))
    }

    fn digits_into(&mut self, text: &mut String) {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.advance();
            } else if c == '_' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn string(&mut self, quote: char) -> Result<TokenKind, ParseError> {
        let (line, column) = (self.line, self.column);
        self.advance();
        let mut value = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => {
                    return Err(ParseError::new("Unterminated string literal", line, column))
                }
                Some(c) if c == quote => {
                    self.advance();
                    return Ok(TokenKind::Str(value));
                }
                Some('\\') => {
                    self.advance();
                    self.escape(&mut value)?;
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }
    }

    /// Decodes one escape sequence; the backslash is already consumed.
    fn escape(&mut self, out: &mut String) -> Result<(), ParseError> {
        let Some(c) = self.advance() else {
            return Err(self.error("Invalid or unexpected token"));
        };
        match c {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' if !self.peek().is_some_and(|d| d.is_ascii_digit()) => out.push('\0'),
            '\n' => {}
            'x' => {
                let code = self.hex_digits(2)?;
                out.push(char::from_u32(code).ok_or_else(|| self.error("Invalid hexadecimal escape sequence"))?);
            }
            'u' => {
                let code = self.unicode_escape()?;
                if (0xD800..0xDC00).contains(&code)
                    && self.peek() == Some('\\')
                    && self.peek_at(1) == Some('u')
                {
                    self.advance();
                    self.advance();
                    let low = self.unicode_escape()?;
                    let combined = 0x10000 + ((code - 0xD800) << 10) + (low.wrapping_sub(0xDC00) & 0x3FF);
                    out.push(char::from_u32(combined).unwrap_or('\u{fffd}'));
                } else {
                    out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
                }
            }
            other => out.push(other),
        }
        Ok(())
    }

    fn unicode_escape(&mut self) -> Result<u32, ParseError> {
        if self.peek() == Some('{') {
            self.advance();
            let mut code = 0u32;
            let mut digits = 0;
            while let Some(c) = self.peek() {
                if c == '}' {
                    break;
                }
                let d = c
                    .to_digit(16)
                    .ok_or_else(|| self.error("Invalid Unicode escape sequence"))?;
                code = code.saturating_mul(16).saturating_add(d);
                digits += 1;
                self.advance();
            }
            if self.advance() != Some('}') || digits == 0 || code > 0x10FFFF {
                return Err(self.error("Invalid Unicode escape sequence"));
            }
            Ok(code)
        } else {
            self.hex_digits(4)
        }
    }

    fn hex_digits(&mut self, count: usize) -> Result<u32, ParseError> {
        let mut code = 0u32;
        for _ in 0..count {
            let d = self
                .peek()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| self.error("Invalid hexadecimal escape sequence"))?;
            code = code * 16 + d;
            self.advance();
        }
        Ok(code)
    }

    fn template(&mut self) -> Result<TokenKind, ParseError> {
        let (line, column) = (self.line, self.column);
        self.advance();
        let mut quasis = Vec::new();
        let mut substitutions = Vec::new();
        let mut current = String::new();
        loop {
            match self.peek() {
                None => return Err(ParseError::new("Unterminated template literal", line, column)),
                Some('`') => {
                    self.advance();
                    quasis.push(current);
                    return Ok(TokenKind::Template {
                        quasis,
                        substitutions,
                    });
                }
                Some('\\') => {
                    self.advance();
                    self.escape(&mut current)?;
                }
                Some('$') if self.peek_at(1) == Some('{') => {
                    self.advance();
                    self.advance();
                    quasis.push(std::mem::take(&mut current));
                    substitutions.push(self.substitution()?);
                }
                Some(c) => {
                    current.push(c);
                    self.advance();
                }
            }
        }
    }

    /// Collects the raw text of a `${...}` body up to its matching brace.
    fn substitution(&mut self) -> Result<TemplateSubstitution, ParseError> {
        let (line, column) = (self.line, self.column);
        let mut source = String::new();
        let mut depth = 0usize;
        let mut quote: Option<char> = None;
        loop {
            let Some(c) = self.advance() else {
                return Err(ParseError::new("Unterminated template literal", line, column));
            };
            if let Some(q) = quote {
                source.push(c);
                if c == '\\' {
                    if let Some(next) = self.advance() {
                        source.push(next);
                    }
                } else if c == q {
                    quote = None;
                }
                continue;
            }
            match c {
                '\'' | '"' | '`' => {
                    quote = Some(c);
                    source.push(c);
                }
                '{' => {
                    depth += 1;
                    source.push(c);
                }
                '}' if depth == 0 => {
                    return Ok(TemplateSubstitution {
                        source,
                        line,
                        column,
                    })
                }
                '}' => {
                    depth -= 1;
                    source.push(c);
                }
                _ => source.push(c),
            }
        }
    }

    fn identifier(&mut self) -> TokenKind {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if is_ident_part(c) {
                word.push(c);
                self.advance();
            } else {
                break;
            }
        }
        match Keyword::from_word(&word) {
            Some(keyword) => TokenKind::Keyword(keyword),
            None => TokenKind::Ident(word),
        }
    }

    fn punct(&mut self) -> Result<TokenKind, ParseError> {
        for (text, punct) in PUNCTUATORS {
            let matches = text
                .chars()
                .enumerate()
                .all(|(i, expected)| self.peek_at(i) == Some(expected));
            if !matches {
                continue;
            }
            // `a?.5:b` is a conditional, not optional chaining.
            if *punct == Punct::QuestionDot && self.peek_at(2).is_some_and(|c| c.is_ascii_digit()) {
                continue;
            }
            for _ in 0..text.len() {
                self.advance();
            }
            return Ok(TokenKind::Punct(*punct));
        }
        let c = self.peek().unwrap_or(' ');
        Err(self.error(format!("Invalid or unexpected token '{c}'")))
    }
}

pub fn is_ident_start(c: char) -> bool {
    c == '_' || c == '$' || c.is_alphabetic()
}

pub fn is_ident_part(c: char) -> bool {
    is_ident_start(c) || c.is_ascii_digit() || c == '\u{200c}' || c == '\u{200d}'
}

/// Whether `name` can be written as a bare identifier or property name.
pub fn is_identifier_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(is_ident_start) && chars.all(is_ident_part)
}

/// Convenience wrapper over [`Lexer::tokenize`].
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    Lexer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_numbers_in_all_forms() {
        assert_eq!(
            kinds("1 2.5 .5 1e3 0xff 1_000"),
            vec![
                TokenKind::Number(1.0),
                TokenKind::Number(2.5),
                TokenKind::Number(0.5),
                TokenKind::Number(1000.0),
                TokenKind::Number(255.0),
                TokenKind::Number(1000.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn decodes_string_escapes() {
        assert_eq!(
            kinds(r#"'a\nb' "A\x42" "\u{1F600}""#),
            vec![
                TokenKind::Str("a\nb".into()),
                TokenKind::Str("AB".into()),
                TokenKind::Str("\u{1F600}".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn longest_punctuator_wins() {
        assert_eq!(
            kinds("a === b ?? c?.d"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Punct(Punct::StrictEq),
                TokenKind::Ident("b".into()),
                TokenKind::Punct(Punct::QuestionQuestion),
                TokenKind::Ident("c".into()),
                TokenKind::Punct(Punct::QuestionDot),
                TokenKind::Ident("d".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn tracks_lines_and_newlines_through_comments() {
        let tokens = tokenize("a // one\n/* two\nthree */ b").unwrap();
        assert_eq!(tokens[0].line, 1);
        assert!(!tokens[0].newline_before);
        assert_eq!(tokens[1].line, 3);
        assert_eq!(tokens[1].column, 10);
        assert!(tokens[1].newline_before);
    }

    #[test]
    fn splits_template_into_quasis_and_substitutions() {
        let tokens = kinds("`a${x + {y: 1}.y}b${'}'}`");
        let TokenKind::Template {
            quasis,
            substitutions,
        } = &tokens[0]
        else {
            panic!("expected template, got {:?}", tokens[0]);
        };
        assert_eq!(quasis, &vec!["a".to_string(), "b".to_string(), String::new()]);
        assert_eq!(substitutions[0].source, "x + {y: 1}.y");
        assert_eq!(substitutions[1].source, "'}'");
    }

    #[test]
    fn reports_unterminated_string_position() {
        let err = tokenize("let s = 'abc").unwrap_err();
        assert_eq!(err.message, "Unterminated string literal");
        assert_eq!((err.line, err.column), (1, 9));
    }

    #[test]
    fn rejects_identifier_directly_after_number() {
        assert!(tokenize("3in").is_err());
    }
}
