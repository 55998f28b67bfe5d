use crate::error::TemplateError;

/// Tokens produced by the lexer. Text between delimiters arrives as a
/// single `TemplateData`; everything inside `{{ }}` and `{% %}` is lexed
/// into fine grained tokens.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    TemplateData(String),
    VariableStart,
    VariableEnd,
    BlockStart,
    BlockEnd,
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Keyword(Keyword),
    Plus,
    Minus,
    Mul,
    Div,
    FloorDiv,
    Rem,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Assign,
    Pipe,
    Dot,
    Comma,
    Colon,
    Tilde,
    ParenOpen,
    ParenClose,
    BracketOpen,
    BracketClose,
    BraceOpen,
    BraceClose,
}

/// Reserved words, recognized case-insensitively on the lowercased form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    True,
    False,
    None,
    And,
    Or,
    Not,
    Is,
    In,
    If,
    Elif,
    Else,
    Endif,
    For,
    Endfor,
    Set,
    Block,
    Endblock,
    Extends,
    Include,
    Macro,
    Endmacro,
    Call,
    Endcall,
    With,
    Endwith,
    Filter,
    Endfilter,
    Import,
    From,
    Raw,
    Endraw,
    Autoescape,
    Endautoescape,
}

impl Keyword {
    fn from_ident(lower: &str) -> Option<Keyword> {
        Some(match lower {
            "true" => Keyword::True,
            "false" => Keyword::False,
            "none" => Keyword::None,
            "and" => Keyword::And,
            "or" => Keyword::Or,
            "not" => Keyword::Not,
            "is" => Keyword::Is,
            "in" => Keyword::In,
            "if" => Keyword::If,
            "elif" => Keyword::Elif,
            "else" => Keyword::Else,
            "endif" => Keyword::Endif,
            "for" => Keyword::For,
            "endfor" => Keyword::Endfor,
            "set" => Keyword::Set,
            "block" => Keyword::Block,
            "endblock" => Keyword::Endblock,
            "extends" => Keyword::Extends,
            "include" => Keyword::Include,
            "macro" => Keyword::Macro,
            "endmacro" => Keyword::Endmacro,
            "call" => Keyword::Call,
            "endcall" => Keyword::Endcall,
            "with" => Keyword::With,
            "endwith" => Keyword::Endwith,
            "filter" => Keyword::Filter,
            "endfilter" => Keyword::Endfilter,
            "import" => Keyword::Import,
            "from" => Keyword::From,
            "raw" => Keyword::Raw,
            "endraw" => Keyword::Endraw,
            "autoescape" => Keyword::Autoescape,
            "endautoescape" => Keyword::Endautoescape,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::True => "true",
            Keyword::False => "false",
            Keyword::None => "none",
            Keyword::And => "and",
            Keyword::Or => "or",
            Keyword::Not => "not",
            Keyword::Is => "is",
            Keyword::In => "in",
            Keyword::If => "if",
            Keyword::Elif => "elif",
            Keyword::Else => "else",
            Keyword::Endif => "endif",
            Keyword::For => "for",
            Keyword::Endfor => "endfor",
            Keyword::Set => "set",
            Keyword::Block => "block",
            Keyword::Endblock => "endblock",
            Keyword::Extends => "extends",
            Keyword::Include => "include",
            Keyword::Macro => "macro",
            Keyword::Endmacro => "endmacro",
            Keyword::Call => "call",
            Keyword::Endcall => "endcall",
            Keyword::With => "with",
            Keyword::Endwith => "endwith",
            Keyword::Filter => "filter",
            Keyword::Endfilter => "endfilter",
            Keyword::Import => "import",
            Keyword::From => "from",
            Keyword::Raw => "raw",
            Keyword::Endraw => "endraw",
            Keyword::Autoescape => "autoescape",
            Keyword::Endautoescape => "endautoescape",
        }
    }
}

impl Token {
    /// Source-ish text of the token, used to reassemble raw block content.
    pub(crate) fn text(&self) -> String {
        match self {
            Token::TemplateData(s) => s.clone(),
            Token::VariableStart => "{{".to_string(),
            Token::VariableEnd => "}}".to_string(),
            Token::BlockStart => "{%".to_string(),
            Token::BlockEnd => "%}".to_string(),
            Token::Ident(s) => s.clone(),
            Token::Str(s) => {
                let mut quoted = String::from("\"");
                for c in s.chars() {
                    match c {
                        '"' => quoted.push_str("\\\""),
                        '\\' => quoted.push_str("\\\\"),
                        '\n' => quoted.push_str("\\n"),
                        '\r' => quoted.push_str("\\r"),
                        '\t' => quoted.push_str("\\t"),
                        c => quoted.push(c),
                    }
                }
                quoted.push('"');
                quoted
            }
            Token::Int(n) => n.to_string(),
            Token::Float(f) => f.to_string(),
            Token::Keyword(k) => k.as_str().to_string(),
            Token::Plus => "+".to_string(),
            Token::Minus => "-".to_string(),
            Token::Mul => "*".to_string(),
            Token::Div => "/".to_string(),
            Token::FloorDiv => "//".to_string(),
            Token::Rem => "%".to_string(),
            Token::Pow => "**".to_string(),
            Token::Eq => "==".to_string(),
            Token::Ne => "!=".to_string(),
            Token::Lt => "<".to_string(),
            Token::Le => "<=".to_string(),
            Token::Gt => ">".to_string(),
            Token::Ge => ">=".to_string(),
            Token::Assign => "=".to_string(),
            Token::Pipe => "|".to_string(),
            Token::Dot => ".".to_string(),
            Token::Comma => ",".to_string(),
            Token::Colon => ":".to_string(),
            Token::Tilde => "~".to_string(),
            Token::ParenOpen => "(".to_string(),
            Token::ParenClose => ")".to_string(),
            Token::BracketOpen => "[".to_string(),
            Token::BracketClose => "]".to_string(),
            Token::BraceOpen => "{".to_string(),
            Token::BraceClose => "}".to_string(),
        }
    }
}

/// Line and column of a token, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub line: u32,
    pub col: u32,
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: u32,
    col: u32,
    tokens: Vec<(Token, Span)>,
    trim_next_text: bool,
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<(Token, Span)>, TemplateError> {
    let lexer = Lexer {
        src: source,
        pos: 0,
        line: 1,
        col: 1,
        tokens: Vec::new(),
        trim_next_text: false,
    };
    lexer.run()
}

impl<'a> Lexer<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn span(&self) -> Span {
        Span {
            line: self.line,
            col: self.col,
        }
    }

    // Advances `n` bytes, keeping line/col in step.
    fn bump(&mut self, n: usize) {
        for c in self.src[self.pos..self.pos + n].chars() {
            if c == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
        self.pos += n;
    }

    fn err(&self, msg: impl std::fmt::Display) -> TemplateError {
        TemplateError::syntax(format!("{}:{}: {}", self.line, self.col, msg))
    }

    fn run(mut self) -> Result<Vec<(Token, Span)>, TemplateError> {
        while self.pos < self.src.len() {
            match find_delimiter(self.src, self.pos) {
                Some((delim_pos, kind)) => {
                    let trim_end = self.src[delim_pos..].as_bytes().get(2) == Some(&b'-');
                    self.emit_text(self.pos, delim_pos, trim_end);
                    self.bump(delim_pos - self.pos);
                    match kind {
                        b'{' => {
                            self.start_delimiter(Token::VariableStart, trim_end);
                            self.lex_expression("}}", Token::VariableEnd)?;
                        }
                        b'%' => {
                            self.start_delimiter(Token::BlockStart, trim_end);
                            self.lex_expression("%}", Token::BlockEnd)?;
                        }
                        _ => self.skip_comment()?,
                    }
                }
                None => {
                    self.emit_text(self.pos, self.src.len(), false);
                    break;
                }
            }
        }
        Ok(self.tokens)
    }

    fn emit_text(&mut self, start: usize, end: usize, trim_end: bool) {
        let mut text = &self.src[start..end];
        if self.trim_next_text {
            text = text.trim_start();
            self.trim_next_text = false;
        }
        if trim_end {
            text = text.trim_end();
        }
        if !text.is_empty() {
            let span = self.span();
            self.tokens.push((Token::TemplateData(text.to_string()), span));
        }
    }

    fn start_delimiter(&mut self, token: Token, has_trim_marker: bool) {
        let span = self.span();
        self.bump(2);
        if has_trim_marker {
            self.bump(1);
        }
        self.tokens.push((token, span));
    }

    fn skip_comment(&mut self) -> Result<(), TemplateError> {
        self.bump(2);
        if self.rest().starts_with('-') {
            self.bump(1);
        }
        match self.rest().find("#}") {
            Some(end) => {
                if end > 0 && self.rest().as_bytes()[end - 1] == b'-' {
                    self.trim_next_text = true;
                }
                self.bump(end + 2);
                Ok(())
            }
            None => Err(self.err("Unterminated comment")),
        }
    }

    fn lex_expression(&mut self, end: &str, end_token: Token) -> Result<(), TemplateError> {
        loop {
            while self.rest().starts_with(|c: char| c.is_whitespace()) {
                let c = self.rest().chars().next().unwrap();
                self.bump(c.len_utf8());
            }
            let rest = self.rest();
            if rest.is_empty() {
                return Err(self.err(format!("Unexpected end of template, expected {}", end)));
            }
            if rest.starts_with(end) {
                let span = self.span();
                self.bump(end.len());
                self.tokens.push((end_token, span));
                return Ok(());
            }
            if rest.starts_with('-') && rest[1..].starts_with(end) {
                let span = self.span();
                self.bump(1 + end.len());
                self.trim_next_text = true;
                self.tokens.push((end_token, span));
                return Ok(());
            }

            let span = self.span();
            let c = rest.chars().next().unwrap();
            if let Some((token, len)) = two_char_operator(rest) {
                self.bump(len);
                self.tokens.push((token, span));
            } else if let Some(token) = one_char_operator(c) {
                self.bump(1);
                self.tokens.push((token, span));
            } else if c.is_ascii_digit() {
                let token = self.lex_number()?;
                self.tokens.push((token, span));
            } else if c == '"' || c == '\'' {
                let token = self.lex_string(c)?;
                self.tokens.push((token, span));
            } else if c.is_alphabetic() || c == '_' {
                let token = self.lex_ident();
                self.tokens.push((token, span));
            } else {
                return Err(self.err(format!("Unknown character '{}' in expression", c)));
            }
        }
    }

    fn lex_number(&mut self) -> Result<Token, TemplateError> {
        let start = self.pos;
        let bytes = self.src.as_bytes();
        let mut end = self.pos;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
        let mut is_float = false;
        // A decimal point only belongs to the number when a digit follows;
        // otherwise it is a member access on an integer literal.
        if end < bytes.len()
            && bytes[end] == b'.'
            && end + 1 < bytes.len()
            && bytes[end + 1].is_ascii_digit()
        {
            is_float = true;
            end += 1;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
        }
        if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
            let mut probe = end + 1;
            if probe < bytes.len() && (bytes[probe] == b'+' || bytes[probe] == b'-') {
                probe += 1;
            }
            if probe < bytes.len() && bytes[probe].is_ascii_digit() {
                is_float = true;
                end = probe;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
            }
        }
        let literal = &self.src[start..end];
        self.bump(end - start);
        if is_float {
            match literal.parse::<f64>() {
                Ok(f) => Ok(Token::Float(f)),
                Err(_) => Err(self.err(format!("Invalid float literal {}", literal))),
            }
        } else {
            match literal.parse::<i64>() {
                Ok(n) => Ok(Token::Int(n)),
                Err(_) => Err(self.err(format!("Invalid integer literal {}", literal))),
            }
        }
    }

    fn lex_string(&mut self, quote: char) -> Result<Token, TemplateError> {
        self.bump(1);
        let mut value = String::new();
        loop {
            let rest = self.rest();
            let mut chars = rest.chars();
            match chars.next() {
                Option::None => return Err(self.err("Unterminated string")),
                Some(c) if c == quote => {
                    self.bump(1);
                    return Ok(Token::Str(value));
                }
                Some('\\') => match chars.next() {
                    Option::None => return Err(self.err("Unterminated string")),
                    Some(esc) => {
                        match esc {
                            'n' => value.push('\n'),
                            'r' => value.push('\r'),
                            't' => value.push('\t'),
                            '\\' => value.push('\\'),
                            '"' => value.push('"'),
                            '\'' => value.push('\''),
                            // Unknown escapes drop the backslash.
                            other => value.push(other),
                        }
                        self.bump(1 + esc.len_utf8());
                    }
                },
                Some(c) => {
                    value.push(c);
                    self.bump(c.len_utf8());
                }
            }
        }
    }

    fn lex_ident(&mut self) -> Token {
        let start = self.pos;
        let mut end = self.pos;
        for c in self.src[self.pos..].chars() {
            if c.is_alphanumeric() || c == '_' {
                end += c.len_utf8();
            } else {
                break;
            }
        }
        let ident = &self.src[start..end];
        self.bump(end - start);
        match Keyword::from_ident(&ident.to_lowercase()) {
            Some(kw) => Token::Keyword(kw),
            Option::None => Token::Ident(ident.to_string()),
        }
    }
}

fn find_delimiter(src: &str, from: usize) -> Option<(usize, u8)> {
    let bytes = src.as_bytes();
    let mut i = from;
    while i + 1 < bytes.len() {
        if bytes[i] == b'{' {
            match bytes[i + 1] {
                b'{' | b'%' | b'#' => return Some((i, bytes[i + 1])),
                _ => {}
            }
        }
        i += 1;
    }
    None
}

fn two_char_operator(rest: &str) -> Option<(Token, usize)> {
    let token = match &rest.as_bytes()[..rest.len().min(2)] {
        b"**" => Token::Pow,
        b"//" => Token::FloorDiv,
        b"==" => Token::Eq,
        b"!=" => Token::Ne,
        b"<=" => Token::Le,
        b">=" => Token::Ge,
        _ => return None,
    };
    Some((token, 2))
}

fn one_char_operator(c: char) -> Option<Token> {
    Some(match c {
        '+' => Token::Plus,
        '-' => Token::Minus,
        '*' => Token::Mul,
        '/' => Token::Div,
        '%' => Token::Rem,
        '<' => Token::Lt,
        '>' => Token::Gt,
        '=' => Token::Assign,
        '|' => Token::Pipe,
        '.' => Token::Dot,
        ',' => Token::Comma,
        ':' => Token::Colon,
        '~' => Token::Tilde,
        '(' => Token::ParenOpen,
        ')' => Token::ParenClose,
        '[' => Token::BracketOpen,
        ']' => Token::BracketClose,
        '{' => Token::BraceOpen,
        '}' => Token::BraceClose,
        _ => return None,
    })
}

#[cfg(test)]
fn kinds(source: &str) -> Vec<Token> {
    tokenize(source)
        .unwrap()
        .into_iter()
        .map(|(t, _)| t)
        .collect()
}

#[test]
fn text_and_variable_modes() {
    assert_eq!(
        kinds("Hello {{ name }}!"),
        vec![
            Token::TemplateData("Hello ".to_string()),
            Token::VariableStart,
            Token::Ident("name".to_string()),
            Token::VariableEnd,
            Token::TemplateData("!".to_string()),
        ]
    );
}

#[test]
fn operators_longest_first() {
    assert_eq!(
        kinds("{{ 2 ** 3 // 1 <= 4 }}"),
        vec![
            Token::VariableStart,
            Token::Int(2),
            Token::Pow,
            Token::Int(3),
            Token::FloorDiv,
            Token::Int(1),
            Token::Le,
            Token::Int(4),
            Token::VariableEnd,
        ]
    );
}

#[test]
fn float_needs_digit_or_exponent() {
    assert_eq!(
        kinds("{{ 1.5 }}{{ 1e3 }}{{ 1.x }}"),
        vec![
            Token::VariableStart,
            Token::Float(1.5),
            Token::VariableEnd,
            Token::VariableStart,
            Token::Float(1000.0),
            Token::VariableEnd,
            Token::VariableStart,
            Token::Int(1),
            Token::Dot,
            Token::Ident("x".to_string()),
            Token::VariableEnd,
        ]
    );
}

#[test]
fn string_escapes() {
    assert_eq!(
        kinds(r#"{{ "a\n\q'" }}"#),
        vec![
            Token::VariableStart,
            Token::Str("a\nq'".to_string()),
            Token::VariableEnd,
        ]
    );
}

#[test]
fn keywords_are_case_insensitive() {
    assert_eq!(
        kinds("{% IF x %}{% endif %}"),
        vec![
            Token::BlockStart,
            Token::Keyword(Keyword::If),
            Token::Ident("x".to_string()),
            Token::BlockEnd,
            Token::BlockStart,
            Token::Keyword(Keyword::Endif),
            Token::BlockEnd,
        ]
    );
}

#[test]
fn whitespace_control_trims_adjacent_text() {
    assert_eq!(
        kinds("a  {{- 1 -}}  b"),
        vec![
            Token::TemplateData("a".to_string()),
            Token::VariableStart,
            Token::Int(1),
            Token::VariableEnd,
            Token::TemplateData("b".to_string()),
        ]
    );
}

#[test]
fn comments_disappear() {
    assert_eq!(
        kinds("a{# note #}b"),
        vec![
            Token::TemplateData("a".to_string()),
            Token::TemplateData("b".to_string()),
        ]
    );
    assert!(tokenize("a{# open").is_err());
}

#[test]
fn unknown_punctuation_is_rejected() {
    assert!(tokenize("{{ a ? b }}").is_err());
    assert!(tokenize("{{ 'open }}").is_err());
}
