//! 字句解析
//!
//! 式のソーステキストをトークン列に変換します。型やターゲットについては何も知りません。
//! 字句エラーは例外ではなく [`Token::Error`] として返し、致命的かどうかは呼び出し側が決めます。

use mirra_types::{Decimal, Scalar};
use std::fmt;

/// キーワード
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    This,
    Base,
    Null,
    New,
    Typeof,
}

impl Keyword {
    fn from_word(word: &str) -> Option<Self> {
        Some(match word {
            "this" => Keyword::This,
            "base" => Keyword::Base,
            "null" => Keyword::Null,
            "new" => Keyword::New,
            "typeof" => Keyword::Typeof,
            _ => return None,
        })
    }
}

/// 記号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punct {
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Star,
    Amp,
    Minus,
    Assign,
    Arrow,
    Dollar,
    Percent,
    Question,
}

impl fmt::Display for Punct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Punct::Dot => ".",
            Punct::Comma => ",",
            Punct::LParen => "(",
            Punct::RParen => ")",
            Punct::LBracket => "[",
            Punct::RBracket => "]",
            Punct::Star => "*",
            Punct::Amp => "&",
            Punct::Minus => "-",
            Punct::Assign => "=",
            Punct::Arrow => "->",
            Punct::Dollar => "$",
            Punct::Percent => "%",
            Punct::Question => "?",
        };
        f.write_str(s)
    }
}

/// トークン
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// 識別子（`quoted` は `` `...` `` または `'...'` で囲まれていたか）
    Identifier { name: String, quoted: bool },
    Keyword(Keyword),
    /// 数値・文字列・真偽値リテラル
    Literal(Scalar),
    Punct(Punct),
    Eof,
    /// 字句エラー（人間向けの詳細）
    Error(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Identifier { name, .. } => write!(f, "identifier `{}`", name),
            Token::Keyword(k) => write!(f, "keyword `{}`", format!("{:?}", k).to_lowercase()),
            Token::Literal(v) => write!(f, "literal {}", v),
            Token::Punct(p) => write!(f, "`{}`", p),
            Token::Eof => write!(f, "end of input"),
            Token::Error(e) => write!(f, "{}", e),
        }
    }
}

/// 字句解析器
pub struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
    token_start: usize,
    value: Option<Scalar>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            token_start: 0,
            value: None,
        }
    }

    /// 直前のトークンの開始位置（バイトオフセット）
    pub fn position(&self) -> usize {
        self.token_start
    }

    /// 診断用の位置表記
    pub fn location(&self) -> String {
        format!("position {} in `{}`", self.token_start, self.input)
    }

    /// 直前に読んだリテラルの値
    pub fn current_value(&self) -> Option<&Scalar> {
        self.value.as_ref()
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut it = self.input[self.pos..].chars();
        it.next();
        it.next()
    }

    fn eat(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat_if_eq(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn eat_while<F: Fn(char) -> bool>(&mut self, f: F) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !f(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        &self.input[start..self.pos]
    }

    /// 次のトークンを読む
    pub fn next_token(&mut self) -> Token {
        self.value = None;
        self.eat_while(char::is_whitespace);
        self.token_start = self.pos;

        let Some(c) = self.eat() else {
            return Token::Eof;
        };
        let token = match c {
            '.' if self.peek().is_some_and(|c| c.is_ascii_digit()) => {
                self.pos = self.token_start;
                self.number()
            }
            '.' => Token::Punct(Punct::Dot),
            ',' => Token::Punct(Punct::Comma),
            '(' => Token::Punct(Punct::LParen),
            ')' => Token::Punct(Punct::RParen),
            '[' => Token::Punct(Punct::LBracket),
            ']' => Token::Punct(Punct::RBracket),
            '*' => Token::Punct(Punct::Star),
            '&' => Token::Punct(Punct::Amp),
            '=' => Token::Punct(Punct::Assign),
            '$' => Token::Punct(Punct::Dollar),
            '%' => Token::Punct(Punct::Percent),
            '?' => Token::Punct(Punct::Question),
            '-' if self.eat_if_eq('>') => Token::Punct(Punct::Arrow),
            '-' => Token::Punct(Punct::Minus),
            '"' => self.string(),
            '`' | '\'' => self.quoted_identifier(c),
            '0'..='9' => {
                self.pos = self.token_start;
                self.number()
            }
            c if c.is_alphabetic() || c == '_' || c == '@' => {
                let rest = self.eat_while(|c| c.is_alphanumeric() || c == '_');
                let verbatim = c == '@';
                let word = if verbatim {
                    rest.to_string()
                } else {
                    format!("{}{}", c, rest)
                };
                if verbatim && word.is_empty() {
                    Token::Error(format!("expected identifier after '@' at {}", self.token_start))
                } else if verbatim {
                    Token::Identifier {
                        name: word,
                        quoted: true,
                    }
                } else {
                    match word.as_str() {
                        "true" => Token::Literal(Scalar::Bool(true)),
                        "false" => Token::Literal(Scalar::Bool(false)),
                        _ => match Keyword::from_word(&word) {
                            Some(k) => Token::Keyword(k),
                            None => Token::Identifier {
                                name: word,
                                quoted: false,
                            },
                        },
                    }
                }
            }
            other => Token::Error(format!(
                "unexpected character '{}' at {}",
                other, self.token_start
            )),
        };

        if let Token::Literal(v) = &token {
            self.value = Some(v.clone());
        }
        if let Token::Error(_) = &token {
            // 以降はすべて入力終端として扱う
            self.pos = self.input.len();
        }
        token
    }

    fn string(&mut self) -> Token {
        let start = self.token_start;
        let mut s = String::new();
        loop {
            match self.eat() {
                None => return Token::Error(format!("unterminated string literal at {}", start)),
                Some('"') => break,
                Some('\\') => match self.escape() {
                    Ok(c) => s.push(c),
                    Err(e) => return Token::Error(e),
                },
                Some(c) => s.push(c),
            }
        }
        Token::Literal(Scalar::String(s))
    }

    fn quoted_identifier(&mut self, delimiter: char) -> Token {
        let start = self.token_start;
        let mut s = String::new();
        loop {
            match self.eat() {
                None => {
                    return Token::Error(format!("unterminated quoted identifier at {}", start))
                }
                Some(c) if c == delimiter => break,
                Some(c) => s.push(c),
            }
        }
        if s.is_empty() {
            return Token::Error(format!("empty quoted identifier at {}", start));
        }
        Token::Identifier {
            name: s,
            quoted: true,
        }
    }

    fn hex_digits(&mut self, count: usize) -> Result<u32, String> {
        let start = self.pos;
        let mut value = 0u32;
        for _ in 0..count {
            let digit = self.eat().and_then(|c| c.to_digit(16)).ok_or_else(|| {
                format!("invalid escape sequence at {}", start.saturating_sub(2))
            })?;
            value = value * 16 + digit;
        }
        Ok(value)
    }

    fn escape(&mut self) -> Result<char, String> {
        let at = self.pos.saturating_sub(1);
        let c = match self.eat() {
            None => return Err(format!("unterminated string literal at {}", self.token_start)),
            Some('n') => '\n',
            Some('t') => '\t',
            Some('r') => '\r',
            Some('0') => '\0',
            Some('\\') => '\\',
            Some('"') => '"',
            Some('\'') => '\'',
            Some('x') => {
                let v = self.hex_digits(2)?;
                char::from_u32(v).ok_or_else(|| format!("invalid character escape at {}", at))?
            }
            Some('u') => {
                let v = self.hex_digits(4)?;
                char::from_u32(v).ok_or_else(|| format!("invalid character escape at {}", at))?
            }
            Some('U') => {
                let v = self.hex_digits(8)?;
                char::from_u32(v).ok_or_else(|| format!("invalid character escape at {}", at))?
            }
            Some(other) => return Err(format!("unknown escape sequence '\\{}' at {}", other, at)),
        };
        Ok(c)
    }

    fn number(&mut self) -> Token {
        let start = self.token_start;
        let is_hex = self.peek() == Some('0') && matches!(self.peek_second(), Some('x' | 'X'));
        if is_hex {
            self.pos += 2;
            let digits = self.eat_while(|c| c.is_ascii_hexdigit());
            if digits.is_empty() {
                return Token::Error(format!("missing hexadecimal digits at {}", start));
            }
            let Ok(value) = u64::from_str_radix(digits, 16) else {
                return Token::Error(format!("integer literal is too big at {}", start));
            };
            return self.integer_suffix(value, start);
        }

        let int_part = self.eat_while(|c| c.is_ascii_digit());
        let mut is_real = false;
        if self.peek() == Some('.') && self.peek_second().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
            self.eat_while(|c| c.is_ascii_digit());
            is_real = true;
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let save = self.pos;
            self.pos += 1;
            if matches!(self.peek(), Some('+' | '-')) {
                self.pos += 1;
            }
            if self.eat_while(|c| c.is_ascii_digit()).is_empty() {
                self.pos = save;
            } else {
                is_real = true;
            }
        }
        let text = &self.input[start..self.pos];

        let suffix = self.eat_while(|c| c.is_ascii_alphabetic()).to_ascii_lowercase();
        match suffix.as_str() {
            "f" => text
                .parse::<f32>()
                .map(|v| Token::Literal(Scalar::Single(v)))
                .unwrap_or_else(|_| Token::Error(format!("invalid float literal at {}", start))),
            "d" => text
                .parse::<f64>()
                .map(|v| Token::Literal(Scalar::Double(v)))
                .unwrap_or_else(|_| Token::Error(format!("invalid double literal at {}", start))),
            "m" => text
                .parse::<Decimal>()
                .map(|v| Token::Literal(Scalar::Decimal(v)))
                .unwrap_or_else(|e| Token::Error(format!("{} at {}", e, start))),
            "" if is_real => text
                .parse::<f64>()
                .map(|v| Token::Literal(Scalar::Double(v)))
                .unwrap_or_else(|_| Token::Error(format!("invalid double literal at {}", start))),
            _ if is_real => Token::Error(format!("invalid suffix '{}' on real literal at {}", suffix, start)),
            _ => {
                self.pos -= suffix.len();
                match int_part.parse::<u64>() {
                    Ok(value) => self.integer_suffix(value, start),
                    Err(_) => Token::Error(format!("integer literal is too big at {}", start)),
                }
            }
        }
    }

    /// 整数リテラルの接尾辞から型を決める（C# の規則）
    fn integer_suffix(&mut self, value: u64, start: usize) -> Token {
        let suffix = self.eat_while(|c| c.is_ascii_alphabetic()).to_ascii_lowercase();
        let scalar = match suffix.as_str() {
            "" => {
                if let Ok(v) = i32::try_from(value) {
                    Scalar::Int32(v)
                } else if let Ok(v) = u32::try_from(value) {
                    Scalar::UInt32(v)
                } else if let Ok(v) = i64::try_from(value) {
                    Scalar::Int64(v)
                } else {
                    Scalar::UInt64(value)
                }
            }
            "u" => match u32::try_from(value) {
                Ok(v) => Scalar::UInt32(v),
                Err(_) => Scalar::UInt64(value),
            },
            "l" => match i64::try_from(value) {
                Ok(v) => Scalar::Int64(v),
                Err(_) => Scalar::UInt64(value),
            },
            "ul" | "lu" => Scalar::UInt64(value),
            "f" => Scalar::Single(value as f32),
            "d" => Scalar::Double(value as f64),
            "m" => Scalar::Decimal(Decimal::new(i128::from(value), 0)),
            other => {
                return Token::Error(format!("invalid suffix '{}' on integer literal at {}", other, start))
            }
        };
        Token::Literal(scalar)
    }
}

/// 入力全体をトークン列にする（位置付き、末尾は必ず `Eof` か `Error`）
pub fn tokenize(input: &str) -> Vec<(usize, Token)> {
    let mut tokenizer = Tokenizer::new(input);
    let mut tokens = Vec::new();
    loop {
        let token = tokenizer.next_token();
        let done = matches!(token, Token::Eof | Token::Error(_));
        tokens.push((tokenizer.position(), token));
        if done {
            return tokens;
        }
    }
}
