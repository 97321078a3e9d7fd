use std::io::Read;


#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Eof,
    Def,
    Extern,
    If,
    Then,
    Else,
    For,
    In,
    Identifier(String),
    Number(f64),
    Char(char),
}

impl Token {
    fn keyword_or_identifier(word: String) -> Token {
        match word.as_str() {
            "def" => Token::Def,
            "extern" => Token::Extern,
            "if" => Token::If,
            "then" => Token::Then,
            "else" => Token::Else,
            "for" => Token::For,
            "in" => Token::In,
            _ => Token::Identifier(word),
        }
    }
}

/// Pulls tokens one at a time from a byte source, keeping a single
/// character of lookahead between calls.
pub struct Lexer<'a> {
    input: Box<dyn Iterator<Item = u8> + 'a>,
    last_char: Option<u8>,
}

impl<'a> Lexer<'a> {
    pub fn new<I: Iterator<Item = u8> + 'a>(input: I) -> Lexer<'a> {
        Lexer { input: Box::new(input), last_char: Some(b' ') }
    }

    /// A read error is treated as end of input.
    pub fn from_reader<R: Read + 'a>(reader: R) -> Lexer<'a> {
        Lexer::new(reader.bytes().map_while(Result::ok))
    }

    pub fn from_text(input: &'a str) -> Lexer<'a> {
        Lexer::new(input.bytes())
    }

    fn advance(&mut self) -> Option<u8> {
        self.last_char = self.input.next();
        self.last_char
    }

    pub fn next_token(&mut self) -> Token {
        loop {
            while let Some(c) = self.last_char {
                if !c.is_ascii_whitespace() {
                    break;
                }
                self.advance();
            }

            let c = match self.last_char {
                None => return Token::Eof,
                Some(c) => c,
            };

            if c.is_ascii_alphabetic() {
                let mut word = String::new();
                word.push(c as char);
                while let Some(c) = self.advance() {
                    if !c.is_ascii_alphanumeric() {
                        break;
                    }
                    word.push(c as char);
                }
                return Token::keyword_or_identifier(word);
            }

            if c.is_ascii_digit() || c == b'.' {
                let mut digits = String::new();
                digits.push(c as char);
                while let Some(c) = self.advance() {
                    if !(c.is_ascii_digit() || c == b'.') {
                        break;
                    }
                    digits.push(c as char);
                }
                return Token::Number(parse_number_prefix(&digits));
            }

            if c == b'#' {
                while let Some(c) = self.advance() {
                    if c == b'\n' || c == b'\r' {
                        break;
                    }
                }
                continue;
            }

            self.advance();
            return Token::Char(c as char);
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        match self.next_token() {
            Token::Eof => None,
            t => Some(t),
        }
    }
}

/// Reads the longest prefix of `s` that forms a number, the way `strtod`
/// does. Text with no numeric prefix (e.g. a lone ".") reads as 0.
pub fn parse_number_prefix(s: &str) -> f64 {
    (1..=s.len()).rev()
        .filter_map(|end| s[..end].parse::<f64>().ok())
        .next()
        .unwrap_or(0.0)
}
