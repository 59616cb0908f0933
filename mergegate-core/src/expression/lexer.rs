// Predicate Lexer
// Tokenizes skip predicates such as `contains(commit.message, '[ci skip]')`

use crate::expression::PredicateError;

use std::fmt;

/// Token types for skip predicates
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    True,
    False,
    String(String),

    // Identifiers and references
    Identifier(String),

    // Operators
    Eq,  // ==
    Ne,  // !=
    And, // &&
    Or,  // ||
    Not, // !
    Dot, // .
    Comma,

    // Delimiters
    LParen,
    RParen,

    // End of input
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::String(s) => write!(f, "'{}'", s),
            Token::Identifier(s) => write!(f, "{}", s),
            Token::Eq => write!(f, "=="),
            Token::Ne => write!(f, "!="),
            Token::And => write!(f, "&&"),
            Token::Or => write!(f, "||"),
            Token::Not => write!(f, "!"),
            Token::Dot => write!(f, "."),
            Token::Comma => write!(f, ","),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Eof => write!(f, "end of input"),
        }
    }
}

/// Lexer for skip predicates
pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    position: usize,
    len: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.char_indices().peekable(),
            position: 0,
            len: input.len(),
        }
    }

    /// Tokenize the entire input, pairing each token with its byte offset
    pub fn tokenize(&mut self) -> Result<Vec<(Token, usize)>, PredicateError> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token()?;
            let done = token == Token::Eof;
            tokens.push((token, self.position));
            if done {
                break;
            }
        }

        Ok(tokens)
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Result<Token, PredicateError> {
        self.skip_whitespace();

        let Some(&(pos, ch)) = self.chars.peek() else {
            self.position = self.len;
            return Ok(Token::Eof);
        };

        self.position = pos;

        match ch {
            '.' => {
                self.advance();
                Ok(Token::Dot)
            }
            ',' => {
                self.advance();
                Ok(Token::Comma)
            }
            '(' => {
                self.advance();
                Ok(Token::LParen)
            }
            ')' => {
                self.advance();
                Ok(Token::RParen)
            }

            // Two-character operators
            '=' => {
                self.advance();
                if self.peek_char() == Some('=') {
                    self.advance();
                    Ok(Token::Eq)
                } else {
                    Err(PredicateError::syntax("expected '==' operator", pos))
                }
            }
            '!' => {
                self.advance();
                if self.peek_char() == Some('=') {
                    self.advance();
                    Ok(Token::Ne)
                } else {
                    Ok(Token::Not)
                }
            }
            '&' => {
                self.advance();
                if self.peek_char() == Some('&') {
                    self.advance();
                    Ok(Token::And)
                } else {
                    Err(PredicateError::syntax("expected '&&' operator", pos))
                }
            }
            '|' => {
                self.advance();
                if self.peek_char() == Some('|') {
                    self.advance();
                    Ok(Token::Or)
                } else {
                    Err(PredicateError::syntax("expected '||' operator", pos))
                }
            }

            '\'' => self.read_string(),

            'a'..='z' | 'A'..='Z' | '_' => Ok(self.read_identifier()),

            _ => Err(PredicateError::syntax(
                format!("unexpected character: '{}'", ch),
                pos,
            )),
        }
    }

    fn advance(&mut self) -> Option<(usize, char)> {
        self.chars.next()
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn skip_whitespace(&mut self) {
        while let Some(&(_, ch)) = self.chars.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_string(&mut self) -> Result<Token, PredicateError> {
        let start = self.position;
        self.advance(); // opening quote

        let mut value = String::new();

        loop {
            match self.advance() {
                Some((_, '\'')) => {
                    // '' is an escaped quote
                    if self.peek_char() == Some('\'') {
                        value.push('\'');
                        self.advance();
                    } else {
                        return Ok(Token::String(value));
                    }
                }
                Some((_, c)) => value.push(c),
                None => {
                    return Err(PredicateError::syntax("unterminated string literal", start));
                }
            }
        }
    }

    fn read_identifier(&mut self) -> Token {
        let mut ident = String::new();

        while let Some(&(_, ch)) = self.chars.peek() {
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        match ident.as_str() {
            "true" => Token::True,
            "false" => Token::False,
            _ => Token::Identifier(ident),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        Lexer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|(token, _)| token)
            .collect()
    }

    #[test]
    fn test_tokenize_function_call() {
        assert_eq!(
            tokens("contains(commit.message, '[ci skip]')"),
            vec![
                Token::Identifier("contains".to_string()),
                Token::LParen,
                Token::Identifier("commit".to_string()),
                Token::Dot,
                Token::Identifier("message".to_string()),
                Token::Comma,
                Token::String("[ci skip]".to_string()),
                Token::RParen,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_tokenize_operators() {
        assert_eq!(
            tokens("!a && b || c == d != e"),
            vec![
                Token::Not,
                Token::Identifier("a".to_string()),
                Token::And,
                Token::Identifier("b".to_string()),
                Token::Or,
                Token::Identifier("c".to_string()),
                Token::Eq,
                Token::Identifier("d".to_string()),
                Token::Ne,
                Token::Identifier("e".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_escaped_quote() {
        assert_eq!(
            tokens("'it''s'"),
            vec![Token::String("it's".to_string()), Token::Eof]
        );
    }

    #[test]
    fn test_keywords() {
        assert_eq!(tokens("true false"), vec![Token::True, Token::False, Token::Eof]);
    }

    #[test]
    fn test_unterminated_string() {
        let err = Lexer::new("contains(commit.message, '[ci").tokenize().unwrap_err();
        assert_eq!(
            err,
            PredicateError::syntax("unterminated string literal", 25)
        );
    }

    #[test]
    fn test_single_ampersand() {
        let err = Lexer::new("a & b").tokenize().unwrap_err();
        assert!(matches!(err, PredicateError::Syntax { position: 2, .. }));
    }
}
