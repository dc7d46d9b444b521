use logos::{Logos, Lexer as LogosLexer};
use kmn_ldml_core::KmnError;
use super::Token;

/// Line and column (both 1-based) of a token in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

pub struct Lexer<'a> {
    inner: LogosLexer<'a, Token>,
    line_starts: Vec<usize>,
    pub input: &'a str,
    pub path: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str, path: &'a str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(input.match_indices('\n').map(|(i, _)| i + 1))
            .collect();

        Self {
            inner: Token::lexer(input),
            line_starts,
            input,
            path,
        }
    }

    pub fn next_token(&mut self) -> Result<Option<Token>, KmnError> {
        match self.inner.next() {
            Some(Ok(Token::UnterminatedString)) => Err(self.error("unterminated string literal")),
            Some(Ok(Token::MalformedCodePoint)) => {
                Err(self.error("U+ must be followed by hexadecimal digits"))
            }
            Some(Ok(token)) => Ok(Some(token)),
            Some(Err(_)) => {
                let text = self.inner.slice();
                Err(self.error(format!("Unexpected character: '{}'", text)))
            }
            None => Ok(None),
        }
    }

    pub fn peek(&self) -> Option<Token> {
        self.inner.clone().next().and_then(|r| r.ok())
    }

    /// Position of the most recently returned token.
    pub fn position(&self) -> Position {
        self.position_of(self.inner.span().start)
    }

    fn position_of(&self, offset: usize) -> Position {
        let index = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let line_start = self.line_starts[index];
        Position {
            line: index + 1,
            column: self.input[line_start..offset].chars().count() + 1,
        }
    }

    pub fn current_line(&self) -> usize {
        self.position().line
    }

    /// Consumes the raw text between the current token and the end of its line.
    pub fn rest_of_line(&mut self) -> &'a str {
        let start = self.inner.span().end;
        let end = self.input[start..]
            .find('\n')
            .map(|i| start + i)
            .unwrap_or(self.input.len());
        self.inner.bump(end - start);
        &self.input[start..end]
    }

    pub fn error(&self, message: impl Into<String>) -> KmnError {
        self.error_at(self.position(), message)
    }

    pub fn error_at(&self, position: Position, message: impl Into<String>) -> KmnError {
        KmnError::Syntax {
            path: self.path.to_string(),
            line: position.line,
            column: position.column,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexer_positions() {
        let input = "store(a) 'x'\n  + [K_A] > 'b'";
        let mut lexer = Lexer::new(input, "test.kmn");

        assert_eq!(lexer.next_token().unwrap(), Some(Token::Store));
        assert_eq!(lexer.position(), Position { line: 1, column: 1 });

        for _ in 0..5 {
            lexer.next_token().unwrap();
        }
        assert_eq!(lexer.next_token().unwrap(), Some(Token::Plus));
        assert_eq!(lexer.position(), Position { line: 2, column: 3 });
    }

    #[test]
    fn test_unexpected_character() {
        let mut lexer = Lexer::new("'a' > §", "bad.kmn");
        lexer.next_token().unwrap();
        lexer.next_token().unwrap();

        match lexer.next_token() {
            Err(KmnError::Syntax { path, line, column, message }) => {
                assert_eq!(path, "bad.kmn");
                assert_eq!(line, 1);
                assert_eq!(column, 7);
                assert!(message.contains('§'));
            }
            other => panic!("Expected Syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_unterminated_string() {
        let mut lexer = Lexer::new("+ [K_A] > 'abc\n", "test.kmn");
        let result = loop {
            match lexer.next_token() {
                Ok(Some(_)) => continue,
                other => break other,
            }
        };
        assert!(matches!(result, Err(KmnError::Syntax { line: 1, .. })));
    }

    #[test]
    fn test_empty_comment_on_crlf_line() {
        let mut lexer = Lexer::new("c\r\n+ [K_A] > 'a'\r\nC\r\n", "crlf.kmn");
        assert_eq!(lexer.next_token().unwrap(), Some(Token::Newline));
        assert_eq!(lexer.next_token().unwrap(), Some(Token::Plus));
        assert_eq!(lexer.position(), Position { line: 2, column: 1 });
        for _ in 0..5 {
            lexer.next_token().unwrap();
        }
        assert_eq!(lexer.next_token().unwrap(), Some(Token::Newline));
        assert_eq!(lexer.next_token().unwrap(), Some(Token::Newline));
        assert_eq!(lexer.next_token().unwrap(), None);
    }

    #[test]
    fn test_rest_of_line() {
        let mut lexer = Lexer::new("VERSION 10.0\n'a' > 'b'", "old.kmn");
        assert_eq!(lexer.next_token().unwrap(), Some(Token::Ident("VERSION".to_string())));
        assert_eq!(lexer.rest_of_line().trim(), "10.0");
        assert_eq!(lexer.next_token().unwrap(), Some(Token::Newline));
        assert_eq!(lexer.next_token().unwrap(), Some(Token::String("a".to_string())));
    }
}
