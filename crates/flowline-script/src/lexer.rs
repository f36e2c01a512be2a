//! Lexical analysis for block scripts.
//!
//! Scripts are line-oriented, so the lexer operates on one source line at a
//! time (the compiler strips blank lines and comments before lexing).
//!
//! Identifiers are deliberately permissive: signal and variable names may be
//! any alphabetic word, including non-ASCII, and the parser coalesces
//! adjacent identifier tokens into a single space-separated name.

use logos::Logos;
use thiserror::Error;

/// A span of the source line that matched no token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognised characters `{text}` at column {column}")]
pub struct LexError {
    pub text: String,
    pub column: usize,
}

/// One lexical element of a script line.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r]+")]
pub enum Token {
    // === Keywords ===
    #[token("delay")]
    Delay,
    #[token("wait")]
    Wait,
    #[token("if")]
    If,
    #[token("elif")]
    Elif,
    #[token("else")]
    Else,
    #[token("jump")]
    Jump,
    #[token("to")]
    To,
    #[token("go")]
    Go,
    #[token("int")]
    Int,
    #[token("product")]
    Product,
    #[token("type")]
    Type,
    #[token("log")]
    Log,
    #[token("create")]
    Create,
    #[token("dispose")]
    Dispose,
    #[token("force")]
    Force,
    #[token("execution")]
    Execution,
    #[token("execute")]
    Execute,
    #[token("status")]
    Status,
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("true")]
    True,
    #[token("false")]
    False,

    // === Operators ===
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("*=")]
    StarEq,
    #[token("/=")]
    SlashEq,
    #[token("!=")]
    NotEq,
    #[token(">=")]
    GreaterEq,
    #[token("<=")]
    LessEq,
    #[token(">")]
    Greater,
    #[token("<")]
    Less,
    #[token("=")]
    Eq,
    #[token("-")]
    Minus,
    #[token(".")]
    Dot,
    #[token(",")]
    Comma,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,

    // === Literals ===
    /// Integer literal. Overflowing literals surface as lex errors.
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Integer(i64),

    /// Float literal (e.g., 0.5, 2.25).
    #[regex(r"[0-9]+\.[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    /// Double-quoted string, quotes stripped. No escape processing; the
    /// script language never needed it.
    #[regex(r#""[^"]*""#, |lex| {
        let s = lex.slice();
        s[1..s.len() - 1].to_string()
    })]
    String(String),

    /// Identifier. Unicode alphabetics allowed so localized signal names
    /// lex as ordinary words.
    #[regex(r"[\p{Alphabetic}_][\p{Alphabetic}0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
}

/// Lex one script line. The first unlexable span fails the whole line so
/// the compiler can flag it as unknown.
pub fn lex_line(line: &str) -> Result<Vec<Token>, LexError> {
    let mut tokens = Vec::new();
    let mut lexer = Token::lexer(line);
    while let Some(tok) = lexer.next() {
        match tok {
            Ok(tok) => tokens.push(tok),
            Err(()) => {
                return Err(LexError {
                    text: lexer.slice().to_string(),
                    column: lexer.span().start + 1,
                })
            }
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Token> {
        lex_line(source).unwrap()
    }

    #[test]
    fn keywords() {
        let tokens = lex("delay wait go int log");
        assert_eq!(
            tokens,
            vec![Token::Delay, Token::Wait, Token::Go, Token::Int, Token::Log]
        );
    }

    #[test]
    fn signal_assignment() {
        let tokens = lex("door open = true");
        assert_eq!(
            tokens,
            vec![
                Token::Ident("door".into()),
                Token::Ident("open".into()),
                Token::Eq,
                Token::True,
            ]
        );
    }

    #[test]
    fn delay_range() {
        let tokens = lex("delay 3-7");
        assert_eq!(
            tokens,
            vec![Token::Delay, Token::Integer(3), Token::Minus, Token::Integer(7)]
        );
    }

    #[test]
    fn float_literal() {
        let tokens = lex("delay 0.5");
        assert_eq!(tokens, vec![Token::Delay, Token::Float(0.5)]);
    }

    #[test]
    fn go_with_args() {
        let tokens = lex("go R to sink(0,2)");
        assert_eq!(
            tokens,
            vec![
                Token::Go,
                Token::Ident("R".into()),
                Token::To,
                Token::Ident("sink".into()),
                Token::LParen,
                Token::Integer(0),
                Token::Comma,
                Token::Integer(2),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn string_literal_strips_quotes() {
        let tokens = lex(r#"log "count is {count}""#);
        assert_eq!(
            tokens,
            vec![Token::Log, Token::String("count is {count}".into())]
        );
    }

    #[test]
    fn unicode_identifiers() {
        let tokens = lex("공정1 load enable = false");
        assert_eq!(
            tokens,
            vec![
                Token::Ident("공정1".into()),
                Token::Ident("load".into()),
                Token::Ident("enable".into()),
                Token::Eq,
                Token::False,
            ]
        );
    }

    #[test]
    fn compound_operators() {
        let tokens = lex("int counter += 5");
        assert_eq!(
            tokens,
            vec![
                Token::Int,
                Token::Ident("counter".into()),
                Token::PlusEq,
                Token::Integer(5),
            ]
        );
    }

    #[test]
    fn status_line() {
        let tokens = lex(r#"inspection.status = "busy""#);
        assert_eq!(
            tokens,
            vec![
                Token::Ident("inspection".into()),
                Token::Dot,
                Token::Status,
                Token::Eq,
                Token::String("busy".into()),
            ]
        );
    }

    #[test]
    fn bad_span_is_error() {
        assert!(lex_line("wait @#$").is_err());
    }
}
