use std::str::FromStr;

use logos::Logos;
use rust_decimal::Decimal;

#[derive(Logos, Debug, PartialEq, Clone)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip(r"//[^\n]*", allow_greedy = true))]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
pub enum Token {
    // Keywords
    #[token("actor")]
    Actor,
    #[token("ask")]
    Ask,
    #[token("begin")]
    Begin,
    #[token("break")]
    Break,
    #[token("case")]
    Case,
    #[token("catch")]
    Catch,
    #[token("continue")]
    Continue,
    #[token("do")]
    Do,
    #[token("else")]
    Else,
    #[token("elseif")]
    ElseIf,
    #[token("end")]
    End,
    #[token("eof")]
    Eof,
    #[token("false")]
    False,
    #[token("finally")]
    Finally,
    #[token("for")]
    For,
    #[token("func")]
    Func,
    #[token("handle")]
    Handle,
    #[token("if")]
    If,
    #[token("in")]
    In,
    #[token("null")]
    Null,
    #[token("of")]
    Of,
    #[token("proc")]
    Proc,
    #[token("return")]
    Return,
    #[token("skip")]
    Skip,
    #[token("tell")]
    Tell,
    #[token("then")]
    Then,
    #[token("throw")]
    Throw,
    #[token("true")]
    True,
    #[token("try")]
    Try,
    #[token("var")]
    Var,
    #[token("when")]
    When,
    #[token("while")]
    While,

    // Punctuation
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,
    #[token("...")]
    Ellipsis,
    #[token("#")]
    Hash,
    #[token("~")]
    Tilde,
    #[token("@")]
    At,
    #[token("_")]
    Wildcard,

    // Operators
    #[token(":=")]
    ColonEq,
    #[token("=")]
    Assign,
    #[token("==")]
    Eq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Less,
    #[token("<=")]
    LessEq,
    #[token(">")]
    Greater,
    #[token(">=")]
    GreaterEq,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Bang,

    // Literals
    #[regex(r"[0-9]+", |lex| parse_int(lex.slice()))]
    Int(IntLit),

    #[regex(r"[0-9]+[lL]", |lex| {
        let s = lex.slice();
        s[..s.len() - 1].parse::<i64>().ok()
    })]
    Long(i64),

    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?[dD]?", |lex| {
        lex.slice().trim_end_matches(['d', 'D']).parse::<f64>().ok()
    })]
    Float(f64),

    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?[fF]", |lex| {
        let s = lex.slice();
        s[..s.len() - 1].parse::<f32>().ok()
    })]
    Float32(f32),

    #[regex(r"[0-9]+(\.[0-9]+)?[mM]", |lex| {
        let s = lex.slice();
        Decimal::from_str(&s[..s.len() - 1]).ok()
    })]
    Decimal(Decimal),

    #[regex(r"&[^&\\\s]", |lex| lex.slice()[1..].chars().next())]
    #[regex(r"&\\[nrt0\\'&]", |lex| unescape_char(lex.slice()[2..].chars().next()))]
    Char(char),

    #[regex(r"'([^'\\]|\\.)*'", |lex| unescape_str(lex.slice()))]
    #[regex(r#""([^"\\]|\\.)*""#, |lex| unescape_str(lex.slice()))]
    Str(String),

    #[regex(r"[a-zA-Z][a-zA-Z0-9_]*|_[a-zA-Z0-9_]+", |lex| lex.slice().to_string())]
    Ident(String),
}

/// Integer literals default to Int32 and widen to Int64 when they do not fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IntLit {
    Int32(i32),
    Int64(i64),
}

fn parse_int(s: &str) -> Option<IntLit> {
    let n = s.parse::<i64>().ok()?;
    Some(match i32::try_from(n) {
        Ok(small) => IntLit::Int32(small),
        Err(_) => IntLit::Int64(n),
    })
}

fn unescape_char(c: Option<char>) -> Option<char> {
    match c? {
        'n' => Some('\n'),
        'r' => Some('\r'),
        't' => Some('\t'),
        '0' => Some('\0'),
        other => Some(other),
    }
}

fn unescape_str(quoted: &str) -> Option<String> {
    let body = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            out.push(unescape_char(chars.next())?);
        } else {
            out.push(c);
        }
    }
    Some(out)
}

/// Lex source code into a stream of tokens with positions.
/// Returns errors as specific locations rather than failing silently.
pub fn lex(source: &str) -> Result<Vec<(Token, std::ops::Range<usize>)>, LexError> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => tokens.push((token, lexer.span())),
            Err(()) => {
                let span = lexer.span();
                let snippet = source[span.clone()].to_string();
                return Err(LexError {
                    position: span.start,
                    suggestion: suggest_fix(&snippet),
                    snippet,
                });
            }
        }
    }

    Ok(tokens)
}

fn suggest_fix(bad_token: &str) -> String {
    if bad_token.starts_with('$') {
        "Identifiers starting with '$' are reserved for generated code".to_string()
    } else if bad_token.starts_with('&') {
        "Character literals are written '&c' or '&\\n'; use '&&' for logical and".to_string()
    } else if bad_token.starts_with(['\'', '"']) {
        "Unterminated string literal".to_string()
    } else if bad_token.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        "Numeric literal out of range or malformed".to_string()
    } else {
        format!("Unexpected character(s): '{}'", bad_token)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Lex error at position {position}: '{snippet}'. {suggestion}")]
pub struct LexError {
    pub position: usize,
    pub snippet: String,
    pub suggestion: String,
}

impl LexError {
    pub fn code(&self) -> &'static str {
        if self.snippet.starts_with('$') {
            "TQ-L002"
        } else if self.snippet.starts_with(['\'', '"']) {
            "TQ-L003"
        } else if self.snippet.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            "TQ-L004"
        } else {
            "TQ-L001"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        lex(source).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn lex_func_header() {
        let tokens = kinds("func fact(n) in n end");
        assert_eq!(tokens[0], Token::Func);
        assert_eq!(tokens[1], Token::Ident("fact".to_string()));
        assert_eq!(tokens[2], Token::LParen);
        assert_eq!(tokens.last(), Some(&Token::End));
    }

    #[test]
    fn lex_numeric_literals() {
        assert_eq!(
            kinds("1 2L 1.5 2.5f 3.25m 7m"),
            vec![
                Token::Int(IntLit::Int32(1)),
                Token::Long(2),
                Token::Float(1.5),
                Token::Float32(2.5),
                Token::Decimal(Decimal::from_str("3.25").unwrap()),
                Token::Decimal(Decimal::from(7)),
            ]
        );
    }

    #[test]
    fn lex_large_int_widens() {
        assert_eq!(kinds("3000000000"), vec![Token::Int(IntLit::Int64(3_000_000_000))]);
    }

    #[test]
    fn lex_strings_and_chars() {
        assert_eq!(
            kinds(r#"'it\'s' "two" &a &\n"#),
            vec![
                Token::Str("it's".to_string()),
                Token::Str("two".to_string()),
                Token::Char('a'),
                Token::Char('\n'),
            ]
        );
    }

    #[test]
    fn lex_and_and_is_not_a_char() {
        assert_eq!(
            kinds("a && b"),
            vec![Token::Ident("a".into()), Token::AndAnd, Token::Ident("b".into())]
        );
    }

    #[test]
    fn lex_operators_longest_match() {
        assert_eq!(
            kinds("x := @y == z <= w ..."),
            vec![
                Token::Ident("x".into()),
                Token::ColonEq,
                Token::At,
                Token::Ident("y".into()),
                Token::Eq,
                Token::Ident("z".into()),
                Token::LessEq,
                Token::Ident("w".into()),
                Token::Ellipsis,
            ]
        );
    }

    #[test]
    fn lex_comments_ignored() {
        let tokens = kinds("// line\nvar /* block\n comment */ x");
        assert_eq!(tokens, vec![Token::Var, Token::Ident("x".into())]);
    }

    #[test]
    fn lex_wildcard_vs_ident() {
        assert_eq!(kinds("_ _x"), vec![Token::Wildcard, Token::Ident("_x".into())]);
    }

    #[test]
    fn lex_rejects_system_identifier() {
        let err = lex("var $v0 = 1").unwrap_err();
        assert_eq!(err.position, 4);
        assert!(err.suggestion.contains("reserved"));
    }
}
