//! Lexical analysis for Ember scripts.
//!
//! Comments (`--` to end of line and `--[[ ... ]]` blocks) are stripped
//! during lexing. Every token carries the source line it started on.

use std::fmt;
use std::rc::Rc;

use logos::{FilterResult, Lexer, Logos};

use super::diagnostic::Diagnostic;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum Token {
    // Keywords
    #[token("and")]
    And,
    #[token("break")]
    Break,
    #[token("do")]
    Do,
    #[token("else")]
    Else,
    #[token("elseif")]
    Elseif,
    #[token("end")]
    End,
    #[token("false")]
    False,
    #[token("for")]
    For,
    #[token("function")]
    Function,
    #[token("if")]
    If,
    #[token("in")]
    In,
    #[token("local")]
    Local,
    #[token("nil")]
    Nil,
    #[token("not")]
    Not,
    #[token("or")]
    Or,
    #[token("repeat")]
    Repeat,
    #[token("return")]
    Return,
    #[token("then")]
    Then,
    #[token("true")]
    True,
    #[token("until")]
    Until,
    #[token("while")]
    While,

    // Operators
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("//")]
    SlashSlash,
    #[token("%")]
    Percent,
    #[token("^")]
    Caret,
    #[token("#")]
    Hash,
    #[token("==")]
    EqEq,
    #[token("~=")]
    NotEq,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("=")]
    Assign,
    #[token("..")]
    DotDot,

    // Delimiters
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(";")]
    Semi,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,

    // Literals
    #[regex(r"0[xX][0-9a-fA-F]+", |lex| parse_hex(&lex.slice()[2..]))]
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Integer(i64),

    #[regex(r"[0-9]+\.[0-9]*([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| unescape(lex.slice()))]
    #[regex(r#"'([^'\\\n]|\\.)*'"#, |lex| unescape(lex.slice()))]
    Str(Rc<str>),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| Rc::from(lex.slice()))]
    Name(Rc<str>),

    /// Never emitted; the callback skips the comment body
    #[token("--", skip_comment)]
    Comment,
}

/// Skip a line comment or a `--[[ ... ]]` block comment
fn skip_comment(lex: &mut Lexer<Token>) -> FilterResult<(), ()> {
    let rest = lex.remainder();
    if let Some(body) = rest.strip_prefix("[[") {
        return match body.find("]]") {
            Some(end) => {
                lex.bump(2 + end + 2);
                FilterResult::Skip
            }
            None => {
                lex.bump(rest.len());
                FilterResult::Error(())
            }
        };
    }
    lex.bump(rest.find('\n').unwrap_or(rest.len()));
    FilterResult::Skip
}

/// Hex integers wrap around on overflow
fn parse_hex(digits: &str) -> Option<i64> {
    digits.chars().try_fold(0i64, |acc, c| {
        c.to_digit(16)
            .map(|d| acc.wrapping_mul(16).wrapping_add(d as i64))
    })
}

/// Strip the quotes of a string literal and resolve escapes
fn unescape(literal: &str) -> Option<Rc<str>> {
    let content = &literal[1..literal.len() - 1];
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next()? {
            'n' => result.push('\n'),
            'r' => result.push('\r'),
            't' => result.push('\t'),
            '0' => result.push('\0'),
            '\\' => result.push('\\'),
            '"' => result.push('"'),
            '\'' => result.push('\''),
            _ => return None,
        }
    }
    Some(Rc::from(result))
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Token::And => "and",
            Token::Break => "break",
            Token::Do => "do",
            Token::Else => "else",
            Token::Elseif => "elseif",
            Token::End => "end",
            Token::False => "false",
            Token::For => "for",
            Token::Function => "function",
            Token::If => "if",
            Token::In => "in",
            Token::Local => "local",
            Token::Nil => "nil",
            Token::Not => "not",
            Token::Or => "or",
            Token::Repeat => "repeat",
            Token::Return => "return",
            Token::Then => "then",
            Token::True => "true",
            Token::Until => "until",
            Token::While => "while",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::SlashSlash => "//",
            Token::Percent => "%",
            Token::Caret => "^",
            Token::Hash => "#",
            Token::EqEq => "==",
            Token::NotEq => "~=",
            Token::LtEq => "<=",
            Token::GtEq => ">=",
            Token::Lt => "<",
            Token::Gt => ">",
            Token::Assign => "=",
            Token::DotDot => "..",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::Semi => ";",
            Token::Colon => ":",
            Token::Comma => ",",
            Token::Dot => ".",
            Token::Integer(i) => return write!(f, "{i}"),
            Token::Float(n) => return write!(f, "{n}"),
            Token::Str(s) => return write!(f, "{s:?}"),
            Token::Name(name) => name,
            Token::Comment => "--",
        };
        f.write_str(text)
    }
}

/// A token with the line it starts on
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: u32,
}

/// Tokenize a whole chunk
pub fn tokenize(chunk: &str, source: &str) -> Result<Vec<Spanned>, Diagnostic> {
    let line_starts: Vec<usize> = std::iter::once(0)
        .chain(source.match_indices('\n').map(|(i, _)| i + 1))
        .collect();
    let line_of = |offset: usize| match line_starts.binary_search(&offset) {
        Ok(index) => index as u32 + 1,
        Err(index) => index as u32,
    };

    let mut tokens = Vec::new();
    let mut lexer = Token::lexer(source);
    while let Some(result) = lexer.next() {
        let line = line_of(lexer.span().start);
        match result {
            Ok(token) => tokens.push(Spanned { token, line }),
            Err(()) => {
                let near: String = lexer.slice().chars().take(16).collect();
                let message = if near.starts_with("--[[") {
                    "unfinished long comment".to_string()
                } else if near.starts_with('"') || near.starts_with('\'') {
                    format!("malformed string near '{near}'")
                } else if near.starts_with(|c: char| c.is_ascii_digit()) {
                    format!("malformed number near '{near}'")
                } else {
                    format!("unexpected symbol near '{near}'")
                };
                return Err(Diagnostic::new(chunk, line, message));
            }
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Token> {
        tokenize("test", source)
            .expect("lexing failed")
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn keywords_beat_names() {
        assert_eq!(
            lex("local function ending"),
            vec![Token::Local, Token::Function, Token::Name(Rc::from("ending"))]
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(
            lex("42 0xFF 3.5 1e3 .5"),
            vec![
                Token::Integer(42),
                Token::Integer(255),
                Token::Float(3.5),
                Token::Float(1000.0),
                Token::Float(0.5)
            ]
        );
    }

    #[test]
    fn strings_resolve_escapes() {
        assert_eq!(
            lex(r#""a\tb" 'it\'s'"#),
            vec![Token::Str(Rc::from("a\tb")), Token::Str(Rc::from("it's"))]
        );
    }

    #[test]
    fn comments_are_skipped_and_lines_tracked() {
        let tokens = tokenize("test", "a -- note\n--[[ block\n]] b").unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[1].token, Token::Name(Rc::from("b")));
        assert_eq!(tokens[1].line, 3);
    }

    #[test]
    fn operators_prefer_longest_match() {
        assert_eq!(
            lex("a // b .. c ~= d"),
            vec![
                Token::Name(Rc::from("a")),
                Token::SlashSlash,
                Token::Name(Rc::from("b")),
                Token::DotDot,
                Token::Name(Rc::from("c")),
                Token::NotEq,
                Token::Name(Rc::from("d")),
            ]
        );
    }

    #[test]
    fn unexpected_symbol_reports_line() {
        let err = tokenize("chunk", "x = 1\ny = @").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("unexpected symbol"));
    }
}
