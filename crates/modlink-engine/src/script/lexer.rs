//! Tokenizer for script source text, built on logos.

use logos::Logos;

use crate::error::ParseError;

/// Script token
#[derive(Logos, Debug, Clone, PartialEq)]
pub enum Token {
    // Whitespace and comments (skip)
    #[regex(r"[ \t\r\n\f]+", logos::skip)]
    #[regex(r"//[^\n]*", logos::skip)]
    #[regex(r"#![^\n]*", logos::skip)]
    Whitespace,

    #[regex(r"/\*", lex_block_comment)]
    BlockComment,

    // Keywords
    #[token("import")]
    Import,

    #[token("export")]
    Export,

    #[token("from")]
    From,

    #[token("as")]
    As,

    #[token("default")]
    Default,

    #[token("const")]
    Const,

    #[token("let")]
    Let,

    #[token("var")]
    Var,

    #[token("function")]
    Function,

    #[token("return")]
    Return,

    #[token("class")]
    Class,

    #[token("async")]
    Async,

    #[token("await")]
    Await,

    #[token("type")]
    Type,

    #[token("interface")]
    Interface,

    #[token("with")]
    With,

    #[token("assert")]
    Assert,

    #[token("true")]
    True,

    #[token("false")]
    False,

    #[token("null")]
    Null,

    #[token("if")]
    If,

    #[token("else")]
    Else,

    #[token("throw")]
    Throw,

    #[token("new")]
    New,

    // Literals
    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", parse_number)]
    #[regex(r"0[xX][0-9a-fA-F]+", parse_hex)]
    Number(f64),

    #[regex(r#""([^"\\\n]|\\.)*""#, parse_string)]
    #[regex(r#"'([^'\\\n]|\\.)*'"#, parse_string)]
    Str(String),

    #[regex(r"`[^`]*`", parse_template)]
    Template(String),

    #[regex(r"[a-zA-Z_$][a-zA-Z0-9_$]*", |lex| lex.slice().to_string())]
    Ident(String),

    // Punctuation
    #[token("{")]
    LeftBrace,

    #[token("}")]
    RightBrace,

    #[token("(")]
    LeftParen,

    #[token(")")]
    RightParen,

    #[token("[")]
    LeftBracket,

    #[token("]")]
    RightBracket,

    #[token(";")]
    Semicolon,

    #[token(",")]
    Comma,

    #[token(".")]
    Dot,

    #[token("*")]
    Star,

    #[token("=")]
    Eq,

    #[token(":")]
    Colon,

    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token("/")]
    Slash,

    #[token("=>")]
    Arrow,

    /// Operators the body interpreter does not evaluate
    #[regex(r"[%<>!&|^~?@#][-%<>!&|^~?@#=+*]*", |lex| lex.slice().to_string())]
    #[regex(r"[=+*][-%<>!&|^~?@#=+*]+", |lex| lex.slice().to_string())]
    Operator(String),
}

impl Token {
    /// Text of identifiers and keywords, usable as a property or export name
    pub fn name(&self) -> Option<&str> {
        Some(match self {
            Token::Ident(name) => name,
            Token::Import => "import",
            Token::Export => "export",
            Token::From => "from",
            Token::As => "as",
            Token::Default => "default",
            Token::Const => "const",
            Token::Let => "let",
            Token::Var => "var",
            Token::Function => "function",
            Token::Return => "return",
            Token::Class => "class",
            Token::Async => "async",
            Token::Await => "await",
            Token::Type => "type",
            Token::Interface => "interface",
            Token::With => "with",
            Token::Assert => "assert",
            Token::True => "true",
            Token::False => "false",
            Token::Null => "null",
            Token::If => "if",
            Token::Else => "else",
            Token::Throw => "throw",
            Token::New => "new",
            _ => return None,
        })
    }

    /// Text usable as a binding name: identifiers and contextual keywords
    pub fn identifier(&self) -> Option<&str> {
        match self {
            Token::Ident(name) => Some(name),
            Token::From => Some("from"),
            Token::As => Some("as"),
            Token::Type => Some("type"),
            Token::Interface => Some("interface"),
            Token::With => Some("with"),
            Token::Assert => Some("assert"),
            Token::Async => Some("async"),
            _ => None,
        }
    }
}

/// Token with the 1-based line it starts on
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
}

/// Tokenize a whole source text
pub fn tokenize(source: &str) -> Result<Vec<Spanned>, ParseError> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut offset = 0;

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        line += source[offset..span.start].matches('\n').count();
        offset = span.start;
        match result {
            Ok(token) => tokens.push(Spanned { token, line }),
            Err(()) => {
                return Err(ParseError::new(
                    format!("unexpected character {:?}", lexer.slice()),
                    line,
                ))
            }
        }
    }

    Ok(tokens)
}

fn lex_block_comment(lex: &mut logos::Lexer<Token>) -> logos::Skip {
    let remainder = lex.remainder();
    match remainder.find("*/") {
        Some(end) => lex.bump(end + 2),
        None => lex.bump(remainder.len()),
    }
    logos::Skip
}

fn parse_number(lex: &mut logos::Lexer<Token>) -> Option<f64> {
    lex.slice().parse().ok()
}

fn parse_hex(lex: &mut logos::Lexer<Token>) -> Option<f64> {
    i64::from_str_radix(&lex.slice()[2..], 16).ok().map(|n| n as f64)
}

fn parse_string(lex: &mut logos::Lexer<Token>) -> Option<String> {
    let s = lex.slice();
    Some(unescape(&s[1..s.len() - 1]))
}

/// Raw template text; escapes and `${}` substitutions are handled by the scanner
fn parse_template(lex: &mut logos::Lexer<Token>) -> Option<String> {
    let s = lex.slice();
    Some(s[1..s.len() - 1].to_string())
}

pub(crate) fn unescape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('r') => result.push('\r'),
            Some('t') => result.push('\t'),
            Some('0') => result.push('\0'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(ch) => result.push(ch),
                    None => {
                        result.push_str("\\u");
                        result.push_str(&hex);
                    }
                }
            }
            Some(other) => result.push(other),
            None => result.push('\\'),
        }
    }

    result
}
