use logos::Logos;

#[derive(Logos, Debug, PartialEq, Clone)]
pub enum Token {
    // Comments, blanks and line continuations (skipped)
    #[regex(r"[cC][ \t\r][^\n]*", logos::skip)]
    #[regex(r"\\[ \t]*\r?\n", logos::skip)]
    #[regex(r"[ \t\r]+", logos::skip)]
    Comment,

    #[token("\n")]
    Newline,

    // Keywords
    #[token("store", ignore(ascii_case))]
    Store,

    #[token("group", ignore(ascii_case))]
    Group,

    #[token("begin", ignore(ascii_case))]
    Begin,

    #[token("match", ignore(ascii_case))]
    Match,

    #[token("nomatch", ignore(ascii_case))]
    Nomatch,

    // Operators
    #[token("+")]
    Plus,

    #[token(">")]
    Arrow,

    #[token("&")]
    Ampersand,

    #[token("=")]
    Equals,

    #[token("!=")]
    NotEquals,

    #[token("..")]
    Range,

    #[token(",")]
    Comma,

    // Delimiters
    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    // Code points: U+0061
    #[regex(r"[Uu]\+[0-9a-fA-F]+", |lex| {
        u32::from_str_radix(&lex.slice()[2..], 16).ok()
    })]
    CodePoint(Option<u32>),

    #[regex(r"[Uu]\+")]
    MalformedCodePoint,

    // String literals, either quote style, never spanning lines
    #[regex(r#""[^"\n]*""#, |lex| {
        let s = lex.slice();
        s[1..s.len()-1].to_string()
    })]
    #[regex(r"'[^'\n]*'", |lex| {
        let s = lex.slice();
        s[1..s.len()-1].to_string()
    })]
    String(String),

    #[regex(r#""[^"\n]*"#)]
    #[regex(r"'[^'\n]*")]
    UnterminatedString,

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<usize>().ok())]
    Number(Option<usize>),

    // Identifiers: functions, modifiers, virtual keys, store and group names
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_\-]*", |lex| lex.slice().to_string())]
    Ident(String),
}

impl Token {
    /// Case-insensitive keyword test for identifier tokens.
    pub fn is_ident(&self, keyword: &str) -> bool {
        matches!(self, Token::Ident(name) if name.eq_ignore_ascii_case(keyword))
    }
}
