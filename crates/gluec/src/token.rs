use crate::span::Span;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Keyword {
    If,
    Else,
    While,
    For,
    In,
    Each,
    Meet,
    Int,
    Float,
    Void,
    Return,
    Print,
    Api,
    Listen,
}

impl Keyword {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "if" => Some(Keyword::If),
            "else" => Some(Keyword::Else),
            "while" => Some(Keyword::While),
            "for" => Some(Keyword::For),
            "in" => Some(Keyword::In),
            "each" => Some(Keyword::Each),
            "meet" => Some(Keyword::Meet),
            "int" => Some(Keyword::Int),
            "float" => Some(Keyword::Float),
            "void" => Some(Keyword::Void),
            "return" => Some(Keyword::Return),
            "print" => Some(Keyword::Print),
            "api" => Some(Keyword::Api),
            "listen" => Some(Keyword::Listen),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Punct {
    Plus,
    PlusPlus,
    Minus,
    MinusMinus,
    Star,
    Slash,
    Assign,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    AndAnd,
    OrOr,
    Bang,
    Arrow,
    LArrow,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semicolon,
    Colon,
    Comma,
    Dot,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Keyword(Keyword),
    Ident(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    Punct(Punct),
    Unknown,
    Eof,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Source text of the token; string literals keep their quotes.
    pub text: String,
    pub span: Span,
}

impl Token {
    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}
