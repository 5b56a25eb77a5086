use std::fmt;
use std::path::PathBuf;

use crate::span::Span;

/// Non-fatal lexer finding. Parse errors are fatal and travel as `ParseError`.
#[derive(Clone, Debug)]
pub struct Diag {
    pub message: String,
    pub span: Span,
    pub path: Option<PathBuf>,
}

impl fmt::Display for Diag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(path) = &self.path {
            write!(f, "{}:", path.display())?;
        }
        write!(
            f,
            "{}:{}: warning: {}",
            self.span.line, self.span.column, self.message
        )
    }
}

#[derive(Default, Debug)]
pub struct Diagnostics {
    diags: Vec<Diag>,
}

impl Diagnostics {
    pub fn warning<S: Into<String>>(&mut self, span: Span, message: S) {
        self.diags.push(Diag {
            message: message.into(),
            span,
            path: None,
        });
    }

    pub fn warning_at_path<P, S>(&mut self, path: P, span: Span, message: S)
    where
        P: Into<PathBuf>,
        S: Into<String>,
    {
        self.diags.push(Diag {
            message: message.into(),
            span,
            path: Some(path.into()),
        });
    }

    pub fn into_vec(self) -> Vec<Diag> {
        self.diags
    }
}
