pub mod fetch;
pub mod value;

use std::collections::{BTreeMap, HashMap};
use std::io::Write;

use glue_rt::{json as rt_json, log};
use thiserror::Error;

use crate::ast::{
    ApiDecl, Block, EachBinding, Expr, ExprKind, Literal, MemberKey, Stmt, StmtKind, UnaryOp,
};
use crate::codec;

pub use value::{Composite, Value};

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("invalid assignment target")]
    InvalidAssignmentTarget,
    #[error("index {index} out of bounds for array of length {len}")]
    IndexOutOfBounds { index: i64, len: usize },
    #[error("negative array index {0}")]
    NegativeIndex(i64),
    #[error("expected array, found {0}")]
    NotAnArray(&'static str),
    #[error("expected object, found {0}")]
    NotAnObject(&'static str),
    #[error("array index must be int, found {0}")]
    InvalidIndex(&'static str),
    #[error("unsupported: {0}")]
    Unsupported(String),
}

pub type ExecResult<T> = Result<T, ExecError>;

/// Where `print` writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Output {
    Console,
    Buffer,
    Tee,
}

/// Outcome of executing one statement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Normal,
    Return,
}

#[derive(Clone, Debug)]
pub struct ApiOutcome {
    /// Last value recorded by `return expr;`.
    pub value: Option<Value>,
    /// Text captured from `print` (empty for `Output::Console`).
    pub output: String,
}

impl ApiOutcome {
    /// Value sent back to the client: the returned value if any, else whatever was
    /// printed (decoded as JSON when it parses), else `0`.
    pub fn response_value(&self) -> Value {
        if let Some(value) = &self.value {
            return value.clone();
        }
        let printed = self.output.trim();
        if printed.is_empty() {
            return Value::Int(0);
        }
        match rt_json::decode(printed) {
            Ok(json) => codec::json_to_value(&json),
            Err(_) => Value::String(printed.to_string()),
        }
    }
}

/// Per-request interpreter state. Holds a flat variable map; unbound names read as `0`.
pub struct Evaluator {
    env: HashMap<String, Value>,
    output: Output,
    buffer: String,
    result: Option<Value>,
}

impl Evaluator {
    pub fn new(output: Output) -> Self {
        Self {
            env: HashMap::new(),
            output,
            buffer: String::new(),
            result: None,
        }
    }

    pub fn variables(&self) -> &HashMap<String, Value> {
        &self.env
    }

    pub fn run_api(&mut self, api: &ApiDecl) -> ExecResult<ApiOutcome> {
        log::debug(&format!("running api {} on port {}", api.path.value, api.port));
        self.result = None;
        self.exec_block(&api.body)?;
        Ok(ApiOutcome {
            value: self.result.take(),
            output: std::mem::take(&mut self.buffer),
        })
    }

    /// A block stops at the first `return` and completes normally.
    fn exec_block(&mut self, block: &Block) -> ExecResult<Flow> {
        for stmt in &block.stmts {
            if self.exec_stmt(stmt)? == Flow::Return {
                break;
            }
        }
        Ok(Flow::Normal)
    }

    pub fn exec_stmt(&mut self, stmt: &Stmt) -> ExecResult<Flow> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval_expr(expr)?;
                Ok(Flow::Normal)
            }
            StmtKind::Block(block) => self.exec_block(block),
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => match self.eval_expr(cond)? {
                Value::Bool(true) => self.exec_stmt(then_branch),
                Value::Bool(false) => match else_branch {
                    Some(stmt) => self.exec_stmt(stmt),
                    None => Ok(Flow::Normal),
                },
                other => Err(ExecError::TypeMismatch(format!(
                    "if condition must be bool, found {}",
                    other.type_name()
                ))),
            },
            StmtKind::While { cond, body } => {
                while self.loop_condition(Some(cond))? {
                    if self.exec_stmt(body)? == Flow::Return {
                        return Ok(Flow::Return);
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                if let Some(init) = init {
                    self.exec_stmt(init)?;
                }
                while self.loop_condition(cond.as_ref())? {
                    if self.exec_stmt(body)? == Flow::Return {
                        return Ok(Flow::Return);
                    }
                    if let Some(update) = update {
                        self.eval_expr(update)?;
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::Each {
                binding,
                cond,
                body,
            } => self.exec_each(binding, cond, body),
            StmtKind::Return(expr) => {
                if let Some(expr) = expr {
                    let value = self.eval_expr(expr)?;
                    self.result = Some(value);
                }
                Ok(Flow::Return)
            }
            StmtKind::Decl { name, init } => {
                match init {
                    Some(expr) => {
                        let value = self.eval_expr(expr)?;
                        self.env.insert(name.name.clone(), value);
                    }
                    // redeclaring keeps the current binding
                    None => {
                        self.env.entry(name.name.clone()).or_insert(Value::Int(0));
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::Print(args) => {
                let mut line = String::new();
                for arg in args {
                    line.push_str(&self.eval_expr(arg)?.to_string_value());
                }
                line.push('\n');
                self.write_output(&line);
                Ok(Flow::Normal)
            }
            StmtKind::Empty => Ok(Flow::Normal),
        }
    }

    /// Anything but boolean `true` ends the loop. A missing condition loops forever.
    fn loop_condition(&mut self, cond: Option<&Expr>) -> ExecResult<bool> {
        match cond {
            Some(cond) => Ok(matches!(self.eval_expr(cond)?, Value::Bool(true))),
            None => Ok(true),
        }
    }

    fn exec_each(&mut self, binding: &EachBinding, cond: &Expr, body: &Block) -> ExecResult<Flow> {
        let source = self.eval_expr(&binding.source)?;
        let items = source
            .as_array()
            .ok_or(ExecError::NotAnArray(source.type_name()))?;
        let [first, second] = &binding.params;
        for i in 0..items.len() {
            for j in i + 1..items.len() {
                self.env.insert(first.name.clone(), items[i].clone());
                self.env.insert(second.name.clone(), items[j].clone());
                if matches!(self.eval_expr(cond)?, Value::Bool(true)) {
                    self.exec_block(body)?;
                }
            }
        }
        Ok(Flow::Normal)
    }

    fn write_output(&mut self, text: &str) {
        if matches!(self.output, Output::Console | Output::Tee) {
            let mut stdout = std::io::stdout().lock();
            let _ = stdout.write_all(text.as_bytes());
            let _ = stdout.flush();
        }
        if matches!(self.output, Output::Buffer | Output::Tee) {
            self.buffer.push_str(text);
        }
    }

    pub fn eval_expr(&mut self, expr: &Expr) -> ExecResult<Value> {
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(match literal {
                Literal::Int(v) => Value::Int(*v),
                Literal::Float(v) => Value::Float(*v),
                Literal::Bool(v) => Value::Bool(*v),
                Literal::String(v) => Value::String(v.clone()),
            }),
            ExprKind::Ident(ident) => Ok(self.lookup(&ident.name)),
            ExprKind::Binary { op, left, right } => {
                let left = self.eval_expr(left)?;
                let right = self.eval_expr(right)?;
                value::eval_binary(*op, &left, &right)
            }
            ExprKind::Unary {
                op: UnaryOp::Not,
                expr,
            } => {
                let value = self.eval_expr(expr)?;
                value::eval_not(&value)
            }
            ExprKind::Assign { target, value } => {
                let ExprKind::Ident(ident) = &target.kind else {
                    return Err(ExecError::InvalidAssignmentTarget);
                };
                let value = self.eval_expr(value)?;
                self.env.insert(ident.name.clone(), value.clone());
                Ok(value)
            }
            ExprKind::ArrayLit(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval_expr(item)?);
                }
                Ok(Value::array(values))
            }
            ExprKind::ObjectLit(fields) => {
                let mut map = BTreeMap::new();
                for (key, value) in fields {
                    map.insert(key.value.clone(), self.eval_expr(value)?);
                }
                Ok(Value::object(map))
            }
            ExprKind::Index { base, index } => {
                let base = self.eval_expr(base)?;
                let index = match self.eval_expr(index)? {
                    Value::Int(index) => index,
                    other => return Err(ExecError::InvalidIndex(other.type_name())),
                };
                let items = base
                    .as_array()
                    .ok_or(ExecError::NotAnArray(base.type_name()))?;
                if index < 0 {
                    return Err(ExecError::NegativeIndex(index));
                }
                element(items, index)
            }
            ExprKind::Member { base, key } => {
                let base = self.eval_expr(base)?;
                match key {
                    MemberKey::Index(index) if *index < 0 => Ok(Value::Int(0)),
                    MemberKey::Index(index) => {
                        let items = base
                            .as_array()
                            .ok_or(ExecError::NotAnArray(base.type_name()))?;
                        element(items, *index)
                    }
                    MemberKey::Name(name) => {
                        let fields = base
                            .as_object()
                            .ok_or(ExecError::NotAnObject(base.type_name()))?;
                        Ok(fields.get(name).cloned().unwrap_or(Value::Int(0)))
                    }
                }
            }
            ExprKind::Fetch { target, url } => {
                let ExprKind::Ident(ident) = &target.kind else {
                    return Err(ExecError::Unsupported(
                        "fetch target must be an identifier".to_string(),
                    ));
                };
                let url = match self.eval_expr(url)? {
                    Value::String(url) => url,
                    other => {
                        return Err(ExecError::TypeMismatch(format!(
                            "fetch url must be string, found {}",
                            other.type_name()
                        )));
                    }
                };
                let value = fetch_json(&url);
                self.env.insert(ident.name.clone(), value.clone());
                Ok(value)
            }
        }
    }

    fn lookup(&self, name: &str) -> Value {
        self.env.get(name).cloned().unwrap_or(Value::Int(0))
    }
}

fn element(items: &[Value], index: i64) -> ExecResult<Value> {
    usize::try_from(index)
        .ok()
        .and_then(|idx| items.get(idx))
        .cloned()
        .ok_or(ExecError::IndexOutOfBounds {
            index,
            len: items.len(),
        })
}

/// GET `url` and decode the body. Transport and decode failures degrade to `0`.
fn fetch_json(url: &str) -> Value {
    let body = match fetch::http_get(url) {
        Ok(body) => body,
        Err(err) => {
            log::warn(&format!("fetch {url} failed: {err}"));
            return Value::Int(0);
        }
    };
    match rt_json::decode(body.trim()) {
        Ok(json) => codec::json_to_value(&json),
        Err(err) => {
            log::warn(&format!("fetch {url} returned invalid json: {err}"));
            Value::Int(0)
        }
    }
}
