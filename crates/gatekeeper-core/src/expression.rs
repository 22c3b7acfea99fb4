//! Expression evaluation for `${{ ... }}` templates and job conditions.
//!
//! Supports:
//! - Contexts: `inputs`, `matrix`, `needs`, `env`, `secrets`, `github`
//! - Property access: `needs.build.result`, `inputs['extra-arguments']`
//! - Operators: `!`, `==`, `!=`, `<`, `<=`, `>`, `>=`, `&&`, `||`
//! - Status functions: `always()`, `success()`, `failure()`, `cancelled()`
//! - Helpers: `contains`, `startsWith`, `endsWith`, `format`, `join`,
//!   `toJSON`, `fromJSON`
//!
//! String comparison is case-insensitive.

use crate::result::JobResult;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

const STATUS_FUNCTIONS: [&str; 4] = ["always", "success", "failure", "cancelled"];

#[derive(Debug, Error, PartialEq)]
pub enum ExpressionError {
    #[error("Unexpected character '{ch}' at offset {pos} in '{expr}'")]
    UnexpectedChar { expr: String, ch: char, pos: usize },

    #[error("Unterminated string literal in '{0}'")]
    UnterminatedString(String),

    #[error("Unexpected token {found} in '{expr}'")]
    UnexpectedToken { expr: String, found: String },

    #[error("Unexpected end of expression '{0}'")]
    UnexpectedEnd(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Function {name} expects {expected} arguments, got {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },

    #[error("fromJSON could not parse its argument: {0}")]
    InvalidJson(String),
}

type Result<T> = std::result::Result<T, ExpressionError>;

/// Result and outputs a finished job exposes to its dependents.
#[derive(Debug, Clone, PartialEq)]
pub struct NeedContext {
    pub result: JobResult,
    pub outputs: BTreeMap<String, String>,
}

impl NeedContext {
    pub fn new(result: JobResult) -> Self {
        Self {
            result,
            outputs: BTreeMap::new(),
        }
    }
}

/// Inputs to the status functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusContext {
    /// Every direct dependency (or previous step) succeeded.
    pub upstream_succeeded: bool,
    /// Some ancestor job (or previous step) failed.
    pub upstream_failed: bool,
    /// The run has been cancelled.
    pub cancelled: bool,
}

impl Default for StatusContext {
    fn default() -> Self {
        Self {
            upstream_succeeded: true,
            upstream_failed: false,
            cancelled: false,
        }
    }
}

/// Values visible to expressions.
#[derive(Debug, Clone, Default)]
pub struct ExpressionContext {
    pub inputs: BTreeMap<String, Value>,
    pub matrix: BTreeMap<String, Value>,
    pub needs: BTreeMap<String, NeedContext>,
    pub env: BTreeMap<String, String>,
    pub secrets: BTreeMap<String, String>,
    pub github: BTreeMap<String, Value>,
    pub status: StatusContext,
}

impl ExpressionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every `${{ expr }}` in `input` with the expression's value.
    pub fn interpolate(&self, input: &str) -> Result<String> {
        let mut output = String::with_capacity(input.len());
        let mut last = 0;

        for template in templates(input) {
            output.push_str(&input[last..template.start]);
            output.push_str(&stringify(&self.evaluate(template.expr)?));
            last = template.end;
        }

        output.push_str(&input[last..]);
        Ok(output)
    }

    /// Evaluate a bare expression (no `${{ }}` wrapper required).
    pub fn evaluate(&self, expr: &str) -> Result<Value> {
        let ast = parse(unwrap_template(expr))?;
        self.eval(&ast)
    }

    /// Evaluate a job or step `if:` condition.
    ///
    /// An absent condition means `success()`. A condition that calls no
    /// status function is implicitly `success() && (condition)`.
    pub fn evaluate_condition(&self, condition: Option<&str>) -> Result<bool> {
        let Some(condition) = condition.map(unwrap_template).filter(|c| !c.trim().is_empty())
        else {
            return Ok(self.success());
        };

        let ast = parse(condition)?;
        if !ast.calls_status_function() && !self.success() {
            return Ok(false);
        }
        Ok(truthy(&self.eval(&ast)?))
    }

    /// Mask every secret value in `input`.
    pub fn mask_secrets(&self, input: &str) -> String {
        let mut output = input.to_string();
        for value in self.secrets.values() {
            if !value.is_empty() {
                output = output.replace(value, "***");
            }
        }
        output
    }

    fn success(&self) -> bool {
        self.status.upstream_succeeded && !self.status.cancelled
    }

    fn context(&self, name: &str) -> Option<Value> {
        let strings = |map: &BTreeMap<String, String>| {
            Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            )
        };
        let values = |map: &BTreeMap<String, Value>| {
            Value::Object(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        };

        match name {
            "inputs" => Some(values(&self.inputs)),
            "matrix" => Some(values(&self.matrix)),
            "github" => Some(values(&self.github)),
            "env" => Some(strings(&self.env)),
            "secrets" => Some(strings(&self.secrets)),
            "needs" => Some(Value::Object(
                self.needs
                    .iter()
                    .map(|(job, need)| {
                        let mut entry = serde_json::Map::new();
                        entry.insert(
                            "result".to_string(),
                            Value::String(need.result.as_str().to_string()),
                        );
                        entry.insert("outputs".to_string(), strings(&need.outputs));
                        (job.clone(), Value::Object(entry))
                    })
                    .collect(),
            )),
            _ => None,
        }
    }

    fn eval(&self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Context(name) => Ok(self.context(name).unwrap_or(Value::Null)),
            Expr::Property(target, key) => Ok(property(&self.eval(target)?, key)),
            Expr::Index(target, index) => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                Ok(match (&target, &index) {
                    (Value::Array(items), Value::Number(n)) => n
                        .as_f64()
                        .and_then(|f| items.get(f as usize))
                        .cloned()
                        .unwrap_or(Value::Null),
                    _ => property(&target, &stringify(&index)),
                })
            }
            Expr::Not(inner) => Ok(Value::Bool(!truthy(&self.eval(inner)?))),
            Expr::Binary(op, left, right) => self.eval_binary(*op, left, right),
            Expr::Call(name, args) => self.eval_call(name, args),
        }
    }

    fn eval_binary(&self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<Value> {
        let lhs = self.eval(left)?;
        match op {
            // Short-circuit and return the deciding operand.
            BinaryOp::And if !truthy(&lhs) => Ok(lhs),
            BinaryOp::And => self.eval(right),
            BinaryOp::Or if truthy(&lhs) => Ok(lhs),
            BinaryOp::Or => self.eval(right),
            BinaryOp::Eq => Ok(Value::Bool(loose_eq(&lhs, &self.eval(right)?))),
            BinaryOp::Ne => Ok(Value::Bool(!loose_eq(&lhs, &self.eval(right)?))),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let rhs = self.eval(right)?;
                let ordering = match (&lhs, &rhs) {
                    (Value::String(a), Value::String(b)) => {
                        Some(a.to_lowercase().cmp(&b.to_lowercase()))
                    }
                    _ => to_number(&lhs).partial_cmp(&to_number(&rhs)),
                };
                let Some(ordering) = ordering else {
                    return Ok(Value::Bool(false));
                };
                Ok(Value::Bool(match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::Le => ordering.is_le(),
                    BinaryOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                }))
            }
        }
    }

    fn eval_call(&self, name: &str, args: &[Expr]) -> Result<Value> {
        let arity = |expected: &str, ok: bool| {
            if ok {
                Ok(())
            } else {
                Err(ExpressionError::Arity {
                    name: name.to_string(),
                    expected: expected.to_string(),
                    got: args.len(),
                })
            }
        };

        match name.to_ascii_lowercase().as_str() {
            "always" => {
                arity("0", args.is_empty())?;
                Ok(Value::Bool(true))
            }
            "success" => {
                arity("0", args.is_empty())?;
                Ok(Value::Bool(self.success()))
            }
            "failure" => {
                arity("0", args.is_empty())?;
                Ok(Value::Bool(self.status.upstream_failed))
            }
            "cancelled" => {
                arity("0", args.is_empty())?;
                Ok(Value::Bool(self.status.cancelled))
            }
            "contains" => {
                arity("2", args.len() == 2)?;
                let haystack = self.eval(&args[0])?;
                let needle = self.eval(&args[1])?;
                Ok(Value::Bool(match &haystack {
                    Value::Array(items) => items.iter().any(|item| loose_eq(item, &needle)),
                    other => stringify(other)
                        .to_lowercase()
                        .contains(&stringify(&needle).to_lowercase()),
                }))
            }
            "startswith" | "endswith" => {
                arity("2", args.len() == 2)?;
                let subject = stringify(&self.eval(&args[0])?).to_lowercase();
                let affix = stringify(&self.eval(&args[1])?).to_lowercase();
                Ok(Value::Bool(if name.eq_ignore_ascii_case("startswith") {
                    subject.starts_with(&affix)
                } else {
                    subject.ends_with(&affix)
                }))
            }
            "format" => {
                arity("at least 1", !args.is_empty())?;
                let template = stringify(&self.eval(&args[0])?);
                let values = args[1..]
                    .iter()
                    .map(|arg| self.eval(arg).map(|v| stringify(&v)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::String(format_template(&template, &values)))
            }
            "join" => {
                arity("1 or 2", matches!(args.len(), 1 | 2))?;
                let items = self.eval(&args[0])?;
                let separator = match args.get(1) {
                    Some(sep) => stringify(&self.eval(sep)?),
                    None => ",".to_string(),
                };
                Ok(Value::String(match items {
                    Value::Array(items) => items
                        .iter()
                        .map(stringify)
                        .collect::<Vec<_>>()
                        .join(&separator),
                    other => stringify(&other),
                }))
            }
            "tojson" => {
                arity("1", args.len() == 1)?;
                let value = self.eval(&args[0])?;
                serde_json::to_string_pretty(&value)
                    .map(Value::String)
                    .map_err(|e| ExpressionError::InvalidJson(e.to_string()))
            }
            "fromjson" => {
                arity("1", args.len() == 1)?;
                let raw = stringify(&self.eval(&args[0])?);
                serde_json::from_str(&raw).map_err(|e| ExpressionError::InvalidJson(e.to_string()))
            }
            _ => Err(ExpressionError::UnknownFunction(name.to_string())),
        }
    }
}

/// Check that every `${{ }}` template in `input` parses.
pub fn check_templates(input: &str) -> Result<()> {
    templates(input)
        .into_iter()
        .try_for_each(|template| parse(template.expr).map(|_| ()))
}

/// One `${{ ... }}` occurrence: byte span of the whole template and its body.
struct Template<'a> {
    start: usize,
    end: usize,
    expr: &'a str,
}

/// Find every `${{ ... }}` in `input`. A `}}` inside a quoted string literal
/// does not close the template; an unclosed template is left as text.
fn templates(input: &str) -> Vec<Template<'_>> {
    let mut found = Vec::new();
    let mut from = 0;
    while let Some(offset) = input[from..].find("${{") {
        let start = from + offset;
        let body = start + 3;
        let Some(close) = closing_braces(&input[body..]) else {
            break;
        };
        found.push(Template {
            start,
            end: body + close + 2,
            expr: &input[body..body + close],
        });
        from = body + close + 2;
    }
    found
}

fn closing_braces(body: &str) -> Option<usize> {
    let bytes = body.as_bytes();
    let mut in_string = false;
    for (i, byte) in bytes.iter().enumerate() {
        match byte {
            // An escaped '' toggles twice and stays inside the literal.
            b'\'' => in_string = !in_string,
            b'}' if !in_string && bytes.get(i + 1) == Some(&b'}') => return Some(i),
            _ => {}
        }
    }
    None
}

/// Check that a condition parses.
pub fn check_condition(condition: &str) -> Result<()> {
    parse(unwrap_template(condition)).map(|_| ())
}

/// Strip a surrounding `${{ }}` if the whole string is one template.
fn unwrap_template(expr: &str) -> &str {
    let trimmed = expr.trim();
    match trimmed
        .strip_prefix("${{")
        .and_then(|rest| rest.strip_suffix("}}"))
    {
        Some(inner) if !inner.contains("${{") => inner,
        _ => trimmed,
    }
}

/// Render a value the way it appears when interpolated into text.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn to_number(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) if s.trim().is_empty() => 0.0,
        Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        Value::Array(_) | Value::Object(_) => f64::NAN,
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(x), Value::String(y)) => x.eq_ignore_ascii_case(y),
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => {
            a == b
        }
        _ => to_number(a) == to_number(b),
    }
}

fn property(target: &Value, key: &str) -> Value {
    match target {
        Value::Object(map) => map
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.clone())
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn format_template(template: &str, values: &[String]) -> String {
    let mut output = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                output.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                output.push('}');
            }
            '{' => {
                let mut digits = String::new();
                while let Some(d) = chars.next_if(|d| d.is_ascii_digit()) {
                    digits.push(d);
                }
                match (digits.parse::<usize>(), chars.peek()) {
                    (Ok(idx), Some('}')) => {
                        chars.next();
                        output.push_str(values.get(idx).map(String::as_str).unwrap_or_default());
                    }
                    _ => {
                        output.push('{');
                        output.push_str(&digits);
                    }
                }
            }
            other => output.push(other),
        }
    }

    output
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Comma,
    Not,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Context(String),
    Property(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

impl Expr {
    fn calls_status_function(&self) -> bool {
        match self {
            Expr::Call(name, args) => {
                STATUS_FUNCTIONS
                    .iter()
                    .any(|f| f.eq_ignore_ascii_case(name))
                    || args.iter().any(Expr::calls_status_function)
            }
            Expr::Property(target, _) => target.calls_status_function(),
            Expr::Index(target, index) => {
                target.calls_status_function() || index.calls_status_function()
            }
            Expr::Not(inner) => inner.calls_status_function(),
            Expr::Binary(_, left, right) => {
                left.calls_status_function() || right.calls_status_function()
            }
            Expr::Literal(_) | Expr::Context(_) => false,
        }
    }
}

fn tokenize(expr: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<(usize, char)> = expr.char_indices().collect();
    let mut i = 0;

    let unexpected = |pos: usize, ch: char| ExpressionError::UnexpectedChar {
        expr: expr.to_string(),
        ch,
        pos,
    };

    while i < chars.len() {
        let (pos, c) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);

        match c {
            c if c.is_whitespace() => i += 1,
            '(' | ')' | '[' | ']' | '.' | ',' => {
                tokens.push(match c {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    '.' => Token::Dot,
                    _ => Token::Comma,
                });
                i += 1;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '=' if next == Some('=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '&' if next == Some('&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if next == Some('|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '<' | '>' => {
                let inclusive = next == Some('=');
                tokens.push(match (c, inclusive) {
                    ('<', false) => Token::Lt,
                    ('<', true) => Token::Le,
                    ('>', false) => Token::Gt,
                    _ => Token::Ge,
                });
                i += if inclusive { 2 } else { 1 };
            }
            '\'' => {
                let mut literal = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some((_, '\'')) if chars.get(i + 1).map(|(_, c)| *c) == Some('\'') => {
                            literal.push('\'');
                            i += 2;
                        }
                        Some((_, '\'')) => {
                            i += 1;
                            break;
                        }
                        Some((_, ch)) => {
                            literal.push(*ch);
                            i += 1;
                        }
                        None => return Err(ExpressionError::UnterminatedString(expr.to_string())),
                    }
                }
                tokens.push(Token::Str(literal));
            }
            c if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].1.is_ascii_digit() || chars[i].1 == '.') {
                    i += 1;
                }
                let end = chars.get(i).map(|(p, _)| *p).unwrap_or(expr.len());
                let text = &expr[chars[start].0..end];
                let number = text.parse::<f64>().map_err(|_| unexpected(pos, c))?;
                tokens.push(Token::Num(number));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].1.is_ascii_alphanumeric() || matches!(chars[i].1, '_' | '-'))
                {
                    i += 1;
                }
                let end = chars.get(i).map(|(p, _)| *p).unwrap_or(expr.len());
                tokens.push(Token::Ident(expr[chars[start].0..end].to_string()));
            }
            other => return Err(unexpected(pos, other)),
        }
    }

    Ok(tokens)
}

fn parse(expr: &str) -> Result<Expr> {
    let tokens = tokenize(expr)?;
    let mut parser = Parser {
        expr,
        tokens,
        pos: 0,
    };
    let ast = parser.parse_or()?;
    match parser.peek() {
        None => Ok(ast),
        Some(token) => Err(parser.unexpected(token.clone())),
    }
}

struct Parser<'a> {
    expr: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        match self.advance() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(self.unexpected(token)),
            None => Err(ExpressionError::UnexpectedEnd(self.expr.to_string())),
        }
    }

    fn unexpected(&self, token: Token) -> ExpressionError {
        ExpressionError::UnexpectedToken {
            expr: self.expr.to_string(),
            found: format!("{:?}", token),
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_equality()?;
        while self.eat(&Token::And) {
            let right = self.parse_equality()?;
            left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => BinaryOp::Eq,
                Some(Token::Ne) => BinaryOp::Ne,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_comparison()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.eat(&Token::Not) {
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(&Token::Dot) {
                match self.advance() {
                    Some(Token::Ident(key)) => expr = Expr::Property(Box::new(expr), key),
                    Some(token) => return Err(self.unexpected(token)),
                    None => return Err(ExpressionError::UnexpectedEnd(self.expr.to_string())),
                }
            } else if self.eat(&Token::LBracket) {
                let index = self.parse_or()?;
                self.expect(Token::RBracket)?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Num(n)) => Ok(Expr::Literal(
                serde_json::Number::from_f64(n)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
            )),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                _ if self.eat(&Token::LParen) => {
                    let mut args = Vec::new();
                    if !self.eat(&Token::RParen) {
                        loop {
                            args.push(self.parse_or()?);
                            if self.eat(&Token::RParen) {
                                break;
                            }
                            self.expect(Token::Comma)?;
                        }
                    }
                    Ok(Expr::Call(name, args))
                }
                _ => Ok(Expr::Context(name)),
            },
            Some(token) => Err(self.unexpected(token)),
            None => Err(ExpressionError::UnexpectedEnd(self.expr.to_string())),
        }
    }
}
