//! Expression evaluation.
//!
//! Expressions are plain text. [`evaluate`] classifies the text before
//! parsing it:
//!
//! 1. a boolean literal,
//! 2. anything containing `&&` or `||` (logical path),
//! 3. anything containing a comparison operator (comparison path),
//! 4. everything else (arithmetic path).
//!
//! Precedence falls out of that order: `||` binds loosest, then `&&`, then
//! comparisons, then `+ -`, then `* /`, then unary minus. Text inside
//! double quotes is a string literal and is never scanned for operators.

use crate::env::Scope;
use crate::error::Error;
use crate::value::Value;

/// Comparison operators, two-character forms first so `<` never matches
/// the front of `<=`.
const COMPARISON_OPS: [&str; 6] = ["==", "!=", "<=", ">=", "<", ">"];

/// Evaluate `text` against `scope`.
pub fn evaluate(text: &str, scope: &dyn Scope) -> Result<Value, Error> {
    let text = strip_outer_parens(text.trim());
    if text.is_empty() {
        return Err(Error::Syntax("empty expression".into()));
    }
    if let Some(b) = bool_literal(text) {
        return Ok(Value::Bool(b));
    }
    if contains_unquoted(text, "&&") || contains_unquoted(text, "||") {
        return evaluate_logical(text, scope).map(Value::Bool);
    }
    if COMPARISON_OPS.iter().any(|op| contains_unquoted(text, op)) {
        return evaluate_comparison(text, scope);
    }
    evaluate_arithmetic(text, scope)
}

/// Evaluate `text` as a branch or loop condition. Anything that does not
/// produce a boolean is a condition without an operator.
pub fn evaluate_condition(text: &str, scope: &dyn Scope) -> Result<bool, Error> {
    match evaluate(text, scope)? {
        Value::Bool(b) => Ok(b),
        other => Err(Error::Syntax(format!(
            "condition '{}' has no comparison or logical operator (evaluated to {})",
            text.trim(),
            other.data_type()
        ))),
    }
}

fn bool_literal(text: &str) -> Option<bool> {
    if text.eq_ignore_ascii_case("true") {
        Some(true)
    } else if text.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Scanning helpers
// ---------------------------------------------------------------------------

/// Every byte of `text` outside string literals, with its parenthesis depth.
/// An opening or closing parenthesis reports the depth outside it.
fn unquoted(text: &str) -> Vec<(usize, u8, i32)> {
    let mut out = Vec::with_capacity(text.len());
    let mut depth = 0i32;
    let mut in_quotes = false;
    for (i, b) in text.bytes().enumerate() {
        if b == b'"' {
            in_quotes = !in_quotes;
            continue;
        }
        // Only ASCII bytes matter, and skipping the rest keeps every
        // reported index on a char boundary.
        if in_quotes || !b.is_ascii() {
            continue;
        }
        match b {
            b'(' => {
                out.push((i, b, depth));
                depth += 1;
            }
            b')' => {
                depth -= 1;
                out.push((i, b, depth));
            }
            _ => out.push((i, b, depth)),
        }
    }
    out
}

fn contains_unquoted(text: &str, pat: &str) -> bool {
    unquoted(text)
        .iter()
        .any(|&(i, _, _)| text[i..].starts_with(pat))
}

/// Index of the `)` matching the `(` at `open`.
fn matching_close(text: &str, open: usize) -> Option<usize> {
    let scan = unquoted(text);
    let depth = scan.iter().find(|&&(i, _, _)| i == open)?.2;
    scan.iter()
        .find(|&&(i, b, d)| i > open && b == b')' && d == depth)
        .map(|&(i, _, _)| i)
}

/// Drop parentheses that wrap the whole expression.
fn strip_outer_parens(mut text: &str) -> &str {
    while text.starts_with('(') && matching_close(text, 0) == Some(text.len() - 1) {
        text = text[1..text.len() - 1].trim();
    }
    text
}

/// An expression whose parenthesized groups have been evaluated.
///
/// Each group is replaced in `text` by a `$<n>` slot reference and its value
/// is kept in `values[n]`, so values never round-trip through source text.
#[derive(Debug)]
struct Grouped {
    text: String,
    values: Vec<Value>,
}

impl Grouped {
    fn scope<'a>(&'a self, inner: &'a dyn Scope) -> GroupScope<'a> {
        GroupScope {
            values: &self.values,
            inner,
        }
    }
}

/// Resolves `$<n>` slot references, deferring everything else (including
/// slots of an enclosing expression) to `inner`.
struct GroupScope<'a> {
    values: &'a [Value],
    inner: &'a dyn Scope,
}

impl Scope for GroupScope<'_> {
    fn get(&self, name: &str) -> Option<Value> {
        name.strip_prefix('$')
            .and_then(|n| n.parse::<usize>().ok())
            .and_then(|slot| self.values.get(slot).cloned())
            .or_else(|| self.inner.get(name))
    }

    fn set(&mut self, name: &str, _value: Value) -> Result<(), Error> {
        Err(Error::Syntax(format!(
            "cannot assign '{}' inside an expression",
            name
        )))
    }
}

/// Evaluate parenthesized groups innermost first until no parentheses
/// remain. The innermost group never contains parentheses, so evaluating it
/// never allocates slots of its own.
fn resolve_groups(text: &str, scope: &dyn Scope) -> Result<Grouped, Error> {
    let mut grouped = Grouped {
        text: text.to_string(),
        values: Vec::new(),
    };
    loop {
        let scan = unquoted(&grouped.text);
        if scan.iter().any(|&(_, b, d)| b == b')' && d < 0) {
            return Err(Error::Syntax(format!("unbalanced ')' in '{}'", text)));
        }
        let Some(&(open, _, _)) = scan.iter().rev().find(|&&(_, b, _)| b == b'(') else {
            return Ok(grouped);
        };
        let close = matching_close(&grouped.text, open)
            .ok_or_else(|| Error::Syntax(format!("unbalanced '(' in '{}'", text)))?;
        let value = evaluate(&grouped.text[open + 1..close], &grouped.scope(scope))?;
        let slot = format!(" ${} ", grouped.values.len());
        grouped.values.push(value);
        grouped.text.replace_range(open..=close, &slot);
    }
}

// ---------------------------------------------------------------------------
// Logical path
// ---------------------------------------------------------------------------

fn evaluate_logical(text: &str, scope: &dyn Scope) -> Result<bool, Error> {
    let grouped = resolve_groups(text, scope)?;
    let flat = grouped.text.as_str();
    let scope = &grouped.scope(scope);

    let mut operands = Vec::new();
    let mut operators = Vec::new();
    let mut start = 0;
    let mut skip_to = 0;
    for (i, _, _) in unquoted(flat) {
        if i < skip_to {
            continue;
        }
        let rest = &flat[i..];
        if rest.starts_with("&&") || rest.starts_with("||") {
            operands.push(flat[start..i].trim());
            operators.push(&rest[..2]);
            start = i + 2;
            skip_to = i + 2;
        }
    }
    operands.push(flat[start..].trim());

    if let Some(pos) = operands.iter().position(|o| o.is_empty()) {
        let side = if pos == 0 { "before" } else { "after" };
        let op = operators.get(pos.saturating_sub(1)).copied().unwrap_or("&&");
        return Err(Error::Syntax(format!(
            "missing operand {} '{}' in '{}'",
            side, op, text
        )));
    }

    // Every operand is evaluated; there is no short-circuit.
    let mut values = operands
        .iter()
        .map(|o| evaluate_condition(o, scope))
        .collect::<Result<Vec<bool>, Error>>()?
        .into_iter();

    // `&&` binds tighter: AND each run between `||`s, then OR the runs.
    let mut result = false;
    let mut run = values.next().unwrap_or(false);
    for (op, value) in operators.iter().zip(values) {
        if *op == "&&" {
            run = run && value;
        } else {
            result = result || run;
            run = value;
        }
    }
    Ok(result || run)
}

// ---------------------------------------------------------------------------
// Comparison path
// ---------------------------------------------------------------------------

fn evaluate_comparison(text: &str, scope: &dyn Scope) -> Result<Value, Error> {
    let mut found = Vec::new();
    let mut skip_to = 0;
    for (i, b, depth) in unquoted(text) {
        if depth < 0 {
            return Err(Error::Syntax(format!("unbalanced ')' in '{}'", text)));
        }
        if i < skip_to || depth > 0 || b == b'(' || b == b')' {
            continue;
        }
        if let Some(op) = COMPARISON_OPS.iter().find(|op| text[i..].starts_with(**op)) {
            found.push((i, *op));
            skip_to = i + op.len();
        }
    }

    match found.as_slice() {
        // Only nested comparisons, e.g. `(a < b) + 1`.
        [] => {
            let grouped = resolve_groups(text, scope)?;
            evaluate(&grouped.text, &grouped.scope(scope))
        }
        [(pos, op)] => {
            let left = text[..*pos].trim();
            let right = text[pos + op.len()..].trim();
            if left.is_empty() || right.is_empty() {
                return Err(Error::Syntax(format!(
                    "missing operand for '{}' in '{}'",
                    op, text
                )));
            }
            let left = evaluate(left, scope)?;
            let right = evaluate(right, scope)?;
            compare(op, &left, &right).map(Value::Bool)
        }
        _ => Err(Error::Syntax(format!(
            "more than one comparison operator in '{}'",
            text
        ))),
    }
}

fn compare(op: &str, left: &Value, right: &Value) -> Result<bool, Error> {
    let mismatch = || Error::TypeMismatch {
        op: op.to_string(),
        left: left.data_type(),
        right: right.data_type(),
    };

    if left.is_numeric() && right.is_numeric() {
        let ordering = match (left, right) {
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            _ => left.as_double()?.partial_cmp(&right.as_double()?),
        };
        return Ok(match op {
            "==" => ordering == Some(std::cmp::Ordering::Equal),
            "!=" => ordering != Some(std::cmp::Ordering::Equal),
            "<" => ordering == Some(std::cmp::Ordering::Less),
            "<=" => matches!(
                ordering,
                Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
            ),
            ">" => ordering == Some(std::cmp::Ordering::Greater),
            ">=" => matches!(
                ordering,
                Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
            ),
            _ => return Err(mismatch()),
        });
    }

    // Bool/Bool and String/String compare payloads; any other mix falls
    // back to comparing textual forms. Only equality is defined for them.
    let equal = match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => a == b,
        _ => left.to_string() == right.to_string(),
    };
    match op {
        "==" => Ok(equal),
        "!=" => Ok(!equal),
        _ => Err(mismatch()),
    }
}

// ---------------------------------------------------------------------------
// Arithmetic path
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    /// Unary minus.
    Neg,
}

impl ArithOp {
    fn precedence(self) -> u8 {
        match self {
            ArithOp::Add | ArithOp::Sub => 1,
            ArithOp::Mul | ArithOp::Div => 2,
            ArithOp::Neg => 3,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub | ArithOp::Neg => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Operand(Value),
    Op(ArithOp),
    LParen,
    RParen,
}

fn evaluate_arithmetic(text: &str, scope: &dyn Scope) -> Result<Value, Error> {
    let tokens = tokenize(text, scope)?;
    let rpn = to_rpn(tokens)?;
    eval_rpn(rpn)
}

/// Split `text` into operands and operators, resolving identifiers against
/// `scope` as they are met.
fn tokenize(text: &str, scope: &dyn Scope) -> Result<Vec<Token>, Error> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut end = start;
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        end = i + d.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Operand(parse_number(&text[start..end])?));
            }
            '$' => {
                chars.next();
                let mut end = start + 1;
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_ascii_digit() {
                        end = i + 1;
                        chars.next();
                    } else {
                        break;
                    }
                }
                let slot = &text[start..end];
                let value = scope
                    .get(slot)
                    .ok_or_else(|| Error::UnknownToken(slot.to_string()))?;
                tokens.push(Token::Operand(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut end = start;
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_alphanumeric() || d == '_' {
                        end = i + d.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let word = &text[start..end];
                let value = match bool_literal(word) {
                    Some(b) => Value::Bool(b),
                    None => scope
                        .get(word)
                        .ok_or_else(|| Error::UnknownToken(word.to_string()))?,
                };
                tokens.push(Token::Operand(value));
            }
            '"' => {
                chars.next();
                let body_start = start + 1;
                let mut closed = None;
                for (i, d) in chars.by_ref() {
                    if d == '"' {
                        closed = Some(i);
                        break;
                    }
                }
                let end = closed.ok_or_else(|| {
                    Error::Syntax(format!("unterminated string literal in '{}'", text))
                })?;
                tokens.push(Token::Operand(Value::Str(text[body_start..end].to_string())));
            }
            '+' | '-' | '*' | '/' => {
                chars.next();
                let prefix = matches!(tokens.last(), None | Some(Token::Op(_)) | Some(Token::LParen));
                let op = match c {
                    '+' => ArithOp::Add,
                    '-' if prefix => ArithOp::Neg,
                    '-' => ArithOp::Sub,
                    '*' => ArithOp::Mul,
                    _ => ArithOp::Div,
                };
                tokens.push(Token::Op(op));
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            other => return Err(Error::UnknownToken(other.to_string())),
        }
    }

    Ok(tokens)
}

fn parse_number(lexeme: &str) -> Result<Value, Error> {
    if !lexeme.contains('.') {
        if let Ok(n) = lexeme.parse::<i64>() {
            return Ok(Value::Int(n));
        }
    }
    lexeme
        .parse::<f64>()
        .map(Value::Double)
        .map_err(|_| Error::UnknownToken(lexeme.to_string()))
}

/// Shunting-yard conversion to reverse Polish order.
fn to_rpn(tokens: Vec<Token>) -> Result<Vec<Token>, Error> {
    let mut output = Vec::with_capacity(tokens.len());
    let mut stack: Vec<Token> = Vec::new();

    for token in tokens {
        match token {
            Token::Operand(_) => output.push(token),
            Token::Op(ArithOp::Neg) => stack.push(token),
            Token::Op(op) => {
                while let Some(Token::Op(top)) = stack.last() {
                    if top.precedence() >= op.precedence() {
                        output.extend(stack.pop());
                    } else {
                        break;
                    }
                }
                stack.push(Token::Op(op));
            }
            Token::LParen => stack.push(token),
            Token::RParen => loop {
                match stack.pop() {
                    Some(Token::LParen) => break,
                    Some(t) => output.push(t),
                    None => return Err(Error::Syntax("unbalanced ')'".into())),
                }
            },
        }
    }

    while let Some(token) = stack.pop() {
        if token == Token::LParen {
            return Err(Error::Syntax("unbalanced '('".into()));
        }
        output.push(token);
    }
    Ok(output)
}

fn eval_rpn(rpn: Vec<Token>) -> Result<Value, Error> {
    let underflow = |op: ArithOp| Error::Syntax(format!("missing operand for '{}'", op.symbol()));
    let mut stack: Vec<Value> = Vec::new();

    for token in rpn {
        match token {
            Token::Operand(value) => stack.push(value),
            Token::Op(ArithOp::Neg) => {
                let a = stack.pop().ok_or_else(|| underflow(ArithOp::Neg))?;
                stack.push(negate(a)?);
            }
            Token::Op(op) => {
                let b = stack.pop().ok_or_else(|| underflow(op))?;
                let a = stack.pop().ok_or_else(|| underflow(op))?;
                stack.push(apply(op, a, b)?);
            }
            Token::LParen | Token::RParen => {
                return Err(Error::Syntax("stray parenthesis".into()));
            }
        }
    }

    let result = stack
        .pop()
        .ok_or_else(|| Error::Syntax("empty expression".into()))?;
    if !stack.is_empty() {
        return Err(Error::Syntax("missing operator between operands".into()));
    }
    Ok(result)
}

fn negate(value: Value) -> Result<Value, Error> {
    match value {
        Value::Int(n) => n
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| Error::Arithmetic(format!("-{} overflows", n))),
        other => Ok(Value::Double(-other.as_double()?)),
    }
}

/// Two ints stay int (division truncates toward zero); anything else is
/// computed in doubles.
fn apply(op: ArithOp, a: Value, b: Value) -> Result<Value, Error> {
    if let (Value::Int(x), Value::Int(y)) = (&a, &b) {
        let (x, y) = (*x, *y);
        let result = match op {
            ArithOp::Add => x.checked_add(y),
            ArithOp::Sub => x.checked_sub(y),
            ArithOp::Mul => x.checked_mul(y),
            ArithOp::Div if y == 0 => {
                return Err(Error::Arithmetic("division by zero".into()));
            }
            ArithOp::Div => x.checked_div(y),
            ArithOp::Neg => None,
        };
        return result
            .map(Value::Int)
            .ok_or_else(|| Error::Arithmetic(format!("{} {} {} overflows", x, op.symbol(), y)));
    }

    let (x, y) = (a.as_double()?, b.as_double()?);
    let result = match op {
        ArithOp::Add => x + y,
        ArithOp::Sub => x - y,
        ArithOp::Mul => x * y,
        ArithOp::Div => x / y,
        ArithOp::Neg => -y,
    };
    Ok(Value::Double(result))
}
