//! Built-in Tools
//!
//! Small tools that are useful to any agent and handy for exercising the
//! loop end to end.

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::error::ToolError;
use crate::tool::{ParameterSchema, Tool, ToolRegistry, ToolSchema};

/// Register every built-in tool
pub fn register_builtins(registry: &mut ToolRegistry) {
    registry.register(CalculatorTool);
    registry.register(DateTimeTool);
}

/// DateTime tool - returns current time
#[derive(Clone, Copy, Debug, Default)]
pub struct DateTimeTool;

#[async_trait]
impl Tool for DateTimeTool {
    fn name(&self) -> &str {
        "datetime"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "datetime".into(),
            description: "Get the current date and time (UTC)".into(),
            parameters: vec![
                ParameterSchema::new("format", "string", "Output format: 'iso', 'human', or 'unix'")
                    .with_default(json!("human"))
                    .with_enum(vec![json!("iso"), json!("human"), json!("unix")]),
            ],
        }
    }

    async fn run(&self, args: Map<String, Value>) -> Result<Value, ToolError> {
        let format = args.get("format").and_then(Value::as_str).unwrap_or("human");
        let now = chrono::Utc::now();

        let output = match format {
            "iso" => Value::String(now.to_rfc3339()),
            "unix" => json!(now.timestamp()),
            "human" => Value::String(now.format("%A, %B %d, %Y at %H:%M:%S UTC").to_string()),
            other => return Err(ToolError::failed(format!("unknown format '{other}'"))),
        };

        Ok(output)
    }
}

/// Calculator tool - evaluates arithmetic.
///
/// Accepts either an `expression` (`"(2 + 3) * 4"`) or two operands `a`
/// and `b` with an operator `op`.
#[derive(Clone, Copy, Debug, Default)]
pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "calculator".into(),
            description: "Evaluate arithmetic: an expression, or a and b combined with op".into(),
            parameters: vec![
                ParameterSchema::new(
                    "expression",
                    "string",
                    "Expression to evaluate (e.g., '2 + 2', '(1 + 2) ^ 3')",
                ),
                ParameterSchema::new("a", "number", "Left operand"),
                ParameterSchema::new("b", "number", "Right operand"),
                ParameterSchema::new("op", "string", "Operator applied to a and b")
                    .with_default(json!("+"))
                    .with_enum(vec![json!("+"), json!("-"), json!("*"), json!("/"), json!("^")]),
            ],
        }
    }

    async fn run(&self, args: Map<String, Value>) -> Result<Value, ToolError> {
        let result = if let Some(expr) = args.get("expression").and_then(Value::as_str) {
            evaluate_expression(expr)?
        } else {
            let a = operand(&args, "a")?;
            let b = operand(&args, "b")?;
            let op = args.get("op").and_then(Value::as_str).unwrap_or("+");
            apply(a, op, b)?
        };

        number(result)
    }
}

fn operand(args: &Map<String, Value>, name: &str) -> Result<f64, ToolError> {
    args.get(name).and_then(Value::as_f64).ok_or_else(|| {
        ToolError::invalid_arguments("calculator", format!("expected an expression or number '{name}'"))
    })
}

/// Longest expression the calculator accepts, in bytes
const MAX_EXPRESSION_LEN: usize = 1024;

/// Deepest parenthesis nesting the calculator accepts
const MAX_NESTING: usize = 64;

#[allow(clippy::float_cmp)]
fn apply(left: f64, op: &str, right: f64) -> Result<f64, ToolError> {
    match op {
        "+" => Ok(left + right),
        "-" => Ok(left - right),
        "*" => Ok(left * right),
        "/" if right == 0.0 => Err(ToolError::failed("division by zero")),
        "/" => Ok(left / right),
        "^" => Ok(left.powf(right)),
        other => Err(ToolError::failed(format!("unknown operator '{other}'"))),
    }
}

/// Integral results come back as JSON integers.
#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
fn number(value: f64) -> Result<Value, ToolError> {
    if !value.is_finite() {
        return Err(ToolError::failed("result is not finite"));
    }
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        Ok(json!(value as i64))
    } else {
        Ok(json!(value))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Neg,
    Open,
}

impl Op {
    fn binary(c: u8) -> Option<Self> {
        match c {
            b'+' => Some(Self::Add),
            b'-' => Some(Self::Sub),
            b'*' => Some(Self::Mul),
            b'/' => Some(Self::Div),
            b'^' => Some(Self::Pow),
            _ => None,
        }
    }

    /// Unary minus sits between `* /` and `^`, so `-2^2` is `-(2^2)`.
    const fn precedence(self) -> u8 {
        match self {
            Self::Open => 0,
            Self::Add | Self::Sub => 1,
            Self::Mul | Self::Div => 2,
            Self::Neg => 3,
            Self::Pow => 4,
        }
    }

    const fn right_associative(self) -> bool {
        matches!(self, Self::Pow | Self::Neg)
    }

    /// Whether `self`, on top of the stack, is reduced before pushing `incoming`
    const fn binds_before(self, incoming: Self) -> bool {
        match self {
            Self::Open => false,
            _ => {
                self.precedence() > incoming.precedence()
                    || (self.precedence() == incoming.precedence() && !incoming.right_associative())
            }
        }
    }
}

fn reduce(values: &mut Vec<f64>, op: Op) -> Result<(), ToolError> {
    let malformed = || ToolError::failed("malformed expression");

    if op == Op::Neg {
        let value = values.pop().ok_or_else(malformed)?;
        values.push(-value);
        return Ok(());
    }

    let right = values.pop().ok_or_else(malformed)?;
    let left = values.pop().ok_or_else(malformed)?;
    let symbol = match op {
        Op::Add => "+",
        Op::Sub => "-",
        Op::Mul => "*",
        Op::Div => "/",
        Op::Pow => "^",
        Op::Neg | Op::Open => return Err(malformed()),
    };
    values.push(apply(left, symbol, right)?);
    Ok(())
}

/// End of the number literal starting at `start`, exponent included
fn scan_number(bytes: &[u8], start: usize) -> usize {
    let mut end = start;
    while end < bytes.len() && (bytes[end].is_ascii_digit() || bytes[end] == b'.') {
        end += 1;
    }

    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp = end + 1;
        if exp < bytes.len() && matches!(bytes[exp], b'+' | b'-') {
            exp += 1;
        }
        if exp < bytes.len() && bytes[exp].is_ascii_digit() {
            while exp < bytes.len() && bytes[exp].is_ascii_digit() {
                exp += 1;
            }
            end = exp;
        }
    }
    end
}

/// Operator-precedence evaluator for `+ - * / ^`, unary minus and parentheses
fn evaluate_expression(expr: &str) -> Result<f64, ToolError> {
    if expr.len() > MAX_EXPRESSION_LEN {
        return Err(ToolError::failed(format!(
            "expression longer than {MAX_EXPRESSION_LEN} bytes"
        )));
    }

    let bytes = expr.as_bytes();
    let mut values: Vec<f64> = Vec::new();
    let mut ops: Vec<Op> = Vec::new();
    let mut expect_operand = true;
    let mut depth = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        if expect_operand {
            match c {
                b'0'..=b'9' | b'.' => {
                    let end = scan_number(bytes, i);
                    let literal = &expr[i..end];
                    let value = literal
                        .parse::<f64>()
                        .map_err(|_| ToolError::failed(format!("invalid number '{literal}'")))?;
                    values.push(value);
                    expect_operand = false;
                    i = end;
                    continue;
                }
                b'(' => {
                    depth += 1;
                    if depth > MAX_NESTING {
                        return Err(ToolError::failed(format!(
                            "parentheses nested deeper than {MAX_NESTING}"
                        )));
                    }
                    ops.push(Op::Open);
                }
                b'-' => ops.push(Op::Neg),
                b'+' => {}
                _ => return Err(unexpected(expr, i)),
            }
        } else if c == b')' {
            loop {
                match ops.pop() {
                    Some(Op::Open) => break,
                    Some(op) => reduce(&mut values, op)?,
                    None => return Err(ToolError::failed("unbalanced parentheses")),
                }
            }
            depth -= 1;
        } else if let Some(op) = Op::binary(c) {
            while let Some(&top) = ops.last() {
                if !top.binds_before(op) {
                    break;
                }
                ops.pop();
                reduce(&mut values, top)?;
            }
            ops.push(op);
            expect_operand = true;
        } else if c == b'(' || c == b'.' || c.is_ascii_digit() {
            return Err(ToolError::failed(format!("missing operator at position {i}")));
        } else {
            return Err(unexpected(expr, i));
        }
        i += 1;
    }

    if expect_operand {
        return Err(if values.is_empty() && ops.is_empty() {
            ToolError::failed("empty expression")
        } else {
            ToolError::failed("expression ends with an operator")
        });
    }

    while let Some(op) = ops.pop() {
        if op == Op::Open {
            return Err(ToolError::failed("unbalanced parentheses"));
        }
        reduce(&mut values, op)?;
    }

    match values.as_slice() {
        [value] => Ok(*value),
        _ => Err(ToolError::failed("malformed expression")),
    }
}

fn unexpected(expr: &str, at: usize) -> ToolError {
    let found = expr[at..].chars().next().unwrap_or(' ');
    ToolError::failed(format!("unexpected '{found}' at position {at}"))
}
