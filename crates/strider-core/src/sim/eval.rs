//! Expression evaluator for simulated programs.
//!
//! Integer and boolean expressions over variables and function names:
//!
//! ```text
//! expr  := or
//! or    := and ( "||" and )*
//! and   := cmp ( "&&" cmp )*
//! cmp   := sum ( ("==" | "!=" | "<" | "<=" | ">" | ">=") sum )?
//! sum   := prod ( ("+" | "-") prod )*
//! prod  := unary ( ("*" | "/" | "%") unary )*
//! unary := ("-" | "!") unary | atom
//! atom  := integer | "true" | "false" | name | "(" expr ")"
//! ```

use crate::config::LoadConfig;
use crate::error::{Result, StriderError};
use crate::eval::{EvalContext, Evaluator};
use crate::location::parse_int_literal;
use crate::types::{Value, Variable};

/// [`Evaluator`] used with simulated targets.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimEvaluator;

impl Evaluator for SimEvaluator
{
    fn evaluate(&self, ctx: &dyn EvalContext, expr: &str, _load: &LoadConfig) -> Result<Variable>
    {
        let tokens = tokenize(expr)?;
        if let [Token::Name(name)] = tokens.as_slice() {
            let mut variable = lookup(ctx, name)?;
            variable.name = expr.to_string();
            return Ok(variable);
        }
        let mut parser = Parser { ctx, tokens, pos: 0 };
        let value = parser.or()?;
        if parser.pos != parser.tokens.len() {
            return Err(StriderError::Evaluation(format!("unexpected trailing input in {expr:?}")));
        }
        let type_name = match value {
            Value::Bool(_) => "bool",
            _ => "int",
        };
        Ok(Variable {
            name: expr.to_string(),
            address: None,
            type_name: type_name.to_string(),
            value,
        })
    }
}

fn lookup(ctx: &dyn EvalContext, name: &str) -> Result<Variable>
{
    match ctx.lookup(name) {
        Ok(variable) => Ok(variable),
        Err(StriderError::NotFound(_)) => match ctx.function_named(name) {
            Some(function) => Ok(Variable {
                name: name.to_string(),
                address: None,
                type_name: "func()".to_string(),
                value: Value::Func {
                    entry: function.entry,
                    name: Some(function.name.clone()),
                },
            }),
            None => Err(StriderError::Evaluation(format!("could not find symbol value for {name}"))),
        },
        Err(err) => Err(err),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token
{
    Int(i64),
    Bool(bool),
    Name(String),
    Op(&'static str),
}

const OPERATORS: [&str; 17] = [
    "||", "&&", "==", "!=", "<=", ">=", "<", ">", "+", "-", "*", "/", "%", "!", "(", ")", "&",
];

fn tokenize(expr: &str) -> Result<Vec<Token>>
{
    let mut tokens = Vec::new();
    let mut rest = expr.trim_start();
    while !rest.is_empty() {
        let first = rest.chars().next().unwrap_or_default();
        if first.is_ascii_digit() {
            let end = rest.find(|c: char| !c.is_ascii_alphanumeric()).unwrap_or(rest.len());
            let literal = &rest[..end];
            let value = parse_int_literal(literal)
                .and_then(|v| i64::try_from(v).ok())
                .ok_or_else(|| StriderError::Evaluation(format!("invalid number {literal:?}")))?;
            tokens.push(Token::Int(value));
            rest = &rest[end..];
        } else if first.is_alphabetic() || first == '_' {
            let end = rest
                .find(|c: char| !(c.is_alphanumeric() || matches!(c, '_' | '.' | '/')))
                .unwrap_or(rest.len());
            let name = &rest[..end];
            tokens.push(match name {
                "true" => Token::Bool(true),
                "false" => Token::Bool(false),
                _ => Token::Name(name.to_string()),
            });
            rest = &rest[end..];
        } else if let Some(op) = OPERATORS.iter().find(|op| rest.starts_with(**op)) {
            if *op == "&" {
                return Err(StriderError::Evaluation("address-of is not supported".to_string()));
            }
            tokens.push(Token::Op(*op));
            rest = &rest[op.len()..];
        } else {
            return Err(StriderError::Evaluation(format!("unexpected character {first:?} in {expr:?}")));
        }
        rest = rest.trim_start();
    }
    if tokens.is_empty() {
        return Err(StriderError::Evaluation("empty expression".to_string()));
    }
    Ok(tokens)
}

struct Parser<'a>
{
    ctx: &'a dyn EvalContext,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_>
{
    fn peek_op(&self) -> Option<&'static str>
    {
        match self.tokens.get(self.pos) {
            Some(Token::Op(op)) => Some(*op),
            _ => None,
        }
    }

    fn eat(&mut self, ops: &[&str]) -> Option<&'static str>
    {
        let op = self.peek_op().filter(|op| ops.contains(op))?;
        self.pos += 1;
        Some(op)
    }

    fn or(&mut self) -> Result<Value>
    {
        let mut lhs = self.and()?;
        while self.eat(&["||"]).is_some() {
            let rhs = self.and()?;
            lhs = Value::Bool(as_bool(&lhs)? || as_bool(&rhs)?);
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Value>
    {
        let mut lhs = self.cmp()?;
        while self.eat(&["&&"]).is_some() {
            let rhs = self.cmp()?;
            lhs = Value::Bool(as_bool(&lhs)? && as_bool(&rhs)?);
        }
        Ok(lhs)
    }

    fn cmp(&mut self) -> Result<Value>
    {
        let lhs = self.sum()?;
        let Some(op) = self.eat(&["==", "!=", "<=", ">=", "<", ">"]) else {
            return Ok(lhs);
        };
        let rhs = self.sum()?;
        if let (Value::Bool(l), Value::Bool(r)) = (&lhs, &rhs) {
            return match op {
                "==" => Ok(Value::Bool(l == r)),
                "!=" => Ok(Value::Bool(l != r)),
                _ => Err(StriderError::Evaluation(format!("operator {op} not defined on bool"))),
            };
        }
        let (l, r) = (as_int(&lhs)?, as_int(&rhs)?);
        Ok(Value::Bool(match op {
            "==" => l == r,
            "!=" => l != r,
            "<=" => l <= r,
            ">=" => l >= r,
            "<" => l < r,
            _ => l > r,
        }))
    }

    fn sum(&mut self) -> Result<Value>
    {
        let mut lhs = self.prod()?;
        while let Some(op) = self.eat(&["+", "-"]) {
            let (l, r) = (as_int(&lhs)?, as_int(&self.prod()?)?);
            lhs = Value::Int(if op == "+" {
                l.wrapping_add(r)
            } else {
                l.wrapping_sub(r)
            });
        }
        Ok(lhs)
    }

    fn prod(&mut self) -> Result<Value>
    {
        let mut lhs = self.unary()?;
        while let Some(op) = self.eat(&["*", "/", "%"]) {
            let (l, r) = (as_int(&lhs)?, as_int(&self.unary()?)?);
            lhs = Value::Int(match op {
                "*" => l.wrapping_mul(r),
                _ if r == 0 => return Err(StriderError::Evaluation("division by zero".to_string())),
                "/" => l.wrapping_div(r),
                _ => l.wrapping_rem(r),
            });
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Value>
    {
        match self.eat(&["-", "!"]) {
            Some("-") => Ok(Value::Int(as_int(&self.unary()?)?.wrapping_neg())),
            Some(_) => Ok(Value::Bool(!as_bool(&self.unary()?)?)),
            None => self.atom(),
        }
    }

    fn atom(&mut self) -> Result<Value>
    {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| StriderError::Evaluation("unexpected end of expression".to_string()))?;
        self.pos += 1;
        match token {
            Token::Int(value) => Ok(Value::Int(value)),
            Token::Bool(value) => Ok(Value::Bool(value)),
            Token::Name(name) => Ok(lookup(self.ctx, &name)?.value),
            Token::Op("(") => {
                let value = self.or()?;
                if self.eat(&[")"]).is_none() {
                    return Err(StriderError::Evaluation("missing closing parenthesis".to_string()));
                }
                Ok(value)
            }
            Token::Op(op) => Err(StriderError::Evaluation(format!("unexpected operator {op}"))),
        }
    }
}

fn as_int(value: &Value) -> Result<i64>
{
    match value {
        Value::Bool(_) => Err(StriderError::Evaluation("expected an integer, got a bool".to_string())),
        Value::Unreadable(reason) => Err(StriderError::Evaluation(format!("unreadable value: {reason}"))),
        other => other
            .as_i64()
            .ok_or_else(|| StriderError::Evaluation(format!("{other} does not fit in an int"))),
    }
}

fn as_bool(value: &Value) -> Result<bool>
{
    value
        .as_bool()
        .ok_or_else(|| StriderError::Evaluation(format!("expected a bool, got {value}")))
}

#[cfg(test)]
mod tests
{
    use std::sync::Arc;

    use super::*;
    use crate::types::{Address, Function, Location, StackFrame, FrameStatus};

    struct Fixed
    {
        frame: StackFrame,
    }

    impl Fixed
    {
        fn new() -> Self
        {
            let zero = Address::ZERO;
            Self {
                frame: StackFrame::new(0, None, None, zero, zero, zero, zero, None, Location::from_pc(zero), FrameStatus::Complete),
            }
        }
    }

    impl EvalContext for Fixed
    {
        fn frame(&self) -> &StackFrame
        {
            &self.frame
        }

        fn lookup(&self, name: &str) -> Result<Variable>
        {
            match name {
                "i" => Ok(Variable {
                    name: "i".into(),
                    address: Some(Address::from(0x100)),
                    type_name: "int".into(),
                    value: Value::Int(4),
                }),
                "done" => Ok(Variable {
                    name: "done".into(),
                    address: None,
                    type_name: "bool".into(),
                    value: Value::Bool(false),
                }),
                _ => Err(StriderError::NotFound(name.to_string())),
            }
        }

        fn function_named(&self, name: &str) -> Option<Arc<Function>>
        {
            (name == "main.f").then(|| Arc::new(Function::new("main.f", Address::from(0x40), Address::from(0x80))))
        }
    }

    fn eval(expr: &str) -> Result<Variable>
    {
        SimEvaluator.evaluate(&Fixed::new(), expr, &LoadConfig::default())
    }

    #[test]
    fn test_precedence()
    {
        assert_eq!(eval("1 + 2 * 3").unwrap().value, Value::Int(7));
        assert_eq!(eval("(1 + 2) * 3").unwrap().value, Value::Int(9));
        assert_eq!(eval("i % 2 == 0 && !done").unwrap().value, Value::Bool(true));
    }

    #[test]
    fn test_single_name_keeps_address()
    {
        let var = eval("i").unwrap();
        assert_eq!(var.address, Some(Address::from(0x100)));
        assert_eq!(var.value, Value::Int(4));
    }

    #[test]
    fn test_function_name_value()
    {
        let var = eval("main.f").unwrap();
        assert_eq!(var.type_name, "func()");
        assert_eq!(var.to_string(), "main.f = main.f");
    }

    #[test]
    fn test_errors()
    {
        assert!(eval("nope == 1").is_err());
        assert!(eval("1 / 0").is_err());
        assert!(eval("i +").is_err());
        assert!(eval("done < 1").is_err());
    }
}
