//! Arithmetic expressions used by parameter conversions, such as `x*0.25` or `(x&0x7F)-40`.
//!
//! Grammar, lowest precedence first:
//! ```text
//! expr    = and ('|' and)*
//! and     = shift ('&' shift)*
//! shift   = sum (('<<' | '>>') sum)*
//! sum     = product (('+' | '-') product)*
//! product = unary (('*' | '/' | '%') unary)*
//! unary   = '-' unary | primary
//! primary = number | hex | variable | '(' expr ')'
//! ```
//! All values are `f64`. Bitwise operators and shifts truncate both sides to integers first.

use std::fmt;

/// Expression parse or evaluation failure
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExpressionError {
    /// A character that does not start any token
    #[error("Unexpected character '{character}' at position {position}")]
    UnexpectedCharacter {
        /// Offending character
        character: char,
        /// Byte offset in the expression
        position: usize,
    },
    /// Expression ended where an operand or `)` was needed
    #[error("Unexpected end of expression")]
    UnexpectedEnd,
    /// Tokens left over after a complete expression
    #[error("Unexpected token \"{0}\"")]
    UnexpectedToken(String),
    /// Numeric literal that does not parse
    #[error("Invalid number \"{0}\"")]
    InvalidNumber(String),
    /// Variable with no value bound
    #[error("Unknown variable \"{0}\"")]
    UnknownVariable(String),
    /// Right hand side of `/` or `%` was zero
    #[error("Division by zero")]
    DivisionByZero,
    /// Shift count outside 0..=63
    #[error("Invalid shift count {0}")]
    InvalidShift(i64),
}

/// Expression result
pub type ExprResult<T> = Result<T, ExpressionError>;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(Op),
    Open,
    Close,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Shl,
    Shr,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{n}"),
            Token::Ident(name) => f.write_str(name),
            Token::Op(op) => f.write_str(match op {
                Op::Add => "+",
                Op::Sub => "-",
                Op::Mul => "*",
                Op::Div => "/",
                Op::Rem => "%",
                Op::And => "&",
                Op::Or => "|",
                Op::Shl => "<<",
                Op::Shr => ">>",
            }),
            Token::Open => f.write_str("("),
            Token::Close => f.write_str(")"),
        }
    }
}

fn tokenize(text: &str) -> ExprResult<Vec<Token>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        match c {
            b' ' | b'\t' | b'\r' | b'\n' => i += 1,
            b'0' if matches!(bytes.get(i + 1), Some(b'x' | b'X')) => {
                let start = i + 2;
                let mut end = start;
                while end < bytes.len() && bytes[end].is_ascii_hexdigit() {
                    end += 1;
                }
                let digits = &text[start..end];
                let value = u64::from_str_radix(digits, 16)
                    .map_err(|_| ExpressionError::InvalidNumber(text[i..end].to_string()))?;
                tokens.push(Token::Number(value as f64));
                i = end;
            }
            b'0'..=b'9' | b'.' => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                let literal = &text[start..i];
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| ExpressionError::InvalidNumber(literal.to_string()))?;
                tokens.push(Token::Number(value));
            }
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                tokens.push(Token::Ident(text[start..i].to_string()));
            }
            b'<' | b'>' => {
                if bytes.get(i + 1) != Some(&c) {
                    return Err(ExpressionError::UnexpectedCharacter {
                        character: c as char,
                        position: i,
                    });
                }
                tokens.push(Token::Op(if c == b'<' { Op::Shl } else { Op::Shr }));
                i += 2;
            }
            _ => {
                let token = match c {
                    b'+' => Token::Op(Op::Add),
                    b'-' => Token::Op(Op::Sub),
                    b'*' => Token::Op(Op::Mul),
                    b'/' => Token::Op(Op::Div),
                    b'%' => Token::Op(Op::Rem),
                    b'&' => Token::Op(Op::And),
                    b'|' => Token::Op(Op::Or),
                    b'(' => Token::Open,
                    b')' => Token::Close,
                    _ => {
                        return Err(ExpressionError::UnexpectedCharacter {
                            character: text[i..].chars().next().unwrap_or('?'),
                            position: i,
                        });
                    }
                };
                tokens.push(token);
                i += 1;
            }
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Number(f64),
    Variable(String),
    Negate(Box<Node>),
    Binary(Op, Box<Node>, Box<Node>),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek_op(&self, ops: &[Op]) -> Option<Op> {
        match self.tokens.get(self.pos) {
            Some(Token::Op(op)) if ops.contains(op) => Some(*op),
            _ => None,
        }
    }

    /// One left associative precedence level
    fn binary(&mut self, ops: &[Op], next: fn(&mut Self) -> ExprResult<Node>) -> ExprResult<Node> {
        let mut lhs = next(self)?;
        while let Some(op) = self.peek_op(ops) {
            self.pos += 1;
            let rhs = next(self)?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn expr(&mut self) -> ExprResult<Node> {
        self.binary(&[Op::Or], Self::and)
    }

    fn and(&mut self) -> ExprResult<Node> {
        self.binary(&[Op::And], Self::shift)
    }

    fn shift(&mut self) -> ExprResult<Node> {
        self.binary(&[Op::Shl, Op::Shr], Self::sum)
    }

    fn sum(&mut self) -> ExprResult<Node> {
        self.binary(&[Op::Add, Op::Sub], Self::product)
    }

    fn product(&mut self) -> ExprResult<Node> {
        self.binary(&[Op::Mul, Op::Div, Op::Rem], Self::unary)
    }

    fn unary(&mut self) -> ExprResult<Node> {
        if self.peek_op(&[Op::Sub]).is_some() {
            self.pos += 1;
            return Ok(Node::Negate(Box::new(self.unary()?)));
        }
        if self.peek_op(&[Op::Add]).is_some() {
            self.pos += 1;
            return self.unary();
        }
        self.primary()
    }

    fn primary(&mut self) -> ExprResult<Node> {
        let token = self.tokens.get(self.pos).cloned().ok_or(ExpressionError::UnexpectedEnd)?;
        self.pos += 1;
        match token {
            Token::Number(n) => Ok(Node::Number(n)),
            Token::Ident(name) => Ok(Node::Variable(name)),
            Token::Open => {
                let inner = self.expr()?;
                match self.tokens.get(self.pos) {
                    Some(Token::Close) => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    Some(other) => Err(ExpressionError::UnexpectedToken(other.to_string())),
                    None => Err(ExpressionError::UnexpectedEnd),
                }
            }
            other => Err(ExpressionError::UnexpectedToken(other.to_string())),
        }
    }
}

/// A parsed expression, ready to be evaluated any number of times
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    text: String,
    root: Node,
}

impl Expression {
    /// Parses `text`
    pub fn parse(text: &str) -> ExprResult<Self> {
        let mut parser = Parser {
            tokens: tokenize(text)?,
            pos: 0,
        };
        let root = parser.expr()?;
        if let Some(extra) = parser.tokens.get(parser.pos) {
            return Err(ExpressionError::UnexpectedToken(extra.to_string()));
        }
        Ok(Self {
            text: text.to_string(),
            root,
        })
    }

    /// Text the expression was parsed from
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Evaluates with the given variable bindings
    pub fn evaluate(&self, variables: &[(&str, f64)]) -> ExprResult<f64> {
        eval(&self.root, variables)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Parses and evaluates `text` in one step
pub fn evaluate(text: &str, variables: &[(&str, f64)]) -> ExprResult<f64> {
    Expression::parse(text)?.evaluate(variables)
}

fn eval(node: &Node, variables: &[(&str, f64)]) -> ExprResult<f64> {
    match node {
        Node::Number(n) => Ok(*n),
        Node::Variable(name) => variables
            .iter()
            .find(|(var, _)| var == name)
            .map(|(_, value)| *value)
            .ok_or_else(|| ExpressionError::UnknownVariable(name.clone())),
        Node::Negate(inner) => Ok(-eval(inner, variables)?),
        Node::Binary(op, lhs, rhs) => {
            let lhs = eval(lhs, variables)?;
            let rhs = eval(rhs, variables)?;
            match op {
                Op::Add => Ok(lhs + rhs),
                Op::Sub => Ok(lhs - rhs),
                Op::Mul => Ok(lhs * rhs),
                Op::Div | Op::Rem if rhs == 0.0 => Err(ExpressionError::DivisionByZero),
                Op::Div => Ok(lhs / rhs),
                Op::Rem => Ok(lhs % rhs),
                Op::And => Ok(((lhs as i64) & (rhs as i64)) as f64),
                Op::Or => Ok(((lhs as i64) | (rhs as i64)) as f64),
                Op::Shl | Op::Shr => {
                    let count = rhs as i64;
                    if !(0..64).contains(&count) {
                        return Err(ExpressionError::InvalidShift(count));
                    }
                    let value = lhs as i64;
                    let shifted = if *op == Op::Shl { value << count } else { value >> count };
                    Ok(shifted as f64)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_x(text: &str, x: f64) -> f64 {
        evaluate(text, &[("x", x)]).unwrap()
    }

    #[test]
    fn arithmetic_precedence() {
        assert_eq!(eval_x("x*0.25", 400.0), 100.0);
        assert_eq!(eval_x("x-40", 100.0), 60.0);
        assert_eq!(eval_x("(x-40)*1.8+32", 100.0), 140.0);
        assert_eq!(eval_x("2+3*4", 0.0), 14.0);
        assert_eq!(eval_x("-x+1", 3.0), -2.0);
        assert_eq!(eval_x("x%16", 35.0), 3.0);
        assert_eq!(eval_x("x/2/2", 16.0), 4.0);
    }

    #[test]
    fn bitwise_operators() {
        assert_eq!(eval_x("x&0x0F", 0x5A as f64), 0x0A as f64);
        assert_eq!(eval_x("x|1", 4.0), 5.0);
        assert_eq!(eval_x("x>>4", 0xF0 as f64), 15.0);
        assert_eq!(eval_x("1<<x", 3.0), 8.0);
        // Shift binds looser than addition
        assert_eq!(eval_x("x>>1+1", 16.0), 4.0);
    }

    #[test]
    fn multiple_variables() {
        let expr = Expression::parse("x_high*256+x_low").unwrap();
        assert_eq!(expr.evaluate(&[("x_high", 1.0), ("x_low", 2.0)]).unwrap(), 258.0);
        assert_eq!(expr.text(), "x_high*256+x_low");
    }

    #[test]
    fn errors() {
        assert_eq!(evaluate("x/0", &[("x", 1.0)]), Err(ExpressionError::DivisionByZero));
        assert_eq!(evaluate("y", &[("x", 1.0)]), Err(ExpressionError::UnknownVariable("y".into())));
        assert_eq!(evaluate("x+", &[("x", 1.0)]), Err(ExpressionError::UnexpectedEnd));
        assert_eq!(evaluate("(x", &[("x", 1.0)]), Err(ExpressionError::UnexpectedEnd));
        assert!(matches!(
            evaluate("x $ 2", &[("x", 1.0)]),
            Err(ExpressionError::UnexpectedCharacter { character: '$', position: 2 })
        ));
        assert!(matches!(evaluate("x 2", &[("x", 1.0)]), Err(ExpressionError::UnexpectedToken(_))));
        assert!(matches!(evaluate("1.2.3", &[]), Err(ExpressionError::InvalidNumber(_))));
    }
}
