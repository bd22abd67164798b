//! Whitelisted condition-expression grammar.
//!
//! A deliberately small language for custom conditions: comparisons,
//! boolean connectives, literals and exactly one free variable named
//! `value` (the candidate being tested). There is no ambient scope, no
//! function calls and no side effects.
//!
//! ```text
//! expr  := or
//! or    := and ("||" and)*
//! and   := unary ("&&" unary)*
//! unary := "!" unary | cmp
//! cmp   := term (("==" | "!=" | "<" | "<=" | ">" | ">=") term)?
//! term  := number | string | "true" | "false" | "null" | "value" | "(" expr ")"
//! ```

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ExprError {
  #[error("unexpected character '{0}' at offset {1}")]
  UnexpectedChar(char, usize),
  #[error("unterminated string literal")]
  UnterminatedString,
  #[error("unexpected token '{0}'")]
  UnexpectedToken(String),
  #[error("unexpected end of expression")]
  UnexpectedEnd,
  #[error("trailing input after expression: '{0}'")]
  TrailingInput(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
  Number(f64),
  Str(String),
  True,
  False,
  Null,
  Value,
  Not,
  And,
  Or,
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
  LParen,
  RParen,
}

#[derive(Debug, Clone, PartialEq)]
enum Ast {
  Number(f64),
  Str(String),
  Bool(bool),
  Null,
  Value,
  Not(Box<Ast>),
  And(Box<Ast>, Box<Ast>),
  Or(Box<Ast>, Box<Ast>),
  Cmp(CmpOp, Box<Ast>, Box<Ast>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CmpOp {
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
}

/// A parsed, reusable condition expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
  ast: Ast,
}

impl Expr {
  /// Parse an expression, rejecting anything outside the grammar.
  pub fn parse(input: &str) -> Result<Self, ExprError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let ast = parser.or_expr()?;
    if parser.pos < parser.tokens.len() {
      return Err(ExprError::TrailingInput(format!(
        "{:?}",
        parser.tokens[parser.pos]
      )));
    }
    Ok(Self { ast })
  }

  /// Evaluate against the single candidate value.
  pub fn eval(&self, value: &serde_json::Value) -> bool {
    truthy(&eval_ast(&self.ast, value))
  }
}

/// Intermediate evaluation value.
#[derive(Debug, Clone, PartialEq)]
enum Val {
  Number(f64),
  Str(String),
  Bool(bool),
  Null,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExprError> {
  let chars: Vec<char> = input.chars().collect();
  let mut tokens = Vec::new();
  let mut i = 0;

  while i < chars.len() {
    let c = chars[i];
    match c {
      ' ' | '\t' | '\n' | '\r' => i += 1,
      '(' => {
        tokens.push(Token::LParen);
        i += 1;
      }
      ')' => {
        tokens.push(Token::RParen);
        i += 1;
      }
      '!' => {
        if chars.get(i + 1) == Some(&'=') {
          tokens.push(Token::Ne);
          i += 2;
        } else {
          tokens.push(Token::Not);
          i += 1;
        }
      }
      '=' => {
        if chars.get(i + 1) == Some(&'=') {
          tokens.push(Token::Eq);
          i += 2;
        } else {
          return Err(ExprError::UnexpectedChar('=', i));
        }
      }
      '<' => {
        if chars.get(i + 1) == Some(&'=') {
          tokens.push(Token::Le);
          i += 2;
        } else {
          tokens.push(Token::Lt);
          i += 1;
        }
      }
      '>' => {
        if chars.get(i + 1) == Some(&'=') {
          tokens.push(Token::Ge);
          i += 2;
        } else {
          tokens.push(Token::Gt);
          i += 1;
        }
      }
      '&' => {
        if chars.get(i + 1) == Some(&'&') {
          tokens.push(Token::And);
          i += 2;
        } else {
          return Err(ExprError::UnexpectedChar('&', i));
        }
      }
      '|' => {
        if chars.get(i + 1) == Some(&'|') {
          tokens.push(Token::Or);
          i += 2;
        } else {
          return Err(ExprError::UnexpectedChar('|', i));
        }
      }
      '\'' | '"' => {
        let quote = c;
        let mut s = String::new();
        i += 1;
        loop {
          match chars.get(i) {
            Some(&ch) if ch == quote => {
              i += 1;
              break;
            }
            Some(&ch) => {
              s.push(ch);
              i += 1;
            }
            None => return Err(ExprError::UnterminatedString),
          }
        }
        tokens.push(Token::Str(s));
      }
      '0'..='9' | '-' | '.' => {
        let start = i;
        if c == '-' {
          i += 1;
        }
        while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
          i += 1;
        }
        let text: String = chars[start..i].iter().collect();
        let number = text
          .parse::<f64>()
          .map_err(|_| ExprError::UnexpectedToken(text.clone()))?;
        tokens.push(Token::Number(number));
      }
      _ if c.is_ascii_alphabetic() || c == '_' => {
        let start = i;
        while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
          i += 1;
        }
        let word: String = chars[start..i].iter().collect();
        match word.as_str() {
          "true" => tokens.push(Token::True),
          "false" => tokens.push(Token::False),
          "null" => tokens.push(Token::Null),
          "value" => tokens.push(Token::Value),
          other => return Err(ExprError::UnexpectedToken(other.to_string())),
        }
      }
      other => return Err(ExprError::UnexpectedChar(other, i)),
    }
  }

  Ok(tokens)
}

struct Parser {
  tokens: Vec<Token>,
  pos: usize,
}

impl Parser {
  fn peek(&self) -> Option<&Token> {
    self.tokens.get(self.pos)
  }

  fn next(&mut self) -> Result<Token, ExprError> {
    let token = self.tokens.get(self.pos).cloned().ok_or(ExprError::UnexpectedEnd)?;
    self.pos += 1;
    Ok(token)
  }

  fn or_expr(&mut self) -> Result<Ast, ExprError> {
    let mut left = self.and_expr()?;
    while self.peek() == Some(&Token::Or) {
      self.pos += 1;
      let right = self.and_expr()?;
      left = Ast::Or(Box::new(left), Box::new(right));
    }
    Ok(left)
  }

  fn and_expr(&mut self) -> Result<Ast, ExprError> {
    let mut left = self.unary()?;
    while self.peek() == Some(&Token::And) {
      self.pos += 1;
      let right = self.unary()?;
      left = Ast::And(Box::new(left), Box::new(right));
    }
    Ok(left)
  }

  fn unary(&mut self) -> Result<Ast, ExprError> {
    if self.peek() == Some(&Token::Not) {
      self.pos += 1;
      let inner = self.unary()?;
      return Ok(Ast::Not(Box::new(inner)));
    }
    self.comparison()
  }

  fn comparison(&mut self) -> Result<Ast, ExprError> {
    let left = self.term()?;
    let op = match self.peek() {
      Some(Token::Eq) => CmpOp::Eq,
      Some(Token::Ne) => CmpOp::Ne,
      Some(Token::Lt) => CmpOp::Lt,
      Some(Token::Le) => CmpOp::Le,
      Some(Token::Gt) => CmpOp::Gt,
      Some(Token::Ge) => CmpOp::Ge,
      _ => return Ok(left),
    };
    self.pos += 1;
    let right = self.term()?;
    Ok(Ast::Cmp(op, Box::new(left), Box::new(right)))
  }

  fn term(&mut self) -> Result<Ast, ExprError> {
    match self.next()? {
      Token::Number(n) => Ok(Ast::Number(n)),
      Token::Str(s) => Ok(Ast::Str(s)),
      Token::True => Ok(Ast::Bool(true)),
      Token::False => Ok(Ast::Bool(false)),
      Token::Null => Ok(Ast::Null),
      Token::Value => Ok(Ast::Value),
      Token::LParen => {
        let inner = self.or_expr()?;
        match self.next()? {
          Token::RParen => Ok(inner),
          other => Err(ExprError::UnexpectedToken(format!("{:?}", other))),
        }
      }
      other => Err(ExprError::UnexpectedToken(format!("{:?}", other))),
    }
  }
}

fn eval_ast(ast: &Ast, value: &serde_json::Value) -> Val {
  match ast {
    Ast::Number(n) => Val::Number(*n),
    Ast::Str(s) => Val::Str(s.clone()),
    Ast::Bool(b) => Val::Bool(*b),
    Ast::Null => Val::Null,
    Ast::Value => from_json(value),
    Ast::Not(inner) => Val::Bool(!truthy(&eval_ast(inner, value))),
    Ast::And(l, r) => Val::Bool(truthy(&eval_ast(l, value)) && truthy(&eval_ast(r, value))),
    Ast::Or(l, r) => Val::Bool(truthy(&eval_ast(l, value)) || truthy(&eval_ast(r, value))),
    Ast::Cmp(op, l, r) => Val::Bool(compare(*op, &eval_ast(l, value), &eval_ast(r, value))),
  }
}

fn from_json(value: &serde_json::Value) -> Val {
  match value {
    serde_json::Value::Null => Val::Null,
    serde_json::Value::Bool(b) => Val::Bool(*b),
    serde_json::Value::Number(n) => Val::Number(n.as_f64().unwrap_or(f64::NAN)),
    serde_json::Value::String(s) => Val::Str(s.clone()),
    // Containers participate as their display string; ordering
    // comparisons on them are meaningless and evaluate false.
    other => Val::Str(other.to_string()),
  }
}

fn truthy(val: &Val) -> bool {
  match val {
    Val::Bool(b) => *b,
    Val::Number(n) => *n != 0.0 && !n.is_nan(),
    Val::Str(s) => !s.is_empty(),
    Val::Null => false,
  }
}

fn compare(op: CmpOp, left: &Val, right: &Val) -> bool {
  match op {
    CmpOp::Eq => val_eq(left, right),
    CmpOp::Ne => !val_eq(left, right),
    CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
      let (Some(l), Some(r)) = (as_number(left), as_number(right)) else {
        return false;
      };
      match op {
        CmpOp::Lt => l < r,
        CmpOp::Le => l <= r,
        CmpOp::Gt => l > r,
        CmpOp::Ge => l >= r,
        _ => unreachable!(),
      }
    }
  }
}

fn val_eq(left: &Val, right: &Val) -> bool {
  match (left, right) {
    (Val::Number(l), Val::Number(r)) => l == r,
    (Val::Str(l), Val::Str(r)) => l == r,
    (Val::Bool(l), Val::Bool(r)) => l == r,
    (Val::Null, Val::Null) => true,
    // Mixed number/string comparisons coerce the string.
    (Val::Number(n), Val::Str(s)) | (Val::Str(s), Val::Number(n)) => {
      s.parse::<f64>().is_ok_and(|parsed| parsed == *n)
    }
    _ => false,
  }
}

fn as_number(val: &Val) -> Option<f64> {
  match val {
    Val::Number(n) => Some(*n),
    Val::Str(s) => s.parse().ok(),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_numeric_comparison() {
    let expr = Expr::parse("value > 3").unwrap();
    assert!(expr.eval(&json!(5)));
    assert!(!expr.eval(&json!(2)));
  }

  #[test]
  fn test_boolean_connectives() {
    let expr = Expr::parse("value >= 1 && value <= 10").unwrap();
    assert!(expr.eval(&json!(5)));
    assert!(!expr.eval(&json!(11)));

    let expr = Expr::parse("value == 'yes' || value == 'y'").unwrap();
    assert!(expr.eval(&json!("y")));
    assert!(!expr.eval(&json!("no")));
  }

  #[test]
  fn test_negation_and_parens() {
    let expr = Expr::parse("!(value == null)").unwrap();
    assert!(expr.eval(&json!("anything")));
    assert!(!expr.eval(&serde_json::Value::Null));
  }

  #[test]
  fn test_string_number_coercion() {
    let expr = Expr::parse("value == 42").unwrap();
    assert!(expr.eval(&json!("42")));
  }

  #[test]
  fn test_rejects_unknown_identifiers() {
    // Only `value` is in scope; no ambient names.
    assert!(Expr::parse("state > 3").is_err());
    assert!(Expr::parse("value.field == 1").is_err());
  }

  #[test]
  fn test_rejects_trailing_input() {
    assert!(matches!(
      Expr::parse("value > 3 value"),
      Err(ExprError::TrailingInput(_))
    ));
  }

  #[test]
  fn test_ordering_on_non_numbers_is_false() {
    let expr = Expr::parse("value > 'abc'").unwrap();
    assert!(!expr.eval(&json!("def")));
  }
}
