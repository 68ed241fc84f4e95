//! Jaskier Shared Pattern — router
//! Scenario/rule resolution (§4.5) plus the `smart_routing` predicate
//! language used by `Rule::candidate_services`.
//!
//! Predicates are small boolean expressions over request-derived fields:
//! `model`, `scenario`, `message_count`, `has_tool_use`, and `flag:<key>`
//! (a scenario flag lookup). Grammar:
//!
//! ```text
//! expr   := or
//! or     := and ("||" and)*
//! and    := unary ("&&" unary)*
//! unary  := "!" unary | atom
//! atom   := "(" expr ")" | comparison | ident
//! comparison := ident op literal
//! op     := "==" | "!=" | ">" | "<" | ">=" | "<="
//! ```

use serde_json::Value;

pub use crate::config::store::resolve_rule;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    Op(String),
    LParen,
    RParen,
    And,
    Or,
    Not,
}

fn tokenize(src: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = src.chars().collect();
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
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op("!=".to_string()));
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op("==".to_string()));
                i += 2;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op(">=".to_string()));
                i += 2;
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op("<=".to_string()));
                i += 2;
            }
            '>' => {
                tokens.push(Token::Op(">".to_string()));
                i += 1;
            }
            '<' => {
                tokens.push(Token::Op("<".to_string()));
                i += 1;
            }
            '"' | '\'' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                while i < chars.len() && chars[i] != quote {
                    s.push(chars[i]);
                    i += 1;
                }
                i += 1; // closing quote
                tokens.push(Token::Str(s));
            }
            _ if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(Token::Num(text.parse().unwrap_or(0.0)));
            }
            _ if c.is_alphanumeric() || c == '_' || c == ':' || c == '.' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == ':' || chars[i] == '.')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            _ => i += 1,
        }
    }
    tokens
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    ctx: &'a PredicateContext<'a>,
}

struct PredicateContext<'a> {
    request_body: &'a Value,
    scenario: &'a str,
    flags: &'a dyn Fn(&str) -> bool,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn parse_or(&mut self) -> bool {
        let mut value = self.parse_and();
        while matches!(self.peek(), Some(Token::Or)) {
            self.next();
            let rhs = self.parse_and();
            value = value || rhs;
        }
        value
    }

    fn parse_and(&mut self) -> bool {
        let mut value = self.parse_unary();
        while matches!(self.peek(), Some(Token::And)) {
            self.next();
            let rhs = self.parse_unary();
            value = value && rhs;
        }
        value
    }

    fn parse_unary(&mut self) -> bool {
        if matches!(self.peek(), Some(Token::Not)) {
            self.next();
            return !self.parse_unary();
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> bool {
        match self.next() {
            Some(Token::LParen) => {
                let value = self.parse_or();
                if matches!(self.peek(), Some(Token::RParen)) {
                    self.next();
                }
                value
            }
            Some(Token::Ident(name)) => {
                if let Some(Token::Op(op)) = self.peek().cloned() {
                    self.next();
                    let literal = self.next();
                    self.eval_comparison(&name, &op, literal)
                } else {
                    self.eval_field_truthy(&name)
                }
            }
            _ => false,
        }
    }

    fn field_value(&self, name: &str) -> FieldValue {
        if let Some(key) = name.strip_prefix("flag:") {
            return FieldValue::Bool((self.ctx.flags)(key));
        }
        match name {
            "scenario" => FieldValue::Str(self.ctx.scenario.to_string()),
            "model" => FieldValue::Str(
                self.ctx
                    .request_body
                    .get("model")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            ),
            "message_count" => FieldValue::Num(
                self.ctx
                    .request_body
                    .get("messages")
                    .and_then(Value::as_array)
                    .map(|a| a.len() as f64)
                    .unwrap_or(0.0),
            ),
            "has_tool_use" => FieldValue::Bool(request_has_tool_use(self.ctx.request_body)),
            _ => FieldValue::Null,
        }
    }

    fn eval_field_truthy(&self, name: &str) -> bool {
        match self.field_value(name) {
            FieldValue::Bool(b) => b,
            FieldValue::Str(s) => !s.is_empty(),
            FieldValue::Num(n) => n != 0.0,
            FieldValue::Null => false,
        }
    }

    fn eval_comparison(&self, name: &str, op: &str, literal: Option<Token>) -> bool {
        let field = self.field_value(name);
        match (field, literal) {
            (FieldValue::Str(s), Some(Token::Str(lit))) => compare_str(&s, op, &lit),
            (FieldValue::Num(n), Some(Token::Num(lit))) => compare_num(n, op, lit),
            (FieldValue::Bool(b), Some(Token::Ident(lit))) => {
                let lit_bool = lit == "true";
                compare_num(b as u8 as f64, op, lit_bool as u8 as f64)
            }
            _ => false,
        }
    }
}

enum FieldValue {
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
}

fn compare_str(lhs: &str, op: &str, rhs: &str) -> bool {
    match op {
        "==" => lhs == rhs,
        "!=" => lhs != rhs,
        _ => false,
    }
}

fn compare_num(lhs: f64, op: &str, rhs: f64) -> bool {
    match op {
        "==" => lhs == rhs,
        "!=" => lhs != rhs,
        ">" => lhs > rhs,
        "<" => lhs < rhs,
        ">=" => lhs >= rhs,
        "<=" => lhs <= rhs,
        _ => false,
    }
}

fn request_has_tool_use(body: &Value) -> bool {
    let messages = body.get("messages").and_then(Value::as_array);
    let Some(messages) = messages else { return false };
    messages.iter().any(|m| {
        m.get("tool_calls").is_some()
            || m.get("content")
                .and_then(Value::as_array)
                .is_some_and(|blocks| blocks.iter().any(|b| b.get("type").and_then(Value::as_str) == Some("tool_use")))
    })
}

/// Evaluate a `smart_routing` predicate against a request. Malformed
/// predicates evaluate to `false` rather than erroring the request.
pub fn predicate_matches(predicate: &str, request_body: &Value, scenario: &str, flags: &dyn Fn(&str) -> bool) -> bool {
    if predicate.trim().is_empty() {
        return false;
    }
    let tokens = tokenize(predicate);
    let ctx = PredicateContext { request_body, scenario, flags };
    let mut parser = Parser { tokens: &tokens, pos: 0, ctx: &ctx };
    parser.parse_or()
}
