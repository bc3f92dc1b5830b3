//! Built-in FHIRPath subset
//!
//! Covers the navigation most feature declarations need:
//!
//! - member access with implicit flattening of arrays
//!   (`code.coding.code`), a leading resource type (`Observation.value`)
//!   and polymorphic members (`value` finds `valueQuantity`)
//! - `where(criteria)`, `exists([criteria])`, `empty()`, `first()`,
//!   `last()`, `not()`, `count()`
//! - string, number and boolean literals, `$this`, parentheses
//! - `=`, `!=`, `<`, `<=`, `>`, `>=`, `and`, `or`
//!
//! Equality is existential over collections: `coding.code = 'x'` holds when
//! any code equals `'x'`. A comparison with an empty operand is empty.

use crate::path::{CompiledPath, PathCompiler, PathExpression};
use crate::{Error, Result};
use serde_json::Value;
use std::cmp::Ordering;

/// Compiler producing [`FhirPath`] expressions
#[derive(Debug, Default, Clone, Copy)]
pub struct FhirPathCompiler;

impl PathCompiler for FhirPathCompiler {
    fn compile(&self, expression: &str) -> Result<CompiledPath> {
        Ok(CompiledPath::new(FhirPath::parse(expression)?))
    }
}

/// A parsed expression
#[derive(Debug, Clone)]
pub struct FhirPath {
    source: String,
    expr: Expr,
}

impl FhirPath {
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            source,
            tokens,
            pos: 0,
        };
        let expr = parser.parse_expression()?;
        if let Some(token) = parser.peek() {
            return Err(parser.error(format!("unexpected token {token:?}")));
        }
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }
}

impl PathExpression for FhirPath {
    fn evaluate(&self, resource: &Value) -> Vec<Value> {
        eval(&self.expr, std::slice::from_ref(resource))
    }

    fn source(&self) -> &str {
        &self.source
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(Value),
    This,
    Dot,
    LParen,
    RParen,
    Comma,
    Op(CmpOp),
}

#[derive(Debug, Clone)]
enum Expr {
    This,
    Literal(Value),
    Member(Box<Expr>, String),
    Call(Box<Expr>, Function),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone)]
enum Function {
    Where(Box<Expr>),
    Exists(Option<Box<Expr>>),
    Empty,
    First,
    Last,
    Not,
    Count,
}

fn path_error(source: &str, reason: impl Into<String>) -> Error {
    Error::PathExpression {
        expression: source.to_string(),
        reason: reason.into(),
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Op(CmpOp::Eq));
                i += 1;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op(CmpOp::NotEq));
                i += 2;
            }
            '<' | '>' => {
                let or_equal = chars.get(i + 1) == Some(&'=');
                let op = match (c, or_equal) {
                    ('<', false) => CmpOp::Lt,
                    ('<', true) => CmpOp::Le,
                    ('>', false) => CmpOp::Gt,
                    _ => CmpOp::Ge,
                };
                tokens.push(Token::Op(op));
                i += if or_equal { 2 } else { 1 };
            }
            '\'' => {
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(path_error(source, "unterminated string literal")),
                        Some('\'') => {
                            i += 1;
                            break;
                        }
                        Some('\\') => {
                            let escaped = chars
                                .get(i + 1)
                                .ok_or_else(|| path_error(source, "dangling escape"))?;
                            text.push(match escaped {
                                'n' => '\n',
                                't' => '\t',
                                'r' => '\r',
                                other => *other,
                            });
                            i += 2;
                        }
                        Some(other) => {
                            text.push(*other);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(text));
            }
            '`' => {
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|&ch| ch == '`')
                    .map(|offset| start + offset)
                    .ok_or_else(|| path_error(source, "unterminated delimited identifier"))?;
                tokens.push(Token::Ident(chars[start..end].iter().collect()));
                i = end + 1;
            }
            '$' => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end].is_ascii_alphanumeric() {
                    end += 1;
                }
                let name: String = chars[start..end].iter().collect();
                if name != "this" {
                    return Err(path_error(source, format!("unsupported variable ${name}")));
                }
                tokens.push(Token::This);
                i = end;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let is_decimal = chars.get(i) == Some(&'.')
                    && chars.get(i + 1).is_some_and(|ch| ch.is_ascii_digit());
                if is_decimal {
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let number = if is_decimal {
                    text.parse::<f64>().ok().map(Value::from)
                } else {
                    text.parse::<i64>().ok().map(Value::from)
                };
                let number =
                    number.ok_or_else(|| path_error(source, format!("invalid number {text}")))?;
                tokens.push(Token::Num(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(path_error(source, format!("unexpected character '{other}'")));
            }
        }
    }

    if tokens.is_empty() {
        return Err(path_error(source, "empty expression"));
    }
    Ok(tokens)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, reason: impl Into<String>) -> Error {
        path_error(self.source, reason)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(self.error(format!("expected {expected:?}, found {token:?}"))),
            None => Err(self.error(format!("expected {expected:?}, found end of input"))),
        }
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(name)) if name == keyword)
    }

    fn parse_expression(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while self.at_keyword("or") {
            self.pos += 1;
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_comparison()?;
        while self.at_keyword("and") {
            self.pos += 1;
            let rhs = self.parse_comparison()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let lhs = self.parse_term()?;
        if let Some(Token::Op(op)) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.parse_term()?;
            return Ok(Expr::Compare(op, Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        while self.peek() == Some(&Token::Dot) {
            self.pos += 1;
            let name = match self.next() {
                Some(Token::Ident(name)) => name,
                other => return Err(self.error(format!("expected identifier, found {other:?}"))),
            };
            expr = self.parse_invocation(expr, name)?;
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::Str(text)) => Ok(Expr::Literal(Value::String(text))),
            Some(Token::Num(number)) => Ok(Expr::Literal(number)),
            Some(Token::This) => Ok(Expr::This),
            Some(Token::LParen) => {
                let inner = self.parse_expression()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) if name == "true" => Ok(Expr::Literal(Value::Bool(true))),
            Some(Token::Ident(name)) if name == "false" => Ok(Expr::Literal(Value::Bool(false))),
            Some(Token::Ident(name)) => self.parse_invocation(Expr::This, name),
            Some(token) => Err(self.error(format!("unexpected token {token:?}"))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn parse_invocation(&mut self, target: Expr, name: String) -> Result<Expr> {
        if self.peek() != Some(&Token::LParen) {
            return Ok(Expr::Member(Box::new(target), name));
        }
        self.pos += 1;

        let mut args = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            args.push(self.parse_expression()?);
            while self.peek() == Some(&Token::Comma) {
                self.pos += 1;
                args.push(self.parse_expression()?);
            }
        }
        self.expect(Token::RParen)?;

        let function = match (name.as_str(), args.len()) {
            ("where", 1) => Function::Where(Box::new(args.remove(0))),
            ("exists", 0) => Function::Exists(None),
            ("exists", 1) => Function::Exists(Some(Box::new(args.remove(0)))),
            ("empty", 0) => Function::Empty,
            ("first", 0) => Function::First,
            ("last", 0) => Function::Last,
            ("not", 0) => Function::Not,
            ("count", 0) => Function::Count,
            (name, arity) => {
                return Err(self.error(format!("unsupported function {name}/{arity}")));
            }
        };
        Ok(Expr::Call(Box::new(target), function))
    }
}

fn eval(expr: &Expr, focus: &[Value]) -> Vec<Value> {
    match expr {
        Expr::This => focus.to_vec(),
        Expr::Literal(value) => vec![value.clone()],
        Expr::Member(target, name) => {
            let mut out = Vec::new();
            for item in eval(target, focus) {
                navigate(&item, name, &mut out);
            }
            out
        }
        Expr::Call(target, function) => call(function, eval(target, focus)),
        Expr::Compare(op, lhs, rhs) => compare(*op, &eval(lhs, focus), &eval(rhs, focus)),
        Expr::And(lhs, rhs) => {
            match (as_boolean(&eval(lhs, focus)), as_boolean(&eval(rhs, focus))) {
                (Some(false), _) | (_, Some(false)) => vec![Value::Bool(false)],
                (Some(true), Some(true)) => vec![Value::Bool(true)],
                _ => Vec::new(),
            }
        }
        Expr::Or(lhs, rhs) => {
            match (as_boolean(&eval(lhs, focus)), as_boolean(&eval(rhs, focus))) {
                (Some(true), _) | (_, Some(true)) => vec![Value::Bool(true)],
                (Some(false), Some(false)) => vec![Value::Bool(false)],
                _ => Vec::new(),
            }
        }
    }
}

/// Type suffixes of choice elements: `value` also matches `valueQuantity`
const CHOICE_TYPE_SUFFIXES: &[&str] = &[
    "Address",
    "Age",
    "Annotation",
    "Attachment",
    "Base64Binary",
    "Boolean",
    "Canonical",
    "Code",
    "CodeableConcept",
    "Coding",
    "ContactPoint",
    "Count",
    "Date",
    "DateTime",
    "Decimal",
    "Distance",
    "Dosage",
    "Duration",
    "HumanName",
    "Id",
    "Identifier",
    "Instant",
    "Integer",
    "Integer64",
    "Markdown",
    "Meta",
    "Money",
    "Oid",
    "Period",
    "PositiveInt",
    "Quantity",
    "Range",
    "Ratio",
    "Reference",
    "SampledData",
    "Signature",
    "String",
    "Time",
    "Timing",
    "UnsignedInt",
    "Uri",
    "Url",
    "Uuid",
];

fn navigate(item: &Value, name: &str, out: &mut Vec<Value>) {
    let Value::Object(map) = item else {
        return;
    };

    if map.get("resourceType").and_then(Value::as_str) == Some(name) {
        out.push(item.clone());
        return;
    }

    let found = map.get(name).or_else(|| {
        map.iter()
            .find(|(key, _)| {
                key.strip_prefix(name)
                    .is_some_and(|suffix| CHOICE_TYPE_SUFFIXES.contains(&suffix))
            })
            .map(|(_, value)| value)
    });

    match found {
        Some(Value::Array(items)) => out.extend(items.iter().filter(|v| !v.is_null()).cloned()),
        Some(Value::Null) | None => {}
        Some(value) => out.push(value.clone()),
    }
}

fn call(function: &Function, input: Vec<Value>) -> Vec<Value> {
    match function {
        Function::Where(criteria) => filter(criteria, input),
        Function::Exists(None) => vec![Value::Bool(!input.is_empty())],
        Function::Exists(Some(criteria)) => {
            vec![Value::Bool(!filter(criteria, input).is_empty())]
        }
        Function::Empty => vec![Value::Bool(input.is_empty())],
        Function::First => input.into_iter().take(1).collect(),
        Function::Last => input.into_iter().last().into_iter().collect(),
        Function::Not => match as_boolean(&input) {
            Some(flag) => vec![Value::Bool(!flag)],
            None => Vec::new(),
        },
        Function::Count => vec![Value::from(input.len())],
    }
}

fn filter(criteria: &Expr, input: Vec<Value>) -> Vec<Value> {
    input
        .into_iter()
        .filter(|item| as_boolean(&eval(criteria, std::slice::from_ref(item))).unwrap_or(false))
        .collect()
}

/// Singleton boolean evaluation; any non-empty non-boolean collection is true
fn as_boolean(values: &[Value]) -> Option<bool> {
    match values {
        [] => None,
        [Value::Bool(flag)] => Some(*flag),
        _ => Some(true),
    }
}

fn compare(op: CmpOp, lhs: &[Value], rhs: &[Value]) -> Vec<Value> {
    if lhs.is_empty() || rhs.is_empty() {
        return Vec::new();
    }

    let any_equal = || lhs.iter().any(|l| rhs.iter().any(|r| values_equal(l, r)));
    let result = match op {
        CmpOp::Eq => any_equal(),
        CmpOp::NotEq => !any_equal(),
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
            let Some(ordering) = order(&lhs[0], &rhs[0]) else {
                return Vec::new();
            };
            match op {
                CmpOp::Lt => ordering == Ordering::Less,
                CmpOp::Le => ordering != Ordering::Greater,
                CmpOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }
        }
    };
    vec![Value::Bool(result)]
}

fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs.as_f64(), rhs.as_f64()) {
        (Some(l), Some(r)) => l == r,
        _ => lhs == rhs,
    }
}

fn order(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn observation() -> Value {
        json!({
            "resourceType": "Observation",
            "id": "o1",
            "status": "final",
            "category": [{
                "coding": [{
                    "system": "http://terminology.hl7.org/CodeSystem/observation-category",
                    "code": "laboratory"
                }]
            }],
            "code": {
                "coding": [
                    {"system": "http://loinc.org", "code": "2339-0", "display": "Glucose"},
                    {"system": "http://snomed.info/sct", "code": "33747003"}
                ]
            },
            "valueQuantity": {"value": 6.3, "unit": "mmol/L"},
            "interpretation": [{"coding": [{"code": "H"}]}]
        })
    }

    fn eval_str(expression: &str, resource: &Value) -> Vec<Value> {
        FhirPathCompiler
            .compile(expression)
            .unwrap()
            .evaluate(resource)
    }

    #[test]
    fn test_member_navigation_flattens() {
        let values = eval_str("code.coding.code", &observation());
        assert_eq!(values, vec![json!("2339-0"), json!("33747003")]);
    }

    #[test]
    fn test_leading_resource_type() {
        let values = eval_str("Observation.valueQuantity.value", &observation());
        assert_eq!(values, vec![json!(6.3)]);
        assert!(eval_str("Condition.code", &observation()).is_empty());
    }

    #[test]
    fn test_polymorphic_member() {
        let values = eval_str("value.unit", &observation());
        assert_eq!(values, vec![json!("mmol/L")]);
    }

    #[test]
    fn test_prefixed_members_are_not_choice_elements() {
        let request = json!({
            "resourceType": "MedicationRequest",
            "statusReason": {"text": "patient refused"},
            "dosageInstruction": [{
                "text": "1 tab",
                "doseAndRate": [{"type": {"text": "ordered"}}]
            }]
        });
        assert!(eval_str("status", &request).is_empty());
        assert!(eval_str("dosage.text", &request).is_empty());
        assert!(eval_str("dosageInstruction.dose", &request).is_empty());
        assert_eq!(eval_str("dosageInstruction.text", &request), vec![json!("1 tab")]);

        let observation = json!({"resourceType": "Observation", "valueString": "positive"});
        assert_eq!(eval_str("value", &observation), vec![json!("positive")]);
    }

    #[test]
    fn test_where_filter() {
        let values = eval_str(
            "code.coding.where(system = 'http://snomed.info/sct').code",
            &observation(),
        );
        assert_eq!(values, vec![json!("33747003")]);
    }

    #[test]
    fn test_existential_equality() {
        assert_eq!(eval_str("code.coding.code = '33747003'", &observation()), vec![json!(true)]);
        assert_eq!(eval_str("code.coding.code != '33747003'", &observation()), vec![json!(false)]);
        assert!(eval_str("missing = 'x'", &observation()).is_empty());
    }

    #[test]
    fn test_numeric_comparisons() {
        assert_eq!(eval_str("valueQuantity.value > 5", &observation()), vec![json!(true)]);
        assert_eq!(eval_str("valueQuantity.value <= 6.3", &observation()), vec![json!(true)]);
        assert_eq!(eval_str("valueQuantity.value < 6", &observation()), vec![json!(false)]);
    }

    #[test]
    fn test_boolean_operators() {
        assert_eq!(
            eval_str("status = 'final' and category.coding.code = 'laboratory'", &observation()),
            vec![json!(true)]
        );
        assert_eq!(
            eval_str("status = 'draft' or (valueQuantity.value > 10)", &observation()),
            vec![json!(false)]
        );
        assert_eq!(eval_str("status = 'draft' and missing = 1", &observation()), vec![json!(false)]);
    }

    #[test]
    fn test_functions() {
        let resource = observation();
        assert_eq!(eval_str("code.coding.first().code", &resource), vec![json!("2339-0")]);
        assert_eq!(eval_str("code.coding.last().code", &resource), vec![json!("33747003")]);
        assert_eq!(eval_str("code.coding.count()", &resource), vec![json!(2)]);
        assert_eq!(eval_str("interpretation.exists()", &resource), vec![json!(true)]);
        assert_eq!(eval_str("note.empty()", &resource), vec![json!(true)]);
        assert_eq!(eval_str("note.exists().not()", &resource), vec![json!(true)]);
        assert_eq!(
            eval_str("code.coding.exists(code = '2339-0')", &resource),
            vec![json!(true)]
        );
        assert_eq!(
            eval_str("code.coding.where($this.code = '2339-0').display", &resource),
            vec![json!("Glucose")]
        );
    }

    #[test]
    fn test_escaped_literal() {
        let resource = json!({"resourceType": "Patient", "id": "p1", "name": "O'Brien"});
        assert_eq!(eval_str("name = 'O\\'Brien'", &resource), vec![json!(true)]);
    }

    #[test]
    fn test_compile_errors() {
        for bad in ["", "code.", "code.coding.where()", "foo(1, 2)", "'open", "code @ x", "$index"] {
            assert!(
                matches!(FhirPathCompiler.compile(bad), Err(Error::PathExpression { .. })),
                "expected compile error for {bad:?}"
            );
        }
    }
}
