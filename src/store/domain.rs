//! Filter predicates in prefix notation.
//!
//! A domain is a flat list of terms: `"&"`, `"|"`, `"!"` operators and
//! `[field, operator, value]` leaves. Operators apply to the terms that follow
//! them; leftover top-level terms are AND-ed together.

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::error::SearchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    ILike,
    NotLike,
    NotILike,
    EqLike,
    EqILike,
    In,
    NotIn,
}

impl Operator {
    pub fn parse(op: &str) -> Option<Self> {
        match op.trim().to_ascii_lowercase().as_str() {
            "=" | "==" => Some(Operator::Eq),
            "!=" | "<>" => Some(Operator::Ne),
            "<" => Some(Operator::Lt),
            "<=" => Some(Operator::Le),
            ">" => Some(Operator::Gt),
            ">=" => Some(Operator::Ge),
            "like" => Some(Operator::Like),
            "ilike" => Some(Operator::ILike),
            "not like" => Some(Operator::NotLike),
            "not ilike" => Some(Operator::NotILike),
            "=like" => Some(Operator::EqLike),
            "=ilike" => Some(Operator::EqILike),
            "in" => Some(Operator::In),
            "not in" => Some(Operator::NotIn),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Like => "like",
            Operator::ILike => "ilike",
            Operator::NotLike => "not like",
            Operator::NotILike => "not ilike",
            Operator::EqLike => "=like",
            Operator::EqILike => "=ilike",
            Operator::In => "in",
            Operator::NotIn => "not in",
        }
    }
}

/// One `[field, operator, value]` leaf. `field` may be a one-level dotted path
/// through a to-one relation (`partner_id.name`).
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    pub value: Value,
}

impl Condition {
    /// Split a dotted path into `(relation field, target field)`.
    pub fn path(&self) -> Option<(&str, &str)> {
        self.field.split_once('.')
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    And,
    Or,
    Not,
    Leaf(Condition),
}

/// Predicate tree produced from the prefix form.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainExpr {
    And(Box<DomainExpr>, Box<DomainExpr>),
    Or(Box<DomainExpr>, Box<DomainExpr>),
    Not(Box<DomainExpr>),
    Leaf(Condition),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Domain {
    terms: Vec<Term>,
}

impl Domain {
    /// Matches everything.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_terms(terms: Vec<Term>) -> Self {
        Self { terms }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// Parse the JSON form. `null` and a missing domain both mean "match everything".
    pub fn from_value(value: &Value) -> Result<Self, SearchError> {
        let items = match value {
            Value::Null => return Ok(Self::empty()),
            Value::Array(items) => items,
            other => {
                return Err(SearchError::Validation(format!(
                    "Invalid domain: expected a list, got {other}"
                )))
            }
        };

        let mut terms = Vec::with_capacity(items.len());
        for item in items {
            terms.push(parse_term(item)?);
        }

        let domain = Self { terms };
        // Surface arity errors here instead of at the store.
        domain.tree()?;
        Ok(domain)
    }

    /// Build the predicate tree. `None` for an empty domain.
    pub fn tree(&self) -> Result<Option<DomainExpr>, SearchError> {
        let mut stack: Vec<DomainExpr> = Vec::new();

        for term in self.terms.iter().rev() {
            match term {
                Term::Leaf(cond) => stack.push(DomainExpr::Leaf(cond.clone())),
                Term::Not => {
                    let operand = pop_operand(&mut stack, "!")?;
                    stack.push(DomainExpr::Not(Box::new(operand)));
                }
                Term::And | Term::Or => {
                    let symbol = if *term == Term::And { "&" } else { "|" };
                    let left = pop_operand(&mut stack, symbol)?;
                    let right = pop_operand(&mut stack, symbol)?;
                    let expr = if *term == Term::And {
                        DomainExpr::And(Box::new(left), Box::new(right))
                    } else {
                        DomainExpr::Or(Box::new(left), Box::new(right))
                    };
                    stack.push(expr);
                }
            }
        }

        // Implicit AND over what is left, in original order (top of stack first).
        let mut result: Option<DomainExpr> = None;
        while let Some(expr) = stack.pop() {
            result = Some(match result {
                None => expr,
                Some(acc) => DomainExpr::And(Box::new(acc), Box::new(expr)),
            });
        }
        Ok(result)
    }

    pub fn to_value(&self) -> Value {
        Value::Array(
            self.terms
                .iter()
                .map(|t| match t {
                    Term::And => Value::String("&".into()),
                    Term::Or => Value::String("|".into()),
                    Term::Not => Value::String("!".into()),
                    Term::Leaf(c) => serde_json::json!([c.field, c.operator.as_str(), c.value]),
                })
                .collect(),
        )
    }
}

impl Serialize for Domain {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

fn parse_term(item: &Value) -> Result<Term, SearchError> {
    match item {
        Value::String(s) => match s.as_str() {
            "&" => Ok(Term::And),
            "|" => Ok(Term::Or),
            "!" => Ok(Term::Not),
            other => Err(SearchError::Validation(format!(
                "Invalid domain operator: '{other}'"
            ))),
        },
        Value::Array(parts) if parts.len() == 3 => {
            let field = parts[0].as_str().filter(|f| !f.is_empty()).ok_or_else(|| {
                SearchError::Validation(format!("Invalid domain term: {item}"))
            })?;
            let op = parts[1].as_str().ok_or_else(|| {
                SearchError::Validation(format!("Invalid domain term: {item}"))
            })?;
            let operator = Operator::parse(op).ok_or_else(|| {
                SearchError::Validation(format!("Unsupported domain operator: '{op}'"))
            })?;
            Ok(Term::Leaf(Condition {
                field: field.to_string(),
                operator,
                value: parts[2].clone(),
            }))
        }
        other => Err(SearchError::Validation(format!(
            "Invalid domain term: {other}"
        ))),
    }
}

fn pop_operand(stack: &mut Vec<DomainExpr>, symbol: &str) -> Result<DomainExpr, SearchError> {
    stack.pop().ok_or_else(|| {
        SearchError::Validation(format!("Invalid domain: '{symbol}' is missing an operand"))
    })
}
