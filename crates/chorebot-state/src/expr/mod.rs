//! Condition expressions over state records.
//!
//! An expression combines *atoms* with `&`, `|`, `!` and parentheses. Each
//! atom names one state and tests how long ago it was recorded and,
//! optionally, its value:
//!
//! ```text
//! [dodge-flash, 0, 1]          recorded between 0 and 1 seconds ago
//! [dodge-flash, 1]             recorded at most 1 second ago
//! [energy]{50, 120}            recorded at any time, value in 50..=120
//! energy >= 3                  bare identifier with a comparison
//! ![front-attack, 0, 2] & (a | b)
//! ```
//!
//! A state with no record never matches. Evaluation reads the current
//! observation of each referenced state at call time and never caches.

use std::fmt;

use thiserror::Error;

use crate::StateLookup;

mod parse;

/// Compile-time failure with the byte offset of the offending input.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{message} at offset {offset} in `{text}`")]
pub struct ExprError {
    /// Byte offset into `text`.
    pub offset: usize,
    /// Human-readable description.
    pub message: String,
    /// The full expression text.
    pub text: String,
}

/// Comparison operator of a value test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `==`
    Eq,
    /// `!=`
    Ne,
}

impl CmpOp {
    /// Apply the operator.
    fn holds(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
        }
    }
}

/// Age window a record must fall in, relative to evaluation time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Window {
    /// Any non-negative age.
    Any,
    /// Age within `[lower, upper]` seconds.
    Within {
        /// Minimum age in seconds.
        lower: f64,
        /// Maximum age in seconds.
        upper: f64,
    },
}

/// Test applied to the recorded value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueTest {
    /// Inclusive range; an absent bound is open.
    Range {
        /// Lower bound.
        lo: Option<f64>,
        /// Upper bound.
        hi: Option<f64>,
    },
    /// Comparison against a literal.
    Cmp(CmpOp, f64),
}

impl ValueTest {
    /// Check `v` against this test.
    fn matches(self, v: f64) -> bool {
        match self {
            Self::Range { lo, hi } => lo.is_none_or(|lo| v >= lo) && hi.is_none_or(|hi| v <= hi),
            Self::Cmp(op, rhs) => op.holds(v, rhs),
        }
    }
}

/// A single state test.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    /// Referenced state.
    pub name: String,
    /// Required record age.
    pub window: Window,
    /// Value tests, all of which must hold.
    pub value: Vec<ValueTest>,
}

impl Atom {
    /// Evaluate the atom at `now`.
    fn evaluate<L: StateLookup + ?Sized>(&self, now: f64, lookup: &L) -> bool {
        let Some(snap) = lookup.snapshot(&self.name) else {
            return false;
        };
        let Some(time) = snap.time else {
            return false;
        };
        let age = now - time;
        if age < 0.0 {
            return false;
        }
        if let Window::Within { lower, upper } = self.window
            && (age < lower || age > upper)
        {
            return false;
        }
        if self.value.is_empty() {
            return true;
        }
        match snap.value {
            Some(v) => self.value.iter().all(|t| t.matches(v as f64)),
            None => false,
        }
    }
}

/// Expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Constant result (used for conditionless handlers).
    Const(bool),
    /// State test.
    Atom(Atom),
    /// Negation.
    Not(Box<Expr>),
    /// Conjunction, short-circuiting left to right.
    And(Vec<Expr>),
    /// Disjunction, short-circuiting left to right.
    Or(Vec<Expr>),
}

impl Expr {
    /// Evaluate the tree at `now`.
    pub fn evaluate<L: StateLookup + ?Sized>(&self, now: f64, lookup: &L) -> bool {
        match self {
            Self::Const(b) => *b,
            Self::Atom(a) => a.evaluate(now, lookup),
            Self::Not(e) => !e.evaluate(now, lookup),
            Self::And(es) => es.iter().all(|e| e.evaluate(now, lookup)),
            Self::Or(es) => es.iter().any(|e| e.evaluate(now, lookup)),
        }
    }

    /// Push referenced state names (with duplicates) onto `out`.
    fn collect_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Const(_) => {}
            Self::Atom(a) => out.push(&a.name),
            Self::Not(e) => e.collect_names(out),
            Self::And(es) | Self::Or(es) => {
                for e in es {
                    e.collect_names(out);
                }
            }
        }
    }
}

/// A compiled, immutable condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    /// Original text (empty for constants).
    text: String,
    /// Parsed tree.
    root: Expr,
    /// Distinct referenced state names in first-seen order.
    names: Vec<String>,
}

impl Expression {
    /// Compile `text`. Fails on any syntax error or invalid bound.
    pub fn compile(text: &str) -> Result<Self, ExprError> {
        let root = parse::parse(text)?;
        let mut raw = Vec::new();
        root.collect_names(&mut raw);
        let mut names: Vec<String> = Vec::new();
        for n in raw {
            if !names.iter().any(|x| x == n) {
                names.push(n.to_string());
            }
        }
        Ok(Self {
            text: text.trim().to_string(),
            root,
            names,
        })
    }

    /// An expression that always holds.
    pub fn always() -> Self {
        Self {
            text: String::new(),
            root: Expr::Const(true),
            names: Vec::new(),
        }
    }

    /// Evaluate at `now` against current observations.
    pub fn evaluate<L: StateLookup + ?Sized>(&self, now: f64, lookup: &L) -> bool {
        self.root.evaluate(now, lookup)
    }

    /// Referenced state names.
    pub fn state_names(&self) -> &[String] {
        &self.names
    }

    /// Parsed tree.
    pub fn root(&self) -> &Expr {
        &self.root
    }

    /// Source text.
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.text.is_empty() {
            f.write_str("<always>")
        } else {
            f.write_str(&self.text)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::RecordSnapshot;

    fn lookup(entries: &[(&str, Option<f64>, Option<i64>)]) -> HashMap<String, RecordSnapshot> {
        entries
            .iter()
            .map(|(n, t, v)| (n.to_string(), RecordSnapshot { time: *t, value: *v }))
            .collect()
    }

    fn eval(text: &str, now: f64, l: &HashMap<String, RecordSnapshot>) -> bool {
        Expression::compile(text).expect("compile").evaluate(now, l)
    }

    #[test]
    fn time_window_boundaries() {
        let l = lookup(&[("x", Some(100.0), None)]);
        assert!(eval("[x, 0, 2]", 101.0, &l));
        assert!(eval("[x, 0, 2]", 102.0, &l));
        assert!(!eval("[x, 0, 2]", 102.01, &l));
        assert!(!eval("[x, 0, 2]", 99.9, &l));
    }

    #[test]
    fn lower_bound_excludes_fresh_records() {
        let l = lookup(&[("x", Some(100.0), None)]);
        assert!(!eval("[x, 1, 3]", 100.5, &l));
        assert!(eval("[x, 1, 3]", 101.0, &l));
        assert!(eval("[x, 2]", 101.0, &l));
    }

    #[test]
    fn missing_record_never_matches() {
        let l = lookup(&[("x", None, None)]);
        assert!(!eval("[x]", 1.0, &l));
        assert!(!eval("[x, 0, 10]", 1.0, &l));
        assert!(!eval("x > 0", 1.0, &l));
        assert!(!eval("[unknown]", 1.0, &l));
        assert!(eval("![unknown]", 1.0, &l));
    }

    #[test]
    fn value_tests() {
        let l = lookup(&[("energy", Some(1.0), Some(60)), ("hp", Some(1.0), None)]);
        assert!(eval("[energy]{50, 120}", 2.0, &l));
        assert!(eval("[energy]{50,}", 2.0, &l));
        assert!(!eval("[energy]{, 59}", 2.0, &l));
        assert!(eval("energy >= 60", 2.0, &l));
        assert!(!eval("energy > 60", 2.0, &l));
        assert!(eval("energy != 3", 2.0, &l));
        assert!(eval("[energy, 0, 5] == 60", 2.0, &l));
        // value tests on an unset value are false
        assert!(!eval("hp < 100", 2.0, &l));
        assert!(eval("[hp]", 2.0, &l));
    }

    #[test]
    fn boolean_combinators() {
        let l = lookup(&[("a", Some(1.0), Some(1)), ("b", None, None)]);
        assert!(eval("a & !b", 1.0, &l));
        assert!(eval("b | a", 1.0, &l));
        assert!(!eval("a & b", 1.0, &l));
        assert!(eval("!(a & b)", 1.0, &l));
        // & binds tighter than |
        assert!(eval("a | b & b", 1.0, &l));
        assert!(!eval("(a | b) & b", 1.0, &l));
    }

    #[test]
    fn evaluation_is_repeatable() {
        let l = lookup(&[("a", Some(5.0), Some(2))]);
        let e = Expression::compile("[a, 0, 1] & a > 1").expect("compile");
        for _ in 0..3 {
            assert!(e.evaluate(5.5, &l));
            assert!(!e.evaluate(6.5, &l));
        }
    }

    #[test]
    fn names_are_distinct_in_order() {
        let e = Expression::compile("[b] & (a | [b, 0, 1]) & !c").expect("compile");
        assert_eq!(e.state_names(), &["b".to_string(), "a".into(), "c".into()]);
    }

    #[test]
    fn always_holds() {
        let l = lookup(&[]);
        assert!(Expression::always().evaluate(0.0, &l));
        assert_eq!(Expression::always().to_string(), "<always>");
    }
}
