//! Recursive-descent parser for condition expressions.

use super::{Atom, CmpOp, Expr, ExprError, ValueTest, Window};

/// Deepest allowed nesting of `!` and parentheses.
pub(super) const MAX_NESTING: usize = 64;

/// Parse a full expression, rejecting trailing input.
pub(super) fn parse(text: &str) -> Result<Expr, ExprError> {
    let mut p = Parser {
        text,
        pos: 0,
        depth: 0,
    };
    p.skip_ws();
    if p.at_end() {
        return Err(p.error("empty expression"));
    }
    let expr = p.parse_or()?;
    p.skip_ws();
    if !p.at_end() {
        return Err(p.error("unexpected trailing input"));
    }
    Ok(expr)
}

/// Cursor over the expression text.
struct Parser<'a> {
    /// Full input.
    text: &'a str,
    /// Current byte offset.
    pos: usize,
    /// Open `!` and `(` levels.
    depth: usize,
}

impl Parser<'_> {
    fn error(&self, message: impl Into<String>) -> ExprError {
        ExprError {
            offset: self.pos,
            message: message.into(),
            text: self.text.to_string(),
        }
    }

    fn rest(&self) -> &str {
        &self.text[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    /// Consume `c` after optional whitespace.
    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(c) {
            self.bump();
            true
        } else {
            false
        }
    }

    /// Descend one nesting level.
    fn enter(&mut self) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error(format!("nesting deeper than {}", MAX_NESTING)));
        }
        Ok(())
    }

    fn expect(&mut self, c: char) -> Result<(), ExprError> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{}`", c)))
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut terms = vec![self.parse_and()?];
        while self.eat('|') {
            terms.push(self.parse_and()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::Or(terms)
        })
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut terms = vec![self.parse_unary()?];
        while self.eat('&') {
            terms.push(self.parse_unary()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::And(terms)
        })
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if self.eat('!') {
            self.enter()?;
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        self.skip_ws();
        match self.peek() {
            Some('(') => {
                self.bump();
                self.enter()?;
                let inner = self.parse_or()?;
                self.expect(')')?;
                self.depth -= 1;
                Ok(inner)
            }
            Some('[') => self.parse_bracket_atom().map(Expr::Atom),
            Some(c) if c.is_alphabetic() || c == '_' => self.parse_ident_atom().map(Expr::Atom),
            Some(c) => Err(self.error(format!("unexpected `{}`", c))),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    /// `[name (, num (, num)?)?]` followed by optional value tests.
    fn parse_bracket_atom(&mut self) -> Result<Atom, ExprError> {
        self.bump();
        let start = self.pos;
        while let Some(c) = self.peek() {
            if matches!(c, ',' | ']' | '[') {
                break;
            }
            self.bump();
        }
        let name = self.text[start..self.pos].trim();
        if name.is_empty() {
            return Err(self.error("missing state name"));
        }
        let name = name.to_string();

        let mut bounds = Vec::new();
        while self.eat(',') {
            if bounds.len() == 2 {
                return Err(self.error("at most two time bounds are allowed"));
            }
            bounds.push(self.parse_number()?);
        }
        self.expect(']')?;

        let window = match bounds.as_slice() {
            [] => Window::Any,
            [upper] => self.window(0.0, *upper)?,
            [lower, upper] => self.window(*lower, *upper)?,
            _ => unreachable!("bounded by the loop above"),
        };
        let value = self.parse_value_tests()?;
        Ok(Atom {
            name,
            window,
            value,
        })
    }

    fn window(&self, lower: f64, upper: f64) -> Result<Window, ExprError> {
        if lower < 0.0 || upper < 0.0 {
            return Err(self.error("time bounds must be non-negative"));
        }
        if lower > upper {
            return Err(self.error(format!(
                "lower time bound {} exceeds upper bound {}",
                lower, upper
            )));
        }
        Ok(Window::Within { lower, upper })
    }

    fn parse_ident_atom(&mut self) -> Result<Atom, ExprError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.') {
                self.bump();
            } else {
                break;
            }
        }
        let name = self.text[start..self.pos].to_string();
        let value = self.parse_value_tests()?;
        Ok(Atom {
            name,
            window: Window::Any,
            value,
        })
    }

    /// Optional `{lo, hi}` range then optional comparison.
    fn parse_value_tests(&mut self) -> Result<Vec<ValueTest>, ExprError> {
        let mut tests = Vec::new();
        if self.eat('{') {
            let lo = self.parse_optional_number()?;
            self.expect(',')?;
            let hi = self.parse_optional_number()?;
            self.expect('}')?;
            if let (Some(l), Some(h)) = (lo, hi)
                && l > h
            {
                return Err(self.error(format!("value range {{{}, {}}} is empty", l, h)));
            }
            tests.push(ValueTest::Range { lo, hi });
        }
        if let Some(op) = self.parse_cmp_op() {
            let rhs = self.parse_number()?;
            tests.push(ValueTest::Cmp(op, rhs));
        }
        Ok(tests)
    }

    fn parse_cmp_op(&mut self) -> Option<CmpOp> {
        self.skip_ws();
        let rest = self.rest();
        let (op, len) = if rest.starts_with(">=") {
            (CmpOp::Ge, 2)
        } else if rest.starts_with("<=") {
            (CmpOp::Le, 2)
        } else if rest.starts_with("==") {
            (CmpOp::Eq, 2)
        } else if rest.starts_with("!=") {
            (CmpOp::Ne, 2)
        } else if rest.starts_with('>') {
            (CmpOp::Gt, 1)
        } else if rest.starts_with('<') {
            (CmpOp::Lt, 1)
        } else {
            return None;
        };
        self.pos += len;
        Some(op)
    }

    fn parse_optional_number(&mut self) -> Result<Option<f64>, ExprError> {
        self.skip_ws();
        match self.peek() {
            Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => {
                self.parse_number().map(Some)
            }
            _ => Ok(None),
        }
    }

    fn parse_number(&mut self) -> Result<f64, ExprError> {
        self.skip_ws();
        let start = self.pos;
        if matches!(self.peek(), Some('-' | '+')) {
            self.bump();
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '.') {
            self.bump();
        }
        let lit = &self.text[start..self.pos];
        lit.parse::<f64>().map_err(|_| {
            let mut e = self.error(format!("invalid number `{}`", lit));
            e.offset = start;
            e
        })
    }
}
