//! Arithmetic fast path.
//!
//! Messages that are plain arithmetic (digits, `+ - * / ( ) .`, whitespace,
//! optional trailing `=`) are answered locally without spending a model
//! call. Anything else declines and flows to the normal reply path.

/// Characters allowed in a fast-path expression (besides digits).
const ALLOWED: &str = " \t+-*/().";

/// Evaluate a candidate arithmetic message.
///
/// Returns the formatted result, or `None` when the message is not a plain
/// arithmetic expression (disallowed character, parse failure, division by
/// zero, or no operator at all).
pub fn evaluate(input: &str) -> Option<String> {
    let trimmed = input.trim();
    let expr = trimmed.strip_suffix('=').unwrap_or(trimmed).trim_end();
    if expr.is_empty() {
        return None;
    }
    if !expr
        .chars()
        .all(|c| c.is_ascii_digit() || ALLOWED.contains(c))
    {
        return None;
    }
    // A bare number is not a question worth answering.
    if !expr.chars().any(|c| "+-*/".contains(c)) {
        return None;
    }

    let mut parser = Parser {
        bytes: expr.as_bytes(),
        pos: 0,
    };
    let value = parser.expression()?;
    parser.skip_whitespace();
    if parser.pos != parser.bytes.len() {
        return None;
    }
    if !value.is_finite() {
        return None;
    }
    Some(format_value(value))
}

/// Whole numbers render as integers, everything else as a decimal string.
fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Recursive-descent parser over `+ - * / ( )` with unary minus.
struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn skip_whitespace(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_whitespace();
        self.bytes.get(self.pos).copied()
    }

    fn expression(&mut self) -> Option<f64> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some(b'+') => {
                    self.pos += 1;
                    value += self.term()?;
                }
                Some(b'-') => {
                    self.pos += 1;
                    value -= self.term()?;
                }
                _ => return Some(value),
            }
        }
    }

    fn term(&mut self) -> Option<f64> {
        let mut value = self.factor()?;
        loop {
            match self.peek() {
                Some(b'*') => {
                    self.pos += 1;
                    value *= self.factor()?;
                }
                Some(b'/') => {
                    self.pos += 1;
                    let divisor = self.factor()?;
                    if divisor == 0.0 {
                        return None;
                    }
                    value /= divisor;
                }
                _ => return Some(value),
            }
        }
    }

    fn factor(&mut self) -> Option<f64> {
        match self.peek()? {
            b'-' => {
                self.pos += 1;
                Some(-self.factor()?)
            }
            b'(' => {
                self.pos += 1;
                let value = self.expression()?;
                if self.peek() != Some(b')') {
                    return None;
                }
                self.pos += 1;
                Some(value)
            }
            _ => self.number(),
        }
    }

    fn number(&mut self) -> Option<f64> {
        self.skip_whitespace();
        let start = self.pos;
        let mut seen_dot = false;
        while let Some(&b) = self.bytes.get(self.pos) {
            if b.is_ascii_digit() {
                self.pos += 1;
            } else if b == b'.' && !seen_dot {
                seen_dot = true;
                self.pos += 1;
            } else {
                break;
            }
        }
        let raw = std::str::from_utf8(&self.bytes[start..self.pos]).ok()?;
        if raw.is_empty() || raw == "." {
            return None;
        }
        raw.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_addition_with_equals() {
        assert_eq!(evaluate("2+2=").as_deref(), Some("4"));
    }

    #[test]
    fn test_fractional_division() {
        assert_eq!(evaluate("7/2").as_deref(), Some("3.5"));
    }

    #[test]
    fn test_declines_on_letters() {
        assert_eq!(evaluate("2+x"), None);
        assert_eq!(evaluate("посчитай 2+2"), None);
    }

    #[test]
    fn test_precedence_and_parens() {
        assert_eq!(evaluate("2 + 2 * 2").as_deref(), Some("6"));
        assert_eq!(evaluate("(2 + 2) * 2").as_deref(), Some("8"));
        assert_eq!(evaluate("10/(2+3)").as_deref(), Some("2"));
    }

    #[test]
    fn test_unary_minus() {
        assert_eq!(evaluate("-5+3").as_deref(), Some("-2"));
        assert_eq!(evaluate("-(2+3)*2").as_deref(), Some("-10"));
    }

    #[test]
    fn test_decimals() {
        assert_eq!(evaluate("1.5+1.5").as_deref(), Some("3"));
        assert_eq!(evaluate("0.1*10").as_deref(), Some("1"));
    }

    #[test]
    fn test_division_by_zero_declines() {
        assert_eq!(evaluate("7/0"), None);
        assert_eq!(evaluate("1/(3-3)"), None);
    }

    #[test]
    fn test_malformed_declines() {
        assert_eq!(evaluate(""), None);
        assert_eq!(evaluate("2+"), None);
        assert_eq!(evaluate("(2+3"), None);
        assert_eq!(evaluate("2..5+1"), None);
        assert_eq!(evaluate("."), None);
    }

    #[test]
    fn test_bare_number_declines() {
        assert_eq!(evaluate("42"), None);
        assert_eq!(evaluate("3.14"), None);
    }
}
