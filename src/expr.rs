//! Solver for arithmetic captchas such as `3×4=?`.

const OPERATORS: [char; 4] = ['+', '-', '*', '/'];

// Nesting bound for parentheses and unary minus
const MAX_DEPTH: usize = 64;

/// Cleans `text` and evaluates it. Returns `None` when there is no operator
/// or the expression does not parse or evaluate; callers keep the raw text.
pub fn solve(text: &str) -> Option<String> {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '=' | '?'))
        .map(|c| match c {
            '×' => '*',
            '÷' => '/',
            c => c,
        })
        .collect();

    if !cleaned.contains(OPERATORS) {
        return None;
    }

    let value = evaluate(&cleaned)?;
    Some(format!("{}", value.round() as i64))
}

pub fn evaluate(expression: &str) -> Option<f64> {
    let mut parser = Parser {
        chars: expression.chars().collect(),
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    (parser.pos == parser.chars.len() && value.is_finite()).then_some(value)
}

// expr := term (('+'|'-') term)*
// term := factor (('*'|'/') factor)*
// factor := number | '(' expr ')' | '-' factor
struct Parser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn expr(&mut self) -> Option<f64> {
        let mut value = self.term()?;
        while let Some(op @ ('+' | '-')) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Some(value)
    }

    fn term(&mut self) -> Option<f64> {
        let mut value = self.factor()?;
        while let Some(op @ ('*' | '/')) = self.peek() {
            self.pos += 1;
            let rhs = self.factor()?;
            if op == '/' && rhs == 0.0 {
                return None;
            }
            value = if op == '*' { value * rhs } else { value / rhs };
        }
        Some(value)
    }

    fn factor(&mut self) -> Option<f64> {
        match self.peek()? {
            '-' => {
                self.pos += 1;
                self.nested(|p| p.factor().map(|v| -v))
            }
            '(' => {
                self.pos += 1;
                let value = self.nested(Self::expr)?;
                if self.peek()? != ')' {
                    return None;
                }
                self.pos += 1;
                Some(value)
            }
            c if c.is_ascii_digit() => self.number(),
            _ => None,
        }
    }

    fn nested(&mut self, f: impl FnOnce(&mut Self) -> Option<f64>) -> Option<f64> {
        if self.depth >= MAX_DEPTH {
            return None;
        }
        self.depth += 1;
        let value = f(self);
        self.depth -= 1;
        value
    }

    fn number(&mut self) -> Option<f64> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.') {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect::<String>().parse().ok()
    }
}
