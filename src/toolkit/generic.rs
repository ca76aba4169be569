//! GENERIC operations shared by every domain.
//!
//! These never touch the store. They give the agent a bounded fallback:
//! arithmetic it would otherwise do in its head, and a way to hand the
//! conversation to a human.

use schemars::JsonSchema;
use serde::Deserialize;

use crate::error::ToolError;
use crate::store::Database;

use super::ToolRegistryBuilder;

/// Reply of [`transfer_to_human_agents`].
pub const TRANSFER_SUCCESSFUL: &str = "Transfer successful";

/// Longest expression `calculate` accepts, in bytes.
pub const MAX_EXPRESSION_LEN: usize = 1024;

/// Deepest nesting of parentheses and unary signs `calculate` accepts.
pub const MAX_NESTING: usize = 64;

/// Arguments of `calculate`.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CalculateArgs {
    /// The arithmetic expression, e.g. `(1250.50 - 100) * 0.02`. Only digits,
    /// `+ - * / ( ) .` and spaces are allowed.
    pub expression: String,
}

/// Arguments of `transfer_to_human_agents`.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TransferToHumanArgs {
    /// A short summary of the user's issue.
    pub summary: String,
}

/// Registers `calculate` and `transfer_to_human_agents`.
#[must_use]
pub fn register<D: Database>(builder: ToolRegistryBuilder<D>) -> ToolRegistryBuilder<D> {
    builder
        .generic(
            "calculate",
            "Calculate the result of a mathematical expression.",
            |args: CalculateArgs| calculate(&args.expression),
        )
        .generic(
            "transfer_to_human_agents",
            "Transfer the user to a human agent, with a summary of the user's issue. \
             Only transfer if the user explicitly asks for a human agent, or the issue \
             cannot be solved with the available tools.",
            |args: TransferToHumanArgs| Ok(transfer_to_human_agents(&args.summary)),
        )
}

/// Hands the conversation to a human.
#[must_use]
pub fn transfer_to_human_agents(summary: &str) -> &'static str {
    tracing::info!(summary, "conversation handed to a human agent");
    TRANSFER_SUCCESSFUL
}

/// Evaluates `expression`, rounded to two decimals.
pub fn calculate(expression: &str) -> Result<f64, ToolError> {
    if expression.len() > MAX_EXPRESSION_LEN {
        return Err(ToolError::invalid_arguments(format!(
            "expression longer than {MAX_EXPRESSION_LEN} bytes"
        )));
    }
    if let Some(bad) = expression
        .chars()
        .find(|c| !(c.is_ascii_digit() || "+-*/(). ".contains(*c)))
    {
        return Err(ToolError::invalid_arguments(format!(
            "invalid character '{bad}' in expression"
        )));
    }
    let mut parser = Parser {
        src: expression.as_bytes(),
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    parser.skip_ws();
    if parser.pos != parser.src.len() {
        return Err(ToolError::invalid_arguments(format!(
            "unexpected input at position {}",
            parser.pos
        )));
    }
    if !value.is_finite() {
        return Err(ToolError::invalid_arguments("result is not a finite number"));
    }
    Ok((value * 100.0).round() / 100.0)
}

struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn skip_ws(&mut self) {
        while self.src.get(self.pos) == Some(&b' ') {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.src.get(self.pos).copied()
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Result<f64, ToolError> {
        let mut acc = self.term()?;
        while let Some(op @ (b'+' | b'-')) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            acc = if op == b'+' { acc + rhs } else { acc - rhs };
        }
        Ok(acc)
    }

    // term := factor (('*' | '/') factor)*
    fn term(&mut self) -> Result<f64, ToolError> {
        let mut acc = self.factor()?;
        while let Some(op @ (b'*' | b'/')) = self.peek() {
            self.pos += 1;
            let rhs = self.factor()?;
            if op == b'*' {
                acc *= rhs;
            } else {
                if rhs == 0.0 {
                    return Err(ToolError::invalid_arguments("division by zero"));
                }
                acc /= rhs;
            }
        }
        Ok(acc)
    }

    // factor := ('+' | '-') factor | '(' expr ')' | number
    fn factor(&mut self) -> Result<f64, ToolError> {
        if self.depth >= MAX_NESTING {
            return Err(ToolError::invalid_arguments("expression nested too deeply"));
        }
        self.depth += 1;
        let value = self.nested_factor();
        self.depth -= 1;
        value
    }

    fn nested_factor(&mut self) -> Result<f64, ToolError> {
        match self.peek() {
            Some(b'-') => {
                self.pos += 1;
                Ok(-self.factor()?)
            }
            Some(b'+') => {
                self.pos += 1;
                self.factor()
            }
            Some(b'(') => {
                self.pos += 1;
                let inner = self.expr()?;
                if self.peek() != Some(b')') {
                    return Err(ToolError::invalid_arguments("unbalanced parentheses"));
                }
                self.pos += 1;
                Ok(inner)
            }
            Some(c) if c.is_ascii_digit() || c == b'.' => self.number(),
            Some(c) => Err(ToolError::invalid_arguments(format!(
                "unexpected '{}' at position {}",
                char::from(c),
                self.pos
            ))),
            None => Err(ToolError::invalid_arguments("unexpected end of expression")),
        }
    }

    fn number(&mut self) -> Result<f64, ToolError> {
        let start = self.pos;
        while self
            .src
            .get(self.pos)
            .is_some_and(|c| c.is_ascii_digit() || *c == b'.')
        {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.src[start..self.pos])
            .map_err(|e| ToolError::invalid_arguments(e.to_string()))?;
        text.parse::<f64>()
            .map_err(|_| ToolError::invalid_arguments(format!("invalid number '{text}'")))
    }
}
