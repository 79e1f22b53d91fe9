//! Pipeline expressions
//!
//! ```text
//! expr   := branch ('|' branch)*
//! branch := steps ('&' steps)*
//! steps  := atom ('>>' atom)*
//! atom   := NAME | '(' expr ')'
//! ```
//!
//! `>>` binds tightest and `|` loosest. Every name resolves to a fresh copy
//! from the registry, so `PCA & PCA` denotes two distinct nodes.

use super::{choice, parallel, sequence};
use crate::error::{KolosalError, Result};
use crate::operator::{Operator, OperatorRegistry};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
enum TokenValue<'a> {
    Name(&'a str),
    Then,
    And,
    Or,
    Open,
    Close,
    End,
}

impl fmt::Display for TokenValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenValue::Name(name) => write!(f, "'{}'", name),
            TokenValue::Then => f.write_str("'>>'"),
            TokenValue::And => f.write_str("'&'"),
            TokenValue::Or => f.write_str("'|'"),
            TokenValue::Open => f.write_str("'('"),
            TokenValue::Close => f.write_str("')'"),
            TokenValue::End => f.write_str("end of input"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Token<'a> {
    value: TokenValue<'a>,
    offset: usize,
}

fn parse_error(offset: usize, message: impl Into<String>) -> KolosalError {
    KolosalError::Parse {
        offset,
        message: message.into(),
    }
}

fn tokenize(input: &str) -> Result<Vec<Token<'_>>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        let value = match c {
            c if c.is_whitespace() => continue,
            '&' => TokenValue::And,
            '|' => TokenValue::Or,
            '(' => TokenValue::Open,
            ')' => TokenValue::Close,
            '>' => match chars.next() {
                Some((_, '>')) => TokenValue::Then,
                _ => return Err(parse_error(offset, "expected '>>'")),
            },
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut end = offset + c.len_utf8();
                while let Some(&(i, next)) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        end = i + next.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                TokenValue::Name(&input[offset..end])
            }
            other => return Err(parse_error(offset, format!("unexpected character '{}'", other))),
        };
        tokens.push(Token { value, offset });
    }

    tokens.push(Token {
        value: TokenValue::End,
        offset: input.len(),
    });
    Ok(tokens)
}

struct Parser<'r, 'a> {
    registry: &'r OperatorRegistry,
    tokens: Vec<Token<'a>>,
    pos: usize,
}

impl<'r, 'a> Parser<'r, 'a> {
    fn peek(&self) -> &Token<'a> {
        // tokenize always ends with End, and End is never consumed
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token<'a> {
        let token = self.peek().clone();
        if token.value != TokenValue::End {
            self.pos += 1;
        }
        token
    }

    fn expr(&mut self) -> Result<Operator> {
        let mut branches = vec![self.branch()?];
        while self.peek().value == TokenValue::Or {
            self.advance();
            branches.push(self.branch()?);
        }
        if branches.len() == 1 {
            return Ok(branches.remove(0));
        }
        choice(&branches)
    }

    fn branch(&mut self) -> Result<Operator> {
        let mut acc = self.steps()?;
        while self.peek().value == TokenValue::And {
            self.advance();
            let next = self.steps()?;
            acc = parallel(&acc, &next)?;
        }
        Ok(acc)
    }

    fn steps(&mut self) -> Result<Operator> {
        let mut acc = self.atom()?;
        while self.peek().value == TokenValue::Then {
            self.advance();
            let next = self.atom()?;
            acc = sequence(&acc, &next)?;
        }
        Ok(acc)
    }

    fn atom(&mut self) -> Result<Operator> {
        let token = self.advance();
        match token.value {
            TokenValue::Name(name) => self
                .registry
                .get(name)
                .map(Operator::from)
                .map_err(|_| parse_error(token.offset, format!("unknown operator '{}'", name))),
            TokenValue::Open => {
                let inner = self.expr()?;
                let close = self.advance();
                if close.value != TokenValue::Close {
                    return Err(parse_error(close.offset, format!("expected ')', found {}", close.value)));
                }
                Ok(inner)
            }
            other => Err(parse_error(
                token.offset,
                format!("expected an operator name or '(', found {}", other),
            )),
        }
    }
}

/// Parse a pipeline expression over the operators of `registry`
pub fn parse(expr: &str, registry: &OperatorRegistry) -> Result<Operator> {
    let mut parser = Parser {
        registry,
        tokens: tokenize(expr)?,
        pos: 0,
    };
    let op = parser.expr()?;
    let rest = parser.advance();
    if rest.value != TokenValue::End {
        return Err(parse_error(rest.offset, format!("unexpected {}", rest.value)));
    }
    Ok(op)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::OperatorKind;

    fn registry() -> OperatorRegistry {
        OperatorRegistry::builtin().unwrap()
    }

    #[test]
    fn test_precedence() {
        let op = parse("PCA >> LogisticRegression | KNeighborsClassifier", &registry());
        // `>>` binds tighter: (PCA >> LR) | KNN
        let op = op.unwrap();
        assert_eq!(op.kind(), OperatorKind::Choice);
        assert_eq!(op.steps()[0].kind(), OperatorKind::Sequence);

        let op = parse("PCA >> (LogisticRegression | KNeighborsClassifier)", &registry()).unwrap();
        assert_eq!(op.kind(), OperatorKind::Sequence);
        assert_eq!(op.to_string(), "PCA >> (LogisticRegression | KNeighborsClassifier)");
    }

    #[test]
    fn test_parallel_then_concat() {
        let op = parse("(PCA & NoOp) >> ConcatFeatures >> DecisionTreeClassifier", &registry()).unwrap();
        assert_eq!(op.steps().len(), 3);
        assert_eq!(op.steps()[0].kind(), OperatorKind::Parallel);
    }

    #[test]
    fn test_repeated_name_is_distinct_node() {
        let op = parse("PCA & PCA", &registry()).unwrap();
        assert_eq!(op.steps().len(), 2);
        assert_ne!(op.steps()[0].id(), op.steps()[1].id());
    }

    #[test]
    fn test_errors_carry_offsets() {
        match parse("PCA >> SVC", &registry()) {
            Err(KolosalError::Parse { offset, .. }) => assert_eq!(offset, 7),
            other => panic!("unexpected {:?}", other),
        }
        match parse("PCA > LogisticRegression", &registry()) {
            Err(KolosalError::Parse { offset, .. }) => assert_eq!(offset, 4),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(parse("(PCA", &registry()), Err(KolosalError::Parse { .. })));
        assert!(matches!(parse("PCA )", &registry()), Err(KolosalError::Parse { .. })));
        assert!(matches!(parse("", &registry()), Err(KolosalError::Parse { .. })));
        assert!(matches!(parse("PCA # x", &registry()), Err(KolosalError::Parse { .. })));
    }

    #[test]
    fn test_composition_errors_pass_through() {
        let err = parse("(PCA & NoOp) >> LogisticRegression", &registry()).unwrap_err();
        assert!(matches!(err, KolosalError::Composition(_)));
    }
}
