//! Recursive-descent parser for the fixed formula grammar.
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := ('-' | '+') unary | primary
//! primary := NUMBER | STRING | IDENT '(' args? ')' | '(' expr ')'
//! ```

use super::EvalError;
use super::lexer::{Spanned, Token};

/// Nesting limit for parentheses, unary operators and calls.
const MAX_DEPTH: usize = 64;

/// Limit on binary operators in one formula. Chains build left-deep trees,
/// so this also bounds how deep evaluation recurses.
pub(crate) const MAX_OPERATORS: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// The complete set of callable functions. Nothing outside this list can be
/// invoked from formula text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Function {
    Round,
    Ceil,
    Floor,
    Abs,
    Min,
    Max,
    Concat,
    Uppercase,
    Lowercase,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "round" => Some(Function::Round),
            "ceil" => Some(Function::Ceil),
            "floor" => Some(Function::Floor),
            "abs" => Some(Function::Abs),
            "min" => Some(Function::Min),
            "max" => Some(Function::Max),
            "concat" => Some(Function::Concat),
            "uppercase" => Some(Function::Uppercase),
            "lowercase" => Some(Function::Lowercase),
            _ => None,
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            Function::Round => "round",
            Function::Ceil => "ceil",
            Function::Floor => "floor",
            Function::Abs => "abs",
            Function::Min => "min",
            Function::Max => "max",
            Function::Concat => "concat",
            Function::Uppercase => "uppercase",
            Function::Lowercase => "lowercase",
        }
    }

    fn check_arity(&self, found: usize) -> Result<(), EvalError> {
        let (ok, expected) = match self {
            Function::Round => ((1..=2).contains(&found), "1 or 2"),
            Function::Ceil
            | Function::Floor
            | Function::Abs
            | Function::Uppercase
            | Function::Lowercase => (found == 1, "1"),
            Function::Min | Function::Max => (found >= 1, "at least 1"),
            Function::Concat => (true, "any"),
        };
        if ok {
            Ok(())
        } else {
            Err(EvalError::Arity {
                function: self.name(),
                expected,
                found,
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Number(f64),
    Text(String),
    Negate(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
    },
}

pub(crate) fn parse(tokens: Vec<Spanned>) -> Result<Expr, EvalError> {
    if tokens.is_empty() {
        return Err(EvalError::Empty);
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        operators: 0,
    };
    let expr = parser.expr()?;
    if let Some(extra) = parser.tokens.get(parser.pos) {
        return Err(EvalError::UnexpectedToken {
            found: extra.token.describe(),
            position: extra.position,
        });
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
    operators: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|spanned| &spanned.token)
    }

    fn next(&mut self) -> Result<Spanned, EvalError> {
        let spanned = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(EvalError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(spanned)
    }

    fn expect(&mut self, expected: &Token) -> Result<(), EvalError> {
        let spanned = self.next()?;
        if &spanned.token == expected {
            Ok(())
        } else {
            Err(EvalError::UnexpectedToken {
                found: spanned.token.describe(),
                position: spanned.position,
            })
        }
    }

    fn descend(&mut self) -> Result<(), EvalError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(EvalError::TooDeep { limit: MAX_DEPTH });
        }
        Ok(())
    }

    fn binary_operator(&mut self) -> Result<(), EvalError> {
        self.operators += 1;
        if self.operators > MAX_OPERATORS {
            return Err(EvalError::TooManyOperators {
                limit: MAX_OPERATORS,
            });
        }
        self.pos += 1;
        Ok(())
    }

    fn expr(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.binary_operator()?;
            let right = self.term()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn term(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(left),
            };
            self.binary_operator()?;
            let right = self.unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn unary(&mut self) -> Result<Expr, EvalError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                self.descend()?;
                let inner = self.unary()?;
                self.depth -= 1;
                Ok(Expr::Negate(Box::new(inner)))
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.descend()?;
                let inner = self.unary()?;
                self.depth -= 1;
                Ok(inner)
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expr, EvalError> {
        let spanned = self.next()?;
        match spanned.token {
            Token::Number(value) => Ok(Expr::Number(value)),
            Token::Text(value) => Ok(Expr::Text(value)),
            Token::LParen => {
                self.descend()?;
                let inner = self.expr()?;
                self.expect(&Token::RParen)?;
                self.depth -= 1;
                Ok(inner)
            }
            Token::Ident(name) => {
                let function =
                    Function::from_name(&name).ok_or(EvalError::UnknownFunction(name))?;
                self.expect(&Token::LParen)?;
                self.descend()?;
                let args = self.arguments()?;
                self.depth -= 1;
                function.check_arity(args.len())?;
                Ok(Expr::Call { function, args })
            }
            other => Err(EvalError::UnexpectedToken {
                found: other.describe(),
                position: spanned.position,
            }),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, EvalError> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            let spanned = self.next()?;
            match spanned.token {
                Token::Comma => continue,
                Token::RParen => return Ok(args),
                other => {
                    return Err(EvalError::UnexpectedToken {
                        found: other.describe(),
                        position: spanned.position,
                    });
                }
            }
        }
    }
}
