//! 式のパーサー
//!
//! C# 風の式の部分集合を再帰下降で解析し、未解決の [`Expression`] を作ります。
//!
//! ```text
//! assignment  := unary ( '=' assignment )?
//! unary       := '*' unary | '&' unary | '-' unary | '(' type ')' unary | postfix
//! postfix     := primary ( '.' ident | '(' args ')' | '[' args ']' | '->' ident )*
//! primary     := literal | ident | 'this' | 'base' | 'null' | 'new' type '(' args ')'
//!              | 'typeof' '(' type ')' | '$' ident | '%' ident | '(' assignment ')'
//! type        := ident ( '.' ident )* ( '*' | '[' ','* ']' | '?' )*
//! ```

use crate::errors::EvalError;
use crate::expression::{ExprKind, Expression};
use crate::token::{tokenize, Keyword, Punct, Token};
use crate::Result;
use mirra_types::Scalar;

/// 式をパースする
pub fn parse_expression(input: &str) -> Result<Expression> {
    let mut parser = Parser::new(input);
    if parser.at(&Token::Eof) {
        return Err(EvalError::syntax(0, "expected an expression"));
    }
    let expr = parser.assignment()?;
    parser.expect_eof()?;
    Ok(expr)
}

/// 型名をパースする
pub fn parse_type(input: &str) -> Result<Expression> {
    let mut parser = Parser::new(input);
    let ty = parser.type_name()?;
    parser.expect_eof()?;
    Ok(ty)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn new(input: &str) -> Self {
        Self {
            tokens: tokenize(input),
            pos: 0,
        }
    }

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let index = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[index].1
    }

    fn position(&self) -> usize {
        let index = self.pos.min(self.tokens.len() - 1);
        self.tokens[index].0
    }

    fn at(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn at_punct(&self, p: Punct) -> bool {
        self.at(&Token::Punct(p))
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat_punct(&mut self, p: Punct) -> bool {
        if self.at_punct(p) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn error<T>(&self, expected: &str) -> Result<T> {
        match self.peek() {
            Token::Error(message) => Err(EvalError::syntax(self.position(), message.clone())),
            other => Err(EvalError::syntax(
                self.position(),
                format!("expected {}, found {}", expected, other),
            )),
        }
    }

    fn expect_punct(&mut self, p: Punct) -> Result<()> {
        if self.eat_punct(p) {
            Ok(())
        } else {
            self.error(&format!("`{}`", p))
        }
    }

    fn expect_eof(&self) -> Result<()> {
        if self.at(&Token::Eof) {
            Ok(())
        } else {
            self.error("end of input")
        }
    }

    fn identifier(&mut self) -> Result<String> {
        match self.peek() {
            Token::Identifier { name, .. } => {
                let name = name.clone();
                self.bump();
                Ok(name)
            }
            _ => self.error("an identifier"),
        }
    }

    fn assignment(&mut self) -> Result<Expression> {
        let target = self.unary()?;
        if self.eat_punct(Punct::Assign) {
            let value = self.assignment()?;
            return Ok(Expression::new(ExprKind::Assign {
                target: Box::new(target),
                value: Box::new(value),
            }));
        }
        Ok(target)
    }

    fn unary(&mut self) -> Result<Expression> {
        if self.eat_punct(Punct::Star) {
            return Ok(Expression::new(ExprKind::Deref(Box::new(self.unary()?))));
        }
        if self.eat_punct(Punct::Amp) {
            return Ok(Expression::new(ExprKind::AddressOf(Box::new(self.unary()?))));
        }
        if self.eat_punct(Punct::Minus) {
            let operand = self.unary()?;
            if let ExprKind::Literal(value) = &operand.kind {
                if let Some(negated) = negate_literal(value) {
                    return Ok(Expression::new(ExprKind::Literal(negated)));
                }
            }
            return Ok(Expression::new(ExprKind::Negate(Box::new(operand))));
        }
        if self.at_punct(Punct::LParen) {
            if let Some(ty) = self.try_cast_prefix() {
                let operand = self.unary()?;
                return Ok(Expression::new(ExprKind::Cast {
                    ty: Box::new(ty),
                    operand: Box::new(operand),
                }));
            }
        }
        self.postfix()
    }

    /// `(` 型 `)` の後に単項式が続くならキャストとして読み進める
    fn try_cast_prefix(&mut self) -> Option<Expression> {
        let save = self.pos;
        self.bump();
        let ty = match self.type_name() {
            Ok(ty) if self.eat_punct(Punct::RParen) && self.starts_unary() => ty,
            _ => {
                self.pos = save;
                return None;
            }
        };
        Some(ty)
    }

    fn starts_unary(&self) -> bool {
        match self.peek() {
            Token::Identifier { .. } | Token::Literal(_) | Token::Keyword(_) => true,
            Token::Punct(p) => matches!(
                p,
                Punct::LParen | Punct::Dollar | Punct::Percent | Punct::Minus | Punct::Star | Punct::Amp
            ),
            _ => false,
        }
    }

    fn type_name(&mut self) -> Result<Expression> {
        let mut ty = Expression::new(ExprKind::Identifier(self.identifier()?));
        while self.at_punct(Punct::Dot) {
            self.bump();
            let name = self.identifier()?;
            ty = Expression::new(ExprKind::MemberAccess {
                left: Box::new(ty),
                name,
            });
        }
        loop {
            if self.eat_punct(Punct::Star) {
                ty = Expression::new(ExprKind::PointerType(Box::new(ty)));
            } else if self.eat_punct(Punct::Question) {
                ty = Expression::new(ExprKind::NullableType(Box::new(ty)));
            } else if self.at_punct(Punct::LBracket)
                && matches!(self.peek_at(1), Token::Punct(Punct::RBracket | Punct::Comma))
            {
                self.bump();
                let mut rank = 1;
                while self.eat_punct(Punct::Comma) {
                    rank += 1;
                }
                self.expect_punct(Punct::RBracket)?;
                ty = Expression::new(ExprKind::ArrayType {
                    element: Box::new(ty),
                    rank,
                });
            } else {
                return Ok(ty);
            }
        }
    }

    fn arguments(&mut self, close: Punct) -> Result<Vec<Expression>> {
        let mut args = Vec::new();
        if self.eat_punct(close) {
            return Ok(args);
        }
        loop {
            args.push(self.assignment()?);
            if self.eat_punct(Punct::Comma) {
                continue;
            }
            self.expect_punct(close)?;
            return Ok(args);
        }
    }

    fn postfix(&mut self) -> Result<Expression> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Token::Punct(Punct::Dot) => {
                    self.bump();
                    let name = self.identifier()?;
                    expr = Expression::new(ExprKind::MemberAccess {
                        left: Box::new(expr),
                        name,
                    });
                }
                Token::Punct(Punct::Arrow) => {
                    self.bump();
                    let name = self.identifier()?;
                    let deref = Expression::new(ExprKind::Deref(Box::new(expr)));
                    expr = Expression::new(ExprKind::MemberAccess {
                        left: Box::new(deref),
                        name,
                    });
                }
                Token::Punct(Punct::LParen) => {
                    self.bump();
                    let args = self.arguments(Punct::RParen)?;
                    expr = Expression::new(ExprKind::Invocation {
                        callee: Box::new(expr),
                        args,
                    });
                }
                Token::Punct(Punct::LBracket) => {
                    self.bump();
                    let indices = self.arguments(Punct::RBracket)?;
                    if indices.is_empty() {
                        return self.error("an index");
                    }
                    expr = Expression::new(ExprKind::Index {
                        array: Box::new(expr),
                        indices,
                    });
                }
                _ => return Ok(expr),
            }
        }
    }

    fn primary(&mut self) -> Result<Expression> {
        let kind = match self.peek().clone() {
            Token::Literal(value) => {
                self.bump();
                ExprKind::Literal(value)
            }
            Token::Identifier { name, .. } => {
                self.bump();
                ExprKind::Identifier(name)
            }
            Token::Keyword(Keyword::This) => {
                self.bump();
                ExprKind::This
            }
            Token::Keyword(Keyword::Base) => {
                self.bump();
                ExprKind::Base
            }
            Token::Keyword(Keyword::Null) => {
                self.bump();
                ExprKind::Null
            }
            Token::Keyword(Keyword::New) => {
                self.bump();
                let ty = self.type_name()?;
                self.expect_punct(Punct::LParen)?;
                let args = self.arguments(Punct::RParen)?;
                ExprKind::New {
                    ty: Box::new(ty),
                    args,
                }
            }
            Token::Keyword(Keyword::Typeof) => {
                self.bump();
                self.expect_punct(Punct::LParen)?;
                let ty = self.type_name()?;
                self.expect_punct(Punct::RParen)?;
                ExprKind::TypeOf(Box::new(ty))
            }
            Token::Punct(Punct::Dollar | Punct::Percent) => {
                self.bump();
                ExprKind::Register(self.identifier()?)
            }
            Token::Punct(Punct::LParen) => {
                self.bump();
                let inner = self.assignment()?;
                self.expect_punct(Punct::RParen)?;
                return Ok(inner);
            }
            _ => return self.error("an expression"),
        };
        Ok(Expression::new(kind))
    }
}

/// 数値リテラルの符号を反転する（収まる最小の符号付き型を選ぶ）
fn negate_literal(value: &Scalar) -> Option<Scalar> {
    Some(match value {
        Scalar::Single(v) => Scalar::Single(-v),
        Scalar::Double(v) => Scalar::Double(-v),
        Scalar::Decimal(d) => Scalar::Decimal(mirra_types::Decimal::new(-d.mantissa(), d.scale())),
        Scalar::Int32(_) | Scalar::UInt32(_) | Scalar::Int64(_) | Scalar::UInt64(_) => {
            let negated = -value.as_i128()?;
            if let Ok(v) = i32::try_from(negated) {
                Scalar::Int32(v)
            } else {
                Scalar::Int64(i64::try_from(negated).ok()?)
            }
        }
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_literal() {
        let expr = parse_expression("5").unwrap();
        assert_eq!(expr.kind, ExprKind::Literal(Scalar::Int32(5)));
    }

    #[test]
    fn test_negative_literal_is_folded() {
        let expr = parse_expression("-2147483648").unwrap();
        assert_eq!(expr.kind, ExprKind::Literal(Scalar::Int32(i32::MIN)));
        let expr = parse_expression("-x").unwrap();
        assert!(matches!(expr.kind, ExprKind::Negate(_)));
    }

    #[test]
    fn test_parse_member_chain_and_call() {
        let expr = parse_expression("a.b.Method(1, \"s\")[2]").unwrap();
        let ExprKind::Index { array, indices } = &expr.kind else {
            panic!("expected index, got {:?}", expr.kind);
        };
        assert_eq!(indices.len(), 1);
        assert_eq!(array.name(), "a.b.Method(1, \"s\")");
    }

    #[test]
    fn test_cast_versus_parenthesised() {
        let cast = parse_expression("(Demo.B) derived").unwrap();
        assert!(matches!(cast.kind, ExprKind::Cast { .. }));
        let paren = parse_expression("(foo).Data").unwrap();
        assert!(matches!(paren.kind, ExprKind::MemberAccess { .. }));
        let pointer_cast = parse_expression("(int*) p").unwrap();
        let ExprKind::Cast { ty, .. } = &pointer_cast.kind else {
            panic!("expected cast");
        };
        assert!(matches!(ty.kind, ExprKind::PointerType(_)));
    }

    #[test]
    fn test_arrow_is_deref_then_member() {
        let expr = parse_expression("p->x").unwrap();
        let ExprKind::MemberAccess { left, name } = &expr.kind else {
            panic!("expected member access");
        };
        assert_eq!(name, "x");
        assert!(matches!(left.kind, ExprKind::Deref(_)));
    }

    #[test]
    fn test_assignment_and_registers() {
        let expr = parse_expression("$rax = 0x10").unwrap();
        let ExprKind::Assign { target, .. } = &expr.kind else {
            panic!("expected assignment");
        };
        assert_eq!(target.kind, ExprKind::Register("rax".to_string()));
    }

    #[test]
    fn test_new_and_typeof() {
        assert!(matches!(
            parse_expression("new Foo(3)").unwrap().kind,
            ExprKind::New { .. }
        ));
        let ty = parse_expression("typeof(int[,])").unwrap();
        let ExprKind::TypeOf(inner) = &ty.kind else {
            panic!("expected typeof");
        };
        assert_eq!(inner.kind, ExprKind::ArrayType {
            element: Box::new(Expression::new(ExprKind::Identifier("int".into()))),
            rank: 2
        });
    }

    #[test]
    fn test_syntax_errors_carry_position() {
        match parse_expression("foo.") {
            Err(EvalError::Syntax { position, .. }) => assert_eq!(position, 4),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(parse_expression(""), Err(EvalError::Syntax { .. })));
        assert!(matches!(parse_expression("\"abc"), Err(EvalError::Syntax { .. })));
        assert!(matches!(parse_expression("a b"), Err(EvalError::Syntax { .. })));
    }
}
