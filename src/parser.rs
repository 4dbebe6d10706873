//! Recursive-descent parser: token stream → executable tree.
//!
//! Class declarations are resolved while parsing, so instantiations and base
//! classes bind to their descriptors here rather than by name at runtime.
//! Every method body is wrapped in `MethodBody`, the return sink.

use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;

use crate::ast::{Comparator, Statement, VariableValue};
use crate::runtime::{Class, Method};
use crate::token::Token;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Expected {expected}, got {found:?}")]
    UnexpectedToken { expected: String, found: Token },
    #[error("Unknown class '{name}'")]
    UnknownClass { name: String },
    #[error("Unknown base class '{name}'")]
    UnknownBaseClass { name: String },
}

pub type ParseResult<T> = Result<T, ParseError>;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    classes: HashMap<String, Rc<Class>>,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last() != Some(&Token::Eof) {
            tokens.push(Token::Eof);
        }
        Self {
            tokens,
            pos: 0,
            classes: HashMap::new(),
        }
    }

    /// Parses the whole program into the top-level compound statement.
    pub fn parse_program(mut self) -> ParseResult<Statement> {
        let mut statements = Vec::new();
        while self.current() != &Token::Eof {
            if self.consume_newlines() {
                continue;
            }
            if self.current() == &Token::Class {
                statements.push(self.parse_class_definition()?);
            } else {
                statements.push(self.parse_statement()?);
            }
        }
        Ok(Statement::Compound { statements })
    }

    fn parse_statement(&mut self) -> ParseResult<Statement> {
        match self.current() {
            Token::If => self.parse_if(),
            Token::Print => self.parse_print(),
            Token::Return => self.parse_return(),
            _ => {
                let statement = if self.lookahead_is_assignment() {
                    self.parse_assignment()?
                } else {
                    self.parse_expression()?
                };
                self.expect(Token::Newline, "newline")?;
                Ok(statement)
            }
        }
    }

    fn parse_class_definition(&mut self) -> ParseResult<Statement> {
        self.advance(); // class
        let name = self.expect_id()?;
        let parent = if self.current() == &Token::Char('(') {
            self.advance();
            let parent_name = self.expect_id()?;
            self.expect(Token::Char(')'), "')'")?;
            let parent = self
                .classes
                .get(&parent_name)
                .cloned()
                .ok_or(ParseError::UnknownBaseClass { name: parent_name })?;
            Some(parent)
        } else {
            None
        };
        self.expect(Token::Char(':'), "':'")?;
        self.expect(Token::Newline, "newline")?;
        self.expect(Token::Indent, "indented class body")?;

        let mut methods = Vec::new();
        while self.current() != &Token::Dedent && self.current() != &Token::Eof {
            if self.consume_newlines() {
                continue;
            }
            methods.push(self.parse_method()?);
        }
        self.expect(Token::Dedent, "dedent")?;

        let class = Rc::new(Class::new(name.clone(), methods, parent));
        self.classes.insert(name, Rc::clone(&class));
        Ok(Statement::ClassDefinition { class })
    }

    fn parse_method(&mut self) -> ParseResult<Method> {
        self.expect(Token::Def, "'def'")?;
        let name = self.expect_id()?;
        self.expect(Token::Char('('), "'('")?;
        let mut formal_params = Vec::new();
        if self.current() != &Token::Char(')') {
            formal_params.push(self.expect_id()?);
            while self.current() == &Token::Char(',') {
                self.advance();
                formal_params.push(self.expect_id()?);
            }
        }
        self.expect(Token::Char(')'), "')'")?;
        self.expect(Token::Char(':'), "':'")?;
        let body = self.parse_suite()?;
        Ok(Method {
            name,
            formal_params,
            body: Rc::new(Statement::MethodBody {
                body: Box::new(body),
            }),
        })
    }

    fn parse_suite(&mut self) -> ParseResult<Statement> {
        self.expect(Token::Newline, "newline")?;
        self.expect(Token::Indent, "indented block")?;
        let mut statements = Vec::new();
        while self.current() != &Token::Dedent && self.current() != &Token::Eof {
            if self.consume_newlines() {
                continue;
            }
            statements.push(self.parse_statement()?);
        }
        self.expect(Token::Dedent, "dedent")?;
        Ok(Statement::Compound { statements })
    }

    fn parse_if(&mut self) -> ParseResult<Statement> {
        self.advance(); // if
        let condition = self.parse_expression()?;
        self.expect(Token::Char(':'), "':'")?;
        let if_body = self.parse_suite()?;
        let else_body = if self.current() == &Token::Else {
            self.advance();
            self.expect(Token::Char(':'), "':'")?;
            Some(Box::new(self.parse_suite()?))
        } else {
            None
        };
        Ok(Statement::IfElse {
            condition: Box::new(condition),
            if_body: Box::new(if_body),
            else_body,
        })
    }

    fn parse_print(&mut self) -> ParseResult<Statement> {
        self.advance(); // print
        let mut args = Vec::new();
        if self.current() != &Token::Newline {
            args.push(self.parse_expression()?);
            while self.current() == &Token::Char(',') {
                self.advance();
                args.push(self.parse_expression()?);
            }
        }
        self.expect(Token::Newline, "newline")?;
        Ok(Statement::Print { args })
    }

    fn parse_return(&mut self) -> ParseResult<Statement> {
        self.advance(); // return
        let statement = if self.current() == &Token::Newline {
            Statement::None
        } else {
            self.parse_expression()?
        };
        self.expect(Token::Newline, "newline")?;
        Ok(Statement::Return {
            statement: Box::new(statement),
        })
    }

    /// True when the statement ahead is `id ('.' id)* '='`.
    fn lookahead_is_assignment(&self) -> bool {
        if !matches!(self.current(), Token::Id(_)) {
            return false;
        }
        let mut offset = 1;
        loop {
            match self.peek(offset) {
                Token::Char('=') => return true,
                Token::Char('.') => {
                    if matches!(self.peek(offset + 1), Token::Id(_)) {
                        offset += 2;
                    } else {
                        return false;
                    }
                }
                _ => return false,
            }
        }
    }

    fn parse_assignment(&mut self) -> ParseResult<Statement> {
        let head = self.expect_id()?;
        let mut tail = Vec::new();
        while self.current() == &Token::Char('.') {
            self.advance();
            tail.push(self.expect_id()?);
        }
        self.expect(Token::Char('='), "'='")?;
        let rv = Box::new(self.parse_expression()?);
        match tail.pop() {
            None => Ok(Statement::Assignment { var: head, rv }),
            Some(field) => Ok(Statement::FieldAssignment {
                object: VariableValue::dotted(head, tail),
                field,
                rv,
            }),
        }
    }

    fn parse_expression(&mut self) -> ParseResult<Statement> {
        self.parse_or_test()
    }

    fn parse_or_test(&mut self) -> ParseResult<Statement> {
        let mut expr = self.parse_and_test()?;
        while self.current() == &Token::Or {
            self.advance();
            let rhs = self.parse_and_test()?;
            expr = Statement::Or {
                lhs: Box::new(expr),
                rhs: Box::new(rhs),
            };
        }
        Ok(expr)
    }

    fn parse_and_test(&mut self) -> ParseResult<Statement> {
        let mut expr = self.parse_not_test()?;
        while self.current() == &Token::And {
            self.advance();
            let rhs = self.parse_not_test()?;
            expr = Statement::And {
                lhs: Box::new(expr),
                rhs: Box::new(rhs),
            };
        }
        Ok(expr)
    }

    fn parse_not_test(&mut self) -> ParseResult<Statement> {
        if self.current() == &Token::Not {
            self.advance();
            let arg = self.parse_not_test()?;
            return Ok(Statement::Not { arg: Box::new(arg) });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> ParseResult<Statement> {
        let lhs = self.parse_additive()?;
        let cmp = match self.current() {
            Token::Eq => Comparator::Equal,
            Token::NotEq => Comparator::NotEqual,
            Token::Char('<') => Comparator::Less,
            Token::Char('>') => Comparator::Greater,
            Token::LessOrEq => Comparator::LessOrEqual,
            Token::GreaterOrEq => Comparator::GreaterOrEqual,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_additive()?;
        Ok(Statement::Comparison {
            cmp,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn parse_additive(&mut self) -> ParseResult<Statement> {
        let mut expr = self.parse_term()?;
        loop {
            if self.current() == &Token::Char('+') {
                self.advance();
                let rhs = self.parse_term()?;
                expr = Statement::Add {
                    lhs: Box::new(expr),
                    rhs: Box::new(rhs),
                };
            } else if self.current() == &Token::Char('-') {
                self.advance();
                let rhs = self.parse_term()?;
                expr = Statement::Sub {
                    lhs: Box::new(expr),
                    rhs: Box::new(rhs),
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_term(&mut self) -> ParseResult<Statement> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.current() == &Token::Char('*') {
                self.advance();
                let rhs = self.parse_primary()?;
                expr = Statement::Mult {
                    lhs: Box::new(expr),
                    rhs: Box::new(rhs),
                };
            } else if self.current() == &Token::Char('/') {
                self.advance();
                let rhs = self.parse_primary()?;
                expr = Statement::Div {
                    lhs: Box::new(expr),
                    rhs: Box::new(rhs),
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> ParseResult<Statement> {
        let mut expr = match self.current().clone() {
            Token::Number(value) => {
                self.advance();
                Statement::NumericConst(value)
            }
            Token::String(text) => {
                self.advance();
                Statement::StringConst(text)
            }
            Token::True => {
                self.advance();
                Statement::BoolConst(true)
            }
            Token::False => {
                self.advance();
                Statement::BoolConst(false)
            }
            Token::None => {
                self.advance();
                Statement::None
            }
            Token::Char('(') => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(Token::Char(')'), "')'")?;
                expr
            }
            Token::Id(name) => {
                self.advance();
                self.parse_name_expression(name)?
            }
            _ => return Err(self.error("expression")),
        };

        // Postfix: field accesses extend a dotted name; a trailing argument
        // list turns the last segment into a method call.
        while self.current() == &Token::Char('.') {
            self.advance();
            let name = self.expect_id()?;
            if self.current() == &Token::Char('(') {
                let args = self.parse_call_args()?;
                expr = Statement::MethodCall {
                    object: Box::new(expr),
                    method: name,
                    args,
                };
            } else if let Statement::Variable(access) = &mut expr {
                access.tail.push(name);
            } else {
                return Err(self.error("'(' to call a method on an expression"));
            }
        }
        Ok(expr)
    }

    /// An identifier in expression position: `str(…)` stringifies, a declared
    /// class name followed by arguments instantiates, anything else is a
    /// variable reference.
    fn parse_name_expression(&mut self, name: String) -> ParseResult<Statement> {
        if self.current() != &Token::Char('(') {
            return Ok(Statement::Variable(VariableValue::new(name)));
        }
        if name == "str" {
            self.advance();
            let arg = self.parse_expression()?;
            self.expect(Token::Char(')'), "')'")?;
            return Ok(Statement::Stringify { arg: Box::new(arg) });
        }
        let class = self
            .classes
            .get(&name)
            .cloned()
            .ok_or(ParseError::UnknownClass { name })?;
        let args = self.parse_call_args()?;
        Ok(Statement::NewInstance { class, args })
    }

    fn parse_call_args(&mut self) -> ParseResult<Vec<Statement>> {
        self.expect(Token::Char('('), "'('")?;
        let mut args = Vec::new();
        if self.current() != &Token::Char(')') {
            args.push(self.parse_expression()?);
            while self.current() == &Token::Char(',') {
                self.advance();
                args.push(self.parse_expression()?);
            }
        }
        self.expect(Token::Char(')'), "')'")?;
        Ok(args)
    }

    fn consume_newlines(&mut self) -> bool {
        let mut consumed = false;
        while self.current() == &Token::Newline {
            consumed = true;
            self.advance();
        }
        consumed
    }

    // The buffer always ends with `Eof`, so clamping an index to the last
    // element keeps every access in bounds.
    fn current(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek(&self, offset: usize) -> &Token {
        let index = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[index]
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, token: Token, expected: &str) -> ParseResult<()> {
        if self.current() == &token {
            self.advance();
            Ok(())
        } else {
            Err(self.error(expected))
        }
    }

    fn expect_id(&mut self) -> ParseResult<String> {
        if let Token::Id(name) = self.current() {
            let name = name.clone();
            self.advance();
            Ok(name)
        } else {
            Err(self.error("identifier"))
        }
    }

    fn error(&self, expected: &str) -> ParseError {
        ParseError::UnexpectedToken {
            expected: expected.to_string(),
            found: self.current().clone(),
        }
    }
}

/// Parses a token stream (as produced by `lexer::tokenize`) into the
/// top-level compound statement.
pub fn parse(tokens: Vec<Token>) -> ParseResult<Statement> {
    Parser::new(tokens).parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use indoc::indoc;

    fn parse_source(source: &str) -> ParseResult<Statement> {
        parse(tokenize(source).expect("tokenize should succeed"))
    }

    fn top_level(source: &str) -> Vec<Statement> {
        match parse_source(source).expect("parse should succeed") {
            Statement::Compound { statements } => statements,
            other => panic!("expected top-level compound, got {other:?}"),
        }
    }

    #[test]
    fn parses_assignment_and_print() {
        let statements = top_level("x = 1 + 2\nprint x, \"done\"\n");
        assert_eq!(statements.len(), 2);

        match &statements[0] {
            Statement::Assignment { var, rv } => {
                assert_eq!(var, "x");
                assert!(matches!(**rv, Statement::Add { .. }));
            }
            other => panic!("expected assignment, got {other:?}"),
        }
        match &statements[1] {
            Statement::Print { args } => assert_eq!(args.len(), 2),
            other => panic!("expected print, got {other:?}"),
        }
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let statements = top_level("x = 1 + 2 * 3\n");
        let Statement::Assignment { rv, .. } = &statements[0] else {
            panic!("expected assignment");
        };
        let Statement::Add { lhs, rhs } = &**rv else {
            panic!("expected addition at the top");
        };
        assert!(matches!(**lhs, Statement::NumericConst(1)));
        assert!(matches!(**rhs, Statement::Mult { .. }));
    }

    #[test]
    fn boolean_operators_nest_around_comparisons() {
        let statements = top_level("x = not a > 1 and b or c\n");
        let Statement::Assignment { rv, .. } = &statements[0] else {
            panic!("expected assignment");
        };
        // or(and(not(>), b), c)
        let Statement::Or { lhs, .. } = &**rv else {
            panic!("expected or at the top");
        };
        let Statement::And { lhs: and_lhs, .. } = &**lhs else {
            panic!("expected and under or");
        };
        let Statement::Not { arg } = &**and_lhs else {
            panic!("expected not under and");
        };
        assert!(matches!(
            **arg,
            Statement::Comparison {
                cmp: Comparator::Greater,
                ..
            }
        ));
    }

    #[test]
    fn dotted_name_becomes_variable_with_tail() {
        let statements = top_level("print circle.center.x\n");
        let Statement::Print { args } = &statements[0] else {
            panic!("expected print");
        };
        let Statement::Variable(access) = &args[0] else {
            panic!("expected variable access");
        };
        assert_eq!(access.name, "circle");
        assert_eq!(access.tail, vec!["center".to_string(), "x".to_string()]);
    }

    #[test]
    fn dotted_lhs_becomes_field_assignment_on_the_prefix() {
        let statements = top_level("a.b.c = 5\n");
        let Statement::FieldAssignment { object, field, rv } = &statements[0] else {
            panic!("expected field assignment");
        };
        assert_eq!(object.name, "a");
        assert_eq!(object.tail, vec!["b".to_string()]);
        assert_eq!(field, "c");
        assert!(matches!(**rv, Statement::NumericConst(5)));
    }

    #[test]
    fn parses_class_definition_and_instantiation() {
        let statements = top_level(indoc! {"
            class Point:
              def __init__(x, y):
                self.x = x
                self.y = y
            p = Point(1, 2)
        "});

        let Statement::ClassDefinition { class } = &statements[0] else {
            panic!("expected class definition");
        };
        assert_eq!(class.name(), "Point");
        let init = class.method("__init__").expect("__init__ should exist");
        assert_eq!(init.formal_params, vec!["x".to_string(), "y".to_string()]);
        assert!(matches!(*init.body, Statement::MethodBody { .. }));

        let Statement::Assignment { rv, .. } = &statements[1] else {
            panic!("expected assignment");
        };
        let Statement::NewInstance { class, args } = &**rv else {
            panic!("expected instantiation");
        };
        assert_eq!(class.name(), "Point");
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn base_class_resolves_to_the_declared_descriptor() {
        let statements = top_level(indoc! {"
            class A:
              def f():
                return 1
            class B(A):
              def g():
                return 2
        "});
        let Statement::ClassDefinition { class } = &statements[1] else {
            panic!("expected class definition");
        };
        assert_eq!(class.name(), "B");
        assert!(class.method("f").is_some(), "parent methods must be visible");
    }

    #[test]
    fn unknown_base_class_is_rejected() {
        let err = parse_source("class B(Missing):\n  def f():\n    return 1\n")
            .expect_err("expected unknown base class failure");
        assert_eq!(
            err,
            ParseError::UnknownBaseClass {
                name: "Missing".to_string(),
            }
        );
    }

    #[test]
    fn calling_an_undeclared_name_is_rejected() {
        let err = parse_source("x = Missing()\n").expect_err("expected unknown class failure");
        assert_eq!(
            err,
            ParseError::UnknownClass {
                name: "Missing".to_string(),
            }
        );
    }

    #[test]
    fn str_call_becomes_stringify() {
        let statements = top_level("s = str(1 + 2)\n");
        let Statement::Assignment { rv, .. } = &statements[0] else {
            panic!("expected assignment");
        };
        assert!(matches!(**rv, Statement::Stringify { .. }));
    }

    #[test]
    fn method_calls_chain_through_postfix_position() {
        let statements = top_level(indoc! {"
            class A:
              def f():
                return self
            a = A()
            a.f().f()
        "});
        let Statement::MethodCall {
            object, method, ..
        } = &statements[2]
        else {
            panic!("expected method call statement");
        };
        assert_eq!(method, "f");
        assert!(matches!(**object, Statement::MethodCall { .. }));
    }

    #[test]
    fn field_access_on_a_call_result_is_rejected() {
        let err = parse_source(indoc! {"
            class A:
              def f():
                return self
            x = A().f().field
        "})
        .expect_err("expected postfix failure");
        assert!(matches!(err, ParseError::UnexpectedToken { .. }));
    }

    #[test]
    fn bare_return_yields_none() {
        let statements = top_level(indoc! {"
            class A:
              def f():
                return
        "});
        let Statement::ClassDefinition { class } = &statements[0] else {
            panic!("expected class definition");
        };
        let body = &class.method("f").expect("method f").body;
        let Statement::MethodBody { body } = &**body else {
            panic!("expected method body wrapper");
        };
        let Statement::Compound { statements } = &**body else {
            panic!("expected compound body");
        };
        let Statement::Return { statement } = &statements[0] else {
            panic!("expected return");
        };
        assert!(matches!(**statement, Statement::None));
    }

    #[test]
    fn if_without_else_and_with_else_both_parse() {
        let statements = top_level(indoc! {"
            if x > 1:
              print 1
            if x > 1:
              print 1
            else:
              print 2
        "});
        assert!(matches!(
            &statements[0],
            Statement::IfElse {
                else_body: None,
                ..
            }
        ));
        assert!(matches!(
            &statements[1],
            Statement::IfElse {
                else_body: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn reports_the_unexpected_token() {
        let err = parse_source("x = = 1\n").expect_err("expected parse failure");
        assert_eq!(
            err,
            ParseError::UnexpectedToken {
                expected: "expression".to_string(),
                found: Token::Char('='),
            }
        );
    }
}
