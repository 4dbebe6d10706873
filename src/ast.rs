//! Executable syntax tree.
//!
//! The parser builds these nodes once; the interpreter walks them directly.
//! Class descriptors are resolved at parse time, so `NewInstance` and
//! `ClassDefinition` carry their `runtime::Class` rather than a name.

use std::rc::Rc;

use crate::runtime::Class;

/// A variable or a dotted chain of instance fields (`circle.center.x`).
#[derive(Debug, Clone, PartialEq)]
pub struct VariableValue {
    pub name: String,
    pub tail: Vec<String>,
}

impl VariableValue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tail: Vec::new(),
        }
    }

    pub fn dotted(name: impl Into<String>, tail: Vec<String>) -> Self {
        Self {
            name: name.into(),
            tail,
        }
    }
}

/// The six comparison predicates. `Equal` and `Less` are primitive; the rest
/// are boolean compositions of the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Equal,
    NotEqual,
    Less,
    Greater,
    LessOrEqual,
    GreaterOrEqual,
}

#[derive(Debug, Clone)]
pub enum Statement {
    NumericConst(i64),
    StringConst(String),
    BoolConst(bool),
    None,
    Variable(VariableValue),
    Assignment {
        var: String,
        rv: Box<Statement>,
    },
    FieldAssignment {
        object: VariableValue,
        field: String,
        rv: Box<Statement>,
    },
    Print {
        args: Vec<Statement>,
    },
    Stringify {
        arg: Box<Statement>,
    },
    Add {
        lhs: Box<Statement>,
        rhs: Box<Statement>,
    },
    Sub {
        lhs: Box<Statement>,
        rhs: Box<Statement>,
    },
    Mult {
        lhs: Box<Statement>,
        rhs: Box<Statement>,
    },
    Div {
        lhs: Box<Statement>,
        rhs: Box<Statement>,
    },
    Or {
        lhs: Box<Statement>,
        rhs: Box<Statement>,
    },
    And {
        lhs: Box<Statement>,
        rhs: Box<Statement>,
    },
    Not {
        arg: Box<Statement>,
    },
    Comparison {
        cmp: Comparator,
        lhs: Box<Statement>,
        rhs: Box<Statement>,
    },
    MethodCall {
        object: Box<Statement>,
        method: String,
        args: Vec<Statement>,
    },
    NewInstance {
        class: Rc<Class>,
        args: Vec<Statement>,
    },
    Compound {
        statements: Vec<Statement>,
    },
    /// A single method invocation's body: the return sink for `Return`.
    MethodBody {
        body: Box<Statement>,
    },
    Return {
        statement: Box<Statement>,
    },
    ClassDefinition {
        class: Rc<Class>,
    },
    IfElse {
        condition: Box<Statement>,
        if_body: Box<Statement>,
        else_body: Option<Box<Statement>>,
    },
}
