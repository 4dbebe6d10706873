//! Runtime value and object model.
//!
//! Values live behind [`ObjectHolder`] handles; the empty handle doubles as
//! the `None` value. Classes are immutable descriptors shared by their
//! instances, and every scope (globals, method frames, instance fields) is a
//! [`Closure`] mapping names to handles.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::io::Write;
use std::rc::Rc;

use thiserror::Error;

use crate::ast::Statement;
use crate::interpreter::Flow;

pub(crate) const STR_METHOD: &str = "__str__";
pub(crate) const EQ_METHOD: &str = "__eq__";
pub(crate) const LESS_METHOD: &str = "__lt__";
pub(crate) const ADD_METHOD: &str = "__add__";
pub(crate) const INIT_METHOD: &str = "__init__";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("Variable '{name}' is not defined")]
    UndefinedVariable { name: String },
    #[error("Variable '{name}' is not a class instance")]
    NotAnInstance { name: String },
    #[error("Method call target is not a class instance")]
    MethodCallOnNonInstance,
    #[error("Field assignment target is not a class instance")]
    FieldAssignmentOnNonInstance,
    #[error("No method '{method}' with {arity} arguments in class '{class}'")]
    NoMethod {
        class: String,
        method: String,
        arity: usize,
    },
    #[error("Cannot compare these values")]
    IncomparableValues,
    #[error("Can add only numbers, strings, and instances with '__add__'")]
    InvalidAddition,
    #[error("Can subtract only numbers")]
    InvalidSubtraction,
    #[error("Can multiply only numbers")]
    InvalidMultiplication,
    #[error("Can divide only numbers")]
    InvalidDivision,
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Return outside of a method body")]
    ReturnOutsideMethod,
    #[error("Failed to write program output: {message}")]
    OutputWrite { message: String },
}

/// Side-effect carrier for evaluation: hands out the program output stream.
pub trait Context {
    fn output_stream(&mut self) -> &mut dyn Write;
}

/// Context writing program output to a caller-supplied stream.
pub struct SimpleContext<'a> {
    output: &'a mut dyn Write,
}

impl<'a> SimpleContext<'a> {
    pub fn new(output: &'a mut dyn Write) -> Self {
        Self { output }
    }
}

impl Context for SimpleContext<'_> {
    fn output_stream(&mut self) -> &mut dyn Write {
        self.output
    }
}

/// Context capturing program output in a buffer, for tests.
#[derive(Default)]
pub struct DummyContext {
    pub output: Vec<u8>,
}

impl DummyContext {
    pub fn rendered(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

impl Context for DummyContext {
    fn output_stream(&mut self) -> &mut dyn Write {
        &mut self.output
    }
}

/// Symbol table binding names to values. The global scope, each method call
/// frame and each instance's field table all share this shape.
pub type Closure = HashMap<String, ObjectHolder>;

#[derive(Debug)]
pub enum Object {
    Bool(bool),
    Number(i64),
    String(String),
    Class(Rc<Class>),
    Instance(ClassInstance),
}

/// Shared handle to a runtime value. The empty handle is the runtime
/// representation of `None`: it prints as `None`, is falsy, and equals other
/// empty handles. Cloning a holder shares the referent.
#[derive(Debug, Clone, Default)]
pub struct ObjectHolder(Option<Rc<Object>>);

impl ObjectHolder {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn own(object: Object) -> Self {
        Self(Some(Rc::new(object)))
    }

    pub fn number(value: i64) -> Self {
        Self::own(Object::Number(value))
    }

    pub fn boolean(value: bool) -> Self {
        Self::own(Object::Bool(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::own(Object::String(value.into()))
    }

    pub fn get(&self) -> Option<&Object> {
        self.0.as_deref()
    }

    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    pub fn as_number(&self) -> Option<i64> {
        match self.get() {
            Some(Object::Number(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self.get() {
            Some(Object::String(value)) => Some(value),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<&ClassInstance> {
        match self.get() {
            Some(Object::Instance(instance)) => Some(instance),
            _ => None,
        }
    }

    /// Renders the held value the way `print` shows it. An instance renders
    /// through its zero-argument `__str__` when one exists, otherwise as its
    /// address.
    pub fn to_output(&self, context: &mut dyn Context) -> Result<String, RuntimeError> {
        match self.get() {
            None => Ok("None".to_string()),
            Some(Object::Bool(value)) => Ok(if *value { "True" } else { "False" }.to_string()),
            Some(Object::Number(value)) => Ok(value.to_string()),
            Some(Object::String(value)) => Ok(value.clone()),
            Some(Object::Class(class)) => Ok(format!("Class {}", class.name())),
            Some(Object::Instance(instance)) => {
                if instance.has_method(STR_METHOD, 0) {
                    call_method(self, STR_METHOD, Vec::new(), context)?.to_output(context)
                } else {
                    Ok(format!("{:p}", instance as *const ClassInstance))
                }
            }
        }
    }
}

/// Truthiness: non-zero numbers, `True` and non-empty strings are truthy;
/// everything else, including classes and instances, is falsy.
pub fn is_true(object: &ObjectHolder) -> bool {
    match object.get() {
        Some(Object::Bool(value)) => *value,
        Some(Object::Number(value)) => *value != 0,
        Some(Object::String(value)) => !value.is_empty(),
        _ => false,
    }
}

/// A class method: name, formal parameter names and the body to execute per
/// invocation.
#[derive(Debug)]
pub struct Method {
    pub name: String,
    pub formal_params: Vec<String>,
    pub body: Rc<Statement>,
}

/// Immutable class descriptor with single inheritance.
#[derive(Debug)]
pub struct Class {
    name: String,
    methods: Vec<Method>,
    parent: Option<Rc<Class>>,
}

impl Class {
    pub fn new(name: impl Into<String>, methods: Vec<Method>, parent: Option<Rc<Class>>) -> Self {
        Self {
            name: name.into(),
            methods,
            parent,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finds `name` in this class's method list, then up the parent chain.
    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods
            .iter()
            .find(|method| method.name == name)
            .or_else(|| self.parent.as_ref().and_then(|parent| parent.method(name)))
    }
}

/// A class instance: its descriptor plus a field table filled in on first
/// assignment.
#[derive(Debug)]
pub struct ClassInstance {
    class: Rc<Class>,
    fields: RefCell<Closure>,
}

impl ClassInstance {
    pub fn new(class: Rc<Class>) -> Self {
        Self {
            class,
            fields: RefCell::new(Closure::new()),
        }
    }

    pub fn class(&self) -> &Class {
        &self.class
    }

    /// True when the class (or an ancestor) defines `method` taking exactly
    /// `argument_count` parameters.
    pub fn has_method(&self, method: &str, argument_count: usize) -> bool {
        self.class
            .method(method)
            .is_some_and(|found| found.formal_params.len() == argument_count)
    }

    pub fn fields(&self) -> Ref<'_, Closure> {
        self.fields.borrow()
    }

    pub fn fields_mut(&self) -> RefMut<'_, Closure> {
        self.fields.borrow_mut()
    }
}

/// Calls `method` on the instance held by `receiver`. The body runs in a
/// fresh frame holding only `self` and the formals bound to `actual_args`.
pub fn call_method(
    receiver: &ObjectHolder,
    method: &str,
    actual_args: Vec<ObjectHolder>,
    context: &mut dyn Context,
) -> Result<ObjectHolder, RuntimeError> {
    let instance = receiver
        .as_instance()
        .ok_or(RuntimeError::MethodCallOnNonInstance)?;
    let descriptor = instance
        .class()
        .method(method)
        .filter(|found| found.formal_params.len() == actual_args.len())
        .ok_or_else(|| RuntimeError::NoMethod {
            class: instance.class().name().to_string(),
            method: method.to_string(),
            arity: actual_args.len(),
        })?;

    let mut frame = Closure::new();
    frame.insert("self".to_string(), receiver.clone());
    for (param, value) in descriptor.formal_params.iter().zip(actual_args) {
        frame.insert(param.clone(), value);
    }

    match descriptor.body.execute(&mut frame, context) {
        Ok(value) => Ok(value),
        Err(Flow::Return(value)) => Ok(value),
        Err(Flow::Error(error)) => Err(error),
    }
}

/// `lhs == rhs`: primitives of the same kind compare by natural equality, an
/// instance left operand delegates to its `__eq__` (result coerced to bool),
/// and two empty holders are equal. Anything else cannot be compared.
pub fn equal(
    lhs: &ObjectHolder,
    rhs: &ObjectHolder,
    context: &mut dyn Context,
) -> Result<bool, RuntimeError> {
    match (lhs.get(), rhs.get()) {
        (Some(Object::Bool(l)), Some(Object::Bool(r))) => return Ok(l == r),
        (Some(Object::Number(l)), Some(Object::Number(r))) => return Ok(l == r),
        (Some(Object::String(l)), Some(Object::String(r))) => return Ok(l == r),
        _ => {}
    }
    if lhs.as_instance().is_some() {
        let result = call_method(lhs, EQ_METHOD, vec![rhs.clone()], context)?;
        return Ok(is_true(&result));
    }
    if lhs.is_none() && rhs.is_none() {
        return Ok(true);
    }
    Err(RuntimeError::IncomparableValues)
}

/// `lhs < rhs`: natural ordering on same-kind primitives (`False < True`,
/// strings lexicographic), `__lt__` dispatch on an instance left operand.
pub fn less(
    lhs: &ObjectHolder,
    rhs: &ObjectHolder,
    context: &mut dyn Context,
) -> Result<bool, RuntimeError> {
    match (lhs.get(), rhs.get()) {
        (Some(Object::Bool(l)), Some(Object::Bool(r))) => return Ok(l < r),
        (Some(Object::Number(l)), Some(Object::Number(r))) => return Ok(l < r),
        (Some(Object::String(l)), Some(Object::String(r))) => return Ok(l < r),
        _ => {}
    }
    if lhs.as_instance().is_some() {
        let result = call_method(lhs, LESS_METHOD, vec![rhs.clone()], context)?;
        return Ok(is_true(&result));
    }
    Err(RuntimeError::IncomparableValues)
}

pub fn not_equal(
    lhs: &ObjectHolder,
    rhs: &ObjectHolder,
    context: &mut dyn Context,
) -> Result<bool, RuntimeError> {
    Ok(!equal(lhs, rhs, context)?)
}

pub fn greater(
    lhs: &ObjectHolder,
    rhs: &ObjectHolder,
    context: &mut dyn Context,
) -> Result<bool, RuntimeError> {
    Ok(!(less(lhs, rhs, context)? || equal(lhs, rhs, context)?))
}

pub fn less_or_equal(
    lhs: &ObjectHolder,
    rhs: &ObjectHolder,
    context: &mut dyn Context,
) -> Result<bool, RuntimeError> {
    Ok(!greater(lhs, rhs, context)?)
}

pub fn greater_or_equal(
    lhs: &ObjectHolder,
    rhs: &ObjectHolder,
    context: &mut dyn Context,
) -> Result<bool, RuntimeError> {
    Ok(!less(lhs, rhs, context)?)
}

pub(crate) fn write_output(context: &mut dyn Context, text: &str) -> Result<(), RuntimeError> {
    context
        .output_stream()
        .write_all(text.as_bytes())
        .map_err(|error| RuntimeError::OutputWrite {
            message: error.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method(name: &str, params: &[&str], body: Statement) -> Method {
        Method {
            name: name.to_string(),
            formal_params: params.iter().map(|p| p.to_string()).collect(),
            body: Rc::new(Statement::MethodBody {
                body: Box::new(body),
            }),
        }
    }

    fn returning(value: Statement) -> Statement {
        Statement::Return {
            statement: Box::new(value),
        }
    }

    fn instance_of(class: &Rc<Class>) -> ObjectHolder {
        ObjectHolder::own(Object::Instance(ClassInstance::new(Rc::clone(class))))
    }

    #[test]
    fn truthiness_follows_the_value_model() {
        assert!(!is_true(&ObjectHolder::none()));
        assert!(!is_true(&ObjectHolder::boolean(false)));
        assert!(is_true(&ObjectHolder::boolean(true)));
        assert!(!is_true(&ObjectHolder::number(0)));
        assert!(is_true(&ObjectHolder::number(-7)));
        assert!(!is_true(&ObjectHolder::string("")));
        assert!(is_true(&ObjectHolder::string("x")));

        let class = Rc::new(Class::new("Widget", Vec::new(), None));
        assert!(!is_true(&ObjectHolder::own(Object::Class(Rc::clone(
            &class
        )))));
        assert!(!is_true(&instance_of(&class)));
    }

    #[test]
    fn renders_primitives_classes_and_none() {
        let mut context = DummyContext::default();
        let class = Rc::new(Class::new("Point", Vec::new(), None));

        let cases = [
            (ObjectHolder::none(), "None"),
            (ObjectHolder::boolean(true), "True"),
            (ObjectHolder::boolean(false), "False"),
            (ObjectHolder::number(-42), "-42"),
            (ObjectHolder::string("hello"), "hello"),
            (ObjectHolder::own(Object::Class(class)), "Class Point"),
        ];
        for (value, expected) in cases {
            assert_eq!(value.to_output(&mut context).expect("render"), expected);
        }
    }

    #[test]
    fn renders_instance_through_str_method() {
        let class = Rc::new(Class::new(
            "Greeter",
            vec![method(
                STR_METHOD,
                &[],
                returning(Statement::StringConst("hi".to_string())),
            )],
            None,
        ));
        let mut context = DummyContext::default();
        let rendered = instance_of(&class)
            .to_output(&mut context)
            .expect("render");
        assert_eq!(rendered, "hi");
    }

    #[test]
    fn renders_instance_without_str_method_as_address() {
        let class = Rc::new(Class::new("Opaque", Vec::new(), None));
        let mut context = DummyContext::default();
        let rendered = instance_of(&class)
            .to_output(&mut context)
            .expect("render");
        assert!(rendered.starts_with("0x"), "got {rendered}");
    }

    #[test]
    fn method_lookup_walks_the_parent_chain() {
        let base = Rc::new(Class::new(
            "Base",
            vec![method("shared", &[], returning(Statement::NumericConst(1)))],
            None,
        ));
        let derived = Rc::new(Class::new(
            "Derived",
            vec![method("own", &["x"], returning(Statement::NumericConst(2)))],
            Some(Rc::clone(&base)),
        ));

        assert!(derived.method("own").is_some());
        assert!(derived.method("shared").is_some());
        assert!(derived.method("missing").is_none());
        assert!(base.method("own").is_none());

        let instance = ClassInstance::new(Rc::clone(&derived));
        assert!(instance.has_method("shared", 0));
        assert!(!instance.has_method("shared", 1));
        assert!(instance.has_method("own", 1));
        assert!(!instance.has_method("own", 0));
    }

    #[test]
    fn overriding_method_shadows_the_parent_version() {
        let base = Rc::new(Class::new(
            "Base",
            vec![method(
                "tag",
                &[],
                returning(Statement::StringConst("base".to_string())),
            )],
            None,
        ));
        let derived = Rc::new(Class::new(
            "Derived",
            vec![method(
                "tag",
                &[],
                returning(Statement::StringConst("derived".to_string())),
            )],
            Some(base),
        ));

        let mut context = DummyContext::default();
        let result = call_method(&instance_of(&derived), "tag", Vec::new(), &mut context)
            .expect("call should succeed");
        assert_eq!(result.as_string(), Some("derived"));
    }

    #[test]
    fn call_rejects_missing_method_and_wrong_arity() {
        let class = Rc::new(Class::new(
            "Thing",
            vec![method("f", &["a"], returning(Statement::NumericConst(1)))],
            None,
        ));
        let receiver = instance_of(&class);
        let mut context = DummyContext::default();

        let err = call_method(&receiver, "missing", Vec::new(), &mut context)
            .expect_err("expected missing method failure");
        assert_eq!(
            err,
            RuntimeError::NoMethod {
                class: "Thing".to_string(),
                method: "missing".to_string(),
                arity: 0,
            }
        );

        let err = call_method(&receiver, "f", Vec::new(), &mut context)
            .expect_err("expected arity failure");
        assert_eq!(
            err,
            RuntimeError::NoMethod {
                class: "Thing".to_string(),
                method: "f".to_string(),
                arity: 0,
            }
        );

        let err = call_method(&ObjectHolder::number(5), "f", Vec::new(), &mut context)
            .expect_err("expected non-instance failure");
        assert_eq!(err, RuntimeError::MethodCallOnNonInstance);
    }

    #[test]
    fn compares_primitives_by_natural_ordering() {
        let mut context = DummyContext::default();

        assert!(equal(
            &ObjectHolder::number(3),
            &ObjectHolder::number(3),
            &mut context
        )
        .expect("equal"));
        assert!(less(
            &ObjectHolder::number(2),
            &ObjectHolder::number(3),
            &mut context
        )
        .expect("less"));
        assert!(less(
            &ObjectHolder::boolean(false),
            &ObjectHolder::boolean(true),
            &mut context
        )
        .expect("less"));
        assert!(less(
            &ObjectHolder::string("abc"),
            &ObjectHolder::string("abd"),
            &mut context
        )
        .expect("less"));
        assert!(
            equal(&ObjectHolder::none(), &ObjectHolder::none(), &mut context).expect("equal")
        );
    }

    #[test]
    fn derived_comparisons_compose_equal_and_less() {
        let mut context = DummyContext::default();
        let two = ObjectHolder::number(2);
        let three = ObjectHolder::number(3);

        assert!(not_equal(&two, &three, &mut context).expect("not_equal"));
        assert!(greater(&three, &two, &mut context).expect("greater"));
        assert!(!greater(&two, &two, &mut context).expect("greater"));
        assert!(less_or_equal(&two, &two, &mut context).expect("less_or_equal"));
        assert!(less_or_equal(&two, &three, &mut context).expect("less_or_equal"));
        assert!(greater_or_equal(&three, &two, &mut context).expect("greater_or_equal"));
        assert!(greater_or_equal(&two, &two, &mut context).expect("greater_or_equal"));
    }

    #[test]
    fn comparison_is_total_on_primitive_pairs() {
        let mut context = DummyContext::default();
        let samples = [
            ObjectHolder::number(-1),
            ObjectHolder::number(0),
            ObjectHolder::number(7),
            ObjectHolder::boolean(false),
            ObjectHolder::boolean(true),
            ObjectHolder::string(""),
            ObjectHolder::string("a"),
            ObjectHolder::string("b"),
        ];
        for left in &samples {
            for right in &samples {
                let comparable = matches!(
                    (left.get(), right.get()),
                    (Some(Object::Number(_)), Some(Object::Number(_)))
                        | (Some(Object::Bool(_)), Some(Object::Bool(_)))
                        | (Some(Object::String(_)), Some(Object::String(_)))
                );
                if !comparable {
                    continue;
                }
                let eq = equal(left, right, &mut context).expect("equal");
                let lt = less(left, right, &mut context).expect("less");
                let gt = less(right, left, &mut context).expect("less");
                let outcomes = [eq, lt && !eq, gt && !eq];
                assert_eq!(
                    outcomes.iter().filter(|held| **held).count(),
                    1,
                    "exactly one of ==, <, > must hold"
                );
            }
        }
    }

    #[test]
    fn mismatched_kinds_cannot_be_compared() {
        let mut context = DummyContext::default();
        let err = equal(
            &ObjectHolder::number(1),
            &ObjectHolder::string("1"),
            &mut context,
        )
        .expect_err("expected comparison failure");
        assert_eq!(err, RuntimeError::IncomparableValues);

        let err = less(&ObjectHolder::none(), &ObjectHolder::none(), &mut context)
            .expect_err("expected comparison failure");
        assert_eq!(err, RuntimeError::IncomparableValues);
    }

    #[test]
    fn instance_equality_dispatches_to_eq_method() {
        // __eq__ returning a non-zero number coerces to true.
        let class = Rc::new(Class::new(
            "Always",
            vec![method(
                EQ_METHOD,
                &["other"],
                returning(Statement::NumericConst(1)),
            )],
            None,
        ));
        let mut context = DummyContext::default();
        assert!(equal(
            &instance_of(&class),
            &ObjectHolder::number(9),
            &mut context
        )
        .expect("equal"));

        let bare = Rc::new(Class::new("Bare", Vec::new(), None));
        let err = equal(&instance_of(&bare), &ObjectHolder::number(9), &mut context)
            .expect_err("expected dispatch failure");
        assert_eq!(
            err,
            RuntimeError::NoMethod {
                class: "Bare".to_string(),
                method: EQ_METHOD.to_string(),
                arity: 1,
            }
        );
    }
}
