//! Tree-walking evaluator.
//!
//! Every node evaluates against a [`Closure`] and a [`Context`] and yields a
//! handle. `return` travels through the second channel of [`ExecResult`] as
//! [`Flow::Return`] and is absorbed by the dynamically enclosing
//! `MethodBody`; runtime failures travel the same channel as [`Flow::Error`]
//! and are never absorbed before the driver.

use std::rc::Rc;

use crate::ast::{Comparator, Statement, VariableValue};
use crate::runtime::{
    self, call_method, is_true, write_output, ClassInstance, Closure, Context, Object,
    ObjectHolder, RuntimeError, ADD_METHOD, INIT_METHOD,
};

/// Why evaluation stopped before producing a value.
#[derive(Debug)]
pub enum Flow {
    /// A `return` travelling to the nearest enclosing method body.
    Return(ObjectHolder),
    /// A runtime failure travelling to the driver.
    Error(RuntimeError),
}

impl From<RuntimeError> for Flow {
    fn from(error: RuntimeError) -> Self {
        Flow::Error(error)
    }
}

pub type ExecResult = Result<ObjectHolder, Flow>;

impl VariableValue {
    /// Resolves the head name in `closure`, then follows the dotted tail
    /// through instance field tables.
    pub(crate) fn resolve(&self, closure: &Closure) -> Result<ObjectHolder, RuntimeError> {
        let mut value =
            closure
                .get(&self.name)
                .cloned()
                .ok_or_else(|| RuntimeError::UndefinedVariable {
                    name: self.name.clone(),
                })?;
        let mut owner = &self.name;
        for field in &self.tail {
            let next = {
                let instance = value
                    .as_instance()
                    .ok_or_else(|| RuntimeError::NotAnInstance {
                        name: owner.clone(),
                    })?;
                let fields = instance.fields();
                fields
                    .get(field)
                    .cloned()
                    .ok_or_else(|| RuntimeError::UndefinedVariable {
                        name: field.clone(),
                    })?
            };
            value = next;
            owner = field;
        }
        Ok(value)
    }
}

impl Statement {
    /// Evaluates this node in `closure`, producing a handle.
    pub fn execute(&self, closure: &mut Closure, context: &mut dyn Context) -> ExecResult {
        match self {
            Statement::NumericConst(value) => Ok(ObjectHolder::number(*value)),
            Statement::StringConst(value) => Ok(ObjectHolder::string(value.clone())),
            Statement::BoolConst(value) => Ok(ObjectHolder::boolean(*value)),
            Statement::None => Ok(ObjectHolder::none()),
            Statement::Variable(access) => Ok(access.resolve(closure)?),
            Statement::Assignment { var, rv } => {
                let value = rv.execute(closure, context)?;
                closure.insert(var.clone(), value.clone());
                Ok(value)
            }
            Statement::FieldAssignment { object, field, rv } => {
                let target = object.resolve(closure)?;
                let Some(instance) = target.as_instance() else {
                    return Err(RuntimeError::FieldAssignmentOnNonInstance.into());
                };
                let value = rv.execute(closure, context)?;
                instance.fields_mut().insert(field.clone(), value.clone());
                Ok(value)
            }
            Statement::Print { args } => {
                let mut first = true;
                for arg in args {
                    if !first {
                        write_output(context, " ")?;
                    }
                    let value = arg.execute(closure, context)?;
                    let rendered = value.to_output(context)?;
                    write_output(context, &rendered)?;
                    first = false;
                }
                write_output(context, "\n")?;
                Ok(ObjectHolder::none())
            }
            Statement::Stringify { arg } => {
                let value = arg.execute(closure, context)?;
                Ok(ObjectHolder::string(value.to_output(context)?))
            }
            Statement::Add { lhs, rhs } => {
                let left = lhs.execute(closure, context)?;
                let right = rhs.execute(closure, context)?;
                let primitive = match (left.get(), right.get()) {
                    (Some(Object::Number(l)), Some(Object::Number(r))) => {
                        Some(ObjectHolder::number(l + r))
                    }
                    (Some(Object::String(l)), Some(Object::String(r))) => {
                        Some(ObjectHolder::string(format!("{l}{r}")))
                    }
                    _ => None,
                };
                if let Some(value) = primitive {
                    return Ok(value);
                }
                if left.as_instance().is_some() {
                    return Ok(call_method(&left, ADD_METHOD, vec![right], context)?);
                }
                Err(RuntimeError::InvalidAddition.into())
            }
            Statement::Sub { lhs, rhs } => {
                let left = lhs.execute(closure, context)?;
                let right = rhs.execute(closure, context)?;
                match (left.as_number(), right.as_number()) {
                    (Some(l), Some(r)) => Ok(ObjectHolder::number(l - r)),
                    _ => Err(RuntimeError::InvalidSubtraction.into()),
                }
            }
            Statement::Mult { lhs, rhs } => {
                let left = lhs.execute(closure, context)?;
                let right = rhs.execute(closure, context)?;
                match (left.as_number(), right.as_number()) {
                    (Some(l), Some(r)) => Ok(ObjectHolder::number(l * r)),
                    _ => Err(RuntimeError::InvalidMultiplication.into()),
                }
            }
            Statement::Div { lhs, rhs } => {
                let left = lhs.execute(closure, context)?;
                let right = rhs.execute(closure, context)?;
                // The zero check applies only to a numeric divisor; any other
                // divisor falls through to the type error below.
                if right.as_number() == Some(0) {
                    return Err(RuntimeError::DivisionByZero.into());
                }
                match (left.as_number(), right.as_number()) {
                    (Some(l), Some(r)) => Ok(ObjectHolder::number(l / r)),
                    _ => Err(RuntimeError::InvalidDivision.into()),
                }
            }
            Statement::Or { lhs, rhs } => {
                if is_true(&lhs.execute(closure, context)?) {
                    Ok(ObjectHolder::boolean(true))
                } else {
                    Ok(ObjectHolder::boolean(is_true(
                        &rhs.execute(closure, context)?,
                    )))
                }
            }
            Statement::And { lhs, rhs } => {
                if is_true(&lhs.execute(closure, context)?) {
                    Ok(ObjectHolder::boolean(is_true(
                        &rhs.execute(closure, context)?,
                    )))
                } else {
                    Ok(ObjectHolder::boolean(false))
                }
            }
            Statement::Not { arg } => Ok(ObjectHolder::boolean(!is_true(
                &arg.execute(closure, context)?,
            ))),
            Statement::Comparison { cmp, lhs, rhs } => {
                let left = lhs.execute(closure, context)?;
                let right = rhs.execute(closure, context)?;
                let result = match cmp {
                    Comparator::Equal => runtime::equal(&left, &right, context)?,
                    Comparator::NotEqual => runtime::not_equal(&left, &right, context)?,
                    Comparator::Less => runtime::less(&left, &right, context)?,
                    Comparator::Greater => runtime::greater(&left, &right, context)?,
                    Comparator::LessOrEqual => runtime::less_or_equal(&left, &right, context)?,
                    Comparator::GreaterOrEqual => {
                        runtime::greater_or_equal(&left, &right, context)?
                    }
                };
                Ok(ObjectHolder::boolean(result))
            }
            Statement::MethodCall {
                object,
                method,
                args,
            } => {
                let receiver = object.execute(closure, context)?;
                if receiver.as_instance().is_none() {
                    return Err(RuntimeError::MethodCallOnNonInstance.into());
                }
                let mut actual_args = Vec::with_capacity(args.len());
                for arg in args {
                    actual_args.push(arg.execute(closure, context)?);
                }
                Ok(call_method(&receiver, method, actual_args, context)?)
            }
            Statement::NewInstance { class, args } => {
                let instance =
                    ObjectHolder::own(Object::Instance(ClassInstance::new(Rc::clone(class))));
                let run_init = class
                    .method(INIT_METHOD)
                    .is_some_and(|init| init.formal_params.len() == args.len());
                if run_init {
                    let mut actual_args = Vec::with_capacity(args.len());
                    for arg in args {
                        actual_args.push(arg.execute(closure, context)?);
                    }
                    call_method(&instance, INIT_METHOD, actual_args, context)?;
                }
                Ok(instance)
            }
            Statement::Compound { statements } => {
                for statement in statements {
                    statement.execute(closure, context)?;
                }
                Ok(ObjectHolder::none())
            }
            Statement::MethodBody { body } => match body.execute(closure, context) {
                Ok(_) => Ok(ObjectHolder::none()),
                Err(Flow::Return(value)) => Ok(value),
                Err(Flow::Error(error)) => Err(Flow::Error(error)),
            },
            Statement::Return { statement } => {
                let value = statement.execute(closure, context)?;
                Err(Flow::Return(value))
            }
            Statement::ClassDefinition { class } => {
                closure.insert(
                    class.name().to_string(),
                    ObjectHolder::own(Object::Class(Rc::clone(class))),
                );
                Ok(ObjectHolder::none())
            }
            Statement::IfElse {
                condition,
                if_body,
                else_body,
            } => {
                if is_true(&condition.execute(closure, context)?) {
                    if_body.execute(closure, context)
                } else if let Some(else_body) = else_body {
                    else_body.execute(closure, context)
                } else {
                    Ok(ObjectHolder::none())
                }
            }
        }
    }
}
