//! Conversions between datatypes, both as generated code and as operations on
//! runtime values.
//!
//! The [`ConversionRegistry`] is consulted by overload resolution to decide
//! which function signatures a call could match, and by the compiler to wrap
//! an argument in the code that converts it to the datatype a function
//! expects. Every conversion has a cost, so that resolution can prefer the
//! signature needing the least conversion work.

pub mod defaults;

use std::sync::Arc;

use dashmap::DashMap;
use derivative::Derivative;
use flc_errors::{
    compile,
    eval::{self, Error},
};
use tracing::trace;

use crate::{constant::ANY_COST, datatype::Datatype, eval::value::Value, fragment::CodeFragment};

/// The type of functions that wrap a fragment in conversion code.
pub type CodeConversion = Box<dyn Fn(CodeFragment) -> CodeFragment + Send + Sync>;

/// The type of functions that convert a runtime value.
pub type ValueConversion = Box<dyn Fn(Value) -> eval::Result<Value> + Send + Sync>;

/// A single registered conversion from one concrete datatype to another.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct ConversionRule {
    from: Datatype,
    to:   Datatype,
    cost: u32,

    #[derivative(Debug = "ignore")]
    code: CodeConversion,

    #[derivative(Debug = "ignore")]
    value: ValueConversion,
}

impl ConversionRule {
    /// Creates a rule converting `from` into `to` at the provided `cost`,
    /// generating code with `code` and converting runtime values with
    /// `value`.
    #[must_use]
    pub fn new(
        from: Datatype,
        to: Datatype,
        cost: u32,
        code: impl Fn(CodeFragment) -> CodeFragment + Send + Sync + 'static,
        value: impl Fn(Value) -> eval::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            from,
            to,
            cost,
            code: Box::new(code),
            value: Box::new(value),
        }
    }

    #[must_use]
    pub fn from(&self) -> &Datatype {
        &self.from
    }

    #[must_use]
    pub fn to(&self) -> &Datatype {
        &self.to
    }

    #[must_use]
    pub fn cost(&self) -> u32 {
        self.cost
    }
}

/// The registry of known conversions, keyed first by the source datatype and
/// then by the target datatype.
///
/// Besides the registered rules, the registry knows three structural
/// conversions that need no code at all:
///
/// - every datatype converts to itself;
/// - every datatype converts to [`Datatype::Any`];
/// - a list converts to a list of `any`, or to a list of the same elements.
///
/// Rules registered with [`Datatype::Any`] as their source apply to every
/// source datatype that has no more specific rule.
#[derive(Debug, Default)]
pub struct ConversionRegistry {
    rules: DashMap<Datatype, DashMap<Datatype, Arc<ConversionRule>>>,
}

impl ConversionRegistry {
    /// Creates a registry containing only the structural conversions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry containing the conversions between the built-in
    /// datatypes.
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        for rule in defaults::rules() {
            registry.insert(rule);
        }
        registry
    }

    /// Registers `rule`, replacing any existing rule between the same two
    /// datatypes.
    ///
    /// # Errors
    ///
    /// - [`compile::Error::ReflexiveConversion`] if the rule converts a
    ///   datatype to itself, which is always possible without a rule.
    pub fn register(&self, rule: ConversionRule) -> compile::Result<()> {
        if rule.from == rule.to {
            Err(compile::Error::ReflexiveConversion(rule.from.name()))?;
        }
        self.insert(rule);
        Ok(())
    }

    fn insert(&self, rule: ConversionRule) {
        self.rules
            .entry(rule.from.clone())
            .or_default()
            .insert(rule.to.clone(), Arc::new(rule));
    }

    /// Gets the registered rule for converting `from` into `to`, falling back
    /// to a rule from [`Datatype::Any`].
    #[must_use]
    pub fn rule(&self, from: &Datatype, to: &Datatype) -> Option<Arc<ConversionRule>> {
        let lookup = |source: &Datatype| {
            self.rules
                .get(source)
                .and_then(|targets| targets.get(to).map(|rule| Arc::clone(rule.value())))
        };
        lookup(from).or_else(|| lookup(&Datatype::Any))
    }

    /// Returns `true` if a value of `from` can be used where `to` is
    /// expected.
    #[must_use]
    pub fn can_convert(&self, from: &Datatype, to: &Datatype) -> bool {
        self.cost(from, to).is_some()
    }

    /// Gets the cost of converting `from` into `to`, or [`None`] if that is
    /// not possible.
    ///
    /// Identity is free. Accepting a value as `any` costs [`ANY_COST`], which
    /// outweighs every concrete conversion chain.
    #[must_use]
    pub fn cost(&self, from: &Datatype, to: &Datatype) -> Option<u32> {
        if from == to {
            return Some(0);
        }
        if to.is_abstract() {
            return Some(ANY_COST);
        }
        if let (Some(source), Some(target)) = (from.element_type(), to.element_type()) {
            return if source == target {
                Some(0)
            } else if target.is_abstract() {
                Some(ANY_COST)
            } else {
                None
            };
        }
        self.rule(from, to).map(|rule| rule.cost)
    }

    /// Wraps `fragment`, an expression of datatype `from`, in the code that
    /// converts it to `to`.
    ///
    /// Structural conversions return the fragment unchanged. Returns [`None`]
    /// if no conversion exists.
    #[must_use]
    pub fn conversion_code(
        &self,
        from: &Datatype,
        to: &Datatype,
        fragment: CodeFragment,
    ) -> Option<CodeFragment> {
        if self.is_structural(from, to) {
            return Some(fragment);
        }
        let rule = self.rule(from, to)?;
        trace!(%from, %to, "applying conversion");
        Some((rule.code)(fragment))
    }

    /// Converts the runtime `value` of datatype `from` to the datatype `to`.
    ///
    /// # Errors
    ///
    /// - [`Error::TypeMismatch`] if no conversion exists.
    /// - Any error raised by the conversion itself, such as unboxing a null.
    pub fn convert_value(&self, from: &Datatype, to: &Datatype, value: Value) -> eval::Result<Value> {
        if self.is_structural(from, to) {
            return Ok(value);
        }
        match self.rule(from, to) {
            Some(rule) => (rule.value)(value),
            None => Err(Error::TypeMismatch {
                expected: to.name(),
                found:    from.name(),
            }),
        }
    }

    /// Gets the datatype that an expression of datatype `from` has after being
    /// converted to `to`.
    ///
    /// Converting to an abstract datatype does not forget the concrete one.
    #[must_use]
    pub fn converted_datatype(&self, from: &Datatype, to: &Datatype) -> Datatype {
        if self.is_structural(from, to) {
            from.clone()
        } else {
            to.clone()
        }
    }

    /// Returns `true` if converting `from` into `to` needs no code.
    fn is_structural(&self, from: &Datatype, to: &Datatype) -> bool {
        from == to
            || to.is_abstract()
            || matches!(
                (from.element_type(), to.element_type()),
                (Some(source), Some(target)) if source == target || target.is_abstract()
            )
    }
}
