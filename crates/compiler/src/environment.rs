//! The [`Environment`] bundles everything the compiler knows about the world
//! outside of a formula: the datatypes, the conversions between them, and the
//! functions and operators that formulas can call.
//!
//! An environment is set up once and then shared between any number of
//! compilations, including concurrent ones.

use std::sync::Arc;

use flc_errors::compile::Result;
use tracing::debug;

use crate::{
    conversion::{ConversionRegistry, ConversionRule},
    datatype::helper::{DatatypeHelper, DatatypeRegistry},
    function::{builtin, list, operator, operator::OperatorMap, FlFunction, FunctionRegistry},
};

/// The registries that a formula is compiled against.
#[derive(Debug)]
pub struct Environment {
    /// The helpers that generate code for each datatype.
    datatypes: DatatypeRegistry,

    /// The conversions between datatypes.
    conversions: ConversionRegistry,

    /// The functions, including the implementations of the operators.
    functions: FunctionRegistry,

    /// The mapping from operator symbols to the functions implementing them.
    operators: OperatorMap,
}

impl Environment {
    #[must_use]
    pub fn new(
        datatypes: DatatypeRegistry,
        conversions: ConversionRegistry,
        functions: FunctionRegistry,
        operators: OperatorMap,
    ) -> Self {
        Self {
            datatypes,
            conversions,
            functions,
            operators,
        }
    }

    /// Creates an environment that knows no datatypes, conversions or
    /// functions, but still maps the operator symbols.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(
            DatatypeRegistry::new(),
            ConversionRegistry::new(),
            FunctionRegistry::new(),
            OperatorMap::default(),
        )
    }

    #[must_use]
    pub fn datatypes(&self) -> &DatatypeRegistry {
        &self.datatypes
    }

    #[must_use]
    pub fn conversions(&self) -> &ConversionRegistry {
        &self.conversions
    }

    #[must_use]
    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    #[must_use]
    pub fn operators(&self) -> &OperatorMap {
        &self.operators
    }

    /// Makes `function` callable from formulas.
    ///
    /// # Errors
    ///
    /// - [`flc_errors::compile::Error::InvalidFunctionName`] if the name of the
    ///   function cannot be written in a formula.
    pub fn register_function(&self, function: Arc<dyn FlFunction>) -> Result<()> {
        debug!(signature = function.signature(), "registering function");
        self.functions.register(function)
    }

    /// Makes the conversion described by `rule` available.
    ///
    /// # Errors
    ///
    /// - [`flc_errors::compile::Error::ReflexiveConversion`] if the rule
    ///   converts a datatype to itself.
    pub fn register_conversion(&self, rule: ConversionRule) -> Result<()> {
        self.conversions.register(rule)
    }

    /// Makes a value datatype defined outside of the formula language usable
    /// in formulas, generating code for it with `helper`.
    ///
    /// Besides the helper, this registers the equality operators for the
    /// datatype and, if its values are ordered, the ordering operators.
    ///
    /// # Errors
    ///
    /// - [`flc_errors::compile::Error::InvalidHelperRegistration`] if the
    ///   helper is for a datatype that has no values.
    pub fn register_value_datatype(&self, helper: Arc<dyn DatatypeHelper>) -> Result<()> {
        let datatype = helper.datatype();
        self.datatypes.register(helper)?;

        let mut functions = operator::object_equality(datatype.clone());
        if datatype.is_comparable() {
            functions.extend(operator::object_comparisons(datatype.clone()));
        }
        for function in functions {
            self.functions.insert(Arc::new(function));
        }

        debug!(%datatype, "registered value datatype");
        Ok(())
    }
}

/// The default environment contains everything built into the formula
/// language.
impl Default for Environment {
    fn default() -> Self {
        let functions = FunctionRegistry::new();
        let templates = operator::functions().into_iter().chain(builtin::functions());
        for function in templates {
            functions.insert(Arc::new(function));
        }
        for function in builtin::null_constructors() {
            functions.insert(Arc::new(function));
        }
        for function in list::functions() {
            functions.insert(function);
        }
        functions.insert(Arc::new(builtin::IsEmpty::is_empty()));
        functions.insert(Arc::new(builtin::IsEmpty::exists()));
        functions.insert(Arc::new(builtin::If::new()));
        functions.insert(Arc::new(builtin::Text::new()));

        Self::new(
            DatatypeRegistry::with_defaults(),
            ConversionRegistry::with_defaults(),
            functions,
            OperatorMap::default(),
        )
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::{
        datatype::{helper::JavaDatatypeHelper, Datatype},
        environment::Environment,
        function::operator::{EQUAL, LESS},
    };

    #[test]
    fn default_environment_knows_the_builtins() {
        let env = Environment::default();

        for name in ["MAX", "MIN", "SUM", "COUNT", "IF", "ISEMPTY", "POWER", "DECIMALNULL"] {
            assert!(env.functions().contains(name), "{name} is missing");
        }
        assert!(env.datatypes().contains(&Datatype::Money));
        assert!(env.conversions().can_convert(&Datatype::int, &Datatype::Decimal));
    }

    #[test]
    fn value_datatypes_get_operators() -> anyhow::Result<()> {
        let env = Environment::default();
        let rating = Datatype::make_value("Rating", "org.example.Rating", true);
        let helper = JavaDatatypeHelper::new(rating.clone(), "org.example.Rating");

        env.register_value_datatype(Arc::new(helper))?;

        let has_signature = |name: &str| {
            env.functions()
                .overloads(name)
                .iter()
                .any(|f| f.parameter_types() == [rating.clone(), rating.clone()])
        };
        assert!(has_signature(EQUAL.1));
        assert!(has_signature(LESS.1));

        Ok(())
    }
}
