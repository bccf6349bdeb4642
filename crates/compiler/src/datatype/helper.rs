//! Datatype helpers provide the knowledge needed to generate Java code for the
//! values of a [`Datatype`], and the [`DatatypeRegistry`] makes them available
//! to the compiler.

use std::{fmt::Debug, sync::Arc};

use dashmap::DashMap;
use flc_errors::compile::{Error, Result};
use tracing::warn;

use crate::{datatype::Datatype, fragment::CodeFragment};

/// The generation-time companion of a [`Datatype`].
///
/// A helper knows the Java class that represents its datatype, and how to build
/// the common expressions over values of that class. The compiler never
/// hard-codes these, so that datatypes defined outside of the formula language
/// can take part in compilation by registering a helper.
pub trait DatatypeHelper
where
    Self: Debug + Send + Sync,
{
    /// Gets the datatype that this helper generates code for.
    fn datatype(&self) -> Datatype;

    /// Gets the unqualified name of the Java class representing the datatype,
    /// as it appears in generated code.
    fn java_class_name(&self) -> String;

    /// Gets an expression that evaluates to the null value of the datatype, or
    /// [`None`] if the datatype has no null value (as is the case for the
    /// primitives).
    fn null_expression(&self) -> Option<CodeFragment>;

    /// Gets an expression that creates a value of the datatype from the
    /// textual representation `value`, as written in a formula literal.
    fn new_instance(&self, value: &str) -> CodeFragment;

    /// Gets an expression that converts the value produced by `fragment` into
    /// a `String`.
    fn to_string_expression(&self, fragment: CodeFragment) -> CodeFragment;
}

/// The ways in which a value can be created from its literal text.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InstanceStyle {
    /// The literal text is already valid Java, as for `int` and `boolean`.
    Verbatim,

    /// The text is placed in a Java string literal.
    Quoted,

    /// The text is passed as a string to the named static factory method of
    /// the class, as in `Decimal.valueOf("1.5")`.
    Factory(&'static str),
}

/// The ways in which a value can be turned into a string.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ToStringStyle {
    /// The value is already a string.
    Identity,

    /// `String.valueOf(value)`, which is null-safe and works on primitives.
    ValueOf,

    /// `value.toString()`, for classes whose null object prints sensibly.
    Method,
}

/// A data-driven [`DatatypeHelper`] covering every datatype whose code
/// generation follows the usual Java patterns.
#[derive(Clone, Debug)]
pub struct JavaDatatypeHelper {
    datatype:   Datatype,
    class_name: String,
    import:     Option<String>,
    null:       Option<String>,
    instance:   InstanceStyle,
    to_string:  ToStringStyle,
}

impl JavaDatatypeHelper {
    /// Creates a helper for `datatype` represented by the Java class with the
    /// fully qualified name `qualified_class`.
    ///
    /// The helper defaults to Java's `null` as the null value, creating
    /// instances with a `valueOf` factory, and `toString()` for conversion to
    /// strings.
    #[must_use]
    pub fn new(datatype: Datatype, qualified_class: &str) -> Self {
        let class_name = qualified_class
            .rsplit('.')
            .next()
            .unwrap_or(qualified_class)
            .to_string();
        let import = qualified_class.contains('.').then(|| qualified_class.to_string());

        Self {
            datatype,
            class_name,
            import,
            null: Some("null".to_string()),
            instance: InstanceStyle::Factory("valueOf"),
            to_string: ToStringStyle::Method,
        }
    }

    /// Sets the null expression of the datatype, with [`None`] meaning that
    /// the datatype has no null value.
    #[must_use]
    pub fn with_null(mut self, null: Option<&str>) -> Self {
        self.null = null.map(ToString::to_string);
        self
    }

    #[must_use]
    pub fn with_instance_style(mut self, style: InstanceStyle) -> Self {
        self.instance = style;
        self
    }

    #[must_use]
    pub fn with_to_string_style(mut self, style: ToStringStyle) -> Self {
        self.to_string = style;
        self
    }

    /// Wraps `source` in a fragment carrying the import of the helper's class.
    fn fragment(&self, source: String) -> CodeFragment {
        let mut fragment = CodeFragment::from_source(source);
        if let Some(import) = &self.import {
            fragment.add_import(import.as_str());
        }
        fragment
    }

    /// Gets the helpers for all of the datatypes built into the formula
    /// language.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(Datatype::boolean, "boolean")
                .with_null(None)
                .with_instance_style(InstanceStyle::Verbatim)
                .with_to_string_style(ToStringStyle::ValueOf),
            Self::new(Datatype::Boolean, "java.lang.Boolean")
                .with_to_string_style(ToStringStyle::ValueOf),
            Self::new(Datatype::int, "int")
                .with_null(None)
                .with_instance_style(InstanceStyle::Verbatim)
                .with_to_string_style(ToStringStyle::ValueOf),
            Self::new(Datatype::Integer, "java.lang.Integer")
                .with_to_string_style(ToStringStyle::ValueOf),
            Self::new(Datatype::Decimal, "org.faktorips.values.Decimal")
                .with_null(Some("Decimal.NULL")),
            Self::new(Datatype::Money, "org.faktorips.values.Money").with_null(Some("Money.NULL")),
            Self::new(Datatype::String, "java.lang.String")
                .with_instance_style(InstanceStyle::Quoted)
                .with_to_string_style(ToStringStyle::Identity),
            Self::new(Datatype::LocalDate, "java.time.LocalDate")
                .with_instance_style(InstanceStyle::Factory("parse"))
                .with_to_string_style(ToStringStyle::ValueOf),
        ]
    }
}

impl DatatypeHelper for JavaDatatypeHelper {
    fn datatype(&self) -> Datatype {
        self.datatype.clone()
    }

    fn java_class_name(&self) -> String {
        self.class_name.clone()
    }

    fn null_expression(&self) -> Option<CodeFragment> {
        self.null.clone().map(|null| self.fragment(null))
    }

    fn new_instance(&self, value: &str) -> CodeFragment {
        match self.instance {
            InstanceStyle::Verbatim => CodeFragment::from_source(value),
            InstanceStyle::Quoted => CodeFragment::from_source(quote(value)),
            InstanceStyle::Factory(method) => {
                self.fragment(format!("{}.{method}({})", self.class_name, quote(value)))
            }
        }
    }

    fn to_string_expression(&self, fragment: CodeFragment) -> CodeFragment {
        match self.to_string {
            ToStringStyle::Identity => fragment,
            ToStringStyle::ValueOf => CodeFragment::static_call("String.valueOf", vec![fragment]),
            ToStringStyle::Method => CodeFragment::call(fragment, "toString", vec![]),
        }
    }
}

/// The helper for list datatypes, derived from the helper of the element type.
#[derive(Clone, Debug)]
pub struct ListHelper {
    element: Arc<dyn DatatypeHelper>,
}

impl ListHelper {
    #[must_use]
    pub fn new(element: Arc<dyn DatatypeHelper>) -> Self {
        Self { element }
    }
}

impl DatatypeHelper for ListHelper {
    fn datatype(&self) -> Datatype {
        Datatype::make_list(self.element.datatype().boxed())
    }

    fn java_class_name(&self) -> String {
        let element = self.element.datatype().boxed();
        format!("List<{}>", element_class_name(&element, &self.element))
    }

    fn null_expression(&self) -> Option<CodeFragment> {
        Some(CodeFragment::with_import("Collections.emptyList()", "java.util.Collections"))
    }

    /// Lists have no literal syntax, so the only list that can be created from
    /// text is the empty list.
    fn new_instance(&self, _: &str) -> CodeFragment {
        CodeFragment::with_import("List.of()", "java.util.List")
    }

    fn to_string_expression(&self, fragment: CodeFragment) -> CodeFragment {
        CodeFragment::static_call("String.valueOf", vec![fragment])
    }
}

/// Gets the name of the class used for list elements of `datatype`, which are
/// always boxed.
fn element_class_name(datatype: &Datatype, helper: &Arc<dyn DatatypeHelper>) -> String {
    match datatype {
        Datatype::Integer => "Integer".to_string(),
        Datatype::Boolean => "Boolean".to_string(),
        _ => helper.java_class_name(),
    }
}

/// Builds a Java string literal containing `value`.
#[must_use]
pub fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

/// The registry of datatype helpers available to the compiler.
///
/// Lookups are safe to perform concurrently from many compilations. Helpers
/// are expected to be registered during a single-threaded setup phase.
#[derive(Debug, Default)]
pub struct DatatypeRegistry {
    helpers: DashMap<Datatype, Arc<dyn DatatypeHelper>>,
}

impl DatatypeRegistry {
    /// Creates a registry with no helpers at all.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry containing the helpers for every built-in datatype.
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        for helper in JavaDatatypeHelper::defaults() {
            registry.helpers.insert(helper.datatype(), Arc::new(helper));
        }
        registry
    }

    /// Registers `helper` for its datatype, replacing any existing helper for
    /// that datatype.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidHelperRegistration`] if the helper is for an abstract
    ///   datatype or for `void`, neither of which have values to generate code
    ///   for.
    pub fn register(&self, helper: Arc<dyn DatatypeHelper>) -> Result<()> {
        let datatype = helper.datatype();
        if datatype.is_abstract() || datatype == Datatype::void {
            warn!(%datatype, "rejected helper registration");
            Err(Error::InvalidHelperRegistration(datatype.name()))?;
        }
        self.helpers.insert(datatype, helper);
        Ok(())
    }

    /// Gets the helper for `datatype`, or [`None`] if there is none.
    ///
    /// Lists do not need registering: the helper for a list is derived from
    /// the helper of its element datatype.
    #[must_use]
    pub fn helper(&self, datatype: &Datatype) -> Option<Arc<dyn DatatypeHelper>> {
        if let Some(helper) = self.helpers.get(datatype) {
            return Some(Arc::clone(helper.value()));
        }
        let element = datatype.element_type()?;
        let element_helper = self.helper(element)?;
        Some(Arc::new(ListHelper::new(element_helper)))
    }

    /// Returns `true` if a helper is available for `datatype`.
    #[must_use]
    pub fn contains(&self, datatype: &Datatype) -> bool {
        self.helper(datatype).is_some()
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use flc_errors::compile::Error;

    use crate::datatype::{
        helper::{DatatypeHelper, DatatypeRegistry, JavaDatatypeHelper},
        Datatype,
    };

    #[test]
    fn decimal_helper_builds_literals_and_nulls() {
        let registry = DatatypeRegistry::with_defaults();
        let helper = registry.helper(&Datatype::Decimal).unwrap();

        let literal = helper.new_instance("3.50");
        assert_eq!(literal.source(), "Decimal.valueOf(\"3.50\")");
        assert_eq!(
            literal.imports().collect::<Vec<_>>(),
            vec!["org.faktorips.values.Decimal"]
        );
        assert_eq!(helper.null_expression().unwrap().source(), "Decimal.NULL");
    }

    #[test]
    fn primitives_have_no_null_value() {
        let registry = DatatypeRegistry::with_defaults();

        assert!(registry.helper(&Datatype::int).unwrap().null_expression().is_none());
        assert!(registry.helper(&Datatype::boolean).unwrap().null_expression().is_none());
    }

    #[test]
    fn strings_are_quoted_and_escaped() {
        let registry = DatatypeRegistry::with_defaults();
        let helper = registry.helper(&Datatype::String).unwrap();

        assert_eq!(helper.new_instance("say \"hi\"").source(), r#""say \"hi\"""#);
        assert_eq!(helper.new_instance("a\nb\tc\\").source(), r#""a\nb\tc\\""#);
        assert_eq!(helper.new_instance("a\r\nb").to_string().lines().count(), 1);
    }

    #[test]
    fn list_helpers_are_derived_from_element_helpers() {
        let registry = DatatypeRegistry::with_defaults();
        let list = Datatype::make_list(Datatype::Integer);

        let helper = registry.helper(&list).unwrap();
        assert_eq!(helper.java_class_name(), "List<Integer>");
        assert!(registry.helper(&Datatype::make_list(Datatype::void)).is_none());
    }

    #[test]
    fn abstract_helpers_cannot_be_registered() {
        let registry = DatatypeRegistry::new();
        let helper = JavaDatatypeHelper::new(Datatype::Any, "java.lang.Object");

        assert_eq!(
            registry.register(Arc::new(helper)),
            Err(Error::InvalidHelperRegistration("any".to_string()))
        );
    }

    #[test]
    fn custom_helpers_can_be_registered() -> anyhow::Result<()> {
        let registry = DatatypeRegistry::new();
        let gender = Datatype::make_value("Gender", "org.example.Gender", false);
        let helper = JavaDatatypeHelper::new(gender.clone(), "org.example.Gender");

        registry.register(Arc::new(helper))?;

        let helper = registry.helper(&gender).unwrap();
        assert_eq!(helper.java_class_name(), "Gender");
        assert_eq!(helper.new_instance("MALE").source(), "Gender.valueOf(\"MALE\")");

        Ok(())
    }
}
