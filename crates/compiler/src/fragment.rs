//! This module contains the [`CodeFragment`], the unit of generated source code
//! that the compiler threads through compilation.

use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter},
};

use itertools::Itertools;

/// The text used for a single level of indentation in generated code.
pub const INDENTATION: &str = "    ";

/// A piece of generated Java source code together with the imports it needs.
///
/// A fragment is an owned value: every compilation step builds its own
/// fragment, and parents absorb the fragments of their children by value via
/// [`Self::append_fragment`]. Imports are kept as a sorted set so that the
/// same formula always produces the same fragment.
///
/// # Indentation
///
/// Fragments track an indentation level that is applied at the start of every
/// line written with [`Self::append`]. When a multi-line fragment is appended
/// to another, its lines are re-indented relative to the receiving fragment's
/// current level.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CodeFragment {
    /// The source text built so far.
    source: String,

    /// The current indentation level, in units of [`INDENTATION`].
    indent_level: usize,

    /// Whether the next text written starts a new line.
    at_line_start: bool,

    /// The fully qualified names of the types the source refers to.
    imports: BTreeSet<String>,
}

impl CodeFragment {
    /// Creates an empty fragment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fragment containing exactly the provided `source`.
    #[must_use]
    pub fn from_source(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    /// Creates a fragment with the provided `source` that requires the import
    /// of `import`.
    #[must_use]
    pub fn with_import(source: impl Into<String>, import: impl Into<String>) -> Self {
        let mut fragment = Self::from_source(source);
        fragment.add_import(import);
        fragment
    }

    /// Builds the instance method call `target.method(args...)`.
    #[must_use]
    pub fn call(target: CodeFragment, method: &str, args: Vec<CodeFragment>) -> Self {
        let mut fragment = Self::new();
        fragment.append_fragment(target);
        fragment.append(".");
        fragment.append(method);
        fragment.append_arguments(args);
        fragment
    }

    /// Builds the static call `function(args...)`, where `function` is
    /// already qualified as needed (e.g. `Math.max`).
    #[must_use]
    pub fn static_call(function: &str, args: Vec<CodeFragment>) -> Self {
        let mut fragment = Self::from_source(function);
        fragment.append_arguments(args);
        fragment
    }

    /// Builds `(lhs op rhs)`.
    #[must_use]
    pub fn infix(lhs: CodeFragment, op: &str, rhs: CodeFragment) -> Self {
        let mut fragment = Self::from_source("(");
        fragment.append_fragment(lhs);
        fragment.append(" ");
        fragment.append(op);
        fragment.append(" ");
        fragment.append_fragment(rhs);
        fragment.append(")");
        fragment
    }

    /// Builds `opoperand`, for example `!flag`.
    #[must_use]
    pub fn prefix(op: &str, operand: CodeFragment) -> Self {
        let mut fragment = Self::from_source(op);
        fragment.append_fragment(operand);
        fragment
    }
}

/// Operations for building up the contents of the fragment.
impl CodeFragment {
    /// Appends `text` to the fragment, indenting it first if it starts a new
    /// line.
    ///
    /// `text` is expected not to contain line breaks; use [`Self::new_line`]
    /// to end a line.
    pub fn append(&mut self, text: &str) -> &mut Self {
        if text.is_empty() {
            return self;
        }
        if self.at_line_start {
            for _ in 0..self.indent_level {
                self.source.push_str(INDENTATION);
            }
            self.at_line_start = false;
        }
        self.source.push_str(text);
        self
    }

    /// Appends `text` followed by a line break.
    pub fn append_line(&mut self, text: &str) -> &mut Self {
        self.append(text);
        self.new_line()
    }

    /// Ends the current line.
    pub fn new_line(&mut self) -> &mut Self {
        self.source.push('\n');
        self.at_line_start = true;
        self
    }

    /// Appends the contents of `other` to this fragment, absorbing its imports.
    pub fn append_fragment(&mut self, other: CodeFragment) -> &mut Self {
        let CodeFragment {
            source,
            at_line_start,
            imports,
            ..
        } = other;

        let mut lines = source.split('\n');
        if let Some(first) = lines.next() {
            self.append(first);
        }
        for line in lines {
            self.new_line();
            self.append(line);
        }
        if at_line_start && !self.at_line_start {
            self.new_line();
        }

        self.imports.extend(imports);
        self
    }

    /// Appends a parenthesised, comma-separated argument list.
    pub fn append_arguments(&mut self, args: Vec<CodeFragment>) -> &mut Self {
        self.append("(");
        for (index, arg) in args.into_iter().enumerate() {
            if index > 0 {
                self.append(", ");
            }
            self.append_fragment(arg);
        }
        self.append(")")
    }

    /// Increases the indentation level for subsequent lines.
    pub fn indent(&mut self) -> &mut Self {
        self.indent_level += 1;
        self
    }

    /// Decreases the indentation level for subsequent lines.
    ///
    /// Outdenting at level zero has no effect.
    pub fn outdent(&mut self) -> &mut Self {
        self.indent_level = self.indent_level.saturating_sub(1);
        self
    }

    /// Records that the fragment refers to the type with the fully qualified
    /// name `import`.
    pub fn add_import(&mut self, import: impl Into<String>) -> &mut Self {
        let import = import.into();
        // Types from java.lang and primitives never need importing.
        if import.contains('.') && !import.starts_with("java.lang.") {
            self.imports.insert(import);
        }
        self
    }
}

/// Accessors for the fragment's contents.
impl CodeFragment {
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Gets the imports that the fragment needs, in sorted order.
    pub fn imports(&self) -> impl Iterator<Item = &str> {
        self.imports.iter().map(String::as_str)
    }

    #[must_use]
    pub fn indent_level(&self) -> usize {
        self.indent_level
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// Renders the imports as Java import statements, one per line.
    #[must_use]
    pub fn import_declarations(&self) -> String {
        self.imports.iter().map(|i| format!("import {i};")).join("\n")
    }
}

impl Display for CodeFragment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl From<&str> for CodeFragment {
    fn from(value: &str) -> Self {
        Self::from_source(value)
    }
}

#[cfg(test)]
mod test {
    use crate::fragment::CodeFragment;

    #[test]
    fn calls_are_composed_with_imports() {
        let lhs = CodeFragment::with_import("a", "org.faktorips.values.Decimal");
        let rhs = CodeFragment::with_import("b", "java.math.RoundingMode");

        let call = CodeFragment::call(lhs, "add", vec![rhs]);

        assert_eq!(call.source(), "a.add(b)");
        assert_eq!(
            call.imports().collect::<Vec<_>>(),
            vec!["java.math.RoundingMode", "org.faktorips.values.Decimal"]
        );
    }

    #[test]
    fn java_lang_types_are_not_imported() {
        let mut fragment = CodeFragment::new();
        fragment.add_import("java.lang.Integer").add_import("int");

        assert_eq!(fragment.imports().count(), 0);
    }

    #[test]
    fn appended_lines_are_reindented() {
        let mut inner = CodeFragment::new();
        inner.append_line("{").indent().append_line("x;").outdent().append("}");

        let mut outer = CodeFragment::new();
        outer.indent();
        outer.new_line();
        outer.append_fragment(inner);

        assert_eq!(outer.source(), "\n    {\n        x;\n    }");
    }

    #[test]
    fn outdent_saturates_at_zero() {
        let mut fragment = CodeFragment::new();
        fragment.outdent();
        assert_eq!(fragment.indent_level(), 0);
    }

    #[test]
    fn infix_and_prefix() {
        let sum = CodeFragment::infix(CodeFragment::from_source("a"), "+", "b".into());
        assert_eq!(sum.source(), "(a + b)");

        let not = CodeFragment::prefix("!", sum);
        assert_eq!(not.to_string(), "!(a + b)");
    }
}
