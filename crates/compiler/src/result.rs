//! The outcome of compiling a formula or any of its sub-expressions.

use std::collections::BTreeSet;

use flc_errors::diagnostic::{Message, MessageList, Span};

use crate::{datatype::Datatype, fragment::CodeFragment};

/// The result of compiling an expression.
///
/// A result is _failed_ exactly when its messages contain an error. A
/// successful result always carries both a code fragment and the datatype of
/// that fragment, while a failed result may carry neither.
///
/// Results are built bottom-up: the result of a composite expression absorbs
/// the messages and identifiers of the results of its parts, so that the
/// result at the root describes every problem with the formula.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompilationResult {
    /// The generated code, if compilation succeeded.
    fragment: Option<CodeFragment>,

    /// The datatype of the generated code, if compilation succeeded.
    datatype: Option<Datatype>,

    /// The diagnostics raised while compiling the expression.
    messages: MessageList,

    /// The parameter names that the expression refers to.
    identifiers: BTreeSet<String>,
}

impl CompilationResult {
    /// Creates a successful result for `fragment` with the provided
    /// `datatype`.
    #[must_use]
    pub fn new(fragment: CodeFragment, datatype: Datatype) -> Self {
        Self {
            fragment: Some(fragment),
            datatype: Some(datatype),
            ..Self::default()
        }
    }

    /// Creates a result carrying only `message`, which is failed if the
    /// message is an error.
    #[must_use]
    pub fn from_message(message: Message) -> Self {
        Self::from_messages(message.into())
    }

    /// Creates a result carrying only `messages`.
    #[must_use]
    pub fn from_messages(messages: MessageList) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    /// Creates a failed result with an error carrying `code` and `text`.
    #[must_use]
    pub fn error(code: &str, text: impl Into<String>) -> Self {
        Self::from_message(Message::new_error(code, text))
    }

    /// Records that the expression refers to the parameter `identifier`.
    #[must_use]
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifiers.insert(identifier.into());
        self
    }
}

/// Operations for combining results.
impl CompilationResult {
    pub fn add_message(&mut self, message: Message) {
        self.messages.add(message);
    }

    pub fn add_messages(&mut self, messages: MessageList) {
        self.messages.add_all(messages);
    }

    /// Moves the messages and identifiers of `other` into `self`, leaving
    /// `other` with only its fragment and datatype.
    pub fn absorb_diagnostics(&mut self, other: &mut CompilationResult) {
        self.messages.add_all(std::mem::take(&mut other.messages));
        self.identifiers.append(&mut other.identifiers);
    }

    /// Merges `other` into `self`.
    ///
    /// The messages and identifiers of both are kept. If `other` has
    /// generated code, its fragment and datatype replace those of `self`.
    pub fn absorb(&mut self, mut other: CompilationResult) {
        self.absorb_diagnostics(&mut other);
        if other.fragment.is_some() {
            self.fragment = other.fragment;
            self.datatype = other.datatype;
        }
    }

    /// Attaches every message that is not yet attached to a part of the
    /// formula to `span`.
    #[must_use]
    pub fn located_at(mut self, span: &Span) -> Self {
        self.messages = std::mem::take(&mut self.messages)
            .into_iter()
            .map(|message| message.or_span(span))
            .collect();
        self
    }

    /// Replaces the generated code and its datatype.
    pub fn set_code(&mut self, fragment: CodeFragment, datatype: Datatype) {
        self.fragment = Some(fragment);
        self.datatype = Some(datatype);
    }

    /// Takes the generated code and its datatype out of the result, leaving
    /// the diagnostics in place.
    pub fn take_code(&mut self) -> Option<(CodeFragment, Datatype)> {
        let fragment = self.fragment.take();
        let datatype = self.datatype.take();
        fragment.zip(datatype)
    }
}

/// Accessors for the result's contents.
impl CompilationResult {
    /// Returns `true` if any of the result's messages is an error.
    #[must_use]
    pub fn failed(&self) -> bool {
        self.messages.contains_error()
    }

    #[must_use]
    pub fn successful(&self) -> bool {
        !self.failed()
    }

    #[must_use]
    pub fn fragment(&self) -> Option<&CodeFragment> {
        self.fragment.as_ref()
    }

    #[must_use]
    pub fn datatype(&self) -> Option<&Datatype> {
        self.datatype.as_ref()
    }

    #[must_use]
    pub fn messages(&self) -> &MessageList {
        &self.messages
    }

    /// Gets the names of the parameters that the expression refers to, in
    /// sorted order.
    #[must_use]
    pub fn identifiers(&self) -> &BTreeSet<String> {
        &self.identifiers
    }

    /// Gets the generated source text, or the empty string for a result
    /// without code.
    #[must_use]
    pub fn source(&self) -> &str {
        self.fragment.as_ref().map_or("", CodeFragment::source)
    }
}

#[cfg(test)]
mod test {
    use flc_errors::diagnostic::Message;

    use crate::{datatype::Datatype, fragment::CodeFragment, result::CompilationResult};

    #[test]
    fn results_fail_only_on_errors() {
        let mut result = CompilationResult::new("1".into(), Datatype::int);
        result.add_message(Message::new_warning("W", "careful"));
        assert!(result.successful());

        result.add_message(Message::new_error("E", "broken"));
        assert!(result.failed());
    }

    #[test]
    fn absorbing_keeps_all_diagnostics() {
        let mut lhs = CompilationResult::new("a".into(), Datatype::int).with_identifier("a");
        let mut rhs = CompilationResult::error("E", "broken").with_identifier("b");

        let mut composite = CompilationResult::default();
        composite.absorb_diagnostics(&mut lhs);
        composite.absorb_diagnostics(&mut rhs);

        assert!(composite.failed());
        assert!(lhs.messages().is_empty());
        assert_eq!(
            composite.identifiers().iter().collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert_eq!(lhs.take_code(), Some((CodeFragment::from_source("a"), Datatype::int)));
    }

    #[test]
    fn spans_are_only_attached_to_unlocated_messages() {
        let mut result = CompilationResult::error("E", "first");
        result.add_message(Message::new_error("E", "second").with_span(0..1));

        let result = result.located_at(&(3..7));
        let spans = result.messages().iter().map(|m| m.span().cloned()).collect::<Vec<_>>();

        assert_eq!(spans, vec![Some(3..7), Some(0..1)]);
    }
}
