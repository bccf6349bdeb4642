//! The diagnostic message model used to report problems with a formula.
//!
//! Problems with a formula (bad syntax, unknown identifiers, type errors) are
//! expected, recoverable conditions. Rather than being returned as errors they
//! are accumulated as [`Message`]s in a [`MessageList`] that travels with the
//! compilation result, so that a caller can display all of them at once.

use std::{
    fmt::{Display, Formatter},
    ops::Range,
};

use ariadne::{Config, Label, Report, ReportKind, Source};

/// A region of the formula text, given as a range of character offsets.
pub type Span = Range<usize>;

/// How serious a diagnostic is.
///
/// The ordering is meaningful: a list's overall severity is the maximum of
/// its messages' severities.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let str = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{str}")
    }
}

/// A single diagnostic about a formula.
///
/// Each message carries a stable `code` that callers can match on, a
/// human-readable `text`, and optionally the [`Span`] of the sub-expression it
/// refers to.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Message {
    severity: Severity,
    code:     String,
    text:     String,
    span:     Option<Span>,
}

impl Message {
    /// Creates a new message with the provided `severity`, `code` and `text`,
    /// not attached to any part of the formula.
    #[must_use]
    pub fn new(severity: Severity, code: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            severity,
            code: code.into(),
            text: text.into(),
            span: None,
        }
    }

    /// Creates a new error message.
    #[must_use]
    pub fn new_error(code: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, text)
    }

    /// Creates a new warning message.
    #[must_use]
    pub fn new_warning(code: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(Severity::Warning, code, text)
    }

    /// Creates a new informational message.
    #[must_use]
    pub fn new_info(code: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(Severity::Info, code, text)
    }

    /// Attaches the message to the sub-expression at `span`.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Attaches the message to `span` only if it is not yet attached anywhere.
    #[must_use]
    pub fn or_span(self, span: &Span) -> Self {
        if self.span.is_some() {
            self
        } else {
            self.with_span(span.clone())
        }
    }

    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn span(&self) -> Option<&Span> {
        self.span.as_ref()
    }

    /// Returns `true` if the message has error severity.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Builds an [`ariadne`] report for this message.
    ///
    /// Messages without a span are reported against the start of the source.
    #[must_use]
    pub fn report(&self) -> Report<'static, Span> {
        let kind = match self.severity {
            Severity::Error => ReportKind::Error,
            Severity::Warning => ReportKind::Warning,
            Severity::Info => ReportKind::Advice,
        };
        let span = self.span.clone().unwrap_or(0..0);

        Report::build(kind, (), span.start)
            .with_code(&self.code)
            .with_message(&self.text)
            .with_label(Label::new(span).with_message(&self.text))
            .with_config(Config::default().with_color(false))
            .finish()
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.span {
            Some(span) => write!(
                f,
                "{} [{}] at {}..{}: {}",
                self.severity, self.code, span.start, span.end, self.text
            ),
            None => write!(f, "{} [{}]: {}", self.severity, self.code, self.text),
        }
    }
}

/// An ordered collection of [`Message`]s.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MessageList {
    messages: Vec<Message>,
}

impl MessageList {
    /// Creates an empty message list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `message` to the list.
    pub fn add(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Appends every message in `other` to the list, preserving order.
    pub fn add_all(&mut self, other: MessageList) {
        self.messages.extend(other.messages);
    }

    /// Returns `true` if any message in the list has error severity.
    #[must_use]
    pub fn contains_error(&self) -> bool {
        self.messages.iter().any(Message::is_error)
    }

    /// Gets the highest severity of any message in the list, or [`None`] if
    /// the list is empty.
    #[must_use]
    pub fn severity(&self) -> Option<Severity> {
        self.messages.iter().map(Message::severity).max()
    }

    /// Gets the first message with the provided `code`, if any.
    #[must_use]
    pub fn by_code(&self, code: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.code == code)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    /// Renders every message in the list as a plain-text [`ariadne`] report
    /// against the formula `source`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if a report cannot be written.
    pub fn render(&self, source: &str) -> std::io::Result<String> {
        let mut out = Vec::new();
        for message in &self.messages {
            message.report().write(Source::from(source), &mut out)?;
        }
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

impl Display for MessageList {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for message in &self.messages {
            writeln!(f, "{message}")?;
        }
        Ok(())
    }
}

impl From<Message> for MessageList {
    fn from(value: Message) -> Self {
        Self {
            messages: vec![value],
        }
    }
}

impl FromIterator<Message> for MessageList {
    fn from_iter<T: IntoIterator<Item = Message>>(iter: T) -> Self {
        Self {
            messages: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for MessageList {
    type IntoIter = std::vec::IntoIter<Message>;
    type Item = Message;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.into_iter()
    }
}

impl<'a> IntoIterator for &'a MessageList {
    type IntoIter = std::slice::Iter<'a, Message>;
    type Item = &'a Message;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

#[cfg(test)]
mod test {
    use crate::diagnostic::{Message, MessageList, Severity};

    #[test]
    fn warnings_do_not_make_a_list_fail() {
        let mut list = MessageList::new();
        list.add(Message::new_warning("W", "careful"));
        list.add(Message::new_info("I", "note"));

        assert!(!list.contains_error());
        assert_eq!(list.severity(), Some(Severity::Warning));
    }

    #[test]
    fn errors_make_a_list_fail() {
        let mut list = MessageList::from(Message::new_info("I", "note"));
        list.add_all(Message::new_error("E", "broken").into());

        assert!(list.contains_error());
        assert_eq!(list.len(), 2);
        assert_eq!(list.by_code("E").unwrap().text(), "broken");
    }

    #[test]
    fn or_span_keeps_existing_span() {
        let message = Message::new_error("E", "x").with_span(1..2).or_span(&(5..9));
        assert_eq!(message.span(), Some(&(1..2)));

        let message = Message::new_error("E", "x").or_span(&(5..9));
        assert_eq!(message.span(), Some(&(5..9)));
    }

    #[test]
    fn render_mentions_code_and_text() -> anyhow::Result<()> {
        let list = MessageList::from(
            Message::new_error("FLC-UndefinedIdentifier", "Undefined identifier `x`")
                .with_span(4..5),
        );

        let rendered = list.render("1 + x")?;
        assert!(rendered.contains("FLC-UndefinedIdentifier"));
        assert!(rendered.contains("Undefined identifier `x`"));

        Ok(())
    }
}
