use thiserror::Error;

/// Error type shared by every stage of the engine.
///
/// Parse failures are reported when a template is added to the
/// [`Environment`](crate::Environment); everything else surfaces from
/// [`Template::render`](crate::Template::render). The variant tells which
/// stage rejected the template, the payload is the human readable message.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    /// Lexer or parser rejected the template source.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// A filter, test, function or template name did not resolve.
    #[error("unknown name: {0}")]
    UnknownName(String),

    /// An operation was applied to a value of the wrong kind.
    #[error("type error: {0}")]
    Type(String),

    /// Division by zero, zero range step and friends.
    #[error("arithmetic error: {0}")]
    Arithmetic(String),

    /// A host value could not be converted into a template value.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// An undefined value was used where a value is required.
    #[error("undefined error: {0}")]
    Undefined(String),
}

impl TemplateError {
    pub(crate) fn syntax(msg: impl Into<String>) -> Self {
        TemplateError::Syntax(msg.into())
    }

    pub(crate) fn unknown_name(msg: impl Into<String>) -> Self {
        TemplateError::UnknownName(msg.into())
    }

    pub(crate) fn type_error(msg: impl Into<String>) -> Self {
        TemplateError::Type(msg.into())
    }

    pub(crate) fn arithmetic(msg: impl Into<String>) -> Self {
        TemplateError::Arithmetic(msg.into())
    }

    pub(crate) fn undefined(msg: impl Into<String>) -> Self {
        TemplateError::Undefined(msg.into())
    }
}
