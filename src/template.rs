//! Template interpolation for test names and step labels.
//!
//! A template is scanned left to right:
//!
//! - `$` followed by a run of decimal digits is a positional placeholder.
//!   The whole run is the index, so `$10` is argument ten.
//! - `$` followed by a letter is a named placeholder. The key is the run of
//!   letters, digits and underscores.
//! - Any other `$` (end of input, space, punctuation, another `$`) is kept as a
//!   literal `$`.
//!
//! Rendering is pure: it reads the already-captured arguments and context and
//! has no other inputs.
//!
//! ```rust
//! use suitecraft::template::{render, ParamContext};
//! use suitecraft::args;
//! let name = render("$0+$1=$2", &args![1, 2, 3], &ParamContext::new(), &[]).unwrap();
//! assert_eq!(name, "1+2=3");
//! ```

use std::collections::BTreeMap;

use crate::diagnostics::TemplateError;
use crate::value::{stringify, Formatter, Value};

/// One entry of a [`ParamContext`]: the value read from the instance and the
/// formatter registered for it, if any.
#[derive(Clone, Default)]
pub struct NamedParam {
    pub value: Value,
    pub formatter: Option<Formatter>,
}

impl NamedParam {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            formatter: None,
        }
    }

    pub fn with_formatter(value: impl Into<Value>, formatter: Formatter) -> Self {
        Self {
            value: value.into(),
            formatter: Some(formatter),
        }
    }

    fn render(&self) -> String {
        match &self.formatter {
            Some(format) => format(&self.value),
            None => stringify(&self.value),
        }
    }
}

impl std::fmt::Debug for NamedParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedParam")
            .field("value", &self.value)
            .field("formatter", &self.formatter.is_some())
            .finish()
    }
}

/// Named values available to `$name` placeholders. Built fresh for every
/// rendering from a live instance and discarded afterwards.
pub type ParamContext = BTreeMap<String, NamedParam>;

/// A parsed piece of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'t> {
    Literal(&'t str),
    Positional {
        /// Parsed index; `None` when the digit run does not fit in a `usize`.
        index: Option<usize>,
        text: &'t str,
        offset: usize,
        byte_offset: usize,
    },
    Named {
        key: &'t str,
        offset: usize,
        byte_offset: usize,
    },
}

/// Splits a template into literal and placeholder segments.
///
/// Parsing never fails; unknown placeholders are only detected when the
/// segments are rendered against concrete arguments.
pub fn parse(template: &str) -> Vec<Segment<'_>> {
    let chars: Vec<(usize, char)> = template.char_indices().collect();
    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;

    while i < chars.len() {
        let (byte_offset, c) = chars[i];
        let next = chars.get(i + 1).map(|(_, n)| *n);
        let is_placeholder = c == '$'
            && next.is_some_and(|n| n.is_ascii_digit() || n.is_alphabetic());
        if !is_placeholder {
            i += 1;
            continue;
        }

        if literal_start < byte_offset {
            segments.push(Segment::Literal(&template[literal_start..byte_offset]));
        }

        let digits = next.is_some_and(|n| n.is_ascii_digit());
        let mut end = i + 1;
        while let Some((_, n)) = chars.get(end) {
            let accepted = if digits {
                n.is_ascii_digit()
            } else {
                n.is_alphanumeric() || *n == '_'
            };
            if !accepted {
                break;
            }
            end += 1;
        }
        let end_byte = chars.get(end).map_or(template.len(), |(b, _)| *b);
        let body = &template[byte_offset + 1..end_byte];

        if digits {
            segments.push(Segment::Positional {
                index: body.parse::<usize>().ok(),
                text: &template[byte_offset..end_byte],
                offset: i,
                byte_offset,
            });
        } else {
            segments.push(Segment::Named {
                key: body,
                offset: i,
                byte_offset,
            });
        }
        literal_start = end_byte;
        i = end;
    }

    if literal_start < template.len() {
        segments.push(Segment::Literal(&template[literal_start..]));
    }
    segments
}

/// Returns true if the template references any `$name` placeholder.
pub fn has_named_placeholders(template: &str) -> bool {
    parse(template)
        .iter()
        .any(|segment| matches!(segment, Segment::Named { .. }))
}

/// Keys of every `$name` placeholder, in order of appearance.
pub fn named_keys(template: &str) -> Vec<&str> {
    parse(template)
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Named { key, .. } => Some(key),
            _ => None,
        })
        .collect()
}

/// Renders only the `$name` placeholders whose key is in `named`.
///
/// Positional placeholders and unknown keys are kept exactly as written, so
/// this never fails. Used for titles that take no arguments.
pub fn render_known(template: &str, named: &ParamContext) -> String {
    let mut out = String::with_capacity(template.len());
    for segment in parse(template) {
        match segment {
            Segment::Literal(text) | Segment::Positional { text, .. } => out.push_str(text),
            Segment::Named { key, byte_offset, .. } => match named.get(key) {
                Some(param) => out.push_str(&param.render()),
                None => out.push_str(&template[byte_offset..byte_offset + key.len() + 1]),
            },
        }
    }
    out
}

/// Renders a template.
///
/// Positional placeholders use the formatter at the same index in
/// `formatters` when one is present; named placeholders use the formatter
/// stored in their context entry. Everything else goes through
/// [`stringify`].
///
/// # Errors
/// - [`TemplateError::OutOfRange`] when a positional index has no argument.
/// - [`TemplateError::MissingParameter`] when a named key is not in `named`.
pub fn render(
    template: &str,
    positional: &[Value],
    named: &ParamContext,
    formatters: &[Option<Formatter>],
) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    for segment in parse(template) {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Positional {
                index,
                text,
                offset,
                byte_offset,
            } => {
                let Some(value) = index.and_then(|i| positional.get(i)) else {
                    return Err(TemplateError::OutOfRange {
                        offset,
                        placeholder: text.to_string(),
                        required: index.map_or(usize::MAX, |i| i.saturating_add(1)),
                        available: positional.len(),
                        template: template.to_string(),
                        span: (byte_offset, text.len()).into(),
                    });
                };
                let formatter = index.and_then(|i| formatters.get(i)).and_then(Option::as_ref);
                match formatter {
                    Some(format) => out.push_str(&format(value)),
                    None => out.push_str(&stringify(value)),
                }
            }
            Segment::Named {
                key,
                offset,
                byte_offset,
            } => {
                let Some(param) = named.get(key) else {
                    return Err(TemplateError::MissingParameter {
                        offset,
                        key: key.to_string(),
                        template: template.to_string(),
                        span: (byte_offset, key.len() + 1).into(),
                    });
                };
                out.push_str(&param.render());
            }
        }
    }
    Ok(out)
}
