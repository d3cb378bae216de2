//! Message template rendering.
//!
//! Templates reference event properties by name: `"User {userId} logged in"`.
//! A hole may carry a `@`/`$` prefix, an alignment (`,10`, ignored) and a
//! format (`{elapsed:0.00}`). `{{` and `}}` render as literal braces, and a
//! hole naming an unknown property is rendered verbatim.

use serde_json::{Number, Value};
use std::collections::BTreeMap;

/// Formats property values while rendering a message.
///
/// The default methods implement invariant formatting; locale-aware
/// providers usually only override the separators.
pub trait FormatProvider: Send + Sync {
    /// Character placed between the integer and fractional digits.
    fn decimal_separator(&self) -> char {
        '.'
    }

    /// Character used for thousands grouping by `N` formats.
    fn group_separator(&self) -> char {
        ','
    }

    /// Formats one property value with an optional format string.
    fn format_value(&self, value: &Value, format: Option<&str>) -> String {
        match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => format_number(
                n,
                format,
                self.decimal_separator(),
                self.group_separator(),
            ),
            Value::Bool(b) => b.to_string(),
            Value::Null => "null".to_string(),
            Value::Array(_) | Value::Object(_) => value.to_string(),
        }
    }
}

/// Culture-invariant formatting: `.` decimals, `,` grouping.
#[derive(Debug, Clone, Copy, Default)]
pub struct InvariantFormat;

impl FormatProvider for InvariantFormat {}

/// Formatting with custom decimal and grouping separators.
///
/// # Example
///
/// ```
/// use sink::translate::{FormatProvider, LocaleFormat};
///
/// let german = LocaleFormat::new(',', '.');
/// assert_eq!(german.format_value(&serde_json::json!(1234.5), Some("N2")), "1.234,50");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct LocaleFormat {
    decimal: char,
    group: char,
}

impl LocaleFormat {
    /// Creates a provider with the given decimal and group separators.
    #[must_use]
    pub fn new(decimal: char, group: char) -> Self {
        Self { decimal, group }
    }
}

impl FormatProvider for LocaleFormat {
    fn decimal_separator(&self) -> char {
        self.decimal
    }

    fn group_separator(&self) -> char {
        self.group
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NumberFormat {
    decimals: usize,
    grouped: bool,
}

/// Largest precision a number format may ask for; longer ones are ignored.
const MAX_DECIMALS: usize = 99;

/// Understands `N<digits>`, `F<digits>` and `0.00`-style patterns.
fn parse_number_format(format: &str) -> Option<NumberFormat> {
    let mut chars = format.chars();
    match chars.next()? {
        'N' | 'n' | 'F' | 'f' => {
            let rest = chars.as_str();
            let decimals = if rest.is_empty() {
                2
            } else {
                rest.parse().ok().filter(|d| *d <= MAX_DECIMALS)?
            };
            Some(NumberFormat {
                decimals,
                grouped: matches!(format.as_bytes()[0], b'N' | b'n'),
            })
        }
        '0' => {
            let (int_part, frac_part) = format.split_once('.').unwrap_or((format, ""));
            if !int_part.chars().all(|c| c == '0')
                || !frac_part.chars().all(|c| c == '0')
                || frac_part.len() > MAX_DECIMALS
            {
                return None;
            }
            Some(NumberFormat {
                decimals: frac_part.len(),
                grouped: false,
            })
        }
        _ => None,
    }
}

fn format_number(n: &Number, format: Option<&str>, decimal: char, group: char) -> String {
    let spec = format.and_then(parse_number_format);
    let text = match spec {
        Some(spec) => format!("{:.*}", spec.decimals, n.as_f64().unwrap_or_default()),
        None => n.to_string(),
    };

    let (sign, unsigned) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text.as_str()),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };

    let mut out = String::with_capacity(text.len() + 4);
    out.push_str(sign);
    if spec.is_some_and(|s| s.grouped) {
        out.push_str(&group_digits(int_part, group));
    } else {
        out.push_str(int_part);
    }
    if let Some(frac) = frac_part {
        out.push(decimal);
        out.push_str(frac);
    }
    out
}

fn group_digits(digits: &str, group: char) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(group);
        }
        out.push(c);
    }
    out
}

/// Renders a message template against event properties.
///
/// # Example
///
/// ```
/// use sink::translate::{render, InvariantFormat};
/// use std::collections::BTreeMap;
///
/// let mut props = BTreeMap::new();
/// props.insert("userId".to_string(), serde_json::json!(42));
///
/// let text = render("User {userId} logged in", &props, &InvariantFormat);
/// assert_eq!(text, "User 42 logged in");
/// ```
#[must_use]
pub fn render(
    template: &str,
    properties: &BTreeMap<String, Value>,
    provider: &dyn FormatProvider,
) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let brace = rest.as_bytes()[pos];
        let after = &rest[pos + 1..];

        if brace == b'}' {
            out.push('}');
            rest = after.strip_prefix('}').unwrap_or(after);
            continue;
        }

        if let Some(escaped) = after.strip_prefix('{') {
            out.push('{');
            rest = escaped;
            continue;
        }

        let Some(end) = after.find('}') else {
            out.push_str(&rest[pos..]);
            return out;
        };

        let token = &after[..end];
        match render_hole(token, properties, provider) {
            Some(rendered) => out.push_str(&rendered),
            None => {
                out.push('{');
                out.push_str(token);
                out.push('}');
            }
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

fn render_hole(
    token: &str,
    properties: &BTreeMap<String, Value>,
    provider: &dyn FormatProvider,
) -> Option<String> {
    let token = token.strip_prefix(['@', '$']).unwrap_or(token);
    let (head, format) = match token.split_once(':') {
        Some((head, format)) => (head, Some(format)),
        None => (token, None),
    };
    let name = head.split_once(',').map_or(head, |(name, _alignment)| name);

    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }

    properties
        .get(name)
        .map(|value| provider.format_value(value, format))
}
