//! `{{ placeholder }}` substitution for email templates.

use serde_json::{Map, Value};

/// Replace every `{{ path }}` in `template` with the matching context value.
///
/// Paths may be dotted (`{{ job.title }}`) to reach into nested objects.
/// Missing keys and `null` render as an empty string. When `escape_html` is set,
/// substituted values are HTML-escaped; the template text itself never is.
pub fn substitute(template: &str, context: &Map<String, Value>, escape_html: bool) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        result.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];

        let Some(end) = after_open.find("}}") else {
            // Unterminated placeholder, keep the remainder verbatim
            result.push_str(&rest[start..]);
            return result;
        };

        let path = after_open[..end].trim();
        let rendered = render_value(lookup(context, path));
        if escape_html {
            result.push_str(&escape(&rendered));
        } else {
            result.push_str(&rendered);
        }

        rest = &after_open[end + 2..];
    }

    result.push_str(rest);
    result
}

fn lookup<'a>(context: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }

    // Exact key first, so keys containing dots still resolve
    if let Some(value) = context.get(path) {
        return Some(value);
    }

    let mut segments = path.split('.');
    let mut current = context.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn render_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        // For arrays and objects, use JSON representation
        Some(other) => other.to_string(),
    }
}

/// Minimal HTML escaping for text placed into markup
pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
