//! Email template registry and resolver.
//!
//! Templates are loaded once at startup from a directory of files; each file
//! `<name>.html`, `<name>.htm` or `<name>.txt` registers a template called
//! `<name>` (case-sensitive). The registry is immutable afterwards and can be
//! shared behind an `Arc` without locking.
//!
//! Resolution never fails. When the requested template is missing the resolver
//! tries the single legacy alias and finally falls back to a generic plain-text
//! body that dumps the subject and the context.

mod substitution;

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};

pub use substitution::{escape, substitute};

/// Legacy template names that were renamed, as `(old, new)`
pub const LEGACY_ALIASES: &[(&str, &str)] = &[("recruiterNewApplication", "applicationReceived")];

/// Body format of a template or rendered message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyFormat {
    Html,
    Text,
}

/// A compiled template loaded from the template directory
#[derive(Debug, Clone)]
pub struct Template {
    pub name: String,
    pub format: BodyFormat,
    pub source: String,
}

impl Template {
    pub fn new(name: impl Into<String>, format: BodyFormat, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            format,
            source: source.into(),
        }
    }

    pub fn render(&self, context: &Map<String, Value>) -> RenderedMessage {
        RenderedMessage {
            body: substitute(&self.source, context, self.format == BodyFormat::Html),
            format: self.format,
        }
    }
}

/// A message body ready to hand to a transport
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedMessage {
    pub body: String,
    pub format: BodyFormat,
}

/// How a template name was resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionKind {
    /// The requested template exists
    Direct,
    /// A legacy name was mapped onto its replacement
    Alias { from: String, to: String },
    /// Nothing matched, the generic dump was used
    Generic,
}

impl ResolutionKind {
    pub fn is_fallback(&self) -> bool {
        !matches!(self, ResolutionKind::Direct)
    }

    /// Metric label for the kind of fallback
    pub fn label(&self) -> &'static str {
        match self {
            ResolutionKind::Direct => "direct",
            ResolutionKind::Alias { .. } => "alias",
            ResolutionKind::Generic => "generic",
        }
    }
}

/// Result of resolving a template name
#[derive(Debug, Clone)]
pub struct Resolution {
    pub message: RenderedMessage,
    pub kind: ResolutionKind,
}

/// Read-only registry of templates keyed by exact name
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, Template>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from already compiled templates
    pub fn from_templates(templates: impl IntoIterator<Item = Template>) -> Self {
        Self {
            templates: templates
                .into_iter()
                .map(|t| (t.name.clone(), t))
                .collect(),
        }
    }

    /// Scan `dir` for template files.
    ///
    /// A missing or unreadable directory yields an empty registry and a warning.
    pub fn load_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(
                    dir = %dir.display(),
                    error = %e,
                    "Template directory unavailable, every notification will use fallback rendering"
                );
                return Self::new();
            }
        };

        let mut templates = HashMap::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let format = match path.extension().and_then(|e| e.to_str()) {
                Some("html") | Some("htm") => BodyFormat::Html,
                Some("txt") => BodyFormat::Text,
                _ => continue,
            };

            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            match fs::read_to_string(&path) {
                Ok(source) => {
                    if templates.contains_key(name) {
                        tracing::warn!(template = %name, path = %path.display(), "Duplicate template name, keeping the first one");
                        continue;
                    }
                    templates.insert(name.to_string(), Template::new(name, format, source));
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable template");
                }
            }
        }

        tracing::info!(dir = %dir.display(), count = templates.len(), "Email templates loaded");
        Self { templates }
    }

    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Sorted template names
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolve `name` against the registry, falling back as needed.
    pub fn render(&self, name: &str, subject: &str, context: &Map<String, Value>) -> Resolution {
        if let Some(template) = self.get(name) {
            return Resolution {
                message: template.render(context),
                kind: ResolutionKind::Direct,
            };
        }

        let alias = LEGACY_ALIASES
            .iter()
            .find(|(old, _)| *old == name)
            .and_then(|(_, new)| self.get(new));

        if let Some(template) = alias {
            tracing::info!(requested = %name, used = %template.name, "Template missing, using renamed template");
            return Resolution {
                message: template.render(context),
                kind: ResolutionKind::Alias {
                    from: name.to_string(),
                    to: template.name.clone(),
                },
            };
        }

        tracing::warn!(template = %name, "Template missing, using generic rendering");
        Resolution {
            message: generic_message(subject, context),
            kind: ResolutionKind::Generic,
        }
    }
}

fn generic_message(subject: &str, context: &Map<String, Value>) -> RenderedMessage {
    let dump = serde_json::to_string_pretty(context).unwrap_or_else(|_| "{}".to_string());
    RenderedMessage {
        body: format!("{}\n\n{}\n", subject, dump),
        format: BodyFormat::Text,
    }
}
