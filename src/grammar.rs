//! User-supplied highlighter grammars
//!
//! A grammar descriptor is a small JSON record (keywords, quote characters,
//! comment markers, extra token patterns) that is turned into a
//! `hljs.registerLanguage` call and shipped inside the rendered document.
//! Registration is guarded so an id that highlight.js already knows is
//! left alone.

use crate::config::is_safe_asset_name;
use crate::language::LanguageEntry;
use crate::{Error, Result};
use log::{debug, warn};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Keyword lists, either flat (all plain keywords) or grouped by the
/// highlighter class they should receive (`keyword`, `literal`, `type`, ...)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Keywords {
    List(Vec<String>),
    Classes(BTreeMap<String, Vec<String>>),
}

impl Default for Keywords {
    fn default() -> Self {
        Keywords::List(Vec::new())
    }
}

/// An extra token rule; `begin`/`end` are regular expression sources
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenPattern {
    #[serde(alias = "className")]
    pub scope: String,
    pub begin: String,
    #[serde(default)]
    pub end: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GrammarDescriptor {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub keywords: Keywords,
    /// Quote delimiters, each opening and closing a string
    #[serde(default)]
    pub strings: Vec<String>,
    #[serde(default = "default_numbers")]
    pub numbers: bool,
    #[serde(default)]
    pub line_comment: Option<String>,
    #[serde(default)]
    pub block_comment: Option<(String, String)>,
    #[serde(default)]
    pub patterns: Vec<TokenPattern>,
}

fn default_numbers() -> bool {
    true
}

impl GrammarDescriptor {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let descriptor: GrammarDescriptor =
            serde_json::from_str(text).map_err(|e| Error::LanguageError(e.to_string()))?;
        if !is_safe_asset_name(&descriptor.id()) {
            return Err(Error::LanguageError(format!(
                "grammar name '{}' is not a valid language id",
                descriptor.name
            )));
        }
        Ok(descriptor)
    }

    /// Registry id, the lowercased name
    pub fn id(&self) -> String {
        self.name.trim().to_lowercase()
    }

    pub fn to_language_entry(&self) -> LanguageEntry {
        LanguageEntry {
            id: self.id(),
            display_name: Some(self.display_name.clone().unwrap_or_else(|| self.name.clone())),
            extensions: self.extensions.clone(),
            aliases: self.aliases.clone(),
        }
    }
}

/// Grammar descriptors keyed by id
#[derive(Debug, Clone, Default)]
pub struct GrammarRegistry {
    grammars: BTreeMap<String, GrammarDescriptor>,
}

impl GrammarRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.json` file in `dir`, in file-name order.
    ///
    /// A missing directory yields an empty registry; unreadable or invalid
    /// files are skipped with a warning.
    pub fn load_dir(dir: &Path) -> Self {
        let mut registry = Self::new();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("No grammar directory at {}: {}", dir.display(), e);
                return registry;
            }
        };

        let mut paths: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")))
            .collect();
        paths.sort();

        for path in paths {
            let parsed = std::fs::read_to_string(&path)
                .map_err(Error::from)
                .and_then(|text| GrammarDescriptor::from_json_str(&text));
            match parsed {
                Ok(descriptor) => registry.insert(descriptor),
                Err(e) => warn!("Skipping grammar {}: {}", path.display(), e),
            }
        }
        registry
    }

    pub fn insert(&mut self, descriptor: GrammarDescriptor) {
        self.grammars.insert(descriptor.id(), descriptor);
    }

    pub fn get(&self, id: &str) -> Option<&GrammarDescriptor> {
        self.grammars.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &GrammarDescriptor> {
        self.grammars.values()
    }

    pub fn len(&self) -> usize {
        self.grammars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grammars.is_empty()
    }

    /// All registration snippets, concatenated for the document's script
    pub fn script_payload(&self) -> String {
        self.grammars.values().map(registration_snippet).collect()
    }
}

/// Translate a descriptor into a guarded highlight.js registration call.
pub fn registration_snippet(descriptor: &GrammarDescriptor) -> String {
    let id = js_string(&descriptor.id());
    let mut fields = vec![format!("name: {}", js_string(&descriptor.name))];

    if !descriptor.aliases.is_empty() {
        let aliases: Vec<String> = descriptor.aliases.iter().map(|a| js_string(a)).collect();
        fields.push(format!("aliases: [{}]", aliases.join(", ")));
    }

    if let Some(keywords) = keywords_object(&descriptor.keywords) {
        fields.push(format!("keywords: {}", keywords));
    }

    let mut contains = Vec::new();
    if let Some(marker) = &descriptor.line_comment {
        contains.push(format!("hljs.COMMENT({}, '$')", js_string(&escape_js_regex(marker))));
    }
    if let Some((open, close)) = &descriptor.block_comment {
        contains.push(format!(
            "hljs.COMMENT({}, {})",
            js_string(&escape_js_regex(open)),
            js_string(&escape_js_regex(close))
        ));
    }
    for quote in &descriptor.strings {
        let delim = js_string(&escape_js_regex(quote));
        contains.push(format!(
            "{{ className: 'string', begin: {}, end: {}, contains: [hljs.BACKSLASH_ESCAPE] }}",
            delim, delim
        ));
    }
    if descriptor.numbers {
        contains.push("hljs.C_NUMBER_MODE".to_string());
    }
    // `className` rather than `scope`: highlight.js 10 only knows the former
    for pattern in &descriptor.patterns {
        let mut rule = format!(
            "{{ className: {}, begin: {}",
            js_string(&pattern.scope),
            js_string(&pattern.begin)
        );
        if let Some(end) = &pattern.end {
            rule.push_str(&format!(", end: {}", js_string(end)));
        }
        rule.push_str(" }");
        contains.push(rule);
    }
    fields.push(format!("contains: [\n        {}\n      ]", contains.join(",\n        ")));

    format!(
        ";(function () {{\n  if (typeof window === 'undefined' || !window.hljs || window.hljs.getLanguage({id})) return;\n  window.hljs.registerLanguage({id}, function (hljs) {{\n    return {{\n      {fields}\n    }};\n  }});\n}})();\n",
        id = id,
        fields = fields.join(",\n      ")
    )
}

fn keywords_object(keywords: &Keywords) -> Option<String> {
    let classes: BTreeMap<String, String> = match keywords {
        Keywords::List(words) if words.is_empty() => return None,
        Keywords::List(words) => BTreeMap::from([("keyword".to_string(), words.join(" "))]),
        Keywords::Classes(map) => map
            .iter()
            .filter(|(_, words)| !words.is_empty())
            .map(|(class, words)| (class.clone(), words.join(" ")))
            .collect(),
    };
    if classes.is_empty() {
        return None;
    }
    serde_json::to_string(&classes).ok()
}

/// JSON string literals are valid JavaScript string literals.
fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// Escape a literal delimiter so highlight.js can use it as a regex source.
fn escape_js_regex(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len() * 2);
    for c in literal.chars() {
        if matches!(
            c,
            '\\' | '^' | '$' | '.' | '|' | '?' | '*' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '/'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
