//! Language resolution
//!
//! Best effort by design of the pipeline: a wrong or missing answer only
//! means highlight.js auto-detects the language from the content.

use crate::grammar::GrammarRegistry;
use crate::{Error, Result};
use log::{debug, info, warn};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// A known language: id plus the extensions and aliases that map to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageEntry {
    pub id: String,
    pub display_name: Option<String>,
    pub extensions: Vec<String>,
    pub aliases: Vec<String>,
}

/// On-disk shape of one entry in `languages.json`
#[derive(Debug, Deserialize)]
struct LanguageRecord {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    extensions: Vec<String>,
    #[serde(default)]
    aliases: Vec<String>,
}

/// Extension → highlight.js id, consulted after the registry
static EXTENSIONS: &[(&str, &str)] = &[
    ("py", "python"),
    ("pyw", "python"),
    ("pyi", "python"),
    ("js", "javascript"),
    ("mjs", "javascript"),
    ("cjs", "javascript"),
    ("jsx", "javascript"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("mts", "typescript"),
    ("java", "java"),
    ("kt", "kotlin"),
    ("kts", "kotlin"),
    ("scala", "scala"),
    ("groovy", "groovy"),
    ("c", "c"),
    ("h", "c"),
    ("cpp", "cpp"),
    ("cc", "cpp"),
    ("cxx", "cpp"),
    ("hpp", "cpp"),
    ("hh", "cpp"),
    ("cs", "csharp"),
    ("go", "go"),
    ("rs", "rust"),
    ("swift", "swift"),
    ("m", "objectivec"),
    ("mm", "objectivec"),
    ("rb", "ruby"),
    ("php", "php"),
    ("pl", "perl"),
    ("pm", "perl"),
    ("lua", "lua"),
    ("r", "r"),
    ("dart", "dart"),
    ("ex", "elixir"),
    ("exs", "elixir"),
    ("erl", "erlang"),
    ("hs", "haskell"),
    ("ml", "ocaml"),
    ("fs", "fsharp"),
    ("clj", "clojure"),
    ("lisp", "lisp"),
    ("scm", "scheme"),
    ("zig", "zig"),
    ("nim", "nim"),
    ("jl", "julia"),
    ("vb", "vbnet"),
    ("asm", "x86asm"),
    ("s", "armasm"),
    ("sh", "bash"),
    ("bash", "bash"),
    ("zsh", "bash"),
    ("fish", "shell"),
    ("ps1", "powershell"),
    ("bat", "dos"),
    ("cmd", "dos"),
    ("html", "xml"),
    ("htm", "xml"),
    ("xml", "xml"),
    ("svg", "xml"),
    ("vue", "xml"),
    ("css", "css"),
    ("scss", "scss"),
    ("sass", "scss"),
    ("less", "less"),
    ("json", "json"),
    ("jsonc", "json"),
    ("yaml", "yaml"),
    ("yml", "yaml"),
    ("toml", "ini"),
    ("ini", "ini"),
    ("cfg", "ini"),
    ("conf", "ini"),
    ("properties", "properties"),
    ("md", "markdown"),
    ("markdown", "markdown"),
    ("tex", "latex"),
    ("sql", "sql"),
    ("graphql", "graphql"),
    ("gql", "graphql"),
    ("proto", "protobuf"),
    ("dockerfile", "dockerfile"),
    ("mk", "makefile"),
    ("cmake", "cmake"),
    ("gradle", "gradle"),
    ("diff", "diff"),
    ("patch", "diff"),
    ("wasm", "wasm"),
    ("sol", "solidity"),
    ("txt", "plaintext"),
    ("log", "plaintext"),
];

/// Well-known file names → highlight.js id, checked before extensions
static FILENAMES: &[(&str, &str)] = &[
    ("makefile", "makefile"),
    ("gnumakefile", "makefile"),
    ("dockerfile", "dockerfile"),
    ("cmakelists.txt", "cmake"),
    ("gemfile", "ruby"),
    ("rakefile", "ruby"),
    ("vagrantfile", "ruby"),
    (".bashrc", "bash"),
    (".zshrc", "bash"),
    (".gitignore", "plaintext"),
];

/// Languages keyed by id, loaded once at startup
#[derive(Debug, Clone, Default)]
pub struct LanguageRegistry {
    entries: BTreeMap<String, LanguageEntry>,
}

impl LanguageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from the languages file, the optional custom
    /// languages file and the grammar descriptors, in that order. Later
    /// sources replace earlier entries with the same id. Missing files are
    /// fine; unreadable ones are logged and skipped.
    pub fn load(languages_file: &Path, custom_languages_file: &Path, grammars: &GrammarRegistry) -> Self {
        let mut registry = Self::new();

        match read_language_file(languages_file) {
            Ok(Some(entries)) => registry.extend(entries),
            Ok(None) => debug!("No languages file at {}", languages_file.display()),
            Err(e) => warn!("{}", e),
        }

        match read_language_file(custom_languages_file) {
            Ok(Some(entries)) => {
                info!("Loaded {} custom languages", entries.len());
                registry.extend(entries);
            }
            Ok(None) => {}
            Err(e) => warn!("{}", e),
        }

        registry.extend(grammars.iter().map(|g| g.to_language_entry()));
        registry
    }

    pub fn insert(&mut self, entry: LanguageEntry) {
        self.entries.insert(entry.id.clone(), entry);
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = LanguageEntry>) {
        for entry in entries {
            self.insert(entry);
        }
    }

    pub fn get(&self, id: &str) -> Option<&LanguageEntry> {
        self.entries.get(id)
    }

    /// Entries sorted by id
    pub fn entries(&self) -> impl Iterator<Item = &LanguageEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.entries
            .get(id)
            .and_then(|e| e.display_name.as_deref())
            .unwrap_or(id)
    }

    /// Resolve a language id from an explicit hint and/or a file name.
    ///
    /// A hint always produces an answer: a registry id, the id an alias
    /// points to, or the normalized hint itself. Without a usable hint the
    /// file name is tried against registry extensions, then the built-in
    /// tables. `None` leaves detection to the highlighter.
    pub fn resolve(&self, hint: Option<&str>, filename: Option<&str>) -> Option<String> {
        if let Some(hint) = hint.map(|h| h.trim().to_lowercase()).filter(|h| !h.is_empty()) {
            if self.entries.contains_key(&hint) {
                return Some(hint);
            }
            if let Some(entry) = self
                .entries
                .values()
                .find(|e| e.aliases.iter().any(|a| a.eq_ignore_ascii_case(&hint)))
            {
                return Some(entry.id.clone());
            }
            return Some(hint);
        }

        let filename = filename.map(str::trim).filter(|f| !f.is_empty())?;
        self.resolve_filename(filename)
    }

    fn resolve_filename(&self, filename: &str) -> Option<String> {
        let base = Path::new(filename)
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_else(|| filename.to_lowercase());

        let ext = Path::new(&base)
            .extension()
            .map(|e| e.to_string_lossy().to_string());

        if let Some(ext) = ext.as_deref() {
            let user = self.entries.values().find(|e| {
                e.extensions
                    .iter()
                    .any(|x| x.trim_start_matches('.').eq_ignore_ascii_case(ext))
            });
            if let Some(entry) = user {
                return Some(entry.id.clone());
            }
        }

        if let Some((_, id)) = FILENAMES.iter().find(|(name, _)| *name == base) {
            return Some(id.to_string());
        }

        let ext = ext?;
        EXTENSIONS
            .iter()
            .find(|(x, _)| *x == ext)
            .map(|(_, id)| id.to_string())
    }
}

/// `Ok(None)` when the file does not exist.
fn read_language_file(path: &Path) -> Result<Option<Vec<LanguageEntry>>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(Error::LanguageError(format!("cannot read {}: {}", path.display(), e)));
        }
    };
    parse_language_map(&text)
        .map(Some)
        .map_err(|e| Error::LanguageError(format!("{}: {}", path.display(), e)))
}

/// Parse a JSON object of id → record; `_`-prefixed keys are comments.
fn parse_language_map(text: &str) -> Result<Vec<LanguageEntry>> {
    let raw: HashMap<String, serde_json::Value> =
        serde_json::from_str(text).map_err(|e| Error::LanguageError(e.to_string()))?;

    let mut entries = Vec::with_capacity(raw.len());
    for (id, value) in raw {
        if id.starts_with('_') {
            continue;
        }
        match serde_json::from_value::<LanguageRecord>(value) {
            Ok(record) => entries.push(LanguageEntry {
                id: id.trim().to_lowercase(),
                display_name: record.display_name,
                extensions: record.extensions,
                aliases: record.aliases,
            }),
            Err(e) => warn!("Skipping language '{}': {}", id, e),
        }
    }
    Ok(entries)
}
