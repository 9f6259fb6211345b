//! Argument scanning for the render commands
//!
//! Options come in two spellings, `key=value` inside one token and
//! `-flag value` across two tokens. Whatever is not an option is kept, in
//! order, as the leftover text (usually the code itself).

/// Options parsed out of a command's free-text argument string
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderArgs {
    /// `lang=X` / `-l X`
    pub language: Option<String>,
    /// `theme=X` / `-t X`
    pub theme: Option<String>,
    /// `size=N` / `-s N`; left unset when N is not an integer
    pub font_size: Option<u32>,
    /// `line`/`-ln`/`--line` or `noline`/`-n`/`--no-line`, last one wins
    pub line_numbers: Option<bool>,
    /// Unrecognized tokens joined by single spaces
    pub remaining: String,
}

impl RenderArgs {
    /// Scan `input` left to right. Later options overwrite earlier ones.
    pub fn parse(input: &str) -> Self {
        let mut args = RenderArgs::default();
        let tokens: Vec<&str> = input.split_whitespace().collect();
        let mut remaining = Vec::new();

        let mut i = 0;
        while i < tokens.len() {
            let token = tokens[i];
            let next = tokens.get(i + 1).copied();

            if let Some(value) = token.strip_prefix("lang=") {
                args.language = Some(value.to_string());
            } else if let Some(value) = token.strip_prefix("theme=") {
                args.theme = Some(value.to_string());
            } else if let Some(value) = token.strip_prefix("size=") {
                if let Ok(size) = value.parse() {
                    args.font_size = Some(size);
                }
            } else if let (true, Some(value)) = (token == "-l", next) {
                args.language = Some(value.to_string());
                i += 1;
            } else if let (true, Some(value)) = (token == "-t", next) {
                args.theme = Some(value.to_string());
                i += 1;
            } else if let (true, Some(value)) = (token == "-s", next) {
                if let Ok(size) = value.parse() {
                    args.font_size = Some(size);
                }
                i += 1;
            } else if matches!(token, "noline" | "-n" | "--no-line") {
                args.line_numbers = Some(false);
            } else if matches!(token, "line" | "-ln" | "--line") {
                args.line_numbers = Some(true);
            } else {
                remaining.push(token);
            }

            i += 1;
        }

        args.remaining = remaining.join(" ");
        args
    }
}

/// Argument area of a command message: every non-blank line after the
/// first (which holds the command keyword), trimmed and joined by spaces.
pub fn argument_text(message: &str) -> String {
    message
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
