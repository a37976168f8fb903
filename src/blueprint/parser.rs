//! Line-oriented blueprint parser.
//!
//! ```text
//! # comment
//! include common.bp
//! install curl git on: [linux]
//! clone https://example.com/r.git to: ~/r branch: main id: r
//! mkdir ~/r/build permissions: 755 after: r
//! uninstall mkdir ~/old
//! ```
//!
//! Every directive is one line: an action word, positional arguments and
//! `key: value` options. Lists are written `[a, b]` or `a,b`.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use super::{Action, Origin, Params, Rule};
use crate::config::{expand_home, home_dir};
use crate::error::ParseError;
use crate::platform::normalize_os_name;

/// Options accepted on every action.
const COMMON_OPTIONS: &[&str] = &["id", "after", "on", "group"];

/// Kind-specific options.
const fn kind_options(kind: Action) -> &'static [&'static str] {
    match kind {
        Action::Clone => &["to", "branch"],
        Action::Mkdir => &["permissions"],
        Action::Decrypt => &["to", "password-id"],
        Action::KnownHosts => &["key-type"],
        Action::GpgKey => &["keyring", "deb-url"],
        Action::Install
        | Action::Asdf
        | Action::Homebrew
        | Action::Ollama
        | Action::Uninstall => &[],
    }
}

fn is_known_option(key: &str) -> bool {
    COMMON_OPTIONS.contains(&key)
        || Action::KINDS
            .into_iter()
            .any(|k| kind_options(k).contains(&key))
}

/// Parse a blueprint file and everything it includes.
///
/// Includes are resolved relative to the including file. A file that is
/// already on the include stack is an [`ParseError::IncludeCycle`]; a file
/// reached twice along different branches is parsed once.
///
/// # Errors
///
/// Returns the first [`ParseError`] encountered.
pub fn parse_file(path: &Path) -> Result<Vec<Rule>, ParseError> {
    let mut parser = Parser::default();
    parser.parse_path(path)?;
    Ok(parser.rules)
}

/// Parse blueprint text as if it were the contents of `file`.
///
/// `include` directives are resolved relative to `file`'s directory.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use blueprint_cli::blueprint::{Action, parser::parse_str};
///
/// let rules = parse_str("mkdir ~/code on: [macos]\n", Path::new("/tmp/setup.bp")).unwrap();
/// assert_eq!(rules[0].action, Action::Mkdir);
/// assert_eq!(rules[0].params.mkdir.as_deref(), Some("~/code"));
/// assert_eq!(rules[0].os_list, ["mac"]);
/// ```
///
/// # Errors
///
/// Returns the first [`ParseError`] encountered.
pub fn parse_str(content: &str, file: &Path) -> Result<Vec<Rule>, ParseError> {
    let mut parser = Parser::default();
    let key = canonical(file);
    parser.stack.push(key.clone());
    parser.visited.insert(key);
    parser.parse_content(content, file)?;
    Ok(parser.rules)
}

#[derive(Debug, Default)]
struct Parser {
    /// Files currently being parsed, outermost first.
    stack: Vec<PathBuf>,
    visited: HashSet<PathBuf>,
    rules: Vec<Rule>,
}

impl Parser {
    fn parse_path(&mut self, path: &Path) -> Result<(), ParseError> {
        let key = canonical(path);
        if self.stack.contains(&key) {
            let mut chain: Vec<String> = self.stack.iter().map(|p| p.display().to_string()).collect();
            chain.push(key.display().to_string());
            return Err(ParseError::IncludeCycle { chain });
        }
        if !self.visited.insert(key.clone()) {
            return Ok(());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        self.stack.push(key);
        let result = self.parse_content(&content, path);
        self.stack.pop();
        result
    }

    fn parse_content(&mut self, content: &str, file: &Path) -> Result<(), ParseError> {
        for (idx, raw) in content.lines().enumerate() {
            let tokens = tokenize(raw);
            let Some((head, rest)) = tokens.split_first() else {
                continue;
            };
            let line = Line {
                file,
                number: idx + 1,
                action: head,
            };

            if head == "include" {
                let target = match rest {
                    [one] => one,
                    [] => return Err(line.missing("a file path")),
                    [_, extra, ..] => return Err(line.unexpected(extra)),
                };
                let target = expand_home(Path::new(target), &home_dir());
                let target = if target.is_absolute() {
                    target
                } else {
                    file.parent().unwrap_or_else(|| Path::new(".")).join(target)
                };
                self.parse_path(&target)?;
                continue;
            }

            let rule = parse_directive(&line, rest)?;
            self.rules.push(rule);
        }
        Ok(())
    }
}

/// Context of the directive being parsed, for error reporting.
struct Line<'a> {
    file: &'a Path,
    number: usize,
    action: &'a str,
}

impl Line<'_> {
    fn file(&self) -> String {
        self.file.display().to_string()
    }

    fn missing(&self, what: &str) -> ParseError {
        ParseError::MissingArgument {
            file: self.file(),
            line: self.number,
            action: self.action.to_string(),
            what: what.to_string(),
        }
    }

    fn invalid(&self, option: &str) -> ParseError {
        ParseError::InvalidOption {
            file: self.file(),
            line: self.number,
            action: self.action.to_string(),
            option: option.to_string(),
        }
    }

    fn unexpected(&self, argument: &str) -> ParseError {
        ParseError::UnexpectedArgument {
            file: self.file(),
            line: self.number,
            action: self.action.to_string(),
            argument: argument.to_string(),
        }
    }
}

fn parse_directive(line: &Line<'_>, tokens: &[String]) -> Result<Rule, ParseError> {
    let action: Action = line.action.parse().map_err(|_| ParseError::UnknownAction {
        file: line.file(),
        line: line.number,
        action: line.action.to_string(),
    })?;

    let (mut positionals, mut options) = split_arguments(line, tokens)?;

    let kind = if action == Action::Uninstall {
        match positionals.first().map(|w| w.parse::<Action>()) {
            Some(Ok(kind)) if kind != Action::Uninstall => {
                positionals.remove(0);
                kind
            }
            _ => Action::Install,
        }
    } else {
        action
    };

    if let Some(key) = options
        .keys()
        .find(|k| !COMMON_OPTIONS.contains(&k.as_str()) && !kind_options(kind).contains(&k.as_str()))
    {
        return Err(line.invalid(key));
    }

    let params = build_params(line, kind, positionals, &mut options)?;

    Ok(Rule {
        action,
        params,
        id: options.remove("id"),
        after: options.remove("after").map(|v| parse_list(&v)).unwrap_or_default(),
        os_list: options
            .remove("on")
            .map(|v| parse_list(&v).iter().map(|o| normalize_os_name(o)).collect())
            .unwrap_or_default(),
        group: options.remove("group"),
        origin: Some(Origin {
            file: line.file.to_path_buf(),
            line: line.number,
        }),
    })
}

/// Separate positional arguments from `key: value` options.
fn split_arguments(
    line: &Line<'_>,
    tokens: &[String],
) -> Result<(Vec<String>, BTreeMap<String, String>), ParseError> {
    let mut positionals = Vec::new();
    let mut options = BTreeMap::new();
    let mut iter = tokens.iter();

    while let Some(token) = iter.next() {
        if let Some(key) = token.strip_suffix(':').filter(|k| !k.is_empty()) {
            let value = iter
                .next()
                .ok_or_else(|| line.missing(&format!("a value for '{key}:'")))?;
            options.insert(key.to_string(), value.clone());
        } else if let Some((key, value)) = token.split_once(':')
            && is_known_option(key)
            && !value.is_empty()
        {
            options.insert(key.to_string(), value.to_string());
        } else {
            positionals.push(token.clone());
        }
    }
    Ok((positionals, options))
}

fn build_params(
    line: &Line<'_>,
    kind: Action,
    positionals: Vec<String>,
    options: &mut BTreeMap<String, String>,
) -> Result<Params, ParseError> {
    let mut p = Params::default();
    match kind {
        Action::Install => p.packages = at_least_one(line, positionals, "one or more package names")?,
        Action::Homebrew => p.formulas = at_least_one(line, positionals, "one or more formulas")?,
        Action::Ollama => p.models = at_least_one(line, positionals, "one or more model names")?,
        Action::Asdf => {
            let entries = at_least_one(line, positionals, "one or more plugin@version entries")?;
            if let Some(bad) = entries.iter().find(|e| {
                e.split_once('@')
                    .is_none_or(|(plugin, version)| plugin.is_empty() || version.is_empty())
            }) {
                return Err(line.missing(&format!("a version in '{bad}' (plugin@version)")));
            }
            p.asdf_packages = entries;
        }
        Action::Clone => {
            p.clone_url = Some(exactly_one(line, positionals, "a repository URL")?);
            p.clone_path = Some(required(line, options, "to")?);
            p.branch = options.remove("branch");
        }
        Action::Mkdir => {
            p.mkdir = Some(exactly_one(line, positionals, "a directory path")?);
            p.permissions = options.remove("permissions");
        }
        Action::Decrypt => {
            p.decrypt_file = Some(exactly_one(line, positionals, "an encrypted file")?);
            p.decrypt_path = Some(required(line, options, "to")?);
            p.password_id = Some(
                options
                    .remove("password-id")
                    .unwrap_or_else(|| "default".to_string()),
            );
        }
        Action::KnownHosts => {
            p.known_host = Some(exactly_one(line, positionals, "a host name")?);
            p.key_type = options.remove("key-type");
        }
        Action::GpgKey => {
            p.gpg_url = Some(exactly_one(line, positionals, "a key URL")?);
            p.gpg_keyring = Some(required(line, options, "keyring")?);
            p.deb_url = options.remove("deb-url");
        }
        Action::Uninstall => return Err(line.missing("a resource to remove")),
    }
    Ok(p)
}

fn at_least_one(line: &Line<'_>, values: Vec<String>, what: &str) -> Result<Vec<String>, ParseError> {
    if values.is_empty() {
        return Err(line.missing(what));
    }
    Ok(values)
}

fn exactly_one(line: &Line<'_>, values: Vec<String>, what: &str) -> Result<String, ParseError> {
    let mut iter = values.into_iter();
    let first = iter.next().ok_or_else(|| line.missing(what))?;
    if let Some(extra) = iter.next() {
        return Err(line.unexpected(&extra));
    }
    Ok(first)
}

fn required(
    line: &Line<'_>,
    options: &mut BTreeMap<String, String>,
    key: &str,
) -> Result<String, ParseError> {
    options
        .remove(key)
        .ok_or_else(|| line.missing(&format!("a '{key}:' option")))
}

/// Split a list written as `[a, b]`, `a,b` or a single value.
fn parse_list(value: &str) -> Vec<String> {
    let inner = value
        .trim()
        .strip_prefix('[')
        .map_or(value, |v| v.strip_suffix(']').unwrap_or(v));
    inner
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(|s| s.trim().trim_matches('"'))
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Split a line into tokens.
///
/// Whitespace separates tokens; `"…"` quotes a token containing spaces;
/// `[…]` is kept together with its contents; `#` at the start of a token
/// begins a comment.
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let Some(&first) = chars.peek() else {
            break;
        };
        if first == '#' {
            break;
        }

        let mut token = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                break;
            }
            chars.next();
            match c {
                '"' => {
                    for inner in chars.by_ref() {
                        if inner == '"' {
                            break;
                        }
                        token.push(inner);
                    }
                }
                '[' => {
                    token.push('[');
                    for inner in chars.by_ref() {
                        token.push(inner);
                        if inner == ']' {
                            break;
                        }
                    }
                }
                _ => token.push(c),
            }
        }
        tokens.push(token);
    }
    tokens
}

/// Identity of a file on the include stack.
fn canonical(path: &Path) -> PathBuf {
    dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
