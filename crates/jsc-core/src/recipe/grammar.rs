//! Recipe grammar.
//!
//! A recipe is a line-oriented script. Each statement starts with a command
//! keyword at the beginning of a line:
//!
//! ```text
//! name <string>
//! package <word>...
//! gd [--pkey=<v>] [--branch=<v>] [--depth=<n>] <repo> <path>
//! run <rest of line>
//! install <path> <path>
//! append <path> <string>
//! put <path> <string>
//! replace [--count=<n>] <path> <string> <string>
//! insert <path> <string> <string>
//! rinsert <path> <string> <string>
//! ```
//!
//! A `<string>` is single or double quoted (backslash escapes, may span
//! lines) or one unquoted token. A `<path>` is one token where `\ ` is a
//! literal space and `\n` a literal newline. `#` starts a comment wherever a
//! new token could start. The whole document must parse; there is no
//! partial result.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Recipe command keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Name,
    Package,
    Gd,
    Run,
    Install,
    Append,
    Put,
    Replace,
    Insert,
    Rinsert,
}

impl Command {
    pub const ALL: [Command; 10] = [
        Command::Name,
        Command::Package,
        Command::Gd,
        Command::Run,
        Command::Install,
        Command::Append,
        Command::Put,
        Command::Replace,
        Command::Insert,
        Command::Rinsert,
    ];

    pub fn keyword(self) -> &'static str {
        match self {
            Command::Name => "name",
            Command::Package => "package",
            Command::Gd => "gd",
            Command::Run => "run",
            Command::Install => "install",
            Command::Append => "append",
            Command::Put => "put",
            Command::Replace => "replace",
            Command::Insert => "insert",
            Command::Rinsert => "rinsert",
        }
    }

    pub fn from_keyword(word: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.keyword() == word)
    }

    /// Remote method executing this command.
    pub fn method(self) -> String {
        format!("rc_{}", self.keyword())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Value of a `--name[=value]` option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Flag(bool),
    Value(String),
}

impl OptionValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Value(v) => Some(v),
            OptionValue::Flag(_) => None,
        }
    }
}

/// One parsed recipe statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// 1-based line of the command keyword.
    pub line: usize,
    pub command: Command,
    pub args: Vec<String>,
    pub options: BTreeMap<String, OptionValue>,
}

/// A recipe that does not parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}, column {column}: {message}")]
pub struct GrammarError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

const GD_OPTIONS: [&str; 3] = ["pkey", "branch", "depth"];
const REPLACE_OPTIONS: [&str; 1] = ["count"];

/// Parse a whole recipe document.
pub fn parse(text: &str) -> Result<Vec<Statement>, GrammarError> {
    Parser::new(text).document()
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Parser {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> GrammarError {
        GrammarError {
            line: self.line,
            column: self.column,
            message: message.into(),
        }
    }

    /// Skip spaces and tabs; true if anything was skipped.
    fn skip_blanks(&mut self) -> bool {
        let start = self.pos;
        while matches!(self.peek(), Some(' ' | '\t' | '\r')) {
            self.bump();
        }
        self.pos > start
    }

    fn skip_comment(&mut self) {
        if self.peek() == Some('#') {
            while !matches!(self.peek(), None | Some('\n')) {
                self.bump();
            }
        }
    }

    fn at_line_end(&self) -> bool {
        matches!(self.peek(), None | Some('\n' | '#'))
    }

    fn document(mut self) -> Result<Vec<Statement>, GrammarError> {
        let mut statements = Vec::new();
        loop {
            self.skip_blanks();
            self.skip_comment();
            match self.peek() {
                None => return Ok(statements),
                Some('\n') => {
                    self.bump();
                }
                Some(_) => statements.push(self.statement()?),
            }
        }
    }

    fn statement(&mut self) -> Result<Statement, GrammarError> {
        let (line, column) = (self.line, self.column);
        let word = self.bare_token();
        let command = Command::from_keyword(&word).ok_or_else(|| GrammarError {
            line,
            column,
            message: format!("unknown command `{word}`"),
        })?;

        let mut stmt = Statement {
            line,
            command,
            args: Vec::new(),
            options: BTreeMap::new(),
        };

        match command {
            Command::Name => {
                self.expect_arg("recipe name")?;
                stmt.args.push(self.string()?);
            }
            Command::Package => {
                while self.skip_blanks() && !self.at_line_end() {
                    stmt.args.push(self.bare_token());
                }
                if stmt.args.is_empty() {
                    return Err(self.error("package needs at least one package name"));
                }
            }
            Command::Gd => {
                self.options(&mut stmt, &GD_OPTIONS, "repository")?;
                stmt.args.push(self.bare_token());
                self.expect_arg("checkout path")?;
                stmt.args.push(self.path());
            }
            Command::Run => {
                if !self.skip_blanks() || self.at_line_end() {
                    return Err(self.error("run needs a command line"));
                }
                let mut rest = String::new();
                while !matches!(self.peek(), None | Some('\n')) {
                    rest.extend(self.bump());
                }
                stmt.args.push(rest.trim_end_matches('\r').to_string());
            }
            Command::Install => {
                self.expect_arg("source path")?;
                stmt.args.push(self.path());
                self.expect_arg("destination path")?;
                stmt.args.push(self.path());
            }
            Command::Append | Command::Put => {
                self.expect_arg("file path")?;
                stmt.args.push(self.path());
                self.expect_arg("content")?;
                stmt.args.push(self.string()?);
            }
            Command::Replace => {
                self.options(&mut stmt, &REPLACE_OPTIONS, "file path")?;
                stmt.args.push(self.path());
                self.expect_arg("search text")?;
                stmt.args.push(self.string()?);
                self.expect_arg("replacement")?;
                stmt.args.push(self.string()?);
            }
            Command::Insert | Command::Rinsert => {
                self.expect_arg("file path")?;
                stmt.args.push(self.path());
                self.expect_arg("needle")?;
                stmt.args.push(self.string()?);
                self.expect_arg("insertion")?;
                stmt.args.push(self.string()?);
            }
        }

        self.end_of_statement(command)?;
        Ok(stmt)
    }

    /// Leading `--name[=value]` options; leaves the cursor on the first
    /// operand, named `operand` in errors.
    fn options(
        &mut self,
        stmt: &mut Statement,
        allowed: &[&str],
        operand: &str,
    ) -> Result<(), GrammarError> {
        loop {
            self.expect_arg(operand)?;
            if self.peek() != Some('-') {
                return Ok(());
            }
            if self.peek_nth(1) != Some('-') {
                return Err(self.error(format!("{operand} may not start with '-'")));
            }
            let start = self.error("");
            self.bump();
            self.bump();
            let mut name = String::new();
            while let Some(c) = self.peek().filter(|c| c.is_alphanumeric() || *c == '_') {
                name.push(c);
                self.bump();
            }
            if !allowed.contains(&name.as_str()) {
                return Err(GrammarError {
                    message: format!("unknown {} option `--{name}`", stmt.command),
                    ..start
                });
            }
            if stmt.options.contains_key(&name) {
                return Err(GrammarError {
                    message: format!("option `--{name}` given twice"),
                    ..start
                });
            }
            let value = match self.peek() {
                Some('=') => {
                    self.bump();
                    OptionValue::Value(self.option_value(&name)?)
                }
                Some(' ' | '\t' | '\r') => {
                    self.skip_blanks();
                    if self.at_line_end() {
                        OptionValue::Flag(true)
                    } else {
                        OptionValue::Value(self.option_value(&name)?)
                    }
                }
                None | Some('\n') => OptionValue::Flag(true),
                Some(c) => {
                    return Err(self.error(format!("unexpected `{c}` in option `--{name}`")));
                }
            };
            stmt.options.insert(name, value);
        }
    }

    fn option_value(&mut self, name: &str) -> Result<String, GrammarError> {
        match self.peek() {
            Some('\'' | '"') => self.quoted(false),
            Some(' ' | '\t' | '\r' | '\n') | None => {
                Err(self.error(format!("option `--{name}` needs a value")))
            }
            Some(_) => Ok(self.bare_token()),
        }
    }

    /// Require at least one blank followed by a token on the same line.
    fn expect_arg(&mut self, what: &str) -> Result<(), GrammarError> {
        if !self.skip_blanks() {
            return match self.peek() {
                None | Some('\n') => Err(self.error(format!("missing {what}"))),
                Some(c) => Err(self.error(format!("expected whitespace before {what}, found `{c}`"))),
            };
        }
        if self.at_line_end() {
            return Err(self.error(format!("missing {what}")));
        }
        Ok(())
    }

    fn end_of_statement(&mut self, command: Command) -> Result<(), GrammarError> {
        let after_blank = self.skip_blanks()
            || matches!(
                self.pos.checked_sub(1).and_then(|p| self.chars.get(p)),
                Some(' ' | '\t' | '\r')
            );
        if after_blank {
            self.skip_comment();
        }
        match self.peek() {
            None => Ok(()),
            Some('\n') => {
                self.bump();
                Ok(())
            }
            Some(c) => Err(self.error(format!("unexpected `{c}` after {command} statement"))),
        }
    }

    /// Characters up to the next blank or line end.
    fn bare_token(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if matches!(c, ' ' | '\t' | '\r' | '\n') {
                break;
            }
            out.push(c);
            self.bump();
        }
        out
    }

    fn string(&mut self) -> Result<String, GrammarError> {
        match self.peek() {
            Some('\'' | '"') => self.quoted(true),
            _ => Ok(self.bare_token()),
        }
    }

    fn quoted(&mut self, multi_line: bool) -> Result<String, GrammarError> {
        let start = self.error("unterminated string");
        let Some(quote) = self.bump() else {
            return Err(start);
        };
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(start),
                Some('\\') => match self.bump() {
                    None => return Err(start),
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some(c) => out.push(c),
                },
                Some('\n') if !multi_line => return Err(start),
                Some(c) if c == quote => return Ok(out),
                Some(c) => out.push(c),
            }
        }
    }

    fn path(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' | '\r' | '\n' => break,
                '\\' => match self.peek_nth(1) {
                    Some(' ') => {
                        self.bump();
                        self.bump();
                        out.push(' ');
                    }
                    Some('n') => {
                        self.bump();
                        self.bump();
                        out.push('\n');
                    }
                    _ => {
                        self.bump();
                        out.push('\\');
                    }
                },
                _ => {
                    self.bump();
                    out.push(c);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn single(text: &str) -> Statement {
        let mut stmts = parse(text).unwrap_or_else(|e| panic!("{text:?}: {e}"));
        assert_eq!(stmts.len(), 1, "{text:?}");
        stmts.remove(0)
    }

    fn args(text: &str) -> (Command, Vec<String>) {
        let stmt = single(text);
        (stmt.command, stmt.args)
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_name() {
        assert_eq!(
            args("name recipename"),
            (Command::Name, strings(&["recipename"]))
        );
        assert_eq!(
            args("name \"recipe name\""),
            (Command::Name, strings(&["recipe name"]))
        );
    }

    #[test]
    fn test_run_keeps_rest_of_line() {
        assert_eq!(
            args("run ls -lah ./dir/path"),
            (Command::Run, strings(&["ls -lah ./dir/path"]))
        );
        assert_eq!(
            args("run echo \"echo\""),
            (Command::Run, strings(&["echo \"echo\""]))
        );
    }

    #[test]
    fn test_put_variants() {
        assert_eq!(
            args("put /file \"content with spaces in quotes\""),
            (
                Command::Put,
                strings(&["/file", "content with spaces in quotes"])
            )
        );
        assert_eq!(
            args("put /file content"),
            (Command::Put, strings(&["/file", "content"]))
        );
        assert_eq!(
            args("put /file unquoted_trailing_lonely_\""),
            (Command::Put, strings(&["/file", "unquoted_trailing_lonely_\""]))
        );
        assert_eq!(
            args(r#"put /file "escaped\"""#),
            (Command::Put, strings(&["/file", "escaped\""]))
        );
        assert_eq!(
            args("put /file 'single quoted'"),
            (Command::Put, strings(&["/file", "single quoted"]))
        );
    }

    #[test]
    fn test_replace_variants() {
        for path in ["/full/file/path", "relative_file", "relative_file/path"] {
            let text = format!(r#"replace {path} "escaped\"" "replace string""#);
            assert_eq!(
                args(&text),
                (
                    Command::Replace,
                    strings(&[path, "escaped\"", "replace string"])
                )
            );
        }
    }

    #[test]
    fn test_multi_line_string() {
        assert_eq!(
            args("replace relative_file/path \"escaped\\\"\" \"replace \nstring with newline\""),
            (
                Command::Replace,
                strings(&[
                    "relative_file/path",
                    "escaped\"",
                    "replace \nstring with newline"
                ])
            )
        );
    }

    #[test]
    fn test_quoted_escapes() {
        assert_eq!(
            args(r#"append f "a\tb\nc\\d\qe""#),
            (Command::Append, strings(&["f", "a\tb\nc\\dqe"]))
        );
    }

    #[test]
    fn test_gd_with_options() {
        let stmt = single(
            r"gd --depth=asdf --pkey=pkey --branch=name git@github.com/jumpstarter-io/jsc path/tocheck\ out/ya/\nyah",
        );
        assert_eq!(stmt.command, Command::Gd);
        assert_eq!(
            stmt.args,
            strings(&[
                "git@github.com/jumpstarter-io/jsc",
                "path/tocheck out/ya/\nyah"
            ])
        );
        assert_eq!(stmt.options["depth"].as_str(), Some("asdf"));
        assert_eq!(stmt.options["pkey"].as_str(), Some("pkey"));
        assert_eq!(stmt.options["branch"].as_str(), Some("name"));
    }

    #[test]
    fn test_gd_plain_and_space_separated_option() {
        let stmt = single("gd git@github.com/jumpstarter-io/jsc path");
        assert!(stmt.options.is_empty());
        assert_eq!(
            stmt.args,
            strings(&["git@github.com/jumpstarter-io/jsc", "path"])
        );

        let stmt = single("gd --branch stable https://example.com/r.git /srv/r");
        assert_eq!(stmt.options["branch"].as_str(), Some("stable"));
        assert_eq!(stmt.args, strings(&["https://example.com/r.git", "/srv/r"]));
    }

    #[test]
    fn test_gd_rejects_unknown_and_short_options() {
        assert!(parse("gd -depth path").is_err());
        assert!(parse("gd --force repo path").is_err());
        assert!(parse("gd --depth=1 --depth=2 repo path").is_err());
    }

    #[test]
    fn test_replace_count_option() {
        let stmt = single("replace --count=1 /etc/app.conf PORT 8080");
        assert_eq!(stmt.command, Command::Replace);
        assert_eq!(stmt.options["count"].as_str(), Some("1"));
        assert_eq!(stmt.args, strings(&["/etc/app.conf", "PORT", "8080"]));

        assert!(single("replace f a b").options.is_empty());
        let err = parse("replace --depth=1 f a b").unwrap_err();
        assert_eq!(err.message, "unknown replace option `--depth`");
        assert!(parse("gd --count=1 repo path").is_err());
    }

    #[test]
    fn test_install_with_escaped_newline_and_comment() {
        assert_eq!(
            args(r"install source/dir_\nwith_escnewline dst # with comment end"),
            (
                Command::Install,
                strings(&["source/dir_\nwith_escnewline", "dst"])
            )
        );
        assert_eq!(
            args("install src dst"),
            (Command::Install, strings(&["src", "dst"]))
        );
    }

    #[test]
    fn test_package_words() {
        assert_eq!(
            args("package nginx php-fpm  mariadb"),
            (Command::Package, strings(&["nginx", "php-fpm", "mariadb"]))
        );
    }

    #[test]
    fn test_insert_and_rinsert() {
        assert_eq!(
            args("insert conf \"[main]\" \"\nkey=1\""),
            (Command::Insert, strings(&["conf", "[main]", "\nkey=1"]))
        );
        assert_eq!(args("rinsert conf a b").0, Command::Rinsert);
    }

    #[test]
    fn test_document_order_blank_lines_and_comments() {
        let text = "# leading comment\n\nname demo\n   \npackage nginx # web server\n\n\t# indented comment\nput /app/code/index.html 'hello'\n";
        let stmts = parse(text).unwrap();
        let commands: Vec<Command> = stmts.iter().map(|s| s.command).collect();
        assert_eq!(
            commands,
            vec![Command::Name, Command::Package, Command::Put]
        );
        let lines: Vec<usize> = stmts.iter().map(|s| s.line).collect();
        assert_eq!(lines, vec![3, 5, 8]);
        assert_eq!(stmts[1].args, strings(&["nginx"]));
    }

    #[test]
    fn test_line_numbers_count_multi_line_strings() {
        let text = "put a \"one\ntwo\"\nname x\n";
        let stmts = parse(text).unwrap();
        assert_eq!(stmts[1].line, 3);
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(parse("").unwrap(), Vec::new());
        assert_eq!(parse("\n# nothing\n\n").unwrap(), Vec::new());
    }

    #[test]
    fn test_invalid_statements_fail_the_document() {
        for bad in [
            "install src",
            "run",
            "append \"sdfasdf\nasdfsdf\"",
            "nonexisting \"foo\" foobar",
            "gd -depth path",
            "put /file \"unterminated",
            "name",
            "package",
            "replace f only-two",
        ] {
            assert!(parse(bad).is_err(), "{bad:?} should not parse");
        }

        let doc = "name ok\ninstall src\nname never";
        assert!(parse(doc).is_err());
    }

    #[test]
    fn test_error_position() {
        let err = parse("name ok\n\nput /file \"open").unwrap_err();
        assert_eq!(err.line, 3);
        assert_eq!(err.column, 11);
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn test_trailing_garbage_after_quoted_string() {
        let err = parse("name \"a\"b").unwrap_err();
        assert!(err.message.contains("unexpected"));
    }

    #[test]
    fn test_method_names() {
        assert_eq!(Command::Rinsert.method(), "rc_rinsert");
        for cmd in Command::ALL {
            assert_eq!(Command::from_keyword(cmd.keyword()), Some(cmd));
        }
    }
}
