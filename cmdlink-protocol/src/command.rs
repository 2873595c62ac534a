use std::{collections::BTreeMap, fmt::Display, time::Duration};

use comfy_table::{Table, presets::ASCII_FULL_CONDENSED};
use regex::bytes::Regex;

use crate::{
    classify::{Classifier, Verdict},
    error::Error,
    template::{Arg, Template},
};

/// The command half of a command-response exchange.
///
/// A command is immutable once built and can be reused for any number of exchanges.
///
/// ```
/// use cmdlink_protocol::{Arg, Command};
/// use std::time::Duration;
///
/// let floor = Command::builder("go to floor", "FLOOR{:02}\r")
///     .timeout(Duration::from_secs(2))
///     .validate(r"^FLOOR[0-9]{2}\r$")
///     .success("ARRIVED")
///     .failure("FAULT")
///     .build()
///     .expect("patterns are valid");
///
/// assert_eq!(floor.render(&[Arg::from(5)]).unwrap(), b"FLOOR05\r");
/// assert!(floor.render(&[Arg::from(123)]).is_err());
/// ```
#[derive(Clone, Debug)]
pub struct Command {
    name: String,
    timeout: Duration,
    prototype: Template,
    validation: Option<Regex>,
    success: Option<Regex>,
    failure: Option<Regex>,
    description: Option<String>,
}

impl Command {
    /// Starts building a command with a human readable `name` and the `prototype`
    /// that is rendered with the arguments of each exchange.
    pub fn builder(name: impl Into<String>, prototype: impl Into<String>) -> CommandBuilder {
        CommandBuilder {
            name: name.into(),
            prototype: prototype.into(),
            timeout: CommandBuilder::DEFAULT_TIMEOUT,
            validation: None,
            success: None,
            failure: None,
            description: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Maximum duration of a whole exchange
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn prototype(&self) -> &Template {
        &self.prototype
    }

    pub fn validation(&self) -> Option<&Regex> {
        self.validation.as_ref()
    }

    pub fn success(&self) -> Option<&Regex> {
        self.success.as_ref()
    }

    pub fn failure(&self) -> Option<&Regex> {
        self.failure.as_ref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Renders the bytes that are sent down the line for the given arguments.
    ///
    /// Fails with [`Error::MalformedArguments`] when the arguments do not fit the prototype,
    /// and with [`Error::ValidationMismatch`] when the rendered command does not match
    /// the validation pattern. Without a validation pattern every rendering is accepted.
    pub fn render(&self, args: &[Arg]) -> Result<Vec<u8>, Error> {
        let rendered = self.prototype.render(args)?;
        if let Some(validation) = &self.validation {
            if !validation.is_match(rendered.as_bytes()) {
                return Err(Error::ValidationMismatch {
                    rendered,
                    pattern: validation.as_str().to_string(),
                });
            }
        }
        Ok(rendered.into_bytes())
    }
}

impl Classifier for Command {
    fn classify(&self, accumulated: &[u8]) -> Verdict {
        if self
            .failure
            .as_ref()
            .is_some_and(|failure| failure.is_match(accumulated))
        {
            Verdict::Failure
        } else if self
            .success
            .as_ref()
            .is_some_and(|success| success.is_match(accumulated))
        {
            Verdict::Success
        } else {
            Verdict::Insufficient
        }
    }
}

/// Makes ASCII line control characters visible.
fn sanitize(text: &str) -> String {
    text.replace('\r', "\\r").replace('\n', "\\n")
}

fn sanitize_pattern(pattern: Option<&Regex>) -> String {
    pattern.map_or_else(|| "-".to_string(), |p| sanitize(p.as_str()))
}

impl Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {:?} Prototype:{:?} CommandRegexp:{:?} Expect:{:?} Error:{:?}",
            self.name,
            self.timeout,
            sanitize(self.prototype.source()),
            sanitize_pattern(self.validation.as_ref()),
            sanitize_pattern(self.success.as_ref()),
            sanitize_pattern(self.failure.as_ref()),
        )
    }
}

/// Builder for [`Command`].
///
/// Patterns are compiled in [`CommandBuilder::build`].
#[derive(Clone, Debug)]
pub struct CommandBuilder {
    name: String,
    prototype: String,
    timeout: Duration,
    validation: Option<String>,
    success: Option<String>,
    failure: Option<String>,
    description: Option<String>,
}

impl CommandBuilder {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Pattern that every rendered command must match before it is sent.
    pub fn validate(mut self, pattern: impl Into<String>) -> Self {
        self.validation = Some(pattern.into());
        self
    }

    /// Pattern matching an affirmative response.
    pub fn success(mut self, pattern: impl Into<String>) -> Self {
        self.success = Some(pattern.into());
        self
    }

    /// Pattern matching a negative response.
    pub fn failure(mut self, pattern: impl Into<String>) -> Self {
        self.failure = Some(pattern.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn build(self) -> Result<Command, Error> {
        let compile = |pattern: Option<String>| pattern.as_deref().map(Regex::new).transpose();
        Ok(Command {
            prototype: Template::parse(&self.prototype)?,
            validation: compile(self.validation)?,
            success: compile(self.success)?,
            failure: compile(self.failure)?,
            name: self.name,
            timeout: self.timeout,
            description: self.description,
        })
    }
}

/// A set of commands keyed by name.
#[derive(Clone, Debug, Default)]
pub struct Commands {
    commands: BTreeMap<String, Command>,
}

impl Commands {
    pub fn new() -> Commands {
        Commands::default()
    }

    /// Inserts a command under its own name, returning the command it replaced.
    pub fn insert(&mut self, command: Command) -> Option<Command> {
        self.commands.insert(command.name.clone(), command)
    }

    /// Inserts a command under an explicit key.
    pub fn insert_as(&mut self, key: impl Into<String>, command: Command) -> Option<Command> {
        self.commands.insert(key.into(), command)
    }

    pub fn get(&self, key: &str) -> Option<&Command> {
        self.commands.get(key)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Command)> {
        self.commands.iter().map(|(key, cmd)| (key.as_str(), cmd))
    }

    /// True if every one of `keys` is present. An empty query is never contained.
    pub fn contains<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> bool {
        let mut any = false;
        for key in keys {
            any = true;
            if !self.commands.contains_key(key) {
                return false;
            }
        }
        any
    }

    /// Combines several sets into one. Later sets win on duplicate keys.
    pub fn merge(sets: impl IntoIterator<Item = Commands>) -> Commands {
        let mut merged = Commands::new();
        for set in sets {
            merged.commands.extend(set.commands);
        }
        merged
    }

    /// The keys as a JSON array of strings
    pub fn labels_json(&self) -> String {
        let labels: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        serde_json::to_string(&labels).unwrap_or_else(|_| "[]".to_string())
    }
}

impl FromIterator<Command> for Commands {
    fn from_iter<T: IntoIterator<Item = Command>>(iter: T) -> Self {
        let mut commands = Commands::new();
        for command in iter {
            commands.insert(command);
        }
        commands
    }
}

impl Display for Commands {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut table = Table::new();
        table.load_preset(ASCII_FULL_CONDENSED).set_header([
            "Name",
            "Timeout",
            "Prototype",
            "Command Regex",
            "Resp Regex",
            "Error Regex",
        ]);
        for (key, cmd) in self.iter() {
            table.add_row([
                key.to_string(),
                format!("{:?}", cmd.timeout),
                sanitize(cmd.prototype.source()),
                sanitize_pattern(cmd.validation.as_ref()),
                sanitize_pattern(cmd.success.as_ref()),
                sanitize_pattern(cmd.failure.as_ref()),
            ]);
        }
        write!(f, "{}", table)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::ErrorKind;

    fn ping() -> Command {
        Command::builder("ping #2", "{:02}\r")
            .timeout(Duration::from_millis(500))
            .validate("[0-9]{2}\r")
            .build()
            .unwrap()
    }

    #[test]
    fn render_without_arguments() {
        let cmd = Command::builder("ping", "\r")
            .validate("\r")
            .build()
            .unwrap();
        assert_eq!(cmd.render(&[]).unwrap(), b"\r");
    }

    #[test]
    fn render_argument_count() {
        let cmd = ping();
        assert_eq!(
            cmd.render(&[]).unwrap_err().kind(),
            ErrorKind::MalformedArguments
        );
        assert_eq!(cmd.render(&[13.into()]).unwrap(), b"13\r");
        assert_eq!(
            cmd.render(&[13.into(), 5.into()]).unwrap_err().kind(),
            ErrorKind::MalformedArguments
        );
    }

    #[test]
    fn render_validation_mismatch() {
        let cmd = Command::builder("ping #3", "{:02x}\r")
            .validate("[0-9]{2}\r")
            .build()
            .unwrap();
        assert_eq!(
            cmd.render(&[255.into()]).unwrap_err().kind(),
            ErrorKind::ValidationMismatch
        );
        match cmd.render(&[15.into()]) {
            Err(Error::ValidationMismatch { rendered, .. }) => assert_eq!(rendered, "0f\r"),
            other => panic!("expected ValidationMismatch, got {:?}", other),
        }
    }

    #[test]
    fn without_validation_only_malformed_arguments_fail() {
        let cmd = Command::builder("free", "{:x}").build().unwrap();
        for args in [vec![], vec![Arg::from(1)], vec![Arg::from("s")], vec![1.into(), 2.into()]] {
            if let Err(err) = cmd.render(&args) {
                assert_eq!(err.kind(), ErrorKind::MalformedArguments);
            }
        }
    }

    #[test]
    fn invalid_patterns_fail_to_build() {
        let err = Command::builder("bad", "x").success("(").build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCommand);
        let err = Command::builder("bad", "{").build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCommand);
    }

    #[test]
    fn classify_checks_failure_first() {
        let cmd = Command::builder("both", "x")
            .success("Rxd>3")
            .failure("Rxd")
            .build()
            .unwrap();
        assert_eq!(cmd.classify(b"Rx"), Verdict::Insufficient);
        assert_eq!(cmd.classify(b"Rxd>3"), Verdict::Failure);

        let only_success = Command::builder("ok", "x").success("^OK").build().unwrap();
        assert_eq!(only_success.classify(b"OK\r\n"), Verdict::Success);
        assert_eq!(only_success.classify(b"ERR"), Verdict::Insufficient);

        let neither = Command::builder("none", "x").build().unwrap();
        assert_eq!(neither.classify(b"anything"), Verdict::Insufficient);
    }

    #[test]
    fn display() {
        let cmd = Command::builder("p", "p\r")
            .timeout(Duration::from_secs(1))
            .validate("")
            .failure("")
            .build()
            .unwrap();
        assert_eq!(
            cmd.to_string(),
            r#"p: 1s Prototype:"p\\r" CommandRegexp:"" Expect:"-" Error:"""#
        );
    }

    #[test]
    fn commands_contains() {
        let commands: Commands = [
            Command::builder("test", "t").build().unwrap(),
            Command::builder("ping", "p").build().unwrap(),
        ]
        .into_iter()
        .collect();
        assert!(commands.contains(["test"]));
        assert!(commands.contains(["test", "ping"]));
        assert!(!commands.contains(["test", "pong"]));
        assert!(!commands.contains(Vec::<&str>::new()));
        assert!(!Commands::new().contains(["test"]));
    }

    #[test]
    fn commands_merge_and_labels() {
        let a: Commands = [Command::builder("a", "a").build().unwrap()]
            .into_iter()
            .collect();
        let mut b = Commands::new();
        b.insert_as("b", Command::builder("bee", "b").build().unwrap());
        let merged = Commands::merge([a.clone(), b]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.get("b").unwrap().name(), "bee");
        assert_eq!(merged.labels_json(), r#"["a","b"]"#);
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn commands_table() {
        let commands: Commands = [Command::builder("p", "p\r")
            .success("OK")
            .build()
            .unwrap()]
        .into_iter()
        .collect();
        let table = commands.to_string();
        let header = table.lines().find(|line| line.contains("Name")).unwrap();
        for column in ["Timeout", "Prototype", "Command Regex", "Resp Regex", "Error Regex"] {
            assert!(header.contains(column), "{}", table);
        }
        let row = table.lines().find(|line| line.contains("| p ")).unwrap();
        assert!(row.contains("p\\r"), "{}", table);
        assert!(row.contains("| OK "), "{}", table);
        assert!(row.contains("| - "), "{}", table);
    }
}
