//! Positional templates used as command prototypes.
//!
//! The syntax is a small subset of Rust's own formatting syntax:
//!
//! - `{}` takes the next positional argument, `{1}` names argument `1`
//! - `{:[0][width][.precision][type]}` formats the argument, where type is one of
//!   `x`, `X`, `o`, `b` (integers only), `?` (debug) or empty (display)
//! - `{{` and `}}` are literal braces
use std::fmt::{Display, Write as _};

use crate::error::Error;

/// A single argument rendered into a [`Template`].
#[derive(Clone, Debug, PartialEq)]
pub enum Arg {
    Int(i64),
    Uint(u64),
    Float(f64),
    Str(String),
    Char(char),
}

impl Arg {
    fn type_name(&self) -> &'static str {
        match self {
            Arg::Int(_) => "signed integer",
            Arg::Uint(_) => "unsigned integer",
            Arg::Float(_) => "float",
            Arg::Str(_) => "string",
            Arg::Char(_) => "char",
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self, Arg::Int(_) | Arg::Uint(_) | Arg::Float(_))
    }
}

macro_rules! impl_from_arg {
    ($variant:ident, $target:ty: $($source:ty),+) => {
        $(
            impl From<$source> for Arg {
                fn from(value: $source) -> Self {
                    Arg::$variant(value as $target)
                }
            }
        )+
    };
}

impl_from_arg!(Int, i64: i8, i16, i32, i64, isize);
impl_from_arg!(Uint, u64: u8, u16, u32, u64, usize);
impl_from_arg!(Float, f64: f32, f64);

impl From<char> for Arg {
    fn from(value: char) -> Self {
        Arg::Char(value)
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Str(value.to_string())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Str(value)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Radix {
    Display,
    LowerHex,
    UpperHex,
    Octal,
    Binary,
    Debug,
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct Placeholder {
    index: usize,
    zero: bool,
    width: usize,
    precision: Option<usize>,
    radix: Radix,
    /// The placeholder as written, used for best-effort output on failure.
    source: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum Segment {
    Literal(String),
    Placeholder(Placeholder),
}

/// A parsed prototype.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
    arity: usize,
}

impl Template {
    pub fn parse(source: &str) -> Result<Template, Error> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut next_index = 0;
        let mut arity = 0;
        let mut chars = source.char_indices().peekable();

        while let Some((start, c)) = chars.next() {
            match c {
                '{' if chars.peek().map(|(_, c)| *c) == Some('{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek().map(|(_, c)| *c) == Some('}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => {
                    return Err(Error::InvalidPrototype(format!(
                        "unmatched '}}' at offset {}",
                        start
                    )));
                }
                '{' => {
                    let mut body = String::new();
                    let mut closed = false;
                    for (_, c) in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        body.push(c);
                    }
                    if !closed {
                        return Err(Error::InvalidPrototype(format!(
                            "unterminated placeholder at offset {}",
                            start
                        )));
                    }
                    let placeholder = parse_placeholder(&body, &mut next_index)?;
                    arity = arity.max(placeholder.index + 1);
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(placeholder));
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Template {
            source: source.to_string(),
            segments,
            arity,
        })
    }

    /// The prototype as written
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Number of arguments the template consumes
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Renders the template.
    ///
    /// On failure the error carries the best-effort rendering, where every
    /// placeholder that could not be filled is left as written.
    pub fn render(&self, args: &[Arg]) -> Result<String, Error> {
        let mut out = String::with_capacity(self.source.len());
        let mut problems = Vec::new();
        let mut used = vec![false; args.len()];

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(placeholder) => match args.get(placeholder.index) {
                    None => {
                        problems.push(format!("missing argument {}", placeholder.index));
                        out.push_str(&placeholder.source);
                    }
                    Some(arg) => {
                        used[placeholder.index] = true;
                        if let Err(reason) = format_arg(&mut out, placeholder, arg) {
                            problems.push(reason);
                            out.push_str(&placeholder.source);
                        }
                    }
                },
            }
        }

        let unused = used.iter().filter(|used| !**used).count();
        if unused > 0 {
            problems.push(format!("{} unused argument(s)", unused));
        }

        if problems.is_empty() {
            Ok(out)
        } else {
            Err(Error::MalformedArguments {
                rendered: out,
                reason: problems.join(", "),
            })
        }
    }
}

impl Display for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

/// Largest index, width or precision accepted by `std::fmt`.
const MAX_FIELD: usize = u16::MAX as usize;

fn parse_placeholder(body: &str, next_index: &mut usize) -> Result<Placeholder, Error> {
    let invalid = |reason: &str| Error::InvalidPrototype(format!("{{{}}}: {}", body, reason));
    let (position, spec) = body.split_once(':').unwrap_or((body, ""));

    let index = if position.is_empty() {
        let index = *next_index;
        *next_index += 1;
        index
    } else {
        position
            .parse::<usize>()
            .map_err(|_| invalid("argument index must be a number"))?
    };
    if index > MAX_FIELD {
        return Err(invalid("argument index is too large"));
    }

    let mut rest = spec;
    let radix = match rest.chars().last() {
        Some('x') => Radix::LowerHex,
        Some('X') => Radix::UpperHex,
        Some('o') => Radix::Octal,
        Some('b') => Radix::Binary,
        Some('?') => Radix::Debug,
        _ => Radix::Display,
    };
    if radix != Radix::Display {
        rest = &rest[..rest.len() - 1];
    }

    let (width_part, precision) = match rest.split_once('.') {
        Some((width, precision)) => (
            width,
            Some(
                precision
                    .parse::<usize>()
                    .map_err(|_| invalid("precision must be a number"))?,
            ),
        ),
        None => (rest, None),
    };

    let zero = width_part.starts_with('0') && width_part.len() > 1;
    let width_digits = if zero { &width_part[1..] } else { width_part };
    let width = if width_digits.is_empty() {
        0
    } else {
        width_digits
            .parse::<usize>()
            .map_err(|_| invalid("width must be a number"))?
    };

    if width > MAX_FIELD || precision.is_some_and(|p| p > MAX_FIELD) {
        return Err(invalid("width and precision may not exceed 65535"));
    }

    Ok(Placeholder {
        index,
        zero,
        width,
        precision,
        radix,
        source: format!("{{{}}}", body),
    })
}

fn format_arg(out: &mut String, placeholder: &Placeholder, arg: &Arg) -> Result<(), String> {
    let mismatch = |what: &str| {
        format!(
            "argument {} is a {} and cannot be formatted with {}",
            placeholder.index,
            arg.type_name(),
            what
        )
    };
    if placeholder.zero && !arg.is_numeric() {
        return Err(mismatch("zero padding"));
    }
    if placeholder.precision.is_some() && !matches!(arg, Arg::Float(_)) {
        return Err(mismatch("a precision"));
    }

    let w = placeholder.width;
    let result = match (placeholder.radix, arg) {
        (Radix::Display, Arg::Int(v)) if placeholder.zero => write!(out, "{:0w$}", v),
        (Radix::Display, Arg::Int(v)) => write!(out, "{:w$}", v),
        (Radix::Display, Arg::Uint(v)) if placeholder.zero => write!(out, "{:0w$}", v),
        (Radix::Display, Arg::Uint(v)) => write!(out, "{:w$}", v),
        (Radix::Display, Arg::Float(v)) => match (placeholder.zero, placeholder.precision) {
            (true, Some(p)) => write!(out, "{:0w$.p$}", v),
            (false, Some(p)) => write!(out, "{:w$.p$}", v),
            (true, None) => write!(out, "{:0w$}", v),
            (false, None) => write!(out, "{:w$}", v),
        },
        (Radix::Display, Arg::Str(v)) => write!(out, "{:w$}", v),
        (Radix::Display, Arg::Char(v)) => write!(out, "{:w$}", v),
        (Radix::Debug, Arg::Int(v)) => write!(out, "{:w$?}", v),
        (Radix::Debug, Arg::Uint(v)) => write!(out, "{:w$?}", v),
        (Radix::Debug, Arg::Float(v)) => write!(out, "{:w$?}", v),
        (Radix::Debug, Arg::Str(v)) => write!(out, "{:w$?}", v),
        (Radix::Debug, Arg::Char(v)) => write!(out, "{:w$?}", v),
        (radix, Arg::Int(v)) => pad_radix(out, placeholder.zero, w, radix, *v as u64),
        (radix, Arg::Uint(v)) => pad_radix(out, placeholder.zero, w, radix, *v),
        (_, _) => return Err(mismatch("an integer radix")),
    };
    result.map_err(|e| e.to_string())
}

fn pad_radix(out: &mut String, zero: bool, w: usize, radix: Radix, v: u64) -> std::fmt::Result {
    match (radix, zero) {
        (Radix::LowerHex, true) => write!(out, "{:0w$x}", v),
        (Radix::LowerHex, false) => write!(out, "{:w$x}", v),
        (Radix::UpperHex, true) => write!(out, "{:0w$X}", v),
        (Radix::UpperHex, false) => write!(out, "{:w$X}", v),
        (Radix::Octal, true) => write!(out, "{:0w$o}", v),
        (Radix::Octal, false) => write!(out, "{:w$o}", v),
        (Radix::Binary, true) => write!(out, "{:0w$b}", v),
        (_, _) => write!(out, "{:w$b}", v),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::ErrorKind;

    fn render(source: &str, args: &[Arg]) -> Result<String, Error> {
        Template::parse(source).unwrap().render(args)
    }

    #[test]
    fn literal_only() {
        assert_eq!(render("\r", &[]).unwrap(), "\r");
        assert_eq!(Template::parse("ping\r").unwrap().arity(), 0);
    }

    #[test]
    fn positional_arguments() {
        let args = [Arg::from("MOVE"), Arg::from(12u8)];
        assert_eq!(render("{} {}\r\n", &args).unwrap(), "MOVE 12\r\n");
        assert_eq!(render("{1}:{0}", &args).unwrap(), "12:MOVE");
    }

    #[test]
    fn zero_padded_numbers() {
        assert_eq!(render("{:02}\r", &[13.into()]).unwrap(), "13\r");
        assert_eq!(render("{:04}", &[7.into()]).unwrap(), "0007");
        assert_eq!(render("{:04}", &[(-7).into()]).unwrap(), "-007");
        assert_eq!(render("{:3}", &[5u32.into()]).unwrap(), "  5");
    }

    #[test]
    fn radix_formatting() {
        assert_eq!(render("{:02x}", &[255u8.into()]).unwrap(), "ff");
        assert_eq!(render("{:04X}", &[0xabu16.into()]).unwrap(), "00AB");
        assert_eq!(render("{:o}", &[8u8.into()]).unwrap(), "10");
        assert_eq!(render("{:08b}", &[5u8.into()]).unwrap(), "00000101");
    }

    #[test]
    fn float_precision() {
        assert_eq!(render("{:.2}", &[1.5f64.into()]).unwrap(), "1.50");
        assert_eq!(render("{:06.2}", &[3.14159f64.into()]).unwrap(), "003.14");
    }

    #[test]
    fn debug_quotes_strings() {
        assert_eq!(render("{:?}", &["a\"b".into()]).unwrap(), "\"a\\\"b\"");
    }

    #[test]
    fn escaped_braces() {
        assert_eq!(render("{{{}}}", &[1.into()]).unwrap(), "{1}");
    }

    #[test]
    fn missing_argument_is_malformed() {
        let err = render("{:02}\r", &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedArguments);
        match err {
            Error::MalformedArguments { rendered, .. } => assert_eq!(rendered, "{:02}\r"),
            other => panic!("expected MalformedArguments, got {:?}", other),
        }
    }

    #[test]
    fn extra_argument_is_malformed() {
        let err = render("{:02}\r", &[13.into(), 5.into()]).unwrap_err();
        match err {
            Error::MalformedArguments { rendered, reason } => {
                assert_eq!(rendered, "13\r");
                assert!(reason.contains("unused"));
            }
            other => panic!("expected MalformedArguments, got {:?}", other),
        }
    }

    #[test]
    fn wrong_type_is_malformed() {
        let err = render("{:x}", &["text".into()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedArguments);
        let err = render("{:05}", &["text".into()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedArguments);
        let err = render("{:.3}", &[3.into()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedArguments);
    }

    #[test]
    fn largest_width_renders() {
        let rendered = render("{:65535}", &[1.into()]).unwrap();
        assert_eq!(rendered.len(), 65535);
        assert!(rendered.ends_with(" 1"));
    }

    #[test]
    fn unbalanced_braces_are_rejected() {
        for source in [
            "{",
            "abc}",
            "{0",
            "{x}",
            "{:q.}",
            "{18446744073709551615}",
            "{65536}",
            "{:70000}",
            "{:.70000}",
        ] {
            match Template::parse(source) {
                Err(Error::InvalidPrototype(_)) => {}
                other => panic!("expected InvalidPrototype for {:?}, got {:?}", source, other),
            }
        }
    }
}
