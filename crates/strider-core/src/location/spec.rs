//! Location expression syntax.

use std::fmt;

use crate::error::{Result, StriderError};
use crate::types::Function;

/// A parsed location expression
///
/// Forms, in the order the parser tries them:
///
/// | Syntax                 | Variant                                   |
/// |------------------------|-------------------------------------------|
/// | `+N`, `-N`             | [`Offset`](LocationSpec::Offset)          |
/// | `/regex/`              | [`Regex`](LocationSpec::Regex)            |
/// | `*expr`                | [`AddressExpr`](LocationSpec::AddressExpr)|
/// | `N`                    | [`Line`](LocationSpec::Line)              |
/// | `base`, `base:N`       | [`Normal`](LocationSpec::Normal)          |
///
/// `base` is a file path or a function spec; the resolver decides which.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationSpec
{
    /// Address literal or expression evaluated in the current scope.
    AddressExpr(String),
    /// Every function whose name matches.
    Regex(String),
    /// Line in the current file.
    Line(u32),
    /// Lines relative to the current line.
    Offset(i64),
    /// File or function, with an optional line.
    Normal
    {
        /// Text before the `:`.
        base: String,
        /// `base` read as a function name, when it can be one.
        func: Option<FuncSpec>,
        /// Line after the `:`.
        line: Option<u32>,
    },
}

impl LocationSpec
{
    /// Parse a location expression.
    ///
    /// ```rust
    /// use strider_core::location::LocationSpec;
    ///
    /// assert_eq!(LocationSpec::parse("+3").unwrap(), LocationSpec::Offset(3));
    /// assert_eq!(LocationSpec::parse("*0x4010").unwrap(), LocationSpec::AddressExpr("0x4010".into()));
    /// assert!(matches!(LocationSpec::parse("main.go:12").unwrap(), LocationSpec::Normal { line: Some(12), .. }));
    /// assert!(LocationSpec::parse("main.go:-1").is_err());
    /// ```
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` for an empty expression, a bad offset, an
    /// unterminated regex or a line that is negative or not a number.
    pub fn parse(expr: &str) -> Result<Self>
    {
        let malformed = |reason: &str| {
            StriderError::InvalidArgument(format!("malformed breakpoint location \"{expr}\": {reason}"))
        };

        let Some(first) = expr.chars().next() else {
            return Err(malformed("empty string"));
        };

        match first {
            '+' | '-' => {
                let offset = expr.parse::<i64>().map_err(|err| malformed(&err.to_string()))?;
                Ok(LocationSpec::Offset(offset))
            }
            '/' if expr.len() >= 2 && expr.ends_with('/') && !expr.ends_with("\\/") => {
                Ok(LocationSpec::Regex(expr[1..expr.len() - 1].replace("\\/", "/")))
            }
            '*' => {
                let addr = expr[1..].trim();
                if addr.is_empty() {
                    return Err(malformed("missing address expression"));
                }
                Ok(LocationSpec::AddressExpr(addr.to_string()))
            }
            _ => Self::parse_normal(expr, malformed),
        }
    }

    fn parse_normal<F>(expr: &str, malformed: F) -> Result<Self>
    where
        F: Fn(&str) -> StriderError,
    {
        // Only the last ':' separates the line; paths may contain others.
        let (base, line) = match expr.rsplit_once(':') {
            Some((base, line)) => (base, Some(line)),
            None => (expr, None),
        };

        if line.is_none() {
            if let Some(n) = parse_int_literal(base) {
                let n = u32::try_from(n).map_err(|_| malformed("line number out of range"))?;
                return Ok(LocationSpec::Line(n));
            }
        }

        let line = match line {
            Some(text) => Some(
                text.parse::<u32>()
                    .map_err(|_| malformed("line offset negative or not a number"))?,
            ),
            None => None,
        };

        Ok(LocationSpec::Normal {
            base: base.to_string(),
            func: FuncSpec::parse(base),
            line,
        })
    }
}

impl fmt::Display for LocationSpec
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            LocationSpec::AddressExpr(expr) => write!(f, "*{expr}"),
            LocationSpec::Regex(re) => write!(f, "/{re}/"),
            LocationSpec::Line(line) => write!(f, "{line}"),
            LocationSpec::Offset(offset) => write!(f, "{offset:+}"),
            LocationSpec::Normal { base, line: Some(line), .. } => write!(f, "{base}:{line}"),
            LocationSpec::Normal { base, line: None, .. } => write!(f, "{base}"),
        }
    }
}

/// A function name split into the parts a user may have typed
///
/// `A.f` is ambiguous between package `A` and receiver `A`, so it lands in
/// `package_or_receiver`. A receiver written as `(*T)` is stored as `T`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FuncSpec
{
    /// Package path, when given.
    pub package: Option<String>,
    /// The package path started with `/` and must match exactly.
    pub absolute_package: bool,
    /// Receiver type, when given.
    pub receiver: Option<String>,
    /// Two-part spec prefix: package or receiver.
    pub package_or_receiver: Option<String>,
    /// Unqualified function name.
    pub base: String,
}

impl FuncSpec
{
    /// Split a function spec, or `None` when `text` cannot name a function.
    ///
    /// ```rust
    /// use strider_core::location::FuncSpec;
    ///
    /// let spec = FuncSpec::parse("io/ioutil.ReadFile").unwrap();
    /// assert_eq!(spec.package.as_deref(), Some("io/ioutil"));
    /// assert_eq!(spec.base, "ReadFile");
    ///
    /// let spec = FuncSpec::parse("(*File).Close").unwrap();
    /// assert_eq!(spec.receiver.as_deref(), Some("File"));
    /// ```
    pub fn parse(text: &str) -> Option<Self>
    {
        let parts: Vec<String> = match text.rfind('/') {
            None => text.split('.').map(str::to_string).collect(),
            Some(path_end) => {
                let mut parts: Vec<String> = text[path_end..].split('.').map(str::to_string).collect();
                parts[0] = format!("{}{}", &text[..path_end], parts[0]);
                parts
            }
        };

        let mut spec = FuncSpec::default();
        match parts.as_slice() {
            [base] => spec.base.clone_from(base),
            [prefix, base] => {
                spec.base.clone_from(base);
                let stripped = strip_receiver_decoration(prefix);
                if stripped != prefix {
                    spec.receiver = Some(stripped.to_string());
                } else if prefix.contains('/') {
                    spec.package = Some(prefix.clone());
                } else {
                    spec.package_or_receiver = Some(prefix.clone());
                }
            }
            [package, receiver, base] => {
                spec.base.clone_from(base);
                spec.receiver = Some(strip_receiver_decoration(receiver).to_string());
                spec.package = Some(package.clone());
            }
            _ => return None,
        }

        if let Some(package) = spec.package.as_mut() {
            if let Some(stripped) = package.strip_prefix('/') {
                *package = stripped.to_string();
                spec.absolute_package = true;
            }
        }

        if spec.base.is_empty() || spec.base.contains('/') || spec.receiver.as_deref().is_some_and(|r| r.contains('/'))
        {
            return None;
        }
        Some(spec)
    }

    /// Whether `function` is named by this spec.
    pub fn matches(&self, function: &Function) -> bool
    {
        if self.base != function.base_name() {
            return false;
        }
        let receiver = strip_receiver_decoration(function.receiver_name());
        if self.receiver.as_deref().is_some_and(|r| r != receiver) {
            return false;
        }
        if let Some(package) = &self.package {
            let matched = if self.absolute_package {
                package == function.package_name()
            } else {
                partial_path_match(package, function.package_name())
            };
            if !matched {
                return false;
            }
        }
        if let Some(prefix) = &self.package_or_receiver {
            if !partial_path_match(prefix, function.package_name()) && prefix != receiver {
                return false;
            }
        }
        true
    }
}

/// `(*T)` becomes `T`; anything else is returned unchanged.
pub fn strip_receiver_decoration(receiver: &str) -> &str
{
    receiver
        .strip_prefix("(*")
        .and_then(|r| r.strip_suffix(')'))
        .filter(|r| !r.is_empty())
        .unwrap_or(receiver)
}

/// Whole-component suffix match: `expr` equals `path` or `path` ends in `/expr`.
///
/// ```rust
/// use strider_core::location::partial_path_match;
///
/// assert!(partial_path_match("sprog.go", "/src/sprog.go"));
/// assert!(!partial_path_match("sprog.go", "/src/locationsprog.go"));
/// ```
pub fn partial_path_match(expr: &str, path: &str) -> bool
{
    if expr.len() < path.len() {
        path.ends_with(expr) && path.as_bytes()[path.len() - expr.len() - 1] == b'/'
    } else {
        expr == path
    }
}

/// Parse `123`, `0x7b`, `0o173` or `0b1111011`.
pub fn parse_int_literal(text: &str) -> Option<u64>
{
    let text = text.trim();
    let (digits, radix) = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        (hex, 16)
    } else if let Some(oct) = text.strip_prefix("0o").or_else(|| text.strip_prefix("0O")) {
        (oct, 8)
    } else if let Some(bin) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
        (bin, 2)
    } else {
        (text, 10)
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    u64::from_str_radix(digits, radix).ok()
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::types::Address;

    fn func(name: &str) -> Function
    {
        Function::new(name, Address::from(0x1000), Address::from(0x1100))
    }

    #[test]
    fn test_parse_line_forms()
    {
        assert_eq!(LocationSpec::parse("42").unwrap(), LocationSpec::Line(42));
        assert_eq!(LocationSpec::parse("0x10").unwrap(), LocationSpec::Line(16));
        assert_eq!(LocationSpec::parse("-2").unwrap(), LocationSpec::Offset(-2));
        assert!(LocationSpec::parse("+x").is_err());
        assert!(LocationSpec::parse("").is_err());
    }

    #[test]
    fn test_parse_regex()
    {
        assert_eq!(LocationSpec::parse("/^main\\./").unwrap(), LocationSpec::Regex("^main\\.".into()));
        assert_eq!(LocationSpec::parse("/a\\/b/").unwrap(), LocationSpec::Regex("a/b".into()));
    }

    #[test]
    fn test_absolute_path_is_not_regex()
    {
        let LocationSpec::Normal { base, line, .. } = LocationSpec::parse("/src/main.go:7").unwrap() else {
            panic!("absolute path parsed as a non-file location");
        };
        assert_eq!(base, "/src/main.go");
        assert_eq!(line, Some(7));
    }

    #[test]
    fn test_windows_path_keeps_drive_colon()
    {
        let LocationSpec::Normal { base, line, .. } = LocationSpec::parse("C:/src/main.go:7").unwrap() else {
            panic!("expected a normal spec");
        };
        assert_eq!(base, "C:/src/main.go");
        assert_eq!(line, Some(7));
    }

    #[test]
    fn test_func_spec_forms()
    {
        let spec = FuncSpec::parse("main.foo").unwrap();
        assert_eq!(spec.package_or_receiver.as_deref(), Some("main"));
        assert_eq!(spec.base, "foo");

        let spec = FuncSpec::parse("main.(*T).foo").unwrap();
        assert_eq!(spec.package.as_deref(), Some("main"));
        assert_eq!(spec.receiver.as_deref(), Some("T"));

        let spec = FuncSpec::parse("/github.com/x/pkg.Run").unwrap();
        assert!(spec.absolute_package);
        assert_eq!(spec.package.as_deref(), Some("github.com/x/pkg"));

        assert!(FuncSpec::parse("a.b.c.d").is_none());
    }

    #[test]
    fn test_func_spec_matching()
    {
        let method = func("main.(*SomeType).String");
        assert!(FuncSpec::parse("SomeType.String").unwrap().matches(&method));
        assert!(FuncSpec::parse("(*SomeType).String").unwrap().matches(&method));
        assert!(FuncSpec::parse("main.SomeType.String").unwrap().matches(&method));
        assert!(!FuncSpec::parse("OtherType.String").unwrap().matches(&method));

        let pkg_func = func("io/ioutil.ReadFile");
        assert!(FuncSpec::parse("ioutil.ReadFile").unwrap().matches(&pkg_func));
        assert!(FuncSpec::parse("io/ioutil.ReadFile").unwrap().matches(&pkg_func));
        assert!(!FuncSpec::parse("/ioutil.ReadFile").unwrap().matches(&pkg_func));
    }

    #[test]
    fn test_int_literals()
    {
        assert_eq!(parse_int_literal("0b101"), Some(5));
        assert_eq!(parse_int_literal("0o17"), Some(15));
        assert_eq!(parse_int_literal("0xff"), Some(255));
        assert_eq!(parse_int_literal("12a"), None);
    }
}
