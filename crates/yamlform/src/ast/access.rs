//! property access and interpolation grammar
//!
//! ```text
//! ${name.field["quoted \"key\""][0]}
//! ```
//!
//! The root accessor is a name or a quoted subscript. `$$` escapes a literal `$`.
use super::expr::Interpolation;
use std::fmt;

const NAME_DELIMITERS: &[char] = &['.', '[', '}'];

#[derive(Debug, Clone, PartialEq)]
pub enum Accessor {
    /// `.name` (or the bare root name)
    Name(String),
    /// `["key"]`
    Key(String),
    /// `[0]`
    Index(i64),
}

impl Accessor {
    /// Name or key, `None` for list indices
    pub fn as_key(&self) -> Option<&str> {
        match self {
            Accessor::Name(name) | Accessor::Key(name) => Some(name),
            Accessor::Index(_) => None,
        }
    }
}

/// Non-empty chain of accessors
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyAccess {
    pub accessors: Vec<Accessor>,
}

impl PropertyAccess {
    /// Parse an access without the surrounding `${` `}`
    pub fn parse(source: &str) -> Result<Self, String> {
        let (access, _) = parse_access(source, false)?;
        Ok(access)
    }

    pub fn root_name(&self) -> &str {
        self.accessors
            .first()
            .and_then(Accessor::as_key)
            .unwrap_or_default()
    }

    /// Accessors after the root
    pub fn rest(&self) -> &[Accessor] {
        self.accessors.get(1..).unwrap_or_default()
    }
}

impl fmt::Display for PropertyAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, accessor) in self.accessors.iter().enumerate() {
            match accessor {
                Accessor::Name(name) if index == 0 => f.write_str(name)?,
                Accessor::Name(name) => write!(f, ".{name}")?,
                Accessor::Key(key) => write!(f, "[{key:?}]")?,
                Accessor::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

/// Result of reading a YAML string scalar
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedString {
    Literal(String),
    Symbol(PropertyAccess),
    Interpolate(Vec<Interpolation>),
}

pub fn parse_string(source: &str) -> Result<ParsedString, String> {
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut rest = source;

    while let Some(c) = rest.chars().next() {
        if let Some(after) = rest.strip_prefix("$$") {
            text.push('$');
            rest = after;
        } else if let Some(after) = rest.strip_prefix("${") {
            let (access, after) = parse_access(after, true)?;
            parts.push(Interpolation {
                text: std::mem::take(&mut text),
                value: Some(access),
            });
            rest = after;
        } else {
            text.push(c);
            rest = &rest[c.len_utf8()..];
        }
    }

    if !text.is_empty() {
        parts.push(Interpolation { text, value: None });
    }

    Ok(match parts.as_slice() {
        [] => ParsedString::Literal(String::new()),
        [Interpolation { text, value: None }] => ParsedString::Literal(text.clone()),
        [Interpolation {
            text,
            value: Some(access),
        }] if text.is_empty() => ParsedString::Symbol(access.clone()),
        _ => ParsedString::Interpolate(parts),
    })
}

/// Parses accessors up to (and consuming) `}` or the end of input
fn parse_access(mut input: &str, interpolated: bool) -> Result<(PropertyAccess, &str), String> {
    let mut accessors = Vec::new();

    loop {
        let Some(c) = input.chars().next() else {
            if interpolated {
                return Err("unterminated interpolation".to_string());
            }
            break;
        };

        match c {
            '}' => {
                input = &input[1..];
                break;
            }
            '.' => {
                let rest = &input[1..];
                let end = rest.find(NAME_DELIMITERS).unwrap_or(rest.len());
                accessors.push(Accessor::Name(rest[..end].to_string()));
                input = &rest[end..];
            }
            '[' => {
                let rest = &input[1..];
                if let Some(quoted) = rest.strip_prefix('"') {
                    let (key, after) = parse_quoted(quoted)?;
                    input = after
                        .strip_prefix(']')
                        .ok_or("missing closing bracket in property access")?;
                    accessors.push(Accessor::Key(key));
                } else {
                    let end = rest.find(']').ok_or("missing closing bracket in list index")?;
                    let index = rest[..end]
                        .trim()
                        .parse::<i64>()
                        .map_err(|_| "invalid list index")?;
                    if accessors.is_empty() {
                        return Err("the root property must be a string subscript or a name".into());
                    }
                    accessors.push(Accessor::Index(index));
                    input = &rest[end + 1..];
                }
            }
            _ => {
                let end = input.find(NAME_DELIMITERS).unwrap_or(input.len());
                accessors.push(Accessor::Name(input[..end].to_string()));
                input = &input[end..];
            }
        }
    }

    if accessors.is_empty() {
        return Err("Property access expressions cannot be empty".to_string());
    }

    Ok((PropertyAccess { accessors }, input))
}

/// Reads a quoted key (opening quote already consumed), returns the key and the input after the closing quote
fn parse_quoted(input: &str) -> Result<(String, &str), String> {
    let mut key = String::new();
    let mut chars = input.char_indices();
    while let Some((index, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, escaped)) => key.push(escaped),
                None => break,
            },
            '"' => return Ok((key, &input[index + 1..])),
            c => key.push(c),
        }
    }

    Err("missing closing quote in property name".to_string())
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn name(n: &str) -> Accessor {
        Accessor::Name(n.to_string())
    }

    #[test]
    fn accessor_chain() {
        let access = PropertyAccess::parse(r#"bucket.tags["team \"a\""][2].name"#).unwrap();
        assert_eq!(
            access.accessors,
            vec![
                name("bucket"),
                name("tags"),
                Accessor::Key("team \"a\"".to_string()),
                Accessor::Index(2),
                name("name"),
            ]
        );
        assert_eq!(access.root_name(), "bucket");
        assert_eq!(access.to_string(), r#"bucket.tags["team \"a\""][2].name"#);
    }

    #[test]
    fn quoted_root() {
        let access = PropertyAccess::parse(r#"["my-resource"].id"#).unwrap();
        assert_eq!(access.root_name(), "my-resource");
    }

    #[test]
    fn strings() {
        assert_eq!(
            parse_string("plain").unwrap(),
            ParsedString::Literal("plain".to_string())
        );
        assert_eq!(
            parse_string("cost: $$5").unwrap(),
            ParsedString::Literal("cost: $5".to_string())
        );
        assert_eq!(
            parse_string("${a.b}").unwrap(),
            ParsedString::Symbol(PropertyAccess {
                accessors: vec![name("a"), name("b")]
            })
        );
        assert_eq!(
            parse_string("https://${site.url}/index").unwrap(),
            ParsedString::Interpolate(vec![
                Interpolation {
                    text: "https://".to_string(),
                    value: Some(PropertyAccess {
                        accessors: vec![name("site"), name("url")]
                    }),
                },
                Interpolation {
                    text: "/index".to_string(),
                    value: None,
                },
            ])
        );
    }

    #[test]
    fn errors() {
        let cases = [
            ("${a", "unterminated interpolation"),
            ("${}", "Property access expressions cannot be empty"),
            (r#"${a["b}"#, "missing closing quote in property name"),
            (r#"${a["b"}"#, "missing closing bracket in property access"),
            ("${a[1}", "missing closing bracket in list index"),
            ("${a[x]}", "invalid list index"),
            ("${[0]}", "the root property must be a string subscript or a name"),
        ];

        for (source, expected) in cases {
            assert_eq!(parse_string(source).unwrap_err(), expected, "{source}");
        }
    }
}
