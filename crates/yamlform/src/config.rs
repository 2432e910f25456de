//! configuration types and stack-supplied values
//!
//! Declared config entries name their type as `String`, `Number`, `Int`, `Boolean` or `List<T>` (case does
//! not matter). Stack values arrive either as strings (`--config key=value`) or as YAML values from a
//! config file and are coerced to the declared type.
use crate::schema::Type;
use crate::value::Value;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigType {
    String,
    Number,
    Int,
    Boolean,
    List(Box<ConfigType>),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("heterogeneous typed lists are not allowed: found types {0} and {1}")]
    HeterogeneousList(ConfigType, ConfigType),
    #[error("empty list")]
    EmptyList,
    #[error("unexpected configuration type '{0}': valid types are {types}", types = ConfigType::valid_types())]
    UnexpectedType(String),
    #[error("{value:?} is not a valid {expected}")]
    InvalidValue { value: String, expected: ConfigType },
    #[error("expected key=value, got {0:?}")]
    InvalidAssignment(String),
    #[error("unable to read config file")]
    Io(String),
}

impl ConfigType {
    pub fn parse(source: &str) -> Option<ConfigType> {
        let lower = source.trim().to_ascii_lowercase();
        if let Some(inner) = lower
            .strip_prefix("list<")
            .and_then(|rest| rest.strip_suffix('>'))
        {
            return ConfigType::parse(inner).map(|inner| ConfigType::List(Box::new(inner)));
        }

        match lower.as_str() {
            "string" => Some(ConfigType::String),
            "number" => Some(ConfigType::Number),
            "int" => Some(ConfigType::Int),
            "boolean" => Some(ConfigType::Boolean),
            _ => None,
        }
    }

    /// All accepted type names, for error messages
    pub fn valid_types() -> String {
        let primitives = [
            ConfigType::String,
            ConfigType::Number,
            ConfigType::Int,
            ConfigType::Boolean,
        ];
        primitives
            .iter()
            .cloned()
            .flat_map(|t| [t.clone(), ConfigType::List(Box::new(t))])
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn schema_type(&self) -> Type {
        match self {
            ConfigType::String => Type::String,
            ConfigType::Number => Type::Number,
            ConfigType::Int => Type::Int,
            ConfigType::Boolean => Type::Bool,
            ConfigType::List(inner) => Type::array(inner.schema_type()),
        }
    }

    /// Type of a value found in stack configuration
    pub fn of_value(value: &serde_yaml::Value) -> Result<ConfigType, ConfigError> {
        use serde_yaml::Value as Yaml;

        match value {
            Yaml::String(_) => Ok(ConfigType::String),
            Yaml::Bool(_) => Ok(ConfigType::Boolean),
            Yaml::Number(n) if n.is_i64() || n.is_u64() => Ok(ConfigType::Int),
            Yaml::Number(_) => Ok(ConfigType::Number),
            Yaml::Sequence(items) => {
                let mut element: Option<ConfigType> = None;
                for item in items {
                    let item = ConfigType::of_value(item)?;
                    match &element {
                        None => element = Some(item),
                        Some(first) if *first == item => {}
                        Some(first) => {
                            return Err(ConfigError::HeterogeneousList(first.clone(), item))
                        }
                    }
                }
                element
                    .map(|element| ConfigType::List(Box::new(element)))
                    .ok_or(ConfigError::EmptyList)
            }
            Yaml::Null => Err(ConfigError::UnexpectedType("null".to_string())),
            Yaml::Mapping(_) => Err(ConfigError::UnexpectedType("map".to_string())),
            Yaml::Tagged(tagged) => ConfigType::of_value(&tagged.value),
        }
    }

    /// Converts a stack value into this type, parsing strings where needed
    pub fn coerce(&self, value: &serde_yaml::Value) -> Result<Value, ConfigError> {
        use serde_yaml::Value as Yaml;

        let invalid = || ConfigError::InvalidValue {
            value: match value {
                Yaml::String(s) => s.clone(),
                other => serde_yaml::to_string(other)
                    .map(|s| s.trim_end().to_string())
                    .unwrap_or_default(),
            },
            expected: self.clone(),
        };

        match (self, value) {
            (ConfigType::String, Yaml::String(s)) => Ok(Value::String(s.clone())),
            (ConfigType::String, Yaml::Number(n)) => Ok(Value::String(n.to_string())),
            (ConfigType::String, Yaml::Bool(b)) => Ok(Value::String(b.to_string())),
            (ConfigType::Number, Yaml::Number(n)) => n.as_f64().map(Value::Number).ok_or_else(invalid),
            (ConfigType::Number, Yaml::String(s)) => {
                s.trim().parse::<f64>().map(Value::Number).map_err(|_| invalid())
            }
            (ConfigType::Int, Yaml::Number(n)) => {
                n.as_i64().map(|n| Value::Number(n as f64)).ok_or_else(invalid)
            }
            (ConfigType::Int, Yaml::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(|n| Value::Number(n as f64))
                .map_err(|_| invalid()),
            (ConfigType::Boolean, Yaml::Bool(b)) => Ok(Value::Bool(*b)),
            (ConfigType::Boolean, Yaml::String(s)) => match s.trim() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(invalid()),
            },
            (ConfigType::List(element), Yaml::Sequence(items)) => items
                .iter()
                .map(|item| element.coerce(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            // lists passed on the command line are written as JSON/YAML flow sequences
            (ConfigType::List(_), Yaml::String(s)) => match serde_yaml::from_str(s) {
                Ok(parsed @ Yaml::Sequence(_)) => self.coerce(&parsed),
                _ => Err(invalid()),
            },
            (_, Yaml::Tagged(tagged)) => self.coerce(&tagged.value),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for ConfigType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigType::String => f.write_str("String"),
            ConfigType::Number => f.write_str("Number"),
            ConfigType::Int => f.write_str("Int"),
            ConfigType::Boolean => f.write_str("Boolean"),
            ConfigType::List(inner) => write!(f, "List<{inner}>"),
        }
    }
}

/// Configuration supplied by the stack
#[derive(Debug, Clone, Default)]
pub struct StackConfig {
    values: IndexMap<String, serde_yaml::Value>,
    secrets: HashSet<String>,
}

impl StackConfig {
    pub fn set(&mut self, key: impl Into<String>, value: serde_yaml::Value) {
        self.values.insert(key.into(), value);
    }

    pub fn set_secret(&mut self, key: impl Into<String>, value: serde_yaml::Value) {
        let key = key.into();
        self.secrets.insert(key.clone());
        self.values.insert(key, value);
    }

    pub fn mark_secret(&mut self, key: &str) {
        self.secrets.insert(key.to_string());
    }

    /// Parses a `key=value` assignment, the value is kept as a string
    pub fn assign(&mut self, assignment: &str) -> Result<(), ConfigError> {
        let (key, value) = assignment
            .split_once('=')
            .filter(|(key, _)| !key.is_empty())
            .ok_or_else(|| ConfigError::InvalidAssignment(assignment.to_string()))?;
        self.set(key, serde_yaml::Value::String(value.to_string()));
        Ok(())
    }

    /// Reads a YAML (or JSON) mapping of config keys
    pub fn load_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        tracing::info!(path=%path.display(), "loading stack config");
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let values: IndexMap<String, serde_yaml::Value> = serde_yaml::from_str(&contents)
            .map_err(|_| ConfigError::UnexpectedType("document".to_string()))?;
        self.values.extend(values);
        Ok(())
    }

    /// Looks up `key`, falling back to `project:key`
    pub fn get(&self, key: &str, project: &str) -> Option<(&serde_yaml::Value, bool)> {
        let namespaced = format!("{project}:{key}");
        let found = [key, namespaced.as_str()].into_iter().find_map(|candidate| {
            let (key, value) = self.values.get_key_value(candidate)?;
            Some((value, self.secrets.contains(key)))
        });
        found
    }

    /// Keys without the `project:` namespace
    pub fn keys<'a>(&'a self, project: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.values.keys().map(move |key| {
            key.strip_prefix(project)
                .and_then(|rest| rest.strip_prefix(':'))
                .unwrap_or(key)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn yaml(source: &str) -> serde_yaml::Value {
        serde_yaml::from_str(source).unwrap()
    }

    #[test]
    fn parse_types() {
        assert_eq!(ConfigType::parse("string"), Some(ConfigType::String));
        assert_eq!(
            ConfigType::parse("List<NUMBER>"),
            Some(ConfigType::List(Box::new(ConfigType::Number)))
        );
        assert_eq!(ConfigType::parse("List<Map>"), None);
        assert_eq!(ConfigType::parse("float"), None);
        assert_eq!(
            ConfigType::parse("List<Int>").unwrap().schema_type().to_string(),
            "List<integer>"
        );
    }

    #[test]
    fn type_stack_values() {
        assert_eq!(ConfigType::of_value(&yaml("3")), Ok(ConfigType::Int));
        assert_eq!(ConfigType::of_value(&yaml("3.5")), Ok(ConfigType::Number));
        assert_eq!(
            ConfigType::of_value(&yaml("[a, b]")),
            Ok(ConfigType::List(Box::new(ConfigType::String)))
        );
        assert_eq!(
            ConfigType::of_value(&yaml("[a, 1]")).unwrap_err().to_string(),
            "heterogeneous typed lists are not allowed: found types String and Int"
        );
        assert_eq!(ConfigType::of_value(&yaml("[]")), Err(ConfigError::EmptyList));
    }

    #[test]
    fn coerce_strings() {
        let string = |s: &str| serde_yaml::Value::String(s.to_string());

        assert_eq!(ConfigType::Int.coerce(&string("42")), Ok(Value::Number(42.0)));
        assert_eq!(ConfigType::Boolean.coerce(&string("true")), Ok(Value::Bool(true)));
        assert_eq!(
            ConfigType::List(Box::new(ConfigType::Number)).coerce(&string("[1, 2.5]")),
            Ok(Value::List(vec![Value::Number(1.0), Value::Number(2.5)]))
        );
        assert_eq!(
            ConfigType::Int.coerce(&string("4.5")).unwrap_err().to_string(),
            r#""4.5" is not a valid Int"#
        );
    }

    #[test]
    fn stack_lookup() {
        let mut config = StackConfig::default();
        config.assign("app:region=us-west-2").unwrap();
        config.set_secret("token", yaml("hunter2"));

        assert_eq!(
            config.get("region", "app"),
            Some((&yaml("us-west-2"), false))
        );
        assert_eq!(config.get("token", "app"), Some((&yaml("hunter2"), true)));
        assert_eq!(config.keys("app").collect::<Vec<_>>(), vec!["region", "token"]);
        assert_eq!(
            config.assign("=oops"),
            Err(ConfigError::InvalidAssignment("=oops".to_string()))
        );
    }
}
