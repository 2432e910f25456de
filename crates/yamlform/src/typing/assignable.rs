//! assignability between types
use super::Typing;
use crate::ast::{Expr, ExprKind, Literal, ObjectProperty};
use crate::diagnostics::{Diagnostic, FieldFormatter, Range};
use crate::schema::{EnumMember, ObjectType, Type};
use crate::value::format_number;
use std::collections::HashMap;
use std::fmt;

/// Why a value of one type cannot be used where another is expected
///
/// Forms a tree: every node may list the failures that caused it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotAssignable {
    pub reason: String,
    pub because: Vec<NotAssignable>,
    /// only groups its causes, each cause is reported as its own diagnostic
    pub transitory: bool,
    /// a gap in the checker rather than a mistake in the template
    pub internal: bool,
    pub property: Option<String>,
    pub range: Option<Range>,
    pub summary: Option<String>,
}

impl NotAssignable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            ..Default::default()
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self {
            internal: true,
            ..Self::new(reason)
        }
    }

    pub fn because(mut self, because: Vec<NotAssignable>) -> Self {
        self.because = because;
        self
    }

    pub fn transitory(mut self) -> Self {
        self.transitory = true;
        self
    }

    pub fn property(mut self, name: impl Into<String>) -> Self {
        self.property = Some(name.into());
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Sets the range, `None` keeps the current one
    pub fn at(mut self, range: Option<&Range>) -> Self {
        if let Some(range) = range {
            self.range = Some(range.clone());
        }
        self
    }

    pub fn with_reason(mut self, suffix: &str) -> Self {
        self.reason.push_str(suffix);
        self
    }

    /// Own summary, or the summary of the only cause
    pub fn summary(&self) -> Option<&str> {
        match (&self.summary, self.because.as_slice()) {
            (Some(summary), _) => Some(summary),
            (None, [only]) => only.summary(),
            _ => None,
        }
    }

    pub fn is_internal(&self) -> bool {
        self.internal || self.because.iter().any(NotAssignable::is_internal)
    }

    /// Own range, otherwise the smallest range covering every range set below
    pub fn range(&self) -> Option<Range> {
        if self.range.is_some() {
            return self.range.clone();
        }

        let mut ranges = vec![];
        self.collect_ranges(&mut ranges);
        Range::union_all(ranges)
    }

    fn collect_ranges<'a>(&'a self, ranges: &mut Vec<&'a Range>) {
        if let Some(range) = &self.range {
            ranges.push(range);
        }
        for cause in &self.because {
            cause.collect_ranges(ranges);
        }
    }

    /// Failures that are reported on their own
    pub fn independent(&self) -> Vec<&NotAssignable> {
        if !self.transitory || self.because.is_empty() {
            return vec![self];
        }
        self.because.iter().flat_map(NotAssignable::independent).collect()
    }

    /// `property: reason` without causes
    pub fn line(&self) -> String {
        match &self.property {
            Some(property) => format!("{property}: {}", self.reason),
            None => self.reason.clone(),
        }
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        write!(f, "{}{}", "  ".repeat(indent), self.line())?;
        if !self.because.is_empty() {
            f.write_str(":")?;
        }
        for cause in &self.because {
            writeln!(f)?;
            cause.write_indented(f, indent + 1)?;
        }
        Ok(())
    }

    /// One diagnostic per independent failure
    ///
    /// `default_summary` is used for the root when nothing more specific is known, `fallback` is the range of
    /// the checked expression.
    pub fn diagnostics(&self, default_summary: &str, fallback: Option<&Range>) -> Vec<Diagnostic> {
        self.independent()
            .into_iter()
            .map(|node| {
                let summary = match node.summary() {
                    Some(summary) => summary.to_string(),
                    None if std::ptr::eq(node, self) => default_summary.to_string(),
                    None => node.line(),
                };
                let range = node.range().or_else(|| fallback.cloned());
                // a leaf renders as its own summary
                let detail = node.to_string();
                let detail = if detail == summary { String::new() } else { detail };
                let diagnostic = if node.is_internal() {
                    Diagnostic::warning(format!("internal error: {summary}"))
                } else {
                    Diagnostic::error(summary)
                };
                diagnostic.with_detail(detail).with_range(range.as_ref())
            })
            .collect()
    }
}

impl fmt::Display for NotAssignable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

impl Typing {
    /// Checks that a value of type `from` may be used where `to` is expected
    ///
    /// `expr` is the expression producing the value when known. Literals are checked against enum members and
    /// object literals point errors at the offending entry.
    pub fn is_assignable(
        &self,
        expr: Option<&Expr>,
        from: &Type,
        to: &Type,
    ) -> Result<(), NotAssignable> {
        let (from, to) = (from.unwrap_input(), to.unwrap_input());
        if from.is_invalid() || to.is_invalid() || matches!(from, Type::Any) || matches!(to, Type::Any)
        {
            return Ok(());
        }

        let prefix = if from.is_primitive() { "type " } else { "" };
        let fail = || NotAssignable::new(format!("Cannot assign {prefix}'{from}' to {prefix}'{to}'"));
        let ok_if = |condition: bool| if condition { Ok(()) } else { Err(fail()) };
        let wrap = |result: Result<(), NotAssignable>| result.map_err(|cause| fail().because(vec![cause]));

        match from {
            Type::Union(alternatives) => {
                let reasons: Vec<NotAssignable> = alternatives
                    .iter()
                    .filter_map(|alternative| self.is_assignable(expr, alternative, to).err())
                    .collect();
                return if reasons.is_empty() {
                    Ok(())
                } else {
                    Err(fail().because(reasons))
                };
            }
            Type::Token(token) => {
                let underlying = token.underlying.clone().unwrap_or(Type::Any);
                return wrap(self.is_assignable(expr, &underlying, to)).map_err(|e| {
                    e.with_reason(&format!(
                        ". '{from}' is a Token Type. Token types act like their underlying type"
                    ))
                });
            }
            Type::Enum(enum_type) if !matches!(to, Type::Enum(_)) => {
                return wrap(self.is_assignable(expr, &enum_type.element, to));
            }
            _ => {}
        }

        match to {
            Type::Number | Type::Int => ok_if(matches!(from, Type::Number | Type::Int)),
            // resources become their urn, scalars are formatted
            Type::String => ok_if(matches!(
                from,
                Type::Resource(_) | Type::String | Type::Number | Type::Int | Type::Bool
            )),
            // fields typed as asset frequently accept archives too
            Type::Asset => ok_if(matches!(from, Type::Asset | Type::Archive)),
            Type::Bool | Type::Archive => ok_if(from == to),
            Type::Union(alternatives) => {
                let mut reasons = vec![];
                for alternative in alternatives {
                    match self.is_assignable(expr, from, alternative) {
                        Ok(()) => return Ok(()),
                        Err(reason) => reasons.push(reason),
                    }
                }
                Err(fail().because(reasons))
            }
            Type::Array(to_element) => match from {
                Type::Array(from_element) => wrap(self.is_assignable(None, from_element, to_element)),
                _ => Err(fail()),
            },
            Type::Map(to_element) => match from {
                Type::Map(from_element) => wrap(self.is_assignable(None, from_element, to_element)),
                // YAML does not tell maps and objects apart
                Type::Object(object) => {
                    let entries = literal_entries(expr);
                    for property in &object.properties {
                        let entry = entries.get(property.name.as_str());
                        self.is_assignable(entry.map(|e| &e.value), &property.type_, to_element)
                            .map_err(|cause| {
                                fail().because(vec![cause
                                    .property(&property.name)
                                    .at(entry.and_then(|e| e.value.range.as_ref()))])
                            })?;
                    }
                    Ok(())
                }
                _ => Err(fail()),
            },
            Type::Resource(to_resource) => match from {
                // an empty token stands for any resource
                Type::Resource(from_resource) => ok_if(
                    to_resource.token.is_empty() || to_resource.token == from_resource.token,
                ),
                _ => Err(fail()),
            },
            Type::Enum(enum_type) => {
                if self.is_assignable(expr, from, &enum_type.element).is_err() {
                    return Err(fail());
                }
                wrap(valid_enum_value(expr, &enum_type.members))
            }
            Type::Object(to_object) => match from {
                Type::Map(element) => {
                    let failures: Vec<NotAssignable> = to_object
                        .properties
                        .iter()
                        .filter_map(|property| {
                            self.is_assignable(None, element, &property.type_)
                                .err()
                                .map(|cause| {
                                    cause
                                        .property(&property.name)
                                        .at(expr.and_then(|e| e.range.as_ref()))
                                })
                        })
                        .collect();
                    if failures.is_empty() {
                        Ok(())
                    } else {
                        Err(fail().because(failures).transitory())
                    }
                }
                Type::Object(from_object) => {
                    let failures = self.object_failures(expr, from_object, to_object, prefix);
                    if failures.is_empty() {
                        Ok(())
                    } else {
                        Err(fail().because(failures).transitory())
                    }
                }
                _ => Err(fail()),
            },
            Type::Token(token) => {
                let underlying = token.underlying.clone().unwrap_or(Type::Any);
                wrap(self.is_assignable(expr, from, &underlying))
            }
            Type::Any | Type::Invalid | Type::Optional(_) | Type::Input(_) => {
                Err(NotAssignable::internal(format!("Unknown type: {to}")))
            }
        }
    }

    /// Structural comparison of two object types
    fn object_failures(
        &self,
        expr: Option<&Expr>,
        from: &ObjectType,
        to: &ObjectType,
        prefix: &str,
    ) -> Vec<NotAssignable> {
        let entries = literal_entries(expr);
        let expr_range = expr.and_then(|e| e.range.as_ref());
        let mut failures = vec![];

        for property in &to.properties {
            let Some(source) = from.property(&property.name) else {
                if property.required {
                    let reason = format!("Missing required property '{}'", property.name);
                    failures.push(
                        NotAssignable::new(&reason)
                            .with_summary(reason)
                            .property(&property.name)
                            .at(expr_range),
                    );
                }
                continue;
            };

            let result = match entries.get(property.name.as_str()) {
                Some(entry) => {
                    let from = self.expr(&entry.value).unwrap_or(&source.type_);
                    self.is_assignable(Some(&entry.value), from, &property.type_)
                        .map_err(|e| e.at(entry.value.range.as_ref()))
                }
                None => self
                    .is_assignable(None, &source.type_, &property.type_)
                    .map_err(|e| e.at(source.range.as_ref().or(expr_range))),
            };
            if let Err(cause) = result {
                failures.push(cause.property(&property.name));
            }
        }

        let formatter = FieldFormatter::new(format!("{prefix}'{}'", Type::Object(to.clone().into())), to.property_names());
        for property in &from.properties {
            if to.property(&property.name).is_some() {
                continue;
            }
            let (summary, detail) =
                formatter.message(&property.name, &format!("Property {}", property.name));
            let range = entries
                .get(property.name.as_str())
                .and_then(|entry| entry.key.range.as_ref())
                .or(property.range.as_ref())
                .or(expr_range);
            failures.push(NotAssignable::new(detail).with_summary(summary).at(range));
        }

        failures
    }
}

/// Entries of an object literal by literal key
fn literal_entries(expr: Option<&Expr>) -> HashMap<&str, &ObjectProperty> {
    match expr.map(|e| &e.kind) {
        Some(ExprKind::Object(entries)) => entries
            .iter()
            .filter_map(|entry| entry.key.as_str().map(|key| (key, entry)))
            .collect(),
        _ => HashMap::new(),
    }
}

/// Checks literal values against the members of an enum, computed values always pass
fn valid_enum_value(expr: Option<&Expr>, members: &[EnumMember]) -> Result<(), NotAssignable> {
    let Some(literal) = expr.and_then(Expr::literal) else {
        return Ok(());
    };
    let range = expr.and_then(|e| e.range.as_ref());

    for member in members {
        match (&literal, &member.value) {
            (Literal::String(value), Literal::String(allowed)) if value == allowed => return Ok(()),
            (Literal::Number(value), Literal::Number(allowed)) if value == allowed => return Ok(()),
            (Literal::String(_), Literal::String(_)) | (Literal::Number(_), Literal::Number(_)) => {}
            (Literal::Bool(_), _) => return Ok(()),
            (_, other) => {
                return Err(NotAssignable::internal(format!(
                    "schema enum value {other:?} does not match the type of {literal:?}"
                ))
                .at(range))
            }
        }
    }

    let allowed: Vec<String> = members
        .iter()
        .map(|member| {
            let value = match &member.value {
                Literal::String(s) => format!("\"{s}\""),
                Literal::Number(n) => format_number(*n),
                Literal::Bool(b) => b.to_string(),
            };
            match &member.name {
                Some(name) if *name != value => format!("{name} ({value})"),
                _ => value,
            }
        })
        .collect();

    Err(NotAssignable::new(format!("Allowed values are {}", allowed.join(", "))).at(range))
}
