//! diagnostics shared by loader, scheduler, type checker and evaluator
//!
//! Problems are collected instead of aborting early. Every collected [Diagnostic] is traced at `trace` level
//! so `YAMLFORM_LOG=yamlform=trace` shows them in the order they were found.
use std::fmt;
use std::sync::Arc;

/// Position inside a source document (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
}

impl Pos {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    /// Single integer ordering key. Valid as long as no line exceeds 100000 columns.
    fn key(&self) -> usize {
        self.line * 100_000 + self.column
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Range {
    pub filename: Option<Arc<str>>,
    pub start: Pos,
    pub end: Pos,
}

impl Range {
    pub fn new(filename: Option<Arc<str>>, start: Pos, end: Pos) -> Self {
        Self {
            filename,
            start,
            end,
        }
    }

    /// Range on a single line, handy for tests and synthesized nodes
    pub fn line(line: usize, start_column: usize, end_column: usize) -> Self {
        Self::new(None, Pos::new(line, start_column), Pos::new(line, end_column))
    }

    /// Smallest range covering both
    pub fn union(&self, other: &Range) -> Range {
        let start = if other.start.key() < self.start.key() {
            other.start
        } else {
            self.start
        };
        let end = if other.end.key() > self.end.key() {
            other.end
        } else {
            self.end
        };

        Range {
            filename: self.filename.clone().or_else(|| other.filename.clone()),
            start,
            end,
        }
    }

    pub fn union_all<'a>(ranges: impl IntoIterator<Item = &'a Range>) -> Option<Range> {
        ranges.into_iter().fold(None, |acc: Option<Range>, next| match acc {
            None => Some(next.clone()),
            Some(acc) => Some(acc.union(next)),
        })
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(filename) = &self.filename {
            write!(f, "{filename}:")?;
        }
        write!(f, "{}:{}", self.start.line, self.start.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<Range>,
}

impl Diagnostic {
    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            summary: summary.into(),
            detail: String::new(),
            range: None,
        }
    }

    pub fn warning(summary: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(summary)
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    pub fn with_range(mut self, range: Option<&Range>) -> Self {
        self.range = range.cloned();
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(range) = &self.range {
            write!(f, "{range}: ")?;
        }
        write!(f, "{}: {}", self.severity, self.summary)?;
        if !self.detail.is_empty() {
            write!(f, "; {}", self.detail)?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {}

/// Ordered collection of [Diagnostic]s
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        tracing::trace!(%diagnostic, "diagnostic collected");
        self.0.push(diagnostic);
    }

    pub fn extend(&mut self, other: impl IntoIterator<Item = Diagnostic>) {
        for diagnostic in other {
            self.push(diagnostic);
        }
    }

    pub fn has_errors(&self) -> bool {
        self.0.iter().any(Diagnostic::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|d| d.is_error())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Summaries only, mostly useful for assertions
    pub fn summaries(&self) -> Vec<String> {
        self.0.iter().map(|d| d.summary.clone()).collect()
    }
}

impl From<Diagnostic> for Diagnostics {
    fn from(value: Diagnostic) -> Self {
        Self(vec![value])
    }
}

impl FromIterator<Diagnostic> for Diagnostics {
    fn from_iter<T: IntoIterator<Item = Diagnostic>>(iter: T) -> Self {
        let mut diagnostics = Diagnostics::new();
        diagnostics.extend(iter);
        diagnostics
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, diagnostic) in self.0.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "{diagnostic}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostics {}

/// Diagnostics collector shared with deferred continuations
///
/// Continuations may run whenever the engine resolves a value, so pushes are serialized by a lock.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticSink {
    inner: Arc<parking_lot::Mutex<Diagnostics>>,
}

impl DiagnosticSink {
    pub fn push(&self, diagnostic: Diagnostic) {
        self.inner.lock().push(diagnostic);
    }

    pub fn extend(&self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.inner.lock().extend(diagnostics);
    }

    pub fn has_errors(&self) -> bool {
        self.inner.lock().has_errors()
    }

    pub fn snapshot(&self) -> Diagnostics {
        self.inner.lock().clone()
    }
}

/// Builds "X does not exist on Y" messages with suggestions drawn from the existing fields
#[derive(Debug, Clone, derive_new::new)]
pub struct FieldFormatter {
    parent: String,
    fields: Vec<String>,
    #[new(value = "5")]
    max_elements: usize,
    #[new(value = "true")]
    properties: bool,
}

impl FieldFormatter {
    /// Call the existing entries "fields" instead of "properties"
    pub fn fields(mut self) -> Self {
        self.properties = false;
        self
    }

    fn noun(&self) -> &'static str {
        if self.properties {
            "properties"
        } else {
            "fields"
        }
    }

    /// Closest existing field, if it is close enough to be a plausible typo
    pub fn suggestion(&self, field: &str) -> Option<&str> {
        let limit = (field.chars().count() / 3).max(1);
        self.fields
            .iter()
            .map(|candidate| (strsim::levenshtein(candidate, field), candidate))
            .filter(|(distance, _)| *distance <= limit)
            .min_by(|(a_distance, a), (b_distance, b)| a_distance.cmp(b_distance).then(a.cmp(b)))
            .map(|(_, candidate)| candidate.as_str())
    }

    /// `(summary, detail)` for an unknown `field`, described as `label`
    pub fn message(&self, field: &str, label: &str) -> (String, String) {
        let mut summary = format!("{label} does not exist on {}", self.parent);
        if let Some(suggestion) = self.suggestion(field) {
            summary.push_str(&format!(", did you mean '{suggestion}'?"));
        }

        let mut existing = self.fields.clone();
        existing.sort();
        existing.dedup();
        let existing = sort_by_edit_distance(&existing, field);

        let detail = if existing.is_empty() {
            format!("{} has no {}", self.parent, self.noun())
        } else if existing.len() > self.max_elements {
            format!(
                "Existing {} are: {} and {} others",
                self.noun(),
                existing[..self.max_elements].join(", "),
                existing.len() - self.max_elements
            )
        } else {
            format!("Existing {} are: {}", self.noun(), existing.join(", "))
        };

        (summary, detail)
    }

    pub fn error(&self, field: &str, label: &str, range: Option<&Range>) -> Diagnostic {
        let (summary, detail) = self.message(field, label);
        Diagnostic::error(summary)
            .with_detail(detail)
            .with_range(range)
    }
}

/// Sort alphabetically, then (stable) by edit distance to `compared_to`
pub fn sort_by_edit_distance(words: &[String], compared_to: &str) -> Vec<String> {
    let mut sorted = words.to_vec();
    sorted.sort();
    sorted.sort_by_key(|word| strsim::levenshtein(word, compared_to));
    sorted
}

/// "a", "a and b", "a, b and c"
pub fn and_list<S: AsRef<str>>(items: &[S]) -> String {
    display_list(items, "and")
}

/// "a", "a or b", "a, b or c"
pub fn or_list<S: AsRef<str>>(items: &[S]) -> String {
    display_list(items, "or")
}

fn display_list<S: AsRef<str>>(items: &[S], conjunction: &str) -> String {
    match items {
        [] => String::new(),
        [only] => only.as_ref().to_string(),
        [init @ .., last] => {
            let init: Vec<&str> = init.iter().map(AsRef::as_ref).collect();
            format!("{} {conjunction} {}", init.join(", "), last.as_ref())
        }
    }
}

/// Warning for a key that only differs from a known one by letter case
pub fn unexpected_casing(range: Option<&Range>, expected: &str, found: &str) -> Diagnostic {
    Diagnostic::warning(format!(
        "'{found}' looks like a miscapitalization of '{expected}'"
    ))
    .with_range(range)
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn words(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn edit_distance_sorting() {
        assert_eq!(sort_by_edit_distance(&[], "test"), Vec::<String>::new());
        assert_eq!(
            sort_by_edit_distance(&words(&["test2", "test"]), "test"),
            words(&["test", "test2"])
        );
        assert_eq!(
            sort_by_edit_distance(&words(&["test2", "test", "test2"]), "test"),
            words(&["test", "test2", "test2"])
        );
        assert_eq!(
            sort_by_edit_distance(&words(&["c", "b", "a"]), "test"),
            words(&["a", "b", "c"])
        );
    }

    #[test]
    fn lists() {
        assert_eq!(and_list::<&str>(&[]), "");
        assert_eq!(and_list(&["a"]), "a");
        assert_eq!(or_list(&["a", "b"]), "a or b");
        assert_eq!(and_list(&["a", "b", "c"]), "a, b and c");
    }

    #[test]
    fn range_union_orders_by_line_then_column() {
        let first = Range::line(2, 10, 12);
        let second = Range::line(1, 40, 3);
        let union = first.union(&second);

        assert_eq!(union.start, Pos::new(1, 40));
        assert_eq!(union.end, Pos::new(2, 12));
        assert_eq!(
            Range::union_all([&first, &second, &Range::line(7, 1, 2)]).map(|r| r.end),
            Some(Pos::new(7, 2))
        );
    }

    #[test]
    fn diagnostics_render_and_serialize_with_filename() {
        let range = Range::new(Some(Arc::from("main.yaml")), Pos::new(3, 5), Pos::new(3, 12));
        let diagnostic = Diagnostic::error("unknown property").with_range(Some(&range));

        assert_eq!(diagnostic.to_string(), "main.yaml:3:5: error: unknown property");
        assert_eq!(
            serde_json::to_value(&diagnostic).unwrap(),
            serde_json::json!({
                "severity": "error",
                "summary": "unknown property",
                "range": {
                    "filename": "main.yaml",
                    "start": {"line": 3, "column": 5},
                    "end": {"line": 3, "column": 12},
                },
            })
        );
    }

    #[test]
    fn field_formatter_suggests_close_names() {
        let formatter = FieldFormatter::new(
            "'aws:s3/bucket:Bucket'".to_string(),
            words(&["bucket", "acl", "website", "tags"]),
        );

        let (summary, detail) = formatter.message("bukcet", "Property bukcet");
        assert_eq!(
            summary,
            "Property bukcet does not exist on 'aws:s3/bucket:Bucket', did you mean 'bucket'?"
        );
        assert_eq!(detail, "Existing properties are: bucket, acl, tags, website");
    }

    #[test]
    fn field_formatter_truncates_and_handles_empty() {
        let formatter =
            FieldFormatter::new("start".to_string(), words(&["a", "b", "c", "d", "e", "f", "g"]));
        let (summary, detail) = formatter.message("zzzzzzzz", "zzzzzzzz");
        assert_eq!(summary, "zzzzzzzz does not exist on start");
        assert_eq!(detail, "Existing properties are: a, b, c, d, e and 2 others");

        let empty = FieldFormatter::new("'thing'".to_string(), vec![]).fields();
        assert_eq!(empty.message("x", "x").1, "'thing' has no fields");
    }

    #[test]
    fn sink_is_shared_between_clones() {
        let sink = DiagnosticSink::default();
        let other = sink.clone();
        other.push(Diagnostic::error("boom"));
        sink.push(Diagnostic::warning("careful"));

        assert!(sink.has_errors());
        assert_eq!(sink.snapshot().summaries(), vec!["boom", "careful"]);
    }
}
