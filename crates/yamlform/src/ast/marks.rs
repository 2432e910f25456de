//! source positions of a YAML document
//!
//! `serde_yaml` values carry no positions. The source is parsed a second time by an event parser and the
//! marks are kept in a tree shaped like the document, which the loader walks next to the value.
use crate::diagnostics::{Pos, Range};
use std::collections::HashMap;
use std::sync::Arc;
use yaml_rust2::parser::{Event, MarkedEventReceiver, Parser};
use yaml_rust2::scanner::{Marker, ScanError, TScalarStyle};

/// Range of a node and the marks of its children
#[derive(Debug, Clone, Default)]
pub(crate) struct Marks {
    pub range: Option<Range>,
    children: Children,
}

#[derive(Debug, Clone, Default)]
enum Children {
    #[default]
    Leaf,
    Items(Vec<Marks>),
    Entries(Vec<(Marks, Marks)>),
}

static UNMARKED: Marks = Marks {
    range: None,
    children: Children::Leaf,
};

impl Marks {
    /// Marks of the first document in `source`
    pub fn parse(source: &str, filename: Option<Arc<str>>) -> Result<Marks, ScanError> {
        let mut builder = Builder {
            filename,
            open: vec![],
            anchors: HashMap::new(),
            root: None,
        };
        Parser::new(source.chars()).load(&mut builder, false)?;
        Ok(builder.root.unwrap_or_default())
    }

    pub fn unmarked() -> &'static Marks {
        &UNMARKED
    }

    /// Marks of the `index`th sequence item, unmarked if there is none
    pub fn item(&self, index: usize) -> &Marks {
        match &self.children {
            Children::Items(items) => items.get(index).unwrap_or(&UNMARKED),
            _ => &UNMARKED,
        }
    }

    /// Marks of the key and value of the `index`th mapping entry
    pub fn entry(&self, index: usize) -> (&Marks, &Marks) {
        match &self.children {
            Children::Entries(entries) => entries
                .get(index)
                .map_or((&UNMARKED, &UNMARKED), |(key, value)| (key, value)),
            _ => (&UNMARKED, &UNMARKED),
        }
    }
}

enum Open {
    Sequence(Vec<Marks>),
    Mapping {
        entries: Vec<(Marks, Marks)>,
        key: Option<Marks>,
    },
}

struct Builder {
    filename: Option<Arc<str>>,
    /// collections not yet closed, with their start and anchor
    open: Vec<(Pos, usize, Open)>,
    anchors: HashMap<usize, Marks>,
    root: Option<Marks>,
}

impl Builder {
    fn range(&self, start: Pos, end: Pos) -> Option<Range> {
        Some(Range::new(self.filename.clone(), start, end))
    }

    fn complete(&mut self, node: Marks, anchor: usize) {
        if anchor != 0 {
            self.anchors.insert(anchor, node.clone());
        }

        match self.open.last_mut() {
            None => {
                self.root.get_or_insert(node);
            }
            Some((_, _, Open::Sequence(items))) => items.push(node),
            Some((_, _, Open::Mapping { entries, key })) => match key.take() {
                None => *key = Some(node),
                Some(key) => entries.push((key, node)),
            },
        }
    }

    fn close(&mut self, end: Pos) {
        let Some((start, anchor, open)) = self.open.pop() else {
            return;
        };
        let children = match open {
            Open::Sequence(items) => Children::Items(items),
            Open::Mapping { entries, .. } => Children::Entries(entries),
        };
        let node = Marks {
            range: self.range(start, end),
            children,
        };
        self.complete(node, anchor);
    }
}

fn position(mark: &Marker) -> Pos {
    Pos::new(mark.line(), mark.col() + 1)
}

/// Columns a single line scalar spans in the source
fn scalar_width(value: &str, style: TScalarStyle) -> usize {
    if value.contains('\n') {
        return 0;
    }
    match style {
        TScalarStyle::SingleQuoted | TScalarStyle::DoubleQuoted => value.chars().count() + 2,
        TScalarStyle::Plain => value.chars().count(),
        _ => 0,
    }
}

impl MarkedEventReceiver for Builder {
    fn on_event(&mut self, event: Event, mark: Marker) {
        let start = position(&mark);
        match event {
            Event::Scalar(value, style, anchor, ..) => {
                let end = Pos::new(start.line, start.column + scalar_width(&value, style));
                let node = Marks {
                    range: self.range(start, end),
                    children: Children::Leaf,
                };
                self.complete(node, anchor);
            }
            Event::Alias(anchor) => {
                let node = self.anchors.get(&anchor).cloned().unwrap_or_default();
                self.complete(node, 0);
            }
            Event::SequenceStart(anchor, ..) => {
                self.open.push((start, anchor, Open::Sequence(vec![])));
            }
            Event::MappingStart(anchor, ..) => {
                self.open.push((
                    start,
                    anchor,
                    Open::Mapping {
                        entries: vec![],
                        key: None,
                    },
                ));
            }
            Event::SequenceEnd | Event::MappingEnd => self.close(start),
            _ => {}
        }
    }
}
