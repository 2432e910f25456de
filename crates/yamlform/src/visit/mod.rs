//! visitor pattern helpers
mod visit_symbols;
mod walk;
pub use visit_symbols::VisitSymbols;
pub use walk::{children, WalkExpressions};

/// Visitor that visits its subjects
pub trait Visit<T> {
    fn visit(&mut self, value: &T);
}

// blanket impl for FnMut
impl<T, F> Visit<T> for F
where
    F: FnMut(&T),
{
    fn visit(&mut self, value: &T) {
        self(value)
    }
}
