use super::{children, Visit};
use crate::ast::{Expr, ExprKind, PropertyAccess, ResourceDecl};

/// Recursively visit all [PropertyAccess]es (symbol references)
pub trait VisitSymbols {
    fn visit_symbols(&self, visitor: &mut dyn Visit<PropertyAccess>);
}

impl VisitSymbols for Expr {
    fn visit_symbols(&self, visitor: &mut dyn Visit<PropertyAccess>) {
        match &self.kind {
            ExprKind::Symbol(access) => visitor.visit(access),
            ExprKind::Interpolate(parts) => {
                for access in parts.iter().filter_map(|part| part.value.as_ref()) {
                    visitor.visit(access);
                }
            }
            _ => {
                for child in children(self) {
                    child.visit_symbols(visitor);
                }
            }
        }
    }
}

impl VisitSymbols for ResourceDecl {
    fn visit_symbols(&self, visitor: &mut dyn Visit<PropertyAccess>) {
        for entry in &self.properties {
            entry.value.visit_symbols(visitor);
        }

        for (_, option) in self.options.iter() {
            option.visit_symbols(visitor);
        }

        if let Some(get) = &self.get {
            get.id.visit_symbols(visitor);
            for entry in &get.state {
                entry.value.visit_symbols(visitor);
            }
        }
    }
}

impl<T: VisitSymbols> VisitSymbols for Option<T> {
    fn visit_symbols(&self, visitor: &mut dyn Visit<PropertyAccess>) {
        if let Some(inner) = self {
            inner.visit_symbols(visitor);
        }
    }
}
