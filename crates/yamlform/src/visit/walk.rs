use super::Visit;
use crate::ast::{Builtin, Expr, ExprKind};

/// Direct child expressions, in source order
pub fn children(expr: &Expr) -> Vec<&Expr> {
    match &expr.kind {
        ExprKind::Null
        | ExprKind::Bool(_)
        | ExprKind::Number(_)
        | ExprKind::String(_)
        | ExprKind::Interpolate(_)
        | ExprKind::Symbol(_) => vec![],
        ExprKind::List(items) => items.iter().collect(),
        ExprKind::Object(entries) => entries
            .iter()
            .flat_map(|entry| [&entry.key, &entry.value])
            .collect(),
        ExprKind::Builtin(builtin) => match builtin.as_ref() {
            Builtin::Invoke(invoke) => invoke
                .arguments
                .iter()
                .chain(invoke.options.iter().map(|(_, expr)| expr))
                .collect(),
            Builtin::Join {
                delimiter,
                values: other,
            }
            | Builtin::Split {
                delimiter,
                source: other,
            } => vec![delimiter, other],
            Builtin::Select { index, values } => vec![index, values],
            Builtin::ToJson(inner)
            | Builtin::ToBase64(inner)
            | Builtin::FromBase64(inner)
            | Builtin::Secret(inner)
            | Builtin::ReadFile(inner)
            | Builtin::Rfc3339ToUnix(inner) => vec![inner],
            Builtin::StackReference { property, .. } => vec![property],
            Builtin::Asset { source, .. } => vec![source],
            Builtin::AssetArchive(entries) => entries.iter().map(|(_, expr)| expr).collect(),
        },
    }
}

/// Recursively visit expressions, children before their parent
pub trait WalkExpressions {
    fn walk_post_order(&self, visitor: &mut dyn Visit<Expr>);
}

impl WalkExpressions for Expr {
    fn walk_post_order(&self, visitor: &mut dyn Visit<Expr>) {
        for child in children(self) {
            child.walk_post_order(visitor);
        }
        visitor.visit(self);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ast::{expr_from_value, ExprKind};
    use pretty_assertions::assert_eq;

    #[test]
    fn post_order() {
        let (expr, _) = expr_from_value(
            &serde_yaml::from_str("{ a: [1, two], fn_free: { fn::secret: x } }").unwrap(),
        );

        let mut seen = vec![];
        expr.walk_post_order(&mut |expr: &Expr| {
            seen.push(match &expr.kind {
                ExprKind::String(s) => s.clone(),
                ExprKind::Number(n) => n.to_string(),
                ExprKind::List(_) => "list".to_string(),
                ExprKind::Object(_) => "object".to_string(),
                ExprKind::Builtin(_) => "builtin".to_string(),
                _ => "other".to_string(),
            })
        });

        assert_eq!(
            seen,
            vec!["a", "1", "two", "list", "fn_free", "x", "builtin", "object"]
        );
    }
}
