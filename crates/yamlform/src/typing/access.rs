//! typing of property access chains
use super::assignable::NotAssignable;
use crate::ast::Accessor;
use crate::diagnostics::FieldFormatter;
use crate::schema::{Property, Type};

/// A failed access, reported as `summary` with `detail`
#[derive(Debug, Clone, PartialEq)]
pub struct AccessError {
    pub summary: String,
    pub detail: String,
}

impl AccessError {
    fn new(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            detail: detail.into(),
        }
    }
}

/// Type reached by applying `accessors` to a value of type `root`
///
/// `running_name` is the text of the access so far, used in messages. Accessing a union applies the rest of
/// the chain to each alternative and only fails when no alternative supports it.
pub fn type_property_access(
    root: &Type,
    running_name: &str,
    accessors: &[Accessor],
) -> Result<Type, AccessError> {
    let Some((accessor, rest)) = accessors.split_first() else {
        return Ok(root.clone());
    };
    let root = root.unwrap_input();

    if let Type::Union(alternatives) = root {
        let mut possibilities = vec![];
        let mut failures = vec![];
        for alternative in alternatives {
            match type_property_access(alternative, running_name, accessors) {
                Ok(type_) if !type_.is_invalid() => possibilities.push(type_),
                Ok(_) => {}
                Err(error) => {
                    failures.push(NotAssignable::new(error.summary).property(alternative.to_string()))
                }
            }
        }

        if possibilities.is_empty() && !failures.is_empty() {
            let operation = match accessor {
                Accessor::Name(_) => "access",
                Accessor::Key(_) | Accessor::Index(_) => "index",
            };
            return Err(AccessError::new(
                format!("Cannot {operation} into {running_name} of type {root}"),
                NotAssignable::new(format!(
                    "'{running_name}' could be a type that does not support {operation}ing"
                ))
                .because(failures)
                .to_string(),
            ));
        }
        return Ok(Type::union(possibilities));
    }

    match (accessor, root) {
        (_, Type::Invalid) => Ok(Type::Invalid),
        // nothing is known about the shape
        (_, Type::Any) => Ok(Type::Any),

        (Accessor::Name(name) | Accessor::Key(name), Type::Object(object)) => {
            access_property(&object.properties, running_name, name, rest)
        }
        (Accessor::Name(name) | Accessor::Key(name), Type::Resource(resource)) => {
            access_property(&resource.accessible_properties(), running_name, name, rest)
        }
        (Accessor::Name(name), Type::Map(element)) => {
            type_property_access(element, &format!("{running_name}.{name}"), rest)
        }
        (Accessor::Name(_), _) => Err(AccessError::new(
            format!("cannot access a property on '{running_name}' (type {root})"),
            "Property access is only allowed on Resources and Objects",
        )),

        (Accessor::Key(key), Type::Map(element)) => {
            type_property_access(element, &format!("{running_name}[{key:?}]"), rest)
        }
        (Accessor::Key(_), Type::Array(_)) => Err(AccessError::new(
            format!("Cannot index via string into '{running_name}' (type {root})"),
            "Index via string is only allowed on Maps",
        )),
        (Accessor::Index(index), Type::Array(element)) => {
            type_property_access(element, &format!("{running_name}[{index}]"), rest)
        }
        (Accessor::Index(_), Type::Map(_)) => Err(AccessError::new(
            format!("Cannot index via number into '{running_name}' (type {root})"),
            "Index via number is only allowed on Arrays",
        )),
        (Accessor::Key(_) | Accessor::Index(_), _) => Err(AccessError::new(
            format!("Cannot index into '{running_name}' (type {root})"),
            "Index property access is only allowed on Maps and Lists",
        )),
    }
}

fn access_property(
    properties: &[Property],
    running_name: &str,
    name: &str,
    rest: &[Accessor],
) -> Result<Type, AccessError> {
    match properties.iter().find(|p| p.name == name) {
        Some(property) => {
            type_property_access(&property.type_, &format!("{running_name}.{name}"), rest)
        }
        None => {
            let names = properties.iter().map(|p| p.name.clone()).collect();
            let (summary, detail) = FieldFormatter::new(running_name.to_string(), names).message(name, name);
            Err(AccessError::new(summary, detail))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ast::PropertyAccess;
    use crate::schema::ResourceType;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn access(root: &Type, source: &str) -> Result<Type, AccessError> {
        let access = PropertyAccess::parse(source).unwrap();
        type_property_access(root, access.root_name(), access.rest())
    }

    fn network() -> Type {
        Type::Resource(Arc::new(ResourceType {
            token: "cloud:index:Network".to_string(),
            inputs: vec![],
            outputs: vec![
                Property::optional("subnetIds", Type::array(Type::String)),
                Property::optional("tags", Type::map(Type::String)),
            ],
            is_component: false,
        }))
    }

    #[test]
    fn resources_expose_id_and_urn() {
        let net = network();
        assert_eq!(access(&net, "net.id"), Ok(Type::String));
        assert_eq!(access(&net, "net.urn"), Ok(Type::String));
        assert_eq!(access(&net, "net.subnetIds[0]"), Ok(Type::String));
        assert_eq!(access(&net, r#"net.tags["team"]"#), Ok(Type::String));

        let component = Type::Resource(Arc::new(ResourceType {
            token: "cloud:compute:Cluster".to_string(),
            is_component: true,
            ..Default::default()
        }));
        assert_eq!(
            access(&component, "cluster.id").unwrap_err().summary,
            "id does not exist on cluster"
        );
    }

    #[test]
    fn unknown_properties_suggest() {
        let error = access(&network(), "net.subnetId").unwrap_err();
        assert_eq!(
            error,
            AccessError::new(
                "subnetId does not exist on net, did you mean 'subnetIds'?",
                "Existing properties are: subnetIds, urn, id, tags"
            )
        );
    }

    #[test]
    fn index_errors() {
        let net = network();
        assert_eq!(
            access(&net, r#"net.subnetIds["a"]"#).unwrap_err().summary,
            "Cannot index via string into 'net.subnetIds' (type List<string>)"
        );
        assert_eq!(
            access(&net, "net.tags[1]").unwrap_err().summary,
            "Cannot index via number into 'net.tags' (type Map<string>)"
        );
        assert_eq!(
            access(&Type::String, "name[0]").unwrap_err(),
            AccessError::new(
                "Cannot index into 'name' (type string)",
                "Index property access is only allowed on Maps and Lists"
            )
        );
        assert_eq!(
            access(&Type::Number, "count.value").unwrap_err().summary,
            "cannot access a property on 'count' (type number)"
        );
        assert_eq!(access(&Type::Any, "anything.goes[3]"), Ok(Type::Any));
    }

    #[test]
    fn unions_resolve_per_alternative() {
        let union = Type::union([network(), Type::map(Type::Number)]);
        assert_eq!(
            access(&union, "x.subnetIds"),
            Ok(Type::union([Type::array(Type::String), Type::Number]))
        );

        let error = access(&Type::union([Type::String, Type::Bool]), "x.y").unwrap_err();
        assert_eq!(error.summary, "Cannot access into x of type Union<string, boolean>");
        assert_eq!(
            error.detail,
            "'x' could be a type that does not support accessing:\n  \
             string: cannot access a property on 'x' (type string)\n  \
             boolean: cannot access a property on 'x' (type boolean)"
        );
    }
}
