use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Marker for data that can be attached to an entity.
///
/// Every `'static` type is a component; there is no registration step.
pub trait Component: 'static {}

impl<T: 'static> Component for T {}

/// Identity of a component type, used as the key of the World's store table.
///
/// Wraps [`TypeId`] and keeps the Rust type name around for logs and
/// inspector output. Equality and hashing only look at the `TypeId`.
#[derive(Clone, Copy)]
pub struct ComponentTypeId {
    id: TypeId,
    name: &'static str,
}

impl ComponentTypeId {
    pub fn of<T: Component>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified Rust type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without its module path.
    pub fn short_name(&self) -> &'static str {
        short_type_name(self.name)
    }
}

/// Strip the module path from a `type_name`, leaving generic arguments as
/// they are: `alloc::vec::Vec<u32>` becomes `Vec<u32>`.
pub(crate) fn short_type_name(name: &str) -> &str {
    let head = name.find('<').unwrap_or(name.len());
    let start = name[..head].rfind("::").map_or(0, |i| i + 2);
    &name[start..]
}

impl PartialEq for ComponentTypeId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ComponentTypeId {}

impl Hash for ComponentTypeId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentTypeId({})", self.short_name())
    }
}

impl fmt::Display for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Health(#[allow(dead_code)] f32);
    struct Velocity;

    #[test]
    fn type_id_is_stable() {
        assert_eq!(ComponentTypeId::of::<Health>(), ComponentTypeId::of::<Health>());
    }

    #[test]
    fn distinct_types_differ() {
        assert_ne!(ComponentTypeId::of::<Health>(), ComponentTypeId::of::<Velocity>());
    }

    #[test]
    fn short_name_strips_module_path() {
        assert_eq!(ComponentTypeId::of::<Health>().short_name(), "Health");
        assert!(ComponentTypeId::of::<Health>().name().ends_with("::Health"));
    }

    #[test]
    fn short_name_keeps_generic_arguments() {
        assert_eq!(ComponentTypeId::of::<Vec<u32>>().short_name(), "Vec<u32>");
        assert_eq!(short_type_name("alloc::vec::Vec<u32>"), "Vec<u32>");
        assert_eq!(
            short_type_name("std::collections::HashMap<u32, game::Tag>"),
            "HashMap<u32, game::Tag>"
        );
        assert_eq!(short_type_name("Plain"), "Plain");
    }
}
