use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// A value stored on the data bus. Hand-offs clone the `Arc`, never the value.
pub type DataValue = Arc<dyn Any + Send + Sync>;

/// Declared type of a bus entry: the readable type name plus the runtime type identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataType {
    name: &'static str,
    id: TypeId,
}

impl DataType {
    pub fn of<T: Any>() -> Self {
        Self {
            name: std::any::type_name::<T>(),
            id: TypeId::of::<T>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }
}

/// Identity of one unit of data flowing between vertices.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataId {
    pub name: String,
    pub ty: DataType,
}

impl DataId {
    pub fn new(name: impl Into<String>, ty: DataType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    pub fn of<T: Any>(name: impl Into<String>) -> Self {
        Self::new(name, DataType::of::<T>())
    }
}

impl fmt::Display for DataId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.name, self.ty.name)
    }
}
