//! The typed schema a query tree is validated against.
//!
//! Loading a schema is left to collaborators. This module only fixes the
//! shape of the definitions the tree needs ([`TypeDefinition`], [`TypeRef`])
//! and the [`SchemaResolver`] contract used to look them up. [`Schema`] is a
//! plain in-memory registry implementing that contract.

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;
use std::sync::Arc;

use itertools::Itertools;
use smol_str::SmolStr;
use thiserror::Error;

/// The name of a type in the schema.
pub type TypeName = SmolStr;

/// The built-in primitive (scalar) type names.
pub const BUILTIN_PRIMITIVES: [&str; 5] = ["Int", "Float", "String", "Boolean", "ID"];

/// Returns `true` if `name` is one of the [`BUILTIN_PRIMITIVES`].
#[must_use]
pub fn is_builtin_primitive(name: &str) -> bool {
    BUILTIN_PRIMITIVES.contains(&name)
}

/// A reference to a type, as written in a field declaration.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TypeRef {
    /// A type referenced by name.
    Named(TypeName),
    /// A list of the wrapped type.
    List(Box<TypeRef>),
    /// A non-nullable version of the wrapped type.
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    /// A reference to the named type.
    pub fn named(name: impl Into<TypeName>) -> Self {
        Self::Named(name.into())
    }

    /// Wraps the reference in a list.
    #[must_use]
    pub fn list(self) -> Self {
        Self::List(Box::new(self))
    }

    /// Wraps the reference in a non-null marker.
    #[must_use]
    pub fn non_null(self) -> Self {
        Self::NonNull(Box::new(self))
    }

    /// Strips one list wrapper and then one non-null wrapper, in that order,
    /// if present.
    ///
    /// Anything left wrapped after that is handed to the resolver as-is.
    #[must_use]
    pub fn unwrap_selection(&self) -> &TypeRef {
        let mut ty = self;
        if let TypeRef::List(inner) = ty {
            ty = inner;
        }
        if let TypeRef::NonNull(inner) = ty {
            ty = inner;
        }
        ty
    }

    /// The name of the type, if this reference is [`TypeRef::Named`].
    #[must_use]
    pub fn as_named(&self) -> Option<&TypeName> {
        match self {
            TypeRef::Named(name) => Some(name),
            _ => None,
        }
    }

    /// The name of the innermost named type, under any number of wrappers.
    #[must_use]
    pub fn base_name(&self) -> &TypeName {
        match self {
            TypeRef::Named(name) => name,
            TypeRef::List(inner) | TypeRef::NonNull(inner) => inner.base_name(),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named(name) => write!(f, "{name}"),
            TypeRef::List(inner) => write!(f, "[{inner}]"),
            TypeRef::NonNull(inner) => write!(f, "{inner}!"),
        }
    }
}

/// A field declared on an [`ObjectType`].
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FieldDefinition {
    /// The field name.
    pub name: SmolStr,
    /// The declared type of the field.
    #[serde(rename = "type")]
    pub ty: TypeRef,
}

impl FieldDefinition {
    /// Creates a new field definition.
    pub fn new(name: impl Into<SmolStr>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A composite type whose fields can be selected.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ObjectType {
    name: TypeName,
    fields: Vec<FieldDefinition>,
}

impl ObjectType {
    /// Creates an object type with no fields.
    pub fn new(name: impl Into<TypeName>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Adds a field, returning the updated type.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<SmolStr>, ty: TypeRef) -> Self {
        self.fields.push(FieldDefinition::new(name, ty));
        self
    }

    /// The name of the type.
    #[must_use]
    pub fn name(&self) -> &TypeName {
        &self.name
    }

    /// The declared fields, in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A resolved type definition.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
#[non_exhaustive]
pub enum TypeDefinition {
    /// A selectable object type.
    Object(ObjectType),
    /// A custom scalar declared by the schema.
    Scalar {
        /// The scalar name.
        name: TypeName,
    },
    /// An enumeration.
    Enum {
        /// The enum name.
        name: TypeName,
        /// The allowed values.
        values: Vec<SmolStr>,
    },
}

impl TypeDefinition {
    /// The name of the defined type.
    #[must_use]
    pub fn name(&self) -> &TypeName {
        match self {
            TypeDefinition::Object(obj) => obj.name(),
            TypeDefinition::Scalar { name } | TypeDefinition::Enum { name, .. } => name,
        }
    }

    /// Returns the object type if this definition can have fields selected.
    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectType> {
        match self {
            TypeDefinition::Object(obj) => Some(obj),
            _ => None,
        }
    }
}

impl From<ObjectType> for TypeDefinition {
    fn from(obj: ObjectType) -> Self {
        TypeDefinition::Object(obj)
    }
}

/// Resolves type references against a schema.
pub trait SchemaResolver: Send + Sync {
    /// Resolves a type reference to its definition, or `None` if the schema
    /// does not define it.
    fn lookup_type(&self, ty: &TypeRef) -> Option<Arc<TypeDefinition>>;

    /// Returns `true` if `name` is a primitive leaf type.
    ///
    /// Defaults to the [`BUILTIN_PRIMITIVES`].
    fn is_primitive(&self, name: &str) -> bool {
        is_builtin_primitive(name)
    }
}

impl fmt::Debug for dyn SchemaResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SchemaResolver")
    }
}

impl<R: SchemaResolver + ?Sized> SchemaResolver for Arc<R> {
    fn lookup_type(&self, ty: &TypeRef) -> Option<Arc<TypeDefinition>> {
        (**self).lookup_type(ty)
    }

    fn is_primitive(&self, name: &str) -> bool {
        (**self).is_primitive(name)
    }
}

/// An in-memory schema: a registry of type definitions keyed by name.
#[derive(Clone, Debug, Default)]
pub struct Schema(BTreeMap<TypeName, Arc<TypeDefinition>>);

impl Schema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes a new schema from a collection of definitions, rejecting
    /// duplicate names.
    pub fn try_new(defs: impl IntoIterator<Item = TypeDefinition>) -> Result<Self, SchemaError> {
        let mut schema = Self::new();
        for def in defs {
            schema.register(def)?;
        }
        Ok(schema)
    }

    /// Registers a new type definition.
    ///
    /// Returns a reference to the registered definition if successful.
    pub fn register(
        &mut self,
        def: impl Into<TypeDefinition>,
    ) -> Result<&Arc<TypeDefinition>, SchemaError> {
        let def = def.into();
        match self.0.entry(def.name().clone()) {
            btree_map::Entry::Occupied(_) => Err(SchemaError::AlreadyRegistered(def.name().clone())),
            btree_map::Entry::Vacant(ve) => Ok(ve.insert(Arc::new(def))),
        }
    }

    /// Gets the definition with the given name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<TypeDefinition>> {
        self.0.get(name)
    }

    /// Returns `true` if the schema defines a type with the given name.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Returns the number of definitions in the schema.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the schema has no definitions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns an iterator over the definitions in the schema.
    pub fn iter(&self) -> impl Iterator<Item = (&TypeName, &Arc<TypeDefinition>)> {
        self.0.iter()
    }
}

impl SchemaResolver for Schema {
    /// Wrapped references resolve to the definition of their innermost name.
    fn lookup_type(&self, ty: &TypeRef) -> Option<Arc<TypeDefinition>> {
        self.0.get(ty.base_name()).cloned()
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Schema[{}]", self.0.keys().join(", "))
    }
}

/// Errors that can occur while building a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SchemaError {
    /// A definition with the same name is already registered.
    #[error("The schema already defines a type named {0}.")]
    AlreadyRegistered(TypeName),
}
