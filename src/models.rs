use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Campos de un documento o de una fila SQLite
pub type Fields = serde_json::Map<String, Value>;

/// Registro de origen: fila de SQLite o documento leído del store.
/// Solo lectura para el runner.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub fields: Fields,
}

impl Record {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self { id: id.into(), fields }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// `true` si el campo existe, no es null y no es un string vacío
    pub fn has_value(&self, field: &str) -> bool {
        match self.fields.get(field) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }
}

/// Ruta de una colección: `alquileres` o `transacciones/12/pagos`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn root(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn doc(&self, id: impl Into<String>) -> DocumentPath {
        DocumentPath {
            collection: self.clone(),
            id: id.into(),
        }
    }

    /// Las colecciones raíz tienen un solo segmento
    pub fn is_root(&self) -> bool {
        !self.0.contains('/')
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentPath {
    pub collection: CollectionPath,
    pub id: String,
}

impl DocumentPath {
    /// Subcolección anidada bajo este documento
    pub fn collection(&self, name: &str) -> CollectionPath {
        CollectionPath(format!("{}/{}/{}", self.collection, self.id, name))
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldChange {
    Set(Value),
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Reemplaza el documento completo (lo crea si no existe)
    Set(Fields),
    /// Actualización parcial; el documento debe existir
    Update(BTreeMap<String, FieldChange>),
}

/// Cambio sobre un documento, producido por una función de decisión
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub target: DocumentPath,
    pub write: Write,
}

impl Mutation {
    pub fn set(target: DocumentPath, fields: Fields) -> Self {
        Self {
            target,
            write: Write::Set(fields),
        }
    }

    pub fn update<I, K>(target: DocumentPath, changes: I) -> Self
    where
        I: IntoIterator<Item = (K, FieldChange)>,
        K: Into<String>,
    {
        Self {
            target,
            write: Write::Update(changes.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        }
    }
}

/// Resultado de evaluar un registro
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Apply(Mutation),
    Skip(SkipReason),
    Fail(FailReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    AlreadyMigrated,
    MissingSourceField { field: String },
    NoMapping { detail: String },
    MissingReplacement { field: String },
    NotApplicable { detail: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SkipKind {
    AlreadyMigrated,
    MissingSourceField,
    NoMapping,
    MissingReplacement,
    NotApplicable,
}

impl SkipReason {
    pub fn kind(&self) -> SkipKind {
        match self {
            SkipReason::AlreadyMigrated => SkipKind::AlreadyMigrated,
            SkipReason::MissingSourceField { .. } => SkipKind::MissingSourceField,
            SkipReason::NoMapping { .. } => SkipKind::NoMapping,
            SkipReason::MissingReplacement { .. } => SkipKind::MissingReplacement,
            SkipReason::NotApplicable { .. } => SkipKind::NotApplicable,
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyMigrated => f.write_str("already migrated"),
            SkipReason::MissingSourceField { field } => write!(f, "missing field '{}'", field),
            SkipReason::NoMapping { detail } => write!(f, "no mapping: {}", detail),
            SkipReason::MissingReplacement { field } => {
                write!(f, "replacement field '{}' is missing", field)
            }
            SkipReason::NotApplicable { detail } => write!(f, "not applicable: {}", detail),
        }
    }
}

impl fmt::Display for SkipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SkipKind::AlreadyMigrated => "already migrated",
            SkipKind::MissingSourceField => "missing source field",
            SkipKind::NoMapping => "no mapping",
            SkipKind::MissingReplacement => "missing replacement",
            SkipKind::NotApplicable => "not applicable",
        };
        f.write_str(label)
    }
}

/// Registro mal formado; se cuenta y se deja intacto
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FailReason {
    #[error("invalid date '{value}' (expected YYYY-MM-DD)")]
    InvalidDate { value: String },
    #[error("field '{field}' should be a string, found {found}")]
    NotAString { field: String, found: &'static str },
    #[error("row has no usable primary key '{column}'")]
    MissingPrimaryKey { column: String },
    #[error("cannot extract a storage path from '{url}'")]
    UnparseableUrl { url: String },
}

/// Nombre del tipo JSON, para mensajes de diagnóstico
pub fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "map",
    }
}

/// Convierte un valor en id de documento: enteros y strings no vacíos
pub fn value_to_doc_id(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(i.to_string()),
            None => n.as_f64().filter(|f| f.fract() == 0.0).map(|f| (f as i64).to_string()),
        },
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}
