use thiserror::Error;

#[derive(Error, Debug)]
pub enum EntityError {
    #[error("Missing machine name")]
    MissingMachineName,

    #[error("Machine name '{0}' already exists")]
    MachineNameExists(String),

    #[error("Cannot find entity '{machine_name}' in collection '{collection}'")]
    CantFindEntity {
        collection: String,
        machine_name: String,
    },

    #[error("Unknown schema field '{0}'")]
    UnknownSchemaField(String),

    #[error("Field '{field}' declared with unknown type '{type_name}'")]
    UnknownFieldType { field: String, type_name: String },

    #[error("Schema field '{0}' is already defined")]
    SchemaFieldDefined(String),

    #[error("Unknown sanitization rule '{0}'")]
    UnknownSanitizer(String),

    #[error("Unknown validation rule '{0}'")]
    UnknownValidator(String),

    #[error("Unexpected field value: {0}")]
    UnexpectedFieldValue(String),

    #[error("Validation rule '{rule}' failed: {reason}")]
    ValidationFailed { rule: String, reason: String },

    #[error("Entity failed the '{0}' check")]
    FailedEntity(String),

    #[error("Invalid entity type '{0}'")]
    InvalidEntityType(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Lock error: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, EntityError>;

impl From<serde_json::Error> for EntityError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for EntityError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Lock(err.to_string())
    }
}
