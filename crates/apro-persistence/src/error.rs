//! Errores de persistencia.
//! Mapea errores de Diesel / conexión a variantes semánticas de esta capa.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("not found")] NotFound,
    #[error("unique violation: {0}")] UniqueViolation(String),
    #[error("check violation: {0}")] CheckViolation(String),
    #[error("foreign key violation: {0}")] ForeignKeyViolation(String),
    #[error("serialization conflict (retryable)")] SerializationConflict,
    #[error("transient IO / connection pool error: {0}")] TransientIo(String),
    #[error("unknown database error: {0}")] Unknown(String),
}

impl PersistenceError {
    /// `true` si conviene reintentar con backoff (deadlocks, conflictos de
    /// serialización, cortes de conexión).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::SerializationConflict | Self::TransientIo(_) => true,
            // Algunos errores llegan como Unknown con texto según driver/pg.
            // Best-effort string match sin acoplar a SQLSTATE.
            Self::Unknown(msg) => {
                let m = msg.to_lowercase();
                m.contains("deadlock detected")
                || m.contains("could not serialize access due to concurrent update")
                || m.contains("connection closed")
                || m.contains("connection refused")
                || m.contains("timeout")
            }
            _ => false,
        }
    }
}

fn database_error(kind: DatabaseErrorKind, message: &str) -> PersistenceError {
    match kind {
        DatabaseErrorKind::UniqueViolation => PersistenceError::UniqueViolation(message.to_string()),
        DatabaseErrorKind::CheckViolation => PersistenceError::CheckViolation(message.to_string()),
        DatabaseErrorKind::ForeignKeyViolation => PersistenceError::ForeignKeyViolation(message.to_string()),
        DatabaseErrorKind::SerializationFailure => PersistenceError::SerializationConflict,
        other => PersistenceError::Unknown(format!("db error kind {:?}: {}", other, message)),
    }
}

impl From<DieselError> for PersistenceError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => Self::NotFound,
            DieselError::DatabaseError(kind, info) => database_error(kind, info.message()),
            DieselError::BrokenTransactionManager => Self::TransientIo("broken transaction manager".into()),
            other => Self::Unknown(format!("diesel error: {other:?}")),
        }
    }
}
