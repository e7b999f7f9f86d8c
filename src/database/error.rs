use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseErrorKind {
    NotFound { entity: String, id: String },
    UniqueViolation { constraint: Option<String> },
    Connection { message: String },
    Query { message: String },
}

#[derive(Debug, Clone, Error)]
#[error("{}", self.describe())]
pub struct DatabaseError {
    pub kind: DatabaseErrorKind,
}

impl DatabaseError {
    pub fn new(kind: DatabaseErrorKind) -> Self {
        Self { kind }
    }

    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::new(DatabaseErrorKind::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        })
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::new(DatabaseErrorKind::Query {
            message: message.into(),
        })
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::UniqueViolation { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::NotFound { .. })
    }

    fn describe(&self) -> String {
        match &self.kind {
            DatabaseErrorKind::NotFound { entity, id } => format!("{} {} not found", entity, id),
            DatabaseErrorKind::UniqueViolation { constraint } => match constraint {
                Some(c) => format!("unique constraint violated: {}", c),
                None => "unique constraint violated".to_string(),
            },
            DatabaseErrorKind::Connection { message } => {
                format!("database connection error: {}", message)
            }
            DatabaseErrorKind::Query { message } => format!("database query error: {}", message),
        }
    }

    #[cfg(feature = "database")]
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::new(DatabaseErrorKind::NotFound {
                entity: "row".to_string(),
                id: "unknown".to_string(),
            }),
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
                Self::new(DatabaseErrorKind::UniqueViolation {
                    constraint: db_err.constraint().map(str::to_string),
                })
            }
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => Self::new(DatabaseErrorKind::Connection {
                message: err.to_string(),
            }),
            _ => Self::query(err.to_string()),
        }
    }
}
