//! tokio-postgres error classification

use tokio_postgres::error::SqlState;
use urio_core::{Error, Operation, Target};

pub(crate) fn classify(
    target: &Target,
    operation: Operation,
    path: &str,
    err: tokio_postgres::Error,
) -> Error {
    if err.is_closed() {
        return target.connection(operation, err);
    }
    let Some(code) = err.code() else {
        return target.transfer(operation, err);
    };
    let message = err
        .as_db_error()
        .map(|db| db.message().to_string())
        .unwrap_or_else(|| err.to_string());

    if *code == SqlState::UNDEFINED_TABLE || *code == SqlState::INVALID_SCHEMA_NAME {
        target.not_found(operation, path)
    } else if *code == SqlState::INVALID_PASSWORD
        || *code == SqlState::INVALID_AUTHORIZATION_SPECIFICATION
        || *code == SqlState::ADMIN_SHUTDOWN
    {
        target.connection(operation, message)
    } else if *code == SqlState::QUERY_CANCELED {
        target.timeout(operation, message)
    } else {
        target.transfer(operation, format!("{message} (SQLSTATE {})", code.code()))
    }
}
