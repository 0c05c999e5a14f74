//! Grouping of series into statements.
//!
//! Each statement of a response is materialized on its own: a statement that
//! carries a database error, or whose body is malformed, records a
//! [`StatementError`] and yields no series, while its siblings are still
//! materialized.

use crate::error::{Error, Result, StatementError};
use crate::precision::TimePrecision;
use crate::schema::{CoercionPolicy, FromRow, Schema};
use crate::series::materialize_located;
use crate::types::{Row, Series, Statement};
use crate::wire::{RawResponse, RawStatement, declared_statement_id};

/// Materialize every statement of a response.
///
/// `response_partial` is the response-wide truncation flag supplied by the
/// transport. A statement is partial if that flag is set or if the statement
/// or any of its series carries its own `partial` marker; every series of a
/// partial statement is then marked partial.
///
/// Statement ids are taken from the response as declared, in response order.
/// A statement that declares no id gets its position.
///
/// Fails only when the response as a whole carries an error.
pub fn aggregate(
    response: &RawResponse,
    response_partial: bool,
    precision: TimePrecision,
) -> Result<Vec<Statement>> {
    if let Some(message) = &response.error {
        return Err(Error::Query {
            message: message.clone(),
        });
    }

    Ok(response
        .results
        .iter()
        .enumerate()
        .map(|(position, value)| {
            let statement_id = declared_statement_id(value).unwrap_or(position);
            match RawStatement::from_json(value) {
                Ok(raw) => aggregate_statement(statement_id, &raw, response_partial, precision),
                Err(e) => failed(
                    statement_id,
                    response_partial,
                    StatementError::Protocol {
                        series: None,
                        row: None,
                        message: e.to_string(),
                    },
                ),
            }
        })
        .collect())
}

/// Materialize one statement.
pub fn aggregate_statement(
    statement_id: usize,
    raw: &RawStatement,
    response_partial: bool,
    precision: TimePrecision,
) -> Statement {
    let partial = response_partial || raw.partial || raw.series.iter().any(|s| s.partial);

    if let Some(message) = &raw.error {
        tracing::debug!(statement_id, error = %message, "statement returned an error");
        return failed(statement_id, partial, StatementError::Database(message.clone()));
    }

    let mut series = Vec::with_capacity(raw.series.len());
    for (index, block) in raw.series.iter().enumerate() {
        match materialize_located(block, partial, precision) {
            Ok(s) => series.push(s),
            Err((row, e)) => {
                tracing::debug!(statement_id, series = index, row, error = %e, "statement aborted");
                return failed(
                    statement_id,
                    partial,
                    StatementError::Protocol {
                        series: Some(index),
                        row: Some(row),
                        message: e.to_string(),
                    },
                );
            }
        }
    }

    Statement {
        statement_id,
        series,
        partial,
        error: None,
    }
}

fn failed<R>(statement_id: usize, partial: bool, error: StatementError) -> Statement<R> {
    Statement {
        statement_id,
        series: Vec::new(),
        partial,
        error: Some(error),
    }
}

impl Statement<Row> {
    /// Project every series of this statement into `T`.
    ///
    /// A coercion failure under [`CoercionPolicy::FailFast`] is recorded on the
    /// returned statement, which then has no series. An error already recorded
    /// on `self` is carried over.
    pub fn project<T: Default>(&self, schema: &Schema<T>, policy: CoercionPolicy) -> Statement<T> {
        if let Some(error) = &self.error {
            return failed(self.statement_id, self.partial, error.clone());
        }

        let mut series = Vec::with_capacity(self.series.len());
        for (index, s) in self.series.iter().enumerate() {
            match s.project_located(schema, policy) {
                Ok(projected) => series.push(projected),
                Err((row, source)) => {
                    return failed(
                        self.statement_id,
                        self.partial,
                        StatementError::Coercion {
                            series: index,
                            row,
                            source,
                        },
                    );
                }
            }
        }

        Statement {
            statement_id: self.statement_id,
            series,
            partial: self.partial,
            error: None,
        }
    }
}

/// Materialize every statement of a response into typed series.
///
/// The schema is built once and reused for every row of every statement.
pub fn aggregate_typed<T: FromRow>(
    response: &RawResponse,
    response_partial: bool,
    precision: TimePrecision,
    policy: CoercionPolicy,
) -> Result<Vec<Statement<T>>> {
    let schema = T::schema();
    Ok(aggregate(response, response_partial, precision)?
        .iter()
        .map(|statement| statement.project(&schema, policy))
        .collect())
}

/// Parse a response body and materialize it.
///
/// The response-wide partial flag is derived from the body: if any statement
/// or series is marked partial, every statement is.
pub fn parse_response(body: &str, precision: TimePrecision) -> Result<Vec<Statement>> {
    let response: RawResponse = body.parse()?;
    let partial = response.is_partial();
    aggregate(&response, partial, precision)
}

/// Flatten statements into a single list of series.
///
/// Fails with the first recorded statement error, so an errored response is
/// never mistaken for an empty one.
pub fn flatten_series<R>(statements: Vec<Statement<R>>) -> Result<Vec<Series<R>>> {
    let mut out = Vec::new();
    for statement in statements {
        out.extend(statement.into_series()?);
    }
    Ok(out)
}
