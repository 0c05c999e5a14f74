//! Materialization of raw series blocks.

use crate::decoder::decode_rows;
use crate::error::{CoercionError, Error, Result};
use crate::precision::TimePrecision;
use crate::schema::{CoercionPolicy, FromRow, Schema};
use crate::tags::extract_identity;
use crate::types::{Row, Series};
use crate::wire::RawSeries;

/// Build a dynamic [`Series`] from a raw block.
///
/// Fails on the first row that cannot be decoded.
pub fn materialize(raw: &RawSeries, partial: bool, precision: TimePrecision) -> Result<Series> {
    materialize_located(raw, partial, precision).map_err(|(_, e)| e)
}

/// Like [`materialize`], returning the index of the failing row with the error.
pub(crate) fn materialize_located(
    raw: &RawSeries,
    partial: bool,
    precision: TimePrecision,
) -> std::result::Result<Series, (usize, Error)> {
    let key = extract_identity(raw);
    let entries = decode_rows(&raw.columns, &raw.values, precision)?;

    Ok(Series {
        name: key.name,
        tags: key.tags,
        entries,
        partial,
    })
}

/// Build a typed series directly from a raw block.
pub fn materialize_typed<T: FromRow>(
    raw: &RawSeries,
    partial: bool,
    precision: TimePrecision,
    policy: CoercionPolicy,
) -> Result<Series<T>> {
    materialize(raw, partial, precision)?.project(&T::schema(), policy)
}

impl Series<Row> {
    /// Project every row into `T`.
    ///
    /// The dynamic series is left untouched, so it can be projected again
    /// with another schema or policy.
    pub fn project<T: Default>(
        &self,
        schema: &Schema<T>,
        policy: CoercionPolicy,
    ) -> Result<Series<T>> {
        self.project_located(schema, policy)
            .map_err(|(row, source)| Error::Coercion {
                series: 0,
                row,
                source,
            })
    }

    /// Like [`project`](Self::project), returning the index of the failing
    /// row with the error.
    pub(crate) fn project_located<T: Default>(
        &self,
        schema: &Schema<T>,
        policy: CoercionPolicy,
    ) -> std::result::Result<Series<T>, (usize, CoercionError)> {
        let entries = self
            .entries
            .iter()
            .enumerate()
            .map(|(row, entry)| {
                schema
                    .project(entry, &self.tags, policy)
                    .map_err(|source| (row, source))
            })
            .collect::<std::result::Result<Vec<T>, _>>()?;

        Ok(Series {
            name: self.name.clone(),
            tags: self.tags.clone(),
            entries,
            partial: self.partial,
        })
    }

    /// Project every row into `T` using `T`'s own schema.
    pub fn to_typed<T: FromRow>(&self, policy: CoercionPolicy) -> Result<Series<T>> {
        self.project(&T::schema(), policy)
    }
}
