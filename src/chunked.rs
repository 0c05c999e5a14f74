//! Reassembly of chunked query responses.
//!
//! With `chunked=true` InfluxDB streams newline-delimited JSON documents, each
//! shaped like a normal response. A logical series longer than the chunk size
//! is split into several blocks carrying the same name and tags, one per
//! chunk. [`ChunkReassembler`] stitches those blocks back together, strictly
//! in arrival order.
//!
//! In chunked mode the server's `partial` markers mean "more data for this
//! statement/series follows", not "truncated by a row limit". They are only
//! used to detect a stream that ends in the middle of a series, in which case
//! the flushed series is marked partial.

use std::collections::{BTreeSet, HashMap};
use std::pin::Pin;

use async_stream::stream;
use futures::{Stream, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_util::sync::CancellationToken;

use crate::decoder::decode_rows;
use crate::error::{Error, Result, StatementError};
use crate::precision::TimePrecision;
use crate::tags::extract_identity;
use crate::types::{Row, Series, SeriesKey, Statement};
use crate::wire::{RawResponse, RawStatement, declared_statement_id};

/// Where the reassembler is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReassemblerState {
    /// No series is open; waiting for the next chunk.
    AwaitingChunk,
    /// A series is open and may continue in the next chunk.
    AccumulatingSeries,
    /// The last chunk closed at least one series and opened another.
    SeriesBoundaryDetected,
    /// The stream ended and the open series was flushed.
    Done,
}

/// A finalized series together with the statement it belongs to.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamedSeries {
    /// Declared ordinal of the owning statement.
    pub statement_id: usize,
    /// The complete series.
    pub series: Series,
}

/// Output of [`ChunkReassembler::push`].
#[derive(Clone, Debug, PartialEq)]
pub enum ChunkEvent {
    /// A series is complete and will not receive more rows.
    Series(StreamedSeries),
    /// A statement failed; it yields no further series.
    StatementError {
        /// Declared ordinal of the failed statement.
        statement_id: usize,
        /// What went wrong.
        error: StatementError,
    },
}

struct OpenSeries {
    statement_id: usize,
    key: SeriesKey,
    entries: Vec<Row>,
    /// The last block of this series said more rows follow.
    continues: bool,
}

impl OpenSeries {
    fn finish(self, partial: bool) -> StreamedSeries {
        StreamedSeries {
            statement_id: self.statement_id,
            series: Series {
                name: self.key.name,
                tags: self.key.tags,
                entries: self.entries,
                partial,
            },
        }
    }
}

/// Incremental state machine over the chunks of one query.
///
/// Feed chunks in arrival order with [`push`](Self::push), then call
/// [`finish`](Self::finish) once the transport reports end of stream. A
/// reassembler belongs to a single query and is not shared.
pub struct ChunkReassembler {
    precision: TimePrecision,
    state: ReassemblerState,
    open: Option<OpenSeries>,
    failed: BTreeSet<usize>,
    seen: Vec<usize>,
    chunks: usize,
}

impl ChunkReassembler {
    /// Create a reassembler decoding timestamps in `precision`.
    pub fn new(precision: TimePrecision) -> Self {
        Self {
            precision,
            state: ReassemblerState::AwaitingChunk,
            open: None,
            failed: BTreeSet::new(),
            seen: Vec::new(),
            chunks: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> ReassemblerState {
        self.state
    }

    /// Statement ids in order of first appearance.
    pub fn statement_order(&self) -> &[usize] {
        &self.seen
    }

    /// Process one chunk.
    ///
    /// Returns the series finalized by this chunk and any statement errors it
    /// carried. A chunk with a request-level error fails the whole query.
    pub fn push(&mut self, chunk: RawResponse) -> Result<Vec<ChunkEvent>> {
        if self.state == ReassemblerState::Done {
            return Err(Error::Parse {
                message: "chunk received after end of stream".to_string(),
            });
        }
        if let Some(message) = chunk.error {
            self.open = None;
            self.state = ReassemblerState::Done;
            return Err(Error::Query { message });
        }

        self.chunks += 1;
        let mut events = Vec::new();
        let mut boundary = false;

        for (position, value) in chunk.results.iter().enumerate() {
            let statement_id = declared_statement_id(value).unwrap_or(position);
            if !self.seen.contains(&statement_id) {
                self.seen.push(statement_id);
            }
            if self.failed.contains(&statement_id) {
                continue;
            }

            let raw = match RawStatement::from_json(value) {
                Ok(raw) => raw,
                Err(e) => {
                    let error = StatementError::Protocol {
                        series: None,
                        row: None,
                        message: e.to_string(),
                    };
                    self.fail_statement(statement_id, error, &mut events);
                    continue;
                }
            };
            if let Some(message) = raw.error {
                self.fail_statement(statement_id, StatementError::Database(message), &mut events);
                continue;
            }

            for (index, block) in raw.series.iter().enumerate() {
                let key = extract_identity(block);
                let rows = match decode_rows(&block.columns, &block.values, self.precision) {
                    Ok(rows) => rows,
                    Err((row, e)) => {
                        let error = StatementError::Protocol {
                            series: Some(index),
                            row: Some(row),
                            message: e.to_string(),
                        };
                        self.fail_statement(statement_id, error, &mut events);
                        break;
                    }
                };

                match self.open.as_mut() {
                    Some(open) if open.statement_id == statement_id && open.key == key => {
                        tracing::trace!(series = %key.name, rows = rows.len(), "series continues");
                        open.entries.extend(rows);
                        open.continues = block.partial;
                        continue;
                    }
                    _ => {}
                }

                if let Some(previous) = self.open.take() {
                    boundary = true;
                    tracing::trace!(
                        series = %previous.key.name,
                        rows = previous.entries.len(),
                        "series boundary"
                    );
                    // A series announced as continuing but followed by another one lost rows.
                    let partial = previous.continues;
                    events.push(ChunkEvent::Series(previous.finish(partial)));
                }
                self.open = Some(OpenSeries {
                    statement_id,
                    key,
                    entries: rows,
                    continues: block.partial,
                });
            }
        }

        self.state = match (&self.open, boundary) {
            (Some(_), true) => ReassemblerState::SeriesBoundaryDetected,
            (Some(_), false) => ReassemblerState::AccumulatingSeries,
            (None, _) => ReassemblerState::AwaitingChunk,
        };
        Ok(events)
    }

    /// Flush the open series at end of stream.
    ///
    /// If the last block of the open series announced more rows, the stream
    /// was cut short and the series is returned marked partial.
    pub fn finish(&mut self) -> Option<StreamedSeries> {
        self.state = ReassemblerState::Done;
        let open = self.open.take()?;
        if open.continues {
            tracing::warn!(
                series = %open.key.name,
                rows = open.entries.len(),
                chunks = self.chunks,
                "chunked response ended mid-series"
            );
        }
        let partial = open.continues;
        Some(open.finish(partial))
    }

    /// Flush the open series after the transport failed mid-stream.
    ///
    /// The series is always marked partial.
    pub fn finish_truncated(&mut self) -> Option<StreamedSeries> {
        self.state = ReassemblerState::Done;
        let open = self.open.take()?;
        tracing::warn!(
            series = %open.key.name,
            rows = open.entries.len(),
            "chunked response truncated by transport error"
        );
        Some(open.finish(true))
    }

    /// Drop the open series without emitting it.
    pub fn abandon(&mut self) {
        self.state = ReassemblerState::Done;
        if let Some(open) = self.open.take() {
            tracing::debug!(series = %open.key.name, rows = open.entries.len(), "discarding open series");
        }
    }

    fn fail_statement(
        &mut self,
        statement_id: usize,
        error: StatementError,
        events: &mut Vec<ChunkEvent>,
    ) {
        tracing::debug!(statement_id, error = %error, "statement failed in chunked response");
        if self
            .open
            .as_ref()
            .is_some_and(|open| open.statement_id == statement_id)
        {
            self.open = None;
        }
        self.failed.insert(statement_id);
        events.push(ChunkEvent::StatementError {
            statement_id,
            error,
        });
    }
}

/// Split a newline-delimited stream of JSON documents into chunks.
pub fn decode_chunks<R>(reader: R) -> impl Stream<Item = Result<RawResponse>> + Send
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(reader).lines();
    stream! {
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match line.parse::<RawResponse>() {
                        Ok(chunk) => yield Ok(chunk),
                        Err(e) => {
                            yield Err(e);
                            break;
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    yield Err(Error::Io(e));
                    break;
                }
            }
        }
    }
}

/// Incrementally reassemble a stream of chunks.
///
/// Series are yielded as soon as a boundary proves them complete, so callers
/// can consume early series while later chunks are still in flight.
///
/// Statement errors are yielded as `Err(Error::Statement { .. })` and the
/// stream continues with sibling statements. Any other error ends the
/// stream. If the chunk source fails after some rows of a series arrived,
/// that series is flushed marked partial before the error is yielded.
///
/// Cancelling `cancel` stops consumption, discards the open series and ends
/// the stream with `Err(Error::Cancelled)`.
pub fn reassemble<S>(
    chunks: S,
    precision: TimePrecision,
    cancel: CancellationToken,
) -> Pin<Box<dyn Stream<Item = Result<StreamedSeries>> + Send>>
where
    S: Stream<Item = Result<RawResponse>> + Send + 'static,
{
    let s = stream! {
        let mut chunks = Box::pin(chunks);
        let mut reassembler = ChunkReassembler::new(precision);

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                next = chunks.next() => Some(next),
            };
            let Some(next) = next else {
                reassembler.abandon();
                yield Err(Error::Cancelled);
                break;
            };

            match next {
                Some(Ok(chunk)) => match reassembler.push(chunk) {
                    Ok(events) => {
                        for event in events {
                            match event {
                                ChunkEvent::Series(series) => yield Ok(series),
                                ChunkEvent::StatementError { statement_id, error } => {
                                    yield Err(Error::Statement { statement_id, source: error });
                                }
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                },
                Some(Err(e)) => {
                    if let Some(series) = reassembler.finish_truncated() {
                        yield Ok(series);
                    }
                    yield Err(e);
                    break;
                }
                None => {
                    if let Some(series) = reassembler.finish() {
                        yield Ok(series);
                    }
                    break;
                }
            }
        }
    };

    Box::pin(s)
}

/// Reassemble a whole chunked response before returning it.
///
/// Statements are returned in order of first appearance; statement errors are
/// recorded on their statements. If the chunk source fails mid-stream, the
/// rows received so far are kept and the interrupted series is marked
/// partial, which in turn marks its statement partial. Request-level errors
/// and cancellation are returned as errors.
pub async fn collect_chunked<S>(
    chunks: S,
    precision: TimePrecision,
    cancel: CancellationToken,
) -> Result<Vec<Statement>>
where
    S: Stream<Item = Result<RawResponse>> + Send,
{
    let mut chunks = Box::pin(chunks);
    let mut reassembler = ChunkReassembler::new(precision);
    let mut collector = StatementCollector::default();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                reassembler.abandon();
                return Err(Error::Cancelled);
            }
            next = chunks.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                for event in reassembler.push(chunk)? {
                    collector.add(event);
                }
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "chunked response interrupted, keeping rows received so far");
                if let Some(series) = reassembler.finish_truncated() {
                    collector.add(ChunkEvent::Series(series));
                }
                return Ok(collector.into_statements(reassembler.statement_order()));
            }
            None => {
                if let Some(series) = reassembler.finish() {
                    collector.add(ChunkEvent::Series(series));
                }
                return Ok(collector.into_statements(reassembler.statement_order()));
            }
        }
    }
}

/// Groups reassembler output into statements.
#[derive(Default)]
struct StatementCollector {
    statements: HashMap<usize, Statement>,
}

impl StatementCollector {
    fn entry(&mut self, statement_id: usize) -> &mut Statement {
        self.statements
            .entry(statement_id)
            .or_insert_with(|| Statement {
                statement_id,
                ..Default::default()
            })
    }

    fn add(&mut self, event: ChunkEvent) {
        match event {
            ChunkEvent::Series(streamed) => {
                let statement = self.entry(streamed.statement_id);
                statement.partial |= streamed.series.partial;
                statement.series.push(streamed.series);
            }
            ChunkEvent::StatementError {
                statement_id,
                error,
            } => {
                let statement = self.entry(statement_id);
                statement.series.clear();
                statement.error = Some(error);
            }
        }
    }

    /// Statements in `order`; ids that produced nothing become empty statements.
    fn into_statements(mut self, order: &[usize]) -> Vec<Statement> {
        order
            .iter()
            .map(|&statement_id| {
                let mut statement = self.statements.remove(&statement_id).unwrap_or(Statement {
                    statement_id,
                    ..Default::default()
                });
                if statement.partial {
                    for series in &mut statement.series {
                        series.partial = true;
                    }
                }
                statement
            })
            .collect()
    }
}
