//! PostgreSQL client implementation
//!
//! Reads stream `COPY ... TO STDOUT`; writes stream `COPY ... FROM STDIN`
//! inside a transaction that commits when the writer closes and rolls back
//! when it is aborted. An overwrite truncates the table in the same
//! transaction. The connection carries one COPY at a time.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, Bytes};
use futures::{SinkExt, StreamExt};
use tokio::task::JoinHandle;
use tokio_postgres::{CopyInSink, CopyOutStream, NoTls};
use urio_core::{
    BlockingRuntime, Capabilities, Client, ConnectionDescriptor, Entry, Error, Listable, Listing,
    Operation, ReadAdapter, ReadStream, Result, SlotGuard, StreamSlot, Target, WriteAdapter,
    WriteMode, WriteStream,
};

use crate::copy::{
    CopyOptions, CopySource, copy_in_statement, copy_out_statement, quote_relation,
    relation_parts, split_path,
};
use crate::error::classify;

const DEFAULT_PORT: u16 = 5432;
const DEFAULT_USER: &str = "postgres";
const APPLICATION_NAME: &str = "urio";

const TABLE_EXISTS: &str = "SELECT EXISTS (
    SELECT 1 FROM information_schema.tables
    WHERE table_schema::text = COALESCE($1::text, current_schema()::text)
      AND table_name::text = $2::text
)";

const LIST_TABLES: &str = "SELECT table_schema::text, table_name::text
FROM information_schema.tables
WHERE table_schema NOT IN ('pg_catalog', 'information_schema')
  AND ($1::text IS NULL OR table_schema::text = $1::text)
ORDER BY 1, 2";

/// Connected client plus the task driving its socket
struct Session {
    client: tokio_postgres::Client,
    driver: JoinHandle<()>,
    runtime: BlockingRuntime,
}

impl Session {
    fn run<F: Future>(
        &self,
        target: &Target,
        operation: Operation,
        timeout: Duration,
        future: F,
    ) -> Result<F::Output> {
        self.runtime
            .block_on_timeout(timeout, future)
            .map_err(|_| target.timeout(operation, format!("no reply within {timeout:?}")))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// PostgreSQL client bound to one database
pub struct PgClient {
    target: Target,
    database: String,
    options: CopyOptions,
    session: Arc<Session>,
    slot: StreamSlot,
    io_timeout: Duration,
}

impl PgClient {
    /// Connect to the database named by the first path segment
    pub fn connect(descriptor: &ConnectionDescriptor) -> Result<Self> {
        let uri = &descriptor.uri;
        let target = descriptor.target();
        let malformed = |reason: &str| Error::MalformedUri {
            uri: uri.redacted(),
            reason: reason.into(),
        };
        let host = uri.host().ok_or_else(|| malformed("missing host"))?;
        let (database, _) = split_path(uri.path());
        if database.is_empty() {
            return Err(malformed("missing database name"));
        }
        let options = CopyOptions::from_uri(uri)?;

        let mut config = tokio_postgres::Config::new();
        config
            .host(host)
            .port(uri.port().unwrap_or(DEFAULT_PORT))
            .dbname(database)
            .user(uri.username().unwrap_or(DEFAULT_USER))
            .application_name(APPLICATION_NAME)
            .connect_timeout(descriptor.connect_timeout());
        if let Some(password) = uri.password() {
            config.password(password.expose());
        }

        let runtime =
            BlockingRuntime::new().map_err(|e| target.connection(Operation::Connect, e))?;
        let connect_timeout = descriptor.connect_timeout();
        let (client, connection) = runtime
            .block_on_timeout(connect_timeout, config.connect(NoTls))
            .map_err(|_| {
                target.timeout(
                    Operation::Connect,
                    format!("no connection within {connect_timeout:?}"),
                )
            })?
            .map_err(|e| target.connection(Operation::Connect, e))?;

        let driver_target = target.clone();
        let driver = runtime.spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!(target = %driver_target, error = %e, "PostgreSQL connection closed");
            }
        });

        tracing::debug!(target = %target, database, "Connected to PostgreSQL");

        Ok(Self {
            target,
            database: database.to_string(),
            options,
            session: Arc::new(Session {
                client,
                driver,
                runtime,
            }),
            slot: StreamSlot::new(),
            io_timeout: descriptor.io_timeout(),
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    fn claim(&self, operation: Operation) -> Result<SlotGuard> {
        self.slot.acquire(&self.target, operation)
    }

    /// Relation part of `path`, checked against the connected database
    fn relation<'p>(&self, operation: Operation, path: &'p str) -> Result<Option<&'p str>> {
        let (database, relation) = split_path(path);
        if database != self.database {
            return Err(self.target.transfer(
                operation,
                format!(
                    "{path} is outside database '{}' of this connection",
                    self.database
                ),
            ));
        }
        Ok(relation)
    }

    fn quoted(&self, operation: Operation, relation: &str) -> Result<String> {
        quote_relation(relation).ok_or_else(|| {
            self.target
                .transfer(operation, format!("invalid relation name '{relation}'"))
        })
    }

    fn run<T>(
        &self,
        operation: Operation,
        path: &str,
        future: impl Future<Output = std::result::Result<T, tokio_postgres::Error>>,
    ) -> Result<T> {
        self.session
            .run(&self.target, operation, self.io_timeout, future)?
            .map_err(|e| classify(&self.target, operation, path, e))
    }

    fn rollback(&self) {
        let result = self.session.run(
            &self.target,
            Operation::Close,
            self.io_timeout,
            self.session.client.batch_execute("ROLLBACK"),
        );
        if !matches!(result, Ok(Ok(()))) {
            tracing::debug!(target = %self.target, "ROLLBACK failed");
        }
    }
}

impl Client for PgClient {
    fn target(&self) -> &Target {
        &self.target
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            remove: false,
            concurrent_streams: false,
            ..Capabilities::all()
        }
    }

    fn get_reader(&self, path: &str) -> Result<ReadStream> {
        let relation = self.relation(Operation::Open, path)?;
        let source = match (&self.options.query, relation) {
            (Some(query), _) => CopySource::Query(query.clone()),
            (None, Some(relation)) => CopySource::Relation(self.quoted(Operation::Open, relation)?),
            (None, None) => {
                return Err(self
                    .target
                    .transfer(Operation::Open, "a relation or query= is required"));
            }
        };
        let statement = copy_out_statement(&source, &self.options);
        let guard = self.claim(Operation::Open)?;

        tracing::debug!(target = %self.target, statement = %statement, "Starting COPY TO STDOUT");
        let stream = self.run(
            Operation::Open,
            path,
            self.session.client.copy_out(statement.as_str()),
        )?;

        let adapter = CopyReader {
            session: Arc::clone(&self.session),
            stream: Some(Box::pin(stream)),
            pending: Bytes::new(),
            target: self.target.clone(),
            path: path.to_string(),
            io_timeout: self.io_timeout,
            _guard: guard,
        };
        Ok(ReadStream::new(self.target.clone(), path, adapter))
    }

    fn get_writer(&self, path: &str, mode: WriteMode) -> Result<WriteStream> {
        let operation = mode.operation();
        let relation = self.relation(operation, path)?.ok_or_else(|| {
            self.target
                .transfer(operation, "writing requires a relation")
        })?;
        let relation = self.quoted(operation, relation)?;
        let statement = copy_in_statement(&relation, &self.options);
        let guard = self.claim(operation)?;

        self.run(operation, path, self.session.client.batch_execute("BEGIN"))?;
        let client = &self.session.client;
        let started = self.run(operation, path, async {
            if mode == WriteMode::Overwrite {
                client
                    .batch_execute(&format!("TRUNCATE {relation}"))
                    .await?;
            }
            client.copy_in::<_, Bytes>(statement.as_str()).await
        });
        let sink = match started {
            Ok(sink) => sink,
            Err(e) => {
                self.rollback();
                return Err(e);
            }
        };

        tracing::debug!(target = %self.target, statement = %statement, "Started COPY FROM STDIN");
        let adapter = CopyWriter {
            session: Arc::clone(&self.session),
            sink: Some(Box::pin(sink)),
            operation,
            target: self.target.clone(),
            path: path.to_string(),
            io_timeout: self.io_timeout,
            _guard: guard,
        };
        Ok(WriteStream::new(self.target.clone(), path, adapter))
    }

    fn exists(&self, path: &str) -> Result<bool> {
        let Some(relation) = self.relation(Operation::Exists, path)? else {
            return Ok(true);
        };
        let _guard = self.claim(Operation::Exists)?;
        let (schema, table) = relation_parts(relation);
        let row = self.run(
            Operation::Exists,
            path,
            self.session
                .client
                .query_one(TABLE_EXISTS, &[&schema, &table]),
        )?;
        row.try_get::<_, bool>(0)
            .map_err(|e| classify(&self.target, Operation::Exists, path, e))
    }

    fn as_listable(&self) -> Option<&dyn Listable> {
        Some(self)
    }
}

impl Listable for PgClient {
    /// Tables of the database (`schema.table`) or of one schema (`table`)
    fn list(&self, prefix: &str) -> Result<Listing> {
        let schema = self.relation(Operation::List, prefix)?;
        let _guard = self.claim(Operation::List)?;
        let rows = self.run(
            Operation::List,
            prefix,
            self.session.client.query(LIST_TABLES, &[&schema]),
        )?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let table_schema: String = row
                .try_get(0)
                .map_err(|e| classify(&self.target, Operation::List, prefix, e))?;
            let table: String = row
                .try_get(1)
                .map_err(|e| classify(&self.target, Operation::List, prefix, e))?;
            let path = match schema {
                Some(_) => table,
                None => format!("{table_schema}.{table}"),
            };
            entries.push(Entry {
                path,
                is_dir: false,
                size: None,
                last_modified: None,
            });
        }
        Ok(Box::new(entries.into_iter().map(Ok)))
    }
}

struct CopyReader {
    session: Arc<Session>,
    stream: Option<Pin<Box<CopyOutStream>>>,
    pending: Bytes,
    target: Target,
    path: String,
    io_timeout: Duration,
    _guard: SlotGuard,
}

impl ReadAdapter for CopyReader {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        while self.pending.is_empty() {
            let Some(stream) = self.stream.as_mut() else {
                return Ok(0);
            };
            let next = self
                .session
                .run(&self.target, Operation::Read, self.io_timeout, stream.next())?;
            match next {
                Some(Ok(chunk)) => self.pending = chunk,
                Some(Err(e)) => {
                    self.stream = None;
                    return Err(classify(&self.target, Operation::Read, &self.path, e));
                }
                None => {
                    self.stream = None;
                    return Ok(0);
                }
            }
        }

        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        Ok(n)
    }

    fn release(&mut self) -> Result<()> {
        if self.stream.take().is_some() {
            tracing::debug!(target = %self.target, path = %self.path, "COPY TO STDOUT closed before completion");
        }
        self.pending.clear();
        Ok(())
    }
}

struct CopyWriter {
    session: Arc<Session>,
    sink: Option<Pin<Box<CopyInSink<Bytes>>>>,
    operation: Operation,
    target: Target,
    path: String,
    io_timeout: Duration,
    _guard: SlotGuard,
}

impl CopyWriter {
    fn rollback(&self) -> Result<()> {
        self.session
            .run(
                &self.target,
                Operation::Close,
                self.io_timeout,
                self.session.client.batch_execute("ROLLBACK"),
            )?
            .map_err(|e| classify(&self.target, Operation::Close, &self.path, e))
    }
}

impl WriteAdapter for CopyWriter {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let operation = self.operation;
        let Some(sink) = self.sink.as_mut() else {
            return Err(self.target.transfer(operation, "COPY already finished"));
        };
        self.session
            .run(
                &self.target,
                operation,
                self.io_timeout,
                sink.send(Bytes::copy_from_slice(buf)),
            )?
            .map_err(|e| classify(&self.target, operation, &self.path, e))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<()> {
        let Some(sink) = self.sink.as_mut() else {
            return Ok(());
        };
        self.session
            .run(&self.target, Operation::Flush, self.io_timeout, sink.flush())?
            .map_err(|e| classify(&self.target, Operation::Flush, &self.path, e))
    }

    fn commit(&mut self) -> Result<()> {
        let Some(mut sink) = self.sink.take() else {
            return Ok(());
        };
        let client = &self.session.client;
        let rows = self
            .session
            .run(&self.target, Operation::Close, self.io_timeout, async {
                let rows = sink.as_mut().finish().await?;
                client.batch_execute("COMMIT").await?;
                Ok::<_, tokio_postgres::Error>(rows)
            })?
            .map_err(|e| classify(&self.target, Operation::Close, &self.path, e))?;
        tracing::debug!(target = %self.target, path = %self.path, rows, "COPY committed");
        Ok(())
    }

    fn abort(&mut self) -> Result<()> {
        // Dropping an unfinished sink sends CopyFail
        drop(self.sink.take());
        self.rollback()
    }
}
