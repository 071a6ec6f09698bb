//! FTP client implementation
//!
//! Wraps a blocking `suppaftp::FtpStream`. Every transfer and every command
//! that needs the control connection first claims the client's
//! [`StreamSlot`]; a second concurrent stream fails with "session busy".

use std::io::{Read, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream};
use urio_core::{
    Capabilities, Client, ConnectionDescriptor, Entry, Error, Listable, Listing, Operation,
    ReadAdapter, ReadStream, Removable, Result, SlotGuard, StreamSlot, Target, WriteAdapter,
    WriteMode, WriteStream, staging_path,
};

use crate::listing::parse_line;

const DEFAULT_PORT: u16 = 21;
const ANONYMOUS_USER: &str = "anonymous";
const ANONYMOUS_PASSWORD: &str = "anonymous@";

/// Reply codes meaning "no such file or directory"
const FILE_UNAVAILABLE: &[u32] = &[450, 550];

/// Logged-in control connection; sends QUIT when dropped
struct Session {
    ftp: FtpStream,
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.ftp.quit() {
            tracing::debug!(error = %e, "FTP QUIT failed");
        }
    }
}

/// FTP client owning one control connection
pub struct FtpClient {
    target: Target,
    session: Arc<Mutex<Session>>,
    slot: StreamSlot,
    io_timeout: Duration,
}

impl FtpClient {
    /// Connect and log in
    pub fn connect(descriptor: &ConnectionDescriptor) -> Result<Self> {
        let uri = &descriptor.uri;
        let target = descriptor.target();
        let host = uri.host().ok_or_else(|| Error::MalformedUri {
            uri: uri.redacted(),
            reason: "missing host".into(),
        })?;
        let addr = resolve_addr(&target, host, uri.port().unwrap_or(DEFAULT_PORT))?;

        let mut ftp = FtpStream::connect_timeout(addr, descriptor.connect_timeout())
            .map_err(|e| connect_error(&target, e))?;

        let io_timeout = descriptor.io_timeout();
        let stream = ftp.get_ref();
        stream
            .set_read_timeout(Some(io_timeout))
            .and_then(|_| stream.set_write_timeout(Some(io_timeout)))
            .map_err(|e| target.connection(Operation::Connect, e))?;

        let user = uri.username().unwrap_or(ANONYMOUS_USER);
        let password = uri
            .password()
            .map(|p| p.expose())
            .unwrap_or(ANONYMOUS_PASSWORD);
        ftp.login(user, password)
            .map_err(|e| target.connection(Operation::Connect, format!("login failed: {e}")))?;
        ftp.transfer_type(FileType::Binary)
            .map_err(|e| target.connection(Operation::Connect, e))?;

        tracing::debug!(target = %target, "Connected to FTP server");

        Ok(Self {
            target,
            session: Arc::new(Mutex::new(Session { ftp })),
            slot: StreamSlot::new(),
            io_timeout,
        })
    }

    fn claim(&self, operation: Operation) -> Result<SlotGuard> {
        self.slot.acquire(&self.target, operation)
    }

    fn map_err(&self, operation: Operation, path: &str, err: FtpError) -> Error {
        map_ftp_error(&self.target, operation, path, err)
    }
}

impl Client for FtpClient {
    fn target(&self) -> &Target {
        &self.target
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            concurrent_streams: false,
            ..Capabilities::all()
        }
    }

    fn get_reader(&self, path: &str) -> Result<ReadStream> {
        let guard = self.claim(Operation::Open)?;
        let data = self
            .session
            .lock()
            .ftp
            .retr_as_stream(path)
            .map_err(|e| self.map_err(Operation::Open, path, e))?;
        data.get_ref()
            .set_read_timeout(Some(self.io_timeout))
            .map_err(|e| self.target.io(Operation::Open, path, e))?;

        let adapter = FtpReader {
            session: Arc::clone(&self.session),
            data: Some(Box::new(data)),
            eof: false,
            target: self.target.clone(),
            path: path.to_string(),
            _guard: guard,
        };
        Ok(ReadStream::new(self.target.clone(), path, adapter))
    }

    fn get_writer(&self, path: &str, mode: WriteMode) -> Result<WriteStream> {
        let guard = self.claim(mode.operation())?;
        let staging = match mode {
            WriteMode::Overwrite => Some(staging_path(path)),
            WriteMode::Append => None,
        };
        let data = {
            let mut session = self.session.lock();
            match &staging {
                Some(staging) => session.ftp.put_with_stream(staging),
                None => session.ftp.append_with_stream(path),
            }
        }
        .map_err(|e| self.map_err(mode.operation(), path, e))?;
        data.get_ref()
            .set_write_timeout(Some(self.io_timeout))
            .map_err(|e| self.target.io(mode.operation(), path, e))?;

        let adapter = FtpWriter {
            session: Arc::clone(&self.session),
            data: Some(Box::new(data)),
            mode,
            staging,
            target: self.target.clone(),
            path: path.to_string(),
            _guard: guard,
        };
        Ok(WriteStream::new(self.target.clone(), path, adapter))
    }

    fn exists(&self, path: &str) -> Result<bool> {
        let _guard = self.claim(Operation::Exists)?;
        let mut session = self.session.lock();

        match session.ftp.size(path) {
            Ok(_) => return Ok(true),
            Err(e) if !is_unavailable(&e) => {
                return Err(self.map_err(Operation::Exists, path, e));
            }
            Err(_) => {}
        }

        // SIZE is refused for directories; an empty one only answers CWD
        if let Ok(previous) = session.ftp.pwd() {
            if session.ftp.cwd(path).is_ok() {
                if let Err(e) = session.ftp.cwd(&previous) {
                    tracing::debug!(target = %self.target, dir = %previous, error = %e, "Could not restore working directory");
                }
                return Ok(true);
            }
        }

        match session.ftp.nlst(Some(path)) {
            Ok(names) => Ok(!names.is_empty()),
            Err(e) if is_unavailable(&e) => Ok(false),
            Err(e) => Err(self.map_err(Operation::Exists, path, e)),
        }
    }

    fn as_listable(&self) -> Option<&dyn Listable> {
        Some(self)
    }

    fn as_removable(&self) -> Option<&dyn Removable> {
        Some(self)
    }
}

impl Listable for FtpClient {
    fn list(&self, prefix: &str) -> Result<Listing> {
        let _guard = self.claim(Operation::List)?;
        let dir = if prefix.is_empty() { "/" } else { prefix };

        let lines = match self.session.lock().ftp.list(Some(dir)) {
            Ok(lines) => lines,
            Err(e) if is_unavailable(&e) => Vec::new(),
            Err(e) => return Err(self.map_err(Operation::List, prefix, e)),
        };

        let entries: Vec<Entry> = lines.iter().filter_map(|line| parse_line(line)).collect();
        tracing::debug!(target = %self.target, dir, count = entries.len(), "Listed directory");
        Ok(Box::new(entries.into_iter().map(Ok)))
    }
}

impl Removable for FtpClient {
    fn remove(&self, path: &str) -> Result<()> {
        let _guard = self.claim(Operation::Remove)?;
        let mut session = self.session.lock();

        match session.ftp.rm(path) {
            Ok(()) => Ok(()),
            Err(e) if is_unavailable(&e) => session
                .ftp
                .rmdir(path)
                .map_err(|e| self.map_err(Operation::Remove, path, e)),
            Err(e) => Err(self.map_err(Operation::Remove, path, e)),
        }
    }
}

struct FtpReader {
    session: Arc<Mutex<Session>>,
    data: Option<Box<dyn Read + Send>>,
    eof: bool,
    target: Target,
    path: String,
    _guard: SlotGuard,
}

impl ReadAdapter for FtpReader {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Some(data) = self.data.as_mut() else {
            return Ok(0);
        };
        let n = data
            .read(buf)
            .map_err(|e| self.target.io(Operation::Read, &self.path, e))?;
        if n == 0 && !buf.is_empty() {
            self.eof = true;
        }
        Ok(n)
    }

    fn release(&mut self) -> Result<()> {
        let Some(data) = self.data.take() else {
            return Ok(());
        };
        let result = self.session.lock().ftp.finalize_retr_stream(data);
        match result {
            Ok(()) => Ok(()),
            // Closing early makes the server report an aborted transfer
            Err(e) if !self.eof => {
                tracing::debug!(target = %self.target, path = %self.path, error = %e, "Transfer aborted before end of file");
                Ok(())
            }
            Err(e) => Err(map_ftp_error(&self.target, Operation::Close, &self.path, e)),
        }
    }
}

struct FtpWriter {
    session: Arc<Mutex<Session>>,
    data: Option<Box<dyn Write + Send>>,
    mode: WriteMode,
    /// Temporary name an overwrite is uploaded under
    staging: Option<String>,
    target: Target,
    path: String,
    _guard: SlotGuard,
}

impl FtpWriter {
    fn data(&mut self) -> Result<&mut Box<dyn Write + Send>> {
        let op = self.mode.operation();
        self.data
            .as_mut()
            .ok_or_else(|| self.target.transfer(op, "data connection already closed"))
    }

    fn discard_staging(&mut self, session: &mut Session) {
        if let Some(staging) = self.staging.take() {
            if let Err(e) = session.ftp.rm(&staging) {
                tracing::debug!(target = %self.target, path = %staging, error = %e, "Could not remove staged upload");
            }
        }
    }
}

impl WriteAdapter for FtpWriter {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let op = self.mode.operation();
        let result = self.data()?.write(buf);
        result.map_err(|e| self.target.io(op, &self.path, e))
    }

    fn flush(&mut self) -> Result<()> {
        let result = self.data()?.flush();
        result.map_err(|e| self.target.io(Operation::Flush, &self.path, e))
    }

    fn commit(&mut self) -> Result<()> {
        let Some(data) = self.data.take() else {
            return Ok(());
        };
        let session = Arc::clone(&self.session);
        let mut session = session.lock();
        if let Err(e) = session.ftp.finalize_put_stream(data) {
            self.discard_staging(&mut session);
            return Err(map_ftp_error(&self.target, Operation::Close, &self.path, e));
        }

        let Some(staging) = self.staging.clone() else {
            return Ok(());
        };
        let renamed = match session.ftp.rename(&staging, &self.path) {
            // Some servers refuse to rename over an existing file
            Err(e) if is_unavailable(&e) || reply_code(&e) == Some(553) => session
                .ftp
                .rm(&self.path)
                .and_then(|_| session.ftp.rename(&staging, &self.path)),
            other => other,
        };
        match renamed {
            Ok(()) => {
                self.staging = None;
                tracing::debug!(target = %self.target, path = %self.path, "Replaced file with staged upload");
                Ok(())
            }
            Err(e) => {
                self.discard_staging(&mut session);
                Err(self.target.transfer(
                    Operation::Close,
                    format!("could not move upload into place: {e}"),
                ))
            }
        }
    }

    fn abort(&mut self) -> Result<()> {
        let Some(data) = self.data.take() else {
            return Ok(());
        };
        let session = Arc::clone(&self.session);
        let mut session = session.lock();
        if let Err(e) = session.ftp.finalize_put_stream(data) {
            tracing::debug!(target = %self.target, path = %self.path, error = %e, "Finalizing aborted upload failed");
        }
        match self.mode {
            WriteMode::Overwrite => self.discard_staging(&mut session),
            WriteMode::Append => {
                tracing::warn!(target = %self.target, path = %self.path, "Aborted append may have left partial data");
            }
        }
        Ok(())
    }
}

fn resolve_addr(target: &Target, host: &str, port: u16) -> Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| target.connection(Operation::Connect, e))?
        .next()
        .ok_or_else(|| target.connection(Operation::Connect, format!("{host} did not resolve")))
}

fn connect_error(target: &Target, err: FtpError) -> Error {
    match err {
        FtpError::ConnectionError(e)
            if matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            ) =>
        {
            target.timeout(Operation::Connect, e)
        }
        other => target.connection(Operation::Connect, other),
    }
}

fn reply_code(err: &FtpError) -> Option<u32> {
    match err {
        FtpError::UnexpectedResponse(response) => Some(response.status.code()),
        _ => None,
    }
}

fn is_unavailable(err: &FtpError) -> bool {
    reply_code(err).is_some_and(|code| FILE_UNAVAILABLE.contains(&code))
}

fn map_ftp_error(target: &Target, operation: Operation, path: &str, err: FtpError) -> Error {
    if is_unavailable(&err) {
        return target.not_found(operation, path);
    }
    match err {
        FtpError::ConnectionError(e) => target.io(operation, path, e),
        other if reply_code(&other) == Some(530) => target.connection(operation, other),
        other => target.transfer(operation, other),
    }
}
