//! FTP client against a scripted in-process server

use std::collections::{BTreeMap, BTreeSet};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

use urio_core::{Connections, Dispatcher, Error, Registry, WriteMode};

#[derive(Default)]
struct State {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    /// Refuse RNTO onto an existing file
    no_clobber: bool,
}

impl State {
    fn dir_exists(&self, dir: &str) -> bool {
        let dir = dir.trim_end_matches('/');
        if dir.is_empty() || self.dirs.contains(dir) {
            return true;
        }
        let prefix = format!("{dir}/");
        self.files.keys().any(|k| k.starts_with(&prefix))
    }

    fn children(&self, dir: &str) -> Vec<(String, Option<usize>)> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        let sub_dirs = self.dirs.iter().map(|d| (d.clone(), None::<usize>));
        let files = self.files.iter().map(|(k, v)| (k.clone(), Some(v.len())));
        for (path, size) in files.chain(sub_dirs.map(|(d, _)| (format!("{d}/"), None))) {
            let Some(rest) = path.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((child, _)) if !child.is_empty() => {
                    if seen.insert(child.to_string()) {
                        out.push((child.to_string(), None));
                    }
                }
                Some(_) => {}
                None => out.push((rest.to_string(), size)),
            }
        }
        out
    }
}

struct FakeFtp {
    port: u16,
    state: Arc<Mutex<State>>,
}

impl FakeFtp {
    fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(Mutex::new(State::default()));
        let shared = Arc::clone(&state);
        thread::spawn(move || {
            for conn in listener.incoming() {
                let Ok(conn) = conn else { return };
                let state = Arc::clone(&shared);
                thread::spawn(move || {
                    let _ = serve(conn, state);
                });
            }
        });
        Self { port, state }
    }

    fn uri(&self, path: &str) -> String {
        format!("ftp://tester:pw@127.0.0.1:{}{}", self.port, path)
    }
}

fn reply(w: &mut TcpStream, line: &str) -> std::io::Result<()> {
    w.write_all(format!("{line}\r\n").as_bytes())
}

fn serve(ctrl: TcpStream, state: Arc<Mutex<State>>) -> std::io::Result<()> {
    let mut reader = BufReader::new(ctrl.try_clone()?);
    let mut w = ctrl;
    let mut pasv: Option<TcpListener> = None;
    let mut cwd = String::from("/");
    let mut rename_from: Option<String> = None;
    reply(&mut w, "220 fake ftp ready")?;

    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(());
        }
        let line = line.trim_end();
        let (cmd, arg) = line.split_once(' ').unwrap_or((line, ""));

        match cmd.to_ascii_uppercase().as_str() {
            "USER" if arg == "intruder" => reply(&mut w, "530 not allowed")?,
            "USER" => reply(&mut w, "331 password required")?,
            "PASS" => reply(&mut w, "230 logged in")?,
            "TYPE" => reply(&mut w, "200 type set")?,
            "PASV" => {
                let listener = TcpListener::bind("127.0.0.1:0")?;
                let port = listener.local_addr()?.port();
                pasv = Some(listener);
                reply(
                    &mut w,
                    &format!("227 Entering Passive Mode (127,0,0,1,{},{})", port / 256, port % 256),
                )?;
            }
            "LIST" | "NLST" => {
                let (mut data, _) = pasv.take().unwrap().accept()?;
                let lines = {
                    let state = state.lock().unwrap();
                    if !state.dir_exists(arg) {
                        None
                    } else {
                        Some(state.children(arg))
                    }
                };
                match lines {
                    None => {
                        drop(data);
                        reply(&mut w, "550 no such directory")?;
                    }
                    Some(children) => {
                        reply(&mut w, "150 here it comes")?;
                        for (name, size) in children {
                            let line = match (cmd, size) {
                                ("NLST", _) => name,
                                (_, Some(size)) => format!(
                                    "-rw-r--r--    1 owner    group    {size:>8} Jan 01  2024 {name}"
                                ),
                                (_, None) => format!(
                                    "drwxr-xr-x    2 owner    group        4096 Jan 01  2024 {name}"
                                ),
                            };
                            let _ = data.write_all(format!("{line}\r\n").as_bytes());
                        }
                        drop(data);
                        reply(&mut w, "226 done")?;
                    }
                }
            }
            "RETR" => {
                let (mut data, _) = pasv.take().unwrap().accept()?;
                let content = state.lock().unwrap().files.get(arg).cloned();
                match content {
                    None => {
                        drop(data);
                        reply(&mut w, "550 no such file")?;
                    }
                    Some(content) => {
                        reply(&mut w, "150 sending")?;
                        let _ = data.write_all(&content);
                        drop(data);
                        reply(&mut w, "226 done")?;
                    }
                }
            }
            "STOR" | "APPE" => {
                let (mut data, _) = pasv.take().unwrap().accept()?;
                reply(&mut w, "150 ready")?;
                let mut content = Vec::new();
                data.read_to_end(&mut content)?;
                {
                    let mut state = state.lock().unwrap();
                    let entry = state.files.entry(arg.to_string()).or_default();
                    if cmd.eq_ignore_ascii_case("STOR") {
                        entry.clear();
                    }
                    entry.extend_from_slice(&content);
                }
                reply(&mut w, "226 stored")?;
            }
            "SIZE" => {
                let size = state.lock().unwrap().files.get(arg).map(Vec::len);
                match size {
                    Some(size) => reply(&mut w, &format!("213 {size}"))?,
                    None => reply(&mut w, "550 not a plain file")?,
                }
            }
            "PWD" => reply(&mut w, &format!("257 \"{cwd}\" is the current directory"))?,
            "CWD" => {
                let is_dir = {
                    let state = state.lock().unwrap();
                    !state.files.contains_key(arg) && state.dir_exists(arg)
                };
                if is_dir {
                    cwd = arg.to_string();
                    reply(&mut w, "250 directory changed")?;
                } else {
                    reply(&mut w, "550 no such directory")?;
                }
            }
            "RNFR" => {
                if state.lock().unwrap().files.contains_key(arg) {
                    rename_from = Some(arg.to_string());
                    reply(&mut w, "350 ready for destination")?;
                } else {
                    reply(&mut w, "550 no such file")?;
                }
            }
            "RNTO" => {
                let mut state = state.lock().unwrap();
                match rename_from.take() {
                    None => reply(&mut w, "503 RNFR first")?,
                    Some(_) if state.no_clobber && state.files.contains_key(arg) => {
                        reply(&mut w, "553 file exists")?
                    }
                    Some(from) => {
                        let content = state.files.remove(&from).unwrap_or_default();
                        state.files.insert(arg.to_string(), content);
                        reply(&mut w, "250 renamed")?;
                    }
                }
            }
            "DELE" => {
                let removed = state.lock().unwrap().files.remove(arg).is_some();
                reply(&mut w, if removed { "250 deleted" } else { "550 no such file" })?;
            }
            "RMD" => {
                let removed = state.lock().unwrap().dirs.remove(arg.trim_end_matches('/'));
                reply(&mut w, if removed { "250 removed" } else { "550 no such directory" })?;
            }
            "QUIT" => {
                reply(&mut w, "221 bye")?;
                return Ok(());
            }
            _ => reply(&mut w, "502 not implemented")?,
        }
    }
}

fn dispatcher() -> Dispatcher {
    let registry = Arc::new(Registry::new());
    urio_ftp::register(&registry);
    Dispatcher::new(registry, Connections::new())
}

#[test]
fn put_then_get() {
    let server = FakeFtp::start();
    let d = dispatcher();

    d.put(server.uri("/dir/a.csv"), b"1,2,3\n").unwrap();
    assert_eq!(d.get(server.uri("/dir/a.csv")).unwrap(), b"1,2,3\n");
    assert_eq!(
        server.state.lock().unwrap().files.get("/dir/a.csv").unwrap(),
        b"1,2,3\n"
    );
}

#[test]
fn append_extends_file() {
    let server = FakeFtp::start();
    let d = dispatcher();

    d.put(server.uri("/log.txt"), b"one\n").unwrap();
    d.append(server.uri("/log.txt"), b"two\n").unwrap();
    assert_eq!(d.get(server.uri("/log.txt")).unwrap(), b"one\ntwo\n");
}

#[test]
fn list_is_relative_and_restartable() {
    let server = FakeFtp::start();
    {
        let mut state = server.state.lock().unwrap();
        state.files.insert("/dir/a.csv".into(), b"a".to_vec());
        state.files.insert("/dir/b.csv".into(), b"bb".to_vec());
        state.files.insert("/dir/nested/c.csv".into(), b"c".to_vec());
        state.dirs.insert("/empty".into());
    }
    let d = dispatcher();

    let first: Vec<_> = d
        .list(server.uri("/dir/"))
        .unwrap()
        .map(|e| e.unwrap())
        .collect();
    let paths: Vec<&str> = first.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["a.csv", "b.csv", "nested/"]);
    assert_eq!(first[1].size, Some(2));

    let second: Vec<_> = d
        .list(server.uri("/dir/"))
        .unwrap()
        .map(|e| e.unwrap())
        .collect();
    assert_eq!(first, second);

    assert_eq!(d.list(server.uri("/empty/")).unwrap().count(), 0);
    assert_eq!(d.list(server.uri("/missing/")).unwrap().count(), 0);
}

#[test]
fn exists_and_remove() {
    let server = FakeFtp::start();
    server
        .state
        .lock()
        .unwrap()
        .files
        .insert("/dir/a.csv".into(), b"a".to_vec());
    let d = dispatcher();

    assert!(d.exists(server.uri("/dir/a.csv")).unwrap());
    assert!(d.exists(server.uri("/dir")).unwrap());
    assert!(!d.exists(server.uri("/nope.csv")).unwrap());

    d.remove(server.uri("/dir/a.csv")).unwrap();
    assert!(!d.exists(server.uri("/dir/a.csv")).unwrap());
    assert!(matches!(
        d.remove(server.uri("/dir/a.csv")).unwrap_err(),
        Error::NotFound { .. }
    ));
}

#[test]
fn exists_sees_empty_directory() {
    let server = FakeFtp::start();
    server.state.lock().unwrap().dirs.insert("/empty".into());
    let d = dispatcher();

    assert!(d.exists(server.uri("/empty")).unwrap());
    assert!(!d.exists(server.uri("/empty/nothing.txt")).unwrap());
}

#[test]
fn overwrite_leaves_no_staging_file() {
    let server = FakeFtp::start();
    let d = dispatcher();

    d.put(server.uri("/dir/a.csv"), b"old").unwrap();
    d.put(server.uri("/dir/a.csv"), b"new").unwrap();
    let state = server.state.lock().unwrap();
    assert_eq!(state.files.keys().collect::<Vec<_>>(), ["/dir/a.csv"]);
    assert_eq!(state.files["/dir/a.csv"], b"new");
}

#[test]
fn aborted_overwrite_keeps_original() {
    let server = FakeFtp::start();
    server
        .state
        .lock()
        .unwrap()
        .files
        .insert("/report.csv".into(), b"original".to_vec());
    let d = dispatcher();

    let client = d.client_for(server.uri("/")).unwrap();
    let mut writer = client.get_writer("/report.csv", WriteMode::Overwrite).unwrap();
    writer.write_all_bytes(b"partial").unwrap();
    writer.abort().unwrap();

    let state = server.state.lock().unwrap();
    assert_eq!(state.files.keys().collect::<Vec<_>>(), ["/report.csv"]);
    assert_eq!(state.files["/report.csv"], b"original");
}

#[test]
fn overwrite_when_server_refuses_to_clobber() {
    let server = FakeFtp::start();
    {
        let mut state = server.state.lock().unwrap();
        state.no_clobber = true;
        state.files.insert("/a.txt".into(), b"old".to_vec());
    }
    let d = dispatcher();

    d.put(server.uri("/a.txt"), b"new").unwrap();
    assert_eq!(d.get(server.uri("/a.txt")).unwrap(), b"new");
    assert_eq!(server.state.lock().unwrap().files.len(), 1);
}

#[test]
fn missing_file_is_not_found() {
    let server = FakeFtp::start();
    let d = dispatcher();
    assert!(matches!(
        d.get(server.uri("/absent.bin")).unwrap_err(),
        Error::NotFound { .. }
    ));
}

#[test]
fn one_stream_per_session() {
    let server = FakeFtp::start();
    server
        .state
        .lock()
        .unwrap()
        .files
        .insert("/a.txt".into(), b"hello".to_vec());
    let d = dispatcher();

    let client = d.client_for(server.uri("/")).unwrap();
    assert!(!client.capabilities().concurrent_streams);

    let mut first = client.get_reader("/a.txt").unwrap();
    let err = client.get_writer("/b.txt", WriteMode::Overwrite).unwrap_err();
    assert!(matches!(err, Error::Transfer { .. }));
    assert!(err.to_string().contains("session busy"));

    assert_eq!(first.read_to_end_bytes().unwrap(), b"hello");
    first.close().unwrap();

    let mut second = client.get_reader("/a.txt").unwrap();
    assert_eq!(second.read_to_end_bytes().unwrap(), b"hello");
}

#[test]
fn rejected_login_is_connection_error() {
    let server = FakeFtp::start();
    let d = dispatcher();
    let uri = format!("ftp://intruder:pw@127.0.0.1:{}/x", server.port);
    let err = d.get(uri).unwrap_err();
    assert!(matches!(err, Error::Connection { .. }));
}
