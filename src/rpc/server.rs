//! Dispatches decoded RPC requests to the host filesystem (spec §4.D).
//!
//! Every `do_*` operation is a pure function of (request, tables, mount
//! root) with a side effect on the host filesystem. All I/O errors are
//! caught here and converted to the wire's negative-errno convention;
//! `RpcServer` never returns a `MprError` — host filesystem failures are a
//! `HostFs` condition that is recovered locally (spec §7).

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::rpc::codec::{Reply, Request, Stat};

pub struct OpenFile {
    file: File,
    is_text: bool,
}

struct DirIter {
    base: PathBuf,
    remaining: VecDeque<String>,
}

pub struct RpcServer {
    mount_root: PathBuf,
    files: Vec<Option<OpenFile>>,
    dir_iter: Option<DirIter>,
}

fn errno_of(e: &std::io::Error) -> i32 {
    e.raw_os_error().unwrap_or(libc::EIO)
}

impl RpcServer {
    pub fn new(mount_root: impl Into<PathBuf>) -> Self {
        Self {
            mount_root: mount_root.into(),
            files: Vec::new(),
            dir_iter: None,
        }
    }

    pub fn mount_root(&self) -> &Path {
        &self.mount_root
    }

    /// Repoints the RPC server at a new host directory, e.g. when
    /// re-mounting after a soft reset. Open file descriptors from the
    /// previous root are not carried over.
    pub fn set_mount_root(&mut self, root: impl Into<PathBuf>) {
        self.mount_root = root.into();
        self.files.clear();
        self.dir_iter = None;
    }

    /// No traversal check is performed: `MountRoot + "/" + client_relative_path`,
    /// exactly as spec §3 documents as a limitation.
    fn resolve(&self, rel: &str) -> PathBuf {
        self.mount_root.join(rel.trim_start_matches('/'))
    }

    pub fn dispatch(&mut self, req: Request) -> Reply {
        match req {
            Request::Stat { path } => self.do_stat(&path),
            Request::IlistdirStart { path } => self.do_ilistdir_start(&path),
            Request::IlistdirNext => self.do_ilistdir_next(),
            Request::Open { path, mode } => self.do_open(&path, &mode),
            Request::Close { fd } => self.do_close(fd),
            Request::Read { fd, n } => self.do_read(fd, n),
            Request::Write { fd, data } => self.do_write(fd, &data),
            Request::Seek { fd, offset } => self.do_seek(fd, offset),
            Request::Remove { path } => self.do_remove(&path),
            Request::Rename { old, new } => self.do_rename(&old, &new),
        }
    }

    fn do_stat(&self, path: &str) -> Reply {
        let full = self.resolve(path);
        match std::fs::metadata(&full) {
            Ok(meta) => Reply::Stat(Ok(stat_of(&meta))),
            Err(e) => Reply::Stat(Err(errno_of(&e))),
        }
    }

    fn do_ilistdir_start(&mut self, path: &str) -> Reply {
        let full = self.resolve(path);
        let entries = std::fs::read_dir(&full)
            .map(|rd| {
                rd.filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect::<VecDeque<_>>()
            })
            .unwrap_or_default();
        self.dir_iter = Some(DirIter {
            base: full,
            remaining: entries,
        });
        Reply::IlistdirStart
    }

    fn do_ilistdir_next(&mut self) -> Reply {
        let Some(iter) = self.dir_iter.as_mut() else {
            return Reply::IlistdirNext(None);
        };
        let Some(name) = iter.remaining.pop_front() else {
            return Reply::IlistdirNext(None);
        };
        let ty = std::fs::metadata(iter.base.join(&name))
            .map(|m| mode_of(&m) & 0xC000)
            .unwrap_or(0);
        Reply::IlistdirNext(Some((name, ty)))
    }

    fn do_open(&mut self, path: &str, mode: &str) -> Reply {
        let full = self.resolve(path);
        let opts = match open_options_for(mode) {
            Some(o) => o,
            None => return Reply::Open(-(libc::EINVAL as i8)),
        };
        match opts.open(&full) {
            Ok(file) => {
                let is_text = !mode.contains('b');
                let slot = OpenFile { file, is_text };
                let fd = self.files.iter().position(|f| f.is_none());
                let fd = match fd {
                    Some(i) => {
                        self.files[i] = Some(slot);
                        i
                    }
                    None => {
                        self.files.push(Some(slot));
                        self.files.len() - 1
                    }
                };
                Reply::Open(fd as i8)
            }
            Err(e) => Reply::Open(-(errno_of(&e) as i8)),
        }
    }

    fn do_close(&mut self, fd: i8) -> Reply {
        if let Some(slot) = self.files.get_mut(fd as usize) {
            *slot = None;
        }
        Reply::Close
    }

    fn do_read(&mut self, fd: i8, n: i32) -> Reply {
        let Some(Some(of)) = self.files.get_mut(fd as usize) else {
            return Reply::Read(Vec::new());
        };
        let data = if n < 0 {
            let mut buf = Vec::new();
            of.file.read_to_end(&mut buf).map(|_| buf)
        } else {
            let mut buf = vec![0u8; n as usize];
            of.file.read(&mut buf).map(|got| {
                buf.truncate(got);
                buf
            })
        };
        match data {
            Ok(bytes) => {
                if of.is_text {
                    // Validate UTF-8 the way the device-side string type
                    // would; on failure fall back to the raw bytes rather
                    // than dropping the read (READ has no status field to
                    // report the error on, spec §4.D asymmetry).
                    match String::from_utf8(bytes) {
                        Ok(s) => Reply::Read(s.into_bytes()),
                        Err(e) => Reply::Read(e.into_bytes()),
                    }
                } else {
                    Reply::Read(bytes)
                }
            }
            Err(_) => Reply::Read(Vec::new()),
        }
    }

    fn do_write(&mut self, fd: i8, data: &[u8]) -> Reply {
        let Some(Some(of)) = self.files.get_mut(fd as usize) else {
            return Reply::Write(0);
        };
        let payload: std::borrow::Cow<[u8]> = if of.is_text {
            match std::str::from_utf8(data) {
                Ok(_) => std::borrow::Cow::Borrowed(data),
                Err(_) => std::borrow::Cow::Borrowed(data),
            }
        } else {
            std::borrow::Cow::Borrowed(data)
        };
        match of.file.write(&payload) {
            Ok(n) => Reply::Write(n as i32),
            Err(_) => Reply::Write(0),
        }
    }

    fn do_seek(&mut self, fd: i8, offset: i32) -> Reply {
        let Some(Some(of)) = self.files.get_mut(fd as usize) else {
            return Reply::Seek(0);
        };
        match of.file.seek(SeekFrom::Start(offset.max(0) as u64)) {
            Ok(pos) => Reply::Seek(pos as i32),
            Err(_) => Reply::Seek(0),
        }
    }

    fn do_remove(&self, path: &str) -> Reply {
        let full = self.resolve(path);
        match std::fs::remove_file(&full) {
            Ok(()) => Reply::Remove(0),
            Err(e) => Reply::Remove(-errno_of(&e)),
        }
    }

    fn do_rename(&self, old: &str, new: &str) -> Reply {
        let from = self.resolve(old);
        let to = self.resolve(new);
        match std::fs::rename(&from, &to) {
            Ok(()) => Reply::Rename(0),
            Err(e) => Reply::Rename(-errno_of(&e)),
        }
    }
}

fn open_options_for(mode: &str) -> Option<OpenOptions> {
    let mut opts = OpenOptions::new();
    let reading = mode.contains('r');
    let writing = mode.contains('w');
    let appending = mode.contains('a');
    let plus = mode.contains('+');
    if !(reading || writing || appending) {
        return None;
    }
    opts.read(reading || plus);
    if writing {
        opts.write(true).create(true).truncate(true);
    }
    if appending {
        opts.write(true).create(true).append(true);
    }
    if plus && !writing && !appending {
        opts.write(true);
    }
    Some(opts)
}

#[cfg(unix)]
fn stat_of(meta: &std::fs::Metadata) -> Stat {
    use std::os::unix::fs::MetadataExt;
    Stat {
        mode: meta.mode(),
        size: meta.size() as u32,
        atime: meta.atime() as u32,
        mtime: meta.mtime() as u32,
        ctime: meta.ctime() as u32,
    }
}

#[cfg(unix)]
fn mode_of(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    meta.mode()
}

#[cfg(not(unix))]
fn stat_of(meta: &std::fs::Metadata) -> Stat {
    // Non-Unix platforms don't expose atime/ctime/raw mode bits through
    // std; this is a documented limitation (DESIGN.md), not a full port.
    Stat {
        mode: if meta.is_dir() { 0o040000 } else { 0o100000 },
        size: meta.len() as u32,
        atime: 0,
        mtime: 0,
        ctime: 0,
    }
}

#[cfg(not(unix))]
fn mode_of(meta: &std::fs::Metadata) -> u32 {
    if meta.is_dir() {
        0o040000
    } else {
        0o100000
    }
}
