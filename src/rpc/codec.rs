//! Frame-level encoding/decoding of the 10 filesystem RPC operations
//! (spec §4.C). All integers little-endian, all strings/bytes length
//! prefixed by a signed 32-bit length. Pure functions over `std::io::Read`/
//! `Write` so round-trip tests run against an in-memory `Cursor`, with no
//! dependency on `SerialLink` or timeouts.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// The 10 command ids, in wire order. Single source of truth for both the
/// codec and the bootstrap compressor's `CMD_*` -> integer substitution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Cmd {
    Stat = 1,
    IlistdirStart = 2,
    IlistdirNext = 3,
    Open = 4,
    Close = 5,
    Read = 6,
    Write = 7,
    Seek = 8,
    Remove = 9,
    Rename = 10,
}

impl Cmd {
    pub const ALL: [Cmd; 10] = [
        Cmd::Stat,
        Cmd::IlistdirStart,
        Cmd::IlistdirNext,
        Cmd::Open,
        Cmd::Close,
        Cmd::Read,
        Cmd::Write,
        Cmd::Seek,
        Cmd::Remove,
        Cmd::Rename,
    ];

    /// Name as it appears in `assets/bootstrap.py` (`CMD_STAT`, etc).
    pub fn bootstrap_name(self) -> &'static str {
        match self {
            Cmd::Stat => "CMD_STAT",
            Cmd::IlistdirStart => "CMD_ILISTDIR_START",
            Cmd::IlistdirNext => "CMD_ILISTDIR_NEXT",
            Cmd::Open => "CMD_OPEN",
            Cmd::Close => "CMD_CLOSE",
            Cmd::Read => "CMD_READ",
            Cmd::Write => "CMD_WRITE",
            Cmd::Seek => "CMD_SEEK",
            Cmd::Remove => "CMD_REMOVE",
            Cmd::Rename => "CMD_RENAME",
        }
    }
}

impl TryFrom<u8> for Cmd {
    type Error = ();

    fn try_from(v: u8) -> Result<Self, ()> {
        Cmd::ALL.into_iter().find(|c| *c as u8 == v).ok_or(())
    }
}

pub mod primitives {
    use super::*;

    pub fn write_s8<W: Write>(w: &mut W, v: i8) -> io::Result<()> {
        w.write_i8(v)
    }

    pub fn read_s8<R: Read>(r: &mut R) -> io::Result<i8> {
        r.read_i8()
    }

    pub fn write_s32<W: Write>(w: &mut W, v: i32) -> io::Result<()> {
        w.write_i32::<LittleEndian>(v)
    }

    pub fn read_s32<R: Read>(r: &mut R) -> io::Result<i32> {
        r.read_i32::<LittleEndian>()
    }

    pub fn write_u32<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
        w.write_u32::<LittleEndian>(v)
    }

    pub fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
        r.read_u32::<LittleEndian>()
    }

    pub fn write_bytes<W: Write>(w: &mut W, b: &[u8]) -> io::Result<()> {
        write_s32(w, b.len() as i32)?;
        w.write_all(b)
    }

    pub fn read_bytes<R: Read>(r: &mut R) -> io::Result<Vec<u8>> {
        let n = read_s32(r)?.max(0) as usize;
        let mut buf = vec![0u8; n];
        r.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn write_str<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
        write_bytes(w, s.as_bytes())
    }

    pub fn read_str<R: Read>(r: &mut R) -> io::Result<String> {
        let b = read_bytes(r)?;
        String::from_utf8(b).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

use primitives::*;

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Stat { path: String },
    IlistdirStart { path: String },
    IlistdirNext,
    Open { path: String, mode: String },
    Close { fd: i8 },
    Read { fd: i8, n: i32 },
    Write { fd: i8, data: Vec<u8> },
    Seek { fd: i8, offset: i32 },
    Remove { path: String },
    Rename { old: String, new: String },
}

impl Request {
    pub fn cmd(&self) -> Cmd {
        match self {
            Request::Stat { .. } => Cmd::Stat,
            Request::IlistdirStart { .. } => Cmd::IlistdirStart,
            Request::IlistdirNext => Cmd::IlistdirNext,
            Request::Open { .. } => Cmd::Open,
            Request::Close { .. } => Cmd::Close,
            Request::Read { .. } => Cmd::Read,
            Request::Write { .. } => Cmd::Write,
            Request::Seek { .. } => Cmd::Seek,
            Request::Remove { .. } => Cmd::Remove,
            Request::Rename { .. } => Cmd::Rename,
        }
    }

    pub fn decode<R: Read>(cmd: Cmd, r: &mut R) -> io::Result<Self> {
        Ok(match cmd {
            Cmd::Stat => Request::Stat {
                path: read_str(r)?,
            },
            Cmd::IlistdirStart => Request::IlistdirStart {
                path: read_str(r)?,
            },
            Cmd::IlistdirNext => Request::IlistdirNext,
            Cmd::Open => {
                let path = read_str(r)?;
                let mode = read_str(r)?;
                Request::Open { path, mode }
            }
            Cmd::Close => Request::Close { fd: read_s8(r)? },
            Cmd::Read => {
                let fd = read_s8(r)?;
                let n = read_s32(r)?;
                Request::Read { fd, n }
            }
            Cmd::Write => {
                let fd = read_s8(r)?;
                let data = read_bytes(r)?;
                Request::Write { fd, data }
            }
            Cmd::Seek => {
                let fd = read_s8(r)?;
                let offset = read_s32(r)?;
                Request::Seek { fd, offset }
            }
            Cmd::Remove => Request::Remove {
                path: read_str(r)?,
            },
            Cmd::Rename => {
                let old = read_str(r)?;
                let new = read_str(r)?;
                Request::Rename { old, new }
            }
        })
    }

    pub fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        match self {
            Request::Stat { path } => write_str(w, path),
            Request::IlistdirStart { path } => write_str(w, path),
            Request::IlistdirNext => Ok(()),
            Request::Open { path, mode } => {
                write_str(w, path)?;
                write_str(w, mode)
            }
            Request::Close { fd } => write_s8(w, *fd),
            Request::Read { fd, n } => {
                write_s8(w, *fd)?;
                write_s32(w, *n)
            }
            Request::Write { fd, data } => {
                write_s8(w, *fd)?;
                write_bytes(w, data)
            }
            Request::Seek { fd, offset } => {
                write_s8(w, *fd)?;
                write_s32(w, *offset)
            }
            Request::Remove { path } => write_str(w, path),
            Request::Rename { old, new } => {
                write_str(w, old)?;
                write_str(w, new)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub mode: u32,
    pub size: u32,
    pub atime: u32,
    pub mtime: u32,
    pub ctime: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// `Err` holds the positive errno; the wire carries it negated.
    Stat(Result<Stat, i32>),
    IlistdirStart,
    IlistdirNext(Option<(String, u32)>),
    /// Negative on error (`-errno`).
    Open(i8),
    Close,
    Read(Vec<u8>),
    Write(i32),
    Seek(i32),
    Remove(i32),
    Rename(i32),
}

impl Reply {
    pub fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        match self {
            Reply::Stat(Ok(s)) => {
                write_s8(w, 0)?;
                write_u32(w, s.mode)?;
                write_u32(w, s.size)?;
                write_u32(w, s.atime)?;
                write_u32(w, s.mtime)?;
                write_u32(w, s.ctime)
            }
            Reply::Stat(Err(errno)) => write_s8(w, -(*errno as i8)),
            Reply::IlistdirStart => Ok(()),
            Reply::IlistdirNext(Some((name, ty))) => {
                write_str(w, name)?;
                write_u32(w, *ty)
            }
            Reply::IlistdirNext(None) => write_str(w, ""),
            Reply::Open(fd) => write_s8(w, *fd),
            Reply::Close => Ok(()),
            Reply::Read(data) => write_bytes(w, data),
            Reply::Write(n) => write_s32(w, *n),
            Reply::Seek(n) => write_s32(w, *n),
            Reply::Remove(status) => write_s32(w, *status),
            Reply::Rename(status) => write_s32(w, *status),
        }
    }

    pub fn decode<R: Read>(cmd: Cmd, r: &mut R) -> io::Result<Self> {
        Ok(match cmd {
            Cmd::Stat => {
                let status = read_s8(r)?;
                if status >= 0 {
                    Reply::Stat(Ok(Stat {
                        mode: read_u32(r)?,
                        size: read_u32(r)?,
                        atime: read_u32(r)?,
                        mtime: read_u32(r)?,
                        ctime: read_u32(r)?,
                    }))
                } else {
                    Reply::Stat(Err(-(status as i32)))
                }
            }
            Cmd::IlistdirStart => Reply::IlistdirStart,
            Cmd::IlistdirNext => {
                let name = read_str(r)?;
                if name.is_empty() {
                    Reply::IlistdirNext(None)
                } else {
                    Reply::IlistdirNext(Some((name, read_u32(r)?)))
                }
            }
            Cmd::Open => Reply::Open(read_s8(r)?),
            Cmd::Close => Reply::Close,
            Cmd::Read => Reply::Read(read_bytes(r)?),
            Cmd::Write => Reply::Write(read_s32(r)?),
            Cmd::Seek => Reply::Seek(read_s32(r)?),
            Cmd::Remove => Reply::Remove(read_s32(r)?),
            Cmd::Rename => Reply::Rename(read_s32(r)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn roundtrip_request(req: Request) {
        let mut buf = Vec::new();
        req.encode(&mut buf).unwrap();
        let mut cur = Cursor::new(buf);
        let got = Request::decode(req.cmd(), &mut cur).unwrap();
        assert_eq!(got, req);
    }

    #[test]
    fn requests_roundtrip() {
        roundtrip_request(Request::Stat {
            path: "a/b.txt".into(),
        });
        roundtrip_request(Request::IlistdirStart { path: "".into() });
        roundtrip_request(Request::IlistdirNext);
        roundtrip_request(Request::Open {
            path: "x".into(),
            mode: "rb".into(),
        });
        roundtrip_request(Request::Close { fd: 3 });
        roundtrip_request(Request::Read { fd: -1, n: -1 });
        roundtrip_request(Request::Write {
            fd: 2,
            data: vec![1, 2, 3, 0xff],
        });
        roundtrip_request(Request::Seek {
            fd: 0,
            offset: -100,
        });
        roundtrip_request(Request::Remove { path: "y".into() });
        roundtrip_request(Request::Rename {
            old: "a".into(),
            new: "b".into(),
        });
    }

    #[test]
    fn strings_roundtrip_utf8_multibyte() {
        for s in ["", "hello", "héllo wörld", "日本語", "🦀 crab"] {
            let mut buf = Vec::new();
            write_str(&mut buf, s).unwrap();
            let mut cur = Cursor::new(buf);
            assert_eq!(read_str(&mut cur).unwrap(), s);
        }
    }

    #[test]
    fn stat_reply_roundtrips_ok_and_error() {
        let ok = Reply::Stat(Ok(Stat {
            mode: 0o100644,
            size: 6,
            atime: 1,
            mtime: 2,
            ctime: 3,
        }));
        let mut buf = Vec::new();
        ok.encode(&mut buf).unwrap();
        let mut cur = Cursor::new(buf);
        assert_eq!(Reply::decode(Cmd::Stat, &mut cur).unwrap(), ok);

        let err = Reply::Stat(Err(2)); // ENOENT
        let mut buf = Vec::new();
        err.encode(&mut buf).unwrap();
        let mut cur = Cursor::new(buf);
        assert_eq!(Reply::decode(Cmd::Stat, &mut cur).unwrap(), err);
    }

    #[test]
    fn ilistdir_next_empty_name_terminates() {
        let reply = Reply::IlistdirNext(None);
        let mut buf = Vec::new();
        reply.encode(&mut buf).unwrap();
        assert_eq!(buf, vec![0, 0, 0, 0]); // s32 length 0, no type field
    }

    #[test]
    fn close_and_ilistdir_start_have_empty_replies() {
        let mut buf = Vec::new();
        Reply::Close.encode(&mut buf).unwrap();
        assert!(buf.is_empty());
        let mut buf = Vec::new();
        Reply::IlistdirStart.encode(&mut buf).unwrap();
        assert!(buf.is_empty());
    }

    #[test]
    fn cmd_try_from_rejects_unknown_ids() {
        assert!(Cmd::try_from(0).is_err());
        assert!(Cmd::try_from(11).is_err());
        assert_eq!(Cmd::try_from(1).unwrap(), Cmd::Stat);
    }
}
