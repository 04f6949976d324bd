//! Open-flag parsing.
//!
//! Callers pass fopen-style mode strings (`"r"`, `"r+"`, `"w"`, `"wx"`,
//! `"w+"`, `"wx+"`, `"a"`, `"ax"`, `"a+"`, `"ax+"`) rather than raw numeric
//! flags; [`OFlags::parse`] is the single place that maps a string to bits.

use crate::error::{fs_err, ErrorKind, FsResult};

bitflags::bitflags! {
    pub struct OFlags: u32 {
        const READ      = 0b0000_0001;
        const WRITE     = 0b0000_0010;
        const CREATE    = 0b0000_0100;
        const EXCLUSIVE = 0b0000_1000;
        const APPEND    = 0b0001_0000;
        const TRUNCATE  = 0b0010_0000;
        /// Don't follow a trailing symlink; error with `ELOOP` if the
        /// resolved target is one.
        const NOFOLLOW  = 0b0100_0000;
        /// Error with `ENOTDIR` unless the resolved target is a directory.
        const DIRECTORY = 0b1000_0000;
    }
}

/// Reference point for [`crate::facade::Filesystem::lseek`], mirroring
/// `std::io::SeekFrom`'s three variants rather than inventing a bespoke enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
}

impl OFlags {
    /// Parses one of the fopen-style mode strings into flag bits.
    pub fn parse(mode: &str) -> FsResult<OFlags> {
        match mode {
            "r" => Ok(OFlags::READ),
            "r+" => Ok(OFlags::READ | OFlags::WRITE),
            "w" => Ok(OFlags::WRITE | OFlags::CREATE | OFlags::TRUNCATE),
            "wx" => Ok(OFlags::WRITE | OFlags::CREATE | OFlags::TRUNCATE | OFlags::EXCLUSIVE),
            "w+" => Ok(OFlags::READ | OFlags::WRITE | OFlags::CREATE | OFlags::TRUNCATE),
            "wx+" => {
                Ok(OFlags::READ | OFlags::WRITE | OFlags::CREATE | OFlags::TRUNCATE | OFlags::EXCLUSIVE)
            }
            "a" => Ok(OFlags::WRITE | OFlags::CREATE | OFlags::APPEND),
            "ax" => Ok(OFlags::WRITE | OFlags::CREATE | OFlags::APPEND | OFlags::EXCLUSIVE),
            "a+" => Ok(OFlags::READ | OFlags::WRITE | OFlags::CREATE | OFlags::APPEND),
            "ax+" => Ok(OFlags::READ
                | OFlags::WRITE
                | OFlags::CREATE
                | OFlags::APPEND
                | OFlags::EXCLUSIVE),
            _ => Err(fs_err!(ErrorKind::InvalidArgument, "open")),
        }
    }

    pub fn wants_read(self) -> bool {
        self.contains(OFlags::READ)
    }

    pub fn wants_write(self) -> bool {
        self.contains(OFlags::WRITE)
    }

    pub fn wants_create(self) -> bool {
        self.contains(OFlags::CREATE)
    }

    pub fn wants_exclusive(self) -> bool {
        self.contains(OFlags::EXCLUSIVE)
    }

    pub fn wants_nofollow(self) -> bool {
        self.contains(OFlags::NOFOLLOW)
    }

    pub fn wants_directory(self) -> bool {
        self.contains(OFlags::DIRECTORY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_documented_mode() {
        for mode in ["r", "r+", "w", "wx", "w+", "wx+", "a", "ax", "a+", "ax+"] {
            assert!(OFlags::parse(mode).is_ok(), "mode {mode} should parse");
        }
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!(OFlags::parse("q").is_err());
    }

    #[test]
    fn read_write_mode_wants_both() {
        let flags = OFlags::parse("r+").unwrap();
        assert!(flags.wants_read());
        assert!(flags.wants_write());
        assert!(!flags.wants_create());
    }
}
