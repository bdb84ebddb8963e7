use std::ffi::OsString;
use std::io::{self, Write};
use std::path::PathBuf;

use tracing::debug;

use crate::process_file;

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Help,
    /// No files were given.
    Usage,
    Extract(Batch),
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Batch {
    pub show_filename: bool,
    pub files: Vec<PathBuf>,
}

/// Sort the arguments (without the program name) into options and files.
///
/// Only `-s`, `-h` and `--` are options. Everything else, including other
/// arguments starting with `-` and names that are not valid UTF-8, is a file.
pub fn parse_args<I>(args: I) -> Command
where
    I: IntoIterator<Item = OsString>,
{
    let mut batch = Batch::default();
    let mut end_of_options = false;

    for arg in args {
        if !end_of_options {
            match arg.to_str() {
                Some("--") => {
                    end_of_options = true;
                    continue;
                }
                Some("-s" | "--show-filename") => {
                    batch.show_filename = true;
                    continue;
                }
                Some("-h" | "--help") => return Command::Help,
                _ => {}
            }
        }
        batch.files.push(PathBuf::from(arg));
    }

    if batch.files.is_empty() {
        Command::Usage
    } else {
        Command::Extract(batch)
    }
}

impl Batch {
    /// Process every file in order, returning how many hashes were written.
    ///
    /// A file that fails is reported to `diag` and skipped. Only a failure to
    /// write to `out` or `diag` ends the batch early.
    pub fn run<W: Write, E: Write>(&self, out: &mut W, diag: &mut E) -> io::Result<usize> {
        let mut extracted = 0;
        for path in &self.files {
            if process_file(path, self.show_filename, out, diag)? {
                extracted += 1;
            }
        }
        debug!(extracted, total = self.files.len(), "done");
        Ok(extracted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    fn batch(show_filename: bool, files: &[&str]) -> Command {
        Command::Extract(Batch {
            show_filename,
            files: files.iter().map(PathBuf::from).collect(),
        })
    }

    #[test]
    fn test_no_files_is_usage() {
        assert_eq!(parse_args(args(&[])), Command::Usage);
        assert_eq!(parse_args(args(&["-s"])), Command::Usage);
        assert_eq!(parse_args(args(&["--"])), Command::Usage);
    }

    #[test]
    fn test_help() {
        assert_eq!(parse_args(args(&["-h"])), Command::Help);
        assert_eq!(parse_args(args(&["a.bfacs", "--help"])), Command::Help);
        assert_eq!(parse_args(args(&["--", "-h"])), batch(false, &["-h"]));
    }

    #[test]
    fn test_files_in_order() {
        assert_eq!(
            parse_args(args(&["a.bfacs", "-s", "b.bfacs"])),
            batch(true, &["a.bfacs", "b.bfacs"])
        );
    }

    #[test]
    fn test_dash_arguments_are_files() {
        assert_eq!(
            parse_args(args(&["a.bfacs", "--bogus", "-x.bfacs"])),
            batch(false, &["a.bfacs", "--bogus", "-x.bfacs"])
        );
        assert_eq!(
            parse_args(args(&["--", "-s", "--"])),
            batch(false, &["-s", "--"])
        );
        assert_eq!(parse_args(args(&["-"])), batch(false, &["-"]));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_filename() {
        use std::os::unix::ffi::OsStringExt;

        let bad = OsString::from_vec(b"bad\xff.bfacs".to_vec());
        let Command::Extract(parsed) = parse_args(vec![OsString::from("a.bfacs"), bad.clone()]) else {
            panic!("expected a batch");
        };
        assert_eq!(parsed.files, vec![PathBuf::from("a.bfacs"), PathBuf::from(bad)]);
    }

    #[test]
    fn test_run_continues_after_failures() {
        let dir = tempfile::tempdir().unwrap();
        let short = dir.path().join("short.bfacs");
        std::fs::write(&short, [0x24, 0x08, 0x19, 0x92]).unwrap();
        let missing = dir.path().join("missing.bfacs");
        let valid = Path::new("docs/example.bfacs").to_path_buf();

        let batch = Batch {
            show_filename: false,
            files: vec![short.clone(), missing.clone(), valid],
        };
        let mut out = Vec::new();
        let mut diag = Vec::new();
        assert_eq!(batch.run(&mut out, &mut diag).unwrap(), 1);

        assert_eq!(
            String::from_utf8(out).unwrap(),
            include_str!("../docs/example.txt")
        );
        let diag = String::from_utf8(diag).unwrap();
        let lines: Vec<&str> = diag.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            format!("{}: short read while trying to read file header", short.display())
        );
        assert!(lines[1].starts_with(&format!("{}: failed to open: ", missing.display())));
    }

    #[test]
    fn test_run_all_failing() {
        let dir = tempfile::tempdir().unwrap();
        let batch = Batch {
            show_filename: true,
            files: vec![dir.path().join("one.bfacs"), dir.path().join("two.bfacs")],
        };
        let mut out = Vec::new();
        let mut diag = Vec::new();
        assert_eq!(batch.run(&mut out, &mut diag).unwrap(), 0);
        assert!(out.is_empty());
        assert_eq!(String::from_utf8(diag).unwrap().lines().count(), 2);
    }
}
