use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::report::Report;

pub const MAGIC: [u8; 4] = *b"SWR0";
pub const VERSION: u8 = 1;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Header {
    pub magic: [u8; 4],
    pub version: u8,
    pub run_id: String,
}

/// Append-only bincode log of snapshot reports: one header, then one
/// record per report.
pub struct SnapshotLog {
    path: PathBuf,
}

impl SnapshotLog {
    pub fn create<P: AsRef<Path>>(path: P, run_id: &str) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let header = Header {
            magic: MAGIC,
            version: VERSION,
            run_id: run_id.to_string(),
        };
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("creating snapshot log {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, &header)?;
        writer.flush()?;
        Ok(Self { path })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<(Self, Header, Vec<Report>)> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .with_context(|| format!("opening snapshot log {}", path.display()))?;
        let mut reader = BufReader::new(file);
        let header: Header = bincode::deserialize_from(&mut reader)?;
        if header.magic != MAGIC {
            return Err(anyhow!("invalid magic"));
        }
        if header.version != VERSION {
            return Err(anyhow!("unsupported version {}", header.version));
        }
        let mut reports = Vec::new();
        loop {
            match bincode::deserialize_from::<_, Report>(&mut reader) {
                Ok(r) => reports.push(r),
                Err(e) => {
                    if let bincode::ErrorKind::Io(ref io_err) = *e {
                        if io_err.kind() == io::ErrorKind::UnexpectedEof {
                            break;
                        }
                    }
                    return Err(e.into());
                }
            }
        }
        Ok((Self { path }, header, reports))
    }

    pub fn append(&self, report: &Report) -> Result<()> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, report)?;
        writer.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReportSink {
    Stdout,
    File(PathBuf),
}

impl ReportSink {
    /// `-` means stdout, anything else is a file path.
    pub fn parse(s: &str) -> Self {
        if s == "-" {
            ReportSink::Stdout
        } else {
            ReportSink::File(PathBuf::from(s))
        }
    }

    pub fn write(&self, report: &Report) -> Result<()> {
        let json = serde_json::to_string_pretty(report)?;
        match self {
            ReportSink::Stdout => {
                let mut out = io::stdout().lock();
                writeln!(out, "{json}")?;
                out.flush()?;
            }
            ReportSink::File(path) => {
                // Readers polling the file never see a half-written report.
                let tmp = path.with_extension("tmp");
                fs::write(&tmp, json.as_bytes())
                    .with_context(|| format!("writing {}", tmp.display()))?;
                fs::rename(&tmp, path)
                    .with_context(|| format!("replacing {}", path.display()))?;
            }
        }
        Ok(())
    }
}

pub fn read_report<P: AsRef<Path>>(path: P) -> Result<Report> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(serde_json::from_str(&text)?)
}
