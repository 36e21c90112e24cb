use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use csv::Writer;

use crate::{Result, SiteRecord};

pub const HEADER: [&str; 3] = ["rank", "site", "country"];

/// `alexa_top{count}_{country}.csv` inside `dir`.
pub fn report_path(dir: &Path, count: u32, country: &str) -> PathBuf {
    dir.join(format!("alexa_top{count}_{country}.csv"))
}

/// CSV report for one country. The header is written on creation.
/// Dropping the writer flushes whatever was written so far.
pub struct ReportWriter<W: Write> {
    writer: Writer<W>,
    rows: usize,
}

impl ReportWriter<File> {
    pub fn create(path: &Path) -> Result<Self> {
        Self::from_writer(File::create(path)?)
    }
}

impl<W: Write> ReportWriter<W> {
    pub fn from_writer(inner: W) -> Result<Self> {
        let mut writer = Writer::from_writer(inner);
        writer.write_record(HEADER)?;
        Ok(Self { writer, rows: 0 })
    }

    pub fn write(&mut self, record: &SiteRecord) -> Result<()> {
        self.writer.write_record([
            record.rank.to_string().as_str(),
            record.site.as_str(),
            record.country.as_str(),
        ])?;
        self.rows += 1;
        Ok(())
    }

    pub fn write_all(&mut self, records: &[SiteRecord]) -> Result<()> {
        records.iter().try_for_each(|r| self.write(r))
    }

    /// Data rows written so far, header excluded.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flushes and hands back the underlying writer.
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|err| err.into_error().into())
    }
}
