//! Report output
//!
//! Every listing writes the same table twice: a `;`-delimited CSV file and an
//! aligned console view with a running row counter. The header goes out as
//! soon as the writer is created, so an empty inventory still yields a
//! header-only CSV.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::marker::PhantomData;
use std::path::Path;

/// A flattened row of one listing
pub trait Record {
    /// Column headers in output order
    const HEADERS: &'static [&'static str];
    /// Console column widths, one per header
    const WIDTHS: &'static [usize];

    /// Field values in header order
    fn fields(&self) -> Vec<String>;
}

/// CSV + console writer for one listing
pub struct ReportWriter<R: Record, W: Write, C: Write> {
    csv: csv::Writer<W>,
    console: C,
    count: usize,
    _record: PhantomData<R>,
}

impl<R: Record> ReportWriter<R, BufWriter<File>, std::io::Stdout> {
    /// Create the CSV file (and its directory) and print the console header
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let file = File::create(path)
            .with_context(|| format!("Failed to create output file {}", path.display()))?;
        tracing::info!("Writing report to {:?}", path);
        Self::new(BufWriter::new(file), std::io::stdout())
    }
}

impl<R: Record, W: Write, C: Write> ReportWriter<R, W, C> {
    pub fn new(out: W, mut console: C) -> Result<Self> {
        let mut csv = csv::WriterBuilder::new().delimiter(b';').from_writer(out);
        csv.write_record(R::HEADERS)
            .context("Failed to write CSV header")?;

        let headers: Vec<String> = R::HEADERS.iter().map(|h| h.to_string()).collect();
        writeln!(console, "{}", format_line("", &headers, R::WIDTHS))?;
        let total_width: usize = 4 + R::WIDTHS.iter().map(|w| w + 1).sum::<usize>();
        writeln!(console, "{}", "-".repeat(total_width))?;

        Ok(Self {
            csv,
            console,
            count: 0,
            _record: PhantomData,
        })
    }

    /// Append one row to both outputs
    pub fn write(&mut self, record: &R) -> Result<()> {
        let fields = record.fields();
        self.csv
            .write_record(&fields)
            .context("Failed to write CSV row")?;
        self.count += 1;
        writeln!(
            self.console,
            "{}",
            format_line(&self.count.to_string(), &fields, R::WIDTHS)
        )?;
        tracing::debug!("{:?}", fields);
        Ok(())
    }

    pub fn write_all<'a>(&mut self, records: impl IntoIterator<Item = &'a R>) -> Result<()>
    where
        R: 'a,
    {
        for record in records {
            self.write(record)?;
        }
        Ok(())
    }

    /// Rows written so far
    pub fn count(&self) -> usize {
        self.count
    }

    /// Flush both outputs and return the number of rows written
    pub fn finish(mut self) -> Result<usize> {
        self.csv.flush().context("Failed to flush CSV output")?;
        self.console.flush()?;
        Ok(self.count)
    }
}

fn format_line(counter: &str, fields: &[String], widths: &[usize]) -> String {
    let mut line = format!("{:>3}", counter);
    for (i, field) in fields.iter().enumerate() {
        let width = widths.get(i).copied().unwrap_or(0);
        line.push(' ');
        line.push_str(&format!("{:<width$}", field, width = width));
    }
    line.trim_end().to_string()
}
