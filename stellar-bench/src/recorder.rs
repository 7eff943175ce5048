//! Append-only CSV sinks for completed requests.
//!
//! Both writers are shared by all request tasks of a sub-experiment. Every row is appended under a
//! mutex, and rows are flushed to disk by the scheduler once per tick.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};

/// Name of the latency output file within a sub-experiment directory.
pub const LATENCIES_FILE: &str = "latencies.csv";

/// Name of the data transfer output file within a sub-experiment directory.
pub const DATA_TRANSFERS_FILE: &str = "data-transfers.csv";

const LATENCY_HEADER: [&str; 6] = [
    "Request ID",
    "Host",
    "Sent At",
    "Received At",
    "Client Latency (ms)",
    "Burst ID",
];

type Sink = Box<dyn Write + Send>;

/// Client-side timing of one successful request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LatencyRecord {
    /// Invocation ID reported by the function.
    pub request_id: String,
    /// Host the request was sent to.
    pub host: String,
    /// Time immediately before the request was sent.
    pub sent_at: DateTime<Utc>,
    /// Time the response head arrived.
    pub received_at: DateTime<Utc>,
    /// Global index of the burst this request belongs to.
    pub burst_id: usize,
}

impl LatencyRecord {
    /// Returns the client-observed latency in whole milliseconds.
    pub fn latency_ms(&self) -> i64 {
        (self.received_at - self.sent_at).num_milliseconds().max(0)
    }
}

/// Hop timestamps of one successful chained request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataTransferRecord {
    /// Invocation ID reported by the function.
    pub request_id: String,
    /// Host the request was sent to.
    pub host: String,
    /// Global index of the burst this request belongs to.
    pub burst_id: usize,
    /// Epoch-millisecond completion time of every hop.
    pub timestamp_chain: Vec<String>,
}

fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn create_file(path: &Path) -> io::Result<Sink> {
    Ok(Box::new(BufWriter::new(File::create(path)?)))
}

/// Writes `latencies.csv`.
pub struct LatencyWriter {
    inner: Mutex<csv::Writer<Sink>>,
}

impl LatencyWriter {
    /// Creates a writer on top of any sink and writes the header row.
    pub fn new<W: Write + Send + 'static>(sink: W) -> csv::Result<Self> {
        Self::from_sink(Box::new(sink))
    }

    /// Creates the file at `path`, truncating it if it exists.
    pub fn create(path: &Path) -> csv::Result<Self> {
        Self::from_sink(create_file(path)?)
    }

    fn from_sink(sink: Sink) -> csv::Result<Self> {
        let mut writer = csv::Writer::from_writer(sink);
        writer.write_record(LATENCY_HEADER)?;

        Ok(Self {
            inner: Mutex::new(writer),
        })
    }

    /// Appends one row.
    pub fn write(&self, record: &LatencyRecord) -> csv::Result<()> {
        let row = [
            record.request_id.clone(),
            record.host.clone(),
            format_time(&record.sent_at),
            format_time(&record.received_at),
            record.latency_ms().to_string(),
            record.burst_id.to_string(),
        ];

        let mut writer = self.inner.lock().unwrap_or_else(|poison| poison.into_inner());
        writer.write_record(&row)
    }

    /// Flushes buffered rows to the underlying sink.
    pub fn flush(&self) -> io::Result<()> {
        let mut writer = self.inner.lock().unwrap_or_else(|poison| poison.into_inner());
        writer.flush()
    }
}

impl std::fmt::Debug for LatencyWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatencyWriter").finish_non_exhaustive()
    }
}

/// Writes `data-transfers.csv`, with one timestamp column per hop.
pub struct DataTransferWriter {
    inner: Mutex<csv::Writer<Sink>>,
}

impl DataTransferWriter {
    /// Creates a writer on top of any sink and writes the header row for `chain_length` hops.
    pub fn new<W: Write + Send + 'static>(sink: W, chain_length: usize) -> csv::Result<Self> {
        Self::from_sink(Box::new(sink), chain_length)
    }

    /// Creates the file at `path`, truncating it if it exists.
    pub fn create(path: &Path, chain_length: usize) -> csv::Result<Self> {
        Self::from_sink(create_file(path)?, chain_length)
    }

    fn from_sink(sink: Sink, chain_length: usize) -> csv::Result<Self> {
        // Rows carry as many columns as the chain has hops, which can differ from the header.
        let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(sink);

        let mut header = vec![
            "Request ID".to_owned(),
            "Host".to_owned(),
            "Burst ID".to_owned(),
        ];
        header.extend((0..chain_length).map(|hop| format!("Function {hop} Timestamp")));
        writer.write_record(&header)?;

        Ok(Self {
            inner: Mutex::new(writer),
        })
    }

    /// Appends one row.
    pub fn write(&self, record: &DataTransferRecord) -> csv::Result<()> {
        let mut row = Vec::with_capacity(3 + record.timestamp_chain.len());
        row.push(record.request_id.clone());
        row.push(record.host.clone());
        row.push(record.burst_id.to_string());
        row.extend(record.timestamp_chain.iter().cloned());

        let mut writer = self.inner.lock().unwrap_or_else(|poison| poison.into_inner());
        writer.write_record(&row)
    }

    /// Flushes buffered rows to the underlying sink.
    pub fn flush(&self) -> io::Result<()> {
        let mut writer = self.inner.lock().unwrap_or_else(|poison| poison.into_inner());
        writer.flush()
    }
}

impl std::fmt::Debug for DataTransferWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataTransferWriter").finish_non_exhaustive()
    }
}

/// The recorders of one sub-experiment.
#[derive(Debug)]
pub struct Recorders {
    /// Always present.
    pub latencies: LatencyWriter,
    /// Present only for chained sub-experiments.
    pub data_transfers: Option<DataTransferWriter>,
}

impl Recorders {
    /// Flushes both writers.
    pub fn flush(&self) -> io::Result<()> {
        self.latencies.flush()?;
        if let Some(data_transfers) = &self.data_transfers {
            data_transfers.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::TimeZone;

    use super::*;

    /// A cloneable in-memory sink to inspect written rows.
    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn writes_latency_rows() {
        let buffer = SharedBuffer::default();
        let writer = LatencyWriter::new(buffer.clone()).unwrap();

        let sent_at = Utc.with_ymd_and_hms(2021, 6, 4, 12, 0, 0).unwrap();
        let record = LatencyRecord {
            request_id: "req-1".into(),
            host: "abc.execute-api.us-west-1.amazonaws.com".into(),
            sent_at,
            received_at: sent_at + chrono::Duration::milliseconds(1234),
            burst_id: 7,
        };
        writer.write(&record).unwrap();
        writer.flush().unwrap();

        assert_eq!(
            buffer.contents(),
            "Request ID,Host,Sent At,Received At,Client Latency (ms),Burst ID\n\
             req-1,abc.execute-api.us-west-1.amazonaws.com,2021-06-04T12:00:00Z,2021-06-04T12:00:01Z,1234,7\n"
        );
    }

    #[test]
    fn latency_is_never_negative() {
        let now = Utc::now();
        let record = LatencyRecord {
            request_id: String::new(),
            host: String::new(),
            sent_at: now,
            received_at: now - chrono::Duration::milliseconds(5),
            burst_id: 0,
        };
        assert_eq!(record.latency_ms(), 0);
    }

    #[test]
    fn writes_one_column_per_hop() {
        let buffer = SharedBuffer::default();
        let writer = DataTransferWriter::new(buffer.clone(), 3).unwrap();

        writer
            .write(&DataTransferRecord {
                request_id: "req-1".into(),
                host: "host".into(),
                burst_id: 0,
                timestamp_chain: vec!["100".into(), "200".into(), "300".into()],
            })
            .unwrap();
        writer.flush().unwrap();

        assert_eq!(
            buffer.contents(),
            "Request ID,Host,Burst ID,Function 0 Timestamp,Function 1 Timestamp,Function 2 Timestamp\n\
             req-1,host,0,100,200,300\n"
        );
    }

    #[test]
    fn accepts_short_chains() {
        let buffer = SharedBuffer::default();
        let writer = DataTransferWriter::new(buffer.clone(), 3).unwrap();

        writer
            .write(&DataTransferRecord {
                request_id: String::new(),
                host: "host".into(),
                burst_id: 1,
                timestamp_chain: Vec::new(),
            })
            .unwrap();
        writer.flush().unwrap();

        assert!(buffer.contents().ends_with(",host,1\n"));
    }

    #[test]
    fn creates_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LATENCIES_FILE);

        let writer = LatencyWriter::create(&path).unwrap();
        writer.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("Request ID,Host,"));
    }
}
