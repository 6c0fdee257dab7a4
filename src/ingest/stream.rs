// src/ingest/stream.rs
//! Incremental CSV decoding of archive responses.
//!
//! Bodies arrive as arbitrary byte chunks; [`CsvRecords`] re-assembles complete
//! records (respecting quoted commas/newlines) without buffering the whole
//! response. [`ReportReader`] maps the header row to the text/timestamp columns
//! and turns each data row into a [`ReportText`].

use chrono::{Datelike, NaiveDateTime};
use futures::StreamExt;

use crate::ingest::error::FetchError;
use crate::ingest::types::{ByteStream, ReportText};

/// Timestamp layouts seen in archive CSVs, tried in order.
pub const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%dT%H:%MZ",
];

pub const PROGRESS_EVERY_ROWS: u64 = 200_000;

/// Month (1..=12) of an archive timestamp, or `None` if unreadable.
pub fn month_from_timestamp(raw: &str) -> Option<u32> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in TIMESTAMP_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.month());
        }
    }
    // Last resort: `YYYY-MM-...`
    let b = s.as_bytes();
    if b.len() >= 8 && b[4] == b'-' && b[7] == b'-' {
        return s
            .get(5..7)
            .and_then(|m| m.parse::<u32>().ok())
            .filter(|m| (1..=12).contains(m));
    }
    None
}

/// Smallest record ceiling [`for_each_report`] applies.
pub const MIN_RECORD_BYTES: usize = 64 * 1024;

/// Byte-chunk to CSV-record reassembly.
///
/// A quote opens a quoted field only at the start of a field, matching
/// [`parse_record`], so a stray `"` inside free text does not swallow the
/// following lines. Records longer than the ceiling are dropped up to the
/// next newline.
#[derive(Debug)]
pub struct CsvRecords {
    buf: Vec<u8>,
    scan: usize,
    in_quotes: bool,
    mid_field: bool,
    after_close: bool,
    discarding: bool,
    max_record: usize,
    dropped: u64,
}

impl Default for CsvRecords {
    fn default() -> Self {
        Self::with_limit(usize::MAX)
    }
}

impl CsvRecords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(max_record: usize) -> Self {
        Self {
            buf: Vec::new(),
            scan: 0,
            in_quotes: false,
            mid_field: false,
            after_close: false,
            discarding: false,
            max_record,
            dropped: 0,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Records thrown away for exceeding the ceiling.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn reset_record(&mut self) {
        self.in_quotes = false;
        self.mid_field = false;
        self.after_close = false;
    }

    /// Drop the oversize record: through its first newline if one is
    /// buffered, otherwise everything until the next one arrives.
    fn resync(&mut self) {
        self.dropped += 1;
        self.reset_record();
        match self.buf.iter().position(|&b| b == b'\n') {
            Some(nl) => {
                self.buf.drain(..=nl);
            }
            None => {
                self.buf.clear();
                self.discarding = true;
            }
        }
        self.scan = 0;
        tracing::warn!(target: "ingest", limit = self.max_record, "oversize CSV record dropped");
    }

    /// Next complete record, if the buffer holds one.
    pub fn next_record(&mut self) -> Option<Vec<String>> {
        while self.scan < self.buf.len() {
            let b = self.buf[self.scan];
            self.scan += 1;
            if self.discarding {
                if b == b'\n' {
                    self.buf.drain(..self.scan);
                    self.scan = 0;
                    self.discarding = false;
                }
                continue;
            }
            if self.in_quotes {
                if b == b'"' {
                    self.in_quotes = false;
                    self.after_close = true;
                }
            } else {
                match b {
                    // field start, or the second half of a `""` escape
                    b'"' if !self.mid_field || self.after_close => {
                        self.in_quotes = true;
                        self.mid_field = true;
                        self.after_close = false;
                    }
                    b',' => {
                        self.mid_field = false;
                        self.after_close = false;
                    }
                    b'\n' => {
                        let line: Vec<u8> = self.buf.drain(..self.scan).collect();
                        self.scan = 0;
                        self.reset_record();
                        return Some(parse_record(&line));
                    }
                    _ => {
                        self.mid_field = true;
                        self.after_close = false;
                    }
                }
            }
            if self.scan > self.max_record {
                self.resync();
            }
        }
        if self.discarding {
            self.buf.clear();
            self.scan = 0;
        }
        None
    }

    /// Whatever is left once the body ended (a last line without `\n`).
    pub fn finish(&mut self) -> Option<Vec<String>> {
        let discarding = std::mem::take(&mut self.discarding);
        self.reset_record();
        self.scan = 0;
        if discarding || self.buf.iter().all(u8::is_ascii_whitespace) {
            self.buf.clear();
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(parse_record(&rest))
    }
}

/// Split one record into fields (RFC 4180 quoting, `""` escapes a quote).
fn parse_record(line: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim_end_matches(['\n', '\r']);
    let mut fields = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    cur.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' if cur.is_empty() => in_quotes = true,
            ',' if !in_quotes => fields.push(std::mem::take(&mut cur)),
            _ => cur.push(ch),
        }
    }
    fields.push(cur);
    fields
}

fn is_blank(record: &[String]) -> bool {
    record.iter().all(|f| f.trim().is_empty())
}

/// Header names an archive family expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Accepted names for the report text column, by preference.
    pub text: &'static [&'static str],
    /// Accepted names for the timestamp column, by preference.
    pub timestamp: &'static [&'static str],
    pub timestamp_required: bool,
    /// `(column, label)` pairs appended to the text as `label value`.
    pub extras: &'static [(&'static str, &'static str)],
}

/// The stream had a header, but not the columns we need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaError {
    pub missing: &'static str,
    pub header: Vec<String>,
}

/// Column positions resolved from a header row.
#[derive(Debug, Clone)]
pub struct ReportReader {
    text_idx: usize,
    ts_idx: Option<usize>,
    extras: Vec<(usize, &'static str)>,
    default_month: u32,
    max_text_len: usize,
}

fn find_column(header: &[String], names: &[&str]) -> Option<usize> {
    names
        .iter()
        .find_map(|name| header.iter().position(|h| h == name))
}

impl ReportReader {
    pub fn from_header(
        header: &[String],
        spec: &ColumnSpec,
        default_month: u32,
        max_text_len: usize,
    ) -> Result<Self, SchemaError> {
        let lowered: Vec<String> = header.iter().map(|h| h.trim().to_ascii_lowercase()).collect();
        let missing = |what: &'static str| SchemaError {
            missing: what,
            header: header.to_vec(),
        };

        let text_idx = find_column(&lowered, spec.text).ok_or_else(|| missing("text"))?;
        let ts_idx = find_column(&lowered, spec.timestamp);
        if ts_idx.is_none() && spec.timestamp_required {
            return Err(missing("timestamp"));
        }
        let extras = spec
            .extras
            .iter()
            .filter_map(|(col, label)| find_column(&lowered, &[*col]).map(|i| (i, *label)))
            .collect();

        Ok(Self {
            text_idx,
            ts_idx,
            extras,
            default_month,
            max_text_len,
        })
    }

    /// One data row -> report, or `None` when the row should be skipped
    /// (short row, empty text, oversize text).
    pub fn read_row(&self, cols: &[String]) -> Option<ReportText> {
        let mut text = cols.get(self.text_idx)?.trim().to_string();
        let ts = match self.ts_idx {
            Some(i) => Some(cols.get(i)?.as_str()),
            None => None,
        };

        for (idx, label) in &self.extras {
            let value = cols.get(*idx).map(|v| v.trim()).unwrap_or_default();
            if value.is_empty() {
                continue;
            }
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(label);
            text.push(' ');
            text.push_str(value);
        }

        if text.is_empty() || text.chars().count() > self.max_text_len {
            return None;
        }

        let month = ts
            .and_then(month_from_timestamp)
            .unwrap_or(self.default_month);
        Some(ReportText { text, month })
    }
}

/// Counters for one drained response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub rows: u64,
    pub reports: u64,
    pub skipped: u64,
    /// Header present but required columns missing; nothing was read.
    pub schema_error: bool,
}

/// Drain a response, handing every usable report to `on_report`.
///
/// A schema mismatch is not an error: it is logged, flagged in the summary,
/// and the rest of the body is dropped. Transport failures mid-body surface
/// as `Err` so the caller can retry the whole request.
pub async fn for_each_report<F>(
    mut body: ByteStream,
    spec: &ColumnSpec,
    default_month: u32,
    max_text_len: usize,
    mut on_report: F,
) -> Result<StreamSummary, FetchError>
where
    F: FnMut(ReportText),
{
    // text may be up to four bytes per char, plus the other columns
    let mut records = CsvRecords::with_limit(
        max_text_len
            .saturating_mul(4)
            .saturating_add(4096)
            .max(MIN_RECORD_BYTES),
    );
    let mut reader: Option<ReportReader> = None;
    let mut summary = StreamSummary::default();
    let mut done = false;

    let mut handle = |record: Vec<String>, summary: &mut StreamSummary| -> bool {
        if is_blank(&record) {
            // empty body, stray blank lines
            return true;
        }
        let Some(r) = reader.as_ref() else {
            match ReportReader::from_header(&record, spec, default_month, max_text_len) {
                Ok(r) => {
                    reader = Some(r);
                    return true;
                }
                Err(e) => {
                    tracing::warn!(
                        target: "ingest",
                        missing = e.missing,
                        header = ?e.header,
                        "required column absent; skipping chunk stream"
                    );
                    summary.schema_error = true;
                    return false;
                }
            }
        };
        summary.rows += 1;
        match r.read_row(&record) {
            Some(report) => {
                summary.reports += 1;
                on_report(report);
            }
            None => summary.skipped += 1,
        }
        if summary.rows % PROGRESS_EVERY_ROWS == 0 {
            tracing::info!(target: "ingest", rows = summary.rows, "streamed rows");
        }
        true
    };

    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        records.push(&chunk);
        while let Some(record) = records.next_record() {
            if !handle(record, &mut summary) {
                done = true;
                break;
            }
        }
        if done {
            return Ok(summary);
        }
    }
    if let Some(record) = records.finish() {
        handle(record, &mut summary);
    }
    summary.rows += records.dropped();
    summary.skipped += records.dropped();
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::stream;

    const METAR_COLUMNS: ColumnSpec = ColumnSpec {
        text: &["metar"],
        timestamp: &["valid"],
        timestamp_required: true,
        extras: &[],
    };

    fn body(parts: &[&'static str]) -> ByteStream {
        let items: Vec<Result<Bytes, FetchError>> =
            parts.iter().map(|p| Ok(Bytes::from_static(p.as_bytes()))).collect();
        stream::iter(items).boxed()
    }

    #[test]
    fn month_parsing_formats_and_fallbacks() {
        assert_eq!(month_from_timestamp("2026-02-19 16:53"), Some(2));
        assert_eq!(month_from_timestamp("2026-11-19 16:53:10"), Some(11));
        assert_eq!(month_from_timestamp("2026-07-01T00:00:00Z"), Some(7));
        assert_eq!(month_from_timestamp("2026-07-01T00:00Z"), Some(7));
        assert_eq!(month_from_timestamp("2026-09-01 garbage"), Some(9));
        assert_eq!(month_from_timestamp("2026-13-01 x"), None);
        assert_eq!(month_from_timestamp(""), None);
        assert_eq!(month_from_timestamp("yesterday"), None);
    }

    #[test]
    fn records_span_chunk_boundaries_and_quotes() {
        let mut r = CsvRecords::new();
        r.push(b"a,\"b,c");
        assert!(r.next_record().is_none());
        r.push(b"\nd\",e\r\nx,");
        assert_eq!(
            r.next_record().unwrap(),
            vec!["a".to_string(), "b,c\nd".into(), "e".into()]
        );
        assert!(r.next_record().is_none());
        r.push(b"y");
        assert_eq!(r.finish().unwrap(), vec!["x".to_string(), "y".into()]);
        assert!(r.finish().is_none());
    }

    #[test]
    fn stray_quote_inside_a_field_does_not_join_lines() {
        let mut r = CsvRecords::new();
        r.push(b"K1,2024-01-01 00:51,K1 010051Z RMK 5\" SNOW\nK2,2024-01-01 00:52,K2 OK\n");
        assert_eq!(r.next_record().unwrap()[2], "K1 010051Z RMK 5\" SNOW");
        assert_eq!(r.next_record().unwrap()[0], "K2");
        assert!(r.next_record().is_none());

        // `""` inside a quoted field stays quoted across a newline
        r.push(b"\"a \"\"b\nc\"\"\",x\n");
        assert_eq!(
            r.next_record().unwrap(),
            vec!["a \"b\nc\"".to_string(), "x".into()]
        );
    }

    #[test]
    fn oversize_record_is_dropped_up_to_the_next_newline() {
        let mut r = CsvRecords::with_limit(16);
        r.push(b"\"never closed, a\nb,c\n");
        assert_eq!(r.next_record().unwrap(), vec!["b".to_string(), "c".into()]);
        assert_eq!(r.dropped(), 1);

        // no newline buffered yet: bytes are discarded until one arrives
        r.push(b"0123456789abcdefghij");
        assert!(r.next_record().is_none());
        r.push(b"klm\nok\n");
        assert_eq!(r.next_record().unwrap(), vec!["ok".to_string()]);
        assert_eq!(r.dropped(), 2);
        assert!(r.finish().is_none());
    }

    #[test]
    fn doubled_quotes_are_unescaped() {
        assert_eq!(
            parse_record(b"\"say \"\"hi\"\"\",2\n"),
            vec!["say \"hi\"".to_string(), "2".into()]
        );
    }

    #[test]
    fn reader_applies_extras_and_limits() {
        const PIREP: ColumnSpec = ColumnSpec {
            text: &["report"],
            timestamp: &["valid"],
            timestamp_required: false,
            extras: &[("icing", "ICING"), ("turbulence", "TURB")],
        };
        let header: Vec<String> = ["VALID", "REPORT", "ICING", "TURBULENCE"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let reader = ReportReader::from_header(&header, &PIREP, 3, 40).unwrap();

        let row = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let r = reader
            .read_row(&row(&["2024-01-05 10:00", "UA /OV DEN", "LGT RIME", ""]))
            .unwrap();
        assert_eq!(r.text, "UA /OV DEN ICING LGT RIME");
        assert_eq!(r.month, 1);

        // unreadable timestamp -> default month
        let r = reader.read_row(&row(&["??", "UA", "", "MOD"])).unwrap();
        assert_eq!(r.month, 3);
        assert_eq!(r.text, "UA TURB MOD");

        // empty and oversize rows are skipped
        assert!(reader.read_row(&row(&["2024-01-05 10:00", " ", "", ""])).is_none());
        let long = "X".repeat(41);
        assert!(reader.read_row(&row(&["2024-01-05 10:00", &long, "", ""])).is_none());
        // short row
        assert!(reader.read_row(&row(&["2024-01-05 10:00"])).is_none());
    }

    #[tokio::test]
    async fn drains_rows_from_a_chunked_body() {
        let b = body(&[
            "station,valid,metar\n",
            "KJFK,2024-06-01 00:51,KJFK 010051Z 18010KT 10SM\nKLGA,2024-",
            "12-01 00:51,KLGA 010051Z VV001\n\nKEWR,2024-12-01 00:51,\n",
            "KTEB,2024-03-01 00:51,KTEB 010051Z -RA",
        ]);
        let mut got = Vec::new();
        let summary = for_each_report(b, &METAR_COLUMNS, 1, 1000, |r| got.push(r))
            .await
            .unwrap();
        assert_eq!(summary.rows, 4);
        assert_eq!(summary.reports, 3);
        assert_eq!(summary.skipped, 1);
        assert!(!summary.schema_error);
        let months: Vec<u32> = got.iter().map(|r| r.month).collect();
        assert_eq!(months, vec![6, 12, 3]);
    }

    #[tokio::test]
    async fn unbalanced_quote_keeps_the_following_rows() {
        let b = body(&[
            "station,valid,metar\n",
            "KAAA,2024-01-01 00:51,KAAA 010051Z RMK 5\" SNOW\n",
            "KBBB,2024-01-01 00:51,KBBB 010051Z 18010KT\n",
            "KCCC,2024-01-01 00:51,KCCC 010051Z VV001\n",
            "KDDD,2024-01-01 00:51,KDDD 010051Z -RA\n",
        ]);
        let mut texts = Vec::new();
        let summary = for_each_report(b, &METAR_COLUMNS, 1, 1000, |r| texts.push(r.text))
            .await
            .unwrap();
        assert_eq!(summary.rows, 4);
        assert_eq!(summary.reports, 4);
        assert_eq!(texts[0], "KAAA 010051Z RMK 5\" SNOW");
        assert!(texts[1].starts_with("KBBB "));
        assert!(texts[3].starts_with("KDDD "));
    }

    #[tokio::test]
    async fn missing_column_aborts_the_stream_quietly() {
        let b = body(&["station,valid,raw\n", "KJFK,2024-06-01 00:51,whatever\n"]);
        let mut n = 0;
        let summary = for_each_report(b, &METAR_COLUMNS, 1, 1000, |_| n += 1)
            .await
            .unwrap();
        assert!(summary.schema_error);
        assert_eq!(n, 0);
        assert_eq!(summary.rows, 0);
    }

    #[tokio::test]
    async fn empty_body_yields_nothing() {
        let summary = for_each_report(body(&[]), &METAR_COLUMNS, 1, 1000, |_| {})
            .await
            .unwrap();
        assert_eq!(summary, StreamSummary::default());
    }

    #[tokio::test]
    async fn transport_error_mid_body_is_reported() {
        let items: Vec<Result<Bytes, FetchError>> = vec![
            Ok(Bytes::from_static(b"valid,metar\n2024-01-01 00:00,A\n")),
            Err(FetchError::Transport("connection reset".into())),
        ];
        let err = for_each_report(stream::iter(items).boxed(), &METAR_COLUMNS, 1, 100, |_| {})
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
