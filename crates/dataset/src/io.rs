//! CSV persistence for frames and raw news rows.
//!
//! Frames go through the polars CSV reader and writer. Nulls are empty
//! fields, hours use `YYYY-MM-DD HH:00:00` and flags are `true`/`false`.
//! On read, `datetime` is parsed as a time column. Without a schema every
//! other column is inferred from its non-empty fields and a column with no
//! values at all is text.

use newsbar_core::{Column, ColumnKind, Frame, NewsRecord, Result, TimePoint, DATETIME};
use polars::prelude::{
    CsvReadOptions, CsvWriter, DataType, Field, PlSmallStr, Schema, SerReader, SerWriter,
};
use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Write `frame` as CSV.
pub fn write_frame<W: Write>(frame: &Frame, mut writer: W) -> Result<()> {
    let mut df = frame.as_polars().clone();
    CsvWriter::new(&mut writer)
        .include_header(true)
        .with_datetime_format(Some(DATETIME_FORMAT.to_string()))
        .finish(&mut df)?;
    writer.flush()?;
    Ok(())
}

/// Write `frame` to a file, replacing it.
pub fn save_frame<P: AsRef<Path>>(frame: &Frame, path: P) -> Result<()> {
    let path = path.as_ref();
    write_frame(frame, File::create(path)?)?;
    info!(path = %path.display(), rows = frame.len(), columns = frame.width(), "saved frame");
    Ok(())
}

fn read_bytes<R: Read>(mut reader: R) -> Result<Cursor<Vec<u8>>> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    Ok(Cursor::new(bytes))
}

/// Reparse a text column of hour stamps. Unparseable stamps are an error.
fn parse_times(frame: &mut Frame, name: &str) -> Result<()> {
    if !frame.contains(name) || frame.kind(name)? == ColumnKind::Time {
        return Ok(());
    }
    let times = frame
        .texts(name)?
        .into_iter()
        .map(|field| field.map(|s| s.parse::<TimePoint>()).transpose())
        .collect::<Result<Vec<_>>>()?;
    frame.insert(name, Column::Time(times))
}

/// Read a CSV written by [`write_frame`], inferring column kinds.
pub fn read_frame<R: Read>(reader: R) -> Result<Frame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .into_reader_with_file_handle(read_bytes(reader)?)
        .finish()?;
    let mut frame = Frame::from_polars(df)?;
    parse_times(&mut frame, DATETIME)?;
    Ok(frame)
}

/// Read a CSV whose column kinds are known up front.
///
/// Text stays text even when every field looks like a number.
pub fn read_frame_with_schema<R: Read>(reader: R, schema: &[(String, ColumnKind)]) -> Result<Frame> {
    let fields = schema.iter().map(|(name, kind)| {
        // hours are parsed after the read
        let dtype = match kind {
            ColumnKind::Time => DataType::String,
            other => other.dtype(),
        };
        Field::new(PlSmallStr::from(name.as_str()), dtype)
    });
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_schema(Some(Arc::new(Schema::from_iter(fields))))
        .into_reader_with_file_handle(read_bytes(reader)?)
        .finish()?;
    let mut frame = Frame::from_polars(df)?;
    for (name, kind) in schema {
        if *kind == ColumnKind::Time {
            parse_times(&mut frame, name)?;
        }
    }
    Ok(frame)
}

pub fn load_frame<P: AsRef<Path>>(path: P) -> Result<Frame> {
    read_frame(File::open(path)?)
}

/// Deserialize raw news rows (one per article, ticker and topic).
pub fn read_news<R: Read>(reader: R) -> Result<Vec<NewsRecord>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let records = rdr
        .deserialize::<NewsRecord>()
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(records)
}

pub fn load_news<P: AsRef<Path>>(path: P) -> Result<Vec<NewsRecord>> {
    let path = path.as_ref();
    let records = read_news(File::open(path)?)?;
    info!(path = %path.display(), rows = records.len(), "loaded news");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use newsbar_core::{CLOSE, IS_SYNTHETIC, TICKER};

    fn sample() -> Frame {
        Frame::from_columns(vec![
            (TICKER, Column::Text(vec![Some("NVDA".into()), None, Some("NVDA".into())])),
            (
                DATETIME,
                Column::Time(vec![
                    TimePoint::from_ymdh(2024, 3, 4, 9),
                    TimePoint::from_ymdh(2024, 3, 4, 10),
                    TimePoint::from_ymdh(2024, 3, 4, 11),
                ]),
            ),
            (CLOSE, Column::Number(vec![Some(101.25), None, Some(0.1)])),
            ("rsi_5", Column::Number(vec![Some(2.5), Some(-3.0), None])),
            (IS_SYNTHETIC, Column::Flag(vec![false, true, false])),
        ])
        .unwrap()
    }

    #[test]
    fn test_csv_round_trip() {
        let frame = sample();
        let mut buf = Vec::new();
        write_frame(&frame, &mut buf).unwrap();
        let loaded = read_frame(buf.as_slice()).unwrap();

        assert_eq!(loaded.names(), frame.names());
        assert_eq!(loaded, frame);
    }

    #[test]
    fn test_csv_layout() {
        let mut buf = Vec::new();
        write_frame(&sample(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("ticker,datetime,close,rsi_5,is_synthetic"));
        assert_eq!(lines.next(), Some("NVDA,2024-03-04 09:00:00,101.25,2.5,false"));
        assert_eq!(lines.next(), Some(",2024-03-04 10:00:00,,-3.0,true"));
    }

    #[test]
    fn test_bad_datetime_is_error() {
        let csv = "datetime,close\nyesterday,1\n";
        assert!(read_frame(csv.as_bytes()).is_err());
    }

    #[test]
    fn test_empty_column_reads_as_text() {
        let csv = "datetime,close,note\n2024-03-04 09:00:00,1,\n2024-03-04 10:00:00,2,\n";
        let frame = read_frame(csv.as_bytes()).unwrap();
        assert_eq!(frame.kind(CLOSE).unwrap(), ColumnKind::Number);
        assert_eq!(frame.kind("note").unwrap(), ColumnKind::Text);
        assert_eq!(frame.texts("note").unwrap(), vec![None, None]);
    }

    #[test]
    fn test_schema_keeps_numeric_text() {
        let csv = "ticker,datetime,close\n123,2024-03-04 09:00:00,5\n";
        let schema = vec![
            (TICKER.to_string(), ColumnKind::Text),
            (DATETIME.to_string(), ColumnKind::Time),
            (CLOSE.to_string(), ColumnKind::Number),
        ];
        let frame = read_frame_with_schema(csv.as_bytes(), &schema).unwrap();
        assert_eq!(frame.texts(TICKER).unwrap(), vec![Some("123".to_string())]);
        assert_eq!(frame.times(DATETIME).unwrap(), vec![TimePoint::from_ymdh(2024, 3, 4, 9)]);
        assert_eq!(frame.numbers(CLOSE).unwrap(), vec![Some(5.0)]);

        // inference alone turns the same ticker into a number
        let inferred = read_frame(csv.as_bytes()).unwrap();
        assert_eq!(inferred.kind(TICKER).unwrap(), ColumnKind::Number);
    }

    #[test]
    fn test_read_news() {
        let csv = "title,datetime,ticker,overall_sentiment_score,overall_sentiment_label,\
relevance_score,ticker_sentiment_score,ticker_sentiment_label,affected_topic,\
affected_topic_relevance_score,topic\n\
Chips rally,2024-03-04 09:15:00,NVDA,0.3,Bullish,0.8,0.4,Bullish,Technology,0.9,\n";
        let records = read_news(csv.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.datetime, TimePoint::from_ymdh(2024, 3, 4, 9).unwrap());
        assert_eq!(r.relevance_score, Some(0.8));
        assert_eq!(r.affected_topic.as_deref(), Some("Technology"));
        assert_eq!(r.topic, None);
    }
}
