//! Columnar table shared by every pipeline stage.
//!
//! A `Frame` wraps a polars [`DataFrame`] restricted to four column kinds:
//! `Float64` numbers, `String` text, millisecond `Datetime` hours and
//! `Boolean` flags. `None` marks a missing cell; flags are never missing and
//! a computed `NaN` is stored as null.

use polars::functions::concat_df_diagonal;
use polars::prelude::{
    col, lit, BooleanChunked, ChunkFull, DataFrame, DataType, Expr, FillNullStrategy, IdxCa,
    IdxSize, Int64Chunked, IntoColumn, IntoLazy, IntoSeries, JoinArgs, JoinCoalesce, JoinType,
    NamedFrom, NewChunkedArray, PlSmallStr, Series, SortMultipleOptions, TimeUnit,
    UniqueKeepStrategy,
};
use std::fmt;

use crate::error::{Error, Result};
use crate::rolling::nan_to_none;
use crate::types::TimePoint;

/// Scratch column that carries left row order through a join.
const ROW_ORDER: &str = "__row_order";

/// A single typed column, owned outside the frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Number(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
    Time(Vec<Option<TimePoint>>),
    Flag(Vec<bool>),
}

/// Kind of a stored column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Number,
    Text,
    Time,
    Flag,
}

/// Join flavour for [`Frame::join`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// Keep every left row, in left order.
    Left,
    /// Keep every row of both sides, sorted by key.
    Outer,
}

impl ColumnKind {
    /// Polars type a column of this kind is stored as.
    pub fn dtype(self) -> DataType {
        match self {
            ColumnKind::Number => DataType::Float64,
            ColumnKind::Text => DataType::String,
            ColumnKind::Time => DataType::Datetime(TimeUnit::Milliseconds, None),
            ColumnKind::Flag => DataType::Boolean,
        }
    }

    /// Kind a polars type is normalised to, if it is supported at all.
    fn of(dtype: &DataType) -> Option<ColumnKind> {
        match dtype {
            DataType::Float64
            | DataType::Float32
            | DataType::Int64
            | DataType::Int32
            | DataType::UInt64
            | DataType::UInt32 => Some(ColumnKind::Number),
            DataType::String | DataType::Null => Some(ColumnKind::Text),
            DataType::Datetime(_, _) => Some(ColumnKind::Time),
            DataType::Boolean => Some(ColumnKind::Flag),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnKind::Number => "number",
            ColumnKind::Text => "text",
            ColumnKind::Time => "time",
            ColumnKind::Flag => "flag",
        };
        f.write_str(name)
    }
}

fn unsupported(series: &Series) -> Error {
    Error::schema(format!(
        "column '{}' has unsupported type {}",
        series.name(),
        series.dtype()
    ))
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Number(v) => v.len(),
            Column::Text(v) => v.len(),
            Column::Time(v) => v.len(),
            Column::Flag(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            Column::Number(_) => ColumnKind::Number,
            Column::Text(_) => ColumnKind::Text,
            Column::Time(_) => ColumnKind::Time,
            Column::Flag(_) => ColumnKind::Flag,
        }
    }

    fn into_series(self, name: &str) -> Series {
        let name = PlSmallStr::from(name);
        match self {
            Column::Number(v) => {
                let values: Vec<Option<f64>> = v.into_iter().map(|x| x.and_then(nan_to_none)).collect();
                Series::new(name, values)
            }
            Column::Text(v) => Series::new(name, v),
            Column::Time(v) => Int64Chunked::from_iter_options(
                name,
                v.into_iter().map(|t| t.map(|t| t.timestamp_millis())),
            )
            .into_datetime(TimeUnit::Milliseconds, None)
            .into_series(),
            Column::Flag(v) => Series::new(name, v),
        }
    }

    fn from_series(series: &Series) -> Result<Column> {
        let kind = ColumnKind::of(series.dtype()).ok_or_else(|| unsupported(series))?;
        let stored = series.cast(&kind.dtype())?;
        let column = match kind {
            ColumnKind::Number => Column::Number(
                stored.f64()?.into_iter().map(|v| v.and_then(nan_to_none)).collect(),
            ),
            ColumnKind::Text => Column::Text(
                stored.str()?.into_iter().map(|v| v.map(str::to_string)).collect(),
            ),
            ColumnKind::Time => {
                let millis = stored.cast(&DataType::Int64)?;
                Column::Time(
                    millis
                        .i64()?
                        .into_iter()
                        .map(|v| v.and_then(TimePoint::from_timestamp_millis))
                        .collect(),
                )
            }
            ColumnKind::Flag => Column::Flag(
                stored.bool()?.into_iter().map(|v| v.unwrap_or(false)).collect(),
            ),
        };
        Ok(column)
    }
}

/// Ordered collection of named columns of equal length.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    df: DataFrame,
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.names() == other.names() && self.df.equals_missing(&other.df)
    }
}

impl Frame {
    /// Create an empty frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a frame from `(name, column)` pairs.
    pub fn from_columns<S: Into<String>>(columns: Vec<(S, Column)>) -> Result<Self> {
        let mut frame = Frame::new();
        for (name, column) in columns {
            frame.insert(name, column)?;
        }
        Ok(frame)
    }

    /// Adopt a polars frame, casting integer columns to numbers and
    /// all-null columns to text.
    pub fn from_polars(df: DataFrame) -> Result<Self> {
        let columns = df
            .get_columns()
            .iter()
            .map(|column| {
                let series = column.as_materialized_series();
                let kind = ColumnKind::of(series.dtype()).ok_or_else(|| unsupported(series))?;
                Ok(series.cast(&kind.dtype())?.into_column())
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            df: DataFrame::new(columns)?,
        })
    }

    pub fn as_polars(&self) -> &DataFrame {
        &self.df
    }

    /// Add a column, or replace an existing one in place.
    pub fn insert(&mut self, name: impl Into<String>, column: Column) -> Result<()> {
        let name = name.into();
        if self.width() > 0 && column.len() != self.len() {
            return Err(Error::schema(format!(
                "column '{}' has {} rows, frame has {}",
                name,
                column.len(),
                self.len()
            )));
        }
        let series = column.into_series(&name);
        if self.width() == 0 {
            self.df = DataFrame::new(vec![series.into_column()])?;
        } else {
            self.df.with_column(series)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        if self.df.width() == 0 {
            0
        } else {
            self.df.height()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.df.width()
    }

    pub fn names(&self) -> Vec<String> {
        self.df
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.df.get_column_index(name).is_some()
    }

    fn series(&self, name: &str) -> Result<&Series> {
        self.df
            .column(name)
            .map(|c| c.as_materialized_series())
            .map_err(|_| Error::missing_column(name))
    }

    pub fn kind(&self, name: &str) -> Result<ColumnKind> {
        let series = self.series(name)?;
        ColumnKind::of(series.dtype()).ok_or_else(|| unsupported(series))
    }

    /// `(name, kind)` of every column, in column order.
    pub fn schema(&self) -> Result<Vec<(String, ColumnKind)>> {
        self.names()
            .into_iter()
            .map(|name| {
                let kind = self.kind(&name)?;
                Ok((name, kind))
            })
            .collect()
    }

    /// Names of the columns of one kind, in column order.
    pub fn names_of(&self, kind: ColumnKind) -> Result<Vec<String>> {
        Ok(self
            .schema()?
            .into_iter()
            .filter(|(_, k)| *k == kind)
            .map(|(n, _)| n)
            .collect())
    }

    /// Copy a column out of the frame.
    pub fn column(&self, name: &str) -> Result<Column> {
        Column::from_series(self.series(name)?)
    }

    pub fn numbers(&self, name: &str) -> Result<Vec<Option<f64>>> {
        match self.column(name)? {
            Column::Number(v) => Ok(v),
            other => Err(wrong_kind(name, ColumnKind::Number, other.kind())),
        }
    }

    pub fn texts(&self, name: &str) -> Result<Vec<Option<String>>> {
        match self.column(name)? {
            Column::Text(v) => Ok(v),
            other => Err(wrong_kind(name, ColumnKind::Text, other.kind())),
        }
    }

    pub fn times(&self, name: &str) -> Result<Vec<Option<TimePoint>>> {
        match self.column(name)? {
            Column::Time(v) => Ok(v),
            other => Err(wrong_kind(name, ColumnKind::Time, other.kind())),
        }
    }

    pub fn flags(&self, name: &str) -> Result<Vec<bool>> {
        match self.column(name)? {
            Column::Flag(v) => Ok(v),
            other => Err(wrong_kind(name, ColumnKind::Flag, other.kind())),
        }
    }

    /// Fail with a schema error naming every absent column.
    pub fn require(&self, names: &[&str]) -> Result<()> {
        let missing: Vec<&str> = names.iter().copied().filter(|n| !self.contains(n)).collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::schema(format!("missing required columns {missing:?}")))
        }
    }

    /// Drop a column; returns false if it was absent.
    pub fn remove(&mut self, name: &str) -> bool {
        let removed = self.df.drop_in_place(name).is_ok();
        if self.df.width() == 0 {
            self.df = DataFrame::default();
        }
        removed
    }

    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        self.require(&[from])?;
        self.df.rename(from, PlSmallStr::from(to))?;
        Ok(())
    }

    /// Keep only `names`, in the given order.
    pub fn select(&self, names: &[&str]) -> Result<Frame> {
        self.require(names)?;
        Ok(Self {
            df: self.df.select(names.iter().copied())?,
        })
    }

    /// Gather rows by index.
    pub fn take(&self, idx: &[usize]) -> Result<Frame> {
        let idx: Vec<IdxSize> = idx.iter().map(|&i| i as IdxSize).collect();
        let idx = IdxCa::from_vec(PlSmallStr::EMPTY, idx);
        Ok(Self {
            df: self.df.take(&idx)?,
        })
    }

    /// Keep the rows whose mask entry is true.
    pub fn filter(&self, keep: &[bool]) -> Result<Frame> {
        let mask = BooleanChunked::from_slice(PlSmallStr::EMPTY, keep);
        Ok(Self {
            df: self.df.filter(&mask)?,
        })
    }

    /// Append the rows of `other`, taking the union of both schemas.
    ///
    /// Columns present on only one side are null-padded on the other.
    pub fn concat(&mut self, other: &Frame) -> Result<()> {
        if self.width() == 0 {
            *self = other.clone();
        } else if other.width() > 0 {
            self.df = concat_df_diagonal(&[self.df.clone(), other.df.clone()])?;
        }
        Ok(())
    }

    /// Per row, whether any cell is null.
    pub fn null_rows(&self) -> Vec<bool> {
        let mut mask = BooleanChunked::full(PlSmallStr::EMPTY, false, self.len());
        for column in self.df.get_columns() {
            mask = &mask | &column.as_materialized_series().is_null();
        }
        mask.into_iter().map(|v| v.unwrap_or(false)).collect()
    }

    /// Rows without a null cell.
    pub fn drop_nulls(&self) -> Result<Frame> {
        Ok(Self {
            df: self.df.drop_nulls::<String>(None)?,
        })
    }

    /// Stable sort by a time column; null keys sort last.
    pub fn sort_by_time(&mut self, name: &str) -> Result<()> {
        let kind = self.kind(name)?;
        if kind != ColumnKind::Time {
            return Err(wrong_kind(name, ColumnKind::Time, kind));
        }
        self.df = self.df.sort(
            [name],
            SortMultipleOptions::default()
                .with_maintain_order(true)
                .with_nulls_last(true),
        )?;
        Ok(())
    }

    /// Drop rows whose key tuple repeats later, keeping the last occurrence.
    pub fn dedup_keep_last(&self, keys: &[&str]) -> Result<Frame> {
        self.require(keys)?;
        let subset: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        Ok(Self {
            df: self
                .df
                .unique_stable(Some(&subset), UniqueKeepStrategy::Last, None)?,
        })
    }

    /// Evaluate expressions against the frame, adding or replacing columns.
    pub fn with_exprs(&mut self, exprs: Vec<Expr>) -> Result<()> {
        if exprs.is_empty() || self.width() == 0 {
            return Ok(());
        }
        self.df = self.df.clone().lazy().with_columns(exprs).collect()?;
        Ok(())
    }

    /// Set every null cell of every number column to `value`.
    pub fn fill_numeric_nulls(&mut self, value: f64) -> Result<()> {
        let exprs = self
            .names_of(ColumnKind::Number)?
            .iter()
            .map(|name| col(name.as_str()).fill_null(lit(value)))
            .collect();
        self.with_exprs(exprs)
    }

    /// Propagate the last valid value forward in every column.
    pub fn fill_forward(&mut self) -> Result<()> {
        self.df = self.df.fill_null(FillNullStrategy::Forward(None))?;
        Ok(())
    }

    /// Propagate the next valid value backward in every column.
    pub fn fill_backward(&mut self) -> Result<()> {
        self.df = self.df.fill_null(FillNullStrategy::Backward(None))?;
        Ok(())
    }

    /// Distinct values of a text column, in order of first appearance.
    pub fn distinct_texts(&self, name: &str) -> Result<Vec<String>> {
        let kind = self.kind(name)?;
        if kind != ColumnKind::Text {
            return Err(wrong_kind(name, ColumnKind::Text, kind));
        }
        let distinct = self.series(name)?.unique_stable()?;
        Ok(distinct
            .str()?
            .into_iter()
            .flatten()
            .map(str::to_string)
            .collect())
    }

    /// Join `right` onto `self` on the `on` columns.
    ///
    /// Non-key column names must not collide. Null keys never match. A key
    /// that repeats on the right produces one output row per match.
    pub fn join(&self, right: &Frame, on: &[&str], how: JoinKind) -> Result<Frame> {
        self.require(on)?;
        right.require(on)?;
        if let Some(dup) = right
            .names()
            .into_iter()
            .find(|n| !on.contains(&n.as_str()) && self.contains(n))
        {
            return Err(Error::schema(format!("join would duplicate column '{dup}'")));
        }

        let keys: Vec<Expr> = on.iter().map(|k| col(*k)).collect();
        let args = match how {
            JoinKind::Left => JoinArgs::new(JoinType::Left),
            JoinKind::Outer => {
                JoinArgs::new(JoinType::Full).with_coalesce(JoinCoalesce::CoalesceColumns)
            }
        };
        let mut joined = self
            .df
            .clone()
            .lazy()
            .with_row_index(ROW_ORDER, None)
            .join(right.df.clone().lazy(), keys.clone(), keys, args)
            .collect()?;

        let order: Vec<&str> = match how {
            JoinKind::Left => vec![ROW_ORDER],
            JoinKind::Outer => on.to_vec(),
        };
        joined = joined.sort(
            order,
            SortMultipleOptions::default()
                .with_maintain_order(true)
                .with_nulls_last(true),
        )?;
        joined.drop_in_place(ROW_ORDER)?;
        Ok(Self { df: joined })
    }
}

fn wrong_kind(name: &str, wanted: ColumnKind, got: ColumnKind) -> Error {
    Error::schema(format!("column '{name}' is a {got} column, expected {wanted}"))
}
