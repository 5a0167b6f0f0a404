use std::collections::HashMap;
use std::sync::Arc;

/// Ordered, unique column names shared by every row of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl Schema {
    /// Build a schema, renaming repeated headers to `name.1`, `name.2`, ...
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        let mut positions = HashMap::new();

        for name in names {
            let base: String = name.into();
            let mut candidate = base.clone();
            let mut n = 1;
            while positions.contains_key(&candidate) {
                candidate = format!("{}.{}", base, n);
                n += 1;
            }
            positions.insert(candidate.clone(), out.len());
            out.push(candidate);
        }

        Schema {
            names: out,
            positions,
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }
}

/// One input record. Identity is its zero-based position in the source table.
#[derive(Debug, Clone)]
pub struct Row {
    index: usize,
    schema: Arc<Schema>,
    cells: Vec<Option<String>>,
}

impl Row {
    /// Cells beyond the schema width are dropped, missing ones become `None`.
    pub fn new(index: usize, schema: Arc<Schema>, mut cells: Vec<Option<String>>) -> Self {
        cells.resize(schema.len(), None);
        Row {
            index,
            schema,
            cells,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        let pos = self.schema.position(column)?;
        self.cells[pos].as_deref()
    }

    pub fn cell(&self, pos: usize) -> Option<&str> {
        self.cells.get(pos).and_then(|c| c.as_deref())
    }

    /// Cells in schema order.
    pub fn cells(&self) -> impl Iterator<Item = Option<&str>> {
        self.cells.iter().map(|c| c.as_deref())
    }

    /// `(column, value)` pairs in schema order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.schema
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.cells())
    }
}

/// The tabular interface handed to the engine by the ingestion side.
#[derive(Debug, Clone)]
pub struct Table {
    schema: Arc<Schema>,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(schema: Schema) -> Self {
        Table {
            schema: Arc::new(schema),
            rows: Vec::new(),
        }
    }

    /// Append a record; its index is the current row count.
    pub fn push(&mut self, cells: Vec<Option<String>>) {
        let row = Row::new(self.rows.len(), Arc::clone(&self.schema), cells);
        self.rows.push(row);
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Convenience for tests and callers building tables from literals.
impl<const N: usize> From<([&str; N], Vec<[&str; N]>)> for Table {
    fn from((headers, rows): ([&str; N], Vec<[&str; N]>)) -> Self {
        let mut table = Table::new(Schema::new(headers));
        for row in rows {
            let cells = row
                .iter()
                .map(|c| (!c.is_empty()).then(|| c.to_string()))
                .collect();
            table.push(cells);
        }
        table
    }
}
