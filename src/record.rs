use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

/// Ordered field names taken verbatim from the header line.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    fields: Vec<String>,
}

impl Schema {
    fn from_header(line: &str) -> Self {
        Schema {
            fields: line.split(',').map(str::to_string).collect(),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == name)
    }
}

/// One data line, a name -> value mapping backed by the dataset schema.
/// Values always have exactly one entry per schema field.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    schema: Arc<Schema>,
    values: Vec<String>,
}

impl Record {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.schema.position(name).map(|idx| self.values[idx].as_str())
    }

    pub fn value(&self, idx: usize) -> &str {
        self.values.get(idx).map(String::as_str).unwrap_or("")
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.schema
            .fields()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(String::as_str))
    }

    /// Image reference in `field`, `None` when the field is absent or empty.
    pub fn image_ref(&self, field: &str) -> Option<&str> {
        self.get(field).filter(|v| !v.is_empty())
    }

    /// Single CSV line of all values, quoting values that would otherwise be mis-split.
    pub fn to_csv_line(&self) -> String {
        self.values
            .iter()
            .map(|v| wrap_cell_content(v))
            .collect::<Vec<String>>()
            .join(",")
    }
}

fn wrap_cell_content(c: &str) -> String {
    let needs_escaping = c.contains('"');
    let needs_wrapping = c.chars().any(|c| c == ' ' || c == '\t' || c == ',');
    let mut out = c.to_string();

    if needs_escaping {
        out = out.replace('"', "\"\"");
    }
    if needs_escaping || needs_wrapping {
        out = format!("\"{out}\"");
    }
    out
}

/// The full record set, loaded once and never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    schema: Arc<Schema>,
    records: Vec<Record>,
}

impl Dataset {
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn get(&self, idx: usize) -> Option<&Record> {
        self.records.get(idx)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Parse comma delimited text. The first line is the header, every following
/// line that is not blank becomes one record. There is no quoting: embedded
/// commas split the value. Short rows are padded with empty strings, surplus
/// tokens are dropped.
pub fn parse(raw: &str) -> Dataset {
    if raw.is_empty() {
        return Dataset::default();
    }
    let start_time = Instant::now();
    let mut lines = raw.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l));
    let schema = Arc::new(Schema::from_header(lines.next().unwrap_or_default()));

    let mut records = Vec::new();
    let mut short_rows = 0;
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let mut values: Vec<String> = line
            .split(',')
            .take(schema.len())
            .map(str::to_string)
            .collect();
        if values.len() < schema.len() {
            short_rows += 1;
            values.resize(schema.len(), String::new());
        }
        records.push(Record {
            schema: Arc::clone(&schema),
            values,
        });
    }

    if short_rows > 0 {
        debug!("Padded {short_rows} rows with missing trailing fields");
    }
    info!(
        "Parsed {} records with {} fields in {}ms",
        records.len(),
        schema.len(),
        start_time.elapsed().as_millis()
    );

    Dataset { schema, records }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const STATIONS: &str = "StationEN,StationJA,TrainLine,imgurURL2
Tokyo,東京,Yamanote,http://x/1
Shibuya,渋谷,Yamanote,
Ueno,上野,Ginza,http://x/3
";

    #[test]
    fn parses_header_and_rows() {
        let ds = parse(STATIONS);
        assert_eq!(
            ds.schema().fields(),
            &["StationEN", "StationJA", "TrainLine", "imgurURL2"]
        );
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.records()[1].get("StationJA"), Some("渋谷"));
        assert_eq!(ds.records()[1].get("imgurURL2"), Some(""));
        assert_eq!(ds.records()[1].get("Platform"), None);
    }

    #[test]
    fn skips_blank_lines_and_pads_short_rows() {
        let ds = parse("a,b,c\n1,2,3\n\n4\n   \n5,6\n");
        assert_eq!(ds.len(), 3);
        for r in ds.records() {
            assert_eq!(r.values().len(), 3);
        }
        assert_eq!(ds.records()[1].values(), &["4", "", ""]);
        assert_eq!(ds.records()[2].values(), &["5", "6", ""]);
    }

    #[test]
    fn embedded_delimiter_is_mis_split() {
        let ds = parse("name,line\n\"Tokyo, Central\",JR\n");
        assert_eq!(ds.records()[0].values(), &["\"Tokyo", " Central\""]);
    }

    #[test]
    fn values_stay_text() {
        let ds = parse("id,count\n007,1e3\n");
        assert_eq!(ds.records()[0].get("id"), Some("007"));
        assert_eq!(ds.records()[0].get("count"), Some("1e3"));
    }

    #[test]
    fn crlf_and_empty_input() {
        let ds = parse("a,b\r\n1,2\r\n\r\n");
        assert_eq!(ds.schema().fields(), &["a", "b"]);
        assert_eq!(ds.records()[0].values(), &["1", "2"]);
        assert_eq!(ds.len(), 1);

        let empty = parse("");
        assert_eq!(empty.schema().len(), 0);
        assert!(empty.is_empty());
    }

    #[test]
    fn blank_header_still_yields_records() {
        let ds = parse("\nTokyo,1\nUeno,2\n");
        assert_eq!(ds.schema().fields(), &[""]);
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.records()[0].values(), &["Tokyo"]);
        assert_eq!(ds.records()[1].get(""), Some("Ueno"));
    }

    #[test]
    fn image_reference_fallback() {
        let ds = parse(STATIONS);
        assert_eq!(ds.records()[0].image_ref("imgurURL2"), Some("http://x/1"));
        assert_eq!(ds.records()[1].image_ref("imgurURL2"), None);
        assert_eq!(ds.records()[0].image_ref("missing"), None);
    }

    #[test]
    fn csv_line_quotes_when_needed() {
        let ds = parse("a,b,c\nLine 1,x,say \"hi\"\n");
        assert_eq!(
            ds.records()[0].to_csv_line(),
            "\"Line 1\",x,\"say \"\"hi\"\"\""
        );
    }

    #[test]
    fn fixture_file_parses() {
        let ds = parse(include_str!("../tests/fixtures/stations.csv"));
        assert_eq!(ds.schema().len(), 4);
        assert!(ds.records().iter().all(|r| r.values().len() == 4));
        assert_eq!(ds.len(), 12);
    }
}
