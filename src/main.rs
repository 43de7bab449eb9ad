use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::PathBuf,
};

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use tracing_subscriber::EnvFilter;

use flatdb::{Inserted, Record, Registry, Schema, SortedRecordStore};

#[derive(Parser)]
#[command(
    name = "flatdb",
    about = "Sorted fixed-width record stores kept in flat files",
    version
)]
struct Cli {
    /// Directory holding one subdirectory per store
    #[arg(short, long, env = "FLATDB_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Set the logging level, overriding RUST_LOG
    #[arg(short, long, value_enum)]
    log_level: Option<LogLevel>,

    /// Print records as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create a store from a .csv file whose first column is the primary key
    Create { name: String, csv: PathBuf },

    /// List the stores in the data directory
    List,

    /// Show the record with the given key
    Show { store: String, key: u64 },

    /// Insert a record, one value per field
    Insert {
        store: String,
        #[arg(required = true)]
        values: Vec<String>,
    },

    /// Change one non-key field of a record
    Update {
        store: String,
        key: u64,
        field: String,
        value: String,
    },

    /// Delete the record with the given key
    Delete { store: String, key: u64 },

    /// Print the first records in key order
    Report {
        store: String,
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
        /// Write the report to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the records whose keys fall in an inclusive range
    Range {
        store: String,
        #[arg(long)]
        from: Option<u64>,
        #[arg(long)]
        to: Option<u64>,
    },
}

struct Printer {
    json: bool,
}

impl Printer {
    /// Writes `rows` to `w`, with their slot numbers where known.
    fn records<W: Write>(
        &self,
        w: &mut W,
        schema: &Schema,
        rows: &[(Option<usize>, Record)],
    ) -> anyhow::Result<()> {
        if self.json {
            for (slot, record) in rows {
                let mut object = Map::new();
                if let Some(slot) = slot {
                    object.insert("slot".into(), json!(slot));
                }
                for (field, value) in schema.fields().iter().zip(record.values()) {
                    object.insert(field.name.clone(), Value::String(value.clone()));
                }
                writeln!(w, "{}", serde_json::to_string(&object)?)?;
            }
            return Ok(());
        }

        if rows.is_empty() {
            writeln!(w, "no records")?;
            return Ok(());
        }
        let widths: Vec<usize> = schema
            .fields()
            .iter()
            .map(|f| f.width.max(f.name.len()))
            .collect();
        let mut header = format!("{:>6}", "slot");
        for (field, width) in schema.fields().iter().zip(&widths) {
            header += &format!("  {:<width$}", field.name, width = *width);
        }
        writeln!(w, "{}", header.trim_end())?;
        for (slot, record) in rows {
            let slot = slot.map(|i| i.to_string()).unwrap_or_default();
            let mut line = format!("{:>6}", slot);
            for (value, width) in record.values().iter().zip(&widths) {
                line += &format!("  {:<width$}", value, width = *width);
            }
            writeln!(w, "{}", line.trim_end())?;
        }
        Ok(())
    }

    fn print_records(&self, schema: &Schema, rows: &[(Option<usize>, Record)]) -> anyhow::Result<()> {
        self.records(&mut io::stdout().lock(), schema, rows)
    }

    fn message(&self, text: &str) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(&json!({ "message": text }))?);
        } else {
            println!("{}", text);
        }
        Ok(())
    }
}

fn schema_of<D: flatdb::fs::DbDir>(store: &SortedRecordStore<D>) -> anyhow::Result<Schema> {
    store
        .schema()
        .cloned()
        .ok_or_else(|| anyhow!("store has no schema"))
}

/// Opens `name`, runs `f` against it, and closes it again whether or not `f`
/// succeeded.
fn with_store<T>(
    registry: &mut Registry,
    name: &str,
    f: impl FnOnce(&mut SortedRecordStore<flatdb::fs::OsDir>) -> anyhow::Result<T>,
) -> anyhow::Result<T> {
    registry
        .open_store(name)
        .with_context(|| format!("opening store {:?}", name))?;
    let result = match registry.current_mut() {
        Some(store) => f(store),
        None => Err(anyhow!("store {:?} did not open", name)),
    };
    registry.close_store()?;
    result
}

fn run(registry: &mut Registry, command: Commands, out: &Printer) -> anyhow::Result<()> {
    match command {
        Commands::Create { name, csv } => {
            registry
                .create_store(&name, &csv)
                .with_context(|| format!("creating store {:?} from {}", name, csv.display()))?;
            out.message(&format!("created store {}", name))
        }
        Commands::List => {
            for store in registry.stores() {
                let (name, slots, schema) = match (store.name(), store.num_slots(), store.schema()) {
                    (Some(name), Some(slots), Some(schema)) => (name, slots, schema),
                    _ => continue,
                };
                if out.json {
                    let line = json!({ "name": name, "slots": slots, "schema": schema });
                    println!("{}", serde_json::to_string(&line)?);
                } else {
                    println!("{:<20} {:>8} slots  {}", name, slots, schema);
                }
            }
            Ok(())
        }
        Commands::Show { store, key } => with_store(registry, &store, |s| {
            let (index, record) = s.find(key)?;
            out.print_records(&schema_of(s)?, &[(Some(index), record)])
        }),
        Commands::Insert { store, values } => with_store(registry, &store, |s| {
            let key = values.first().cloned().unwrap_or_default();
            let message = match s.insert(Record::new(values))? {
                Inserted::Gap(i) => format!("inserted {} at slot {}", key, i),
                Inserted::Rewrite(i) => format!(
                    "inserted {} at slot {} after rewriting to {} slots",
                    key,
                    i,
                    s.num_slots().unwrap_or_default()
                ),
            };
            out.message(&message)
        }),
        Commands::Update {
            store,
            key,
            field,
            value,
        } => with_store(registry, &store, |s| {
            let (index, record) = s.find(key)?;
            let updated = s.update(index, &record, &field, &value)?;
            out.print_records(&schema_of(s)?, &[(Some(index), updated)])
        }),
        Commands::Delete { store, key } => with_store(registry, &store, |s| {
            let (index, _) = s.find(key)?;
            s.delete(index)?;
            out.message(&format!("deleted {} from slot {}", key, index))
        }),
        Commands::Report {
            store,
            count,
            output,
        } => with_store(registry, &store, |s| {
            let rows: Vec<(Option<usize>, Record)> =
                s.scan_first_n(count)?.into_iter().map(|r| (None, r)).collect();
            let schema = schema_of(s)?;
            match output {
                Some(path) => {
                    let file = File::create(&path)
                        .with_context(|| format!("creating report {}", path.display()))?;
                    let mut w = BufWriter::new(file);
                    out.records(&mut w, &schema, &rows)?;
                    w.flush()?;
                    out.message(&format!("report written to {}", path.display()))
                }
                None => out.print_records(&schema, &rows),
            }
        }),
        Commands::Range { store, from, to } => with_store(registry, &store, |s| {
            let rows = match (from, to) {
                (Some(from), Some(to)) => s.scan_range(from..=to)?,
                (Some(from), None) => s.scan_range(from..)?,
                (None, Some(to)) => s.scan_range(..=to)?,
                (None, None) => s.scan_range(..)?,
            };
            let rows: Vec<(Option<usize>, Record)> =
                rows.into_iter().map(|(i, r)| (Some(i), r)).collect();
            out.print_records(&schema_of(s)?, &rows)
        }),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.log_level {
        Some(level) => EnvFilter::new(level.directive()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut registry = Registry::new(&cli.data_dir)
        .with_context(|| format!("loading stores from {}", cli.data_dir.display()))?;
    let out = Printer { json: cli.json };
    run(&mut registry, cli.command, &out)
}

#[cfg(test)]
mod test {
    use std::fs;

    use flatdb::{Record, Registry};

    use super::{run, Commands, Printer};

    fn registry_with_people(root: &std::path::Path, sources: &std::path::Path) -> Registry {
        let csv = sources.join("people.csv");
        fs::write(&csv, "id,name\n9,carol\n1,alice\n5,bob\n").unwrap();
        let mut registry = Registry::new(root).unwrap();
        registry.create_store("people", &csv).unwrap();
        registry
    }

    #[test]
    fn test_report_to_file() {
        let root = tempfile::tempdir().unwrap();
        let sources = tempfile::tempdir().unwrap();
        let mut registry = registry_with_people(root.path(), sources.path());

        let report = sources.path().join("report.txt");
        let command = Commands::Report {
            store: "people".into(),
            count: 2,
            output: Some(report.clone()),
        };
        run(&mut registry, command, &Printer { json: false }).unwrap();

        assert_eq!(
            "  slot  id  name\n        1   alice\n        5   bob\n",
            fs::read_to_string(&report).unwrap()
        );
        // The store is closed again afterwards.
        assert!(registry.current().is_none());
    }

    #[test]
    fn test_json_records() {
        let schema = flatdb::Schema::parse("id:1,name:5").unwrap();
        let rows = vec![
            (Some(3), Record::from(vec!["5", "bob"])),
            (None, Record::from(vec!["9", "carol"])),
        ];
        let mut buf = Vec::new();
        Printer { json: true }.records(&mut buf, &schema, &rows).unwrap();
        assert_eq!(
            "{\"id\":\"5\",\"name\":\"bob\",\"slot\":3}\n{\"id\":\"9\",\"name\":\"carol\"}\n",
            String::from_utf8(buf).unwrap()
        );
    }
}
