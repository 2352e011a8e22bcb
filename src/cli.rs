//! Command line: cast | validate | describe
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use rayon::prelude::*;

use json_cast::model::Model;
use json_cast::property::{PropertyDescriptor, PropertyType};
use json_cast::schema::Schema;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// cast JSON documents into typed object graphs declared by a schema file
#[derive(Parser, Debug)]
#[command(name = "json-cast", version)]
pub struct CommandLineInterface {
    /// debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// cast each document and print its plain projection
    Cast(CastOut),
    /// cast each document and report its validity
    Validate(ValidateOut),
    /// print the property table of every class in the schema
    Describe(DescribeOut),
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// JSON Pointer to select a subnode in each document (e.g. /data/items/0/payload)
    #[arg(long)]
    json_pointer: Option<String>,

    /// JQ pre-process filter for each document.
    #[arg(long)]
    jq_expr: Option<String>,

    /// One or more inputs. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,
}

#[derive(Args, Debug, Clone)]
struct ModelSettings {
    /// schema file declaring the model classes
    #[arg(long, short)]
    schema: PathBuf,

    /// class to cast into (default: the document's type key)
    #[arg(long, short)]
    class: Option<String>,
}

#[derive(clap::Parser, Debug)]
struct CastOut {
    #[command(flatten)]
    model_settings: ModelSettings,

    #[command(flatten)]
    input_settings: InputSettings,

    /// restrict the top-level keys of each projection
    #[arg(long, num_args = 1..)]
    only: Option<Vec<String>>,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct ValidateOut {
    #[command(flatten)]
    model_settings: ModelSettings,

    #[command(flatten)]
    input_settings: InputSettings,
}

#[derive(clap::Parser, Debug)]
struct DescribeOut {
    /// schema file declaring the model classes
    #[arg(long, short)]
    schema: PathBuf,
}

/// One input document, labelled for reporting.
struct Document {
    label: String,
    value: serde_json::Value,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl InputSettings {
    /// Read and parse every input in parallel, then apply the jq filter and
    /// JSON pointer. Output order follows input order.
    fn load_documents(&self) -> Result<Vec<Document>> {
        let source_paths = resolve_file_path_patterns(&self.input)?;
        let parsed = source_paths
            .par_iter()
            .map(|source_path| self.load_file(source_path))
            .collect::<Result<Vec<_>>>()?;
        Ok(parsed.into_iter().flatten().collect())
    }

    fn load_file(&self, source_path: &Path) -> Result<Vec<Document>> {
        let source_path_str = source_path.to_string_lossy().to_string();
        let source = std::fs::read_to_string(source_path)
            .with_context(|| format!("failed to read source file {source_path_str}"))?;
        let json_value = serde_json::from_str::<serde_json::Value>(&source)
            .with_context(|| format!("failed to parse JSON source file {source_path_str}"))?;
        let values = match self.jq_expr.as_ref() {
            None => vec![json_value],
            Some(jq_expr) => json_cast::jq_exec::run_filter(jq_expr, &json_value)
                .with_context(|| format!("failed to apply jq expression to {source_path_str}"))?,
        };
        let many = values.len() > 1;
        let mut out = Vec::with_capacity(values.len());
        for (index, value) in values.into_iter().enumerate() {
            let label = if many { format!("{source_path_str}#{index}") } else { source_path_str.clone() };
            let value = match self.json_pointer.as_deref() {
                None => value,
                Some(pointer) => value
                    .pointer(pointer)
                    .cloned()
                    .with_context(|| format!("{label}: nothing at JSON pointer {pointer}"))?,
            };
            out.push(Document { label, value });
        }
        Ok(out)
    }
}

impl ModelSettings {
    fn load_schema(&self) -> Result<Schema> {
        Schema::from_path(&self.schema)
            .with_context(|| format!("failed to load schema {}", self.schema.display()))
    }

    fn cast(&self, schema: &Schema, doc: &Document) -> Result<Model> {
        let model = match self.class.as_deref() {
            Some(name) => schema
                .class(name)
                .with_context(|| format!("class {name} is not declared in the schema"))?
                .load(&doc.value),
            None => schema.load_document(&doc.value),
        };
        model.with_context(|| format!("failed to cast {}", doc.label))
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    /// `Ok(false)` when every step succeeded but some document was invalid.
    pub fn run(&self) -> Result<bool> {
        match &self.cmd {
            Command::Cast(target) => {
                let schema = target.model_settings.load_schema()?;
                let docs = target.input_settings.load_documents()?;
                let mut options = schema.projection_options();
                options.only = target.only.clone();
                let mut plain = Vec::with_capacity(docs.len());
                for doc in &docs {
                    let model = target.model_settings.cast(&schema, doc)?;
                    plain.push(model.to_plain_with(&options));
                }
                let output = match plain.len() {
                    1 => plain.remove(0),
                    _ => serde_json::Value::Array(plain),
                };
                let output_src = serde_json::to_string_pretty(&output)?;
                match target.out.as_ref() {
                    Some(out) => {
                        if let Some(parent) = out.parent() {
                            std::fs::create_dir_all(parent)?;
                        }
                        std::fs::write(out, &output_src)
                            .with_context(|| format!("failed to write {}", out.display()))?;
                    }
                    None => println!("{output_src}"),
                }
                Ok(true)
            }
            Command::Validate(target) => {
                let schema = target.model_settings.load_schema()?;
                let docs = target.input_settings.load_documents()?;
                let mut all_valid = true;
                for doc in &docs {
                    let model = target.model_settings.cast(&schema, doc)?;
                    if model.valid() {
                        println!("{} {} ({})", "✔".green(), doc.label, model.class_name());
                        continue;
                    }
                    all_valid = false;
                    println!("{} {} ({})", "✘".red(), doc.label, model.class_name().bold());
                    for message in model.errors().full_messages() {
                        println!("    {}", message.red());
                    }
                }
                Ok(all_valid)
            }
            Command::Describe(target) => {
                let schema = Schema::from_path(&target.schema)
                    .with_context(|| format!("failed to load schema {}", target.schema.display()))?;
                for class in schema.classes() {
                    let kind = if class.is_document() { "document" } else { "embeddable" };
                    println!("{} {}", class.name().bold(), format!("({kind}, {:?})", class.assign_mode()).dimmed());
                    for property in class.properties() {
                        println!("    {:<24} {}", property.name(), describe_property(property));
                    }
                }
                Ok(true)
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn describe_property(property: &PropertyDescriptor) -> String {
    let mut out = match property.ty() {
        PropertyType::Untyped => "untyped".dimmed().to_string(),
        PropertyType::Scalar(class) => class.name().cyan().to_string(),
        PropertyType::ArrayOf(class) => format!("[{}]", class.name().cyan()),
    };
    let mut flags = Vec::new();
    if property.has_default() {
        flags.push("default".to_string());
    }
    if property.read_only() {
        flags.push("read-only".to_string());
    }
    if property.protected() {
        flags.push("protected".to_string());
    }
    if let Some(alias) = property.alias() {
        flags.push(format!("alias {alias}"));
    }
    if property.is_casted() && property.init_method() != "new" {
        flags.push(format!("init {}", property.init_method()));
    }
    if !flags.is_empty() {
        out.push_str(&format!(" {}", flags.join(", ").yellow()));
    }
    out
}

fn resolve_file_path_patterns<I>(patterns: I) -> Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let mut matched_any = false;
            for entry in glob::glob(pattern).with_context(|| format!("invalid glob pattern {pattern}"))? {
                out.push(entry?);
                matched_any = true;
            }
            if !matched_any {
                anyhow::bail!("glob pattern matched no files: {pattern}");
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}
