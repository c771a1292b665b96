//! # FHIRPath CLI Tool
//!
//! Command-line front-end for evaluating FHIRPath expressions against JSON
//! documents such as FHIR resources.
//!
//! ## Command Line Options
//!
//! ```text
//! -e, --expression <EXPRESSION>        FHIRPath expression to evaluate
//! -r, --resource <RESOURCE>            JSON resource file, '-' for stdin [env: FHIRPATH_RESOURCE]
//!     --var <NAME=VALUE>               Bind %NAME (VALUE is JSON, or a plain string)
//!     --evaluation-time <RFC3339>      Instant used by now()/today()/timeOfDay() [env: FHIRPATH_EVALUATION_TIME]
//!     --trace                          Include trace() output in the result
//! -o, --output <OUTPUT>                Output file path (defaults to stdout)
//!     --log-level <LEVEL>              Log filter when RUST_LOG is unset [default: warn]
//! ```
//!
//! ## Usage Examples
//!
//! ```bash
//! fhirpath-cli -e "Patient.name.family" -r patient.json
//! fhirpath-cli -e "value > %threshold" -r observation.json --var threshold=5.0
//! cat patient.json | fhirpath-cli -e "name.given.trace('given').first()" -r - --trace
//! fhirpath-cli -e "today()" --evaluation-time 2024-02-29T10:00:00Z
//! ```
//!
//! ## Output
//!
//! ```json
//! { "ordered": true, "result": ["Chalmers", "Windsor"] }
//! ```
//!
//! Primitives serialize as JSON scalars, quantities as `{"value", "unit"}`,
//! dates and times as their literal text and JSON elements as the original
//! JSON.

use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use atrius_fhirpath_support::{Collection, EvaluationResult, Value};
use chrono::{DateTime, FixedOffset};
use clap::Parser;
use serde_json::{Value as Json, json};
use tracing::{debug, info};

use crate::context::EvaluationContext;
use crate::error::{CliError, CliResult};
use crate::evaluate_expression;
use crate::json_element::JsonElement;
use crate::trace_function::CollectingTraceLogger;

#[derive(Parser, Debug)]
#[command(name = "fhirpath-cli")]
#[command(about = "FHIRPath CLI tool for evaluating expressions against FHIR resources")]
pub struct Args {
    /// FHIRPath expression to evaluate
    #[arg(short, long)]
    pub expression: String,

    /// Path to the JSON resource (use '-' for stdin)
    #[arg(short, long, env = "FHIRPATH_RESOURCE")]
    pub resource: Option<PathBuf>,

    /// Bind a variable (format: name=value)
    #[arg(long = "var", value_parser = parse_var)]
    pub var: Vec<(String, String)>,

    /// Evaluation instant in RFC 3339 form
    #[arg(long, env = "FHIRPATH_EVALUATION_TIME", value_parser = parse_instant)]
    pub evaluation_time: Option<DateTime<FixedOffset>>,

    /// Include trace() output in the result
    #[arg(long)]
    pub trace: bool,

    /// Output file path (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, env = "FHIRPATH_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,
}

/// Parse a name=value pair
fn parse_var(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid variable format: {}", s))?;
    let name = name.trim_start_matches('%');
    if name.is_empty() {
        return Err(format!("missing variable name: {}", s));
    }
    Ok((name.to_string(), value.to_string()))
}

fn parse_instant(s: &str) -> Result<DateTime<FixedOffset>, String> {
    DateTime::parse_from_rfc3339(s).map_err(|e| format!("invalid RFC 3339 instant '{}': {}", s, e))
}

/// Initializes the tracing subscriber, writing to stderr.
pub fn init_logging(level: &str) {
    let filter = format!("atrius_fhir_path={level},fhirpath={level}");
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with_writer(io::stderr)
        .try_init();
}

/// Main CLI execution function
pub fn run_cli(args: Args) -> CliResult<()> {
    let output = evaluate_args(&args)?;
    write_output(&args.output, &serde_json::to_string_pretty(&output)?)
}

/// Evaluates the expression described by `args` and builds the JSON output.
pub fn evaluate_args(args: &Args) -> CliResult<Json> {
    let root = match &args.resource {
        Some(path) => {
            let content = read_input(path)?;
            let json: Json = serde_json::from_str(&content)?;
            JsonElement::collection(&json)
        }
        None => Collection::new(),
    };
    debug!(items = root.len(), "loaded root collection");

    let mut context = EvaluationContext::fhir();
    for (name, value) in &args.var {
        context = context.with_variable(name.clone(), variable_value(value));
    }
    if let Some(instant) = args.evaluation_time {
        context = context.with_evaluation_time(instant);
    }
    let traces = Arc::new(CollectingTraceLogger::new());
    if args.trace {
        context = context.with_trace_logger(traces.clone());
    }

    info!(expression = %args.expression, "evaluating");
    let result = evaluate_expression(&args.expression, &root, &context)?;

    let mut output = result_to_json(&result);
    if args.trace {
        let entries: Vec<Json> = traces
            .entries()
            .into_iter()
            .map(|(name, values)| {
                json!({
                    "name": name,
                    "values": values.iter().map(value_to_json).collect::<Vec<_>>(),
                })
            })
            .collect();
        output["trace"] = Json::Array(entries);
    }
    Ok(output)
}

/// A `--var` value: JSON when it parses, otherwise the raw text.
fn variable_value(text: &str) -> Collection {
    match serde_json::from_str::<Json>(text) {
        Ok(json) => JsonElement::collection(&json),
        Err(_) => Collection::single(Value::string(text)),
    }
}

/// Read input from file or stdin
fn read_input(path: &PathBuf) -> CliResult<String> {
    if path.to_str() == Some("-") {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        fs::read_to_string(path).map_err(|e| {
            CliError::InvalidInput(format!("cannot read resource '{}': {}", path.display(), e))
        })
    }
}

/// Write output to file or stdout
fn write_output(path: &Option<PathBuf>, content: &str) -> CliResult<()> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle.write_all(content.as_bytes())?;
            handle.write_all(b"\n")?;
        }
    }
    Ok(())
}

pub fn result_to_json(result: &EvaluationResult) -> Json {
    json!({
        "ordered": result.ordered,
        "result": result.collection.iter().map(value_to_json).collect::<Vec<_>>(),
    })
}

fn decimal_to_json(text: String) -> Json {
    match text.parse::<serde_json::Number>() {
        Ok(number) => Json::Number(number),
        Err(_) => Json::String(text),
    }
}

/// Convert a single value to JSON
pub fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Boolean(b) => json!(b),
        Value::String(s) => json!(s),
        Value::Integer(i) => json!(i),
        Value::Long(l) => json!(l),
        Value::Decimal(d) => decimal_to_json(d.to_string()),
        Value::Quantity(q) => json!({
            "value": decimal_to_json(q.value.to_string()),
            "unit": q.unit,
        }),
        Value::Date(_) | Value::Time(_) | Value::DateTime(_) => json!(value.to_string()),
        Value::Element(element) => match element.as_any().downcast_ref::<JsonElement>() {
            Some(json_element) => json_element.json().clone(),
            None => json!(value.type_name()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_resource() -> Json {
        json!({
            "resourceType": "Patient",
            "id": "example",
            "name": [{
                "family": "Doe",
                "given": ["John", "James"]
            }],
            "birthDate": "1990-01-01",
            "active": true
        })
    }

    fn create_test_args(expression: &str, resource: Option<PathBuf>) -> Args {
        Args {
            expression: expression.to_string(),
            resource,
            var: vec![],
            evaluation_time: None,
            trace: false,
            output: None,
            log_level: "warn".to_string(),
        }
    }

    fn write_resource(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("patient.json");
        fs::write(&path, create_test_resource().to_string()).unwrap();
        path
    }

    #[test]
    fn test_parse_var() {
        assert_eq!(
            parse_var("key=value").unwrap(),
            ("key".to_string(), "value".to_string())
        );
        assert_eq!(
            parse_var("%complex=value=with=equals").unwrap(),
            ("complex".to_string(), "value=with=equals".to_string())
        );
        assert!(parse_var("invalid").is_err());
        assert!(parse_var("=1").is_err());
    }

    #[test]
    fn test_basic_expression_evaluation() {
        let dir = TempDir::new().unwrap();
        let args = create_test_args("Patient.name.given", Some(write_resource(&dir)));
        let output = evaluate_args(&args).unwrap();
        assert_eq!(output, json!({"ordered": true, "result": ["John", "James"]}));
    }

    #[test]
    fn test_variables_and_evaluation_time() {
        let mut args = create_test_args("%threshold + 1 | %label | today()", None);
        args.var = vec![
            ("threshold".to_string(), "5".to_string()),
            ("label".to_string(), "not json".to_string()),
        ];
        args.evaluation_time = Some(parse_instant("2024-02-29T10:00:00+02:00").unwrap());
        let output = evaluate_args(&args).unwrap();
        assert_eq!(output["result"], json!([6, "not json", "@2024-02-29"]));
    }

    #[test]
    fn test_quantity_and_element_output() {
        let dir = TempDir::new().unwrap();
        let args = create_test_args("name | 1.50 'mg'", Some(write_resource(&dir)));
        let output = evaluate_args(&args).unwrap();
        assert_eq!(output["result"][0], json!({"family": "Doe", "given": ["John", "James"]}));
        assert_eq!(output["result"][1]["unit"], json!("mg"));
        assert_eq!(output["result"][1]["value"].to_string(), "1.50");
    }

    #[test]
    fn test_temporal_output_is_literal_text() {
        let args = create_test_args("@2024-02-29T10:30:00Z | @T14:05 | @2024-02", None);
        let output = evaluate_args(&args).unwrap();
        assert_eq!(
            output["result"],
            json!(["@2024-02-29T10:30:00Z", "@T14:05", "@2024-02"])
        );
    }

    #[test]
    fn test_trace_output() {
        let dir = TempDir::new().unwrap();
        let mut args = create_test_args("name.given.trace('given').first()", Some(write_resource(&dir)));
        args.trace = true;
        let output = evaluate_args(&args).unwrap();
        assert_eq!(output["result"], json!(["John"]));
        assert_eq!(output["trace"][0]["name"], json!("given"));
        assert_eq!(output["trace"][0]["values"], json!(["John", "James"]));
    }

    #[test]
    fn test_output_file_and_errors() {
        let dir = TempDir::new().unwrap();
        let mut args = create_test_args("Patient.active", Some(write_resource(&dir)));
        let out = dir.path().join("out.json");
        args.output = Some(out.clone());
        run_cli(args).unwrap();
        let written: Json = serde_json::from_str(&fs::read_to_string(out).unwrap()).unwrap();
        assert_eq!(written["result"], json!([true]));

        let missing = create_test_args("1", Some(dir.path().join("missing.json")));
        assert!(matches!(evaluate_args(&missing), Err(CliError::InvalidInput(_))));
        let bad = create_test_args("1 +", None);
        assert!(matches!(evaluate_args(&bad), Err(CliError::Evaluation(_))));
    }
}
