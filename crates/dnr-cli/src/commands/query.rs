//! Query command: guarded read-only SQL against the serving layer

use anyhow::Result;
use dnr_db::SqlValue;
use dnr_serving::{QueryRunner, ServingError};
use serde_json::{Map, Value};

use crate::cli::{GlobalArgs, OutputFormat, QueryArgs};
use crate::commands::common::{exit_code_for, print_table, ExitCode};
use crate::context::RuntimeContext;

/// Execute the query command
pub async fn execute(args: &QueryArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global).await?;
    let runner = QueryRunner::new(ctx.warehouse.db().clone(), &ctx.project.config.query);

    let output = match runner.run(&args.sql).await {
        Ok(output) => output,
        Err(ServingError::Sql(e)) => {
            eprintln!("Query rejected: {e}");
            return Err(ExitCode(1).into());
        }
        Err(e) => {
            let err = anyhow::Error::from(e);
            eprintln!("Query failed: {err:#}");
            return Err(ExitCode(exit_code_for(&err)).into());
        }
    };

    let result = &output.result;
    match args.output {
        OutputFormat::Table => {
            let headers: Vec<&str> = result.columns.iter().map(String::as_str).collect();
            let rows: Vec<Vec<String>> = result
                .rows
                .iter()
                .map(|row| row.iter().map(cell_text).collect())
                .collect();
            print_table(&headers, &rows);
            println!("\n{} row(s)", rows.len());
        }
        OutputFormat::Json => {
            let rows: Vec<Value> = result
                .rows
                .iter()
                .map(|row| {
                    let object: Map<String, Value> = result
                        .columns
                        .iter()
                        .cloned()
                        .zip(row.iter().map(cell_json))
                        .collect();
                    Value::Object(object)
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }
    if output.truncated {
        eprintln!(
            "Result truncated to {} rows (query.max_rows)",
            ctx.project.config.query.max_rows
        );
    }
    Ok(())
}

fn cell_text(value: &SqlValue) -> String {
    value.to_text().unwrap_or_else(|| "NULL".to_string())
}

fn cell_json(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Bool(b) => Value::Bool(*b),
        SqlValue::Int(i) => Value::from(*i),
        SqlValue::Double(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        SqlValue::Text(s) => Value::String(s.clone()),
    }
}
