//! Benchmark comparison for regression runs

use crate::table::Table;
use crate::value::Value;

/// Describe how `output` differs from `benchmark`.
///
/// Columns are matched by name (ignoring case when `ignore_column_case` is
/// set) and rows by position. Numbers compare loosely, so `1` equals `1.0`.
/// An empty result means the tables agree.
pub fn differences(benchmark: &Table, output: &Table, ignore_column_case: bool) -> Vec<String> {
    let mut found = Vec::new();

    let lookup = |table: &Table, name: &str| {
        if ignore_column_case {
            table.column_ci(name).cloned()
        } else {
            table.column(name).cloned()
        }
    };

    for name in benchmark.column_names() {
        if lookup(output, name).is_none() {
            found.push(format!("missing column '{name}'"));
        }
    }
    for name in output.column_names() {
        if lookup(benchmark, name).is_none() {
            found.push(format!("unexpected column '{name}'"));
        }
    }

    if benchmark.len() != output.len() {
        found.push(format!(
            "row count differs: expected {}, got {}",
            benchmark.len(),
            output.len()
        ));
    }

    let rows = benchmark.len().min(output.len());
    for expected in benchmark.columns() {
        let Some(actual) = lookup(output, &expected.name) else {
            continue;
        };
        for i in 0..rows {
            let (e, a) = (&expected.values[i], &actual.values[i]);
            if !same(e, a) {
                found.push(format!(
                    "row {i} column '{}': expected '{e}', got '{a}'",
                    expected.name
                ));
            }
        }
    }

    found
}

fn same(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Float(a), Value::Float(b)) => a == b || (a - b).abs() <= 1e-9 * a.abs().max(b.abs()),
        _ => expected.loosely_eq(actual) || expected.to_string() == actual.to_string(),
    }
}
