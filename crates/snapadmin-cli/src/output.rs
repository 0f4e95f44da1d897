use serde::Serialize;
use snapadmin_core::types::{SessionPayload, SessionResult};
use snapadmin_core::OrchestrationResult;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.len());
            }
        }
    }

    let render = |cells: Vec<String>| {
        cells
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{:width$}", c, width = widths.get(i).copied().unwrap_or(0)))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    println!("{}", render(headers.iter().map(|h| h.to_string()).collect()));
    println!("{}", render(widths.iter().map(|&w| "-".repeat(w)).collect()));
    for row in rows {
        println!("{}", render(row));
    }
}

/// One row per host, then the differences of every failed test.
pub fn print_results(result: &OrchestrationResult) {
    let rows = result.iter().map(summary_row).collect();
    print_table(&["HOST", "STATUS", "PASSED", "FAILED", "DETAIL"], rows);

    for r in result.iter() {
        let Some(tests) = r.test_results() else {
            continue;
        };
        for outcome in tests.outcomes.iter().filter(|o| !o.passed) {
            println!();
            println!("{} / {}: {}", r.hostname, outcome.test_definition, outcome.command);
            for line in &outcome.details {
                println!("  {line}");
            }
        }
    }
}

fn summary_row(r: &SessionResult) -> Vec<String> {
    let (passed, failed, detail) = match &r.payload {
        SessionPayload::Tested { results } => (
            results.passed().to_string(),
            results.failed().to_string(),
            format!("{} difference(s)", results.differences()),
        ),
        SessionPayload::Captured { capture } => (
            "-".into(),
            "-".into(),
            capture
                .as_ref()
                .map(|c| format!("{} command(s) -> {}", c.replies.len(), c.label))
                .unwrap_or_else(|| "no test files".into()),
        ),
        SessionPayload::Empty => ("-".into(), "-".into(), r.error.clone().unwrap_or_default()),
    };
    vec![
        r.hostname.clone(),
        r.status.as_str().to_string(),
        passed,
        failed,
        detail,
    ]
}
