use colored::Colorize;
use comfy_table::{ContentArrangement, Table};
use rdb2rdf_engine::{MappingDocument, MappingOutcome, MappingRule, RunLog, RunReport};

/// Per-mapping outcome table of a run.
pub fn run_table(report: &RunReport) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["MAPPING", "OUTCOME", "STATEMENTS"]);

    for mapping in &report.mappings {
        let (outcome, statements) = match &mapping.outcome {
            MappingOutcome::Executed { statements } => ("executed", statements.to_string()),
            MappingOutcome::Skipped { statements } => ("skipped", statements.to_string()),
            MappingOutcome::Failed { error } => ("failed", error.clone()),
        };
        table.add_row(vec![mapping.id.clone(), outcome.to_string(), statements]);
    }
    table
}

/// One-line summary printed after a run.
pub fn run_summary(report: &RunReport) -> String {
    let failed = report.failed().len();
    let mut line = format!(
        "{} executed, {} skipped; {} added, {} removed, {} total",
        report.executed().len(),
        report.skipped().len(),
        report.sync.added,
        report.sync.removed,
        report.sync.total,
    );
    if failed > 0 {
        line.push_str(&format!("; {}", format!("{failed} failed").red().bold()));
    }
    line
}

pub fn status_table(log: &RunLog) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["MAPPING", "STATEMENTS", "LAST GENERATED", "RESULTS HASH"]);

    for (id, entry) in &log.mappings {
        table.add_row(vec![
            id.clone(),
            entry.statement_count.to_string(),
            entry.timestamp.to_rfc3339(),
            short_hash(&entry.select_query_results_hash).to_string(),
        ]);
    }
    table
}

/// Execution order of a validated document with each mapping's parents.
pub fn order_table(order: &[&MappingRule], document: &MappingDocument) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["#", "MAPPING", "SOURCE TABLES", "REFERENCES", "REFERENCED BY"]);

    for (i, rule) in order.iter().enumerate() {
        let referenced_by: Vec<&str> = document
            .find_rules_referencing(rule.id())
            .into_iter()
            .map(MappingRule::id)
            .collect();
        table.add_row(vec![
            (i + 1).to_string(),
            rule.id().to_string(),
            rule.view().tables().join(", "),
            rule.parents().join(", "),
            referenced_by.join(", "),
        ]);
    }
    table
}

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
