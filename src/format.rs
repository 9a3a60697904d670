//! Text rendering of search reports and diagnostics.
//!
//! Three output formats trade detail for payload size:
//!
//! | Format | Content |
//! |--------|---------|
//! | `full` | configuration block, then every chunk with provenance, score, and text |
//! | `summary` | one line per chunk with a 100-character snippet |
//! | `ids_only` | candidate row ids with their combined distance |
//!
//! Ranks and chunk indices are printed 1-based.

use std::fmt::Write as _;
use std::str::FromStr;

use pgsemantic_core::models::TableInfo;
use pgsemantic_core::{SearchError, SearchOutcome, SearchReport};

const RULE_WIDTH: usize = 80;
const SNIPPET_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Full,
    Summary,
    IdsOnly,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Full => "full",
            OutputFormat::Summary => "summary",
            OutputFormat::IdsOnly => "ids_only",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(OutputFormat::Full),
            "summary" => Ok(OutputFormat::Summary),
            "ids_only" => Ok(OutputFormat::IdsOnly),
            other => Err(SearchError::InvalidRequest(format!(
                "unknown output_format '{}': use full, summary, or ids_only",
                other
            ))),
        }
    }
}

fn rule(ch: char) -> String {
    ch.to_string().repeat(RULE_WIDTH)
}

fn snippet(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(SNIPPET_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// Render a completed search. Empty and budget-exhausted outcomes render
/// as diagnostics with suggested parameter changes.
pub fn render_report(report: &SearchReport, format: OutputFormat, database: &str) -> String {
    match report.outcome {
        SearchOutcome::EmptyResult => return render_empty(report),
        SearchOutcome::BudgetExhausted if format != OutputFormat::IdsOnly => {
            return render_budget_exhausted(report)
        }
        _ => {}
    }
    match format {
        OutputFormat::Full => render_full(report, database),
        OutputFormat::Summary => render_summary(report),
        OutputFormat::IdsOnly => render_ids(report),
    }
}

fn render_full(report: &SearchReport, database: &str) -> String {
    let cfg = &report.config;
    let mut out = String::new();

    let _ = writeln!(out, "Similarity Search Results: {:?}", report.query);
    let _ = writeln!(out, "Database: {}", database);
    let _ = writeln!(out, "Table: {}", report.table);
    let _ = writeln!(out, "{}\n", rule('='));

    let _ = writeln!(out, "Configuration:");
    let _ = writeln!(out, "  - Vector Search: Top {} rows", cfg.top_n);
    let _ = writeln!(
        out,
        "  - Chunking: {} tokens per chunk, {} token overlap",
        cfg.chunk_size_tokens, cfg.overlap_tokens
    );
    let _ = writeln!(
        out,
        "  - Diversity: λ={:.2} ({:.0}% relevance, {:.0}% diversity)",
        cfg.lambda,
        cfg.lambda * 100.0,
        (1.0 - cfg.lambda) * 100.0
    );
    let _ = writeln!(out, "  - Distance Metric: {}", cfg.distance_metric);
    if !report.bindings.is_empty() {
        let _ = writeln!(out, "  - Column Weights:");
        for b in &report.bindings {
            let kind = if b.is_title { "title" } else { "content" };
            let _ = writeln!(
                out,
                "      {} → {} ({:.1}%) [{}]",
                b.text_column.as_deref().unwrap_or("-"),
                b.vector_column,
                b.weight * 100.0,
                kind
            );
        }
    }
    out.push('\n');

    let n = report.results.len();
    for (i, selected) in report.results.iter().enumerate() {
        let chunk = selected.chunk();
        let _ = writeln!(out, "Result {}/{}", i + 1, n);
        let _ = writeln!(
            out,
            "Source: {}.{} (vector search rank: #{}, chunk: {})",
            chunk.source_table,
            chunk.source_column,
            chunk.origin_rank + 1,
            chunk.chunk_index + 1
        );
        let _ = writeln!(out, "Relevance Score: {:.3}", selected.score());
        let _ = writeln!(out, "Tokens: ~{}\n", chunk.estimated_tokens);
        let _ = writeln!(out, "{}\n", chunk.text);
        let _ = writeln!(out, "{}\n", rule('-'));
    }

    out.push_str(&rule('='));
    let _ = writeln!(out, "\nTotal: {} chunks, ~{} tokens", n, report.total_tokens);
    out
}

fn render_summary(report: &SearchReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Similarity Search Results (Summary): {:?}", report.query);
    let _ = writeln!(out, "{}\n", rule('='));
    let _ = writeln!(
        out,
        "Found {} relevant chunks. Showing summaries:\n",
        report.results.len()
    );

    for (i, selected) in report.results.iter().enumerate() {
        let chunk = selected.chunk();
        let _ = writeln!(
            out,
            "{}. Score: {:.3} | Source: {}.{} (rank #{}, chunk {})",
            i + 1,
            selected.score(),
            chunk.source_table,
            chunk.source_column,
            chunk.origin_rank + 1,
            chunk.chunk_index + 1
        );
        let _ = writeln!(out, "   {}\n", snippet(&chunk.text));
    }

    out.push_str(&rule('='));
    let _ = writeln!(
        out,
        "\nTotal: {} results shown in summary mode",
        report.results.len()
    );
    out.push_str("Use output_format='full' to see complete content\n");
    out
}

fn render_ids(report: &SearchReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Similarity Search Results (IDs Only): {:?}", report.query);
    let _ = writeln!(out, "{}\n", rule('='));
    let _ = writeln!(
        out,
        "Found {} matching rows. Row IDs and distances:\n",
        report.candidates.len()
    );
    for (i, row) in report.candidates.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. ID: {} | Distance: {:.4}",
            i + 1,
            row.row_id,
            row.combined_distance
        );
    }
    out.push('\n');
    out.push_str(&rule('='));
    let _ = writeln!(out, "\nTotal: {} results", report.candidates.len());
    out.push_str("Use output_format='summary' for snippets or 'full' for complete content\n");
    out
}

fn suggestion(report: &SearchReport, extra: &str) -> String {
    format!(
        "   -> similarity_search(table_name={:?}, query_text={:?}, {})",
        report.table, report.query, extra
    )
}

fn render_empty(report: &SearchReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "No results found for query: {:?}\n", report.query);
    let _ = writeln!(
        out,
        "The vector search on {} returned no rows with searchable text.",
        report.table
    );
    let _ = writeln!(
        out,
        "The table may be empty, its embeddings may be NULL, or the paired text columns may be blank.\n"
    );
    let _ = writeln!(out, "Suggestions:");
    let _ = writeln!(out, "1. Cast a wider net:");
    let _ = writeln!(out, "{}", suggestion(report, "top_n=50"));
    let _ = writeln!(out, "2. Try a broader or simpler query.");
    out
}

fn render_budget_exhausted(report: &SearchReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Search completed, but no chunk fits within the token budget.\n"
    );
    let _ = writeln!(
        out,
        "{} diverse chunks were selected, and the first already exceeds max_output_tokens={}.\n",
        report.selected_count, report.config.max_output_tokens
    );
    let _ = writeln!(out, "Suggestions:");
    let _ = writeln!(out, "1. Raise the budget:");
    let _ = writeln!(out, "{}", suggestion(report, "max_output_tokens=2500"));
    let _ = writeln!(out, "2. Use smaller chunks:");
    let _ = writeln!(out, "{}", suggestion(report, "chunk_size_tokens=50"));
    let _ = writeln!(out, "3. Switch to a compact format:");
    let _ = writeln!(out, "{}", suggestion(report, "output_format=\"summary\""));
    let _ = writeln!(out, "{}", suggestion(report, "output_format=\"ids_only\""));
    out
}

/// Render a pipeline error as a user-facing diagnostic.
pub fn render_error(err: &SearchError, database: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Error [{}]: {}\n", err.code(), err);
    if matches!(err, SearchError::TableNotFound { .. }) {
        let _ = writeln!(out, "Connected to: {}\n", database);
    }
    let _ = writeln!(out, "{}", err.hint());
    out
}

/// Render the `list_vector_tables` listing.
pub fn render_vector_tables(tables: &[TableInfo], database: &str) -> String {
    let vector_tables: Vec<&TableInfo> = tables
        .iter()
        .filter(|t| t.vector_columns().next().is_some())
        .collect();

    let mut out = String::new();
    let _ = writeln!(out, "Vector-enabled tables in {}", database);
    let _ = writeln!(out, "{}\n", rule('='));
    if vector_tables.is_empty() {
        out.push_str("No tables with vector columns found. Is the pgvector extension installed?\n");
        return out;
    }
    for t in &vector_tables {
        let _ = writeln!(out, "{}", t.qualified_name());
        for c in t.vector_columns() {
            match c.dimension {
                Some(d) => {
                    let _ = writeln!(out, "  - {} (vector, {} dims)", c.name, d);
                }
                None => {
                    let _ = writeln!(out, "  - {} (vector)", c.name);
                }
            }
        }
        let text: Vec<&str> = t
            .columns
            .iter()
            .filter(|c| c.is_text())
            .map(|c| c.name.as_str())
            .collect();
        if !text.is_empty() {
            let _ = writeln!(out, "  text columns: {}", text.join(", "));
        }
    }
    let _ = writeln!(out, "\nTotal: {} tables", vector_tables.len());
    out
}
