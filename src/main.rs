// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

use urban_insights::{
    Dashboard, DatasetKind, FillStrategy, MissingPolicy, PipelineError, Settings, StoreQuery, Table,
};

// ============================================================================
// CLI STRUCTURE
// ============================================================================

/// Clean, summarize and export the World Bank urban & social indicator datasets.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (TOML). Defaults to ./urban_insights.toml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the SQLite store location
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Print results as JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean a dataset and print the cleaning report
    Clean(DatasetArgs),
    /// Descriptive statistics and correlation matrix
    Summary(DatasetArgs),
    /// Per-decade averages
    Decades(DatasetArgs),
    /// Write the cleaned table to CSV and a highlighted spreadsheet
    Export(ExportArgs),
    /// Seed the relational store (skipped if the table already has rows)
    Seed(DatasetArgs),
    /// Run a read-only query against the store
    Query(QueryArgs),
    /// Interactive terminal dashboard (default)
    Ui,
}

#[derive(Args)]
struct DatasetArgs {
    /// trends | social
    dataset: DatasetKind,

    /// Source file to read instead of the configured one
    #[arg(long)]
    file: Option<PathBuf>,

    /// Missing-value policy: drop | mean | median
    #[arg(long, value_parser = parse_policy)]
    policy: Option<MissingPolicy>,
}

#[derive(Args)]
struct ExportArgs {
    #[command(flatten)]
    dataset: DatasetArgs,

    /// Output directory
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

#[derive(Args)]
struct QueryArgs {
    /// trends | social
    dataset: DatasetKind,

    /// averages | highest | lowest | extremes | growth | above | decades | rounded | all
    name: String,

    /// Column the query applies to (canonical or store name)
    #[arg(long)]
    column: Option<String>,

    /// Cut-off for `above`
    #[arg(long)]
    threshold: Option<f64>,
}

fn parse_policy(s: &str) -> std::result::Result<MissingPolicy, String> {
    match s.to_lowercase().as_str() {
        "drop" | "dropna" => Ok(MissingPolicy::DropMissing),
        "mean" => Ok(MissingPolicy::Fill(FillStrategy::Mean)),
        "median" => Ok(MissingPolicy::Fill(FillStrategy::Median)),
        other => Err(format!("unknown policy '{}' (expected drop, mean or median)", other)),
    }
}

// ============================================================================
// MAIN
// ============================================================================

fn main() -> Result<()> {
    let cli = Cli::parse();

    // The dashboard owns the terminal, so keep logging quiet there
    let default_filter = match cli.command {
        None | Some(Commands::Ui) => "warn",
        _ => "info",
    };
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();

    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    if let Some(store) = cli.store {
        settings.store.path = store;
    }

    match cli.command.unwrap_or(Commands::Ui) {
        Commands::Clean(args) => run_clean(settings, args, cli.json),
        Commands::Summary(args) => run_summary(settings, args, cli.json),
        Commands::Decades(args) => run_decades(settings, args, cli.json),
        Commands::Export(args) => run_export(settings, args),
        Commands::Seed(args) => run_seed(settings, args),
        Commands::Query(args) => run_query(settings, args, cli.json),
        Commands::Ui => run_ui_mode(settings),
    }
}

/// Apply per-command overrides and build the dashboard
fn dashboard_for(mut settings: Settings, args: &DatasetArgs) -> Dashboard {
    if let Some(file) = &args.file {
        match args.dataset {
            DatasetKind::Trends => settings.data.trends_path = file.clone(),
            DatasetKind::Social => settings.data.social_path = file.clone(),
        }
    }
    if let Some(policy) = args.policy {
        match args.dataset {
            DatasetKind::Trends => settings.data.trends_policy = Some(policy),
            DatasetKind::Social => settings.data.social_policy = Some(policy),
        }
    }
    Dashboard::new(settings)
}

// ============================================================================
// COMMANDS
// ============================================================================

fn run_clean(settings: Settings, args: DatasetArgs, json: bool) -> Result<()> {
    let kind = args.dataset;
    let mut dashboard = dashboard_for(settings, &args);

    if json {
        return print_json(&dashboard.clean(kind)?.report);
    }

    println!("🧹 Cleaning {} ({})", kind.name(), dashboard.settings().source_path(kind).display());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let cleaned = dashboard.clean(kind)?;
    let report = &cleaned.report;

    println!("✓ Policy: {}", dashboard.settings().policy_for(kind));
    println!("✓ Rows: {} → {}", report.rows_in, report.rows_out);
    println!("✓ Renamed columns: {}", report.renamed.len());
    for (from, to) in &report.renamed {
        println!("   {} → {}", from, to);
    }
    println!("✓ Duplicates removed: {}", report.duplicates_removed);
    println!("✓ Sentinels replaced: {}", report.sentinels_replaced);
    println!("✓ Unparseable values: {}", report.coerced_to_missing);
    println!("✓ Rows dropped: {} (+{} empty)", report.rows_dropped, report.empty_rows_dropped);

    println!("\n🔍 Missing values before resolution:");
    for (column, count) in &report.missing_before {
        println!("   {:<40} {}", column, count);
    }
    for (column, value) in &report.fill_values {
        println!("   filled {:<33} {:.3}", column, value);
    }

    for warning in &report.warnings {
        println!("⚠️  {}", warning);
    }

    if cleaned.table.is_empty() {
        println!("\n❌ No usable rows left after cleaning");
    } else {
        println!();
        print_table(&cleaned.table, 10);
    }

    Ok(())
}

fn run_summary(settings: Settings, args: DatasetArgs, json: bool) -> Result<()> {
    let kind = args.dataset;
    let mut dashboard = dashboard_for(settings, &args);
    let view = dashboard.view(kind)?;

    if json {
        return print_json(&view.summary);
    }

    println!("📊 Summary statistics: {}", kind.name());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "{:<36} {:>6} {:>10} {:>10} {:>10} {:>10}",
        "Column", "Count", "Mean", "Std", "Min", "Max"
    );
    for s in &view.summary.stats {
        println!(
            "{:<36} {:>6} {:>10} {:>10} {:>10} {:>10}",
            s.column,
            s.count,
            fmt_num(s.mean),
            fmt_num(s.std_dev),
            fmt_num(s.min),
            fmt_num(s.max)
        );
    }

    println!("\n🔗 Correlation matrix");
    let short: Vec<String> = view.summary.columns.iter().map(|c| abbreviate(c, 12)).collect();
    print!("{:<14}", "");
    for name in &short {
        print!("{:>14}", name);
    }
    println!();
    for (i, row) in view.summary.correlation.iter().enumerate() {
        print!("{:<14}", short[i]);
        for r in row {
            print!("{:>14}", fmt_num(*r));
        }
        println!();
    }

    Ok(())
}

fn run_decades(settings: Settings, args: DatasetArgs, json: bool) -> Result<()> {
    let kind = args.dataset;
    let mut dashboard = dashboard_for(settings, &args);
    let view = dashboard.view(kind)?;

    let decades = view
        .decades
        .ok_or_else(|| anyhow!("{} has no year column to group by", kind))?;

    if json {
        return print_json(&decades);
    }

    println!("📅 Averages by decade: {}", kind.name());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    print_table(&decades.to_table(), usize::MAX);
    if decades.skipped_rows > 0 {
        println!("⚠️  {} rows without a year were skipped", decades.skipped_rows);
    }

    Ok(())
}

fn run_export(settings: Settings, args: ExportArgs) -> Result<()> {
    let kind = args.dataset.dataset;
    let mut settings = settings;
    if let Some(dir) = args.out_dir {
        settings.export.dir = dir;
    }
    let mut dashboard = dashboard_for(settings, &args.dataset);

    println!("💾 Exporting {}", kind.name());
    let paths = dashboard
        .export(kind)
        .with_context(|| format!("Failed to export {}", kind))?;

    println!("✓ CSV:         {}", paths.csv.display());
    println!("✓ Spreadsheet: {}", paths.spreadsheet.display());
    for rule in &paths.spreadsheet_summary.rules {
        match rule.threshold {
            Some(cut) => println!(
                "   🎨 {} > {:.3}: {} cells highlighted",
                rule.rule.column,
                cut,
                rule.flagged_rows.len()
            ),
            None => println!("   🎨 {}: {:?}", rule.rule.column, rule.rule.kind),
        }
    }

    Ok(())
}

fn run_seed(settings: Settings, args: DatasetArgs) -> Result<()> {
    let kind = args.dataset;
    let mut dashboard = dashboard_for(settings, &args);

    println!("🗄️  Seeding {} → {}", kind.name(), dashboard.store().path().display());
    let outcome = dashboard.seed(kind)?;
    println!("✓ {}", outcome);

    let count = dashboard.store().row_count(&kind.schema().store)?;
    println!("✓ Store contains {} rows", count);

    Ok(())
}

fn run_query(settings: Settings, args: QueryArgs, json: bool) -> Result<()> {
    let query = StoreQuery::from_name(&args.name, args.column.as_deref(), args.threshold)
        .map_err(|e| anyhow!("{} (available: {})", e, StoreQuery::names().join(", ")))?;
    let dashboard = Dashboard::new(settings);

    match dashboard.query(args.dataset, &query) {
        Ok(table) if json => print_json(&table),
        Ok(table) => {
            println!("🔍 {} · {}", args.dataset.name(), args.name);
            println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
            print_table(&table, usize::MAX);
            Ok(())
        }
        Err(e @ PipelineError::StoreConnection { .. }) => {
            eprintln!("❌ Store unreachable: {}", e);
            eprintln!("   Run: urban-insights seed {}", args.dataset);
            std::process::exit(2);
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(feature = "tui")]
fn run_ui_mode(settings: Settings) -> Result<()> {
    println!("🖥️  Loading Urban Insights dashboard...\n");

    let mut app = ui::App::new(Dashboard::new(settings));
    app.refresh();

    println!("Starting UI... (Press 'q' to quit)\n");
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_settings: Settings) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the API: cargo run --bin insights-server --features server");
    std::process::exit(1);
}

// ============================================================================
// OUTPUT HELPERS
// ============================================================================

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", text);
    Ok(())
}

fn fmt_num(value: f64) -> String {
    if value.is_finite() {
        format!("{:.3}", value)
    } else {
        "n/a".to_string()
    }
}

fn abbreviate(name: &str, width: usize) -> String {
    if name.chars().count() <= width {
        name.to_string()
    } else {
        let cut: String = name.chars().take(width - 1).collect();
        format!("{}…", cut)
    }
}

/// Fixed-width rendering of the first `limit` rows
fn print_table(table: &Table, limit: usize) {
    let shown = table.rows.iter().take(limit);
    let widths: Vec<usize> = table
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            table
                .rows
                .iter()
                .take(limit)
                .map(|r| r[i].to_string().chars().count())
                .chain(std::iter::once(c.chars().count()))
                .max()
                .unwrap_or(0)
                .min(28)
        })
        .collect();

    let line = |cells: Vec<String>| {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<w$}", abbreviate(c, *w), w = *w))
            .collect::<Vec<_>>()
            .join(" │ ")
    };

    println!("{}", line(table.columns.clone()));
    println!("{}", widths.iter().map(|w| "─".repeat(*w)).collect::<Vec<_>>().join("─┼─"));
    for row in shown {
        println!("{}", line(row.iter().map(|v| v.to_string()).collect()));
    }
    if table.len() > limit {
        println!("… {} more rows", table.len() - limit);
    }
}
