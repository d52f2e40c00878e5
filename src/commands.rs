//! Command implementations for datadiff CLI

use crate::cli::{ColumnMapping, Commands, SourceArgs};
use crate::comparison::{CompareColumn, ComparisonConfig, Filters, JoinColumn, SchemaComparison};
use crate::config::{adaptive_row_threshold, default_output_table, DiffSettings};
use crate::engine::DuckDbEngine;
use crate::error::Result;
use crate::executor::PartitionPlan;
use crate::loader::{compare_schemas, resolve_source};
use crate::output::{DiffSummary, JsonFormatter, PrettyPrinter};
use crate::progress::{progress_channel, ProgressReporter, DEFAULT_PROGRESS_CAPACITY};
use crate::sql::DiffQueryBuilder;
use crate::strategy::{AlgorithmRegistry, DiffRun, StrategyContext};

/// View names the command-line inputs are loaded under
const SOURCE_A_VIEW: &str = "datadiff_source_a";
const SOURCE_B_VIEW: &str = "datadiff_source_b";

/// Execute a command
pub fn execute_command(command: Commands) -> Result<()> {
    match command {
        Commands::Compare {
            sources,
            only_differences,
            output_table,
            no_progress,
        } => compare_command(&sources, only_differences, output_table, no_progress),
        Commands::Plan { sources } => plan_command(&sources),
    }
}

/// Everything a command needs once the inputs are resolved
struct Prepared {
    engine: DuckDbEngine,
    settings: DiffSettings,
    builder: DiffQueryBuilder,
    schema: SchemaComparison,
}

/// Settings from the config file, overridden by command-line flags
fn load_settings(args: &SourceArgs) -> Result<DiffSettings> {
    let mut settings = match &args.config {
        Some(path) => DiffSettings::load(path)?,
        None => DiffSettings::default(),
    };

    if let Some(database) = &args.database {
        settings.engine.database = Some(database.clone());
    }
    if let Some(row_threshold) = args.row_threshold {
        settings.partition.row_threshold = row_threshold;
    }
    if let Some(split_factor) = args.split_factor {
        settings.partition.split_factor = split_factor;
    }
    if let Some(max_depth) = args.max_depth {
        settings.partition.max_depth = max_depth;
    }
    if let Some(sample_size) = args.sample_size {
        settings.strategy.sample_size = sample_size;
    }
    settings.engine.validate()?;
    Ok(settings)
}

fn comparison_config(args: &SourceArgs, only_differences: bool) -> ComparisonConfig {
    let join_columns = args
        .keys
        .iter()
        .map(|ColumnMapping { a, b }| match b {
            Some(b) => JoinColumn::mapped(a, b),
            None => JoinColumn::new(a),
        })
        .collect();

    let mut compare_columns: Vec<CompareColumn> = args
        .columns
        .iter()
        .map(|ColumnMapping { a, b }| match b {
            Some(b) => CompareColumn::mapped(a, b),
            None => CompareColumn::new(a),
        })
        .collect();
    compare_columns.extend(args.exclude.iter().map(CompareColumn::excluded));

    ComparisonConfig {
        source_a: None,
        source_b: None,
        join_columns,
        compare_columns,
        filters: Filters {
            common: args.filter.clone(),
            a: args.filter_a.clone(),
            b: args.filter_b.clone(),
        },
        show_only_differences: only_differences,
    }
}

fn prepare(args: &SourceArgs, only_differences: bool) -> Result<Prepared> {
    let settings = load_settings(args)?;
    let engine = DuckDbEngine::open(&settings.engine)?;

    let mut config = comparison_config(args, only_differences);
    config.source_a = Some(resolve_source(&engine, &args.source_a, SOURCE_A_VIEW)?);
    config.source_b = Some(resolve_source(&engine, &args.source_b, SOURCE_B_VIEW)?);
    config.validate()?;

    let (source_a, source_b) = config.sources()?;
    let schema = compare_schemas(&engine, source_a, source_b)?;
    for join in &config.join_columns {
        let mismatched = schema
            .common_columns
            .iter()
            .find(|c| c.name == join.a_name() && join.a_name() == join.b_name() && !c.types_match);
        if let Some(column) = mismatched {
            log::warn!(
                "Key column {} is {} in A but {} in B; hash partitioning may not pair its rows",
                column.name,
                column.type_a,
                column.type_b
            );
        }
    }
    let compare_columns = config.resolve_compare_columns(Some(&schema));
    log::debug!(
        "Comparing {} columns on {} keys",
        compare_columns.len(),
        config.join_columns.len()
    );
    let builder = DiffQueryBuilder::new(&config, compare_columns)?;

    Ok(Prepared {
        engine,
        settings,
        builder,
        schema,
    })
}

/// Build the run and the size context, adapting the row threshold to the
/// output width unless one was set explicitly
fn sized_run<'a>(
    prepared: &'a Prepared,
    args: &SourceArgs,
    output_table: String,
) -> Result<(DiffRun<'a, DuckDbEngine>, StrategyContext)> {
    let mut run = DiffRun::new(&prepared.engine, prepared.builder.clone(), output_table);
    run.partition = prepared.settings.partition.clone();
    run.settings = prepared.settings.strategy.clone();

    let mut ctx = run.context()?;
    if args.row_threshold.is_none() && args.config.is_none() {
        run.partition.row_threshold =
            adaptive_row_threshold(ctx.rows_a.max(ctx.rows_b), ctx.compare_columns);
        ctx = StrategyContext::new(
            ctx.rows_a,
            ctx.rows_b,
            ctx.compare_columns,
            ctx.join_columns,
            &run.partition,
        );
        log::debug!("Adaptive row threshold: {}", run.partition.row_threshold);
    }
    Ok((run, ctx))
}

/// Compare two sources
fn compare_command(
    args: &SourceArgs,
    only_differences: bool,
    output_table: Option<String>,
    no_progress: bool,
) -> Result<()> {
    let prepared = prepare(args, only_differences)?;
    let output_table = output_table.unwrap_or_else(default_output_table);

    let show_progress = !no_progress && !args.json;
    let (sink, events) = progress_channel(DEFAULT_PROGRESS_CAPACITY);
    let consumer = std::thread::spawn(move || {
        let mut reporter = if show_progress {
            ProgressReporter::new_for_compare()
        } else {
            ProgressReporter::new_minimal()
        };
        reporter.consume(events);
        reporter.finish("Comparison complete");
    });

    let (mut run, ctx) = sized_run(&prepared, args, output_table)?;
    let registry = AlgorithmRegistry::new(prepared.settings.strategy.clone());
    let strategy = registry.select(args.strategy, &ctx)?;

    run.progress = &sink;
    let result = run.execute(strategy);

    // The consumer exits once the last sender is gone
    drop(run);
    drop(sink);
    if consumer.join().is_err() {
        log::warn!("Progress reporter panicked");
    }
    let result = result?;

    if !args.json {
        PrettyPrinter::print_schema_comparison(&prepared.schema);
    }

    let summary = DiffSummary::load(
        &prepared.engine,
        &result.output_table,
        prepared.builder.compare_columns(),
    )?;

    if args.json {
        println!("{}", JsonFormatter::format_diff_summary(&summary, &result)?);
    } else {
        PrettyPrinter::print_diff_summary(&summary, &result);
    }

    Ok(())
}

/// Show the comparison plan without running it
fn plan_command(args: &SourceArgs) -> Result<()> {
    let prepared = prepare(args, false)?;
    let (run, ctx) = sized_run(&prepared, args, default_output_table())?;

    let registry = AlgorithmRegistry::new(prepared.settings.strategy.clone());
    let estimates = registry.estimates(&ctx);
    let plan = PartitionPlan::from_counts(&run.partition, ctx.rows_a, ctx.rows_b);

    if args.json {
        println!("{}", JsonFormatter::format_plan(&ctx, &estimates, &plan)?);
    } else {
        PrettyPrinter::print_schema_comparison(&prepared.schema);
        PrettyPrinter::print_plan(&ctx, &estimates, &plan);
        match registry.select(args.strategy, &ctx) {
            Ok(strategy) => println!("\n➡️  Selected strategy: {}", strategy),
            Err(e) => println!("\n❌ {}", e),
        }
    }

    Ok(())
}
