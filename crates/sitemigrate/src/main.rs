use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use sitemigrate_core::config::load_config;
use sitemigrate_core::html::HtmlDocument;
use sitemigrate_core::migrate::{pending_migration_count, run_migrations};
use sitemigrate_core::paths::{PassLanguage, path_info, resolve_variant, sibling_candidates};
use sitemigrate_core::pipeline::{MigrationPipeline, PassReport};
use sitemigrate_core::redirects::RedirectAction;
use sitemigrate_core::runtime::{
    InitOptions, PathOverrides, ResolutionContext, ensure_runtime_ready_for_run, init_layout,
    inspect_runtime, resolve_paths,
};
use sitemigrate_core::source::{ScanStats, SourceTree, is_english_source};
use sitemigrate_core::store::{
    ContentStore, MemoryContentStore, MemoryRedirectStore, SqliteContentStore,
    SqliteRedirectStore, load_store_stats,
};

#[derive(Debug, Parser)]
#[command(
    name = "sitemigrate",
    version,
    about = "Migrate a legacy bilingual HTML tree into the managed content store"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    data_dir: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    config: Option<PathBuf>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            data_dir: cli.data_dir.clone(),
            config: cli.config.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    Init(InitArgs),
    Status,
    Inspect(InspectArgs),
    Run(RunArgs),
    Db(DbArgs),
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, help = "Overwrite an existing config file")]
    force: bool,
    #[arg(long, help = "Skip writing .sitemigrate/config.toml")]
    no_config: bool,
}

#[derive(Debug, Args)]
struct InspectArgs {
    #[arg(value_name = "FILE", help = "Page path relative to the source root")]
    file: String,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long, help = "Process every file without writing to the database")]
    dry_run: bool,
    #[arg(long, help = "Print the full migration report as JSON")]
    json: bool,
}

#[derive(Debug, Args)]
struct DbArgs {
    #[command(subcommand)]
    command: DbSubcommand,
}

#[derive(Debug, Subcommand)]
enum DbSubcommand {
    Migrate,
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Init(args)) => run_init(&runtime, args),
        Some(Commands::Status) => run_status(&runtime),
        Some(Commands::Inspect(args)) => run_inspect(&runtime, args),
        Some(Commands::Run(args)) => run_migration(&runtime, args),
        Some(Commands::Db(DbArgs { command })) => match command {
            DbSubcommand::Migrate => run_db_migrate(&runtime),
            DbSubcommand::Stats => run_db_stats(&runtime),
        },
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn run_init(runtime: &RuntimeOptions, args: InitArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let report = init_layout(
        &paths,
        &InitOptions {
            materialize_config: !args.no_config,
            force: args.force,
        },
    )?;

    println!("Initialized sitemigrate runtime layout");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("state_dir: {}", normalize_path(&paths.state_dir));
    println!("data_dir: {}", normalize_path(&paths.data_dir));
    println!("db_path: {}", normalize_path(&paths.db_path));
    println!("config_path: {}", normalize_path(&paths.config_path));
    println!("created_dirs: {}", report.created_dirs.len());
    println!("wrote_config: {}", report.wrote_config);
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }

    Ok(())
}

fn run_status(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let source_root = config.source_root(&paths.project_root);
    let status = inspect_runtime(&paths, &source_root)?;

    println!("runtime status");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!(
        "project_root_exists: {}",
        format_flag(status.project_root_exists)
    );
    println!("source_root: {}", normalize_path(&source_root));
    println!(
        "source_root_exists: {}",
        format_flag(status.source_root_exists)
    );
    println!("state_dir_exists: {}", format_flag(status.state_dir_exists));
    println!("data_dir_exists: {}", format_flag(status.data_dir_exists));
    println!("db_exists: {}", format_flag(status.db_exists));
    println!(
        "db_size_bytes: {}",
        status
            .db_size_bytes
            .map(|size| size.to_string())
            .unwrap_or_else(|| "n/a".to_string())
    );
    println!("config_exists: {}", format_flag(status.config_exists));
    println!("pending_migrations: {}", pending_migration_count(&paths)?);
    if status.source_root_exists {
        let scan = SourceTree::new(&source_root).scan()?;
        print_scan_stats("scan", &scan.stats());
    }
    if !status.warnings.is_empty() {
        println!("warnings:");
        for warning in &status.warnings {
            println!("  - {warning}");
        }
    }
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }

    Ok(())
}

fn run_inspect(runtime: &RuntimeOptions, args: InspectArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let source_root = config.source_root(&paths.project_root);
    let tree = SourceTree::new(&source_root);

    let relative = args.file.trim_start_matches('/').to_string();
    if !tree.exists(&relative) {
        bail!(
            "no such file under {}: {relative}",
            normalize_path(&source_root)
        );
    }

    let bytes = tree.read_bytes(&relative)?;
    let Ok(text) = String::from_utf8(bytes) else {
        bail!("{relative} is not valid UTF-8");
    };
    let doc = HtmlDocument::parse(&text, &relative)?;

    let basename = relative.rsplit('/').next().unwrap_or(&relative);
    let pass = if is_english_source(basename) {
        PassLanguage::English
    } else {
        PassLanguage::Japanese
    };

    let store = if paths.db_path.exists() {
        Some(SqliteContentStore::open(&paths.db_path)?)
    } else {
        None
    };
    let resolution = resolve_variant(
        &relative,
        doc.language.code(),
        pass,
        &|sibling| tree.exists(sibling),
        &|sibling| match &store {
            Some(store) => store.find_id_by_source_path(sibling),
            None => Ok(None),
        },
    )?;
    let info = path_info(&relative, pass);

    println!("inspect file");
    println!("file: {relative}");
    println!("pass: {}", pass.code());
    println!("language: {}", doc.language.code());
    println!("title: {}", doc.title);
    println!("title_original: {}", display_text(&doc.title_original));
    println!("meta_description: {}", display_text(&doc.meta_description));
    println!("meta_keywords: {}", display_text(&doc.meta_keywords));
    println!("alternate_links.count: {}", doc.alternate_links.len());
    for link in &doc.alternate_links {
        println!("alternate_links.{}: {}", link.service, link.href);
    }
    println!("canonical_path: {}", resolution.canonical_path);
    println!("destination_language: {}", resolution.language.as_str());
    for candidate in sibling_candidates(&relative, pass) {
        let state = if tree.exists(&candidate) {
            "found"
        } else {
            "missing"
        };
        println!("sibling_candidate: {candidate} ({state})");
    }
    println!(
        "sibling: {}",
        resolution.sibling_path.as_deref().unwrap_or("<none>")
    );
    println!(
        "translation_of: {}",
        resolution
            .translation_of
            .map(|id| id.to_string())
            .unwrap_or_else(|| "<none>".to_string())
    );
    let sources = info.legacy_redirect_sources();
    if sources.is_empty() {
        println!("redirect_sources: <none>");
    } else {
        for source in sources {
            println!("redirect_sources: {source}");
        }
    }
    println!("body_bytes: {}", doc.body.len());
    for note in &resolution.notes {
        println!("note: {note}");
    }
    for warning in &resolution.warnings {
        println!("warning: {warning}");
    }
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }

    Ok(())
}

fn run_migration(runtime: &RuntimeOptions, args: RunArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let source_root = config.source_root(&paths.project_root);
    let status = inspect_runtime(&paths, &source_root)?;
    ensure_runtime_ready_for_run(&paths, &status, &source_root)?;

    let source = SourceTree::new(&source_root);
    let report = if args.dry_run {
        let mut content = MemoryContentStore::new();
        let mut redirects = MemoryRedirectStore::new();
        MigrationPipeline::new(source, config, &mut content, &mut redirects).run()?
    } else {
        let mut content = SqliteContentStore::open(&paths.db_path)?;
        let mut redirects = SqliteRedirectStore::open(&paths.db_path)?;
        MigrationPipeline::new(source, config, &mut content, &mut redirects).run()?
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("migration run");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("source_root: {}", normalize_path(&source_root));
    println!("db_path: {}", normalize_path(&paths.db_path));
    println!("dry_run: {}", args.dry_run);
    print_pass_report("ja", &report.japanese);
    print_pass_report("en", &report.english);
    println!("redirects.created: {}", report.redirects.created);
    println!("redirects.kept: {}", report.redirects.kept);
    println!("redirects.overwritten: {}", report.redirects.overwritten);
    println!(
        "redirects.skipped_ambiguous: {}",
        report.redirects.skipped_ambiguous
    );
    for outcome in report
        .japanese
        .files
        .iter()
        .chain(report.english.files.iter())
        .flat_map(|file| file.redirects.iter())
    {
        match outcome.action {
            RedirectAction::Overwritten => {
                let previous = outcome.previous_target.as_deref().unwrap_or("<unknown>");
                println!(
                    "redirects.overwrote: {}: {} -> {}",
                    outcome.source, previous, outcome.target
                );
            }
            RedirectAction::SkippedAmbiguous => {
                println!("redirects.ambiguous: {}", outcome.source);
            }
            RedirectAction::Created | RedirectAction::Kept => {}
        }
    }
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }

    Ok(())
}

fn run_db_migrate(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let pending = pending_migration_count(&paths)?;
    let report = run_migrations(&paths)?;

    println!("db migrate");
    println!("db_path: {}", normalize_path(&paths.db_path));
    println!("pending_before: {pending}");
    println!("applied: {}", report.applied.len());
    for migration in &report.applied {
        println!(
            "applied.migration: v{:03} {}",
            migration.version, migration.name
        );
    }
    println!("schema_version: {}", report.current_version);
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }

    Ok(())
}

fn run_db_stats(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let source_root = config.source_root(&paths.project_root);
    let status = inspect_runtime(&paths, &source_root)?;

    println!("db stats");
    println!("db_path: {}", normalize_path(&paths.db_path));
    println!("data_dir: {}", normalize_path(&paths.data_dir));
    println!("db_exists: {}", format_flag(status.db_exists));
    println!(
        "db_size_bytes: {}",
        status
            .db_size_bytes
            .map(|size| size.to_string())
            .unwrap_or_else(|| "n/a".to_string())
    );
    if status.db_exists {
        let stats = load_store_stats(&paths.db_path)?;
        println!("schema_version: {}", stats.schema_version);
        println!("content_records: {}", stats.content_records);
        if stats.by_language.is_empty() {
            println!("by_language: <empty>");
        } else {
            for (language, count) in &stats.by_language {
                println!("by_language.{language}: {count}");
            }
        }
        println!("translated_pairs: {}", stats.translated_pairs);
        println!("redirect_rules: {}", stats.redirect_rules);
    } else {
        println!("store: <not built> (run `sitemigrate run`)");
    }
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }

    Ok(())
}

fn print_scan_stats(prefix: &str, stats: &ScanStats) {
    println!("{prefix}.total_html: {}", stats.total_html);
    println!("{prefix}.japanese: {}", stats.japanese);
    println!("{prefix}.english: {}", stats.english);
}

fn print_pass_report(prefix: &str, report: &PassReport) {
    println!("{prefix}.files: {}", report.files.len());
    println!("{prefix}.emitted: {}", report.emitted);
    println!("{prefix}.skipped: {}", report.skipped);
    println!("{prefix}.warnings: {}", report.warnings);
    for outcome in &report.files {
        if let Some(reason) = &outcome.skip_reason {
            println!("{prefix}.skipped.{}: {reason}", outcome.relative_path);
        }
        for warning in &outcome.warnings {
            println!("{prefix}.warning.{}: {warning}", outcome.relative_path);
        }
    }
}

fn resolve_runtime_paths(
    runtime: &RuntimeOptions,
) -> Result<sitemigrate_core::runtime::ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        data_dir: runtime.data_dir.clone(),
        config: runtime.config.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
    }

    resolve_paths(&context, &overrides)
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn display_text(value: &str) -> &str {
    if value.is_empty() { "<empty>" } else { value }
}
