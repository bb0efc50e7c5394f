mod config;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

use anatomist::ParserHost;
use common::policy::STANDARD_ROOT;
use common::registry::{ContractStore, MappedStore, MemoryRegistry, RegistryError};
use common::{ContractRegistry, NodeKind, PolicyTables};
use config::GateConfig;
use shadow::{CpuBudget, MemoryLedger, ResourceGuard};
use warden::{EntryPoints, Linter, Outcome, Violation};

#[derive(Parser)]
#[command(name = "gate")]
#[command(about = "Admission linter for sandboxed smart contracts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lint contract files (directories are walked for `.py` files).
    Check {
        /// Contract files or directories.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Contract store consulted for `import` (overrides GATE_REGISTRY).
        #[arg(long)]
        registry: Option<PathBuf>,
        /// Treat NAME as a registered contract.
        #[arg(long = "allow", value_name = "NAME")]
        allow: Vec<String>,
        /// Emit one JSON report per file instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Print the exported functions and constructor of a contract.
    Exports {
        /// Contract file.
        path: PathBuf,
    },
    /// Contract store management.
    Registry {
        #[command(subcommand)]
        cmd: RegistryCmd,
    },
    /// Print the admission policy and resource limits in force.
    Policy {
        /// Only report whether each AST KIND (e.g. `Lambda`) is admitted.
        #[arg(value_name = "KIND")]
        kinds: Vec<String>,
    },
}

#[derive(Subcommand)]
enum RegistryCmd {
    /// Admit a contract and record it under NAME.
    Add {
        /// Bare module name other contracts import.
        name: String,
        /// Contract file.
        path: PathBuf,
        /// Import root to register under.
        #[arg(long, default_value = STANDARD_ROOT)]
        root: String,
        #[arg(long)]
        registry: Option<PathBuf>,
    },
    /// List registered contracts.
    List {
        #[arg(long)]
        registry: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("warning: .env: {}", e);
        }
    }
    init_logging();

    let config = GateConfig::from_env()?;
    ResourceGuard::apply(&config.limits).context("Failed to apply resource limits")?;
    let cli = Cli::parse();

    match &cli.command {
        Commands::Check {
            paths,
            registry,
            allow,
            json,
        } => {
            let store = registry.as_deref().unwrap_or(&config.registry_path);
            if !cmd_check(paths, store, allow, *json)? {
                std::process::exit(1);
            }
        }
        Commands::Exports { path } => cmd_exports(path)?,
        Commands::Registry { cmd } => match cmd {
            RegistryCmd::Add {
                name,
                path,
                root,
                registry,
            } => {
                let store = registry.as_deref().unwrap_or(&config.registry_path);
                cmd_registry_add(name, path, root, store)?
            }
            RegistryCmd::List { registry } => {
                cmd_registry_list(registry.as_deref().unwrap_or(&config.registry_path))?
            }
        },
        Commands::Policy { kinds } => cmd_policy(kinds)?,
    }

    Ok(())
}

/// Logs go to stderr so `--json` output stays machine-readable.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

// ---------------------------------------------------------------------------
// check
// ---------------------------------------------------------------------------

/// Registered contracts plus names allowed on the command line.
struct KnownContracts {
    store: Option<MappedStore>,
    allowed: MemoryRegistry,
}

impl ContractRegistry for KnownContracts {
    fn exists(&self, name: &str) -> Result<bool, RegistryError> {
        if self.allowed.exists(name)? {
            return Ok(true);
        }
        match &self.store {
            Some(store) => store.exists(name),
            None => Ok(false),
        }
    }
}

fn open_known(path: &Path, allow: &[String]) -> anyhow::Result<KnownContracts> {
    let store = if path.exists() {
        let store = MappedStore::open(path)
            .with_context(|| format!("Failed to open contract store {}", path.display()))?;
        tracing::debug!(path = %path.display(), contracts = store.len(), "contract store mapped");
        Some(store)
    } else {
        tracing::debug!(path = %path.display(), "no contract store; only --allow names resolve");
        None
    };
    Ok(KnownContracts {
        store,
        allowed: allow.iter().cloned().collect(),
    })
}

#[derive(Serialize)]
struct FileReport {
    path: String,
    passed: bool,
    /// Rendered violation lines, in order.
    messages: Vec<String>,
    violations: Vec<Violation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    entry_points: Option<EntryPoints>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl FileReport {
    fn failed(path: String, error: impl ToString) -> Self {
        Self {
            path,
            passed: false,
            messages: Vec::new(),
            violations: Vec::new(),
            entry_points: None,
            error: Some(error.to_string()),
        }
    }
}

/// Lints one file. The source is charged against the memory ceiling while it
/// is mapped, and the whole admission runs against the CPU budget.
fn check_file(
    host: &mut ParserHost,
    linter: &Linter<'_>,
    registry: &dyn ContractRegistry,
    ledger: &MemoryLedger,
    path: &Path,
) -> FileReport {
    let display = path.display().to_string();
    let budget = CpuBudget::start();
    let size = match std::fs::metadata(path) {
        Ok(meta) => usize::try_from(meta.len()).unwrap_or(usize::MAX),
        Err(e) => return FileReport::failed(display, e),
    };
    if let Err(e) = ledger.charge(size) {
        return FileReport::failed(display, e);
    }
    let parsed = host.parse_file(path);
    ledger.release(size);

    let module = match parsed {
        Ok(module) => module,
        Err(e) => return FileReport::failed(display, e),
    };
    let violations = linter.inspect(&module, registry);
    if let Err(e) = budget.check() {
        tracing::warn!(path = %path.display(), error = %e, "admission over budget");
        return FileReport::failed(display, e);
    }

    let passed = violations.is_empty();
    FileReport {
        path: display,
        passed,
        messages: violations.iter().map(Violation::to_string).collect(),
        violations,
        entry_points: passed.then(|| linter.entry_points(&module)),
        error: None,
    }
}

/// Returns `true` if every contract was admitted.
fn cmd_check(paths: &[PathBuf], store: &Path, allow: &[String], json: bool) -> anyhow::Result<bool> {
    let known = open_known(store, allow)?;
    let linter = Linter::new(PolicyTables::standard());
    let mut host = ParserHost::new()?;
    let ledger = MemoryLedger::new();

    let mut files = Vec::new();
    for path in paths {
        files.extend(collect_py_files(path)?);
    }
    if files.is_empty() {
        println!("No contract files found.");
        return Ok(true);
    }

    let reports: Vec<FileReport> = files
        .iter()
        .map(|file| check_file(&mut host, &linter, &known, &ledger, file))
        .collect();
    let rejected = reports.iter().filter(|r| !r.passed).count();

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(rejected == 0);
    }

    println!("+------------------------------------------+");
    println!("| GATE CHECK                               |");
    println!("+------------------------------------------+");
    println!("| Contracts      : {:>22} |", reports.len());
    println!("| Admitted       : {:>22} |", reports.len() - rejected);
    println!("| Rejected       : {:>22} |", rejected);
    println!("+------------------------------------------+");

    for report in &reports {
        if report.passed {
            let exports = report
                .entry_points
                .as_ref()
                .map(|p| p.exports.join(", "))
                .unwrap_or_default();
            println!("  PASS {} [{}]", report.path, exports);
            continue;
        }
        println!("  FAIL {}", report.path);
        if let Some(err) = &report.error {
            println!("    {}", err);
        }
        for message in &report.messages {
            println!("    {}", message);
        }
    }

    Ok(rejected == 0)
}

// ---------------------------------------------------------------------------
// exports
// ---------------------------------------------------------------------------

fn cmd_exports(path: &Path) -> anyhow::Result<()> {
    let mut host = ParserHost::new()?;
    let module = host
        .parse_file(path)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    let points = Linter::new(PolicyTables::standard()).entry_points(&module);

    println!("EXPORTS ({}):", points.exports.len());
    for name in &points.exports {
        println!("  {}", name);
    }
    match &points.constructor {
        Some(name) => println!("CONSTRUCTOR: {}", name),
        None => println!("CONSTRUCTOR: none"),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// registry
// ---------------------------------------------------------------------------

fn cmd_registry_add(name: &str, path: &Path, root: &str, store_path: &Path) -> anyhow::Result<()> {
    let policy = PolicyTables::standard();
    let source = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let module = ParserHost::new()?
        .parse_bytes(&source)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    let mut store = ContractStore::load(store_path)
        .with_context(|| format!("Failed to load contract store {}", store_path.display()))?;
    let linter = Linter::new(policy);
    if let Outcome::Fail(violations) = linter.check(&module, &store) {
        for line in &violations {
            eprintln!("  {}", line);
        }
        anyhow::bail!("{} rejected with {} violation(s)", path.display(), violations.len());
    }

    let entry = store.register(policy, name, root, &source)?.clone();
    store
        .save(store_path)
        .with_context(|| format!("Failed to save contract store {}", store_path.display()))?;

    let points = linter.entry_points(&module);
    println!("Registered {}", policy.import_root(&entry.root)?.qualify(&entry.name));
    println!("  hash    : {}", entry.source_hex());
    println!("  exports : {}", points.exports.join(", "));
    if let Some(constructor) = points.constructor {
        println!("  seed    : {}", constructor);
    }
    Ok(())
}

fn cmd_registry_list(store_path: &Path) -> anyhow::Result<()> {
    let store = ContractStore::load(store_path)
        .with_context(|| format!("Failed to load contract store {}", store_path.display()))?;

    println!("+------------------------------------------+");
    println!("| CONTRACT REGISTRY                        |");
    println!("+------------------------------------------+");
    println!("| Contracts      : {:>22} |", store.len());
    println!("+------------------------------------------+");
    for entry in &store.entries {
        println!(
            "  {:<24} {:<20} {} @{}",
            entry.name,
            entry.root,
            &entry.source_hex()[..16],
            entry.registered_at
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// policy
// ---------------------------------------------------------------------------

/// `Lambda: denied` style answer for one AST kind label.
fn describe_kind(policy: &PolicyTables, label: &str) -> Option<String> {
    let kind = NodeKind::from_label(label)?;
    let verdict = if policy.is_allowed(kind) { "admitted" } else { "denied" };
    Some(format!("{}: {}", kind.label(), verdict))
}

fn cmd_policy(kinds: &[String]) -> anyhow::Result<()> {
    let policy = PolicyTables::standard();
    if !kinds.is_empty() {
        for label in kinds {
            let line = describe_kind(policy, label)
                .with_context(|| format!("Unknown AST kind {:?}", label))?;
            println!("{}", line);
        }
        return Ok(());
    }
    let limits = ResourceGuard::current();

    let whitelist: Vec<&str> = policy.whitelist().map(|k| k.label()).collect();
    println!("WHITELIST ({}):", whitelist.len());
    for chunk in whitelist.chunks(8) {
        println!("  {}", chunk.join(" "));
    }

    let decorators = policy.decorators();
    println!("\nDECORATORS: export={} construct={}", decorators.export, decorators.construct);

    let roots: Vec<&str> = policy.import_roots().iter().map(|r| r.as_str()).collect();
    println!("IMPORT ROOTS: {}", roots.join(", "));

    let names: Vec<&str> = policy.safe_names().iter().map(|(name, _)| name).collect();
    println!("\nSAFE NAMES ({}):", names.len());
    for chunk in names.chunks(8) {
        println!("  {}", chunk.join(" "));
    }

    println!("\nLIMITS:");
    println!("  recursion depth : {}", limits.recursion_depth);
    println!("  cpu time        : {:?}", limits.cpu_time);
    println!("  memory bytes    : {}", limits.memory_bytes);
    Ok(())
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn collect_py_files(path: &Path) -> anyhow::Result<Vec<PathBuf>> {
    use walkdir::WalkDir;
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.exists() {
        anyhow::bail!("No such file or directory: {}", path.display());
    }
    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_type().is_file() && e.path().extension().and_then(|x| x.to_str()) == Some("py")
        })
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_collect_py_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.py"), "x = 1\n").unwrap();
        fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "skip").unwrap();

        let files = collect_py_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.py", "b.py"]);
        assert!(collect_py_files(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_check_file_reports() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.py");
        let bad = dir.path().join("bad.py");
        let broken = dir.path().join("broken.py");
        fs::write(&good, "import currency\n@export\ndef a():\n    return 1\n").unwrap();
        fs::write(&bad, "def a():\n    return 1\n").unwrap();
        fs::write(&broken, "def a(:\n").unwrap();

        let known = open_known(&dir.path().join("none.rkyv"), &["currency".to_string()]).unwrap();
        let linter = Linter::new(PolicyTables::standard());
        let mut host = ParserHost::new().unwrap();
        let ledger = MemoryLedger::new();

        let report = check_file(&mut host, &linter, &known, &ledger, &good);
        assert!(report.passed);
        assert_eq!(report.entry_points.unwrap().exports, vec!["a"]);

        let report = check_file(&mut host, &linter, &known, &ledger, &bad);
        assert!(!report.passed);
        assert_eq!(report.messages, vec!["S13- no valid export found"]);

        let report = check_file(&mut host, &linter, &known, &ledger, &broken);
        assert!(!report.passed);
        assert!(report.error.is_some());

        let report = check_file(&mut host, &linter, &known, &ledger, &dir.path().join("gone.py"));
        assert!(!report.passed);
        assert!(report.error.is_some());
        // every charge is released
        assert_eq!(ledger.used(), 0);
    }

    #[test]
    fn test_describe_kind() {
        let policy = PolicyTables::standard();
        assert_eq!(describe_kind(policy, "Lambda").as_deref(), Some("Lambda: denied"));
        assert_eq!(describe_kind(policy, "FunctionDef").as_deref(), Some("FunctionDef: admitted"));
        assert_eq!(describe_kind(policy, "Nope"), None);
    }

    #[test]
    fn test_known_contracts_reads_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contracts.rkyv");
        let mut store = ContractStore::new();
        store
            .register(PolicyTables::standard(), "currency", STANDARD_ROOT, b"x = 1")
            .unwrap();
        store.save(&path).unwrap();

        let known = open_known(&path, &[]).unwrap();
        assert!(known.exists("currency").unwrap());
        assert!(!known.exists("exchange").unwrap());
    }
}
