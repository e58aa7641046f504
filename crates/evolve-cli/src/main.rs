use evolve::{
    CancelFlag, DirVersionStore, MigrationTarget, PgTarget, RenameHints, Runner, Version,
    VersionId, VersionStore, diff_with_hints, reconstruct, to_ddl,
};
use evolve_schema::Schema;
use facet::Facet;
use figue as args;
use owo_colors::OwoColorize;
use std::path::Path;
use tracing_subscriber::EnvFilter;

mod config;
mod render;

type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Declarative, hash-chained schema migrations for Postgres.
#[derive(Facet, Debug)]
struct Cli {
    /// Show version information
    #[facet(args::named, args::short = 'V')]
    version: bool,

    /// Command to run
    #[facet(default, args::subcommand)]
    command: Option<Commands>,
}

/// Available commands
#[derive(Facet, Debug)]
#[repr(u8)]
enum Commands {
    /// Show the modifications and DDL taking one schema snapshot to another
    Diff {
        /// Schema snapshot (JSON) to diff from
        #[facet(args::named)]
        from: String,
        /// Schema snapshot (JSON) to diff to
        #[facet(args::named)]
        to: String,
        /// Field renames, e.g. "Post.title=headline,User.mail=email"
        #[facet(default, args::named)]
        rename: Option<String>,
    },
    /// Append a version taking the history to a schema snapshot
    Generate {
        /// Version name (e.g., "add-comments")
        #[facet(args::positional)]
        name: String,
        /// Schema snapshot (JSON) the new version ends at
        #[facet(args::named)]
        to: String,
        /// Field renames, e.g. "Post.title=headline"
        #[facet(default, args::named)]
        rename: Option<String>,
    },
    /// Apply pending versions
    Migrate {
        /// Database connection URL
        #[facet(default, args::named)]
        database_url: Option<String>,
    },
    /// Show applied and pending versions
    Status {
        /// Database connection URL
        #[facet(default, args::named)]
        database_url: Option<String>,
    },
    /// Print the schema the history ends at
    Schema {
        /// Print the schema as JSON
        #[facet(args::named)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args_ref: Vec<&str> = args.iter().map(|s| s.as_str()).collect();

    let cli: Cli = match args::from_slice(&args_ref) {
        Ok(cli) => cli,
        Err(err) if err.is_help_request() => {
            print!("{}", err.help_text().unwrap_or(""));
            return;
        }
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> CliResult {
    if cli.version {
        println!("evolve {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let Some(command) = cli.command else {
        let config = args::HelpConfig {
            program_name: Some("evolve".to_string()),
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
            ..Default::default()
        };
        print!("{}", args::generate_help::<Cli>(&config));
        return Ok(());
    };

    let project = config::load()?;
    match command {
        Commands::Diff { from, to, rename } => {
            let old = read_snapshot(Path::new(&from))?;
            let new = read_snapshot(Path::new(&to))?;
            let hints = parse_renames(rename.as_deref())?;
            let plan = diff_with_hints(&old, &new, &hints);
            if plan.is_empty() {
                println!("{}", "No changes.".green());
                return Ok(());
            }
            println!("{}", "Modifications:".bold());
            for (index, modification) in plan.iter().enumerate() {
                println!("  {} {}", format!("#{}", index).dimmed(), modification);
            }
            if let Some(warning) = render::destructive_warning(&plan) {
                println!("{}", warning.yellow());
            }
            println!();
            println!("{}", "DDL:".bold());
            print!("{}", to_ddl(&old, &plan)?.to_sql());
        }
        Commands::Generate { name, to, rename } => {
            let name = version_name(&name)?;
            let mut store = DirVersionStore::open(project.migrations_dir())?;
            let current = reconstruct(&store.versions()?)?;
            let desired = read_snapshot(Path::new(&to))?;
            let hints = parse_renames(rename.as_deref())?;
            if diff_with_hints(&current, &desired, &hints).is_empty() {
                println!("{}", "No changes, nothing generated.".green());
                return Ok(());
            }
            let id = VersionId::timestamped(jiff::Timestamp::now(), name)?;
            let version = Version::plan_with_hints(id, &current, &desired, &hints)?;
            if let Some(warning) = render::destructive_warning(&version.modifications) {
                eprintln!("{}", warning.yellow());
            }
            let count = version.modifications.len();
            let id = version.version.clone();
            store.append(version)?;
            println!(
                "{} {} ({} modification{})",
                "Created".green(),
                store.dir().join(format!("{}.json", id)).display(),
                count,
                if count == 1 { "" } else { "s" }
            );
        }
        Commands::Migrate { database_url } => {
            let url = require_url(&project, database_url)?;
            let versions = DirVersionStore::open(project.migrations_dir())?.versions()?;
            eprintln!("Migrating {}", mask_password(&url).dimmed());

            let cancel = CancelFlag::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupt received, stopping after the current version");
                    on_signal.cancel();
                }
            });

            let target = PgTarget::new(connect(&url).await?);
            let runner = Runner::new(target, project.lock_name()).with_cancel(cancel);
            let report = runner.run(&versions).await?;
            for id in &report.applied {
                println!("  {} {}", "applied".green(), id);
            }
            if report.cancelled {
                println!("{}", "Cancelled; remaining versions were not applied.".yellow());
            } else if report.applied.is_empty() {
                println!("{}", "Already up to date.".green());
            }
        }
        Commands::Status { database_url } => {
            let url = require_url(&project, database_url)?;
            let versions = DirVersionStore::open(project.migrations_dir())?.versions()?;
            let target = PgTarget::new(connect(&url).await?);
            target.ensure_meta().await?;
            let state = target.state().await?;
            render::status(&versions, &state);
        }
        Commands::Schema { json } => {
            let versions = DirVersionStore::open(project.migrations_dir())?.versions()?;
            let schema = reconstruct(&versions)?;
            if json {
                println!(
                    "{}",
                    facet_json::to_string_pretty(&schema).map_err(|e| e.to_string())?
                );
            } else {
                print!("{}", render::schema(&schema));
            }
        }
    }
    Ok(())
}

fn read_snapshot(path: &Path) -> CliResult<Schema> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    let schema: Schema = facet_json::from_str(&text)
        .map_err(|e| format!("failed to parse {}: {}", path.display(), e))?;
    schema.validate()?;
    Ok(schema)
}

/// The name a generated version id ends in; it must survive slugging.
fn version_name(name: &str) -> CliResult<&str> {
    let name = name.trim();
    if !name.chars().any(|c| c.is_ascii_alphanumeric()) {
        return Err(format!("invalid version name {:?}: needs a letter or digit", name).into());
    }
    Ok(name)
}

/// Parse `Entity.from=to` pairs separated by commas.
fn parse_renames(list: Option<&str>) -> CliResult<RenameHints> {
    let mut hints = RenameHints::new();
    let Some(list) = list else {
        return Ok(hints);
    };
    for pair in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let parsed = pair
            .split_once('=')
            .and_then(|(from, to)| from.split_once('.').map(|(entity, from)| (entity, from, to)));
        match parsed {
            Some((entity, from, to)) if !entity.is_empty() && !from.is_empty() && !to.is_empty() => {
                hints = hints.field(entity, from, to);
            }
            _ => return Err(format!("invalid rename {:?}, expected Entity.from=to", pair).into()),
        }
    }
    Ok(hints)
}

fn require_url(project: &config::Project, flag: Option<String>) -> CliResult<String> {
    project.database_url(flag).ok_or_else(|| {
        "no database URL: pass --database-url, set database_url in .config/evolve.styx, or set DATABASE_URL"
            .into()
    })
}

/// One pooled connection; the advisory lock belongs to its session.
async fn connect(url: &str) -> CliResult<deadpool_postgres::Object> {
    let mut cfg = deadpool_postgres::Config::new();
    cfg.url = Some(url.to_string());
    let pool = cfg.create_pool(
        Some(deadpool_postgres::Runtime::Tokio1),
        tokio_postgres::NoTls,
    )?;
    Ok(pool.get().await?)
}

/// Mask password in database URL for display
fn mask_password(url: &str) -> String {
    if let Some(start) = url.find("://") {
        if let Some(at) = url.rfind('@') {
            if at > start + 3 {
                let prefix = &url[..start + 3];
                let suffix = &url[at..];
                if let Some(colon) = url[start + 3..at].find(':') {
                    let user = &url[start + 3..start + 3 + colon];
                    return format!("{}{}:***{}", prefix, user, suffix);
                }
            }
        }
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_the_password_only() {
        assert_eq!(
            mask_password("postgres://app:hunter2@db:5432/shop"),
            "postgres://app:***@db:5432/shop"
        );
        assert_eq!(mask_password("postgres://db/shop"), "postgres://db/shop");
        assert_eq!(mask_password("host=db user=app"), "host=db user=app");
    }

    #[test]
    fn version_names_need_a_letter_or_digit() {
        assert_eq!(version_name("  add-comments ").unwrap(), "add-comments");
        assert!(version_name("").is_err());
        assert!(version_name("   ").is_err());
        assert!(version_name("--!").is_err());
    }

    #[test]
    fn parses_rename_pairs() {
        let hints = parse_renames(Some("Post.title=headline, User.mail=email")).unwrap();
        let pairs: Vec<_> = hints
            .fields()
            .iter()
            .map(|r| (r.entity.as_str(), r.from.as_str(), r.to.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![("Post", "title", "headline"), ("User", "mail", "email")]
        );
        assert!(parse_renames(None).unwrap().is_empty());
        assert!(parse_renames(Some("title=headline")).is_err());
        assert!(parse_renames(Some("Post.title=")).is_err());
    }
}
