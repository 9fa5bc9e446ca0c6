use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use progain_tools::commands::cleaning::{remove_obsolete_field, FieldRemoval};
use progain_tools::commands::client_ids::{fix_client_ids, ClientIdFix};
use progain_tools::commands::date_ops::{split_dates, DateSplit};
use progain_tools::commands::inspection::{check_dates, diagnose};
use progain_tools::commands::storage_paths::{migrate_storage_paths, StoragePathMigration};
use progain_tools::commands::transfer::transfer_all;
use progain_tools::config::{Overrides, ToolConfig};
use progain_tools::confirm::{confirm, Confirmation};
use progain_tools::credentials::{CredentialSource, CREDENTIALS_ENV};
use progain_tools::error::MigrateError;
use progain_tools::file_utils::{format_bytes, get_file_size};
use progain_tools::identifier_map::MapSources;
use progain_tools::logging;
use progain_tools::models::CollectionPath;
use progain_tools::runner::RunOptions;
use progain_tools::source::SqliteSource;
use progain_tools::store::JsonDocumentStore;

#[derive(Debug, Parser)]
#[command(
    name = "progain_tools",
    about = "Migración y reparación de datos entre SQLite y el document store de Progain"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Evalúa todo pero no escribe en el store
    #[arg(long, global = true)]
    dry_run: bool,

    /// Escrituras por lote (1..=500)
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    /// Archivo de configuración JSON (por defecto progain_tools.json si existe)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Archivo de credenciales de la cuenta de servicio
    #[arg(long, global = true)]
    credentials: Option<PathBuf>,

    /// Pide la ruta de credenciales por consola
    #[arg(long, global = true, conflicts_with = "credentials")]
    prompt_credentials: bool,

    /// Directorio de los snapshots del store
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    /// Base de datos SQLite de origen
    #[arg(long, global = true)]
    sqlite: Option<PathBuf>,

    /// No pide confirmación antes de escribir
    #[arg(short, long, global = true)]
    yes: bool,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Agrega `ano` y `mes` a partir de `fecha`
    SplitDates {
        #[arg(long, default_value = "alquileres")]
        collection: String,
    },
    /// Corrige `cliente_id` de abonos (id SQLite → id de entidad)
    FixClientIds {
        /// Limita las entidades SQLite a un proyecto
        #[arg(long)]
        project_id: Option<i64>,
    },
    /// Elimina `conduce_url` donde ya existe `conduce_storage_path`
    DropConduceUrl,
    /// Convierte las URLs de conduces en rutas de storage
    MigrateConducePaths,
    /// Copia las tablas de SQLite al store
    Transfer,
    /// Lista colecciones y muestra documentos de ejemplo
    Diagnose {
        #[arg(long, default_value = "conduces")]
        collection: String,
    },
    /// Revisa el tipo del campo de fecha en una colección
    CheckDates {
        #[arg(long, default_value = "pagos_operadores")]
        collection: String,
        #[arg(long, default_value = "fecha")]
        field: String,
    },
    /// Versión y datos de compilación
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("❌ {}", err);
            ExitCode::from(err.exit_code())
        }
    }
}

fn run(cli: Cli) -> Result<(), MigrateError> {
    if let Command::Version = cli.command {
        print_version();
        return Ok(());
    }

    let config = ToolConfig::load(cli.config.as_deref())?.with_overrides(Overrides {
        sqlite_path: cli.sqlite.clone(),
        credentials_path: cli.credentials.clone(),
        store_dir: cli.store_dir.clone(),
        batch_size: cli.batch_size,
    })?;
    let options = RunOptions::from_config(&config, cli.dry_run);
    if cli.dry_run {
        info!("⚠️  MODO SIMULACIÓN: no se escribirá nada en el store");
    }

    let mut store = connect_store(&cli, &config)?;

    match &cli.command {
        Command::SplitDates { collection } => {
            print_header("Descomposición de fechas");
            let plan = DateSplit::for_collection(collection);
            split_dates(&mut store, &plan, options)?.print(&format!("fechas {}", collection));
        }
        Command::FixClientIds { project_id } => {
            print_header("Corrección de cliente_id en abonos");
            let source = open_source(&config)?;
            let sources = MapSources {
                project_id: *project_id,
                ..MapSources::clients()
            };
            fix_client_ids(&source, &mut store, &sources, &ClientIdFix::default(), options)?
                .print("abonos cliente_id");
        }
        Command::DropConduceUrl => {
            print_header("Limpieza de conduce_url");
            if !confirmed(&cli, "¿Eliminar conduce_url de los alquileres ya migrados?", Confirmation::YesNo)? {
                return Ok(());
            }
            remove_obsolete_field(&mut store, &FieldRemoval::default(), options)?
                .print("alquileres conduce_url");
        }
        Command::MigrateConducePaths => {
            print_header("Migración de URLs de conduces");
            if !confirmed(&cli, "¿Estás SEGURO?", Confirmation::Typed("MIGRAR"))? {
                return Ok(());
            }
            migrate_storage_paths(&mut store, &StoragePathMigration::default(), options)?
                .print("alquileres conduce_storage_path");
        }
        Command::Transfer => {
            print_header("Migración SQLite → store");
            let source = open_source(&config)?;
            let report = transfer_all(&source, &mut store, options)?;
            for (label, summary) in &report.steps {
                summary.print(label);
            }
            report.total().print("total");
        }
        Command::Diagnose { collection } => {
            print_header("Diagnóstico");
            if let Ok(size) = get_file_size(store.path()) {
                println!("💾 Snapshot: {} ({})", store.path().display(), format_bytes(size));
            }
            diagnose(&store, &CollectionPath::root(collection.as_str()))?.print();
        }
        Command::CheckDates { collection, field } => {
            let collection = CollectionPath::root(collection.as_str());
            check_dates(&store, &collection, field)?.print(&collection, field);
        }
        Command::Version => {}
    }

    info!("✅ Proceso finalizado");
    Ok(())
}

/// Siempre confirma en simulación o con `--yes`
fn confirmed(cli: &Cli, question: &str, confirmation: Confirmation) -> Result<bool, MigrateError> {
    if cli.dry_run || cli.yes {
        return Ok(true);
    }
    let accepted = confirm(question, confirmation).map_err(MigrateError::Confirm)?;
    if !accepted {
        println!("❌ Operación cancelada.");
    }
    Ok(accepted)
}

/// `--prompt-credentials`, luego `--credentials`, luego la variable de
/// entorno y por último la ruta del archivo de configuración
fn credential_source(cli: &Cli, config: &ToolConfig) -> CredentialSource {
    if cli.prompt_credentials {
        CredentialSource::Prompt
    } else if cli.credentials.is_none() && env::var_os(CREDENTIALS_ENV).is_some() {
        CredentialSource::Env(CREDENTIALS_ENV.to_string())
    } else {
        CredentialSource::Fixed(config.credentials_path.clone())
    }
}

fn connect_store(cli: &Cli, config: &ToolConfig) -> Result<JsonDocumentStore, MigrateError> {
    let account = credential_source(cli, config).load()?;
    JsonDocumentStore::connect(&config.store_dir, &account).map_err(MigrateError::Connect)
}

fn open_source(config: &ToolConfig) -> Result<SqliteSource, MigrateError> {
    SqliteSource::open(&config.sqlite_path).map_err(|source| MigrateError::Database {
        path: config.sqlite_path.clone(),
        source,
    })
}

fn print_header(title: &str) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║  {:<60}║", title);
    println!("╚══════════════════════════════════════════════════════════════╝");
}

fn print_version() {
    println!("progain_tools {}", env!("PROGAIN_TOOLS_VERSION"));
    println!("📅 Build: {}", env!("BUILD_DATE"));
    println!("🎯 Target: {}", env!("BUILD_TARGET"));
    println!("⚙️  Profile: {}", env!("BUILD_PROFILE"));
}
