use clap::{ArgAction, Args as ClapArgs, Parser, Subcommand};
use rillfind::{
    Args, BackendConfig, CompiledFinder, Connection, FinderSpec, OptionSet, PgBackend,
    SingleTableInheritance, WithContext, assemble::ModelInfo, pg::PgBackendBuilder,
    testing::RecordingConnection,
};
use serde_json::{Map as JsonMap, Value, json};

#[derive(Parser, Debug)]
#[command(name = "rillfind", version, about = "Compile and run declarative finders")]
struct Cli {
    /// Postgres connection string. Falls back to DATABASE_URL.
    #[arg(long)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the compiled template and parameter order
    Explain(FinderArgs),

    /// Compile, substitute `--arg` values and execute; rows are printed as JSON lines
    Run {
        #[command(flatten)]
        finder: FinderArgs,

        /// Argument as name=value; value is parsed as JSON when possible (repeatable)
        #[arg(long = "arg", action = ArgAction::Append, value_parser = parse_arg)]
        args: Vec<(String, Value)>,

        /// Print the final SQL instead of executing it
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(ClapArgs, Debug)]
struct FinderArgs {
    /// Model table the finder reads from
    #[arg(long)]
    table: String,

    #[arg(long, default_value = "finder")]
    name: String,

    /// single/first or many/all
    #[arg(long, default_value = "many")]
    arity: String,

    #[arg(long)]
    select: Option<String>,
    #[arg(long)]
    from: Option<String>,
    #[arg(long)]
    joins: Option<String>,
    #[arg(long)]
    conditions: Option<String>,
    #[arg(long)]
    group: Option<String>,
    #[arg(long)]
    order: Option<String>,
    #[arg(long)]
    limit: Option<String>,
    #[arg(long)]
    offset: Option<String>,

    /// Bind `--arg` values by position instead of by name
    #[arg(long)]
    positional: bool,

    /// Type column of a single-table hierarchy
    #[arg(long, requires = "type_names")]
    type_column: Option<String>,

    /// Type names of the subtree to restrict to (repeatable)
    #[arg(long = "type-name", action = ArgAction::Append)]
    type_names: Vec<String>,
}

impl FinderArgs {
    fn compile(&self, connection: &dyn Connection) -> rillfind::Result<CompiledFinder> {
        let mut options = OptionSet::new().positional(self.positional);
        if let Some(v) = &self.select {
            options = options.select(v);
        }
        if let Some(v) = &self.from {
            options = options.from(v);
        }
        if let Some(v) = &self.joins {
            options = options.joins(v);
        }
        if let Some(v) = &self.conditions {
            options = options.conditions(v);
        }
        if let Some(v) = &self.group {
            options = options.group(v);
        }
        if let Some(v) = &self.order {
            options = options.order(v);
        }
        if let Some(v) = &self.limit {
            options = options.limit(v);
        }
        if let Some(v) = &self.offset {
            options = options.offset(v);
        }

        let mut model = ModelInfo::new(&self.table);
        if let Some(column) = &self.type_column {
            model = model.with_inheritance(SingleTableInheritance::subtype(
                column,
                self.type_names.iter().cloned(),
            ));
        }

        let spec = FinderSpec::parse(&self.name, &self.arity, options)?;
        CompiledFinder::compile(spec, &model, connection)
    }
}

fn parse_arg(pair: &str) -> Result<(String, Value), String> {
    let (name, value) = pair
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got `{pair}`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing argument name in `{pair}`"));
    }
    let value =
        serde_json::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((name.to_string(), value))
}

fn to_args(parsed: Vec<(String, Value)>, positional: bool) -> Args {
    if positional {
        Args::Positional(parsed.into_iter().map(|(_, value)| value).collect())
    } else {
        Args::Named(Value::Object(parsed.into_iter().collect::<JsonMap<_, _>>()))
    }
}

#[tokio::main]
async fn main() -> rillfind::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Explain(finder) => {
            // compiling never touches the database
            let compiled = finder.compile(&RecordingConnection::new())?;
            let plan = json!({
                "name": compiled.name(),
                "arity": compiled.arity(),
                "positional": compiled.is_positional(),
                "parameters": compiled.parameter_order().names(),
                "sql": compiled.sql_template(),
            });
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        Commands::Run {
            finder,
            args,
            dry_run,
        } => {
            let args = to_args(args, finder.positional);
            if dry_run {
                let connection = RecordingConnection::new();
                let compiled = finder.compile(&connection)?;
                println!("{}", compiled.render(&args, &connection)?);
                return Ok(());
            }

            let config = match cli.database_url {
                Some(url) => BackendConfig::new(url),
                None => match BackendConfig::from_env() {
                    Ok(config) => config,
                    Err(e) => {
                        eprintln!("error: --database-url or env DATABASE_URL is required ({e})");
                        std::process::exit(2);
                    }
                },
            };
            let backend: PgBackend = PgBackendBuilder::from_config(&config)
                .build()
                .await
                .context("connecting to database")?;

            let compiled = finder.compile(&backend)?;
            let threshold = backend
                .slow_query_threshold()
                .unwrap_or(config.slow_query_threshold);
            let rows = compiled
                .fetch(&args, &backend, threshold)
                .await
                .context(compiled.sql_template())?
                .into_many();
            if rows.is_empty() {
                eprintln!("No rows.");
            }
            for row in rows {
                println!("{row}");
            }
        }
    }

    Ok(())
}
