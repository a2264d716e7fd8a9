use anyhow::Result;
use clap::{Parser, Subcommand};
use redb_cli::commands::{
    compare_command, describe_command, history_command, init_project_command,
    list_functions_command, project_info_command, query_command, submit_command,
};
use redb_cli::init_tracing;

/// Function-similarity search over reverse-engineered binaries.
///
/// This CLI is a thin wrapper around `redb-core`. All substantive logic lives in the
/// library so it can be tested thoroughly and reused from other frontends.
#[derive(Parser, Debug)]
#[command(
    name = "redb",
    version,
    about = "Function-similarity search over reverse-engineered binaries",
    long_about = None
)]
struct Cli {
    /// Log pipeline decisions to stderr (`RUST_LOG` takes precedence).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize a new corpus project at the given root.
    ///
    /// This will:
    /// - Create a `.redb` metadata directory.
    /// - Write a `.redb/project.json` config file with the default matching config.
    /// - Create the corpus database.
    Init {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Optional project name. If omitted, the name is derived from the root directory.
        #[arg(long)]
        name: Option<String>,
    },

    /// Show basic information about an existing project.
    Info {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Validate fingerprints from a JSON file and store them in the corpus.
    Submit {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// JSON file holding one fingerprint or an array of them.
        #[arg(long)]
        file: String,

        /// User to attribute `--description` to.
        #[arg(long)]
        user: Option<String>,

        /// Description to attach to every submitted fingerprint.
        #[arg(long)]
        description: Option<String>,
    },

    /// Attach or replace a user's description of a stored function.
    Describe {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        #[arg(long)]
        signature: String,

        #[arg(long)]
        user: String,

        #[arg(long)]
        data: String,
    },

    /// List stored functions.
    List {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Match fingerprints against the corpus and print ranked matches.
    Query {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// JSON file holding one query fingerprint or an array of them.
        #[arg(long)]
        file: String,

        /// YAML or JSON matching config overriding the project's.
        #[arg(long)]
        config: Option<String>,

        /// Only print the best N matches per query.
        #[arg(long)]
        top: Option<usize>,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Show every pipeline stage for one pair of fingerprints.
    Compare {
        /// Query fingerprint file.
        #[arg(long)]
        left: String,

        /// Candidate fingerprint file.
        #[arg(long)]
        right: String,

        /// YAML or JSON matching config; defaults apply otherwise.
        #[arg(long)]
        config: Option<String>,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List recorded query runs.
    History {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Init { root, name } => init_project_command(&root, name)?,
        Command::Info { root, json } => project_info_command(&root, json)?,
        Command::Submit { root, file, user, description } => {
            submit_command(&root, &file, user, description)?
        }
        Command::Describe { root, signature, user, data } => {
            describe_command(&root, &signature, &user, &data)?
        }
        Command::List { root, json } => list_functions_command(&root, json)?,
        Command::Query { root, file, config, top, json } => {
            query_command(&root, &file, config.as_deref(), top, json)?
        }
        Command::Compare { left, right, config, json } => {
            compare_command(&left, &right, config.as_deref(), json)?
        }
        Command::History { root, json } => history_command(&root, json)?,
    }

    Ok(())
}
