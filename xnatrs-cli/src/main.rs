use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use dialoguer::Password;
use tracing_subscriber::EnvFilter;

use xnatrs::XnatSession;

#[derive(Parser)]
#[clap(author, version, about = "Command-line XNAT client", disable_help_subcommand = true)]
struct Cli {
    /// XNAT server address, e.g. https://xnat.example.com
    #[clap(short, long, env = "XNAT_HOST")]
    server: String,

    /// Account username; anonymous access when omitted
    #[clap(short, long, env = "XNAT_USER")]
    user: Option<String>,

    /// Account password; prompted for when a user is given and this is unset
    #[clap(long, env = "XNAT_PASS", hide_env_values = true)]
    password: Option<String>,

    /// Show debug logging
    #[clap(short, long)]
    verbose: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List projects
    Projects,

    /// List subjects, optionally within one project
    Subjects {
        #[clap(short, long)]
        project: Option<String>,
    },

    /// List experiments, optionally within one project
    Experiments {
        #[clap(short, long)]
        project: Option<String>,
    },

    /// Download a server path to a local file
    Download {
        /// Rooted server path, e.g. /data/experiments/E1/resources/DICOM/files/x.dcm
        uri: String,
        dest: PathBuf,
    },

    /// Show the classes generated from the server's schemas
    Schema,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "xnatrs=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let password = match (&cli.user, cli.password) {
        (Some(_), None) => Some(Password::new().with_prompt("Password").interact()?),
        (_, password) => password,
    };

    let session = XnatSession::connect(&cli.server, cli.user.as_deref(), password.as_deref())?;

    match cli.command {
        Commands::Projects => {
            let rows = session.projects().tabulate(&["ID", "name"])?;
            print_rows(&rows, &["ID", "name"]);
        }
        Commands::Subjects { project } => {
            let columns = ["ID", "label"];
            let rows = match project {
                Some(project) => session
                    .projects()
                    .get(&project)?
                    .listing("subjects")?
                    .tabulate(&columns)?,
                None => session.subjects().tabulate(&columns)?,
            };
            print_rows(&rows, &columns);
        }
        Commands::Experiments { project } => {
            let columns = ["ID", "label", "xsiType"];
            let rows = match project {
                Some(project) => session
                    .projects()
                    .get(&project)?
                    .listing("experiments")?
                    .tabulate(&columns)?,
                None => session.experiments().tabulate(&columns)?,
            };
            print_rows(&rows, &columns);
        }
        Commands::Download { uri, dest } => {
            let bytes = session.download_file(&uri, &dest)?;
            eprintln!("wrote {bytes} bytes to {}", dest.display());
        }
        Commands::Schema => {
            let mut specs: Vec<_> = session.registry().iter().collect();
            specs.sort_by(|a, b| a.name.cmp(&b.name));
            for spec in specs {
                println!(
                    "{}\t{}\t{:?}\t{} properties",
                    spec.name,
                    spec.xsi_type,
                    spec.kind,
                    spec.properties.len()
                );
            }
        }
    }
    Ok(())
}

fn print_rows(rows: &[serde_json::Map<String, serde_json::Value>], columns: &[&str]) {
    println!("{}", columns.join("\t"));
    for row in rows {
        let cells: Vec<&str> = columns
            .iter()
            .map(|c| row.get(*c).and_then(serde_json::Value::as_str).unwrap_or(""))
            .collect();
        println!("{}", cells.join("\t"));
    }
}
