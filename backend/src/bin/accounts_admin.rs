use clap::{Parser, Subcommand};

use accounts_backend::passwords::hash_password;
use accounts_backend::{logging, Config, SessionStore, SqliteStore, UserRepository};
use accounts_common::{username_from_email, NewUser};

#[derive(Parser, Debug)]
#[command(name = "accounts-admin", version, about = "Accounts service administration")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a staff superuser that can sign in at /admin/login/.
    CreateSuperuser {
        #[arg(long)]
        email: String,

        /// Defaults to the part of the email before '@'.
        #[arg(long)]
        username: Option<String>,

        #[arg(long, env = "ACCOUNTS_SUPERUSER_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Delete expired sessions from the store.
    ClearSessions,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = Config::load()?;
    logging::init(&config.logging.level);

    let store = SqliteStore::new(&config.database.url)?;

    match cli.cmd {
        Command::CreateSuperuser {
            email,
            username,
            password,
        } => {
            if password.is_empty() {
                return Err("password must not be empty".into());
            }
            let username = username.unwrap_or_else(|| username_from_email(email.trim()).to_string());
            let new_user = NewUser::superuser(&email, &username, hash_password(&password)?)?;
            let user = store.create(&new_user)?;
            println!("Superuser {} created (id {})", user.email, user.id);
        }
        Command::ClearSessions => {
            let removed = store.clear_expired(chrono::Utc::now())?;
            println!("Removed {} expired sessions", removed);
        }
    }

    Ok(())
}
