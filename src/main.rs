use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use courier::api::{ApiClient, Message};
use courier::auth::{AuthResult, Destination, JwtDecoder, SessionManager};
use courier::config::Config;
use courier::messages::MessageBoard;
use courier::profile::{self, ProfileService};
use courier::security::FileSecureStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "courier", version, about = "Courier messaging client")]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and remember the session
    Login {
        #[arg(long)]
        email: String,
        /// Prompted for when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Create an account
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Sign out and forget the stored credential
    Logout,
    /// Show the session state
    Status,
    #[command(subcommand)]
    Messages(MessagesCommand),
    #[command(subcommand)]
    Profile(ProfileCommand),
}

#[derive(Subcommand, Debug)]
enum MessagesCommand {
    List,
    Show { id: i64 },
    Create { content: String },
    Edit { id: i64, content: String },
    Delete { id: i64 },
}

#[derive(Subcommand, Debug)]
enum ProfileCommand {
    Show,
    /// Upload an image as the new avatar
    Avatar { path: PathBuf },
}

struct App {
    session: Arc<SessionManager>,
    messages: MessageBoard,
    profile: ProfileService,
}

impl App {
    async fn start(config: &Config) -> Result<Self> {
        let store_dir = config.secure_store_dir()?;
        let store = FileSecureStore::open(&store_dir)
            .with_context(|| format!("failed to open secure store at {}", store_dir.display()))?;

        let decoder = if config.reject_expired_tokens {
            JwtDecoder::new().rejecting_expired()
        } else {
            JwtDecoder::new()
        };

        let anonymous = ApiClient::new(config)?;
        let session = Arc::new(SessionManager::new(
            Arc::new(anonymous.clone()),
            Arc::new(store),
            Arc::new(decoder),
            config.credential_key.clone(),
        ));
        let authed = anonymous.with_credentials(session.clone());

        session.recover().await;

        Ok(Self {
            messages: MessageBoard::new(authed.clone(), config.query_stale_time()),
            profile: ProfileService::new(authed, config.query_stale_time()),
            session,
        })
    }

    async fn require_session(&self) -> Result<i64> {
        match self.session.resolve_destination().await {
            Destination::App => self.session.user_id().context("not signed in"),
            _ => bail!("not signed in"),
        }
    }

    async fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::Login { email, password } => {
                let password = password_or_prompt(password)?;
                let result = self.session.login(&email, &password).await;
                report(&result)?;
                println!("Signed in as user {}", self.session.user_id().unwrap_or_default());
            }
            Command::Register {
                email,
                password,
                name,
            } => {
                let password = password_or_prompt(password)?;
                let result = self.session.register(&email, &password, name.as_deref()).await;
                report(&result)?;
                println!("Account created. Sign in with `courier login --email {email}`.");
            }
            Command::Logout => {
                self.session.logout().await;
                self.messages.clear_cache();
                self.profile.clear_cache();
                println!("Signed out");
            }
            Command::Status => {
                let session = self.session.wait_initialized().await;
                println!("phase:       {:?}", session.phase());
                match session.user_id() {
                    Some(id) => println!("user:        {id}"),
                    None => println!("user:        -"),
                }
                println!("destination: {:?}", courier::auth::destination(&session));
            }
            Command::Messages(cmd) => self.run_messages(cmd).await?,
            Command::Profile(cmd) => self.run_profile(cmd).await?,
        }
        Ok(())
    }

    async fn run_messages(&self, command: MessagesCommand) -> Result<()> {
        let me = self.require_session().await?;
        match command {
            MessagesCommand::List => {
                let messages = self.messages.list().await?;
                if messages.is_empty() {
                    println!("No messages yet");
                }
                for message in &messages {
                    print_message(message, me);
                }
            }
            MessagesCommand::Show { id } => print_message(&self.messages.get(id).await?, me),
            MessagesCommand::Create { content } => {
                let created = self.messages.create(&content).await?;
                println!("Created message {}", created.id);
            }
            MessagesCommand::Edit { id, content } => match self.messages.update(id, &content).await? {
                Some(updated) => print_message(&updated, me),
                None => println!("No changes"),
            },
            MessagesCommand::Delete { id } => {
                self.messages.delete(id).await?;
                println!("Deleted message {id}");
            }
        }
        Ok(())
    }

    async fn run_profile(&self, command: ProfileCommand) -> Result<()> {
        self.require_session().await?;
        let me = match command {
            ProfileCommand::Show => self.profile.profile().await?,
            ProfileCommand::Avatar { path } => self.profile.upload_avatar(&path).await?,
        };
        println!(
            "[{}] {} <{}>",
            profile::display_initial(&me),
            profile::display_name(&me),
            profile::display_email(&me)
        );
        if let Some(url) = self.profile.avatar_url(&me) {
            println!("avatar: {url}");
        }
        Ok(())
    }
}

fn password_or_prompt(password: Option<String>) -> Result<String> {
    match password {
        Some(p) => Ok(p),
        None => Ok(dialoguer::Password::new()
            .with_prompt("Password")
            .interact()?),
    }
}

fn report<T>(result: &AuthResult<T>) -> Result<()> {
    if result.is_error() {
        bail!("{}", result.msg.as_deref().unwrap_or("request failed"));
    }
    Ok(())
}

fn print_message(message: &Message, me: i64) {
    let marker = if MessageBoard::is_own(message, Some(me)) {
        "*"
    } else {
        " "
    };
    let when = message
        .created_at
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default();
    println!(
        "{marker} #{:<5} user {:<5} {when:<16} {}",
        message.id, message.user_id, message.content
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "courier=debug" } else { "courier=warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(cli.config.as_deref())?;
    let app = App::start(&config).await?;
    app.run(cli.command).await
}
