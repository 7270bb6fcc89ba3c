//! CLI entry and dispatch.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use docchat_core::api::ApiClient;
use docchat_core::config::Config;
use docchat_core::logging;
use docchat_core::session::{FileStorage, SessionStore};
use docchat_types::{AnalyticsPeriod, ExportFormat};

mod commands;

#[derive(Parser)]
#[command(name = "docchat")]
#[command(version)]
#[command(about = "Manage document chatbots from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// API base URL (overrides DOCCHAT_API_URL and config)
    #[arg(long, global = true, value_name = "URL")]
    api_url: Option<String>,

    /// Print raw JSON instead of formatted output
    #[arg(long, global = true)]
    json: bool,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: String,
        /// Prompted for when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Create an account and organization
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        organization: String,
        /// Prompted for when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Sign out and forget the saved session
    Logout,
    /// Show the signed-in user from the saved session
    Whoami,
    /// Account, password, 2FA and device sessions
    Account {
        #[command(subcommand)]
        command: AccountCommands,
    },
    /// Manage chatbots
    Chatbots {
        #[command(subcommand)]
        command: ChatbotCommands,
    },
    /// Manage chatbot documents
    Documents {
        #[command(subcommand)]
        command: DocumentCommands,
    },
    /// Send a message to a chatbot
    Chat {
        #[arg(value_name = "CHATBOT_ID")]
        chatbot_id: String,
        #[arg(value_name = "MESSAGE")]
        message: String,
    },
    /// Browse or export chat history
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },
    /// Check that the API is reachable
    Health,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum AccountCommands {
    /// Fetch the profile from the server
    Profile,
    /// Update name or avatar
    Update {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        avatar: Option<String>,
    },
    /// Exchange the current token for a fresh one
    Refresh,
    /// Change the account password
    Password {
        #[arg(long)]
        current: String,
        #[arg(long)]
        new: String,
    },
    /// Request a password reset email
    ForgotPassword { email: String },
    /// Set a new password with a reset token
    ResetPassword {
        #[arg(long)]
        token: String,
        #[arg(long)]
        password: String,
    },
    /// Confirm an email address
    VerifyEmail { token: String },
    /// Send the verification email again
    ResendVerification,
    /// Two-factor authentication
    #[command(name = "2fa")]
    TwoFactor {
        #[command(subcommand)]
        command: TwoFactorCommands,
    },
    /// List signed-in devices
    Sessions,
    /// Sign out one device, or all with --all
    Revoke {
        #[arg(value_name = "SESSION_ID", required_unless_present = "all")]
        id: Option<String>,
        #[arg(long, conflicts_with = "id")]
        all: bool,
    },
}

#[derive(clap::Subcommand)]
enum TwoFactorCommands {
    Enable,
    Verify { code: String },
    Disable { code: String },
}

#[derive(clap::Subcommand)]
enum ChatbotCommands {
    /// List chatbots in the organization
    List,
    /// Show one chatbot
    Show { id: String },
    Create {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    Delete { id: String },
    /// Activate or deactivate
    Toggle { id: String },
    /// Copy a chatbot under a new name
    Clone { id: String, name: String },
    /// Print the website embed snippets
    Embed { id: String },
    /// Show appearance and behavior settings
    Settings { id: String },
    /// Update the welcome message or placeholder
    Configure {
        id: String,
        #[arg(long)]
        welcome_message: Option<String>,
        #[arg(long)]
        placeholder: Option<String>,
        #[arg(long)]
        max_messages: Option<u32>,
    },
    Analytics {
        id: String,
        /// 7d, 30d or 90d
        #[arg(long, default_value_t = AnalyticsPeriod::default())]
        period: AnalyticsPeriod,
    },
    Metrics { id: String },
    /// Send a test message
    Test { id: String, message: String },
}

#[derive(clap::Subcommand)]
enum DocumentCommands {
    List {
        #[arg(value_name = "CHATBOT_ID")]
        chatbot_id: String,
    },
    /// Upload a document to a chatbot
    Upload {
        #[arg(value_name = "CHATBOT_ID")]
        chatbot_id: String,
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    Delete {
        #[arg(value_name = "DOCUMENT_ID")]
        id: String,
    },
}

#[derive(clap::Subcommand)]
enum HistoryCommands {
    List {
        #[arg(value_name = "CHATBOT_ID")]
        chatbot_id: String,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long, value_name = "DATE")]
        start_date: Option<String>,
        #[arg(long, value_name = "DATE")]
        end_date: Option<String>,
    },
    /// Download the full history as csv or json
    Export {
        #[arg(value_name = "CHATBOT_ID")]
        chatbot_id: String,
        #[arg(long, default_value_t = ExportFormat::default())]
        format: ExportFormat,
        /// Output directory (defaults to config download.dir)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
}

/// Everything a network command needs.
pub struct App {
    pub config: Config,
    pub session: Arc<SessionStore>,
    pub client: ApiClient,
    pub json: bool,
}

impl App {
    fn load(api_url: Option<&str>, json: bool) -> Result<Self> {
        let config = Config::load().context("load config")?;
        let session = SessionStore::rehydrate(FileStorage::default_location())
            .context("load saved session")?;
        let session = Arc::new(session);

        let mut builder = ApiClient::builder(Arc::clone(&session))
            .login_redirect(|| {
                eprintln!("Session expired. Run `docchat login` to sign in again.");
            });
        builder = match api_url {
            Some(url) => builder.base_url(url),
            None => builder.config(&config)?,
        };
        let client = builder.build().context("create API client")?;

        Ok(Self {
            config,
            session,
            client,
            json,
        })
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init();

    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    let Cli {
        command,
        api_url,
        json,
    } = cli;

    // Config commands work without a session or a reachable server.
    let command = match command {
        Commands::Config { command } => {
            return match command {
                ConfigCommands::Path => {
                    commands::config::path();
                    Ok(())
                }
                ConfigCommands::Init => commands::config::init(),
            };
        }
        other => other,
    };

    let app = App::load(api_url.as_deref(), json)?;

    match command {
        Commands::Login { email, password } => {
            commands::auth::login(&app, &email, password).await
        }
        Commands::Register {
            name,
            email,
            organization,
            password,
        } => commands::auth::register(&app, name, email, organization, password).await,
        Commands::Logout => commands::auth::logout(&app).await,
        Commands::Whoami => commands::auth::whoami(&app),

        Commands::Account { command } => match command {
            AccountCommands::Profile => commands::auth::profile(&app).await,
            AccountCommands::Update { name, avatar } => {
                commands::auth::update_profile(&app, name, avatar).await
            }
            AccountCommands::Refresh => commands::auth::refresh(&app).await,
            AccountCommands::Password { current, new } => {
                commands::auth::change_password(&app, current, new).await
            }
            AccountCommands::ForgotPassword { email } => {
                commands::auth::forgot_password(&app, &email).await
            }
            AccountCommands::ResetPassword { token, password } => {
                commands::auth::reset_password(&app, token, password).await
            }
            AccountCommands::VerifyEmail { token } => {
                commands::auth::verify_email(&app, &token).await
            }
            AccountCommands::ResendVerification => {
                commands::auth::resend_verification(&app).await
            }
            AccountCommands::TwoFactor { command } => match command {
                TwoFactorCommands::Enable => commands::auth::enable_2fa(&app).await,
                TwoFactorCommands::Verify { code } => {
                    commands::auth::verify_2fa(&app, &code).await
                }
                TwoFactorCommands::Disable { code } => {
                    commands::auth::disable_2fa(&app, &code).await
                }
            },
            AccountCommands::Sessions => commands::auth::sessions(&app).await,
            AccountCommands::Revoke { id, all } => {
                commands::auth::revoke(&app, id.as_deref(), all).await
            }
        },

        Commands::Chatbots { command } => match command {
            ChatbotCommands::List => commands::chatbots::list(&app).await,
            ChatbotCommands::Show { id } => commands::chatbots::show(&app, &id).await,
            ChatbotCommands::Create { name, description } => {
                commands::chatbots::create(&app, name, description).await
            }
            ChatbotCommands::Update {
                id,
                name,
                description,
            } => commands::chatbots::update(&app, &id, name, description).await,
            ChatbotCommands::Delete { id } => commands::chatbots::delete(&app, &id).await,
            ChatbotCommands::Toggle { id } => commands::chatbots::toggle(&app, &id).await,
            ChatbotCommands::Clone { id, name } => {
                commands::chatbots::clone(&app, &id, &name).await
            }
            ChatbotCommands::Embed { id } => commands::chatbots::embed(&app, &id).await,
            ChatbotCommands::Settings { id } => commands::chatbots::settings(&app, &id).await,
            ChatbotCommands::Configure {
                id,
                welcome_message,
                placeholder,
                max_messages,
            } => {
                commands::chatbots::configure(
                    &app,
                    &id,
                    commands::chatbots::BehaviorOverrides {
                        welcome_message,
                        placeholder,
                        max_messages,
                    },
                )
                .await
            }
            ChatbotCommands::Analytics { id, period } => {
                commands::chatbots::analytics(&app, &id, period).await
            }
            ChatbotCommands::Metrics { id } => commands::chatbots::metrics(&app, &id).await,
            ChatbotCommands::Test { id, message } => {
                commands::chatbots::test(&app, &id, &message).await
            }
        },

        Commands::Documents { command } => match command {
            DocumentCommands::List { chatbot_id } => {
                commands::documents::list(&app, &chatbot_id).await
            }
            DocumentCommands::Upload { chatbot_id, file } => {
                commands::documents::upload(&app, &chatbot_id, file).await
            }
            DocumentCommands::Delete { id } => commands::documents::delete(&app, &id).await,
        },

        Commands::Chat {
            chatbot_id,
            message,
        } => commands::chat::send(&app, &chatbot_id, &message).await,

        Commands::History { command } => match command {
            HistoryCommands::List {
                chatbot_id,
                page,
                limit,
                search,
                start_date,
                end_date,
            } => {
                let query = docchat_types::HistoryQuery {
                    page,
                    limit,
                    search,
                    start_date,
                    end_date,
                };
                commands::chat::history(&app, &chatbot_id, &query).await
            }
            HistoryCommands::Export {
                chatbot_id,
                format,
                dir,
            } => commands::chat::export(&app, &chatbot_id, format, dir).await,
        },

        Commands::Health => commands::health::check(&app).await,

        Commands::Config { .. } => Ok(()),
    }
}
