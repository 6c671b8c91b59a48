use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "hubline")]
#[command(about = "Hubline client: browse hubs and bytes, manage your session")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to hubline.toml in the platform config dir)
    #[arg(short, long, global = true, env = "HUBLINE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Forum base URL (overrides config)
    #[arg(short, long, global = true)]
    pub server: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in with a user API key
    Login(LoginArgs),
    /// Revoke the key and forget the session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Re-confirm the stored session with the server
    Refresh,
    /// List hubs
    Hubs,
    /// List the latest bytes
    Latest {
        /// Page, starting at 0
        #[arg(short, long, default_value_t = 0)]
        page: u32,
    },
    /// Show a byte with its comments
    Thread {
        byte_id: i64,
    },
    /// Reply to a byte
    Comment {
        byte_id: i64,
        body: String,
    },
    /// Like or unlike a comment
    Like(LikeArgs),
    /// Show a user's profile
    Profile {
        username: String,
    },
    /// Raw GET of any endpoint (e.g. /about.json)
    Get {
        endpoint: String,
        /// Skip the response cache
        #[arg(long)]
        no_cache: bool,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[derive(clap::Args)]
pub struct LoginArgs {
    /// Username or email the key belongs to
    pub identifier: String,
    /// User API key
    #[arg(long, env = "HUBLINE_API_KEY", hide_env_values = true)]
    pub key: String,
}

#[derive(clap::Args)]
pub struct LikeArgs {
    pub byte_id: i64,
    /// Comment number within the byte
    pub number: u32,
    /// Remove the like instead
    #[arg(long)]
    pub undo: bool,
}
