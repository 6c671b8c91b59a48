//! Command handlers. Each prints JSON to stdout; logs go to stderr.

use hubline_client::{ClientError, ClientResult, HublineClient, RequestOptions};
use hubline_core::AuthSession;
use serde::Serialize;
use tracing::info;

use crate::cli::{Commands, LikeArgs, LoginArgs};

pub async fn run(client: &HublineClient, command: Commands) -> ClientResult<()> {
    // Commands that manage the session themselves skip the bootstrap check.
    let session = match command {
        Commands::Login(_) | Commands::Config => AuthSession::signed_out(),
        _ => client.auth.load_stored_auth().await,
    };

    match command {
        Commands::Login(args) => login(client, args).await,
        Commands::Logout => print(&client.auth.sign_out().await),
        Commands::Whoami => print(&session),
        Commands::Refresh => print(&client.auth.refresh_auth().await?),
        Commands::Hubs => print(&client.api.hubs().await?),
        Commands::Latest { page } => print(&client.api.latest_bytes(page).await?),
        Commands::Thread { byte_id } => print(&client.api.byte_thread(byte_id).await?),
        Commands::Comment { byte_id, body } => {
            require_session(&session)?;
            let created = client.api.post_comment(byte_id, &body).await?;
            info!(byte_id, post_number = created.post_number, "Comment posted");
            print(&serde_json::json!({
                "id": created.id,
                "byte_id": created.topic_id,
                "number": created.post_number,
            }))
        }
        Commands::Like(args) => {
            require_session(&session)?;
            like(client, args).await
        }
        Commands::Profile { username } => print(&client.api.user_profile(&username).await?),
        Commands::Get { endpoint, no_cache } => {
            let options = if no_cache {
                RequestOptions::get().no_cache()
            } else {
                RequestOptions::get()
            };
            print(&client.engine.request(&endpoint, options).await.into_result()?)
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&client.config)?);
            Ok(())
        }
    }
}

async fn login(client: &HublineClient, args: LoginArgs) -> ClientResult<()> {
    let session = client.auth.sign_in(&args.identifier, &args.key).await?;
    print(&session)
}

async fn like(client: &HublineClient, args: LikeArgs) -> ClientResult<()> {
    let thread = client.api.byte_thread(args.byte_id).await?;
    let mut comment = thread
        .comments
        .into_iter()
        .find(|c| c.number == args.number)
        .ok_or_else(|| ClientError::NotFound {
            endpoint: format!("/t/{}.json#{}", args.byte_id, args.number),
        })?;

    if args.undo {
        client.api.unlike_comment(&mut comment).await?;
    } else {
        client.api.like_comment(&mut comment).await?;
    }
    print(&comment)
}

fn require_session(session: &AuthSession) -> ClientResult<()> {
    if session.is_authenticated {
        Ok(())
    } else {
        Err(ClientError::NotAuthenticated)
    }
}

fn print<T: Serialize>(value: &T) -> ClientResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
